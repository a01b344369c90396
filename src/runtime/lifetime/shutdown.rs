use tokio::signal;
use tokio::task::JoinHandle;
use tracing::warn;

pub async fn listen_for_shutdown() {
    // 等待 Ctrl+C 信号
    signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
    warn!("Shutdown signal received, initiating graceful shutdown...");
}

/// 停止后台任务
pub fn stop_background_tasks(tasks: Vec<JoinHandle<()>>) {
    let count = tasks.len();
    for task in tasks {
        task.abort();
    }
    warn!("Stopped {} background task(s)", count);
}
