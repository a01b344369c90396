//! 实时连接的传输层
//!
//! [`Connector`] 负责建立连接，[`Transport`] 负责收发帧。
//! 生产实现基于 tokio-tungstenite，测试中可替换为内存实现。

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::errors::{Kk360Error, Result};
use crate::models::realtime::{ClientCommand, ServerEvent};

#[async_trait]
pub trait Connector: Send + Sync {
    /// 使用 token 建立一条新连接
    async fn connect(&self, token: &str) -> Result<Box<dyn Transport>>;
}

#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, command: &ClientCommand) -> Result<()>;

    /// 读取下一个事件，连接关闭时返回 `None`
    async fn recv(&mut self) -> Option<Result<ServerEvent>>;

    async fn close(&mut self);
}

/// WebSocket 连接器，握手地址为 `{server_url}/api/v1/ws?token=...`
#[derive(Debug, Clone)]
pub struct WsConnector {
    server_url: String,
}

impl WsConnector {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, token: &str) -> Result<String> {
        let base = format!("{}/api/v1/ws", self.server_url);
        reqwest::Url::parse_with_params(&base, &[("token", token)])
            .map(|url| url.to_string())
            .map_err(|e| Kk360Error::transport(format!("Invalid server url {base}: {e}")))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, token: &str) -> Result<Box<dyn Transport>> {
        let endpoint = self.endpoint(token)?;
        let (stream, response) = connect_async(endpoint.as_str()).await?;
        debug!("WebSocket handshake completed: {}", response.status());
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, command: &ClientCommand) -> Result<()> {
        let frame = serde_json::to_string(command)?;
        self.stream.send(WsMessage::text(frame)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<ServerEvent>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e.into())),
            };
            match frame {
                WsMessage::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).map_err(Into::into));
                }
                WsMessage::Ping(payload) => {
                    if let Err(e) = self.stream.send(WsMessage::Pong(payload)).await {
                        return Some(Err(e.into()));
                    }
                }
                WsMessage::Close(reason) => {
                    debug!("Server closed connection: {:?}", reason);
                    return None;
                }
                other => {
                    warn!("Ignoring unexpected frame: {:?}", other);
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Error while closing WebSocket: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_token() {
        let connector = WsConnector::new("ws://127.0.0.1:8080/");
        let endpoint = connector.endpoint("a b+c").unwrap();
        assert!(endpoint.starts_with("ws://127.0.0.1:8080/api/v1/ws?token="));
        assert!(!endpoint.contains(' '));
    }

    #[test]
    fn test_invalid_server_url() {
        let connector = WsConnector::new("not a url");
        assert!(matches!(
            connector.endpoint("t"),
            Err(Kk360Error::Transport(_))
        ));
    }
}
