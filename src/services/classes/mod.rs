pub mod ensure;
pub mod list;
pub mod resolver;
pub mod schedule;

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::classes::requests::{EnsureClassRequest, UpdateScheduleRequest};
use crate::storage::Storage;

pub use resolver::ClassResolver;

pub struct ClassService {
    storage: Option<Arc<dyn Storage>>,
}

impl ClassService {
    pub fn new_lazy() -> Self {
        Self { storage: None }
    }

    pub(crate) fn get_storage(&self, request: &HttpRequest) -> Arc<dyn Storage> {
        if let Some(storage) = &self.storage {
            storage.clone()
        } else {
            request
                .app_data::<actix_web::web::Data<Arc<dyn Storage>>>()
                .expect("Storage not found in app data")
                .get_ref()
                .clone()
        }
    }

    pub(crate) fn get_config(&self) -> &AppConfig {
        AppConfig::get()
    }

    // 获取当前用户可见的班级
    pub async fn list_classes(&self, request: &HttpRequest) -> ActixResult<HttpResponse> {
        list::list_classes(self, request).await
    }

    // 查找或创建班级
    pub async fn ensure_class(
        &self,
        request: &HttpRequest,
        ensure_request: EnsureClassRequest,
    ) -> ActixResult<HttpResponse> {
        ensure::ensure_class(self, request, ensure_request).await
    }

    // 修改班级时间或状态
    pub async fn update_schedule(
        &self,
        request: &HttpRequest,
        class_id: i64,
        update: UpdateScheduleRequest,
    ) -> ActixResult<HttpResponse> {
        schedule::update_schedule(self, request, class_id, update).await
    }
}
