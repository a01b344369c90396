//! 客户端会话存储
//!
//! 保存当前登录的 access token 和用户。实时连接先从存储中取 token，
//! 取不到时再调用 [`TokenProvider`] 异步获取。

use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::models::users::entities::User;

pub trait SessionStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: String);
    fn user(&self) -> Option<User>;
    fn set_user(&self, user: User);
    /// 清空 token 和用户
    fn clear(&self);
}

/// 内存中的会话存储
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: RwLock<Option<String>>,
    user: RwLock<Option<User>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            user: RwLock::new(None),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .filter(|token| !token.is_empty())
    }

    fn set_token(&self, token: String) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token);
        }
    }

    fn user(&self) -> Option<User> {
        self.user.read().ok().and_then(|guard| guard.clone())
    }

    fn set_user(&self, user: User) {
        if let Ok(mut guard) = self.user.write() {
            *guard = Some(user);
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
        if let Ok(mut guard) = self.user.write() {
            *guard = None;
        }
    }
}

/// 存储中没有 token 时的异步来源
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Option<String>;
}

/// 解析连接用的 token：先查存储，再查后备来源（取到后写回存储）
pub async fn resolve_token(
    store: &dyn SessionStore,
    fallback: Option<&dyn TokenProvider>,
) -> Option<String> {
    if let Some(token) = store.token() {
        return Some(token);
    }

    let token = fallback?.fetch_token().await.filter(|t| !t.is_empty())?;
    debug!("Token resolved from fallback provider");
    store.set_token(token.clone());
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider(Option<&'static str>);

    #[async_trait]
    impl TokenProvider for StaticProvider {
        async fn fetch_token(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[tokio::test]
    async fn test_store_takes_precedence() {
        let store = MemorySessionStore::with_token("stored");
        let provider = StaticProvider(Some("fallback"));
        let token = resolve_token(&store, Some(&provider)).await;
        assert_eq!(token.as_deref(), Some("stored"));
    }

    #[tokio::test]
    async fn test_fallback_is_written_back() {
        let store = MemorySessionStore::new();
        let provider = StaticProvider(Some("fallback"));
        let token = resolve_token(&store, Some(&provider)).await;
        assert_eq!(token.as_deref(), Some("fallback"));
        assert_eq!(store.token().as_deref(), Some("fallback"));
    }

    #[tokio::test]
    async fn test_no_token_anywhere() {
        let store = MemorySessionStore::new();
        assert_eq!(resolve_token(&store, None).await, None);

        let provider = StaticProvider(None);
        assert_eq!(resolve_token(&store, Some(&provider)).await, None);
    }

    #[test]
    fn test_clear() {
        let store = MemorySessionStore::with_token("abc");
        store.clear();
        assert_eq!(store.token(), None);
    }
}
