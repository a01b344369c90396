//! 会话参与者规则
//!
//! 会话 ID 决定谁可以加入：
//! - `class-{class_id}`：班级教师和学生，管理员也可加入
//! - `dm-{a}-{b}`：用户 a 与用户 b 的私聊
//!
//! 其他格式的会话 ID 一律拒绝。

use std::sync::Arc;

use crate::errors::Result;
use crate::models::users::entities::{User, UserRole};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversation {
    Class(i64),
    Direct(i64, i64),
}

impl Conversation {
    pub fn parse(conversation_id: &str) -> Option<Self> {
        if let Some(class_id) = conversation_id.strip_prefix("class-") {
            return class_id.parse().ok().filter(|id| *id > 0).map(Conversation::Class);
        }
        let (a, b) = conversation_id.strip_prefix("dm-")?.split_once('-')?;
        let (a, b) = (a.parse::<i64>().ok()?, b.parse::<i64>().ok()?);
        (a > 0 && b > 0 && a != b).then_some(Conversation::Direct(a, b))
    }
}

/// 两位用户的私聊会话 ID，与参数顺序无关
pub fn direct_conversation_id(a: i64, b: i64) -> String {
    format!("dm-{}-{}", a.min(b), a.max(b))
}

pub fn class_conversation_id(class_id: i64) -> String {
    format!("class-{class_id}")
}

/// 用户是否为会话参与者
pub async fn can_access(
    storage: &Arc<dyn Storage>,
    user: &User,
    conversation_id: &str,
) -> Result<bool> {
    match Conversation::parse(conversation_id) {
        Some(Conversation::Direct(a, b)) => Ok(user.id == a || user.id == b),
        Some(Conversation::Class(class_id)) => {
            let Some(class) = storage.get_class_by_id(class_id).await? else {
                return Ok(false);
            };
            Ok(user.role == UserRole::Admin || class.is_member(user.id))
        }
        None => Ok(false),
    }
}
