//! 聊天消息存储操作

use super::{SeaOrmStorage, db_error};
use crate::entity::message_reads::{
    ActiveModel as ReadActiveModel, Column as ReadColumn, Entity as MessageReads,
};
use crate::entity::messages::{ActiveModel, Column, Entity as Messages};
use crate::errors::{Kk360Error, Result};
use crate::models::messages::entities::{Message, NewMessage};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};

impl SeaOrmStorage {
    /// 保存消息
    pub async fn create_message_impl(&self, message: NewMessage) -> Result<Message> {
        let model = ActiveModel {
            conversation_id: Set(message.conversation_id),
            sender_id: Set(message.sender_id),
            content: Set(message.content),
            message_type: Set(message.message_type.to_string()),
            reply_to: Set(message.reply_to),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };

        let result = model
            .insert(&self.db)
            .await
            .map_err(|e| db_error("保存消息失败", e))?;

        Ok(result.into_message())
    }

    /// 通过 ID 获取消息
    pub async fn get_message_by_id_impl(&self, message_id: i64) -> Result<Option<Message>> {
        let result = Messages::find_by_id(message_id)
            .one(&self.db)
            .await
            .map_err(|e| db_error("查询消息失败", e))?;

        Ok(result.map(|m| m.into_message()))
    }

    /// 编辑消息内容（已删除的消息不可编辑）
    pub async fn edit_message_impl(
        &self,
        message_id: i64,
        content: &str,
    ) -> Result<Option<Message>> {
        let Some(existing) = Messages::find_by_id(message_id)
            .filter(Column::DeletedAt.is_null())
            .one(&self.db)
            .await
            .map_err(|e| db_error("查询消息失败", e))?
        else {
            return Ok(None);
        };

        let mut model: ActiveModel = existing.into();
        model.content = Set(content.to_string());
        model.edited_at = Set(Some(Utc::now().timestamp()));

        let updated = model
            .update(&self.db)
            .await
            .map_err(|e| db_error("编辑消息失败", e))?;

        Ok(Some(updated.into_message()))
    }

    /// 软删除消息
    pub async fn delete_message_impl(&self, message_id: i64) -> Result<bool> {
        let result = Messages::update_many()
            .col_expr(
                Column::DeletedAt,
                sea_orm::sea_query::Expr::value(Utc::now().timestamp()),
            )
            .filter(
                Condition::all()
                    .add(Column::Id.eq(message_id))
                    .add(Column::DeletedAt.is_null()),
            )
            .exec(&self.db)
            .await
            .map_err(|e| db_error("删除消息失败", e))?;

        Ok(result.rows_affected > 0)
    }

    /// 标记已读，重复标记返回首次已读时间
    pub async fn mark_message_read_impl(
        &self,
        message_id: i64,
        user_id: i64,
    ) -> Result<DateTime<Utc>> {
        let find_existing = || {
            MessageReads::find().filter(
                Condition::all()
                    .add(ReadColumn::MessageId.eq(message_id))
                    .add(ReadColumn::UserId.eq(user_id)),
            )
        };

        if let Some(existing) = find_existing()
            .one(&self.db)
            .await
            .map_err(|e| db_error("查询已读记录失败", e))?
        {
            return Ok(DateTime::<Utc>::from_timestamp(existing.read_at, 0).unwrap_or_default());
        }

        let now = Utc::now().timestamp();
        let model = ReadActiveModel {
            message_id: Set(message_id),
            user_id: Set(user_id),
            read_at: Set(now),
            ..Default::default()
        };

        match model.insert(&self.db).await {
            Ok(_) => Ok(DateTime::<Utc>::from_timestamp(now, 0).unwrap_or_default()),
            Err(e) => match db_error("写入已读记录失败", e) {
                Kk360Error::Conflict(_) => {
                    let existing = find_existing()
                        .one(&self.db)
                        .await
                        .map_err(|e| db_error("查询已读记录失败", e))?;
                    Ok(existing
                        .and_then(|m| DateTime::<Utc>::from_timestamp(m.read_at, 0))
                        .unwrap_or_default())
                }
                other => Err(other),
            },
        }
    }

    /// 会话历史：before 之前最新的 limit 条，按时间正序返回
    pub async fn list_conversation_messages_impl(
        &self,
        conversation_id: &str,
        limit: u64,
        before: Option<i64>,
    ) -> Result<Vec<Message>> {
        let mut condition = Condition::all()
            .add(Column::ConversationId.eq(conversation_id))
            .add(Column::DeletedAt.is_null());
        if let Some(before) = before {
            condition = condition.add(Column::Id.lt(before));
        }

        let mut rows = Messages::find()
            .filter(condition)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(|e| db_error("查询会话历史失败", e))?;

        rows.reverse();
        Ok(rows.into_iter().map(|m| m.into_message()).collect())
    }
}
