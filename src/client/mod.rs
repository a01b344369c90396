//! 客户端
//!
//! 运行在前端一侧的逻辑：REST 调用、会议页面驱动、实时连接、
//! 在线状态聚合以及输入防抖。

pub mod api;
pub mod meeting;
pub mod presence;
pub mod realtime;
pub mod session_store;
pub mod typing;

pub use api::{ApiClient, ClassSessionApi};
pub use meeting::{MeetingSession, MeetingSettings};
pub use presence::{PresenceSettings, PresenceSnapshot, PresenceTracker, typing_indicator};
pub use realtime::{EventBus, LocalEvent, RealtimeClient, RealtimeSettings};
pub use session_store::{MemorySessionStore, SessionStore, TokenProvider};
pub use typing::{TypingDebouncer, TypingSink};
