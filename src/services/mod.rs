pub mod attendance;
pub mod auth;
pub mod class_sessions;
pub mod classes;
pub mod users;
pub mod websocket;

pub use attendance::AttendanceService;
pub use auth::AuthService;
pub use class_sessions::ClassSessionService;
pub use classes::ClassService;
pub use users::UserService;
pub use websocket::{ChatHub, WebSocketService};
