pub mod auth;

pub mod users;

pub mod classes;

pub mod websocket;

pub use auth::configure_auth_routes;
pub use classes::configure_classes_routes;
pub use users::configure_user_routes;
pub use websocket::configure_websocket_routes;
