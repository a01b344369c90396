//! 配置管理
//!
//! 配置来源优先级（由低到高）：`config.toml`、`config.{APP_ENV}.toml`、
//! `KK360_*` 环境变量以及若干常用环境变量覆盖项。

mod r#impl;
mod structs;

pub use structs::*;
