//! HTTP 中间件

pub mod identity;

pub use identity::{ActingUser, USER_ID_HEADER, require_user};
