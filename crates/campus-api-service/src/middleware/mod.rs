//! 中间件模块
//!
//! 提供认证和限流中间件

mod auth;
mod rate_limit;

pub use auth::{auth_middleware, TOKEN_COOKIE};
pub use rate_limit::rate_limit_middleware;
