//! 认证模块
//!
//! 提供 JWT Token 生成、验证、密码处理、OTP 验证码和 Google OAuth 登录

mod google;
mod jwt;
mod otp;
mod password;

pub use google::{GoogleOAuthClient, GoogleUserInfo};
pub use jwt::{Claims, JwtConfig, JwtManager};
pub use otp::{generate_otp, otp_expires_at, LogMailSender, MailSender, OTP_TTL_MINUTES};
pub use password::{hash_password, verify_password};
