//! 邮箱 OTP 验证码
//!
//! 生成 6 位数字验证码并通过 `MailSender` trait 抽象邮件发送。
//! 当前版本为模拟发送（仅记录日志），生产环境替换为真实邮件服务的
//! SDK 调用时只需实现同一 trait。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::info;

use crate::error::ApiError;

/// 验证码有效期（分钟）
pub const OTP_TTL_MINUTES: i64 = 10;

/// 生成 6 位数字验证码
pub fn generate_otp() -> String {
    let code: u32 = rand::rng().random_range(100_000..=999_999);
    code.to_string()
}

/// 计算验证码过期时间
pub fn otp_expires_at() -> DateTime<Utc> {
    Utc::now() + Duration::minutes(OTP_TTL_MINUTES)
}

/// 邮件发送器 trait
#[async_trait]
pub trait MailSender: Send + Sync {
    /// 发送验证码邮件
    async fn send_otp(&self, to: &str, code: &str) -> Result<(), ApiError>;
}

/// 模拟邮件发送器
///
/// 生产环境中替换为 SMTP / 邮件服务商的 SDK 调用
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send_otp(&self, to: &str, code: &str) -> Result<(), ApiError> {
        info!(to = %to, code = %code, "模拟发送 OTP 邮件");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_is_six_digits() {
        for _ in 0..100 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            // 首位不为 0，避免前端按数字解析时丢位
            assert_ne!(code.as_bytes()[0], b'0');
        }
    }

    #[test]
    fn test_otp_expiry_window() {
        let expires = otp_expires_at();
        let delta = expires - Utc::now();
        assert!(delta > Duration::minutes(9));
        assert!(delta <= Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_log_mail_sender() {
        let sender = LogMailSender;
        assert!(sender.send_otp("a@example.com", "123456").await.is_ok());
    }
}
