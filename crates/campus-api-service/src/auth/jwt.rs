//! JWT Token 处理
//!
//! 提供 JWT Token 的生成和验证功能

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::ActorType;

/// JWT 配置
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// 签名密钥
    pub secret: String,
    /// Token 过期时间（秒）
    pub expires_in_secs: i64,
    /// Token 签发者
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "campus-api-secret-key-change-in-production".to_string(),
            expires_in_secs: 7 * 24 * 3600, // 7 天
            issuer: "campus-api-service".to_string(),
        }
    }
}

/// JWT Claims（Token 载荷）
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// 账号 ID
    pub sub: String,
    /// 账号角色
    pub role: ActorType,
    /// 注册邮箱
    pub email: String,
    /// 签发时间
    pub iat: i64,
    /// 过期时间
    pub exp: i64,
    /// 签发者
    pub iss: String,
}

impl Claims {
    /// 解析账号 ID
    pub fn account_id(&self) -> Result<i64, ApiError> {
        self.sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("无效的账号 ID".to_string()))
    }
}

/// JWT 管理器
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    /// 创建 JWT 管理器
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT Token
    ///
    /// 返回 (token, 过期时间戳)
    pub fn generate_token(
        &self,
        account_id: i64,
        role: ActorType,
        email: &str,
    ) -> Result<(String, i64), ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.expires_in_secs);

        let claims = Claims {
            sub: account_id.to_string(),
            role,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("JWT 生成失败: {}", e)))?;

        Ok((token, exp.timestamp()))
    }

    /// 验证并解析 JWT Token
    ///
    /// 返回解析后的 Claims，如果 Token 无效或过期则返回错误
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Unauthorized("Token 已过期".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::Unauthorized("无效的 Token".to_string())
                }
                _ => ApiError::Unauthorized(format!("Token 验证失败: {}", e)),
            },
        )?;

        Ok(token_data.claims)
    }

    /// 获取 Token 过期时间（秒）
    pub fn expires_in_secs(&self) -> i64 {
        self.config.expires_in_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_verify_token() {
        let manager = JwtManager::new(JwtConfig::default());

        let (token, _exp) = manager
            .generate_token(42, ActorType::Student, "alice@example.com")
            .unwrap();

        let claims = manager.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.account_id().unwrap(), 42);
        assert_eq!(claims.role, ActorType::Student);
        assert_eq!(claims.email, "alice@example.com");
    }

    #[test]
    fn test_invalid_token() {
        let manager = JwtManager::new(JwtConfig::default());

        let result = manager.verify_token("invalid.token.here");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let manager = JwtManager::new(JwtConfig::default());
        let (token, _) = manager
            .generate_token(1, ActorType::College, "c@example.com")
            .unwrap();

        let other = JwtManager::new(JwtConfig {
            secret: "another-secret".to_string(),
            ..JwtConfig::default()
        });
        assert!(other.verify_token(&token).is_err());
    }
}
