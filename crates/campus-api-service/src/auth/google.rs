//! Google OAuth 登录
//!
//! 实现授权码模式：生成授权 URL、用授权码换取 access_token、
//! 拉取 Google 用户信息

use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Google 返回的用户信息
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    /// Google 账号唯一标识
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Google OAuth 客户端
#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
}

impl GoogleOAuthClient {
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            redirect_url,
        }
    }

    /// 生成授权跳转 URL
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}",
            GOOGLE_AUTH_URL,
            urlencode(&self.client_id),
            urlencode(&self.redirect_url),
            urlencode(state)
        )
    }

    /// 用授权码换取用户信息
    ///
    /// 两步：code 换 access_token，再拉取 userinfo
    pub async fn fetch_user(&self, code: &str) -> Result<GoogleUserInfo, ApiError> {
        let token = self.exchange_code(code).await?;
        self.fetch_user_info(&token).await
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ApiError> {
        let params = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let resp = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| ApiError::ExternalService {
                service: "google".to_string(),
                message: format!("token 请求失败: {}", e),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(status = %status, "Google token 接口返回错误");
            return Err(ApiError::ExternalService {
                service: "google".to_string(),
                message: format!("token 接口返回 {}", status),
            });
        }

        let token: TokenResponse = resp.json().await.map_err(|e| ApiError::ExternalService {
            service: "google".to_string(),
            message: format!("token 响应解析失败: {}", e),
        })?;

        Ok(token.access_token)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<GoogleUserInfo, ApiError> {
        let resp = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::ExternalService {
                service: "google".to_string(),
                message: format!("userinfo 请求失败: {}", e),
            })?;

        if !resp.status().is_success() {
            return Err(ApiError::ExternalService {
                service: "google".to_string(),
                message: format!("userinfo 接口返回 {}", resp.status()),
            });
        }

        resp.json().await.map_err(|e| ApiError::ExternalService {
            service: "google".to_string(),
            message: format!("userinfo 响应解析失败: {}", e),
        })
    }
}

/// URL 查询参数编码（仅处理授权 URL 中会出现的字符）
fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_contains_params() {
        let client = GoogleOAuthClient::new(
            "client-123".to_string(),
            "secret".to_string(),
            "https://app.example.com/auth/callback".to_string(),
        );
        let url = client.authorize_url("xyz");
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fauth%2Fcallback"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_urlencode_reserved_chars() {
        assert_eq!(urlencode("a b&c"), "a%20b%26c");
        assert_eq!(urlencode("safe-chars_.~"), "safe-chars_.~");
    }

    #[test]
    fn test_user_info_deserializes_partial_payload() {
        let json = r#"{"id":"g-1","email":"a@example.com"}"#;
        let info: GoogleUserInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.id, "g-1");
        assert!(!info.verified_email);
        assert!(info.given_name.is_none());
    }
}
