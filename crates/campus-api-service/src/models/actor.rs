//! 行为主体引用
//!
//! 所有"谁做了什么"的场景（发帖、点赞、转发、连接请求）统一使用
//! `(actor_id, actor_type)` 规范化引用，替代按角色动态命名列的老设计。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 账号角色 / 主体类型判别字段
///
/// 与数据库枚举 `actor_type` 一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "actor_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Student,
    College,
    Startup,
    Industry,
    Admin,
}

impl ActorType {
    /// 稳定的字符串表示，用于缓存键和 pair_key 编码
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::College => "college",
            Self::Startup => "startup",
            Self::Industry => "industry",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "college" => Ok(Self::College),
            "startup" => Ok(Self::Startup),
            "industry" => Ok(Self::Industry),
            "admin" => Ok(Self::Admin),
            other => Err(format!("未知的主体类型: {}", other)),
        }
    }
}

/// 行为主体引用
///
/// 账号 id 加角色判别字段，构成跨表通用的主体标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRef {
    pub id: i64,
    pub actor_type: ActorType,
}

impl ActorRef {
    pub fn new(id: i64, actor_type: ActorType) -> Self {
        Self { id, actor_type }
    }

    /// 稳定编码，形如 `student:42`
    pub fn encode(&self) -> String {
        format!("{}:{}", self.actor_type, self.id)
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_type_roundtrip() {
        for t in [
            ActorType::Student,
            ActorType::College,
            ActorType::Startup,
            ActorType::Industry,
            ActorType::Admin,
        ] {
            assert_eq!(t.as_str().parse::<ActorType>().unwrap(), t);
        }
        assert!("company".parse::<ActorType>().is_err());
    }

    #[test]
    fn test_actor_ref_encode() {
        let actor = ActorRef::new(42, ActorType::Student);
        assert_eq!(actor.encode(), "student:42");
    }

    #[test]
    fn test_actor_type_serde_lowercase() {
        let json = serde_json::to_string(&ActorType::College).unwrap();
        assert_eq!(json, "\"college\"");
        let back: ActorType = serde_json::from_str("\"industry\"").unwrap();
        assert_eq!(back, ActorType::Industry);
    }
}
