//! 连接请求（ping）状态机与去重键
//!
//! 状态流转：pending → accepted | declined | ignored，三个目标态均为终态。
//! 去重不依赖应用层先查后插，而是用无序主体对的规范编码 `pair_key`
//! 配合数据库唯一索引，把并发重复请求变成约束冲突。

use serde::{Deserialize, Serialize};

use super::actor::ActorRef;

/// 连接请求状态
///
/// 与数据库枚举 `ping_status` 一一对应。
/// declined 与 ignored 是两个不同的终态：decline 会通过状态查询接口
/// 反馈给发送方，ignore 仅把请求从接收方收件箱隐藏、对发送方仍显示 pending。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ping_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PingStatus {
    Pending,
    Accepted,
    Declined,
    Ignored,
}

impl PingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Ignored => "ignored",
        }
    }

    /// 是否为终态（终态之间不允许任何流转）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// 状态流转合法性
    ///
    /// 只有 pending 可以流转，且不能流转回 pending 自身
    pub fn can_transition_to(&self, target: PingStatus) -> bool {
        matches!(self, Self::Pending) && target != Self::Pending
    }

    /// 发送方视角的状态
    ///
    /// ignored 对发送方显示为 pending，接收方的沉默不外泄
    pub fn as_seen_by_sender(&self) -> PingStatus {
        match self {
            Self::Ignored => Self::Pending,
            other => *other,
        }
    }
}

/// 无序主体对的规范编码
///
/// 不论 A→B 还是 B→A，编码结果相同，作为 ping_networks.pair_key
/// 写入并由唯一索引兜底去重。
pub struct RelationshipKey;

impl RelationshipKey {
    /// 生成规范 pair_key，形如 `college:3|student:42`
    ///
    /// 排序按 (actor_type 字符串, id) 字典序，保证与方向无关
    pub fn canonical(a: ActorRef, b: ActorRef) -> String {
        let ka = (a.actor_type.as_str(), a.id);
        let kb = (b.actor_type.as_str(), b.id);
        if ka <= kb {
            format!("{}|{}", a.encode(), b.encode())
        } else {
            format!("{}|{}", b.encode(), a.encode())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActorType;

    #[test]
    fn test_only_pending_can_transition() {
        assert!(PingStatus::Pending.can_transition_to(PingStatus::Accepted));
        assert!(PingStatus::Pending.can_transition_to(PingStatus::Declined));
        assert!(PingStatus::Pending.can_transition_to(PingStatus::Ignored));
        assert!(!PingStatus::Pending.can_transition_to(PingStatus::Pending));

        // 终态不允许任何流转，包括二次 accept
        for terminal in [
            PingStatus::Accepted,
            PingStatus::Declined,
            PingStatus::Ignored,
        ] {
            assert!(terminal.is_terminal());
            for target in [
                PingStatus::Pending,
                PingStatus::Accepted,
                PingStatus::Declined,
                PingStatus::Ignored,
            ] {
                assert!(
                    !terminal.can_transition_to(target),
                    "{:?} -> {:?} 不应合法",
                    terminal,
                    target
                );
            }
        }
    }

    #[test]
    fn test_ignored_hidden_from_sender() {
        assert_eq!(
            PingStatus::Ignored.as_seen_by_sender(),
            PingStatus::Pending
        );
        assert_eq!(
            PingStatus::Declined.as_seen_by_sender(),
            PingStatus::Declined
        );
        assert_eq!(
            PingStatus::Accepted.as_seen_by_sender(),
            PingStatus::Accepted
        );
    }

    #[test]
    fn test_pair_key_direction_independent() {
        let a = ActorRef::new(42, ActorType::Student);
        let b = ActorRef::new(3, ActorType::College);

        let forward = RelationshipKey::canonical(a, b);
        let backward = RelationshipKey::canonical(b, a);

        assert_eq!(forward, backward);
        assert_eq!(forward, "college:3|student:42");
    }

    #[test]
    fn test_pair_key_same_type_ordered_by_id() {
        let a = ActorRef::new(9, ActorType::Student);
        let b = ActorRef::new(2, ActorType::Student);

        assert_eq!(RelationshipKey::canonical(a, b), "student:2|student:9");
        assert_eq!(
            RelationshipKey::canonical(a, b),
            RelationshipKey::canonical(b, a)
        );
    }

    #[test]
    fn test_pair_key_distinguishes_different_pairs() {
        let a = ActorRef::new(1, ActorType::Student);
        let b = ActorRef::new(2, ActorType::Student);
        let c = ActorRef::new(3, ActorType::Student);

        assert_ne!(
            RelationshipKey::canonical(a, b),
            RelationshipKey::canonical(a, c)
        );
    }
}
