use crate::core::actor::Actor;
use crate::rules::{AuditScope, ElementaryOp, PortSpec, RuleKind, ValueShape, Verb};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// エラーメッセージの保存上限 (文字数)
pub const MAX_ERROR_LEN: usize = 100;
/// ユーザーエージェントの保存上限 (文字数)
pub const MAX_USER_AGENT_LEN: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR")]
    Err,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "OK",
            AuditStatus::Err => "ERR",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("OK") {
            AuditStatus::Ok
        } else {
            AuditStatus::Err
        }
    }
}

/// 変更操作1回ごとに1行。成功・失敗を問わず書き込まれ、更新も削除もされない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Option<i64>,
    pub action: String,
    pub target_ip: Option<String>,
    pub target_port: Option<i32>,
    pub target_port_from: Option<i32>,
    pub target_port_to: Option<i32>,
    pub comment: String,
    #[serde(flatten)]
    pub scope: AuditScope,
    pub actor_user_id: i64,
    pub actor_name: String,
    pub actor_ip: String,
    pub user_agent: String,
    pub status: AuditStatus,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total_actions: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub unique_ips: i64,
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl AuditRecord {
    /// 要素操作の結果から監査レコードを組み立てる。
    /// `error` が `None` ならキャッシュ段階は完全に成功している。
    pub fn for_operation(op: &ElementaryOp, actor: &Actor, error: Option<&str>) -> Self {
        let port = op.rule.port();
        let (port_from, port_to) = match port.and_then(|p| p.range()) {
            Some((from, to)) => (Some(from as i32), Some(to as i32)),
            None => (None, None),
        };

        Self {
            id: None,
            action: op.verb.as_str().to_string(),
            target_ip: op.rule.ip().map(|ip| ip.to_string()),
            target_port: port.and_then(|p| p.single()).map(i32::from),
            target_port_from: port_from,
            target_port_to: port_to,
            comment: op.comment.clone(),
            scope: op.scope.audit_fields(),
            actor_user_id: actor.id,
            actor_name: actor.name.clone(),
            actor_ip: actor.ip.clone(),
            user_agent: truncate_chars(&actor.user_agent, MAX_USER_AGENT_LEN),
            status: if error.is_none() { AuditStatus::Ok } else { AuditStatus::Err },
            error_msg: error.map(|e| truncate_chars(e, MAX_ERROR_LEN)),
            created_at: Utc::now(),
        }
    }

    pub fn verb(&self) -> Option<Verb> {
        self.action.parse().ok()
    }

    pub fn kind(&self) -> Option<RuleKind> {
        self.verb().map(|verb| verb.kind)
    }

    pub fn port_spec(&self) -> Option<PortSpec> {
        let in_range = |p: i32| u16::try_from(p).ok();
        match (self.target_port, self.target_port_from, self.target_port_to) {
            (Some(port), _, _) => in_range(port).map(PortSpec::Single),
            (None, Some(from), Some(to)) => Some(PortSpec::Range {
                from: in_range(from)?,
                to: in_range(to)?,
            }),
            _ => None,
        }
    }

    /// このレコードが対象としたメンバーシップセット上の値
    pub fn rule_member(&self) -> Option<String> {
        match self.kind()?.shape() {
            ValueShape::Ip => self.target_ip.clone(),
            ValueShape::Port => self.port_spec().map(|spec| spec.to_string()),
            ValueShape::IpPort => {
                let ip = self.target_ip.as_ref()?;
                let port = self.port_spec()?.single()?;
                Some(format!("{}:{}", ip, port))
            }
        }
    }

    /// スコープ列のうち設定されている数
    #[cfg(test)]
    pub fn scope_field_count(&self) -> usize {
        [
            &self.scope.target_server,
            &self.scope.target_servers,
            &self.scope.target_group,
            &self.scope.target_groups,
        ]
        .iter()
        .filter(|field| field.is_some())
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Direction, ElementaryRule, Scope, ScopeName};

    fn actor() -> Actor {
        Actor {
            id: 7,
            name: "kim".to_string(),
            ip: "192.0.2.10".to_string(),
            user_agent: "x".repeat(300),
        }
    }

    fn op(kind: RuleKind, rule: ElementaryRule, scope: Scope) -> ElementaryOp {
        ElementaryOp {
            verb: kind.verb(Direction::Add),
            rule,
            scope,
            comment: "test".to_string(),
        }
    }

    #[test]
    fn test_range_record_uses_range_columns() {
        let op = op(
            RuleKind::AllowedPort,
            ElementaryRule::Port(PortSpec::Range { from: 20000, to: 30000 }),
            Scope::All,
        );
        let record = AuditRecord::for_operation(&op, &actor(), None);
        assert_eq!(record.action, "allow_port");
        assert_eq!(record.target_port, None);
        assert_eq!(record.target_port_from, Some(20000));
        assert_eq!(record.target_port_to, Some(30000));
        assert_eq!(record.rule_member().as_deref(), Some("20000-30000"));
        assert_eq!(record.status, AuditStatus::Ok);
        assert_eq!(record.user_agent.chars().count(), MAX_USER_AGENT_LEN);
    }

    #[test]
    fn test_error_message_is_truncated() {
        let op = op(
            RuleKind::BlockedIpPort,
            ElementaryRule::IpPort {
                ip: "10.0.0.1".parse().unwrap(),
                port: 22,
            },
            Scope::Server(ScopeName::parse("db01").unwrap()),
        );
        let long = "エ".repeat(150);
        let record = AuditRecord::for_operation(&op, &actor(), Some(&long));
        assert_eq!(record.status, AuditStatus::Err);
        assert_eq!(record.error_msg.as_ref().map(|e| e.chars().count()), Some(MAX_ERROR_LEN));
        assert_eq!(record.rule_member().as_deref(), Some("10.0.0.1:22"));
        assert_eq!(record.scope.target_server.as_deref(), Some("db01"));
        assert_eq!(record.scope_field_count(), 1);
    }

    #[test]
    fn test_status_serializes_as_wire_value() {
        assert_eq!(serde_json::to_string(&AuditStatus::Err).unwrap(), "\"ERR\"");
        assert_eq!(AuditStatus::parse("ok"), AuditStatus::Ok);
        assert_eq!(AuditStatus::parse("ERR").as_str(), "ERR");
    }
}
