use crate::rules::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// キャッシュ上のキー名前空間の接頭辞
pub const KEY_PREFIX: &str = "fw";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    #[serde(rename = "blocked_ips")]
    BlockedIp,
    #[serde(rename = "blocked_ports")]
    BlockedPort,
    #[serde(rename = "allowed_ports")]
    AllowedPort,
    #[serde(rename = "blocked_ip_ports")]
    BlockedIpPort,
    #[serde(rename = "allowed_ip_ports")]
    AllowedIpPort,
}

/// ルール種別ごとに要求される値の形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Ip,
    Port,
    IpPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Add,
    Remove,
}

impl RuleKind {
    pub const ALL: [RuleKind; 5] = [
        RuleKind::BlockedIp,
        RuleKind::BlockedPort,
        RuleKind::AllowedPort,
        RuleKind::BlockedIpPort,
        RuleKind::AllowedIpPort,
    ];

    /// グローバルキー。サーバー/グループ別キーはこれを基底にする。
    pub fn base_key(&self) -> &'static str {
        match self {
            RuleKind::BlockedIp => "fw:black_ips",
            RuleKind::BlockedPort => "fw:block:ports",
            RuleKind::AllowedPort => "fw:allow:ports",
            RuleKind::BlockedIpPort => "fw:block:ipports",
            RuleKind::AllowedIpPort => "fw:allow:ipports",
        }
    }

    pub fn shape(&self) -> ValueShape {
        match self {
            RuleKind::BlockedIp => ValueShape::Ip,
            RuleKind::BlockedPort | RuleKind::AllowedPort => ValueShape::Port,
            RuleKind::BlockedIpPort | RuleKind::AllowedIpPort => ValueShape::IpPort,
        }
    }

    pub fn verb(&self, direction: Direction) -> Verb {
        Verb {
            kind: *self,
            direction,
        }
    }
}

/// イベントの動詞であり、監査ログの `action` でもある。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Verb {
    pub kind: RuleKind,
    pub direction: Direction,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match (self.kind, self.direction) {
            (RuleKind::BlockedIp, Direction::Add) => "ban_ip",
            (RuleKind::BlockedIp, Direction::Remove) => "unban_ip",
            (RuleKind::BlockedPort, Direction::Add) => "block_port",
            (RuleKind::BlockedPort, Direction::Remove) => "unblock_port",
            (RuleKind::AllowedPort, Direction::Add) => "allow_port",
            (RuleKind::AllowedPort, Direction::Remove) => "unallow_port",
            (RuleKind::BlockedIpPort, Direction::Add) => "block_ipport",
            (RuleKind::BlockedIpPort, Direction::Remove) => "unblock_ipport",
            (RuleKind::AllowedIpPort, Direction::Add) => "allow_ipport",
            (RuleKind::AllowedIpPort, Direction::Remove) => "unallow_ipport",
        }
    }

    pub fn is_creating(&self) -> bool {
        self.direction == Direction::Add
    }

    pub fn all() -> impl Iterator<Item = Verb> {
        RuleKind::ALL.into_iter().flat_map(|kind| {
            [Direction::Add, Direction::Remove]
                .into_iter()
                .map(move |direction| kind.verb(direction))
        })
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Verb::all()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVerb(s.to_string()))
    }
}
