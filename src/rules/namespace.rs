//! ルール種別とスコープから物理キーを導出する。
//!
//! `Servers` / `Groups` は保存上の独立したスコープではなく、
//! 単数形のキーへの書き込みを展開するための表記にすぎない。

use crate::rules::{RuleKind, Scope};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityLevel {
    Server,
    Group,
}

impl EntityLevel {
    pub const ALL: [EntityLevel; 2] = [EntityLevel::Server, EntityLevel::Group];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLevel::Server => "server",
            EntityLevel::Group => "group",
        }
    }
}

pub fn entity_key(kind: RuleKind, level: EntityLevel, name: &str) -> String {
    format!("{}:{}:{}", kind.base_key(), level.as_str(), name)
}

/// 書き込み/削除の対象となる物理キー。複数指定スコープはメンバーごとに1キー。
pub fn physical_keys(kind: RuleKind, scope: &Scope) -> Vec<String> {
    match scope {
        Scope::All => vec![kind.base_key().to_string()],
        Scope::Server(name) => vec![entity_key(kind, EntityLevel::Server, name.as_str())],
        Scope::Group(name) => vec![entity_key(kind, EntityLevel::Group, name.as_str())],
        Scope::Servers(names) => names
            .iter()
            .map(|name| entity_key(kind, EntityLevel::Server, name.as_str()))
            .collect(),
        Scope::Groups(names) => names
            .iter()
            .map(|name| entity_key(kind, EntityLevel::Group, name.as_str()))
            .collect(),
    }
}

/// プレフィックススキャン用のパターン (`{base}:server:*` など)
pub fn scan_pattern(kind: RuleKind, level: EntityLevel) -> String {
    format!("{}:{}:*", kind.base_key(), level.as_str())
}

/// スキャンで見つかったキーからサーバーID/グループ名を取り出す。
pub fn entity_suffix(kind: RuleKind, level: EntityLevel, key: &str) -> Option<String> {
    let prefix = format!("{}:{}:", kind.base_key(), level.as_str());
    key.strip_prefix(&prefix)
        .filter(|suffix| !suffix.is_empty())
        .map(str::to_string)
}
