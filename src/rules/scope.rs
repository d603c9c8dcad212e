use crate::rules::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const MAX_SCOPE_NAME_LEN: usize = 64;

/// サーバーIDまたはグループ名。`^[A-Za-z0-9_.-]{1,64}$` に一致するものだけが作られる。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ScopeName(String);

impl ScopeName {
    pub fn parse(raw: &str) -> Option<Self> {
        let name = raw.trim();
        let valid = !name.is_empty()
            && name.len() <= MAX_SCOPE_NAME_LEN
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));
        valid.then(|| ScopeName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Server(ScopeName),
    Servers(BTreeSet<ScopeName>),
    Group(ScopeName),
    Groups(BTreeSet<ScopeName>),
}

/// リクエストから受け取った生のスコープ欄
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeFields {
    pub target_server: Option<String>,
    pub target_servers: Option<String>,
    pub target_group: Option<String>,
    pub target_groups: Option<String>,
}

/// 監査ログ上のスコープ列。設定されるのは高々1つ。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditScope {
    pub target_server: Option<String>,
    pub target_servers: Option<String>,
    pub target_group: Option<String>,
    pub target_groups: Option<String>,
}

fn present(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn resolve_name(field: &'static str, raw: &Option<String>) -> Result<Option<ScopeName>, ValidationError> {
    match present(raw) {
        None => Ok(None),
        Some(value) => ScopeName::parse(value)
            .map(Some)
            .ok_or_else(|| ValidationError::InvalidScope {
                field,
                value: value.to_string(),
            }),
    }
}

/// カンマ区切りのリストを分割・トリム・重複除去し、全要素を検証する。
/// 空要素しかない場合は未指定として扱う。
fn resolve_list(
    field: &'static str,
    raw: &Option<String>,
) -> Result<Option<BTreeSet<ScopeName>>, ValidationError> {
    let Some(csv) = present(raw) else {
        return Ok(None);
    };

    let mut names = BTreeSet::new();
    for token in csv.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let name = ScopeName::parse(token).ok_or_else(|| ValidationError::InvalidScope {
            field,
            value: token.to_string(),
        })?;
        names.insert(name);
    }

    Ok((!names.is_empty()).then_some(names))
}

fn join(names: &BTreeSet<ScopeName>) -> String {
    names
        .iter()
        .map(ScopeName::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

impl ScopeFields {
    /// 全ての指定欄を検証してから、優先順位
    /// `server > servers > group > groups > all` で1つのスコープを選ぶ。
    pub fn resolve(&self) -> Result<Scope, ValidationError> {
        let server = resolve_name("target_server", &self.target_server)?;
        let group = resolve_name("target_group", &self.target_group)?;
        let servers = resolve_list("target_servers", &self.target_servers)?;
        let groups = resolve_list("target_groups", &self.target_groups)?;

        let scope = if let Some(name) = server {
            Scope::Server(name)
        } else if let Some(names) = servers {
            Scope::Servers(names)
        } else if let Some(name) = group {
            Scope::Group(name)
        } else if let Some(names) = groups {
            Scope::Groups(names)
        } else {
            Scope::All
        };
        Ok(scope)
    }
}

impl Scope {
    /// 一括エントリの `target_type` / `target_value` から単一スコープを作る。
    /// `server` と `group` 以外の種別は全体扱い。
    pub fn from_target(target_type: &str, target_value: &str) -> Result<Scope, ValidationError> {
        let target_type = target_type.trim();
        let make = |wrap: fn(ScopeName) -> Scope| {
            ScopeName::parse(target_value)
                .map(wrap)
                .ok_or_else(|| ValidationError::InvalidTargetValue(target_type.to_string()))
        };
        match target_type {
            "server" => make(Scope::Server),
            "group" => make(Scope::Group),
            _ => Ok(Scope::All),
        }
    }

    /// イベント末尾の `@...` 部分。全体スコープでは付かない。
    pub fn event_suffix(&self) -> Option<String> {
        match self {
            Scope::All => None,
            Scope::Server(name) => Some(format!("@server={}", name)),
            Scope::Servers(names) => Some(format!("@servers={}", join(names))),
            Scope::Group(name) => Some(format!("@group={}", name)),
            Scope::Groups(names) => Some(format!("@groups={}", join(names))),
        }
    }

    pub fn audit_fields(&self) -> AuditScope {
        let mut fields = AuditScope::default();
        match self {
            Scope::All => {}
            Scope::Server(name) => fields.target_server = Some(name.to_string()),
            Scope::Servers(names) => fields.target_servers = Some(join(names)),
            Scope::Group(name) => fields.target_group = Some(name.to_string()),
            Scope::Groups(names) => fields.target_groups = Some(join(names)),
        }
        fields
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event_suffix() {
            Some(suffix) => f.write_str(&suffix),
            None => f.write_str("@all"),
        }
    }
}
