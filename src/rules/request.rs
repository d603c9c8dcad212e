//! 境界で受け取ったフォーム値を要素操作の列に展開する。
//!
//! 検証はすべて展開前に終わらせる。1つでも不正な値があればリクエスト全体を
//! 拒否し、キャッシュにも監査ログにも何も書かない。

use crate::rules::value::{parse_ip, parse_port};
use crate::rules::{
    Direction, ElementaryRule, PortSpec, Scope, ScopeFields, ValidationError, ValueShape, Verb,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::hash::Hash;
use std::net::IpAddr;

/// 単一操作フォーム。`ip` と `port` はカンマ区切りのリストでもよい。
#[derive(Debug, Clone, Default)]
pub struct RuleForm {
    pub ip: Option<String>,
    pub port: Option<String>,
    pub comment: Option<String>,
    pub scope: ScopeFields,
}

/// 一括フォーム。`entries` (JSON配列) が優先され、空ならレガシーCSVを見る。
#[derive(Debug, Clone, Default)]
pub struct BulkForm {
    pub entries: Option<String>,
    pub pairs: Option<String>,
    pub ips: Option<String>,
    pub ports: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryOp {
    pub verb: Verb,
    pub rule: ElementaryRule,
    pub scope: Scope,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleRequest {
    pub verb: Verb,
    pub rules: Vec<ElementaryRule>,
    pub scope: Scope,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRequest {
    pub verb: Verb,
    pub entries: Vec<(ElementaryRule, Scope)>,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleRequest {
    Single(SingleRequest),
    Bulk(BulkRequest),
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    ip: Option<serde_json::Value>,
    #[serde(default)]
    port: Option<serde_json::Value>,
    #[serde(default)]
    target_type: Option<String>,
    #[serde(default)]
    target_value: Option<String>,
}

fn default_comment(verb: Verb, bulk: bool) -> String {
    match (verb.direction, bulk) {
        (Direction::Add, false) => "added from dashboard".to_string(),
        (Direction::Remove, false) => "removed from dashboard".to_string(),
        (Direction::Add, true) => "bulk added from dashboard".to_string(),
        (Direction::Remove, true) => "bulk removed from dashboard".to_string(),
    }
}

fn comment_or_default(comment: &Option<String>, verb: Verb, bulk: bool) -> String {
    comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_comment(verb, bulk))
}

/// 順序を保ったまま重複を取り除く
fn dedup<T: Clone + Eq + Hash>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

fn split_list(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_ip_list(raw: &Option<String>) -> Result<Vec<IpAddr>, ValidationError> {
    let tokens = split_list(raw);
    if tokens.is_empty() {
        return Err(ValidationError::InvalidIp(String::new()));
    }
    let ips = tokens.iter().map(|t| parse_ip(t)).collect::<Result<Vec<_>, _>>()?;
    Ok(dedup(ips))
}

fn parse_port_list(raw: &Option<String>, allow_range: bool) -> Result<Vec<PortSpec>, ValidationError> {
    let tokens = split_list(raw);
    if tokens.is_empty() {
        return Err(ValidationError::InvalidPort(String::new()));
    }
    let ports = tokens
        .iter()
        .map(|t| {
            if allow_range {
                t.parse::<PortSpec>()
            } else {
                parse_port(t).map(PortSpec::Single)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dedup(ports))
}

/// JSONの値を文字列として取り出す。数値のポートも受け付ける。
fn json_text(value: &Option<serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

fn entry_rule(shape: ValueShape, ip: &str, port: &str) -> Result<ElementaryRule, ValidationError> {
    match shape {
        ValueShape::Ip => parse_ip(ip).map(ElementaryRule::Ip),
        ValueShape::Port => port.parse::<PortSpec>().map(ElementaryRule::Port),
        ValueShape::IpPort => {
            let ip = parse_ip(ip)?;
            let port = parse_port(port)?;
            Ok(ElementaryRule::IpPort { ip, port })
        }
    }
}

impl SingleRequest {
    pub fn parse(verb: Verb, form: &RuleForm) -> Result<Self, ValidationError> {
        let scope = form.scope.resolve()?;

        let rules = match verb.kind.shape() {
            ValueShape::Ip => parse_ip_list(&form.ip)?
                .into_iter()
                .map(ElementaryRule::Ip)
                .collect(),
            ValueShape::Port => parse_port_list(&form.port, true)?
                .into_iter()
                .map(ElementaryRule::Port)
                .collect(),
            ValueShape::IpPort => {
                let ips = parse_ip_list(&form.ip)?;
                let ports = parse_port_list(&form.port, false)?;
                // IP × ポートの直積
                ips.iter()
                    .flat_map(|ip| {
                        ports.iter().filter_map(move |spec| {
                            spec.single().map(|port| ElementaryRule::IpPort { ip: *ip, port })
                        })
                    })
                    .collect()
            }
        };

        Ok(Self {
            verb,
            rules,
            scope,
            comment: comment_or_default(&form.comment, verb, false),
        })
    }
}

impl BulkRequest {
    pub fn parse(verb: Verb, form: &BulkForm) -> Result<Self, ValidationError> {
        let mut raw_entries = match form.entries.as_deref().map(str::trim) {
            Some(json) if !json.is_empty() => serde_json::from_str::<Vec<RawEntry>>(json)
                .map_err(|e| ValidationError::InvalidEntries(e.to_string()))?,
            _ => Vec::new(),
        };
        if raw_entries.is_empty() {
            raw_entries = Self::legacy_entries(verb, form)?;
        }
        if raw_entries.is_empty() {
            return Err(ValidationError::NoEntries);
        }

        let shape = verb.kind.shape();
        let entries = raw_entries
            .iter()
            .map(|entry| -> Result<(ElementaryRule, Scope), ValidationError> {
                let rule = entry_rule(shape, &json_text(&entry.ip), &json_text(&entry.port))?;
                let scope = Scope::from_target(
                    entry.target_type.as_deref().unwrap_or("all"),
                    entry.target_value.as_deref().unwrap_or(""),
                )?;
                Ok((rule, scope))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            verb,
            entries,
            comment: comment_or_default(&form.comment, verb, true),
        })
    }

    /// `pairs` / `ips` / `ports` のレガシー形式。常に全体スコープ。
    fn legacy_entries(verb: Verb, form: &BulkForm) -> Result<Vec<RawEntry>, ValidationError> {
        let text = |s: &str| Some(serde_json::Value::String(s.to_string()));
        let entry = |ip: Option<serde_json::Value>, port: Option<serde_json::Value>| RawEntry {
            ip,
            port,
            target_type: None,
            target_value: None,
        };

        match verb.kind.shape() {
            ValueShape::Ip => Ok(split_list(&form.ips)
                .iter()
                .map(|ip| entry(text(ip), None))
                .collect()),
            ValueShape::Port => Ok(split_list(&form.ports)
                .iter()
                .map(|port| entry(None, text(port)))
                .collect()),
            ValueShape::IpPort => split_list(&form.pairs)
                .iter()
                .map(|pair| -> Result<RawEntry, ValidationError> {
                    // IPv6でも末尾の区切りでポートを切り出す
                    let (ip, port) = pair
                        .rsplit_once(':')
                        .ok_or_else(|| ValidationError::InvalidPair(pair.clone()))?;
                    Ok(entry(text(ip), text(port)))
                })
                .collect(),
        }
    }
}

impl RuleRequest {
    pub fn verb(&self) -> Verb {
        match self {
            RuleRequest::Single(request) => request.verb,
            RuleRequest::Bulk(request) => request.verb,
        }
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, RuleRequest::Bulk(_))
    }

    /// 要素操作への展開。以降、各操作は独立して扱われる。
    pub fn into_ops(self) -> Vec<ElementaryOp> {
        match self {
            RuleRequest::Single(request) => request
                .rules
                .into_iter()
                .map(|rule| ElementaryOp {
                    verb: request.verb,
                    rule,
                    scope: request.scope.clone(),
                    comment: request.comment.clone(),
                })
                .collect(),
            RuleRequest::Bulk(request) => request
                .entries
                .into_iter()
                .map(|(rule, scope)| ElementaryOp {
                    verb: request.verb,
                    rule,
                    scope,
                    comment: request.comment.clone(),
                })
                .collect(),
        }
    }
}
