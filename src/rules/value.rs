use crate::rules::ValidationError;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

pub const MIN_PORT: u16 = 1;
pub const MAX_PORT: u16 = 65535;

/// 単一ポートまたは `from-to` 形式のポート範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortSpec {
    Single(u16),
    Range { from: u16, to: u16 },
}

/// 1つのルール種別に対する具体的な値
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementaryRule {
    Ip(IpAddr),
    Port(PortSpec),
    IpPort { ip: IpAddr, port: u16 },
}

fn parse_port_number(s: &str) -> Option<u16> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // 桁数が多すぎる入力はu16への変換で弾かれる
    let n: u16 = s.parse().ok()?;
    (MIN_PORT..=MAX_PORT).contains(&n).then_some(n)
}

pub fn parse_ip(raw: &str) -> Result<IpAddr, ValidationError> {
    raw.trim()
        .parse::<IpAddr>()
        .map_err(|_| ValidationError::InvalidIp(raw.trim().to_string()))
}

pub fn parse_port(raw: &str) -> Result<u16, ValidationError> {
    parse_port_number(raw).ok_or_else(|| ValidationError::InvalidPort(raw.trim().to_string()))
}

impl PortSpec {
    pub fn single(&self) -> Option<u16> {
        match self {
            PortSpec::Single(port) => Some(*port),
            PortSpec::Range { .. } => None,
        }
    }

    pub fn range(&self) -> Option<(u16, u16)> {
        match self {
            PortSpec::Single(_) => None,
            PortSpec::Range { from, to } => Some((*from, *to)),
        }
    }
}

impl FromStr for PortSpec {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        let invalid = || ValidationError::InvalidPort(s.to_string());

        match s.split_once('-') {
            None => parse_port_number(s).map(PortSpec::Single).ok_or_else(invalid),
            Some((a, b)) => {
                let from = parse_port_number(a).ok_or_else(invalid)?;
                let to = parse_port_number(b).ok_or_else(invalid)?;
                if from > to {
                    return Err(invalid());
                }
                Ok(PortSpec::Range { from, to })
            }
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Single(port) => write!(f, "{}", port),
            PortSpec::Range { from, to } => write!(f, "{}-{}", from, to),
        }
    }
}

impl ElementaryRule {
    /// メンバーシップセットに格納される文字列
    pub fn member(&self) -> String {
        match self {
            ElementaryRule::Ip(ip) => ip.to_string(),
            ElementaryRule::Port(port) => port.to_string(),
            ElementaryRule::IpPort { ip, port } => format!("{}:{}", ip, port),
        }
    }

    /// イベントメッセージ内の値部分。IP:ポートは2トークンになる。
    pub fn event_tokens(&self) -> String {
        match self {
            ElementaryRule::IpPort { ip, port } => format!("{} {}", ip, port),
            other => other.member(),
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            ElementaryRule::Ip(ip) | ElementaryRule::IpPort { ip, .. } => Some(*ip),
            ElementaryRule::Port(_) => None,
        }
    }

    pub fn port(&self) -> Option<PortSpec> {
        match self {
            ElementaryRule::Port(spec) => Some(*spec),
            ElementaryRule::IpPort { port, .. } => Some(PortSpec::Single(*port)),
            ElementaryRule::Ip(_) => None,
        }
    }
}

impl fmt::Display for ElementaryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.member())
    }
}
