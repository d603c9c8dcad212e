use serde::{Deserialize, Serialize};

/// 変更操作を行った認証済みの操作者。
/// 認証自体は呼び出し側の責務で、ここでは監査ログに残す値だけを持つ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub name: String,
    pub ip: String,
    pub user_agent: String,
}

/// 一覧を閲覧する側の権限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub id: i64,
    pub superadmin: bool,
}

impl Actor {
    pub fn viewer(&self, superadmin: bool) -> Viewer {
        Viewer {
            id: self.id,
            superadmin,
        }
    }
}
