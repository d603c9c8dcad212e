use crate::rules::RuleKind;
use crate::storage::models::AuditRecord;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOwner {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub owner: RuleOwner,
    /// 所有者を決めたレコードのコメント
    pub comment: String,
}

/// 監査履歴から導出した `(種別, 値) -> 作成者` の対応。
///
/// 保存された状態ではなく毎回作り直す派生ビュー。ログが削除されていると
/// 実際のメンバーシップとずれることがある。
#[derive(Debug, Default)]
pub struct OwnershipIndex {
    entries: HashMap<(RuleKind, String), Ownership>,
}

impl OwnershipIndex {
    /// `history` は新しい順であること。キーごとに最初に現れたレコードを採用する。
    pub fn from_history(history: &[AuditRecord]) -> Self {
        let mut entries = HashMap::new();
        for record in history {
            let Some(verb) = record.verb().filter(|verb| verb.is_creating()) else {
                continue;
            };
            let Some(member) = record.rule_member() else {
                continue;
            };
            entries.entry((verb.kind, member)).or_insert_with(|| Ownership {
                owner: RuleOwner {
                    id: record.actor_user_id,
                    name: record.actor_name.clone(),
                },
                comment: record.comment.clone(),
            });
        }
        Self { entries }
    }

    pub fn lookup(&self, kind: RuleKind, member: &str) -> Option<&Ownership> {
        self.entries.get(&(kind, member.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
