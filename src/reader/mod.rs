//! キャッシュ上の全セットから現在有効なルール一覧を組み立てる読み取り側。

pub mod ownership;

pub use ownership::{OwnershipIndex, RuleOwner};

use crate::cache::{CacheError, RuleCache};
use crate::core::Viewer;
use crate::rules::namespace::{entity_suffix, scan_pattern};
use crate::rules::{EntityLevel, RuleKind};
use crate::storage::AuditStore;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleTarget {
    All,
    Server,
    Group,
}

impl From<EntityLevel> for RuleTarget {
    fn from(level: EntityLevel) -> Self {
        match level {
            EntityLevel::Server => RuleTarget::Server,
            EntityLevel::Group => RuleTarget::Group,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedRule {
    pub value: String,
    pub target: RuleTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_value: Option<String>,
    pub owner: Option<RuleOwner>,
    pub comment: Option<String>,
}

pub type RuleListing = BTreeMap<RuleKind, Vec<ListedRule>>;

pub struct RuleReader {
    cache: Arc<dyn RuleCache>,
    audit: Arc<dyn AuditStore>,
}

impl RuleReader {
    pub fn new(cache: Arc<dyn RuleCache>, audit: Arc<dyn AuditStore>) -> Self {
        Self { cache, audit }
    }

    /// 種別ごとの一覧。全体セットの読み込み失敗だけはエラーとして返す。
    pub async fn list(&self, viewer: Viewer) -> Result<RuleListing, CacheError> {
        let ownership = self.ownership().await;
        let mut listing = RuleListing::new();

        for kind in RuleKind::ALL {
            let mut rules = Vec::new();

            let mut global = self.cache.members(kind.base_key()).await?;
            global.sort();
            for value in global {
                rules.push(self.annotate(&ownership, kind, value, RuleTarget::All, None));
            }

            for level in EntityLevel::ALL {
                for (name, members) in self.scoped_members(kind, level).await {
                    for value in members {
                        rules.push(self.annotate(
                            &ownership,
                            kind,
                            value,
                            level.into(),
                            Some(name.clone()),
                        ));
                    }
                }
            }

            if !viewer.superadmin {
                rules.retain(|rule| rule.owner.as_ref().map(|o| o.id) == Some(viewer.id));
            }
            debug!("{:?}: {}件", kind, rules.len());
            listing.insert(kind, rules);
        }

        Ok(listing)
    }

    fn annotate(
        &self,
        ownership: &OwnershipIndex,
        kind: RuleKind,
        value: String,
        target: RuleTarget,
        target_value: Option<String>,
    ) -> ListedRule {
        let found = ownership.lookup(kind, &value);
        ListedRule {
            owner: found.map(|o| o.owner.clone()),
            comment: found.map(|o| o.comment.clone()),
            value,
            target,
            target_value,
        }
    }

    async fn ownership(&self) -> OwnershipIndex {
        match self.audit.creation_history().await {
            Ok(history) => {
                let index = OwnershipIndex::from_history(&history);
                debug!("所有者情報: {}件 (履歴 {}件)", index.len(), history.len());
                index
            }
            Err(e) => {
                warn!("作成履歴を読み込めないため所有者なしとして扱います: {}", e);
                OwnershipIndex::default()
            }
        }
    }

    /// スキャンや個別キーの読み込みに失敗した場合はそのスコープを空として扱う
    async fn scoped_members(&self, kind: RuleKind, level: EntityLevel) -> Vec<(String, Vec<String>)> {
        let pattern = scan_pattern(kind, level);
        let keys = match self.cache.scan_keys(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("{} のスキャンに失敗しました: {}", pattern, e);
                return Vec::new();
            }
        };

        let mut scoped = Vec::new();
        for key in keys {
            let Some(name) = entity_suffix(kind, level, &key) else {
                continue;
            };
            match self.cache.members(&key).await {
                Ok(mut members) => {
                    members.sort();
                    scoped.push((name, members));
                }
                Err(e) => warn!("{} を読み込めませんでした: {}", key, e),
            }
        }
        scoped
    }
}
