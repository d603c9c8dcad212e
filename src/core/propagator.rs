use crate::cache::{CacheError, RuleCache};
use crate::core::actor::Actor;
use crate::rules::{event, namespace, Direction, ElementaryOp};
use crate::storage::models::AuditRecord;
use crate::storage::{AuditError, AuditStore};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// 要素操作1件の結果
#[derive(Debug)]
pub struct PropagationOutcome {
    pub keys: Vec<String>,
    pub event: String,
    /// 全キーへの書き込みとイベント発行
    pub cache: Result<(), CacheError>,
    pub audit: Result<(), AuditError>,
}

impl PropagationOutcome {
    pub fn cache_applied(&self) -> bool {
        self.cache.is_ok()
    }

    pub fn succeeded(&self) -> bool {
        self.cache.is_ok() && self.audit.is_ok()
    }
}

/// ルール変更をキャッシュへ反映し、エージェントへ通知し、監査ログに残す。
pub struct RulePropagator {
    cache: Arc<dyn RuleCache>,
    audit: Arc<dyn AuditStore>,
    channel: String,
}

impl RulePropagator {
    pub fn new(cache: Arc<dyn RuleCache>, audit: Arc<dyn AuditStore>, channel: String) -> Self {
        Self {
            cache,
            audit,
            channel,
        }
    }

    pub async fn propagate(&self, op: &ElementaryOp, actor: &Actor) -> PropagationOutcome {
        let keys = namespace::physical_keys(op.verb.kind, &op.scope);
        let event = event::encode(op.verb, &op.rule, &op.scope);

        let cache = self.apply(op, &keys, &event).await;
        let error_msg = cache.as_ref().err().map(|e| e.to_string());
        if let Some(msg) = &error_msg {
            error!("ルールの反映に失敗しました ({}): {}", event, msg);
        }

        let record = AuditRecord::for_operation(op, actor, error_msg.as_deref());
        let audit = self.audit.insert(&record).await;
        if let Err(e) = &audit {
            error!("監査ログを書き込めませんでした ({}): {}", event, e);
        }

        PropagationOutcome {
            keys,
            event,
            cache,
            audit,
        }
    }

    /// 各操作は独立しており、失敗しても残りの操作は続行する
    pub async fn propagate_all(&self, ops: &[ElementaryOp], actor: &Actor) -> Vec<PropagationOutcome> {
        let mut outcomes = Vec::with_capacity(ops.len());
        for op in ops {
            outcomes.push(self.propagate(op, actor).await);
        }
        outcomes
    }

    async fn apply(&self, op: &ElementaryOp, keys: &[String], event: &str) -> Result<(), CacheError> {
        let member = op.rule.member();
        let writes = keys.iter().map(|key| {
            let member = member.as_str();
            async move {
                let changed = match op.verb.direction {
                    Direction::Add => self.cache.add_member(key, member).await?,
                    Direction::Remove => self.cache.remove_member(key, member).await?,
                };
                debug!("{} {} -> {} (変更: {})", op.verb, member, key, changed);
                Ok::<(), CacheError>(())
            }
        });

        let results = join_all(writes).await;
        let failures: Vec<CacheError> = results.into_iter().filter_map(Result::err).collect();
        if let Some(first) = failures.first() {
            // 反映済みのキーは戻さない
            warn!(
                "{}件中{}件のキーへの書き込みに失敗したためイベントを発行しません",
                keys.len(),
                failures.len()
            );
            return Err(first.clone());
        }

        self.cache.publish(&self.channel, event).await?;
        info!("{} に発行しました: {} (キー: {})", self.channel, event, keys.join(", "));
        Ok(())
    }
}
