//! 変更リクエストを実行し、`{ok, err?, warning?, affected?}` 形式の応答にまとめる。

use crate::core::{Actor, PropagationOutcome, RulePropagator, Viewer};
use crate::rules::{BulkForm, BulkRequest, RuleForm, RuleRequest, SingleRequest, ValidationError, Verb};
use crate::storage::models::{truncate_chars, AuditRecord, AuditStats, MAX_ERROR_LEN};
use crate::storage::{AuditError, AuditStore};
use chrono::{Duration, Utc};
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected: Option<usize>,
}

impl ApiResponse {
    pub fn success() -> Self {
        Self {
            ok: true,
            err: None,
            warning: None,
            affected: None,
        }
    }

    pub fn failure(err: impl Into<String>) -> Self {
        Self {
            ok: false,
            err: Some(err.into()),
            warning: None,
            affected: None,
        }
    }

    /// 検証エラーはワイヤーコードをそのまま返す
    pub fn rejected(err: &ValidationError) -> Self {
        Self::failure(err.to_string())
    }
}

/// 監査ログ画面の内容
#[derive(Debug, Serialize)]
pub struct AuditOverview {
    pub logs: Vec<AuditRecord>,
    /// 直近24時間
    pub stats: AuditStats,
}

/// 一般の操作者には自分の操作だけを見せる
pub async fn audit_overview(
    audit: &dyn AuditStore,
    viewer: Viewer,
    limit: i64,
) -> Result<AuditOverview, AuditError> {
    let actor = (!viewer.superadmin).then_some(viewer.id);
    let logs = audit.recent(actor, limit).await?;
    let stats = audit.stats_since(Utc::now() - Duration::hours(24), actor).await?;
    Ok(AuditOverview { logs, stats })
}

fn short_message(err: &impl ToString) -> String {
    truncate_chars(&err.to_string(), MAX_ERROR_LEN)
}

/// 単一操作フォームを検証する。ストアに触れる前に呼び、拒否ならそのまま応答を返す。
pub fn prepare(verb: &str, form: &RuleForm) -> Result<RuleRequest, ApiResponse> {
    let parsed = verb
        .parse::<Verb>()
        .and_then(|verb| SingleRequest::parse(verb, form));
    match parsed {
        Ok(request) => Ok(RuleRequest::Single(request)),
        Err(e) => {
            warn!("{} を拒否しました: {}", verb, e);
            Err(ApiResponse::rejected(&e))
        }
    }
}

/// 一括フォームを検証する
pub fn prepare_bulk(verb: &str, form: &BulkForm) -> Result<RuleRequest, ApiResponse> {
    let parsed = verb
        .parse::<Verb>()
        .and_then(|verb| BulkRequest::parse(verb, form));
    match parsed {
        Ok(request) => Ok(RuleRequest::Bulk(request)),
        Err(e) => {
            warn!("{} (一括) を拒否しました: {}", verb, e);
            Err(ApiResponse::rejected(&e))
        }
    }
}

pub async fn execute(propagator: &RulePropagator, request: RuleRequest, actor: &Actor) -> ApiResponse {
    let verb = request.verb();
    let bulk = request.is_bulk();
    let ops = request.into_ops();
    let outcomes = propagator.propagate_all(&ops, actor).await;
    for outcome in outcomes.iter().filter(|o| !o.succeeded()) {
        warn!("失敗した操作: {} (キー: {})", outcome.event, outcome.keys.join(", "));
    }

    let response = if bulk {
        summarize_bulk(&outcomes)
    } else if outcomes.len() == 1 {
        summarize_single(&outcomes[0])
    } else {
        summarize_expanded(&outcomes)
    };

    info!(
        "{} を実行しました: {}件中{}件成功 (操作者: {})",
        verb,
        outcomes.len(),
        outcomes.iter().filter(|o| o.succeeded()).count(),
        actor.name
    );
    response
}

fn first_cache_error(outcomes: &[PropagationOutcome]) -> Option<String> {
    outcomes
        .iter()
        .find_map(|o| o.cache.as_ref().err())
        .map(short_message)
}

fn first_audit_error(outcomes: &[PropagationOutcome]) -> Option<String> {
    outcomes
        .iter()
        .find_map(|o| o.audit.as_ref().err())
        .map(short_message)
}

fn summarize_single(outcome: &PropagationOutcome) -> ApiResponse {
    match (&outcome.cache, &outcome.audit) {
        (Err(e), _) => ApiResponse::failure(short_message(e)),
        (Ok(()), Err(e)) => ApiResponse::failure(short_message(e)),
        (Ok(()), Ok(())) => ApiResponse::success(),
    }
}

fn summarize_expanded(outcomes: &[PropagationOutcome]) -> ApiResponse {
    let affected = outcomes.iter().filter(|o| o.cache_applied()).count();
    let err = first_cache_error(outcomes).or_else(|| first_audit_error(outcomes));
    ApiResponse {
        ok: err.is_none(),
        err,
        warning: None,
        affected: Some(affected),
    }
}

/// 監査ログの失敗はエントリ単位で握りつぶし、警告として返す
fn summarize_bulk(outcomes: &[PropagationOutcome]) -> ApiResponse {
    let affected = outcomes.iter().filter(|o| o.cache_applied()).count();
    let err = first_cache_error(outcomes);
    let audit_failures = outcomes
        .iter()
        .filter(|o| o.cache_applied() && o.audit.is_err())
        .count();
    let warning = if audit_failures > 0 {
        first_audit_error(outcomes).map(|e| format!("audit failed for {} entries: {}", audit_failures, e))
    } else {
        None
    };
    ApiResponse {
        ok: err.is_none(),
        err,
        warning,
        affected: Some(affected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;
    use crate::cache::UnavailableCache;
    use crate::rules::{Direction, RuleKind, ScopeFields};
    use crate::storage::memory::MemoryAuditStore;
    use crate::storage::models::AuditStatus;
    use std::sync::Arc;

    fn actor() -> Actor {
        Actor {
            id: 3,
            name: "lee".to_string(),
            ip: "192.0.2.3".to_string(),
            user_agent: "test".to_string(),
        }
    }

    fn setup() -> (Arc<MemoryCache>, Arc<MemoryAuditStore>, RulePropagator) {
        let cache = Arc::new(MemoryCache::new());
        let audit = Arc::new(MemoryAuditStore::new());
        let propagator = RulePropagator::new(cache.clone(), audit.clone(), "fw:events".to_string());
        (cache, audit, propagator)
    }

    async fn apply(propagator: &RulePropagator, verb: Verb, form: &RuleForm, actor: &Actor) -> ApiResponse {
        match prepare(verb.as_str(), form) {
            Ok(request) => execute(propagator, request, actor).await,
            Err(response) => response,
        }
    }

    async fn apply_bulk(propagator: &RulePropagator, verb: Verb, form: &BulkForm, actor: &Actor) -> ApiResponse {
        match prepare_bulk(verb.as_str(), form) {
            Ok(request) => execute(propagator, request, actor).await,
            Err(response) => response,
        }
    }

    fn form(ip: &str, port: &str) -> RuleForm {
        RuleForm {
            ip: Some(ip.to_string()),
            port: Some(port.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_single_success_has_no_extra_fields() {
        let (cache, _, propagator) = setup();
        let verb = RuleKind::BlockedIp.verb(Direction::Add);
        let response = apply(&propagator, verb, &form("203.0.113.5", ""), &actor()).await;

        assert_eq!(response, ApiResponse::success());
        assert_eq!(serde_json::to_string(&response).unwrap(), r#"{"ok":true}"#);
        assert!(cache.set("fw:black_ips").await.contains("203.0.113.5"));
    }

    #[tokio::test]
    async fn test_validation_failure_writes_nothing() {
        let (cache, audit, propagator) = setup();
        let verb = RuleKind::BlockedIpPort.verb(Direction::Add);
        let mut bad = form("10.0.0.1,10.0.0.300", "22");
        bad.scope = ScopeFields {
            target_group: Some("seoul".to_string()),
            ..Default::default()
        };
        let response = apply(&propagator, verb, &bad, &actor()).await;

        assert!(!response.ok);
        assert_eq!(response.err.as_deref(), Some("invalid ip: 10.0.0.300"));
        assert!(cache.populated_keys().await.is_empty());
        assert!(cache.published().await.is_empty());
        assert!(audit.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_cartesian_expansion_reports_affected() {
        let (cache, audit, propagator) = setup();
        let verb = RuleKind::BlockedIpPort.verb(Direction::Add);
        let response = apply(&propagator, verb, &form("10.0.0.1,10.0.0.2", "22,3306"), &actor()).await;

        assert!(response.ok);
        assert_eq!(response.affected, Some(4));
        assert_eq!(cache.set("fw:block:ipports").await.len(), 4);
        assert_eq!(audit.records().await.len(), 4);
        assert_eq!(cache.published().await.len(), 4);
    }

    #[tokio::test]
    async fn test_single_cache_failure_is_audited_as_error() {
        let (cache, audit, propagator) = setup();
        cache.set_down(true).await;
        let verb = RuleKind::AllowedPort.verb(Direction::Add);
        let response = apply(&propagator, verb, &form("", "443"), &actor()).await;

        assert!(!response.ok);
        assert!(response.err.is_some());
        let records = audit.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Err);
    }

    #[tokio::test]
    async fn test_unreachable_cache_is_audited_per_operation() {
        let audit = Arc::new(MemoryAuditStore::new());
        let cache = Arc::new(UnavailableCache::new("Connection refused (os error 111)"));
        let propagator = RulePropagator::new(cache, audit.clone(), "fw:events".to_string());

        let request = prepare("ban_ip", &form("203.0.113.5", "")).unwrap();
        let response = execute(&propagator, request, &actor()).await;

        assert!(!response.ok);
        assert!(response.err.as_ref().unwrap().contains("Connection refused"));
        let records = audit.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Err);
        assert_eq!(records[0].action, "ban_ip");

        let request = prepare("block_ipport", &form("10.0.0.1,10.0.0.2", "22")).unwrap();
        let response = execute(&propagator, request, &actor()).await;
        assert!(!response.ok);
        assert_eq!(response.affected, Some(0));
        assert_eq!(audit.records().await.len(), 3);
    }

    #[test]
    fn test_invalid_input_is_rejected_before_execution() {
        let response = prepare("ban_everything", &form("203.0.113.5", "")).unwrap_err();
        assert_eq!(response.err.as_deref(), Some("unknown verb: ban_everything"));

        let response = prepare("ban_ip", &form("203.0.113.999", "")).unwrap_err();
        assert!(!response.ok);
        assert_eq!(response.err.as_deref(), Some("invalid ip: 203.0.113.999"));
    }

    #[tokio::test]
    async fn test_single_audit_failure_fails_request() {
        let (cache, audit, propagator) = setup();
        audit.fail_insert(true).await;
        let verb = RuleKind::BlockedIp.verb(Direction::Add);
        let response = apply(&propagator, verb, &form("203.0.113.5", ""), &actor()).await;

        assert!(!response.ok);
        // キャッシュの変更は残る
        assert!(cache.set("fw:black_ips").await.contains("203.0.113.5"));
    }

    #[tokio::test]
    async fn test_bulk_continues_after_failure() {
        let (cache, audit, propagator) = setup();
        cache.fail_key("fw:black_ips:server:web02").await;
        let verb = RuleKind::BlockedIp.verb(Direction::Add);
        let bulk = BulkForm {
            entries: Some(
                r#"[
                    {"ip": "10.0.0.1", "target_type": "server", "target_value": "web01"},
                    {"ip": "10.0.0.2", "target_type": "server", "target_value": "web02"},
                    {"ip": "10.0.0.3"}
                ]"#
                .to_string(),
            ),
            ..Default::default()
        };
        let response = apply_bulk(&propagator, verb, &bulk, &actor()).await;

        assert!(!response.ok);
        assert_eq!(response.affected, Some(2));
        assert!(response.err.as_ref().unwrap().contains("web02"));
        assert!(cache.set("fw:black_ips").await.contains("10.0.0.3"));
        assert_eq!(audit.records().await.len(), 3);
    }

    #[tokio::test]
    async fn test_bulk_audit_failure_becomes_warning() {
        let (_, audit, propagator) = setup();
        audit.fail_insert(true).await;
        let verb = RuleKind::BlockedPort.verb(Direction::Remove);
        let bulk = BulkForm {
            ports: Some("22,20000-30000".to_string()),
            ..Default::default()
        };
        let response = apply_bulk(&propagator, verb, &bulk, &actor()).await;

        assert!(response.ok);
        assert_eq!(response.affected, Some(2));
        assert!(response.warning.as_ref().unwrap().starts_with("audit failed for 2 entries"));
    }

    #[tokio::test]
    async fn test_overview_is_limited_to_own_rows() {
        let (_, audit, propagator) = setup();
        let verb = RuleKind::BlockedIp.verb(Direction::Add);
        let other = Actor {
            id: 9,
            ip: "192.0.2.9".to_string(),
            ..actor()
        };
        apply(&propagator, verb, &form("10.0.0.1", ""), &actor()).await;
        apply(&propagator, verb, &form("10.0.0.2", ""), &other).await;
        apply(&propagator, verb, &form("10.0.0.3", ""), &other).await;

        let own = audit_overview(audit.as_ref(), Viewer { id: 3, superadmin: false }, 50)
            .await
            .unwrap();
        assert_eq!(own.logs.len(), 1);
        assert_eq!(own.stats.total_actions, 1);

        let all = audit_overview(audit.as_ref(), Viewer { id: 3, superadmin: true }, 2)
            .await
            .unwrap();
        assert_eq!(all.logs.len(), 2);
        assert_eq!(all.logs[0].target_ip.as_deref(), Some("10.0.0.3"));
        assert_eq!(all.stats.total_actions, 3);
        assert_eq!(all.stats.success_count, 3);
        assert_eq!(all.stats.error_count, 0);
        assert_eq!(all.stats.unique_ips, 2);
    }

    #[tokio::test]
    async fn test_bulk_without_entries_is_rejected() {
        let (_, audit, propagator) = setup();
        let verb = RuleKind::BlockedIp.verb(Direction::Remove);
        let response = apply_bulk(&propagator, verb, &BulkForm::default(), &actor()).await;

        assert_eq!(response, ApiResponse::failure("no entries"));
        assert!(audit.records().await.is_empty());
    }
}
