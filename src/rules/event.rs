use crate::rules::{ElementaryRule, Scope, Verb};

/// エージェント向けの再同期通知。`VERB VALUE... [@scope]` 形式。
///
/// メッセージは「読み直せ」という合図であり、正となる状態は
/// キャッシュ上のメンバーシップセットの方にある。
pub fn encode(verb: Verb, rule: &ElementaryRule, scope: &Scope) -> String {
    let mut msg = format!("{} {}", verb.as_str(), rule.event_tokens());
    if let Some(suffix) = scope.event_suffix() {
        msg.push(' ');
        msg.push_str(&suffix);
    }
    msg
}
