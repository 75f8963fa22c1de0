use serde_json::{json, Map, Value};
use sqlx::SqlitePool;

use super::engine::{AuthzRequest, Engine, PolicyEngine, PolicyMap, QueryRule, RulePolicy};
use super::provider::{self, CompiledPolicies};
use super::EngineKind;
use crate::errors::{AppError, AppResult};

/// Owns the selected engine and reloads it from the compiled role map.
#[derive(Debug)]
pub struct Authorizer {
    engine: Engine,
}

impl Authorizer {
    pub fn new(kind: EngineKind) -> Self {
        tracing::info!(engine = kind.name(), "policy engine selected");
        Self {
            engine: Engine::new(kind),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn kind(&self) -> EngineKind {
        self.engine.kind()
    }

    pub async fn is_authorized(&self, request: &AuthzRequest) -> AppResult<bool> {
        self.engine.is_authorized(request).await
    }

    /// Recompiles policies from the database and pushes them to the engine. Returns the
    /// number of rules loaded. On failure the engine keeps its previous rule set.
    pub async fn reset_policies(&self, pool: &SqlitePool) -> AppResult<usize> {
        let compiled = provider::provide(pool).await.map_err(|err| {
            tracing::error!(error = %err, "compile policies failed");
            err
        })?;

        let (document, count) = match self.engine.kind() {
            EngineKind::Noop => return Ok(0),
            EngineKind::RuleBased => build_rule_policies(&compiled)?,
            EngineKind::QueryBased => build_query_policies(&compiled)?,
        };

        self.engine.set_policies(document, None).await.map_err(|err| {
            tracing::error!(engine = self.engine.name(), error = %err, "set policies failed");
            err
        })?;

        tracing::info!(engine = self.engine.name(), roles = compiled.len(), rules = count, "policies reloaded");
        Ok(count)
    }

    /// Reloads and only logs a failure, for callers whose own write already succeeded.
    pub async fn reset_policies_logged(&self, pool: &SqlitePool, trigger: &str) {
        if let Err(err) = self.reset_policies(pool).await {
            tracing::warn!(trigger, error = %err, "policy reload failed, previous policies stay active");
        }
    }
}

fn as_policy_map(value: Value) -> AppResult<PolicyMap> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::internal("policy document is not an object")),
    }
}

/// `{"policies": [{ptype, subject, object, action, domain}, ...]}`
pub fn build_rule_policies(compiled: &CompiledPolicies) -> AppResult<(PolicyMap, usize)> {
    let rules: Vec<RulePolicy> = compiled
        .iter()
        .flat_map(|(role, tuples)| {
            tuples.iter().map(move |tuple| RulePolicy {
                ptype: "p".to_string(),
                subject: role.clone(),
                object: tuple.path.clone(),
                action: tuple.method.clone(),
                domain: tuple.domain.clone(),
            })
        })
        .collect();

    let count = rules.len();
    let document = as_policy_map(json!({ "policies": rules }))?;
    Ok((document, count))
}

/// `{role: [{pattern, method}, ...], ...}`
pub fn build_query_policies(compiled: &CompiledPolicies) -> AppResult<(PolicyMap, usize)> {
    let mut document = Map::with_capacity(compiled.len());
    let mut count = 0;

    for (role, tuples) in compiled {
        let rules: Vec<QueryRule> = tuples
            .iter()
            .map(|tuple| QueryRule {
                pattern: tuple.path.clone(),
                method: tuple.method.clone(),
            })
            .collect();
        count += rules.len();
        let value = serde_json::to_value(rules)
            .map_err(|err| AppError::internal(format!("encode query policies failed: {err}")))?;
        document.insert(role.clone(), value);
    }

    Ok((document, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::provider::AuthorizerData;

    fn compiled() -> CompiledPolicies {
        let mut map = CompiledPolicies::new();
        map.insert(
            "auditor".into(),
            vec![
                AuthorizerData {
                    domain: "*".into(),
                    path: "/admin/v1/orders".into(),
                    method: "GET".into(),
                },
                AuthorizerData {
                    domain: "*".into(),
                    path: "/admin/v1/orders/{id}".into(),
                    method: "GET".into(),
                },
            ],
        );
        map
    }

    #[test]
    fn rule_document_is_a_flat_tuple_list() {
        let (doc, count) = build_rule_policies(&compiled()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            doc["policies"][0],
            json!({ "ptype": "p", "subject": "auditor", "object": "/admin/v1/orders", "action": "GET", "domain": "*" })
        );
    }

    #[test]
    fn query_document_groups_patterns_by_role() {
        let (doc, count) = build_query_policies(&compiled()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(doc["auditor"][1], json!({ "pattern": "/admin/v1/orders/{id}", "method": "GET" }));
    }

    #[test]
    fn empty_compilation_gives_empty_documents() {
        let (rule_doc, rules) = build_rule_policies(&CompiledPolicies::new()).unwrap();
        assert_eq!(rules, 0);
        assert_eq!(rule_doc["policies"], json!([]));

        let (query_doc, patterns) = build_query_policies(&CompiledPolicies::new()).unwrap();
        assert_eq!(patterns, 0);
        assert!(query_doc.is_empty());
    }
}
