//! In-process policy engines behind one capability trait.
//!
//! Each engine keeps its rule set behind `RwLock<Arc<_>>`; `set_policies` builds the
//! new set first and swaps the pointer, so readers see either the old or the new set.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::EngineKind;
use crate::errors::{AppError, AppResult};

/// Engine-specific policy document.
pub type PolicyMap = Map<String, Value>;

/// One authorization question: may any of `subjects` call `method path` in `domain`?
#[derive(Debug, Clone)]
pub struct AuthzRequest {
    pub subjects: Vec<String>,
    pub path: String,
    pub method: String,
    pub domain: String,
}

#[async_trait]
pub trait PolicyEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Replaces the whole rule set. On error the previous set stays active.
    async fn set_policies(&self, policies: PolicyMap, extra: Option<Value>) -> AppResult<()>;

    async fn is_authorized(&self, request: &AuthzRequest) -> AppResult<bool>;
}

// =============================================================================
// MATCHING
// =============================================================================

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn is_param(segment: &str) -> bool {
    segment.starts_with(':') || (segment.starts_with('{') && segment.ends_with('}'))
}

/// Segment-wise route match. `{x}` or `:x` in `pattern` matches any one segment and a
/// trailing `*` matches the remainder.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let expected = segments(pattern);
    let actual = segments(path);

    for (index, segment) in expected.iter().enumerate() {
        if *segment == "*" && index == expected.len() - 1 {
            return true;
        }
        match actual.get(index) {
            Some(candidate) if is_param(segment) || segment == candidate => {}
            _ => return false,
        }
    }

    expected.len() == actual.len()
}

pub fn method_matches(pattern: &str, method: &str) -> bool {
    pattern == "*" || pattern.eq_ignore_ascii_case(method)
}

fn domain_matches(pattern: &str, domain: &str) -> bool {
    pattern == "*" || pattern == domain
}

fn read<T>(lock: &RwLock<Arc<T>>) -> AppResult<Arc<T>> {
    lock.read()
        .map(|guard| Arc::clone(&guard))
        .map_err(|_| AppError::internal("policy lock poisoned"))
}

fn swap<T>(lock: &RwLock<Arc<T>>, value: T) -> AppResult<()> {
    let mut guard = lock.write().map_err(|_| AppError::internal("policy lock poisoned"))?;
    *guard = Arc::new(value);
    Ok(())
}

// =============================================================================
// NOOP
// =============================================================================

#[derive(Debug, Default)]
pub struct NoopEngine;

#[async_trait]
impl PolicyEngine for NoopEngine {
    fn name(&self) -> &'static str {
        EngineKind::Noop.name()
    }

    async fn set_policies(&self, _policies: PolicyMap, _extra: Option<Value>) -> AppResult<()> {
        Ok(())
    }

    async fn is_authorized(&self, _request: &AuthzRequest) -> AppResult<bool> {
        Ok(true)
    }
}

// =============================================================================
// RULE-BASED
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePolicy {
    pub ptype: String,
    pub subject: String,
    pub object: String,
    pub action: String,
    pub domain: String,
}

/// Tuple lookup over `{ptype, subject, object, action, domain}` rows, document shape
/// `{"policies": [...]}`.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: RwLock<Arc<Vec<RulePolicy>>>,
}

impl RuleEngine {
    pub fn rule_count(&self) -> usize {
        read(&self.rules).map(|rules| rules.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PolicyEngine for RuleEngine {
    fn name(&self) -> &'static str {
        EngineKind::RuleBased.name()
    }

    async fn set_policies(&self, mut policies: PolicyMap, _extra: Option<Value>) -> AppResult<()> {
        let rules: Vec<RulePolicy> = match policies.remove("policies") {
            Some(value) => serde_json::from_value(value)
                .map_err(|err| AppError::bad_request(format!("invalid rule policy document: {err}")))?,
            None => Vec::new(),
        };
        let rules = rules.into_iter().filter(|rule| rule.ptype == "p").collect();
        swap(&self.rules, rules)
    }

    async fn is_authorized(&self, request: &AuthzRequest) -> AppResult<bool> {
        let rules = read(&self.rules)?;
        Ok(rules.iter().any(|rule| {
            request.subjects.iter().any(|subject| subject == &rule.subject)
                && path_matches(&rule.object, &request.path)
                && method_matches(&rule.action, &request.method)
                && domain_matches(&rule.domain, &request.domain)
        }))
    }
}

// =============================================================================
// QUERY-BASED
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRule {
    pub pattern: String,
    pub method: String,
}

/// Structural pattern match per role code, document shape `{role: [{pattern, method}]}`.
#[derive(Debug, Default)]
pub struct QueryEngine {
    rules: RwLock<Arc<HashMap<String, Vec<QueryRule>>>>,
}

#[async_trait]
impl PolicyEngine for QueryEngine {
    fn name(&self) -> &'static str {
        EngineKind::QueryBased.name()
    }

    async fn set_policies(&self, policies: PolicyMap, _extra: Option<Value>) -> AppResult<()> {
        let mut rules = HashMap::with_capacity(policies.len());
        for (role, value) in policies {
            let parsed: Vec<QueryRule> = serde_json::from_value(value).map_err(|err| {
                AppError::bad_request(format!("invalid query policy for role {role}: {err}"))
            })?;
            rules.insert(role, parsed);
        }
        swap(&self.rules, rules)
    }

    async fn is_authorized(&self, request: &AuthzRequest) -> AppResult<bool> {
        let rules = read(&self.rules)?;
        Ok(request.subjects.iter().any(|subject| {
            rules.get(subject).is_some_and(|patterns| {
                patterns.iter().any(|rule| {
                    path_matches(&rule.pattern, &request.path) && method_matches(&rule.method, &request.method)
                })
            })
        }))
    }
}

// =============================================================================
// SELECTION
// =============================================================================

/// The engine chosen at startup.
#[derive(Debug)]
pub enum Engine {
    Noop(NoopEngine),
    Rule(RuleEngine),
    Query(QueryEngine),
}

impl Engine {
    pub fn new(kind: EngineKind) -> Self {
        match kind {
            EngineKind::Noop => Engine::Noop(NoopEngine),
            EngineKind::RuleBased => Engine::Rule(RuleEngine::default()),
            EngineKind::QueryBased => Engine::Query(QueryEngine::default()),
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::Noop(_) => EngineKind::Noop,
            Engine::Rule(_) => EngineKind::RuleBased,
            Engine::Query(_) => EngineKind::QueryBased,
        }
    }

    fn inner(&self) -> &dyn PolicyEngine {
        match self {
            Engine::Noop(engine) => engine,
            Engine::Rule(engine) => engine,
            Engine::Query(engine) => engine,
        }
    }
}

#[async_trait]
impl PolicyEngine for Engine {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn set_policies(&self, policies: PolicyMap, extra: Option<Value>) -> AppResult<()> {
        self.inner().set_policies(policies, extra).await
    }

    async fn is_authorized(&self, request: &AuthzRequest) -> AppResult<bool> {
        self.inner().is_authorized(request).await
    }
}
