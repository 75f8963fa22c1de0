//! Authorization: role/data-scope resolution at login, policy compilation, and the
//! pluggable engines that answer per-request allow/deny questions.

pub mod authorizer;
pub mod engine;
pub mod provider;
pub mod resolver;
pub mod scope;

pub use authorizer::Authorizer;
pub use engine::{AuthzRequest, Engine, PolicyEngine, PolicyMap};
pub use provider::{AuthorizerData, CompiledPolicies, DEFAULT_DOMAIN};
pub use resolver::ResolvedAuthority;

/// Policy engine selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    #[default]
    Noop,
    RuleBased,
    QueryBased,
}

impl EngineKind {
    /// Unknown or empty names fall back to `Noop`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "rule-based" | "rule_based" | "casbin" => EngineKind::RuleBased,
            "query-based" | "query_based" | "opa" => EngineKind::QueryBased,
            "noop" | "" => EngineKind::Noop,
            other => {
                tracing::warn!(engine = other, "unknown authz engine, falling back to noop");
                EngineKind::Noop
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Noop => "noop",
            EngineKind::RuleBased => "rule-based",
            EngineKind::QueryBased => "query-based",
        }
    }
}
