//! Compiles roles, permissions and API resources into a role-code to endpoint map.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::errors::AppResult;
use crate::models::resource::ApiResource;
use crate::models::role::Role;
use crate::store::{permission_graph, resource, role, role_metadata, role_permission};

/// Domain placeholder; rules are not yet split per tenant.
pub const DEFAULT_DOMAIN: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct AuthorizerData {
    pub domain: String,
    pub path: String,
    pub method: String,
}

/// Role code to the endpoints it may call. Roles without endpoints are absent.
pub type CompiledPolicies = BTreeMap<String, Vec<AuthorizerData>>;

/// Endpoint tuples for one role's APIs; rows missing a path or method are dropped.
pub fn tuples_for_apis(apis: &[ApiResource]) -> Vec<AuthorizerData> {
    apis.iter()
        .filter(|api| !api.path.trim().is_empty() && !api.method.trim().is_empty())
        .map(|api| AuthorizerData {
            domain: DEFAULT_DOMAIN.to_string(),
            path: api.path.clone(),
            method: api.method.clone(),
        })
        .collect()
}

fn is_compilable(role: &Role, templates: &HashSet<u32>) -> bool {
    !role.code.trim().is_empty() && !role.is_template_code() && !templates.contains(&role.id)
}

async fn compile_role(pool: &SqlitePool, role: &Role) -> AppResult<Vec<AuthorizerData>> {
    let permission_ids = role_permission::list_permission_ids(pool, role.id).await?;
    if permission_ids.is_empty() {
        return Ok(Vec::new());
    }

    let api_ids = permission_graph::list_api_ids_for_permissions(pool, &permission_ids).await?;
    if api_ids.is_empty() {
        return Ok(Vec::new());
    }

    let apis = resource::get_apis_by_ids(pool, &api_ids).await?;
    Ok(tuples_for_apis(&apis))
}

/// Walks every role to its APIs. A failing role is logged and skipped; failing to list
/// roles aborts the whole compilation.
pub async fn provide(pool: &SqlitePool) -> AppResult<CompiledPolicies> {
    let roles = role::list(pool).await?;
    let templates = match role_metadata::template_role_ids(pool).await {
        Ok(ids) => ids,
        Err(err) => {
            tracing::warn!(error = %err, "template lookup failed, relying on code prefix");
            HashSet::new()
        }
    };

    let mut policies = CompiledPolicies::new();
    for role in roles.iter().filter(|role| is_compilable(role, &templates)) {
        match compile_role(pool, role).await {
            Ok(tuples) if tuples.is_empty() => {}
            Ok(tuples) => {
                policies.entry(role.code.clone()).or_default().extend(tuples);
            }
            Err(err) => {
                tracing::error!(role_id = role.id, code = %role.code, error = %err, "compile role policies failed");
            }
        }
    }

    for tuples in policies.values_mut() {
        tuples.sort();
        tuples.dedup();
    }

    Ok(policies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn api(id: u32, path: &str, method: &str) -> ApiResource {
        ApiResource {
            id,
            path: path.to_string(),
            method: method.to_string(),
            module: None,
            operation: None,
            description: None,
            scope: "ADMIN".into(),
            status: "ON".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn incomplete_apis_are_skipped() {
        let tuples = tuples_for_apis(&[
            api(1, "/admin/v1/orders", "GET"),
            api(2, "", "GET"),
            api(3, "/admin/v1/orders", " "),
        ]);
        assert_eq!(
            tuples,
            vec![AuthorizerData {
                domain: "*".into(),
                path: "/admin/v1/orders".into(),
                method: "GET".into(),
            }]
        );
    }
}
