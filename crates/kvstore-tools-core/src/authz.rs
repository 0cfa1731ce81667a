// crates/kvstore-tools-core/src/authz.rs
// ============================================================================
// Module: Authorization
// Description: Capability checks and role-inheritance resolution.
// Purpose: Refuse operations before any transfer when the caller lacks rights.
// Dependencies: thiserror, tracing
// ============================================================================

//! ## Overview
//! Operations are gated on `run_kvstore_<operation>` or the umbrella
//! `run_kvst_all` capability of the session owner. Role membership is
//! resolved through the `imported_roles` graph.
//! Invariants:
//! - Role closure is iterative with a visited set and terminates on cycles.
//! - A role's closure always contains the role itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::api::ApiError;
use crate::api::CurrentContext;
use crate::api::KvStoreApi;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Capability granting every operation.
pub const ALL_OPERATIONS_CAPABILITY: &str = "run_kvst_all";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authorization failures; fatal before any transfer.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// The caller lacks the operation capability.
    #[error("User {user} is unauthorized. Has the {capability} capability been granted?")]
    MissingCapability {
        /// Session owner.
        user: String,
        /// Required capability.
        capability: String,
    },
    /// The context, role, or user lookup failed.
    #[error("authorization lookup failed: {0}")]
    Api(#[from] ApiError),
}

// ============================================================================
// SECTION: Capabilities
// ============================================================================

/// Capability required for `operation`, for example `run_kvstore_backup`.
#[must_use]
pub fn capability_for(operation: &str) -> String {
    format!("run_kvstore_{operation}")
}

/// Checks that `context` may run `operation`.
///
/// # Errors
///
/// Returns [`AuthorizationError::MissingCapability`] when neither the
/// operation capability nor [`ALL_OPERATIONS_CAPABILITY`] is present.
pub fn ensure_capability(context: &CurrentContext, operation: &str) -> Result<(), AuthorizationError> {
    let required = capability_for(operation);
    let granted = context
        .capabilities
        .iter()
        .any(|capability| capability == &required || capability == ALL_OPERATIONS_CAPABILITY);
    if granted {
        tracing::debug!(user = %context.username, operation, "operation authorized");
        return Ok(());
    }
    tracing::error!(user = %context.username, capability = %required, "operation not authorized");
    Err(AuthorizationError::MissingCapability {
        user: context.username.clone(),
        capability: required,
    })
}

/// Fetches the session owner's context and checks `operation`.
///
/// # Errors
///
/// Returns [`AuthorizationError`] on lookup failure or missing capability.
pub fn authorize(api: &KvStoreApi, operation: &str) -> Result<CurrentContext, AuthorizationError> {
    let context = api.current_context()?;
    ensure_capability(&context, operation)?;
    Ok(context)
}

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Returns `role` plus every role it inherits, directly or transitively.
#[must_use]
pub fn resolve_role_closure(role: &str, imported: &BTreeMap<String, Vec<String>>) -> BTreeSet<String> {
    let mut visited = BTreeSet::new();
    let mut pending = vec![role.to_string()];
    while let Some(current) = pending.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if let Some(parents) = imported.get(&current) {
            pending.extend(parents.iter().filter(|parent| !visited.contains(*parent)).cloned());
        }
    }
    visited
}

/// Lists users whose effective roles include `role`.
///
/// # Errors
///
/// Returns [`AuthorizationError::Api`] when the role or user listing fails.
pub fn users_with_role(api: &KvStoreApi, role: &str) -> Result<Vec<String>, AuthorizationError> {
    let imported = api.list_roles()?;
    let users = api.list_users()?;
    Ok(users
        .into_iter()
        .filter(|user| {
            user.roles
                .iter()
                .any(|assigned| resolve_role_closure(assigned, &imported).contains(role))
        })
        .map(|user| user.name)
        .collect())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
