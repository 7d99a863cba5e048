//! Authorization core
//!
//! Answers "what may the current context user do on this project (and team)?".
//! Resolution is fail-closed: any store error, timeout or unknown capability
//! name yields a denial, never an allow.
//!
//! - `role` / `capability`: the vocabulary and the role default table
//! - `resolver`: merges stored membership flags over role defaults
//! - `identity`: who is really calling (never affected by impersonation)
//! - `perspective`: admin "view as" state, keyed by session
//! - `context`: per-request extractor tying the above together

mod cache;
mod capability;
mod context;
mod identity;
mod perspective;
mod resolver;
mod role;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheKey, CapabilityCache, DEFAULT_CACHE_CAPACITY};
pub use capability::{Capability, CapabilitySet, StoredCapabilities};
pub use context::PermissionContext;
pub use identity::{IdentityResolver, RealIdentity, SessionEvidence};
pub use perspective::{PerspectiveController, SessionRegistry, SimulatedIdentity};
pub use resolver::{resolve_capabilities, EvaluationSubject, PermissionResolver};
pub use role::{DisplayRole, Role};
pub use store::{MembershipStore, UserDirectory};

use std::future::Future;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

const DEFAULT_STORE_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthzConfig {
    /// Upper bound on any single permission-store call.
    pub store_timeout: Duration,
    pub cache_enabled: bool,
    /// Maximum number of cached capability results.
    pub cache_capacity: usize,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            cache_enabled: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl AuthzConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let store_timeout_ms = std::env::var("AUTHZ_STORE_TIMEOUT_MS")
            .map(|val| val.parse::<u64>())
            .unwrap_or(Ok(DEFAULT_STORE_TIMEOUT_MS))
            .map_err(|_| AppError::configuration("AUTHZ_STORE_TIMEOUT_MS must be a valid integer"))?;

        if store_timeout_ms == 0 {
            return Err(AppError::configuration("AUTHZ_STORE_TIMEOUT_MS must be greater than zero"));
        }

        let cache_enabled = match std::env::var("AUTHZ_CACHE").unwrap_or_default().to_lowercase().as_str() {
            "" | "on" | "true" | "1" => true,
            "off" | "false" | "0" => false,
            other => {
                return Err(AppError::configuration(format!(
                    "AUTHZ_CACHE must be 'on' or 'off', got '{other}'"
                )))
            }
        };

        let cache_capacity = std::env::var("AUTHZ_CACHE_CAPACITY")
            .map(|val| val.parse::<usize>())
            .unwrap_or(Ok(DEFAULT_CACHE_CAPACITY))
            .map_err(|_| AppError::configuration("AUTHZ_CACHE_CAPACITY must be a valid integer"))?;

        Ok(Self {
            store_timeout: Duration::from_millis(store_timeout_ms),
            cache_enabled,
            cache_capacity,
        })
    }
}

/// Runs a store call under `limit`. Running out of time is `Unavailable`,
/// which every capability check treats as a denial.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &'static str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "permission store timed out");
            Err(AppError::unavailable(format!("{operation} timed out")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_maps_timeout_to_unavailable() {
        let result: AppResult<()> = bounded(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through_results() {
        let ok = bounded(Duration::from_secs(1), "fast", async { Ok(7) }).await;
        assert_eq!(ok.ok(), Some(7));

        let err: AppResult<()> = bounded(Duration::from_secs(1), "fast", async { Err(AppError::not_found("x")) }).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }
}
