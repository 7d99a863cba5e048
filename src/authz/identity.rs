use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::bounded;
use super::store::UserDirectory;
use crate::errors::{AppError, AppResult};
use crate::jwt::JwtConfig;
use crate::models::user::User;

/// Raw credentials presented with a request.
#[derive(Debug, Clone, Default)]
pub struct SessionEvidence {
    pub authorization: Option<String>,
}

impl SessionEvidence {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            authorization: headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
        }
    }

    pub fn bearer(token: &str) -> Self {
        Self {
            authorization: Some(format!("Bearer {token}")),
        }
    }
}

/// The logged-in user, loaded from the store. Impersonation never changes it.
#[derive(Debug, Clone)]
pub struct RealIdentity {
    pub user: User,
    pub session_id: Uuid,
    /// Expiry of the token that opened the session.
    pub expires_at: DateTime<Utc>,
}

impl RealIdentity {
    pub fn is_admin(&self) -> bool {
        self.user.global_role.is_admin()
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    jwt: Arc<JwtConfig>,
    users: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(jwt: Arc<JwtConfig>, users: Arc<dyn UserDirectory>, timeout: Duration) -> Self {
        Self { jwt, users, timeout }
    }

    pub async fn resolve_real_user(&self, evidence: &SessionEvidence) -> AppResult<RealIdentity> {
        let header = evidence
            .authorization
            .as_deref()
            .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::token("expected a Bearer token"))?;

        let claims = self.jwt.decode(token)?;
        let expires_at = i64::try_from(claims.exp)
            .ok()
            .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
            .ok_or_else(|| AppError::token("invalid exp claim"))?;

        let user = bounded(self.timeout, "find_user", self.users.find_user(claims.sub))
            .await?
            .ok_or_else(|| AppError::unauthorized("unknown user"))?;

        if !user.is_active {
            tracing::debug!(user_id = %user.id, "inactive user rejected");
            return Err(AppError::unauthorized("user is deactivated"));
        }

        Ok(RealIdentity {
            user,
            session_id: claims.sid,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::testing::{user, MemoryStore};
    use crate::authz::Role;

    fn resolver(store: Arc<MemoryStore>) -> (IdentityResolver, Arc<JwtConfig>) {
        let jwt = Arc::new(JwtConfig::new("identity-test-secret", 1));
        (IdentityResolver::new(jwt.clone(), store, Duration::from_secs(1)), jwt)
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user_and_session() {
        let store = MemoryStore::new();
        let admin = user(Role::Admin);
        store.add_user(&admin).await;
        let (identity, jwt) = resolver(store);

        let session = Uuid::new_v4();
        let token = jwt.encode(admin.id, session).expect("token");
        let real = identity
            .resolve_real_user(&SessionEvidence::bearer(&token))
            .await
            .expect("identity");

        assert_eq!(real.user.id, admin.id);
        assert_eq!(real.session_id, session);
        assert!(real.is_admin());

        // the token is minted for one hour
        let remaining = real.expires_at - Utc::now();
        assert!(remaining > chrono::Duration::minutes(55));
        assert!(remaining <= chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn test_missing_and_malformed_evidence() {
        let (identity, _) = resolver(MemoryStore::new());

        let missing = identity.resolve_real_user(&SessionEvidence::default()).await;
        assert!(matches!(missing, Err(AppError::Unauthorized(_))));

        let basic = SessionEvidence {
            authorization: Some("Basic Zm9vOmJhcg==".into()),
        };
        assert!(matches!(identity.resolve_real_user(&basic).await, Err(AppError::Token(_))));

        let garbage = SessionEvidence::bearer("not-a-jwt");
        assert!(matches!(identity.resolve_real_user(&garbage).await, Err(AppError::Token(_))));
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_user_is_unauthorized() {
        let store = MemoryStore::new();
        let mut gone = user(Role::Admin);
        gone.is_active = false;
        store.add_user(&gone).await;
        let (identity, jwt) = resolver(store);

        let token = jwt.encode(gone.id, Uuid::new_v4()).expect("token");
        let result = identity.resolve_real_user(&SessionEvidence::bearer(&token)).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let token = jwt.encode(Uuid::new_v4(), Uuid::new_v4()).expect("token");
        let result = identity.resolve_real_user(&SessionEvidence::bearer(&token)).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }
}
