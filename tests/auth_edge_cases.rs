use anyhow::Result;
use axum::http::StatusCode;
use uuid::Uuid;

use site_access::jwt::JwtConfig;
use site_access::models::user::UserUpdateRequest;

mod common;

#[tokio::test]
async fn auth_edge_cases() -> Result<()> {
    let t = common::setup().await?;
    let worker = t.user("Worker", "worker").await?;

    // 1. No token at all
    let (status, _) = t.send("GET", "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "missing token must be rejected");

    // 2. Garbage token
    let (status, body) = t.send("GET", "/auth/me", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token");

    // 3. Token signed with another secret
    let forged = JwtConfig::new("someone-else", 1).encode(worker.id, Uuid::new_v4())?;
    let (status, _) = t.send("GET", "/auth/me", Some(&forged), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 4. Expired token
    let expired = JwtConfig::new(common::SECRET, -2).encode(worker.id, Uuid::new_v4())?;
    let (status, _) = t.send("GET", "/auth/me", Some(&expired), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 5. Valid token for a user that does not exist
    let ghost = t.jwt.encode(Uuid::new_v4(), Uuid::new_v4())?;
    let (status, _) = t.send("GET", "/auth/me", Some(&ghost), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 6. Valid token
    let token = t.token(&worker)?;
    let (status, body) = t.send("GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["real_user"]["id"], worker.id.to_string());
    assert_eq!(body["real_user"]["global_role"], "member");
    assert_eq!(body["is_real_admin"], false);
    assert_eq!(body["is_simulating"], false);

    // 7. Deactivated user loses access with the same token
    t.store
        .update_user(
            worker.id,
            &UserUpdateRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
    let (status, _) = t.send("GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn admin_only_routes_reject_workers() -> Result<()> {
    let t = common::setup().await?;
    let worker = t.user("Worker", "worker").await?;
    let token = t.token(&worker)?;

    let (status, _) = t.send("GET", "/users", Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .send("POST", "/projects", Some(&token), Some(serde_json::json!({"name": "Nope"})))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}
