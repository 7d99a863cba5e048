use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use site_access::authz::{MembershipStore, Role, StoredCapabilities};
use site_access::models::membership::MembershipFields;

mod common;

/// The activity listener writes asynchronously; poll until the row shows up.
async fn audit_row(pool: &sqlx::SqlitePool, event_name: &str) -> Result<Option<(String, Option<String>)>> {
    for _ in 0..50 {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT actor_id, on_behalf_of FROM activity_log WHERE event_name = ? LIMIT 1")
                .bind(event_name)
                .fetch_optional(pool)
                .await?;
        if row.is_some() {
            return Ok(row);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(None)
}

#[tokio::test]
async fn admin_views_project_as_worker_and_returns() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.user("Admin", "admin").await?;
    let worker = t.user("Worker", "worker").await?;
    let project = t.project("Tower A").await?;

    let read_only = MembershipFields::new(Role::Member).with_capabilities(StoredCapabilities {
        can_edit: Some(false),
        ..Default::default()
    });
    t.store
        .upsert_membership(project.id, worker.id, None, &read_only, admin.id)
        .await?;

    let token = t.token(&admin)?;
    let check_edit = format!("/projects/{}/permissions/check/edit", project.id);

    // real admin: everything allowed
    let (_, body) = t.send("GET", &check_edit, Some(&token), None).await?;
    assert_eq!(body["allowed"], true);

    // switch to the worker
    let (status, body) = t
        .send(
            "POST",
            "/perspective",
            Some(&token),
            Some(json!({"target_user_id": worker.id, "project_id": project.id})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "switch failed: {body}");
    assert_eq!(body["is_simulating"], true);
    assert_eq!(body["simulated_user"]["id"], worker.id.to_string());
    assert_eq!(body["role_in_project"], "worker");
    assert_eq!(body["membership"]["user_id"], worker.id.to_string());
    assert_eq!(body["membership"]["role"], "member");
    assert_eq!(body["membership"]["can_edit"], false);

    // capability checks follow the worker, admin flag follows the real user
    let (_, body) = t.send("GET", &check_edit, Some(&token), None).await?;
    assert_eq!(body["allowed"], false);

    let (_, me) = t.send("GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(me["real_user"]["id"], admin.id.to_string());
    assert_eq!(me["context_user"]["id"], worker.id.to_string());
    assert_eq!(me["is_real_admin"], true);
    assert_eq!(me["is_simulating"], true);

    // admin powers are off while simulating
    let (status, _) = t.send("GET", "/users", Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the switch is audited against the real admin
    let (actor, on_behalf_of) = audit_row(&t.pool, "perspective.started").await?.expect("audit row");
    assert_eq!(actor, admin.id.to_string());
    assert_eq!(on_behalf_of, Some(worker.id.to_string()));

    // revert with a null target
    let (status, body) = t
        .send(
            "POST",
            "/perspective",
            Some(&token),
            Some(json!({"target_user_id": null, "project_id": project.id})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_simulating"], false);
    assert_eq!(body["membership"], serde_json::Value::Null);

    let (_, body) = t.send("GET", &check_edit, Some(&token), None).await?;
    assert_eq!(body["allowed"], true);

    let (_, me) = t.send("GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(me["context_user"]["id"], admin.id.to_string());

    assert!(audit_row(&t.pool, "perspective.ended").await?.is_some());

    Ok(())
}

#[tokio::test]
async fn non_admin_cannot_switch() -> Result<()> {
    let t = common::setup().await?;
    let leader = t.user("Foreman", "foreman").await?;
    let worker = t.user("Worker", "worker").await?;
    let project = t.project("Tower B").await?;
    let token = t.token(&leader)?;

    let (status, _) = t
        .send(
            "POST",
            "/perspective",
            Some(&token),
            Some(json!({"target_user_id": worker.id, "project_id": project.id})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = t.send("GET", "/perspective", Some(&token), None).await?;
    assert_eq!(body["is_simulating"], false);
    assert_eq!(body["is_real_admin"], false);

    Ok(())
}

#[tokio::test]
async fn simulation_is_scoped_to_the_session() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.user("Admin", "admin").await?;
    let worker = t.user("Worker", "worker").await?;
    let project = t.project("Tower C").await?;

    let laptop = t.token(&admin)?;
    let phone = t.token(&admin)?;

    let (status, _) = t
        .send(
            "POST",
            "/perspective",
            Some(&laptop),
            Some(json!({"target_user_id": worker.id, "project_id": project.id})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = t.send("GET", "/perspective", Some(&phone), None).await?;
    assert_eq!(body["is_simulating"], false);

    // logout ends the simulation
    let (status, _) = t.send("POST", "/auth/logout", Some(&laptop), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = t.send("GET", "/perspective", Some(&laptop), None).await?;
    assert_eq!(body["is_simulating"], false);

    Ok(())
}

#[tokio::test]
async fn switch_to_unknown_targets() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.user("Admin", "admin").await?;
    let worker = t.user("Worker", "worker").await?;
    let project = t.project("Tower D").await?;
    let token = t.token(&admin)?;

    let (status, _) = t
        .send(
            "POST",
            "/perspective",
            Some(&token),
            Some(json!({"target_user_id": uuid::Uuid::new_v4(), "project_id": project.id})),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .send(
            "POST",
            "/perspective",
            Some(&token),
            Some(json!({"target_user_id": worker.id, "project_id": uuid::Uuid::new_v4()})),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = t.send("DELETE", "/perspective", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_simulating"], false);

    Ok(())
}
