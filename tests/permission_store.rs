use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use site_access::authz::{
    CapabilityCache, EvaluationSubject, MembershipStore, PermissionResolver, Role, StoredCapabilities,
};
use site_access::models::membership::MembershipFields;

mod common;

#[tokio::test]
async fn upsert_is_keyed_by_project_user_and_team() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.user("Admin", "admin").await?;
    let worker = t.user("Worker", "worker").await?;
    let project = t.project("Bridge").await?;

    let first = t
        .store
        .upsert_membership(project.id, worker.id, None, &MembershipFields::new(Role::Member), admin.id)
        .await?;
    assert_eq!(first.team_id, None, "empty team key must come back as the project-wide row");
    assert!(first.capabilities.is_empty());

    let read_only = MembershipFields::new(Role::Member).with_capabilities(StoredCapabilities {
        can_edit: Some(false),
        ..Default::default()
    });
    let second = t
        .store
        .upsert_membership(project.id, worker.id, None, &read_only, admin.id)
        .await?;
    assert_eq!(second.id, first.id, "same key must update in place");
    assert_eq!(second.capabilities.can_edit, Some(false));
    assert_eq!(second.capabilities.can_view, None);

    // the same write again changes nothing
    let again = t
        .store
        .upsert_membership(project.id, worker.id, None, &read_only, admin.id)
        .await?;
    assert_eq!(again.id, second.id);
    assert_eq!(again.role, second.role);
    assert_eq!(again.capabilities, second.capabilities);
    assert!(again.is_active);
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM project_memberships WHERE user_id = ? AND team_id = ''")
        .bind(worker.id.to_string())
        .fetch_one(&t.pool)
        .await?;
    assert_eq!(rows, 1);

    let team_row = t
        .store
        .upsert_membership(project.id, worker.id, Some("T1"), &MembershipFields::new(Role::Leader), admin.id)
        .await?;
    assert_ne!(team_row.id, first.id);
    assert_eq!(team_row.team_id.as_deref(), Some("T1"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM project_memberships WHERE user_id = ?")
        .bind(worker.id.to_string())
        .fetch_one(&t.pool)
        .await?;
    assert_eq!(count, 2);

    Ok(())
}

#[tokio::test]
async fn access_folds_rows_and_deactivation_is_soft() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.user("Admin", "admin").await?;
    let worker = t.user("Worker", "worker").await?;
    let project = t.project("Depot").await?;

    assert!(t.store.find_access(project.id, worker.id).await?.is_none());

    t.store
        .upsert_membership(project.id, worker.id, Some("T2"), &MembershipFields::new(Role::Member), admin.id)
        .await?;
    t.store
        .upsert_membership(project.id, worker.id, Some("T1"), &MembershipFields::new(Role::Leader), admin.id)
        .await?;

    let access = t
        .store
        .find_access(project.id, worker.id)
        .await?
        .context("worker should have access")?;
    assert_eq!(access.role, Role::Member, "team leadership does not carry project-wide");
    let teams: Vec<&str> = access.team_contexts.iter().map(|ctx| ctx.team_id.as_str()).collect();
    assert_eq!(teams, vec!["T1", "T2"]);

    let removed = t.store.deactivate_memberships(project.id, worker.id, admin.id).await?;
    assert_eq!(removed, 2);
    assert!(t.store.find_access(project.id, worker.id).await?.is_none());
    assert!(t.store.list_members(project.id).await?.is_empty());

    // nothing left to deactivate
    assert_eq!(t.store.deactivate_memberships(project.id, worker.id, admin.id).await?, 0);

    // upsert brings a soft-removed row back
    let revived = t
        .store
        .upsert_membership(project.id, worker.id, Some("T1"), &MembershipFields::new(Role::Member), admin.id)
        .await?;
    assert!(revived.is_active);
    assert_eq!(revived.updated_by, Some(admin.id));
    assert_eq!(t.store.list_members(project.id).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn unknown_stored_roles_read_as_guest() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.user("Admin", "admin").await?;
    let worker = t.user("Worker", "worker").await?;
    let project = t.project("Annex").await?;

    t.store
        .upsert_membership(project.id, worker.id, None, &MembershipFields::new(Role::Member), admin.id)
        .await?;
    sqlx::query("UPDATE project_memberships SET role = 'contractor' WHERE user_id = ?")
        .bind(worker.id.to_string())
        .execute(&t.pool)
        .await?;

    let resolver = PermissionResolver::new(Arc::new(t.store.clone()), CapabilityCache::new(true), Duration::from_secs(3));
    let caps = resolver
        .effective_capabilities(EvaluationSubject::real(&worker), project.id, None)
        .await?;
    assert!(!caps.view);
    assert!(!caps.edit);

    Ok(())
}

#[tokio::test]
async fn resolver_over_sqlite_reads_through_cache() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.user("Admin", "admin").await?;
    let owner = t.user("Owner", "owner").await?;
    let project = t.project("Plaza").await?;

    let resolver = PermissionResolver::new(Arc::new(t.store.clone()), CapabilityCache::new(true), Duration::from_secs(3));

    resolver
        .upsert_membership(project.id, owner.id, None, &MembershipFields::with_role_defaults(Role::Owner), admin.id)
        .await?;

    let caps = resolver
        .effective_capabilities(EvaluationSubject::real(&owner), project.id, None)
        .await?;
    assert!(caps.view && caps.view_other_teams && !caps.edit);
    assert_eq!(resolver.cache().len().await, 1);

    let grant_edit = MembershipFields::new(Role::Owner).with_capabilities(StoredCapabilities {
        can_edit: Some(true),
        ..Default::default()
    });
    resolver
        .upsert_membership(project.id, owner.id, None, &grant_edit, admin.id)
        .await?;
    assert_eq!(resolver.cache().len().await, 0);

    assert!(resolver.has_permission(EvaluationSubject::real(&owner), project.id, None, "edit").await);

    Ok(())
}
