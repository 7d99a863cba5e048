use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::authz::{Role, StoredCapabilities};
use crate::errors::AppError;
use crate::models::membership::ProjectMembership;
use crate::models::project::Project;
use crate::models::user::User;
use crate::utils::normalize_team_id;

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 (e.g. 2025-11-19T12:34:56Z), what we write ourselves
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    // Date-only rows imported from the CRM
    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn parse_uuid(column: &str, s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s.trim()).map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", column, e)))
}

fn parse_opt_uuid(column: &str, s: Option<String>) -> Result<Option<Uuid>, AppError> {
    match s.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_uuid(column, value).map(Some),
    }
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, AppError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| AppError::internal(format!("missing {}: {}", column, e)))
}

/// Nullable INTEGER flag column: NULL means "not stored".
fn get_flag(row: &SqliteRow, column: &str) -> Result<Option<bool>, AppError> {
    let value: Option<i64> = get(row, column)?;
    Ok(value.map(|v| v != 0))
}

pub fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    let id_s: String = get(row, "id")?;
    let global_role_s: Option<String> = get(row, "global_role")?;
    let is_active: i64 = get(row, "is_active")?;
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(User {
        id: parse_uuid("users.id", &id_s)?,
        name: get(row, "name")?,
        phone: get(row, "phone")?,
        global_role: Role::from_global(global_role_s.as_deref()),
        d1_user_id: get(row, "d1_user_id")?,
        is_active: is_active != 0,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

pub fn project_from_row(row: &SqliteRow) -> Result<Project, AppError> {
    let id_s: String = get(row, "id")?;
    let created_by_s: Option<String> = get(row, "created_by")?;
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(Project {
        id: parse_uuid("projects.id", &id_s)?,
        name: get(row, "name")?,
        opportunity_id: get(row, "opportunity_id")?,
        status: get(row, "status")?,
        created_by: parse_opt_uuid("projects.created_by", created_by_s)?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

pub fn membership_from_row(row: &SqliteRow) -> Result<ProjectMembership, AppError> {
    let id_s: String = get(row, "id")?;
    let project_id_s: String = get(row, "project_id")?;
    let user_id_s: String = get(row, "user_id")?;
    let team_id_s: String = get(row, "team_id")?;
    let role_s: String = get(row, "role")?;
    let is_active: i64 = get(row, "is_active")?;
    let updated_by_s: Option<String> = get(row, "updated_by")?;
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(ProjectMembership {
        id: parse_uuid("project_memberships.id", &id_s)?,
        project_id: parse_uuid("project_memberships.project_id", &project_id_s)?,
        user_id: parse_uuid("project_memberships.user_id", &user_id_s)?,
        team_id: normalize_team_id(Some(&team_id_s)),
        role: Role::normalize(&role_s),
        capabilities: StoredCapabilities {
            can_view: get_flag(row, "can_view")?,
            can_edit: get_flag(row, "can_edit")?,
            can_manage_members: get_flag(row, "can_manage_members")?,
            can_view_other_teams: get_flag(row, "can_view_other_teams")?,
        },
        is_active: is_active != 0,
        updated_by: parse_opt_uuid("project_memberships.updated_by", updated_by_s)?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}
