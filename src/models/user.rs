use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    #[schema(value_type = String, example = "admin")]
    pub global_role: Role,
    /// Id of the same person in the engineering database, when it differs.
    pub d1_user_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for User {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserCreateRequest {
    #[schema(example = "Lee Shifu")]
    pub name: String,
    #[schema(example = "0955555555")]
    pub phone: Option<String>,
    /// Accepts site aliases such as `foreman` and `worker`.
    #[schema(example = "worker")]
    pub global_role: Option<String>,
    pub d1_user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[schema(example = "owner")]
    pub global_role: Option<String>,
    pub d1_user_id: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub real_user: User,
    pub context_user: User,
    pub is_real_admin: bool,
    pub is_simulating: bool,
}
