use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

/// Who performed an action. While an admin is viewing the system as someone
/// else, `actor_id` stays the admin and `on_behalf_of` names the simulated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    pub actor_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_behalf_of: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Uuid,
    pub on_behalf_of: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: String, actor: &AuditActor, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            occurred_at: Utc::now(),
            actor_id: actor.actor_id,
            on_behalf_of: actor.on_behalf_of,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context for activity logging (IP, User-Agent)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

pub fn log_activity<T: Loggable>(event_bus: &EventBus, action: &str, actor: &AuditActor, entity: &T) {
    log_activity_with_context(event_bus, action, actor, entity, None, None);
}

/// Publishes `<entity_type>.<action>` on the bus. Fire and forget: a full or
/// receiver-less bus never fails the request.
pub fn log_activity_with_context<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor: &AuditActor,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let event_name = format!("{}.{}", T::entity_type(), action);

    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity: entity.severity_for_action(action),
    };

    let event = DomainEvent::new(
        event_name,
        actor,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    if event_bus.send(serde_json::to_value(event).unwrap_or_default()).is_err() {
        tracing::debug!(action = %action, "no activity listener attached");
    }
}

fn describe(name: &str) -> &'static str {
    match name {
        "membership.added" => "Member added to project",
        "membership.upserted" => "Membership updated",
        "membership.removed" => "Member removed from project",
        "perspective.started" => "Admin started viewing as another user",
        "perspective.ended" => "Admin returned to own view",
        "project.created" => "Project created",
        "user.created" => "User created",
        "user.updated" => "User updated",
        _ => "System event",
    }
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged; events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let Err(err) = persist_event(&pool, &event).await {
            tracing::error!(error = %err, "failed to persist activity event");
        }
    }
}

async fn persist_event(pool: &SqlitePool, event: &Value) -> Result<(), sqlx::Error> {
    let name = event.get("name").and_then(Value::as_str).unwrap_or("unknown");
    let actor_id = event.get("actor_id").and_then(Value::as_str);
    let on_behalf_of = event.get("on_behalf_of").and_then(Value::as_str);
    let subject_id = event.get("subject_id").and_then(Value::as_str);
    let severity = event
        .get("payload")
        .and_then(|p| p.get("severity"))
        .and_then(Value::as_str)
        .unwrap_or(Severity::Important.as_str());

    let occurred_at = event
        .get("occurred_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let payload = serde_json::to_string(event).unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO activity_log (id, event_name, description, actor_id, on_behalf_of, subject_id, occurred_at, properties, severity)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(describe(name))
    .bind(actor_id)
    .bind(on_behalf_of)
    .bind(subject_id)
    .bind(occurred_at)
    .bind(&payload)
    .bind(severity)
    .execute(pool)
    .await?;

    // hash = SHA256(prev_hash || payload)
    let prev_hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM event_store ORDER BY rowid DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    let mut hasher = Sha256::new();
    if let Some(ref prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    let hash = hex::encode(hasher.finalize());

    sqlx::query(
        r#"
        INSERT INTO event_store (id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(occurred_at)
    .bind(actor_id)
    .bind(subject_id)
    .bind(&payload)
    .bind(severity)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(pool)
    .await?;

    Ok(())
}
