use axum::{extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::AuthUser,
    error::{AppError, Result},
    extract::{Json, Path},
    handlers::MessageResponse,
    models::{Notification, NotificationStats, SendNotificationRequest},
    AppState,
};

const LOG_LIMIT: i64 = 50;

#[derive(Serialize)]
pub struct SendNotificationResponse {
    pub message: String,
    pub notification: Notification,
}

pub async fn send_notification(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(payload): Json<SendNotificationRequest>,
) -> Result<(StatusCode, Json<SendNotificationResponse>)> {
    if payload.message.trim().is_empty() || payload.recipients.is_empty() {
        return Err(AppError::bad_request("Message and recipients are required"));
    }

    let kind = payload.kind.filter(|k| !k.trim().is_empty()).unwrap_or_else(|| "manual".to_string());

    let notification = sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (message, recipients, kind, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#
    )
    .bind(&payload.message)
    .bind(&payload.recipients)
    .bind(&kind)
    .bind(caller.id())
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry::new("SEND_NOTIFICATION")
            .by(&caller)
            .table("notifications")
            .record(notification.id)
            .new_values(json!({
                "message": &notification.message,
                "recipients_count": notification.recipients.len(),
                "type": &kind,
            })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(SendNotificationResponse {
            message: "Notification sent successfully".to_string(),
            notification,
        }),
    ))
}

/// Idempotent: the caller is appended to `read_by` at most once.
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM notifications WHERE id = $1)")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::not_found("Notification not found"));
    }

    sqlx::query(
        r#"
        UPDATE notifications
        SET read_by = array_append(read_by, $2), updated_at = NOW()
        WHERE id = $1 AND NOT ($2 = ANY(read_by))
        "#
    )
    .bind(id)
    .bind(caller.id())
    .execute(&state.db)
    .await?;

    Ok(Json(MessageResponse::new("Notification marked as read")))
}

pub async fn my_notifications(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<Vec<Notification>>> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE $1 = ANY(recipients) ORDER BY created_at DESC"
    )
    .bind(caller.id())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(notifications))
}

pub async fn notification_logs(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<Vec<Notification>>> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE created_by = $1 ORDER BY created_at DESC LIMIT $2"
    )
    .bind(caller.id())
    .bind(LOG_LIMIT)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(notifications))
}

/// Counters over the notifications the caller has sent.
pub async fn notification_stats(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<NotificationStats>> {
    let stats = sqlx::query_as::<_, NotificationStats>(
        r#"
        SELECT
            COUNT(*) AS total_notifications,
            COALESCE(SUM(cardinality(read_by)), 0)::BIGINT AS total_reads,
            COUNT(*) FILTER (WHERE cardinality(read_by) = 0) AS unread_notifications
        FROM notifications
        WHERE created_by = $1
        "#
    )
    .bind(caller.id())
    .fetch_one(&state.db)
    .await?;

    Ok(Json(stats))
}
