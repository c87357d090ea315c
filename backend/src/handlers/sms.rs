use axum::extract::State;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::AuthUser,
    error::{AppError, Result},
    extract::{Json, Query},
    listing::Pagination,
    models::{SendSmsRequest, SendSmsResponse, SmsLog, SmsStats},
    AppState,
};

pub async fn send_sms(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(payload): Json<SendSmsRequest>,
) -> Result<Json<SendSmsResponse>> {
    if payload.message.trim().is_empty() || payload.recipients.is_empty() {
        return Err(AppError::bad_request("Message and recipients are required"));
    }

    let report = state.sms.dispatch(&payload.message, &payload.recipients).await;

    let log_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO sms_logs (message, recipients, sent_by, success_count, failure_count, total_count, kind)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#
    )
    .bind(&payload.message)
    .bind(&payload.recipients)
    .bind(caller.id())
    .bind(report.success)
    .bind(report.failure)
    .bind(report.total())
    .bind(payload.kind.as_str())
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry::new("SEND_SMS")
            .by(&caller)
            .table("sms_logs")
            .record(log_id)
            .new_values(json!({
                "message": &payload.message,
                "recipients_count": payload.recipients.len(),
                "success_count": report.success,
                "failure_count": report.failure,
            })),
    )
    .await;

    tracing::info!(
        %log_id,
        kind = %payload.kind,
        success = report.success,
        failure = report.failure,
        simulated = state.sms.is_simulated(),
        "SMS campaign sent"
    );

    Ok(Json(SendSmsResponse {
        message: "SMS sent successfully".to_string(),
        success_count: report.success,
        failure_count: report.failure,
        total_count: report.total(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

pub async fn sms_logs(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    Query(params): Query<LogQuery>,
) -> Result<Json<Vec<SmsLog>>> {
    let pagination = Pagination::from_params(&params.page, &params.limit, 20);

    let logs = sqlx::query_as::<_, SmsLog>(
        r#"
        SELECT s.*, u.full_name AS sent_by_name
        FROM sms_logs s
        LEFT JOIN users u ON u.id = s.sent_by
        ORDER BY s.created_at DESC
        LIMIT $1 OFFSET $2
        "#
    )
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(logs))
}

pub async fn sms_stats(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
) -> Result<Json<SmsStats>> {
    let stats = sqlx::query_as::<_, SmsStats>(
        r#"
        SELECT
            COUNT(*) AS total_campaigns,
            COALESCE(SUM(total_count), 0)::BIGINT AS total_sent,
            COALESCE(SUM(success_count), 0)::BIGINT AS total_success,
            COALESCE(SUM(failure_count), 0)::BIGINT AS total_failure,
            COUNT(*) FILTER (WHERE created_at::date = CURRENT_DATE) AS today_campaigns,
            COALESCE(SUM(total_count) FILTER (WHERE created_at::date = CURRENT_DATE), 0)::BIGINT AS today_sent
        FROM sms_logs
        "#
    )
    .fetch_one(&state.db)
    .await?;

    Ok(Json(stats))
}
