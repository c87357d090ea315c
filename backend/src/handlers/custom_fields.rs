use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::AuthUser,
    error::{AppError, Result},
    extract::{Json, Path, Query},
    handlers::MessageResponse,
    listing::filled,
    models::{CreateCustomFieldRequest, CustomField, EntityType, Role, UpdateCustomFieldRequest},
    AppState,
};

fn field_not_found() -> AppError {
    AppError::not_found("Custom field not found")
}

#[derive(Debug, Deserialize)]
pub struct FieldQuery {
    pub applies_to: Option<String>,
}

pub async fn list_fields(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    Query(params): Query<FieldQuery>,
) -> Result<Json<Vec<CustomField>>> {
    let applies_to = filled(&params.applies_to)
        .map(|raw| {
            raw.parse::<EntityType>()
                .map_err(|e| AppError::bad_request(e.to_string()))
        })
        .transpose()?;

    let fields = sqlx::query_as::<_, CustomField>(
        r#"
        SELECT * FROM custom_fields
        WHERE $1::TEXT IS NULL OR applies_to = $1
        ORDER BY created_at DESC
        "#
    )
    .bind(applies_to.map(|e| e.as_str()))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(fields))
}

#[derive(Serialize)]
pub struct CreateFieldResponse {
    pub message: String,
    #[serde(rename = "fieldId")]
    pub field_id: Uuid,
}

pub async fn create_field(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(payload): Json<CreateCustomFieldRequest>,
) -> Result<(StatusCode, Json<CreateFieldResponse>)> {
    caller.require_admin()?;

    if payload.label.trim().is_empty() {
        return Err(AppError::bad_request("Field label is required"));
    }

    let field_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO custom_fields (label, field_type, is_required, options, applies_to)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#
    )
    .bind(&payload.label)
    .bind(payload.field_type.as_str())
    .bind(payload.is_required)
    .bind(&payload.options)
    .bind(payload.applies_to.as_str())
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry::new("CREATE_CUSTOM_FIELD")
            .by(&caller)
            .table("custom_fields")
            .record(field_id),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateFieldResponse {
            message: "Custom field created successfully".to_string(),
            field_id,
        }),
    ))
}

pub async fn update_field(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCustomFieldRequest>,
) -> Result<Json<MessageResponse>> {
    caller.require_admin()?;

    let updated = sqlx::query(
        r#"
        UPDATE custom_fields SET
            label = COALESCE($2, label),
            field_type = COALESCE($3, field_type),
            is_required = COALESCE($4, is_required),
            options = COALESCE($5, options),
            applies_to = COALESCE($6, applies_to),
            updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(id)
    .bind(&payload.label)
    .bind(payload.field_type.map(|t| t.as_str()))
    .bind(payload.is_required)
    .bind(&payload.options)
    .bind(payload.applies_to.map(|e| e.as_str()))
    .execute(&state.db)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(field_not_found());
    }

    audit::record(
        &state.db,
        AuditEntry::new("UPDATE_CUSTOM_FIELD")
            .by(&caller)
            .table("custom_fields")
            .record(id),
    )
    .await;

    Ok(Json(MessageResponse::new("Custom field updated successfully")))
}

pub async fn delete_field(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    caller.require_any(&[Role::SuperAdmin])?;

    let deleted = sqlx::query("DELETE FROM custom_fields WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(field_not_found());
    }

    audit::record(
        &state.db,
        AuditEntry::new("DELETE_CUSTOM_FIELD")
            .by(&caller)
            .table("custom_fields")
            .record(id),
    )
    .await;

    Ok(Json(MessageResponse::new("Custom field deleted successfully")))
}
