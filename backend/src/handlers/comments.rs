use axum::{extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::AuthUser,
    error::{AppError, Result},
    extract::{Json, Path},
    handlers::MessageResponse,
    models::{Comment, CreateCommentRequest, EntityType, UpdateCommentRequest},
    AppState,
};

const SELECT_WITH_AUTHOR: &str = r#"
    SELECT c.*, u.full_name AS created_by_name
    FROM comments c
    LEFT JOIN users u ON u.id = c.created_by
"#;

fn not_found_or_unauthorized() -> AppError {
    AppError::not_found("Comment not found or unauthorized")
}

async fn find_comment(state: &AppState, id: Uuid) -> Result<Comment> {
    sqlx::query_as::<_, Comment>(&format!("{SELECT_WITH_AUTHOR} WHERE c.id = $1"))
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(Into::into)
}

fn require_text(comment: &str) -> Result<()> {
    if comment.trim().is_empty() {
        return Err(AppError::bad_request("Comment is required"));
    }
    Ok(())
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    Path((entity_type, entity_id)): Path<(EntityType, Uuid)>,
) -> Result<Json<Vec<Comment>>> {
    let comments = sqlx::query_as::<_, Comment>(&format!(
        "{SELECT_WITH_AUTHOR} WHERE c.entity_type = $1 AND c.entity_id = $2 ORDER BY c.created_at DESC"
    ))
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(comments))
}

#[derive(Serialize)]
pub struct CommentResponse {
    pub message: String,
    pub comment: Comment,
}

pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>)> {
    require_text(&payload.comment)?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO comments (entity_type, entity_id, comment, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#
    )
    .bind(payload.entity_type.as_str())
    .bind(payload.entity_id)
    .bind(&payload.comment)
    .bind(caller.id())
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry::new("CREATE_COMMENT").by(&caller).table("comments").record(id),
    )
    .await;

    let comment = find_comment(&state, id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            message: "Comment created successfully".to_string(),
            comment,
        }),
    ))
}

/// Authors only; anyone else sees the comment as missing.
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<CommentResponse>> {
    require_text(&payload.comment)?;

    let updated = sqlx::query(
        "UPDATE comments SET comment = $3, updated_at = NOW() WHERE id = $1 AND created_by = $2"
    )
    .bind(id)
    .bind(caller.id())
    .bind(&payload.comment)
    .execute(&state.db)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(not_found_or_unauthorized());
    }

    audit::record(
        &state.db,
        AuditEntry::new("UPDATE_COMMENT").by(&caller).table("comments").record(id),
    )
    .await;

    let comment = find_comment(&state, id).await?;
    Ok(Json(CommentResponse {
        message: "Comment updated successfully".to_string(),
        comment,
    }))
}

pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    let deleted = sqlx::query("DELETE FROM comments WHERE id = $1 AND created_by = $2")
        .bind(id)
        .bind(caller.id())
        .execute(&state.db)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(not_found_or_unauthorized());
    }

    audit::record(
        &state.db,
        AuditEntry::new("DELETE_COMMENT").by(&caller).table("comments").record(id),
    )
    .await;

    Ok(Json(MessageResponse::new("Comment deleted successfully")))
}
