use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::{hash_password, AuthUser},
    error::{is_unique_violation, AppError, Result},
    extract::{Json, Path, Query},
    handlers::MessageResponse,
    listing::filled,
    models::{CreateUserRequest, Role, UpdateUserRequest, User, UserSummary},
    AppState,
};

const DUPLICATE_USER: &str = "Username or email already exists";

fn map_duplicate(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::bad_request(DUPLICATE_USER)
    } else {
        err.into()
    }
}

async fn find_user(state: &AppState, id: Uuid) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<Vec<User>>> {
    caller.require_admin()?;

    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(users))
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub message: String,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>)> {
    caller.require_admin()?;

    let required = [
        &payload.username,
        &payload.full_name,
        &payload.email,
        &payload.mobile,
        &payload.password,
    ];
    if required.iter().any(|v| v.trim().is_empty()) {
        return Err(AppError::bad_request(
            "Username, full name, email, mobile and password are required",
        ));
    }

    let role = payload.role.unwrap_or(Role::Karyakarta);
    if !caller.role().can_manage(role) {
        return Err(AppError::forbidden(
            "Admins can only create Supervisors and Karyakartas.",
        ));
    }

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 OR email = $2)"
    )
    .bind(&payload.username)
    .bind(&payload.email)
    .fetch_one(&state.db)
    .await?;

    if exists {
        return Err(AppError::bad_request(DUPLICATE_USER));
    }

    let password_hash = hash_password(payload.password).await?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, full_name, email, mobile, age, address, id_number, dob,
                           password_hash, designation, role, booth_access)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING id
        "#
    )
    .bind(&payload.username)
    .bind(&payload.full_name)
    .bind(&payload.email)
    .bind(&payload.mobile)
    .bind(payload.age)
    .bind(&payload.address)
    .bind(&payload.id_number)
    .bind(payload.dob)
    .bind(&password_hash)
    .bind(&payload.designation)
    .bind(role.as_str())
    .bind(&payload.booth_access)
    .fetch_one(&state.db)
    .await
    .map_err(map_duplicate)?;

    audit::record(
        &state.db,
        AuditEntry::new("CREATE_USER").by(&caller).table("users").record(user_id),
    )
    .await;

    tracing::info!(%user_id, role = %role, created_by = %caller.id(), "User created");

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            message: "User created successfully".to_string(),
            user_id,
        }),
    ))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<MessageResponse>> {
    caller.require_admin()?;

    let target = find_user(&state, id).await?;

    if id != caller.id() && !caller.role().can_manage(target.role) {
        return Err(AppError::forbidden(
            "Admins are not allowed to edit other Admins or Super Admins.",
        ));
    }
    if let Some(role) = payload.role {
        if role != target.role && !caller.role().can_manage(role) {
            return Err(AppError::forbidden("Insufficient permissions to assign this role"));
        }
    }

    let password_hash = match payload.password.filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password(password).await?),
        None => None,
    };

    sqlx::query(
        r#"
        UPDATE users SET
            username = COALESCE($2, username),
            full_name = COALESCE($3, full_name),
            email = COALESCE($4, email),
            mobile = COALESCE($5, mobile),
            age = COALESCE($6, age),
            address = COALESCE($7, address),
            id_number = COALESCE($8, id_number),
            dob = COALESCE($9, dob),
            password_hash = COALESCE($10, password_hash),
            photo = COALESCE($11, photo),
            designation = COALESCE($12, designation),
            role = COALESCE($13, role),
            booth_access = COALESCE($14, booth_access),
            is_active = COALESCE($15, is_active),
            updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(id)
    .bind(&payload.username)
    .bind(&payload.full_name)
    .bind(&payload.email)
    .bind(&payload.mobile)
    .bind(payload.age)
    .bind(&payload.address)
    .bind(&payload.id_number)
    .bind(payload.dob)
    .bind(&password_hash)
    .bind(&payload.photo)
    .bind(&payload.designation)
    .bind(payload.role.map(|r| r.as_str()))
    .bind(&payload.booth_access)
    .bind(payload.is_active)
    .execute(&state.db)
    .await
    .map_err(map_duplicate)?;

    audit::record(
        &state.db,
        AuditEntry::new("UPDATE_USER").by(&caller).table("users").record(id),
    )
    .await;

    Ok(Json(MessageResponse::new("User updated successfully")))
}

/// Deactivates the account; the row is kept for audit history.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    caller.require_admin()?;

    if id == caller.id() {
        return Err(AppError::bad_request("You can't delete yourself"));
    }

    let target = find_user(&state, id).await?;
    if !caller.role().can_manage(target.role) {
        return Err(AppError::forbidden(
            "You can't delete this user. Admins can only delete Supervisors and Karyakartas.",
        ));
    }

    sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    audit::record(
        &state.db,
        AuditEntry::new("DELETE_USER").by(&caller).table("users").record(id),
    )
    .await;

    tracing::info!(user_id = %id, deleted_by = %caller.id(), "User deactivated");

    Ok(Json(MessageResponse::new("User deleted successfully")))
}

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub role: Option<String>,
}

pub async fn users_by_role(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Query(params): Query<RoleQuery>,
) -> Result<Json<Vec<UserSummary>>> {
    caller.require_admin()?;

    let role = filled(&params.role).ok_or_else(|| AppError::bad_request("Role is required"))?;

    let users = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT id, full_name, username, email, mobile
        FROM users
        WHERE role = $1 AND is_active = TRUE
        ORDER BY full_name
        "#
    )
    .bind(role)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(users))
}
