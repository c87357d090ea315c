use axum::extract::State;
use std::sync::Arc;

use crate::{
    audit::{self, AuditEntry},
    auth::{issue_token, verify_password, AuthUser, ClientInfo},
    error::{AppError, Result},
    extract::Json,
    handlers::MessageResponse,
    models::{LoginRequest, LoginResponse, User},
    AppState,
};

pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE username = $1 AND is_active = TRUE"
    )
    .bind(&payload.username)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(invalid)?;

    if !verify_password(payload.password, user.password_hash.clone()).await? {
        tracing::info!(username = %payload.username, "Rejected login attempt");
        return Err(invalid());
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET last_login = NOW() WHERE id = $1 RETURNING *"
    )
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    audit::record(&state.db, AuditEntry::new("LOGIN").user(user.id).client(&client)).await;

    let token = issue_token(&user, &state.config.jwt_secret, state.config.jwt_ttl_hours)?;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok(Json(LoginResponse { token, user }))
}

pub async fn me(caller: AuthUser) -> Json<User> {
    Json(caller.user)
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<MessageResponse>> {
    audit::record(&state.db, AuditEntry::new("LOGOUT").by(&caller)).await;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}
