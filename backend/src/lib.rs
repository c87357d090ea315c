use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod listing;
pub mod models;
pub mod sms;
pub mod spreadsheet;
pub mod voter_mapping;

use config::Config;
use sms::SmsGateway;

pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub sms: SmsGateway,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    message: String,
    timestamp: DateTime<Utc>,
    version: String,
    database: String,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Json(HealthResponse {
        status: "OK".to_string(),
        message: "Voter Management System API is running".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status.to_string(),
    })
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring malformed CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}

pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);
    let cors = cors_layer(&state.config);

    Router::new()
        // Health
        .route("/api/health", get(health_check))

        // Auth
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/logout", post(handlers::auth::logout))

        // Users
        .route("/api/users", get(handlers::users::list_users).post(handlers::users::create_user))
        .route("/api/users/by-role", get(handlers::users::users_by_role))
        .route("/api/users/:id", put(handlers::users::update_user).delete(handlers::users::delete_user))

        // Voters
        .route("/api/voters", get(handlers::voters::list_voters).post(handlers::voters::create_voter))
        .route("/api/voters/import", post(handlers::voters::import_voters))
        .route("/api/voters/export/excel", get(handlers::voters::export_voters))
        .route("/api/voters/family/:family_id", get(handlers::voters::family_members))
        .route(
            "/api/voters/:id",
            get(handlers::voters::get_voter)
                .put(handlers::voters::update_voter)
                .delete(handlers::voters::delete_voter),
        )

        // Tasks
        .route("/api/tasks", get(handlers::tasks::list_tasks).post(handlers::tasks::create_task))
        .route("/api/tasks/my/assigned", get(handlers::tasks::my_assigned_tasks))
        .route("/api/tasks/my/created", get(handlers::tasks::my_created_tasks))
        .route(
            "/api/tasks/:id",
            get(handlers::tasks::get_task)
                .put(handlers::tasks::update_task)
                .delete(handlers::tasks::delete_task),
        )
        .route("/api/tasks/:id/status", patch(handlers::tasks::update_task_status))

        // SMS
        .route("/api/sms/send", post(handlers::sms::send_sms))
        .route("/api/sms/logs", get(handlers::sms::sms_logs))
        .route("/api/sms/stats", get(handlers::sms::sms_stats))

        // Notifications
        .route("/api/notifications/send", post(handlers::notifications::send_notification))
        .route("/api/notifications/read/:id", post(handlers::notifications::mark_read))
        .route("/api/notifications/my", get(handlers::notifications::my_notifications))
        .route("/api/notifications/logs", get(handlers::notifications::notification_logs))
        .route("/api/notifications/stats", get(handlers::notifications::notification_stats))

        // Analytics
        .route("/api/analytics/dashboard", get(handlers::analytics::dashboard))
        .route("/api/analytics/gender", get(handlers::analytics::gender))
        .route("/api/analytics/age-groups", get(handlers::analytics::age_groups))
        .route("/api/analytics/areas", get(handlers::analytics::areas))
        .route("/api/analytics/recent-activity", get(handlers::analytics::recent_activity))

        // Backups
        .route("/api/backup/create", post(handlers::backup::create_backup))
        .route("/api/backup/list", get(handlers::backup::list_backups))

        // Audit
        .route("/api/audit", get(handlers::audit_logs::list_audit_logs))
        .route("/api/audit-logs", get(handlers::audit_logs::list_audit_logs))

        // Settings
        .route("/api/settings", get(handlers::settings::get_settings).put(handlers::settings::update_settings))

        // Level programs
        .route(
            "/api/level-program",
            get(handlers::level_program::list_programs).post(handlers::level_program::create_program),
        )
        .route("/api/level-program/:id", put(handlers::level_program::update_program))
        .route("/api/level-program/area-summary/:area", get(handlers::level_program::area_summary))

        // Custom fields
        .route(
            "/api/custom-fields",
            get(handlers::custom_fields::list_fields).post(handlers::custom_fields::create_field),
        )
        .route(
            "/api/custom-fields/:id",
            put(handlers::custom_fields::update_field).delete(handlers::custom_fields::delete_field),
        )

        // Comments
        .route("/api/comments", post(handlers::comments::create_comment))
        // One parameter name per path position: here `:id` holds the entity type.
        .route("/api/comments/:id/:entity_id", get(handlers::comments::list_comments))
        .route(
            "/api/comments/:id",
            put(handlers::comments::update_comment).delete(handlers::comments::delete_comment),
        )

        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
