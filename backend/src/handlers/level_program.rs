use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json as JsonColumn, Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::AuthUser,
    db::voters as voter_store,
    error::{AppError, Result},
    extract::{Json, Path, Query},
    handlers::MessageResponse,
    listing::filled,
    models::{
        AreaSummary, CreateLevelProgramRequest, LevelProgram, PartyStrength, ProgramLevel, Role,
        UpdateLevelProgramRequest, UserSummary,
    },
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct ProgramQuery {
    pub level: Option<String>,
    pub area: Option<String>,
}

fn program_list_query(params: &ProgramQuery) -> Result<QueryBuilder<'static, Postgres>> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT p.*, u.full_name AS supervisor_name FROM level_programs p LEFT JOIN users u ON u.id = p.supervisor WHERE TRUE",
    );
    if let Some(level) = filled(&params.level) {
        let level: ProgramLevel = level
            .parse()
            .map_err(|e: crate::models::InvalidValue| AppError::bad_request(e.to_string()))?;
        builder.push(" AND p.level = ").push_bind(level.as_str());
    }
    if let Some(area) = filled(&params.area) {
        builder.push(" AND p.area = ").push_bind(area.to_string());
    }
    builder.push(" ORDER BY p.created_at DESC");
    Ok(builder)
}

pub async fn list_programs(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    Query(params): Query<ProgramQuery>,
) -> Result<Json<Vec<LevelProgram>>> {
    let mut query = program_list_query(&params)?;
    let programs = query.build_query_as::<LevelProgram>().fetch_all(&state.db).await?;
    Ok(Json(programs))
}

#[derive(Serialize)]
pub struct CreateProgramResponse {
    pub message: String,
    #[serde(rename = "programId")]
    pub program_id: Uuid,
}

pub async fn create_program(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(payload): Json<CreateLevelProgramRequest>,
) -> Result<(StatusCode, Json<CreateProgramResponse>)> {
    caller.require_admin()?;

    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("Program name is required"));
    }

    let program_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO level_programs (name, level, parent_id, area, supervisor, karyakartas,
                                    supporters, party_strength, tasks)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#
    )
    .bind(&payload.name)
    .bind(payload.level.as_str())
    .bind(payload.parent_id)
    .bind(&payload.area)
    .bind(payload.supervisor)
    .bind(&payload.karyakartas)
    .bind(&payload.supporters)
    .bind(JsonColumn(&payload.party_strength))
    .bind(&payload.tasks)
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry::new("CREATE_LEVEL_PROGRAM")
            .by(&caller)
            .table("level_programs")
            .record(program_id),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateProgramResponse {
            message: "Level program created successfully".to_string(),
            program_id,
        }),
    ))
}

pub async fn update_program(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLevelProgramRequest>,
) -> Result<Json<MessageResponse>> {
    caller.require_admin()?;

    let updated = sqlx::query(
        r#"
        UPDATE level_programs SET
            name = COALESCE($2, name),
            level = COALESCE($3, level),
            parent_id = COALESCE($4, parent_id),
            area = COALESCE($5, area),
            supervisor = COALESCE($6, supervisor),
            karyakartas = COALESCE($7, karyakartas),
            supporters = COALESCE($8, supporters),
            party_strength = COALESCE($9, party_strength),
            tasks = COALESCE($10, tasks),
            updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(id)
    .bind(&payload.name)
    .bind(payload.level.map(|l| l.as_str()))
    .bind(payload.parent_id)
    .bind(&payload.area)
    .bind(payload.supervisor)
    .bind(&payload.karyakartas)
    .bind(&payload.supporters)
    .bind(payload.party_strength.as_ref().map(JsonColumn))
    .bind(&payload.tasks)
    .execute(&state.db)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::not_found("Level program not found"));
    }

    audit::record(
        &state.db,
        AuditEntry::new("UPDATE_LEVEL_PROGRAM")
            .by(&caller)
            .table("level_programs")
            .record(id),
    )
    .await;

    Ok(Json(MessageResponse::new("Level program updated successfully")))
}

async fn area_staff(state: &AppState, role: Role, area: &str) -> Result<Vec<UserSummary>> {
    let users = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT id, full_name, username, email, mobile
        FROM users
        WHERE role = $1 AND booth_access = $2
        ORDER BY full_name
        "#
    )
    .bind(role.as_str())
    .bind(area)
    .fetch_all(&state.db)
    .await?;
    Ok(users)
}

pub async fn area_summary(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    Path(area): Path<String>,
) -> Result<Json<AreaSummary>> {
    let (supervisors, karyakartas, supporters, groups) = tokio::try_join!(
        area_staff(&state, Role::Supervisor, &area),
        area_staff(&state, Role::Karyakarta, &area),
        voter_store::living_in_area(&state.db, &area),
        voter_store::preference_counts(&state.db, &area),
    )?;

    let party_strength =
        PartyStrength::from_groups(groups.iter().map(|(pref, count)| (pref.as_deref(), *count)));

    Ok(Json(AreaSummary {
        area,
        supervisors,
        karyakartas,
        supporters,
        party_strength,
    }))
}
