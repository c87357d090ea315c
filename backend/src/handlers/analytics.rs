use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::{collections::BTreeMap, sync::Arc};
use uuid::Uuid;

use crate::{auth::AuthUser, error::Result, AppState};

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_voters: i64,
    pub active_voters: i64,
    pub active_users: i64,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub in_progress_tasks: i64,
    pub total_sms_sent: i64,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
) -> Result<Json<DashboardMetrics>> {
    let metrics = sqlx::query_as::<_, DashboardMetrics>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM voters) AS total_voters,
            (SELECT COUNT(*) FROM voters WHERE is_dead = FALSE) AS active_voters,
            (SELECT COUNT(*) FROM users WHERE is_active = TRUE) AS active_users,
            (SELECT COUNT(*) FROM tasks) AS total_tasks,
            (SELECT COUNT(*) FROM tasks WHERE status = 'Completed') AS completed_tasks,
            (SELECT COUNT(*) FROM tasks WHERE status = 'In Progress') AS in_progress_tasks,
            (SELECT COALESCE(SUM(total_count), 0)::BIGINT FROM sms_logs) AS total_sms_sent
        "#
    )
    .fetch_one(&state.db)
    .await?;

    Ok(Json(metrics))
}

#[derive(Debug, Serialize, FromRow)]
pub struct GenderCount {
    pub gender: Option<String>,
    pub count: i64,
}

pub async fn gender(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
) -> Result<Json<Vec<GenderCount>>> {
    let counts = sqlx::query_as::<_, GenderCount>(
        "SELECT gender, COUNT(*) AS count FROM voters WHERE is_dead = FALSE GROUP BY gender"
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(counts))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeGroupCount {
    pub age_group: &'static str,
    pub count: i64,
}

fn age_bucket(age: i32) -> &'static str {
    match age {
        a if a < 25 => "18-24",
        a if a < 35 => "25-34",
        a if a < 45 => "35-44",
        a if a < 55 => "45-54",
        a if a < 65 => "55-64",
        _ => "65+",
    }
}

/// Folds per-age counts into labelled buckets, sorted by label. Empty
/// buckets are omitted.
pub fn bucket_ages<I>(ages: I) -> Vec<AgeGroupCount>
where
    I: IntoIterator<Item = (i32, i64)>,
{
    let mut buckets: BTreeMap<&'static str, i64> = BTreeMap::new();
    for (age, count) in ages {
        *buckets.entry(age_bucket(age)).or_default() += count;
    }
    buckets
        .into_iter()
        .map(|(age_group, count)| AgeGroupCount { age_group, count })
        .collect()
}

pub async fn age_groups(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
) -> Result<Json<Vec<AgeGroupCount>>> {
    let rows: Vec<(i32, i64)> = sqlx::query_as(
        r#"
        SELECT age, COUNT(*)
        FROM voters
        WHERE is_dead = FALSE AND age IS NOT NULL
        GROUP BY age
        "#
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(bucket_ages(rows)))
}

#[derive(Debug, Serialize, FromRow)]
pub struct AreaCount {
    pub ward_area: String,
    pub voter_count: i64,
}

pub async fn areas(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
) -> Result<Json<Vec<AreaCount>>> {
    let areas = sqlx::query_as::<_, AreaCount>(
        r#"
        SELECT ward_area, COUNT(*) AS voter_count
        FROM voters
        WHERE is_dead = FALSE AND ward_area IS NOT NULL AND ward_area <> ''
        GROUP BY ward_area
        ORDER BY voter_count DESC
        LIMIT 10
        "#
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(areas))
}

#[derive(Debug, Serialize, FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub action: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

pub async fn recent_activity(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
) -> Result<Json<Vec<Activity>>> {
    let activity = sqlx::query_as::<_, Activity>(
        r#"
        SELECT a.id, a.action, COALESCE(u.full_name, 'System') AS user_name, a.created_at
        FROM audit_logs a
        LEFT JOIN users u ON u.id = a.user_id
        ORDER BY a.created_at DESC
        LIMIT 10
        "#
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(activity))
}
