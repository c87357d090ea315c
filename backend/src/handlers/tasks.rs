use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::AuthUser,
    error::{AppError, Result},
    extract::{Json, Path, Query},
    handlers::MessageResponse,
    listing::{filled, Pagination},
    models::{
        CreateTaskRequest, TaskPriority, TaskStatus, TaskView, UpdateTaskRequest,
        UpdateTaskStatusRequest,
    },
    AppState,
};

const SELECT_TASK_VIEW: &str = r#"
    SELECT t.*, ut.full_name AS assigned_to_name, ub.full_name AS assigned_by_name
    FROM tasks t
    LEFT JOIN users ut ON ut.id = t.assigned_to
    LEFT JOIN users ub ON ub.id = t.assigned_by
"#;

fn access_denied() -> AppError {
    AppError::forbidden("Access denied")
}

async fn find_task(state: &AppState, id: Uuid) -> Result<TaskView> {
    sqlx::query_as::<_, TaskView>(&format!("{SELECT_TASK_VIEW} WHERE t.id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))
}

fn snapshot(task: &TaskView) -> serde_json::Value {
    serde_json::to_value(task).unwrap_or(serde_json::Value::Null)
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub status: Option<String>,
    pub assigned_to: Option<String>,
    pub priority: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

fn task_list_query(params: &TaskQuery, caller: &AuthUser) -> Result<QueryBuilder<'static, Postgres>> {
    let pagination = Pagination::from_params(&params.page, &params.limit, 20);
    let mut builder = QueryBuilder::<Postgres>::new(SELECT_TASK_VIEW);
    builder.push(" WHERE TRUE");

    if let Some(status) = filled(&params.status) {
        builder.push(" AND t.status = ").push_bind(status.to_string());
    }
    if let Some(assigned_to) = filled(&params.assigned_to) {
        let assigned_to: Uuid = assigned_to
            .parse()
            .map_err(|_| AppError::bad_request("Invalid assigned_to"))?;
        builder.push(" AND t.assigned_to = ").push_bind(assigned_to);
    }
    if let Some(priority) = filled(&params.priority) {
        builder.push(" AND t.priority = ").push_bind(priority.to_string());
    }
    if !caller.is_admin() {
        builder
            .push(" AND (t.assigned_to = ")
            .push_bind(caller.id())
            .push(" OR t.assigned_by = ")
            .push_bind(caller.id())
            .push(")");
    }

    builder
        .push(" ORDER BY t.created_at DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    Ok(builder)
}

/// Field roles only see tasks they are a party to.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Query(params): Query<TaskQuery>,
) -> Result<Json<Vec<TaskView>>> {
    let mut query = task_list_query(&params, &caller)?;
    let tasks = query.build_query_as::<TaskView>().fetch_all(&state.db).await?;
    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskView>> {
    let task = find_task(&state, id).await?;
    if !caller.is_admin() && !task.involves(caller.id()) {
        return Err(access_denied());
    }
    Ok(Json(task))
}

#[derive(Serialize)]
pub struct CreateTaskResponse {
    pub message: String,
    #[serde(rename = "taskId")]
    pub task_id: Uuid,
    pub task: TaskView,
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreateTaskResponse>)> {
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::bad_request("Task title is required"))?
        .to_string();
    let priority = payload.priority.unwrap_or(TaskPriority::Medium);

    let task_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO tasks (title, description, assigned_to, assigned_by, due_date, start_date,
                           status, priority, area, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#
    )
    .bind(&title)
    .bind(&payload.description)
    .bind(payload.assigned_to)
    .bind(caller.id())
    .bind(payload.due_date)
    .bind(payload.start_date)
    .bind(TaskStatus::NotStarted.as_str())
    .bind(priority.as_str())
    .bind(&payload.area)
    .bind(&payload.notes)
    .fetch_one(&state.db)
    .await?;

    let task = find_task(&state, task_id).await?;

    audit::record(
        &state.db,
        AuditEntry::new("CREATE_TASK")
            .by(&caller)
            .table("tasks")
            .record(task_id)
            .new_values(json!({
                "title": title,
                "description": payload.description,
                "assigned_to": payload.assigned_to,
                "assigned_by": caller.id(),
                "due_date": payload.due_date,
                "start_date": payload.start_date,
                "priority": priority,
                "area": payload.area,
                "notes": payload.notes,
                "status": TaskStatus::NotStarted,
            })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            message: "Task created successfully".to_string(),
            task_id,
            task,
        }),
    ))
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub message: String,
    pub task: TaskView,
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>> {
    let old = find_task(&state, id).await?;
    if !caller.is_admin() && !old.involves(caller.id()) {
        return Err(access_denied());
    }

    sqlx::query(
        r#"
        UPDATE tasks SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            assigned_to = CASE WHEN $4 THEN $5 ELSE assigned_to END,
            due_date = CASE WHEN $6 THEN $7 ELSE due_date END,
            start_date = CASE WHEN $8 THEN $9 ELSE start_date END,
            status = COALESCE($10, status),
            priority = COALESCE($11, priority),
            area = COALESCE($12, area),
            notes = COALESCE($13, notes),
            updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.assigned_to.is_some())
    .bind(payload.assigned_to.flatten())
    .bind(payload.due_date.is_some())
    .bind(payload.due_date.flatten())
    .bind(payload.start_date.is_some())
    .bind(payload.start_date.flatten())
    .bind(payload.status.map(|s| s.as_str()))
    .bind(payload.priority.map(|p| p.as_str()))
    .bind(&payload.area)
    .bind(&payload.notes)
    .execute(&state.db)
    .await?;

    let task = find_task(&state, id).await?;

    audit::record(
        &state.db,
        AuditEntry::new("UPDATE_TASK")
            .by(&caller)
            .table("tasks")
            .record(id)
            .old_values(snapshot(&old))
            .new_values(serde_json::to_value(&payload).unwrap_or_default()),
    )
    .await;

    Ok(Json(TaskResponse {
        message: "Task updated successfully".to_string(),
        task,
    }))
}

/// Admins, or whoever assigned the task.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    let task = find_task(&state, id).await?;
    if !caller.is_admin() && task.assigned_by != Some(caller.id()) {
        return Err(access_denied());
    }

    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    audit::record(
        &state.db,
        AuditEntry::new("DELETE_TASK")
            .by(&caller)
            .table("tasks")
            .record(id)
            .old_values(snapshot(&task)),
    )
    .await;

    Ok(Json(MessageResponse::new("Task deleted successfully")))
}

pub async fn my_assigned_tasks(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<Vec<TaskView>>> {
    let tasks = sqlx::query_as::<_, TaskView>(&format!(
        "{SELECT_TASK_VIEW} WHERE t.assigned_to = $1 ORDER BY t.created_at DESC"
    ))
    .bind(caller.id())
    .fetch_all(&state.db)
    .await?;
    Ok(Json(tasks))
}

pub async fn my_created_tasks(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<Vec<TaskView>>> {
    let tasks = sqlx::query_as::<_, TaskView>(&format!(
        "{SELECT_TASK_VIEW} WHERE t.assigned_by = $1 ORDER BY t.created_at DESC"
    ))
    .bind(caller.id())
    .fetch_all(&state.db)
    .await?;
    Ok(Json(tasks))
}

/// Admins, or the assignee. The assigner alone may not move the status.
pub async fn update_task_status(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTaskStatusRequest>,
) -> Result<Json<TaskResponse>> {
    let status: TaskStatus = payload
        .status
        .parse()
        .map_err(|_| AppError::bad_request("Invalid status"))?;

    let old = find_task(&state, id).await?;
    if !caller.is_admin() && old.assigned_to != Some(caller.id()) {
        return Err(access_denied());
    }

    sqlx::query("UPDATE tasks SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(&state.db)
        .await?;

    audit::record(
        &state.db,
        AuditEntry::new("UPDATE_TASK_STATUS")
            .by(&caller)
            .table("tasks")
            .record(id)
            .old_values(json!({ "status": old.status }))
            .new_values(json!({ "status": status })),
    )
    .await;

    let task = find_task(&state, id).await?;
    Ok(Json(TaskResponse {
        message: "Task status updated successfully".to_string(),
        task,
    }))
}
