use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::AuthUser,
    db::voters::{self as store, VoterFilter},
    error::{AppError, Result},
    extract::{Json, Path, Query},
    handlers::MessageResponse,
    listing::Page,
    models::{FieldValue, ImportSummary, Voter, VoterFields},
    spreadsheet::{self, UploadFormat},
    voter_mapping::{export_row, import_rows, EXPORT_HEADERS},
    AppState,
};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

fn voter_not_found() -> AppError {
    AppError::not_found("Voter not found")
}

fn voter_body(body: Value) -> Result<VoterFields> {
    match body {
        Value::Object(map) => VoterFields::from_json(&map),
        _ => Err(AppError::bad_request("Request body must be a JSON object")),
    }
}

fn snapshot(voter: &Voter) -> Value {
    serde_json::to_value(voter).unwrap_or(Value::Null)
}

#[derive(Serialize)]
pub struct VoterList {
    pub voters: Vec<Voter>,
}

pub async fn list_voters(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    Query(filter): Query<VoterFilter>,
) -> Result<Json<Page<VoterList>>> {
    let (voters, total) = store::list(&state.db, &filter).await?;
    Ok(Json(Page::new(VoterList { voters }, total, filter.pagination())))
}

pub async fn get_voter(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Voter>> {
    let voter = store::find(&state.db, id).await?.ok_or_else(voter_not_found)?;
    Ok(Json(voter))
}

#[derive(Serialize)]
pub struct CreateVoterResponse {
    pub message: String,
    #[serde(rename = "voterId")]
    pub voter_id: Uuid,
    pub voter: Voter,
}

pub async fn create_voter(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<CreateVoterResponse>)> {
    let fields = voter_body(body)?;
    if fields.text("full_name").is_none() {
        return Err(AppError::bad_request("Full name is required"));
    }

    let new_values = fields.to_json();
    let voter = store::insert(&state.db, fields, Some(caller.id())).await?;

    audit::record(
        &state.db,
        AuditEntry::new("CREATE_VOTER")
            .by(&caller)
            .table("voters")
            .record(voter.id)
            .new_values(new_values),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateVoterResponse {
            message: "Voter created successfully".to_string(),
            voter_id: voter.id,
            voter,
        }),
    ))
}

#[derive(Serialize)]
pub struct UpdateVoterResponse {
    pub message: String,
    pub voter: Voter,
}

pub async fn update_voter(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<UpdateVoterResponse>> {
    let old = store::find(&state.db, id).await?.ok_or_else(voter_not_found)?;

    let fields = voter_body(body)?;
    if matches!(fields.get("full_name"), Some(FieldValue::Text(None))) {
        return Err(AppError::bad_request("Full name is required"));
    }

    let voter = store::update(&state.db, id, &fields)
        .await?
        .ok_or_else(voter_not_found)?;

    audit::record(
        &state.db,
        AuditEntry::new("UPDATE_VOTER")
            .by(&caller)
            .table("voters")
            .record(id)
            .old_values(snapshot(&old))
            .new_values(fields.to_json()),
    )
    .await;

    Ok(Json(UpdateVoterResponse {
        message: "Voter updated successfully".to_string(),
        voter,
    }))
}

pub async fn delete_voter(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    let old = store::find(&state.db, id).await?.ok_or_else(voter_not_found)?;

    if !store::delete(&state.db, id).await? {
        return Err(voter_not_found());
    }

    audit::record(
        &state.db,
        AuditEntry::new("DELETE_VOTER")
            .by(&caller)
            .table("voters")
            .record(id)
            .old_values(snapshot(&old)),
    )
    .await;

    Ok(Json(MessageResponse::new("Voter deleted successfully")))
}

pub async fn family_members(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    Path(family_id): Path<String>,
) -> Result<Json<Vec<Voter>>> {
    Ok(Json(store::family(&state.db, &family_id).await?))
}

pub async fn import_voters(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ImportSummary>> {
    caller.require_admin()?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(format!("Invalid upload: {e}")))?;
        upload = Some((filename, data));
    }

    let (filename, data) = upload.ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    let format = UploadFormat::from_filename(&filename)
        .ok_or_else(|| AppError::bad_request("Only Excel and CSV files are allowed"))?;

    let rows = tokio::task::spawn_blocking(move || spreadsheet::parse_upload(format, &data))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let db = &state.db;
    let created_by = Some(caller.id());
    let summary = import_rows(rows, |fields| async move {
        store::insert(db, fields, created_by).await.map(drop)
    })
    .await;

    audit::record(
        &state.db,
        AuditEntry::new("IMPORT_VOTERS")
            .by(&caller)
            .table("voters")
            .new_values(json!({
                "imported_count": summary.imported,
                "error_count": summary.errors,
                "filename": &filename,
            })),
    )
    .await;

    tracing::info!(
        file = %filename,
        imported = summary.imported,
        errors = summary.errors,
        "Voter import finished"
    );

    Ok(Json(summary))
}

/// The dated download name, and the per-request file the workbook is
/// written to so overlapping exports never share a path.
fn export_names(today: NaiveDate, request_id: Uuid) -> (String, String) {
    let stem = format!("voters_export_{}", today.format("%Y-%m-%d"));
    (format!("{stem}.xlsx"), format!("{stem}_{request_id}.xlsx"))
}

pub async fn export_voters(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<impl IntoResponse> {
    caller.require_admin()?;

    let voters = store::all_with_creator(&state.db).await?;
    let exported = voters.len();
    let rows: Vec<_> = voters.iter().map(export_row).collect();

    tokio::fs::create_dir_all(&state.config.upload_dir).await?;
    let (filename, scratch) = export_names(Utc::now().date_naive(), Uuid::new_v4());
    let path = state.config.upload_dir.join(scratch);

    let write_path = path.clone();
    tokio::task::spawn_blocking(move || {
        spreadsheet::write_xlsx(&write_path, "Voters", &EXPORT_HEADERS, &rows)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    let bytes = tokio::fs::read(&path).await?;

    audit::record(
        &state.db,
        AuditEntry::new("EXPORT_VOTERS")
            .by(&caller)
            .table("voters")
            .new_values(json!({
                "exported_count": exported,
                "filename": &filename,
            })),
    )
    .await;

    let delay = state.config.export_cleanup_delay;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!(path = %path.display(), "Export file already gone: {}", e);
        }
    });

    tracing::info!(file = %filename, exported, "Voter export written");

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_exports_write_to_distinct_files() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let (first_download, first_file) = export_names(today, Uuid::new_v4());
        let (second_download, second_file) = export_names(today, Uuid::new_v4());

        assert_eq!(first_download, "voters_export_2024-03-09.xlsx");
        assert_eq!(first_download, second_download);
        assert_ne!(first_file, second_file);
        assert!(first_file.starts_with("voters_export_2024-03-09_"));
        assert!(first_file.ends_with(".xlsx"));
    }
}
