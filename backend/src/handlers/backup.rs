use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::process::Command;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::AuthUser,
    error::{AppError, Result},
    models::{Backup, BackupKind, BackupStatus},
    AppState,
};

fn backup_filename(now: chrono::DateTime<Utc>) -> String {
    format!("backup-{}.dump", now.format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

/// Streams the file through SHA-256 on the blocking pool.
async fn file_checksum(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

async fn run_pg_dump(pg_dump: &str, database_url: &str, target: &Path) -> Result<()> {
    let output = Command::new(pg_dump)
        .arg("--format=custom")
        .arg("--file")
        .arg(target)
        .arg(database_url)
        .output()
        .await
        .map_err(|e| AppError::Internal(format!("failed to run {pg_dump}: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(AppError::Internal(format!(
            "pg_dump exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}

async fn mark_failed(state: &AppState, id: Uuid, error: &str) {
    let result = sqlx::query(
        "UPDATE backups SET status = $2, error = $3, updated_at = NOW() WHERE id = $1"
    )
    .bind(id)
    .bind(BackupStatus::Failed.as_str())
    .bind(error)
    .execute(&state.db)
    .await;

    if let Err(e) = result {
        tracing::error!(backup_id = %id, "Failed to record backup failure: {}", e);
    }
}

#[derive(Serialize)]
pub struct CreateBackupResponse {
    pub message: String,
    pub filename: String,
    pub backup: Backup,
}

pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<CreateBackupResponse>> {
    caller.require_admin()?;

    tokio::fs::create_dir_all(&state.config.backup_dir).await?;
    let filename = backup_filename(Utc::now());
    let path = state.config.backup_dir.join(&filename);

    let backup_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO backups (filename, kind, created_by, status)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#
    )
    .bind(&filename)
    .bind(BackupKind::Manual.as_str())
    .bind(caller.id())
    .bind(BackupStatus::Pending.as_str())
    .fetch_one(&state.db)
    .await?;

    tracing::info!(%backup_id, file = %filename, "Starting database backup");

    let dumped = async {
        run_pg_dump(&state.config.pg_dump_path, &state.config.database_url, &path).await?;
        let size = tokio::fs::metadata(&path).await?.len();
        let checksum = file_checksum(path.clone()).await?;
        Ok::<_, AppError>((size, checksum))
    }
    .await;

    let (size, checksum) = match dumped {
        Ok(done) => done,
        Err(e) => {
            tracing::error!(%backup_id, "Backup failed: {}", e);
            mark_failed(&state, backup_id, &e.to_string()).await;
            return Err(e);
        }
    };

    let backup = sqlx::query_as::<_, Backup>(
        r#"
        UPDATE backups SET size = $2, checksum = $3, status = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#
    )
    .bind(backup_id)
    .bind(i64::try_from(size).unwrap_or(i64::MAX))
    .bind(&checksum)
    .bind(BackupStatus::Completed.as_str())
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry::new("CREATE_BACKUP")
            .by(&caller)
            .table("backups")
            .record(backup_id)
            .new_values(json!({ "filename": &filename, "size": size, "checksum": &checksum })),
    )
    .await;

    tracing::info!(%backup_id, size, "Backup completed");

    Ok(Json(CreateBackupResponse {
        message: "Backup created successfully".to_string(),
        filename,
        backup,
    }))
}

pub async fn list_backups(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<Vec<Backup>>> {
    caller.require_admin()?;

    let backups = sqlx::query_as::<_, Backup>(
        r#"
        SELECT b.*, u.full_name AS created_by_name
        FROM backups b
        LEFT JOIN users u ON u.id = b.created_by
        ORDER BY b.created_at DESC
        "#
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(backups))
}
