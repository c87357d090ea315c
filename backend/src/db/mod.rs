use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{auth::hash_password, config::Config, models::Role};

pub mod voters;

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Opens the pool, retrying while the database comes up.
pub async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let mut attempt = 1;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < config.connect_attempts => {
                warn!(
                    attempt,
                    max_attempts = config.connect_attempts,
                    "Database not reachable yet: {}",
                    e
                );
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to connect to database after {attempt} attempts")
                })
            }
        }
    }
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to apply database migrations")?;
    Ok(())
}

/// Creates the bootstrap Super Admin unless one already exists.
pub async fn seed_default_admin(pool: &PgPool) -> anyhow::Result<()> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
        .bind(Role::SuperAdmin.as_str())
        .fetch_one(pool)
        .await?;

    if existing > 0 {
        return Ok(());
    }

    let password_hash = hash_password("admin123".to_string())
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    sqlx::query(
        r#"
        INSERT INTO users (username, full_name, email, mobile, password_hash, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (username) DO NOTHING
        "#
    )
    .bind("admin")
    .bind("System Administrator")
    .bind("admin@system.com")
    .bind("1234567890")
    .bind(&password_hash)
    .bind(Role::SuperAdmin.as_str())
    .execute(pool)
    .await
    .context("Failed to seed default admin")?;

    info!("👤 Default admin user created (admin / admin123)");
    Ok(())
}
