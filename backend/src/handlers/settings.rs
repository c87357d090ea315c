use axum::extract::State;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::{
    audit::{self, AuditEntry},
    auth::AuthUser,
    error::Result,
    extract::Json,
    handlers::MessageResponse,
    models::Setting,
    AppState,
};

/// Settings are stored as text; strings are kept verbatim and every other
/// JSON value is stored in its serialized form.
fn setting_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
) -> Result<Json<Map<String, Value>>> {
    let rows = sqlx::query_as::<_, Setting>("SELECT * FROM settings ORDER BY key")
        .fetch_all(&state.db)
        .await?;

    let settings = rows
        .into_iter()
        .map(|s| (s.key, s.value.map(Value::String).unwrap_or(Value::Null)))
        .collect();

    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(settings): Json<Map<String, Value>>,
) -> Result<Json<MessageResponse>> {
    caller.require_admin()?;

    let mut tx = state.db.begin().await?;
    for (key, value) in &settings {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#
        )
        .bind(key)
        .bind(setting_text(value))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    audit::record(
        &state.db,
        AuditEntry::new("UPDATE_SETTINGS")
            .by(&caller)
            .table("settings")
            .new_values(Value::Object(settings)),
    )
    .await;

    Ok(Json(MessageResponse::new("Settings updated successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_are_stored_as_text() {
        assert_eq!(setting_text(&json!("Ward 4")), Some("Ward 4".to_string()));
        assert_eq!(setting_text(&json!(true)), Some("true".to_string()));
        assert_eq!(setting_text(&json!(25)), Some("25".to_string()));
        assert_eq!(setting_text(&json!(["a"])), Some("[\"a\"]".to_string()));
        assert_eq!(setting_text(&Value::Null), None);
    }
}
