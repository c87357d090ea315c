use axum::extract::State;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    extract::{Json, Query},
    listing::{filled, Page, Pagination},
    models::AuditLog,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
struct AuditFilter {
    action: Option<String>,
    user_id: Option<Uuid>,
    from: Option<NaiveDate>,
    /// Exclusive upper bound: the day after `end_date`.
    until: Option<NaiveDate>,
}

fn parse_date(raw: &str, name: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request(format!("Invalid {name}, expected YYYY-MM-DD")))
}

impl AuditFilter {
    fn from_query(params: &AuditQuery) -> Result<Self> {
        let user_id = filled(&params.user_id)
            .map(|raw| raw.parse().map_err(|_| AppError::bad_request("Invalid user_id")))
            .transpose()?;
        let from = filled(&params.start_date)
            .map(|raw| parse_date(raw, "start_date"))
            .transpose()?;
        let until = filled(&params.end_date)
            .map(|raw| parse_date(raw, "end_date"))
            .transpose()?
            .and_then(|end| end.checked_add_days(Days::new(1)));

        Ok(Self {
            action: filled(&params.action).map(str::to_string),
            user_id,
            from,
            until,
        })
    }

    fn push_conditions(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE TRUE");
        if let Some(action) = &self.action {
            builder.push(" AND a.action = ").push_bind(action.clone());
        }
        if let Some(user_id) = self.user_id {
            builder.push(" AND a.user_id = ").push_bind(user_id);
        }
        if let Some(from) = self.from {
            builder.push(" AND a.created_at >= ").push_bind(from);
        }
        if let Some(until) = self.until {
            builder.push(" AND a.created_at < ").push_bind(until);
        }
    }
}

#[derive(Serialize)]
pub struct AuditLogList {
    pub logs: Vec<AuditLog>,
}

pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Query(params): Query<AuditQuery>,
) -> Result<Json<Page<AuditLogList>>> {
    caller.require_admin()?;

    let filter = AuditFilter::from_query(&params)?;
    let pagination = Pagination::from_params(&params.page, &params.limit, 50);

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs a");
    filter.push_conditions(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;

    let mut select = QueryBuilder::<Postgres>::new(
        "SELECT a.*, u.full_name AS user_name FROM audit_logs a LEFT JOIN users u ON u.id = a.user_id",
    );
    filter.push_conditions(&mut select);
    select
        .push(" ORDER BY a.created_at DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let logs = select.build_query_as::<AuditLog>().fetch_all(&state.db).await?;

    Ok(Json(Page::new(AuditLogList { logs }, total, pagination)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(start: &str, end: &str) -> AuditQuery {
        AuditQuery {
            start_date: Some(start.into()),
            end_date: Some(end.into()),
            ..Default::default()
        }
    }

    #[test]
    fn end_date_includes_the_whole_day() {
        let filter = AuditFilter::from_query(&query("2025-01-01", "2025-01-31")).unwrap();
        assert_eq!(filter.from, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(filter.until, NaiveDate::from_ymd_opt(2025, 2, 1));
    }

    #[test]
    fn malformed_dates_are_rejected() {
        let err = AuditFilter::from_query(&query("01/02/2025", "")).unwrap_err();
        assert!(err.to_string().contains("start_date"));
    }

    #[test]
    fn conditions_follow_supplied_filters() {
        let params = AuditQuery {
            action: Some("LOGIN".into()),
            user_id: Some(Uuid::nil().to_string()),
            end_date: Some("2025-06-30".into()),
            ..Default::default()
        };
        let filter = AuditFilter::from_query(&params).unwrap();
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs a");
        filter.push_conditions(&mut builder);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM audit_logs a WHERE TRUE AND a.action = $1 AND a.user_id = $2 AND a.created_at < $3"
        );
    }

    #[test]
    fn blank_filters_are_ignored() {
        let params = AuditQuery {
            action: Some(" ".into()),
            user_id: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(AuditFilter::from_query(&params).unwrap(), AuditFilter::default());
    }
}
