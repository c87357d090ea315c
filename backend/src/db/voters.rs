//! Voter persistence. Column lists are built from [`VoterFields`], so only
//! whitelisted columns ever reach the SQL text.

use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::Result,
    listing::{contains_pattern, filled, Pagination},
    models::{parse_leading_int, FieldValue, Voter, VoterFields},
};

const SELECT_WITH_CREATOR: &str = r#"
    SELECT v.*, u.full_name AS created_by_name
    FROM voters v
    LEFT JOIN users u ON u.id = v.created_by
"#;

fn bind_value(builder: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Text(v) => builder.push_bind(v.clone()),
        FieldValue::Integer(v) => builder.push_bind(*v),
        FieldValue::Boolean(v) => builder.push_bind(*v),
        FieldValue::Date(v) => builder.push_bind(*v),
    };
}

/// Inserts a voter, resolving its family id first.
///
/// A head of house starts a new family. Anyone else joins the family of
/// the head registered at the same house number, if there is one. Lookup
/// and insert share a transaction holding an advisory lock on the house
/// number, so concurrent creates for one house see each other.
pub async fn insert(pool: &PgPool, mut fields: VoterFields, created_by: Option<Uuid>) -> Result<Voter> {
    let mut tx = pool.begin().await?;

    let house_no = fields.text("house_no").map(str::to_string);
    if let Some(house_no) = &house_no {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(house_no)
            .execute(&mut *tx)
            .await?;
    }

    if fields.is_head_of_house() {
        fields.set_text("family_id", Uuid::new_v4().to_string());
    } else if let Some(house_no) = &house_no {
        let family_id: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT family_id FROM voters
            WHERE house_no = $1 AND head_of_house = 1
            ORDER BY created_at
            LIMIT 1
            "#
        )
        .bind(house_no)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(Some(family_id)) = family_id {
            fields.set_text("family_id", family_id);
        }
    }

    let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO voters (");
    for (column, _) in fields.iter() {
        builder.push(*column).push(", ");
    }
    builder.push("created_by) VALUES (");
    for (_, value) in fields.iter() {
        bind_value(&mut builder, value);
        builder.push(", ");
    }
    builder.push_bind(created_by).push(") RETURNING id");

    let id: Uuid = builder.build_query_scalar().fetch_one(&mut *tx).await?;
    let voter = sqlx::query_as::<_, Voter>(&format!("{SELECT_WITH_CREATOR} WHERE v.id = $1"))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(voter)
}

pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Voter>> {
    let voter = sqlx::query_as::<_, Voter>(&format!("{SELECT_WITH_CREATOR} WHERE v.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(voter)
}

fn update_query(id: Uuid, fields: &VoterFields) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE voters SET ");
    for (column, value) in fields.iter() {
        builder.push(*column).push(" = ");
        bind_value(&mut builder, value);
        builder.push(", ");
    }
    builder.push("updated_at = NOW() WHERE id = ").push_bind(id);
    builder
}

/// Applies a partial update. Returns `None` when the voter does not exist.
pub async fn update(pool: &PgPool, id: Uuid, fields: &VoterFields) -> Result<Option<Voter>> {
    let mut builder = update_query(id, fields);
    let updated = builder.build().execute(pool).await?.rows_affected();
    if updated == 0 {
        return Ok(None);
    }
    find(pool, id).await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM voters WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Head of house first, then oldest first.
pub async fn family(pool: &PgPool, family_id: &str) -> Result<Vec<Voter>> {
    let members = sqlx::query_as::<_, Voter>(&format!(
        "{SELECT_WITH_CREATOR} WHERE v.family_id = $1 ORDER BY v.head_of_house DESC, v.age DESC NULLS LAST"
    ))
    .bind(family_id)
    .fetch_all(pool)
    .await?;
    Ok(members)
}

pub async fn all_with_creator(pool: &PgPool) -> Result<Vec<Voter>> {
    let voters = sqlx::query_as::<_, Voter>(&format!("{SELECT_WITH_CREATOR} ORDER BY v.created_at"))
        .fetch_all(pool)
        .await?;
    Ok(voters)
}

/// Living voters registered in `ward_area`.
pub async fn living_in_area(pool: &PgPool, ward_area: &str) -> Result<Vec<Voter>> {
    let voters = sqlx::query_as::<_, Voter>(&format!(
        "{SELECT_WITH_CREATOR} WHERE v.ward_area = $1 AND v.is_dead = FALSE ORDER BY v.full_name"
    ))
    .bind(ward_area)
    .fetch_all(pool)
    .await?;
    Ok(voters)
}

/// `(political_preference, count)` over living voters in `ward_area`.
pub async fn preference_counts(pool: &PgPool, ward_area: &str) -> Result<Vec<(Option<String>, i64)>> {
    let groups = sqlx::query_as(
        r#"
        SELECT political_preference, COUNT(*)
        FROM voters
        WHERE ward_area = $1 AND is_dead = FALSE
        GROUP BY political_preference
        "#
    )
    .bind(ward_area)
    .fetch_all(pool)
    .await?;
    Ok(groups)
}

#[derive(Debug, Default, Deserialize)]
pub struct VoterFilter {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub gender: Option<String>,
    pub area: Option<String>,
    pub booth: Option<String>,
    pub age_min: Option<String>,
    pub age_max: Option<String>,
    pub mobile_filter: Option<String>,
    pub is_dead: Option<String>,
}

impl VoterFilter {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_params(&self.page, &self.limit, 50)
    }

    fn push_conditions(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE TRUE");

        if let Some(search) = filled(&self.search) {
            let pattern = contains_pattern(search);
            builder.push(" AND (v.full_name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR v.father_husband_name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR v.mobile_number ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR v.voter_id ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        if let Some(gender) = filled(&self.gender) {
            builder.push(" AND v.gender = ").push_bind(gender.to_string());
        }
        if let Some(area) = filled(&self.area) {
            builder.push(" AND v.ward_area ILIKE ").push_bind(contains_pattern(area));
        }
        if let Some(booth) = filled(&self.booth) {
            builder.push(" AND v.booth ILIKE ").push_bind(contains_pattern(booth));
        }
        if let Some(age_min) = filled(&self.age_min).and_then(parse_leading_int) {
            builder.push(" AND v.age >= ").push_bind(age_min);
        }
        if let Some(age_max) = filled(&self.age_max).and_then(parse_leading_int) {
            builder.push(" AND v.age <= ").push_bind(age_max);
        }
        if let Some(is_dead) = self.is_dead.as_deref() {
            builder.push(" AND v.is_dead = ").push_bind(is_dead == "true");
        }
        match filled(&self.mobile_filter) {
            Some("with_mobile") => {
                builder.push(" AND v.mobile_number IS NOT NULL AND v.mobile_number <> ''");
            }
            Some("without_mobile") => {
                builder.push(" AND (v.mobile_number IS NULL OR v.mobile_number = '')");
            }
            _ => {}
        }
    }
}

/// One page of voters matching `filter`, newest first, plus the total.
pub async fn list(pool: &PgPool, filter: &VoterFilter) -> Result<(Vec<Voter>, i64)> {
    let pagination = filter.pagination();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM voters v");
    filter.push_conditions(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Postgres>::new(SELECT_WITH_CREATOR);
    filter.push_conditions(&mut select);
    select
        .push(" ORDER BY v.created_at DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let voters = select.build_query_as::<Voter>().fetch_all(pool).await?;

    Ok((voters, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_sql(filter: &VoterFilter) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM voters v");
        filter.push_conditions(&mut builder);
        builder.sql().to_string()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(
            filter_sql(&VoterFilter::default()),
            "SELECT COUNT(*) FROM voters v WHERE TRUE"
        );
    }

    #[test]
    fn search_and_mobile_filter_combine() {
        let sql = filter_sql(&VoterFilter {
            search: Some("patil".into()),
            mobile_filter: Some("without_mobile".into()),
            ..Default::default()
        });
        assert!(sql.contains("v.full_name ILIKE $1"));
        assert!(sql.contains("v.voter_id ILIKE $4)"));
        assert!(sql.ends_with("AND (v.mobile_number IS NULL OR v.mobile_number = '')"));
    }

    #[test]
    fn blank_and_unparseable_params_are_ignored() {
        let sql = filter_sql(&VoterFilter {
            gender: Some(String::new()),
            age_min: Some("abc".into()),
            age_max: Some("60".into()),
            is_dead: Some("false".into()),
            ..Default::default()
        });
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM voters v WHERE TRUE AND v.age <= $1 AND v.is_dead = $2"
        );
    }

    #[test]
    fn update_sets_only_given_columns() {
        let mut fields = VoterFields::new();
        fields.set_text("booth", "7");
        fields.set("is_dead", FieldValue::Boolean(true));

        let builder = update_query(Uuid::nil(), &fields);
        assert_eq!(
            builder.sql(),
            "UPDATE voters SET booth = $1, is_dead = $2, updated_at = NOW() WHERE id = $3"
        );
    }

    #[test]
    fn voters_page_defaults_to_fifty() {
        assert_eq!(VoterFilter::default().pagination(), Pagination { page: 1, limit: 50 });
    }
}
