use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Voter {
    pub id: Uuid,
    pub full_name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub father_husband_name: Option<String>,
    pub house_no: Option<String>,
    pub category: Option<String>,
    pub caste: Option<String>,
    pub sub_caste: Option<String>,
    pub sub_sub_caste: Option<String>,
    pub ward_area: Option<String>,
    pub district: Option<String>,
    pub taluka: Option<String>,
    pub village: Option<String>,
    pub city: Option<String>,
    pub mobile_number: Option<String>,
    pub whatsapp_number: Option<String>,
    pub head_of_house: i32,
    pub voter_image: Option<String>,
    pub political_preference: Option<String>,
    pub party_designation: Option<String>,
    pub occupation: Option<String>,
    pub occupation_subcategory: Option<String>,
    pub voter_id: Option<String>,
    pub present_in_city: bool,
    pub present_city_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub booth: Option<String>,
    pub is_dead: bool,
    pub family_id: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub created_by_name: Option<String>,
}

pub const GENDERS: [&str; 3] = ["Male", "Female", "Other"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Gender,
    Integer,
    /// Integer that never stores NULL; unparseable input becomes 0.
    Flag,
    Boolean,
    Date,
}

/// Columns a client may write, and how their raw values are coerced.
pub const VOTER_COLUMNS: &[(&str, ColumnKind)] = &[
    ("full_name", ColumnKind::Text),
    ("age", ColumnKind::Integer),
    ("gender", ColumnKind::Gender),
    ("father_husband_name", ColumnKind::Text),
    ("house_no", ColumnKind::Text),
    ("category", ColumnKind::Text),
    ("caste", ColumnKind::Text),
    ("sub_caste", ColumnKind::Text),
    ("sub_sub_caste", ColumnKind::Text),
    ("ward_area", ColumnKind::Text),
    ("district", ColumnKind::Text),
    ("taluka", ColumnKind::Text),
    ("village", ColumnKind::Text),
    ("city", ColumnKind::Text),
    ("mobile_number", ColumnKind::Text),
    ("whatsapp_number", ColumnKind::Text),
    ("head_of_house", ColumnKind::Flag),
    ("voter_image", ColumnKind::Text),
    ("political_preference", ColumnKind::Text),
    ("party_designation", ColumnKind::Text),
    ("occupation", ColumnKind::Text),
    ("occupation_subcategory", ColumnKind::Text),
    ("voter_id", ColumnKind::Text),
    ("present_in_city", ColumnKind::Boolean),
    ("present_city_name", ColumnKind::Text),
    ("date_of_birth", ColumnKind::Date),
    ("booth", ColumnKind::Text),
    ("is_dead", ColumnKind::Boolean),
    ("family_id", ColumnKind::Text),
];

pub fn column_kind(name: &str) -> Option<(&'static str, ColumnKind)> {
    VOTER_COLUMNS
        .iter()
        .find(|(column, _)| *column == name)
        .map(|(column, kind)| (*column, *kind))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(Option<String>),
    Integer(Option<i32>),
    Boolean(bool),
    Date(Option<NaiveDate>),
}

/// An ordered set of voter column assignments, validated against
/// [`VOTER_COLUMNS`]. Used for inserts, partial updates and imports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoterFields {
    values: Vec<(&'static str, FieldValue)>,
}

impl VoterFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalises a JSON body: unknown keys are ignored, empty strings
    /// become NULL, numeric and boolean columns are coerced leniently.
    pub fn from_json(body: &Map<String, Value>) -> Result<Self, AppError> {
        let mut fields = Self::new();
        for (key, raw) in body {
            let Some((column, kind)) = column_kind(key) else {
                continue;
            };
            let value = coerce(column, kind, raw).map_err(AppError::BadRequest)?;
            fields.set(column, value);
        }
        Ok(fields)
    }

    pub fn set(&mut self, column: &'static str, value: FieldValue) {
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
    }

    pub fn set_text(&mut self, column: &'static str, value: impl Into<String>) {
        let value = value.into();
        let value = if value.is_empty() { None } else { Some(value) };
        self.set(column, FieldValue::Text(value));
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        match self.get(column) {
            Some(FieldValue::Text(Some(v))) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, column: &str) -> Option<i32> {
        match self.get(column) {
            Some(FieldValue::Integer(v)) => *v,
            _ => None,
        }
    }

    pub fn is_head_of_house(&self) -> bool {
        self.integer("head_of_house") == Some(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue)> {
        self.values.iter()
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(column, value)| {
                (
                    column.to_string(),
                    serde_json::to_value(value).unwrap_or(Value::Null),
                )
            })
            .collect();
        Value::Object(map)
    }
}

fn coerce(column: &str, kind: ColumnKind, raw: &Value) -> Result<FieldValue, String> {
    match kind {
        ColumnKind::Text => Ok(FieldValue::Text(as_text(raw))),
        ColumnKind::Gender => {
            let gender = as_text(raw);
            match gender.as_deref() {
                Some(g) if !GENDERS.contains(&g) => Err(format!("Invalid gender value: {g}")),
                _ => Ok(FieldValue::Text(gender)),
            }
        }
        ColumnKind::Integer => match as_text(raw) {
            None => Ok(FieldValue::Integer(None)),
            Some(text) => parse_leading_int(&text)
                .map(|n| FieldValue::Integer(Some(n)))
                .ok_or_else(|| format!("{column} must be a number")),
        },
        ColumnKind::Flag => Ok(FieldValue::Integer(Some(
            as_text(raw)
                .and_then(|text| parse_leading_int(&text))
                .unwrap_or(0),
        ))),
        ColumnKind::Boolean => Ok(FieldValue::Boolean(match raw {
            Value::Bool(b) => *b,
            Value::String(s) => s == "true",
            _ => false,
        })),
        ColumnKind::Date => match as_text(raw) {
            None => Ok(FieldValue::Date(None)),
            Some(text) => parse_date(&text)
                .map(|d| FieldValue::Date(Some(d)))
                .ok_or_else(|| format!("{column} must be a date (YYYY-MM-DD)")),
        },
    }
}

fn as_text(raw: &Value) -> Option<String> {
    match raw {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Reads the integer prefix of `text` ("42 years" → 42, "25.9" → 25).
pub fn parse_leading_int(text: &str) -> Option<i32> {
    let trimmed = text.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i32>().ok().map(|n| sign * n)
}

/// Accepts plain dates and full RFC 3339 timestamps.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

#[derive(Debug, Serialize)]
pub struct ImportRowError {
    pub row: usize,
    pub error: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub message: String,
    pub imported: usize,
    pub errors: usize,
    #[serde(rename = "errorDetails")]
    pub error_details: Vec<ImportRowError>,
}
