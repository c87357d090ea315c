//! Translation between spreadsheet rows and voter records.
//!
//! Imports accept several spellings of every column header; the first
//! non-empty candidate wins. Exports always use the canonical headers.

use serde_json::{Map, Value};
use std::future::Future;

use crate::{
    error::Result,
    models::{parse_leading_int, ImportRowError, ImportSummary, Voter, VoterFields},
    spreadsheet::{ExportCell, ParsedRow, SheetRow},
};

/// Failed rows listed in an import summary. The `errors` total still
/// counts every failure.
pub const IMPORT_ERROR_DETAILS: usize = 10;

/// Candidate headers per text column, in lookup order.
const HEADER_FALLBACKS: &[(&str, &[&str])] = &[
    ("full_name", &["Full Name", "full_name", "Name"]),
    ("gender", &["Gender", "gender"]),
    ("father_husband_name", &["Father/Husband Name", "father_husband_name", "Father Name"]),
    ("house_no", &["House No", "house_no", "House Number"]),
    ("ward_area", &["Ward/Area", "ward_area", "Area"]),
    ("district", &["District", "district"]),
    ("taluka", &["Taluka", "taluka"]),
    ("village", &["Village", "village"]),
    ("city", &["City", "city"]),
    ("mobile_number", &["Mobile Number", "mobile_number", "Mobile"]),
    ("whatsapp_number", &["WhatsApp Number", "whatsapp_number", "WhatsApp"]),
    ("political_preference", &["Political Preference", "political_preference", "Party"]),
    ("occupation", &["Occupation", "occupation"]),
    ("voter_id", &["Voter ID", "voter_id", "ID"]),
    ("booth", &["Booth", "booth"]),
    ("caste", &["Caste", "caste"]),
    ("category", &["Category", "category"]),
];

const AGE_HEADERS: &[&str] = &["Age", "age"];
const HEAD_OF_HOUSE_HEADERS: &[&str] = &["Head of House", "head_of_house"];

pub const EXPORT_HEADERS: [&str; 21] = [
    "Voter ID",
    "Full Name",
    "Age",
    "Gender",
    "Father/Husband Name",
    "House No",
    "Ward/Area",
    "District",
    "Taluka",
    "Village",
    "City",
    "Mobile Number",
    "WhatsApp Number",
    "Political Preference",
    "Occupation",
    "Booth",
    "Caste",
    "Category",
    "Head of House",
    "Created Date",
    "Created By",
];

fn lookup<'a>(row: &'a SheetRow, headers: &[&str]) -> Option<&'a str> {
    headers.iter().find_map(|header| match row.get(*header) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim()),
        _ => None,
    })
}

/// Maps one imported row onto voter fields.
///
/// Returns `Ok(None)` for rows without a name; those are skipped silently.
/// Validation failures (an unknown gender, say) come back as errors so the
/// caller can report them against the row.
pub fn map_row(row: &SheetRow) -> Result<Option<VoterFields>> {
    if lookup(row, &["Full Name", "full_name", "Name"]).is_none() {
        return Ok(None);
    }

    let mut body = Map::new();
    for (column, headers) in HEADER_FALLBACKS {
        let value = lookup(row, headers)
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null);
        body.insert(column.to_string(), value);
    }

    let age = lookup(row, AGE_HEADERS)
        .and_then(parse_leading_int)
        .filter(|age| *age != 0);
    body.insert("age".to_string(), age.map(Value::from).unwrap_or(Value::Null));

    let head_of_house = lookup(row, HEAD_OF_HOUSE_HEADERS)
        .and_then(parse_leading_int)
        .unwrap_or(0);
    body.insert("head_of_house".to_string(), Value::from(head_of_house));

    VoterFields::from_json(&body).map(Some)
}

/// Runs every parsed row through [`map_row`] and `insert`, one at a time.
///
/// A failing row never stops the import. Row numbers are 1-based over the
/// parsed rows, so skipped nameless rows still consume a number.
pub async fn import_rows<F, Fut>(rows: Vec<ParsedRow>, mut insert: F) -> ImportSummary
where
    F: FnMut(VoterFields) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut imported = 0;
    let mut errors: Vec<ImportRowError> = Vec::new();

    for (index, parsed) in rows.into_iter().enumerate() {
        let row_number = index + 1;
        let row = match parsed {
            Ok(row) => row,
            Err(error) => {
                errors.push(ImportRowError {
                    row: row_number,
                    error,
                    data: Map::new(),
                });
                continue;
            }
        };

        let outcome = match map_row(&row) {
            Ok(None) => continue,
            Ok(Some(fields)) => insert(fields).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => imported += 1,
            Err(e) => errors.push(ImportRowError {
                row: row_number,
                error: e.to_string(),
                data: row,
            }),
        }
    }

    let error_count = errors.len();
    errors.truncate(IMPORT_ERROR_DETAILS);

    ImportSummary {
        message: "Import completed".to_string(),
        imported,
        errors: error_count,
        error_details: errors,
    }
}

/// One export row, in [`EXPORT_HEADERS`] order.
pub fn export_row(voter: &Voter) -> Vec<ExportCell> {
    let text = |value: &Option<String>| ExportCell::Text(value.clone().unwrap_or_default());

    vec![
        text(&voter.voter_id),
        ExportCell::Text(voter.full_name.clone()),
        match voter.age {
            Some(age) if age != 0 => ExportCell::Number(f64::from(age)),
            _ => ExportCell::Text(String::new()),
        },
        text(&voter.gender),
        text(&voter.father_husband_name),
        text(&voter.house_no),
        text(&voter.ward_area),
        text(&voter.district),
        text(&voter.taluka),
        text(&voter.village),
        text(&voter.city),
        text(&voter.mobile_number),
        text(&voter.whatsapp_number),
        text(&voter.political_preference),
        text(&voter.occupation),
        text(&voter.booth),
        text(&voter.caste),
        text(&voter.category),
        ExportCell::Number(f64::from(voter.head_of_house)),
        ExportCell::Text(voter.created_at.format("%m/%d/%Y").to_string()),
        text(&voter.created_by_name),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AppError, models::FieldValue};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn row(value: Value) -> SheetRow {
        value.as_object().cloned().unwrap()
    }

    fn named(name: &str) -> ParsedRow {
        Ok(row(json!({ "Full Name": name })))
    }

    /// Inserts succeed unless the voter's name starts with "Reject".
    async fn run_import(rows: Vec<ParsedRow>) -> (ImportSummary, Vec<String>) {
        let mut stored = Vec::new();
        let summary = import_rows(rows, |fields| {
            let name = fields.text("full_name").unwrap_or_default().to_string();
            let accepted = !name.starts_with("Reject");
            if accepted {
                stored.push(name.clone());
            }
            async move {
                if accepted {
                    Ok(())
                } else {
                    Err(AppError::bad_request(format!("duplicate voter {name}")))
                }
            }
        })
        .await;
        (summary, stored)
    }

    #[tokio::test]
    async fn import_continues_past_failed_rows() {
        let (summary, stored) = run_import(vec![
            named("Asha Patil"),
            Err("CSV error: record has 3 fields, expected 2".to_string()),
            named("Reject Me"),
            named("Ravi Kulkarni"),
        ])
        .await;

        assert_eq!(stored, vec!["Asha Patil", "Ravi Kulkarni"]);
        assert_eq!(summary.message, "Import completed");
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.errors, 2);

        let parse_failure = &summary.error_details[0];
        assert_eq!(parse_failure.row, 2);
        assert!(parse_failure.data.is_empty());

        let insert_failure = &summary.error_details[1];
        assert_eq!(insert_failure.row, 3);
        assert_eq!(insert_failure.error, "duplicate voter Reject Me");
        assert_eq!(insert_failure.data["Full Name"], "Reject Me");
    }

    #[tokio::test]
    async fn nameless_rows_are_skipped_without_counting() {
        let (summary, stored) = run_import(vec![
            Ok(row(json!({ "Full Name": "  ", "Age": "40" }))),
            Ok(row(json!({ "Ward/Area": "North" }))),
            named("Reject Asha"),
        ])
        .await;

        assert!(stored.is_empty());
        assert_eq!(summary.imported, 0);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.error_details[0].row, 3);
    }

    #[tokio::test]
    async fn error_details_are_capped_but_total_is_not() {
        let mut rows: Vec<ParsedRow> = (0..14).map(|i| named(&format!("Reject {i}"))).collect();
        rows.push(named("Asha Patil"));

        let (summary, _) = run_import(rows).await;

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.errors, 14);
        assert_eq!(summary.error_details.len(), IMPORT_ERROR_DETAILS);
        let numbers: Vec<usize> = summary.error_details.iter().map(|e| e.row).collect();
        assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn first_non_empty_header_wins() {
        let fields = map_row(&row(json!({
            "Full Name": "",
            "Name": "Asha Patil",
            "Ward/Area": "",
            "Area": "North",
            "Mobile": "9800000000",
            "Party": "BJP",
            "ID": "MH/12/345",
        })))
        .unwrap()
        .unwrap();

        assert_eq!(fields.text("full_name"), Some("Asha Patil"));
        assert_eq!(fields.text("ward_area"), Some("North"));
        assert_eq!(fields.text("mobile_number"), Some("9800000000"));
        assert_eq!(fields.text("political_preference"), Some("BJP"));
        assert_eq!(fields.text("voter_id"), Some("MH/12/345"));
    }

    #[test]
    fn rows_without_a_name_are_skipped() {
        assert!(map_row(&row(json!({ "Age": "40", "Booth": "3" }))).unwrap().is_none());
        assert!(map_row(&row(json!({ "Full Name": "   " }))).unwrap().is_none());
    }

    #[test]
    fn missing_values_take_defaults() {
        let fields = map_row(&row(json!({ "full_name": "Ravi" }))).unwrap().unwrap();

        assert_eq!(fields.get("age"), Some(&FieldValue::Integer(None)));
        assert_eq!(fields.integer("head_of_house"), Some(0));
        assert_eq!(fields.get("caste"), Some(&FieldValue::Text(None)));
        assert!(!fields.is_head_of_house());
    }

    #[test]
    fn numbers_use_their_leading_integer() {
        let fields = map_row(&row(json!({
            "Name": "Meera",
            "Age": "0",
            "Head of House": "1.0",
        })))
        .unwrap()
        .unwrap();
        assert_eq!(fields.get("age"), Some(&FieldValue::Integer(None)));
        assert!(fields.is_head_of_house());

        let fields = map_row(&row(json!({ "Name": "Meera", "age": "63 yrs" })))
            .unwrap()
            .unwrap();
        assert_eq!(fields.integer("age"), Some(63));
    }

    #[test]
    fn unknown_gender_is_a_row_error() {
        let err = map_row(&row(json!({ "Name": "Meera", "Gender": "F" }))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid gender value: F");
    }

    #[test]
    fn export_row_follows_header_order() {
        let voter = Voter {
            id: Uuid::new_v4(),
            full_name: "Asha Patil".into(),
            age: Some(34),
            gender: Some("Female".into()),
            father_husband_name: None,
            house_no: Some("12B".into()),
            category: None,
            caste: None,
            sub_caste: None,
            sub_sub_caste: None,
            ward_area: Some("North".into()),
            district: None,
            taluka: None,
            village: None,
            city: None,
            mobile_number: None,
            whatsapp_number: None,
            head_of_house: 1,
            voter_image: None,
            political_preference: None,
            party_designation: None,
            occupation: None,
            occupation_subcategory: None,
            voter_id: Some("MH001".into()),
            present_in_city: true,
            present_city_name: None,
            date_of_birth: None,
            booth: None,
            is_dead: false,
            family_id: None,
            created_by: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap(),
            updated_at: Utc::now(),
            created_by_name: Some("System Administrator".into()),
        };

        let cells = export_row(&voter);
        assert_eq!(cells.len(), EXPORT_HEADERS.len());
        assert_eq!(cells[0], ExportCell::Text("MH001".into()));
        assert_eq!(cells[2], ExportCell::Number(34.0));
        assert_eq!(cells[4], ExportCell::Text(String::new()));
        assert_eq!(cells[18], ExportCell::Number(1.0));
        assert_eq!(cells[19], ExportCell::Text("03/09/2024".into()));
        assert_eq!(cells[20], ExportCell::Text("System Administrator".into()));
    }
}
