//! Reading uploaded `.csv` / `.xlsx` / `.xls` files into header-keyed rows
//! and writing `.xlsx` exports.

use std::{io::Cursor, path::Path};

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::Workbook;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// One data row keyed by column header. Values are always strings.
pub type SheetRow = Map<String, Value>;

/// A row that failed to parse carries its error text instead.
pub type ParsedRow = std::result::Result<SheetRow, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Csv,
    Excel,
}

impl UploadFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(UploadFormat::Csv),
            "xlsx" | "xls" => Some(UploadFormat::Excel),
            _ => None,
        }
    }
}

pub fn parse_upload(format: UploadFormat, bytes: &[u8]) -> Result<Vec<ParsedRow>> {
    match format {
        UploadFormat::Csv => parse_csv(bytes),
        UploadFormat::Excel => parse_excel(bytes),
    }
}

pub fn parse_csv(bytes: &[u8]) -> Result<Vec<ParsedRow>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::bad_request(format!("Invalid CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        match record {
            Ok(record) => {
                if record.iter().all(str::is_empty) {
                    continue;
                }
                rows.push(Ok(zip_row(&headers, record.iter())));
            }
            Err(e) => rows.push(Err(format!("Line {}: CSV parse error - {}", line + 2, e))),
        }
    }

    Ok(rows)
}

pub fn parse_excel(bytes: &[u8]) -> Result<Vec<ParsedRow>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| AppError::bad_request(format!("Unreadable spreadsheet: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::bad_request("Spreadsheet has no worksheets"))?
        .map_err(|e| AppError::bad_request(format!("Unreadable worksheet: {e}")))?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header) => header.iter().map(cell_text).collect(),
        None => return Ok(Vec::new()),
    };

    let rows = sheet_rows
        .filter(|row| !row.iter().all(|cell| matches!(cell, Data::Empty)))
        .map(|row| {
            let values: Vec<String> = row.iter().map(cell_text).collect();
            Ok(zip_row(&headers, values.iter().map(String::as_str)))
        })
        .collect();

    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        other => other.to_string(),
    }
}

fn zip_row<'a>(headers: &[String], values: impl Iterator<Item = &'a str>) -> SheetRow {
    headers
        .iter()
        .zip(values)
        .filter(|(header, _)| !header.is_empty())
        .map(|(header, value)| (header.clone(), Value::String(value.to_string())))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportCell {
    Text(String),
    Number(f64),
}

/// Writes a single-sheet workbook with a header row.
pub fn write_xlsx(
    path: &Path,
    sheet_name: &str,
    headers: &[&str],
    rows: &[Vec<ExportCell>],
) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name).map_err(xlsx_error)?;

    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, *header)
            .map_err(xlsx_error)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let row_num = (index + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                ExportCell::Text(text) => worksheet.write_string(row_num, col, text.as_str()),
                ExportCell::Number(n) => worksheet.write_number(row_num, col, *n),
            }
            .map_err(xlsx_error)?;
        }
    }

    workbook.save(path).map_err(xlsx_error)?;
    Ok(())
}

fn xlsx_error(e: rust_xlsxwriter::XlsxError) -> AppError {
    AppError::Spreadsheet(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_rows(rows: Vec<ParsedRow>) -> Vec<SheetRow> {
        rows.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn format_follows_extension_case_insensitively() {
        assert_eq!(UploadFormat::from_filename("voters.CSV"), Some(UploadFormat::Csv));
        assert_eq!(UploadFormat::from_filename("ward-4.xlsx"), Some(UploadFormat::Excel));
        assert_eq!(UploadFormat::from_filename("old.xls"), Some(UploadFormat::Excel));
        assert_eq!(UploadFormat::from_filename("voters.pdf"), None);
        assert_eq!(UploadFormat::from_filename("noext"), None);
    }

    #[test]
    fn csv_rows_are_keyed_by_trimmed_headers() {
        let csv = "\u{feff}Full Name , Age,\"Ward/Area\"\n\"Patil, Asha\",34,North\n\n Ravi ,,\n";
        let rows = ok_rows(parse_csv(csv.as_bytes()).unwrap());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Full Name"], "Patil, Asha");
        assert_eq!(rows[0]["Age"], "34");
        assert_eq!(rows[0]["Ward/Area"], "North");
        assert_eq!(rows[1]["Full Name"], "Ravi");
        assert_eq!(rows[1]["Age"], "");
    }

    #[test]
    fn short_csv_rows_only_carry_present_columns() {
        let rows = ok_rows(parse_csv(b"Name,Booth,Caste\nMeera,7\n").unwrap());
        assert_eq!(rows[0].len(), 2);
        assert!(rows[0].get("Caste").is_none());
    }

    #[test]
    fn exported_workbook_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.xlsx");
        write_xlsx(
            &path,
            "Voters",
            &["Full Name", "Age", "Head of House"],
            &[
                vec![
                    ExportCell::Text("Asha Patil".into()),
                    ExportCell::Number(34.0),
                    ExportCell::Number(1.0),
                ],
                vec![
                    ExportCell::Text(String::new()),
                    ExportCell::Text(String::new()),
                    ExportCell::Text(String::new()),
                ],
                vec![
                    ExportCell::Text("Ravi".into()),
                    ExportCell::Text(String::new()),
                    ExportCell::Number(0.0),
                ],
            ],
        )
        .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let rows = ok_rows(parse_excel(&bytes).unwrap());

        assert_eq!(rows.len(), 2, "blank rows are skipped");
        assert_eq!(rows[0]["Full Name"], "Asha Patil");
        assert_eq!(rows[0]["Age"], "34");
        assert_eq!(rows[0]["Head of House"], "1");
        assert_eq!(rows[1]["Full Name"], "Ravi");
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        let err = parse_excel(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
