//! Import/export payload parsing for the QA store.
//!
//! Accepts JSON, CSV, and Excel payloads. Required fields per record:
//! question, answer, category. Optional with defaults: confidence (0.9),
//! keywords ([]), source ("import").

use calamine::{Data, Reader, Xlsx};
use serde::{Deserialize, Serialize};

use super::error::{QaError, QaResult};
use super::model::{NewQaPair, QaPair};

/// Supported import payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    /// A JSON array of records.
    Json,
    /// CSV with a `question,answer,category[,confidence,keywords,source]` header.
    Csv,
    /// An Excel workbook; the first sheet is read like the CSV layout.
    Excel,
}

impl ImportFormat {
    /// Picks a format from an uploaded filename.
    pub fn from_filename(name: &str) -> Option<ImportFormat> {
        let ext = name.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(ImportFormat::Json),
            "csv" => Some(ImportFormat::Csv),
            "xlsx" | "xls" => Some(ImportFormat::Excel),
            _ => None,
        }
    }
}

/// One record that failed to import.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    /// Record index in the payload.
    pub index: usize,
    /// Question text, for operator triage.
    pub question: String,
    /// Failure detail.
    pub error: String,
}

/// Import outcome counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Records seen.
    pub processed: usize,
    /// Records persisted (including overwrites).
    pub succeeded: usize,
    /// Records that failed validation or storage.
    pub failed: usize,
    /// Records skipped as near-duplicates.
    pub duplicate_skipped: usize,
    /// Per-record failure details.
    pub failed_records: Vec<FailedRecord>,
}

#[derive(Debug, Deserialize)]
struct JsonRecord {
    question: String,
    answer: String,
    category: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default)]
    source: Option<String>,
}

/// Parses a payload into staged records.
pub fn parse_records(payload: &[u8], format: ImportFormat) -> QaResult<Vec<NewQaPair>> {
    match format {
        ImportFormat::Json => parse_json(payload),
        ImportFormat::Csv => parse_csv(payload),
        ImportFormat::Excel => parse_excel(payload),
    }
}

fn parse_json(payload: &[u8]) -> QaResult<Vec<NewQaPair>> {
    let records: Vec<JsonRecord> = serde_json::from_slice(payload)
        .map_err(|e| QaError::Import(format!("invalid JSON payload: {e}")))?;
    Ok(records
        .into_iter()
        .map(|r| NewQaPair {
            question: r.question,
            answer: r.answer,
            category: r.category,
            confidence: r.confidence.unwrap_or(0.9),
            keywords: r.keywords.unwrap_or_default(),
            source: Some(r.source.unwrap_or_else(|| "import".to_string())),
            id: None,
        })
        .collect())
}

fn parse_csv(payload: &[u8]) -> QaResult<Vec<NewQaPair>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(payload);

    let headers = reader
        .headers()
        .map_err(|e| QaError::Import(format!("invalid CSV header: {e}")))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let (Some(q_col), Some(a_col), Some(c_col)) = (
        column("question"),
        column("answer"),
        column("category"),
    ) else {
        return Err(QaError::Import(
            "CSV header must contain question, answer, category".to_string(),
        ));
    };
    let conf_col = column("confidence");
    let kw_col = column("keywords");
    let src_col = column("source");

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| QaError::Import(format!("CSV row {}: {e}", line + 2)))?;
        let field = |col: usize| row.get(col).unwrap_or("").to_string();

        let confidence = match conf_col.map(field) {
            Some(raw) if !raw.is_empty() => raw.parse::<f32>().map_err(|_| {
                QaError::Import(format!("CSV row {}: bad confidence '{raw}'", line + 2))
            })?,
            _ => 0.9,
        };

        records.push(NewQaPair {
            question: field(q_col),
            answer: field(a_col),
            category: field(c_col),
            confidence,
            keywords: kw_col
                .map(field)
                .map(|raw| split_keywords(&raw))
                .unwrap_or_default(),
            source: Some(
                src_col
                    .map(field)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "import".to_string()),
            ),
            id: None,
        });
    }
    Ok(records)
}

fn parse_excel(payload: &[u8]) -> QaResult<Vec<NewQaPair>> {
    let cursor = std::io::Cursor::new(payload.to_vec());
    let mut workbook: Xlsx<_> = Xlsx::new(cursor)
        .map_err(|e| QaError::Import(format!("invalid Excel payload: {e}")))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| QaError::Import("workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| QaError::Import(format!("cannot read sheet '{sheet_name}': {e}")))?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| QaError::Import("sheet is empty".to_string()))?
        .iter()
        .map(cell_to_string)
        .collect();
    let column = |name: &str| header.iter().position(|h| h.eq_ignore_ascii_case(name));

    let (Some(q_col), Some(a_col), Some(c_col)) = (
        column("question"),
        column("answer"),
        column("category"),
    ) else {
        return Err(QaError::Import(
            "sheet header must contain question, answer, category".to_string(),
        ));
    };
    let conf_col = column("confidence");
    let kw_col = column("keywords");
    let src_col = column("source");

    let mut records = Vec::new();
    for row in rows {
        let cell = |col: usize| row.get(col).map(cell_to_string).unwrap_or_default();

        let confidence = conf_col
            .and_then(|col| row.get(col))
            .and_then(cell_to_f32)
            .unwrap_or(0.9);

        records.push(NewQaPair {
            question: cell(q_col),
            answer: cell(a_col),
            category: cell(c_col),
            confidence,
            keywords: kw_col.map(cell).map(|raw| split_keywords(&raw)).unwrap_or_default(),
            source: Some(
                src_col
                    .map(cell)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "import".to_string()),
            ),
            id: None,
        });
    }
    Ok(records)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn cell_to_f32(cell: &Data) -> Option<f32> {
    match cell {
        Data::Float(f) => Some(*f as f32),
        Data::Int(i) => Some(*i as f32),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn split_keywords(raw: &str) -> Vec<String> {
    raw.split([';', ','])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Renders pairs as CSV with the canonical import header.
pub fn export_csv(pairs: &[QaPair]) -> QaResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["question", "answer", "category", "confidence", "keywords", "source"])
        .map_err(|e| QaError::Import(e.to_string()))?;
    for pair in pairs {
        writer
            .write_record([
                pair.question.as_str(),
                pair.answer.as_str(),
                pair.category.as_str(),
                &pair.confidence.to_string(),
                &pair.keywords.join(";"),
                pair.source.as_str(),
            ])
            .map_err(|e| QaError::Import(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| QaError::Import(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| QaError::Import(e.to_string()))
}
