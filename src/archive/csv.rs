//! CSV persistence format
//!
//! The archive file is plain CSV with quote-doubling escapes. Fields may
//! contain commas, quotes, and newlines, so records are split by a scanner
//! that tracks quoting across line breaks rather than by line.
//!
//! Two schemas are readable, dispatched on column count:
//! - current (9 columns): `id,title,text,category,isImportant,hasConsent,
//!   createdAt,segments,speakers`
//! - legacy (10 columns): carried `urgencyLevel,noveltyLevel` instead of
//!   `isImportant`; the last two columns are still segments/speakers JSON
//!   and `createdAt` sits third from the end
//!
//! Only the current schema is ever written.

use crate::transcript::{SpeakerInfo, TranscriptSegment};

use super::{ArchiveError, ArchivedTranscript};

/// Column headers of the current schema.
const CSV_HEADERS: [&str; 9] = [
    "id",
    "title",
    "text",
    "category",
    "isImportant",
    "hasConsent",
    "createdAt",
    "segments",
    "speakers",
];

/// Legacy urgency value at or above which a record counts as important.
const LEGACY_IMPORTANT_URGENCY: i64 = 3;

/// Escape a field for CSV output.
fn escape_csv(value: &str) -> String {
    if value.contains('"') || value.contains(',') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split a CSV document into records of fields, honoring quoted sections
/// (including embedded newlines and doubled quotes).
fn parse_records(csv: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut chars = csv.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    fields.push(std::mem::take(&mut current));
                }
                '\r' => {}
                '\n' => {
                    fields.push(std::mem::take(&mut current));
                    if fields.iter().any(|f| !f.is_empty()) {
                        records.push(std::mem::take(&mut fields));
                    } else {
                        fields.clear();
                    }
                }
                other => current.push(other),
            }
        }
    }

    // Final record without a trailing newline.
    if !current.is_empty() || !fields.is_empty() {
        fields.push(current);
        if fields.iter().any(|f| !f.is_empty()) {
            records.push(fields);
        }
    }

    records
}

fn record_to_row(record: &ArchivedTranscript) -> Result<String, ArchiveError> {
    let segments_json = serde_json::to_string(&record.segments)
        .map_err(|e| ArchiveError::Parse(e.to_string()))?;
    let speakers_json = serde_json::to_string(&record.speakers)
        .map_err(|e| ArchiveError::Parse(e.to_string()))?;

    let values = [
        record.id.clone(),
        record.title.clone(),
        record.text.clone(),
        record.category.clone(),
        record.is_important.to_string(),
        record.has_consent.to_string(),
        record.created_at.to_string(),
        segments_json,
        speakers_json,
    ];
    Ok(values
        .iter()
        .map(|v| escape_csv(v))
        .collect::<Vec<_>>()
        .join(","))
}

/// The schemas this reader understands, keyed by column count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaVersion {
    /// Current 9-column layout with `isImportant`.
    Current,
    /// Pre-importance 10-column layout with urgency/novelty levels.
    LegacyUrgency,
}

impl SchemaVersion {
    fn detect(column_count: usize) -> Option<Self> {
        match column_count {
            9 => Some(SchemaVersion::Current),
            10 => Some(SchemaVersion::LegacyUrgency),
            _ => None,
        }
    }
}

fn parse_row(fields: &[String]) -> Result<ArchivedTranscript, ArchiveError> {
    let version = SchemaVersion::detect(fields.len())
        .ok_or_else(|| ArchiveError::Parse(format!("unexpected column count {}", fields.len())))?;

    // Both schemas agree on the leading columns and trail with
    // createdAt, segments, speakers.
    let created_at: i64 = fields[fields.len() - 3]
        .parse()
        .map_err(|_| ArchiveError::Parse("createdAt is not an integer".to_string()))?;
    let segments: Vec<TranscriptSegment> = serde_json::from_str(&fields[fields.len() - 2])
        .map_err(|e| ArchiveError::Parse(format!("segments JSON: {}", e)))?;
    let speakers: Vec<SpeakerInfo> = serde_json::from_str(&fields[fields.len() - 1])
        .map_err(|e| ArchiveError::Parse(format!("speakers JSON: {}", e)))?;

    let (is_important, has_consent) = match version {
        SchemaVersion::Current => (fields[4] == "true", fields[5] == "true"),
        SchemaVersion::LegacyUrgency => {
            let urgency: i64 = fields[4].parse().unwrap_or(0);
            (urgency >= LEGACY_IMPORTANT_URGENCY, fields[6] == "true")
        }
    };

    Ok(ArchivedTranscript {
        id: fields[0].clone(),
        title: fields[1].clone(),
        text: fields[2].clone(),
        category: if fields[3].is_empty() {
            "Note".to_string()
        } else {
            fields[3].clone()
        },
        is_important,
        has_consent,
        created_at,
        segments,
        speakers,
    })
}

/// Serialize the archive in the current schema.
pub fn to_csv(records: &[ArchivedTranscript]) -> Result<String, ArchiveError> {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(CSV_HEADERS.join(","));
    for record in records {
        lines.push(record_to_row(record)?);
    }
    Ok(lines.join("\n"))
}

/// Parse an archive document. Malformed rows are skipped with a warning;
/// one bad record never aborts the whole load.
pub fn from_csv(csv: &str) -> Vec<ArchivedTranscript> {
    let mut records = parse_records(csv);
    if records.is_empty() {
        return Vec::new();
    }

    // Drop the header row if present.
    if records[0].first().map(|f| f.as_str()) == Some("id") {
        records.remove(0);
    }

    let mut out = Vec::new();
    for fields in &records {
        match parse_row(fields) {
            Ok(record) => out.push(record),
            Err(e) => log::warn!("Skipping malformed archive row: {}", e),
        }
    }
    out
}

/// User-facing export: a simplified, readable table.
pub fn export_csv(records: &[ArchivedTranscript]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push("Date,Title,Tag,Important,Content".to_string());

    for record in records {
        let date = chrono::DateTime::from_timestamp_millis(record.created_at)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let row = [
            escape_csv(&date),
            escape_csv(&record.title),
            escape_csv(&record.category),
            escape_csv(if record.is_important { "yes" } else { "no" }),
            escape_csv(&record.text),
        ]
        .join(",");
        lines.push(row);
    }
    lines.join("\n")
}
