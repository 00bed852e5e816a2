//! Result persistence.
//!
//! Both sinks are append-oriented so a batch interrupted halfway leaves
//! usable files behind. JSON keeps the full structured record; CSV is the
//! flat view spreadsheets want, with social links folded into one column.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use crate::record::ProfileRecord;

/// CSV column order. The JSON field layout follows the struct; CSV pins
/// the same order explicitly so appended files stay consistent.
const CSV_COLUMNS: &[&str] = &[
    "channel_url",
    "channel_handle",
    "channel_name",
    "email",
    "subscribers",
    "video_count",
    "total_views",
    "joined_date",
    "country",
    "description",
    "social_links",
    "scraped_at",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes scraped records under a single output directory.
pub struct DataExporter {
    output_dir: PathBuf,
}

impl DataExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn target(&self, filename: &str, extension: &str) -> PathBuf {
        self.output_dir.join(format!("{filename}.{extension}"))
    }

    /// Append records to `<output_dir>/<filename>.json`, merging with
    /// whatever the file already holds.
    pub fn export_json(
        &self,
        records: &[ProfileRecord],
        filename: &str,
    ) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.target(filename, "json");

        let mut all = load_existing(&path)?;
        all.extend_from_slice(records);

        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, &all)?;
        info!("wrote {} record(s) to {}", all.len(), path.display());
        Ok(path)
    }

    /// Append records to `<output_dir>/<filename>.csv`, writing the header
    /// only when the file starts empty.
    pub fn export_csv(
        &self,
        records: &[ProfileRecord],
        filename: &str,
    ) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.target(filename, "csv");

        let needs_header = fs::metadata(&path).map(|meta| meta.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(CSV_COLUMNS)?;
        }
        for record in records {
            writer.write_record(csv_row(record))?;
        }
        writer.flush()?;
        info!("appended {} record(s) to {}", records.len(), path.display());
        Ok(path)
    }

    /// Write the same records to both sinks.
    pub fn export_both(
        &self,
        records: &[ProfileRecord],
        filename: &str,
    ) -> Result<(), ExportError> {
        self.export_json(records, filename)?;
        self.export_csv(records, filename)?;
        Ok(())
    }

    /// Read a previously exported JSON file back. A missing file is an
    /// empty result set.
    pub fn load_json(&self, filename: &str) -> Result<Vec<ProfileRecord>, ExportError> {
        load_existing(&self.target(filename, "json"))
    }
}

fn load_existing(path: &Path) -> Result<Vec<ProfileRecord>, ExportError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

fn csv_row(record: &ProfileRecord) -> Vec<String> {
    let social = record
        .social_links
        .iter()
        .map(|(label, url)| format!("{label}: {url}"))
        .collect::<Vec<_>>()
        .join("; ");

    vec![
        record.channel_url.clone(),
        record.channel_handle.clone(),
        record.channel_name.clone(),
        record.email.clone().unwrap_or_default(),
        record.subscribers.clone(),
        record.video_count.clone(),
        record.total_views.clone(),
        record.joined_date.clone(),
        record.country.clone(),
        record.description.clone(),
        social,
        record.scraped_at.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(url: &str, email: Option<&str>) -> ProfileRecord {
        ProfileRecord {
            channel_url: url.to_string(),
            channel_handle: "chan".to_string(),
            channel_name: "Chan".to_string(),
            email: email.map(str::to_string),
            scraped_at: "2026-08-29 12:00:00".to_string(),
            ..ProfileRecord::default()
        }
    }

    #[test]
    fn json_export_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = DataExporter::new(dir.path());

        exporter
            .export_json(&[record("https://y/@a", None)], "results")
            .unwrap();
        exporter
            .export_json(&[record("https://y/@b", Some("b@b.tv"))], "results")
            .unwrap();

        let all = exporter.load_json("results").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].channel_url, "https://y/@a");
        assert_eq!(all[1].email.as_deref(), Some("b@b.tv"));
    }

    #[test]
    fn csv_export_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = DataExporter::new(dir.path());

        exporter
            .export_csv(&[record("https://y/@a", None)], "results")
            .unwrap();
        let path = exporter
            .export_csv(&[record("https://y/@b", None)], "results")
            .unwrap();

        let raw = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("channel_url,channel_handle,channel_name,email"));
        assert!(lines[1].contains("https://y/@a"));
        assert!(lines[2].contains("https://y/@b"));
    }

    #[test]
    fn social_links_flatten_into_one_column() {
        let mut links = BTreeMap::new();
        links.insert("Twitter".to_string(), "https://twitter.com/c".to_string());
        links.insert("Twitch".to_string(), "https://twitch.tv/c".to_string());
        let row = csv_row(&ProfileRecord {
            social_links: links,
            ..ProfileRecord::default()
        });
        assert_eq!(
            row[10],
            "Twitch: https://twitch.tv/c; Twitter: https://twitter.com/c"
        );
    }

    #[test]
    fn missing_json_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = DataExporter::new(dir.path());
        assert!(exporter.load_json("results").unwrap().is_empty());
    }
}
