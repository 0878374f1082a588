use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, ScrapingError};
use crate::parser::ArticleRecord;

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    pub fn formatter(&self) -> Box<dyn OutputFormatter + Send + Sync> {
        match self {
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter::new(CsvFormatter::default_columns())),
        }
    }
}

/// Destination for the records of one run.
#[async_trait]
pub trait ArticleSink: Send + Sync {
    async fn persist(&self, records: &[ArticleRecord]) -> Result<PathBuf>;
}

pub trait OutputFormatter {
    fn format_records(&self, records: &[ArticleRecord]) -> Result<String>;
    fn file_extension(&self) -> &str;
    fn header(&self) -> Option<String>;

    /// Prefix the file with a UTF-8 byte order mark.
    fn byte_order_mark(&self) -> bool {
        false
    }
}

/// Listing-style output: a JSON array of `{title, teaser, link, content}`.
pub struct JsonFormatter;

#[derive(Serialize)]
struct JsonArticle<'a> {
    title: &'a str,
    teaser: Option<&'a str>,
    link: &'a str,
    content: Option<&'a str>,
}

impl OutputFormatter for JsonFormatter {
    fn format_records(&self, records: &[ArticleRecord]) -> Result<String> {
        let articles: Vec<JsonArticle<'_>> = records
            .iter()
            .map(|record| JsonArticle {
                title: record.title(),
                teaser: record.teaser(),
                link: record.url(),
                content: record.content(),
            })
            .collect();

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        articles
            .serialize(&mut serializer)
            .map_err(|e| ScrapingError::Persistence(format!("JSON serialization failed: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| ScrapingError::Persistence(format!("JSON output is not UTF-8: {}", e)))
    }

    fn file_extension(&self) -> &str {
        "json"
    }

    fn header(&self) -> Option<String> {
        None
    }
}

pub struct CsvFormatter {
    columns: Vec<String>,
}

impl CsvFormatter {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn default_columns() -> Vec<String> {
        ["url", "title", "date", "content", "category", "author"]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    fn escape_csv_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn extract_field_value(&self, record: &ArticleRecord, column: &str) -> String {
        match column {
            "url" => record.url().to_string(),
            "title" => record.title().to_string(),
            "teaser" => record.teaser().unwrap_or("").to_string(),
            "date" => record.published_at().unwrap_or("").to_string(),
            "content" => record.content().unwrap_or("").to_string(),
            "category" => record.category().unwrap_or("").to_string(),
            "author" => record.author().to_string(),
            _ => String::new(),
        }
    }
}

impl OutputFormatter for CsvFormatter {
    fn format_records(&self, records: &[ArticleRecord]) -> Result<String> {
        let mut output = String::new();

        for record in records {
            let row: Vec<String> = self
                .columns
                .iter()
                .map(|column| Self::escape_csv_field(&self.extract_field_value(record, column)))
                .collect();
            output.push_str(&row.join(","));
            output.push('\n');
        }

        Ok(output)
    }

    fn file_extension(&self) -> &str {
        "csv"
    }

    fn header(&self) -> Option<String> {
        Some(self.columns.join(","))
    }

    // spreadsheet tools need the BOM to detect UTF-8 in Devanagari text
    fn byte_order_mark(&self) -> bool {
        true
    }
}

/// Writes all records of a run to a single file.
pub struct ArticleWriter {
    output_dir: PathBuf,
    prefix: String,
    timestamped: bool,
    formatter: Box<dyn OutputFormatter + Send + Sync>,
}

impl ArticleWriter {
    pub fn new(output_dir: PathBuf, prefix: String, format: OutputFormat, timestamped: bool) -> Self {
        Self {
            output_dir,
            prefix,
            timestamped,
            formatter: format.formatter(),
        }
    }

    /// `<dir>/<prefix>[_YYYYmmdd_HHMM].<ext>`
    pub fn file_path(&self, now: DateTime<Local>) -> PathBuf {
        let stem = if self.timestamped {
            format!("{}_{}", self.prefix, now.format("%Y%m%d_%H%M"))
        } else {
            self.prefix.clone()
        };
        self.output_dir
            .join(format!("{}.{}", stem, self.formatter.file_extension()))
    }

    fn render(&self, records: &[ArticleRecord]) -> Result<String> {
        let mut content = String::new();
        if self.formatter.byte_order_mark() {
            content.push_str(UTF8_BOM);
        }
        if let Some(header) = self.formatter.header() {
            content.push_str(&header);
            content.push('\n');
        }
        content.push_str(&self.formatter.format_records(records)?);
        Ok(content)
    }

    fn write_to_file(&self, file_path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ScrapingError::Persistence(format!("Failed to create directory: {}", e)))?;
        }

        let mut file = fs::File::create(file_path)
            .map_err(|e| ScrapingError::Persistence(format!("Failed to open file: {}", e)))?;
        file.write_all(content.as_bytes())
            .map_err(|e| ScrapingError::Persistence(format!("Failed to write content: {}", e)))?;
        file.flush()
            .map_err(|e| ScrapingError::Persistence(format!("Failed to flush file: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ArticleSink for ArticleWriter {
    async fn persist(&self, records: &[ArticleRecord]) -> Result<PathBuf> {
        let file_path = self.file_path(Local::now());
        debug!("Writing {} articles to {}", records.len(), file_path.display());

        let content = self.render(records)?;
        self.write_to_file(&file_path, &content)?;

        info!("Successfully saved {} articles to {}", records.len(), file_path.display());
        Ok(file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ArticleLink, Field, FieldValues};
    use chrono::TimeZone;
    use tempfile::tempdir;
    use url::Url;

    fn create_test_record(path: &str, title: &str, content: Option<&str>) -> ArticleRecord {
        let base = Url::parse("https://www.setopati.com").unwrap();
        let link = ArticleLink::parse(path, &base).unwrap();
        let mut values = FieldValues::default();
        values.set(Field::Title, title.to_string());
        values.set(Field::Teaser, format!("{} teaser", title));
        values.set(Field::PublishedAt, "2024-01-02".to_string());
        values.set(Field::Category, "Politics".to_string());
        ArticleRecord::build(&link, values, content.map(str::to_string)).unwrap()
    }

    #[test]
    fn test_json_formatter_layout() {
        let records = vec![
            create_test_record("/a", "बजेट पारित", Some("Body text")),
            create_test_record("/b", "Second", None),
        ];

        let output = JsonFormatter.format_records(&records).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        let items = parsed.as_array().unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["title"], "बजेट पारित");
        assert_eq!(items[0]["link"], "https://www.setopati.com/a");
        assert_eq!(items[0]["teaser"], "बजेट पारित teaser");
        assert!(items[1]["content"].is_null());
        // non-ASCII text is written as-is, not escaped
        assert!(output.contains("बजेट"));
        assert!(output.contains("\n    {"));
    }

    #[test]
    fn test_csv_formatter_escapes_fields() {
        let formatter = CsvFormatter::new(CsvFormatter::default_columns());
        let records = vec![create_test_record("/a", "Hello, \"world\"", Some("line one\nline two"))];

        let output = formatter.format_records(&records).unwrap();

        assert_eq!(
            output,
            "https://www.setopati.com/a,\"Hello, \"\"world\"\"\",2024-01-02,\"line one\nline two\",Politics,Unknown\n"
        );
        assert_eq!(formatter.header().unwrap(), "url,title,date,content,category,author");
    }

    #[test]
    fn test_file_path_timestamping() {
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap();

        let timestamped = ArticleWriter::new(PathBuf::from("out"), "setopati_articles".into(), OutputFormat::Csv, true);
        assert_eq!(timestamped.file_path(now), PathBuf::from("out/setopati_articles_20240305_1407.csv"));

        let plain = ArticleWriter::new(PathBuf::from("out"), "articles".into(), OutputFormat::Json, false);
        assert_eq!(plain.file_path(now), PathBuf::from("out/articles.json"));
    }

    #[tokio::test]
    async fn test_writer_persists_csv_with_bom_and_header() {
        let temp_dir = tempdir().unwrap();
        let writer = ArticleWriter::new(temp_dir.path().join("nested"), "run".into(), OutputFormat::Csv, false);
        let records = vec![create_test_record("/a", "One", Some("Body"))];

        let path = writer.persist(&records).await.unwrap();
        let written = fs::read_to_string(&path).unwrap();

        assert!(written.starts_with(UTF8_BOM));
        let mut lines = written.trim_start_matches(UTF8_BOM).lines();
        assert_eq!(lines.next(), Some("url,title,date,content,category,author"));
        assert_eq!(lines.next(), Some("https://www.setopati.com/a,One,2024-01-02,Body,Politics,Unknown"));
        assert_eq!(lines.next(), None);
    }

    #[tokio::test]
    async fn test_writer_reports_persistence_error() {
        let temp_dir = tempdir().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, "file in the way").unwrap();

        let writer = ArticleWriter::new(blocker, "run".into(), OutputFormat::Json, false);
        let err = writer.persist(&[create_test_record("/a", "One", None)]).await.unwrap_err();
        assert!(matches!(err, ScrapingError::Persistence(_)));
    }
}
