//! JSON output formatter for machine-readable results.

use super::formatter::JsonOutput;
use super::formatter::OutputFormatter;
use anyhow::Result;
use nemu_core::TransferReport;
use serde::Serialize;
use std::io::Write;
use std::io::{self};

pub struct JsonFormatter;

impl JsonFormatter {
    fn output<T: Serialize>(value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(io::stdout(), "{json}")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct PushOutput<'a> {
    url: &'a str,
    status: u16,
    response: &'a str,
    files: usize,
    directories: usize,
    symlinks: usize,
    skipped: usize,
    bytes_read: u64,
    bytes_sent: u64,
    compression_ratio: f64,
    duration_ms: u128,
}

impl<'a> PushOutput<'a> {
    fn new(url: &'a str, report: &'a TransferReport) -> Self {
        Self {
            url,
            status: report.status,
            response: report.response.trim(),
            files: report.encode.files,
            directories: report.encode.directories,
            symlinks: report.encode.symlinks,
            skipped: report.encode.skipped,
            bytes_read: report.encode.bytes_read,
            bytes_sent: report.encode.bytes_compressed,
            compression_ratio: report.encode.compression_ratio(),
            duration_ms: report.duration.as_millis(),
        }
    }
}

#[derive(Serialize)]
struct MessageData<'a> {
    message: &'a str,
}

impl OutputFormatter for JsonFormatter {
    fn format_push_result(&self, url: &str, report: &TransferReport) -> Result<()> {
        Self::output(&JsonOutput::success("push", PushOutput::new(url, report)))
    }

    fn format_digest(&self, digest: &str) -> Result<()> {
        #[derive(Serialize)]
        struct DigestData<'a> {
            digest: &'a str,
        }

        Self::output(&JsonOutput::success("hash", DigestData { digest }))
    }

    fn format_error(&self, error: &anyhow::Error) {
        let output = JsonOutput::error("error", format!("{error:#}"));
        let _ = Self::output(&output);
    }

    fn format_success(&self, message: &str) {
        let _ = Self::output(&JsonOutput::success("message", MessageData { message }));
    }

    fn format_warning(&self, message: &str) {
        let _ = Self::output(&JsonOutput::success("warning", MessageData { message }));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nemu_core::EncodeReport;
    use std::time::Duration;

    #[test]
    fn test_push_output_structure() {
        let report = TransferReport {
            encode: EncodeReport {
                files: 3,
                directories: 1,
                bytes_read: 4000,
                bytes_compressed: 1000,
                ..EncodeReport::default()
            },
            status: 200,
            response: "{\"message\":\"success\"}\n".into(),
            duration: Duration::from_millis(42),
        };
        let output = JsonOutput::success("push", PushOutput::new("http://x/nemu/upload", &report));
        let value: serde_json::Value = serde_json::to_value(&output).unwrap();

        assert_eq!(value["operation"], "push");
        assert_eq!(value["status"], "success");
        assert_eq!(value["data"]["files"], 3);
        assert_eq!(value["data"]["compression_ratio"], 4.0);
        assert_eq!(value["data"]["duration_ms"], 42);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_error_output_structure() {
        let value = serde_json::to_value(JsonOutput::error("error", "boom")).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "boom");
        assert!(value.get("data").is_none());
    }
}
