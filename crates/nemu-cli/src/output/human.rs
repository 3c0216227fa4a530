//! Human-readable output formatter with colors and styling.

use super::formatter::OutputFormatter;
use crate::progress::humanize_bytes;
use anyhow::Result;
use console::Term;
use console::style;
use nemu_core::TransferReport;

pub struct HumanFormatter {
    verbose: bool,
    quiet: bool,
    use_colors: bool,
    term: Term,
}

impl HumanFormatter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            use_colors: console::colors_enabled(),
            term: Term::stdout(),
        }
    }

    fn format_number(n: usize) -> String {
        let s = n.to_string();
        let mut result = String::new();
        for (i, c) in s.chars().rev().enumerate() {
            if i > 0 && i % 3 == 0 {
                result.push(',');
            }
            result.push(c);
        }
        result.chars().rev().collect()
    }

    fn headline(&self, mark: &str, text: &str) -> String {
        if self.use_colors {
            format!("{} {text}", style(mark).green().bold())
        } else {
            text.to_string()
        }
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_push_result(&self, url: &str, report: &TransferReport) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        let encode = &report.encode;
        let _ = self.term.write_line(&self.headline("✓", "Upload complete"));
        let _ = self.term.write_line(&format!("  Server: {url}"));
        let _ = self
            .term
            .write_line(&format!("  Files: {}", Self::format_number(encode.files)));
        let _ = self.term.write_line(&format!(
            "  Directories: {}",
            Self::format_number(encode.directories)
        ));
        let _ = self.term.write_line(&format!(
            "  Sent: {} ({} before compression)",
            humanize_bytes(encode.bytes_compressed),
            humanize_bytes(encode.bytes_read)
        ));

        if self.verbose {
            let _ = self
                .term
                .write_line(&format!("  Symlinks: {}", encode.symlinks));
            let _ = self
                .term
                .write_line(&format!("  Skipped: {}", encode.skipped));
            let _ = self.term.write_line(&format!(
                "  Compression ratio: {:.2}",
                encode.compression_ratio()
            ));
            let _ = self
                .term
                .write_line(&format!("  Duration: {:?}", report.duration));
            let _ = self.term.write_line(&format!(
                "  Response: {} {}",
                report.status,
                report.response.trim()
            ));
        }

        Ok(())
    }

    fn format_digest(&self, digest: &str) -> Result<()> {
        // Printed even with --quiet: the digest is the command's only output.
        self.term.write_line(digest)?;
        Ok(())
    }

    fn format_error(&self, error: &anyhow::Error) {
        let text = if self.use_colors {
            format!("{} {error:#}", style("✗").red().bold())
        } else {
            format!("Error: {error:#}")
        };
        let _ = Term::stderr().write_line(&text);
    }

    fn format_success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let _ = self.term.write_line(&self.headline("✓", message));
    }

    fn format_warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let text = if self.use_colors {
            format!("{} {message}", style("⚠").yellow().bold())
        } else {
            format!("Warning: {message}")
        };
        let _ = Term::stderr().write_line(&text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(HumanFormatter::format_number(0), "0");
        assert_eq!(HumanFormatter::format_number(999), "999");
        assert_eq!(HumanFormatter::format_number(1000), "1,000");
        assert_eq!(HumanFormatter::format_number(1_234_567), "1,234,567");
    }
}
