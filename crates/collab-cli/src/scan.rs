//! # Scan Subcommand
//!
//! Runs the same compliance scanner the service applies at submission time
//! so moderators can check a phrase or a message before acting on it.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use collab_compliance::{ComplianceScanner, ScanReport};

/// Arguments for the `collab scan` subcommand.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Text to scan.
    #[arg(value_name = "TEXT", conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the text from a file instead.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the scan subcommand. Exit code 1 when any flag is raised.
pub fn run_scan(args: &ScanArgs) -> Result<u8> {
    let (source, text) = match (&args.text, &args.file) {
        (Some(text), None) => ("text".to_string(), text.clone()),
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            (path.display().to_string(), text)
        }
        _ => bail!("provide TEXT or --file"),
    };

    let report = scan(&source, &text)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(if report.is_clean() { 0 } else { 1 })
}

/// Scan `text`, attributing hits to `source`.
pub fn scan(source: &str, text: &str) -> Result<ScanReport> {
    let scanner = ComplianceScanner::new().context("building compliance scanner")?;
    Ok(scanner.scan([(source, text)]))
}

/// Human-readable report.
pub fn render(report: &ScanReport) -> String {
    if report.is_clean() {
        return "clean\n".to_string();
    }
    let mut out = format!("severity: {}\n", report.flags.severity());
    for hit in &report.hits {
        out.push_str(&format!("  {}: {}\n", hit.field, hit.code));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_compliance::{FlagCode, Severity};

    #[test]
    fn phone_number_is_high_severity() {
        let report = scan("text", "call me at 9876543210").unwrap();
        assert!(report.flags.contains(FlagCode::ContainsPhone));
        assert_eq!(report.flags.severity(), Severity::High);
        assert!(render(&report).starts_with("severity: high"));
    }

    #[test]
    fn clean_text_renders_clean() {
        let report = scan("text", "See you at the slam next month").unwrap();
        assert!(report.is_clean());
        assert_eq!(render(&report), "clean\n");
    }

    #[test]
    fn file_input_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("message.txt");
        std::fs::write(&path, "write to me: someone@example.com").unwrap();
        let args = ScanArgs {
            text: None,
            file: Some(path),
            json: true,
        };
        assert_eq!(run_scan(&args).unwrap(), 1);
    }

    #[test]
    fn missing_input_is_an_error() {
        let args = ScanArgs {
            text: None,
            file: None,
            json: false,
        };
        assert!(run_scan(&args).is_err());
    }
}
