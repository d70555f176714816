//! # ComplianceScanner
//!
//! Input is a flat mapping of field name to free text. Output is the
//! ordered flag set plus the (field, code) hits that produced it. Hits name
//! fields only; matched text is never echoed into logs or reports.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flags::{ComplianceFlags, FlagCode};

/// Error building a scanner.
#[derive(Error, Debug)]
pub enum ScannerError {
    /// A built-in pattern failed to compile.
    #[error("invalid scanner pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A denylist phrase was empty after normalization.
    #[error("denylist phrase must not be blank")]
    BlankPhrase,
}

/// A denylisted phrase and the flag it raises.
///
/// Rules tagged `auto_reject` raise [`FlagCode::OffPlatformPayment`], which
/// is high risk on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRule {
    pub phrase: String,
    #[serde(default)]
    pub auto_reject: bool,
}

impl PhraseRule {
    /// Attention-only circumvention phrase.
    pub fn circumvention(phrase: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            auto_reject: false,
        }
    }

    /// `auto_reject`-tagged phrase.
    pub fn auto_reject(phrase: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            auto_reject: true,
        }
    }

    fn code(&self) -> FlagCode {
        if self.auto_reject {
            FlagCode::OffPlatformPayment
        } else {
            FlagCode::CircumventionPhrase
        }
    }
}

/// The built-in denylist.
pub fn default_phrases() -> Vec<PhraseRule> {
    vec![
        PhraseRule::circumvention("call me directly"),
        PhraseRule::circumvention("my whatsapp is"),
        PhraseRule::circumvention("reach me at"),
        PhraseRule::circumvention("text me at"),
        PhraseRule::circumvention("contact me directly"),
        PhraseRule::circumvention("dm me on"),
        PhraseRule::circumvention("find me on telegram"),
        PhraseRule::auto_reject("pay me directly"),
        PhraseRule::auto_reject("pay outside the platform"),
        PhraseRule::auto_reject("venmo me"),
        PhraseRule::auto_reject("cash app me"),
    ]
}

/// One field that triggered one flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagHit {
    pub field: String,
    pub code: FlagCode,
}

/// Result of scanning a set of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub flags: ComplianceFlags,
    pub hits: Vec<FlagHit>,
}

impl ScanReport {
    /// Whether nothing was detected.
    pub fn is_clean(&self) -> bool {
        self.flags.is_empty()
    }

    fn record(&mut self, field: &str, code: FlagCode) {
        self.flags.insert(code);
        if !self.hits.iter().any(|h| h.field == field && h.code == code) {
            self.hits.push(FlagHit {
                field: field.to_string(),
                code,
            });
        }
    }
}

/// Deterministic contact-leakage detector.
#[derive(Debug, Clone)]
pub struct ComplianceScanner {
    phone: Regex,
    iso_date: Regex,
    email: Regex,
    url: Regex,
    phrases: Vec<(String, FlagCode)>,
}

impl ComplianceScanner {
    /// Scanner with the built-in denylist.
    pub fn new() -> Result<Self, ScannerError> {
        Self::with_phrases(default_phrases())
    }

    /// Scanner with a custom denylist. Phrases match case-insensitively and
    /// ignore runs of whitespace.
    pub fn with_phrases(rules: Vec<PhraseRule>) -> Result<Self, ScannerError> {
        let mut phrases = Vec::with_capacity(rules.len());
        for rule in &rules {
            let normalized = normalize(&rule.phrase);
            if normalized.is_empty() {
                return Err(ScannerError::BlankPhrase);
            }
            phrases.push((normalized, rule.code()));
        }

        Ok(Self {
            // Optional "+" country-code marker, then 7+ digits with at most two
            // separator characters (space, dash, parenthesis) between digits.
            phone: Regex::new(r"(?:\+\s?)?\d(?:[\s\-()]{0,2}\d){6,}")?,
            iso_date: Regex::new(r"^\d{4}-\d{2}-\d{2}")?,
            email: Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}")?,
            url: Regex::new(r"(?i)\b(?:https?://|www\.)\S+")?,
            phrases,
        })
    }

    /// Scan named fields.
    pub fn scan<'a, I>(&self, fields: I) -> ScanReport
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut report = ScanReport::default();
        for (field, text) in fields {
            for code in self.detect(text) {
                report.record(field, code);
            }
        }
        if !report.is_clean() {
            tracing::debug!(
                flags = ?report.flags,
                fields = report.hits.len(),
                "compliance scan raised flags"
            );
        }
        report
    }

    /// Scan a single unnamed text.
    pub fn scan_text(&self, text: &str) -> ComplianceFlags {
        self.detect(text).into_iter().collect()
    }

    fn detect(&self, text: &str) -> Vec<FlagCode> {
        let mut codes = Vec::new();
        if self.contains_phone(text) {
            codes.push(FlagCode::ContainsPhone);
        }
        if self.email.is_match(text) {
            codes.push(FlagCode::ContainsEmail);
        }
        if self.url.is_match(text) {
            codes.push(FlagCode::ContainsUrl);
        }
        let normalized = normalize(text);
        for (phrase, code) in &self.phrases {
            if normalized.contains(phrase.as_str()) && !codes.contains(code) {
                codes.push(*code);
            }
        }
        codes
    }

    /// A leading ISO date is not a phone number; whatever digits follow it
    /// (a time, or a number written straight after the date) are checked on
    /// their own.
    fn contains_phone(&self, text: &str) -> bool {
        self.phone.find_iter(text).any(|m| {
            let candidate = m.as_str().trim_start();
            match self.iso_date.find(candidate) {
                Some(date) => self.phone.is_match(&candidate[date.end()..]),
                None => true,
            }
        })
    }
}

/// Lowercase and collapse whitespace runs to single spaces.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
