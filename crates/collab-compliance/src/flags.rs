//! # Flag Codes and Severity

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A heuristic tag indicating the payload may carry off-platform contact details.
///
/// Declaration order is the iteration order of [`ComplianceFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagCode {
    /// Seven or more digits in a phone-like run.
    ContainsPhone,
    /// `local@domain.tld`.
    ContainsEmail,
    /// Phrase from an `auto_reject`-tagged rule (payment outside the platform).
    OffPlatformPayment,
    /// Denylisted phrase signalling intent to move off-platform.
    CircumventionPhrase,
    /// Link to an external site.
    ContainsUrl,
}

impl FlagCode {
    /// All flag codes in declaration order.
    pub const ALL: [FlagCode; 5] = [
        Self::ContainsPhone,
        Self::ContainsEmail,
        Self::OffPlatformPayment,
        Self::CircumventionPhrase,
        Self::ContainsUrl,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContainsPhone => "contains_phone",
            Self::ContainsEmail => "contains_email",
            Self::OffPlatformPayment => "off_platform_payment",
            Self::CircumventionPhrase => "circumvention_phrase",
            Self::ContainsUrl => "contains_url",
        }
    }

    /// Whether this code alone makes a payload high risk.
    pub fn is_high_risk(&self) -> bool {
        matches!(
            self,
            Self::ContainsPhone | Self::ContainsEmail | Self::OffPlatformPayment
        )
    }
}

impl std::fmt::Display for FlagCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlagCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown flag code: {s:?}"))
    }
}

/// Risk tier derived from a flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// No flags.
    Clean,
    /// Flags present, none high risk.
    Medium,
    /// At least one high-risk flag.
    High,
}

impl Severity {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of flag codes attached to a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplianceFlags(BTreeSet<FlagCode>);

impl ComplianceFlags {
    /// Empty flag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a code. Returns `false` if it was already present.
    pub fn insert(&mut self, code: FlagCode) -> bool {
        self.0.insert(code)
    }

    /// Whether the code is present.
    pub fn contains(&self, code: FlagCode) -> bool {
        self.0.contains(&code)
    }

    /// Whether no flags are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct codes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Codes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = FlagCode> + '_ {
        self.0.iter().copied()
    }

    /// Fold another set into this one.
    pub fn extend(&mut self, other: &ComplianceFlags) {
        self.0.extend(other.iter());
    }

    /// Severity tier, recomputed from the current codes.
    pub fn severity(&self) -> Severity {
        if self.0.iter().any(FlagCode::is_high_risk) {
            Severity::High
        } else if self.0.is_empty() {
            Severity::Clean
        } else {
            Severity::Medium
        }
    }
}

impl FromIterator<FlagCode> for ComplianceFlags {
    fn from_iter<I: IntoIterator<Item = FlagCode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_clean() {
        assert_eq!(ComplianceFlags::new().severity(), Severity::Clean);
    }

    #[test]
    fn phone_email_and_payment_are_high() {
        for code in [
            FlagCode::ContainsPhone,
            FlagCode::ContainsEmail,
            FlagCode::OffPlatformPayment,
        ] {
            let flags: ComplianceFlags = [code].into_iter().collect();
            assert_eq!(flags.severity(), Severity::High, "{code}");
        }
    }

    #[test]
    fn phrase_and_url_are_medium() {
        let flags: ComplianceFlags = [FlagCode::CircumventionPhrase, FlagCode::ContainsUrl]
            .into_iter()
            .collect();
        assert_eq!(flags.severity(), Severity::Medium);
    }

    #[test]
    fn one_high_code_dominates() {
        let flags: ComplianceFlags = [FlagCode::ContainsUrl, FlagCode::ContainsEmail]
            .into_iter()
            .collect();
        assert_eq!(flags.severity(), Severity::High);
    }

    #[test]
    fn serializes_as_ordered_array() {
        let flags: ComplianceFlags = [FlagCode::ContainsUrl, FlagCode::ContainsPhone]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, r#"["contains_phone","contains_url"]"#);
    }

    #[test]
    fn flag_code_parses_wire_names() {
        for code in FlagCode::ALL {
            assert_eq!(code.as_str().parse::<FlagCode>().unwrap(), code);
        }
        assert!("contains_fax".parse::<FlagCode>().is_err());
    }
}
