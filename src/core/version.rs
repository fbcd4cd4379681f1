//! Release version parsing

use crate::core::error::{PipelineError, Result};
use std::fmt;

/// A `MAJOR.MINOR.PATCH` version split the way the package builder wants it:
/// `version` is `MAJOR.MINOR` and `release` is `PATCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseVersion {
    pub major: String,
    pub minor: String,
    pub patch: String,
}

impl ReleaseVersion {
    pub fn parse(raw: &str) -> Result<Self> {
        let tokens: Vec<&str> = raw.trim().split('.').collect();
        if tokens.len() != 3 {
            return Err(PipelineError::InvalidConfig(format!(
                "version '{}' must have the form MAJOR.MINOR.PATCH ({} tokens found)",
                raw,
                tokens.len()
            )));
        }

        for token in &tokens {
            if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "version '{}' has a non-numeric component '{}'",
                    raw, token
                )));
            }
        }

        Ok(Self {
            major: tokens[0].to_string(),
            minor: tokens[1].to_string(),
            patch: tokens[2].to_string(),
        })
    }

    /// The two-part package version (`MAJOR.MINOR`)
    pub fn version(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// The package release component (`PATCH`)
    pub fn release(&self) -> String {
        self.patch.clone()
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
