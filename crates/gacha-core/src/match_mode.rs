use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported keyword matching strategies.
pub enum MatchMode {
    #[default]
    Exact,
    StartsWith,
    Contains,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::StartsWith => "starts_with",
            Self::Contains => "contains",
        }
    }

    /// Longer keywords win for the partial modes; exact keeps table order.
    pub fn uses_length_priority(self) -> bool {
        matches!(self, Self::StartsWith | Self::Contains)
    }

    pub fn matches(self, text: &str, keyword: &str) -> bool {
        match self {
            Self::Exact => text == keyword,
            Self::StartsWith => text.starts_with(keyword),
            Self::Contains => text.contains(keyword),
        }
    }
}

impl FromStr for MatchMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "starts_with" => Ok(Self::StartsWith),
            "contains" => Ok(Self::Contains),
            other => bail!("unknown keyword match mode '{other}'"),
        }
    }
}
