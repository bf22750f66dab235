use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque batch identifier assigned by the payroll service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BatchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Draft,
    Submitted,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            _ => None,
        }
    }
}

/// Transfer rail for one entry. Unknown values from the service are kept
/// verbatim so they survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentMethod {
    #[default]
    Neft,
    Rtgs,
    Imps,
    Other(String),
}

impl PaymentMethod {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Neft => "NEFT",
            Self::Rtgs => "RTGS",
            Self::Imps => "IMPS",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for PaymentMethod {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "NEFT" => Self::Neft,
            "RTGS" => Self::Rtgs,
            "IMPS" => Self::Imps,
            _ => Self::Other(value),
        }
    }
}

impl From<PaymentMethod> for String {
    fn from(value: PaymentMethod) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
