use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::domain::{BatchId, BatchStatus, EntryId, PaymentMethod};

/// Batch as returned by `GET /batches` and `GET /batches/{id}`. Every field
/// except the id may be absent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub id: BatchId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debit_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BatchStatus>,
}

impl BatchRecord {
    pub fn bare(id: impl Into<BatchId>) -> Self {
        Self {
            id: id.into(),
            payment_type: None,
            debit_account: None,
            account_type: None,
            payment_date: None,
            status: None,
        }
    }
}

/// Body of `PUT /batches/{id}`. The whole field set is pushed at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateRequest {
    pub payment_type: String,
    pub debit_account: String,
    pub account_type: String,
    pub payment_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BatchStatus>,
}

/// One payee's payment instruction. `id` is `None` until the service has
/// acknowledged the entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntryId>,
    #[serde(default, deserialize_with = "method_or_default")]
    pub method: PaymentMethod,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub payee_details: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub payee_name: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub bank_details: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub your_reference: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub payment_reference: String,
    #[serde(default)]
    pub amount: Amount,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub notes: String,
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn method_or_default<'de, D>(deserializer: D) -> Result<PaymentMethod, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(PaymentMethod::from)
        .unwrap_or_default())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount '{0}' is not a decimal number")]
    NotNumeric(String),
    #[error("amount {0} must not be negative")]
    Negative(Decimal),
}

/// Entry amount exactly as supplied by the service or typed by the user: a
/// JSON number, free text, or null.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(serde_json::Number),
    Text(String),
    #[default]
    Missing,
}

impl Amount {
    pub fn zero() -> Self {
        Self::Number(serde_json::Number::from(0))
    }

    pub fn from_decimal(value: Decimal) -> Self {
        serde_json::Number::from_str(&value.normalize().to_string())
            .map(Self::Number)
            .unwrap_or_else(|_| Self::Text(value.to_string()))
    }

    /// Numeric value for totals. Absent or unparsable input counts as zero.
    pub fn value(&self) -> Decimal {
        self.checked().ok().flatten().unwrap_or(Decimal::ZERO)
    }

    /// Strict parse used where a bad amount must be rejected rather than
    /// counted as zero. Blank input is `Ok(None)`.
    pub fn checked(&self) -> Result<Option<Decimal>, AmountError> {
        let raw = match self {
            Self::Missing => return Ok(None),
            Self::Number(number) => number.to_string(),
            Self::Text(text) if text.trim().is_empty() => return Ok(None),
            Self::Text(text) => text.trim().to_string(),
        };
        Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map(Some)
            .map_err(|_| AmountError::NotNumeric(raw))
    }

    /// Strict parse that additionally rejects negative amounts.
    pub fn non_negative(&self) -> Result<Option<Decimal>, AmountError> {
        match self.checked()? {
            Some(value) if value.is_sign_negative() && !value.is_zero() => {
                Err(AmountError::Negative(value))
            }
            other => Ok(other),
        }
    }
}

impl From<&str> for Amount {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self::Number(serde_json::Number::from(value))
    }
}
