//! Expense model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// A stable, globally unique expense identifier.
///
/// Locally created ids are UUID v7 (time-sortable), but ids arriving from the
/// remote are kept verbatim, whatever their shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(String);

impl ExpenseId {
    /// Create a new unique expense ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExpenseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExpenseId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("expense id cannot be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Fixed-point decimal amount stored as signed minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    #[must_use]
    pub const fn from_minor_units(minor: i64) -> Self {
        Self(minor)
    }

    #[must_use]
    pub const fn minor_units(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidInput(format!("invalid amount: '{s}'"));
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if fraction.len() > 2
            || !whole.chars().all(|ch| ch.is_ascii_digit())
            || !fraction.chars().all(|ch| ch.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        let minor = whole
            .checked_mul(100)
            .and_then(|value| value.checked_add(fraction))
            .ok_or_else(invalid)?;
        Ok(Self(if negative { -minor } else { minor }))
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// How an expense was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Cash,
    Card,
    Bank,
    Upi,
    Wallet,
    Other,
}

impl PaymentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::Bank => "bank",
            Self::Upi => "upi",
            Self::Wallet => "wallet",
            Self::Other => "other",
        }
    }
}

impl FromStr for PaymentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "bank" => Ok(Self::Bank),
            "upi" => Ok(Self::Upi),
            "wallet" => Ok(Self::Wallet),
            "other" => Ok(Self::Other),
            other => Err(Error::InvalidInput(format!(
                "unknown payment method: '{other}'"
            ))),
        }
    }
}

/// Payment method with an optional free-form label (e.g. card nickname).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub kind: PaymentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}:{label}", self.kind.as_str()),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, label) = s.split_once(':').map_or((s, None), |(kind, label)| {
            (kind, crate::util::normalize_text_option(Some(label.to_string())))
        });
        Ok(Self {
            kind: kind.parse()?,
            label,
        })
    }
}

/// A single expense in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    /// Stable identifier, never changes
    pub id: ExpenseId,
    /// Amount spent
    pub amount: Amount,
    /// Category name
    pub category: String,
    /// When the expense occurred (Unix ms)
    pub date: i64,
    /// Optional free-text note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Optional payment method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms); the only conflict-resolution signal
    pub updated_at: i64,
}

impl Expense {
    /// Create a new expense dated now
    #[must_use]
    pub fn new(amount: Amount, category: impl Into<String>) -> Self {
        let now = crate::util::unix_millis_now();
        Self {
            id: ExpenseId::new(),
            amount,
            category: category.into(),
            date: now,
            note: None,
            payment_method: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance `updated_at` after a local mutation.
    ///
    /// Never moves backwards, even if the wall clock does.
    pub fn touch(&mut self) {
        self.updated_at = crate::util::unix_millis_now().max(self.updated_at.saturating_add(1));
    }
}
