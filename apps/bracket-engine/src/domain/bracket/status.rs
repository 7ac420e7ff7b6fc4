//! Bracket order status.

use serde::{Deserialize, Serialize};

/// Status of a bracket's parent order.
///
/// Broker feeds report many spellings; anything that does not normalize to a
/// known variant is kept verbatim (uppercased) so reconciliation never loses
/// information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BracketStatus {
    /// Order is live at the broker (or pending submission).
    Open,
    /// Parent order fully filled.
    Filled,
    /// Order cancelled before filling.
    Cancelled,
    /// Position closed out.
    Closed,
    /// Unrecognized broker status, kept as reported (uppercased).
    Raw(String),
}

impl BracketStatus {
    /// Normalize a broker-reported status string.
    #[must_use]
    pub fn normalize(status: &str) -> Self {
        match status.trim().to_uppercase().as_str() {
            "OPEN" => Self::Open,
            "FILLED" => Self::Filled,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            "CLOSED" => Self::Closed,
            other => Self::Raw(other.to_string()),
        }
    }

    /// The status as a normalized (uppercase) string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "OPEN",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Closed => "CLOSED",
            Self::Raw(raw) => raw.as_str(),
        }
    }

    /// Whether the bracket is still live.
    ///
    /// A status counts as open when it does not contain a fill/cancel/close
    /// substring (case-insensitive), so raw broker statuses like
    /// `PENDING_SUBMIT` stay open while `PARTIALLY_FILLED` does not.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let upper = self.as_str().to_uppercase();
        !(upper.contains("FILL") || upper.contains("CANCEL") || upper.contains("CLOSE"))
    }

    /// Whether the status is terminal for the stream-matching path.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

impl Default for BracketStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl From<String> for BracketStatus {
    fn from(value: String) -> Self {
        Self::normalize(&value)
    }
}

impl From<BracketStatus> for String {
    fn from(value: BracketStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for BracketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
