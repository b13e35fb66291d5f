use serde::Serialize;

use crate::config::{placeholder_counters, CounterFallback};

// ---------------------------------------------------------------------------
// Counter actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pray,
    Hagelslag,
    Win,
    Unwin,
    /// Absent or unrecognized action: read only.
    None,
}

impl Action {
    /// Exact match only; anything outside the known set maps to `Action::None`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("pray") => Action::Pray,
            Some("hagelslag") => Action::Hagelslag,
            Some("win") => Action::Win,
            Some("unwin") => Action::Unwin,
            _ => Action::None,
        }
    }

    pub fn is_mutation(self) -> bool {
        self != Action::None
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Pray => "pray",
            Action::Hagelslag => "hagelslag",
            Action::Win => "win",
            Action::Unwin => "unwin",
            Action::None => "none",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Counter snapshot
// ---------------------------------------------------------------------------

/// Response shape of the counter service. `hagelslags` always mirrors `hagels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub wins: i64,
    pub prayers: i64,
    pub hagels: i64,
    pub hagelslags: i64,
}

impl CounterSnapshot {
    pub fn new(wins: i64, prayers: i64, hagels: i64) -> Self {
        Self {
            wins,
            prayers,
            hagels,
            hagelslags: hagels,
        }
    }

    pub fn zeros() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn fallback(kind: CounterFallback) -> Self {
        match kind {
            CounterFallback::Zeros => Self::zeros(),
            CounterFallback::Placeholder => Self::new(
                placeholder_counters::WINS,
                placeholder_counters::PRAYERS,
                placeholder_counters::HAGELS,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Rate bundle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBundle {
    pub start_rate: f64,
    pub current_rate: Option<f64>,
    pub yesterday_rate: Option<f64>,
    /// UTC date of the refresh (YYYY-MM-DD).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<String>,
}

impl RateBundle {
    pub fn fallback(start_rate: f64) -> Self {
        Self {
            start_rate,
            current_rate: None,
            yesterday_rate: None,
            as_of: None,
        }
    }
}
