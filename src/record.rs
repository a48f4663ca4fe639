//! Per-user session record and the small enums it is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Telegram user identifier
pub type UserId = i64;

/// Maximum number of trend tags kept per user
pub const HISTORY_CAP: usize = 10;

/// Play mode, selects which ladder length applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Free,
    Vip,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Free => write!(f, "free"),
            Mode::Vip => write!(f, "vip"),
        }
    }
}

/// Trend tag stored in the history and returned as a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Big,
    Small,
}

impl Trend {
    pub fn inverse(self) -> Self {
        match self {
            Trend::Big => Trend::Small,
            Trend::Small => Trend::Big,
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Big => write!(f, "BIG"),
            Trend::Small => write!(f, "SMALL"),
        }
    }
}

/// Result the user reports for the last presented period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

/// Where a user currently is in the guided flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    AwaitingMode,
    AwaitingPeriod,
    AwaitingResult,
}

/// Persisted state for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default)]
    pub vip: bool,
    pub mode: Mode,
    pub level: u32,
    pub bet: u64,
    pub period: u64,
    #[serde(default)]
    pub history: VecDeque<Trend>,
    #[serde(default)]
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Fresh record for a user seen for the first time
    pub fn new(id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id,
            vip: false,
            mode: Mode::Free,
            level: 1,
            bet: 1,
            period: 0,
            history: VecDeque::new(),
            phase: Phase::AwaitingMode,
            created_at: now,
            updated_at: now,
        }
    }

    /// Back to the bottom of the ladder. `vip` and `mode` are untouched.
    pub fn reset_ladder(&mut self) {
        self.level = 1;
        self.bet = 1;
        self.period = 0;
        self.history.clear();
    }

    /// Append a trend tag, evicting the oldest entries past [`HISTORY_CAP`]
    pub fn push_history(&mut self, tag: Trend) {
        self.history.push_back(tag);
        while self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
