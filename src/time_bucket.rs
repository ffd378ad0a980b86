//! Coarse time-of-day buckets used to bias suggestion ranking
//!
//! - MORNING: 05:00–11:59
//! - AFTERNOON: 12:00–16:59
//! - EVENING: 17:00–20:59
//! - NIGHT: 21:00–04:59

use chrono::{Local, Timelike};
use serde::{Deserialize, Serialize};

/// Time-of-day category sent with suggestion requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeBucket {
    /// Bucket for an hour of the day (0–23)
    #[must_use]
    pub const fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }

    /// Bucket for the current local time
    #[must_use]
    pub fn now() -> Self {
        Self::from_hour(Local::now().hour())
    }

    /// Wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "MORNING",
            Self::Afternoon => "AFTERNOON",
            Self::Evening => "EVENING",
            Self::Night => "NIGHT",
        }
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
