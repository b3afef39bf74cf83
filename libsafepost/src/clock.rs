//! Day-part windows and quiet hours
//!
//! Everything here is a pure function of an instant and the configured
//! timezone, so callers can classify any `DateTime<Utc>` (tests pin it).

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Coarse local-time bucket driving which content category is preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// 07:00 to 11:00
    Morning,
    /// 11:00 to 19:00
    Midday,
    /// 19:00 to 23:00
    Evening,
    /// Everything else
    Night,
}

impl Window {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            7..=10 => Window::Morning,
            11..=18 => Window::Midday,
            19..=22 => Window::Evening,
            _ => Window::Night,
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Window::Morning => write!(f, "morning"),
            Window::Midday => write!(f, "midday"),
            Window::Evening => write!(f, "evening"),
            Window::Night => write!(f, "night"),
        }
    }
}

/// Local hours during which nothing new is published.
///
/// `start_hour` is inclusive, `end_hour` exclusive. When `start_hour >
/// end_hour` the interval wraps around midnight; equal hours disable quiet
/// hours entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl QuietHours {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl Default for QuietHours {
    fn default() -> Self {
        Self::new(23, 7)
    }
}

/// Result of classifying one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub local: DateTime<Tz>,
    pub window: Window,
    pub quiet: bool,
}

impl TimeSlot {
    pub fn hour(&self) -> u32 {
        self.local.hour()
    }

    /// Calendar day key, e.g. `2025-03-14`
    pub fn day_key(&self) -> String {
        self.local.format("%Y-%m-%d").to_string()
    }

    /// Hour bucket key, e.g. `2025-03-14_08`
    pub fn hour_key(&self) -> String {
        self.local.format("%Y-%m-%d_%H").to_string()
    }
}

/// Maps instants to windows in a fixed timezone
#[derive(Debug, Clone, Copy)]
pub struct WindowClassifier {
    tz: Tz,
    quiet: QuietHours,
}

impl WindowClassifier {
    pub fn new(tz: Tz, quiet: QuietHours) -> Self {
        Self { tz, quiet }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn classify(&self, now: DateTime<Utc>) -> TimeSlot {
        let local = now.with_timezone(&self.tz);
        let hour = local.hour();

        TimeSlot {
            local,
            window: Window::from_hour(hour),
            quiet: self.quiet.contains(hour),
        }
    }
}
