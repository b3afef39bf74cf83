//! Randomized delays
//!
//! Delay windows are written as human-readable ranges such as `"25m-55m"`
//! or `"8s-28s"` and sampled uniformly. The continuous mode uses them to pick
//! the pause before the next cycle so the bot never runs on a fixed cadence.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::TimeSlot;
use crate::config::DelayConfig;

/// A closed range of durations, sampled uniformly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DurationRange {
    min: Duration,
    max: Duration,
}

impl DurationRange {
    pub fn new(min: Duration, max: Duration) -> Result<Self, String> {
        if min > max {
            return Err(format!(
                "Minimum ({}) must not exceed maximum ({})",
                humantime::format_duration(min),
                humantime::format_duration(max)
            ));
        }
        Ok(Self { min, max })
    }

    pub fn from_secs(min: u64, max: u64) -> Result<Self, String> {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// A range that always yields zero
    pub fn zero() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Parse `"MIN-MAX"`, each side a humantime duration
    pub fn parse(input: &str) -> Result<Self, String> {
        let (min_str, max_str) = split_range(input)?;
        let min = humantime::parse_duration(min_str.trim())
            .map_err(|e| format!("Could not parse duration '{}': {}", min_str, e))?;
        let max = humantime::parse_duration(max_str.trim())
            .map_err(|e| format!("Could not parse duration '{}': {}", max_str, e))?;
        Self::new(min, max)
    }
}

/// Split "MIN-MAX" into (MIN, MAX)
fn split_range(range: &str) -> Result<(&str, &str), String> {
    let parts: Vec<&str> = range.split('-').collect();
    if parts.len() != 2 {
        return Err(format!("Range must be MIN-MAX, got '{}'", range));
    }
    Ok((parts[0], parts[1]))
}

impl TryFrom<String> for DurationRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DurationRange> for String {
    fn from(range: DurationRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for DurationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            humantime::format_duration(self.min),
            humantime::format_duration(self.max)
        )
    }
}

/// Pause before the next cycle in continuous mode.
///
/// Quiet hours sleep longest, 07:00-23:00 shortest, anything else in
/// between. Occasionally an extra pause is added on top.
pub fn next_cycle_delay<R: Rng + ?Sized>(
    delays: &DelayConfig,
    slot: &TimeSlot,
    rng: &mut R,
) -> Duration {
    let base = if slot.quiet {
        delays.quiet_sleep.sample(rng)
    } else if (7..23).contains(&slot.hour()) {
        delays.active_sleep.sample(rng)
    } else {
        delays.night_sleep.sample(rng)
    };

    if rng.gen_bool(delays.extra_pause_probability.clamp(0.0, 1.0)) {
        base + delays.extra_pause.sample(rng)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{QuietHours, WindowClassifier};
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn slot_at(hour: u32, quiet: QuietHours) -> TimeSlot {
        let classifier = WindowClassifier::new(chrono_tz::UTC, quiet);
        classifier.classify(Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap())
    }

    fn mins(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn test_parse_minutes_range() {
        let range = DurationRange::parse("25m-55m").unwrap();
        assert_eq!(range.min(), mins(25));
        assert_eq!(range.max(), mins(55));
    }

    #[test]
    fn test_parse_mixed_units_with_spaces() {
        let range = DurationRange::parse("90s - 2h").unwrap();
        assert_eq!(range.min(), Duration::from_secs(90));
        assert_eq!(range.max(), mins(120));
    }

    #[test]
    fn test_parse_rejects_inverted_range() {
        let err = DurationRange::parse("10m-5m").unwrap_err();
        assert!(err.contains("must not exceed"));
    }

    #[test]
    fn test_parse_rejects_bad_format() {
        assert!(DurationRange::parse("10m").is_err());
        assert!(DurationRange::parse("1m-2m-3m").is_err());
        assert!(DurationRange::parse("soon-later").is_err());
    }

    #[test]
    fn test_sample_stays_in_range() {
        let range = DurationRange::from_secs(8, 28).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let d = range.sample(&mut rng);
            assert!(d >= Duration::from_secs(8) && d <= Duration::from_secs(28));
        }
    }

    #[test]
    fn test_zero_range_samples_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(DurationRange::zero().sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn test_serde_uses_string_form() {
        #[derive(Deserialize, Serialize)]
        struct Holder {
            delay: DurationRange,
        }

        let holder: Holder = toml::from_str(r#"delay = "8s-28s""#).unwrap();
        assert_eq!(holder.delay, DurationRange::from_secs(8, 28).unwrap());

        let out = toml::to_string(&holder).unwrap();
        assert!(out.contains("8s-28s"));
    }

    #[test]
    fn test_next_cycle_delay_quiet_hours_sleep_longer() {
        let delays = DelayConfig {
            extra_pause_probability: 0.0,
            ..DelayConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);

        let quiet = slot_at(2, QuietHours::default());
        for _ in 0..50 {
            let d = next_cycle_delay(&delays, &quiet, &mut rng);
            assert!(d >= mins(70) && d <= mins(120));
        }

        let active = slot_at(12, QuietHours::default());
        for _ in 0..50 {
            let d = next_cycle_delay(&delays, &active, &mut rng);
            assert!(d >= mins(25) && d <= mins(55));
        }
    }

    #[test]
    fn test_next_cycle_delay_night_outside_quiet_hours() {
        let delays = DelayConfig {
            extra_pause_probability: 0.0,
            ..DelayConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        // Quiet hours disabled: 02:00 is neither quiet nor active
        let slot = slot_at(2, QuietHours::new(0, 0));
        let d = next_cycle_delay(&delays, &slot, &mut rng);
        assert!(d >= mins(45) && d <= mins(80));
    }

    #[test]
    fn test_next_cycle_delay_extra_pause() {
        let delays = DelayConfig {
            extra_pause_probability: 1.0,
            ..DelayConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let slot = slot_at(12, QuietHours::default());
        let d = next_cycle_delay(&delays, &slot, &mut rng);
        assert!(d >= mins(45) && d <= mins(95));
    }
}
