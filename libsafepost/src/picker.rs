//! Anti-repetition picking
//!
//! Candidates used within a lookback window are avoided. When every
//! candidate was used recently, a random one is returned anyway: repeating a
//! text is better than never posting.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::state::HistoryEntry;

/// Looks candidates up in the publication history as of `now`
#[derive(Debug, Clone, Copy)]
pub struct RepetitionGuard<'a> {
    history: &'a [HistoryEntry],
    now: DateTime<Utc>,
}

impl<'a> RepetitionGuard<'a> {
    pub fn new(history: &'a [HistoryEntry], now: DateTime<Utc>) -> Self {
        Self { history, now }
    }

    fn recent(&self, lookback_days: u32) -> impl Iterator<Item = &'a HistoryEntry> {
        let cutoff = self.now - Duration::days(i64::from(lookback_days));
        // History is in time order, so stop at the first entry past the cutoff
        self.history
            .iter()
            .rev()
            .take_while(move |entry| entry.timestamp >= cutoff)
    }

    pub fn text_used_recently(&self, text: &str, lookback_days: u32) -> bool {
        let text = text.trim();
        self.recent(lookback_days)
            .any(|entry| entry.text.trim() == text)
    }

    pub fn media_used_recently(&self, media: &str, lookback_days: u32) -> bool {
        self.recent(lookback_days)
            .any(|entry| entry.media.as_deref() == Some(media))
    }

    /// Pick a text not published within `lookback_days`
    pub fn pick_text<R: Rng + ?Sized>(
        &self,
        pool: &[String],
        lookback_days: u32,
        rng: &mut R,
    ) -> Option<String> {
        pick_fresh(pool, |text| self.text_used_recently(text, lookback_days), rng)
    }

    /// Pick an image identifier not attached within `lookback_days`
    pub fn pick_image<R: Rng + ?Sized>(
        &self,
        pool: &[String],
        lookback_days: u32,
        rng: &mut R,
    ) -> Option<String> {
        pick_fresh(pool, |media| self.media_used_recently(media, lookback_days), rng)
    }
}

/// Uniform pick among candidates for which `used` is false, falling back to
/// the whole pool. `None` only for an empty pool.
pub fn pick_fresh<R, F>(pool: &[String], used: F, rng: &mut R) -> Option<String>
where
    R: Rng + ?Sized,
    F: Fn(&str) -> bool,
{
    let unused: Vec<&String> = pool.iter().filter(|c| !used(c.as_str())).collect();
    match unused.choose(rng) {
        Some(choice) => Some((*choice).clone()),
        None => pool.choose(rng).cloned(),
    }
}
