//! Content pools
//!
//! Builds the text (and picks the image) for each post category from the
//! configured pools. Every builder returns `None` when its pool is empty so
//! the caller can downgrade instead of failing.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use crate::clock::Window;
use crate::config::ContentConfig;
use crate::picker::RepetitionGuard;

pub struct ContentLibrary<'a> {
    config: &'a ContentConfig,
    images_dir: PathBuf,
}

impl<'a> ContentLibrary<'a> {
    pub fn new(config: &'a ContentConfig, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            images_dir: images_dir.into(),
        }
    }

    pub fn config(&self) -> &ContentConfig {
        self.config
    }

    /// Short greeting for the image post: GM, or GN with an optional emoji
    /// in the evening
    pub fn short_greeting<R: Rng + ?Sized>(&self, window: Window, rng: &mut R) -> Option<String> {
        match window {
            Window::Evening => {
                let base = self.config.gn_short.choose(rng)?;
                if rng.gen_bool(probability(self.config.gn_emoji_probability)) {
                    if let Some(emoji) = self.config.gn_emojis.choose(rng) {
                        return Some(format!("{} {}", base, emoji));
                    }
                }
                Some(base.clone())
            }
            _ => self.config.gm_short.choose(rng).cloned(),
        }
    }

    /// Long greeting: GM pool until the evening, GN pool afterwards
    pub fn long_greeting<R: Rng + ?Sized>(
        &self,
        window: Window,
        guard: &RepetitionGuard<'_>,
        rng: &mut R,
    ) -> Option<String> {
        let pool = match window {
            Window::Morning | Window::Midday => &self.config.gm_long,
            Window::Evening | Window::Night => &self.config.gn_long,
        };
        guard.pick_text(pool, self.config.text_lookback_days, rng)
    }

    pub fn short_link<R: Rng + ?Sized>(
        &self,
        guard: &RepetitionGuard<'_>,
        rng: &mut R,
    ) -> Option<String> {
        guard.pick_text(&self.config.links, self.config.text_lookback_days, rng)
    }

    /// An image not attached within the image lookback window, if the
    /// directory has any
    pub fn fresh_image<R: Rng + ?Sized>(
        &self,
        guard: &RepetitionGuard<'_>,
        rng: &mut R,
    ) -> Option<String> {
        let images = match list_local_images(&self.images_dir, &self.config.image_extensions) {
            Ok(images) => images,
            Err(e) => {
                warn!(
                    "Could not list images in {}: {}",
                    self.images_dir.display(),
                    e
                );
                return None;
            }
        };
        guard.pick_image(&images, self.config.image_lookback_days, rng)
    }

    /// Whether a long greeting gets an image attached this time
    pub fn attach_image_to_long<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_bool(probability(self.config.long_image_probability))
    }

    /// Reply to a mention: mostly a canned phrase, otherwise an emoji
    pub fn reply_text<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        let (first, second) = if rng.gen_bool(probability(self.config.reply_phrase_probability)) {
            (&self.config.reply_phrases, &self.config.reply_emojis)
        } else {
            (&self.config.reply_emojis, &self.config.reply_phrases)
        };
        first.choose(rng).or_else(|| second.choose(rng)).cloned()
    }
}

fn probability(p: f64) -> f64 {
    p.clamp(0.0, 1.0)
}

/// Regular files in `dir` whose lowercase extension is allowed, sorted.
///
/// A missing directory is an empty pool, not an error.
pub fn list_local_images(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut images = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let allowed = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false);
        if allowed {
            images.push(path.to_string_lossy().into_owned());
        }
    }
    images.sort();
    Ok(images)
}
