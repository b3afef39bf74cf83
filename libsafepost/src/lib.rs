//! Safepost - a cautious Mastodon bot
//!
//! Each cycle performs at most one action (engage with a mention, publish a
//! post, reblog, or nothing) while respecting daily and hourly caps, quiet
//! hours, per-category caps and anti-repetition windows.

pub mod clock;
pub mod config;
pub mod content;
pub mod cycle;
pub mod engagement;
pub mod error;
pub mod logging;
pub mod picker;
pub mod platforms;
pub mod reblog;
pub mod retry;
pub mod scheduling;
pub mod selector;
pub mod state;

// Re-export commonly used types
pub use clock::{TimeSlot, Window, WindowClassifier};
pub use config::Config;
pub use cycle::{Bot, CycleOutcome};
pub use error::{ConfigError, PlatformError, Result, SafepostError, StateError};
pub use platforms::SocialPlatform;
pub use retry::RetryPolicy;
pub use state::{PersistedState, StateStore};
