//! safepost-bot - one safe Mastodon action per cycle
//!
//! Runs a single cycle and prints its status, or keeps cycling with
//! randomized pauses until interrupted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use libsafepost::logging::{LogFormat, LoggingConfig};
use libsafepost::platforms::mastodon::MastodonClient;
use libsafepost::scheduling::next_cycle_delay;
use libsafepost::{Bot, Config, Result, SocialPlatform, StateStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "safepost-bot")]
#[command(version)]
#[command(about = "Anti-spam Mastodon bot: one safe action per cycle")]
#[command(long_about = "\
safepost-bot - Anti-spam Mastodon bot: one safe action per cycle

DESCRIPTION:
    Each cycle does at most one thing: favourite or answer a mention,
    publish a greeting, an image or a link, reblog a status from the home
    timeline, or nothing at all. Daily and hourly caps, quiet hours,
    per-category caps and anti-repetition windows are always enforced.

USAGE:
    # Run one cycle and print its status
    safepost-bot --oneshot

    # Keep cycling with randomized pauses
    safepost-bot --loop

    # Use a specific config file with JSON logs
    safepost-bot --config ./safepost.toml --log-format json

OUTPUT:
    stdout: one line per cycle, e.g. 'Status: posted'
    stderr: logs

    Statuses: posted, reblogged, engaged, engage_failed, skip, post_failed

ENVIRONMENT:
    MASTODON_BASE_URL       Instance URL (overrides [mastodon] instance)
    MASTODON_ACCESS_TOKEN   Access token (overrides [mastodon] token_file)
    SAFEPOST_CONFIG         Config file path
    SAFEPOST_LOG_FORMAT     text, json or pretty
    SAFEPOST_LOG_LEVEL      Default log filter, e.g. info or debug

SIGNALS:
    SIGTERM, SIGINT - Stop the loop after the current cycle

EXIT CODES:
    0 - Success
    1 - Runtime error
    2 - Configuration error
    3 - Another instance holds the state lock
")]
struct Cli {
    /// Run a single cycle and exit (default)
    #[arg(long, conflicts_with = "run_loop")]
    oneshot: bool,

    /// Run cycles continuously until interrupted
    #[arg(long = "loop")]
    run_loop: bool,

    /// Path to the config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let credentials = config.credentials()?;

    // Held until the process exits
    let _lock = StateStore::new(config.state_path()).lock()?;

    let platform = MastodonClient::from_credentials(&credentials)?;
    info!("Using Mastodon instance {}", platform.instance_url());

    let mut bot = Bot::new(config, platform, StdRng::from_entropy())?;
    bot.verify().await?;

    if cli.run_loop && !cli.oneshot {
        let shutdown = Arc::new(AtomicBool::new(false));
        setup_signal_handlers(shutdown.clone())?;
        run_loop(&mut bot, &shutdown).await;
        info!("safepost-bot stopped");
    } else {
        let outcome = bot.run_cycle().await;
        println!("Status: {}", outcome);
    }

    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping after the current cycle");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

/// Cycle until shutdown. A failed action is followed by a cooldown.
async fn run_loop<P: SocialPlatform>(bot: &mut Bot<P>, shutdown: &AtomicBool) {
    info!("Starting continuous mode");

    while !shutdown.load(Ordering::Relaxed) {
        let delays = bot.config().delays.clone();
        let mut delay = Duration::ZERO;

        let outcome = bot.run_cycle().await;
        println!("Status: {}", outcome);
        if outcome.is_failure() {
            delay += delays.cooldown.sample(bot.rng());
        }

        let slot = bot.classifier().classify(Utc::now());
        delay += next_cycle_delay(&delays, &slot, bot.rng());
        info!("Next cycle in {}", humanize(delay));
        sleep_unless_shutdown(delay, shutdown).await;
    }
}

/// Sleep for `delay`, waking early when shutdown is requested
async fn sleep_unless_shutdown(delay: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep((deadline - now).min(Duration::from_secs(1))).await;
    }
}

fn humanize(delay: Duration) -> String {
    let secs = delay.as_secs();
    format!("{}m{:02}s", secs / 60, secs % 60)
}
