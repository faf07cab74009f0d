use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use turnstile::clock::SystemClock;
use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::{Algorithm, Decision, RateLimiter};

/// Run identities through a rate limiter and print each decision as JSON.
///
/// Identities come from `--identity` flags, or one per line on stdin.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Admission algorithm (token_bucket, fixed_window, sliding_window_log,
    /// sliding_window_counter)
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Maximum admissions per window
    #[arg(short = 'n', long)]
    max_admissions: Option<u64>,

    /// Window length in seconds
    #[arg(short, long)]
    window_seconds: Option<f64>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Identity to check; repeat for more. Reads stdin when absent
    #[arg(short, long = "identity")]
    identities: Vec<String>,
}

#[derive(Serialize)]
struct Record<'a> {
    identity: &'a str,
    #[serde(flatten)]
    decision: &'a Decision,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(name) = &args.algorithm {
        config.limiter.algorithm = name.parse::<Algorithm>()?;
    }
    if let Some(max) = args.max_admissions {
        config.limiter.max_admissions = max;
    }
    if let Some(window) = args.window_seconds {
        config.limiter.window_seconds = window;
    }
    config.logging.json |= args.json_logs;

    init_tracing(&config.logging);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!(path = %path.display(), "Loaded configuration");
    }

    let limiter = config.limiter.build(Arc::new(SystemClock))?;
    info!(
        algorithm = %limiter.algorithm(),
        max_admissions = limiter.quota().max_admissions(),
        window_secs = limiter.quota().window_secs(),
        "Rate limiter initialized"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.identities.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line?;
            let identity = line.trim();
            if identity.is_empty() {
                continue;
            }
            check(&limiter, identity, &mut out)?;
        }
    } else {
        for identity in &args.identities {
            check(&limiter, identity, &mut out)?;
        }
    }

    Ok(())
}

fn check(limiter: &RateLimiter, identity: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let decision = limiter.allow(identity)?;
    debug!(identity = %identity, decision = %decision, "Checked");

    serde_json::to_writer(&mut *out, &Record {
        identity,
        decision: &decision,
    })?;
    writeln!(out)?;
    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_writer(io::stderr)
            .init();
    }
}
