// # shelfsyncd - Audiobookshelf sync daemon
//
// A thin shell over shelfsync-core:
// 1. Read configuration from environment variables
// 2. Initialize tracing and the runtime
// 3. Wire the Audiobookshelf client and the JSON library file into a SyncRunner
// 4. Run the requested mode once, or keep running the daily sync
//
// ## Configuration
//
// ### Connection
// - `SHELFSYNC_URL`: Server base URL (default http://localhost:13378)
// - `SHELFSYNC_API_KEY`: API key (required)
// - `SHELFSYNC_LIBRARY_ID`: Library to sync from (required)
//
// ### Local library
// - `SHELFSYNC_LIBRARY_FILE`: Path to the JSON library file (required)
// - `SHELFSYNC_COLUMNS`: `field=column` pairs, comma separated
//
// ### Mode
// - `SHELFSYNC_MODE`: sync (default), quick-link, candidates, link
// - `SHELFSYNC_BOOK`: Book id for candidates and link
// - `SHELFSYNC_REMOTE_ID`: Remote item id for link (empty means skip)
//
// ### Schedule
// - `SHELFSYNC_SCHEDULE_ENABLED`: true to keep running a daily sync
// - `SHELFSYNC_SCHEDULE_HOUR` / `SHELFSYNC_SCHEDULE_MINUTE`: local time (default 4:00)
//
// ### Runner
// - `SHELFSYNC_FETCH_TIMEOUT_SECS`: Per-fetch timeout (default 20)
// - `SHELFSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export SHELFSYNC_URL=http://abs.local:13378
// export SHELFSYNC_API_KEY=your_key
// export SHELFSYNC_LIBRARY_ID=lib_main
// export SHELFSYNC_LIBRARY_FILE=/var/lib/shelfsync/library.json
// export SHELFSYNC_COLUMNS=progress_int=#abs_progint,finished=#abs_finished
//
// shelfsyncd
// ```

use anyhow::{Context, Result};
use serde_json::Value;
use shelfsync_core::config::{
    ColumnSelection, ConnectionConfig, RunnerConfig, ScheduleConfig, SyncConfig,
};
use shelfsync_core::model::BookId;
use shelfsync_core::runner::{RunEvent, SyncRunner};
use shelfsync_core::store::JsonFileLocalStore;
use shelfsync_core::{MatchSelection, RemoteCatalog};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// What the daemon was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Sync,
    QuickLink,
    Candidates(BookId),
    Link(BookId, MatchSelection),
}

/// Application configuration
#[derive(Debug)]
struct Config {
    sync: SyncConfig,
    library_file: String,
    mode: Mode,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).unwrap_or_default();

        let connection = ConnectionConfig::new(
            lookup("SHELFSYNC_URL").unwrap_or_else(|| ConnectionConfig::default().base_url),
            var("SHELFSYNC_LIBRARY_ID"),
            var("SHELFSYNC_API_KEY"),
        );

        let columns = ColumnSelection::from_str(&var("SHELFSYNC_COLUMNS"))
            .context("SHELFSYNC_COLUMNS is invalid")?;

        let defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            enabled: parse_var(&lookup, "SHELFSYNC_SCHEDULE_ENABLED")?.unwrap_or(false),
            hour: parse_var(&lookup, "SHELFSYNC_SCHEDULE_HOUR")?.unwrap_or(defaults.hour),
            minute: parse_var(&lookup, "SHELFSYNC_SCHEDULE_MINUTE")?.unwrap_or(defaults.minute),
        };

        let mut runner = RunnerConfig::default();
        if let Some(secs) = parse_var(&lookup, "SHELFSYNC_FETCH_TIMEOUT_SECS")? {
            runner.fetch_timeout_secs = secs;
        }

        let book: Option<u64> = parse_var(&lookup, "SHELFSYNC_BOOK")?;
        let mode = match var("SHELFSYNC_MODE").to_lowercase().as_str() {
            "" | "sync" => Mode::Sync,
            "quick-link" => Mode::QuickLink,
            "candidates" => Mode::Candidates(BookId(
                book.context("SHELFSYNC_BOOK is required when SHELFSYNC_MODE=candidates")?,
            )),
            "link" => {
                let book = book.context("SHELFSYNC_BOOK is required when SHELFSYNC_MODE=link")?;
                let selection = match lookup("SHELFSYNC_REMOTE_ID") {
                    Some(id) if !id.trim().is_empty() => MatchSelection::Link(id.trim().to_string()),
                    _ => MatchSelection::Skip,
                };
                Mode::Link(BookId(book), selection)
            }
            other => anyhow::bail!(
                "SHELFSYNC_MODE '{}' is not supported. \
                Supported modes: sync, quick-link, candidates, link",
                other
            ),
        };

        let mut sync = SyncConfig::new(connection)
            .with_columns(columns)
            .with_schedule(schedule);
        sync.runner = runner;

        Ok(Self {
            sync,
            library_file: var("SHELFSYNC_LIBRARY_FILE"),
            mode,
            log_level: lookup("SHELFSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.sync.connection.api_key.is_empty() {
            anyhow::bail!(
                "SHELFSYNC_API_KEY is required. \
                Set it via: export SHELFSYNC_API_KEY=your_key"
            );
        }

        if self.sync.connection.library_id.is_empty() {
            anyhow::bail!(
                "SHELFSYNC_LIBRARY_ID is required. \
                Set it via: export SHELFSYNC_LIBRARY_ID=your_library"
            );
        }

        let url = &self.sync.connection.base_url;
        if !url.starts_with("https://") && !url.starts_with("http://") {
            anyhow::bail!("SHELFSYNC_URL must use HTTP or HTTPS scheme. Got: {}", url);
        }

        if self.library_file.is_empty() {
            anyhow::bail!(
                "SHELFSYNC_LIBRARY_FILE is required. \
                Set it via: export SHELFSYNC_LIBRARY_FILE=/var/lib/shelfsync/library.json"
            );
        }

        if let Some(parent) = std::path::Path::new(&self.library_file).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "SHELFSYNC_LIBRARY_FILE parent directory does not exist: {}. \
                Create it first: mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "SHELFSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.sync.validate()?;
        Ok(())
    }
}

/// Parse an optional variable, failing on malformed values
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is invalid ({}): {}", key, raw, e)),
        _ => Ok(None),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return SyncExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so that reports on stdout stay machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    info!("Starting shelfsyncd");
    info!(
        "Configuration loaded: {} column(s) enabled, mode {:?}",
        config.sync.columns.iter().count(),
        config.mode
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => SyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                exit_code_for(&e)
            }
        }
    });

    result.into()
}

/// Configuration problems surfaced late still exit as configuration errors
fn exit_code_for(err: &anyhow::Error) -> SyncExitCode {
    match err.downcast_ref::<shelfsync_core::Error>() {
        Some(shelfsync_core::Error::Config(_)) => SyncExitCode::ConfigError,
        _ => SyncExitCode::RuntimeError,
    }
}

#[cfg(feature = "audiobookshelf")]
fn build_catalog(config: &SyncConfig) -> Result<Box<dyn RemoteCatalog>> {
    let client = shelfsync_audiobookshelf::AudiobookshelfClient::with_timeout(
        config.connection.clone(),
        config.runner.fetch_timeout(),
    )?;
    Ok(Box::new(client))
}

#[cfg(not(feature = "audiobookshelf"))]
fn build_catalog(_config: &SyncConfig) -> Result<Box<dyn RemoteCatalog>> {
    Err(shelfsync_core::Error::config(
        "No remote catalog compiled in (enable the audiobookshelf feature)",
    )
    .into())
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let catalog = build_catalog(&config.sync)?;
    let store = JsonFileLocalStore::open(&config.library_file).await?;
    info!("Local library: {}", store.path().display());

    let schedule = config.sync.schedule.clone();
    if config.sync.columns.is_empty() && config.mode == Mode::Sync {
        warn!("No columns selected in SHELFSYNC_COLUMNS; sync will not change anything");
    }

    let (runner, events) = SyncRunner::new(catalog, Box::new(store), config.sync)?;
    tokio::spawn(log_events(events));

    if let Err(e) = runner.ping().await {
        warn!("Connectivity check failed: {}", e);
    }

    match config.mode {
        Mode::Sync if schedule.enabled => run_scheduled(&runner, &schedule).await,
        Mode::Sync => {
            let report = runner.sync().await?;
            info!("Sync completed\n{}", report);
            print_json(&serde_json::to_value(&report)?)
        }
        Mode::QuickLink => {
            let report = runner.quick_link().await?;
            info!("Quick link completed\n{}", report);
            print_json(&serde_json::to_value(&report)?)
        }
        Mode::Candidates(book) => {
            let candidates = runner.candidates(book).await?;
            info!("{} candidate(s) for book {}", candidates.len(), book);
            print_json(&serde_json::to_value(&candidates)?)
        }
        Mode::Link(book, selection) => {
            let report = runner.apply_selections(vec![(book, selection)]).await?;
            info!("Link completed\n{}", report);
            print_json(&serde_json::to_value(&report)?)
        }
    }
}

/// Sync once a day at the configured time until a shutdown signal arrives
async fn run_scheduled(runner: &SyncRunner, schedule: &ScheduleConfig) -> Result<()> {
    info!(
        "Scheduled sync enabled at {}:{:02}",
        schedule.hour, schedule.minute
    );

    loop {
        let now = chrono::Local::now().time();
        let delay = schedule.next_run_delay(now)?;
        info!("Next sync in {} minute(s)", delay.as_secs() / 60);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            signal = wait_for_shutdown() => {
                info!("Received shutdown signal: {}", signal?);
                info!("Shutting down daemon");
                return Ok(());
            }
        }

        match runner.sync().await {
            Ok(report) => {
                info!("Scheduled sync completed\n{}", report);
                print_json(&serde_json::to_value(&report)?)?;
            }
            // The next day's run may succeed; only config problems are final
            Err(e) if matches!(e, shelfsync_core::Error::Config(_)) => return Err(e.into()),
            Err(e) => error!("Scheduled sync failed: {}", e),
        }

        // Step past the target minute before computing the next delay
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(61)) => {}
            signal = wait_for_shutdown() => {
                info!("Received shutdown signal: {}", signal?);
                return Ok(());
            }
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Drain run events into the log
async fn log_events(mut events: mpsc::Receiver<RunEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Run event: {:?}", event);
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfsync_core::FieldKey;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("SHELFSYNC_API_KEY", "key"),
        ("SHELFSYNC_LIBRARY_ID", "lib_main"),
        ("SHELFSYNC_LIBRARY_FILE", "library.json"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        BASE.iter().chain(extra.iter()).copied().collect()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(BASE)).unwrap();
        config.validate().unwrap();

        assert_eq!(config.mode, Mode::Sync);
        assert_eq!(config.sync.connection.base_url, "http://localhost:13378");
        assert_eq!(config.sync.schedule, ScheduleConfig::default());
        assert_eq!(config.sync.runner.fetch_timeout_secs, 20);
        assert!(config.sync.columns.is_empty());
    }

    #[test]
    fn columns_and_schedule_parse() {
        let config = Config::from_lookup(lookup(&with(&[
            ("SHELFSYNC_COLUMNS", "progress_int=#abs_progint,finished=#abs_finished"),
            ("SHELFSYNC_SCHEDULE_ENABLED", "true"),
            ("SHELFSYNC_SCHEDULE_HOUR", "6"),
            ("SHELFSYNC_SCHEDULE_MINUTE", "30"),
        ])))
        .unwrap();

        assert_eq!(
            config.sync.columns.column_for(FieldKey::ProgressInt),
            Some("#abs_progint")
        );
        assert!(config.sync.schedule.enabled);
        assert_eq!((config.sync.schedule.hour, config.sync.schedule.minute), (6, 30));
    }

    #[test]
    fn missing_key_fails_validation() {
        let config = Config::from_lookup(lookup(&[
            ("SHELFSYNC_LIBRARY_ID", "lib_main"),
            ("SHELFSYNC_LIBRARY_FILE", "library.json"),
        ]))
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let result = Config::from_lookup(lookup(&with(&[("SHELFSYNC_SCHEDULE_HOUR", "four")])));
        assert!(result.is_err());

        let config =
            Config::from_lookup(lookup(&with(&[("SHELFSYNC_SCHEDULE_HOUR", "25")]))).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn link_mode_needs_book() {
        assert!(Config::from_lookup(lookup(&with(&[("SHELFSYNC_MODE", "link")]))).is_err());

        let config = Config::from_lookup(lookup(&with(&[
            ("SHELFSYNC_MODE", "link"),
            ("SHELFSYNC_BOOK", "7"),
            ("SHELFSYNC_REMOTE_ID", "li_1"),
        ])))
        .unwrap();
        assert_eq!(
            config.mode,
            Mode::Link(BookId(7), MatchSelection::Link("li_1".to_string()))
        );

        let config = Config::from_lookup(lookup(&with(&[
            ("SHELFSYNC_MODE", "link"),
            ("SHELFSYNC_BOOK", "7"),
        ])))
        .unwrap();
        assert_eq!(config.mode, Mode::Link(BookId(7), MatchSelection::Skip));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Config::from_lookup(lookup(&with(&[("SHELFSYNC_MODE", "dance")]))).is_err());
    }

    #[test]
    fn late_config_errors_keep_exit_code() {
        let err: anyhow::Error = shelfsync_core::Error::config("bad").into();
        assert_eq!(exit_code_for(&err), SyncExitCode::ConfigError);

        let err: anyhow::Error = shelfsync_core::Error::fetch("down").into();
        assert_eq!(exit_code_for(&err), SyncExitCode::RuntimeError);
    }
}
