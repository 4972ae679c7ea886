// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]
// Add other lints specific to this module that you want to allow but not auto-fix

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;

use livetl::app_config::{self, Config, ProviderKind, StorageBackend};
use livetl::app_controller::Controller;
use livetl::errors::AppError;

/// CLI Wrapper for ProviderKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliProvider {
    Mymemory,
    Google,
    Mock,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli_provider: CliProvider) -> Self {
        match cli_provider {
            CliProvider::Mymemory => ProviderKind::MyMemory,
            CliProvider::Google => ProviderKind::Google,
            CliProvider::Mock => ProviderKind::Mock,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Show entry count and hit statistics
    Stats,
    /// Remove every stored translation
    Clear,
    /// Remove expired translations
    Cleanup,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scripted document session and print what was rendered
    Replay {
        /// JSON replay script
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
    },

    /// Translate a single text through the cache and rate-limited queue
    Translate {
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Inspect or maintain the persistent translation cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Generate shell completions for livetl
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// livetl - live translation of streaming chat content
///
/// Watches a document for newly appended messages and renders a translation
/// below each one, with caching and provider rate limiting.
#[derive(Parser, Debug)]
#[command(name = "livetl")]
#[command(version)]
#[command(about = "Live translation of streaming chat content")]
#[command(long_about = "livetl detects new messages in a chat region and translates them through a rate-limited provider queue.

EXAMPLES:
    livetl replay session.json                  # Run a scripted session
    livetl -t ja translate \"Good morning\"       # Translate a single text to Japanese
    livetl -p mock replay session.json          # Use the offline mock provider
    livetl cache stats                          # Show cache statistics
    livetl completions bash > livetl.bash       # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the config file doesn't
    exist, a default one will be created automatically.

SUPPORTED PROVIDERS:
    mymemory  - MyMemory public API (default)
    google    - Google translate endpoint
    mock      - Offline provider for testing")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,

    /// Translation provider to use
    #[arg(short, long, value_enum, global = true)]
    provider: Option<CliProvider>,

    /// Source language code, or 'auto'
    #[arg(short, long, global = true)]
    source_language: Option<String>,

    /// Target language code (e.g., 'zh', 'ja', 'en')
    #[arg(short, long, global = true)]
    target_language: Option<String>,

    /// Keep the cache in memory only
    #[arg(long, global = true)]
    no_persist: bool,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let level = record.level();

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {} {}\x1B[0m",
                Self::get_color_for_level(level),
                now,
                Self::get_emoji_for_level(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the effective level is set through set_max_level
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Err(error) = run(cli).await {
        let error = AppError::from(error);
        error!("{}", error);
        std::process::exit(error.exit_code());
    }

    Ok(())
}

/// Execute the selected subcommand
async fn run(cli: CommandLineOptions) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "livetl", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;
    log::set_max_level(config.log_level.to_level_filter());

    let controller = Controller::with_config(config)?;

    match cli.command {
        Commands::Replay { script } => {
            let report = controller.replay_file(&script).await?;
            println!("{}", report);
        }
        Commands::Translate { text } => {
            let translation = controller.translate_text(&text).await?;
            println!("{}", translation);
        }
        Commands::Cache { command } => match command {
            CacheCommand::Stats => println!("{}", controller.cache_stats().await),
            CacheCommand::Clear => controller.clear_cache().await?,
            CacheCommand::Cleanup => {
                let removed = controller.cleanup_cache().await?;
                info!("Removed {} expired translations", removed);
            }
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Load the config file and apply command line overrides
fn load_config(options: &CommandLineOptions) -> Result<Config> {
    let mut config = Config::load_or_create(&options.config_path)?;

    if let Some(provider) = &options.provider {
        config.provider.kind = provider.clone().into();
    }

    if let Some(source_lang) = &options.source_language {
        config.source_language = source_lang.clone();
    }

    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }

    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    if options.no_persist {
        config.storage.backend = StorageBackend::Memory;
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}
