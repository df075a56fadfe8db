use std::{fs::File, path::PathBuf, process};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio_util::sync::CancellationToken;
use url::Url;

use amplink::{
    cache::MediaCache,
    config::Config,
    dispatcher::MediaPipeline,
    error::Result,
    http,
    identity::DeviceId,
    player::{Platform, Player},
    remote::Controller,
    session::WebSocketDialer,
    signal::Signals,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Log file name that sends log output to stderr instead.
const LOG_TO_STDERR: &str = "-";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// TOML file with the endpoint, file locations and device profile. Any
    /// setting not in the file keeps its default.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "AMPLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Control server websocket URL
    ///
    /// [default: wss://cd.api.yingzhu.net/screen.io]
    #[arg(short, long, value_hint = ValueHint::Url, env = "AMPLINK_ENDPOINT")]
    endpoint: Option<String>,

    /// File holding the device identity
    ///
    /// Created on first start. Keep it across updates: the control server
    /// knows this device by the identity inside.
    ///
    /// [default: cache.txt]
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "AMPLINK_IDENTITY_FILE")]
    identity_file: Option<PathBuf>,

    /// Directory for downloaded media
    ///
    /// Wiped at every start.
    ///
    /// [default: audio_cache]
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath, env = "AMPLINK_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Audio player program
    ///
    /// Invoked as `<PROGRAM> <FILE>` instead of the platform default.
    #[arg(short, long, value_name = "PROGRAM", value_hint = ValueHint::CommandName, env = "AMPLINK_PLAYER")]
    player: Option<PathBuf>,

    /// Log file, truncated at startup
    ///
    /// Use `-` to log to stderr.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value = "amplink.log", env = "AMPLINK_LOG_FILE")]
    log_file: String,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING, env = "AMPLINK_QUIET")]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Errors
///
/// Fails when the log file cannot be created.
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(args: &Args) -> Result<()> {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("amplink", level);
    }

    if args.log_file != LOG_TO_STDERR {
        let file = File::create(&args.log_file)?;
        logger
            .target(env_logger::Target::Pipe(Box::new(file)))
            .write_style(env_logger::WriteStyle::Never);
    }

    logger.init();
    Ok(())
}

/// Loads the configuration file, if any, and applies command line overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let config = Config::from_file(path)?;
            info!("configuration loaded from {}", path.display());
            config
        }
        None => Config::default(),
    };

    if let Some(endpoint) = &args.endpoint {
        config.endpoint = Url::parse(endpoint)?;
    }
    if let Some(identity_file) = &args.identity_file {
        config.identity_file.clone_from(identity_file);
    }
    if let Some(cache_dir) = &args.cache_dir {
        config.cache_dir.clone_from(cache_dir);
    }
    if args.player.is_some() {
        config.player.clone_from(&args.player);
    }

    Ok(config)
}

/// Main application loop.
///
/// Prepares the device identity, media cache and player, then runs sessions
/// until a shutdown signal arrives.
///
/// # Errors
///
/// Fails when the configuration is invalid or the device identity cannot be
/// loaded or created.
async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    let device_id = DeviceId::load_or_create(&config.identity_file)?;

    let http_client = http::Client::new(&config)?;
    let cache = MediaCache::new(&config.cache_dir, http_client);
    if let Err(e) = cache.clear().await {
        warn!("could not clear media cache: {e}");
    }

    let player = Player::new(Platform::current(), config.player.clone());
    player.probe().await;

    let dialer = WebSocketDialer::new(config.timing.connect_timeout);
    let pipeline = MediaPipeline::new(cache, player);
    let mut controller = Controller::new(&config, device_id, dialer, pipeline);

    let mut signals = Signals::register()?;
    let shutdown = CancellationToken::new();

    println!("amplink running; connecting to {}", config.endpoint);

    let session_loop = controller.run(shutdown.clone());
    tokio::pin!(session_loop);

    tokio::select! {
        () = &mut session_loop => {}
        signal = signals.recv() => {
            info!("received {signal}, shutting down gracefully");
            shutdown.cancel();
            session_loop.await;
        }
    }

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    if let Err(e) = init_logger(&args) {
        eprintln!("could not open log file {}: {e}", args.log_file);
        process::exit(1);
    }

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
