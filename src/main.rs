use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use spotcam::uplink::ImageTransport;
use spotcam::{
    camera_from_config, CaptureDispatcher, EventBus, SpotcamConfig, TriggerOrchestrator,
    VisionUplink,
};

#[derive(Parser, Debug)]
#[command(name = "spotcam")]
#[command(about = "Parking-spot camera daemon with distance-triggered capture")]
#[command(version)]
#[command(long_about = "A parking-spot camera daemon that watches a distance sensor for \
vehicle arrivals and departures, captures still images at those moments plus periodic \
re-verification while the spot is occupied, and posts them to a remote vision endpoint. \
Falls back to fixed-interval capture when no presence sensor is available.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "spotcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start the trigger loops
    #[arg(long, help = "Perform dry run - initialize components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Load configuration before logging so the log section can take effect
    let config = match SpotcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", args.config, e);
            return Err(e.into());
        }
    };

    // Initialize logging (the guard must outlive the runtime for file output)
    let _log_guard = init_logging(&args, &config.log)?;

    info!("Starting Spotcam system v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Validate configuration if requested
    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Invalid configuration is fatal before any loop starts
    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    info!(
        "Spotcam configured - Station: {} | Spot: {}",
        config.device.station_id, config.device.spot_number
    );

    // Wire up the capture pipeline
    let event_bus = EventBus::new(64);
    let camera = camera_from_config(&config.camera).await;
    let transport: Arc<dyn ImageTransport> = Arc::new(
        VisionUplink::new(&config.uplink, &config.device).map_err(|e| {
            error!("Failed to configure vision uplink: {}", e);
            e
        })?,
    );
    let dispatcher = Arc::new(CaptureDispatcher::new(
        Arc::clone(&camera),
        transport,
        event_bus.clone(),
    ));

    // Create and initialize the orchestrator
    let mut orchestrator = TriggerOrchestrator::new(config, dispatcher, camera, event_bus);
    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    // Handle dry run mode
    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    // Start the trigger loops
    orchestrator.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    // Run the main application loop with signal handling
    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Spotcam system exited with code: {}", exit_code);

    // Exit with appropriate code for systemd
    std::process::exit(exit_code);
}

fn init_logging(
    args: &Args,
    log_config: &spotcam::config::LogConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // CLI flags override the configured level
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        log_config.level.as_str()
    };

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("spotcam={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // Optional log file alongside stderr output
    let (file_layer, guard) = match &log_config.file {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "spotcam.log".to_string());
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    let default_config = SpotcamConfig::default();
    println!("# Spotcam Configuration File");
    println!("# This is the default configuration with all available options");
    println!();
    println!("{}", toml::to_string_pretty(&default_config)?);
    Ok(())
}
