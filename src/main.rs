use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use dancemetrics::{
    run_session, AnalysisSession, DancemetricsConfig, DiscardWriter, EventBus,
    ImageSequenceWriter, KeypointTrace, SyntheticFrameSource, TraceDetector,
};

#[derive(Parser, Debug)]
#[command(name = "dancemetrics")]
#[command(about = "Dance movement analysis pipeline with pose metrics and annotated output")]
#[command(version)]
#[command(long_about = "Analyzes dance movement from recorded pose keypoint traces: computes \
joint angles and posture metrics per frame, tracks movement stability across the session, and \
renders an annotated frame sequence alongside a JSON analysis report.")]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "dancemetrics.toml",
        help = "Path to TOML configuration file"
    )]
    config: String,

    /// Keypoint trace to analyze
    #[arg(short, long, help = "Path to a JSON keypoint trace recorded from the pose detector")]
    trace: Option<String>,

    /// Override the output directory from the configuration
    #[arg(short, long, help = "Directory for annotated frames and the session report")]
    output: Option<String>,

    /// Skip writing annotated frames, produce only the report
    #[arg(long, help = "Analyze without writing annotated output frames")]
    report_only: bool,

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
    #[arg(long, help = "Validate configuration file and exit without analyzing anything")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

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

    // Initialize logging
    init_logging(&args)?;

    info!("Starting dancemetrics v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Load and validate configuration
    let mut config = match DancemetricsConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

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

    if let Some(output) = &args.output {
        config.output.path = output.clone();
    }
    if args.report_only {
        config.pipeline.annotate = false;
    }

    let Some(trace_path) = &args.trace else {
        eprintln!("No keypoint trace given; use --trace <path> (or --print-config / --validate-config)");
        std::process::exit(2);
    };

    // Load the keypoint trace and build the detector handle shared by the session
    let trace = KeypointTrace::load(trace_path)?;
    if trace.is_empty() {
        eprintln!("✗ Keypoint trace '{}' contains no frames", trace_path);
        std::process::exit(1);
    }
    info!(
        "Loaded trace '{}': {} frames at {}x{}",
        trace_path,
        trace.len(),
        trace.width,
        trace.height
    );
    let detector = Arc::new(TraceDetector::new(&trace));

    // Cancellation on ctrl-c, checked between frames
    let token = tokio_util::sync::CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, aborting session between frames");
            signal_token.cancel();
        }
    });

    // Event subscriber logging session progress
    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let mut events = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!("Session event: {}", event.description());
        }
    });

    let session = AnalysisSession::new(&config, detector)?
        .with_event_bus(Arc::clone(&event_bus))
        .with_cancellation(token);
    let session_dir = std::path::Path::new(&config.output.path).join(session.id());

    let source = SyntheticFrameSource::new(trace.width, trace.height, trace.len() as u64);
    let outcome = if args.report_only {
        run_session(session, source, DiscardWriter::new()).await?
    } else {
        run_session(session, source, ImageSequenceWriter::create(&session_dir)?).await?
    };

    let record = match outcome {
        Some(record) => record,
        None => {
            warn!("Session aborted; no output written");
            std::process::exit(130);
        }
    };

    let report_json = record.to_json_pretty()?;
    if config.output.save_report {
        std::fs::create_dir_all(&session_dir)?;
        let report_path = session_dir.join("report.json");
        std::fs::write(&report_path, &report_json)?;
        info!("Report written to {}", report_path.display());
    }
    println!("{}", report_json);

    Ok(())
}

fn print_default_config() -> Result<()> {
    let config = DancemetricsConfig::default();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dancemetrics={}", log_level)));

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

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
