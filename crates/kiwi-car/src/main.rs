//! Kiwi Car - Main Entry Point

use std::process::ExitCode;

use anyhow::Context;
use kiwi_bus::LocalBus;
use kiwi_car::{
    init_logging, usage, AppConfig, CliArgs, CliError, DirectionChooser, DirectionMode,
    IntersectionRuntime,
};
use maneuver::DirectionController;
use tokio::io::{AsyncRead, BufReader};
use tracing::{error, info};
use vision::DetectionStream;

#[tokio::main]
async fn main() -> ExitCode {
    let mut argv = std::env::args();
    let program = argv.next().unwrap_or_else(|| "kiwi-car".to_string());

    let args = match CliArgs::parse(argv) {
        Ok(args) => args,
        Err(CliError::HelpRequested) => {
            println!("{}", usage(&program));
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{}\n\n{}", e, usage(&program));
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(args.verbose, args.json_logs) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    info!("=== Kiwi Car v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        cid = args.cid,
        name = %args.name,
        width = args.width,
        height = args.height,
        "Starting intersection program"
    );

    let config = AppConfig::load(&args).context("Failed to load configuration")?;
    let bus = LocalBus::new(config.bus.capacity);

    let controller = DirectionController::new(bus.clone(), config.maneuver.clone())
        .context("Invalid maneuver configuration")?;
    let controller_task = tokio::spawn(controller.run(bus.subscribe()));

    // With detections on stdin the operator answers on the terminal
    let prompt_input: Box<dyn AsyncRead + Unpin + Send> = if args.direction != DirectionMode::Prompt {
        Box::new(tokio::io::empty())
    } else if args.prompt_reads_terminal() {
        Box::new(
            tokio::fs::File::open("/dev/tty")
                .await
                .context("Failed to open terminal for direction input")?,
        )
    } else {
        Box::new(tokio::io::stdin())
    };
    let chooser = DirectionChooser::new(
        bus.clone(),
        args.direction,
        BufReader::new(prompt_input),
        tokio::io::stdout(),
    );
    let chooser_task = tokio::spawn(chooser.run(bus.subscribe()));

    let runtime =
        IntersectionRuntime::new(bus.clone(), &config).context("Invalid intersection configuration")?;
    let stream = DetectionStream::open(&args.detections)
        .await
        .with_context(|| format!("Failed to open detections '{}'", args.detections))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let summary = runtime.run(stream, shutdown).await;

    chooser_task.abort();
    controller_task.abort();

    let summary = summary?;
    info!(
        safe_to_go_sent = summary.safe_to_go_sent,
        departures = summary.departures,
        "Done"
    );
    Ok(())
}
