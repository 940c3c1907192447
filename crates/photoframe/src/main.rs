//! usb-photoframe
//!
//! Drives a USB picture frame: switches it into display mode, then cycles
//! the configured screens on it until interrupted.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::{DiagnosticSink, TracingSink, setup_logging};
use photoframe::config::FrameConfig;
use photoframe::render::{self, RenderSettings, ScreenRenderer};
use photoframe::scheduler::{Scheduler, Transport};
use photoframe::usb::{FrameBridge, create_frame_bridge, spawn_frame_worker};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "usb-photoframe")]
#[command(author, version, about = "Slideshow driver for USB picture frames")]
#[command(long_about = "
Switches a USB picture frame from mass-storage mode into display mode and
keeps pushing the configured screens to it. The frame may be unplugged and
replugged at any time.

EXAMPLES:
    # Run the slideshow with default config
    usb-photoframe

    # Run with custom config
    usb-photoframe --config /path/to/config.toml

    # Check for an attached frame and exit
    usb-photoframe --probe

    # Show a single picture and exit
    usb-photoframe --show ~/Pictures/cat.png

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usb-photoframe/config.toml
    3. /etc/usb-photoframe/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Look for a frame, report its mode and exit
    #[arg(long)]
    probe: bool,

    /// Display a single image file and exit
    #[arg(long, value_name = "FILE", conflicts_with = "probe")]
    show: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = FrameConfig::default();
        let path = FrameConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        FrameConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        FrameConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.frame.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-photoframe v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let sink: Arc<dyn DiagnosticSink> = Arc::new(TracingSink);
    let (bridge, worker) = create_frame_bridge();
    let worker_handle = spawn_frame_worker(worker, config.frame.worker_settings(), sink.clone())
        .context("Failed to spawn USB worker thread")?;

    let result = if args.probe {
        probe_mode(&bridge).await
    } else if let Some(path) = args.show.clone() {
        show_mode(&bridge, path, RenderSettings::from_config(&config)).await
    } else {
        run_slideshow(&config, bridge.clone(), sink).await
    };

    info!("Shutting down USB subsystem...");
    if let Err(e) = bridge.shutdown().await {
        error!("Error shutting down USB worker: {:#}", e);
    }

    match worker_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("USB worker failed: {}", e),
        Err(e) => error!("USB worker thread panicked: {:?}", e),
    }

    result
}

/// Run discovery once and print the resulting mode
async fn probe_mode(bridge: &FrameBridge) -> Result<()> {
    let mode = bridge
        .check_devices()
        .await
        .context("Failed to query USB worker")?;

    println!("Picture frame mode: {}", mode);
    Ok(())
}

/// Render a single file and push it to the frame
async fn show_mode(bridge: &FrameBridge, path: PathBuf, settings: RenderSettings) -> Result<()> {
    let image = render::render_file(path.clone(), settings)
        .await
        .with_context(|| format!("Failed to render {}", path.display()))?;

    bridge
        .check_devices()
        .await
        .context("Failed to query USB worker")?;

    if bridge.display(image).await {
        println!("Displayed {}", path.display());
        Ok(())
    } else {
        Err(anyhow!("Failed to display {}", path.display()))
    }
}

/// Cycle the configured screens until Ctrl+C
async fn run_slideshow(
    config: &FrameConfig,
    bridge: FrameBridge,
    sink: Arc<dyn DiagnosticSink>,
) -> Result<()> {
    let renderer = ScreenRenderer::new(config.screens.clone(), RenderSettings::from_config(config));
    let scheduler = Scheduler::new(
        bridge.clone(),
        renderer,
        config.slides(),
        config.scheduler.timing(),
        sink,
    );

    tokio::select! {
        _ = scheduler.run() => {}
        _ = log_status_changes(bridge) => {
            warn!("USB worker stopped, ending slideshow");
        }
        result = signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, stopping slideshow");
        }
    }

    Ok(())
}

/// Log frame arrivals and departures until the USB worker goes away
async fn log_status_changes(mut bridge: FrameBridge) {
    while let Ok(status) = bridge.status_changed().await {
        if status.is_available() {
            info!("Picture frame ready");
        } else {
            info!("Picture frame not available (mode: {})", status.mode);
        }
    }
}
