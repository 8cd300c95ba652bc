//! sim-recorder demo
//!
//! Drives the capture pipeline from a software render target at the
//! configured frame rate until a frame count is reached or Ctrl+C is pressed.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

use sim_recorder::capture::{Pattern, PatternTarget, RenderTargetSource};
use sim_recorder::logging;
use sim_recorder::{CapturePipeline, Config, RenderHook, SessionRequest};

/// Parsed command line
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    frames: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
    name: Option<String>,
    pattern: Pattern,
    write_config: bool,
    help: bool,
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    if args.help {
        print_help();
        return Ok(());
    }

    let guard = logging::init_logging()?;
    info!("sim-recorder starting...");

    let mut config = Config::load(args.config.as_deref())?;
    info!("Configuration loaded from {:?}", config.config_path()?);

    if args.write_config {
        config.save()?;
        info!("Configuration written to {:?}", config.config_path()?);
        return Ok(());
    }

    // Command line overrides
    if args.width.is_some() {
        config.capture.width = args.width;
    }
    if args.height.is_some() {
        config.capture.height = args.height;
    }

    let name = args.name.clone().unwrap_or_else(|| "demo_camera".to_string());
    let target = PatternTarget::new(&name, 640, 480).with_pattern(args.pattern);
    let source = RenderTargetSource::new(target);

    let mut pipeline = CapturePipeline::new(
        config.pipeline_options(),
        source,
        Box::new(config.sink_opener()),
    );

    let request = SessionRequest::now(clock_seconds());
    if let Err(e) = pipeline.on_init(&request) {
        error!("Could not start recording: {}", e);
        drop(pipeline);
        drop(guard);
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    let fps = config.encoder.fps.max(1);
    let frame_interval = Duration::from_secs_f64(1.0 / fps as f64);
    let started = Instant::now();
    let mut frames = 0u64;

    info!(
        "Recording {} at {} fps (Ctrl+C to stop)",
        args.frames
            .map(|n| format!("{} frames", n))
            .unwrap_or_else(|| "until interrupted".to_string()),
        fps
    );

    while running.load(Ordering::SeqCst) {
        if args.frames.is_some_and(|max| frames >= max) {
            break;
        }

        let tick = Instant::now();
        pipeline.on_frame();
        frames += 1;

        if let Some(remaining) = frame_interval.checked_sub(tick.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    if !running.load(Ordering::SeqCst) {
        info!("Interrupted, stopping");
    }

    let elapsed = started.elapsed();
    match pipeline.on_teardown() {
        Some(summary) => {
            info!(
                "Recorded {} frames in {:.1}s -> {:?}",
                summary.frames_written,
                elapsed.as_secs_f64(),
                summary.video_path
            );
            if let Some(snapshot) = &summary.snapshot_path {
                info!("Snapshot: {:?}", snapshot);
            }
            if !summary.is_clean() {
                warn!("Session finished with errors: {:?}", summary);
            }
        }
        None => warn!("No session to tear down"),
    }

    info!("sim-recorder shutdown complete");
    Ok(())
}

/// Stand-in for the simulation clock
fn clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .with_context(|| format!("{} requires a value", flag))
        };

        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "-c" | "--config" => parsed.config = Some(PathBuf::from(value(&arg)?)),
            "-n" | "--frames" => {
                let v = value(&arg)?;
                parsed.frames = Some(v.parse().with_context(|| format!("Invalid frame count: {}", v))?);
            }
            "--width" => {
                let v = value(&arg)?;
                parsed.width = Some(v.parse().with_context(|| format!("Invalid width: {}", v))?);
            }
            "--height" => {
                let v = value(&arg)?;
                parsed.height = Some(v.parse().with_context(|| format!("Invalid height: {}", v))?);
            }
            "--name" => parsed.name = Some(value(&arg)?),
            "--pattern" => {
                let v = value(&arg)?;
                parsed.pattern = parse_pattern(&v)?;
            }
            "--write-config" => parsed.write_config = true,
            other => bail!("Unknown argument: {} (see --help)", other),
        }
    }

    Ok(parsed)
}

fn parse_pattern(name: &str) -> Result<Pattern> {
    Ok(match name {
        "bar" => Pattern::MovingBar,
        "gradient" => Pattern::Gradient,
        "checker" => Pattern::Checkerboard { cell: 32 },
        "black" => Pattern::Solid([0, 0, 0, 255]),
        other => bail!("Unknown pattern: {} (bar, gradient, checker, black)", other),
    })
}

fn print_help() {
    println!("sim-recorder - Record a render target to video through ffmpeg");
    println!();
    println!("USAGE:");
    println!("    sim-recorder [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help             Print this help message");
    println!("    -c, --config <PATH>    Config file (default: user config dir)");
    println!("    -n, --frames <N>       Stop after N frames (default: run until Ctrl+C)");
    println!("        --width <W>        Capture width override");
    println!("        --height <H>       Capture height override");
    println!("        --name <ID>        Camera identifier used in file names");
    println!("        --pattern <NAME>   bar, gradient, checker or black");
    println!("        --write-config     Write the effective config file and exit");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                 Set log level (e.g., debug, info, warn)");
    println!("    SIM_RECORDER_LOG_PATH    Override the log directory");
}
