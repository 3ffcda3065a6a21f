//! # Spatial Player
//!
//! Headless volumetric video playback using spatial-core.

use anyhow::{Context, Result};
use serde::Serialize;
use spatial_core::{
    DecoderStats, ModelTransform, PlaybackState, PlayerConfig, SpatialDecoder, SpatialPlayer,
    VolumeSink, VoxelFrame,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use spatial_core::clock::FrameTimer;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("spatial=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run_headless(&args)
}

// ============================================================================
// Options
// ============================================================================

struct HeadlessOptions {
    input: PathBuf,
    ticks: u64,
    tick_hz: f64,
    config: Option<PathBuf>,
    realtime: bool,
    info_only: bool,
    json: bool,
}

fn parse_headless_args(args: &[String]) -> Result<HeadlessOptions> {
    let mut input: Option<PathBuf> = None;
    let mut ticks: u64 = 300;
    let mut tick_hz: f64 = 60.0;
    let mut config: Option<PathBuf> = None;
    let mut realtime = false;
    let mut info_only = false;
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" | "-i" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --input"))?;
                input = Some(PathBuf::from(value));
                i += 2;
            }
            "--ticks" | "-n" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --ticks"))?;
                ticks = value
                    .parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("Invalid tick count {}: {}", value, e))?;
                i += 2;
            }
            "--tick-hz" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --tick-hz"))?;
                tick_hz = value
                    .parse::<f64>()
                    .map_err(|e| anyhow::anyhow!("Invalid tick rate {}: {}", value, e))?;
                if !(tick_hz > 0.0) {
                    return Err(anyhow::anyhow!("Tick rate must be positive, got {}", tick_hz));
                }
                i += 2;
            }
            "--config" | "-c" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --config"))?;
                config = Some(PathBuf::from(value));
                i += 2;
            }
            "--realtime" => {
                realtime = true;
                i += 1;
            }
            "--info" => {
                info_only = true;
                i += 1;
            }
            "--json" => {
                json = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_headless_usage();
                std::process::exit(0);
            }
            other => {
                tracing::warn!("Ignoring unknown argument {:?}", other);
                i += 1;
            }
        }
    }

    let input = input.ok_or_else(|| {
        print_headless_usage();
        anyhow::anyhow!("Missing required --input")
    })?;

    Ok(HeadlessOptions {
        input,
        ticks,
        tick_hz,
        config,
        realtime,
        info_only,
        json,
    })
}

fn print_headless_usage() {
    eprintln!(
        "\nUsage:\n  spatial --input <asset.json> [--ticks <n>] [--tick-hz <hz>] \
         [--config <file>] [--realtime] [--info] [--json]\n"
    );
}

// ============================================================================
// Sink
// ============================================================================

/// Stands in for a renderer: records what would have been uploaded
#[derive(Default)]
struct StatsSink {
    uploads: u64,
    bytes: u64,
    last_index: Option<u32>,
}

impl VolumeSink for StatsSink {
    fn upload(&mut self, index: u32, frame: &VoxelFrame, transform: &ModelTransform) {
        let bytes = frame.map_bytes().len() + frame.brick_bytes().len();
        tracing::debug!(
            "upload frame {}: {} bricks, {} bytes, scale {:?}",
            index,
            frame.brick_count(),
            bytes,
            transform.scale
        );
        self.uploads += 1;
        self.bytes += bytes as u64;
        self.last_index = Some(index);
    }

    fn clear(&mut self) {
        self.last_index = None;
    }
}

// ============================================================================
// Playback
// ============================================================================

#[derive(Serialize)]
struct HeadlessSummary {
    ticks: u64,
    frames_shown: u64,
    bytes_uploaded: u64,
    last_frame: Option<u32>,
    progress: f32,
    wall_ms: u64,
    frames_decoded: u64,
    extra_frames_decoded: u64,
    cache_hits: u64,
    frames_evicted: u64,
    last_decode_ms: f64,
}

impl HeadlessSummary {
    fn new(ticks: u64, sink: &StatsSink, progress: f32, wall: Duration, stats: &DecoderStats) -> Self {
        Self {
            ticks,
            frames_shown: sink.uploads,
            bytes_uploaded: sink.bytes,
            last_frame: sink.last_index,
            progress,
            wall_ms: wall.as_millis() as u64,
            frames_decoded: stats.frames_decoded,
            extra_frames_decoded: stats.extra_frames_decoded,
            cache_hits: stats.cache_hits,
            frames_evicted: stats.frames_evicted,
            last_decode_ms: stats.last_decode_ms,
        }
    }
}

fn run_headless(args: &[String]) -> Result<()> {
    let options = parse_headless_args(args)?;

    let config = match &options.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => PlayerConfig::default(),
    };

    let decoder = SpatialDecoder::open(&options.input)
        .with_context(|| format!("Failed to open {:?}", options.input))?;

    if options.info_only {
        println!("{}", serde_json::to_string_pretty(&decoder.metadata())?);
        return Ok(());
    }

    tracing::info!(
        "Headless playback starting: input={:?}, ticks={}, tick_hz={}, realtime={}",
        options.input,
        options.ticks,
        options.tick_hz,
        options.realtime
    );

    let mut player = SpatialPlayer::new(decoder, StatsSink::default(), config);
    let mut timer = FrameTimer::new(options.tick_hz);
    let step = timer.interval();
    let started = Instant::now();

    for _ in 0..options.ticks {
        let dt = if options.realtime { timer.wait() } else { step };
        player.tick(dt);

        if !options.realtime {
            // simulated time: let each decode land before time moves on
            while *player.state() == PlaybackState::Decoding {
                std::thread::sleep(Duration::from_millis(1));
                player.tick(Duration::ZERO);
            }
        }

        if let PlaybackState::Failed(reason) = player.state() {
            return Err(anyhow::anyhow!("Playback failed: {}", reason));
        }
    }

    let summary = HeadlessSummary::new(
        options.ticks,
        player.sink(),
        player.progress(),
        started.elapsed(),
        &player.decoder().stats(),
    );

    tracing::info!(
        "Headless playback complete: shown={}, decoded={} (+{} extra), evicted={}, wall_ms={}",
        summary.frames_shown,
        summary.frames_decoded,
        summary.extra_frames_decoded,
        summary.frames_evicted,
        summary.wall_ms
    );

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}
