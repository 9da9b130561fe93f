use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use glam::DVec3;

use tile_stream::profiler::{log_stream_stats, TickProf};
use tile_stream::streaming::StreamEvent;
use tile_stream::world::WorldGen;
use tile_stream::{EngineConfig, StreamingEngine};

#[derive(Parser, Debug)]
#[command(name = "tile-stream", about = "Headless fly-through over streamed terrain tiles")]
struct Args {
    /// TOML config; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 600)]
    ticks: u64,
    /// Simulated tick length.
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,
    /// Fly speed along +x, world units per second.
    #[arg(long, default_value_t = 40.0)]
    speed: f64,
    /// Switch the anchor to freeflight at this tick.
    #[arg(long)]
    freeflight_at: Option<u64>,
    /// Overrides `schedule.worker_threads`; 0 builds on the main thread.
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, default_value_t = 1337)]
    seed: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(n) = args.workers {
        config.schedule.worker_threads = n;
    }

    let mut engine = StreamingEngine::builder(config)
        .height_sampler(Arc::new(WorldGen::new(args.seed)))
        .build()
        .context("building streaming engine")?;

    let mut prof = TickProf::new(Duration::from_secs(1));
    let dt = Duration::from_millis(args.tick_ms);
    let start = Instant::now();

    for tick in 0..args.ticks {
        let now = start + dt.mul_f64(tick as f64);
        let x = args.speed * dt.as_secs_f64() * tick as f64;
        let y = engine.height_at(x, 0.0) + 2.0;
        let pos = DVec3::new(x, y, 0.0);

        if args.freeflight_at == Some(tick) {
            engine.activate_freeflight(pos);
        }

        let t0 = Instant::now();
        engine.tick(pos, now);
        prof.stream(TickProf::mark_ms(t0));

        let t1 = Instant::now();
        let events = engine.take_terrain_events();
        let ready = events.iter().filter(|e| matches!(e, StreamEvent::TileReady { .. })).count();
        prof.add_tile_events(ready, events.len() - ready);
        prof.add_prop_ready(engine.take_prop_events().len());
        prof.events(TickProf::mark_ms(t1));

        if prof.end_tick(TickProf::mark_ms(t0)) {
            log_stream_stats("terrain", &engine.terrain_stats());
            if let Some(s) = engine.prop_stats() {
                log_stream_stats("props", &s);
            }
        }
    }

    log_stream_stats("terrain", &engine.terrain_stats());
    Ok(())
}
