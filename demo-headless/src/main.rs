use clap::Parser;
use fire_spread_core::{
    ChannelSink, EventPayload, ManagerConfig, Meters, Scenario, Seconds, SimulationManager,
    SimulationStatus,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Run one fire spread scenario through the simulation manager
#[derive(Parser, Debug)]
#[command(name = "fire-spread-demo")]
#[command(about = "Headless wildfire spread simulation", long_about = None)]
struct Args {
    /// Vegetation class (forest, grassland, shrubland, agricultural, urban)
    #[arg(short = 'v', long, default_value = "grassland")]
    vegetation: String,

    /// Wind speed in m/s
    #[arg(short, long, default_value_t = 8.0)]
    wind_speed: f64,

    /// Direction the wind blows from, degrees clockwise from north
    #[arg(long, default_value_t = 270.0)]
    wind_direction: f64,

    /// Relative humidity in %
    #[arg(long, default_value_t = 25.0)]
    humidity: f64,

    /// Air temperature in °C
    #[arg(short, long, default_value_t = 30.0)]
    temperature: f64,

    /// Terrain slope in %
    #[arg(long, default_value_t = 0.0)]
    slope: f64,

    /// Direction the terrain rises toward, degrees clockwise from north
    #[arg(long, default_value_t = 0.0)]
    upslope_direction: f64,

    /// Ignition latitude
    #[arg(long, default_value_t = -31.95, allow_hyphen_values = true)]
    latitude: f64,

    /// Ignition longitude
    #[arg(long, default_value_t = 115.86, allow_hyphen_values = true)]
    longitude: f64,

    /// Simulated seconds per step
    #[arg(long, default_value_t = 60.0)]
    time_step: f64,

    /// Simulated duration in seconds
    #[arg(short, long, default_value_t = 3600.0)]
    duration: f64,

    /// Stop once this many cells have caught fire (0 for no limit)
    #[arg(long, default_value_t = 1000)]
    max_fire_cells: usize,

    /// Wall-clock milliseconds between steps
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,

    /// Grid cell size in meters
    #[arg(long, default_value_t = 10.0)]
    resolution: f64,

    /// Grid padding around the ignition in meters
    #[arg(long, default_value_t = 1000.0)]
    padding: f64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(status) if status == SimulationStatus::Completed => ExitCode::SUCCESS,
        Ok(status) => {
            error!("Simulation ended {}", status);
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> fire_spread_core::Result<SimulationStatus> {
    let mut config = ManagerConfig {
        max_simulations: 1,
        max_concurrent: 1,
        step_interval: Duration::from_millis(args.interval_ms.max(1)),
        time_step: Seconds::new(args.time_step),
        max_simulated_time: Some(Seconds::new(args.duration)),
        max_fire_cells: (args.max_fire_cells > 0).then_some(args.max_fire_cells),
        ..ManagerConfig::default()
    };
    config.grid.resolution = Meters::new(args.resolution);
    config.grid.padding = Meters::new(args.padding);

    let (sink, stream) = ChannelSink::new(256);
    let manager = SimulationManager::new(config, Arc::new(sink))?;

    let scenario = Scenario {
        temperature: args.temperature,
        ..Scenario::uniform(&args.vegetation, args.wind_speed, args.wind_direction, args.humidity)
    }
    .with_slope(args.slope, args.upslope_direction)
    .with_ignition(args.latitude, args.longitude, 0.0)
    .with_id("demo");

    let id = manager.create(&scenario)?;
    let snapshot = manager.get(&id)?;
    info!(
        "Grid {}x{} at {} around ({:.4}, {:.4})",
        snapshot.rows, snapshot.cols, snapshot.resolution, snapshot.origin.latitude, snapshot.origin.longitude
    );
    manager.start(&id)?;

    println!("=== Fire Spread Demo ===\n");
    println!("Time(s) | Step | Changed | Burning | Burned | Area(ha)");
    println!("--------|------|---------|---------|--------|---------");

    let status = loop {
        let Some(event) = stream.recv_timeout(Duration::from_secs(5)) else {
            let status = manager.status(&id)?;
            if status.is_terminal() {
                break status;
            }
            continue;
        };
        match event.payload {
            EventPayload::StepDelta(delta) if !delta.is_empty() => {
                let burn = manager.get(&id)?.summary.burn;
                println!(
                    "{:7.0} | {:4} | {:7} | {:7} | {:6} | {:8.2}",
                    *delta.time,
                    delta.step,
                    delta.changes.len(),
                    burn.burning_cells,
                    burn.burned_cells,
                    burn.burned_area / 10_000.0
                );
            }
            EventPayload::StepDelta(_) => {}
            EventPayload::StatusChanged(change) => {
                println!("-- {} -> {}", change.from, change.to);
                if change.to.is_terminal() {
                    break change.to;
                }
            }
            EventPayload::Warning(warning) => println!("-- warning: {}", warning),
            EventPayload::Error(err) => println!("-- error: {}", err),
        }
    };

    let summary = manager.get(&id)?.summary;
    println!("\n=== Simulation {} ===", summary.status);
    println!("Simulated time: {}", summary.simulated_time);
    println!("Steps: {}", summary.step);
    println!("Burned area: {:.2} ha", summary.burn.burned_area / 10_000.0);
    println!("Perimeter cells: {}", summary.burn.perimeter_cells);
    if let Some(head) = summary.burn.head_fire {
        println!(
            "Head fire: {} toward {} ({}), intensity {}, flame length {}",
            head.spread_rate, head.direction, head.vegetation, head.fireline_intensity, head.flame_length
        );
    }

    manager.shutdown();
    Ok(status)
}
