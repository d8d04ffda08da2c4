//! Risk Grid CLI
//!
//! Generates a risk grid, audits it, and optionally scores the demo routes
//! between the center and a destination.
//!
//! Usage:
//!   risk-grid --lat 13.0827 --lng 80.2707 --hour 22 \
//!             --to-lat 13.0478 --to-lng 80.2089 \
//!             --output data/grid.json --geojson

use anyhow::Result;
use clap::Parser;
use risk_engine::{
    audit, compare_routes, demo_routes, generate, grid, GridSpec, Waypoint, DEFAULT_CENTER_LAT,
    DEFAULT_CENTER_LNG,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "risk-grid", about = "Generate and audit a SafeRoute risk grid")]
struct Args {
    /// Center latitude
    #[arg(long, default_value_t = DEFAULT_CENTER_LAT, allow_negative_numbers = true)]
    lat: f64,

    /// Center longitude
    #[arg(long, default_value_t = DEFAULT_CENTER_LNG, allow_negative_numbers = true)]
    lng: f64,

    /// Cells per row/column
    #[arg(
        short = 'n',
        long,
        default_value_t = grid::DEFAULT_GRID_SIZE,
        value_parser = clap::value_parser!(u32).range(1..=grid::MAX_GRID_SIZE as i64)
    )]
    grid_size: u32,

    /// Cell width in km
    #[arg(long, default_value_t = grid::DEFAULT_CELL_SIZE_KM)]
    cell_km: f64,

    /// Hour of day (0-23); defaults to the current UTC hour
    #[arg(long)]
    hour: Option<u8>,

    /// Destination latitude for route comparison
    #[arg(long, requires = "to_lng", allow_negative_numbers = true)]
    to_lat: Option<f64>,

    /// Destination longitude for route comparison
    #[arg(long, requires = "to_lat", allow_negative_numbers = true)]
    to_lng: Option<f64>,

    /// Output JSON file
    #[arg(short, long, default_value = "grid.json")]
    output: PathBuf,

    /// Also output GeoJSON
    #[arg(long)]
    geojson: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let hour = args
        .hour
        .unwrap_or_else(|| chrono::Timelike::hour(&chrono::Utc::now()) as u8);
    let spec = GridSpec::new(args.lat, args.lng, hour)
        .with_grid_size(args.grid_size)
        .with_cell_size_km(args.cell_km);

    let grid = generate(spec)?;
    let summary = grid.summary();
    info!(
        "Generated {} cells around ({:.4}, {:.4}) at hour {}",
        summary.total_cells, args.lat, args.lng, hour
    );
    for (label, count) in &summary.label_counts {
        info!("  {:6} {} cells", label, count);
    }
    info!("  mean risk {:.2}", summary.mean_risk);

    let fairness = audit(&grid);
    info!(
        "Fairness: max disparity {:.2} (threshold {:.1}) -> {}",
        fairness.max_disparity,
        fairness.threshold,
        if fairness.passed { "PASS" } else { "FAIL" }
    );

    let comparison = match (args.to_lat, args.to_lng) {
        (Some(to_lat), Some(to_lng)) => {
            let routes = demo_routes(
                Waypoint::new(args.lat, args.lng),
                Waypoint::new(to_lat, to_lng),
                3,
            );
            let comparison = compare_routes(routes, grid.cells())?;
            if let Some(c) = &comparison {
                for scored in &c.routes {
                    info!(
                        "  {:16} | score {:3} | {:>5.1} km | {:3} min",
                        scored.route.name,
                        scored.safety.score,
                        scored.route.distance_km,
                        scored.route.duration_min
                    );
                }
                info!(
                    "Safest route is {} safety points ahead of the fastest for {} extra minutes",
                    c.safety_gain, c.extra_minutes
                );
            }
            comparison
        }
        _ => None,
    };

    info!("Writing output to {:?}", args.output);
    let file = File::create(&args.output)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(
        writer,
        &serde_json::json!({
            "grid": grid,
            "summary": summary,
            "fairness": fairness,
            "comparison": comparison,
        }),
    )?;

    if args.geojson {
        let geojson_path = args.output.with_extension("geojson");
        info!("Writing GeoJSON to {:?}", geojson_path);
        let file = File::create(&geojson_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &grid.to_geojson())?;
    }

    Ok(())
}
