//! CLI tool to compute a coverage flight plan.
//!
//! Reads a JSON coverage request and writes the selected plan as
//! `Lon,Lat,Z,Time` CSV, or the full plan as JSON.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gcs_core::coverage::{plan_coverage, CoverageRequest};

/// Compute a lawnmower coverage plan for a survey polygon
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON coverage request
    #[arg(long)]
    request: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Emit the whole plan (lanes, candidates, waypoints) as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let text = std::fs::read_to_string(&args.request)
        .with_context(|| format!("reading {}", args.request.display()))?;
    let request: CoverageRequest = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.request.display()))?;
    let plan = plan_coverage(&request)?;

    eprintln!(
        "EPSG:{}  lanes: {}  exposures: {}  turn time: {:.1}s  order: {:?}",
        plan.frame.code(),
        plan.lanes.len(),
        plan.waypoints.len(),
        plan.turn_time_s,
        plan.selected
    );
    if plan.is_empty() {
        eprintln!("Area too small for the exposure interval; plan is empty");
    }

    let body = if args.json {
        serde_json::to_string_pretty(&plan)?
    } else {
        plan.trajectory_csv()
    };
    match args.output {
        Some(path) => std::fs::write(&path, body)
            .with_context(|| format!("writing {}", path.display()))?,
        None => print!("{body}"),
    }
    Ok(())
}
