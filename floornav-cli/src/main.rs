use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use floornav_core::calibrate::{PixelTransformer, validate_scale};
use floornav_core::containment::ObstacleOutline;
use floornav_core::export::{export_zones, graph_record, route_record};
use floornav_core::parse;
use floornav_core::pipeline::{
    CancelToken, PipelineConfig, PipelineInput, PipelineOutput, run_pipeline,
};
use floornav_core::route::find_path;
use geo::{Coord, coord};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "floornav-cli", author, version, about, long_about = None)]
struct Cli {
    /// Subcommand/tool to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Path to the calibration record (JSON)
    #[arg(env)]
    calibration: PathBuf,

    /// Path to the anchor table (JSON)
    #[arg(env)]
    anchors: PathBuf,

    /// Path to the pair schedule (tabular text)
    #[arg(env)]
    schedule: PathBuf,

    /// Path to the coverage polygon set (JSON)
    #[arg(env)]
    coverage: PathBuf,

    /// Optional pre-fetched obstacle outlines (JSON object keyed by
    /// coverage uid)
    #[arg(env, long)]
    obstacles: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline and write zone + graph records
    Build {
        #[command(flatten)]
        input: InputArgs,

        /// Where to write the exported zone records
        #[arg(long, default_value = "zones.json")]
        zones_out: PathBuf,

        /// Where to write the navigation graph record
        #[arg(long, default_value = "graph.json")]
        graph_out: PathBuf,

        /// Project uid stamped into exported zone records
        #[arg(long, default_value = "")]
        project_uid: String,

        /// Skip the aisle-extension post-pass
        #[arg(long)]
        no_aisle_extension: bool,
    },
    /// Rebuild the graph and answer one shortest-path query
    Route {
        #[command(flatten)]
        input: InputArgs,

        /// Start point as "x,y" in pixels
        from: String,

        /// End point as "x,y" in pixels
        to: String,
    },
    /// Validate the calibration scale against the anchor table
    CheckScale {
        /// Path to the calibration record (JSON)
        #[arg(env)]
        calibration: PathBuf,

        /// Path to the anchor table (JSON)
        #[arg(env)]
        anchors: PathBuf,
    },
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_input(args: &InputArgs) -> anyhow::Result<PipelineInput> {
    let calibration = parse::parse_calibration(&read_file(&args.calibration)?)
        .context("Invalid calibration record")?;

    let (anchors, anchor_diags) =
        parse::parse_anchors(&read_file(&args.anchors)?).context("Invalid anchor table")?;
    let schedule_text = String::from_utf8(read_file(&args.schedule)?)
        .context("Pair schedule is not valid UTF-8")?;
    let pairs = parse::parse_schedule(&schedule_text).context("Invalid pair schedule")?;
    let (coverage, coverage_diags) =
        parse::parse_coverage(&read_file(&args.coverage)?).context("Invalid coverage set")?;

    for diag in anchor_diags.iter().chain(&coverage_diags) {
        warn!("{diag}");
    }

    let obstacles: BTreeMap<String, Vec<ObstacleOutline>> = match &args.obstacles {
        Some(path) => serde_json::from_slice(&read_file(path)?)
            .context("Invalid obstacle outline file")?,
        None => BTreeMap::new(),
    };

    Ok(PipelineInput {
        calibration,
        anchors,
        pairs,
        coverage,
        obstacles,
    })
}

fn run(input: &PipelineInput, config: &PipelineConfig) -> anyhow::Result<PipelineOutput> {
    let output = run_pipeline(input, config, &CancelToken::new())?;
    for diag in &output.diagnostics {
        warn!("{diag}");
    }
    Ok(output)
}

fn parse_point(raw: &str) -> anyhow::Result<Coord> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| anyhow!("Expected a point as \"x,y\"; got {raw:?}"))?;
    Ok(coord! {
        x: x.trim().parse::<f64>().context("invalid x coordinate")?,
        y: y.trim().parse::<f64>().context("invalid y coordinate")?,
    })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        // Standard logger, configured via the RUST_LOG env variable
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            zones_out,
            graph_out,
            project_uid,
            no_aisle_extension,
        } => {
            let pipeline_input = load_input(&input)?;
            let mut config = PipelineConfig::default();
            if no_aisle_extension {
                config.aisle_extension = None;
            }
            let output = run(&pipeline_input, &config)?;

            let mut all_zones = output.zones.clone();
            all_zones.extend(output.obstacles.iter().cloned());
            let records = export_zones(
                &all_zones,
                &output.transformer,
                &pipeline_input.calibration.sublocation_uid,
                &project_uid,
            );
            write_json(&zones_out, &records)?;
            write_json(&graph_out, &graph_record(&output.graph))?;

            info!(
                zones = records.len(),
                nodes = output.graph.nodes.len(),
                edges = output.graph.edges.len(),
                "wrote {} and {}",
                zones_out.display(),
                graph_out.display()
            );
            Ok(())
        }
        Commands::Route { input, from, to } => {
            let pipeline_input = load_input(&input)?;
            let output = run(&pipeline_input, &PipelineConfig::default())?;
            let result = find_path(
                &output.graph,
                &output.zones,
                &output.obstacles,
                parse_point(&from)?,
                parse_point(&to)?,
            );
            println!("{}", serde_json::to_string_pretty(&route_record(&result))?);
            Ok(())
        }
        Commands::CheckScale {
            calibration,
            anchors,
        } => {
            let record = parse::parse_calibration(&read_file(&calibration)?)
                .context("Invalid calibration record")?;
            let (anchor_map, diags) =
                parse::parse_anchors(&read_file(&anchors)?).context("Invalid anchor table")?;
            for diag in &diags {
                warn!("{diag}");
            }
            let transformer = PixelTransformer::new(&record)?;
            let validation = validate_scale(&transformer, &anchor_map);

            let report = serde_json::json!({
                "valid": validation.valid,
                "suggested_raw_scale": validation.suggested_raw_scale,
                "correction_factor": validation.correction_factor,
                "message": validation.message,
                "samples": validation.samples.iter().map(|s| serde_json::json!({
                    "name": s.name,
                    "mm": { "x": s.mm.x, "y": s.mm.y },
                    "pixel": { "x": s.pixel.x, "y": s.pixel.y },
                    "in_bounds": s.in_bounds,
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
