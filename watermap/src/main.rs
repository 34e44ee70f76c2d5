//! watermap CLI: aggregate one or more sample feeds into pixel grids.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use watermap::ingest::load_samples;
use watermap::parallel_pipeline::ParallelPipeline;
use watermap::pipeline::{LandPolicy, PipelineConfig, WaterMask, WatermapPipeline};

#[derive(Parser)]
#[command(name = "watermap")]
#[command(author, version, about = "Spatially smoothed water-quality and bloom-risk grids", long_about = None)]
struct Cli {
    /// Sample feed(s) in `{"entries": [...]}` form
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Global equirectangular water mask image
    #[arg(short, long, default_value = "data/water_mask.png")]
    mask: PathBuf,

    /// Output file for a single input (default data/pixels.json), or output
    /// directory for several (default data/)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Per-level weight falloff of the diffusion
    #[arg(long, default_value_t = 0.5)]
    decay: f64,

    /// Contributions below this weight are dropped
    #[arg(long, default_value_t = 0.01)]
    min_weight: f64,

    /// How land cells treat a spread reaching them
    #[arg(long, value_enum, default_value_t = LandArg::PassThrough)]
    land_policy: LandArg,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LandArg {
    PassThrough,
    Block,
}

impl From<LandArg> for LandPolicy {
    fn from(arg: LandArg) -> Self {
        match arg {
            LandArg::PassThrough => LandPolicy::PassThrough,
            LandArg::Block => LandPolicy::Block,
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

const SINGLE_OUTPUT: &str = "data/pixels.json";
const BATCH_OUTPUT_DIR: &str = "data";

/// Where the export for `input` goes: the `--output` file for a single input,
/// `<dir>/<stem>_pixels.json` when there are several.
fn output_path(output: Option<&Path>, inputs: usize, input: &Path) -> PathBuf {
    if inputs == 1 {
        return output.map_or_else(|| PathBuf::from(SINGLE_OUTPUT), Path::to_path_buf);
    }
    batch_output_path(output.unwrap_or(Path::new(BATCH_OUTPUT_DIR)), input)
}

/// `<dir>/<stem>_pixels.json` for multi-input runs.
fn batch_output_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("samples");
    dir.join(format!("{stem}_pixels.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mask = WaterMask::load(&cli.mask).context("water mask is required for any run")?;
    let config = PipelineConfig {
        decay: cli.decay,
        min_weight: cli.min_weight,
        land_policy: cli.land_policy.into(),
    };
    let pipeline = WatermapPipeline::new(Arc::new(mask), config)?;

    if let [input] = cli.inputs.as_slice() {
        let samples = load_samples(input).with_context(|| format!("reading {}", input.display()))?;
        let document = pipeline.run(&samples)?;
        let path = output_path(cli.output.as_deref(), 1, input);
        document.write_to(&path)?;
        info!(pixels = document.pixel_count, output = %path.display(), "done");
        return Ok(());
    }

    let mut batches = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        batches.push(load_samples(input).with_context(|| format!("reading {}", input.display()))?);
    }

    let parallel = ParallelPipeline::new(pipeline);
    info!(inputs = batches.len(), workers = parallel.worker_count(), "running batches");
    let results = parallel.run_batches(batches).await;

    for (input, result) in cli.inputs.iter().zip(results) {
        let document = result.with_context(|| format!("aggregating {}", input.display()))?;
        let path = output_path(cli.output.as_deref(), cli.inputs.len(), input);
        document.write_to(&path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_outputs_are_named_after_inputs() {
        let path = batch_output_path(Path::new("out"), Path::new("feeds/lake_erie_test.json"));
        assert_eq!(path, PathBuf::from("out/lake_erie_test_pixels.json"));
    }

    #[test]
    fn default_outputs_depend_on_input_count() {
        let single = output_path(None, 1, Path::new("feeds/erie.json"));
        assert_eq!(single, PathBuf::from("data/pixels.json"));

        // Several inputs never write into a directory named after the single-run file.
        let batch = output_path(None, 2, Path::new("feeds/erie.json"));
        assert_eq!(batch, PathBuf::from("data/erie_pixels.json"));
    }

    #[test]
    fn explicit_output_is_file_or_directory() {
        let single = output_path(Some(Path::new("out/today.json")), 1, Path::new("erie.json"));
        assert_eq!(single, PathBuf::from("out/today.json"));

        let batch = output_path(Some(Path::new("out")), 3, Path::new("erie.json"));
        assert_eq!(batch, PathBuf::from("out/erie_pixels.json"));
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["watermap", "samples.json"]);
        assert_eq!(cli.decay, 0.5);
        assert_eq!(cli.min_weight, 0.01);
        assert!(matches!(cli.land_policy, LandArg::PassThrough));
        assert_eq!(cli.mask, PathBuf::from("data/water_mask.png"));
        assert!(cli.output.is_none());
    }

    #[test]
    fn cli_land_policy_flag() {
        let cli = Cli::parse_from(["watermap", "a.json", "b.json", "--land-policy", "block", "--decay", "0.8"]);
        assert_eq!(cli.inputs.len(), 2);
        assert_eq!(LandPolicy::from(cli.land_policy), LandPolicy::Block);
        assert_eq!(cli.decay, 0.8);
    }
}
