use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use vidcompress::{
    CompressConfig, Compressor, DemuxSource as _, HandoffPolicy, ProbedSource, Rotation,
    TranscodeJob,
    loopback::{LoopbackBackend, LoopbackCodec, LoopbackOptions, SyntheticMedia},
};

#[derive(Parser, Debug)]
#[command(name = "vidcompress", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full job against the in-memory loopback backend and print the report.
    Simulate(SimulateArgs),
    /// Probe a file (requires `ffprobe` on PATH) and print the planned output parameters.
    Plan(PlanArgs),
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Number of synthetic samples in the video track.
    #[arg(long, default_value_t = 120)]
    frames: usize,

    #[arg(long, default_value_t = 1920)]
    width: u32,

    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Clockwise rotation of the source track in degrees.
    #[arg(long, default_value_t = 0)]
    rotation: i32,

    /// Timestamp step between samples, in microseconds.
    #[arg(long, default_value_t = 16_667)]
    step_us: i64,

    /// Number of encoder input claims that find no free slot before slots are handed out.
    #[arg(long, default_value_t = 0)]
    encoder_stall: usize,

    /// Overrides the hand-off policy from the config.
    #[arg(long, value_enum)]
    handoff: Option<HandoffChoice>,

    /// Name of the (virtual) input file; the output path is derived from it.
    #[arg(long = "in", default_value = "synthetic.mp4")]
    in_path: PathBuf,

    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Input media file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HandoffChoice {
    Retain,
    Drop,
}

impl From<HandoffChoice> for HandoffPolicy {
    fn from(value: HandoffChoice) -> Self {
        match value {
            HandoffChoice::Retain => Self::Retain,
            HandoffChoice::Drop => Self::Drop,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Simulate(args) => cmd_simulate(args),
        Command::Plan(args) => cmd_plan(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CompressConfig> {
    match path {
        Some(path) => CompressConfig::from_json_path(path)
            .with_context(|| format!("load config '{}'", path.display())),
        None => Ok(CompressConfig::default()),
    }
}

fn cmd_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(handoff) = args.handoff {
        config.handoff = handoff.into();
    }

    let mut media = SyntheticMedia::clip(args.frames, args.width, args.height, args.step_us);
    let rotation = Rotation::from_degrees(args.rotation).context("invalid --rotation")?;
    if let Some(format) = media.video_format_mut() {
        format.rotation = Some(rotation);
    }

    let mut backend = LoopbackBackend::new(media);
    backend.encoder.input_stall = args.encoder_stall;

    let compressor = Compressor::new(config).context("invalid config")?;
    let report = compressor
        .compress(&backend, &args.in_path)
        .with_context(|| format!("simulate '{}'", args.in_path.display()))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!(
        "wrote {} samples to {}",
        report.stats.samples_written,
        report.output.display()
    );
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let job = TranscodeJob::for_input(&args.in_path, &config.output_suffix)?;

    let mut source = ProbedSource::open(&args.in_path)
        .with_context(|| format!("probe '{}'", args.in_path.display()))?;
    let track = vidcompress::select_video_track(&mut source)?;
    source.release()?;

    // Capabilities of a generic software encoder: the planner falls back to flexible YUV.
    let encoder = LoopbackCodec::new(
        "planner",
        LoopbackOptions {
            color_formats: None,
            ..LoopbackOptions::default()
        },
    );
    let params = vidcompress::plan_output_params(&track.format, &encoder, &config.encoder)?;
    let encoder_format = vidcompress::encoder_format(&params, &config.encoder);

    let out = serde_json::json!({
        "input": job.input,
        "output": job.output,
        "track": track.index,
        "source_format": track.format,
        "params": params,
        "encoder_format": encoder_format,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
