use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use smilehub_contracts::catalog::ClinicCatalog;
use smilehub_contracts::events::{new_session_id, EventWriter};
use smilehub_contracts::media::{
    encode_image_file, write_collage_halves, ImageToken, NormalizeOptions,
};
use smilehub_contracts::specialists::{classify, SpecialistRoster};
use smilehub_engine::{AnalyzerConfig, DentalAnalyzer};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "smilehub", version, about = "SmileHub dental photo analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze a teeth photo and recommend a specialist.
    Analyze(AnalyzeArgs),
    /// Map a free-text specialist category to a roster name.
    Specialist(SpecialistArgs),
    /// Split a stacked before/after collage into two images.
    SplitCollage(SplitCollageArgs),
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long, conflicts_with = "data_uri")]
    image: Option<PathBuf>,
    #[arg(long)]
    data_uri: Option<String>,
    /// Mirror the image horizontally, as for a front camera capture.
    #[arg(long)]
    mirror: bool,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    roster: Option<PathBuf>,
    /// Skip live model calls and serve a demo result.
    #[arg(long)]
    offline: bool,
    /// Write the decoded "after" image here.
    #[arg(long)]
    after_out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct SpecialistArgs {
    category: String,
    #[arg(long)]
    roster: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct SplitCollageArgs {
    #[arg(long)]
    collage: PathBuf,
    #[arg(long)]
    out_dir: PathBuf,
}

const EXIT_REJECTED: i32 = 2;

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("smilehub error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Specialist(args) => run_specialist(args),
        Command::SplitCollage(args) => run_split_collage(args),
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let config = AnalyzerConfig::from_env().map_err(anyhow::Error::msg)?;
    let analyzer = build_analyzer(&args, config)?;
    let photo = load_photo(&args)?;

    let report = match analyzer.analyze(photo.as_deref()) {
        Ok(report) => report,
        Err(rejection) => {
            eprintln!("{rejection}");
            return Ok(EXIT_REJECTED);
        }
    };

    if let Some(path) = args.after_out.as_deref() {
        let written = write_after_image(&report.result.after_photo_data, path)?;
        eprintln!("After image written to {}", written.display());
    }
    println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    Ok(0)
}

fn build_analyzer(args: &AnalyzeArgs, mut config: AnalyzerConfig) -> Result<DentalAnalyzer> {
    config
        .override_models(args.text_model.as_deref(), args.image_model.as_deref())
        .map_err(anyhow::Error::msg)?;
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }
    if !args.offline && !config.has_credential() {
        tracing::warn!("GEMINI_API_KEY is not set; results will come from demo mode");
    }

    let roster_path = args.roster.as_deref().or(config.roster_path.as_deref());
    let catalog = Arc::new(ClinicCatalog::with_roster_override(roster_path)?);
    let analyzer = if args.offline {
        DentalAnalyzer::offline(catalog)
    } else {
        DentalAnalyzer::from_config(&config, catalog)
    };
    Ok(match args.events.as_ref() {
        Some(path) => analyzer.with_events(EventWriter::new(path, new_session_id())),
        None => analyzer,
    })
}

/// `None` when the caller supplied nothing; the analyzer rejects that.
fn load_photo(args: &AnalyzeArgs) -> Result<Option<String>> {
    if let Some(path) = args.image.as_deref() {
        let options = NormalizeOptions {
            mirror: args.mirror,
            ..NormalizeOptions::default()
        };
        let token = encode_image_file(path, &options)?;
        return Ok(Some(token.to_data_uri()));
    }
    Ok(args.data_uri.clone())
}

fn write_after_image(token: &str, path: &Path) -> Result<PathBuf> {
    let token = ImageToken::parse(token).map_err(anyhow::Error::msg)?;
    let bytes = token.decode_bytes().map_err(anyhow::Error::msg)?;
    let path = if path.extension().is_none() {
        path.with_extension(token.file_extension())
    } else {
        path.to_path_buf()
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn run_specialist(args: SpecialistArgs) -> Result<i32> {
    let roster = match args.roster.as_deref() {
        Some(path) => SpecialistRoster::load(path)?,
        None => SpecialistRoster::builtin(),
    };
    let group = classify(&args.category);
    println!("{}", roster.name_for(group));
    Ok(0)
}

fn run_split_collage(args: SplitCollageArgs) -> Result<i32> {
    let (before, after) = write_collage_halves(&args.collage, &args.out_dir)?;
    println!("Before: {}", before.display());
    println!("After: {}", after.display());
    Ok(0)
}
