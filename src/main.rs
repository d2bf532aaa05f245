use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use log::{error, info};
use std::path::PathBuf;
use video_loudness_batch_normalize::{
    AssumeYes, Ffmpeg, NormalizationOptions, RunTally, TerminalPrompt, normalize_folder_loudness,
};

/// Normalizes audio loudness of all video files in a directory and its subdirectories.
///
/// Each file is measured with ffmpeg's loudnorm filter, then normalized in a second
/// pass that copies the video stream and re-encodes audio to FLAC. A `.normalized`
/// marker next to each processed file prevents processing it again.
#[derive(Parser)]
#[command(author, version, about, long_about)]
struct Cli {
    /// input directory
    directory: PathBuf,

    /// show what would be done without modifying files
    #[arg(long)]
    dry_run: bool,

    /// use this video's measured loudness as the normalization base instead of EBU R128 targets
    #[arg(short, long)]
    source_video: Option<PathBuf>,

    /// normalize every file without asking
    #[arg(short, long)]
    yes: bool,

    /// only normalize files whose loudness differs from the target by more than this, in LUFS
    #[arg(short, long, default_value_t = 2.0, allow_negative_numbers = true)]
    threshold: f64,

    /// ffmpeg executable to use
    #[arg(long, env = "FFMPEG_PATH", default_value = Ffmpeg::DEFAULT_PROGRAM)]
    ffmpeg: PathBuf,
}

fn main() -> Result<()> {
    _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();

    let options = NormalizationOptions {
        input_dir: cli.directory,
        reference: cli.source_video,
        threshold: cli.threshold,
        dry_run: cli.dry_run,
        assume_yes: cli.yes,
    };

    if options.dry_run {
        println!("{}", "DRY RUN MODE: No files will be modified".yellow().bold());
    }

    let engine = match Ffmpeg::locate(&cli.ffmpeg) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", "Please install ffmpeg or pass --ffmpeg.".red());
            Err(e)?
        }
    };

    info!("Starting loudness normalization with options:");
    info!("  Input Directory: {:?}", options.input_dir);
    match &options.reference {
        Some(r) => info!("  Reference Video: {:?}", r),
        None => info!("  Target: I=-16 LUFS, LRA=11 LU, TP=-1.5 dBFS"),
    }
    info!("  Threshold: {} LUFS", options.threshold);
    info!("  Engine: {:?}", engine.program());
    info!("---");

    let result = if options.assume_yes {
        normalize_folder_loudness(&options, &engine, &mut AssumeYes)
    } else {
        normalize_folder_loudness(&options, &engine, &mut TerminalPrompt)
    };

    match result {
        Ok(tally) => {
            print_summary(&tally);
            Ok(())
        }
        Err(e) => {
            error!("Normalization failed: {}", e);
            Err(e)?
        }
    }
}

fn print_summary(tally: &RunTally) {
    let rule = "=".repeat(20);
    println!("\n{rule}\nNormalization Complete\n{rule}");
    println!("{}", format!("Successfully normalized: {}", tally.succeeded).green());
    println!("{}", format!("Skipped: {}", tally.skipped).yellow());
    println!("{}", format!("Errors: {}", tally.errored).red());
}
