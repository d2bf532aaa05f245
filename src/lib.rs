/// Module for the confirmation prompt
pub mod confirm;
/// Module for driving the external loudness engine
pub mod engine;
/// Module for error handling
pub mod error;
/// Module for loudness measurements and targets
pub mod profile;

pub use crate::confirm::{AssumeYes, Confirmation, TerminalPrompt};
pub use crate::engine::{Ffmpeg, LoudnessEngine};
pub use crate::error::{AnalysisError, ApplyError, Error};
pub use crate::profile::{LoudnessProfile, NormalizationTarget};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use strum_macros::Display;
use walkdir::WalkDir;

/// Appended to a video's file name to form its completion marker
pub const MARKER_SUFFIX: &str = ".normalized";
/// Inserted between stem and extension to form the temporary output name
pub const TEMP_INFIX: &str = ".temp_normalized";
/// Default allowed difference between measured and target loudness, in LUFS
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Represents supported video file formats
#[derive(Debug, PartialEq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum VideoFormats {
    Mp4,
    Mkv,
    Mov,
    Avi,
    Webm,
}

impl VideoFormats {
    /// Creates a VideoFormats enum from a file path based on its extension
    #[inline]
    pub fn from_path(value: impl AsRef<Path>) -> Option<Self> {
        Some(
            match value
                .as_ref()
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase()
                .as_ref()
            {
                "mp4" => Self::Mp4,
                "mkv" => Self::Mkv,
                "mov" => Self::Mov,
                "avi" => Self::Avi,
                "webm" => Self::Webm,
                _ => return None,
            },
        )
    }
}

/// Configuration options for the normalization run
#[derive(Debug, Clone)]
pub struct NormalizationOptions {
    /// Directory searched recursively for video files
    pub input_dir: PathBuf,
    /// Video whose measured loudness replaces both the per-file measurement and the standard target
    pub reference: Option<PathBuf>,
    /// Files whose loudness is within this many LUFS of the target are left alone
    pub threshold: f64,
    /// Report what would be done without touching any file
    pub dry_run: bool,
    /// Normalize without asking for each file
    pub assume_yes: bool,
}

impl Default for NormalizationOptions {
    fn default() -> Self {
        NormalizationOptions {
            input_dir: PathBuf::from("."),
            reference: None,
            threshold: DEFAULT_THRESHOLD,
            dry_run: false,
            assume_yes: false,
        }
    }
}

/// A discovered video and the paths derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub marker_path: PathBuf,
    pub temp_path: PathBuf,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            marker_path: marker_path(&path),
            temp_path: temp_path(&path),
            path,
        }
    }

    /// Whether a previous run already committed this file
    pub fn is_normalized(&self) -> bool {
        self.marker_path.exists()
    }
}

/// `video.mp4` -> `video.mp4.normalized`
pub fn marker_path(path: impl AsRef<Path>) -> PathBuf {
    let mut marker = path.as_ref().as_os_str().to_owned();
    marker.push(MARKER_SUFFIX);
    PathBuf::from(marker)
}

/// `dir/video.mp4` -> `dir/video.temp_normalized.mp4`
pub fn temp_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let mut name = path.file_stem().unwrap_or_default().to_owned();
    name.push(TEMP_INFIX);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Why a file was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    #[strum(serialize = "already normalized")]
    AlreadyNormalized,
    #[strum(serialize = "loudness within threshold")]
    WithinThreshold,
    #[strum(serialize = "declined")]
    Declined,
}

/// Result of processing one file that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// The original was replaced and its marker written
    Normalized,
    /// Dry run: the file would have been normalized
    WouldNormalize,
    Skipped(SkipReason),
}

/// Counts of processed files
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunTally {
    pub succeeded: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl RunTally {
    pub fn record(&mut self, result: &Result<FileOutcome, Error>) {
        match result {
            Ok(FileOutcome::Normalized | FileOutcome::WouldNormalize) => self.succeeded += 1,
            Ok(FileOutcome::Skipped(_)) => self.skipped += 1,
            Err(_) => self.errored += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.errored
    }
}

/// Settings shared by every file of one run
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    /// Cached reference measurement, substituted for per-file analysis
    pub reference: Option<&'a LoudnessProfile>,
    pub target: NormalizationTarget,
    pub threshold: f64,
    pub dry_run: bool,
    pub assume_yes: bool,
}

impl<'a> RunContext<'a> {
    pub fn new(options: &NormalizationOptions, reference: Option<&'a LoudnessProfile>) -> Self {
        Self {
            reference,
            target: NormalizationTarget::resolve(reference),
            threshold: options.threshold,
            dry_run: options.dry_run,
            assume_yes: options.assume_yes,
        }
    }
}

/// Normalize the loudness of all video files under a folder
///
/// Files are processed one at a time. Per-file failures are logged and
/// counted; only invalid options or an unusable reference file abort the run.
pub fn normalize_folder_loudness(
    options: &NormalizationOptions,
    engine: &impl LoudnessEngine,
    confirm: &mut impl Confirmation,
) -> Result<RunTally, Error> {
    // 1. Validate options
    validate_options(options)?;
    if options.dry_run {
        info!("Dry run: no files will be modified");
    }

    // 2. Discover video files
    info!("Scanning for video files in {:?}...", options.input_dir);
    let video_files = find_video_files(&options.input_dir)?;

    // 3. Measure the reference once, it is reused for every file
    let reference = match &options.reference {
        Some(path) => {
            info!("Using reference video as base: {:?}", path);
            let profile = engine.measure(path).map_err(|source| Error::Reference {
                path: path.clone(),
                source,
            })?;
            info!("Reference loudness: {}", profile);
            if options.threshold >= 0.0 {
                warn!(
                    "With a reference video every file is compared against the reference itself, \
                     so no file exceeds a threshold of {} LUFS",
                    options.threshold
                );
            }
            Some(profile)
        }
        None => None,
    };

    let mut tally = RunTally::default();
    if video_files.is_empty() {
        info!("No video files found.");
        return Ok(tally);
    }
    info!(
        "Found {} video file(s). Starting normalization...",
        video_files.len()
    );

    let ctx = RunContext::new(options, reference.as_ref());
    let pb = ProgressBar::new(video_files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .expect("Internal Error: Failed to set progress bar style")
            .progress_chars("#>-"),
    );
    pb.set_message("Processing files");

    for record in &video_files {
        let name = display_name(&record.path, &options.input_dir);
        let result = process_single_file(record, &ctx, engine, |path| {
            pb.suspend(|| confirm.confirm(path))
        });
        match &result {
            Ok(FileOutcome::Normalized) => info!("Successfully normalized: {}", name),
            Ok(FileOutcome::WouldNormalize) => info!("[DRY RUN] Would normalize: {}", name),
            Ok(FileOutcome::Skipped(reason)) => info!("Skipped ({}): {}", reason, name),
            Err(e) => error!("Error: {}", e),
        }
        tally.record(&result);
        pb.inc(1);
    }
    pb.finish_with_message("Processing done");

    info!(
        "Normalization complete. {} succeeded, {} skipped, {} failed.",
        tally.succeeded, tally.skipped, tally.errored
    );
    Ok(tally)
}

/// Runs the measure, decide, apply and commit steps for one video
///
/// `confirm` is consulted only when the file exceeds the threshold and the
/// run is neither auto-confirmed nor a dry run.
pub fn process_single_file(
    record: &FileRecord,
    ctx: &RunContext<'_>,
    engine: &impl LoudnessEngine,
    mut confirm: impl FnMut(&Path) -> bool,
) -> Result<FileOutcome, Error> {
    let path = record.path.as_path();
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();

    if record.is_normalized() {
        return Ok(FileOutcome::Skipped(SkipReason::AlreadyNormalized));
    }
    info!("Processing: {}", file_name);

    // 1. Measure, or borrow the reference's measurement
    let measured = match ctx.reference {
        Some(reference) => {
            debug!("Using reference stats for: {}", file_name);
            *reference
        }
        None => {
            info!("Analyzing audio for: {}", file_name);
            engine.measure(path).map_err(|source| Error::Measurement {
                path: path.to_path_buf(),
                source,
            })?
        }
    };

    // 2. Compare against the target
    let target_loudness = ctx.target.integrated;
    let diff = (measured.integrated - target_loudness).abs();
    info!("  Measured loudness: {:.2} LUFS", measured.integrated);
    info!("  Target loudness: {:.2} LUFS", target_loudness);
    info!(
        "  Difference: {:.2} LUFS (threshold: {} LUFS)",
        diff, ctx.threshold
    );
    if diff <= ctx.threshold {
        return Ok(FileOutcome::Skipped(SkipReason::WithinThreshold));
    }

    if !ctx.assume_yes && !ctx.dry_run && !confirm(path) {
        return Ok(FileOutcome::Skipped(SkipReason::Declined));
    }

    if ctx.dry_run {
        info!(
            "[DRY RUN] Would apply {:?} and replace the original",
            crate::engine::apply_filter(&measured, &ctx.target)
        );
        info!("[DRY RUN] Would create marker {:?}", record.marker_path);
        return Ok(FileOutcome::WouldNormalize);
    }

    // 3. Normalize into a temporary sibling
    info!("Applying normalization to: {}", file_name);
    if let Err(source) = engine.apply(path, &record.temp_path, &measured, &ctx.target) {
        remove_temp(&record.temp_path);
        return Err(Error::Apply {
            path: path.to_path_buf(),
            source,
        });
    }

    // 4. Commit, then mark
    commit(record)?;
    Ok(FileOutcome::Normalized)
}

/// Moves the temporary output over the original and writes the marker.
/// The marker is only written once the original has been replaced.
fn commit(record: &FileRecord) -> Result<(), Error> {
    if let Err(source) = fs::rename(&record.temp_path, &record.path) {
        remove_temp(&record.temp_path);
        return Err(Error::Commit {
            path: record.path.clone(),
            source,
        });
    }
    fs::File::create(&record.marker_path).map_err(|source| Error::Marker {
        path: record.marker_path.clone(),
        source,
    })?;
    debug!("Created marker {:?}", record.marker_path);
    Ok(())
}

fn remove_temp(temp_path: &Path) {
    if temp_path.exists() {
        match fs::remove_file(temp_path) {
            Ok(()) => debug!("Removed temporary file {:?}", temp_path),
            Err(e) => warn!("Failed to remove temporary file {:?}: {}", temp_path, e),
        }
    }
}

/// Path relative to the input directory, for log messages
fn display_name(path: &Path, input_dir: &Path) -> String {
    pathdiff::diff_paths(path, input_dir)
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

/// Validates normalization options for correctness
///
/// # Arguments
/// * `options` - Reference to NormalizationOptions struct
fn validate_options(options: &NormalizationOptions) -> Result<(), Error> {
    if !options.input_dir.is_dir() {
        return Err(Error::InvalidOptions(format!(
            "Input path is not a valid directory: {:?}",
            options.input_dir
        )));
    }
    if let Some(reference) = &options.reference {
        if !reference.is_file() {
            return Err(Error::InvalidOptions(format!(
                "Reference video is not a file: {:?}",
                reference
            )));
        }
    }
    if !options.threshold.is_finite() {
        return Err(Error::InvalidOptions(format!(
            "Threshold must be a finite number: {}",
            options.threshold
        )));
    }
    Ok(())
}

/// Finds all supported video files in the specified directory
///
/// # Arguments
/// * `input_dir` - Directory to search for video files
///
/// # Returns
/// Records sorted by path. Leftover temporary outputs are not included.
pub fn find_video_files(input_dir: impl AsRef<Path>) -> Result<Vec<FileRecord>, Error> {
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        return Err(Error::InvalidOptions(format!(
            "Input path is not a valid directory: {:?}",
            input_dir
        )));
    }

    let mut video_files = Vec::new();
    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        // `Path::is_file` follows symlinks, so linked videos are candidates too
        if !entry.path().is_file() || VideoFormats::from_path(entry.path()).is_none() {
            continue;
        }
        let is_leftover = entry
            .path()
            .file_stem()
            .is_some_and(|stem| stem.to_string_lossy().ends_with(TEMP_INFIX));
        if is_leftover {
            warn!(
                "Ignoring {:?}: its name marks it as a temporary output of an earlier run",
                entry.path()
            );
            continue;
        }
        video_files.push(FileRecord::new(entry.path()));
    }
    Ok(video_files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_match_extensions_case_insensitively() {
        assert_eq!(VideoFormats::from_path("a/b.MP4"), Some(VideoFormats::Mp4));
        assert_eq!(VideoFormats::from_path("clip.WebM"), Some(VideoFormats::Webm));
        assert_eq!(VideoFormats::from_path("clip.mp3"), None);
        assert_eq!(VideoFormats::from_path("clip.mp4.normalized"), None);
        assert_eq!(VideoFormats::from_path("mkv"), None);
        for ext in ["mp4", "mkv", "mov", "avi", "webm"] {
            let format = VideoFormats::from_path(format!("x.{ext}")).unwrap();
            assert_eq!(format.to_string(), ext);
        }
    }

    #[test]
    fn derived_paths_stay_beside_the_original() {
        let record = FileRecord::new("shows/ep 1.final.mkv");
        assert_eq!(record.marker_path, PathBuf::from("shows/ep 1.final.mkv.normalized"));
        assert_eq!(
            record.temp_path,
            PathBuf::from("shows/ep 1.final.temp_normalized.mkv")
        );
        assert_eq!(FileRecord::new("shows/ep 1.final.mkv"), record);
    }

    #[test]
    fn tally_counts_each_outcome() {
        let mut tally = RunTally::default();
        tally.record(&Ok(FileOutcome::Normalized));
        tally.record(&Ok(FileOutcome::WouldNormalize));
        tally.record(&Ok(FileOutcome::Skipped(SkipReason::Declined)));
        tally.record(&Err(Error::InvalidOptions("x".into())));
        assert_eq!(
            tally,
            RunTally {
                succeeded: 2,
                skipped: 1,
                errored: 1
            }
        );
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn skip_reasons_read_naturally() {
        assert_eq!(SkipReason::AlreadyNormalized.to_string(), "already normalized");
        assert_eq!(
            SkipReason::WithinThreshold.to_string(),
            "loudness within threshold"
        );
    }

    #[test]
    fn default_options_use_standard_threshold() {
        let options = NormalizationOptions::default();
        assert_eq!(options.threshold, DEFAULT_THRESHOLD);
        assert!(!options.dry_run && !options.assume_yes);
        assert!(options.reference.is_none());
    }
}
