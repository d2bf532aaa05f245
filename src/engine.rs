use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use log::{debug, error};

use crate::error::{AnalysisError, ApplyError, Error};
use crate::profile::{LoudnessProfile, NormalizationTarget};

/// Audio codec of the normalized output. Lossless, so the second pass is the only change.
pub const AUDIO_CODEC: &str = "flac";
/// Sample rate of the normalized output
pub const SAMPLE_RATE: &str = "48k";

/// Number of trailing stderr lines kept in error reports
const STDERR_TAIL_LINES: usize = 12;

/// The two passes of loudness normalization.
///
/// Implemented by [`Ffmpeg`]; tests substitute their own engine.
pub trait LoudnessEngine {
    /// First pass: measure `path` against [`NormalizationTarget::STANDARD`] without writing output.
    fn measure(&self, path: &Path) -> Result<LoudnessProfile, AnalysisError>;

    /// Second pass: write `input` to `output` with its audio normalized to `target`,
    /// reusing `measured` so the engine does not measure again.
    fn apply(
        &self,
        input: &Path,
        output: &Path,
        measured: &LoudnessProfile,
        target: &NormalizationTarget,
    ) -> Result<(), ApplyError>;
}

/// `loudnorm` filter for the measurement pass
pub fn measure_filter(target: &NormalizationTarget) -> String {
    format!(
        "loudnorm=I={}:LRA={}:tp={}:print_format=json",
        target.integrated, target.range, target.true_peak
    )
}

/// `loudnorm` filter for the apply pass, carrying both the target and the first-pass measurements
pub fn apply_filter(measured: &LoudnessProfile, target: &NormalizationTarget) -> String {
    format!(
        "loudnorm=I={}:LRA={}:tp={}:measured_I={}:measured_LRA={}:measured_tp={}:measured_thresh={}:offset={}",
        target.integrated,
        target.range,
        target.true_peak,
        measured.integrated,
        measured.range,
        measured.true_peak,
        measured.threshold,
        measured.target_offset
    )
}

/// The ffmpeg executable
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub const DEFAULT_PROGRAM: &'static str = "ffmpeg";

    /// Resolves `program` (a bare name searched on `PATH`, or a path) to an executable.
    pub fn locate(program: impl AsRef<OsStr>) -> Result<Self, Error> {
        let program = program.as_ref();
        let resolved = which::which(program).map_err(|source| Error::EngineNotFound {
            name: program.to_string_lossy().into_owned(),
            source,
        })?;
        debug!("Using engine at {}", resolved.display());
        Ok(Self { program: resolved })
    }

    /// Uses `program` as given, without checking that it exists.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn measure_args(path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), path.into()];
        args.extend(
            [
                "-hide_banner",
                "-vn",
                "-af",
                measure_filter(&NormalizationTarget::STANDARD).as_str(),
                "-f",
                "null",
                "-",
            ]
            .map(OsString::from),
        );
        args
    }

    pub fn apply_args(
        input: &Path,
        output: &Path,
        measured: &LoudnessProfile,
        target: &NormalizationTarget,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
        args.extend(
            [
                "-hide_banner",
                "-y",
                "-c:v",
                "copy",
                "-c:a",
                AUDIO_CODEC,
                "-ar",
                SAMPLE_RATE,
                "-af",
                apply_filter(measured, target).as_str(),
            ]
            .map(OsString::from),
        );
        args.push(output.into());
        args
    }

    fn run(&self, args: &[OsString]) -> std::io::Result<Output> {
        debug!("Running command: {}", self.command_line(args));
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
    }

    fn command_line(&self, args: &[OsString]) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(OsStr::to_string_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl LoudnessEngine for Ffmpeg {
    fn measure(&self, path: &Path) -> Result<LoudnessProfile, AnalysisError> {
        let output = self
            .run(&Self::measure_args(path))
            .map_err(AnalysisError::Spawn)?;
        // loudnorm prints its report on stderr
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(AnalysisError::EngineFailed {
                status: output.status.to_string(),
                stderr: stderr_tail(&stderr),
            });
        }
        LoudnessProfile::from_loudnorm_output(&stderr).inspect_err(|_| {
            debug!("Full engine output for {:?}:\n{}", path, stderr);
        })
    }

    fn apply(
        &self,
        input: &Path,
        output: &Path,
        measured: &LoudnessProfile,
        target: &NormalizationTarget,
    ) -> Result<(), ApplyError> {
        let result = self
            .run(&Self::apply_args(input, output, measured, target))
            .map_err(ApplyError::Spawn)?;
        let stdout = String::from_utf8_lossy(&result.stdout);
        let stderr = String::from_utf8_lossy(&result.stderr);
        if !stdout.trim().is_empty() {
            debug!("Engine stdout:\n{}", stdout);
        }
        if !result.status.success() {
            error!("Engine stderr for {:?}:\n{}", input, stderr);
            return Err(ApplyError::EngineFailed {
                status: result.status.to_string(),
                stderr: stderr_tail(&stderr),
            });
        }
        debug!("Engine stderr:\n{}", stderr);
        Ok(())
    }
}

/// Last few non-empty lines of engine output, where ffmpeg puts the actual error
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured() -> LoudnessProfile {
        LoudnessProfile {
            integrated: -27.61,
            range: 18.06,
            true_peak: -4.47,
            threshold: -39.2,
            target_offset: 0.58,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn measurement_uses_standard_targets_and_null_sink() {
        let args = strings(Ffmpeg::measure_args(Path::new("dir/clip.mp4")));
        assert_eq!(
            args,
            [
                "-i",
                "dir/clip.mp4",
                "-hide_banner",
                "-vn",
                "-af",
                "loudnorm=I=-16:LRA=11:tp=-1.5:print_format=json",
                "-f",
                "null",
                "-",
            ]
        );
    }

    #[test]
    fn apply_copies_video_and_carries_both_profiles() {
        let target = NormalizationTarget::STANDARD;
        let args = strings(Ffmpeg::apply_args(
            Path::new("clip.mkv"),
            Path::new("clip.temp_normalized.mkv"),
            &measured(),
            &target,
        ));
        assert_eq!(
            args,
            [
                "-i",
                "clip.mkv",
                "-hide_banner",
                "-y",
                "-c:v",
                "copy",
                "-c:a",
                "flac",
                "-ar",
                "48k",
                "-af",
                "loudnorm=I=-16:LRA=11:tp=-1.5:measured_I=-27.61:measured_LRA=18.06:measured_tp=-4.47:measured_thresh=-39.2:offset=0.58",
                "clip.temp_normalized.mkv",
            ]
        );
    }

    #[test]
    fn apply_filter_follows_reference_target() {
        let reference = measured();
        let filter = apply_filter(&reference, &NormalizationTarget::from(&reference));
        assert!(filter.starts_with("loudnorm=I=-27.61:LRA=18.06:tp=-4.47:measured_I=-27.61"));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {i}\n\n")).collect();
        let tail = stderr_tail(&stderr);
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 29"));
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = Ffmpeg::locate("definitely-not-an-installed-engine-4d1f").unwrap_err();
        assert!(matches!(err, Error::EngineNotFound { .. }));
    }

    #[test]
    fn spawn_failure_is_reported() {
        let engine = Ffmpeg::with_program("/nonexistent/engine/ffmpeg");
        let err = engine.measure(Path::new("clip.mp4")).unwrap_err();
        assert!(matches!(err, AnalysisError::Spawn(_)));
    }
}
