use std::fmt;

use serde_json::{Map, Value};

use crate::error::AnalysisError;

/// Loudness characteristics reported by the measurement pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessProfile {
    /// Integrated loudness in LUFS
    pub integrated: f64,
    /// Loudness range in LU
    pub range: f64,
    /// True peak in dBFS
    pub true_peak: f64,
    /// Gating threshold in LUFS
    pub threshold: f64,
    /// Offset gain in dB the filter suggests for the second pass
    pub target_offset: f64,
}

impl fmt::Display for LoudnessProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "I={:.2} LUFS, LRA={:.2} LU, TP={:.2} dBFS, thresh={:.2} LUFS, offset={:.2} dB",
            self.integrated, self.range, self.true_peak, self.threshold, self.target_offset
        )
    }
}

impl LoudnessProfile {
    /// Builds a profile from the diagnostic output of a `loudnorm` measurement run.
    ///
    /// The output usually holds log lines from the engine followed by one
    /// pretty-printed JSON object; see [`extract_stats_json`].
    pub fn from_loudnorm_output(output: &str) -> Result<Self, AnalysisError> {
        let json = extract_stats_json(output).ok_or(AnalysisError::NoStats)?;
        let stats: Map<String, Value> = serde_json::from_str(&json)?;

        let profile = Self {
            integrated: stat(&stats, "input_i")?,
            range: stat(&stats, "input_lra")?,
            true_peak: stat(&stats, "input_tp")?,
            threshold: stat(&stats, "input_thresh")?,
            target_offset: stat(&stats, "target_offset")?,
        };
        if !profile.integrated.is_finite() {
            return Err(AnalysisError::Unmeasurable(profile.integrated));
        }
        Ok(profile)
    }
}

/// Target loudness triple handed to the apply pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationTarget {
    /// Integrated loudness in LUFS
    pub integrated: f64,
    /// Loudness range in LU
    pub range: f64,
    /// True peak in dBFS
    pub true_peak: f64,
}

impl NormalizationTarget {
    /// EBU R128 style defaults. Measurement always runs against these.
    pub const STANDARD: Self = Self {
        integrated: -16.0,
        range: 11.0,
        true_peak: -1.5,
    };

    /// The reference file's measured characteristics if one was given, the standard otherwise.
    pub fn resolve(reference: Option<&LoudnessProfile>) -> Self {
        reference.map_or(Self::STANDARD, Self::from)
    }
}

impl Default for NormalizationTarget {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl From<&LoudnessProfile> for NormalizationTarget {
    fn from(profile: &LoudnessProfile) -> Self {
        Self {
            integrated: profile.integrated,
            range: profile.range,
            true_peak: profile.true_peak,
        }
    }
}

/// Reads a numeric stat, accepting both JSON numbers and decimal strings
fn stat(stats: &Map<String, Value>, key: &'static str) -> Result<f64, AnalysisError> {
    let not_numeric = |value: &Value| AnalysisError::NotNumeric {
        key,
        value: value.to_string(),
    };
    match stats.get(key) {
        None => Err(AnalysisError::MissingKey(key)),
        Some(value @ Value::Number(n)) => n.as_f64().ok_or_else(|| not_numeric(value)),
        Some(value @ Value::String(s)) => s.trim().parse().map_err(|_| not_numeric(value)),
        Some(value) => Err(not_numeric(value)),
    }
}

/// Finds the first complete JSON object in freeform engine output.
///
/// A block opens on a line starting with `{` and is tracked by brace depth
/// until a line ending with `}` brings the depth back to zero. Lines outside a
/// block are ignored, so log noise before or after the object is harmless.
pub fn extract_stats_json(output: &str) -> Option<String> {
    let mut block: Vec<&str> = Vec::new();
    let mut depth = 0i64;

    for line in output.lines().map(str::trim) {
        if depth == 0 {
            if !line.starts_with('{') {
                continue;
            }
            block.clear();
        }
        block.push(line);
        depth += brace_delta(line);
        if depth <= 0 {
            if line.ends_with('}') {
                return Some(block.join("\n"));
            }
            depth = 0;
            block.clear();
        }
    }
    None
}

/// Net change in object nesting for one line, ignoring braces inside string literals
fn brace_delta(line: &str) -> i64 {
    let mut delta = 0;
    let mut in_string = false;
    let mut escaped = false;
    for c in line.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}
