//! Cross-format validation and confidence scoring.
//!
//! The validator never fails on a finding: mismatches become checks, issues
//! and advice in a [`ValidationReport`]. Only an unreadable source header
//! stops [`CrossValidator::validate_paths`].

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::brainvision::{MarkerFile, SidecarHeader};
use crate::compositor::{Advisory, Composition, ConversionWindow};
use crate::error::Result;
use crate::reader::HeaderReader;
use crate::scaling::ScaleStats;
use crate::template::FrameLayout;
use crate::toolkit::SignalQuality;
use crate::types::SourceHeader;
use crate::utils::sanitize_label;

/// International 10-20 montage in legacy channel order
pub const STANDARD_MONTAGE: [&str; 19] = [
    "Fp1", "Fp2", "F7", "F3", "Fz", "F4", "F8", "T3", "C3", "Cz", "C4", "T4", "T5", "P3", "Pz", "P4", "T6", "O1", "O2",
];

/// Modern names accepted for the older temporal/parietal labels
const LABEL_ALIASES: [(&str, &str); 4] = [("T3", "T7"), ("T4", "T8"), ("T5", "P7"), ("T6", "P8")];

/// Sampling rates clinical amplifiers commonly produce
pub const STANDARD_RATES: [f64; 9] = [128.0, 200.0, 250.0, 256.0, 500.0, 512.0, 1000.0, 1024.0, 2048.0];

pub const MIN_PLAUSIBLE_DURATION_S: f64 = 30.0;
pub const MAX_PLAUSIBLE_DURATION_S: f64 = 86_400.0;

const CLINICAL_BONUS_STEP: f64 = 0.025;
const CLINICAL_BONUS_MAX: f64 = 0.1;
const CRITICAL_PENALTY_STEP: f64 = 0.15;
const CRITICAL_PENALTY_MAX: f64 = 0.6;
const WARNING_PENALTY_STEP: f64 = 0.02;
const WARNING_PENALTY_MAX: f64 = 0.2;

/// Tunables of the validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Score montage, duration and sample rate plausibility
    pub clinical_checks: bool,
    /// Clipped-sample fraction above which an amplitude warning is raised
    pub clip_warning_ratio: f64,
    /// Largest rate difference still counted as a match, in Hz
    pub rate_tolerance_hz: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            clinical_checks: true,
            clip_warning_ratio: 0.001,
            rate_tolerance_hz: 1e-6,
        }
    }
}

/// Expected or observed side of a check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CheckValue {
    Missing,
    Flag(bool),
    Count(u64),
    Number(f64),
    Text(String),
    Labels(Vec<String>),
}

impl fmt::Display for CheckValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckValue::Missing => f.write_str("-"),
            CheckValue::Flag(b) => write!(f, "{}", b),
            CheckValue::Count(n) => write!(f, "{}", n),
            CheckValue::Number(x) => write!(f, "{}", x),
            CheckValue::Text(s) => write!(f, "{}", s),
            CheckValue::Labels(labels) => write!(f, "[{}]", labels.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub name: String,
    pub expected: CheckValue,
    pub observed: CheckValue,
    pub pass: bool,
}

impl Check {
    fn new(name: &str, expected: CheckValue, observed: CheckValue, pass: bool) -> Self {
        Check {
            name: name.to_string(),
            expected,
            observed,
            pass,
        }
    }
}

/// Confidence tiers, worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Assessment {
    Unreliable,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Assessment {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.95 {
            Assessment::Excellent
        } else if confidence >= 0.85 {
            Assessment::Good
        } else if confidence >= 0.7 {
            Assessment::Fair
        } else if confidence >= 0.5 {
            Assessment::Poor
        } else {
            Assessment::Unreliable
        }
    }
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Assessment::Unreliable => "UNRELIABLE",
            Assessment::Poor => "POOR",
            Assessment::Fair => "FAIR",
            Assessment::Good => "GOOD",
            Assessment::Excellent => "EXCELLENT",
        };
        f.write_str(s)
    }
}

/// Metadata gathered from each artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryMetadata {
    pub source_fs: f64,
    pub source_fs_channels_equal: bool,
    pub source_channels: usize,
    pub source_duration_s: f64,
    pub source_total_samples_per_channel: Vec<u64>,
    pub sidecar_fs: Option<f64>,
    pub sidecar_channels: Option<i64>,
    pub sidecar_binary_format: Option<String>,
    pub sidecar_data_format: Option<String>,
    pub sidecar_orientation: Option<String>,
    pub sidecar_labels: Option<Vec<String>>,
    pub artifact_bytes: Option<u64>,
    pub marker_count: Option<usize>,
    pub legacy_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub confidence: f64,
    pub assessment: Assessment,
    pub checks_passed: usize,
    pub checks_total: usize,
    pub clinical_passed: usize,
    pub clinical_total: usize,
    pub metadata: SummaryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub timestamp: String,
    pub source_path: Option<PathBuf>,
    pub sidecar_path: Option<PathBuf>,
    pub marker_path: Option<PathBuf>,
    pub artifact_path: Option<PathBuf>,
    pub legacy_path: Option<PathBuf>,
    pub checks: Vec<Check>,
    pub clinical: Vec<Check>,
    pub summary: Summary,
    pub critical_issues: Vec<String>,
    pub warnings: Vec<String>,
    pub advice: Vec<String>,
    pub signal_quality: Option<SignalQuality>,
}

impl ValidationReport {
    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.pass)
    }
}

/// Legacy artifact written by the compositor, with the numbers it was built from
#[derive(Debug, Clone)]
pub struct LegacyArtifact<'a> {
    pub path: &'a Path,
    pub layout: FrameLayout,
    pub template_len: usize,
    pub template_frames: usize,
    pub source_frames: usize,
    pub window: ConversionWindow,
    /// Frames a truncation advisory reported as lost
    pub lost_frames: usize,
}

impl<'a> LegacyArtifact<'a> {
    pub fn new(path: &'a Path, layout: FrameLayout, composition: &Composition) -> Self {
        let lost_frames = composition
            .advisories
            .iter()
            .map(|a| match a {
                Advisory::DataTruncated { lost_frames, .. } => *lost_frames,
                _ => 0,
            })
            .sum();
        LegacyArtifact {
            path,
            layout,
            template_len: composition.template_len,
            template_frames: composition.template_frames,
            source_frames: composition.source_frames,
            window: composition.window,
            lost_frames,
        }
    }
}

/// Everything the validator looks at in one run
#[derive(Debug, Clone)]
pub struct ValidationInputs<'a> {
    pub source: &'a SourceHeader,
    pub sidecar: Option<&'a SidecarHeader>,
    /// Set when a sidecar was supplied but could not be read
    pub sidecar_error: Option<String>,
    pub markers: Option<&'a MarkerFile>,
    /// Set when a marker file was declared but could not be read
    pub marker_error: Option<String>,
    /// Raw multiplexed binary whose size is reconciled against the source
    pub artifact: Option<&'a Path>,
    pub legacy: Option<LegacyArtifact<'a>>,
    pub scale_stats: Option<ScaleStats>,
    pub signal_quality: Option<SignalQuality>,
    /// Non-fatal findings from earlier pipeline steps
    pub advisories: Vec<String>,
}

impl<'a> ValidationInputs<'a> {
    pub fn new(source: &'a SourceHeader) -> Self {
        ValidationInputs {
            source,
            sidecar: None,
            sidecar_error: None,
            markers: None,
            marker_error: None,
            artifact: None,
            legacy: None,
            scale_stats: None,
            signal_quality: None,
            advisories: Vec::new(),
        }
    }
}

pub const CHECK_FS: &str = "FS match (source vs sidecar)";
pub const CHECK_CHANNELS: &str = "N channels match (source vs sidecar)";
pub const CHECK_ORIENTATION: &str = "Orientation MULTIPLEXED";
pub const CHECK_FORMAT: &str = "DataFormat BINARY";
pub const CHECK_SIZE: &str = "Binary size matches expected";
pub const CHECK_LABELS: &str = "Channel labels set match";
pub const CHECK_LEGACY_SIZE: &str = "Legacy size matches template";
pub const CHECK_LEGACY_FRAMES: &str = "Legacy payload whole frames";
pub const CHECK_LEGACY_SPLICE: &str = "Spliced frames account for source";

/// Compares a source header against generated artifacts and grades the result
///
/// # Examples
///
/// ```rust
/// use wineeg::{Assessment, CrossValidator, HeaderReader, SidecarHeader, ValidationInputs};
///
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("rec.edf");
/// # wineeg::fixtures::EdfBuilder::standard_montage(60).write(&path).unwrap();
/// let source = HeaderReader::open(&path)?;
/// let sidecar = SidecarHeader::for_export("rec", &source.labels, 250.0, 0.1);
///
/// let mut inputs = ValidationInputs::new(&source);
/// inputs.sidecar = Some(&sidecar);
/// let report = CrossValidator::default().validate(inputs);
///
/// assert!(report.checks.iter().all(|c| c.pass));
/// assert_eq!(report.summary.assessment, Assessment::Excellent);
/// # Ok::<(), wineeg::ConvertError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrossValidator {
    pub config: ValidationConfig,
}

impl CrossValidator {
    pub fn new(config: ValidationConfig) -> Self {
        CrossValidator { config }
    }

    /// Reads the inputs from disk and validates them
    ///
    /// # Errors
    ///
    /// Only when the source header cannot be read. An unreadable sidecar is
    /// reported as a critical issue instead.
    pub fn validate_paths(&self, source: &Path, sidecar: Option<&Path>, artifact: Option<&Path>) -> Result<ValidationReport> {
        let header = HeaderReader::open(source)?;
        let (parsed, sidecar_error) = match sidecar.map(SidecarHeader::load) {
            Some(Ok(parsed)) => (Some(parsed), None),
            Some(Err(e)) => (None, Some(e.to_string())),
            None => (None, None),
        };

        // MarkerFile 相对于 .vhdr 所在目录
        let marker_path = match (&parsed, sidecar) {
            (Some(parsed), Some(sidecar)) if !parsed.marker_file.is_empty() => Some(
                sidecar
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(&parsed.marker_file),
            ),
            _ => None,
        };
        let (markers, marker_error) = match marker_path.as_deref().map(MarkerFile::load) {
            Some(Ok(markers)) => (Some(markers), None),
            Some(Err(e)) => (None, Some(e.to_string())),
            None => (None, None),
        };

        let mut inputs = ValidationInputs::new(&header);
        inputs.sidecar = parsed.as_ref();
        inputs.sidecar_error = sidecar_error;
        inputs.markers = markers.as_ref();
        inputs.marker_error = marker_error;
        inputs.artifact = artifact;
        let mut report = self.validate(inputs);
        if report.sidecar_path.is_none() {
            report.sidecar_path = sidecar.map(Path::to_path_buf);
        }
        if report.marker_path.is_none() {
            report.marker_path = marker_path;
        }
        Ok(report)
    }

    pub fn validate(&self, inputs: ValidationInputs<'_>) -> ValidationReport {
        let source = inputs.source;
        let signal_channels = source.signal_channels();
        let signal_labels: Vec<String> = signal_channels.iter().map(|&i| source.labels[i].clone()).collect();
        let normalized_source = normalized_labels(&signal_labels);
        let (fs, fs_equal) = source.common_fs();
        let totals = source.total_samples_per_channel();

        let mut checks = Vec::new();
        let mut critical_issues = Vec::new();
        let mut warnings = Vec::new();
        let mut advice = Vec::new();

        let mut metadata = SummaryMetadata {
            source_fs: fs,
            source_fs_channels_equal: fs_equal,
            source_channels: signal_channels.len(),
            source_duration_s: source.duration_s(),
            source_total_samples_per_channel: signal_channels.iter().map(|&i| totals[i]).collect(),
            ..SummaryMetadata::default()
        };

        for anomaly in &source.anomalies {
            warnings.push(anomaly.to_string());
        }
        if !fs_equal {
            warnings.push(format!("Sampling rates differ across channels, using most common rate {} Hz", fs));
        }
        warnings.extend(inputs.advisories.iter().cloned());

        if let Some(error) = &inputs.sidecar_error {
            critical_issues.push(format!("Sidecar unreadable: {}", error));
        }

        if let Some(sidecar) = inputs.sidecar {
            let sidecar_fs = sidecar.sample_rate();
            let orientation = sidecar.data_orientation.to_ascii_uppercase();
            let format = sidecar.data_format.to_ascii_uppercase();
            let labels = sidecar.labels();

            metadata.sidecar_fs = Some(sidecar_fs);
            metadata.sidecar_channels = Some(sidecar.channel_count);
            metadata.sidecar_binary_format = Some(sidecar.binary_format.to_ascii_uppercase());
            metadata.sidecar_data_format = Some(format.clone());
            metadata.sidecar_orientation = Some(orientation.clone());
            metadata.sidecar_labels = Some(labels.clone());

            checks.push(Check::new(
                CHECK_FS,
                CheckValue::Number(fs),
                CheckValue::Number(sidecar_fs),
                (sidecar_fs - fs).abs() < self.config.rate_tolerance_hz,
            ));

            let channels_ok = sidecar.channel_count == signal_channels.len() as i64;
            checks.push(Check::new(
                CHECK_CHANNELS,
                CheckValue::Count(signal_channels.len() as u64),
                CheckValue::Count(sidecar.channel_count.max(0) as u64),
                channels_ok,
            ));
            if !channels_ok {
                critical_issues.push(format!(
                    "Channel count mismatch: source has {}, sidecar declares {}",
                    signal_channels.len(),
                    sidecar.channel_count
                ));
            }

            let orientation_ok = orientation == "MULTIPLEXED";
            checks.push(Check::new(
                CHECK_ORIENTATION,
                CheckValue::Text("MULTIPLEXED".to_string()),
                CheckValue::Text(orientation.clone()),
                orientation_ok,
            ));
            if !orientation_ok {
                critical_issues.push(format!("Unsupported data orientation '{}'", orientation));
            }

            let format_ok = format == "BINARY";
            checks.push(Check::new(
                CHECK_FORMAT,
                CheckValue::Text("BINARY".to_string()),
                CheckValue::Text(format.clone()),
                format_ok,
            ));
            if !format_ok {
                critical_issues.push(format!("Unsupported data format '{}'", format));
            }
        }

        if let Some(artifact) = inputs.artifact {
            match fs::metadata(artifact) {
                Ok(meta) => {
                    let observed = meta.len();
                    let bps = inputs.sidecar.map_or(2, SidecarHeader::bytes_per_sample) as u64;
                    let per_channel = metadata.source_total_samples_per_channel.first().copied().unwrap_or(0);
                    metadata.artifact_bytes = Some(observed);

                    let expected = (signal_channels.len() as u64)
                        .checked_mul(per_channel)
                        .and_then(|n| n.checked_mul(bps));
                    match expected {
                        Some(expected) => {
                            let pass = expected == observed;
                            checks.push(Check::new(
                                CHECK_SIZE,
                                CheckValue::Count(expected),
                                CheckValue::Count(observed),
                                pass,
                            ));
                            if !pass {
                                critical_issues.push(format!(
                                    "Binary size mismatch: expected {} bytes, got {}",
                                    expected, observed
                                ));
                                advice.push(format!(
                                    "Binary size mismatch: expected {} bytes from source, got {}. Check binary format, channel count, or total samples.",
                                    expected, observed
                                ));
                            }
                        }
                        None => {
                            checks.push(Check::new(CHECK_SIZE, CheckValue::Missing, CheckValue::Count(observed), false));
                            critical_issues.push(format!(
                                "Binary size out of range: {} channels x {} samples x {} bytes overflows",
                                signal_channels.len(),
                                per_channel,
                                bps
                            ));
                        }
                    }
                }
                Err(e) => {
                    critical_issues.push(format!("Artifact {} unreadable: {}", artifact.display(), e));
                }
            }
        }

        if let Some(sidecar) = inputs.sidecar {
            let observed = sidecar.labels();
            let normalized_observed = normalized_labels(&observed);
            let same_set = label_set(&normalized_observed) == label_set(&normalized_source);
            checks.push(Check::new(
                CHECK_LABELS,
                CheckValue::Labels(signal_labels.clone()),
                CheckValue::Labels(observed.clone()),
                same_set,
            ));
            if same_set && observed.len() != signal_labels.len() {
                advice.push(
                    "Channel label sets match but lengths differ. Investigate duplicates or extra channels."
                        .to_string(),
                );
            }
            if same_set && normalized_observed != normalized_source {
                advice.push(
                    "Channel labels are the same set but in a different order; ensure the multiplexed order matches the source."
                        .to_string(),
                );
            }
            if !same_set {
                warnings.push("Channel label sets differ between source and sidecar".to_string());
            }
            let renamed: Vec<String> = signal_labels
                .iter()
                .filter(|l| sanitize_label(l) != **l)
                .map(|l| format!("'{}' -> '{}'", l, sanitize_label(l)))
                .collect();
            if !renamed.is_empty() {
                advice.push(format!("Source labels were sanitized for export: {}", renamed.join(", ")));
            }
        }

        if let Some(error) = &inputs.marker_error {
            warnings.push(format!("Marker file unreadable: {}", error));
        }
        if let Some(markers) = inputs.markers {
            metadata.marker_count = Some(markers.markers.len());
            if let Some(sidecar) = inputs.sidecar {
                if !markers.data_file.eq_ignore_ascii_case(&sidecar.data_file) {
                    warnings.push(format!(
                        "Marker file refers to data file '{}', sidecar declares '{}'",
                        markers.data_file, sidecar.data_file
                    ));
                }
            }
            let per_channel = metadata.source_total_samples_per_channel.first().copied().unwrap_or(0);
            let last = markers.last_position();
            if per_channel > 0 && last > per_channel {
                warnings.push(format!(
                    "Markers reach sample {} but the source has {} samples per channel",
                    last, per_channel
                ));
            }
        }

        if let Some(legacy) = &inputs.legacy {
            check_legacy(legacy, &mut checks, &mut critical_issues, &mut metadata);
        }

        if let Some(stats) = inputs.scale_stats {
            if stats.clip_ratio() > self.config.clip_warning_ratio {
                warnings.push(format!(
                    "Amplitude clipping: {} of {} samples ({:.2}%) hit the 16-bit limits, peak {:.1} uV",
                    stats.clipped,
                    stats.total,
                    stats.clip_ratio() * 100.0,
                    stats.peak_abs_uv
                ));
                advice.push("Lower the scale factor if clipped segments matter clinically.".to_string());
            }
        }

        if let Some(quality) = &inputs.signal_quality {
            advice.extend(quality.notes.iter().cloned());
        }

        let clinical = if self.config.clinical_checks {
            clinical_checks(&signal_labels, source.duration_s(), fs)
        } else {
            Vec::new()
        };

        let checks_passed = checks.iter().filter(|c| c.pass).count();
        let clinical_passed = clinical.iter().filter(|c| c.pass).count();
        let confidence = score(
            checks_passed,
            checks.len(),
            clinical_passed,
            critical_issues.len(),
            warnings.len(),
        );

        ValidationReport {
            timestamp: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            source_path: source.path.clone(),
            sidecar_path: inputs.sidecar.and_then(|s| s.path.clone()),
            marker_path: inputs.markers.and_then(|m| m.path.clone()),
            artifact_path: inputs.artifact.map(Path::to_path_buf),
            legacy_path: inputs.legacy.as_ref().map(|l| l.path.to_path_buf()),
            summary: Summary {
                confidence,
                assessment: Assessment::from_confidence(confidence),
                checks_passed,
                checks_total: checks.len(),
                clinical_passed,
                clinical_total: clinical.len(),
                metadata,
            },
            checks,
            clinical,
            critical_issues,
            warnings,
            advice,
            signal_quality: inputs.signal_quality,
        }
    }
}

/// Size, frame alignment and splice accounting of the composed artifact
fn check_legacy(
    legacy: &LegacyArtifact<'_>,
    checks: &mut Vec<Check>,
    critical_issues: &mut Vec<String>,
    metadata: &mut SummaryMetadata,
) {
    let layout = legacy.layout;
    match fs::metadata(legacy.path) {
        Ok(meta) => {
            let observed = meta.len();
            metadata.legacy_bytes = Some(observed);

            let size_ok = observed == legacy.template_len as u64;
            checks.push(Check::new(
                CHECK_LEGACY_SIZE,
                CheckValue::Count(legacy.template_len as u64),
                CheckValue::Count(observed),
                size_ok,
            ));
            if !size_ok {
                critical_issues.push(format!(
                    "Legacy artifact size mismatch: template has {} bytes, output has {}",
                    legacy.template_len, observed
                ));
            }

            let frame_size = layout.frame_size() as u64;
            let remainder = observed
                .checked_sub((layout.header_size + layout.trailer_size) as u64)
                .filter(|_| frame_size > 0)
                .map(|payload| payload % frame_size);
            let aligned = remainder == Some(0);
            checks.push(Check::new(
                CHECK_LEGACY_FRAMES,
                CheckValue::Count(0),
                remainder.map_or(CheckValue::Missing, CheckValue::Count),
                aligned,
            ));
            if !aligned {
                critical_issues.push(format!(
                    "Legacy payload is not a whole number of {}-byte frames",
                    frame_size
                ));
            }
        }
        Err(e) => {
            critical_issues.push(format!("Legacy artifact {} unreadable: {}", legacy.path.display(), e));
        }
    }

    let window = legacy.window;
    let expected = legacy.source_frames.saturating_sub(legacy.lost_frames);
    let inside_guards = window.end.checked_sub(window.start) == Some(window.frames_to_splice)
        && (window.frames_to_splice == 0
            || window
                .end
                .checked_add(window.tail_frames)
                .map_or(false, |end| end <= legacy.template_frames));
    let splice_ok = window.frames_to_splice == expected && inside_guards;
    checks.push(Check::new(
        CHECK_LEGACY_SPLICE,
        CheckValue::Count(expected as u64),
        CheckValue::Count(window.frames_to_splice as u64),
        splice_ok,
    ));
    if !splice_ok {
        critical_issues.push(format!(
            "Spliced {} frames into {}..{}, but the source has {} frames and {} were reported lost",
            window.frames_to_splice, window.start, window.end, legacy.source_frames, legacy.lost_frames
        ));
    }
}

/// Graded confidence in `[0, 1]`, rounded to three decimals
///
/// ```rust
/// use wineeg::validate::score;
///
/// assert_eq!(score(6, 6, 4, 0, 0), 1.0);
/// assert_eq!(score(5, 6, 0, 1, 0), 0.683);
/// assert_eq!(score(0, 0, 4, 0, 0), 0.1);
/// ```
pub fn score(passed: usize, total: usize, clinical_passed: usize, critical: usize, warnings: usize) -> f64 {
    let base = if total > 0 { passed as f64 / total as f64 } else { 0.0 };
    let bonus = (clinical_passed as f64 * CLINICAL_BONUS_STEP).min(CLINICAL_BONUS_MAX);
    let penalty = (critical as f64 * CRITICAL_PENALTY_STEP).min(CRITICAL_PENALTY_MAX)
        + (warnings as f64 * WARNING_PENALTY_STEP).min(WARNING_PENALTY_MAX);
    let confidence = (base + bonus - penalty).clamp(0.0, 1.0);
    (confidence * 1000.0).round() / 1000.0
}

fn label_set(labels: &[String]) -> HashSet<String> {
    labels.iter().map(|l| l.to_uppercase()).collect()
}

/// Labels as an export writes them, uppercased for comparison.
fn normalized_labels(labels: &[String]) -> Vec<String> {
    labels.iter().map(|l| sanitize_label(l).to_uppercase()).collect()
}

fn has_montage_label(present: &HashSet<String>, label: &str) -> bool {
    if present.contains(&label.to_uppercase()) {
        return true;
    }
    LABEL_ALIASES
        .iter()
        .any(|(old, new)| *old == label && present.contains(&new.to_uppercase()))
}

/// Montage, duration and sample-rate plausibility
pub fn clinical_checks(labels: &[String], duration_s: f64, fs: f64) -> Vec<Check> {
    let present = label_set(labels);
    let missing: Vec<String> = STANDARD_MONTAGE
        .iter()
        .filter(|l| !has_montage_label(&present, l))
        .map(|l| l.to_string())
        .collect();
    let nearest_rate = STANDARD_RATES
        .iter()
        .copied()
        .fold(f64::NAN, |best, r| if best.is_nan() || (r - fs).abs() < (best - fs).abs() { r } else { best });

    vec![
        Check::new(
            "19-channel montage",
            CheckValue::Count(STANDARD_MONTAGE.len() as u64),
            CheckValue::Count(labels.len() as u64),
            labels.len() == STANDARD_MONTAGE.len(),
        ),
        Check::new(
            "10-20 labels present",
            CheckValue::Labels(Vec::new()),
            CheckValue::Labels(missing.clone()),
            missing.is_empty(),
        ),
        Check::new(
            "Plausible duration",
            CheckValue::Text(format!("{}..={} s", MIN_PLAUSIBLE_DURATION_S, MAX_PLAUSIBLE_DURATION_S)),
            CheckValue::Number(duration_s),
            (MIN_PLAUSIBLE_DURATION_S..=MAX_PLAUSIBLE_DURATION_S).contains(&duration_s),
        ),
        Check::new(
            "Standard sample rate",
            CheckValue::Number(nearest_rate),
            CheckValue::Number(fs),
            (nearest_rate - fs).abs() < 1e-6,
        ),
    ]
}
