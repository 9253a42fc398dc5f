//! BrainVision header/marker/data triplet.
//!
//! The converter can write a multiplexed INT_16 export next to the legacy
//! artifact, and the validator reads `.vhdr` files back as the secondary
//! metadata source it cross-checks against.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::compositor::write_atomically;
use crate::error::{ConvertError, Result};
use crate::toolkit::DecodedRecording;
use crate::utils::{parse_float_field, parse_int_field, rate_from_interval_us, sampling_interval_us, sanitize_label};

/// One `Ch<n>=` entry of `[Channel Infos]`
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarChannel {
    pub label: String,
    pub reference: String,
    /// µV per bit, `None` when missing or unparseable
    pub resolution: Option<f64>,
    pub unit: String,
}

/// Parsed `.vhdr` header
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarHeader {
    pub path: Option<PathBuf>,
    pub data_file: String,
    pub marker_file: String,
    pub data_format: String,
    pub data_orientation: String,
    pub channel_count: i64,
    pub sampling_interval_us: f64,
    pub big_endian: bool,
    pub binary_format: String,
    pub channels: Vec<SidecarChannel>,
}

impl SidecarHeader {
    /// Parses header text
    ///
    /// All three sections must be present; keys missing inside them fall
    /// back to empty values so the validator can report them as mismatches.
    ///
    /// # Errors
    ///
    /// * `ConvertError::InvalidSidecar` - a section is missing or a numeric field is unreadable
    pub fn parse_str(text: &str) -> Result<Self> {
        let mut section = String::new();
        let mut common: Vec<(String, String)> = Vec::new();
        let mut binary: Vec<(String, String)> = Vec::new();
        let mut channel_lines: Vec<(String, String)> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                seen.push(section.clone());
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let entry = (key.trim().to_string(), value.trim().to_string());
            match section.as_str() {
                "Common Infos" => common.push(entry),
                "Binary Infos" => binary.push(entry),
                "Channel Infos" => channel_lines.push(entry),
                _ => {}
            }
        }

        for required in ["Common Infos", "Binary Infos", "Channel Infos"] {
            if !seen.iter().any(|s| s == required) {
                return Err(ConvertError::InvalidSidecar(format!("missing [{}] section", required)));
            }
        }

        let get = |entries: &[(String, String)], key: &str| -> String {
            entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };

        let count_raw = get(&common, "NumberOfChannels");
        let channel_count = if count_raw.is_empty() {
            0
        } else {
            parse_int_field(&count_raw)
                .ok_or_else(|| ConvertError::InvalidSidecar(format!("NumberOfChannels '{}'", count_raw)))?
        };
        let interval_raw = get(&common, "SamplingInterval");
        let sampling_interval_us = if interval_raw.is_empty() {
            0.0
        } else {
            parse_float_field(&interval_raw)
                .ok_or_else(|| ConvertError::InvalidSidecar(format!("SamplingInterval '{}'", interval_raw)))?
        };

        let mut endian = get(&common, "UseBigEndianOrder");
        if endian.is_empty() {
            endian = get(&binary, "UseBigEndianOrder");
        }

        let channels = channel_lines
            .iter()
            .filter(|(k, _)| k.to_ascii_lowercase().starts_with("ch"))
            .map(|(_, v)| {
                let mut parts = v.split(',').map(str::trim);
                let label = parts.next().unwrap_or_default().to_string();
                let reference = parts.next().unwrap_or_default().to_string();
                let resolution = parts.next().and_then(parse_float_field);
                let unit = parts.next().unwrap_or_default().to_string();
                SidecarChannel {
                    label,
                    reference,
                    resolution,
                    unit,
                }
            })
            .collect();

        Ok(SidecarHeader {
            path: None,
            data_file: get(&common, "DataFile"),
            marker_file: get(&common, "MarkerFile"),
            data_format: get(&common, "DataFormat"),
            data_orientation: get(&common, "DataOrientation"),
            channel_count,
            sampling_interval_us,
            big_endian: endian.eq_ignore_ascii_case("YES"),
            binary_format: get(&binary, "BinaryFormat"),
            channels,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(&path)
            .map_err(|e| ConvertError::FileNotFound(format!("{}: {}", path.as_ref().display(), e)))?;
        let mut header = Self::parse_str(&String::from_utf8_lossy(&bytes))?;
        header.path = Some(path.as_ref().to_path_buf());
        Ok(header)
    }

    /// Header describing a multiplexed INT_16 export of `labels` at `fs` Hz
    pub fn for_export(stem: &str, labels: &[String], fs: f64, resolution: f64) -> Self {
        SidecarHeader {
            path: None,
            data_file: format!("{}.eeg", stem),
            marker_file: format!("{}.vmrk", stem),
            data_format: "BINARY".to_string(),
            data_orientation: "MULTIPLEXED".to_string(),
            channel_count: labels.len() as i64,
            sampling_interval_us: sampling_interval_us(fs) as f64,
            big_endian: false,
            binary_format: "INT_16".to_string(),
            channels: labels
                .iter()
                .map(|l| SidecarChannel {
                    label: sanitize_label(l),
                    reference: String::new(),
                    resolution: Some(resolution),
                    unit: "uV".to_string(),
                })
                .collect(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        rate_from_interval_us(self.sampling_interval_us)
    }

    pub fn labels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.label.clone()).collect()
    }

    /// Bytes per sample implied by `BinaryFormat`; INT_16 when unrecognised.
    pub fn bytes_per_sample(&self) -> usize {
        let format = self.binary_format.to_ascii_uppercase();
        if format.contains("32") {
            4
        } else {
            2
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Brain Vision Data Exchange Header File Version 1.0\n");
        out.push_str("; Data created from EDF file by wineeg\n\n");
        out.push_str("[Common Infos]\n");
        out.push_str("Codepage=ANSI\n");
        let _ = writeln!(out, "DataFile={}", self.data_file);
        let _ = writeln!(out, "MarkerFile={}", self.marker_file);
        let _ = writeln!(out, "DataFormat={}", self.data_format);
        out.push_str("; Data orientation: MULTIPLEXED=ch1,pt1, ch2,pt1 ...\n");
        let _ = writeln!(out, "DataOrientation={}", self.data_orientation);
        let _ = writeln!(out, "NumberOfChannels={}", self.channel_count);
        out.push_str("; Sampling interval in microseconds\n");
        let _ = writeln!(out, "SamplingInterval={}", self.sampling_interval_us);
        out.push('\n');
        out.push_str("[Binary Infos]\n");
        let _ = writeln!(out, "BinaryFormat={}", self.binary_format);
        let _ = writeln!(out, "UseBigEndianOrder={}", if self.big_endian { "YES" } else { "NO" });
        out.push('\n');
        out.push_str("[Channel Infos]\n");
        out.push_str("; Ch<n>=<Name>,<Reference>,<Resolution in unit/bit>,<Unit>\n");
        for (i, channel) in self.channels.iter().enumerate() {
            let resolution = channel
                .resolution
                .map(|r| format!("{:.6}", r))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "Ch{}={},{},{},{}",
                i + 1,
                channel.label,
                channel.reference,
                resolution,
                channel.unit
            );
        }
        out
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomically(path.as_ref(), self.render().as_bytes())
    }
}

/// Marker file announcing one segment that spans `n_samples`
pub fn render_markers(data_file: &str, n_samples: usize) -> String {
    let mut out = String::new();
    out.push_str("Brain Vision Data Exchange Marker File, Version 1.0\n\n");
    out.push_str("[Common Infos]\n");
    out.push_str("Codepage=ANSI\n");
    let _ = writeln!(out, "DataFile={}", data_file);
    out.push('\n');
    out.push_str("[Marker Infos]\n");
    out.push_str("; Mk<n>=<Type>,<Description>,<Position>,<Size>,<Channel>\n");
    out.push_str("Mk1=New Segment,,1,1,0\n");
    let _ = writeln!(out, "Mk2=Recording End,,{},1,0", n_samples.max(1));
    out
}

/// One `Mk<n>=` entry of `[Marker Infos]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub kind: String,
    pub description: String,
    /// 1-based sample position
    pub position: u64,
    pub size: u64,
    /// 0 when the marker applies to every channel
    pub channel: i64,
}

/// Parsed `.vmrk` marker file
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerFile {
    pub path: Option<PathBuf>,
    pub data_file: String,
    pub markers: Vec<Marker>,
}

impl MarkerFile {
    /// Parses marker text
    ///
    /// Entries follow `Mk<n>=<Type>,<Description>,<Position>,<Size>,<Channel>`.
    /// Non-digits inside position and size are ignored; entries with fewer
    /// than five fields are skipped.
    ///
    /// # Errors
    ///
    /// * `ConvertError::InvalidSidecar` - no `[Marker Infos]` section, or a channel that is not a number
    pub fn parse_str(text: &str) -> Result<Self> {
        let mut section = String::new();
        let mut saw_markers = false;
        let mut data_file = String::new();
        let mut markers = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                saw_markers |= section == "Marker Infos";
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match section.as_str() {
                "Common Infos" if key.trim() == "DataFile" => data_file = value.trim().to_string(),
                "Marker Infos" if key.trim().to_ascii_lowercase().starts_with("mk") => {
                    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
                    if parts.len() < 5 {
                        continue;
                    }
                    let channel = parse_int_field(parts[4]).ok_or_else(|| {
                        ConvertError::InvalidSidecar(format!("marker {} channel '{}'", key.trim(), parts[4]))
                    })?;
                    markers.push(Marker {
                        kind: parts[0].to_string(),
                        description: parts[1].to_string(),
                        position: digits(parts[2]),
                        size: digits(parts[3]),
                        channel,
                    });
                }
                _ => {}
            }
        }

        if !saw_markers {
            return Err(ConvertError::InvalidSidecar("missing [Marker Infos] section".to_string()));
        }
        Ok(MarkerFile {
            path: None,
            data_file,
            markers,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(&path)
            .map_err(|e| ConvertError::FileNotFound(format!("{}: {}", path.as_ref().display(), e)))?;
        let mut markers = Self::parse_str(&String::from_utf8_lossy(&bytes))?;
        markers.path = Some(path.as_ref().to_path_buf());
        Ok(markers)
    }

    /// Largest sample position any marker reaches, `position + size - 1`.
    pub fn last_position(&self) -> u64 {
        self.markers
            .iter()
            .map(|m| (m.position + m.size.max(1)).saturating_sub(1))
            .max()
            .unwrap_or(0)
    }
}

fn digits(field: &str) -> u64 {
    let kept: String = field.chars().filter(char::is_ascii_digit).collect();
    kept.parse().unwrap_or(0)
}

/// µV/bit step for a signal with the given peak-to-peak span.
pub fn optimal_resolution(peak_to_peak_uv: f64) -> f64 {
    if peak_to_peak_uv < 10.0 {
        0.01
    } else if peak_to_peak_uv < 100.0 {
        0.1
    } else if peak_to_peak_uv < 1000.0 {
        1.0
    } else if peak_to_peak_uv < 10_000.0 {
        10.0
    } else {
        100.0
    }
}

/// `uv / resolution`, clipped to ±32767 and truncated toward zero
pub fn quantize(uv: f64, resolution: f64) -> i16 {
    if resolution <= 0.0 || uv.is_nan() {
        return 0;
    }
    (uv / resolution).clamp(-32767.0, 32767.0).trunc() as i16
}

/// Paths and parameters of a written export
#[derive(Debug, Clone, PartialEq)]
pub struct BrainVisionExport {
    pub header: PathBuf,
    pub markers: PathBuf,
    pub data: PathBuf,
    pub resolution: f64,
    pub frames: usize,
    pub sidecar: SidecarHeader,
}

impl BrainVisionExport {
    /// Writes `<base>.vhdr`, `<base>.vmrk` and `<base>.eeg` for `recording`
    ///
    /// One resolution is chosen for the whole recording from its overall
    /// peak-to-peak span. Samples are written multiplexed, little-endian.
    pub fn write<P: AsRef<Path>>(recording: &DecodedRecording, base: P) -> Result<Self> {
        let base = base.as_ref();
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".to_string());
        let header = base.with_extension("vhdr");
        let markers = base.with_extension("vmrk");
        let data = base.with_extension("eeg");

        let (lo, hi) = recording
            .channels
            .iter()
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let span = if lo.is_finite() && hi.is_finite() { hi - lo } else { 0.0 };
        let resolution = optimal_resolution(span);

        let frames = recording.frame_count();
        let mut raw = Vec::with_capacity(frames * recording.channel_count() * 2);
        for frame in 0..frames {
            for samples in &recording.channels {
                raw.extend_from_slice(&quantize(samples[frame], resolution).to_le_bytes());
            }
        }

        let sidecar = SidecarHeader::for_export(&stem, &recording.labels, recording.sample_rate, resolution);
        write_atomically(&data, &raw)?;
        write_atomically(&markers, render_markers(&sidecar.data_file, frames).as_bytes())?;
        sidecar.write(&header)?;

        Ok(BrainVisionExport {
            header,
            markers,
            data,
            resolution,
            frames,
            sidecar,
        })
    }
}
