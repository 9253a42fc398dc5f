use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};

/// Label EDF+ uses for its annotation signal
pub const ANNOTATION_LABEL: &str = "EDF Annotations";

/// Non-fatal irregularity found while reading a source header
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderAnomaly {
    /// 版本字段不是 "0"
    UnexpectedVersion(String),
    EmptyField(&'static str),
    /// Field made only of EDF+ placeholders such as `X`
    PlaceholderIdentifier { field: &'static str, value: String },
    PreambleLengthMismatch { declared: Option<i64>, expected: usize },
    UnreadableStartDateTime { date: String, time: String },
    MissingRecordCount(i64),
    InvalidRecordDuration(f64),
    MalformedNumber {
        field: &'static str,
        channel: usize,
        raw: String,
    },
    DuplicateLabel(String),
    SuspiciousLabel { channel: usize, label: String },
    /// Distinct samples-per-record values, in first-seen order
    InconsistentSamplesPerRecord(Vec<i64>),
}

impl fmt::Display for HeaderAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderAnomaly::UnexpectedVersion(v) => {
                write!(f, "Non-standard identifier '{}' (expected '0')", v)
            }
            HeaderAnomaly::EmptyField(field) => write!(f, "Empty {} field", field),
            HeaderAnomaly::PlaceholderIdentifier { field, value } => {
                write!(f, "Placeholder {} field '{}'", field, value)
            }
            HeaderAnomaly::PreambleLengthMismatch { declared, expected } => match declared {
                Some(d) => write!(f, "Declared header length {} bytes, expected {}", d, expected),
                None => write!(f, "Missing header length field, expected {}", expected),
            },
            HeaderAnomaly::UnreadableStartDateTime { date, time } => {
                write!(f, "Unreadable start date/time '{}' '{}'", date, time)
            }
            HeaderAnomaly::MissingRecordCount(n) => {
                write!(f, "Missing or non-positive record count ({})", n)
            }
            HeaderAnomaly::InvalidRecordDuration(d) => {
                write!(f, "Missing or non-positive record duration ({} s)", d)
            }
            HeaderAnomaly::MalformedNumber { field, channel, raw } => {
                write!(f, "Malformed {} for channel {}: '{}'", field, channel, raw)
            }
            HeaderAnomaly::DuplicateLabel(label) => write!(f, "Duplicate channel label '{}'", label),
            HeaderAnomaly::SuspiciousLabel { channel, label } => {
                write!(f, "Suspicious label '{}' on channel {}", label, channel)
            }
            HeaderAnomaly::InconsistentSamplesPerRecord(values) => {
                write!(f, "Samples per record differ across channels: {:?}", values)
            }
        }
    }
}

/// Parsed source recording header
///
/// Per-channel data is stored as parallel vectors, all of length
/// `channel_count`. The structure is never written back out.
#[derive(Debug, Clone)]
pub struct SourceHeader {
    pub path: Option<PathBuf>,
    pub version: String,
    pub patient: String,
    pub recording: String,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub declared_header_bytes: Option<i64>,
    pub reserved: String,
    pub channel_count: usize,
    /// 数据记录数，缺失时为 -1
    pub record_count: i64,
    pub record_duration_s: f64,

    pub labels: Vec<String>,
    pub transducers: Vec<String>,
    pub physical_units: Vec<String>,
    pub physical_min: Vec<f64>,
    pub physical_max: Vec<f64>,
    pub digital_min: Vec<i64>,
    pub digital_max: Vec<i64>,
    pub prefilters: Vec<String>,
    pub samples_per_record: Vec<i64>,
    /// `samples_per_record[i] / record_duration_s`, 0 when the duration is unusable
    pub fs_per_channel: Vec<f64>,

    pub anomalies: Vec<HeaderAnomaly>,
}

impl SourceHeader {
    /// Representative sampling rate and whether every channel agrees on it.
    ///
    /// Only signal channels vote; an `EDF Annotations` channel has its own
    /// record length and never counts as disagreement. With disagreement the
    /// most frequent rate wins; ties go to the rate seen first.
    ///
    /// ```rust
    /// # let dir = tempfile::tempdir().unwrap();
    /// # let path = dir.path().join("scenario.edf");
    /// # wineeg::fixtures::EdfBuilder::standard_montage(10).write(&path).unwrap();
    /// let header = wineeg::HeaderReader::open(&path)?;
    /// assert_eq!(header.common_fs(), (250.0, true));
    /// # Ok::<(), wineeg::ConvertError>(())
    /// ```
    pub fn common_fs(&self) -> (f64, bool) {
        let mut counts: Vec<(u64, usize)> = Vec::new();
        for channel in self.signal_channels() {
            let Some(fs) = self.fs_per_channel.get(channel) else {
                continue;
            };
            let bits = fs.to_bits();
            match counts.iter_mut().find(|(b, _)| *b == bits) {
                Some((_, n)) => *n += 1,
                None => counts.push((bits, 1)),
            }
        }

        match counts.len() {
            0 => return (0.0, false),
            1 => return (f64::from_bits(counts[0].0), true),
            _ => {}
        }

        let mut best: Option<(u64, usize)> = None;
        for &(bits, n) in &counts {
            if best.map_or(true, |(_, m)| n > m) {
                best = Some((bits, n));
            }
        }
        (best.map_or(0.0, |(bits, _)| f64::from_bits(bits)), false)
    }

    /// `record_count * samples_per_record[i]` for each channel
    pub fn total_samples_per_channel(&self) -> Vec<u64> {
        let records = self.record_count.max(0) as u64;
        self.samples_per_record
            .iter()
            .map(|&spr| records * spr.max(0) as u64)
            .collect()
    }

    /// Recording length in seconds, 0 when either count is missing.
    pub fn duration_s(&self) -> f64 {
        if self.record_count <= 0 || self.record_duration_s <= 0.0 {
            return 0.0;
        }
        self.record_count as f64 * self.record_duration_s
    }

    /// Full on-disk header length: preamble plus one 256-byte block per channel.
    pub fn header_len(&self) -> usize {
        (self.channel_count + 1) * 256
    }

    pub fn is_annotation_channel(&self, channel: usize) -> bool {
        self.labels
            .get(channel)
            .map_or(false, |l| l.as_str() == ANNOTATION_LABEL)
    }

    /// Indices of channels that carry samples rather than annotations.
    pub fn signal_channels(&self) -> Vec<usize> {
        (0..self.channel_count)
            .filter(|&i| !self.is_annotation_channel(i))
            .collect()
    }

    /// 计算物理值转换参数 (gain, offset)，使 `physical = gain * (offset + digital)`
    pub fn physical_scale(&self, channel: usize) -> Option<(f64, f64)> {
        let pmin = *self.physical_min.get(channel)?;
        let pmax = *self.physical_max.get(channel)?;
        let dmin = *self.digital_min.get(channel)?;
        let dmax = *self.digital_max.get(channel)?;
        if !(pmin.is_finite() && pmax.is_finite()) || pmin == pmax || dmin == dmax {
            return None;
        }
        let gain = (pmax - pmin) / (dmax - dmin) as f64;
        let offset = pmax / gain - dmax as f64;
        Some((gain, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_rates(rates: &[f64]) -> SourceHeader {
        let n = rates.len();
        SourceHeader {
            path: None,
            version: "0".into(),
            patient: "P".into(),
            recording: "R".into(),
            start_date: None,
            start_time: None,
            declared_header_bytes: Some(((n + 1) * 256) as i64),
            reserved: String::new(),
            channel_count: n,
            record_count: 10,
            record_duration_s: 1.0,
            labels: (0..n).map(|i| format!("C{}", i)).collect(),
            transducers: vec![String::new(); n],
            physical_units: vec!["uV".into(); n],
            physical_min: vec![-3276.8; n],
            physical_max: vec![3276.7; n],
            digital_min: vec![-32768; n],
            digital_max: vec![32767; n],
            prefilters: vec![String::new(); n],
            samples_per_record: rates.iter().map(|r| *r as i64).collect(),
            fs_per_channel: rates.to_vec(),
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn test_common_fs_agreement() {
        let header = header_with_rates(&[250.0; 19]);
        assert_eq!(header.common_fs(), (250.0, true));
    }

    #[test]
    fn test_common_fs_mode() {
        let header = header_with_rates(&[256.0, 250.0, 250.0, 500.0, 250.0]);
        assert_eq!(header.common_fs(), (250.0, false));
    }

    #[test]
    fn test_common_fs_tie_prefers_first_seen() {
        let header = header_with_rates(&[500.0, 250.0, 250.0, 500.0]);
        assert_eq!(header.common_fs(), (500.0, false));
    }

    #[test]
    fn test_common_fs_ignores_annotation_channel() {
        let mut header = header_with_rates(&[250.0, 250.0, 250.0, 60.0]);
        header.labels[3] = ANNOTATION_LABEL.to_string();
        assert_eq!(header.signal_channels(), vec![0, 1, 2]);
        assert_eq!(header.common_fs(), (250.0, true));

        header.labels = vec![ANNOTATION_LABEL.to_string(); 4];
        assert_eq!(header.common_fs(), (0.0, false));
    }

    #[test]
    fn test_physical_scale() {
        let header = header_with_rates(&[250.0]);
        let (gain, offset) = header.physical_scale(0).unwrap();
        let physical = gain * (offset + 16384.0);
        assert!((physical - 1638.4).abs() < 0.1);
    }

    #[test]
    fn test_totals_and_duration() {
        let mut header = header_with_rates(&[250.0, 250.0]);
        assert_eq!(header.total_samples_per_channel(), vec![2500, 2500]);
        assert_eq!(header.duration_s(), 10.0);
        header.record_count = -1;
        assert_eq!(header.total_samples_per_channel(), vec![0, 0]);
        assert_eq!(header.duration_s(), 0.0);
    }
}
