//! Sample decoding behind a narrow capability interface.
//!
//! The compositor and validator only ever see a [`DecodedRecording`]. Where
//! it comes from is up to the [`SignalToolkit`] a host plugs in; the crate
//! ships [`NativeEdfToolkit`], which needs nothing beyond the header reader.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;

use crate::error::{ConvertError, Result};
use crate::reader::HeaderReader;
use crate::types::SourceHeader;

/// Physical samples of every signal channel, in µV
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecording {
    pub labels: Vec<String>,
    pub sample_rate: f64,
    pub channels: Vec<Vec<f64>>,
}

impl DecodedRecording {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames available in every channel.
    pub fn frame_count(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn duration_s(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.frame_count() as f64 / self.sample_rate
        } else {
            0.0
        }
    }

    /// Peak-to-peak amplitude per channel.
    pub fn peak_to_peak(&self) -> Vec<f64> {
        self.channels
            .iter()
            .map(|samples| {
                let (lo, hi) = samples
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                if lo.is_finite() && hi.is_finite() {
                    hi - lo
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Advisory spectral quality summary produced by an external toolkit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalQuality {
    pub sample_rate: f64,
    pub alpha_peak_hz: Option<f64>,
    pub mains_hz: Option<f64>,
    pub blink_polarity_ok: Option<bool>,
    pub notes: Vec<String>,
}

/// Source of decoded samples and optional quality metrics
pub trait SignalToolkit {
    fn decode(&self, path: &Path) -> Result<DecodedRecording>;

    /// Quality metrics for the recording at `path`, `None` when unsupported.
    fn signal_quality(&self, _path: &Path) -> Result<Option<SignalQuality>> {
        Ok(None)
    }
}

/// Largest data record the native decoder buffers at once
pub const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;

/// Decodes data records directly from the source file
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEdfToolkit;

impl NativeEdfToolkit {
    /// Decodes the data records following an already parsed `header`
    ///
    /// Annotation channels are skipped. A record cut short by the end of the
    /// file ends decoding; whole records before it are kept.
    ///
    /// # Errors
    ///
    /// * `ConvertError::InvalidSignalRange` - a signal channel has an empty physical or digital range
    /// * `ConvertError::Toolkit` - header too broken to locate records, or a record larger than [`MAX_RECORD_BYTES`]
    pub fn decode_with<R: Read + Seek>(header: &SourceHeader, mut reader: R) -> Result<DecodedRecording> {
        let spr: Vec<usize> = header
            .samples_per_record
            .iter()
            .map(|&n| n.max(0) as usize)
            .collect();
        let samples_per_record = spr.iter().try_fold(0usize, |acc, &n| acc.checked_add(n));
        let record_bytes = match samples_per_record.and_then(|n| n.checked_mul(2)) {
            Some(0) => return Err(ConvertError::Toolkit("data records have zero length".to_string())),
            Some(bytes) if bytes <= MAX_RECORD_BYTES => bytes,
            _ => {
                return Err(ConvertError::Toolkit(format!(
                    "data record of {:?} samples exceeds {} bytes",
                    samples_per_record, MAX_RECORD_BYTES
                )))
            }
        };

        let mut signals = Vec::new();
        for channel in 0..header.channel_count {
            if header.is_annotation_channel(channel) {
                continue;
            }
            let (gain, offset) = header.physical_scale(channel).ok_or_else(|| {
                let kind = if header.digital_min.get(channel) == header.digital_max.get(channel) {
                    "digital"
                } else {
                    "physical"
                };
                ConvertError::InvalidSignalRange {
                    channel,
                    label: header.labels[channel].clone(),
                    kind,
                }
            })?;
            let unit = unit_factor(&header.physical_units[channel]);
            signals.push((channel, gain * unit, offset));
        }

        // 每个记录内按通道顺序排列
        let mut starts = Vec::with_capacity(spr.len());
        let mut at = 0;
        for &n in &spr {
            starts.push(at);
            at += n * 2;
        }

        reader.seek(SeekFrom::Start(header.header_len() as u64))?;
        let mut channels: Vec<Vec<f64>> = vec![Vec::new(); signals.len()];
        let mut record = vec![0u8; record_bytes];
        let limit = if header.record_count > 0 {
            header.record_count as usize
        } else {
            usize::MAX
        };

        let mut decoded = 0;
        while decoded < limit {
            match reader.read_exact(&mut record) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            for (slot, &(channel, gain, offset)) in signals.iter().enumerate() {
                let start = starts[channel];
                let bytes = &record[start..start + spr[channel] * 2];
                channels[slot].extend(
                    bytes
                        .chunks_exact(2)
                        .map(|b| gain * (offset + i16::from_le_bytes([b[0], b[1]]) as f64)),
                );
            }
            decoded += 1;
        }

        let (sample_rate, _) = header.common_fs();
        Ok(DecodedRecording {
            labels: signals.iter().map(|&(c, _, _)| header.labels[c].clone()).collect(),
            sample_rate,
            channels,
        })
    }
}

impl SignalToolkit for NativeEdfToolkit {
    fn decode(&self, path: &Path) -> Result<DecodedRecording> {
        let header = HeaderReader::open(path)?;
        let file = File::open(path)?;
        Self::decode_with(&header, BufReader::new(file))
    }
}

/// Multiplier taking a physical unit to µV; unknown units pass through unchanged.
pub fn unit_factor(unit: &str) -> f64 {
    match unit.trim() {
        "V" | "v" => 1e6,
        "mV" | "mv" => 1e3,
        "uV" | "uv" | "µV" | "μV" => 1.0,
        "nV" | "nv" => 1e-3,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{alpha_wave, EdfBuilder};
    use std::io::Cursor;

    fn decode_bytes(bytes: Vec<u8>) -> Result<DecodedRecording> {
        let header = HeaderReader::read_from(Cursor::new(&bytes))?;
        NativeEdfToolkit::decode_with(&header, Cursor::new(bytes))
    }

    #[test]
    fn test_decode_standard_montage() {
        let recording = decode_bytes(EdfBuilder::standard_montage(4).to_bytes()).unwrap();
        assert_eq!(recording.channel_count(), 19);
        assert_eq!(recording.sample_rate, 250.0);
        assert_eq!(recording.frame_count(), 1000);
        assert_eq!(recording.duration_s(), 4.0);
        assert_eq!(recording.labels[0], "Fp1");

        // 0.1 µV quantisation
        for i in [0usize, 17, 999] {
            let expected = alpha_wave(3, i, 250.0);
            assert!((recording.channels[3][i] - expected).abs() < 0.06);
        }
    }

    #[test]
    fn test_unit_normalisation() {
        let mut builder = EdfBuilder::standard_montage(1);
        builder.physical_unit = "mV".to_string();
        let recording = decode_bytes(builder.to_bytes()).unwrap();
        let expected = alpha_wave(0, 5, 250.0) * 1000.0;
        assert!((recording.channels[0][5] - expected).abs() < 60.0);
        assert_eq!(unit_factor(" V "), 1e6);
        assert_eq!(unit_factor("nV"), 1e-3);
        assert_eq!(unit_factor("counts"), 1.0);
    }

    #[test]
    fn test_annotation_channel_skipped() {
        let mut labels: Vec<String> = (0..3).map(|i| format!("EEG{}", i)).collect();
        labels.push("EDF Annotations".to_string());
        let builder = EdfBuilder::with_labels(labels, 2);
        let recording = decode_bytes(builder.to_bytes()).unwrap();
        assert_eq!(recording.channel_count(), 3);
        assert!(recording.labels.iter().all(|l| l.starts_with("EEG")));
    }

    #[test]
    fn test_flat_range_rejected() {
        let mut builder = EdfBuilder::standard_montage(1);
        builder.raw_physical_max[2] = "-3276.8".to_string();
        let err = decode_bytes(builder.to_bytes()).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSignalRange { channel: 2, kind: "physical", .. }));
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut builder = EdfBuilder::standard_montage(0);
        builder.raw_samples_per_record = vec!["99999999".to_string(); 19];
        let err = decode_bytes(builder.to_bytes()).unwrap_err();
        match err {
            ConvertError::Toolkit(message) => assert!(message.contains("exceeds"), "{}", message),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_edf_plus_record_layout() {
        let recording = decode_bytes(EdfBuilder::edf_plus(2).to_bytes()).unwrap();
        assert_eq!(recording.channel_count(), 19);
        assert_eq!(recording.frame_count(), 500);
        let expected = alpha_wave(18, 260, 250.0);
        assert!((recording.channels[18][260] - expected).abs() < 0.06);
    }

    #[test]
    fn test_short_final_record_is_dropped() {
        let mut bytes = EdfBuilder::standard_montage(3).to_bytes();
        bytes.truncate(bytes.len() - 10);
        let recording = decode_bytes(bytes).unwrap();
        assert_eq!(recording.frame_count(), 500);
    }

    #[test]
    fn test_peak_to_peak() {
        let recording = DecodedRecording {
            labels: vec!["A".into(), "B".into()],
            sample_rate: 250.0,
            channels: vec![vec![-5.0, 3.0, 1.0], vec![]],
        };
        assert_eq!(recording.peak_to_peak(), vec![8.0, 0.0]);
    }
}
