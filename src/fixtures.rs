// Internal helpers that build deterministic inputs for tests and doctests.
// Nothing here is part of the conversion path.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::template::FrameLayout;
use crate::types::ANNOTATION_LABEL;
use crate::validate::STANDARD_MONTAGE;

/// Deterministic EEG-like waveform in µV: a 10 Hz rhythm with a per-channel phase.
pub fn alpha_wave(channel: usize, sample: usize, fs: f64) -> f64 {
    let t = sample as f64 / fs;
    40.0 * (2.0 * std::f64::consts::PI * 10.0 * t + channel as f64 * 0.3).sin()
}

/// Builds source recordings byte by byte
///
/// Numeric per-channel fields are kept as raw strings so tests can corrupt
/// individual entries.
#[derive(Debug, Clone)]
pub struct EdfBuilder {
    pub version: String,
    pub patient: String,
    pub recording: String,
    pub start_date: String,
    pub start_time: String,
    /// 保留字段，EDF+ 文件写入 "EDF+C"
    pub reserved: String,
    pub record_count: i64,
    pub record_duration: String,
    pub labels: Vec<String>,
    pub transducer: String,
    pub physical_unit: String,
    pub raw_physical_min: Vec<String>,
    pub raw_physical_max: Vec<String>,
    pub digital_min: i64,
    pub digital_max: i64,
    pub prefilter: String,
    pub raw_samples_per_record: Vec<String>,
    pub waveform: fn(usize, usize, f64) -> f64,
}

impl EdfBuilder {
    /// 19-channel 10-20 montage at 250 Hz with one-second records.
    pub fn standard_montage(record_count: i64) -> Self {
        let labels: Vec<String> = STANDARD_MONTAGE.iter().map(|l| l.to_string()).collect();
        Self::with_labels(labels, record_count)
    }

    /// Standard montage followed by an `EDF Annotations` channel of 60 samples per record.
    pub fn edf_plus(record_count: i64) -> Self {
        let mut builder = Self::standard_montage(record_count);
        builder.reserved = "EDF+C".to_string();
        builder.labels.push(ANNOTATION_LABEL.to_string());
        builder.raw_physical_min.push("-1".to_string());
        builder.raw_physical_max.push("1".to_string());
        builder.raw_samples_per_record.push("60".to_string());
        builder
    }

    pub fn with_labels(labels: Vec<String>, record_count: i64) -> Self {
        let n = labels.len();
        EdfBuilder {
            version: "0".to_string(),
            patient: "DOC001 M 01-JAN-1990 Test_Patient".to_string(),
            recording: "Startdate 01-JAN-2024 EEG01 Tech Amp19".to_string(),
            start_date: "01.01.24".to_string(),
            start_time: "10.30.00".to_string(),
            reserved: String::new(),
            record_count,
            record_duration: "1".to_string(),
            labels,
            transducer: "AgAgCl cup electrodes".to_string(),
            physical_unit: "uV".to_string(),
            raw_physical_min: vec!["-3276.8".to_string(); n],
            raw_physical_max: vec!["3276.7".to_string(); n],
            digital_min: -32768,
            digital_max: 32767,
            prefilter: "HP:0.5Hz LP:70Hz".to_string(),
            raw_samples_per_record: vec!["250".to_string(); n],
            waveform: alpha_wave,
        }
    }

    fn spr(&self, channel: usize) -> usize {
        self.raw_samples_per_record[channel].trim().parse().unwrap_or(0)
    }

    /// Header followed by `record_count` data records.
    pub fn to_bytes(&self) -> Vec<u8> {
        let ns = self.labels.len();
        let mut out = vec![b' '; 256];

        put(&mut out[0..8], &self.version);
        put(&mut out[8..88], &self.patient);
        put(&mut out[88..168], &self.recording);
        put(&mut out[168..176], &self.start_date);
        put(&mut out[176..184], &self.start_time);
        put(&mut out[184..192], &format!("{:<8}", (ns + 1) * 256));
        put(&mut out[192..236], &self.reserved);
        put(&mut out[236..244], &format!("{:<8}", self.record_count));
        put(&mut out[244..252], &self.record_duration);
        put(&mut out[252..256], &format!("{:<4}", ns));

        let mut fields = vec![b' '; ns * 256];
        let mut offset = 0;
        let mut block = |width: usize, value: &dyn Fn(usize) -> String| {
            for i in 0..ns {
                let start = offset + i * width;
                put(&mut fields[start..start + width], &value(i));
            }
            offset += width * ns;
        };
        block(16, &|i| self.labels[i].clone());
        block(80, &|_| self.transducer.clone());
        block(8, &|_| self.physical_unit.clone());
        block(8, &|i| self.raw_physical_min[i].clone());
        block(8, &|i| self.raw_physical_max[i].clone());
        block(8, &|_| self.digital_min.to_string());
        block(8, &|_| self.digital_max.to_string());
        block(80, &|_| self.prefilter.clone());
        block(8, &|i| self.raw_samples_per_record[i].clone());
        out.extend_from_slice(&fields);

        let duration: f64 = self.record_duration.trim().parse().unwrap_or(1.0);
        for record in 0..self.record_count.max(0) as usize {
            for channel in 0..ns {
                let spr = self.spr(channel);
                let pmin: f64 = self.raw_physical_min[channel].trim().parse().unwrap_or(-3276.8);
                let pmax: f64 = self.raw_physical_max[channel].trim().parse().unwrap_or(3276.7);
                let gain = (pmax - pmin) / (self.digital_max - self.digital_min) as f64;
                let offset = pmax / gain - self.digital_max as f64;
                let fs = spr as f64 / duration;
                for i in 0..spr {
                    let physical = (self.waveform)(channel, record * spr + i, fs);
                    let digital = (physical / gain - offset).round();
                    let digital = digital.clamp(self.digital_min as f64, self.digital_max as f64);
                    out.extend_from_slice(&(digital as i16).to_le_bytes());
                }
            }
        }
        out
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }
}

fn put(dst: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
}

/// Template header byte at `offset`
pub fn template_header_byte(offset: usize) -> u8 {
    (offset % 251) as u8 ^ 0x5A
}

/// Template sample for `frame`/`channel`; marker columns carry their own pattern.
pub fn template_sample(frame: usize, channel: usize, channels: usize) -> i16 {
    if channel == 0 || channel + 1 == channels {
        (7000 + (frame % 13) as i32 * 100 + channel as i32) as i16
    } else {
        ((frame * channels + channel) % 2000) as i16 - 1000
    }
}

/// Trailer byte at `offset`
pub fn template_trailer_byte(offset: usize) -> u8 {
    0xA0 | (offset % 16) as u8
}

/// Synthetic legacy template holding `frames` frames.
pub fn synthetic_template(layout: &FrameLayout, frames: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(layout.header_size + frames * layout.frame_size() + layout.trailer_size);
    out.extend((0..layout.header_size).map(template_header_byte));
    for frame in 0..frames {
        for channel in 0..layout.channels {
            out.extend_from_slice(&template_sample(frame, channel, layout.channels).to_le_bytes());
        }
    }
    out.extend((0..layout.trailer_size).map(template_trailer_byte));
    out
}

/// Writes a synthetic template of `frames` frames to `path`.
pub fn write_template<P: AsRef<Path>>(path: P, layout: &FrameLayout, frames: usize) -> Result<()> {
    fs::write(path, synthetic_template(layout, frames))?;
    Ok(())
}
