//! `.erd` resource description and `.evt` event list written beside a legacy artifact.
//!
//! Both are plain text. The description tells a reader where the multiplexed
//! payload sits inside the `.EEG` file; the event list marks where spliced
//! source data starts and ends.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::compositor::{write_atomically, Composition};
use crate::error::Result;
use crate::template::FrameLayout;
use crate::utils::sanitize_label;

/// Contents of a `.erd` file
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescription {
    pub data_file: String,
    pub event_file: String,
    pub layout: FrameLayout,
    pub sample_rate: f64,
    /// (label, µV per bit)
    pub channels: Vec<(String, f64)>,
}

impl ResourceDescription {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("[FileInfo]\n");
        let _ = writeln!(out, "DataFile={}", self.data_file);
        let _ = writeln!(out, "EventFile={}", self.event_file);
        out.push_str("FileFormat=EEG\n");
        out.push_str("DataFormat=BINARY\n");
        out.push_str("DataOrientation=MULTIPLEXED\n");
        let _ = writeln!(out, "NumberOfChannels={}", self.layout.channels);
        let _ = writeln!(out, "SamplingRate={:.1}", self.sample_rate);
        out.push_str("BinaryFormat=INT_16\n");
        out.push_str("ByteOrder=LITTLE_ENDIAN\n");
        let _ = writeln!(out, "HeaderBytes={}", self.layout.header_size);
        let _ = writeln!(out, "TrailerBytes={}", self.layout.trailer_size);
        out.push('\n');
        out.push_str("[ChannelInfo]\n");
        for (i, (label, resolution)) in self.channels.iter().enumerate() {
            let _ = writeln!(out, "Ch{}={},{:.6},uV", i + 1, label, resolution);
        }
        out
    }
}

/// One line of a `.evt` file
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyEvent {
    pub time_s: f64,
    pub kind: String,
    pub description: String,
}

pub fn render_events(events: &[LegacyEvent]) -> String {
    let mut out = String::new();
    out.push_str("# WinEEG Event File\n");
    out.push_str("# Created from EDF file by wineeg\n");
    out.push_str("# Format: Time(s) Type Description\n");
    for event in events {
        let _ = writeln!(out, "{:.3} {} {}", event.time_s, event.kind, event.description);
    }
    out
}

/// Paths of the written `.erd` / `.evt` pair
#[derive(Debug, Clone, PartialEq)]
pub struct LegacySidecars {
    pub description: PathBuf,
    pub events: PathBuf,
}

impl LegacySidecars {
    /// Writes `<output>.erd` and `<output>.evt` for a finished composition
    ///
    /// `scale_factor` is the µV → count multiplier used for the payload, so
    /// each channel's resolution is its reciprocal.
    pub fn write(
        output: &Path,
        composition: &Composition,
        layout: FrameLayout,
        labels: &[String],
        sample_rate: f64,
        scale_factor: f64,
    ) -> Result<Self> {
        let description = output.with_extension("erd");
        let events = output.with_extension("evt");
        let name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let resolution = if scale_factor > 0.0 { 1.0 / scale_factor } else { 0.0 };
        let erd = ResourceDescription {
            data_file: name(output),
            event_file: name(&events),
            layout,
            sample_rate,
            channels: labels.iter().map(|l| (sanitize_label(l), resolution)).collect(),
        };

        let seconds = |frame: usize| if sample_rate > 0.0 { frame as f64 / sample_rate } else { 0.0 };
        let window = composition.window;
        let evt = [
            LegacyEvent {
                time_s: seconds(window.start),
                kind: "START".to_string(),
                description: "Recording_Start".to_string(),
            },
            LegacyEvent {
                time_s: seconds(window.end),
                kind: "END".to_string(),
                description: "Recording_End".to_string(),
            },
        ];

        write_atomically(&description, erd.render().as_bytes())?;
        write_atomically(&events, render_events(&evt).as_bytes())?;
        Ok(LegacySidecars { description, events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_description() {
        let erd = ResourceDescription {
            data_file: "rec.EEG".to_string(),
            event_file: "rec.evt".to_string(),
            layout: FrameLayout::legacy(),
            sample_rate: 250.0,
            channels: vec![("Fp1".to_string(), 0.05), ("EEGT3-REF".to_string(), 0.05)],
        };
        let text = erd.render();
        assert!(text.starts_with("[FileInfo]\nDataFile=rec.EEG\nEventFile=rec.evt\n"));
        assert!(text.contains("NumberOfChannels=19\n"));
        assert!(text.contains("SamplingRate=250.0\n"));
        assert!(text.contains("HeaderBytes=1024\nTrailerBytes=34\n"));
        assert!(text.ends_with("Ch1=Fp1,0.050000,uV\nCh2=EEGT3-REF,0.050000,uV\n"));
    }

    #[test]
    fn test_render_events() {
        let text = render_events(&[LegacyEvent {
            time_s: 5.0,
            kind: "START".to_string(),
            description: "Recording_Start".to_string(),
        }]);
        assert_eq!(text.lines().count(), 4);
        assert!(text.ends_with("5.000 START Recording_Start\n"));
    }
}
