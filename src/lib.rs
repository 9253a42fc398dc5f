//! # WinEEG conversion library
//!
//! Converts EDF recordings into the legacy WinEEG `.EEG` container and
//! cross-validates what was produced against the source.
//!
//! The legacy container is never written from scratch. A template recorded by
//! the legacy system provides the header, the trailer and the lead-in and
//! lead-out frames; converted samples are spliced into the frames between them
//! and a handful of header bytes are patched at fixed offsets.
//!
//! ## Quick Start
//!
//! ### Reading a source header
//!
//! ```rust
//! use wineeg::{HeaderReader, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir().unwrap();
//!     # let path = dir.path().join("recording.edf");
//!     # wineeg::fixtures::EdfBuilder::standard_montage(30).write(&path)?;
//!     let header = HeaderReader::open(&path)?;
//!
//!     let (fs, all_agree) = header.common_fs();
//!     println!("Channels: {}", header.channel_count);
//!     println!("Rate: {} Hz (uniform: {})", fs, all_agree);
//!     println!("Duration: {:.1} s", header.duration_s());
//!
//!     for anomaly in &header.anomalies {
//!         println!("warning: {}", anomaly);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Converting a recording
//!
//! ```rust
//! use wineeg::{Converter, ConverterConfig, LogSink, NativeEdfToolkit, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir().unwrap();
//!     # let source = dir.path().join("recording.edf");
//!     # wineeg::fixtures::EdfBuilder::standard_montage(10).write(&source)?;
//!     let mut config = ConverterConfig::default();
//!     config.compositor.template_dir = dir.path().to_path_buf();
//!     config.export_brainvision = true;
//!     # wineeg::fixtures::write_template(config.templates().short, &wineeg::FrameLayout::legacy(), 4000)?;
//!
//!     let converter = Converter::new(&config, &NativeEdfToolkit, &LogSink);
//!     let result = converter.convert(&source, dir.path().join("recording.EEG"))?;
//!
//!     println!("Spliced {} frames", result.composition.window.frames_to_splice);
//!     println!("Confidence: {:.1}% ({})",
//!         result.report.summary.confidence * 100.0,
//!         result.report.summary.assessment);
//!     Ok(())
//! }
//! ```
//!
//! ### Validating existing outputs
//!
//! ```rust,no_run
//! use wineeg::CrossValidator;
//! use std::path::Path;
//!
//! let report = CrossValidator::default().validate_paths(
//!     Path::new("recording.edf"),
//!     Some(Path::new("recording_brainvision.vhdr")),
//!     Some(Path::new("recording_brainvision.eeg")),
//! )?;
//! report.write_reports(".", "recording")?;
//! # Ok::<(), wineeg::ConvertError>(())
//! ```
//!
//! ## Legacy container layout
//!
//! | Region  | Size                | Content                                   |
//! |---------|---------------------|-------------------------------------------|
//! | Header  | 1024 bytes          | identity slots, per-channel calibration   |
//! | Payload | `frames * 38` bytes | 19 channels of little-endian `i16`        |
//! | Trailer | 34 bytes            | copied verbatim from the template         |
//!
//! Channels 0 and 18 are event markers. Their calibration bytes and sample
//! columns always keep the template's values.

pub mod brainvision;
pub mod calibration;
pub mod compositor;
pub mod config;
pub mod convert;
pub mod error;
pub mod events;
pub mod legacy_sidecars;
pub mod reader;
pub mod report;
pub mod scaling;
pub mod template;
pub mod toolkit;
pub mod types;
pub mod utils;
pub mod validate;

#[doc(hidden)]
pub mod fixtures; // For internal doctest support

// Re-export main types for convenience
pub use brainvision::{BrainVisionExport, Marker, MarkerFile, SidecarChannel, SidecarHeader};
pub use compositor::{Advisory, Composition, CompositionOutcome, CompositorOptions, ConversionWindow, FrameCompositor};
pub use config::ConverterConfig;
pub use convert::{ConversionResult, Converter};
pub use error::{ConvertError, Result, Step};
pub use events::{Event, EventSink, Level, LogSink, MemorySink, NullSink};
pub use legacy_sidecars::{LegacySidecars, ResourceDescription};
pub use reader::HeaderReader;
pub use scaling::{SampleScaler, ScaleStats};
pub use template::{FrameLayout, LegacyTemplate, TemplateSelection, TemplateSet, TemplateVariant};
pub use toolkit::{DecodedRecording, NativeEdfToolkit, SignalQuality, SignalToolkit};
pub use types::{HeaderAnomaly, SourceHeader};
pub use validate::{
    Assessment, Check, CheckValue, CrossValidator, LegacyArtifact, ValidationConfig, ValidationInputs, ValidationReport,
};

// Important constants
pub const EEG_CHANNELS: usize = 19;
pub const BYTES_PER_SAMPLE: usize = 2;
pub const EEG_SAMPLE_RATE_HZ: f64 = 250.0;
/// Upper bound on the channel count a source header may declare
pub const MAX_CHANNELS: usize = 512;

/// Library version
///
/// ```rust
/// let version = wineeg::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_legacy_frame_size() {
        assert_eq!(FrameLayout::legacy().frame_size(), EEG_CHANNELS * BYTES_PER_SAMPLE);
    }
}
