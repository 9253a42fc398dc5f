use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ConvertError, Result};
use crate::{BYTES_PER_SAMPLE, EEG_CHANNELS};

/// Byte size of the legacy header
pub const LEGACY_HEADER_SIZE: usize = 1024;

/// Byte size of the legacy trailer
pub const LEGACY_TRAILER_SIZE: usize = 34;

/// Fixed byte geometry of the legacy container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub header_size: usize,
    pub trailer_size: usize,
    pub channels: usize,
    pub bytes_per_sample: usize,
}

impl FrameLayout {
    pub const fn legacy() -> Self {
        FrameLayout {
            header_size: LEGACY_HEADER_SIZE,
            trailer_size: LEGACY_TRAILER_SIZE,
            channels: EEG_CHANNELS,
            bytes_per_sample: BYTES_PER_SAMPLE,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.channels * self.bytes_per_sample
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        FrameLayout::legacy()
    }
}

/// Which of the two template capacities a file provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateVariant {
    /// About 12 minutes of capacity
    Short,
    /// About 30 minutes of capacity
    Extended,
}

impl TemplateVariant {
    pub fn other(&self) -> Self {
        match self {
            TemplateVariant::Short => TemplateVariant::Extended,
            TemplateVariant::Extended => TemplateVariant::Short,
        }
    }
}

impl fmt::Display for TemplateVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateVariant::Short => f.write_str("short-capacity"),
            TemplateVariant::Extended => f.write_str("extended-capacity"),
        }
    }
}

/// Template files available to the compositor
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub short: PathBuf,
    pub extended: PathBuf,
    /// Recordings up to this many minutes prefer the short template
    pub short_capacity_minutes: f64,
}

/// Outcome of template selection
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSelection {
    pub variant: TemplateVariant,
    pub path: PathBuf,
    /// The preferred variant was missing
    pub fallback: bool,
    /// A smaller template than required was chosen
    pub may_truncate: bool,
}

impl TemplateSet {
    pub fn in_dir<P: AsRef<Path>>(dir: P, short_name: &str, extended_name: &str) -> Self {
        TemplateSet {
            short: dir.as_ref().join(short_name),
            extended: dir.as_ref().join(extended_name),
            short_capacity_minutes: 12.0,
        }
    }

    pub fn path(&self, variant: TemplateVariant) -> &Path {
        match variant {
            TemplateVariant::Short => &self.short,
            TemplateVariant::Extended => &self.extended,
        }
    }

    pub fn preferred(&self, duration_minutes: f64) -> TemplateVariant {
        if duration_minutes <= self.short_capacity_minutes {
            TemplateVariant::Short
        } else {
            TemplateVariant::Extended
        }
    }

    /// Picks the template for a recording of `duration_minutes`
    ///
    /// # Errors
    ///
    /// * `ConvertError::TemplateNotFound` - neither file exists
    pub fn select(&self, duration_minutes: f64) -> Result<TemplateSelection> {
        let preferred = self.preferred(duration_minutes);
        if self.path(preferred).is_file() {
            return Ok(TemplateSelection {
                variant: preferred,
                path: self.path(preferred).to_path_buf(),
                fallback: false,
                may_truncate: false,
            });
        }

        let other = preferred.other();
        if self.path(other).is_file() {
            return Ok(TemplateSelection {
                variant: other,
                path: self.path(other).to_path_buf(),
                fallback: true,
                may_truncate: other == TemplateVariant::Short,
            });
        }

        let dir = self
            .short
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Err(ConvertError::TemplateNotFound(dir))
    }
}

/// A legacy artifact split into its three regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTemplate {
    pub layout: FrameLayout,
    pub header: Vec<u8>,
    pub payload: Vec<u8>,
    pub trailer: Vec<u8>,
}

impl LegacyTemplate {
    pub fn load<P: AsRef<Path>>(path: P, layout: FrameLayout) -> Result<Self> {
        let bytes = fs::read(&path).map_err(|source| ConvertError::TemplateRead {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::split(&bytes, layout)
    }

    /// Splits `bytes` into header, payload and trailer
    ///
    /// # Errors
    ///
    /// * `ConvertError::TemplateTooSmall` - shorter than header plus trailer
    /// * `ConvertError::MisalignedPayload` - payload is not a whole number of frames
    pub fn split(bytes: &[u8], layout: FrameLayout) -> Result<Self> {
        let minimum = layout.header_size + layout.trailer_size;
        if bytes.len() < minimum {
            return Err(ConvertError::TemplateTooSmall { len: bytes.len(), minimum });
        }

        let payload_end = bytes.len() - layout.trailer_size;
        let payload = &bytes[layout.header_size..payload_end];
        if payload.len() % layout.frame_size() != 0 {
            return Err(ConvertError::MisalignedPayload {
                payload_len: payload.len(),
                frame_size: layout.frame_size(),
            });
        }

        Ok(LegacyTemplate {
            layout,
            header: bytes[..layout.header_size].to_vec(),
            payload: payload.to_vec(),
            trailer: bytes[payload_end..].to_vec(),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.payload.len() / self.layout.frame_size()
    }

    pub fn total_len(&self) -> usize {
        self.header.len() + self.payload.len() + self.trailer.len()
    }

    /// Payload decoded as little-endian 16-bit samples, frame-major.
    pub fn samples(&self) -> Vec<i16> {
        self.payload
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    /// Duration of the payload at `fs` Hz, in minutes.
    pub fn capacity_minutes(&self, fs: f64) -> f64 {
        if fs <= 0.0 {
            return 0.0;
        }
        self.frame_count() as f64 / fs / 60.0
    }
}
