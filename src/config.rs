//! Converter settings, loadable from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! legacy template family at 250 Hz with the standard scale factor.
//!
//! ```toml
//! export_brainvision = true
//!
//! [compositor]
//! template_dir = "templates"
//! patient_name = "Study 12"
//!
//! [scaling]
//! scale_factor = 20.0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compositor::{CompositorOptions, DEFAULT_HEAD_FRAMES, DEFAULT_TAIL_FRAMES};
use crate::error::{ConvertError, Result};
use crate::scaling::{SampleScaler, DEFAULT_SCALE_FACTOR};
use crate::template::{FrameLayout, TemplateSet};
use crate::validate::ValidationConfig;

pub const SHORT_TEMPLATE_NAME: &str = "LB_EO_EEG.EEG";
pub const EXTENDED_TEMPLATE_NAME: &str = "LB_EO_EEG_EXTENDED_30min.EEG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorSection {
    pub template_dir: PathBuf,
    pub short_template: String,
    pub extended_template: String,
    pub short_capacity_minutes: f64,
    pub head_frames: usize,
    pub tail_frames: usize,
    pub sample_rate_hz: f64,
    pub patient_name: String,
}

impl Default for CompositorSection {
    fn default() -> Self {
        CompositorSection {
            template_dir: PathBuf::from("."),
            short_template: SHORT_TEMPLATE_NAME.to_string(),
            extended_template: EXTENDED_TEMPLATE_NAME.to_string(),
            short_capacity_minutes: 12.0,
            head_frames: DEFAULT_HEAD_FRAMES,
            tail_frames: DEFAULT_TAIL_FRAMES,
            sample_rate_hz: crate::EEG_SAMPLE_RATE_HZ,
            patient_name: "EEG Patient".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingSection {
    /// µV → legacy count multiplier; 10 000 000 for installations calibrated in volts
    pub scale_factor: f64,
}

impl Default for ScalingSection {
    fn default() -> Self {
        ScalingSection {
            scale_factor: DEFAULT_SCALE_FACTOR,
        }
    }
}

/// Top-level converter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Also write a BrainVision triplet next to the legacy artifact
    pub export_brainvision: bool,
    /// Write the `.erd` description and `.evt` event list beside the legacy artifact
    pub write_legacy_sidecars: bool,
    /// Write text and JSON validation reports next to the output
    pub write_reports: bool,
    pub compositor: CompositorSection,
    pub scaling: ScalingSection,
    pub validation: ValidationConfig,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        ConverterConfig {
            export_brainvision: false,
            write_legacy_sidecars: false,
            write_reports: true,
            compositor: CompositorSection::default(),
            scaling: ScalingSection::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl ConverterConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ConverterConfig =
            toml::from_str(text).map_err(|e| ConvertError::Config(format!("Parse TOML failed: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConvertError::Config(format!("Read {} failed: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| ConvertError::Config(format!("Serialize TOML failed: {}", e)))
    }

    /// Rejects values no conversion could run with
    pub fn check(&self) -> Result<()> {
        if !(self.scaling.scale_factor.is_finite() && self.scaling.scale_factor > 0.0) {
            return Err(ConvertError::Config(format!(
                "scale_factor must be positive, got {}",
                self.scaling.scale_factor
            )));
        }
        if !(self.compositor.sample_rate_hz > 0.0) {
            return Err(ConvertError::Config(format!(
                "sample_rate_hz must be positive, got {}",
                self.compositor.sample_rate_hz
            )));
        }
        if self.validation.clip_warning_ratio < 0.0 {
            return Err(ConvertError::Config("clip_warning_ratio must not be negative".to_string()));
        }
        Ok(())
    }

    pub fn templates(&self) -> TemplateSet {
        let mut set = TemplateSet::in_dir(
            &self.compositor.template_dir,
            &self.compositor.short_template,
            &self.compositor.extended_template,
        );
        set.short_capacity_minutes = self.compositor.short_capacity_minutes;
        set
    }

    pub fn compositor_options(&self) -> CompositorOptions {
        CompositorOptions {
            templates: self.templates(),
            layout: FrameLayout::legacy(),
            head_frames: self.compositor.head_frames,
            tail_frames: self.compositor.tail_frames,
            sample_rate_hz: self.compositor.sample_rate_hz,
            patient_name: self.compositor.patient_name.clone(),
            calibration_value: crate::calibration::MAX_SENSITIVITY,
        }
    }

    pub fn scaler(&self) -> SampleScaler {
        SampleScaler::new(self.scaling.scale_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        let config = ConverterConfig::from_toml_str("").unwrap();
        assert_eq!(config, ConverterConfig::default());
        assert_eq!(config.compositor.head_frames, 1250);
        assert_eq!(config.compositor.tail_frames, 250);
        assert_eq!(config.scaling.scale_factor, 20.0);
        assert!(config.validation.clinical_checks);
        assert!(config.templates().short.ends_with("LB_EO_EEG.EEG"));
    }

    #[test]
    fn test_partial_sections() {
        let config = ConverterConfig::from_toml_str(
            r#"
            export_brainvision = true
            write_legacy_sidecars = true

            [compositor]
            template_dir = "/opt/templates"
            patient_name = "Study 12"

            [scaling]
            scale_factor = 10000000.0

            [validation]
            clip_warning_ratio = 0.05
            "#,
        )
        .unwrap();

        assert!(config.export_brainvision);
        assert!(config.write_legacy_sidecars);
        assert!(config.write_reports);
        assert_eq!(config.compositor.patient_name, "Study 12");
        assert_eq!(config.compositor.short_capacity_minutes, 12.0);
        assert_eq!(config.scaler().factor, 10_000_000.0);
        assert_eq!(config.validation.clip_warning_ratio, 0.05);
        assert_eq!(
            config.templates().extended,
            Path::new("/opt/templates").join(EXTENDED_TEMPLATE_NAME)
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = ConverterConfig::from_toml_str("[scaling]\nscale_factor = 0.0\n").unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));
        assert!(ConverterConfig::from_toml_str("[compositor]\nhead_frames = \"many\"\n").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = ConverterConfig::default();
        config.compositor.patient_name = "Round Trip".to_string();
        let text = config.to_toml_string().unwrap();
        assert_eq!(ConverterConfig::from_toml_str(&text).unwrap(), config);
    }
}
