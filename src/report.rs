use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::compositor::write_atomically;
use crate::error::Result;
use crate::validate::{Check, ValidationReport};

pub const TEXT_REPORT_SUFFIX: &str = "__validation_report.txt";
pub const JSON_REPORT_SUFFIX: &str = "__validation_report.json";

impl ValidationReport {
    /// Human-readable rendering, one section per concern.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let meta = &self.summary.metadata;

        out.push_str("# EEG Conversion Validation Report\n\n");
        let _ = writeln!(out, "Generated: {}", self.timestamp);
        if let Some(path) = &self.source_path {
            let _ = writeln!(out, "Source:    {}", path.display());
        }
        if let Some(path) = &self.sidecar_path {
            let _ = writeln!(out, "Sidecar:   {}", path.display());
        }
        if let Some(path) = &self.marker_path {
            let _ = writeln!(out, "Markers:   {}", path.display());
        }
        if let Some(path) = &self.artifact_path {
            let _ = writeln!(out, "Artifact:  {}", path.display());
        }
        if let Some(path) = &self.legacy_path {
            let _ = writeln!(out, "Legacy:    {}", path.display());
        }

        out.push_str("\n## Summary\n\n");
        let _ = writeln!(
            out,
            "Confidence: {:.1}% ({})",
            self.summary.confidence * 100.0,
            self.summary.assessment
        );
        let _ = writeln!(
            out,
            "Checks passed: {}/{}",
            self.summary.checks_passed, self.summary.checks_total
        );
        if self.summary.clinical_total > 0 {
            let _ = writeln!(
                out,
                "Clinical plausibility: {}/{}",
                self.summary.clinical_passed, self.summary.clinical_total
            );
        }
        let agreement = if meta.source_fs_channels_equal { "all channels" } else { "mode" };
        let _ = writeln!(out, "Source rate: {} Hz ({})", meta.source_fs, agreement);
        let _ = writeln!(out, "Source channels: {}", meta.source_channels);
        let _ = writeln!(out, "Source duration: {:.1} s", meta.source_duration_s);
        if let Some(fs) = meta.sidecar_fs {
            let _ = writeln!(out, "Sidecar rate: {} Hz", fs);
        }
        if let Some(count) = meta.marker_count {
            let _ = writeln!(out, "Markers: {}", count);
        }
        if let Some(bytes) = meta.artifact_bytes {
            let _ = writeln!(out, "Artifact size: {} bytes", bytes);
        }
        if let Some(bytes) = meta.legacy_bytes {
            let _ = writeln!(out, "Legacy size: {} bytes", bytes);
        }

        out.push_str("\n## Cross-Checks\n\n");
        if self.checks.is_empty() {
            out.push_str("(no cross-checks ran)\n");
        }
        for check in &self.checks {
            push_check(&mut out, check);
        }
        if !self.clinical.is_empty() {
            out.push_str("\n## Clinical Plausibility\n\n");
            for check in &self.clinical {
                push_check(&mut out, check);
            }
        }

        out.push_str("\n## Issues\n\n");
        if self.critical_issues.is_empty() && self.warnings.is_empty() {
            out.push_str("None\n");
        }
        for issue in &self.critical_issues {
            let _ = writeln!(out, "- CRITICAL: {}", issue);
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "- WARNING: {}", warning);
        }

        if !self.advice.is_empty() {
            out.push_str("\n## Recommendations\n\n");
            for line in &self.advice {
                let _ = writeln!(out, "- {}", line);
            }
        }

        if let Some(quality) = &self.signal_quality {
            out.push_str("\n## Signal Quality\n\n");
            let _ = writeln!(out, "Rate: {} Hz", quality.sample_rate);
            if let Some(alpha) = quality.alpha_peak_hz {
                let _ = writeln!(out, "Alpha peak: {:.1} Hz", alpha);
            }
            if let Some(mains) = quality.mains_hz {
                let _ = writeln!(out, "Mains: {:.0} Hz", mains);
            }
            if let Some(ok) = quality.blink_polarity_ok {
                let _ = writeln!(out, "Blink polarity: {}", if ok { "ok" } else { "inverted" });
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes `<stem>__validation_report.txt` and `.json` into `dir`
    pub fn write_reports<P: AsRef<Path>>(&self, dir: P, stem: &str) -> Result<(PathBuf, PathBuf)> {
        let text_path = dir.as_ref().join(format!("{}{}", stem, TEXT_REPORT_SUFFIX));
        let json_path = dir.as_ref().join(format!("{}{}", stem, JSON_REPORT_SUFFIX));
        let json = self.to_json()?;
        write_atomically(&text_path, self.to_text().as_bytes())?;
        write_atomically(&json_path, json.as_bytes())?;
        Ok((text_path, json_path))
    }
}

fn push_check(out: &mut String, check: &Check) {
    let mark = if check.pass { "PASS" } else { "FAIL" };
    let _ = writeln!(
        out,
        "- [{}] {}: expected {}, observed {}",
        mark, check.name, check.expected, check.observed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brainvision::SidecarHeader;
    use crate::fixtures::EdfBuilder;
    use crate::reader::HeaderReader;
    use crate::validate::{CrossValidator, ValidationInputs};
    use std::io::Cursor;

    fn report() -> ValidationReport {
        let source = HeaderReader::read_from(Cursor::new(EdfBuilder::standard_montage(60).to_bytes())).unwrap();
        let mut labels = source.labels.clone();
        labels.swap(0, 1);
        let sidecar = SidecarHeader::for_export("rec", &labels, 250.0, 0.1);
        let mut inputs = ValidationInputs::new(&source);
        inputs.sidecar = Some(&sidecar);
        CrossValidator::default().validate(inputs)
    }

    #[test]
    fn test_text_sections() {
        let text = report().to_text();
        assert!(text.contains("## Summary"));
        assert!(text.contains("Confidence: 100.0% (EXCELLENT)"));
        assert!(text.contains("- [PASS] Channel labels set match"));
        assert!(text.contains("## Recommendations"));
        assert!(!text.contains("## Signal Quality"));
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();
        assert_eq!(json["summary"]["assessment"], "EXCELLENT");
        assert_eq!(json["summary"]["metadata"]["source_channels"], 19);
        assert_eq!(json["checks"].as_array().unwrap().len(), 5);
        assert!(json["signal_quality"].is_null());
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let (text, json) = report().write_reports(dir.path(), "rec").unwrap();
        assert!(text.ends_with("rec__validation_report.txt"));
        assert!(json.ends_with("rec__validation_report.json"));
        assert!(std::fs::read_to_string(json).unwrap().contains("\"confidence\""));
    }
}
