use std::path::{Path, PathBuf};

use crate::brainvision::{BrainVisionExport, MarkerFile};
use crate::compositor::{Composition, FrameCompositor};
use crate::config::ConverterConfig;
use crate::error::{ConvertError, Result, Step};
use crate::events::{Event, EventSink, Level};
use crate::legacy_sidecars::LegacySidecars;
use crate::reader::HeaderReader;
use crate::scaling::ScaleStats;
use crate::toolkit::SignalToolkit;
use crate::types::SourceHeader;
use crate::validate::{CrossValidator, LegacyArtifact, ValidationInputs, ValidationReport};

/// Everything one conversion produced
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub output: PathBuf,
    pub header: SourceHeader,
    pub composition: Composition,
    pub scale_stats: ScaleStats,
    pub brainvision: Option<BrainVisionExport>,
    /// `.erd` / `.evt` pair when enabled
    pub legacy_sidecars: Option<LegacySidecars>,
    pub report: ValidationReport,
    /// Text and JSON report paths when reports were written
    pub report_files: Option<(PathBuf, PathBuf)>,
}

/// Source recording → legacy artifact, end to end
///
/// Runs header reading, decoding, scaling, composition, the optional
/// sidecar exports and cross-validation in that order. The legacy
/// artifact is composed fully in memory before anything is written, and the
/// validator always re-checks it on disk against the template it came from.
///
/// # Examples
///
/// ```rust
/// use wineeg::{Converter, ConverterConfig, MemorySink, NativeEdfToolkit};
///
/// # let dir = tempfile::tempdir().unwrap();
/// # let source = dir.path().join("rec.edf");
/// # wineeg::fixtures::EdfBuilder::standard_montage(20).write(&source).unwrap();
/// # let layout = wineeg::FrameLayout::legacy();
/// let mut config = ConverterConfig::default();
/// config.compositor.template_dir = dir.path().to_path_buf();
/// # wineeg::fixtures::write_template(config.templates().short, &layout, 8000).unwrap();
///
/// let sink = MemorySink::new();
/// let toolkit = NativeEdfToolkit;
/// let converter = Converter::new(&config, &toolkit, &sink);
/// let result = converter.convert(&source, dir.path().join("rec.EEG"))?;
///
/// println!("confidence {:.3}", result.report.summary.confidence);
/// # Ok::<(), wineeg::ConvertError>(())
/// ```
pub struct Converter<'a> {
    config: &'a ConverterConfig,
    toolkit: &'a dyn SignalToolkit,
    sink: &'a dyn EventSink,
}

impl<'a> Converter<'a> {
    pub fn new(config: &'a ConverterConfig, toolkit: &'a dyn SignalToolkit, sink: &'a dyn EventSink) -> Self {
        Converter { config, toolkit, sink }
    }

    pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, output: Q) -> Result<ConversionResult> {
        let result = self.run(source.as_ref(), output.as_ref());
        if let Err(e) = &result {
            let step = e.step().unwrap_or(match e {
                ConvertError::FileNotFound(_) => Step::ReadHeader,
                ConvertError::Config(_) => Step::Analyze,
                _ => Step::Write,
            });
            self.sink.emit(Event::new(Level::Error, step, e.to_string()));
        }
        result
    }

    fn run(&self, source: &Path, output: &Path) -> Result<ConversionResult> {
        self.config.check()?;

        let header = HeaderReader::open(source)?;
        for anomaly in &header.anomalies {
            self.sink.warning(Step::ReadHeader, &anomaly.to_string());
        }
        let (fs, agree) = header.common_fs();
        self.sink.emit(
            Event::new(Level::Info, Step::ReadHeader, "source header read")
                .with("channels", header.channel_count)
                .with("fs", fs)
                .with("fs_agree", agree)
                .with("duration_s", header.duration_s()),
        );

        let recording = self.toolkit.decode(source)?;
        if (recording.sample_rate - self.config.compositor.sample_rate_hz).abs() > self.config.validation.rate_tolerance_hz {
            self.sink.warning(
                Step::Decode,
                &format!(
                    "source rate {} Hz differs from the {} Hz legacy rate; samples are not resampled",
                    recording.sample_rate, self.config.compositor.sample_rate_hz
                ),
            );
        }
        self.sink.emit(
            Event::new(Level::Info, Step::Decode, "samples decoded")
                .with("channels", recording.channel_count())
                .with("frames", recording.frame_count()),
        );

        let (samples, scale_stats) = self.config.scaler().scale(&recording);
        if scale_stats.clipped > 0 {
            self.sink.emit(
                Event::new(Level::Warning, Step::Analyze, "samples clipped to 16-bit range")
                    .with("clipped", scale_stats.clipped)
                    .with("peak_uv", format!("{:.1}", scale_stats.peak_abs_uv)),
            );
        }

        let options = self.config.compositor_options();
        let layout = options.layout;
        let compositor = FrameCompositor::new(options, self.sink);
        let outcome = compositor.compose_to(&samples, recording.channel_count(), output)?;
        let composition = outcome.composition;

        let legacy_sidecars = if self.config.write_legacy_sidecars {
            let written = LegacySidecars::write(
                &outcome.output,
                &composition,
                layout,
                &recording.labels,
                self.config.compositor.sample_rate_hz,
                self.config.scaling.scale_factor,
            )?;
            self.sink.emit(
                Event::new(Level::Info, Step::Export, "legacy description written")
                    .with("erd", written.description.display())
                    .with("evt", written.events.display()),
            );
            Some(written)
        } else {
            None
        };

        let brainvision = if self.config.export_brainvision {
            let export = BrainVisionExport::write(&recording, brainvision_base(output))?;
            self.sink.emit(
                Event::new(Level::Info, Step::Export, "BrainVision export written")
                    .with("header", export.header.display())
                    .with("resolution", export.resolution),
            );
            Some(export)
        } else {
            None
        };

        let signal_quality = match self.toolkit.signal_quality(source) {
            Ok(quality) => quality,
            Err(e) => {
                self.sink.warning(Step::Validate, &format!("signal quality unavailable: {}", e));
                None
            }
        };

        let (markers, marker_error) = match brainvision.as_ref().map(|b| MarkerFile::load(&b.markers)) {
            Some(Ok(markers)) => (Some(markers), None),
            Some(Err(e)) => (None, Some(e.to_string())),
            None => (None, None),
        };

        let mut inputs = ValidationInputs::new(&header);
        inputs.sidecar = brainvision.as_ref().map(|b| &b.sidecar);
        inputs.markers = markers.as_ref();
        inputs.marker_error = marker_error;
        inputs.artifact = brainvision.as_ref().map(|b| b.data.as_path());
        inputs.legacy = Some(LegacyArtifact::new(&outcome.output, layout, &composition));
        inputs.scale_stats = Some(scale_stats);
        inputs.signal_quality = signal_quality;
        inputs.advisories = composition.advisories.iter().map(ToString::to_string).collect();
        let mut report = CrossValidator::new(self.config.validation.clone()).validate(inputs);
        if let Some(export) = &brainvision {
            report.sidecar_path = Some(export.header.clone());
        }
        self.sink.emit(
            Event::new(Level::Info, Step::Validate, "validation complete")
                .with("confidence", report.summary.confidence)
                .with("assessment", report.summary.assessment),
        );

        let report_files = if self.config.write_reports {
            let dir = output.parent().unwrap_or_else(|| Path::new("."));
            let stem = output
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| ConvertError::Config(format!("output {} has no file name", output.display())))?;
            Some(report.write_reports(dir, &stem)?)
        } else {
            None
        };

        Ok(ConversionResult {
            output: outcome.output,
            header,
            composition,
            scale_stats,
            brainvision,
            legacy_sidecars,
            report,
            report_files,
        })
    }
}

/// `<dir>/<stem>_brainvision`, so the raw `.eeg` export never collides with a
/// legacy artifact that uses the same extension.
fn brainvision_base(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    output.with_file_name(format!("{}_brainvision", stem))
}
