use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::calibration::{marker_channels, patch_calibration, patch_identity, CalibrationChange, MAX_SENSITIVITY};
use crate::error::{ConvertError, Result, Step};
use crate::events::{Event, EventSink, Level};
use crate::template::{FrameLayout, LegacyTemplate, TemplateSelection, TemplateSet, TemplateVariant};

/// Frames of template lead-in kept untouched (5 s at 250 Hz)
pub const DEFAULT_HEAD_FRAMES: usize = 1250;

/// Frames of template lead-out kept untouched (1 s at 250 Hz)
pub const DEFAULT_TAIL_FRAMES: usize = 250;

/// Contiguous frame range of the template payload that receives source data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionWindow {
    pub head_frames: usize,
    pub tail_frames: usize,
    pub usable_frames: usize,
    pub frames_to_splice: usize,
    pub start: usize,
    pub end: usize,
}

impl ConversionWindow {
    /// Window for `source_frames` frames inside a template of `template_frames`.
    ///
    /// A template too short to hold both guard regions yields an empty window.
    ///
    /// ```rust
    /// use wineeg::ConversionWindow;
    ///
    /// let window = ConversionWindow::compute(183_000, 150_000, 1250, 250);
    /// assert_eq!((window.start, window.end), (1250, 151_250));
    /// assert_eq!(window.usable_frames, 181_500);
    /// ```
    pub fn compute(template_frames: usize, source_frames: usize, head_frames: usize, tail_frames: usize) -> Self {
        let usable_frames = template_frames.saturating_sub(head_frames + tail_frames);
        let frames_to_splice = usable_frames.min(source_frames);
        ConversionWindow {
            head_frames,
            tail_frames,
            usable_frames,
            frames_to_splice,
            start: head_frames,
            end: head_frames + frames_to_splice,
        }
    }

    pub fn contains(&self, frame: usize) -> bool {
        frame >= self.start && frame < self.end
    }
}

/// Non-fatal condition raised while composing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    FallbackTemplate {
        wanted: TemplateVariant,
        used: TemplateVariant,
        may_truncate: bool,
    },
    DataTruncated {
        lost_frames: usize,
        lost_seconds: f64,
    },
    PartialFrame {
        dropped_samples: usize,
    },
    EmptyWindow {
        template_frames: usize,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::FallbackTemplate { wanted, used, may_truncate } => {
                write!(f, "{} template not found, using {} template", wanted, used)?;
                if *may_truncate {
                    f.write_str(" (will truncate)")?;
                }
                Ok(())
            }
            Advisory::DataTruncated { lost_frames, lost_seconds } => write!(
                f,
                "Source data truncated: {} frames ({:.1} s, {:.1} min) lost",
                lost_frames,
                lost_seconds,
                lost_seconds / 60.0
            ),
            Advisory::PartialFrame { dropped_samples } => {
                write!(f, "Dropped {} trailing samples that do not fill a frame", dropped_samples)
            }
            Advisory::EmptyWindow { template_frames } => write!(
                f,
                "Template of {} frames leaves no room between its guard regions",
                template_frames
            ),
        }
    }
}

/// Settings for one compositor instance
#[derive(Debug, Clone)]
pub struct CompositorOptions {
    pub templates: TemplateSet,
    pub layout: FrameLayout,
    pub head_frames: usize,
    pub tail_frames: usize,
    pub sample_rate_hz: f64,
    pub patient_name: String,
    pub calibration_value: u8,
}

impl CompositorOptions {
    pub fn new(templates: TemplateSet) -> Self {
        CompositorOptions {
            templates,
            layout: FrameLayout::legacy(),
            head_frames: DEFAULT_HEAD_FRAMES,
            tail_frames: DEFAULT_TAIL_FRAMES,
            sample_rate_hz: crate::EEG_SAMPLE_RATE_HZ,
            patient_name: "EEG Patient".to_string(),
            calibration_value: MAX_SENSITIVITY,
        }
    }
}

/// Fully composed artifact held in memory, not yet written
#[derive(Debug, Clone)]
pub struct Composition {
    pub bytes: Vec<u8>,
    pub selection: TemplateSelection,
    pub template_len: usize,
    pub template_frames: usize,
    pub source_frames: usize,
    pub window: ConversionWindow,
    pub identity_slots: usize,
    pub calibration_changes: Vec<CalibrationChange>,
    pub advisories: Vec<Advisory>,
}

impl Composition {
    /// Seconds into the output where spliced source data begins.
    pub fn data_start_s(&self, fs: f64) -> f64 {
        if fs > 0.0 {
            self.window.start as f64 / fs
        } else {
            0.0
        }
    }
}

/// What was written by [`FrameCompositor::compose_to`]
#[derive(Debug, Clone)]
pub struct CompositionOutcome {
    pub output: PathBuf,
    pub bytes_written: usize,
    pub composition: Composition,
}

/// Splices converted samples into a legacy template at byte-exact offsets
///
/// Each call runs the linear sequence analyze → select template → split →
/// compute window → patch header → splice → reassemble/verify, and
/// [`compose_to`](Self::compose_to) adds the single write at the end. Every
/// fatal failure happens before anything touches the output path.
///
/// # Examples
///
/// ```rust
/// use wineeg::{CompositorOptions, FrameCompositor, FrameLayout, NullSink, TemplateSet};
///
/// # let dir = tempfile::tempdir().unwrap();
/// let templates = TemplateSet::in_dir(dir.path(), "short.EEG", "extended.EEG");
/// # wineeg::fixtures::write_template(&templates.short, &FrameLayout::legacy(), 400).unwrap();
/// let mut options = CompositorOptions::new(templates);
/// options.head_frames = 50;
/// options.tail_frames = 10;
///
/// let sink = NullSink;
/// let compositor = FrameCompositor::new(options, &sink);
/// let samples = vec![123i16; 19 * 100];
/// let outcome = compositor.compose_to(&samples, 19, dir.path().join("out.EEG"))?;
/// assert_eq!(outcome.composition.window.frames_to_splice, 100);
/// # Ok::<(), wineeg::ConvertError>(())
/// ```
pub struct FrameCompositor<'a> {
    options: CompositorOptions,
    sink: &'a dyn EventSink,
}

impl<'a> FrameCompositor<'a> {
    pub fn new(options: CompositorOptions, sink: &'a dyn EventSink) -> Self {
        FrameCompositor { options, sink }
    }

    pub fn options(&self) -> &CompositorOptions {
        &self.options
    }

    /// Builds the output artifact in memory
    ///
    /// `samples` are frame-major 16-bit values for `channel_count` channels.
    ///
    /// # Errors
    ///
    /// * `ConvertError::ChannelCountMismatch` - `channel_count` differs from the template layout
    /// * `ConvertError::TemplateNotFound` / `TemplateRead` - no usable template file
    /// * `ConvertError::TemplateTooSmall` / `MisalignedPayload` - template geometry is wrong
    /// * `ConvertError::SizeMismatch` - reassembled size differs from the template
    pub fn compose(&self, samples: &[i16], channel_count: usize) -> Result<Composition> {
        let layout = self.options.layout;
        let fs = self.options.sample_rate_hz;
        let mut advisories = Vec::new();

        // Analyze
        if channel_count != layout.channels {
            return Err(ConvertError::ChannelCountMismatch {
                expected: layout.channels,
                found: channel_count,
            });
        }
        let source_frames = samples.len() / channel_count;
        let dropped = samples.len() % channel_count;
        if dropped != 0 {
            let advisory = Advisory::PartialFrame { dropped_samples: dropped };
            self.sink.warning(Step::Analyze, &advisory.to_string());
            advisories.push(advisory);
        }
        let duration_minutes = if fs > 0.0 { source_frames as f64 / fs / 60.0 } else { 0.0 };
        self.sink.emit(
            Event::new(Level::Info, Step::Analyze, "source analyzed")
                .with("frames", source_frames)
                .with("minutes", format!("{:.1}", duration_minutes)),
        );

        // SelectTemplate
        let selection = self.options.templates.select(duration_minutes)?;
        if selection.fallback {
            let advisory = Advisory::FallbackTemplate {
                wanted: selection.variant.other(),
                used: selection.variant,
                may_truncate: selection.may_truncate,
            };
            self.sink.warning(Step::SelectTemplate, &advisory.to_string());
            advisories.push(advisory);
        }
        self.sink.emit(
            Event::new(Level::Info, Step::SelectTemplate, "template selected")
                .with("variant", selection.variant)
                .with("path", selection.path.display()),
        );

        // SplitTemplate
        let template = LegacyTemplate::load(&selection.path, layout)?;
        let template_frames = template.frame_count();
        let template_len = template.total_len();
        self.sink.emit(
            Event::new(Level::Info, Step::SplitTemplate, "template split")
                .with("frames", template_frames)
                .with("minutes", format!("{:.1}", template.capacity_minutes(fs))),
        );

        // ComputeWindow
        let window = ConversionWindow::compute(
            template_frames,
            source_frames,
            self.options.head_frames,
            self.options.tail_frames,
        );
        if window.usable_frames == 0 {
            let advisory = Advisory::EmptyWindow { template_frames };
            self.sink.warning(Step::ComputeWindow, &advisory.to_string());
            advisories.push(advisory);
        }
        if window.frames_to_splice < source_frames {
            let lost_frames = source_frames - window.frames_to_splice;
            let lost_seconds = if fs > 0.0 { lost_frames as f64 / fs } else { 0.0 };
            let advisory = Advisory::DataTruncated { lost_frames, lost_seconds };
            self.sink.warning(Step::ComputeWindow, &advisory.to_string());
            advisories.push(advisory);
        }
        self.sink.emit(
            Event::new(Level::Info, Step::ComputeWindow, "replacement window")
                .with("start", window.start)
                .with("end", window.end)
                .with("frames", window.frames_to_splice),
        );

        // PatchHeader
        let mut grid = template.samples();
        let LegacyTemplate { mut header, trailer, .. } = template;
        let identity_slots = patch_identity(&mut header, &self.options.patient_name);
        let calibration_changes = patch_calibration(&mut header, self.options.calibration_value);
        self.sink.emit(
            Event::new(Level::Info, Step::PatchHeader, "header patched")
                .with("identity_slots", identity_slots)
                .with("calibration_bytes", calibration_changes.len()),
        );

        // Splice
        let markers = marker_channels();
        splice_frames(&mut grid, samples, layout.channels, &window, &markers);
        self.sink.emit(
            Event::new(Level::Info, Step::Splice, "frames spliced")
                .with("frames", window.frames_to_splice)
                .with("markers_kept", markers.len()),
        );

        // Reassemble & verify
        let mut bytes = Vec::with_capacity(template_len);
        bytes.extend_from_slice(&header);
        for value in &grid {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(&trailer);
        if bytes.len() != template_len {
            return Err(ConvertError::SizeMismatch {
                expected: template_len,
                found: bytes.len(),
            });
        }
        self.sink.emit(Event::new(Level::Info, Step::Verify, "size verified").with("bytes", bytes.len()));

        Ok(Composition {
            bytes,
            selection,
            template_len,
            template_frames,
            source_frames,
            window,
            identity_slots,
            calibration_changes,
            advisories,
        })
    }

    /// Composes and writes the artifact to `output` in one pass
    ///
    /// The bytes go to a sibling `.part` file that is renamed into place, so
    /// a failed write never leaves a partial artifact under `output`.
    pub fn compose_to<P: AsRef<Path>>(&self, samples: &[i16], channel_count: usize, output: P) -> Result<CompositionOutcome> {
        let composition = self.compose(samples, channel_count)?;
        let output = output.as_ref().to_path_buf();
        write_atomically(&output, &composition.bytes)?;

        self.sink.emit(
            Event::new(Level::Info, Step::Write, "artifact written")
                .with("path", output.display())
                .with("bytes", composition.bytes.len())
                .with("data_start_s", format!("{:.1}", composition.data_start_s(self.options.sample_rate_hz))),
        );

        Ok(CompositionOutcome {
            output,
            bytes_written: composition.bytes.len(),
            composition,
        })
    }
}

/// Overwrites window frames of `grid` with `source`, leaving `markers` columns alone
///
/// Both buffers are frame-major with `channels` values per frame; frame `k`
/// of the window takes frame `k` of the source.
pub fn splice_frames(grid: &mut [i16], source: &[i16], channels: usize, window: &ConversionWindow, markers: &[usize]) {
    let data_channels: Vec<usize> = (0..channels).filter(|c| !markers.contains(c)).collect();
    for (k, frame) in (window.start..window.end).enumerate() {
        let dst = frame * channels;
        let src = k * channels;
        if dst + channels > grid.len() || src + channels > source.len() {
            break;
        }
        for &c in &data_channels {
            grid[dst + c] = source[src + c];
        }
    }
}

pub(crate) fn write_atomically(output: &Path, bytes: &[u8]) -> Result<()> {
    let mut part = output.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let written = fs::write(&part, bytes).and_then(|_| fs::rename(&part, output));
    if let Err(source) = written {
        let _ = fs::remove_file(&part);
        return Err(ConvertError::OutputWrite {
            path: output.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MemorySink, NullSink};
    use crate::fixtures::{template_sample, write_template};

    fn options_in(dir: &Path) -> CompositorOptions {
        let mut options = CompositorOptions::new(TemplateSet::in_dir(dir, "short.EEG", "extended.EEG"));
        options.head_frames = 20;
        options.tail_frames = 5;
        options
    }

    fn ramp(frames: usize) -> Vec<i16> {
        (0..frames * 19).map(|i| -((i % 500) as i16) - 1).collect()
    }

    #[test]
    fn test_window_math() {
        let w = ConversionWindow::compute(1000, 300, 100, 50);
        assert_eq!(w.usable_frames, 850);
        assert_eq!(w.frames_to_splice, 300);
        assert_eq!((w.start, w.end), (100, 400));
        assert!(w.contains(100) && w.contains(399) && !w.contains(400));

        let w = ConversionWindow::compute(1000, 5000, 100, 50);
        assert_eq!(w.frames_to_splice, 850);
        assert_eq!(w.end, 950);

        let w = ConversionWindow::compute(100, 10, 100, 50);
        assert_eq!(w.usable_frames, 0);
        assert_eq!(w.start, w.end);
    }

    #[test]
    fn test_splice_respects_window_and_markers() {
        let channels = 4;
        let mut grid = vec![0i16; 10 * channels];
        let source: Vec<i16> = (1..=(20 * channels) as i16).collect();
        let window = ConversionWindow::compute(10, 20, 2, 3);
        splice_frames(&mut grid, &source, channels, &window, &[0, 3]);

        for frame in 0..10 {
            for c in 0..channels {
                let v = grid[frame * channels + c];
                if window.contains(frame) && c != 0 && c != 3 {
                    let k = frame - window.start;
                    assert_eq!(v, source[k * channels + c]);
                } else {
                    assert_eq!(v, 0);
                }
            }
        }
    }

    #[test]
    fn test_wrong_channel_count_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sink = NullSink;
        let compositor = FrameCompositor::new(options_in(dir.path()), &sink);
        let err = compositor.compose(&[0i16; 40], 20).unwrap_err();
        assert!(matches!(err, ConvertError::ChannelCountMismatch { expected: 19, found: 20 }));
        assert_eq!(err.step(), Some(Step::Analyze));
    }

    #[test]
    fn test_missing_templates_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = NullSink;
        let compositor = FrameCompositor::new(options_in(dir.path()), &sink);
        let out = dir.path().join("out.EEG");
        let err = compositor.compose_to(&ramp(10), 19, &out).unwrap_err();
        assert!(matches!(err, ConvertError::TemplateNotFound(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_compose_preserves_size_and_markers() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(dir.path());
        write_template(&options.templates.short, &options.layout, 200).unwrap();
        let sink = MemorySink::new();
        let compositor = FrameCompositor::new(options, &sink);

        let source = ramp(50);
        let composition = compositor.compose(&source, 19).unwrap();
        assert_eq!(composition.bytes.len(), composition.template_len);
        assert_eq!(composition.window.start, 20);
        assert_eq!(composition.window.end, 70);
        assert!(composition.advisories.is_empty());

        let out = LegacyTemplate::split(&composition.bytes, FrameLayout::legacy()).unwrap();
        let grid = out.samples();
        for frame in 0..200 {
            for c in 0..19 {
                let v = grid[frame * 19 + c];
                if (20..70).contains(&frame) && c != 0 && c != 18 {
                    assert_eq!(v, source[(frame - 20) * 19 + c]);
                } else {
                    assert_eq!(v, template_sample(frame, c, 19));
                }
            }
        }
        assert!(sink.count(Level::Info) >= 5);
    }

    #[test]
    fn test_truncation_and_partial_frame_advisories() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(dir.path());
        write_template(&options.templates.short, &options.layout, 100).unwrap();
        let sink = MemorySink::new();
        let compositor = FrameCompositor::new(options, &sink);

        let mut source = ramp(120);
        source.extend_from_slice(&[1, 2, 3]);
        let composition = compositor.compose(&source, 19).unwrap();

        assert_eq!(composition.window.frames_to_splice, 75);
        assert!(composition.advisories.contains(&Advisory::PartialFrame { dropped_samples: 3 }));
        assert!(composition.advisories.contains(&Advisory::DataTruncated {
            lost_frames: 45,
            lost_seconds: 45.0 / 250.0,
        }));
        assert_eq!(sink.count(Level::Warning), 2);
    }
}
