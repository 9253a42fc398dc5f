use std::collections::HashSet;
use std::fs;
use std::path::Path;

use wineeg::calibration::{patched_offsets, IDENTITY_SLOTS, MAX_SENSITIVITY};
use wineeg::fixtures::{synthetic_template, template_sample, write_template, EdfBuilder};
use wineeg::{
    Advisory, CompositorOptions, ConvertError, FrameCompositor, HeaderReader, LegacyTemplate,
    MemorySink, NullSink, Step, TemplateSet, TemplateVariant,
};

// 10 Hz keeps multi-minute recordings small
const TEST_RATE: f64 = 10.0;

fn options_in(dir: &Path) -> CompositorOptions {
    let mut options = CompositorOptions::new(TemplateSet::in_dir(dir, "short.EEG", "extended.EEG"));
    options.sample_rate_hz = TEST_RATE;
    options.head_frames = 50;
    options.tail_frames = 10;
    options.patient_name = "Integration Patient".to_string();
    options
}

fn minutes_of_frames(minutes: f64) -> usize {
    (minutes * 60.0 * TEST_RATE) as usize
}

fn source_samples(frames: usize) -> Vec<i16> {
    (0..frames * 19).map(|i| ((i * 7) % 20_000) as i16 - 10_000).collect()
}

#[test]
fn test_scenario_uniform_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario_a.edf");
    EdfBuilder::standard_montage(10).write(&path).unwrap();

    let header = HeaderReader::open(&path).unwrap();
    assert_eq!(header.channel_count, 19);
    assert_eq!(header.record_count, 10);
    assert_eq!(header.record_duration_s, 1.0);
    assert_eq!(header.common_fs(), (250.0, true));
    assert_eq!(header.total_samples_per_channel(), vec![2500; 19]);
}

#[test]
fn test_scenario_template_selection() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    let layout = options.layout;
    write_template(&options.templates.short, &layout, minutes_of_frames(12.0)).unwrap();
    write_template(&options.templates.extended, &layout, minutes_of_frames(30.0)).unwrap();

    let sink = NullSink;
    let compositor = FrameCompositor::new(options.clone(), &sink);

    let eight = compositor.compose(&source_samples(minutes_of_frames(8.0)), 19).unwrap();
    assert_eq!(eight.selection.variant, TemplateVariant::Short);
    assert!(eight.advisories.is_empty());

    let twenty = compositor.compose(&source_samples(minutes_of_frames(20.0)), 19).unwrap();
    assert_eq!(twenty.selection.variant, TemplateVariant::Extended);
    assert!(twenty.advisories.is_empty());

    fs::remove_file(&options.templates.extended).unwrap();
    let sink = MemorySink::new();
    let compositor = FrameCompositor::new(options, &sink);
    let fallback = compositor.compose(&source_samples(minutes_of_frames(20.0)), 19).unwrap();

    assert_eq!(fallback.selection.variant, TemplateVariant::Short);
    assert!(fallback.selection.may_truncate);
    assert!(fallback.advisories.contains(&Advisory::FallbackTemplate {
        wanted: TemplateVariant::Extended,
        used: TemplateVariant::Short,
        may_truncate: true,
    }));
    let lost = fallback
        .advisories
        .iter()
        .find_map(|a| match a {
            Advisory::DataTruncated { lost_frames, .. } => Some(*lost_frames),
            _ => None,
        })
        .unwrap();
    assert_eq!(lost, minutes_of_frames(20.0) - (minutes_of_frames(12.0) - 60));
    assert_eq!(sink.count(wineeg::Level::Warning), 2);
}

#[test]
fn test_header_and_trailer_survive_outside_patches() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    let layout = options.layout;
    write_template(&options.templates.short, &layout, 500).unwrap();
    let original = LegacyTemplate::split(&synthetic_template(&layout, 500), layout).unwrap();

    let sink = NullSink;
    let compositor = FrameCompositor::new(options, &sink);
    let outcome = compositor
        .compose_to(&source_samples(300), 19, dir.path().join("out.EEG"))
        .unwrap();

    let written = fs::read(&outcome.output).unwrap();
    assert_eq!(written.len(), original.total_len());
    let composed = LegacyTemplate::split(&written, layout).unwrap();

    let patched: HashSet<usize> = patched_offsets().into_iter().collect();
    for (offset, (&before, &after)) in original.header.iter().zip(&composed.header).enumerate() {
        if !patched.contains(&offset) {
            assert_eq!(before, after, "header byte 0x{:04X} changed", offset);
        }
    }
    assert_eq!(composed.trailer, original.trailer);

    for offset in 0x0327..=0x0337 {
        assert_eq!(composed.header[offset], MAX_SENSITIVITY);
    }
    assert_eq!(composed.header[0x0326], original.header[0x0326]);
    assert_eq!(composed.header[0x0338], original.header[0x0338]);
    for &(offset, len) in IDENTITY_SLOTS.iter() {
        assert_eq!(&composed.header[offset..offset + 19], b"Integration Patient");
        assert!(composed.header[offset + 19..offset + len].iter().all(|&b| b == 0));
    }
}

#[test]
fn test_size_never_changes() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    write_template(&options.templates.short, &options.layout, 200).unwrap();
    let expected = synthetic_template(&options.layout, 200).len();

    let sink = NullSink;
    let compositor = FrameCompositor::new(options, &sink);
    for frames in [0usize, 1, 139, 140, 141, 1000] {
        let composition = compositor.compose(&source_samples(frames), 19).unwrap();
        assert_eq!(composition.bytes.len(), expected, "{} source frames", frames);
    }
}

#[test]
fn test_compose_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    write_template(&options.templates.short, &options.layout, 400).unwrap();
    let samples = source_samples(250);

    let sink = NullSink;
    let compositor = FrameCompositor::new(options, &sink);
    let first = compositor.compose_to(&samples, 19, dir.path().join("a.EEG")).unwrap();
    let second = compositor.compose_to(&samples, 19, dir.path().join("b.EEG")).unwrap();
    let again = compositor.compose_to(&samples, 19, dir.path().join("a.EEG")).unwrap();

    let a = fs::read(first.output).unwrap();
    assert_eq!(a, fs::read(second.output).unwrap());
    assert_eq!(a, fs::read(again.output).unwrap());
}

#[test]
fn test_splice_window_and_marker_columns() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    let layout = options.layout;
    write_template(&options.templates.short, &layout, 300).unwrap();
    let samples = source_samples(120);

    let sink = NullSink;
    let compositor = FrameCompositor::new(options, &sink);
    let composition = compositor.compose(&samples, 19).unwrap();
    let window = composition.window;
    assert_eq!((window.start, window.end), (50, 170));

    let grid = LegacyTemplate::split(&composition.bytes, layout).unwrap().samples();
    for frame in 0..300 {
        for channel in 0..19 {
            let value = grid[frame * 19 + channel];
            let marker = channel == 0 || channel == 18;
            if window.contains(frame) && !marker {
                assert_eq!(value, samples[(frame - window.start) * 19 + channel]);
            } else {
                assert_eq!(value, template_sample(frame, channel, 19), "frame {} channel {}", frame, channel);
            }
        }
    }
}

#[test]
fn test_structural_failures_leave_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    let output = dir.path().join("out.EEG");

    // payload one byte short of a whole frame
    let mut bytes = synthetic_template(&options.layout, 20);
    bytes.remove(1500);
    fs::write(&options.templates.short, bytes).unwrap();

    let sink = NullSink;
    let compositor = FrameCompositor::new(options.clone(), &sink);
    let err = compositor.compose_to(&source_samples(10), 19, &output).unwrap_err();
    assert!(matches!(err, ConvertError::MisalignedPayload { frame_size: 38, .. }));
    assert_eq!(err.step(), Some(Step::SplitTemplate));
    assert!(!output.exists());

    fs::write(&options.templates.short, vec![0u8; 512]).unwrap();
    let err = compositor.compose_to(&source_samples(10), 19, &output).unwrap_err();
    assert!(matches!(err, ConvertError::TemplateTooSmall { len: 512, minimum: 1058 }));
    assert!(!output.exists());

    let err = compositor.compose_to(&[0i16; 18 * 4], 18, &output).unwrap_err();
    assert_eq!(err.step(), Some(Step::Analyze));
    assert!(!output.exists());
}

#[test]
fn test_unwritable_output_is_write_error() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    write_template(&options.templates.short, &options.layout, 100).unwrap();

    let sink = NullSink;
    let compositor = FrameCompositor::new(options, &sink);
    let output = dir.path().join("missing_dir").join("out.EEG");
    let err = compositor.compose_to(&source_samples(10), 19, &output).unwrap_err();
    assert!(matches!(err, ConvertError::OutputWrite { .. }));
    assert_eq!(err.step(), Some(Step::Write));
}

#[test]
fn test_decode_scale_compose_from_source_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("rec.edf");
    EdfBuilder::standard_montage(4).write(&source).unwrap();

    use wineeg::{NativeEdfToolkit, SampleScaler, SignalToolkit};
    let recording = NativeEdfToolkit.decode(&source).unwrap();
    let (samples, stats) = SampleScaler::default().scale(&recording);
    assert_eq!(samples.len(), 1000 * 19);
    assert_eq!(stats.clipped, 0);

    let mut options = options_in(dir.path());
    options.sample_rate_hz = 250.0;
    write_template(&options.templates.short, &options.layout, 1200).unwrap();
    let sink = NullSink;
    let composition = FrameCompositor::new(options, &sink).compose(&samples, 19).unwrap();
    assert_eq!(composition.window.frames_to_splice, 1000);
    assert_eq!(composition.source_frames, 1000);
}
