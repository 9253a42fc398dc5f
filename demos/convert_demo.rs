//! End-to-end conversion on synthetic inputs.
//!
//! Builds a two-minute 19-channel recording and a matching short template in a
//! scratch directory, converts it with a BrainVision export, and prints the
//! validation summary.
//!
//! ```text
//! cargo run --example convert_demo
//! ```

use wineeg::fixtures::{write_template, EdfBuilder};
use wineeg::{Converter, ConverterConfig, FrameLayout, LogSink, NativeEdfToolkit, Result};

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    let dir = std::env::temp_dir().join("wineeg_demo");
    std::fs::create_dir_all(&dir)?;

    let source = dir.join("demo.edf");
    EdfBuilder::standard_montage(120).write(&source)?;

    let mut config = ConverterConfig::default();
    config.compositor.template_dir = dir.clone();
    config.compositor.patient_name = "Demo Patient".to_string();
    config.export_brainvision = true;
    config.write_legacy_sidecars = true;
    // 6 minutes of template capacity
    write_template(config.templates().short, &FrameLayout::legacy(), 90_000)?;

    let converter = Converter::new(&config, &NativeEdfToolkit, &LogSink);
    let result = converter.convert(&source, dir.join("demo.EEG"))?;

    println!("Output:     {}", result.output.display());
    println!("Template:   {}", result.composition.selection.variant);
    println!(
        "Window:     frames {}..{} ({} spliced)",
        result.composition.window.start, result.composition.window.end, result.composition.window.frames_to_splice
    );
    println!(
        "Confidence: {:.1}% ({})",
        result.report.summary.confidence * 100.0,
        result.report.summary.assessment
    );
    for advisory in &result.composition.advisories {
        println!("Advisory:   {}", advisory);
    }
    if let Some(sidecars) = &result.legacy_sidecars {
        println!("Described:  {} / {}", sidecars.description.display(), sidecars.events.display());
    }
    if let Some((text, json)) = &result.report_files {
        println!("Reports:    {} / {}", text.display(), json.display());
    }
    Ok(())
}
