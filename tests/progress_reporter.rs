use std::fs;
use std::io::Cursor;

use lora_scan::{
    BaseModel, FsPorts, Hints, LineProgressReporter, ProgressReporter, ScanStats, scan_models,
};

#[test]
fn line_progress_reporter_writes_updates() {
    let writer = Cursor::new(Vec::new());
    let reporter = LineProgressReporter::with_writer(writer);

    reporter.on_start(2);

    let stats = ScanStats {
        models_found: 2,
        models_scanned: 2,
        metadata_records: 3,
        unknown_base_models: 0,
    };

    reporter.on_update(&stats);
    reporter.on_finish(&stats);

    let output = String::from_utf8(reporter.into_inner().into_inner()).unwrap();
    assert!(output.contains("scanning 2 models"));
    assert!(output.contains("models: 2/2"));
    assert!(output.contains("metadata: 3"));
}

#[test]
fn unknown_base_models_are_only_counted() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let model = temp_dir.path().join("mystery.safetensors");
    let header = r#"{"w":{"dtype":"F16","shape":[1],"data_offsets":[0,2]}}"#;
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(&[0u8; 2]);
    fs::write(&model, bytes)?;

    let reporter = LineProgressReporter::with_writer(Cursor::new(Vec::new()));
    let models = scan_models(&FsPorts::new(), &reporter, &[model], &Hints::default())?;

    assert_eq!(models[0].base_model, BaseModel::Unkn);
    let output = String::from_utf8(reporter.into_inner().into_inner())?;
    assert!(output.contains("unknown: 1"));
    assert!(!output.contains("mystery"));
    Ok(())
}

#[test]
fn line_progress_reporter_skips_repeated_stats() {
    let writer = Cursor::new(Vec::new());
    let reporter = LineProgressReporter::with_writer(writer);
    let stats = ScanStats {
        models_found: 1,
        models_scanned: 1,
        ..ScanStats::default()
    };

    reporter.on_update(&stats);
    reporter.on_update(&stats);

    let output = String::from_utf8(reporter.into_inner().into_inner()).unwrap();
    assert_eq!(output.matches("models: 1/1").count(), 1);
}
