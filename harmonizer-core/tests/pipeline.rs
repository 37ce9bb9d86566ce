mod common;

use std::time::Duration;

use common::{BLOCK_SIZE, Scripted, Sluggish, sine};
use harmonizer_core::{
    CorrectionMode, HarmonizerError, Interval, MixState, OfflineBackend, PipelineConfig,
    PipelineState, StreamingPipeline,
};

fn run_block(backend: &OfflineBackend, input: &[f32]) -> Vec<f32> {
    assert!(backend.feed(input));
    let mut out = vec![0.0; input.len()];
    assert!(backend.pull(&mut out));
    out
}

fn scripted_pipeline() -> (StreamingPipeline<OfflineBackend>, OfflineBackend, Scripted) {
    let backend = OfflineBackend::new();
    let script = Scripted::default();
    let detector = script.clone();
    let pipeline = StreamingPipeline::new(PipelineConfig::default(), backend.clone())
        .unwrap()
        .with_detector(move |_| Box::new(detector.clone()));
    (pipeline, backend, script)
}

#[test]
fn sung_a4_gets_a_major_third() {
    let backend = OfflineBackend::new();
    let mut pipeline = StreamingPipeline::new(PipelineConfig::default(), backend.clone()).unwrap();
    pipeline.start().unwrap();

    run_block(&backend, &sine(440.0, BLOCK_SIZE));

    let display = pipeline.poll_display();
    assert_eq!(display.note_label().to_string(), "A4");
    assert_eq!(display.harmony_label().to_string(), "C#5");
    assert!((display.base_frequency_hz - 440.0).abs() < 2.0);
    assert!((display.target_frequency_hz - display.base_frequency_hz * 1.25).abs() < 1e-3);
    assert!(display.confidence >= 0.8);
}

#[test]
fn scripted_end_to_end() {
    let (mut pipeline, backend, script) = scripted_pipeline();
    pipeline.start().unwrap();
    script.push(440.0, 0.95);
    run_block(&backend, &[0.0; BLOCK_SIZE]);

    let display = pipeline.poll_display();
    assert_eq!(display.note_label().to_string(), "A4");
    assert_eq!(display.harmony_label().to_string(), "C#5");
    assert_eq!(display.target_frequency_hz, 550.0);
}

#[test]
fn low_confidence_blocks_hold_display_and_target() {
    let (mut pipeline, backend, script) = scripted_pipeline();
    pipeline.start().unwrap();
    script.push(440.0, 0.95);
    run_block(&backend, &[0.0; BLOCK_SIZE]);
    let before = pipeline.poll_display();
    let target_before = backend.with_sink(|s| s.processor().target_frequency()).unwrap();

    script.push(200.0, 0.5);
    script.push(1000.0, 0.79);
    run_block(&backend, &[0.0; BLOCK_SIZE]);
    run_block(&backend, &[0.0; BLOCK_SIZE]);

    assert_eq!(pipeline.poll_display(), before);
    let target_after = backend.with_sink(|s| s.processor().target_frequency()).unwrap();
    assert_eq!(target_after, target_before);
    assert_eq!(pipeline.stats().low_confidence_blocks, 2);
}

#[test]
fn interval_and_mode_changes_reach_the_next_block() {
    let (mut pipeline, backend, script) = scripted_pipeline();
    pipeline.start().unwrap();

    pipeline.set_interval(Interval::Fifth);
    script.push(440.0, 0.9);
    run_block(&backend, &[0.0; BLOCK_SIZE]);
    assert_eq!(pipeline.poll_display().target_frequency_hz, 660.0);

    pipeline.set_mode(CorrectionMode::Correction);
    pipeline.set_interval(Interval::Octave);
    script.push(440.0, 0.9);
    run_block(&backend, &[0.0; BLOCK_SIZE]);
    assert_eq!(pipeline.poll_display().harmony_label().to_string(), "C5");
}

#[test]
fn output_mixes_dry_and_wet() {
    let (mut pipeline, backend, script) = scripted_pipeline();
    pipeline.set_mix(MixState::new(1.0, 0.0, 1.0));
    pipeline.start().unwrap();
    script.push(440.0, 0.9);

    let input = sine(330.0, BLOCK_SIZE);
    let out = run_block(&backend, &input);
    for (o, i) in out.iter().zip(&input) {
        assert!((o - i).abs() < 1e-4);
    }

    pipeline.set_mix(MixState::new(0.0, 1.0, 1.0));
    let out = run_block(&backend, &[0.0; BLOCK_SIZE]);
    assert!(out.iter().any(|s| s.abs() > 0.5), "oscillator should be audible");
    assert!(out.iter().all(|s| s.abs() <= 1.0));
}

#[test]
fn output_is_silent_until_a_block_is_complete() {
    let (mut pipeline, backend, _script) = scripted_pipeline();
    pipeline.start().unwrap();
    backend.feed(&[0.3; BLOCK_SIZE / 2]);
    let mut out = vec![1.0; 256];
    backend.pull(&mut out);
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(pipeline.stats().output_underruns, 256);
    assert_eq!(pipeline.stats().blocks_processed, 0);
}

#[test]
fn small_device_buffers_are_served_from_whole_blocks() {
    let (mut pipeline, backend, _script) = scripted_pipeline();
    pipeline.set_mix(MixState::new(1.0, 0.0, 1.0));
    pipeline.start().unwrap();
    let input: Vec<f32> = (0..BLOCK_SIZE).map(|i| i as f32 / BLOCK_SIZE as f32).collect();
    backend.feed(&input);

    let mut collected = Vec::new();
    for _ in 0..(BLOCK_SIZE / 512) {
        let mut out = vec![0.0; 512];
        backend.pull(&mut out);
        collected.extend(out);
    }
    assert_eq!(collected, input);
    assert_eq!(pipeline.stats().blocks_processed, 1);
}

#[test]
fn missed_deadline_retains_previous_state() {
    let backend = OfflineBackend::new();
    let config = PipelineConfig {
        deadline_budget_ms: Some(1.0),
        ..Default::default()
    };
    let mut pipeline = StreamingPipeline::new(config, backend.clone())
        .unwrap()
        .with_detector(|_| Box::new(Sluggish(Duration::from_millis(10))));
    pipeline.start().unwrap();
    run_block(&backend, &[0.0; BLOCK_SIZE]);

    assert_eq!(pipeline.stats().deadline_misses, 1);
    assert_eq!(pipeline.poll_display().note_label().to_string(), "-");
    assert_eq!(backend.with_sink(|s| s.processor().target_frequency()).unwrap(), None);
}

#[test]
fn stop_resets_display_and_releases_everything() {
    let (mut pipeline, backend, script) = scripted_pipeline();
    pipeline.start().unwrap();
    script.push(440.0, 0.95);
    run_block(&backend, &[0.0; BLOCK_SIZE]);
    assert_eq!(pipeline.poll_display().note_label().to_string(), "A4");

    pipeline.stop();
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(backend.open_handles(), 0);
    assert!(!backend.feed(&[0.0; 16]));
    assert!(!backend.pull(&mut [0.0; 16]));
    assert_eq!(pipeline.poll_display().note_label().to_string(), "-");
}

#[test]
fn restart_behaves_like_first_start() {
    let (mut pipeline, backend, script) = scripted_pipeline();
    for _ in 0..3 {
        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Capturing);
        assert_eq!(backend.open_handles(), 2);
        // Fresh session: no retained target from the previous one.
        assert_eq!(backend.with_sink(|s| s.processor().target_frequency()).unwrap(), None);

        script.push(440.0, 0.95);
        run_block(&backend, &[0.0; BLOCK_SIZE]);
        assert_eq!(pipeline.poll_display().harmony_label().to_string(), "C#5");

        pipeline.stop();
        assert_eq!(backend.open_handles(), 0);
    }
}

#[test]
fn denied_microphone_is_reported_and_recoverable() {
    let mut pipeline =
        StreamingPipeline::new(PipelineConfig::default(), OfflineBackend::denying_input()).unwrap();
    let err = pipeline.start().unwrap_err();
    assert!(matches!(err, HarmonizerError::DeviceUnavailable(_)));
    assert_eq!(pipeline.state(), PipelineState::Idle);
    pipeline.stop();
}
