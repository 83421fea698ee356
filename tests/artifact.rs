use std::f32::consts::PI;

use aura::analysis::result::AnalysisResult;
use aura::analysis::{AnalysisError, Analyzer};
use aura::store::{artifact_file_name, ResultStore};
use aura::types::AudioData;
use serde_json::Value;

const SAMPLE_RATE: u32 = 16_000;

fn sweep(start_hz: f32, end_hz: f32, secs: f32) -> AudioData {
    let len = (secs * SAMPLE_RATE as f32) as usize;
    let mut phase = 0.0_f32;
    let samples = (0..len)
        .map(|i| {
            let progress = i as f32 / len as f32;
            let freq = start_hz + (end_hz - start_hz) * progress;
            phase += 2.0 * PI * freq / SAMPLE_RATE as f32;
            0.5 * phase.sin()
        })
        .collect();
    AudioData::new(samples, SAMPLE_RATE)
}

fn compare() -> AnalysisResult {
    Analyzer::default()
        .compare_audio(
            ["take_one".into(), "take_two".into()],
            &sweep(200.0, 400.0, 0.8),
            &sweep(220.0, 380.0, 1.0),
        )
        .expect("comparison succeeds")
}

#[test]
fn json_round_trip_preserves_paths_and_features() {
    let result = compare();
    let json = result.to_json().unwrap();
    let parsed = AnalysisResult::from_json(&json).unwrap();
    assert_eq!(parsed, result);
}

#[test]
fn artifact_layout_uses_published_keys() {
    let result = compare();
    let value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

    assert_eq!(value["files"], serde_json::json!(["take_one", "take_two"]));
    for descriptor in [
        "waveform",
        "rms",
        "f0",
        "f0_framewise",
        "vibrato",
        "onset_times",
        "onset_strength",
        "spectral_centroid",
        "spectral_bandwidth",
        "mfcc",
        "chroma",
    ] {
        let entry = &value["features"][descriptor];
        assert!(entry["fileA"].is_array(), "{descriptor} fileA");
        assert!(entry["fileB"].is_array(), "{descriptor} fileB");
    }
    for key in ["dtw_mfcc", "dtw_chroma", "dtw_mixed", "dtw_own"] {
        let path = value["dtw"][key].as_array().expect("path array");
        assert_eq!(path[0], serde_json::json!({"x": 0, "y": 0}));
        assert!(value["dtw_cost"][key]["total"].is_number());
        assert!(value["dtw_cost"][key]["per_step"].is_number());
    }
    assert_eq!(
        value["features"]["rms"]["fileA"].as_array().map(Vec::len),
        Some(result.features[0].frame_count)
    );
}

#[test]
fn artifacts_without_cost_summary_still_load() {
    let result = compare();
    let mut value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    value
        .as_object_mut()
        .expect("artifact object")
        .remove("dtw_cost");
    let parsed = AnalysisResult::from_json(&value.to_string()).unwrap();
    assert_eq!(parsed.alignments.mfcc.path, result.alignments.mfcc.path);
    assert_eq!(parsed.alignments.weighted.total_cost, 0.0);
    assert_eq!(parsed.features, result.features);
}

#[test]
fn truncated_feature_rows_are_rejected() {
    let result = compare();
    let mut value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    value["features"]["rms"]["fileB"]
        .as_array_mut()
        .expect("rms array")
        .pop();
    let err = AnalysisResult::from_json(&value.to_string()).unwrap_err();
    assert!(matches!(err, AnalysisError::Artifact(_)));
    assert!(err.to_string().contains("fileB"));
}

#[test]
fn store_saves_lists_and_loads_results() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ResultStore::new(tmp.path());
    let result = compare();

    let name = store.save(&result).unwrap();
    assert_eq!(name, artifact_file_name("take_one", "take_two"));
    assert_eq!(name, "audio_analysis_take_one_vs_take_two.json");
    assert_eq!(store.list().unwrap(), vec![name.clone()]);

    let raw = store.read_raw(&name).unwrap().expect("artifact exists");
    assert_eq!(raw, result.to_json().unwrap().into_bytes());
    assert_eq!(store.load(&name).unwrap(), result);
    assert_eq!(store.read_raw("audio_analysis_x_vs_y.json").unwrap(), None);
}

#[test]
fn saving_the_same_pair_twice_replaces_the_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ResultStore::new(tmp.path());
    let result = compare();
    store.save(&result).unwrap();
    store.save(&result).unwrap();
    assert_eq!(store.list().unwrap().len(), 1);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
}

#[test]
fn concurrent_saves_of_one_pair_leave_a_single_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ResultStore::new(tmp.path());
    let result = compare();
    let names: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| store.save(&result))).collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect()
    });
    assert!(names.iter().all(|name| *name == names[0]));
    assert_eq!(store.list().unwrap(), vec![names[0].clone()]);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    assert_eq!(store.load(&names[0]).unwrap(), result);
}

#[test]
fn dotted_file_names_get_distinct_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    let audio = sweep(200.0, 300.0, 0.6);
    let analyzer = Analyzer::default();
    let store = ResultStore::new(dir.join("out"));
    std::fs::create_dir(store.root()).unwrap();
    let mut saved = Vec::new();
    for take in ["take.v1.wav", "take.v2.wav"] {
        let result = analyzer
            .compare_audio([take.into(), "ref.wav".into()], &audio, &audio)
            .unwrap();
        saved.push(store.save(&result).unwrap());
    }
    assert_eq!(
        saved,
        vec![
            "audio_analysis_take.v1_vs_ref.json",
            "audio_analysis_take.v2_vs_ref.json"
        ]
    );
    assert_eq!(store.list().unwrap().len(), 2);
}
