//! Integration tests for weight-file loading and validation.

mod common;

use sente_net::{LoadError, Network, NetworkConfig, NetworkError, WeightSet};

use common::{gzip, replace_line, temp_path, weight_text};

#[test]
fn gzipped_file_on_disk_builds_a_network() {
    let path = temp_path("gz-weights.txt.gz");
    std::fs::write(&path, gzip(&weight_text(502, 4, 2))).unwrap();

    let net = Network::initialize(NetworkConfig::default(), &path, None);
    std::fs::remove_file(&path).ok();
    let net = net.expect("gzipped weights should load");
    assert_eq!(net.channels(), 4);
    assert_eq!(net.residual_blocks(), 2);
    assert!(!net.value_head_not_stm());
}

#[test]
fn legacy_version_is_accepted_with_flag() {
    let weights = WeightSet::from_reader(weight_text(2, 2, 1).as_bytes()).unwrap();
    assert!(weights.value_head_not_stm);
}

#[test]
fn unknown_version_fails_as_load_error() {
    let path = temp_path("v1-weights.txt");
    std::fs::write(&path, weight_text(1, 2, 1)).unwrap();
    let err = Network::initialize(NetworkConfig::default(), &path, None).unwrap_err();
    std::fs::remove_file(&path).ok();
    assert!(
        matches!(err, NetworkError::Load(LoadError::UnsupportedVersion { .. })),
        "got {err:?}"
    );
}

#[test]
fn missing_file_is_an_open_error() {
    let err = Network::initialize(NetworkConfig::default(), temp_path("does-not-exist"), None).unwrap_err();
    assert!(matches!(err, NetworkError::Load(LoadError::Open { .. })), "got {err:?}");
}

#[test]
fn partial_block_is_rejected_by_line_count() {
    let text = weight_text(502, 2, 1);
    // Drop the last squeeze-excitation line of the block.
    let mut lines: Vec<&str> = text.lines().collect();
    lines.remove(21);
    let err = WeightSet::from_reader(lines.join("\n").as_bytes()).unwrap_err();
    assert!(matches!(err, LoadError::InconsistentLineCount { lines: 38 }), "got {err:?}");
}

#[test]
fn bad_token_reports_its_line() {
    let text = replace_line(&weight_text(502, 2, 1), 12, "0.5 1e");
    let err = WeightSet::from_reader(text.as_bytes()).unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, LoadError::MalformedFloat { line: 12, .. }), "got {err:?}");
    assert!(message.contains("line 12"), "message should name the line: {message}");
}

#[test]
fn wrong_channel_count_on_a_later_line_is_a_size_error() {
    // Line 9 is the first residual block's bn gammas.
    let text = replace_line(&weight_text(502, 3, 1), 9, "1.0 1.0");
    let err = WeightSet::from_reader(text.as_bytes()).unwrap_err();
    match err {
        LoadError::TensorSize { line, expected, found, .. } => {
            assert_eq!((line, expected, found), (9, 3, 2));
        }
        other => panic!("expected TensorSize, got {other:?}"),
    }
}

#[test]
fn binary_garbage_is_not_text() {
    let err = WeightSet::from_reader(&[0xFFu8, 0xFE, 0x00, 0x41][..]).unwrap_err();
    assert!(matches!(err, LoadError::NotText), "got {err:?}");
}
