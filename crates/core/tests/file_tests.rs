//! Merging pcap files on disk

mod common;

use common::*;
use rtpmix_core::capture::LINKTYPE_ETHERNET;
use rtpmix_core::prelude::*;

fn file_config(input: std::path::PathBuf, output: std::path::PathBuf) -> MergeConfig {
    MergeConfig {
        input: Some(input),
        output: Some(output),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_merge_pcap_file_to_raw_file() {
    init_test_logging();
    let input = temp_path("call.pcap");
    let output = temp_path("call.raw");

    let seqs: Vec<u16> = (0..50).collect();
    let trace = pcap_bytes(LINKTYPE_ETHERNET, &interleaved_call(seqs.clone()));
    tokio::fs::write(&input, trace).await.unwrap();

    let pipeline = MergePipeline::new(file_config(input.clone(), output.clone())).unwrap();
    let stats = pipeline.run_files().await.unwrap();

    let written = tokio::fs::read(&output).await.unwrap();
    assert_eq!(written.len(), 16000);
    assert_eq!(written, expected_stereo(&seqs, &seqs, PAYLOAD_LEN));
    assert_eq!(stats.frames_read, 100);
    assert_eq!(stats.bytes_written, 16000);

    let _ = tokio::fs::remove_file(&input).await;
    let _ = tokio::fs::remove_file(&output).await;
}

#[tokio::test]
async fn test_truncated_trace_keeps_partial_output() {
    init_test_logging();
    let input = temp_path("cut.pcap");
    let output = temp_path("cut.raw");

    let mut trace = pcap_bytes(LINKTYPE_ETHERNET, &interleaved_call(0..10));
    // Cut into the last record's data
    trace.truncate(trace.len() - 50);
    tokio::fs::write(&input, trace).await.unwrap();

    let pipeline = MergePipeline::new(file_config(input.clone(), output.clone())).unwrap();
    let err = pipeline.run_files().await.unwrap_err();
    assert!(matches!(err, Error::Trace(_)), "unexpected error {:?}", err);

    // Nine complete left/right pairs made it out before the failure
    let written = tokio::fs::read(&output).await.unwrap();
    let seqs: Vec<u16> = (0..9).collect();
    assert_eq!(written, expected_stereo(&seqs, &seqs, PAYLOAD_LEN));

    let _ = tokio::fs::remove_file(&input).await;
    let _ = tokio::fs::remove_file(&output).await;
}

#[tokio::test]
async fn test_missing_trace_is_io_error() {
    let output = temp_path("never.raw");
    let pipeline = MergePipeline::new(file_config(temp_path("missing.pcap"), output.clone())).unwrap();

    let err = pipeline.run_files().await.unwrap_err();
    assert!(matches!(err, Error::IoError(_)));
    assert!(!err.is_recoverable());
    assert!(tokio::fs::metadata(&output).await.is_err());
}

#[tokio::test]
async fn test_not_a_pcap_file() {
    let input = temp_path("notes.txt");
    let output = temp_path("notes.raw");
    tokio::fs::write(&input, b"definitely not a packet capture").await.unwrap();

    let pipeline = MergePipeline::new(file_config(input.clone(), output)).unwrap();
    assert!(matches!(pipeline.run_files().await, Err(Error::Trace(_))));

    let _ = tokio::fs::remove_file(&input).await;
}

#[tokio::test]
async fn test_missing_paths_rejected() {
    let pipeline = MergePipeline::new(MergeConfig::default()).unwrap();
    assert!(matches!(pipeline.run_files().await, Err(Error::Config(_))));
}
