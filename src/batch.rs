//
// batch.rs
// Dicom-Worklist-rs
//
// Encodes and stores many records in parallel; each record succeeds or fails on its own.
//
// Thales Matheus Mendonça Santos - November 2025

use clap::ValueEnum;
use rayon::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::EncoderConfig;
use crate::file::{encode_instance, encode_worklist, Encoded};
use crate::records::{InstanceInput, WorklistInput};
use crate::storage::FileStore;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Worklist,
    Instance,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum BatchOutcome {
    #[serde(rename_all = "camelCase")]
    Success {
        index: usize,
        filename: String,
        size: u64,
        accession_number: String,
        #[serde(rename = "studyInstanceUID")]
        study_instance_uid: String,
        #[serde(rename = "sopInstanceUID", skip_serializing_if = "Option::is_none")]
        sop_instance_uid: Option<String>,
    },
    Failure { index: usize, message: String },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchOutcome>,
}

/// Encode and store every item. Items are raw JSON so a malformed entry fails alone.
pub fn run_batch(kind: BatchKind, items: &[Value], config: &EncoderConfig, store: &FileStore) -> BatchReport {
    info!(?kind, count = items.len(), "starting batch");

    let results: Vec<BatchOutcome> = items
        .par_iter()
        .enumerate()
        .map(|(index, item)| {
            let outcome = match kind {
                BatchKind::Worklist => process::<WorklistInput>(item, store, |i| encode_worklist(i, config)),
                BatchKind::Instance => process::<InstanceInput>(item, store, |i| encode_instance(i, config)),
            };
            match outcome {
                Ok((encoded, filename, size)) => BatchOutcome::Success {
                    index,
                    filename,
                    size,
                    accession_number: encoded.template.accession_number().to_string(),
                    study_instance_uid: encoded.template.study_instance_uid().to_string(),
                    sop_instance_uid: encoded.template.sop_instance_uid().map(str::to_string),
                },
                Err(e) => {
                    warn!(index, error = %e, "batch item failed");
                    BatchOutcome::Failure {
                        index,
                        message: format!("{e:#}"),
                    }
                }
            }
        })
        .collect();

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let report = BatchReport {
        total: results.len(),
        succeeded,
        failed: results.len() - succeeded,
        results,
    };
    info!(total = report.total, succeeded = report.succeeded, failed = report.failed, "batch finished");
    report
}

fn process<T: DeserializeOwned>(
    item: &Value,
    store: &FileStore,
    encode: impl Fn(&T) -> crate::error::Result<Encoded>,
) -> anyhow::Result<(Encoded, String, u64)> {
    let input: T = serde_json::from_value(item.clone())?;
    let encoded = encode(&input)?;
    let stored = store.save(encoded.template.accession_number(), &encoded.bytes)?;
    Ok((encoded, stored.filename, stored.size))
}
