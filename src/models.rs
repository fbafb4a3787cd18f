//
// models.rs
// Dicom-Worklist-rs
//
// Serializable response shapes shared by the CLI and the HTTP API.
//
// Thales Matheus Mendonça Santos - November 2025

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::scu::FindMatch;

/// `{success, message, data}` envelope returned by every API route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Group length as stored and as measured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLengthCheck {
    pub declared: Option<u32>,
    pub measured: u32,
}

/// Conformance report for one encoded file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub missing_tags: Vec<String>,
    pub sop_class_uid: Option<String>,
    pub transfer_syntax: Option<String>,
    pub group_length: Option<GroupLengthCheck>,
    pub ascending_tags: bool,
    pub odd_length_tags: Vec<String>,
    /// Whether the `dicom` crate's parser accepted the file.
    pub parsed_by_reference_reader: bool,
}

/// Response body for a created worklist or instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedFile {
    pub filename: String,
    pub size: u64,
    pub accession_number: String,
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    #[serde(rename = "sopInstanceUID", skip_serializing_if = "Option::is_none")]
    pub sop_instance_uid: Option<String>,
}

/// Matches returned by a C-FIND query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindResponse {
    pub count: usize,
    pub matches: Vec<FindMatch>,
    pub queried_at: DateTime<Local>,
}

impl FindResponse {
    pub fn new(matches: Vec<FindMatch>) -> Self {
        Self {
            count: matches.len(),
            matches,
            queried_at: Local::now(),
        }
    }
}

/// Configured PACS endpoint and whether it answered a C-ECHO.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacsStatus {
    pub address: String,
    #[serde(rename = "callingAETitle")]
    pub calling_ae_title: String,
    #[serde(rename = "calledAETitle")]
    pub called_ae_title: String,
    pub connected: bool,
    pub detail: String,
}
