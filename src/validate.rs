//
// validate.rs
// Dicom-Worklist-rs
//
// Re-reads encoded files and checks them: required attributes, tag order, even lengths, group length,
// and acceptance by the `dicom` crate's parser.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::element::{decode_element, read_tag, read_u32, Tag, UNDEFINED_LENGTH};
use crate::file::{decode_file, DicomFile};
use crate::file_meta::PREAMBLE_LEN;
use crate::models::{GroupLengthCheck, ValidationReport};
use crate::sequence::ITEM;
use crate::tags;
use crate::vr::Vr;

const WORKLIST_REQUIRED: &[(Tag, &str)] = &[
    (tags::ACCESSION_NUMBER, "AccessionNumber"),
    (tags::PATIENT_NAME, "PatientName"),
    (tags::PATIENT_ID, "PatientID"),
    (tags::PATIENT_BIRTH_DATE, "PatientBirthDate"),
    (tags::PATIENT_SEX, "PatientSex"),
    (tags::STUDY_INSTANCE_UID, "StudyInstanceUID"),
    (tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE, "ScheduledProcedureStepSequence"),
];

const STEP_REQUIRED: &[(Tag, &str)] = &[
    (tags::MODALITY, "Modality"),
    (tags::SCHEDULED_STATION_AE_TITLE, "ScheduledStationAETitle"),
    (tags::SCHEDULED_PROCEDURE_STEP_START_DATE, "ScheduledProcedureStepStartDate"),
    (tags::SCHEDULED_PROCEDURE_STEP_START_TIME, "ScheduledProcedureStepStartTime"),
    (tags::SCHEDULED_PROCEDURE_STEP_ID, "ScheduledProcedureStepID"),
];

const INSTANCE_REQUIRED: &[(Tag, &str)] = &[
    (tags::SOP_CLASS_UID, "SOPClassUID"),
    (tags::SOP_INSTANCE_UID, "SOPInstanceUID"),
    (tags::ACCESSION_NUMBER, "AccessionNumber"),
    (tags::MODALITY, "Modality"),
    (tags::PATIENT_NAME, "PatientName"),
    (tags::PATIENT_ID, "PatientID"),
    (tags::PATIENT_BIRTH_DATE, "PatientBirthDate"),
    (tags::PATIENT_SEX, "PatientSex"),
    (tags::STUDY_INSTANCE_UID, "StudyInstanceUID"),
    (tags::SERIES_INSTANCE_UID, "SeriesInstanceUID"),
    (tags::ROWS, "Rows"),
    (tags::COLUMNS, "Columns"),
    (tags::PIXEL_DATA, "PixelData"),
];

/// Read a file from disk and validate it. Only I/O failures are errors; findings go in the report.
pub fn validate_file(path: &Path) -> Result<ValidationReport> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(validate_bytes(&bytes))
}

pub fn validate_bytes(bytes: &[u8]) -> ValidationReport {
    let mut report = ValidationReport::default();

    // The reference reader builds sequences recursively; only hand it files our bounded decoder accepted.
    let file = match decode_file(bytes) {
        Ok(file) => file,
        Err(e) => {
            report.errors.push(format!("Failed to decode file: {e}"));
            return report;
        }
    };

    report.parsed_by_reference_reader = reference_reader_accepts(bytes);
    if !report.parsed_by_reference_reader {
        report
            .warnings
            .push("The dicom crate's parser rejected the file".to_string());
    }

    check_meta(&file, &mut report);
    check_required(&file, &mut report);

    report.ascending_tags = file.data_set.is_strictly_ascending();
    if !report.ascending_tags {
        report
            .errors
            .push("Data set tags are not in strictly ascending order".to_string());
    }

    let mut odd = Vec::new();
    match odd_length_tags(bytes, file.meta.data_set_offset, bytes.len(), &mut odd) {
        Ok(_) => {}
        Err(e) => report.errors.push(format!("Failed to walk elements: {e}")),
    }
    if !odd.is_empty() {
        report.errors.push(format!("{} element(s) have odd value length", odd.len()));
    }
    report.odd_length_tags = odd.iter().map(Tag::to_string).collect();

    report.valid = report.errors.is_empty();
    debug!(valid = report.valid, errors = report.errors.len(), "validated file");
    report
}

fn reference_reader_accepts(bytes: &[u8]) -> bool {
    // `from_reader` expects the stream positioned after the preamble.
    bytes.len() > PREAMBLE_LEN && dicom::object::from_reader(&bytes[PREAMBLE_LEN..]).is_ok()
}

fn check_meta(file: &DicomFile, report: &mut ValidationReport) {
    let meta = &file.meta;
    report.sop_class_uid = Some(meta.meta.media_storage_sop_class_uid.clone());
    report.transfer_syntax = Some(meta.meta.transfer_syntax_uid.clone());
    report.group_length = Some(GroupLengthCheck {
        declared: meta.declared_group_length,
        measured: meta.measured_group_length,
    });

    if !meta.group_length_matches() {
        report.errors.push(format!(
            "File meta group length is {:?} but the meta elements occupy {} bytes",
            meta.declared_group_length, meta.measured_group_length
        ));
    }
    if meta.meta.transfer_syntax_uid != tags::EXPLICIT_VR_LITTLE_ENDIAN {
        report.warnings.push(format!(
            "Transfer syntax {} differs from the explicit VR little endian encoding used on disk",
            meta.meta.transfer_syntax_uid
        ));
    }
}

fn check_required(file: &DicomFile, report: &mut ValidationReport) {
    let set = &file.data_set;
    let is_worklist = file.meta.meta.media_storage_sop_class_uid == tags::MODALITY_WORKLIST_SOP_CLASS;
    let required = if is_worklist { WORKLIST_REQUIRED } else { INSTANCE_REQUIRED };

    let mut missing: Vec<String> = required
        .iter()
        .filter(|(tag, _)| !set.contains(*tag))
        .map(|(tag, name)| format!("{name} {tag}"))
        .collect();

    if is_worklist {
        match set.items(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE) {
            Some([step]) => missing.extend(
                STEP_REQUIRED
                    .iter()
                    .filter(|(tag, _)| !step.contains(*tag))
                    .map(|(tag, name)| format!("{name} {tag}")),
            ),
            Some(items) => report.errors.push(format!(
                "Scheduled Procedure Step Sequence has {} item(s), expected 1",
                items.len()
            )),
            None => {}
        }
    } else if let Some(sop_instance) = set.string(tags::SOP_INSTANCE_UID) {
        if sop_instance != file.meta.meta.media_storage_sop_instance_uid {
            report
                .warnings
                .push("Media Storage SOP Instance UID differs from SOP Instance UID".to_string());
        }
    }

    if !missing.is_empty() {
        report.errors.push(format!(
            "Missing {} attribute(s): {}",
            missing.len(),
            missing.join(", ")
        ));
    }
    report.missing_tags = missing;
}

/// Collect tags whose encoded value length is odd, descending into sequence items.
///
/// Returns the offset where scanning stopped: `end`, or the delimiter that closes an undefined-length item.
fn odd_length_tags(bytes: &[u8], start: usize, end: usize, found: &mut Vec<Tag>) -> crate::error::Result<usize> {
    let mut pos = start;
    while pos < end {
        let tag = read_tag(bytes, pos)?;
        if tag.group() == 0xFFFE {
            break;
        }
        let (element, consumed) = decode_element(bytes, pos)?;
        if element.vr == Vr::SQ {
            odd_length_items(bytes, pos + 12, pos + consumed, found)?;
        } else {
            let header_len = if element.vr.has_long_length() { 12 } else { 8 };
            if (consumed - header_len) % 2 != 0 {
                found.push(tag);
            }
        }
        pos += consumed;
    }
    Ok(pos)
}

fn odd_length_items(bytes: &[u8], start: usize, end: usize, found: &mut Vec<Tag>) -> crate::error::Result<()> {
    let mut pos = start;
    while pos + 8 <= end {
        let tag = read_tag(bytes, pos)?;
        let len = read_u32(bytes, pos + 4)?;
        pos += 8;
        if tag != ITEM {
            // Delimitation items carry no value.
            continue;
        }
        if len == UNDEFINED_LENGTH {
            pos = odd_length_tags(bytes, pos, end, found)? + 8;
        } else {
            let item_end = pos + len as usize;
            odd_length_tags(bytes, pos, item_end, found)?;
            pos = item_end;
        }
    }
    Ok(())
}

/// Print a validation report for a file on disk.
pub fn check_file(path: &Path) -> Result<ValidationReport> {
    let report = validate_file(path)?;
    println!(
        "{}: {}",
        path.display(),
        if report.valid { "valid" } else { "INVALID" }
    );
    if let Some(ts) = &report.transfer_syntax {
        println!("  Transfer Syntax: {ts}");
    }
    if let Some(sop_class) = &report.sop_class_uid {
        println!("  Media Storage SOP Class UID: {sop_class}");
    }
    for error in &report.errors {
        println!("  error: {error}");
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    Ok(report)
}
