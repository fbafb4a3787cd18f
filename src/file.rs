//
// file.rs
// Dicom-Worklist-rs
//
// Whole Part 10 files: meta header plus data set, encoded in memory and decoded back.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::assembler::{prepare_instance, prepare_worklist, DataSetTemplate};
use crate::config::EncoderConfig;
use crate::dataset::{self, DataSet};
use crate::error::Result;
use crate::file_meta::{read_file_meta, FileMeta, ParsedFileMeta};
use crate::format;
use crate::records::{InstanceInput, WorklistInput};
use crate::tags;

/// A record together with its complete file bytes.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub template: DataSetTemplate,
    pub bytes: Vec<u8>,
}

/// Build the complete file in memory. Either every byte is produced or an error is returned.
pub fn encode_file(template: &DataSetTemplate, config: &EncoderConfig) -> Result<Vec<u8>> {
    config.validate()?;

    let sop_instance_uid = template
        .sop_instance_uid()
        .map(str::to_string)
        .unwrap_or_else(|| format::generate_uid(&config.org_root));
    let meta = FileMeta {
        media_storage_sop_class_uid: template.sop_class_uid().to_string(),
        media_storage_sop_instance_uid: sop_instance_uid,
        transfer_syntax_uid: tags::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
        implementation_class_uid: config.implementation_class_uid.clone(),
        implementation_version_name: config.implementation_version_name.clone(),
    };

    let mut bytes = meta.encode()?;
    template.assemble().write_to(&mut bytes)?;
    debug!(
        sop_class = template.sop_class_uid(),
        accession = template.accession_number(),
        size = bytes.len(),
        "encoded file"
    );
    Ok(bytes)
}

pub fn encode_worklist(input: &WorklistInput, config: &EncoderConfig) -> Result<Encoded> {
    let template = DataSetTemplate::Worklist(prepare_worklist(input, config)?);
    let bytes = encode_file(&template, config)?;
    Ok(Encoded { template, bytes })
}

pub fn encode_instance(input: &InstanceInput, config: &EncoderConfig) -> Result<Encoded> {
    let template = DataSetTemplate::CompositeInstance(prepare_instance(input, config)?);
    let bytes = encode_file(&template, config)?;
    Ok(Encoded { template, bytes })
}

/// A decoded file. The data set keeps the element order found on disk.
#[derive(Debug, Clone)]
pub struct DicomFile {
    pub meta: ParsedFileMeta,
    pub data_set: DataSet,
}

pub fn decode_file(bytes: &[u8]) -> Result<DicomFile> {
    let meta = read_file_meta(bytes)?;
    let data_set = dataset::read_range(bytes, meta.data_set_offset, bytes.len(), 0)?;
    Ok(DicomFile { meta, data_set })
}

pub fn read_file(path: &Path) -> Result<DicomFile> {
    decode_file(&fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::records::WorklistRecord;

    fn input() -> WorklistInput {
        WorklistInput {
            patient_id: Some("P1".into()),
            patient_name: Some("DOE^JOHN".into()),
            patient_birth_date: Some("1985-05-15".into()),
            patient_sex: Some("M".into()),
            accession_number: Some("ACC1".into()),
            scheduled_date: Some("2025-08-23".into()),
            scheduled_time: Some("14:30".into()),
            modality: Some("CR".into()),
            study_description: Some("Chest X-Ray".into()),
            referring_physician: Some("DR^SMITH".into()),
            performing_physician: Some("Jane Roe".into()),
            scheduled_procedure_step_description: Some("PA and Lateral".into()),
            ..WorklistInput::default()
        }
    }

    #[test]
    fn worklist_record_survives_encode_and_decode() {
        let config = EncoderConfig::default();
        let encoded = encode_worklist(&input(), &config).unwrap();
        let file = decode_file(&encoded.bytes).unwrap();

        assert_eq!(file.meta.meta.media_storage_sop_class_uid, tags::MODALITY_WORKLIST_SOP_CLASS);
        assert_eq!(file.meta.meta.transfer_syntax_uid, tags::EXPLICIT_VR_LITTLE_ENDIAN);
        assert!(file.meta.group_length_matches());
        assert!(file.data_set.is_strictly_ascending());

        let DataSetTemplate::Worklist(original) = &encoded.template else {
            panic!("expected a worklist template");
        };
        let decoded = WorklistRecord::from_data_set(&file.data_set).unwrap();
        assert_eq!(&decoded, original);
        assert_eq!(decoded.scheduled_step.performing_physician.as_deref(), Some("Roe^Jane"));
    }

    #[test]
    fn instance_meta_uses_the_sop_instance_uid() {
        let config = EncoderConfig::default();
        let input = InstanceInput {
            patient_id: Some("P1".into()),
            patient_name: Some("DOE^JANE".into()),
            patient_birth_date: Some("1990-01-01".into()),
            patient_sex: Some("F".into()),
            accession_number: Some("ACC2".into()),
            rows: Some(2),
            columns: Some(2),
            ..InstanceInput::default()
        };
        let encoded = encode_instance(&input, &config).unwrap();
        let file = decode_file(&encoded.bytes).unwrap();

        assert_eq!(
            Some(file.meta.meta.media_storage_sop_instance_uid.as_str()),
            encoded.template.sop_instance_uid()
        );
        assert_eq!(
            file.data_set.string(tags::SOP_INSTANCE_UID),
            encoded.template.sop_instance_uid()
        );
        assert_eq!(file.data_set.u16(tags::COLUMNS), Some(2));
    }

    #[test]
    fn failed_encode_produces_no_bytes() {
        let mut bad = input();
        bad.accession_number = None;
        let err = encode_worklist(&bad, &EncoderConfig::default()).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField { ref fields } if fields == &["accessionNumber"]));
    }

    #[test]
    fn overlong_station_title_is_rejected() {
        let mut bad = input();
        bad.scheduled_station_ae_title = Some("A_STATION_TITLE_TOO_LONG".into());
        let err = encode_worklist(&bad, &EncoderConfig::default()).unwrap_err();
        assert!(matches!(err, Error::ValueTooLong { tag, .. } if tag == tags::SCHEDULED_STATION_AE_TITLE));
    }

    #[test]
    fn non_dicom_bytes_are_rejected() {
        assert!(matches!(decode_file(b"not a dicom file"), Err(Error::InvalidPreamble)));
    }
}
