//
// dicom_workflows.rs
// Dicom-Worklist-rs
//
// Integration-style tests covering worklist and instance encoding, file meta conformance, storage, batch runs,
// validation, and cross-checks against the `dicom` crate's reader.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::dictionary_std::tags as std_tags;
use dicom_worklist::batch::{run_batch, BatchKind};
use dicom_worklist::config::EncoderConfig;
use dicom_worklist::dataset::DataSet;
use dicom_worklist::element::DataElement;
use dicom_worklist::file_meta::{read_file_meta, PREAMBLE_LEN};
use dicom_worklist::format::is_valid_uid;
use dicom_worklist::records::{InstanceInput, UidInput, WorklistInput};
use dicom_worklist::storage::FileStore;
use dicom_worklist::{decode_file, encode_instance, encode_worklist, tags, validate, Error};
use serde_json::json;
use tempfile::tempdir;

fn scenario_input() -> WorklistInput {
    WorklistInput {
        patient_id: Some("P1".into()),
        patient_name: Some("DOE^JOHN".into()),
        patient_birth_date: Some("1985-05-15".into()),
        patient_sex: Some("M".into()),
        accession_number: Some("ACC1".into()),
        scheduled_date: Some("2025-08-23".into()),
        scheduled_time: Some("14:30".into()),
        modality: Some("CR".into()),
        ..WorklistInput::default()
    }
}

fn instance_input() -> InstanceInput {
    InstanceInput {
        patient_id: Some("P2".into()),
        patient_name: Some("ROE^JANE".into()),
        patient_birth_date: Some("1970-12-31".into()),
        patient_sex: Some("F".into()),
        accession_number: Some("ACC2".into()),
        rows: Some(8),
        columns: Some(8),
        ..InstanceInput::default()
    }
}

#[test]
fn scenario_worklist_fields_decode_to_dicom_values() {
    let encoded = encode_worklist(&scenario_input(), &EncoderConfig::default()).expect("encode");
    let file = decode_file(&encoded.bytes).expect("decode");

    assert_eq!(file.data_set.string(tags::PATIENT_ID), Some("P1"));
    assert_eq!(file.data_set.string(tags::PATIENT_BIRTH_DATE), Some("19850515"));
    let steps = file
        .data_set
        .items(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
        .expect("SPS sequence");
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].string(tags::SCHEDULED_PROCEDURE_STEP_START_DATE), Some("20250823"));
    assert_eq!(steps[0].string(tags::SCHEDULED_PROCEDURE_STEP_START_TIME), Some("143000"));
}

#[test]
fn scenario_missing_accession_number_is_rejected() {
    let input = WorklistInput {
        accession_number: None,
        ..scenario_input()
    };
    match encode_worklist(&input, &EncoderConfig::default()) {
        Err(Error::MissingRequiredField { fields }) => assert_eq!(fields, vec!["accessionNumber".to_string()]),
        other => panic!("expected missing field error, got {other:?}"),
    }
}

#[test]
fn scenario_uids_are_unique_unless_supplied() {
    let config = EncoderConfig::default();
    let first = encode_worklist(&scenario_input(), &config).expect("first");
    let second = encode_worklist(&scenario_input(), &config).expect("second");
    assert_ne!(first.template.study_instance_uid(), second.template.study_instance_uid());
    assert!(is_valid_uid(first.template.study_instance_uid()));

    let a = encode_instance(&instance_input(), &config).expect("instance a");
    let b = encode_instance(&instance_input(), &config).expect("instance b");
    assert_ne!(a.template.sop_instance_uid(), b.template.sop_instance_uid());

    let supplied = WorklistInput {
        study_instance_uid: Some("1.2.826.0.1.3680043.8.498.1".into()),
        ..scenario_input()
    };
    let encoded = encode_worklist(&supplied, &config).expect("supplied");
    assert_eq!(encoded.template.study_instance_uid(), "1.2.826.0.1.3680043.8.498.1");

    let instance = InstanceInput {
        uids: Some(UidInput {
            study_instance_uid: Some("1.2.3.1".into()),
            series_instance_uid: Some("1.2.3.2".into()),
            sop_instance_uid: Some("1.2.3.3".into()),
        }),
        ..instance_input()
    };
    let encoded = encode_instance(&instance, &config).expect("supplied instance");
    let file = decode_file(&encoded.bytes).expect("decode");
    assert_eq!(file.data_set.string(tags::SERIES_INSTANCE_UID), Some("1.2.3.2"));
    assert_eq!(file.data_set.string(tags::SOP_INSTANCE_UID), Some("1.2.3.3"));
    assert_eq!(file.meta.meta.media_storage_sop_instance_uid, "1.2.3.3");
}

#[test]
fn scenario_empty_sequence_is_a_valid_sq_element() {
    let mut set = DataSet::new();
    set.insert(DataElement::new(tags::PATIENT_ID, dicom_worklist::vr::Vr::LO, "P1"));
    set.insert(DataElement::sequence(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE, Vec::new()));

    let bytes = set.encode().expect("encode");
    let decoded = DataSet::decode(&bytes).expect("decode");
    let items = decoded
        .items(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
        .expect("empty SQ still decodes");
    assert!(items.is_empty());
    assert_eq!(decoded.string(tags::PATIENT_ID), Some("P1"));
}

#[test]
fn encoded_files_have_ordered_even_elements_and_exact_group_length() {
    let config = EncoderConfig::default();
    let worklist = encode_worklist(&scenario_input(), &config).expect("worklist");
    let instance = encode_instance(&instance_input(), &config).expect("instance");

    for bytes in [&worklist.bytes, &instance.bytes] {
        assert!(bytes[..PREAMBLE_LEN].iter().all(|b| *b == 0));
        assert_eq!(&bytes[PREAMBLE_LEN..PREAMBLE_LEN + 4], b"DICM");

        let meta = read_file_meta(bytes).expect("meta");
        assert!(meta.group_length_matches());

        let report = validate::validate_bytes(bytes);
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.ascending_tags);
        assert!(report.odd_length_tags.is_empty());
    }
}

#[test]
fn worklist_round_trips_through_the_decoder() {
    let encoded = encode_worklist(&scenario_input(), &EncoderConfig::default()).expect("encode");
    let file = decode_file(&encoded.bytes).expect("decode");
    let reassembled = encoded.template.assemble();

    assert_eq!(file.data_set, reassembled);
    assert_eq!(file.meta.meta.media_storage_sop_class_uid, tags::MODALITY_WORKLIST_SOP_CLASS);
    assert_eq!(file.meta.meta.transfer_syntax_uid, tags::EXPLICIT_VR_LITTLE_ENDIAN);
}

#[test]
fn dicom_crate_reads_generated_files() {
    let dir = tempdir().expect("tempdir");
    let config = EncoderConfig::default();

    let worklist = encode_worklist(&scenario_input(), &config).expect("worklist");
    let path = dir.path().join("worklist.dcm");
    std::fs::write(&path, &worklist.bytes).expect("write");
    let obj = dicom::object::open_file(&path).expect("dicom crate should parse the worklist");
    let patient_id = obj.element(std_tags::PATIENT_ID).expect("PatientID").to_str().expect("text");
    assert_eq!(patient_id.trim_end(), "P1");
    let accession = obj
        .element(std_tags::ACCESSION_NUMBER)
        .expect("AccessionNumber")
        .to_str()
        .expect("text");
    assert_eq!(accession.trim_end(), "ACC1");

    let instance = encode_instance(&instance_input(), &config).expect("instance");
    let path = dir.path().join("instance.dcm");
    std::fs::write(&path, &instance.bytes).expect("write");
    let obj = dicom::object::open_file(&path).expect("dicom crate should parse the instance");
    let rows = obj.element(std_tags::ROWS).expect("Rows").to_int::<u16>().expect("u16");
    assert_eq!(rows, 8);
    let sop_class = obj.meta().media_storage_sop_class_uid();
    assert_eq!(sop_class.trim_end_matches('\0'), tags::CR_IMAGE_STORAGE);
}

#[test]
fn stored_files_are_listed_validated_and_deleted() {
    let dir = tempdir().expect("tempdir");
    let store = FileStore::new(dir.path()).expect("store");
    let encoded = encode_worklist(&scenario_input(), &EncoderConfig::default()).expect("encode");

    let stored = store.save(encoded.template.accession_number(), &encoded.bytes).expect("save");
    assert!(stored.filename.ends_with(".dcm"));
    assert_eq!(stored.size, encoded.bytes.len() as u64);

    let report = validate::validate_file(&stored.path).expect("validate");
    assert!(report.valid, "{:?}", report.errors);

    let listed = store.list().expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, stored.filename);

    store.delete(&stored.filename).expect("delete");
    assert!(store.list().expect("list").is_empty());
}

#[test]
fn batch_stores_good_records_and_reports_bad_ones() {
    let dir = tempdir().expect("tempdir");
    let store = FileStore::new(dir.path()).expect("store");
    let good = serde_json::to_value(scenario_input()).expect("json");
    let items = vec![good.clone(), json!({"patientId": "P9"}), good];

    let report = run_batch(BatchKind::Worklist, &items, &EncoderConfig::default(), &store);
    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert!(!report.results[1].is_success());
    assert_eq!(store.list().expect("list").len(), 2);
}
