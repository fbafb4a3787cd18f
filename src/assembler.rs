//
// assembler.rs
// Dicom-Worklist-rs
//
// Validates and sanitizes caller input, then lays out the worklist or composite instance data set.
//
// Thales Matheus Mendonça Santos - November 2025

use chrono::Local;
use serde::Serialize;
use tracing::debug;

use crate::config::EncoderConfig;
use crate::dataset::DataSet;
use crate::element::{DataElement, Tag, Value};
use crate::error::{Error, Result};
use crate::format::{self, InstanceUids, PersonNameInput};
use crate::records::{
    ImageGeometry, InstanceInput, InstanceRecord, Patient, ScheduledProcedureStep, Sex, WorklistInput,
    WorklistRecord, MAX_PIXEL_DATA_LEN,
};
use crate::tags;
use crate::vr::Vr;

/// Which information object a data set is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DataSetTemplate {
    Worklist(WorklistRecord),
    CompositeInstance(InstanceRecord),
}

impl DataSetTemplate {
    pub fn sop_class_uid(&self) -> &str {
        match self {
            DataSetTemplate::Worklist(_) => tags::MODALITY_WORKLIST_SOP_CLASS,
            DataSetTemplate::CompositeInstance(record) => &record.sop_class_uid,
        }
    }

    /// SOP Instance UID carried by the data set; worklists have none of their own.
    pub fn sop_instance_uid(&self) -> Option<&str> {
        match self {
            DataSetTemplate::Worklist(_) => None,
            DataSetTemplate::CompositeInstance(record) => Some(&record.uids.sop_instance_uid),
        }
    }

    pub fn accession_number(&self) -> &str {
        match self {
            DataSetTemplate::Worklist(record) => &record.accession_number,
            DataSetTemplate::CompositeInstance(record) => &record.accession_number,
        }
    }

    pub fn study_instance_uid(&self) -> &str {
        match self {
            DataSetTemplate::Worklist(record) => &record.study_instance_uid,
            DataSetTemplate::CompositeInstance(record) => &record.uids.study_instance_uid,
        }
    }

    /// Element layout for this template. Insertion keeps the result in ascending tag order.
    pub fn assemble(&self) -> DataSet {
        match self {
            DataSetTemplate::Worklist(record) => worklist_data_set(record),
            DataSetTemplate::CompositeInstance(record) => instance_data_set(record),
        }
    }
}

/// Collects every absent required field before failing.
#[derive(Default)]
struct Required {
    missing: Vec<&'static str>,
}

impl Required {
    fn text(&mut self, field: &'static str, value: &Option<String>) -> String {
        trimmed(value).unwrap_or_else(|| {
            self.missing.push(field);
            String::new()
        })
    }

    fn name(&mut self, field: &'static str, value: &Option<PersonNameInput>) -> PersonNameInput {
        match value {
            Some(name) if !name_is_blank(name) => name.clone(),
            _ => {
                self.missing.push(field);
                PersonNameInput::Formatted(String::new())
            }
        }
    }

    fn finish(self) -> Result<()> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(Error::missing(self.missing))
        }
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn name_is_blank(name: &PersonNameInput) -> bool {
    match name {
        PersonNameInput::Formatted(raw) => raw.trim().is_empty(),
        PersonNameInput::Structured {
            first_name,
            last_name,
            middle_name,
        } => [first_name, last_name, middle_name].iter().all(|c| c.trim().is_empty()),
    }
}

fn optional_name(value: &Option<PersonNameInput>) -> Result<Option<String>> {
    match value {
        Some(name) if !name_is_blank(name) => format::format_person_name(name).map(Some),
        _ => Ok(None),
    }
}

fn checked_uid(field: &'static str, uid: String) -> Result<String> {
    if format::is_valid_uid(&uid) {
        Ok(uid)
    } else {
        Err(Error::InvalidValue {
            field,
            value: uid,
            reason: "not a valid UID",
        })
    }
}

fn patient(id: String, name: &PersonNameInput, birth_date: &str, sex: &str) -> Result<Patient> {
    Ok(Patient {
        id,
        name: format::format_person_name(name)?,
        birth_date: format::parse_date(birth_date)?,
        sex: Sex::parse(sex)?,
    })
}

/// Check required fields, normalize values and substitute configured defaults.
pub fn prepare_worklist(input: &WorklistInput, config: &EncoderConfig) -> Result<WorklistRecord> {
    let mut required = Required::default();
    let patient_id = required.text("patientId", &input.patient_id);
    let patient_name = required.name("patientName", &input.patient_name);
    let birth_date = required.text("patientBirthDate", &input.patient_birth_date);
    let sex = required.text("patientSex", &input.patient_sex);
    let accession_number = required.text("accessionNumber", &input.accession_number);
    let scheduled_date = required.text("scheduledDate", &input.scheduled_date);
    let scheduled_time = required.text("scheduledTime", &input.scheduled_time);
    required.finish()?;

    let study_instance_uid = match trimmed(&input.study_instance_uid) {
        Some(uid) => checked_uid("studyInstanceUID", uid)?,
        None => format::generate_uid(&config.org_root),
    };

    let scheduled_step = ScheduledProcedureStep {
        modality: trimmed(&input.modality)
            .unwrap_or_else(|| config.default_modality.clone())
            .to_uppercase(),
        station_ae_title: trimmed(&input.scheduled_station_ae_title)
            .unwrap_or_else(|| config.default_station_ae_title.clone()),
        start_date: format::parse_date(&scheduled_date)?,
        start_time: format::parse_time(&scheduled_time)?,
        performing_physician: optional_name(&input.performing_physician)?,
        description: trimmed(&input.scheduled_procedure_step_description),
        step_id: trimmed(&input.scheduled_procedure_step_id).unwrap_or_else(|| accession_number.clone()),
    };

    let record = WorklistRecord {
        patient: patient(patient_id, &patient_name, &birth_date, &sex)?,
        study_instance_uid,
        accession_number,
        study_description: trimmed(&input.study_description),
        requested_procedure_description: trimmed(&input.requested_procedure_description),
        referring_physician: optional_name(&input.referring_physician)?,
        institution_name: trimmed(&input.institution_name).unwrap_or_else(|| config.institution_name.clone()),
        department_name: trimmed(&input.department_name).unwrap_or_else(|| config.department_name.clone()),
        scheduled_step,
    };
    debug!(accession = %record.accession_number, study = %record.study_instance_uid, "prepared worklist record");
    Ok(record)
}

fn instance_uids(input: &InstanceInput, config: &EncoderConfig, required: &mut Required) -> InstanceUids {
    let Some(block) = &input.uids else {
        return format::generate_instance_uids(&config.org_root);
    };
    let series = required.text("seriesInstanceUID", &block.series_instance_uid);
    let sop = required.text("sopInstanceUID", &block.sop_instance_uid);
    let study = trimmed(&block.study_instance_uid).unwrap_or_else(|| format::generate_uid(&config.org_root));
    InstanceUids {
        study_instance_uid: study,
        series_instance_uid: series,
        sop_instance_uid: sop,
    }
}

fn geometry(input: &InstanceInput) -> Result<ImageGeometry> {
    let defaults = ImageGeometry::default();
    let bits_allocated = input.bits_allocated.unwrap_or(defaults.bits_allocated);
    let bits_stored = input
        .bits_stored
        .unwrap_or_else(|| defaults.bits_stored.min(bits_allocated));
    let geometry = ImageGeometry {
        rows: input.rows.unwrap_or(defaults.rows),
        columns: input.columns.unwrap_or(defaults.columns),
        samples_per_pixel: input.samples_per_pixel.unwrap_or(defaults.samples_per_pixel),
        bits_allocated,
        bits_stored,
        high_bit: input.high_bit.unwrap_or_else(|| bits_stored.saturating_sub(1)),
        pixel_representation: input.pixel_representation.unwrap_or(defaults.pixel_representation),
        photometric_interpretation: trimmed(&input.photometric_interpretation)
            .map(|p| p.to_uppercase())
            .unwrap_or(defaults.photometric_interpretation),
    };

    let invalid = |field: &'static str, value: u16, reason: &'static str| Error::InvalidValue {
        field,
        value: value.to_string(),
        reason,
    };
    if geometry.rows == 0 || geometry.columns == 0 {
        return Err(invalid("rows", geometry.rows.min(geometry.columns), "image must not be empty"));
    }
    if geometry.samples_per_pixel == 0 {
        return Err(invalid("samplesPerPixel", 0, "must be at least 1"));
    }
    if bits_allocated == 0 || bits_allocated % 8 != 0 || bits_allocated > 32 {
        return Err(invalid("bitsAllocated", bits_allocated, "must be 8, 16, 24 or 32"));
    }
    if geometry.bits_stored == 0 || geometry.bits_stored > bits_allocated {
        return Err(invalid("bitsStored", geometry.bits_stored, "must be between 1 and bitsAllocated"));
    }
    if geometry.high_bit >= bits_allocated {
        return Err(invalid("highBit", geometry.high_bit, "must be below bitsAllocated"));
    }
    if geometry.pixel_representation > 1 {
        return Err(invalid("pixelRepresentation", geometry.pixel_representation, "must be 0 or 1"));
    }
    let len = geometry.pixel_data_len();
    if len > MAX_PIXEL_DATA_LEN {
        return Err(Error::InvalidValue {
            field: "rows",
            value: format!(
                "{}x{}x{} at {} bits ({len} bytes)",
                geometry.rows, geometry.columns, geometry.samples_per_pixel, bits_allocated
            ),
            reason: "pixel data would exceed 256 MiB",
        });
    }
    Ok(geometry)
}

/// Check required fields, generate missing UIDs and apply instance defaults.
pub fn prepare_instance(input: &InstanceInput, config: &EncoderConfig) -> Result<InstanceRecord> {
    let mut required = Required::default();
    let patient_id = required.text("patientId", &input.patient_id);
    let patient_name = required.name("patientName", &input.patient_name);
    let birth_date = required.text("patientBirthDate", &input.patient_birth_date);
    let sex = required.text("patientSex", &input.patient_sex);
    let accession_number = required.text("accessionNumber", &input.accession_number);
    let uids = instance_uids(input, config, &mut required);
    required.finish()?;

    let uids = InstanceUids {
        study_instance_uid: checked_uid("studyInstanceUID", uids.study_instance_uid)?,
        series_instance_uid: checked_uid("seriesInstanceUID", uids.series_instance_uid)?,
        sop_instance_uid: checked_uid("sopInstanceUID", uids.sop_instance_uid)?,
    };

    let now = Local::now().naive_local();
    let study_date = match trimmed(&input.study_date) {
        Some(date) => format::parse_date(&date)?,
        None => now.date(),
    };
    let study_time = match trimmed(&input.study_time) {
        Some(time) => format::parse_time(&time)?,
        None => now.time(),
    };

    let record = InstanceRecord {
        patient: patient(patient_id, &patient_name, &birth_date, &sex)?,
        accession_number,
        study_date,
        study_time,
        study_description: trimmed(&input.study_description),
        series_number: input.series_number.unwrap_or(1),
        series_description: trimmed(&input.series_description),
        modality: trimmed(&input.modality)
            .unwrap_or_else(|| config.default_modality.clone())
            .to_uppercase(),
        sop_class_uid: checked_uid(
            "sopClassUID",
            trimmed(&input.sop_class_uid).unwrap_or_else(|| tags::CR_IMAGE_STORAGE.to_string()),
        )?,
        instance_number: input.instance_number.unwrap_or(1),
        institution_name: trimmed(&input.institution_name).unwrap_or_else(|| config.institution_name.clone()),
        station_name: trimmed(&input.station_name),
        referring_physician_name: optional_name(&input.referring_physician_name)?,
        performing_physician_name: optional_name(&input.performing_physician_name)?,
        uids,
        image: geometry(input)?,
    };
    debug!(accession = %record.accession_number, sop = %record.uids.sop_instance_uid, "prepared instance record");
    Ok(record)
}

fn text(tag: Tag, vr: Vr, value: impl Into<String>) -> DataElement {
    DataElement::new(tag, vr, Value::Text(value.into()))
}

fn us(tag: Tag, value: u16) -> DataElement {
    DataElement::new(tag, Vr::US, Value::U16(value))
}

/// Type 3: omitted when absent.
fn insert_optional(set: &mut DataSet, tag: Tag, vr: Vr, value: Option<&String>) {
    if let Some(value) = value {
        set.insert(text(tag, vr, value.as_str()));
    }
}

/// Type 2: present, zero length when absent.
fn insert_type2(set: &mut DataSet, tag: Tag, vr: Vr, value: Option<&String>) {
    set.insert(text(tag, vr, value.map(String::as_str).unwrap_or_default()));
}

fn insert_patient(set: &mut DataSet, patient: &Patient) {
    set.insert(text(tags::PATIENT_NAME, Vr::PN, patient.name.as_str()));
    set.insert(text(tags::PATIENT_ID, Vr::LO, patient.id.as_str()));
    set.insert(text(tags::PATIENT_BIRTH_DATE, Vr::DA, format::to_da(&patient.birth_date)));
    set.insert(text(tags::PATIENT_SEX, Vr::CS, patient.sex.code()));
}

fn scheduled_step_item(step: &ScheduledProcedureStep) -> DataSet {
    let mut item = DataSet::new();
    item.insert(text(tags::MODALITY, Vr::CS, step.modality.as_str()));
    item.insert(text(tags::SCHEDULED_STATION_AE_TITLE, Vr::AE, step.station_ae_title.as_str()));
    item.insert(text(
        tags::SCHEDULED_PROCEDURE_STEP_START_DATE,
        Vr::DA,
        format::to_da(&step.start_date),
    ));
    item.insert(text(
        tags::SCHEDULED_PROCEDURE_STEP_START_TIME,
        Vr::TM,
        format::to_tm(&step.start_time),
    ));
    insert_optional(
        &mut item,
        tags::SCHEDULED_PERFORMING_PHYSICIAN_NAME,
        Vr::PN,
        step.performing_physician.as_ref(),
    );
    insert_optional(
        &mut item,
        tags::SCHEDULED_PROCEDURE_STEP_DESCRIPTION,
        Vr::LO,
        step.description.as_ref(),
    );
    item.insert(text(tags::SCHEDULED_PROCEDURE_STEP_ID, Vr::SH, step.step_id.as_str()));
    item
}

fn worklist_data_set(record: &WorklistRecord) -> DataSet {
    let mut set = DataSet::new();
    set.insert(text(tags::SPECIFIC_CHARACTER_SET, Vr::CS, tags::ISO_IR_100));
    set.insert(text(tags::ACCESSION_NUMBER, Vr::SH, record.accession_number.as_str()));
    set.insert(text(tags::INSTITUTION_NAME, Vr::LO, record.institution_name.as_str()));
    insert_type2(
        &mut set,
        tags::REFERRING_PHYSICIAN_NAME,
        Vr::PN,
        record.referring_physician.as_ref(),
    );
    insert_type2(&mut set, tags::STUDY_DESCRIPTION, Vr::LO, record.study_description.as_ref());
    set.insert(text(
        tags::INSTITUTIONAL_DEPARTMENT_NAME,
        Vr::LO,
        record.department_name.as_str(),
    ));
    insert_patient(&mut set, &record.patient);
    set.insert(text(tags::STUDY_INSTANCE_UID, Vr::UI, record.study_instance_uid.as_str()));
    insert_optional(
        &mut set,
        tags::REQUESTED_PROCEDURE_DESCRIPTION,
        Vr::LO,
        record.requested_procedure_description.as_ref(),
    );
    set.insert(DataElement::sequence(
        tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE,
        vec![scheduled_step_item(&record.scheduled_step)],
    ));
    set.insert(text(tags::REQUESTED_PROCEDURE_ID, Vr::SH, record.accession_number.as_str()));
    set
}

fn instance_data_set(record: &InstanceRecord) -> DataSet {
    let mut set = DataSet::new();
    set.insert(text(tags::SPECIFIC_CHARACTER_SET, Vr::CS, tags::ISO_IR_100));
    set.insert(text(tags::SOP_CLASS_UID, Vr::UI, record.sop_class_uid.as_str()));
    set.insert(text(tags::SOP_INSTANCE_UID, Vr::UI, record.uids.sop_instance_uid.as_str()));
    set.insert(text(tags::STUDY_DATE, Vr::DA, format::to_da(&record.study_date)));
    set.insert(text(tags::STUDY_TIME, Vr::TM, format::to_tm(&record.study_time)));
    set.insert(text(tags::ACCESSION_NUMBER, Vr::SH, record.accession_number.as_str()));
    set.insert(text(tags::MODALITY, Vr::CS, record.modality.as_str()));
    set.insert(text(tags::INSTITUTION_NAME, Vr::LO, record.institution_name.as_str()));
    insert_type2(
        &mut set,
        tags::REFERRING_PHYSICIAN_NAME,
        Vr::PN,
        record.referring_physician_name.as_ref(),
    );
    insert_optional(&mut set, tags::STATION_NAME, Vr::SH, record.station_name.as_ref());
    insert_optional(&mut set, tags::STUDY_DESCRIPTION, Vr::LO, record.study_description.as_ref());
    insert_optional(&mut set, tags::SERIES_DESCRIPTION, Vr::LO, record.series_description.as_ref());
    insert_optional(
        &mut set,
        tags::PERFORMING_PHYSICIAN_NAME,
        Vr::PN,
        record.performing_physician_name.as_ref(),
    );
    insert_patient(&mut set, &record.patient);

    set.insert(text(tags::STUDY_INSTANCE_UID, Vr::UI, record.uids.study_instance_uid.as_str()));
    set.insert(text(tags::SERIES_INSTANCE_UID, Vr::UI, record.uids.series_instance_uid.as_str()));
    set.insert(text(tags::SERIES_NUMBER, Vr::IS, record.series_number.to_string()));
    set.insert(text(tags::INSTANCE_NUMBER, Vr::IS, record.instance_number.to_string()));

    let image = &record.image;
    set.insert(us(tags::SAMPLES_PER_PIXEL, image.samples_per_pixel));
    set.insert(text(
        tags::PHOTOMETRIC_INTERPRETATION,
        Vr::CS,
        image.photometric_interpretation.as_str(),
    ));
    set.insert(us(tags::ROWS, image.rows));
    set.insert(us(tags::COLUMNS, image.columns));
    set.insert(us(tags::BITS_ALLOCATED, image.bits_allocated));
    set.insert(us(tags::BITS_STORED, image.bits_stored));
    set.insert(us(tags::HIGH_BIT, image.high_bit));
    set.insert(us(tags::PIXEL_REPRESENTATION, image.pixel_representation));

    let pixel_vr = if image.bits_allocated > 8 { Vr::OW } else { Vr::OB };
    set.insert(DataElement::new(
        tags::PIXEL_DATA,
        pixel_vr,
        Value::Bytes(vec![0; image.pixel_data_len() as usize]),
    ));
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::UidInput;

    fn worklist_input() -> WorklistInput {
        WorklistInput {
            patient_id: Some("P1".into()),
            patient_name: Some("DOE^JOHN".into()),
            patient_birth_date: Some("1985-05-15".into()),
            patient_sex: Some("m".into()),
            accession_number: Some("ACC1".into()),
            scheduled_date: Some("2025-08-23".into()),
            scheduled_time: Some("14:30".into()),
            modality: Some("cr".into()),
            ..WorklistInput::default()
        }
    }

    fn instance_input() -> InstanceInput {
        InstanceInput {
            patient_id: Some("P1".into()),
            patient_name: Some("John Doe".into()),
            patient_birth_date: Some("19850515".into()),
            patient_sex: Some("F".into()),
            accession_number: Some("ACC1".into()),
            rows: Some(4),
            columns: Some(4),
            ..InstanceInput::default()
        }
    }

    #[test]
    fn every_missing_worklist_field_is_reported() {
        let err = prepare_worklist(&WorklistInput::default(), &EncoderConfig::default()).unwrap_err();
        match err {
            Error::MissingRequiredField { fields } => assert_eq!(
                fields,
                [
                    "patientId",
                    "patientName",
                    "patientBirthDate",
                    "patientSex",
                    "accessionNumber",
                    "scheduledDate",
                    "scheduledTime"
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut input = worklist_input();
        input.accession_number = Some("   ".into());
        input.patient_name = Some(PersonNameInput::Structured {
            first_name: String::new(),
            last_name: " ".into(),
            middle_name: String::new(),
        });
        let err = prepare_worklist(&input, &EncoderConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingRequiredField { ref fields } if fields == &["patientName", "accessionNumber"]
        ));
    }

    #[test]
    fn worklist_values_are_sanitized_and_defaulted() {
        let config = EncoderConfig::default();
        let record = prepare_worklist(&worklist_input(), &config).unwrap();
        assert_eq!(record.patient.sex, Sex::Male);
        assert_eq!(record.scheduled_step.modality, "CR");
        assert_eq!(record.scheduled_step.station_ae_title, config.default_station_ae_title);
        assert_eq!(record.scheduled_step.step_id, "ACC1");
        assert_eq!(record.institution_name, config.institution_name);
        assert!(record.study_instance_uid.starts_with(&config.org_root));
        assert!(record.referring_physician.is_none());
    }

    #[test]
    fn supplied_study_uid_is_validated() {
        let mut input = worklist_input();
        input.study_instance_uid = Some("1.2.840.99".into());
        let record = prepare_worklist(&input, &EncoderConfig::default()).unwrap();
        assert_eq!(record.study_instance_uid, "1.2.840.99");

        input.study_instance_uid = Some("1.2.abc".into());
        assert!(matches!(
            prepare_worklist(&input, &EncoderConfig::default()),
            Err(Error::InvalidValue { field: "studyInstanceUID", .. })
        ));
    }

    #[test]
    fn worklist_data_set_follows_the_template() {
        let record = prepare_worklist(&worklist_input(), &EncoderConfig::default()).unwrap();
        let set = DataSetTemplate::Worklist(record).assemble();

        assert!(set.is_strictly_ascending());
        assert_eq!(set.string(tags::SPECIFIC_CHARACTER_SET), Some("ISO_IR 100"));
        assert_eq!(set.string(tags::REFERRING_PHYSICIAN_NAME), Some(""));
        assert!(!set.contains(tags::REQUESTED_PROCEDURE_DESCRIPTION));
        assert_eq!(set.string(tags::REQUESTED_PROCEDURE_ID), Some("ACC1"));

        let items = set.items(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].string(tags::SCHEDULED_PROCEDURE_STEP_START_DATE), Some("20250823"));
        assert_eq!(items[0].string(tags::SCHEDULED_PROCEDURE_STEP_START_TIME), Some("143000"));
        assert!(!items[0].contains(tags::SCHEDULED_PERFORMING_PHYSICIAN_NAME));
    }

    #[test]
    fn instance_uids_are_generated_without_a_block() {
        let config = EncoderConfig::default();
        let record = prepare_instance(&instance_input(), &config).unwrap();
        assert!(record.uids.study_instance_uid.starts_with(&config.org_root));
        assert!(format::is_valid_uid(&record.uids.sop_instance_uid));
        assert_ne!(record.uids.series_instance_uid, record.uids.sop_instance_uid);
        assert_eq!(record.patient.name, "Doe^John");
        assert_eq!(record.sop_class_uid, tags::CR_IMAGE_STORAGE);
    }

    #[test]
    fn uid_block_requires_series_and_sop() {
        let mut input = instance_input();
        input.uids = Some(UidInput {
            study_instance_uid: Some("1.2.3".into()),
            ..UidInput::default()
        });
        let err = prepare_instance(&input, &EncoderConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingRequiredField { ref fields } if fields == &["seriesInstanceUID", "sopInstanceUID"]
        ));
    }

    #[test]
    fn uid_block_passes_through_and_fills_study() {
        let mut input = instance_input();
        input.uids = Some(UidInput {
            study_instance_uid: None,
            series_instance_uid: Some("1.2.3.2".into()),
            sop_instance_uid: Some("1.2.3.3".into()),
        });
        let config = EncoderConfig::default();
        let record = prepare_instance(&input, &config).unwrap();
        assert_eq!(record.uids.series_instance_uid, "1.2.3.2");
        assert_eq!(record.uids.sop_instance_uid, "1.2.3.3");
        assert!(record.uids.study_instance_uid.starts_with(&config.org_root));
    }

    #[test]
    fn instance_pixel_data_matches_geometry() {
        let record = prepare_instance(&instance_input(), &EncoderConfig::default()).unwrap();
        let set = DataSetTemplate::CompositeInstance(record).assemble();
        assert!(set.is_strictly_ascending());

        let pixels = set.get(tags::PIXEL_DATA).unwrap();
        assert_eq!(pixels.vr, Vr::OW);
        assert!(matches!(&pixels.value, Value::Bytes(b) if b.len() == 4 * 4 * 2));
        assert_eq!(set.u16(tags::ROWS), Some(4));
        assert_eq!(set.u16(tags::HIGH_BIT), Some(11));
        assert_eq!(set.string(tags::SERIES_NUMBER), Some("1"));

        let mut eight_bit = instance_input();
        eight_bit.bits_allocated = Some(8);
        let record = prepare_instance(&eight_bit, &EncoderConfig::default()).unwrap();
        assert_eq!(record.image.bits_stored, 8);
        assert_eq!(record.image.high_bit, 7);
        let set = DataSetTemplate::CompositeInstance(record).assemble();
        assert_eq!(set.get(tags::PIXEL_DATA).unwrap().vr, Vr::OB);
    }

    #[test]
    fn inconsistent_geometry_is_rejected() {
        let mut input = instance_input();
        input.bits_stored = Some(20);
        assert!(matches!(
            prepare_instance(&input, &EncoderConfig::default()),
            Err(Error::InvalidValue { field: "bitsStored", .. })
        ));

        let mut input = instance_input();
        input.bits_allocated = Some(12);
        assert!(prepare_instance(&input, &EncoderConfig::default()).is_err());
    }

    #[test]
    fn oversized_pixel_data_is_rejected_before_allocation() {
        let mut input = instance_input();
        input.rows = Some(u16::MAX);
        input.columns = Some(u16::MAX);
        input.samples_per_pixel = Some(u16::MAX);
        input.bits_allocated = Some(32);
        input.bits_stored = Some(32);
        assert!(matches!(
            prepare_instance(&input, &EncoderConfig::default()),
            Err(Error::InvalidValue { field: "rows", .. })
        ));

        // 8193 x 16384 x 16 bits is one row over the limit; 8192 rows fits exactly.
        let mut input = instance_input();
        input.rows = Some(8193);
        input.columns = Some(16384);
        assert!(prepare_instance(&input, &EncoderConfig::default()).is_err());
        input.rows = Some(8192);
        let record = prepare_instance(&input, &EncoderConfig::default()).unwrap();
        assert_eq!(record.image.pixel_data_len(), MAX_PIXEL_DATA_LEN);
    }

    #[test]
    fn invalid_sex_is_rejected() {
        let mut input = worklist_input();
        input.patient_sex = Some("X".into());
        assert!(matches!(
            prepare_worklist(&input, &EncoderConfig::default()),
            Err(Error::InvalidValue { field: "patientSex", .. })
        ));
    }
}
