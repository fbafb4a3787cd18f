//
// records.rs
// Dicom-Worklist-rs
//
// Caller-facing input mappings and the sanitized records the assembler turns into data sets.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;

use chrono::{Days, Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::dataset::DataSet;
use crate::error::{Error, Result};
use crate::format::{self, InstanceUids, PersonNameInput};
use crate::tags;

/// Worklist request body as posted by callers (camelCase JSON keys).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorklistInput {
    pub patient_id: Option<String>,
    pub patient_name: Option<PersonNameInput>,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: Option<String>,
    pub accession_number: Option<String>,
    pub study_description: Option<String>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub modality: Option<String>,
    #[serde(rename = "scheduledStationAETitle")]
    pub scheduled_station_ae_title: Option<String>,
    pub scheduled_procedure_step_description: Option<String>,
    pub scheduled_procedure_step_id: Option<String>,
    pub requested_procedure_description: Option<String>,
    pub referring_physician: Option<PersonNameInput>,
    pub performing_physician: Option<PersonNameInput>,
    pub institution_name: Option<String>,
    pub department_name: Option<String>,
}

impl WorklistInput {
    /// A fully populated worklist scheduled for tomorrow afternoon.
    pub fn sample() -> Self {
        let today = Local::now().date_naive();
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        let stamp = Local::now().timestamp_millis();

        Self {
            patient_id: Some(format!("P{stamp}")),
            patient_name: Some("DOE^JOHN^MIDDLE".into()),
            patient_birth_date: Some("1985-05-15".into()),
            patient_sex: Some("M".into()),
            accession_number: Some(format!("ACC{}", stamp % 1_000_000_000)),
            study_description: Some("Chest X-Ray".into()),
            scheduled_date: Some(tomorrow.format("%Y-%m-%d").to_string()),
            scheduled_time: Some("14:30:00".into()),
            modality: Some("CR".into()),
            scheduled_station_ae_title: Some("ORTHANC".into()),
            scheduled_procedure_step_description: Some("Chest X-Ray PA and Lateral".into()),
            requested_procedure_description: Some("Chest X-Ray Examination".into()),
            referring_physician: Some("DR^SMITH".into()),
            ..Self::default()
        }
    }
}

/// Explicit UIDs for an instance; series and SOP instance are required when the block is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UidInput {
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: Option<String>,
    #[serde(rename = "seriesInstanceUID")]
    pub series_instance_uid: Option<String>,
    #[serde(rename = "sopInstanceUID")]
    pub sop_instance_uid: Option<String>,
}

/// Composite instance request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceInput {
    pub patient_id: Option<String>,
    pub patient_name: Option<PersonNameInput>,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,
    pub accession_number: Option<String>,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub study_description: Option<String>,
    pub series_number: Option<i32>,
    pub series_description: Option<String>,
    pub modality: Option<String>,
    #[serde(rename = "sopClassUID")]
    pub sop_class_uid: Option<String>,
    pub instance_number: Option<i32>,
    pub institution_name: Option<String>,
    pub station_name: Option<String>,
    pub referring_physician_name: Option<PersonNameInput>,
    pub performing_physician_name: Option<PersonNameInput>,
    pub uids: Option<UidInput>,
    pub rows: Option<u16>,
    pub columns: Option<u16>,
    pub bits_allocated: Option<u16>,
    pub bits_stored: Option<u16>,
    pub high_bit: Option<u16>,
    pub pixel_representation: Option<u16>,
    pub samples_per_pixel: Option<u16>,
    pub photometric_interpretation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
    #[serde(rename = "U")]
    Unknown,
}

impl Sex {
    /// Accepts any spelling whose first character is M, F, O or U ("male", "f", ...).
    pub fn parse(value: &str) -> Result<Self> {
        let first = value.trim().chars().next().map(|c| c.to_ascii_uppercase());
        match first {
            Some('M') => Ok(Sex::Male),
            Some('F') => Ok(Sex::Female),
            Some('O') => Ok(Sex::Other),
            Some('U') => Ok(Sex::Unknown),
            _ => Err(Error::InvalidValue {
                field: "patientSex",
                value: value.to_string(),
                reason: "expected M, F, O or U",
            }),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Other => "O",
            Sex::Unknown => "U",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    /// PN-formatted, `Last^First^Middle`.
    pub name: String,
    pub birth_date: NaiveDate,
    pub sex: Sex,
}

/// The single step carried in the Scheduled Procedure Step Sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledProcedureStep {
    pub modality: String,
    pub station_ae_title: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub performing_physician: Option<String>,
    pub description: Option<String>,
    pub step_id: String,
}

/// A sanitized scheduled procedure, ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklistRecord {
    pub patient: Patient,
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    pub accession_number: String,
    pub study_description: Option<String>,
    pub requested_procedure_description: Option<String>,
    pub referring_physician: Option<String>,
    pub institution_name: String,
    pub department_name: String,
    pub scheduled_step: ScheduledProcedureStep,
}

fn text(set: &DataSet, tag: crate::element::Tag, name: &str) -> Result<String> {
    set.string(tag)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::missing([name]))
}

fn optional_text(set: &DataSet, tag: crate::element::Tag) -> Option<String> {
    set.string(tag).filter(|s| !s.is_empty()).map(str::to_string)
}

impl WorklistRecord {
    /// Rebuild a record from a decoded worklist data set.
    pub fn from_data_set(set: &DataSet) -> Result<Self> {
        let patient = Patient {
            id: text(set, tags::PATIENT_ID, "patientId")?,
            name: text(set, tags::PATIENT_NAME, "patientName")?,
            birth_date: format::parse_da(&text(set, tags::PATIENT_BIRTH_DATE, "patientBirthDate")?)?,
            sex: Sex::parse(&text(set, tags::PATIENT_SEX, "patientSex")?)?,
        };

        let step = set
            .items(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
            .and_then(|items| items.first())
            .ok_or_else(|| Error::missing(["scheduledProcedureStepSequence"]))?;
        let scheduled_step = ScheduledProcedureStep {
            modality: text(step, tags::MODALITY, "modality")?,
            station_ae_title: text(step, tags::SCHEDULED_STATION_AE_TITLE, "scheduledStationAETitle")?,
            start_date: format::parse_da(&text(
                step,
                tags::SCHEDULED_PROCEDURE_STEP_START_DATE,
                "scheduledDate",
            )?)?,
            start_time: format::parse_tm(&text(
                step,
                tags::SCHEDULED_PROCEDURE_STEP_START_TIME,
                "scheduledTime",
            )?)?,
            performing_physician: optional_text(step, tags::SCHEDULED_PERFORMING_PHYSICIAN_NAME),
            description: optional_text(step, tags::SCHEDULED_PROCEDURE_STEP_DESCRIPTION),
            step_id: text(step, tags::SCHEDULED_PROCEDURE_STEP_ID, "scheduledProcedureStepId")?,
        };

        Ok(Self {
            patient,
            study_instance_uid: text(set, tags::STUDY_INSTANCE_UID, "studyInstanceUID")?,
            accession_number: text(set, tags::ACCESSION_NUMBER, "accessionNumber")?,
            study_description: optional_text(set, tags::STUDY_DESCRIPTION),
            requested_procedure_description: optional_text(set, tags::REQUESTED_PROCEDURE_DESCRIPTION),
            referring_physician: optional_text(set, tags::REFERRING_PHYSICIAN_NAME),
            institution_name: optional_text(set, tags::INSTITUTION_NAME).unwrap_or_default(),
            department_name: optional_text(set, tags::INSTITUTIONAL_DEPARTMENT_NAME).unwrap_or_default(),
            scheduled_step,
        })
    }
}

/// Image Pixel module values; the placeholder pixel data is sized from these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGeometry {
    pub rows: u16,
    pub columns: u16,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub high_bit: u16,
    pub pixel_representation: u16,
    pub photometric_interpretation: String,
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self {
            rows: 512,
            columns: 512,
            samples_per_pixel: 1,
            bits_allocated: 16,
            bits_stored: 12,
            high_bit: 11,
            pixel_representation: 0,
            photometric_interpretation: "MONOCHROME2".into(),
        }
    }
}

/// Largest placeholder Pixel Data accepted when assembling an instance (256 MiB).
pub const MAX_PIXEL_DATA_LEN: u64 = 256 * 1024 * 1024;

impl ImageGeometry {
    /// rows × columns × samples × bytes per sample. Every factor is 16-bit, so the product fits a `u64`.
    pub fn pixel_data_len(&self) -> u64 {
        u64::from(self.rows)
            * u64::from(self.columns)
            * u64::from(self.samples_per_pixel)
            * u64::from(self.bits_allocated).div_ceil(8)
    }
}

/// A sanitized composite instance, ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub patient: Patient,
    pub accession_number: String,
    pub study_date: NaiveDate,
    pub study_time: NaiveTime,
    pub study_description: Option<String>,
    pub series_number: i32,
    pub series_description: Option<String>,
    pub modality: String,
    #[serde(rename = "sopClassUID")]
    pub sop_class_uid: String,
    pub instance_number: i32,
    pub institution_name: String,
    pub station_name: Option<String>,
    pub referring_physician_name: Option<String>,
    pub performing_physician_name: Option<String>,
    pub uids: InstanceUids,
    pub image: ImageGeometry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worklist_input_reads_camel_case_json() {
        let input: WorklistInput = serde_json::from_str(
            r#"{
                "patientId": "P1",
                "patientName": {"firstName": "John", "lastName": "Doe"},
                "patientBirthDate": "1985-05-15",
                "patientSex": "M",
                "studyInstanceUID": "1.2.3",
                "scheduledStationAETitle": "CR01",
                "accessionNumber": "ACC1"
            }"#,
        )
        .unwrap();

        assert_eq!(input.patient_id.as_deref(), Some("P1"));
        assert_eq!(input.study_instance_uid.as_deref(), Some("1.2.3"));
        assert_eq!(input.scheduled_station_ae_title.as_deref(), Some("CR01"));
        assert!(matches!(input.patient_name, Some(PersonNameInput::Structured { .. })));
        assert!(input.scheduled_date.is_none());
    }

    #[test]
    fn instance_input_reads_uid_block() {
        let input: InstanceInput = serde_json::from_str(
            r#"{"patientId": "P1", "rows": 256, "uids": {"seriesInstanceUID": "1.2.3.2", "sopInstanceUID": "1.2.3.3"}}"#,
        )
        .unwrap();
        let uids = input.uids.unwrap();
        assert_eq!(uids.series_instance_uid.as_deref(), Some("1.2.3.2"));
        assert!(uids.study_instance_uid.is_none());
        assert_eq!(input.rows, Some(256));
    }

    #[test]
    fn sex_keeps_first_character() {
        assert_eq!(Sex::parse("male").unwrap(), Sex::Male);
        assert_eq!(Sex::parse(" f").unwrap(), Sex::Female);
        assert_eq!(Sex::parse("O").unwrap().code(), "O");
        assert!(matches!(Sex::parse("X"), Err(Error::InvalidValue { field: "patientSex", .. })));
        assert!(Sex::parse("").is_err());
    }

    #[test]
    fn pixel_data_length_follows_geometry() {
        let geometry = ImageGeometry::default();
        assert_eq!(geometry.pixel_data_len(), 512 * 512 * 2);

        let rgb = ImageGeometry {
            rows: 3,
            columns: 3,
            samples_per_pixel: 3,
            bits_allocated: 8,
            bits_stored: 8,
            high_bit: 7,
            photometric_interpretation: "RGB".into(),
            ..ImageGeometry::default()
        };
        assert_eq!(rgb.pixel_data_len(), 27);
    }

    #[test]
    fn integer_strings_stay_within_signed_32_bits() {
        let input: InstanceInput = serde_json::from_str(r#"{"seriesNumber": -4, "instanceNumber": 2147483647}"#).unwrap();
        assert_eq!(input.series_number, Some(-4));
        assert_eq!(input.instance_number, Some(i32::MAX));

        let too_large = serde_json::from_str::<InstanceInput>(r#"{"instanceNumber": 2147483648}"#);
        assert!(too_large.is_err());
    }

    #[test]
    fn sample_is_scheduled_for_tomorrow() {
        let sample = WorklistInput::sample();
        let date = format::parse_date(sample.scheduled_date.as_deref().unwrap()).unwrap();
        assert!(date > Local::now().date_naive());
        assert_eq!(sample.patient_name, Some(PersonNameInput::from("DOE^JOHN^MIDDLE")));
    }
}
