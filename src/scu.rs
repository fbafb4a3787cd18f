//
// scu.rs
// Dicom-Worklist-rs
//
// C-ECHO, C-STORE and C-FIND service class user operations against the configured PACS.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use anyhow::{bail, Context, Result};
use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::encoding::TransferSyntax;
use dicom::object::{open_file, InMemDicomObject};
use dicom_ul::association::client::{ClientAssociation, ClientAssociationOptions};
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu, PresentationContextResultReason};
use serde::Serialize;
use tracing::{debug, info, warn};

// Import Registry
use dicom::transfer_syntax::TransferSyntaxRegistry;
// Import Index trait to enable .get().
use dicom::encoding::TransferSyntaxIndex;

use crate::config::PacsConfig;
use crate::element::Tag as ElementTag;
use crate::format;
use crate::tags;

const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
const PATIENT_ROOT_FIND: &str = "1.2.840.10008.5.1.4.1.2.1.1";
const STUDY_ROOT_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";
const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

const COMMAND_AFFECTED_SOP_CLASS_UID: Tag = Tag(0x0000, 0x0002);
const COMMAND_FIELD: Tag = Tag(0x0000, 0x0100);
const COMMAND_MESSAGE_ID: Tag = Tag(0x0000, 0x0110);
const COMMAND_PRIORITY: Tag = Tag(0x0000, 0x0700);
const COMMAND_DATA_SET_TYPE: Tag = Tag(0x0000, 0x0800);
const COMMAND_STATUS: Tag = Tag(0x0000, 0x0900);
const COMMAND_AFFECTED_SOP_INSTANCE_UID: Tag = Tag(0x0000, 0x1000);

/// Command Data Set Type value meaning "no data set follows".
const NO_DATA_SET: u16 = 0x0101;

/// DIMSE status returned by the peer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimseOutcome {
    pub status: u16,
    pub warning: bool,
}

fn connect(pacs: &PacsConfig, abstract_syntax: &str) -> Result<(ClientAssociation, u8)> {
    let association = ClientAssociationOptions::new()
        .calling_ae_title(pacs.calling_ae_title.clone())
        .called_ae_title(pacs.called_ae_title.clone())
        .with_abstract_syntax(abstract_syntax.to_string())
        .establish(pacs.address.as_str())
        .with_context(|| format!("Failed to establish association with {}", pacs.address))?;

    let pc_id = association
        .presentation_contexts()
        .iter()
        .find(|pc| pc.reason == PresentationContextResultReason::Acceptance)
        .map(|pc| pc.id)
        .with_context(|| format!("No accepted presentation context for {abstract_syntax}"))?;
    Ok((association, pc_id))
}

fn put_us(cmd: &mut InMemDicomObject, tag: Tag, value: u16) {
    cmd.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

fn encode_command(cmd: &InMemDicomObject) -> Result<Vec<u8>> {
    // Command sets are always implicit VR little endian.
    let mut command_bytes = Vec::new();
    cmd.write_dataset_with_ts(&mut command_bytes, implicit_vr_le()?)
        .context("Failed to encode command set")?;
    Ok(command_bytes)
}

fn implicit_vr_le() -> Result<&'static TransferSyntax> {
    TransferSyntaxRegistry
        .get(IMPLICIT_VR_LITTLE_ENDIAN)
        .context("Implicit VR Little Endian transfer syntax not found")
}

/// Transfer syntax the peer accepted for the presentation context `pc_id`.
fn negotiated_ts(association: &ClientAssociation, pc_id: u8) -> Result<&'static TransferSyntax> {
    let uid = association
        .presentation_contexts()
        .iter()
        .find(|pc| pc.id == pc_id)
        .map(|pc| pc.transfer_syntax.trim_end_matches('\0').to_string())
        .context("Accepted presentation context disappeared")?;
    TransferSyntaxRegistry
        .get(&uid)
        .with_context(|| format!("Negotiated transfer syntax {uid} not found"))
}

fn command_u16(cmd: &InMemDicomObject, tag: Tag, name: &str) -> Result<u16> {
    cmd.element(tag)
        .with_context(|| format!("Response has no {name}"))?
        .to_int::<u16>()
        .with_context(|| format!("{name} is not an integer"))
}

/// Success and warning statuses become an outcome; anything else is an error.
fn classify(status: u16) -> Result<DimseOutcome> {
    match status {
        0x0000 => Ok(DimseOutcome { status, warning: false }),
        0x0001 | 0x0107 | 0x0116 | 0xB000..=0xBFFF => Ok(DimseOutcome { status, warning: true }),
        other => bail!("Peer reported failure status 0x{other:04X}"),
    }
}

/// Read the Status (0000,0900) out of a response command PDU.
fn read_status(pdu: Pdu) -> Result<DimseOutcome> {
    let data = match pdu {
        Pdu::PData { data } => data,
        other => bail!("Unexpected response from peer: {other:?}"),
    };
    let value = data
        .iter()
        .find(|v| v.value_type == PDataValueType::Command)
        .context("Response carried no command set")?;

    let cmd = InMemDicomObject::read_dataset_with_ts(value.data.as_slice(), implicit_vr_le()?)
        .context("Failed to decode response command set")?;
    classify(command_u16(&cmd, COMMAND_STATUS, "Status")?)
}

/// Perform a DICOM C-ECHO against the configured PACS.
pub fn echo(pacs: &PacsConfig) -> Result<DimseOutcome> {
    info!(address = %pacs.address, called = %pacs.called_ae_title, "sending C-ECHO");
    let (mut association, pc_id) = connect(pacs, VERIFICATION_SOP_CLASS)?;

    let mut cmd = InMemDicomObject::new_empty();
    cmd.put(DataElement::new(
        COMMAND_AFFECTED_SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(VERIFICATION_SOP_CLASS),
    ));
    put_us(&mut cmd, COMMAND_FIELD, 0x0030);
    put_us(&mut cmd, COMMAND_MESSAGE_ID, 1);
    put_us(&mut cmd, COMMAND_DATA_SET_TYPE, 0x0101);

    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: encode_command(&cmd)?,
            }],
        })
        .context("Failed to send C-ECHO-RQ")?;

    let response = association.receive().context("Failed to receive C-ECHO-RSP")?;
    let outcome = read_status(response);
    let _ = association.release();
    let outcome = outcome?;
    info!(status = outcome.status, "C-ECHO completed");
    Ok(outcome)
}

/// Send one stored file to the configured PACS with C-STORE.
pub fn push(pacs: &PacsConfig, file: &Path) -> Result<DimseOutcome> {
    info!(file = %file.display(), address = %pacs.address, "sending C-STORE");

    let obj = open_file(file).context("Failed to open DICOM file")?;
    let sop_class = obj
        .element(Tag(0x0008, 0x0016))
        .context("Missing SOP Class UID")?
        .to_str()?
        .trim_end_matches('\0')
        .to_string();
    let sop_instance = obj
        .element(Tag(0x0008, 0x0018))
        .context("Missing SOP Instance UID")?
        .to_str()?
        .trim_end_matches('\0')
        .to_string();

    let (mut association, pc_id) = connect(pacs, &sop_class)?;

    let mut cmd = InMemDicomObject::new_empty();
    cmd.put(DataElement::new(
        COMMAND_AFFECTED_SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(sop_class.as_str()),
    ));
    put_us(&mut cmd, COMMAND_FIELD, 0x0001);
    put_us(&mut cmd, COMMAND_MESSAGE_ID, 1);
    put_us(&mut cmd, COMMAND_PRIORITY, 0x0000);
    put_us(&mut cmd, COMMAND_DATA_SET_TYPE, 0x0000);
    cmd.put(DataElement::new(
        COMMAND_AFFECTED_SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(sop_instance.as_str()),
    ));
    let command_bytes = encode_command(&cmd)?;

    // The data set goes out in whatever transfer syntax the peer accepted.
    let ts_negotiated = negotiated_ts(&association, pc_id)?;
    debug!(transfer_syntax = %ts_negotiated.uid(), "encoding data set for transfer");

    let mut data_bytes = Vec::new();
    obj.write_dataset_with_ts(&mut data_bytes, ts_negotiated)
        .context("Failed to encode data set")?;

    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: command_bytes,
            }],
        })
        .context("Failed to send C-STORE-RQ")?;
    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: data_bytes,
            }],
        })
        .context("Failed to send data set")?;

    let response = association.receive().context("Failed to receive C-STORE-RSP")?;
    let outcome = read_status(response);
    let _ = association.release();
    let outcome = outcome?;
    info!(status = outcome.status, sop_instance = %sop_instance, "C-STORE completed");
    Ok(outcome)
}

/// C-FIND request against one of the supported information models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "model", rename_all = "camelCase")]
pub enum FindQuery {
    /// Modality Worklist: every scheduled procedure step.
    Worklists,
    /// Patient Root, PATIENT level. `*` and `?` wildcards are passed through.
    #[serde(rename_all = "camelCase")]
    Patients { patient_name: String },
    /// Study Root, STUDY level, for one patient.
    #[serde(rename_all = "camelCase")]
    Studies { patient_id: String },
}

impl FindQuery {
    fn abstract_syntax(&self) -> &'static str {
        match self {
            FindQuery::Worklists => tags::MODALITY_WORKLIST_SOP_CLASS,
            FindQuery::Patients { .. } => PATIENT_ROOT_FIND,
            FindQuery::Studies { .. } => STUDY_ROOT_FIND,
        }
    }

    /// Identifier sent with the C-FIND-RQ: matching keys carry values, return keys are empty.
    fn identifier(&self) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        match self {
            FindQuery::Worklists => {
                put_key(&mut obj, tags::ACCESSION_NUMBER, VR::SH, "");
                put_key(&mut obj, tags::PATIENT_NAME, VR::PN, "");
                put_key(&mut obj, tags::PATIENT_ID, VR::LO, "");

                let mut step = InMemDicomObject::new_empty();
                put_key(&mut step, tags::MODALITY, VR::CS, "");
                put_key(&mut step, tags::SCHEDULED_STATION_AE_TITLE, VR::AE, "");
                put_key(&mut step, tags::SCHEDULED_PROCEDURE_STEP_START_DATE, VR::DA, "");
                put_key(&mut step, tags::SCHEDULED_PROCEDURE_STEP_START_TIME, VR::TM, "");
                obj.put(DataElement::new(
                    std_tag(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE),
                    VR::SQ,
                    DataSetSequence::from(vec![step]),
                ));
            }
            FindQuery::Patients { patient_name } => {
                put_key(&mut obj, tags::QUERY_RETRIEVE_LEVEL, VR::CS, "PATIENT");
                put_key(&mut obj, tags::PATIENT_NAME, VR::PN, patient_name);
                put_key(&mut obj, tags::PATIENT_ID, VR::LO, "");
                put_key(&mut obj, tags::PATIENT_BIRTH_DATE, VR::DA, "");
                put_key(&mut obj, tags::PATIENT_SEX, VR::CS, "");
            }
            FindQuery::Studies { patient_id } => {
                put_key(&mut obj, tags::STUDY_DATE, VR::DA, "");
                put_key(&mut obj, tags::STUDY_TIME, VR::TM, "");
                put_key(&mut obj, tags::ACCESSION_NUMBER, VR::SH, "");
                put_key(&mut obj, tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY");
                put_key(&mut obj, tags::STUDY_DESCRIPTION, VR::LO, "");
                put_key(&mut obj, tags::PATIENT_ID, VR::LO, patient_id);
                put_key(&mut obj, tags::STUDY_INSTANCE_UID, VR::UI, "");
            }
        }
        obj
    }
}

/// One C-FIND match. Dates read `YYYY-MM-DD` and times `HH:MM:SS` when the peer sent valid values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_sex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(rename = "scheduledStationAETitle", skip_serializing_if = "Option::is_none")]
    pub scheduled_station_ae_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
    #[serde(rename = "studyInstanceUID", skip_serializing_if = "Option::is_none")]
    pub study_instance_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_time: Option<String>,
}

fn std_tag(tag: ElementTag) -> Tag {
    Tag(tag.group(), tag.element())
}

fn put_key(obj: &mut InMemDicomObject, tag: ElementTag, vr: VR, value: &str) {
    let value = if value.is_empty() {
        PrimitiveValue::Empty
    } else {
        PrimitiveValue::from(value)
    };
    obj.put(DataElement::new(std_tag(tag), vr, value));
}

fn text(obj: &InMemDicomObject, tag: ElementTag) -> Option<String> {
    let value = obj.element(std_tag(tag)).ok()?.to_str().ok()?;
    let value = value.trim_end_matches(['\0', ' ']).trim_start();
    (!value.is_empty()).then(|| value.to_string())
}

fn iso_date(raw: String) -> String {
    format::parse_da(&raw)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or(raw)
}

fn iso_time(raw: String) -> String {
    format::parse_tm(&raw)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or(raw)
}

/// Turn a response identifier into a match, dropping responses without the keys that make it useful.
fn parse_match(query: &FindQuery, obj: &InMemDicomObject) -> Option<FindMatch> {
    let mut found = FindMatch {
        patient_name: text(obj, tags::PATIENT_NAME),
        patient_id: text(obj, tags::PATIENT_ID),
        accession_number: text(obj, tags::ACCESSION_NUMBER),
        ..FindMatch::default()
    };
    match query {
        FindQuery::Worklists => {
            let step = obj
                .element(std_tag(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE))
                .ok()
                .and_then(|e| e.value().items())
                .and_then(|items| items.first());
            if let Some(step) = step {
                found.modality = text(step, tags::MODALITY);
                found.scheduled_station_ae_title = text(step, tags::SCHEDULED_STATION_AE_TITLE);
                found.scheduled_date = text(step, tags::SCHEDULED_PROCEDURE_STEP_START_DATE).map(iso_date);
                found.scheduled_time = text(step, tags::SCHEDULED_PROCEDURE_STEP_START_TIME).map(iso_time);
            }
            found.patient_name.is_some().then_some(found)
        }
        FindQuery::Patients { .. } => {
            found.patient_birth_date = text(obj, tags::PATIENT_BIRTH_DATE).map(iso_date);
            found.patient_sex = text(obj, tags::PATIENT_SEX);
            found.patient_name.is_some().then_some(found)
        }
        FindQuery::Studies { .. } => {
            found.study_instance_uid = text(obj, tags::STUDY_INSTANCE_UID);
            found.study_description = text(obj, tags::STUDY_DESCRIPTION);
            found.study_date = text(obj, tags::STUDY_DATE).map(iso_date);
            found.study_time = text(obj, tags::STUDY_TIME).map(iso_time);
            (found.study_instance_uid.is_some() || found.accession_number.is_some()).then_some(found)
        }
    }
}

/// A reassembled DIMSE message: its command set and, if one followed, the raw data set.
struct Message {
    command: InMemDicomObject,
    data: Option<Vec<u8>>,
}

/// Collect P-DATA fragments until one whole message has arrived.
fn next_message(receive: &mut impl FnMut() -> Result<Pdu>) -> Result<Message> {
    let mut command = Vec::new();
    let mut data = Vec::new();
    let mut command_done = false;
    let mut data_done = false;

    loop {
        let values = match receive()? {
            Pdu::PData { data } => data,
            other => bail!("Unexpected response from peer: {other:?}"),
        };
        for value in values {
            match value.value_type {
                PDataValueType::Command => {
                    command.extend_from_slice(&value.data);
                    command_done |= value.is_last;
                }
                PDataValueType::Data => {
                    data.extend_from_slice(&value.data);
                    data_done |= value.is_last;
                }
            }
        }

        if !command_done {
            continue;
        }
        let cmd = InMemDicomObject::read_dataset_with_ts(command.as_slice(), implicit_vr_le()?)
            .context("Failed to decode response command set")?;
        if command_u16(&cmd, COMMAND_DATA_SET_TYPE, "Command Data Set Type")? == NO_DATA_SET {
            return Ok(Message { command: cmd, data: None });
        }
        if data_done {
            return Ok(Message {
                command: cmd,
                data: Some(data),
            });
        }
    }
}

/// Read C-FIND-RSP messages until the final status, collecting pending matches.
fn collect_matches(
    query: &FindQuery,
    ts: &TransferSyntax,
    mut receive: impl FnMut() -> Result<Pdu>,
) -> Result<Vec<FindMatch>> {
    let mut matches = Vec::new();
    loop {
        let message = next_message(&mut receive)?;
        let status = command_u16(&message.command, COMMAND_STATUS, "Status")?;
        if status != 0xFF00 && status != 0xFF01 {
            let outcome = classify(status)?;
            if outcome.warning {
                warn!(status = outcome.status, "C-FIND finished with a warning");
            }
            return Ok(matches);
        }

        let Some(bytes) = message.data else {
            debug!("pending response without identifier");
            continue;
        };
        let identifier = InMemDicomObject::read_dataset_with_ts(bytes.as_slice(), ts)
            .context("Failed to decode C-FIND identifier")?;
        if let Some(found) = parse_match(query, &identifier) {
            matches.push(found);
        }
    }
}

/// Query the configured PACS with C-FIND.
pub fn find(pacs: &PacsConfig, query: &FindQuery) -> Result<Vec<FindMatch>> {
    info!(address = %pacs.address, ?query, "sending C-FIND");
    let abstract_syntax = query.abstract_syntax();
    let (mut association, pc_id) = connect(pacs, abstract_syntax)?;

    let result = run_find(&mut association, pc_id, query);
    let _ = association.release();
    let matches = result?;
    info!(count = matches.len(), "C-FIND completed");
    Ok(matches)
}

fn run_find(association: &mut ClientAssociation, pc_id: u8, query: &FindQuery) -> Result<Vec<FindMatch>> {
    let ts = negotiated_ts(association, pc_id)?;

    let mut cmd = InMemDicomObject::new_empty();
    cmd.put(DataElement::new(
        COMMAND_AFFECTED_SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(query.abstract_syntax()),
    ));
    put_us(&mut cmd, COMMAND_FIELD, 0x0020);
    put_us(&mut cmd, COMMAND_MESSAGE_ID, 1);
    put_us(&mut cmd, COMMAND_PRIORITY, 0x0000);
    put_us(&mut cmd, COMMAND_DATA_SET_TYPE, 0x0000);

    let mut identifier = Vec::new();
    query
        .identifier()
        .write_dataset_with_ts(&mut identifier, ts)
        .context("Failed to encode C-FIND identifier")?;

    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: encode_command(&cmd)?,
            }],
        })
        .context("Failed to send C-FIND-RQ")?;
    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: identifier,
            }],
        })
        .context("Failed to send C-FIND identifier")?;

    collect_matches(query, ts, || association.receive().context("Failed to receive C-FIND-RSP"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_status(status: u16) -> Pdu {
        let mut cmd = InMemDicomObject::new_empty();
        put_us(&mut cmd, COMMAND_FIELD, 0x8001);
        put_us(&mut cmd, COMMAND_STATUS, status);
        Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Command,
                is_last: true,
                data: encode_command(&cmd).unwrap(),
            }],
        }
    }

    #[test]
    fn success_and_warning_statuses_are_accepted() {
        let ok = read_status(response_with_status(0x0000)).unwrap();
        assert!(!ok.warning);
        let warn = read_status(response_with_status(0xB000)).unwrap();
        assert!(warn.warning);
    }

    #[test]
    fn failure_status_is_an_error() {
        let err = read_status(response_with_status(0xA700)).unwrap_err();
        assert!(err.to_string().contains("0xA700"));
    }

    fn explicit_le() -> &'static TransferSyntax {
        TransferSyntaxRegistry.get(tags::EXPLICIT_VR_LITTLE_ENDIAN).unwrap()
    }

    fn find_rsp_command(status: u16, data_set_type: u16) -> Vec<u8> {
        let mut cmd = InMemDicomObject::new_empty();
        put_us(&mut cmd, COMMAND_FIELD, 0x8020);
        put_us(&mut cmd, COMMAND_DATA_SET_TYPE, data_set_type);
        put_us(&mut cmd, COMMAND_STATUS, status);
        encode_command(&cmd).unwrap()
    }

    fn pdv(value_type: PDataValueType, is_last: bool, data: Vec<u8>) -> PDataValue {
        PDataValue {
            presentation_context_id: 1,
            value_type,
            is_last,
            data,
        }
    }

    fn identifier_bytes(obj: &InMemDicomObject) -> Vec<u8> {
        let mut bytes = Vec::new();
        obj.write_dataset_with_ts(&mut bytes, explicit_le()).unwrap();
        bytes
    }

    fn worklist_response(name: &str, date: &str) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        put_key(&mut obj, tags::ACCESSION_NUMBER, VR::SH, "ACC1");
        put_key(&mut obj, tags::PATIENT_NAME, VR::PN, name);
        put_key(&mut obj, tags::PATIENT_ID, VR::LO, "P1");
        let mut step = InMemDicomObject::new_empty();
        put_key(&mut step, tags::MODALITY, VR::CS, "CR");
        put_key(&mut step, tags::SCHEDULED_STATION_AE_TITLE, VR::AE, "CR_ROOM1");
        put_key(&mut step, tags::SCHEDULED_PROCEDURE_STEP_START_DATE, VR::DA, date);
        put_key(&mut step, tags::SCHEDULED_PROCEDURE_STEP_START_TIME, VR::TM, "143000");
        obj.put(DataElement::new(
            std_tag(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE),
            VR::SQ,
            DataSetSequence::from(vec![step]),
        ));
        obj
    }

    fn scripted(pdus: Vec<Pdu>) -> impl FnMut() -> Result<Pdu> {
        let mut pdus = pdus.into_iter();
        move || pdus.next().context("peer closed the connection")
    }

    #[test]
    fn each_query_uses_its_information_model() {
        assert_eq!(FindQuery::Worklists.abstract_syntax(), tags::MODALITY_WORKLIST_SOP_CLASS);
        let patients = FindQuery::Patients {
            patient_name: "*".into(),
        };
        assert_eq!(patients.abstract_syntax(), PATIENT_ROOT_FIND);
        let studies = FindQuery::Studies {
            patient_id: "P1".into(),
        };
        assert_eq!(studies.abstract_syntax(), STUDY_ROOT_FIND);
    }

    #[test]
    fn worklist_identifier_asks_for_step_attributes() {
        let identifier = FindQuery::Worklists.identifier();
        assert!(identifier.element(std_tag(tags::QUERY_RETRIEVE_LEVEL)).is_err());
        let name = identifier.element(std_tag(tags::PATIENT_NAME)).unwrap();
        assert_eq!(name.value().primitive().unwrap().multiplicity(), 0);

        let sequence = identifier
            .element(std_tag(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE))
            .unwrap();
        assert_eq!(sequence.vr(), VR::SQ);
        let items = sequence.value().items().unwrap();
        assert_eq!(items.len(), 1);
        for tag in [
            tags::MODALITY,
            tags::SCHEDULED_STATION_AE_TITLE,
            tags::SCHEDULED_PROCEDURE_STEP_START_DATE,
            tags::SCHEDULED_PROCEDURE_STEP_START_TIME,
        ] {
            assert!(items[0].element(std_tag(tag)).is_ok());
        }
    }

    #[test]
    fn patient_and_study_identifiers_carry_matching_keys() {
        let patients = FindQuery::Patients {
            patient_name: "DOE*".into(),
        }
        .identifier();
        assert_eq!(patients.element(std_tag(tags::QUERY_RETRIEVE_LEVEL)).unwrap().to_str().unwrap(), "PATIENT");
        assert_eq!(patients.element(std_tag(tags::PATIENT_NAME)).unwrap().to_str().unwrap(), "DOE*");
        assert!(patients.element(std_tag(tags::PATIENT_BIRTH_DATE)).is_ok());

        let studies = FindQuery::Studies {
            patient_id: "P42".into(),
        }
        .identifier();
        assert_eq!(studies.element(std_tag(tags::QUERY_RETRIEVE_LEVEL)).unwrap().to_str().unwrap(), "STUDY");
        assert_eq!(studies.element(std_tag(tags::PATIENT_ID)).unwrap().to_str().unwrap(), "P42");
        assert!(studies.element(std_tag(tags::STUDY_INSTANCE_UID)).is_ok());
        assert!(studies.element(std_tag(tags::PATIENT_NAME)).is_err());
    }

    #[test]
    fn identifier_encodes_in_the_negotiated_syntax() {
        let bytes = identifier_bytes(&FindQuery::Worklists.identifier());
        let back = InMemDicomObject::read_dataset_with_ts(bytes.as_slice(), explicit_le()).unwrap();
        assert!(back.element(std_tag(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)).is_ok());
    }

    #[test]
    fn pending_responses_become_matches() {
        let first = identifier_bytes(&worklist_response("DOE^JANE", "20250115"));
        let second = identifier_bytes(&worklist_response("ROE^RICHARD", "2025011"));
        let pdus = vec![
            // command and identifier in one PDU
            Pdu::PData {
                data: vec![
                    pdv(PDataValueType::Command, true, find_rsp_command(0xFF00, 0x0000)),
                    pdv(PDataValueType::Data, true, first),
                ],
            },
            // command fragmented, identifier in the next PDU
            Pdu::PData {
                data: vec![pdv(PDataValueType::Command, false, find_rsp_command(0xFF01, 0x0000))],
            },
            Pdu::PData {
                data: vec![pdv(PDataValueType::Command, true, Vec::new())],
            },
            Pdu::PData {
                data: vec![pdv(PDataValueType::Data, true, second)],
            },
            Pdu::PData {
                data: vec![pdv(PDataValueType::Command, true, find_rsp_command(0x0000, NO_DATA_SET))],
            },
        ];

        let matches = collect_matches(&FindQuery::Worklists, explicit_le(), scripted(pdus)).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].patient_name.as_deref(), Some("DOE^JANE"));
        assert_eq!(matches[0].modality.as_deref(), Some("CR"));
        assert_eq!(matches[0].scheduled_station_ae_title.as_deref(), Some("CR_ROOM1"));
        assert_eq!(matches[0].scheduled_date.as_deref(), Some("2025-01-15"));
        assert_eq!(matches[0].scheduled_time.as_deref(), Some("14:30:00"));
        // an unparsable date is passed through untouched
        assert_eq!(matches[1].scheduled_date.as_deref(), Some("2025011"));

        let json = serde_json::to_value(&matches[0]).unwrap();
        assert_eq!(json["scheduledStationAETitle"], "CR_ROOM1");
        assert!(json.get("studyInstanceUID").is_none());
    }

    #[test]
    fn failure_status_ends_the_query_with_an_error() {
        let pdus = vec![Pdu::PData {
            data: vec![pdv(PDataValueType::Command, true, find_rsp_command(0xA700, NO_DATA_SET))],
        }];
        let err = collect_matches(&FindQuery::Worklists, explicit_le(), scripted(pdus)).unwrap_err();
        assert!(err.to_string().contains("0xA700"));
    }

    #[test]
    fn unexpected_pdu_during_find_is_an_error() {
        let pdus = vec![Pdu::ReleaseRQ];
        assert!(collect_matches(&FindQuery::Worklists, explicit_le(), scripted(pdus)).is_err());
    }

    #[test]
    fn responses_without_key_attributes_are_dropped() {
        let mut nameless = InMemDicomObject::new_empty();
        put_key(&mut nameless, tags::PATIENT_ID, VR::LO, "P1");
        let patients = FindQuery::Patients {
            patient_name: "*".into(),
        };
        assert!(parse_match(&patients, &nameless).is_none());

        let studies = FindQuery::Studies {
            patient_id: "P1".into(),
        };
        assert!(parse_match(&studies, &nameless).is_none());

        let mut study = InMemDicomObject::new_empty();
        put_key(&mut study, tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3");
        put_key(&mut study, tags::STUDY_DATE, VR::DA, "20240229");
        put_key(&mut study, tags::STUDY_DESCRIPTION, VR::LO, "CHEST ");
        let found = parse_match(&studies, &study).unwrap();
        assert_eq!(found.study_instance_uid.as_deref(), Some("1.2.3"));
        assert_eq!(found.study_date.as_deref(), Some("2024-02-29"));
        assert_eq!(found.study_description.as_deref(), Some("CHEST"));
    }

    #[test]
    fn unreachable_peer_fails_cleanly() {
        let pacs = PacsConfig {
            address: "127.0.0.1:1".into(),
            calling_ae_title: "TEST_SCU".into(),
            called_ae_title: "NOBODY".into(),
        };
        assert!(echo(&pacs).is_err());
        assert!(find(&pacs, &FindQuery::Worklists).is_err());
    }
}
