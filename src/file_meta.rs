//
// file_meta.rs
// Dicom-Worklist-rs
//
// Preamble, DICM prefix and File Meta Information group (always explicit VR little endian).
//
// Thales Matheus Mendonça Santos - November 2025

use serde::Serialize;

use crate::dataset::DataSet;
use crate::element::{decode_element, read_tag, take, write_element, DataElement, Value};
use crate::error::{Error, Result};
use crate::tags;
use crate::vr::Vr;

pub const PREAMBLE_LEN: usize = 128;
pub const DICM: &[u8; 4] = b"DICM";
/// Bytes taken by (0002,0000) itself: tag, VR, 2-byte length, 4-byte value.
const GROUP_LENGTH_ELEMENT_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMeta {
    pub media_storage_sop_class_uid: String,
    pub media_storage_sop_instance_uid: String,
    pub transfer_syntax_uid: String,
    pub implementation_class_uid: String,
    pub implementation_version_name: String,
}

impl FileMeta {
    fn elements(&self) -> DataSet {
        [
            DataElement::new(
                tags::FILE_META_INFORMATION_VERSION,
                Vr::OB,
                Value::Bytes(vec![0x00, 0x01]),
            ),
            DataElement::new(
                tags::MEDIA_STORAGE_SOP_CLASS_UID,
                Vr::UI,
                self.media_storage_sop_class_uid.as_str(),
            ),
            DataElement::new(
                tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
                Vr::UI,
                self.media_storage_sop_instance_uid.as_str(),
            ),
            DataElement::new(tags::TRANSFER_SYNTAX_UID, Vr::UI, self.transfer_syntax_uid.as_str()),
            DataElement::new(
                tags::IMPLEMENTATION_CLASS_UID,
                Vr::UI,
                self.implementation_class_uid.as_str(),
            ),
            DataElement::new(
                tags::IMPLEMENTATION_VERSION_NAME,
                Vr::SH,
                self.implementation_version_name.as_str(),
            ),
        ]
        .into_iter()
        .collect()
    }

    /// Preamble, `DICM`, then the meta group with a group length computed from the encoded elements.
    pub fn encode(&self) -> Result<Vec<u8>> {
        // Encode the body first; its size is the group length value.
        let body = self.elements().encode()?;
        let group_length = u32::try_from(body.len()).map_err(|_| Error::ValueTooLong {
            tag: tags::FILE_META_INFORMATION_GROUP_LENGTH,
            vr: "UL",
            len: body.len(),
            max: u32::MAX as usize,
        })?;

        let mut out = Vec::with_capacity(PREAMBLE_LEN + DICM.len() + GROUP_LENGTH_ELEMENT_LEN + body.len());
        out.resize(PREAMBLE_LEN, 0);
        out.extend_from_slice(DICM);
        write_element(
            &mut out,
            &DataElement::new(
                tags::FILE_META_INFORMATION_GROUP_LENGTH,
                Vr::UL,
                Value::U32(group_length),
            ),
        )?;
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// Convenience form of [`FileMeta::encode`].
pub fn build_file_meta(
    sop_class_uid: &str,
    sop_instance_uid: &str,
    transfer_syntax_uid: &str,
    implementation_class_uid: &str,
    implementation_version_name: &str,
) -> Result<Vec<u8>> {
    FileMeta {
        media_storage_sop_class_uid: sop_class_uid.to_string(),
        media_storage_sop_instance_uid: sop_instance_uid.to_string(),
        transfer_syntax_uid: transfer_syntax_uid.to_string(),
        implementation_class_uid: implementation_class_uid.to_string(),
        implementation_version_name: implementation_version_name.to_string(),
    }
    .encode()
}

/// File meta as read back, with what is needed to audit the group length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileMeta {
    pub meta: FileMeta,
    /// Value stored in (0002,0000), if the element was present.
    pub declared_group_length: Option<u32>,
    /// Bytes actually occupied by the meta elements after (0002,0000).
    pub measured_group_length: u32,
    /// Offset of the first data set element.
    pub data_set_offset: usize,
}

impl ParsedFileMeta {
    pub fn group_length_matches(&self) -> bool {
        self.declared_group_length == Some(self.measured_group_length)
    }
}

/// Read the preamble and every group 0002 element that follows it.
pub fn read_file_meta(bytes: &[u8]) -> Result<ParsedFileMeta> {
    take(bytes, 0, PREAMBLE_LEN + DICM.len()).map_err(|_| Error::InvalidPreamble)?;
    if &bytes[PREAMBLE_LEN..PREAMBLE_LEN + DICM.len()] != DICM {
        return Err(Error::InvalidPreamble);
    }

    let mut pos = PREAMBLE_LEN + DICM.len();
    let mut declared_group_length = None;
    let mut body_start = pos;
    let mut elements = DataSet::new();

    while pos < bytes.len() && read_tag(bytes, pos)?.group() == 0x0002 {
        let (element, consumed) = decode_element(bytes, pos)?;
        if element.tag == tags::FILE_META_INFORMATION_GROUP_LENGTH {
            declared_group_length = element.value.as_u32();
            body_start = pos + consumed;
        } else {
            elements.push(element);
        }
        pos += consumed;
    }

    let required = |tag, name: &str| -> Result<String> {
        elements
            .string(tag)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::missing([name]))
    };
    let meta = FileMeta {
        media_storage_sop_class_uid: required(tags::MEDIA_STORAGE_SOP_CLASS_UID, "mediaStorageSOPClassUID")?,
        media_storage_sop_instance_uid: required(
            tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
            "mediaStorageSOPInstanceUID",
        )?,
        transfer_syntax_uid: required(tags::TRANSFER_SYNTAX_UID, "transferSyntaxUID")?,
        implementation_class_uid: required(tags::IMPLEMENTATION_CLASS_UID, "implementationClassUID")?,
        implementation_version_name: elements
            .string(tags::IMPLEMENTATION_VERSION_NAME)
            .unwrap_or_default()
            .to_string(),
    };

    Ok(ParsedFileMeta {
        meta,
        declared_group_length,
        measured_group_length: (pos - body_start) as u32,
        data_set_offset: pos,
    })
}
