//
// element.rs
// Dicom-Worklist-rs
//
// Data element model plus the explicit VR little endian writer and reader for single elements.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::dataset::DataSet;
use crate::error::{Error, Result};
use crate::sequence;
use crate::vr::{self, Vr};

/// Attribute tag. Ordering is (group, element), which is the order data sets must be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub fn group(self) -> u16 {
        self.0
    }

    pub fn element(self) -> u16 {
        self.1
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    U16(u16),
    U32(u32),
    Bytes(Vec<u8>),
    Sequence(Vec<DataSet>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[DataSet]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataElement {
    pub tag: Tag,
    pub vr: Vr,
    pub value: Value,
}

impl DataElement {
    pub fn new(tag: Tag, vr: Vr, value: impl Into<Value>) -> Self {
        Self {
            tag,
            vr,
            value: value.into(),
        }
    }

    pub fn sequence(tag: Tag, items: Vec<DataSet>) -> Self {
        Self {
            tag,
            vr: Vr::SQ,
            value: Value::Sequence(items),
        }
    }
}

/// Length marker for sequences and items whose end is signalled by a delimiter.
pub const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Serialize one element as explicit VR little endian.
///
/// Short-form VRs get `tag | VR | len(2)`, long-form VRs get `tag | VR | 0000 | len(4)`.
pub fn write_element<W: Write>(out: &mut W, element: &DataElement) -> Result<()> {
    if let Value::Sequence(items) = &element.value {
        return sequence::write_sequence(out, element.tag, items);
    }

    let bytes = vr::encode_value(element.tag, element.vr, &element.value)?;
    write_header(out, element.tag, element.vr, bytes.len())?;
    out.write_all(&bytes)?;
    Ok(())
}

pub fn encode_element(element: &DataElement) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_element(&mut out, element)?;
    Ok(out)
}

pub(crate) fn write_header<W: Write>(out: &mut W, tag: Tag, vr: Vr, len: usize) -> Result<()> {
    out.write_u16::<LittleEndian>(tag.group())?;
    out.write_u16::<LittleEndian>(tag.element())?;
    out.write_all(vr.code().as_bytes())?;

    if vr.has_long_length() {
        let len = u32::try_from(len)
            .ok()
            .filter(|&l| l != UNDEFINED_LENGTH)
            .ok_or(Error::ValueTooLong {
                tag,
                vr: vr.code(),
                len,
                max: (UNDEFINED_LENGTH - 1) as usize,
            })?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(len)?;
    } else {
        let len = u16::try_from(len).map_err(|_| Error::ValueTooLong {
            tag,
            vr: vr.code(),
            len,
            max: u16::MAX as usize,
        })?;
        out.write_u16::<LittleEndian>(len)?;
    }
    Ok(())
}

/// Cursor-free helpers for reading little endian fields out of a byte slice.
pub(crate) fn take(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let available = bytes.len().saturating_sub(offset);
    if available < len {
        return Err(Error::TruncatedData {
            offset,
            needed: len,
            available,
        });
    }
    Ok(&bytes[offset..offset + len])
}

pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    take(bytes, offset, 2).map(LittleEndian::read_u16)
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    take(bytes, offset, 4).map(LittleEndian::read_u32)
}

pub(crate) fn read_tag(bytes: &[u8], offset: usize) -> Result<Tag> {
    Ok(Tag(read_u16(bytes, offset)?, read_u16(bytes, offset + 2)?))
}

/// Parse one explicit VR little endian element starting at `offset`.
///
/// Returns the element and the number of bytes it occupied, so callers can iterate.
pub fn decode_element(bytes: &[u8], offset: usize) -> Result<(DataElement, usize)> {
    decode_nested(bytes, offset, 0)
}

/// `decode_element` for an element that sits `depth` sequences deep.
pub(crate) fn decode_nested(bytes: &[u8], offset: usize, depth: usize) -> Result<(DataElement, usize)> {
    let tag = read_tag(bytes, offset)?;
    let code = take(bytes, offset + 4, 2)?;
    let vr = Vr::from_bytes([code[0], code[1]])?;

    let (len, header_len) = if vr.has_long_length() {
        (read_u32(bytes, offset + 8)?, 12)
    } else {
        (u32::from(read_u16(bytes, offset + 6)?), 8)
    };
    let value_offset = offset + header_len;

    if vr == Vr::SQ {
        let (items, consumed) = sequence::read_sequence(bytes, value_offset, len, depth + 1)?;
        return Ok((DataElement::sequence(tag, items), header_len + consumed));
    }

    if len == UNDEFINED_LENGTH {
        // Encapsulated pixel data is the only other legal use, and nothing here writes it.
        return Err(Error::UnexpectedTag {
            tag,
            offset,
        });
    }

    let len = len as usize;
    let raw = take(bytes, value_offset, len)?;
    let element = DataElement {
        tag,
        vr,
        value: vr::decode_value(vr, raw),
    };
    Ok((element, header_len + len))
}
