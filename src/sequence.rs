//
// sequence.rs
// Dicom-Worklist-rs
//
// Sequence (SQ) encoding: explicit-length items wrapped between the SQ header and a sequence delimiter.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::dataset::{self, DataSet};
use crate::element::{read_tag, read_u32, take, Tag, UNDEFINED_LENGTH};
use crate::error::{Error, Result};

pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
pub const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
pub const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);

/// Deepest sequence nesting the reader accepts.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Encode a sequence element with one item per data set.
pub fn encode_sequence(tag: Tag, items: &[DataSet]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_sequence(&mut out, tag, items)?;
    Ok(out)
}

/// Write `tag | SQ | 0000 | FFFFFFFF`, each item with its explicit length, then `(FFFE,E0DD)`.
///
/// The header length is undefined because the sequence is closed by the delimitation item.
pub fn write_sequence<W: Write>(out: &mut W, tag: Tag, items: &[DataSet]) -> Result<()> {
    out.write_u16::<LittleEndian>(tag.group())?;
    out.write_u16::<LittleEndian>(tag.element())?;
    out.write_all(b"SQ")?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(UNDEFINED_LENGTH)?;

    for item in items {
        let body = item.encode()?;
        let len = u32::try_from(body.len())
            .ok()
            .filter(|&l| l != UNDEFINED_LENGTH)
            .ok_or(Error::ValueTooLong {
                tag: ITEM,
                vr: "SQ",
                len: body.len(),
                max: (UNDEFINED_LENGTH - 1) as usize,
            })?;
        write_marker(out, ITEM, len)?;
        out.write_all(&body)?;
    }

    write_marker(out, SEQUENCE_DELIMITATION, 0)
}

fn write_marker<W: Write>(out: &mut W, tag: Tag, len: u32) -> Result<()> {
    out.write_u16::<LittleEndian>(tag.group())?;
    out.write_u16::<LittleEndian>(tag.element())?;
    out.write_u32::<LittleEndian>(len)?;
    Ok(())
}

/// Read the items of a sequence whose value starts at `offset` and has declared length `len`.
///
/// `depth` counts this sequence, so a top-level SQ is read at depth 1.
/// Returns the items and the number of bytes consumed, including any delimitation item.
pub(crate) fn read_sequence(bytes: &[u8], offset: usize, len: u32, depth: usize) -> Result<(Vec<DataSet>, usize)> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::NestingTooDeep {
            offset,
            max: MAX_NESTING_DEPTH,
        });
    }
    let mut items = Vec::new();
    let mut pos = offset;

    if len == UNDEFINED_LENGTH {
        loop {
            let tag = read_tag(bytes, pos)?;
            match tag {
                SEQUENCE_DELIMITATION => {
                    pos += 8;
                    break;
                }
                ITEM => {
                    let (item, consumed) = read_item(bytes, pos, depth)?;
                    items.push(item);
                    pos += consumed;
                }
                other => return Err(Error::UnexpectedTag { tag: other, offset: pos }),
            }
        }
    } else {
        let len = len as usize;
        take(bytes, offset, len)?;
        let end = offset + len;
        let bounded = &bytes[..end];
        while pos < end {
            let tag = read_tag(bounded, pos)?;
            match tag {
                ITEM => {
                    let (item, consumed) = read_item(bounded, pos, depth)?;
                    items.push(item);
                    pos += consumed;
                }
                SEQUENCE_DELIMITATION => {
                    pos += 8;
                    break;
                }
                other => return Err(Error::UnexpectedTag { tag: other, offset: pos }),
            }
        }
        // Older writers closed explicit-length sequences with a delimiter as well.
        if pos == end && matches!(read_tag(bytes, pos), Ok(SEQUENCE_DELIMITATION)) {
            pos += 8;
        }
    }

    Ok((items, pos - offset))
}

fn read_item(bytes: &[u8], offset: usize, depth: usize) -> Result<(DataSet, usize)> {
    let len = read_u32(bytes, offset + 4)?;
    let start = offset + 8;

    if len == UNDEFINED_LENGTH {
        let (item, end) = dataset::read_until(bytes, start, ITEM_DELIMITATION, depth)?;
        // Skip the item delimitation marker itself.
        return Ok((item, end + 8 - offset));
    }

    let len = len as usize;
    take(bytes, start, len)?;
    let item = dataset::read_range(bytes, start, start + len, depth)?;
    Ok((item, 8 + len))
}
