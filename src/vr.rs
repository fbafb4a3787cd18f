//
// vr.rs
// Dicom-Worklist-rs
//
// Value Representation table and the per-VR rules for turning values into even-length wire bytes.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};

use crate::element::{Tag, Value};
use crate::error::{Error, Result};

/// Value Representations understood by the encoder and decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vr {
    AE,
    AS,
    CS,
    DA,
    DS,
    DT,
    IS,
    LO,
    LT,
    PN,
    SH,
    ST,
    TM,
    UC,
    UI,
    UR,
    UT,
    AT,
    FL,
    FD,
    SL,
    SS,
    UL,
    US,
    OB,
    OD,
    OF,
    OL,
    OW,
    UN,
    SQ,
}

/// How a VR's value is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrKind {
    Text,
    Numeric,
    Binary,
    Sequence,
}

impl Vr {
    pub fn code(self) -> &'static str {
        match self {
            Vr::AE => "AE",
            Vr::AS => "AS",
            Vr::CS => "CS",
            Vr::DA => "DA",
            Vr::DS => "DS",
            Vr::DT => "DT",
            Vr::IS => "IS",
            Vr::LO => "LO",
            Vr::LT => "LT",
            Vr::PN => "PN",
            Vr::SH => "SH",
            Vr::ST => "ST",
            Vr::TM => "TM",
            Vr::UC => "UC",
            Vr::UI => "UI",
            Vr::UR => "UR",
            Vr::UT => "UT",
            Vr::AT => "AT",
            Vr::FL => "FL",
            Vr::FD => "FD",
            Vr::SL => "SL",
            Vr::SS => "SS",
            Vr::UL => "UL",
            Vr::US => "US",
            Vr::OB => "OB",
            Vr::OD => "OD",
            Vr::OF => "OF",
            Vr::OL => "OL",
            Vr::OW => "OW",
            Vr::UN => "UN",
            Vr::SQ => "SQ",
        }
    }

    /// Parse the two ASCII bytes that follow the tag in explicit VR encoding.
    pub fn from_bytes(bytes: [u8; 2]) -> Result<Self> {
        match std::str::from_utf8(&bytes) {
            Ok(code) => code.parse(),
            Err(_) => Err(Error::UnsupportedVr {
                code: format!("{:02X}{:02X}", bytes[0], bytes[1]),
            }),
        }
    }

    pub fn kind(self) -> VrKind {
        match self {
            Vr::AE
            | Vr::AS
            | Vr::CS
            | Vr::DA
            | Vr::DS
            | Vr::DT
            | Vr::IS
            | Vr::LO
            | Vr::LT
            | Vr::PN
            | Vr::SH
            | Vr::ST
            | Vr::TM
            | Vr::UC
            | Vr::UI
            | Vr::UR
            | Vr::UT => VrKind::Text,
            Vr::AT | Vr::FL | Vr::FD | Vr::SL | Vr::SS | Vr::UL | Vr::US => VrKind::Numeric,
            Vr::OB | Vr::OD | Vr::OF | Vr::OL | Vr::OW | Vr::UN => VrKind::Binary,
            Vr::SQ => VrKind::Sequence,
        }
    }

    /// Long-form VRs carry two reserved bytes and a 4-byte length in explicit VR encoding;
    /// every other VR uses a 2-byte length.
    pub fn has_long_length(self) -> bool {
        matches!(
            self,
            Vr::OB
                | Vr::OD
                | Vr::OF
                | Vr::OL
                | Vr::OW
                | Vr::SQ
                | Vr::UC
                | Vr::UR
                | Vr::UT
                | Vr::UN
        )
    }

    /// Byte appended to odd-length values.
    pub fn padding(self) -> u8 {
        match self.kind() {
            VrKind::Text if self != Vr::UI => b' ',
            _ => 0x00,
        }
    }

    /// Maximum value length in bytes (before padding) for bounded VRs.
    pub fn max_length(self) -> Option<usize> {
        match self {
            Vr::AE | Vr::CS | Vr::SH | Vr::DS => Some(16),
            Vr::AS => Some(4),
            Vr::DA => Some(8),
            Vr::DT => Some(26),
            Vr::IS => Some(12),
            Vr::TM => Some(16),
            Vr::LO | Vr::PN | Vr::UI => Some(64),
            Vr::ST => Some(1024),
            Vr::LT => Some(10240),
            _ => None,
        }
    }

    /// Fixed width of a single numeric value.
    fn numeric_width(self) -> Option<usize> {
        match self {
            Vr::US | Vr::SS => Some(2),
            Vr::UL | Vr::SL | Vr::FL | Vr::AT => Some(4),
            Vr::FD => Some(8),
            _ => None,
        }
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Vr {
    type Err = Error;

    fn from_str(code: &str) -> Result<Self> {
        let vr = match code {
            "AE" => Vr::AE,
            "AS" => Vr::AS,
            "CS" => Vr::CS,
            "DA" => Vr::DA,
            "DS" => Vr::DS,
            "DT" => Vr::DT,
            "IS" => Vr::IS,
            "LO" => Vr::LO,
            "LT" => Vr::LT,
            "PN" => Vr::PN,
            "SH" => Vr::SH,
            "ST" => Vr::ST,
            "TM" => Vr::TM,
            "UC" => Vr::UC,
            "UI" => Vr::UI,
            "UR" => Vr::UR,
            "UT" => Vr::UT,
            "AT" => Vr::AT,
            "FL" => Vr::FL,
            "FD" => Vr::FD,
            "SL" => Vr::SL,
            "SS" => Vr::SS,
            "UL" => Vr::UL,
            "US" => Vr::US,
            "OB" => Vr::OB,
            "OD" => Vr::OD,
            "OF" => Vr::OF,
            "OL" => Vr::OL,
            "OW" => Vr::OW,
            "UN" => Vr::UN,
            "SQ" => Vr::SQ,
            other => {
                return Err(Error::UnsupportedVr {
                    code: other.to_string(),
                })
            }
        };
        Ok(vr)
    }
}

/// Encode a flat (non-sequence) value into its padded wire bytes.
///
/// The returned buffer always has an even length.
pub fn encode_value(tag: Tag, vr: Vr, value: &Value) -> Result<Vec<u8>> {
    let mut bytes = match (vr.kind(), value) {
        (VrKind::Text, Value::Text(text)) => encode_text(tag, vr, text)?,
        (VrKind::Numeric, Value::U16(v)) if vr == Vr::US || vr == Vr::SS => v.to_le_bytes().to_vec(),
        (VrKind::Numeric, Value::U32(v)) if vr == Vr::UL || vr == Vr::SL => v.to_le_bytes().to_vec(),
        (VrKind::Numeric | VrKind::Binary, Value::Bytes(raw)) => raw.clone(),
        (VrKind::Text, Value::Bytes(raw)) => raw.clone(),
        (VrKind::Sequence, _) | (_, Value::Sequence(_)) => {
            return Err(Error::UnsupportedVr {
                code: format!("{} as flat value of {}", vr, tag),
            })
        }
        _ => {
            return Err(Error::InvalidValue {
                field: "value",
                value: format!("{:?} for {} {}", value, tag, vr),
                reason: "value shape does not match VR",
            })
        }
    };

    if bytes.len() % 2 != 0 {
        bytes.push(vr.padding());
    }
    Ok(bytes)
}

fn encode_text(tag: Tag, vr: Vr, text: &str) -> Result<Vec<u8>> {
    // ISO_IR 100: every char maps to exactly one byte.
    let bytes = text
        .chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| Error::UnencodableText { tag }))
        .collect::<Result<Vec<u8>>>()?;

    if let Some(max) = vr.max_length() {
        if bytes.len() > max {
            return Err(Error::ValueTooLong {
                tag,
                vr: vr.code(),
                len: bytes.len(),
                max,
            });
        }
    }
    Ok(bytes)
}

/// Decode raw value bytes, stripping the VR's padding from text values.
pub fn decode_value(vr: Vr, bytes: &[u8]) -> Value {
    match vr.kind() {
        VrKind::Text => Value::Text(decode_text(vr, bytes)),
        VrKind::Numeric if vr.numeric_width() == Some(bytes.len()) => match vr {
            Vr::US | Vr::SS => Value::U16(LittleEndian::read_u16(bytes)),
            Vr::UL | Vr::SL => Value::U32(LittleEndian::read_u32(bytes)),
            _ => Value::Bytes(bytes.to_vec()),
        },
        _ => Value::Bytes(bytes.to_vec()),
    }
}

fn decode_text(vr: Vr, bytes: &[u8]) -> String {
    let trimmed = match vr {
        // UI pads with NUL; some writers pad with a space anyway.
        Vr::UI => trim_end_matching(bytes, |b| b == 0x00 || b == b' '),
        // Leading spaces are significant for these.
        Vr::LT | Vr::ST | Vr::UT | Vr::UC | Vr::UR => trim_end_matching(bytes, |b| b == b' '),
        _ => trim_end_matching(bytes, |b| b == b' ' || b == 0x00),
    };
    trimmed.iter().map(|&b| char::from(b)).collect()
}

fn trim_end_matching(bytes: &[u8], pad: impl Fn(u8) -> bool) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| !pad(b))
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: Tag = Tag(0x0010, 0x0020);

    #[test]
    fn text_values_pad_with_space_and_uids_with_nul() {
        let lo = encode_value(TAG, Vr::LO, &Value::from("P1X")).unwrap();
        assert_eq!(lo, b"P1X ");

        let ui = encode_value(Tag(0x0020, 0x000D), Vr::UI, &Value::from("1.2.3")).unwrap();
        assert_eq!(ui, b"1.2.3\0");
    }

    #[test]
    fn even_values_are_left_untouched() {
        let cs = encode_value(Tag(0x0010, 0x0040), Vr::CS, &Value::from("MF")).unwrap();
        assert_eq!(cs, b"MF");
    }

    #[test]
    fn numeric_values_are_little_endian() {
        let us = encode_value(Tag(0x0028, 0x0010), Vr::US, &Value::U16(0x0201)).unwrap();
        assert_eq!(us, [0x01, 0x02]);
        let ul = encode_value(Tag(0x0002, 0x0000), Vr::UL, &Value::U32(0x0403_0201)).unwrap();
        assert_eq!(ul, [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn odd_binary_values_pad_with_nul() {
        let ob = encode_value(Tag(0x0002, 0x0001), Vr::OB, &Value::Bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(ob, [1, 2, 3, 0]);
    }

    #[test]
    fn overlong_short_strings_are_rejected() {
        let err = encode_value(
            Tag(0x0008, 0x0050),
            Vr::SH,
            &Value::from("ACCESSION-NUMBER-TOO-LONG"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ValueTooLong { max: 16, .. }));
    }

    #[test]
    fn characters_outside_latin1_are_rejected() {
        let err = encode_value(TAG, Vr::LO, &Value::from("患者")).unwrap_err();
        assert!(matches!(err, Error::UnencodableText { .. }));

        let latin = encode_value(TAG, Vr::LO, &Value::from("Müller")).unwrap();
        assert_eq!(latin, [b'M', 0xFC, b'l', b'l', b'e', b'r']);
    }

    #[test]
    fn decoding_strips_padding() {
        assert_eq!(decode_value(Vr::PN, b"DOE^JOHN "), Value::from("DOE^JOHN"));
        assert_eq!(decode_value(Vr::UI, b"1.2.3\0"), Value::from("1.2.3"));
        assert_eq!(decode_value(Vr::US, &[0x00, 0x02]), Value::U16(512));
        assert_eq!(
            decode_value(Vr::LO, &[b'M', 0xFC, b'l', b'l', b'e', b'r']).as_str(),
            Some("Müller")
        );
    }

    #[test]
    fn unknown_codes_are_unsupported() {
        assert!(matches!(
            "ZZ".parse::<Vr>(),
            Err(Error::UnsupportedVr { code }) if code == "ZZ"
        ));
        assert!(Vr::from_bytes([0xFF, 0xFE]).is_err());
        assert_eq!(Vr::from_bytes(*b"SQ").unwrap(), Vr::SQ);
    }

    #[test]
    fn length_form_follows_vr_category() {
        for vr in [Vr::OB, Vr::OW, Vr::OF, Vr::SQ, Vr::UT, Vr::UN] {
            assert!(vr.has_long_length(), "{vr} should be long form");
        }
        for vr in [Vr::PN, Vr::LO, Vr::SH, Vr::DA, Vr::TM, Vr::CS, Vr::AE, Vr::UI, Vr::UL, Vr::US] {
            assert!(!vr.has_long_length(), "{vr} should be short form");
        }
    }
}
