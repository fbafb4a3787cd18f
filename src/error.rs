//
// error.rs
// Dicom-Worklist-rs
//
// Error taxonomy shared by the encoder, the decoder, and the record formatters.
//
// Thales Matheus Mendonça Santos - November 2025

use thiserror::Error;

use crate::element::Tag;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller input is incomplete; every absent field is listed.
    #[error("Missing required fields: {}", fields.join(", "))]
    MissingRequiredField { fields: Vec<String> },

    #[error("Invalid date format: {value:?}")]
    InvalidDate { value: String },

    #[error("Invalid time format: {value:?}. Use HH:MM or HH:MM:SS")]
    InvalidTime { value: String },

    #[error("Invalid patient name: {reason}")]
    InvalidName { reason: String },

    #[error("Invalid value for {field}: {value:?} ({reason})")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Unsupported value representation {code:?}")]
    UnsupportedVr { code: String },

    #[error("Value of {tag} ({vr}) is {len} bytes, maximum is {max}")]
    ValueTooLong {
        tag: Tag,
        vr: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Value of {tag} contains characters outside ISO_IR 100")]
    UnencodableText { tag: Tag },

    #[error("Truncated data at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedData {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Missing 128-byte preamble and DICM prefix")]
    InvalidPreamble,

    #[error("Unexpected tag {tag} at offset {offset}")]
    UnexpectedTag { tag: Tag, offset: usize },

    #[error("Sequence at offset {offset} is nested deeper than {max} levels")]
    NestingTooDeep { offset: usize, max: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn missing<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Error::MissingRequiredField {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the error stems from caller input rather than from a defect or corrupt file.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::MissingRequiredField { .. }
                | Error::InvalidDate { .. }
                | Error::InvalidTime { .. }
                | Error::InvalidName { .. }
                | Error::InvalidValue { .. }
                | Error::ValueTooLong { .. }
                | Error::UnencodableText { .. }
        )
    }
}
