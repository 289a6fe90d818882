use crate::path::FieldPath;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// Errors raised while decoding a buffer, encoding a record or updating a field.
///
/// Every variant carries the name-path of the field that failed, so the presentation layer can
/// highlight the offending region (see [`CodecError::offset`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error(
        "Offset {offset}: field `{path}` is truncated (need {need} bytes, have {have})"
    )]
    TruncatedData {
        path: FieldPath,
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("Offset {offset}: template does not match data at field `{path}`: {reason}")]
    TemplateMismatch {
        path: FieldPath,
        offset: usize,
        reason: String,
    },

    #[error("Offset {offset}: invalid repeat count {count} for group `{path}`")]
    InvalidRepeatCount {
        path: FieldPath,
        offset: usize,
        count: i128,
    },

    #[error("Field `{path}` holds {len} bytes, but at most {max} are representable")]
    ValueTooLong {
        path: FieldPath,
        len: usize,
        max: usize,
    },

    #[error("Field `{path}` rejected value: {reason}")]
    TypeConstraintViolation { path: FieldPath, reason: String },

    #[error("Unknown field path `{path}`")]
    UnknownFieldPath { path: FieldPath },
}

impl CodecError {
    /// Name-path of the field this error refers to.
    pub fn path(&self) -> &FieldPath {
        match self {
            CodecError::TruncatedData { path, .. }
            | CodecError::TemplateMismatch { path, .. }
            | CodecError::InvalidRepeatCount { path, .. }
            | CodecError::ValueTooLong { path, .. }
            | CodecError::TypeConstraintViolation { path, .. }
            | CodecError::UnknownFieldPath { path } => path,
        }
    }

    /// Byte offset (within the decoded buffer) of the failing field, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            CodecError::TruncatedData { offset, .. }
            | CodecError::TemplateMismatch { offset, .. }
            | CodecError::InvalidRepeatCount { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub(crate) fn truncated(path: &FieldPath, e: TruncatedRead) -> Self {
        CodecError::TruncatedData {
            path: path.clone(),
            offset: e.offset,
            need: e.need,
            have: e.have,
        }
    }

    pub(crate) fn mismatch(path: &FieldPath, offset: usize, reason: impl Into<String>) -> Self {
        CodecError::TemplateMismatch {
            path: path.clone(),
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn constraint(path: &FieldPath, reason: impl Into<String>) -> Self {
        CodecError::TypeConstraintViolation {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown_path(path: &FieldPath) -> Self {
        CodecError::UnknownFieldPath { path: path.clone() }
    }
}

/// Errors raised while building or loading a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("field names must not be empty")]
    EmptyFieldName,

    #[error("field name `{name}` contains one of the reserved characters `.[]`")]
    InvalidFieldName { name: String },

    #[error("field name `{name}` would be read as an item index")]
    NumericFieldName { name: String },

    #[error("field `{name}` makes the template too large")]
    TooLarge { name: String },

    #[error("field `{name}` is declared more than once in the same record")]
    DuplicateField { name: String },

    #[error("group `{group}` refers to `{reference}`, which is not an earlier field of the same record")]
    UnknownReference { group: String, reference: String },

    #[error("group `{group}` refers to `{reference}`, which is not an integer field")]
    NotAnInteger { group: String, reference: String },

    #[error("count field `{reference}` is shared by more than one group")]
    SharedCountField { reference: String },

    #[error("TMPL entry at offset {offset} is truncated (need {need} bytes, have {have})")]
    TmplTruncated {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("TMPL entry at offset {offset} has unknown type code `{code}`")]
    UnknownTmplCode { code: String, offset: usize },

    #[error("TMPL list marker at offset {offset} is unbalanced")]
    UnbalancedList { offset: usize },

    #[error("TMPL count `{code}` at offset {offset} is not followed by `LSTC`")]
    ExpectedListStart { code: String, offset: usize },

    #[error("TMPL `CASE` at offset {offset} does not follow an integer field")]
    CaseWithoutField { offset: usize },

    #[error("TMPL `CASE` label `{label}` at offset {offset} is not of the form `name=value`")]
    InvalidCase { label: String, offset: usize },

    #[error("TMPL `FCNT` label `{label}` at offset {offset} does not hold a count")]
    InvalidFixedCount { label: String, offset: usize },

    #[error("Failed to read JSON template: {0}")]
    Json(#[from] serde_json::Error),
}

/// A bounds failure reported by [`ByteCursor`](crate::utils::ByteCursor).
///
/// This carries no field context; the interpreter attaches the failing path when it converts
/// this into a [`CodecError`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("buffer too small for {what} at offset {offset} (need {need} bytes, have {have})")]
pub struct TruncatedRead {
    pub what: &'static str,
    pub offset: usize,
    pub need: usize,
    pub have: usize,
}

impl From<TruncatedRead> for TemplateError {
    fn from(e: TruncatedRead) -> Self {
        TemplateError::TmplTruncated {
            offset: e.offset,
            need: e.need,
            have: e.have,
        }
    }
}

/// A resource type code that is not exactly four Mac Roman characters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{0}` is not a four character code")]
pub struct FourCharCodeError(pub String);
