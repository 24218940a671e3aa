use crate::source_location::SourceSpan;
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Error)]
pub enum MalformedKind {
    #[error("unknown type code {0:?}")]
    UnknownTypeCode(String),
    #[error("duplicate field name '{0}'")]
    DuplicateFieldName(String),
    #[error("invalid shape {0:?}, dimensions must be positive integers")]
    InvalidShape(String),
    #[error("invalid item size {size} for type kind '{kind}'")]
    InvalidItemSize { kind: char, size: usize },
    #[error("invalid repeat count {0:?}")]
    InvalidCount(String),
    #[error("unterminated structure block, expected '}}'")]
    UnterminatedBlock,
    #[error("unterminated field name, expected ':'")]
    UnterminatedName,
    #[error("unexpected end of spec")]
    UnexpectedEnd,
    #[error("unexpected '}}' outside of a structure block")]
    UnbalancedBlockEnd,
    #[error("format number {index} is not recognized")]
    UnrecognizedFormat { index: usize },
    #[error("inconsistent byte-order specification '{0}' and '{1}'")]
    InconsistentByteOrder(char, char),
    #[error("item {0:?} is too large to lay out")]
    SizeOverflow(String),
}

/// A spec string that could not be compiled into a descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Error)]
#[error("{kind} (at {}..{} in \"{spec}\")", .span.start, .span.end)]
pub struct MalformedSpecError {
    pub kind: MalformedKind,
    pub span: SourceSpan,
    pub spec: String,
}

impl MalformedSpecError {
    pub fn new(kind: MalformedKind, span: SourceSpan, spec: &str) -> Self {
        MalformedSpecError {
            kind,
            span,
            spec: spec.to_string(),
        }
    }

    /// Renders the spec with a caret line under the offending fragment.
    pub fn render(&self) -> String {
        let start = self.span.start.min(self.spec.len());
        let width = self.span.len().max(1);

        format!(
            "error: {}\n  {}\n  {}{}",
            self.kind,
            self.spec,
            " ".repeat(start),
            "^".repeat(width)
        )
    }
}

/// Failures of a manually supplied field table.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FieldTableError {
    #[error("entry for field '{name}' is not a 2- or 3-element entry (got {len})")]
    WrongArity { name: String, len: usize },
    #[error("entry for field '{name}' is malformed: expected {expected} at position {index}")]
    WrongEntryType {
        name: String,
        index: usize,
        expected: &'static str,
    },
    #[error("invalid offset {offset} for field '{name}'")]
    NegativeOffset { name: String, offset: i64 },
    #[error("duplicate field name '{0}'")]
    DuplicateName(String),
    #[error("offset {offset} of field '{name}' is not a multiple of its alignment {alignment}")]
    Misaligned {
        name: String,
        offset: usize,
        alignment: usize,
    },
    #[error("title '{0}' collides with a field name")]
    TitleCollision(String),
    #[error("field '{name}' ends at byte {end}, beyond the item size {itemsize}")]
    FieldOutOfBounds {
        name: String,
        end: usize,
        itemsize: usize,
    },
    #[error("field '{0}' overlaps the previous field or is out of order")]
    OverlappingFields(String),
    #[error("field '{0}' does not fit in the address space")]
    SizeOverflow(String),
    #[error("unknown field name: {0}")]
    UnknownField(String),
    #[error("descriptor has no fields")]
    NotStructured,
    #[error(transparent)]
    Layout(#[from] MalformedSpecError),
}

/// Reinterpretations refused because they would expose object references as raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("cannot get/set field of an object array")]
    ObjectField,
    #[error("cannot change data-type for object array")]
    ObjectView,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(
        "no implementation found for '{entry_point}' on types that implement array_function: [{}]",
        .types.join(", ")
    )]
    Unimplemented {
        entry_point: String,
        types: Vec<String>,
    },
    #[error(transparent)]
    Raised(#[from] anyhow::Error),
}

/// Raised at registration time when an implementation and its argument selector disagree.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SignatureMismatchError {
    #[error("implementation and dispatcher for {entry_point} have different function signatures: {detail}")]
    Shape { entry_point: String, detail: String },
    #[error("dispatcher for {entry_point} can only use None for default argument values (parameter '{parameter}')")]
    NonNeutralDefault {
        entry_point: String,
        parameter: String,
    },
}
