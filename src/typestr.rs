use crate::descriptor::Descriptor;
use crate::error::{MalformedKind, MalformedSpecError};
use crate::source_location::SourceSpan;
use crate::types::{native_char_type, ByteOrder, Scalar, ScalarKind, LONG_DOUBLE, POINTER_SIZE};

fn named_type(name: &str) -> Option<(ScalarKind, usize)> {
    use ScalarKind::*;

    let ty = match name {
        "bool" => (Bool, 1),
        "int8" | "byte" => (Int, 1),
        "int16" | "short" => (Int, 2),
        "int32" | "intc" => (Int, 4),
        "int64" | "longlong" => (Int, 8),
        "uint8" | "ubyte" => (UInt, 1),
        "uint16" | "ushort" => (UInt, 2),
        "uint32" | "uintc" => (UInt, 4),
        "uint64" | "ulonglong" => (UInt, 8),
        "intp" | "int" => (Int, POINTER_SIZE),
        "uintp" => (UInt, POINTER_SIZE),
        "float16" | "half" => (Float, 2),
        "float32" | "single" => (Float, 4),
        "float64" | "double" | "float" => (Float, 8),
        "longdouble" => (Float, LONG_DOUBLE.0),
        "complex64" | "csingle" => (Complex, 8),
        "complex128" | "cdouble" | "complex" => (Complex, 16),
        "object" => (Object, POINTER_SIZE),
        "bytes" => (Bytes, 0),
        "str" => (Str, 0),
        "void" => (Void, 0),
        _ => return None,
    };

    Some(ty)
}

/// Resolves the body of a type string (everything after the byte-order char).
pub(crate) fn resolve_type(body: &str, order: ByteOrder) -> Result<Scalar, MalformedKind> {
    let unknown = || MalformedKind::UnknownTypeCode(body.to_string());

    if let Some((kind, itemsize)) = named_type(body) {
        return Scalar::new(kind, itemsize, order).ok_or_else(unknown);
    }

    let mut chars = body.chars();
    let code = chars.next().ok_or_else(unknown)?;
    let digits = chars.as_str();

    if digits.is_empty() {
        return match code {
            'S' | 'a' | 'U' | 'V' => {
                let kind = ScalarKind::from_code(code).ok_or_else(unknown)?;
                Scalar::new(kind, 0, order).ok_or_else(unknown)
            }
            _ => native_char_type(code, order).ok_or_else(unknown),
        };
    }

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(unknown());
    }

    let kind = ScalarKind::from_code(code).ok_or_else(unknown)?;
    let count: usize = digits
        .parse()
        .map_err(|_| MalformedKind::InvalidCount(digits.to_string()))?;

    let itemsize = if kind == ScalarKind::Str {
        count
            .checked_mul(4)
            .ok_or_else(|| MalformedKind::SizeOverflow(format!("{code}{digits}")))?
    } else {
        count
    };

    Scalar::new(kind, itemsize, order).ok_or(MalformedKind::InvalidItemSize {
        kind: code,
        size: count,
    })
}

/// Splits a leading `<`, `>`, `=` or `|` off a type string.
pub(crate) fn split_byteorder(text: &str) -> (Option<ByteOrder>, &str) {
    match text.chars().next().and_then(ByteOrder::from_char) {
        Some(order) => (Some(order), &text[1..]),
        None => (None, text),
    }
}

/// Parses one type string such as `<i4`, `|S5`, `U3`, `float64` or `d`.
pub fn parse_type_str(spec: &str) -> Result<Descriptor, MalformedSpecError> {
    let leading = spec.len() - spec.trim_start().len();
    let text = spec.trim();

    let (order, body) = split_byteorder(text);
    let body_start = leading + (text.len() - body.len());
    let span = SourceSpan::new(body_start, body_start + body.len());

    resolve_type(body, order.unwrap_or(ByteOrder::Native))
        .map(Descriptor::Scalar)
        .map_err(|kind| MalformedSpecError::new(kind, span, spec))
}
