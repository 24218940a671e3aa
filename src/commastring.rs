//! Comma-separated type lists such as `"i4, (2,3)f8, >u2"`.

use crate::descriptor::{Descriptor, Struct};
use crate::error::{MalformedKind, MalformedSpecError};
use crate::parse_stream::ParseStream;
use crate::source_location::SourceSpan;
use crate::typestr::{parse_type_str, resolve_type};
use crate::types::ByteOrder;
use tracing::{trace, warn};

type Result<T> = std::result::Result<T, MalformedSpecError>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Repeats {
    None,
    Count(usize),
    Shape(Vec<usize>),
}

#[derive(Debug)]
struct Item<'a> {
    order: Option<char>,
    repeats: Repeats,
    dtype: &'a str,
    span: SourceSpan,
}

fn is_order_char(c: char) -> bool {
    matches!(c, '<' | '>' | '|' | '=')
}

fn host_order_char() -> char {
    ByteOrder::HOST.as_char()
}

fn parse_items(spec: &str) -> Result<Vec<Item<'_>>> {
    let mut stream = ParseStream::new(spec);
    let mut items = Vec::new();

    while !stream.is_empty() {
        let index = items.len() + 1;
        let unrecognized =
            |stream: &ParseStream| stream.error_here(MalformedKind::UnrecognizedFormat { index });

        let order1 = stream.peek().filter(|&c| is_order_char(c));
        if order1.is_some() {
            stream.advance();
        }

        let (repeats_span, _) = stream.read_while(|c| c == ' ');
        let opened = stream.consume("(");
        stream.read_while(|c| c == ' ' || c == ',' || c == 'L' || c.is_ascii_digit());
        let closed = stream.consume(")");
        stream.read_while(|c| c == ' ');
        let repeats_span = SourceSpan::new(repeats_span.start, stream.offset());
        let repeats_text = &spec[repeats_span.start..repeats_span.end];

        if opened != closed {
            return Err(stream.error(
                MalformedKind::InvalidShape(repeats_text.trim().to_string()),
                repeats_span,
            ));
        }

        let order2 = stream.peek().filter(|&c| is_order_char(c));
        if order2.is_some() {
            stream.advance();
        }

        let (dtype_span, dtype) =
            stream.read_while(|c| c.is_ascii_alphanumeric() || c == '.' || c == '?');

        if dtype.is_empty() {
            return Err(unrecognized(&stream));
        }

        let order = match (order1, order2) {
            (o, None) | (None, o) => o,
            (Some(a), Some(b)) => {
                let a = if a == '=' { host_order_char() } else { a };
                let b = if b == '=' { host_order_char() } else { b };
                if a != b {
                    return Err(stream.error(
                        MalformedKind::InconsistentByteOrder(a, b),
                        SourceSpan::new(repeats_span.start - 1, dtype_span.start),
                    ));
                }
                Some(a)
            }
        };

        let repeats = parse_repeats(repeats_text).ok_or_else(|| {
            stream.error(
                MalformedKind::InvalidShape(repeats_text.trim().to_string()),
                repeats_span,
            )
        })?;

        items.push(Item {
            order,
            repeats,
            dtype,
            span: dtype_span,
        });

        if stream.is_empty() {
            break;
        }

        if stream.rest().chars().all(char::is_whitespace) {
            break;
        }

        stream.skip_whitespace();
        if !stream.consume(",") {
            return Err(unrecognized(&stream));
        }
        stream.skip_whitespace();
    }

    Ok(items)
}

/// `""` is no repeat, `"3"` or `"(3)"` a count, `"3,"` or `"(2,3)"` a shape.
fn parse_repeats(text: &str) -> Option<Repeats> {
    let text = text.trim();

    if text.is_empty() {
        return Some(Repeats::None);
    }

    let is_tuple = text.contains(',') || text == "()";
    let inner = text.trim_start_matches('(').trim_end_matches(')');

    let dims: Vec<usize> = inner
        .split(',')
        .map(|d| d.trim().trim_end_matches('L'))
        .filter(|d| !d.is_empty())
        .map(|d| d.parse::<usize>().ok().filter(|&n| n > 0))
        .collect::<Option<_>>()?;

    if dims.is_empty() && text != "()" {
        return None;
    }

    if is_tuple {
        return Some(Repeats::Shape(dims));
    }

    match dims.as_slice() {
        [n] => Some(Repeats::Count(*n)),
        _ => None,
    }
}

fn item_descriptor(spec: &str, item: Item) -> Result<Descriptor> {
    let order = match item.order {
        None | Some('|') | Some('=') => ByteOrder::Native,
        Some(c) if c == host_order_char() => ByteOrder::Native,
        Some(c) => ByteOrder::from_char(c).unwrap_or(ByteOrder::Native),
    };

    let scalar = resolve_type(item.dtype, order)
        .map_err(|kind| MalformedSpecError::new(kind, item.span, spec))?;
    let base = Descriptor::Scalar(scalar);

    trace!(dtype = item.dtype, repeats = ?item.repeats, "comma-string item");

    let descr = match item.repeats {
        Repeats::None => base,
        Repeats::Count(1) => {
            warn!(
                dtype = item.dtype,
                "a repeat count of 1 is treated as the bare type; use a shape of (1,) for a sub-array"
            );
            base
        }
        Repeats::Count(n) => Descriptor::subarray(base, vec![n]),
        Repeats::Shape(shape) if shape.is_empty() => base,
        Repeats::Shape(shape) => Descriptor::subarray(base, shape),
    };

    if descr.checked_itemsize().is_none() {
        return Err(MalformedSpecError::new(
            MalformedKind::SizeOverflow(item.dtype.to_string()),
            item.span,
            spec,
        ));
    }

    Ok(descr)
}

/// Parses a comma string. Several items become a record with fields
/// `f0..fN`; `align` places them at their natural alignment.
pub fn dtype_from_commastring(spec: &str, align: bool) -> Result<Descriptor> {
    let items = parse_items(spec)?;

    if items.is_empty() {
        return Err(MalformedSpecError::new(
            MalformedKind::UnrecognizedFormat { index: 1 },
            SourceSpan::new(0, spec.len()),
            spec,
        ));
    }

    let mut descrs = items
        .into_iter()
        .map(|item| item_descriptor(spec, item))
        .collect::<Result<Vec<_>>>()?;

    if descrs.len() == 1 {
        if let Some(descr) = descrs.pop() {
            return Ok(descr);
        }
    }

    // Each field costs at most its size plus its alignment padding.
    let bound = descrs.iter().try_fold(0usize, |total, d| {
        total.checked_add(d.itemsize())?.checked_add(d.alignment())
    });
    if bound.is_none() {
        return Err(MalformedSpecError::new(
            MalformedKind::SizeOverflow(spec.to_string()),
            SourceSpan::new(0, spec.len()),
            spec,
        ));
    }

    let fields = descrs
        .into_iter()
        .enumerate()
        .map(|(i, descr)| (format!("f{i}"), descr))
        .collect();

    let (fields, itemsize, alignment) = Struct::sequential(fields, align);

    Ok(Descriptor::Struct(Struct::new_unchecked(fields, itemsize, alignment)))
}

/// Whether a type string has to go through the comma-string parser.
fn is_commastring(spec: &str) -> bool {
    let mut chars = spec.trim_start().chars();
    let first = chars.next();
    let second = chars.next();

    spec.contains(',')
        || matches!(first, Some('(') | Some('1'..='9'))
        || (first.map_or(false, is_order_char) && matches!(second, Some('1'..='9') | Some('(')))
}

impl Descriptor {
    /// Parses a numpy-style type string or comma string.
    pub fn parse(spec: &str) -> Result<Descriptor> {
        if is_commastring(spec) {
            dtype_from_commastring(spec, false)
        } else {
            parse_type_str(spec)
        }
    }
}
