//! Compiles PEP 3118 buffer format strings (`"T{<i:x:(2,2)d:y:}"`) into descriptors.

use crate::descriptor::{add_trailing_padding, Descriptor, Field, Struct};
use crate::error::{MalformedKind, MalformedSpecError};
use crate::parse_stream::{Mode, ParseStream};
use crate::source_location::SourceSpan;
use crate::types::{native_char_type, ByteOrder, Scalar, ScalarKind};
use crate::util::{checked_prod, lcm, padding_to, prod};
use tracing::trace;

type Result<T> = std::result::Result<T, MalformedSpecError>;

enum TypeCode {
    Fixed(Scalar),
    /// `s` and `w`: the repeat count becomes the string length.
    Flexible(ScalarKind, ByteOrder),
    /// `x`: raw padding bytes.
    Padding,
}

fn lookup_type_code(code: &str, mode: Mode) -> Option<TypeCode> {
    let order = match mode {
        Mode::NativeAligned | Mode::NativeUnaligned | Mode::StandardNative => ByteOrder::Native,
        Mode::Little => ByteOrder::Little,
        Mode::Big => ByteOrder::Big,
    };

    match code {
        "s" => return Some(TypeCode::Flexible(ScalarKind::Bytes, order)),
        "w" => return Some(TypeCode::Flexible(ScalarKind::Str, order)),
        "x" => return Some(TypeCode::Padding),
        "c" => return Scalar::new(ScalarKind::Bytes, 1, order).map(TypeCode::Fixed),
        _ => {}
    }

    if mode.uses_native_sizes() {
        let native = match code {
            "Zf" => "F",
            "Zd" => "D",
            "Zg" => "G",
            _ if code.len() == 1 && "?bBhHiIlLqQefdgO".contains(code) => code,
            _ => return None,
        };

        return native
            .chars()
            .next()
            .and_then(|c| native_char_type(c, order))
            .map(TypeCode::Fixed);
    }

    use ScalarKind::*;

    let (kind, itemsize) = match code {
        "?" => (Bool, 1),
        "b" => (Int, 1),
        "B" => (UInt, 1),
        "h" => (Int, 2),
        "H" => (UInt, 2),
        "i" | "l" => (Int, 4),
        "I" | "L" => (UInt, 4),
        "q" => (Int, 8),
        "Q" => (UInt, 8),
        "e" => (Float, 2),
        "f" => (Float, 4),
        "d" => (Float, 8),
        "Zf" => (Complex, 8),
        "Zd" => (Complex, 16),
        "O" => return native_char_type('O', order).map(TypeCode::Fixed),
        _ => return None,
    };

    Scalar::new(kind, itemsize, order).map(TypeCode::Fixed)
}

/// A field whose name may still have to be generated.
struct PendingField {
    name: Option<String>,
    descr: Descriptor,
    offset: usize,
}

/// Per-block state: one instance per `T{...}` nesting level.
struct Block {
    fields: Vec<PendingField>,
    offset: usize,
    common_alignment: usize,
    explicit_name: bool,
}

impl Block {
    fn new() -> Self {
        Block {
            fields: Vec::new(),
            offset: 0,
            common_alignment: 1,
            explicit_name: false,
        }
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name.as_deref() == Some(name))
    }

    /// Names every unnamed field `f<N>` with the lowest N not taken by any
    /// other field of the block, explicit names declared later included.
    fn into_fields(self) -> Vec<Field> {
        let mut names: Vec<Option<String>> = self.fields.iter().map(|f| f.name.clone()).collect();

        for i in 0..names.len() {
            if names[i].is_some() {
                continue;
            }

            let taken = |name: &str| names.iter().any(|n| n.as_deref() == Some(name));
            let name = (0..)
                .map(|j| format!("f{j}"))
                .find(|name| !taken(name))
                .unwrap_or_default();
            names[i] = Some(name);
        }

        self.fields
            .into_iter()
            .zip(names)
            .map(|(field, name)| Field::new(name.unwrap_or_default(), field.descr, field.offset))
            .collect()
    }
}

/// Parses a PEP 3118 format string. A spec with a single unnamed item yields
/// that item's descriptor instead of a one-field record.
pub fn dtype_from_pep3118(spec: &str) -> Result<Descriptor> {
    let mut stream = ParseStream::new(spec);

    skip_separators(&mut stream);
    if stream.is_empty() {
        return Err(stream.error_here(MalformedKind::UnexpectedEnd));
    }

    let (descr, _) = parse_block(&mut stream, false)?;

    Ok(descr)
}

fn skip_separators(stream: &mut ParseStream) {
    stream.read_while(|c| c.is_whitespace() || c == ',');
}

fn parse_block(stream: &mut ParseStream, is_subdtype: bool) -> Result<(Descriptor, usize)> {
    let mut block = Block::new();
    let mut closed = false;

    loop {
        skip_separators(stream);

        if stream.is_empty() {
            break;
        }

        let item_start = stream.offset();

        if stream.consume("}") {
            if !is_subdtype {
                return Err(stream.error(
                    MalformedKind::UnbalancedBlockEnd,
                    SourceSpan::single(item_start),
                ));
            }

            closed = true;
            break;
        }

        let shape = if stream.consume("(") {
            Some(parse_shape(stream)?)
        } else {
            None
        };

        if let Some(mode) = stream.peek().and_then(Mode::from_char) {
            stream.advance();
            stream.mode = mode;
        }

        let (count_span, digits) = stream.read_while(|c| c.is_ascii_digit());
        let mut itemsize = if digits.is_empty() {
            1
        } else {
            digits.parse::<usize>().map_err(|_| {
                stream.error(MalformedKind::InvalidCount(digits.to_string()), count_span)
            })?
        };

        let mut is_padding = false;

        let (mut value, align) = if stream.consume("T{") {
            let enclosing = stream.mode;
            let nested = parse_block(stream, true)?;
            stream.mode = enclosing;
            nested
        } else {
            let code_start = stream.offset();
            let code_len = match stream.peek() {
                Some('Z') => 2,
                Some(_) => 1,
                None => return Err(stream.error_here(MalformedKind::UnexpectedEnd)),
            };

            let code: String = stream.rest().chars().take(code_len).collect();
            let code_span = SourceSpan::new(code_start, code_start + code.len());

            let Some(type_code) = lookup_type_code(&code, stream.mode) else {
                return Err(stream.error(MalformedKind::UnknownTypeCode(code), code_span));
            };

            for _ in 0..code_len {
                stream.advance();
            }

            let value = match type_code {
                TypeCode::Fixed(scalar) => Descriptor::Scalar(scalar),
                TypeCode::Flexible(kind, order) => {
                    let unit = if kind == ScalarKind::Str { 4 } else { 1 };
                    let len = std::mem::replace(&mut itemsize, 1);
                    let size = len.checked_mul(unit).ok_or_else(|| {
                        stream.error(
                            MalformedKind::SizeOverflow(format!("{len}{code}")),
                            SourceSpan::new(count_span.start, code_span.end),
                        )
                    })?;
                    let scalar = Scalar::new(kind, size, order).ok_or_else(|| {
                        stream.error(
                            MalformedKind::InvalidItemSize {
                                kind: kind.code(),
                                size,
                            },
                            code_span,
                        )
                    })?;
                    Descriptor::Scalar(scalar)
                }
                TypeCode::Padding => {
                    is_padding = true;
                    Descriptor::void(std::mem::replace(&mut itemsize, 1))
                }
            };

            let align = value.alignment();
            (value, align)
        };

        // Under '@' the start of the buffer is assumed to be aligned already.
        let mut extra_offset = 0;
        if stream.mode.is_aligned() {
            let start_padding = padding_to(block.offset, align);
            let intra_padding = padding_to(value.itemsize(), align);

            block.offset = block
                .offset
                .checked_add(start_padding)
                .ok_or_else(|| size_overflow(stream, item_start))?;

            if intra_padding != 0 {
                // The shape product was checked when the shape was parsed.
                let repeated = itemsize > 1 || shape.as_ref().map_or(false, |s| prod(s) > 1);

                if repeated {
                    value = add_trailing_padding(&value, intra_padding);
                } else {
                    // Seen at most once, so the gap can be left after the field.
                    extra_offset += intra_padding;
                }
            }

            block.common_alignment = lcm(align, block.common_alignment);
        }

        if itemsize != 1 {
            value = Descriptor::subarray(value, vec![itemsize]);
        }

        if let Some(shape) = shape {
            value = Descriptor::subarray(value, shape);
        }

        let mut this_explicit_name = false;
        let name = if stream.consume(":") {
            let Some((_, name)) = stream.consume_until(':') else {
                return Err(stream.error(
                    MalformedKind::UnterminatedName,
                    SourceSpan::new(stream.offset() - 1, stream.source().len()),
                ));
            };

            block.explicit_name = true;
            this_explicit_name = true;
            Some(name.to_string())
        } else {
            None
        };

        let itemsize = value
            .checked_itemsize()
            .ok_or_else(|| size_overflow(stream, item_start))?;
        let next_offset = block
            .offset
            .checked_add(itemsize)
            .and_then(|end| end.checked_add(extra_offset))
            .ok_or_else(|| size_overflow(stream, item_start))?;

        if !is_padding || this_explicit_name {
            if let Some(name) = &name {
                if block.has_field(name) {
                    return Err(stream.error(
                        MalformedKind::DuplicateFieldName(name.clone()),
                        SourceSpan::new(item_start, stream.offset()),
                    ));
                }
            }

            trace!(name = ?name, offset = block.offset, itemsize, "parsed field");

            block.fields.push(PendingField {
                name,
                descr: value,
                offset: block.offset,
            });
        }

        block.offset = next_offset;
    }

    if is_subdtype && !closed {
        return Err(stream.error(
            MalformedKind::UnterminatedBlock,
            SourceSpan::new(stream.offset(), stream.offset()),
        ));
    }

    let offset = block.offset;
    let common_alignment = block.common_alignment;
    let explicit_name = block.explicit_name;
    let mut fields = block.into_fields();

    let is_simple_item =
        fields.len() == 1 && !explicit_name && fields[0].offset == 0 && !is_subdtype;

    let mut descr = match fields.pop() {
        Some(field) if is_simple_item => field.descr,
        last => {
            fields.extend(last);
            let itemsize = fields.iter().map(Field::end).max().unwrap_or(0);
            Descriptor::Struct(Struct::new_unchecked(fields, itemsize, common_alignment))
        }
    };

    let trailing = if stream.mode.is_aligned() {
        padding_to(offset, common_alignment)
    } else {
        0
    };

    if offset.checked_add(trailing).is_none() {
        return Err(stream.error(
            MalformedKind::SizeOverflow(stream.source().to_string()),
            SourceSpan::new(0, stream.offset()),
        ));
    }

    let padding = offset - descr.itemsize() + trailing;

    if padding > 0 {
        descr = add_trailing_padding(&descr, padding);
    }

    Ok((descr, common_alignment))
}

/// The item starting at `start` and ending at the current offset does not fit
/// in the address space.
fn size_overflow(stream: &ParseStream, start: usize) -> MalformedSpecError {
    let span = SourceSpan::new(start, stream.offset());
    let item = stream.source()[span.start..span.end].to_string();
    stream.error(MalformedKind::SizeOverflow(item), span)
}

fn parse_shape(stream: &mut ParseStream) -> Result<Vec<usize>> {
    let open = stream.offset() - 1;

    let Some((span, text)) = stream.consume_until(')') else {
        return Err(stream.error(
            MalformedKind::InvalidShape(stream.rest().to_string()),
            SourceSpan::new(open, stream.source().len()),
        ));
    };

    let shape = text
        .split(',')
        .map(|dim| match dim.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(stream.error(MalformedKind::InvalidShape(text.to_string()), span)),
        })
        .collect::<Result<Vec<usize>>>()?;

    if checked_prod(&shape).is_none() {
        return Err(stream.error(MalformedKind::SizeOverflow(text.to_string()), span));
    }

    Ok(shape)
}

impl Descriptor {
    pub fn from_pep3118(spec: &str) -> Result<Descriptor> {
        dtype_from_pep3118(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_long;

    fn scalar(kind: ScalarKind, itemsize: usize) -> Descriptor {
        Descriptor::Scalar(Scalar::new(kind, itemsize, ByteOrder::Native).unwrap())
    }

    fn layout(descr: &Descriptor) -> Vec<(String, usize, usize)> {
        descr
            .fields()
            .unwrap()
            .iter()
            .map(|f| (f.name.clone(), f.offset, f.descr.itemsize()))
            .collect()
    }

    #[test]
    fn single_item_collapses_to_its_type() {
        assert_eq!(
            dtype_from_pep3118("<i").unwrap(),
            Descriptor::Scalar(Scalar::new(ScalarKind::Int, 4, ByteOrder::Little).unwrap())
        );
        assert_eq!(dtype_from_pep3118("d").unwrap(), scalar(ScalarKind::Float, 8));
    }

    #[test]
    fn named_single_item_stays_a_record() {
        let descr = dtype_from_pep3118("i:x:").unwrap();
        assert_eq!(layout(&descr), [("x".to_string(), 0, 4)]);
    }

    #[test]
    fn native_alignment_inserts_start_and_trailing_padding() {
        let descr = dtype_from_pep3118("@bd").unwrap();

        assert_eq!(
            layout(&descr),
            [("f0".to_string(), 0, 1), ("f1".to_string(), 8, 8)]
        );
        assert_eq!(descr.itemsize(), 16);
        assert_eq!(descr.alignment(), 8);

        let descr = dtype_from_pep3118("@ib").unwrap();
        assert_eq!(
            layout(&descr),
            [
                ("f0".to_string(), 0, 4),
                ("f1".to_string(), 4, 1),
                ("".to_string(), 5, 3),
            ]
        );
        assert_eq!(descr.itemsize(), 8);
    }

    #[test]
    fn standard_modes_do_not_align() {
        let descr = dtype_from_pep3118("<bd").unwrap();

        assert_eq!(
            layout(&descr),
            [("f0".to_string(), 0, 1), ("f1".to_string(), 1, 8)]
        );
        assert_eq!(descr.itemsize(), 9);

        let descr = dtype_from_pep3118("^bd").unwrap();
        assert_eq!(descr.itemsize(), 9);
    }

    #[test]
    fn byte_order_persists_until_overridden() {
        let descr = dtype_from_pep3118(">ih<h").unwrap();
        let orders: Vec<_> = descr
            .fields()
            .unwrap()
            .iter()
            .map(|f| match &f.descr {
                Descriptor::Scalar(s) => s.byteorder,
                _ => unreachable!(),
            })
            .collect();

        assert_eq!(orders, [ByteOrder::Big, ByteOrder::Big, ByteOrder::Little]);
    }

    #[test]
    fn network_order_is_big_endian() {
        assert_eq!(
            dtype_from_pep3118("!q").unwrap(),
            Descriptor::Scalar(Scalar::new(ScalarKind::Int, 8, ByteOrder::Big).unwrap())
        );
    }

    #[test]
    fn long_uses_native_or_standard_size() {
        assert_eq!(
            dtype_from_pep3118("l").unwrap().itemsize(),
            std::mem::size_of::<c_long>()
        );
        assert_eq!(dtype_from_pep3118("=l").unwrap().itemsize(), 4);
    }

    #[test]
    fn repeat_counts_and_shapes_build_subarrays() {
        let descr = dtype_from_pep3118("3i").unwrap();
        assert_eq!(
            descr,
            Descriptor::subarray(scalar(ScalarKind::Int, 4), vec![3])
        );

        let descr = dtype_from_pep3118("(2,3)d:m:").unwrap();
        let field = &descr.fields().unwrap()[0];
        assert_eq!(
            field.descr,
            Descriptor::subarray(scalar(ScalarKind::Float, 8), vec![2, 3])
        );
        assert_eq!(descr.itemsize(), 48);
    }

    #[test]
    fn strings_take_their_length_from_the_count() {
        assert_eq!(dtype_from_pep3118("5s").unwrap(), scalar(ScalarKind::Bytes, 5));
        assert_eq!(dtype_from_pep3118("3w").unwrap(), scalar(ScalarKind::Str, 12));
        assert_eq!(
            dtype_from_pep3118("2c").unwrap(),
            Descriptor::subarray(scalar(ScalarKind::Bytes, 1), vec![2])
        );
    }

    #[test]
    fn unnamed_padding_only_moves_the_offset() {
        let descr = dtype_from_pep3118("<b3xi:a:").unwrap();
        assert_eq!(
            layout(&descr),
            [("f0".to_string(), 0, 1), ("a".to_string(), 4, 4)]
        );

        let descr = dtype_from_pep3118("<b3x:pad:").unwrap();
        assert_eq!(
            layout(&descr),
            [("f0".to_string(), 0, 1), ("pad".to_string(), 1, 3)]
        );
    }

    #[test]
    fn trailing_unnamed_padding_is_kept() {
        let descr = dtype_from_pep3118("<i4x").unwrap();
        assert_eq!(
            layout(&descr),
            [("f0".to_string(), 0, 4), ("".to_string(), 4, 4)]
        );
    }

    #[test]
    fn dummy_names_skip_explicit_ones() {
        let descr = dtype_from_pep3118("<i:f1:ii").unwrap();
        let names: Vec<_> = descr.as_struct().unwrap().names().collect();

        assert_eq!(names, ["f1", "f0", "f2"]);
    }

    #[test]
    fn dummy_names_skip_explicit_names_declared_later() {
        let descr = dtype_from_pep3118("<ii:f0:").unwrap();
        let names: Vec<_> = descr.as_struct().unwrap().names().collect();
        assert_eq!(names, ["f1", "f0"]);

        let descr = dtype_from_pep3118("<iiT{i:f0:}:f1:").unwrap();
        let names: Vec<_> = descr.as_struct().unwrap().names().collect();
        assert_eq!(names, ["f0", "f2", "f1"]);

        let inner = &descr.fields().unwrap()[2].descr;
        let names: Vec<_> = inner.as_struct().unwrap().names().collect();
        assert_eq!(names, ["f0"]);
    }

    #[test]
    fn nested_blocks_keep_their_alignment() {
        let descr = dtype_from_pep3118("@bT{di:y:}:s:").unwrap();
        let fields = descr.fields().unwrap();

        assert_eq!(fields[1].name, "s");
        assert_eq!(fields[1].offset, 8);
        assert_eq!(fields[1].descr.itemsize(), 16);
        assert_eq!(descr.itemsize(), 24);

        // A nested single unnamed item is never collapsed.
        let inner = dtype_from_pep3118("T{<i}").unwrap();
        assert_eq!(layout(&inner), [("f0".to_string(), 0, 4)]);
    }

    #[test]
    fn nested_byte_order_is_scoped_to_the_block() {
        let descr = dtype_from_pep3118("<T{>i}i").unwrap();
        let fields = descr.fields().unwrap();

        let inner = &fields[0].descr.fields().unwrap()[0].descr;
        assert!(matches!(inner, Descriptor::Scalar(s) if s.byteorder == ByteOrder::Big));
        assert!(matches!(&fields[1].descr, Descriptor::Scalar(s) if s.byteorder == ByteOrder::Little));
    }

    // `T{i^b}` under '@' has size 5 but alignment 4, so it needs 3 bytes of
    // interior padding. A single occurrence defers them; a repeated one folds
    // them into the element.
    #[test]
    fn interior_padding_deferred_for_a_single_item() {
        let descr = dtype_from_pep3118("@T{i^b}:s:b:t:").unwrap();
        let fields = descr.fields().unwrap();

        assert_eq!(fields[0].descr.itemsize(), 5);
        assert_eq!(fields[1].offset, 8);

        let descr = dtype_from_pep3118("(1)@T{i^b}:s:b:t:").unwrap();
        let fields = descr.fields().unwrap();

        assert_eq!(fields[0].descr.itemsize(), 5);
        assert_eq!(fields[1].offset, 8);
        assert_eq!(descr.itemsize(), 12);
    }

    #[test]
    fn interior_padding_folded_for_repeated_items() {
        let descr = dtype_from_pep3118("(2)@T{i^b}:s:b:t:").unwrap();
        let fields = descr.fields().unwrap();

        let Descriptor::SubArray(sub) = &fields[0].descr else {
            panic!("expected a sub-array");
        };
        assert_eq!(sub.base.itemsize(), 8);
        assert_eq!(fields[0].descr.itemsize(), 16);
        assert_eq!(fields[1].offset, 16);
        assert_eq!(descr.itemsize(), 20);

        let descr = dtype_from_pep3118("@2T{i^b}:s:").unwrap();
        assert_eq!(descr.fields().unwrap()[0].descr.itemsize(), 16);
    }

    #[test]
    fn commas_and_spaces_separate_items() {
        let descr = dtype_from_pep3118("@i, f").unwrap();
        assert_eq!(
            layout(&descr),
            [("f0".to_string(), 0, 4), ("f1".to_string(), 4, 4)]
        );
        assert_eq!(descr.itemsize(), 8);
    }

    #[test]
    fn malformed_specs_are_rejected() {
        let kind = |spec: &str| dtype_from_pep3118(spec).unwrap_err().kind;

        assert_eq!(kind("<k"), MalformedKind::UnknownTypeCode("k".into()));
        assert_eq!(kind("<g"), MalformedKind::UnknownTypeCode("g".into()));
        assert_eq!(kind("T{ii"), MalformedKind::UnterminatedBlock);
        assert_eq!(kind("i}"), MalformedKind::UnbalancedBlockEnd);
        assert_eq!(kind("(2,0)i"), MalformedKind::InvalidShape("2,0".into()));
        assert_eq!(kind("(2,x)i"), MalformedKind::InvalidShape("2,x".into()));
        assert_eq!(kind("(2i"), MalformedKind::InvalidShape("2i".into()));
        assert_eq!(kind("i:a"), MalformedKind::UnterminatedName);
        assert_eq!(kind("<4"), MalformedKind::UnexpectedEnd);
        assert_eq!(kind(""), MalformedKind::UnexpectedEnd);
        assert_eq!(
            kind("T{i:a:d:a:}"),
            MalformedKind::DuplicateFieldName("a".into())
        );
    }

    #[test]
    fn oversized_items_are_errors() {
        let kind = |spec: &str| dtype_from_pep3118(spec).unwrap_err().kind;

        assert_eq!(
            kind("(4294967296,4294967296)i"),
            MalformedKind::SizeOverflow("4294967296,4294967296".into())
        );
        assert!(matches!(
            kind("18446744073709551615w"),
            MalformedKind::SizeOverflow(_)
        ));
        assert!(matches!(
            kind("<4611686018427387904i"),
            MalformedKind::SizeOverflow(_)
        ));
        assert!(matches!(
            kind("<18446744073709551615xi"),
            MalformedKind::SizeOverflow(_)
        ));
    }

    #[test]
    fn duplicate_name_error_points_at_the_item() {
        let err = dtype_from_pep3118("i:a:d:a:").unwrap_err();

        assert_eq!(err.span, SourceSpan::new(4, 8));
        assert!(err.to_string().contains("duplicate field name 'a'"));
    }
}
