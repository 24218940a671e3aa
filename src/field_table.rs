//! Records built from explicit `name -> (format, offset[, title])` tables.

use crate::commastring::dtype_from_commastring;
use crate::descriptor::{Descriptor, Field, Struct};
use crate::error::FieldTableError;
use crate::util::padding_to;

/// One element of a field entry.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryItem {
    Format(String),
    Descr(Descriptor),
    Offset(i64),
    Title(String),
}

impl From<&str> for EntryItem {
    fn from(format: &str) -> Self {
        EntryItem::Format(format.to_string())
    }
}

impl From<Descriptor> for EntryItem {
    fn from(descr: Descriptor) -> Self {
        EntryItem::Descr(descr)
    }
}

impl From<i64> for EntryItem {
    fn from(offset: i64) -> Self {
        EntryItem::Offset(offset)
    }
}

/// Field entries keyed by name, with an optional explicit name order.
#[derive(Clone, Debug, Default)]
pub struct FieldTable {
    entries: Vec<(String, Vec<EntryItem>)>,
    names: Option<Vec<String>>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, name: &str, items: Vec<EntryItem>) -> Self {
        self.entries.push((name.to_string(), items));
        self
    }

    /// Keeps fields in this order instead of sorting them by offset.
    pub fn names(mut self, names: &[&str]) -> Self {
        self.names = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn build(&self, align: bool) -> Result<Descriptor, FieldTableError> {
        let mut fields = Vec::with_capacity(self.entries.len());

        match &self.names {
            None => {
                for (name, items) in &self.entries {
                    // A title entry that repeats its own name only aliases the field.
                    if let [_, _, EntryItem::Title(title)] = items.as_slice() {
                        if title == name {
                            continue;
                        }
                    }

                    fields.push(make_field(name, items, align)?);
                }

                fields.sort_by_key(|f: &Field| f.offset);
            }
            Some(names) => {
                for name in names {
                    let Some((_, items)) = self.entries.iter().find(|(n, _)| n == name) else {
                        return Err(FieldTableError::UnknownField(name.clone()));
                    };

                    fields.push(make_field(name, items, align)?);
                }
            }
        }

        let mut itemsize = fields.iter().map(Field::end).max().unwrap_or(0);
        let mut alignment = 1;

        if align {
            for field in &fields {
                let field_align = field.descr.alignment();
                if field.offset % field_align != 0 {
                    return Err(FieldTableError::Misaligned {
                        name: field.name.clone(),
                        offset: field.offset,
                        alignment: field_align,
                    });
                }

                alignment = alignment.max(field_align);
            }

            itemsize += padding_to(itemsize, alignment);
        }

        Ok(Descriptor::Struct(Struct::new(fields, itemsize, alignment)?))
    }
}

fn make_field(name: &str, items: &[EntryItem], align: bool) -> Result<Field, FieldTableError> {
    if !(2..=3).contains(&items.len()) {
        return Err(FieldTableError::WrongArity {
            name: name.to_string(),
            len: items.len(),
        });
    }

    let wrong = |index: usize, expected: &'static str| FieldTableError::WrongEntryType {
        name: name.to_string(),
        index,
        expected,
    };

    let descr = match &items[0] {
        EntryItem::Descr(descr) => descr.clone(),
        EntryItem::Format(format) if align && format.contains(',') => {
            dtype_from_commastring(format, true)?
        }
        EntryItem::Format(format) => Descriptor::parse(format)?,
        _ => return Err(wrong(0, "a data-type")),
    };

    let offset = match items[1] {
        EntryItem::Offset(offset) if offset < 0 => {
            return Err(FieldTableError::NegativeOffset {
                name: name.to_string(),
                offset,
            });
        }
        EntryItem::Offset(offset) => offset as usize,
        _ => return Err(wrong(1, "an integer offset")),
    };

    let title = match items.get(2) {
        None => None,
        Some(EntryItem::Title(title)) => Some(title.clone()),
        Some(_) => return Err(wrong(2, "a title")),
    };

    Ok(Field {
        name: name.to_string(),
        descr,
        offset,
        title,
    })
}
