//! The list-of-tuples interchange form used by the array protocol.

use crate::descriptor::{Descriptor, Field, Struct};
use crate::error::FieldTableError;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ArrayDescr {
    /// A primitive such as `<i4`.
    TypeStr(String),
    /// A top-level sub-array: element description plus shape.
    SubArray(Box<ArrayDescr>, Vec<usize>),
    Record(Vec<DescrEntry>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DescrEntry {
    pub name: String,
    pub title: Option<String>,
    pub descr: ArrayDescr,
    pub shape: Option<Vec<usize>>,
}

impl DescrEntry {
    pub fn new(name: &str, descr: ArrayDescr) -> DescrEntry {
        DescrEntry {
            name: name.to_string(),
            title: None,
            descr,
            shape: None,
        }
    }

    fn padding(size: usize) -> DescrEntry {
        DescrEntry::new("", ArrayDescr::TypeStr(format!("|V{size}")))
    }

    fn is_padding(&self) -> bool {
        self.name.is_empty()
            && self.shape.is_none()
            && matches!(&self.descr, ArrayDescr::TypeStr(s) if s.trim_start_matches(['|', '<', '>', '=']).starts_with('V'))
    }
}

impl Descriptor {
    /// Describes this layout in the array-protocol form, with explicit
    /// `('', '|V<n>')` entries for every gap between fields and at the end.
    pub fn to_array_descr(&self) -> Result<ArrayDescr, FieldTableError> {
        match self {
            Descriptor::Scalar(s) => Ok(ArrayDescr::TypeStr(s.type_str())),
            Descriptor::SubArray(s) => Ok(ArrayDescr::SubArray(
                Box::new(s.base.to_array_descr()?),
                s.shape.clone(),
            )),
            Descriptor::Struct(record) => record_descr(record).map(ArrayDescr::Record),
        }
    }

    /// Rebuilds a descriptor from its array-protocol form. Fields are laid out
    /// one after another; unnamed void entries only advance the offset.
    pub fn from_array_descr(descr: &ArrayDescr) -> Result<Descriptor, FieldTableError> {
        match descr {
            ArrayDescr::TypeStr(s) => Ok(Descriptor::parse(s)?),
            ArrayDescr::SubArray(base, shape) => Ok(Descriptor::subarray(
                Descriptor::from_array_descr(base)?,
                shape.clone(),
            )),
            ArrayDescr::Record(entries) => {
                let mut fields = Vec::with_capacity(entries.len());
                let mut offset: usize = 0;

                for entry in entries {
                    let mut descr = Descriptor::from_array_descr(&entry.descr)?;

                    if let Some(shape) = &entry.shape {
                        descr = Descriptor::subarray(descr, shape.clone());
                    }

                    let start = offset;
                    offset = descr
                        .checked_itemsize()
                        .and_then(|size| offset.checked_add(size))
                        .ok_or_else(|| FieldTableError::SizeOverflow(entry.name.clone()))?;

                    if entry.is_padding() {
                        continue;
                    }

                    fields.push(Field {
                        name: entry.name.clone(),
                        descr,
                        offset: start,
                        title: entry.title.clone(),
                    });
                }

                Ok(Descriptor::Struct(Struct::new(fields, offset, 1)?))
            }
        }
    }
}

fn record_descr(record: &Struct) -> Result<Vec<DescrEntry>, FieldTableError> {
    let mut fields: Vec<&Field> = record.named_fields().collect();
    fields.sort_by_key(|f| f.offset);

    let mut entries = Vec::with_capacity(fields.len());
    let mut offset = 0;

    for field in fields {
        if field.offset < offset {
            return Err(FieldTableError::OverlappingFields(field.name.clone()));
        }

        if field.offset > offset {
            entries.push(DescrEntry::padding(field.offset - offset));
        }

        let (descr, shape) = match &field.descr {
            Descriptor::SubArray(s) => (s.base.to_array_descr()?, Some(s.shape.clone())),
            other => (other.to_array_descr()?, None),
        };

        entries.push(DescrEntry {
            name: field.name.clone(),
            title: field.title.clone(),
            descr,
            shape,
        });
        offset = field.end();
    }

    if record.itemsize() > offset {
        entries.push(DescrEntry::padding(record.itemsize() - offset));
    }

    Ok(entries)
}

fn write_shape(f: &mut fmt::Formatter<'_>, shape: &[usize]) -> fmt::Result {
    match shape {
        [n] => write!(f, "({n},)"),
        dims => {
            let dims: Vec<String> = dims.iter().map(usize::to_string).collect();
            write!(f, "({})", dims.join(", "))
        }
    }
}

impl fmt::Display for ArrayDescr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayDescr::TypeStr(s) => write!(f, "'{s}'"),
            ArrayDescr::SubArray(base, shape) => {
                write!(f, "({base}, ")?;
                write_shape(f, shape)?;
                write!(f, ")")
            }
            ArrayDescr::Record(entries) => {
                write!(f, "[")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{entry}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for DescrEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(f, "(('{title}', '{}'), {}", self.name, self.descr)?,
            None => write!(f, "('{}', {}", self.name, self.descr)?,
        }

        if let Some(shape) = &self.shape {
            write!(f, ", ")?;
            write_shape(f, shape)?;
        }

        write!(f, ")")
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_array_descr() {
            Ok(descr) => write!(f, "{descr}"),
            Err(_) => write!(f, "'{}'", self.type_str()),
        }
    }
}
