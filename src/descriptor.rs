use crate::error::{FieldTableError, ViewError};
use crate::types::{Scalar, ScalarKind};
use crate::util::{checked_prod, padding_to, prod};
use serde::Serialize;
use std::collections::HashSet;

/// The compiled layout of one array element.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Descriptor {
    Scalar(Scalar),
    Struct(Struct),
    SubArray(SubArray),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub descr: Descriptor,
    pub offset: usize,
    pub title: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, descr: Descriptor, offset: usize) -> Field {
        Field {
            name: name.into(),
            descr,
            offset,
            title: None,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.descr.itemsize()
    }

    /// Unnamed raw bytes that only exist to fill a gap.
    pub fn is_padding(&self) -> bool {
        self.name.is_empty() && self.descr.is_void()
    }
}

/// Ordered fields plus the total size and alignment of the record.
///
/// Equality compares the item size and the named fields. Unnamed padding and
/// `alignment` are ignored: two records with the same fields at the same
/// offsets describe the same memory.
#[derive(Clone, Debug, Serialize)]
pub struct Struct {
    fields: Vec<Field>,
    itemsize: usize,
    alignment: usize,
}

impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.itemsize == other.itemsize && self.named_fields().eq(other.named_fields())
    }
}

impl Struct {
    pub fn new(
        fields: Vec<Field>,
        itemsize: usize,
        alignment: usize,
    ) -> Result<Struct, FieldTableError> {
        let mut names = HashSet::new();
        for field in &fields {
            if !names.insert(field.name.as_str()) {
                return Err(FieldTableError::DuplicateName(field.name.clone()));
            }
        }

        let mut titles = HashSet::new();
        for title in fields.iter().filter_map(|f| f.title.as_deref()) {
            if names.contains(title) || !titles.insert(title) {
                return Err(FieldTableError::TitleCollision(title.to_string()));
            }
        }

        if let Some(field) = fields.iter().find(|f| f.end() > itemsize) {
            return Err(FieldTableError::FieldOutOfBounds {
                name: field.name.clone(),
                end: field.end(),
                itemsize,
            });
        }

        Ok(Struct {
            fields,
            itemsize,
            alignment: alignment.max(1),
        })
    }

    /// For field tables the caller has already validated.
    pub(crate) fn new_unchecked(fields: Vec<Field>, itemsize: usize, alignment: usize) -> Struct {
        debug_assert!(fields.iter().all(|f| f.end() <= itemsize));

        Struct {
            fields,
            itemsize,
            alignment: alignment.max(1),
        }
    }

    /// Item size is the furthest field end; no alignment requirement.
    pub fn from_fields(fields: Vec<Field>) -> Result<Struct, FieldTableError> {
        let itemsize = fields.iter().map(Field::end).max().unwrap_or(0);
        Struct::new(fields, itemsize, 1)
    }

    /// Lays the fields out back to back in the given order.
    pub fn packed(fields: Vec<(String, Descriptor)>) -> Result<Struct, FieldTableError> {
        let (fields, itemsize, alignment) = Struct::sequential(fields, false);
        Struct::new(fields, itemsize, alignment)
    }

    /// Lays the fields out in order at their natural C alignment, rounding the
    /// total size up to the largest alignment.
    pub fn aligned(fields: Vec<(String, Descriptor)>) -> Result<Struct, FieldTableError> {
        let (fields, itemsize, alignment) = Struct::sequential(fields, true);
        Struct::new(fields, itemsize, alignment)
    }

    pub(crate) fn sequential(
        fields: Vec<(String, Descriptor)>,
        align: bool,
    ) -> (Vec<Field>, usize, usize) {
        let mut offset = 0;
        let mut alignment = 1;
        let fields = fields
            .into_iter()
            .map(|(name, descr)| {
                if align {
                    let field_align = descr.alignment();
                    alignment = alignment.max(field_align);
                    offset += padding_to(offset, field_align);
                }

                let field = Field::new(name, descr, offset);
                offset = field.end();
                field
            })
            .collect();

        (fields, offset + padding_to(offset, alignment), alignment)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Fields a user declared, without unnamed padding.
    pub fn named_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_padding())
    }

    /// Looks a field up by name or by title.
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == key || f.title.as_deref() == Some(key))
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubArray {
    pub base: Box<Descriptor>,
    pub shape: Vec<usize>,
}

impl Descriptor {
    pub fn subarray(base: Descriptor, shape: Vec<usize>) -> Descriptor {
        Descriptor::SubArray(SubArray {
            base: Box::new(base),
            shape,
        })
    }

    pub fn void(itemsize: usize) -> Descriptor {
        Descriptor::Scalar(Scalar::void(itemsize))
    }

    pub fn itemsize(&self) -> usize {
        match self {
            Descriptor::Scalar(s) => s.itemsize,
            Descriptor::Struct(s) => s.itemsize,
            Descriptor::SubArray(s) => s.base.itemsize() * prod(&s.shape),
        }
    }

    /// `itemsize`, or `None` when a sub-array is too large for `usize`.
    pub fn checked_itemsize(&self) -> Option<usize> {
        match self {
            Descriptor::SubArray(s) => s.base.checked_itemsize()?.checked_mul(checked_prod(&s.shape)?),
            _ => Some(self.itemsize()),
        }
    }

    pub fn alignment(&self) -> usize {
        match self {
            Descriptor::Scalar(s) => s.alignment(),
            Descriptor::Struct(s) => s.alignment,
            Descriptor::SubArray(s) => s.base.alignment(),
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Descriptor::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn fields(&self) -> Option<&[Field]> {
        self.as_struct().map(Struct::fields)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Descriptor::Scalar(s) if s.kind == ScalarKind::Void)
    }

    /// Type string of the whole item; records and sub-arrays are raw bytes.
    pub fn type_str(&self) -> String {
        match self {
            Descriptor::Scalar(s) => s.type_str(),
            _ => format!("|V{}", self.itemsize()),
        }
    }

    pub fn has_object(&self) -> bool {
        match self {
            Descriptor::Scalar(s) => s.kind == ScalarKind::Object,
            Descriptor::Struct(s) => s.fields.iter().any(|f| f.descr.has_object()),
            Descriptor::SubArray(s) => s.base.has_object(),
        }
    }

    /// Returns a copy of the record with `order` moved to the front.
    pub fn reorder_names(&self, order: &[&str]) -> Result<Descriptor, FieldTableError> {
        let Descriptor::Struct(record) = self else {
            return Err(FieldTableError::NotStructured);
        };

        let mut rest: Vec<&Field> = record.fields.iter().collect();
        let mut fields = Vec::with_capacity(rest.len());

        for name in order {
            let Some(pos) = rest.iter().position(|f| f.name == *name) else {
                return Err(FieldTableError::UnknownField(name.to_string()));
            };
            fields.push(rest.remove(pos).clone());
        }

        fields.extend(rest.into_iter().cloned());

        Ok(Descriptor::Struct(Struct {
            fields,
            ..record.clone()
        }))
    }

    /// The same named fields laid out without any padding bytes.
    pub fn packed(&self) -> Result<Descriptor, FieldTableError> {
        let Descriptor::Struct(record) = self else {
            return Err(FieldTableError::NotStructured);
        };

        let fields = record
            .named_fields()
            .map(|f| (f.name.clone(), f.descr.clone()))
            .collect();

        Ok(Descriptor::Struct(Struct::packed(fields)?))
    }
}

/// Injects `padding` unnamed bytes at the end of `value`.
///
/// An existing trailing padding field is widened instead of adding a second one.
pub fn add_trailing_padding(value: &Descriptor, padding: usize) -> Descriptor {
    let itemsize = value.itemsize();
    let alignment = value.alignment();

    let mut fields = match value {
        Descriptor::Struct(s) => s.fields.clone(),
        other => vec![Field::new("f0", other.clone(), 0)],
    };

    match fields.last_mut() {
        Some(last) if last.is_padding() && last.end() == itemsize => {
            last.descr = Descriptor::void(last.descr.itemsize() + padding);
        }
        _ => {
            let name = free_padding_name(&fields);
            fields.push(Field::new(name, Descriptor::void(padding), itemsize));
        }
    }

    Descriptor::Struct(Struct {
        fields,
        itemsize: itemsize + padding,
        alignment,
    })
}

fn free_padding_name(fields: &[Field]) -> String {
    let taken = |name: &str| fields.iter().any(|f| f.name == name);

    if !taken("") {
        return String::new();
    }

    (0..)
        .map(|j| format!("pad{j}"))
        .find(|name| !taken(name))
        .unwrap_or_default()
}

/// Refuses a view that would reinterpret object references as other data.
pub fn check_view_safe(old: &Descriptor, new: &Descriptor) -> Result<(), ViewError> {
    if old == new {
        return Ok(());
    }

    if new.has_object() || old.has_object() {
        return Err(ViewError::ObjectView);
    }

    Ok(())
}

/// Field access into object-holding records is allowed only at an exact field.
pub fn check_getfield_safe(
    old: &Descriptor,
    new: &Descriptor,
    offset: usize,
) -> Result<(), ViewError> {
    if !(new.has_object() || old.has_object()) {
        return Ok(());
    }

    if offset == 0 && new == old {
        return Ok(());
    }

    if let Some(fields) = old.fields() {
        if fields.iter().any(|f| f.offset == offset && f.descr == *new) {
            return Ok(());
        }
    }

    Err(ViewError::ObjectField)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ByteOrder;

    fn int(size: usize) -> Descriptor {
        Descriptor::Scalar(Scalar::new(ScalarKind::Int, size, ByteOrder::Little).unwrap())
    }

    fn object() -> Descriptor {
        Descriptor::Scalar(
            Scalar::new(ScalarKind::Object, crate::types::POINTER_SIZE, ByteOrder::Native)
                .unwrap(),
        )
    }

    #[test]
    fn trailing_padding_is_appended_once() {
        let record = Struct::packed(vec![("a".into(), int(4)), ("b".into(), int(1))]).unwrap();
        let padded = add_trailing_padding(&Descriptor::Struct(record), 3);

        assert_eq!(padded.itemsize(), 8);
        let fields = padded.fields().unwrap();
        assert_eq!(fields.len(), 3);
        assert!(fields[2].is_padding());
        assert_eq!(fields[2].offset, 5);

        let widened = add_trailing_padding(&padded, 4);
        let fields = widened.fields().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2].descr.itemsize(), 7);
        assert_eq!(widened.itemsize(), 12);
    }

    #[test]
    fn trailing_padding_wraps_scalars() {
        let padded = add_trailing_padding(&int(4), 4);
        let fields = padded.fields().unwrap();

        assert_eq!(fields[0].name, "f0");
        assert_eq!(fields[1].name, "");
        assert_eq!(padded.itemsize(), 8);
    }

    #[test]
    fn titles_must_not_shadow_names() {
        let mut a = Field::new("a", int(4), 0);
        a.title = Some("b".into());
        let b = Field::new("b", int(4), 4);

        assert_eq!(
            Struct::new(vec![a, b], 8, 1),
            Err(FieldTableError::TitleCollision("b".into()))
        );
    }

    #[test]
    fn fields_must_fit_in_the_item() {
        let err = Struct::new(vec![Field::new("a", int(8), 4)], 8, 1).unwrap_err();
        assert!(matches!(err, FieldTableError::FieldOutOfBounds { end: 12, .. }));
    }

    #[test]
    fn reorder_moves_named_fields_first() {
        let record = Struct::packed(vec![
            ("a".into(), int(1)),
            ("b".into(), int(2)),
            ("c".into(), int(4)),
        ])
        .unwrap();
        let reordered = Descriptor::Struct(record).reorder_names(&["c", "a"]).unwrap();
        let names: Vec<_> = reordered.as_struct().unwrap().names().collect();

        assert_eq!(names, ["c", "a", "b"]);
        assert_eq!(reordered.fields().unwrap()[0].offset, 3);

        assert_eq!(
            reordered.reorder_names(&["zz"]),
            Err(FieldTableError::UnknownField("zz".into()))
        );
    }

    #[test]
    fn packed_drops_padding() {
        let fields = vec![Field::new("a", int(1), 0), Field::new("b", int(4), 4)];
        let record = Descriptor::Struct(Struct::new(fields, 8, 4).unwrap());
        let padded = add_trailing_padding(&record, 8);

        let packed = padded.packed().unwrap();
        assert_eq!(packed.itemsize(), 5);
        assert_eq!(packed.fields().unwrap()[1].offset, 1);
    }

    #[test]
    fn object_views_are_refused() {
        let record = Descriptor::Struct(
            Struct::packed(vec![("o".into(), object()), ("i".into(), int(8))]).unwrap(),
        );

        assert_eq!(check_view_safe(&record, &record), Ok(()));
        assert_eq!(
            check_view_safe(&record, &int(8)),
            Err(ViewError::ObjectView)
        );
        assert_eq!(check_getfield_safe(&record, &object(), 0), Ok(()));
        assert_eq!(
            check_getfield_safe(&record, &int(8), 0),
            Err(ViewError::ObjectField)
        );
        assert_eq!(check_getfield_safe(&int(8), &int(4), 4), Ok(()));
    }
}
