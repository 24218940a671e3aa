pub mod parse_stream;
pub mod source_location;

pub mod commastring;
pub mod pep3118;
pub mod typestr;

pub mod array_descr;
pub mod descriptor;
pub mod field_table;
pub mod types;

pub mod config;
pub mod error;
pub mod overrides;

mod util;

pub use array_descr::{ArrayDescr, DescrEntry};
pub use descriptor::{Descriptor, Field, Struct, SubArray};
pub use error::{
    DispatchError, FieldTableError, MalformedKind, MalformedSpecError, SignatureMismatchError,
    ViewError,
};
pub use types::{ByteOrder, Scalar, ScalarKind};
