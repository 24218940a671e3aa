use serde::Serialize;
use std::fmt;
use std::mem::{align_of, size_of};
use std::os::raw::{c_int, c_long, c_longlong, c_short};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ByteOrder {
    Native,
    Little,
    Big,
    NotApplicable,
}

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub const HOST: ByteOrder = ByteOrder::Little;
    #[cfg(target_endian = "big")]
    pub const HOST: ByteOrder = ByteOrder::Big;

    pub fn from_char(c: char) -> Option<ByteOrder> {
        match c {
            '=' => Some(ByteOrder::Native),
            '<' => Some(ByteOrder::Little),
            '>' => Some(ByteOrder::Big),
            '|' => Some(ByteOrder::NotApplicable),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            ByteOrder::Native => '=',
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
            ByteOrder::NotApplicable => '|',
        }
    }

    /// Replaces `Native` with the host's actual order.
    pub fn resolve(self) -> ByteOrder {
        match self {
            ByteOrder::Native => ByteOrder::HOST,
            other => other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    Complex,
    Bytes,
    Str,
    Object,
    Void,
}

impl ScalarKind {
    pub fn code(self) -> char {
        match self {
            ScalarKind::Bool => 'b',
            ScalarKind::Int => 'i',
            ScalarKind::UInt => 'u',
            ScalarKind::Float => 'f',
            ScalarKind::Complex => 'c',
            ScalarKind::Bytes => 'S',
            ScalarKind::Str => 'U',
            ScalarKind::Object => 'O',
            ScalarKind::Void => 'V',
        }
    }

    pub fn from_code(c: char) -> Option<ScalarKind> {
        match c {
            'b' => Some(ScalarKind::Bool),
            'i' => Some(ScalarKind::Int),
            'u' => Some(ScalarKind::UInt),
            'f' => Some(ScalarKind::Float),
            'c' => Some(ScalarKind::Complex),
            'S' | 'a' => Some(ScalarKind::Bytes),
            'U' => Some(ScalarKind::Str),
            'O' => Some(ScalarKind::Object),
            'V' => Some(ScalarKind::Void),
            _ => None,
        }
    }

    /// Flexible kinds carry their length in the item size.
    pub fn is_flexible(self) -> bool {
        matches!(self, ScalarKind::Bytes | ScalarKind::Str | ScalarKind::Void)
    }
}

/// Size and alignment of the platform's `long double`.
#[cfg(all(
    any(target_arch = "x86_64", target_arch = "aarch64"),
    not(target_os = "windows"),
    not(target_vendor = "apple")
))]
pub const LONG_DOUBLE: (usize, usize) = (16, 16);
#[cfg(all(target_arch = "x86", not(target_os = "windows")))]
pub const LONG_DOUBLE: (usize, usize) = (12, 4);
#[cfg(not(any(
    all(
        any(target_arch = "x86_64", target_arch = "aarch64"),
        not(target_os = "windows"),
        not(target_vendor = "apple")
    ),
    all(target_arch = "x86", not(target_os = "windows"))
)))]
pub const LONG_DOUBLE: (usize, usize) = (8, 8);

pub const POINTER_SIZE: usize = size_of::<usize>();

/// A primitive element type with a fixed item size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Scalar {
    pub kind: ScalarKind,
    pub itemsize: usize,
    pub byteorder: ByteOrder,
}

impl Scalar {
    /// Returns `None` when `itemsize` is not a valid width for `kind`.
    pub fn new(kind: ScalarKind, itemsize: usize, byteorder: ByteOrder) -> Option<Scalar> {
        let valid = match kind {
            ScalarKind::Bool => itemsize == 1,
            ScalarKind::Int | ScalarKind::UInt => matches!(itemsize, 1 | 2 | 4 | 8),
            ScalarKind::Float => matches!(itemsize, 2 | 4 | 8) || itemsize == LONG_DOUBLE.0,
            ScalarKind::Complex => matches!(itemsize, 8 | 16) || itemsize == 2 * LONG_DOUBLE.0,
            ScalarKind::Object => itemsize == POINTER_SIZE,
            ScalarKind::Str => itemsize % 4 == 0,
            ScalarKind::Bytes | ScalarKind::Void => true,
        };

        if !valid {
            return None;
        }

        Some(Scalar {
            kind,
            itemsize,
            byteorder: normalize_order(kind, itemsize, byteorder),
        })
    }

    pub fn void(itemsize: usize) -> Scalar {
        Scalar {
            kind: ScalarKind::Void,
            itemsize,
            byteorder: ByteOrder::NotApplicable,
        }
    }

    pub fn alignment(&self) -> usize {
        match self.kind {
            ScalarKind::Bool | ScalarKind::Bytes | ScalarKind::Void => 1,
            ScalarKind::Int | ScalarKind::UInt => self.itemsize,
            ScalarKind::Float => float_alignment(self.itemsize),
            ScalarKind::Complex => float_alignment(self.itemsize / 2),
            ScalarKind::Str => 4,
            ScalarKind::Object => align_of::<usize>(),
        }
    }

    pub fn with_byteorder(&self, byteorder: ByteOrder) -> Scalar {
        Scalar {
            byteorder: normalize_order(self.kind, self.itemsize, byteorder),
            ..*self
        }
    }

    /// The array-protocol type string, e.g. `<i4`, `|S5`, `<U3`.
    pub fn type_str(&self) -> String {
        let order = self.byteorder.as_char();
        match self.kind {
            ScalarKind::Object => format!("{order}O"),
            ScalarKind::Str => format!("{order}U{}", self.itemsize / 4),
            kind => format!("{order}{}{}", kind.code(), self.itemsize),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_str())
    }
}

fn float_alignment(itemsize: usize) -> usize {
    if itemsize == LONG_DOUBLE.0 {
        LONG_DOUBLE.1
    } else {
        itemsize
    }
}

fn normalize_order(kind: ScalarKind, itemsize: usize, byteorder: ByteOrder) -> ByteOrder {
    let swappable = match kind {
        ScalarKind::Int | ScalarKind::UInt | ScalarKind::Float | ScalarKind::Complex => {
            itemsize > 1
        }
        ScalarKind::Str => true,
        _ => false,
    };

    if !swappable {
        return ByteOrder::NotApplicable;
    }

    match byteorder {
        ByteOrder::NotApplicable => ByteOrder::HOST,
        order => order.resolve(),
    }
}

/// Single-character C type codes sized for the host platform.
pub fn native_char_type(code: char, byteorder: ByteOrder) -> Option<Scalar> {
    use ScalarKind::*;

    let (kind, itemsize) = match code {
        '?' => (Bool, 1),
        'b' => (Int, 1),
        'B' => (UInt, 1),
        'h' => (Int, size_of::<c_short>()),
        'H' => (UInt, size_of::<c_short>()),
        'i' => (Int, size_of::<c_int>()),
        'I' => (UInt, size_of::<c_int>()),
        'l' => (Int, size_of::<c_long>()),
        'L' => (UInt, size_of::<c_long>()),
        'q' => (Int, size_of::<c_longlong>()),
        'Q' => (UInt, size_of::<c_longlong>()),
        'p' => (Int, size_of::<isize>()),
        'P' => (UInt, size_of::<usize>()),
        'e' => (Float, 2),
        'f' => (Float, 4),
        'd' => (Float, 8),
        'g' => (Float, LONG_DOUBLE.0),
        'F' => (Complex, 8),
        'D' => (Complex, 16),
        'G' => (Complex, 2 * LONG_DOUBLE.0),
        'O' => (Object, POINTER_SIZE),
        _ => return None,
    };

    Scalar::new(kind, itemsize, byteorder)
}
