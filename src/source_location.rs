use serde::Serialize;

/// Byte offsets into a single-line spec string. `end` is exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Serialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn single(offset: usize) -> SourceSpan {
        SourceSpan {
            start: offset,
            end: offset + 1,
        }
    }

    pub fn new(start: usize, end: usize) -> SourceSpan {
        debug_assert!(start <= end);

        SourceSpan { start, end }
    }

    pub fn extend(&self, other: &SourceSpan) -> SourceSpan {
        debug_assert!(self.start <= other.start);
        debug_assert!(self.end <= other.end);

        SourceSpan {
            start: self.start,
            end: other.end,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
