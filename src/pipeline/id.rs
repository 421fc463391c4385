//! Identity types for the ingress dataset.
//!
//! All IDs are newtypes over `u32` that serve as direct array indices
//! into their respective axis tables, providing O(1) lookup. Keeping one
//! type per table stops a value-axis index from being used where a
//! timestamp-axis index is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into the timestamp axis table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampAxisId(pub u32);

impl TimestampAxisId {
    pub const INVALID: TimestampAxisId = TimestampAxisId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TimestampAxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TimestampAxisId(INVALID)")
        } else {
            write!(f, "TimestampAxisId({})", self.0)
        }
    }
}

impl fmt::Display for TimestampAxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into the value axis table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueAxisId(pub u32);

impl ValueAxisId {
    pub const INVALID: ValueAxisId = ValueAxisId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ValueAxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ValueAxisId(INVALID)")
        } else {
            write!(f, "ValueAxisId({})", self.0)
        }
    }
}

impl fmt::Display for ValueAxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into the opaque (fixed-stride blob) axis table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueAxisId(pub u32);

impl OpaqueAxisId {
    pub const INVALID: OpaqueAxisId = OpaqueAxisId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for OpaqueAxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "OpaqueAxisId(INVALID)")
        } else {
            write!(f, "OpaqueAxisId({})", self.0)
        }
    }
}

impl fmt::Display for OpaqueAxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Position of a stage in the compiled execution order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(pub u32);

impl StageId {
    pub const INVALID: StageId = StageId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "StageId(INVALID)")
        } else {
            write!(f, "StageId({})", self.0)
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_axis_id() {
        let id = TimestampAxisId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!TimestampAxisId::INVALID.is_valid());
    }

    #[test]
    fn test_value_axis_id() {
        let id = ValueAxisId(0);
        assert!(id.is_valid());
        assert_eq!(id.index(), 0);
        assert!(!ValueAxisId::INVALID.is_valid());
    }

    #[test]
    fn test_opaque_axis_id_debug() {
        assert_eq!(format!("{:?}", OpaqueAxisId(3)), "OpaqueAxisId(3)");
        assert_eq!(format!("{}", OpaqueAxisId::INVALID), "OpaqueAxisId(INVALID)");
    }

    #[test]
    fn test_stage_id() {
        let id = StageId(5);
        assert!(id.is_valid());
        assert!(!StageId::INVALID.is_valid());
    }

    #[test]
    fn test_ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&ValueAxisId(7)).unwrap();
        assert_eq!(json, "7");
        let id: TimestampAxisId = serde_json::from_str("12").unwrap();
        assert_eq!(id, TimestampAxisId(12));
    }
}
