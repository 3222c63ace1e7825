//! Tagged dynamic value used for transition arguments (§6).
//!
//! This is the one external collaborator the design doc asks to keep
//! out-of-scope from the engine's semantics but that still needs an in-crate
//! home because no example in the corpus ships a standalone crate for it.
//! Only the capabilities the engine actually consumes are implemented:
//! construction from the primitive Rust types, deep equality, partial
//! ordering where types match, and conversions to the handful of scalar
//! types guard callbacks tend to want.

use std::collections::BTreeMap;
use std::cmp::Ordering;
use std::fmt;

/// A tagged union over the value kinds an event argument can carry.
///
/// Small scalars are stored inline; `String`, `Bytes`, `List` and `Map` own
/// heap data the same way the standard library types they wrap already do.
#[derive(Debug, Clone)]
pub enum Variant {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Double(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Variant>),
    Map(BTreeMap<VariantKey, Variant>),
    Pair(Box<Variant>, Box<Variant>),
}

/// `Variant` cannot derive `Ord`/`Eq` itself (it embeds `f64`), but a map
/// keyed by variants needs a total order. `VariantKey` wraps a `Variant`
/// that is restricted, by construction, to orderable payloads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariantKey(String);

impl VariantKey {
    /// Builds a map key from a variant's canonical string rendering. This
    /// mirrors how the original C++ `VariantDict_t` is keyed by `std::string`.
    pub fn new(v: &Variant) -> Self {
        Self(v.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Variant {
    pub fn is_string(&self) -> bool {
        matches!(self, Variant::String(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_signed_numeric() || self.is_unsigned_numeric() || matches!(self, Variant::Double(_))
    }

    pub fn is_signed_numeric(&self) -> bool {
        matches!(
            self,
            Variant::Int8(_) | Variant::Int16(_) | Variant::Int32(_) | Variant::Int64(_)
        )
    }

    pub fn is_unsigned_numeric(&self) -> bool {
        matches!(
            self,
            Variant::UInt8(_) | Variant::UInt16(_) | Variant::UInt32(_) | Variant::UInt64(_)
        )
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Variant::Bool(_))
    }

    /// Converts to a signed 64-bit integer; non-numeric variants yield 0,
    /// matching the original `Variant::toInt64()` behavior of silently
    /// coercing rather than panicking.
    pub fn to_i64(&self) -> i64 {
        match self {
            Variant::Int8(v) => *v as i64,
            Variant::Int16(v) => *v as i64,
            Variant::Int32(v) => *v as i64,
            Variant::Int64(v) => *v,
            Variant::UInt8(v) => *v as i64,
            Variant::UInt16(v) => *v as i64,
            Variant::UInt32(v) => *v as i64,
            Variant::UInt64(v) => *v as i64,
            Variant::Double(v) => *v as i64,
            Variant::Bool(v) => *v as i64,
            Variant::String(s) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn to_u64(&self) -> u64 {
        match self {
            Variant::UInt8(v) => *v as u64,
            Variant::UInt16(v) => *v as u64,
            Variant::UInt32(v) => *v as u64,
            Variant::UInt64(v) => *v,
            _ => self.to_i64().max(0) as u64,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Variant::Double(v) => *v,
            Variant::String(s) => s.parse().unwrap_or(0.0),
            Variant::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            _ if self.is_numeric() => self.to_i64() as f64,
            _ => 0.0,
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Variant::Bool(v) => *v,
            Variant::String(s) => !s.is_empty() && s != "0" && s != "false",
            _ if self.is_numeric() => self.to_i64() != 0,
            _ => false,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Int8(v) => write!(f, "{v}"),
            Variant::Int16(v) => write!(f, "{v}"),
            Variant::Int32(v) => write!(f, "{v}"),
            Variant::Int64(v) => write!(f, "{v}"),
            Variant::UInt8(v) => write!(f, "{v}"),
            Variant::UInt16(v) => write!(f, "{v}"),
            Variant::UInt32(v) => write!(f, "{v}"),
            Variant::UInt64(v) => write!(f, "{v}"),
            Variant::Double(v) => write!(f, "{v}"),
            Variant::Bool(v) => write!(f, "{v}"),
            Variant::String(v) => write!(f, "{v}"),
            Variant::Bytes(v) => write!(f, "{v:?}"),
            Variant::List(v) => {
                write!(f, "[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Variant::Map(v) => {
                write!(f, "{{")?;
                for (i, (k, val)) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {val}", k.as_str())?;
                }
                write!(f, "}}")
            }
            Variant::Pair(a, b) => write!(f, "({a}, {b})"),
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        use Variant::*;
        match (self, other) {
            (Int8(a), Int8(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (UInt8(a), UInt8(b)) => a == b,
            (UInt16(a), UInt16(b)) => a == b,
            (UInt32(a), UInt32(b)) => a == b,
            (UInt64(a), UInt64(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Pair(a1, a2), Pair(b1, b2)) => a1 == b1 && a2 == b2,
            // Cross-kind numeric comparisons are intentionally supported
            // (a guard shouldn't have to care whether an id was posted as
            // an i32 or a u32), but strings/bytes/containers never compare
            // equal across kinds.
            (a, b) if a.is_numeric() && b.is_numeric() => a.to_f64() == b.to_f64(),
            _ => false,
        }
    }
}

impl PartialOrd for Variant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_numeric() && other.is_numeric() {
            return self.to_f64().partial_cmp(&other.to_f64());
        }
        match (self, other) {
            (Variant::String(a), Variant::String(b)) => Some(a.cmp(b)),
            (Variant::Bool(a), Variant::Bool(b)) => Some(a.cmp(b)),
            (Variant::Bytes(a), Variant::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

macro_rules! from_impl {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Variant {
            fn from(v: $t) -> Self {
                Variant::$variant(v)
            }
        }
    };
}

from_impl!(i8, Int8);
from_impl!(i16, Int16);
from_impl!(i32, Int32);
from_impl!(i64, Int64);
from_impl!(u8, UInt8);
from_impl!(u16, UInt16);
from_impl!(u32, UInt32);
from_impl!(u64, UInt64);
from_impl!(f64, Double);
from_impl!(bool, Bool);
from_impl!(String, String);

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Variant {
    fn from(v: Vec<u8>) -> Self {
        Variant::Bytes(v)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(v: Vec<Variant>) -> Self {
        Variant::List(v)
    }
}

/// Convenience alias for the argument vector carried by every posted event.
pub type VariantVec = Vec<Variant>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_deep() {
        let a = Variant::List(vec![Variant::from(1i32), Variant::from("go")]);
        let b = Variant::List(vec![Variant::from(1i32), Variant::from("go")]);
        let c = Variant::List(vec![Variant::from(1i32), Variant::from("stop")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn numeric_kinds_compare_across_width() {
        assert_eq!(Variant::from(5i32), Variant::from(5u64));
        assert!(Variant::from(1i32) < Variant::from(2i32));
    }

    #[test]
    fn conversions_coerce_rather_than_panic() {
        let s = Variant::from("42");
        assert_eq!(s.to_i64(), 42);
        assert_eq!(Variant::from(true).to_i64(), 1);
        assert_eq!(Variant::from("").to_bool(), false);
    }

    #[test]
    fn string_and_numeric_never_compare_equal() {
        assert_ne!(Variant::from(1i32), Variant::from("1"));
    }
}
