//! Read-only state inspection for debuggers and overlays.
//!
//! Queries must be made at a quiescent point (between CPU steps, or with the
//! tick barrier held). They never change emulation state.

use std::fmt;

/// A dynamically typed query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    /// Integer view used by tooling that does not care about width.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Bool(v) => Some(u64::from(v)),
            Value::U8(v) => Some(u64::from(v)),
            Value::U16(v) => Some(u64::from(v)),
            Value::U32(v) => Some(u64::from(v)),
            Value::U64(v) => Some(v),
            Value::Text(_) | Value::List(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "${v:02X}"),
            Value::U16(v) => write!(f, "${v:04X}"),
            Value::U32(v) => write!(f, "${v:08X}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from!(bool => Bool, u8 => U8, u16 => U16, u32 => U32, u64 => U64, String => Text);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// A component whose state can be inspected by dotted path
/// (`"agnus.vpos"`, `"cia_a.timer_a"`).
pub trait Observable {
    /// `None` if the path is not recognised.
    fn query(&self, path: &str) -> Option<Value>;

    /// Every path `query` understands.
    fn query_paths(&self) -> &'static [&'static str];
}
