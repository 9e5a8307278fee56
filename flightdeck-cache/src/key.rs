//! Query keys.
//!
//! A key is an ordered tuple of primitive values. Invalidation and
//! cancellation address whole families of keys by prefix, so
//! `("alerts",)` covers `("alerts", 0, 50)` and `("alerts", 50, 50)`.

use std::fmt;

/// One element of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    /// Only for unsigned values above `i64::MAX`; smaller ones are `Int` so
    /// the same number keys alike whatever its integer type.
    UInt(u64),
    Bool(bool),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(value) => write!(f, "{:?}", value),
            KeyPart::Int(value) => write!(f, "{}", value),
            KeyPart::UInt(value) => write!(f, "{}", value),
            KeyPart::Bool(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.clone())
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

macro_rules! int_key_part {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeyPart {
                fn from(value: $ty) -> Self {
                    KeyPart::Int(i64::from(value))
                }
            }
        )*
    };
}

int_key_part!(i32, i64, u32, u16, u8);

impl From<u64> for KeyPart {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(KeyPart::Int)
            .unwrap_or(KeyPart::UInt(value))
    }
}

impl From<usize> for KeyPart {
    fn from(value: usize) -> Self {
        KeyPart::from(value as u64)
    }
}

/// Identifier of a cached result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Append one element, builder style.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Element-wise prefix match. The empty key is a prefix of every key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, ")")
    }
}

/// Build a [`QueryKey`] from a list of primitives.
///
/// ```ignore
/// let key = query_key!["alerts", skip, limit];
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:expr),* $(,)?) => {
        $crate::QueryKey::new(vec![$($crate::KeyPart::from($part)),*])
    };
}
