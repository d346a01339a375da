use serde::{Deserialize, Serialize};
use std::fmt;

/// One element of a [`QueryKey`]. Only JSON-stable primitives are allowed so
/// that the serialized form is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Int(i64),
    Str(String),
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(i64::from(value))
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

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Int(n) => write!(f, "{}", n),
            KeyPart::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Ordered tuple identifying one cached resource, e.g.
/// `["shareholders", 1, "smith"]`. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
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

    /// Stable string form used as the map key inside the cache.
    pub fn serialize(&self) -> String {
        // A Vec of strings and integers always encodes.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Position-wise comparison over the prefix: every `prefix[i]` must equal
    /// `self[i]`. A key shorter than the prefix never matches.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        prefix
            .0
            .iter()
            .enumerate()
            .all(|(i, part)| self.0.get(i) == Some(part))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<KeyPart>> for QueryKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

/// Builds a [`QueryKey`] from a list of string/integer literals.
#[macro_export]
macro_rules! query_key {
    ($($part:expr),* $(,)?) => {
        $crate::cache::QueryKey::new(vec![$($crate::cache::KeyPart::from($part)),*])
    };
}
