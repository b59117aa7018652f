// attr.rs — Attribute store
//
// Typed key/value map read by inference and strategy functions. Values are a
// closed sum type; every accessor names the kind it expects and fails with
// `AttrError::TypeMismatch` instead of coercing.
//
// Preconditions: none.
// Postconditions: iteration order is key order (BTreeMap), so printing and
//   fingerprinting are deterministic.
// Failure modes: kind mismatches.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One attribute value.
///
/// Deserialized untagged from JSON; an empty list reads as an empty
/// integer list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    BoolList(Vec<bool>),
    StrList(Vec<String>),
}

/// Discriminant of `AttrValue`, used in accessor expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    Bool,
    Int,
    Float,
    Str,
    IntList,
    FloatList,
    BoolList,
    StrList,
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttrKind::Bool => "bool",
            AttrKind::Int => "int",
            AttrKind::Float => "float",
            AttrKind::Str => "string",
            AttrKind::IntList => "int list",
            AttrKind::FloatList => "float list",
            AttrKind::BoolList => "bool list",
            AttrKind::StrList => "string list",
        };
        f.write_str(s)
    }
}

impl AttrValue {
    pub fn kind(&self) -> AttrKind {
        match self {
            AttrValue::Bool(_) => AttrKind::Bool,
            AttrValue::Int(_) => AttrKind::Int,
            AttrValue::Float(_) => AttrKind::Float,
            AttrValue::Str(_) => AttrKind::Str,
            AttrValue::IntList(_) => AttrKind::IntList,
            AttrValue::FloatList(_) => AttrKind::FloatList,
            AttrValue::BoolList(_) => AttrKind::BoolList,
            AttrValue::StrList(_) => AttrKind::StrList,
        }
    }
}

/// Renders in the attribute literal syntax accepted by `parser::parse`.
impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T>(
            f: &mut fmt::Formatter<'_>,
            items: &[T],
            each: impl Fn(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
        ) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                each(f, item)?;
            }
            write!(f, "]")
        }

        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(n) => write!(f, "{n}"),
            AttrValue::Float(x) => write!(f, "{x:?}"),
            AttrValue::Str(s) => write!(f, "{s:?}"),
            AttrValue::IntList(v) => list(f, v, |f, n| write!(f, "{n}")),
            AttrValue::FloatList(v) => list(f, v, |f, x| write!(f, "{x:?}")),
            AttrValue::BoolList(v) => list(f, v, |f, b| write!(f, "{b}")),
            AttrValue::StrList(v) => list(f, v, |f, s| write!(f, "{s:?}")),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::IntList(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        AttrValue::FloatList(v)
    }
}

/// Accessor failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttrError {
    #[error("attribute '{key}' is {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: AttrKind,
        found: AttrKind,
    },
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Attribute map keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrMap {
    entries: BTreeMap<String, AttrValue>,
}

impl AttrMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` into `self`, `other` winning on conflicts.
    pub fn extend(&mut self, other: impl IntoIterator<Item = (String, AttrValue)>) {
        self.entries.extend(other);
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, AttrError> {
        self.typed(key, AttrKind::Bool, |v| match v {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, AttrError> {
        self.typed(key, AttrKind::Int, |v| match v {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        })
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>, AttrError> {
        self.typed(key, AttrKind::Float, |v| match v {
            AttrValue::Float(x) => Some(*x),
            _ => None,
        })
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, AttrError> {
        self.typed(key, AttrKind::Str, |v| match v {
            AttrValue::Str(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn get_int_list(&self, key: &str) -> Result<Option<&[i64]>, AttrError> {
        self.typed(key, AttrKind::IntList, |v| match v {
            AttrValue::IntList(l) => Some(l.as_slice()),
            _ => None,
        })
    }

    pub fn get_float_list(&self, key: &str) -> Result<Option<&[f64]>, AttrError> {
        self.typed(key, AttrKind::FloatList, |v| match v {
            AttrValue::FloatList(l) => Some(l.as_slice()),
            _ => None,
        })
    }

    fn typed<'a, T>(
        &'a self,
        key: &str,
        expected: AttrKind,
        extract: impl Fn(&'a AttrValue) -> Option<T>,
    ) -> Result<Option<T>, AttrError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => extract(value).map(Some).ok_or_else(|| AttrError::TypeMismatch {
                key: key.to_string(),
                expected,
                found: value.kind(),
            }),
        }
    }
}

impl FromIterator<(String, AttrValue)> for AttrMap {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        AttrMap {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let attrs = AttrMap::new()
            .with("shape", vec![4i64, 8])
            .with("dtype", "int32")
            .with("scale", 0.5)
            .with("flag", true);

        assert_eq!(attrs.get_int_list("shape").unwrap(), Some(&[4i64, 8][..]));
        assert_eq!(attrs.get_str("dtype").unwrap(), Some("int32"));
        assert_eq!(attrs.get_float("scale").unwrap(), Some(0.5));
        assert_eq!(attrs.get_bool("flag").unwrap(), Some(true));
        assert_eq!(attrs.get_int("absent").unwrap(), None);
    }

    #[test]
    fn kind_mismatch_fails_fast() {
        let attrs = AttrMap::new().with("shape", "4x8");
        let err = attrs.get_int_list("shape").unwrap_err();
        assert_eq!(
            err,
            AttrError::TypeMismatch {
                key: "shape".to_string(),
                expected: AttrKind::IntList,
                found: AttrKind::Str,
            }
        );
        assert_eq!(
            err.to_string(),
            "attribute 'shape' is string, expected int list"
        );
    }

    #[test]
    fn json_untagged() {
        let attrs: AttrMap =
            serde_json::from_str(r#"{"shape": [4, 8], "dtype": "int64", "low": 0, "p": 0.25, "e": []}"#)
                .unwrap();
        assert_eq!(attrs.get("shape"), Some(&AttrValue::IntList(vec![4, 8])));
        assert_eq!(attrs.get("low"), Some(&AttrValue::Int(0)));
        assert_eq!(attrs.get("p"), Some(&AttrValue::Float(0.25)));
        assert_eq!(attrs.get("e"), Some(&AttrValue::IntList(vec![])));
    }

    #[test]
    fn display_literal_syntax() {
        assert_eq!(AttrValue::IntList(vec![4, 8]).to_string(), "[4, 8]");
        assert_eq!(AttrValue::Str("int32".into()).to_string(), "\"int32\"");
        assert_eq!(AttrValue::Float(1.0).to_string(), "1.0");
        assert_eq!(AttrValue::BoolList(vec![true, false]).to_string(), "[true, false]");
    }

    #[test]
    fn iteration_is_key_ordered() {
        let attrs = AttrMap::new().with("z", 1i64).with("a", 2i64);
        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "z"]);
    }
}
