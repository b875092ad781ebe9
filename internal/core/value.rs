// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Dynamically typed state values.

    State authored against the engine is schema-free: a [`Value`] can hold
    scalars, lists and objects. Lists and objects are reference counted and
    shared; equality between two values follows the host-language `===`
    contract the list differ and the swap bookkeeping rely on: scalars
    compare by value, containers by identity.
*/

use crate::errors::{ErrorCode, StructiveError};
use smol_str::{SmolStr, ToSmolStr};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Shared storage of a list value.
pub type ListData = Rc<RefCell<Vec<Value>>>;
/// Shared storage of an object value.
pub type ObjectData = Rc<RefCell<BTreeMap<SmolStr, Value>>>;

/// A dynamically typed value of the reactive state.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub enum Value {
    /// There is nothing in this value. That's the default.
    #[default]
    Undefined,
    /// An explicit null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. Integers are represented exactly up to 2^53.
    Number(f64),
    /// A string.
    String(SmolStr),
    /// A list of values, shared by reference.
    List(ListData),
    /// A string-keyed object, shared by reference.
    Object(ObjectData),
}

impl Value {
    /// Build a list value from a vector.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Build an object value from an iterator of entries.
    pub fn object(entries: impl IntoIterator<Item = (SmolStr, Value)>) -> Value {
        Value::Object(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    /// True when the value is [`Value::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True when the value is a list.
    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// The boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The numeric payload, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<SmolStr> {
        match self {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// The list payload, if this is a list.
    pub fn as_list(&self) -> Option<ListData> {
        match self {
            Value::List(l) => Some(l.clone()),
            _ => None,
        }
    }

    /// The object payload, if this is an object.
    pub fn as_object(&self) -> Option<ObjectData> {
        match self {
            Value::Object(o) => Some(o.clone()),
            _ => None,
        }
    }

    /// Truthiness following the host-language boolean coercion.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::List(_) | Value::Object(_) => true,
        }
    }

    /// Read a named field of an object.
    pub fn get_property(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(o) => o.borrow().get(name).cloned(),
            _ => None,
        }
    }

    /// Write a named field of an object. Returns false when the value is
    /// not an object.
    pub fn set_property(&self, name: &str, value: Value) -> bool {
        match self {
            Value::Object(o) => {
                o.borrow_mut().insert(SmolStr::new(name), value);
                true
            }
            _ => false,
        }
    }

    /// Read a list element by position.
    pub fn item(&self, index: usize) -> Option<Value> {
        match self {
            Value::List(l) => l.borrow().get(index).cloned(),
            _ => None,
        }
    }

    /// Write a list element by position. Returns false when the value is
    /// not a list or the position is out of range.
    pub fn set_item(&self, index: usize, value: Value) -> bool {
        match self {
            Value::List(l) => {
                let mut items = l.borrow_mut();
                if index < items.len() {
                    items[index] = value;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// The number of elements of a list, 0 otherwise.
    pub fn len(&self) -> usize {
        match self {
            Value::List(l) => l.borrow().len(),
            _ => 0,
        }
    }

    /// True when this is an empty list or not a list at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of the list elements.
    pub fn items(&self) -> Vec<Value> {
        match self {
            Value::List(l) => l.borrow().clone(),
            _ => Vec::new(),
        }
    }

    /// The hashable identity projection used by the list differ.
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Undefined => ValueKey::Undefined,
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Number(n) => ValueKey::Number(n.to_bits()),
            Value::String(s) => ValueKey::String(s.clone()),
            Value::List(l) => ValueKey::Ptr(Rc::as_ptr(l) as usize),
            Value::Object(o) => ValueKey::Ptr(Rc::as_ptr(o) as usize),
        }
    }

    /// Convert a JSON value. Arrays and objects become fresh shared
    /// containers.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(SmolStr::new(s)),
            serde_json::Value::Array(items) => Value::list(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(entries) => Value::object(
                entries.iter().map(|(k, v)| (SmolStr::new(k), Value::from_json(v))),
            ),
        }
    }

    /// Convert to a JSON value. `Undefined` maps to `null`; non-finite
    /// numbers are rejected with STATE-202.
    pub fn to_json(&self) -> Result<serde_json::Value, StructiveError> {
        Ok(match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    StructiveError::new(ErrorCode::StateInvalidWrite, "non-finite number cannot be serialized")
                })?,
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::List(l) => serde_json::Value::Array(
                l.borrow().iter().map(|v| v.to_json()).collect::<Result<_, _>>()?,
            ),
            Value::Object(o) => serde_json::Value::Object(
                o.borrow().iter().map(|(k, v)| Ok((k.to_string(), v.to_json()?))).collect::<Result<_, StructiveError>>()?,
            ),
        })
    }

    /// The textual rendering used by text-content and attribute bindings.
    pub fn to_text(&self) -> SmolStr {
        match self {
            Value::Undefined | Value::Null => SmolStr::default(),
            Value::Bool(b) => if *b { SmolStr::new_static("true") } else { SmolStr::new_static("false") },
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
                    (*n as i64).to_smolstr()
                } else {
                    n.to_smolstr()
                }
            }
            Value::String(s) => s.clone(),
            Value::List(l) => {
                let items = l.borrow();
                items.iter().map(|v| v.to_text()).collect::<Vec<_>>().join(",").to_smolstr()
            }
            Value::Object(_) => SmolStr::new_static("[object]"),
        }
    }
}

/// Equality follows `===`: scalars by payload, containers by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(SmolStr::new(s))
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s)
    }
}

/// Serializes through the JSON representation of [`Value::to_json`];
/// non-finite numbers fail.
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().map_err(serde::ser::Error::custom)?.serialize(serializer)
    }
}

/// Deserializes any JSON shape; `null` becomes [`Value::Null`].
impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

/// Hashable projection of a [`Value`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// Projection of [`Value::Undefined`].
    Undefined,
    /// Projection of [`Value::Null`].
    Null,
    /// Projection of a boolean.
    Bool(bool),
    /// Projection of a number, by bit pattern.
    Number(u64),
    /// Projection of a string.
    String(SmolStr),
    /// Projection of a container, by address.
    Ptr(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_equality_is_by_value() {
        assert_eq!(Value::from(1.0), Value::from(1.0));
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from(1.0), Value::from("1"));
        assert_ne!(Value::Null, Value::Undefined);
    }

    #[test]
    fn container_equality_is_by_identity() {
        let a = Value::list(vec![Value::from(1.0)]);
        let b = Value::list(vec![Value::from(1.0)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.key(), a.clone().key());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn json_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"count": 3, "items": [{"n": "a"}], "open": true}"#).unwrap();
        let value = Value::from_json(&json);
        assert_eq!(value.get_property("count"), Some(Value::from(3.0)));
        assert_eq!(value.get_property("items").unwrap().item(0).unwrap().get_property("n"), Some(Value::from("a")));
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn text_rendering() {
        assert_eq!(Value::from(7.0).to_text(), "7");
        assert_eq!(Value::from(1.5).to_text(), "1.5");
        assert_eq!(Value::from(true).to_text(), "true");
        assert_eq!(Value::Undefined.to_text(), "");
    }

    #[test]
    fn serde_round_trip() {
        let value = Value::object([
            (SmolStr::new("open"), Value::Bool(true)),
            (SmolStr::new("tags"), Value::list(vec![Value::from("x")])),
        ]);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"open":true,"tags":["x"]}"#);
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back.get_property("open"), Some(Value::Bool(true)));
        assert_eq!(back.get_property("tags").unwrap().item(0), Some(Value::from("x")));
    }

    #[test]
    fn mutation_through_shared_handles() {
        let list = Value::list(vec![Value::from("a")]);
        let alias = list.clone();
        alias.as_list().unwrap().borrow_mut().push(Value::from("b"));
        assert_eq!(list.len(), 2);
        assert!(list.set_item(1, Value::from("c")));
        assert_eq!(list.item(1), Some(Value::from("c")));
        assert!(!list.set_item(5, Value::from("x")));
    }
}
