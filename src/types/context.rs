//! Context maps: named bindings injected into an execution context before
//! its entry point becomes reachable.

use std::fmt::Display;

use indexmap::IndexMap;
use serde::ser::{self, Serialize, Serializer};
use serde_json::Value;

/// A value that can be injected into an execution context.
///
/// Data is copied into the context. Functions are referenced by the name
/// they were registered under (see [`Registry`](crate::Registry)).
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// An unsigned integer above `i64::MAX`.
    UInt(u64),
    /// A float. Must be finite to be representable.
    Float(f64),
    /// A string.
    String(String),
    /// A registered helper function, by name.
    Function(String),
    /// Any JSON value: objects, arrays or null.
    Object(Value),
    /// A value that failed conversion; rejected when the handle is built.
    Unrepresentable(String),
}

impl ContextValue {
    /// References a helper registered with
    /// [`Registry::register_function`](crate::Registry::register_function).
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function(name.into())
    }

    /// Converts any serializable value. Scalars keep their kind; everything
    /// else becomes [`ContextValue::Object`]. A failed conversion, including
    /// a NaN or infinite float anywhere in the value, is kept as
    /// [`ContextValue::Unrepresentable`] so that handle construction reports it.
    ///
    /// # Examples
    ///
    /// ```
    /// use offload::ContextValue;
    /// use serde_json::json;
    /// use std::collections::HashMap;
    ///
    /// assert_eq!(ContextValue::from_serialize(&5), ContextValue::Int(5));
    /// assert_eq!(ContextValue::from_serialize(&u64::MAX), ContextValue::UInt(u64::MAX));
    /// assert_eq!(
    ///     ContextValue::from_serialize(&json!({"deep": "a"})),
    ///     ContextValue::Object(json!({"deep": "a"}))
    /// );
    ///
    /// let mut tuple_keys = HashMap::new();
    /// tuple_keys.insert((1, 2), "x");
    /// assert!(matches!(
    ///     ContextValue::from_serialize(&tuple_keys),
    ///     ContextValue::Unrepresentable(_)
    /// ));
    /// assert!(matches!(
    ///     ContextValue::from_serialize(&[1.0, f64::INFINITY]),
    ///     ContextValue::Unrepresentable(_)
    /// ));
    /// ```
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        // serde_json writes non-finite floats as null instead of failing
        if let Err(err) = value.serialize(FiniteFloats) {
            return Self::Unrepresentable(err.to_string());
        }

        match serde_json::to_value(value) {
            Ok(Value::Bool(b)) => Self::Bool(b),
            Ok(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            },
            Ok(Value::String(s)) => Self::String(s),
            Ok(other) => Self::Object(other),
            Err(err) => Self::Unrepresentable(err.to_string()),
        }
    }

    /// A short name for the value's kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::UInt(_) | Self::Float(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Object(_) => "object",
            Self::Unrepresentable(_) => "unrepresentable",
        }
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for ContextValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ContextValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for ContextValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Self::UInt(v), Self::Int)
    }
}

impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Value> for ContextValue {
    fn from(v: Value) -> Self {
        Self::from_serialize(&v)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct NonFinite(String);

impl ser::Error for NonFinite {
    fn custom<T: Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

/// Walks a value and fails on the first NaN or infinite float.
struct FiniteFloats;

impl FiniteFloats {
    fn check(value: f64) -> Result<(), NonFinite> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(NonFinite(format!("{value} is not a finite number")))
        }
    }
}

impl Serializer for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), NonFinite> {
        Self::check(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), NonFinite> {
        Self::check(v)
    }

    fn serialize_char(self, _: char) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_some<T>(self, value: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), NonFinite> {
        Ok(())
    }

    fn serialize_newtype_struct<T>(self, _: &'static str, value: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, NonFinite> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), NonFinite> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), NonFinite> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), NonFinite> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), NonFinite> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        key.serialize(FiniteFloats)
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), NonFinite> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T>(&mut self, _: &'static str, value: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), NonFinite> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T>(&mut self, _: &'static str, value: &T) -> Result<(), NonFinite>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), NonFinite> {
        Ok(())
    }
}

/// Ordered set of named bindings. Insertion order is the order in which the
/// bindings are installed.
///
/// # Examples
///
/// ```
/// use offload::{ContextMap, ContextValue};
/// use serde_json::json;
///
/// let context = ContextMap::new()
///     .with("a", "a")
///     .with("b", 5)
///     .with("c", true)
///     .with("d", json!({"deep": "a"}))
///     .with("double", ContextValue::function("double"));
///
/// let names: Vec<_> = context.names().collect();
/// assert_eq!(names, ["a", "b", "c", "d", "double"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextMap {
    bindings: IndexMap<String, ContextValue>,
}

impl ContextMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds or replaces a binding. Replacing keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ContextValue>) {
        self.bindings.insert(name.into(), value.into());
    }

    /// Looks up a binding.
    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.bindings.get(name)
    }

    /// Binding names in installation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Bindings in installation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the map has no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ContextMap
where
    K: Into<String>,
    V: Into<ContextValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
