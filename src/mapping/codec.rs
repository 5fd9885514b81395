//! PropertyCodec: Simple values to and from the backend value space.
//!
//! | Declared type | Stored as |
//! |---------------|-----------|
//! | `bool` | `Bool` |
//! | `i8`..`i64`, `u8`..`u64`, `isize`, `usize` | `Int` (range-checked both ways) |
//! | `f32`, `f64` | `Float` |
//! | `Decimal` | `String` (exact; `Int` and `Float` accepted on read) |
//! | `char`, `String`, [`Uri`] | `String` |
//! | [`Bytes`] | `Bytes` |
//! | [`EntityId`] | `String` |
//! | enums ([`impl_enum_property!`](crate::impl_enum_property)) | `String` (variant name), ordinal `Int` accepted on read |
//! | `NaiveDate`, `NaiveTime`, `DateTime<Utc>`, `NaiveDateTime` | matching temporal |
//! | `chrono::Duration` | `Duration` |
//! | [`Point`] | `Point` |
//! | `Vec<T>`, `HashSet<T>`, `BTreeSet<T>` | `List` |
//!
//! `f32` widens to `f64` on write and narrows on read; the narrowing may
//! lose precision. Sets carry no order.
//!
//! Complex types implement [`GraphProperty`] through
//! [`impl_complex_property!`](crate::impl_complex_property), which encodes
//! them as nested [`Record`]s for the serializer to decompose.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::model::{IsoDuration, Point, Value};
use crate::schema::{EntityId, Field, GraphType, Record, ScalarKind, TypeShape};
use crate::{MappingError, Result};

/// A type that can be declared as a graph property.
///
/// `shape` drives classification; `to_field`/`from_field` are the codec.
pub trait GraphProperty: Sized + Send + Sync + 'static {
    fn shape() -> TypeShape;
    fn to_field(&self) -> Result<Field>;
    fn from_field(field: Field) -> Result<Self>;
}

fn mismatch(expected: &str, got: &Field) -> crate::Error {
    let got = match got {
        Field::Value(v) => v.type_name().to_owned(),
        other => other.kind().to_owned(),
    };
    MappingError::TypeMismatch { expected: expected.to_owned(), got }.into()
}

fn binding(reason: impl Into<String>) -> crate::Error {
    MappingError::Binding { property: String::new(), reason: reason.into() }.into()
}

// ============================================================================
// Scalars
// ============================================================================

impl GraphProperty for bool {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Bool) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::Bool(*self)))
    }

    fn from_field(field: Field) -> Result<Self> {
        match field {
            Field::Value(Value::Bool(b)) => Ok(b),
            other => Err(mismatch("BOOLEAN", &other)),
        }
    }
}

macro_rules! impl_integer {
    ($($t:ty),+) => {$(
        impl GraphProperty for $t {
            fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Integer) }

            fn to_field(&self) -> Result<Field> {
                let v = i64::try_from(*self)
                    .map_err(|_| binding(format!("{} does not fit a 64-bit integer", self)))?;
                Ok(Field::Value(Value::Int(v)))
            }

            fn from_field(field: Field) -> Result<Self> {
                let v = match &field {
                    Field::Value(v) => v.as_int(),
                    _ => None,
                };
                let v = v.ok_or_else(|| mismatch("INTEGER", &field))?;
                <$t>::try_from(v).map_err(|_| binding(format!("{v} out of range for {}", stringify!($t))))
            }
        }
    )+};
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl GraphProperty for f64 {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Float) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::Float(*self)))
    }

    fn from_field(field: Field) -> Result<Self> {
        match &field {
            Field::Value(v) => v.as_float().ok_or_else(|| mismatch("FLOAT", &field)),
            _ => Err(mismatch("DECIMAL", &field)),
        }
    }
}

impl GraphProperty for f32 {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Float) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::Float(f64::from(*self))))
    }

    fn from_field(field: Field) -> Result<Self> {
        f64::from_field(field).map(|v| v as f32)
    }
}

impl GraphProperty for Decimal {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Decimal) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::String(self.to_string())))
    }

    fn from_field(field: Field) -> Result<Self> {
        match &field {
            Field::Value(Value::Int(i)) => Ok(Decimal::from(*i)),
            Field::Value(Value::Float(f)) => {
                Decimal::from_f64(*f).ok_or_else(|| binding(format!("{f} is not representable as a decimal")))
            }
            Field::Value(Value::String(s)) => {
                Decimal::from_str(s).map_err(|e| binding(format!("invalid decimal {s:?}: {e}")))
            }
            _ => Err(mismatch("DECIMAL", &field)),
        }
    }
}

impl GraphProperty for char {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Char) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::String(self.to_string())))
    }

    fn from_field(field: Field) -> Result<Self> {
        match &field {
            Field::Value(Value::String(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(binding(format!("{s:?} is not a single character"))),
                }
            }
            _ => Err(mismatch("STRING", &field)),
        }
    }
}

impl GraphProperty for String {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::String) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::String(self.clone())))
    }

    fn from_field(field: Field) -> Result<Self> {
        match field {
            Field::Value(Value::String(s)) => Ok(s),
            other => Err(mismatch("STRING", &other)),
        }
    }
}

impl GraphProperty for EntityId {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Id) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::String(self.as_str().to_owned())))
    }

    fn from_field(field: Field) -> Result<Self> {
        String::from_field(field).map(EntityId::from)
    }
}

/// Absolute URI, stored as its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uri(String);

impl Uri {
    /// Accepts `scheme:rest` where the scheme starts with a letter and
    /// contains only letters, digits, `+`, `-` or `.`.
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let (scheme, rest) = s.split_once(':').ok_or_else(|| format!("{s:?} has no scheme"))?;
        let mut chars = scheme.chars();
        let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid_scheme || rest.is_empty() {
            return Err(format!("{s:?} is not an absolute URI"));
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Uri {
    type Error = String;
    fn try_from(s: String) -> std::result::Result<Self, String> { Uri::parse(&s) }
}

impl From<Uri> for String {
    fn from(u: Uri) -> Self { u.0 }
}

impl GraphProperty for Uri {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Uri) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::String(self.0.clone())))
    }

    fn from_field(field: Field) -> Result<Self> {
        let s = String::from_field(field)?;
        Uri::parse(&s).map_err(binding)
    }
}

/// Raw byte string. `Vec<u8>` is a list of integers; wrap it to store bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bytes(pub Vec<u8>);

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self { Self(bytes) }
}

impl GraphProperty for Bytes {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Bytes) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::Bytes(self.0.clone())))
    }

    fn from_field(field: Field) -> Result<Self> {
        match field {
            Field::Value(Value::Bytes(b)) => Ok(Self(b)),
            other => Err(mismatch("BYTES", &other)),
        }
    }
}

// ============================================================================
// Temporal and spatial
// ============================================================================

macro_rules! impl_direct {
    ($t:ty, $kind:ident, $variant:ident, $expected:literal) => {
        impl GraphProperty for $t {
            fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::$kind) }

            fn to_field(&self) -> Result<Field> {
                Ok(Field::Value(Value::$variant(*self)))
            }

            fn from_field(field: Field) -> Result<Self> {
                match field {
                    Field::Value(Value::$variant(v)) => Ok(v),
                    other => Err(mismatch($expected, &other)),
                }
            }
        }
    };
}

impl_direct!(NaiveDate, Date, Date, "DATE");
impl_direct!(NaiveTime, Time, Time, "TIME");
impl_direct!(DateTime<Utc>, DateTime, DateTime, "DATETIME");
impl_direct!(NaiveDateTime, LocalDateTime, LocalDateTime, "LOCAL_DATETIME");
impl_direct!(Point, Point, Point, "POINT");

impl GraphProperty for chrono::Duration {
    fn shape() -> TypeShape { TypeShape::Scalar(ScalarKind::Duration) }

    fn to_field(&self) -> Result<Field> {
        Ok(Field::Value(Value::Duration(IsoDuration {
            months: 0,
            days: 0,
            seconds: self.num_seconds(),
            nanoseconds: self.subsec_nanos(),
        })))
    }

    fn from_field(field: Field) -> Result<Self> {
        match field {
            Field::Value(Value::Duration(d)) => {
                if d.months != 0 {
                    return Err(binding("calendar months have no fixed length"));
                }
                let seconds = d
                    .days
                    .checked_mul(86_400)
                    .and_then(|s| s.checked_add(d.seconds))
                    .ok_or_else(|| binding("duration overflows"))?;
                chrono::Duration::try_seconds(seconds)
                    .and_then(|s| s.checked_add(&chrono::Duration::nanoseconds(i64::from(d.nanoseconds))))
                    .ok_or_else(|| binding("duration overflows"))
            }
            other => Err(mismatch("DURATION", &other)),
        }
    }
}

// ============================================================================
// Wrappers
// ============================================================================

impl<T: GraphProperty> GraphProperty for Option<T> {
    fn shape() -> TypeShape {
        TypeShape::Nullable(Box::new(T::shape()))
    }

    fn to_field(&self) -> Result<Field> {
        match self {
            Some(v) => v.to_field(),
            None => Ok(Field::Null),
        }
    }

    fn from_field(field: Field) -> Result<Self> {
        if field.is_null() {
            Ok(None)
        } else {
            T::from_field(field).map(Some)
        }
    }
}

impl<T: GraphProperty> GraphProperty for Box<T> {
    fn shape() -> TypeShape { T::shape() }
    fn to_field(&self) -> Result<Field> { (**self).to_field() }
    fn from_field(field: Field) -> Result<Self> { T::from_field(field).map(Box::new) }
}

impl<T: GraphProperty> GraphProperty for Arc<T> {
    fn shape() -> TypeShape { T::shape() }
    fn to_field(&self) -> Result<Field> { (**self).to_field() }
    fn from_field(field: Field) -> Result<Self> { T::from_field(field).map(Arc::new) }
}

// ============================================================================
// Collections
// ============================================================================

fn element_is_object<T: GraphProperty>() -> bool {
    matches!(T::shape().non_null(), TypeShape::Object(_))
}

fn encode_elements<'a, T: GraphProperty + 'a>(items: impl Iterator<Item = &'a T>) -> Result<Field> {
    if element_is_object::<T>() {
        let mut records = Vec::new();
        for item in items {
            match item.to_field()? {
                Field::Object(r) => records.push(r),
                Field::Null => return Err(binding("collections of Complex values cannot hold nulls")),
                other => return Err(mismatch("object", &other)),
            }
        }
        return Ok(Field::Objects(records));
    }

    let mut values = Vec::new();
    for item in items {
        match item.to_field()? {
            Field::Value(v) => values.push(v),
            Field::Null => values.push(Value::Null),
            other => return Err(mismatch("value", &other)),
        }
    }
    Ok(Field::Value(Value::List(values)))
}

fn decode_elements<T: GraphProperty>(field: Field) -> Result<Vec<T>> {
    match field {
        Field::Null | Field::Value(Value::Null) => Ok(Vec::new()),
        Field::Value(Value::List(items)) => items.into_iter().map(|v| T::from_field(Field::Value(v))).collect(),
        Field::Objects(records) => records.into_iter().map(|r| T::from_field(Field::Object(r))).collect(),
        other => Err(mismatch("LIST", &other)),
    }
}

impl<T: GraphProperty> GraphProperty for Vec<T> {
    fn shape() -> TypeShape {
        TypeShape::ordered(T::shape())
    }

    fn to_field(&self) -> Result<Field> {
        encode_elements(self.iter())
    }

    fn from_field(field: Field) -> Result<Self> {
        decode_elements(field)
    }
}

impl<T: GraphProperty + Eq + Hash> GraphProperty for HashSet<T> {
    fn shape() -> TypeShape {
        TypeShape::unordered(T::shape())
    }

    fn to_field(&self) -> Result<Field> {
        encode_elements(self.iter())
    }

    fn from_field(field: Field) -> Result<Self> {
        decode_elements(field).map(|v| v.into_iter().collect())
    }
}

impl<T: GraphProperty + Ord> GraphProperty for BTreeSet<T> {
    fn shape() -> TypeShape {
        TypeShape::unordered(T::shape())
    }

    fn to_field(&self) -> Result<Field> {
        encode_elements(self.iter())
    }

    fn from_field(field: Field) -> Result<Self> {
        decode_elements(field).map(|v| v.into_iter().collect())
    }
}

/// Maps have no property encoding. The impl exists so a map-typed
/// property can be declared and rejected by classification.
impl<K, V> GraphProperty for HashMap<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn shape() -> TypeShape {
        TypeShape::Unsupported("map")
    }

    fn to_field(&self) -> Result<Field> {
        Err(binding("maps are neither Simple nor Complex"))
    }

    fn from_field(_: Field) -> Result<Self> {
        Err(binding("maps are neither Simple nor Complex"))
    }
}

// ============================================================================
// Complex and enum support for the declaration macros
// ============================================================================

#[doc(hidden)]
pub fn complex_to_field<T: GraphType>(value: &T) -> Result<Field> {
    let mut record = value.to_record()?;
    record.set_identity(value);
    Ok(Field::Object(record))
}

#[doc(hidden)]
pub fn complex_from_field<T: GraphType>(field: Field) -> Result<T> {
    match field {
        Field::Object(record) => T::from_record(record),
        other => Err(mismatch(std::any::type_name::<T>(), &other)),
    }
}

#[doc(hidden)]
pub fn complex_record(field: Field) -> Result<Record> {
    match field {
        Field::Object(record) => Ok(record),
        other => Err(mismatch("object", &other)),
    }
}

#[doc(hidden)]
pub fn enum_to_field(variant: &'static str) -> Result<Field> {
    Ok(Field::Value(Value::String(variant.to_owned())))
}

/// Index of the variant named (or numbered) by `field`.
#[doc(hidden)]
pub fn enum_index(field: Field, type_name: &str, variants: &[&str]) -> Result<usize> {
    match &field {
        Field::Value(Value::String(s)) => variants
            .iter()
            .position(|v| v == s)
            .ok_or_else(|| binding(format!("{s:?} is not a variant of {type_name}"))),
        Field::Value(Value::Int(i)) => usize::try_from(*i)
            .ok()
            .filter(|i| *i < variants.len())
            .ok_or_else(|| binding(format!("{i} is not an ordinal of {type_name}"))),
        _ => Err(mismatch("STRING", &field)),
    }
}

/// Declare a Complex type as a property type. The type must implement
/// [`GraphType`](crate::GraphType) with a `complex` descriptor.
#[macro_export]
macro_rules! impl_complex_property {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::GraphProperty for $ty {
            fn shape() -> $crate::schema::TypeShape {
                $crate::schema::TypeShape::Object($crate::schema::ObjectShape::of::<$ty>())
            }

            fn to_field(&self) -> $crate::Result<$crate::schema::Field> {
                $crate::mapping::codec::complex_to_field(self)
            }

            fn from_field(field: $crate::schema::Field) -> $crate::Result<Self> {
                $crate::mapping::codec::complex_from_field(field)
            }
        }
    )+};
}

/// Declare a fieldless enum as a Simple property stored by variant name.
///
/// ```rust
/// #[derive(Debug, PartialEq)]
/// enum Status { Active, Retired }
/// graph_model::impl_enum_property!(Status { Active, Retired });
/// ```
#[macro_export]
macro_rules! impl_enum_property {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::GraphProperty for $ty {
            fn shape() -> $crate::schema::TypeShape {
                $crate::schema::TypeShape::Scalar($crate::schema::ScalarKind::Enum)
            }

            fn to_field(&self) -> $crate::Result<$crate::schema::Field> {
                $crate::mapping::codec::enum_to_field(match self {
                    $($ty::$variant => stringify!($variant),)+
                })
            }

            fn from_field(field: $crate::schema::Field) -> $crate::Result<Self> {
                let index = $crate::mapping::codec::enum_index(
                    field,
                    stringify!($ty),
                    &[$(stringify!($variant)),+],
                )?;
                [$($ty::$variant),+]
                    .into_iter()
                    .nth(index)
                    .ok_or_else(|| $crate::MappingError::Binding {
                        property: String::new(),
                        reason: format!("no variant at {index}"),
                    }.into())
            }
        }
    };
}
