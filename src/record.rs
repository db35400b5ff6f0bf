//! Decoded records
//!
//! Decoders produce a [`Record`]: a mapping from field names to typed
//! [`Value`]s. RS41 records nest one record per sub-block; LMS6-403 records are
//! flat.

use std::collections::{
    BTreeMap,
    btree_map,
};

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Serialize,
    Serializer,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(#[serde(serialize_with = "serialize_hex")] Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(Record),
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            Value::UInt(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(value) => Some(*value),
            Value::Int(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::UInt(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Timestamp(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Map(value) => Some(value),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($variant:ident($target:ty): $($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::$variant(<$target>::from(value))
                }
            }
        )*
    };
}

impl_from!(Int(i64): i8, i16, i32, i64);
impl_from!(UInt(u64): u8, u16, u32, u64);
impl_from!(Float(f64): f32, f64);
impl_from!(Bool(bool): bool);
impl_from!(Str(String): String, &str);
impl_from!(Bytes(Vec<u8>): Vec<u8>, &[u8]);
impl_from!(Timestamp(DateTime<Utc>): DateTime<Utc>);
impl_from!(List(Vec<Value>): Vec<Value>);
impl_from!(Map(Record): Record);

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Merges all fields of `other` into this record, replacing existing ones.
    pub fn extend(&mut self, other: Record) {
        self.0.extend(other.0);
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name)?.as_f64()
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name)?.as_u64()
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name)?.as_i64()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name)?.as_bool()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_str()
    }

    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name)?.as_bytes()
    }

    pub fn get_list(&self, name: &str) -> Option<&[Value]> {
        self.get(name)?.as_list()
    }

    pub fn get_record(&self, name: &str) -> Option<&Record> {
        self.get(name)?.as_record()
    }

    /// Follows a path of nested records, e.g. `["blocks", "status", "serial"]`.
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut record = self;
        for name in parents {
            record = record.get_record(name)?;
        }
        record.get(last)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{
        TimeZone,
        Utc,
    };

    use crate::record::{
        Record,
        Value,
    };

    #[test]
    fn it_coerces_numbers() {
        let mut record = Record::new();
        record.insert("count", 42u16);
        record.insert("offset", -3i32);
        record.insert("voltage", 2.9f64);

        assert_eq!(record.get_u64("count"), Some(42));
        assert_eq!(record.get_f64("count"), Some(42.0));
        assert_eq!(record.get_u64("offset"), None);
        assert_eq!(record.get_i64("offset"), Some(-3));
        assert_eq!(record.get_u64("voltage"), None);
        assert_eq!(record.get_str("count"), None);
    }

    #[test]
    fn it_looks_up_nested_fields() {
        let status: Record = [("serial", "S4610487")].into_iter().collect();
        let mut blocks = Record::new();
        blocks.insert("status", status);
        let mut frame = Record::new();
        frame.insert("blocks", blocks);

        assert_eq!(
            frame.lookup(&["blocks", "status", "serial"]),
            Some(&Value::from("S4610487"))
        );
        assert_eq!(frame.lookup(&["blocks", "measurements", "serial"]), None);
        assert_eq!(frame.lookup(&[]), None);
    }

    #[test]
    fn it_serializes_to_json() {
        let mut record = Record::new();
        record.insert("data", vec![0xde_u8, 0xad]);
        record.insert("valid", false);
        record.insert(
            "timestamp",
            Utc.with_ymd_and_hms(2021, 11, 12, 22, 53, 38).unwrap(),
        );
        record.insert("sats", vec![Value::from(3u8), Value::from(7u8)]);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"data":"dead","sats":[3,7],"timestamp":"2021-11-12T22:53:38Z","valid":false}"#
        );
    }
}
