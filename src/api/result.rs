//! Records and result sets returned by `execute()`

use crate::core::action::Operation;
use crate::core::field::FieldValue;
use crate::core::schema::ID_COLUMN;
use indexmap::IndexMap;
use serde::Serialize;

/// One row of an action result
///
/// Keys are the requested paths: plain columns by name, custom fields
/// under their dotted `Group.Field[.attribute]` path.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: i64) -> Self {
        let mut record = Self::new();
        record.insert(ID_COLUMN, FieldValue::Integer(id));
        record
    }

    /// Row identity, when it was returned
    pub fn id(&self) -> Option<i64> {
        self.values.get(ID_COLUMN).and_then(FieldValue::as_integer)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.values.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> IndexMap<String, FieldValue> {
        self.values
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// The records produced by one action
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    pub entity: String,
    pub action: Operation,
    pub count: usize,
    pub values: Vec<Record>,
}

impl ResultSet {
    pub fn new(entity: impl Into<String>, action: Operation, values: Vec<Record>) -> Self {
        Self {
            entity: entity.into(),
            action,
            count: values.len(),
            values,
        }
    }

    pub fn first(&self) -> Option<&Record> {
        self.values.first()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.values.iter()
    }

    /// Ids of all returned records
    pub fn ids(&self) -> Vec<i64> {
        self.values.iter().filter_map(Record::id).collect()
    }
}

impl IntoIterator for ResultSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
