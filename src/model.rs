//! Client-facing document shapes returned by document fetch and listing.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Serialize, Serializer, ser::SerializeMap};

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    DateTime(DateTime<FixedOffset>),
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(text) => serializer.serialize_str(text),
            FieldValue::Number(n) => serializer.serialize_f64(*n),
            FieldValue::DateTime(dt) => serializer
                .serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}

/// The value under one field name: a bare value when the name occurred
/// once, otherwise every occurrence in stored order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProjectedField {
    Single(FieldValue),
    Multi(Vec<FieldValue>),
}

impl ProjectedField {
    pub fn values(&self) -> &[FieldValue] {
        match self {
            ProjectedField::Single(value) => std::slice::from_ref(value),
            ProjectedField::Multi(values) => values,
        }
    }
}

/// Field name to value mapping, kept in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    pub(crate) entries: Vec<(String, ProjectedField)>,
}

impl Fields {
    pub fn get(&self, name: &str) -> Option<&ProjectedField> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, field)| field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProjectedField)> {
        self.entries.iter().map(|(n, f)| (n.as_str(), f))
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, field) in &self.entries {
            map.serialize_entry(name, field)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedDocument {
    pub id: String,
    pub fields: Fields,
}
