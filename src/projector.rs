use chrono::DateTime;
use tracing::trace;

use crate::{
    engine::{StoredDocument, StoredValue},
    model::{FieldValue, Fields, ProjectedDocument, ProjectedField},
};

/// Convert a stored document into its client shape, merging repeated field
/// names into ordered arrays.
///
/// Occurrences whose encoding cannot be decoded contribute nothing.
pub fn project(document: &StoredDocument) -> ProjectedDocument {
    let mut fields = Fields::default();
    for field in &document.fields {
        if let Some(value) = decode(&field.value) {
            merge(&mut fields, &field.name, value);
        } else {
            trace!(id = %document.id, field = %field.name, "dropping undecodable field");
        }
    }
    ProjectedDocument {
        id: document.id.clone(),
        fields,
    }
}

fn decode(value: &StoredValue) -> Option<FieldValue> {
    match value {
        StoredValue::Text(text) => Some(FieldValue::Text(text.clone())),
        StoredValue::Number(n) => {
            n.as_f64().filter(|f| f.is_finite()).map(FieldValue::Number)
        }
        StoredValue::DateTime(raw) => {
            DateTime::parse_from_rfc3339(raw).ok().map(FieldValue::DateTime)
        }
        StoredValue::Boolean(_) => None,
    }
}

fn merge(fields: &mut Fields, name: &str, value: FieldValue) {
    let Some(pos) = fields.entries.iter().position(|(n, _)| n == name) else {
        fields
            .entries
            .push((name.to_string(), ProjectedField::Single(value)));
        return;
    };

    let existing = &mut fields.entries[pos].1;
    *existing = match std::mem::replace(existing, ProjectedField::Multi(Vec::new()))
    {
        ProjectedField::Single(first) => ProjectedField::Multi(vec![first, value]),
        ProjectedField::Multi(mut values) => {
            values.push(value);
            ProjectedField::Multi(values)
        }
    };
}
