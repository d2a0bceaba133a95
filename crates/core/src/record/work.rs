use serde::ser::{Serialize, SerializeMap, Serializer};

use super::FieldValue;

/// Field added to records routed to the error sheet.
pub const ERROR_REASON_FIELD: &str = "ERROR_REASON";

/// Ordered mapping from upper-case field names to values.
///
/// Insertion order is preserved so result sheets keep the column order of
/// the input spreadsheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkRecord {
    fields: Vec<(String, FieldValue)>,
}

fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase()
}

impl WorkRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from raw pairs, upper-casing keys and pruning blank values.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut record = Self::new();
        for (key, value) in pairs {
            let value = value.into();
            if value.is_blank() || key.as_ref().trim().is_empty() {
                continue;
            }
            record.insert(key.as_ref(), value);
        }
        record
    }

    /// Insert or replace a field, keeping the original position on replace.
    pub fn insert(&mut self, key: &str, value: impl Into<FieldValue>) {
        let key = normalize_key(key);
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        let key = normalize_key(key);
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Field rendered as display text.
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(FieldValue::display_text)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let key = normalize_key(key);
        let idx = self.fields.iter().position(|(k, _)| *k == key)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when no field carries a value.
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_blank())
    }

    /// Tag the record with the reason it failed.
    pub fn annotate_error(&mut self, reason: &str) {
        self.insert(ERROR_REASON_FIELD, reason);
    }
}

impl Serialize for WorkRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_upper_cased_and_ordered() {
        let record = WorkRecord::from_pairs([
            ("numero_processo", FieldValue::from("0000001-02.2024.5.15.0001")),
            ("Parte", FieldValue::from("ACME")),
            ("valor", FieldValue::from(10.5)),
        ]);
        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["NUMERO_PROCESSO", "PARTE", "VALOR"]);
        assert_eq!(record.get_text("numero_processo").unwrap(), "0000001-02.2024.5.15.0001");
    }

    #[test]
    fn test_blank_fields_are_pruned() {
        let record = WorkRecord::from_pairs([
            ("A", FieldValue::from("")),
            ("B", FieldValue::from(f64::NAN)),
            ("C", FieldValue::from("kept")),
        ]);
        assert_eq!(record.len(), 1);
        assert!(record.get("A").is_none());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut record = WorkRecord::from_pairs([("A", "1"), ("B", "2")]);
        record.insert("a", "3");
        let pairs: Vec<(String, String)> = record
            .fields()
            .map(|(k, v)| (k.to_string(), v.display_text()))
            .collect();
        assert_eq!(
            pairs,
            vec![("A".into(), "3".into()), ("B".into(), "2".into())]
        );
    }

    #[test]
    fn test_annotate_error_and_serialize() {
        let mut record = WorkRecord::from_pairs([("ID", "7")]);
        record.annotate_error("timeout");
        assert_eq!(record.get_text(ERROR_REASON_FIELD).unwrap(), "timeout");

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"ID":"7","ERROR_REASON":"timeout"}"#);
    }
}
