use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata for an uploaded file. `storage_key` stays empty until the file storage
/// collaborator has accepted the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
}

impl FileReference {
    /// Lowercased extension of the original file name, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn is_stored(&self) -> bool {
        self.storage_key.is_some()
    }
}

/// A single answer as collected by the wizard or decoded from a submission payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
    File(FileReference),
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// Absent for the purposes of `required`: null, blank text, or an empty list.
    /// `false` is a real answer for a toggle.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Null => true,
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::List(items) => items.is_empty(),
            AnswerValue::Bool(_) | AnswerValue::Number(_) | AnswerValue::File(_) => false,
        }
    }

    /// Scalar rendering used by text-oriented rules.
    pub fn as_text(&self) -> Option<String> {
        match self {
            AnswerValue::Text(text) => Some(text.clone()),
            AnswerValue::Number(number) => Some(format_number(*number)),
            AnswerValue::Bool(flag) => Some(flag.to_string()),
            AnswerValue::Null | AnswerValue::List(_) | AnswerValue::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileReference> {
        match self {
            AnswerValue::File(file) => Some(file),
            _ => None,
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for AnswerValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AnswerValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Vec<String>> for AnswerValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<FileReference> for AnswerValue {
    fn from(value: FileReference) -> Self {
        Self::File(value)
    }
}

/// Answers keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet(BTreeMap<String, AnswerValue>);

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AnswerValue> {
        self.0.get(name)
    }

    /// Returns the stored answer, treating "empty" answers as missing.
    pub fn answered(&self, name: &str) -> Option<&AnswerValue> {
        self.0.get(name).filter(|value| !value.is_empty())
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<AnswerValue>,
    ) -> Option<AnswerValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<AnswerValue> {
        self.0.remove(name)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AnswerValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnswerValue)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut AnswerValue)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn into_inner(self) -> BTreeMap<String, AnswerValue> {
        self.0
    }
}

impl From<BTreeMap<String, AnswerValue>> for AnswerSet {
    fn from(value: BTreeMap<String, AnswerValue>) -> Self {
        Self(value)
    }
}

impl FromIterator<(String, AnswerValue)> for AnswerSet {
    fn from_iter<T: IntoIterator<Item = (String, AnswerValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_every_json_answer_shape() {
        let answers: AnswerSet = serde_json::from_value(json!({
            "full_name": "Jane",
            "terms": true,
            "hs_percentage": 88.5,
            "hobbies": ["Music", "Sports"],
            "nickname": null,
            "photo": { "file_name": "me.png", "content_type": "image/png", "size_bytes": 2048 }
        }))
        .expect("answers decode");

        assert_eq!(answers.get("full_name"), Some(&AnswerValue::text("Jane")));
        assert_eq!(answers.get("terms"), Some(&AnswerValue::Bool(true)));
        assert_eq!(answers.get("hs_percentage"), Some(&AnswerValue::Number(88.5)));
        assert_eq!(
            answers.get("hobbies"),
            Some(&AnswerValue::list(["Music", "Sports"]))
        );
        assert_eq!(answers.get("nickname"), Some(&AnswerValue::Null));
        let photo = answers
            .get("photo")
            .and_then(AnswerValue::as_file)
            .expect("file reference");
        assert_eq!(photo.extension().as_deref(), Some("png"));
        assert!(!photo.is_stored());
    }

    #[test]
    fn empty_answers_cover_null_blank_and_empty_list() {
        assert!(AnswerValue::Null.is_empty());
        assert!(AnswerValue::text("   ").is_empty());
        assert!(AnswerValue::List(Vec::new()).is_empty());
        assert!(!AnswerValue::Bool(false).is_empty());
        assert!(!AnswerValue::Number(0.0).is_empty());
    }

    #[test]
    fn answered_skips_blank_values() {
        let answers = AnswerSet::new()
            .with("full_name", "")
            .with("email", "jane@example.com");
        assert!(answers.answered("full_name").is_none());
        assert!(answers.answered("email").is_some());
        assert!(answers.answered("missing").is_none());
    }

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(AnswerValue::Number(42.0).as_text().as_deref(), Some("42"));
        assert_eq!(AnswerValue::Number(4.5).as_text().as_deref(), Some("4.5"));
    }
}
