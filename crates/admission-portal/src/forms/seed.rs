//! Built-in form definitions and loading of additional forms from JSON.

use std::fs;
use std::path::{Path, PathBuf};

use super::schema::{Field, FieldKind, Form, FormSchema, GridWidth, SchemaError, Section};
use super::store::{InMemoryFormStore, StoreError};
use super::validation::RuleSet;

pub const NURSING_SHORT_CODE: &str = "bsc-nursing-2026";

/// Errors raised while loading form definitions.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read form seed {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("form seed {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn options(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// The B.Sc. Nursing admission form offered for the 2026 intake.
pub fn nursing_admission_2026() -> Form {
    let personal = Section::new(1, "Personal Details", 1)
        .field(
            Field::new("full_name", "Full Name", FieldKind::Text)
                .with_id(1)
                .required()
                .ordered(1)
                .width(GridWidth::HALF)
                .placeholder("As per 10th marksheet")
                .rules(RuleSet::new().with("max_length", 255)),
        )
        .field(
            Field::new("dob", "Date of Birth", FieldKind::Date)
                .with_id(2)
                .required()
                .ordered(2)
                .width(GridWidth::HALF),
        )
        .field(
            Field::new(
                "gender",
                "Gender",
                FieldKind::Radio {
                    options: options(&["Male", "Female", "Other"]),
                },
            )
            .with_id(3)
            .required()
            .ordered(3)
            .width(GridWidth::HALF),
        )
        .field(
            Field::new(
                "category",
                "Category",
                FieldKind::Select {
                    options: options(&["General", "OBC", "SC", "ST"]),
                },
            )
            .with_id(4)
            .required()
            .ordered(4)
            .width(GridWidth::HALF),
        );

    let contact = Section::new(2, "Contact Details", 2)
        .field(
            Field::new("email", "Email Address", FieldKind::Email)
                .with_id(5)
                .required()
                .ordered(1)
                .width(GridWidth::HALF),
        )
        .field(
            Field::new("phone", "Phone Number", FieldKind::Number)
                .with_id(6)
                .required()
                .ordered(2)
                .width(GridWidth::HALF)
                .rules(RuleSet::new().with("digits", 10)),
        )
        .field(
            Field::new("address", "Permanent Address", FieldKind::Textarea)
                .with_id(7)
                .required()
                .ordered(3),
        );

    let percentage = || RuleSet::new().with("min", 0).with("max", 100);
    let image = || {
        RuleSet::new()
            .with("mimes", "jpg,jpeg,png")
            .with("max", 2048)
    };

    let academic = Section::new(3, "Academic & Documents", 3)
        .field(
            Field::new("hs_percentage", "10th Percentage", FieldKind::Number)
                .with_id(8)
                .required()
                .ordered(1)
                .width(GridWidth::HALF)
                .rules(percentage()),
        )
        .field(
            Field::new("inter_percentage", "12th Percentage", FieldKind::Number)
                .with_id(9)
                .required()
                .ordered(2)
                .width(GridWidth::HALF)
                .rules(percentage()),
        )
        .field(
            Field::new("photo", "Upload Photo", FieldKind::File)
                .with_id(10)
                .required()
                .ordered(3)
                .width(GridWidth::HALF)
                .rules(image()),
        )
        .field(
            Field::new("signature", "Upload Signature", FieldKind::File)
                .with_id(11)
                .required()
                .ordered(4)
                .width(GridWidth::HALF)
                .rules(image()),
        )
        .field(
            Field::new(
                "terms",
                "I declare that the information provided is true.",
                FieldKind::Checkbox {
                    options: Vec::new(),
                },
            )
            .with_id(12)
            .required()
            .ordered(5)
            .rules(RuleSet::new().with("accepted", true)),
        );

    Form::new(1, NURSING_SHORT_CODE, "B.Sc. Nursing Admission 2026")
        .describe(
            "Application form for Bachelor of Science in Nursing. Please fill all details carefully.",
        )
        .section(personal)
        .section(contact)
        .section(academic)
}

/// Read a JSON array of form definitions.
pub fn load_forms_from_path(path: &Path) -> Result<Vec<FormSchema>, SeedError> {
    let raw = fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let forms: Vec<Form> = serde_json::from_str(&raw).map_err(|source| SeedError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let schemas = forms
        .into_iter()
        .map(FormSchema::new)
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(path = %path.display(), forms = schemas.len(), "loaded form seed");
    Ok(schemas)
}

/// Store holding the built-in forms plus any forms from `extra`.
pub fn standard_store(extra: Option<&Path>) -> Result<InMemoryFormStore, SeedError> {
    let store = InMemoryFormStore::new();
    store.insert(FormSchema::new(nursing_admission_2026())?)?;
    if let Some(path) = extra {
        for schema in load_forms_from_path(path)? {
            store.insert(schema)?;
        }
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::schema::FieldType;
    use crate::forms::store::FormSchemaStore;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_seed(contents: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("admission-seed-{stamp}.json"));
        fs::write(&path, contents).expect("write seed");
        path
    }

    #[test]
    fn nursing_form_matches_published_layout() {
        let schema = FormSchema::new(nursing_admission_2026()).expect("seed form is valid");
        let titles: Vec<_> = schema.sections().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            ["Personal Details", "Contact Details", "Academic & Documents"]
        );
        assert_eq!(schema.fields().count(), 12);
        assert!(schema.fields().all(Field::is_required));

        let terms = schema.field("terms").expect("terms field");
        assert!(terms.kind.is_toggle());
        assert_eq!(terms.grid_width, GridWidth::FULL);
        assert_eq!(
            schema.field("gender").map(Field::field_type),
            Some(FieldType::Radio)
        );
    }

    #[test]
    fn loads_extra_forms_from_json() {
        let path = temp_seed(
            r#"[{
                "title": "GNM Admission 2026",
                "short_code": "gnm-2026",
                "sections": [{
                    "title": "Applicant",
                    "order": 1,
                    "fields": [
                        { "field_type": "text", "label": "Full Name", "name": "full_name",
                          "is_required": true, "validation_rules": ["max:255"] },
                        { "field_type": "checkbox", "label": "Hostel", "name": "hostel",
                          "options": ["Yes"], "order": 2, "grid_width": 6 }
                    ]
                }]
            }]"#,
        );

        let store = standard_store(Some(&path)).expect("store builds");
        let _ = fs::remove_file(&path);

        let gnm = store
            .find_by_short_code("gnm-2026")
            .expect("store available")
            .expect("gnm loaded");
        let hostel = gnm.field("hostel").expect("hostel field");
        assert!(hostel.kind.is_multi_select());
        assert!(store
            .find_by_short_code(NURSING_SHORT_CODE)
            .expect("store available")
            .is_some());
    }

    #[test]
    fn rejects_invalid_definitions() {
        let path = temp_seed(
            r#"[{ "title": "Broken", "short_code": "broken", "sections": [{
                "title": "Only", "fields": [
                    { "field_type": "select", "label": "Stream", "name": "stream" }
                ]
            }]}]"#,
        );
        let err = load_forms_from_path(&path).expect_err("select without options");
        let _ = fs::remove_file(&path);
        assert!(err.to_string().contains("must declare at least one option"));
    }

    #[test]
    fn reports_missing_files() {
        let err = load_forms_from_path(Path::new("/nonexistent/forms.json"))
            .expect_err("missing file");
        assert!(matches!(err, SeedError::Io { .. }));
    }
}
