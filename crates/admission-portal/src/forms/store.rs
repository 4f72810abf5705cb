use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{Local, NaiveDateTime};

use super::schema::{Form, FormId, FormSchema, SchemaError};

/// Read access to form definitions so callers can be exercised against any backing store.
pub trait FormSchemaStore: Send + Sync {
    fn find_by_short_code(&self, short_code: &str) -> Result<Option<Arc<FormSchema>>, StoreError>;
    fn find_by_id(&self, id: FormId) -> Result<Option<Arc<FormSchema>>, StoreError>;
    fn list(&self) -> Result<Vec<Arc<FormSchema>>, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("form short code '{0}' already exists")]
    Conflict(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("form store unavailable: {0}")]
    Unavailable(String),
}

/// Decides whether a form currently accepts applicants, beyond its `is_active` flag.
pub trait FormAvailability: Send + Sync {
    fn is_open(&self, form: &Form) -> bool;
}

/// Every active form is open.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOpen;

impl FormAvailability for AlwaysOpen {
    fn is_open(&self, _form: &Form) -> bool {
        true
    }
}

/// Applies the form's activation window against the local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowAvailability;

impl FormAvailability for WindowAvailability {
    fn is_open(&self, form: &Form) -> bool {
        form.window.is_open_at(Local::now().naive_local())
    }
}

/// Applies the activation window at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct OpenAt(pub NaiveDateTime);

impl FormAvailability for OpenAt {
    fn is_open(&self, form: &Form) -> bool {
        form.window.is_open_at(self.0)
    }
}

/// Why an applicant-facing lookup produced no schema.
#[derive(Debug, thiserror::Error)]
pub enum FormLookupError {
    #[error("form '{short_code}' not found")]
    NotFound { short_code: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolve a short code to a schema that is active and currently open. Inactive,
/// closed and unknown forms are indistinguishable to the caller.
pub fn find_open_schema<S>(
    store: &S,
    availability: &dyn FormAvailability,
    short_code: &str,
) -> Result<Arc<FormSchema>, FormLookupError>
where
    S: FormSchemaStore + ?Sized,
{
    match store.find_by_short_code(short_code)? {
        Some(schema) if schema.form().is_active && availability.is_open(schema.form()) => {
            Ok(schema)
        }
        Some(_) => {
            tracing::debug!(short_code, "form exists but is not accepting applicants");
            Err(FormLookupError::NotFound {
                short_code: short_code.to_string(),
            })
        }
        None => Err(FormLookupError::NotFound {
            short_code: short_code.to_string(),
        }),
    }
}

#[derive(Default)]
struct FormIndex {
    by_code: BTreeMap<String, Arc<FormSchema>>,
    code_by_id: BTreeMap<FormId, String>,
}

/// Process-local store backed by a read/write lock.
#[derive(Default)]
pub struct InMemoryFormStore {
    index: RwLock<FormIndex>,
}

impl InMemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from raw form definitions, validating each one.
    pub fn from_forms<I>(forms: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = Form>,
    {
        let store = Self::new();
        for form in forms {
            store.insert(FormSchema::new(form)?)?;
        }
        Ok(store)
    }

    pub fn insert(&self, schema: FormSchema) -> Result<Arc<FormSchema>, StoreError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| StoreError::Unavailable("form store lock poisoned".to_string()))?;

        let short_code = schema.short_code().to_string();
        if index.by_code.contains_key(&short_code) {
            return Err(StoreError::Conflict(short_code));
        }

        let schema = Arc::new(schema);
        index.code_by_id.insert(schema.id(), short_code.clone());
        index.by_code.insert(short_code, Arc::clone(&schema));
        Ok(schema)
    }

    /// Replace the definition stored under the schema's short code.
    pub fn replace(&self, schema: FormSchema) -> Result<Arc<FormSchema>, StoreError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| StoreError::Unavailable("form store lock poisoned".to_string()))?;

        let schema = Arc::new(schema);
        let short_code = schema.short_code().to_string();
        if let Some(previous) = index.by_code.insert(short_code.clone(), Arc::clone(&schema)) {
            index.code_by_id.remove(&previous.id());
        }
        index.code_by_id.insert(schema.id(), short_code);
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.index.read().map(|index| index.by_code.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FormSchemaStore for InMemoryFormStore {
    fn find_by_short_code(&self, short_code: &str) -> Result<Option<Arc<FormSchema>>, StoreError> {
        let index = self
            .index
            .read()
            .map_err(|_| StoreError::Unavailable("form store lock poisoned".to_string()))?;
        Ok(index.by_code.get(short_code).cloned())
    }

    fn find_by_id(&self, id: FormId) -> Result<Option<Arc<FormSchema>>, StoreError> {
        let index = self
            .index
            .read()
            .map_err(|_| StoreError::Unavailable("form store lock poisoned".to_string()))?;
        Ok(index
            .code_by_id
            .get(&id)
            .and_then(|code| index.by_code.get(code))
            .cloned())
    }

    fn list(&self) -> Result<Vec<Arc<FormSchema>>, StoreError> {
        let index = self
            .index
            .read()
            .map_err(|_| StoreError::Unavailable("form store lock poisoned".to_string()))?;
        Ok(index.by_code.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::schema::{ActivationWindow, Field, FieldKind, Section};
    use chrono::NaiveDate;

    fn form(id: u64, short_code: &str) -> Form {
        Form::new(id, short_code, "Admission").section(
            Section::new(1, "Personal", 1)
                .field(Field::new("full_name", "Full Name", FieldKind::Text).required()),
        )
    }

    fn day(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, day)
            .and_then(|date| date.and_hms_opt(9, 0, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn finds_forms_by_code_and_id() {
        let store = InMemoryFormStore::from_forms([form(1, "bsc"), form(2, "msc")])
            .expect("store builds");

        let bsc = store
            .find_by_short_code("bsc")
            .expect("store available")
            .expect("bsc exists");
        assert_eq!(bsc.id(), FormId(1));
        let msc = store
            .find_by_id(FormId(2))
            .expect("store available")
            .expect("msc exists");
        assert_eq!(msc.short_code(), "msc");
        assert!(store.find_by_short_code("phd").expect("store available").is_none());
        assert_eq!(store.list().expect("store available").len(), 2);
    }

    #[test]
    fn rejects_duplicate_short_codes() {
        let store = InMemoryFormStore::new();
        store
            .insert(FormSchema::new(form(1, "bsc")).expect("valid"))
            .expect("first insert");
        let err = store
            .insert(FormSchema::new(form(2, "bsc")).expect("valid"))
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Conflict(code) if code == "bsc"));
    }

    #[test]
    fn inactive_forms_look_missing() {
        let mut inactive = form(1, "bsc");
        inactive.is_active = false;
        let store = InMemoryFormStore::from_forms([inactive]).expect("store builds");

        let err = find_open_schema(&store, &AlwaysOpen, "bsc").expect_err("inactive");
        assert!(matches!(err, FormLookupError::NotFound { ref short_code } if short_code == "bsc"));
    }

    #[test]
    fn activation_window_gates_lookup() {
        let mut windowed = form(1, "bsc");
        windowed.window = ActivationWindow {
            opens_at: Some(day(1)),
            closes_at: Some(day(10)),
            late_fee_closes_at: Some(day(15)),
        };
        let store = InMemoryFormStore::from_forms([windowed]).expect("store builds");

        assert!(find_open_schema(&store, &OpenAt(day(12)), "bsc").is_ok());
        assert!(find_open_schema(&store, &OpenAt(day(20)), "bsc").is_err());
        assert!(find_open_schema(&store, &AlwaysOpen, "bsc").is_ok());
    }

    #[test]
    fn replace_swaps_definition() {
        let store = InMemoryFormStore::from_forms([form(1, "bsc")]).expect("store builds");
        store
            .replace(FormSchema::new(form(7, "bsc")).expect("valid"))
            .expect("replace");
        assert!(store.find_by_id(FormId(1)).expect("available").is_none());
        assert!(store.find_by_id(FormId(7)).expect("available").is_some());
    }
}
