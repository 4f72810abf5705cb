use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::forms::answers::FileReference;
use crate::forms::schema::{Field, FieldKind, Form, GridWidth, Section};
use crate::forms::seed::nursing_admission_2026;
use crate::forms::store::InMemoryFormStore;
use crate::forms::submission::domain::{
    ApplicantId, FileUpload, RawPayload, Submission, SubmissionId,
};
use crate::forms::submission::repository::{
    FileStorage, NotificationError, NotificationPublisher, RepositoryError, StorageError,
    SubmissionNotice, SubmissionRepository,
};
use crate::forms::submission::{form_router, FormSubmissionService, ResubmissionPolicy};
use crate::forms::validation::RuleSet;

pub(super) type TestService = FormSubmissionService<InMemoryFormStore, MemoryRepository, MemoryNotifier>;

/// Nursing form plus a small single-section form and an inactive one.
pub(super) fn form_store() -> InMemoryFormStore {
    let quick = Form::new(2, "quick-enquiry", "Quick Enquiry").section(
        Section::new(1, "Enquiry", 1)
            .field(Field::new("full_name", "Full Name", FieldKind::Text).required())
            .field(
                Field::new(
                    "courses",
                    "Courses",
                    FieldKind::Checkbox {
                        options: vec!["BSc".to_string(), "GNM".to_string()],
                    },
                )
                .ordered(1)
                .width(GridWidth::HALF),
            ),
    );

    let mut archived = Form::new(3, "bsc-nursing-2025", "B.Sc. Nursing Admission 2025").section(
        Section::new(1, "Personal", 1).field(
            Field::new("full_name", "Full Name", FieldKind::Text)
                .required()
                .rules(RuleSet::new().with("max_length", 255)),
        ),
    );
    archived.is_active = false;

    InMemoryFormStore::from_forms([nursing_admission_2026(), quick, archived])
        .expect("fixture forms are valid")
}

pub(super) fn upload(file_name: &str, content_type: &str, size: usize) -> FileUpload {
    FileUpload::new(file_name, Some(content_type), vec![7u8; size])
}

/// A payload that passes every rule of the nursing form.
pub(super) fn nursing_payload() -> RawPayload {
    RawPayload::new()
        .with("_token", "csrf-token")
        .with("full_name", "Jane Doe")
        .with("dob", "2007-03-14")
        .with("gender", "Female")
        .with("category", "General")
        .with("email", "jane@example.com")
        .with("phone", "9876543210")
        .with("address", "12 Lake Road, Pune")
        .with("hs_percentage", "88.4")
        .with("inter_percentage", "91")
        .with("terms", "on")
        .with_file("photo", upload("photo.jpg", "image/jpeg", 2048))
        .with_file("signature", upload("signature.png", "image/png", 1024))
}

pub(super) fn build_service(
    policy: ResubmissionPolicy,
) -> (TestService, Arc<MemoryRepository>, Arc<MemoryNotifier>, Arc<MemoryStorage>) {
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let storage = Arc::new(MemoryStorage::default());
    let service = FormSubmissionService::new(
        Arc::new(form_store()),
        repository.clone(),
        notifier.clone(),
        storage.clone(),
        policy,
    );
    (service, repository, notifier, storage)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<SubmissionId, Submission>>>,
}

impl MemoryRepository {
    pub(super) fn count(&self) -> usize {
        self.records.lock().expect("repository mutex poisoned").len()
    }
}

impl SubmissionRepository for MemoryRepository {
    fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&submission.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    fn update(&self, submission: Submission) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if !guard.contains_key(&submission.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(submission.id.clone(), submission);
        Ok(())
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_for_applicant(
        &self,
        short_code: &str,
        applicant: &ApplicantId,
    ) -> Result<Option<Submission>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| {
                record.form_short_code == short_code && record.applicant.as_ref() == Some(applicant)
            })
            .max_by_key(|record| record.submitted_at)
            .cloned())
    }
}

pub(super) struct UnavailableRepository;

impl SubmissionRepository for UnavailableRepository {
    fn insert(&self, _submission: Submission) -> Result<Submission, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _submission: Submission) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_for_applicant(
        &self,
        _short_code: &str,
        _applicant: &ApplicantId,
    ) -> Result<Option<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    notices: Arc<Mutex<Vec<SubmissionNotice>>>,
}

impl MemoryNotifier {
    pub(super) fn notices(&self) -> Vec<SubmissionNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, notice: SubmissionNotice) -> Result<(), NotificationError> {
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) struct OfflineNotifier;

impl NotificationPublisher for OfflineNotifier {
    fn publish(&self, _notice: SubmissionNotice) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

/// File storage keeping bytes in memory; optionally fails for one field.
#[derive(Default)]
pub(super) struct MemoryStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
    discarded: Mutex<Vec<String>>,
    fail_field: Option<String>,
}

impl MemoryStorage {
    pub(super) fn failing_on(field: &str) -> Self {
        Self {
            fail_field: Some(field.to_string()),
            ..Self::default()
        }
    }

    pub(super) fn stored_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .files
            .lock()
            .expect("storage mutex poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub(super) fn discarded(&self) -> Vec<String> {
        self.discarded.lock().expect("storage mutex poisoned").clone()
    }
}

impl FileStorage for MemoryStorage {
    fn store(
        &self,
        short_code: &str,
        field: &str,
        upload: &FileUpload,
    ) -> Result<FileReference, StorageError> {
        if self.fail_field.as_deref() == Some(field) {
            return Err(StorageError::Write {
                file_name: upload.file_name.clone(),
                reason: "disk full".to_string(),
            });
        }
        let mut files = self.files.lock().expect("storage mutex poisoned");
        let key = format!("{short_code}/{field}-{}-{}", files.len() + 1, upload.file_name);
        files.insert(key.clone(), upload.bytes.clone());
        Ok(FileReference {
            file_name: upload.file_name.clone(),
            content_type: upload.content_type.clone(),
            size_bytes: upload.size_bytes(),
            storage_key: Some(key),
        })
    }

    fn discard(&self, storage_key: &str) -> Result<(), StorageError> {
        self.files
            .lock()
            .expect("storage mutex poisoned")
            .remove(storage_key);
        self.discarded
            .lock()
            .expect("storage mutex poisoned")
            .push(storage_key.to_string());
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    form_router(Arc::new(service), 1024 * 1024)
}
