use admission_portal::config::FormsConfig;
use admission_portal::error::AppError;
use admission_portal::forms::seed::standard_store;
use admission_portal::forms::submission::{
    ApplicantId, FileStorage, FileUpload, NotificationError, NotificationPublisher,
    RepositoryError, StorageError, Submission, SubmissionId, SubmissionNotice,
    SubmissionRepository,
};
use admission_portal::forms::{FileReference, FormAvailability, InMemoryFormStore};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) forms: Arc<InMemoryFormStore>,
    pub(crate) availability: Arc<dyn FormAvailability>,
}

pub(crate) fn build_form_store(config: &FormsConfig) -> Result<InMemoryFormStore, AppError> {
    let store = standard_store(config.seed_path.as_deref())?;
    tracing::info!(forms = store.len(), "form definitions loaded");
    Ok(store)
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySubmissionRepository {
    records: Arc<Mutex<HashMap<SubmissionId, Submission>>>,
}

impl SubmissionRepository for InMemorySubmissionRepository {
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
        if guard.contains_key(&submission.id) {
            guard.insert(submission.id.clone(), submission);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
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

impl InMemorySubmissionRepository {
    pub(crate) fn submissions(&self) -> Vec<Submission> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut records: Vec<_> = guard.values().cloned().collect();
        records.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        records
    }
}

/// Keeps notices in memory and logs them; stands in for the mail relay.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    notices: Arc<Mutex<Vec<SubmissionNotice>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notice: SubmissionNotice) -> Result<(), NotificationError> {
        tracing::info!(
            template = %notice.template,
            submission = %notice.submission_id,
            form = %notice.form,
            "notification queued"
        );
        let mut guard = self.notices.lock().expect("notification mutex poisoned");
        guard.push(notice);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn notices(&self) -> Vec<SubmissionNotice> {
        self.notices
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

static NEXT_UPLOAD: AtomicU64 = AtomicU64::new(1);

/// Writes uploads below `root/<short_code>/`. Storage keys are relative to `root`.
#[derive(Debug, Clone)]
pub(crate) struct DiskFileStorage {
    root: PathBuf,
}

impl DiskFileStorage {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    fn storage_key(short_code: &str, field: &str, upload: &FileUpload) -> String {
        let sequence = NEXT_UPLOAD.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Utc::now().timestamp_millis();
        let extension = Path::new(&upload.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_default();
        format!(
            "{}/{}-{stamp}-{sequence:04}{extension}",
            key_segment(short_code),
            key_segment(field)
        )
    }

    /// Path for a key made only of plain components below `root`.
    fn resolve(&self, storage_key: &str) -> Option<PathBuf> {
        let key = Path::new(storage_key);
        let plain = key
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        (plain && !storage_key.is_empty()).then(|| self.root.join(key))
    }
}

fn key_segment(raw: &str) -> String {
    let segment: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if segment.is_empty() {
        "_".to_string()
    } else {
        segment
    }
}

impl FileStorage for DiskFileStorage {
    fn store(
        &self,
        short_code: &str,
        field: &str,
        upload: &FileUpload,
    ) -> Result<FileReference, StorageError> {
        let write_error = |err: std::io::Error| StorageError::Write {
            file_name: upload.file_name.clone(),
            reason: err.to_string(),
        };

        let key = Self::storage_key(short_code, field, upload);
        let path = self.resolve(&key).ok_or_else(|| StorageError::Write {
            file_name: upload.file_name.clone(),
            reason: format!("storage key '{key}' is outside the upload root"),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        fs::write(&path, &upload.bytes).map_err(write_error)?;

        let content_type = upload.content_type.clone().or_else(|| {
            mime_guess::from_path(&upload.file_name)
                .first_raw()
                .map(str::to_string)
        });
        tracing::debug!(storage_key = %key, bytes = upload.size_bytes(), "upload stored");

        Ok(FileReference {
            file_name: upload.file_name.clone(),
            content_type,
            size_bytes: upload.size_bytes(),
            storage_key: Some(key),
        })
    }

    fn discard(&self, storage_key: &str) -> Result<(), StorageError> {
        let path = self.resolve(storage_key).ok_or_else(|| StorageError::Discard {
            storage_key: storage_key.to_string(),
            reason: "storage key is outside the upload root".to_string(),
        })?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Discard {
                storage_key: storage_key.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}
