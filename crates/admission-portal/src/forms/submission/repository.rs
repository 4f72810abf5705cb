use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{ApplicantId, FileUpload, Submission, SubmissionId};
use crate::forms::answers::FileReference;

/// Storage abstraction so the service module can be exercised in isolation.
pub trait SubmissionRepository: Send + Sync {
    fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError>;
    fn update(&self, submission: Submission) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, RepositoryError>;
    /// Latest submission by `applicant` for the form with `short_code`.
    fn find_for_applicant(
        &self,
        short_code: &str,
        applicant: &ApplicantId,
    ) -> Result<Option<Submission>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook (e-mail, SMS or an admissions desk queue).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notice: SubmissionNotice) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionNotice {
    pub template: String,
    pub submission_id: SubmissionId,
    pub form: String,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Persists uploaded files and hands back a reference to them.
pub trait FileStorage: Send + Sync {
    fn store(
        &self,
        short_code: &str,
        field: &str,
        upload: &FileUpload,
    ) -> Result<FileReference, StorageError>;
    fn discard(&self, storage_key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to store '{file_name}': {reason}")]
    Write { file_name: String, reason: String },
    #[error("failed to discard '{storage_key}': {reason}")]
    Discard { storage_key: String, reason: String },
}

/// Decides whether a requester may submit a given form.
pub trait AccessGate: Send + Sync {
    fn may_submit(&self, short_code: &str, applicant: Option<&ApplicantId>) -> bool;
}

/// Anyone may submit; authentication happens upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllApplicants;

impl AccessGate for AllowAllApplicants {
    fn may_submit(&self, _short_code: &str, _applicant: Option<&ApplicantId>) -> bool {
        true
    }
}

/// Only requesters carrying an applicant identity may submit.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifiedApplicants;

impl AccessGate for IdentifiedApplicants {
    fn may_submit(&self, _short_code: &str, applicant: Option<&ApplicantId>) -> bool {
        applicant.is_some_and(|id| !id.0.trim().is_empty())
    }
}
