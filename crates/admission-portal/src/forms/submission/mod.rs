//! Server-side handling of completed forms: re-validation against the stored schema,
//! file storage, persistence and applicant notification.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicantId, FileUpload, RawPayload, RawValue, Submission, SubmissionId, SubmissionReceipt,
    SubmissionStatus, SubmissionStatusView, SUBMITTED_MESSAGE,
};
pub use repository::{
    AccessGate, AllowAllApplicants, FileStorage, IdentifiedApplicants, NotificationError,
    NotificationPublisher, RepositoryError, StorageError, SubmissionNotice, SubmissionRepository,
};
pub use router::{form_router, ValidateRequest, APPLICANT_HEADER};
pub use service::{FormSubmissionService, ResubmissionPolicy, SubmissionError};
