use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::domain::{
    FileUpload, RawPayload, RawValue, Submission, SubmissionId, SubmissionReceipt,
    SubmissionStatus,
};
use super::repository::{
    AccessGate, AllowAllApplicants, FileStorage, NotificationError, NotificationPublisher,
    RepositoryError, StorageError, SubmissionNotice, SubmissionRepository,
};
use crate::forms::answers::{AnswerSet, AnswerValue, FileReference};
use crate::forms::schema::{FieldKind, FormSchema};
use crate::forms::store::{
    find_open_schema, AlwaysOpen, FormAvailability, FormLookupError, FormSchemaStore,
};
use crate::forms::validation::{SchemaValidator, ValidationErrors, ValidationScope};

/// Form field carrying the CSRF token of HTML posts; never persisted.
const CSRF_FIELD: &str = "_token";

/// What happens when an applicant who already submitted a form submits it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResubmissionPolicy {
    /// Every submission creates a new record.
    CreateNew,
    /// A second submission is refused.
    RejectDuplicate,
    /// A pending submission has its answers replaced; finalized ones are refused.
    UpdatePending,
}

impl ResubmissionPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "create" | "create_new" => Some(Self::CreateNew),
            "reject" | "reject_duplicate" => Some(Self::RejectDuplicate),
            "update_pending" | "update" => Some(Self::UpdatePending),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::CreateNew => "create",
            Self::RejectDuplicate => "reject",
            Self::UpdatePending => "update_pending",
        }
    }
}

impl fmt::Display for ResubmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Service composing the form store, validator, file storage, repository and notifier.
pub struct FormSubmissionService<S, R, N> {
    store: Arc<S>,
    repository: Arc<R>,
    notifier: Arc<N>,
    uploads: Arc<dyn FileStorage>,
    gate: Arc<dyn AccessGate>,
    availability: Arc<dyn FormAvailability>,
    validator: SchemaValidator,
    policy: ResubmissionPolicy,
}

static SUBMISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_submission_id() -> SubmissionId {
    let id = SUBMISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SubmissionId(format!("sub-{id:06}"))
}

impl<S, R, N> FormSubmissionService<S, R, N>
where
    S: FormSchemaStore + 'static,
    R: SubmissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        store: Arc<S>,
        repository: Arc<R>,
        notifier: Arc<N>,
        uploads: Arc<dyn FileStorage>,
        policy: ResubmissionPolicy,
    ) -> Self {
        Self {
            store,
            repository,
            notifier,
            uploads,
            gate: Arc::new(AllowAllApplicants),
            availability: Arc::new(AlwaysOpen),
            validator: SchemaValidator::default(),
            policy,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn AccessGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_availability(mut self, availability: Arc<dyn FormAvailability>) -> Self {
        self.availability = availability;
        self
    }

    pub fn with_validator(mut self, validator: SchemaValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn policy(&self) -> ResubmissionPolicy {
        self.policy
    }

    /// Schema for an active, open form.
    pub fn schema(&self, short_code: &str) -> Result<Arc<FormSchema>, SubmissionError> {
        let schema = find_open_schema(self.store.as_ref(), self.availability.as_ref(), short_code)?;
        Ok(schema)
    }

    /// Validate answers without storing anything, e.g. to gate a wizard step server-side.
    pub fn check(
        &self,
        short_code: &str,
        answers: &AnswerSet,
        scope: ValidationScope,
    ) -> Result<(), SubmissionError> {
        let schema = self.schema(short_code)?;
        if let ValidationScope::Section(index) = scope {
            if index >= schema.section_count() {
                return Err(SubmissionError::SectionOutOfRange {
                    index,
                    sections: schema.section_count(),
                });
            }
        }
        self.validator.validate(&schema, answers, scope)?;
        Ok(())
    }

    /// Validate and persist a payload. Nothing is written unless every field passes.
    pub fn submit(
        &self,
        short_code: &str,
        payload: RawPayload,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let RawPayload { applicant, values } = payload;
        if !self.gate.may_submit(short_code, applicant.as_ref()) {
            return Err(SubmissionError::Forbidden {
                short_code: short_code.to_string(),
            });
        }

        let schema = self.schema(short_code)?;
        let (mut answers, uploads) = split_payload(&schema, values);

        if let Err(errors) = self.validator.validate_form(&schema, &answers) {
            tracing::debug!(
                short_code,
                fields = errors.len(),
                "submission rejected by validation"
            );
            return Err(SubmissionError::Validation(errors));
        }

        let existing = match (&applicant, self.policy) {
            (Some(applicant), ResubmissionPolicy::RejectDuplicate | ResubmissionPolicy::UpdatePending) => {
                self.repository.find_for_applicant(short_code, applicant)?
            }
            _ => None,
        };

        let replace = match (self.policy, existing) {
            (ResubmissionPolicy::RejectDuplicate, Some(previous)) => {
                return Err(SubmissionError::Duplicate {
                    submission_id: previous.id,
                });
            }
            (ResubmissionPolicy::UpdatePending, Some(previous)) if !previous.is_pending() => {
                return Err(SubmissionError::AlreadyFinalized {
                    submission_id: previous.id,
                });
            }
            (ResubmissionPolicy::UpdatePending, Some(previous)) => Some(previous),
            _ => None,
        };

        let stored_keys = self.store_uploads(short_code, &uploads, &mut answers)?;

        let now = Utc::now();
        let persisted = match replace {
            Some(mut previous) => {
                let superseded = stored_file_keys(&previous.answers);
                previous.answers = answers;
                previous.updated_at = now;
                let result = self.repository.update(previous.clone()).map(|_| previous);
                if result.is_ok() {
                    self.discard_all(&superseded);
                }
                result
            }
            None => self.repository.insert(Submission {
                id: next_submission_id(),
                form_id: schema.id(),
                form_short_code: schema.short_code().to_string(),
                applicant,
                answers,
                status: SubmissionStatus::Pending,
                submitted_at: now,
                updated_at: now,
            }),
        };

        let submission = match persisted {
            Ok(submission) => submission,
            Err(error) => {
                self.discard_all(&stored_keys);
                return Err(error.into());
            }
        };

        tracing::info!(
            submission_id = %submission.id,
            short_code,
            files = stored_keys.len(),
            "stored form submission"
        );

        if let Err(error) = self.notify(&schema, &submission) {
            tracing::warn!(submission_id = %submission.id, %error, "submission notification failed");
        }

        Ok(SubmissionReceipt::accepted(submission.id))
    }

    pub fn get(&self, id: &SubmissionId) -> Result<Submission, SubmissionError> {
        let submission = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(submission)
    }

    /// Lock a submission against further updates.
    pub fn finalize(&self, id: &SubmissionId) -> Result<Submission, SubmissionError> {
        let mut submission = self.get(id)?;
        if !submission.is_pending() {
            return Err(SubmissionError::AlreadyFinalized {
                submission_id: submission.id,
            });
        }
        submission.status = SubmissionStatus::Finalized;
        submission.updated_at = Utc::now();
        self.repository.update(submission.clone())?;
        Ok(submission)
    }

    /// Store each upload and swap its answer for the stored reference. On failure the
    /// files stored so far are discarded.
    fn store_uploads(
        &self,
        short_code: &str,
        uploads: &[(String, FileUpload)],
        answers: &mut AnswerSet,
    ) -> Result<Vec<String>, SubmissionError> {
        let mut stored_keys = Vec::new();
        for (name, upload) in uploads {
            match self.uploads.store(short_code, name, upload) {
                Ok(reference) => {
                    if let Some(key) = &reference.storage_key {
                        stored_keys.push(key.clone());
                    }
                    answers.insert(name.clone(), reference);
                }
                Err(error) => {
                    self.discard_all(&stored_keys);
                    return Err(error.into());
                }
            }
        }
        Ok(stored_keys)
    }

    fn discard_all(&self, keys: &[String]) {
        for key in keys {
            if let Err(error) = self.uploads.discard(key) {
                tracing::warn!(storage_key = %key, %error, "failed to discard stored upload");
            }
        }
    }

    fn notify(&self, schema: &FormSchema, submission: &Submission) -> Result<(), NotificationError> {
        let mut details = BTreeMap::new();
        details.insert("form_title".to_string(), schema.title().to_string());
        details.insert("status".to_string(), submission.status.label().to_string());
        if let Some(applicant) = &submission.applicant {
            details.insert("applicant".to_string(), applicant.0.clone());
        }
        for key in ["full_name", "email"] {
            if let Some(value) = submission.answers.answered(key).and_then(AnswerValue::as_text) {
                details.insert(key.to_string(), value);
            }
        }

        self.notifier.publish(SubmissionNotice {
            template: "application_submitted".to_string(),
            submission_id: submission.id.clone(),
            form: submission.form_short_code.clone(),
            details,
        })
    }
}

/// Separate plain answers from file uploads. Only real uploads to file fields may produce
/// file references: client-supplied references are dropped, uploads for unknown fields are
/// ignored, and uploads sent to non-file fields reach validation as metadata only. Empty
/// file parts count as unanswered.
fn split_payload(
    schema: &FormSchema,
    values: BTreeMap<String, RawValue>,
) -> (AnswerSet, Vec<(String, FileUpload)>) {
    let mut answers = AnswerSet::new();
    let mut uploads = Vec::new();

    for (name, value) in values {
        if name == CSRF_FIELD {
            continue;
        }
        match value {
            RawValue::Answer(AnswerValue::File(_)) => {
                tracing::debug!(field = %name, "ignoring file reference not backed by an upload");
                answers.insert(name, AnswerValue::Null);
            }
            RawValue::Answer(answer) => {
                answers.insert(name, answer);
            }
            RawValue::File(upload) => {
                let Some(field) = schema.field(&name) else {
                    tracing::debug!(field = %name, "ignoring upload for unknown field");
                    continue;
                };
                if upload.is_empty() {
                    answers.insert(name, AnswerValue::Null);
                    continue;
                }
                answers.insert(
                    name.clone(),
                    FileReference {
                        file_name: upload.file_name.clone(),
                        content_type: upload.content_type.clone(),
                        size_bytes: upload.size_bytes(),
                        storage_key: None,
                    },
                );
                if matches!(field.kind, FieldKind::File) {
                    uploads.push((name, upload));
                }
            }
        }
    }

    (answers, uploads)
}

fn stored_file_keys(answers: &AnswerSet) -> Vec<String> {
    answers
        .iter()
        .filter_map(|(_, value)| value.as_file())
        .filter_map(|file| file.storage_key.clone())
        .collect()
}

/// Error raised by the submission service.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("not allowed to submit form '{short_code}'")]
    Forbidden { short_code: String },
    #[error(transparent)]
    Lookup(#[from] FormLookupError),
    #[error("section {index} does not exist; form has {sections} section(s)")]
    SectionOutOfRange { index: usize, sections: usize },
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("applicant already submitted this form as {submission_id}")]
    Duplicate { submission_id: SubmissionId },
    #[error("submission {submission_id} is finalized")]
    AlreadyFinalized { submission_id: SubmissionId },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
