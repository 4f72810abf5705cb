use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::forms::answers::{AnswerSet, AnswerValue};
use crate::forms::schema::FormId;

/// Identifier wrapper for stored submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the requester as supplied by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicantId(pub String);

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Finalized,
}

impl SubmissionStatus {
    pub fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Finalized => "finalized",
        }
    }
}

/// A stored answer set for one form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub form_id: FormId,
    pub form_short_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant: Option<ApplicantId>,
    pub answers: AnswerSet,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn is_pending(&self) -> bool {
        self.status == SubmissionStatus::Pending
    }

    pub fn status_view(&self) -> SubmissionStatusView {
        SubmissionStatusView {
            submission_id: self.id.clone(),
            form: self.form_short_code.clone(),
            status: self.status.label(),
            submitted_at: self.submitted_at,
            updated_at: self.updated_at,
        }
    }
}

/// Sanitized representation of a submission's state; answers are not echoed back.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionStatusView {
    pub submission_id: SubmissionId,
    pub form: String,
    pub status: &'static str,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Uploaded file bytes as received from the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Browsers send an empty part when no file was chosen.
    pub fn is_empty(&self) -> bool {
        self.file_name.trim().is_empty() && self.bytes.is_empty()
    }
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Answer(AnswerValue),
    File(FileUpload),
}

impl From<AnswerValue> for RawValue {
    fn from(value: AnswerValue) -> Self {
        RawValue::Answer(value)
    }
}

impl From<FileUpload> for RawValue {
    fn from(upload: FileUpload) -> Self {
        RawValue::File(upload)
    }
}

/// Transport-neutral submission body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPayload {
    pub applicant: Option<ApplicantId>,
    pub values: BTreeMap<String, RawValue>,
}

impl RawPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_applicant(mut self, applicant: impl Into<String>) -> Self {
        self.applicant = Some(ApplicantId(applicant.into()));
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AnswerValue>) -> Self {
        self.values
            .insert(name.into(), RawValue::Answer(value.into()));
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, upload: FileUpload) -> Self {
        self.values.insert(name.into(), RawValue::File(upload));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: RawValue) {
        self.values.insert(name.into(), value);
    }

    /// Append to a multi-valued entry, promoting a scalar into a list.
    pub fn push_item(&mut self, name: impl Into<String>, item: impl Into<String>) {
        let item = item.into();
        match self.values.entry(name.into()).or_insert_with(|| {
            RawValue::Answer(AnswerValue::List(Vec::new()))
        }) {
            RawValue::Answer(AnswerValue::List(items)) => items.push(item),
            other => {
                let mut items = match other {
                    RawValue::Answer(AnswerValue::Text(text)) => vec![text.clone()],
                    _ => Vec::new(),
                };
                items.push(item);
                *other = RawValue::Answer(AnswerValue::List(items));
            }
        }
    }

    pub fn from_answers(answers: AnswerSet) -> Self {
        Self {
            applicant: None,
            values: answers
                .into_inner()
                .into_iter()
                .map(|(name, value)| (name, RawValue::Answer(value)))
                .collect(),
        }
    }
}

/// Returned to the caller after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub success: bool,
    pub message: String,
    pub submission_id: SubmissionId,
}

pub const SUBMITTED_MESSAGE: &str = "Form submitted successfully!";

impl SubmissionReceipt {
    pub fn accepted(submission_id: SubmissionId) -> Self {
        Self {
            success: true,
            message: SUBMITTED_MESSAGE.to_string(),
            submission_id,
        }
    }
}
