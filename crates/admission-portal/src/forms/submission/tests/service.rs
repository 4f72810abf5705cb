use super::common::*;
use crate::forms::answers::{AnswerSet, AnswerValue, FileReference};
use crate::forms::store::{FormLookupError, OpenAt};
use crate::forms::submission::domain::{RawPayload, SubmissionId, SubmissionStatus};
use crate::forms::submission::repository::{IdentifiedApplicants, RepositoryError};
use crate::forms::submission::{FormSubmissionService, ResubmissionPolicy, SubmissionError};
use crate::forms::validation::ValidationScope;
use crate::forms::{
    ActivationWindow, Field, FieldKind, Form, FormSchema, InMemoryFormStore, Section,
};
use chrono::NaiveDate;
use std::sync::Arc;

#[test]
fn valid_payload_creates_one_pending_submission() {
    let (service, repository, notifier, storage) = build_service(ResubmissionPolicy::CreateNew);

    let receipt = service
        .submit("bsc-nursing-2026", nursing_payload())
        .expect("valid submission");
    assert!(receipt.success);
    assert_eq!(receipt.message, "Form submitted successfully!");
    assert_eq!(repository.count(), 1);

    let stored = service.get(&receipt.submission_id).expect("stored");
    assert_eq!(stored.status, SubmissionStatus::Pending);
    assert_eq!(stored.form_short_code, "bsc-nursing-2026");
    assert!(!stored.answers.contains("_token"));
    assert_eq!(stored.answers.get("gender"), Some(&AnswerValue::text("Female")));

    let photo = stored
        .answers
        .get("photo")
        .and_then(AnswerValue::as_file)
        .expect("photo reference");
    assert!(photo.is_stored());
    assert_eq!(photo.size_bytes, 2048);
    assert_eq!(storage.stored_keys().len(), 2);

    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].template, "application_submitted");
    assert_eq!(notices[0].details.get("full_name").map(String::as_str), Some("Jane Doe"));
}

#[test]
fn validation_failure_writes_nothing() {
    let (service, repository, notifier, storage) = build_service(ResubmissionPolicy::CreateNew);

    let payload = nursing_payload()
        .with("email", "not-an-email")
        .with("hs_percentage", "104")
        .with_file("photo", upload("photo.gif", "image/gif", 512));

    match service.submit("bsc-nursing-2026", payload) {
        Err(SubmissionError::Validation(errors)) => {
            assert_eq!(
                errors.first("email"),
                Some("Email Address must be a valid email address.")
            );
            assert_eq!(
                errors.first("hs_percentage"),
                Some("10th Percentage may not be greater than 100.")
            );
            assert_eq!(
                errors.first("photo"),
                Some("Upload Photo must be a file of type: jpg, jpeg, png.")
            );
            assert!(!errors.contains("full_name"));
        }
        other => panic!("expected validation errors, got {other:?}"),
    }

    assert_eq!(repository.count(), 0);
    assert!(notifier.notices().is_empty());
    assert!(storage.stored_keys().is_empty());
}

#[test]
fn empty_file_parts_count_as_missing() {
    let (service, _, _, _) = build_service(ResubmissionPolicy::CreateNew);
    let payload = nursing_payload().with_file("signature", upload("", "application/octet-stream", 0));

    match service.submit("bsc-nursing-2026", payload) {
        Err(SubmissionError::Validation(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(
                errors.first("signature"),
                Some("Upload Signature is required.")
            );
        }
        other => panic!("expected required signature, got {other:?}"),
    }
}

#[test]
fn client_file_references_are_not_trusted() {
    let (service, repository, _, storage) = build_service(ResubmissionPolicy::UpdatePending);
    let first = service
        .submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-1"))
        .expect("first");
    let original_keys = storage.stored_keys();

    let forged = FileReference {
        file_name: "photo.jpg".to_string(),
        content_type: Some("image/jpeg".to_string()),
        size_bytes: 2048,
        storage_key: Some("../../etc/passwd".to_string()),
    };
    let payload = nursing_payload()
        .for_applicant("applicant-1")
        .with("photo", forged);

    match service.submit("bsc-nursing-2026", payload) {
        Err(SubmissionError::Validation(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors.first("photo"), Some("Upload Photo is required."));
        }
        other => panic!("expected required photo, got {other:?}"),
    }

    assert_eq!(repository.count(), 1);
    assert!(storage.discarded().is_empty());
    assert_eq!(storage.stored_keys(), original_keys);
    let stored = service.get(&first.submission_id).expect("stored");
    let photo = stored
        .answers
        .get("photo")
        .and_then(AnswerValue::as_file)
        .expect("photo reference");
    assert_ne!(photo.storage_key.as_deref(), Some("../../etc/passwd"));
}

#[test]
fn uploads_for_unknown_fields_are_ignored() {
    let (service, _, _, storage) = build_service(ResubmissionPolicy::CreateNew);
    let payload = nursing_payload().with_file(
        "../../../tmp/escape",
        upload("escape.jpg", "image/jpeg", 64),
    );

    let receipt = service
        .submit("bsc-nursing-2026", payload)
        .expect("unknown upload is dropped");
    let keys = storage.stored_keys();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|key| !key.contains("escape")));

    let stored = service.get(&receipt.submission_id).expect("stored");
    assert!(!stored.answers.contains("../../../tmp/escape"));
}

#[test]
fn uploads_for_non_file_fields_are_rejected() {
    let (service, repository, _, storage) = build_service(ResubmissionPolicy::CreateNew);
    let payload = nursing_payload().with_file("full_name", upload("name.txt", "text/plain", 16));

    match service.submit("bsc-nursing-2026", payload) {
        Err(SubmissionError::Validation(errors)) => {
            assert_eq!(errors.first("full_name"), Some("Full Name must be a string."));
        }
        other => panic!("expected shape error, got {other:?}"),
    }
    assert_eq!(repository.count(), 0);
    assert!(storage.stored_keys().is_empty());
}

#[test]
fn unknown_and_inactive_forms_are_not_found() {
    let (service, _, _, _) = build_service(ResubmissionPolicy::CreateNew);

    for short_code in ["missing-form", "bsc-nursing-2025"] {
        match service.submit(short_code, RawPayload::new()) {
            Err(SubmissionError::Lookup(FormLookupError::NotFound { short_code: code })) => {
                assert_eq!(code, short_code);
            }
            other => panic!("expected not found for {short_code}, got {other:?}"),
        }
    }
}

#[test]
fn closed_window_hides_form() {
    let mut form = Form::new(9, "late-intake", "Late Intake").section(
        Section::new(1, "Only", 1).field(Field::new("full_name", "Full Name", FieldKind::Text)),
    );
    let opens = NaiveDate::from_ymd_opt(2026, 7, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid timestamp");
    form.window = ActivationWindow {
        opens_at: Some(opens),
        closes_at: None,
        late_fee_closes_at: None,
    };
    let store = InMemoryFormStore::new();
    store
        .insert(FormSchema::new(form).expect("valid form"))
        .expect("insert");

    let before_opening = opens - chrono::Duration::days(1);
    let service = FormSubmissionService::new(
        Arc::new(store),
        Arc::new(MemoryRepository::default()),
        Arc::new(MemoryNotifier::default()),
        Arc::new(MemoryStorage::default()),
        ResubmissionPolicy::CreateNew,
    )
    .with_availability(Arc::new(OpenAt(before_opening)));

    assert!(matches!(
        service.schema("late-intake"),
        Err(SubmissionError::Lookup(FormLookupError::NotFound { .. }))
    ));
}

#[test]
fn storage_failure_discards_stored_files() {
    let repository = Arc::new(MemoryRepository::default());
    let storage = Arc::new(MemoryStorage::failing_on("signature"));
    let service = FormSubmissionService::new(
        Arc::new(form_store()),
        repository.clone(),
        Arc::new(MemoryNotifier::default()),
        storage.clone(),
        ResubmissionPolicy::CreateNew,
    );

    match service.submit("bsc-nursing-2026", nursing_payload()) {
        Err(SubmissionError::Storage(error)) => {
            assert!(error.to_string().contains("signature.png"));
        }
        other => panic!("expected storage failure, got {other:?}"),
    }

    assert_eq!(repository.count(), 0);
    assert!(storage.stored_keys().is_empty());
    assert_eq!(storage.discarded().len(), 1);
}

#[test]
fn repository_failure_discards_stored_files() {
    let storage = Arc::new(MemoryStorage::default());
    let service = FormSubmissionService::new(
        Arc::new(form_store()),
        Arc::new(UnavailableRepository),
        Arc::new(MemoryNotifier::default()),
        storage.clone(),
        ResubmissionPolicy::CreateNew,
    );

    match service.submit("bsc-nursing-2026", nursing_payload()) {
        Err(SubmissionError::Repository(RepositoryError::Unavailable(reason))) => {
            assert_eq!(reason, "database offline");
        }
        other => panic!("expected repository failure, got {other:?}"),
    }
    assert!(storage.stored_keys().is_empty());
    assert_eq!(storage.discarded().len(), 2);
}

#[test]
fn notification_failure_does_not_fail_submission() {
    let repository = Arc::new(MemoryRepository::default());
    let service = FormSubmissionService::new(
        Arc::new(form_store()),
        repository.clone(),
        Arc::new(OfflineNotifier),
        Arc::new(MemoryStorage::default()),
        ResubmissionPolicy::CreateNew,
    );

    service
        .submit("bsc-nursing-2026", nursing_payload())
        .expect("submission still succeeds");
    assert_eq!(repository.count(), 1);
}

#[test]
fn create_policy_keeps_every_submission() {
    let (service, repository, _, _) = build_service(ResubmissionPolicy::CreateNew);
    let first = service
        .submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-1"))
        .expect("first");
    let second = service
        .submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-1"))
        .expect("second");

    assert_ne!(first.submission_id, second.submission_id);
    assert_eq!(repository.count(), 2);
}

#[test]
fn reject_policy_refuses_second_submission() {
    let (service, repository, _, _) = build_service(ResubmissionPolicy::RejectDuplicate);
    let first = service
        .submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-1"))
        .expect("first");

    match service.submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-1")) {
        Err(SubmissionError::Duplicate { submission_id }) => {
            assert_eq!(submission_id, first.submission_id);
        }
        other => panic!("expected duplicate, got {other:?}"),
    }

    service
        .submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-2"))
        .expect("other applicants unaffected");
    assert_eq!(repository.count(), 2);
}

#[test]
fn update_policy_replaces_pending_answers() {
    let (service, repository, _, storage) = build_service(ResubmissionPolicy::UpdatePending);
    let first = service
        .submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-1"))
        .expect("first");
    let second = service
        .submit(
            "bsc-nursing-2026",
            nursing_payload()
                .for_applicant("applicant-1")
                .with("category", "OBC"),
        )
        .expect("update");

    assert_eq!(first.submission_id, second.submission_id);
    assert_eq!(repository.count(), 1);
    let stored = service.get(&first.submission_id).expect("stored");
    assert_eq!(stored.answers.get("category"), Some(&AnswerValue::text("OBC")));
    assert!(stored.updated_at >= stored.submitted_at);
    assert_eq!(storage.stored_keys().len(), 2);
    assert_eq!(storage.discarded().len(), 2);
}

#[test]
fn update_policy_refuses_finalized_submission() {
    let (service, _, _, _) = build_service(ResubmissionPolicy::UpdatePending);
    let first = service
        .submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-1"))
        .expect("first");
    let finalized = service.finalize(&first.submission_id).expect("finalize");
    assert_eq!(finalized.status, SubmissionStatus::Finalized);

    assert!(matches!(
        service.submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-1")),
        Err(SubmissionError::AlreadyFinalized { .. })
    ));
    assert!(matches!(
        service.finalize(&first.submission_id),
        Err(SubmissionError::AlreadyFinalized { .. })
    ));
}

#[test]
fn access_gate_blocks_anonymous_requests() {
    let (service, repository, _, _) = build_service(ResubmissionPolicy::CreateNew);
    let service = service.with_gate(Arc::new(IdentifiedApplicants));

    assert!(matches!(
        service.submit("bsc-nursing-2026", nursing_payload()),
        Err(SubmissionError::Forbidden { .. })
    ));
    service
        .submit("bsc-nursing-2026", nursing_payload().for_applicant("applicant-1"))
        .expect("identified applicant");
    assert_eq!(repository.count(), 1);
}

#[test]
fn check_validates_one_section() {
    let (service, _, _, _) = build_service(ResubmissionPolicy::CreateNew);
    let answers = AnswerSet::new().with("full_name", "Jane Doe");

    match service.check("bsc-nursing-2026", &answers, ValidationScope::Section(0)) {
        Err(SubmissionError::Validation(errors)) => {
            assert_eq!(
                errors.fields().collect::<Vec<_>>(),
                ["category", "dob", "gender"]
            );
        }
        other => panic!("expected section errors, got {other:?}"),
    }

    assert!(matches!(
        service.check("bsc-nursing-2026", &answers, ValidationScope::Section(3)),
        Err(SubmissionError::SectionOutOfRange { index: 3, sections: 3 })
    ));
}

#[test]
fn get_propagates_not_found() {
    let (service, _, _, _) = build_service(ResubmissionPolicy::CreateNew);
    match service.get(&SubmissionId("missing".to_string())) {
        Err(SubmissionError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found error, got {other:?}"),
    }
}
