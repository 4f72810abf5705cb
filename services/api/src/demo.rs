use crate::cli::FormSourceArgs;
use crate::infra::{DiskFileStorage, InMemoryNotificationPublisher, InMemorySubmissionRepository};
use admission_portal::config::AppConfig;
use admission_portal::error::AppError;
use admission_portal::forms::seed::{standard_store, NURSING_SHORT_CODE};
use admission_portal::forms::submission::{
    FileUpload, FormSubmissionService, RawPayload, ResubmissionPolicy, SubmissionError,
};
use admission_portal::forms::{
    AnswerSet, AnswerValue, FileReference, FormLookupError, FormSchema, FormSchemaStore,
    FormWizard, InMemoryFormStore, SchemaValidator, Transition, ValidationErrors, ValidationScope,
};
use clap::Args;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ValidateArgs {
    /// Short code of the form to validate against
    pub(crate) short_code: String,
    /// JSON object mapping field names to answers
    #[arg(long)]
    pub(crate) answers: PathBuf,
    /// Zero-based step to validate; omit to validate the whole form
    #[arg(long)]
    pub(crate) section: Option<usize>,
    #[command(flatten)]
    pub(crate) source: FormSourceArgs,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Directory for the demo uploads (defaults to the system temp directory)
    #[arg(long)]
    pub(crate) upload_dir: Option<PathBuf>,
    /// Stop after the wizard walkthrough without storing a submission
    #[arg(long)]
    pub(crate) skip_submission: bool,
}

fn load_store(source: &FormSourceArgs) -> Result<InMemoryFormStore, AppError> {
    let seed_path = match &source.forms {
        Some(path) => Some(path.clone()),
        None => AppConfig::load()?.forms.seed_path,
    };
    Ok(standard_store(seed_path.as_deref())?)
}

fn lookup(store: &InMemoryFormStore, short_code: &str) -> Result<Arc<FormSchema>, AppError> {
    store
        .find_by_short_code(short_code)?
        .ok_or_else(|| {
            AppError::from(FormLookupError::NotFound {
                short_code: short_code.to_string(),
            })
        })
}

pub(crate) fn run_form_list(source: FormSourceArgs) -> Result<(), AppError> {
    let store = load_store(&source)?;
    let forms = store.list()?;
    if forms.is_empty() {
        println!("No forms configured");
        return Ok(());
    }

    println!("Configured forms");
    for schema in &forms {
        let state = if schema.form().is_active {
            "active"
        } else {
            "inactive"
        };
        println!("- {} ({}): {}", schema.short_code(), state, schema.title());
        for (index, section) in schema.sections().iter().enumerate() {
            println!(
                "    step {}: {} ({} fields)",
                index + 1,
                section.title,
                section.fields.len()
            );
        }
    }
    Ok(())
}

pub(crate) fn run_form_show(short_code: &str, source: FormSourceArgs) -> Result<(), AppError> {
    let store = load_store(&source)?;
    let schema = lookup(&store, short_code)?;
    let rendered = serde_json::to_string_pretty(schema.form()).map_err(io::Error::from)?;
    println!("{rendered}");
    Ok(())
}

pub(crate) fn run_validate(args: ValidateArgs) -> Result<(), AppError> {
    let ValidateArgs {
        short_code,
        answers,
        section,
        source,
    } = args;

    let store = load_store(&source)?;
    let schema = lookup(&store, &short_code)?;
    let raw = fs::read_to_string(&answers)?;
    let answers: AnswerSet = serde_json::from_str(&raw).map_err(io::Error::from)?;

    let scope = match section {
        Some(index) if index >= schema.section_count() => {
            return Err(AppError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "form '{short_code}' has {} steps; step {index} does not exist",
                    schema.section_count()
                ),
            )));
        }
        Some(index) => ValidationScope::Section(index),
        None => ValidationScope::Form,
    };

    match SchemaValidator::default().validate(&schema, &answers, scope) {
        Ok(()) => println!("{short_code}: answers are valid"),
        Err(errors) => {
            println!("{short_code}: {errors}");
            print_errors(&errors);
        }
    }
    Ok(())
}

fn print_errors(errors: &ValidationErrors) {
    for (field, messages) in errors.iter() {
        for message in messages {
            println!("- {field}: {message}");
        }
    }
}

/// Answers a careful applicant would give, one slice per step.
fn sample_steps() -> Vec<Vec<(&'static str, AnswerValue)>> {
    vec![
        vec![
            ("full_name", AnswerValue::text("Asha Verma")),
            ("dob", AnswerValue::text("2007-08-21")),
            ("gender", AnswerValue::text("Female")),
            ("category", AnswerValue::text("OBC")),
        ],
        vec![
            ("email", AnswerValue::text("asha.verma@example.com")),
            ("phone", AnswerValue::text("9123456780")),
            ("address", AnswerValue::text("14 Station Road, Nagpur")),
        ],
        vec![
            ("hs_percentage", AnswerValue::Number(86.2)),
            ("inter_percentage", AnswerValue::Number(79.5)),
            ("photo", AnswerValue::File(sample_file("photo.jpg", "image/jpeg"))),
            (
                "signature",
                AnswerValue::File(sample_file("signature.png", "image/png")),
            ),
            ("terms", AnswerValue::Bool(true)),
        ],
    ]
}

fn sample_file(name: &str, content_type: &str) -> FileReference {
    FileReference {
        file_name: name.to_string(),
        content_type: Some(content_type.to_string()),
        size_bytes: 48 * 1024,
        storage_key: None,
    }
}

fn payload_from(answers: AnswerSet) -> RawPayload {
    let mut payload = RawPayload::new().for_applicant("demo-applicant");
    for (name, value) in answers.into_inner() {
        payload = match value {
            AnswerValue::File(file) => payload.with_file(
                name,
                FileUpload::new(
                    file.file_name,
                    file.content_type.as_deref(),
                    vec![0u8; file.size_bytes as usize],
                ),
            ),
            other => payload.with(name, other),
        };
    }
    payload
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(standard_store(None)?);
    let repository = Arc::new(InMemorySubmissionRepository::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let upload_dir = args
        .upload_dir
        .unwrap_or_else(|| std::env::temp_dir().join("admission-portal-demo"));
    let uploads = Arc::new(DiskFileStorage::new(upload_dir));
    let service = FormSubmissionService::new(
        store,
        repository.clone(),
        notifier.clone(),
        uploads.clone(),
        ResubmissionPolicy::RejectDuplicate,
    );

    let schema = match service.schema(NURSING_SHORT_CODE) {
        Ok(schema) => schema,
        Err(SubmissionError::Lookup(err)) => return Err(err.into()),
        Err(other) => {
            return Err(AppError::Io(io::Error::other(other.to_string())))
        }
    };

    println!("Admission form demo");
    println!("Form: {} ({})", schema.title(), schema.short_code());
    let mut wizard = FormWizard::with_schema(schema.clone());

    for (index, answers) in sample_steps().into_iter().enumerate() {
        let title = schema
            .section(index)
            .map(|section| section.title.as_str())
            .unwrap_or_default();
        println!(
            "\nStep {} of {}: {} ({:.0}% complete)",
            index + 1,
            schema.section_count(),
            title,
            wizard.progress() * 100.0
        );

        if index == 0 {
            if let Ok(Transition::Blocked { .. }) = wizard.next() {
                println!("Continuing with an empty step is blocked:");
                print_errors(wizard.errors());
            }
        }

        for (name, value) in answers {
            if let Err(err) = wizard.set_answer(name, value) {
                println!("- could not record {name}: {err}");
            }
        }

        let outcome = if wizard.is_last_step() {
            wizard.begin_submit()
        } else {
            wizard.next()
        };
        match outcome {
            Ok(Transition::Moved { to, .. }) => println!("Step complete, moving to step {}", to + 1),
            Ok(Transition::Blocked { .. }) => {
                println!("Step blocked:");
                print_errors(wizard.errors());
                return Ok(());
            }
            Ok(Transition::Submitting { answers }) => {
                println!("All steps valid; {} answers ready to post", answers.len());
                if args.skip_submission {
                    return Ok(());
                }
                submit_demo(&service, &mut wizard, answers)?;
            }
            Err(err) => {
                println!("Wizard refused the action: {err}");
                return Ok(());
            }
        }
    }

    let notices = notifier.notices();
    println!("\nNotifications queued: {}", notices.len());
    for notice in &notices {
        println!("- {} for {}", notice.template, notice.form);
    }
    println!("Submissions stored: {}", repository.submissions().len());
    println!("Uploads written below {}", uploads.root().display());
    Ok(())
}

fn submit_demo(
    service: &FormSubmissionService<
        InMemoryFormStore,
        InMemorySubmissionRepository,
        InMemoryNotificationPublisher,
    >,
    wizard: &mut FormWizard,
    answers: AnswerSet,
) -> Result<(), AppError> {
    match service.submit(NURSING_SHORT_CODE, payload_from(answers.clone())) {
        Ok(receipt) => {
            println!("{} (id {})", receipt.message, receipt.submission_id);
            let _ = wizard.submission_succeeded(receipt.message.clone());
            if let Ok(stored) = service.get(&receipt.submission_id) {
                let view = serde_json::to_string_pretty(&stored.status_view())
                    .map_err(io::Error::from)?;
                println!("{view}");
            }
        }
        Err(SubmissionError::Validation(errors)) => {
            println!("Server rejected the answers:");
            print_errors(&errors);
            let _ = wizard.submission_rejected(errors);
            return Ok(());
        }
        Err(err) => {
            println!("Submission failed: {err}");
            let _ = wizard.transport_failed(err.to_string());
            return Ok(());
        }
    }

    match service.submit(NURSING_SHORT_CODE, payload_from(answers)) {
        Err(SubmissionError::Duplicate { submission_id }) => {
            println!("Second submission refused; {submission_id} already on file");
        }
        Ok(receipt) => println!("Unexpected second submission {}", receipt.submission_id),
        Err(err) => println!("Second submission failed: {err}"),
    }
    Ok(())
}
