//! Step-by-step form session.
//!
//! [`FormWizard`] owns the answers for one applicant session and only advances when the
//! current section validates. Transport (fetching the schema, posting the submission)
//! happens outside; the caller reports outcomes back through the `schema_*` and
//! `submission_*` methods.

mod widget;

use std::fmt;
use std::sync::Arc;

pub use widget::{accept_attribute, column_span, FieldView, StepMarker, StepStatus, Widget};

use super::answers::{AnswerSet, AnswerValue};
use super::schema::{FormSchema, Section};
use super::validation::{SchemaValidator, ValidationErrors};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardState {
    Loading,
    Error { message: String },
    Step(usize),
    Submitting,
    Submitted { message: String },
}

impl WizardState {
    pub fn label(&self) -> &'static str {
        match self {
            WizardState::Loading => "loading",
            WizardState::Error { .. } => "error",
            WizardState::Step(_) => "step",
            WizardState::Submitting => "submitting",
            WizardState::Submitted { .. } => "submitted",
        }
    }
}

impl fmt::Display for WizardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardState::Step(index) => write!(f, "step[{index}]"),
            other => f.write_str(other.label()),
        }
    }
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Moved { from: usize, to: usize },
    /// Section validation failed; errors are recorded on the wizard.
    Blocked { step: usize },
    /// Ready to post; the caller sends these answers and reports the outcome.
    Submitting { answers: AnswerSet },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("cannot {action} while {state}")]
    InvalidTransition { state: String, action: &'static str },
    #[error("field '{name}' is not part of this form")]
    UnknownField { name: String },
    #[error("field '{name}' does not accept multiple options")]
    NotMultiSelect { name: String },
}

#[derive(Debug, Clone)]
pub struct FormWizard {
    state: WizardState,
    schema: Option<Arc<FormSchema>>,
    answers: AnswerSet,
    errors: ValidationErrors,
    banner: Option<String>,
    validator: SchemaValidator,
}

impl Default for FormWizard {
    fn default() -> Self {
        Self::new(SchemaValidator::default())
    }
}

impl FormWizard {
    pub fn new(validator: SchemaValidator) -> Self {
        Self {
            state: WizardState::Loading,
            schema: None,
            answers: AnswerSet::new(),
            errors: ValidationErrors::new(),
            banner: None,
            validator,
        }
    }

    /// Shortcut for a wizard whose schema is already available.
    pub fn with_schema(schema: Arc<FormSchema>) -> Self {
        let mut wizard = Self::default();
        wizard.schema = Some(schema);
        wizard.state = WizardState::Step(0);
        wizard
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn schema(&self) -> Option<&FormSchema> {
        self.schema.as_deref()
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Retryable transport message, kept apart from field errors.
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn current_step(&self) -> Option<usize> {
        match self.state {
            WizardState::Step(index) => Some(index),
            _ => None,
        }
    }

    pub fn current_section(&self) -> Option<&Section> {
        let index = self.current_step()?;
        self.schema.as_ref()?.section(index)
    }

    pub fn is_last_step(&self) -> bool {
        match (&self.schema, self.current_step()) {
            (Some(schema), Some(index)) => index == schema.last_section_index(),
            _ => false,
        }
    }

    fn invalid(&self, action: &'static str) -> WizardError {
        WizardError::InvalidTransition {
            state: self.state.to_string(),
            action,
        }
    }

    fn loaded_schema(&self, action: &'static str) -> Result<Arc<FormSchema>, WizardError> {
        self.schema.clone().ok_or_else(|| self.invalid(action))
    }

    pub fn schema_loaded(&mut self, schema: Arc<FormSchema>) -> Result<(), WizardError> {
        if self.state != WizardState::Loading {
            return Err(self.invalid("load a schema"));
        }
        self.schema = Some(schema);
        self.state = WizardState::Step(0);
        Ok(())
    }

    pub fn schema_failed(&mut self, message: impl Into<String>) -> Result<(), WizardError> {
        if self.state != WizardState::Loading {
            return Err(self.invalid("report a load failure"));
        }
        self.state = WizardState::Error {
            message: message.into(),
        };
        Ok(())
    }

    /// Return to `loading` after a failed fetch.
    pub fn retry(&mut self) -> Result<(), WizardError> {
        if !matches!(self.state, WizardState::Error { .. }) {
            return Err(self.invalid("retry"));
        }
        self.state = WizardState::Loading;
        Ok(())
    }

    /// Record an answer and clear that field's error only.
    pub fn set_answer(
        &mut self,
        name: &str,
        value: impl Into<AnswerValue>,
    ) -> Result<(), WizardError> {
        if self.current_step().is_none() {
            return Err(self.invalid("edit answers"));
        }
        let schema = self.loaded_schema("edit answers")?;
        if schema.field(name).is_none() {
            return Err(WizardError::UnknownField {
                name: name.to_string(),
            });
        }
        self.answers.insert(name, value);
        self.errors.remove(name);
        Ok(())
    }

    /// Add or remove `option` from a multi-select answer.
    pub fn toggle_option(&mut self, name: &str, option: &str) -> Result<(), WizardError> {
        if self.current_step().is_none() {
            return Err(self.invalid("edit answers"));
        }
        let schema = self.loaded_schema("edit answers")?;
        let field = schema.field(name).ok_or_else(|| WizardError::UnknownField {
            name: name.to_string(),
        })?;
        if !field.kind.is_multi_select() {
            return Err(WizardError::NotMultiSelect {
                name: name.to_string(),
            });
        }

        let mut chosen = match self.answers.get(name) {
            Some(AnswerValue::List(items)) => items.clone(),
            _ => Vec::new(),
        };
        match chosen.iter().position(|item| item == option) {
            Some(position) => {
                chosen.remove(position);
            }
            None => chosen.push(option.to_string()),
        }
        self.answers.insert(name, chosen);
        self.errors.remove(name);
        Ok(())
    }

    /// A required field left empty gets its error back immediately.
    pub fn blur(&mut self, name: &str) -> Result<(), WizardError> {
        let schema = self.loaded_schema("blur a field")?;
        let field = schema.field(name).ok_or_else(|| WizardError::UnknownField {
            name: name.to_string(),
        })?;
        let empty = self.answers.answered(name).is_none();
        if field.is_required() && empty {
            self.errors
                .set(name, SchemaValidator::required_message(field));
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<Transition, WizardError> {
        let schema = self.loaded_schema("advance")?;
        let index = match self.current_step() {
            Some(index) if index < schema.last_section_index() => index,
            _ => return Err(self.invalid("advance")),
        };

        let outcome = self.validator.validate_section(&schema, &self.answers, index);
        let blocked = outcome.is_err();
        self.replace_section_errors(&schema, index, outcome.err());
        if blocked {
            Ok(Transition::Blocked { step: index })
        } else {
            self.state = WizardState::Step(index + 1);
            Ok(Transition::Moved {
                from: index,
                to: index + 1,
            })
        }
    }

    /// Swap in fresh errors for one section; errors on other sections stay put.
    fn replace_section_errors(
        &mut self,
        schema: &FormSchema,
        index: usize,
        errors: Option<ValidationErrors>,
    ) {
        if let Some(section) = schema.section(index) {
            for field in &section.fields {
                self.errors.remove(&field.name);
            }
        }
        if let Some(errors) = errors {
            self.errors.merge(errors);
        }
    }

    /// Go back one step without re-validating.
    pub fn back(&mut self) -> Result<Transition, WizardError> {
        match self.current_step() {
            Some(index) if index > 0 => {
                self.state = WizardState::Step(index - 1);
                Ok(Transition::Moved {
                    from: index,
                    to: index - 1,
                })
            }
            _ => Err(self.invalid("go back")),
        }
    }

    /// Validate the final section and hand the answers to the caller for posting.
    pub fn begin_submit(&mut self) -> Result<Transition, WizardError> {
        let schema = self.loaded_schema("submit")?;
        if !self.is_last_step() {
            return Err(self.invalid("submit"));
        }
        let last = schema.last_section_index();

        let outcome = self.validator.validate_section(&schema, &self.answers, last);
        if outcome.is_err() {
            self.replace_section_errors(&schema, last, outcome.err());
            return Ok(Transition::Blocked { step: last });
        }
        self.replace_section_errors(&schema, last, None);

        self.banner = None;
        self.state = WizardState::Submitting;
        Ok(Transition::Submitting {
            answers: self.answers.clone(),
        })
    }

    pub fn submission_succeeded(&mut self, message: impl Into<String>) -> Result<(), WizardError> {
        if self.state != WizardState::Submitting {
            return Err(self.invalid("complete a submission"));
        }
        self.errors.clear();
        self.state = WizardState::Submitted {
            message: message.into(),
        };
        Ok(())
    }

    /// Server-side validation failed; show the field errors on the last step.
    pub fn submission_rejected(&mut self, errors: ValidationErrors) -> Result<(), WizardError> {
        if self.state != WizardState::Submitting {
            return Err(self.invalid("reject a submission"));
        }
        let schema = self.loaded_schema("reject a submission")?;
        self.errors = errors;
        self.state = WizardState::Step(schema.last_section_index());
        Ok(())
    }

    pub fn transport_failed(&mut self, message: impl Into<String>) -> Result<(), WizardError> {
        if self.state != WizardState::Submitting {
            return Err(self.invalid("report a transport failure"));
        }
        let schema = self.loaded_schema("report a transport failure")?;
        self.banner = Some(message.into());
        self.state = WizardState::Step(schema.last_section_index());
        Ok(())
    }

    /// Clear the session after a successful submission.
    pub fn start_over(&mut self) -> Result<(), WizardError> {
        if !matches!(self.state, WizardState::Submitted { .. }) {
            return Err(self.invalid("start over"));
        }
        self.answers.clear();
        self.errors.clear();
        self.banner = None;
        self.state = WizardState::Step(0);
        Ok(())
    }

    pub fn steps(&self) -> Vec<StepMarker> {
        let Some(schema) = &self.schema else {
            return Vec::new();
        };
        let position = match self.state {
            WizardState::Step(index) => Some(index),
            WizardState::Submitting | WizardState::Submitted { .. } => {
                Some(schema.section_count())
            }
            WizardState::Loading | WizardState::Error { .. } => None,
        };

        schema
            .sections()
            .iter()
            .enumerate()
            .map(|(index, section)| StepMarker {
                index,
                title: section.title.clone(),
                status: match position {
                    Some(current) if index < current => StepStatus::Completed,
                    Some(current) if index == current => StepStatus::Current,
                    _ => StepStatus::Upcoming,
                },
            })
            .collect()
    }

    pub fn field_views(&self) -> Vec<FieldView> {
        let Some(section) = self.current_section() else {
            return Vec::new();
        };
        section
            .fields
            .iter()
            .map(|field| FieldView {
                name: field.name.clone(),
                label: field.label.clone(),
                placeholder: field.placeholder.clone(),
                widget: Widget::for_field(field),
                column_class: column_span(field.grid_width),
                required: field.is_required(),
                value: self.answers.get(&field.name).cloned(),
                errors: self
                    .errors
                    .get(&field.name)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Completed fraction of the steps, from 0.0 to 1.0.
    pub fn progress(&self) -> f32 {
        let Some(schema) = &self.schema else {
            return 0.0;
        };
        match self.state {
            WizardState::Step(index) => index as f32 / schema.section_count() as f32,
            WizardState::Submitting | WizardState::Submitted { .. } => 1.0,
            WizardState::Loading | WizardState::Error { .. } => 0.0,
        }
    }
}
