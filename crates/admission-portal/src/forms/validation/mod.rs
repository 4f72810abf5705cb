//! Schema validation shared by the wizard and the submission service.
//!
//! Per field the checks run in a fixed order: `required`, then the shape implied by the
//! field type, then each declarative rule in name order. The first failure is the only
//! message reported for that field.

mod rules;
mod shape;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rules::{RuleContext, RulePredicate, RuleRegistry, RuleSet};
pub(crate) use rules::param_list;

use super::answers::{AnswerSet, AnswerValue};
use super::schema::{Field, FormSchema};

/// Field name mapped to the human-readable messages for that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(transparent)]
#[error("{} field(s) failed validation", .errors.len())]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Replace the messages for `field`.
    pub fn set(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(field.into(), vec![message.into()]);
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    pub fn first(&self, field: &str) -> Option<&str> {
        self.errors
            .get(field)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Vec<String>> {
        self.errors.remove(field)
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// Merge `other` in, appending messages for fields present in both.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<String>> {
        self.errors
    }
}

impl From<BTreeMap<String, Vec<String>>> for ValidationErrors {
    fn from(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self { errors }
    }
}

/// Which fields of a schema a validation pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationScope {
    Form,
    Section(usize),
}

/// Applies a [`FormSchema`] to an [`AnswerSet`].
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    registry: Arc<RuleRegistry>,
}

impl SchemaValidator {
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn required_message(field: &Field) -> String {
        format!("{} is required.", field.label)
    }

    /// Validate the fields selected by `scope`. An out-of-range section index covers no
    /// fields and therefore passes.
    pub fn validate(
        &self,
        schema: &FormSchema,
        answers: &AnswerSet,
        scope: ValidationScope,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match scope {
            ValidationScope::Form => {
                for field in schema.fields() {
                    self.collect(field, answers, &mut errors);
                }
            }
            ValidationScope::Section(index) => {
                if let Some(section) = schema.section(index) {
                    for field in &section.fields {
                        self.collect(field, answers, &mut errors);
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn validate_form(
        &self,
        schema: &FormSchema,
        answers: &AnswerSet,
    ) -> Result<(), ValidationErrors> {
        self.validate(schema, answers, ValidationScope::Form)
    }

    pub fn validate_section(
        &self,
        schema: &FormSchema,
        answers: &AnswerSet,
        index: usize,
    ) -> Result<(), ValidationErrors> {
        self.validate(schema, answers, ValidationScope::Section(index))
    }

    /// First failure for a single field, if any.
    pub fn validate_field(&self, field: &Field, answers: &AnswerSet) -> Option<String> {
        let value = answers.get(&field.name).unwrap_or(&AnswerValue::Null);

        if value.is_empty() {
            return field.is_required().then(|| Self::required_message(field));
        }

        if let Err(message) = shape::check_shape(field, value) {
            return Some(message);
        }

        for (name, param) in field.rules.iter() {
            let Some(predicate) = self.registry.get(name) else {
                tracing::warn!(field = %field.name, rule = name, "ignoring unknown validation rule");
                continue;
            };
            let ctx = RuleContext {
                field,
                value,
                param,
                answers,
            };
            if let Err(message) = predicate(&ctx) {
                return Some(message);
            }
        }
        None
    }

    fn collect(&self, field: &Field, answers: &AnswerSet, errors: &mut ValidationErrors) {
        if let Some(message) = self.validate_field(field, answers) {
            errors.add(field.name.clone(), message);
        }
    }
}
