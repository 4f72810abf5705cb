//! Schema-driven admission forms.
//!
//! A form's structure (sections, fields, validation rules) is plain data. The same
//! [`FormSchema`] drives the step wizard on the client side and the re-validation performed
//! by the submission service, so both ends always apply identical rules.

pub mod answers;
pub mod schema;
pub mod seed;
pub mod store;
pub mod submission;
pub mod validation;
pub mod wizard;

pub use answers::{AnswerSet, AnswerValue, FileReference};
pub use schema::{
    ActivationWindow, Field, FieldId, FieldKind, FieldType, Form, FormId, FormSchema, GridWidth,
    SchemaError, Section, SectionId,
};
pub use store::{
    AlwaysOpen, FormAvailability, FormLookupError, FormSchemaStore, InMemoryFormStore, OpenAt,
    StoreError, WindowAvailability,
};
pub use validation::{
    RuleContext, RulePredicate, RuleRegistry, RuleSet, SchemaValidator, ValidationErrors,
    ValidationScope,
};
pub use wizard::{FormWizard, Transition, WizardError, WizardState};
