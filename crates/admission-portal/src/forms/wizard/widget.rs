use serde::Serialize;

use crate::forms::answers::AnswerValue;
use crate::forms::schema::{Field, FieldKind, GridWidth};
use crate::forms::validation::param_list;

/// Input control used to render a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum Widget {
    TextInput { input_type: &'static str },
    TextArea,
    Dropdown { options: Vec<String> },
    RadioGroup { options: Vec<String> },
    CheckboxGroup { options: Vec<String> },
    Toggle,
    FileInput { accept: Option<String> },
}

impl Widget {
    pub fn for_field(field: &Field) -> Self {
        match &field.kind {
            FieldKind::Text => Self::TextInput { input_type: "text" },
            FieldKind::Number => Self::TextInput {
                input_type: "number",
            },
            FieldKind::Email => Self::TextInput {
                input_type: "email",
            },
            FieldKind::Date => Self::TextInput { input_type: "date" },
            FieldKind::Textarea => Self::TextArea,
            FieldKind::Select { options } => Self::Dropdown {
                options: options.clone(),
            },
            FieldKind::Radio { options } => Self::RadioGroup {
                options: options.clone(),
            },
            FieldKind::Checkbox { options } if options.is_empty() => Self::Toggle,
            FieldKind::Checkbox { options } | FieldKind::CheckboxGroup { options } => {
                Self::CheckboxGroup {
                    options: options.clone(),
                }
            }
            FieldKind::File => Self::FileInput {
                accept: accept_attribute(field),
            },
        }
    }
}

/// `accept` attribute for file inputs, from `mimes` extensions or `mimetypes`.
pub fn accept_attribute(field: &Field) -> Option<String> {
    let mut accepted: Vec<String> = field
        .rules
        .get("mimes")
        .map(param_list)
        .unwrap_or_default()
        .into_iter()
        .map(|extension| format!(".{}", extension.trim_start_matches('.')))
        .collect();
    accepted.extend(field.rules.get("mimetypes").map(param_list).unwrap_or_default());

    (!accepted.is_empty()).then(|| accepted.join(","))
}

/// Grid column class for a field's width.
pub fn column_span(width: GridWidth) -> String {
    format!("md:col-span-{}", width.get())
}

/// Everything needed to render one field of the current step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub widget: Widget,
    pub column_class: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<AnswerValue>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Current,
    Upcoming,
}

/// Step indicator entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepMarker {
    pub index: usize,
    pub title: String,
    pub status: StepStatus,
}
