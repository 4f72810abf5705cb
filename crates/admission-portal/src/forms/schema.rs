use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::validation::RuleSet;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FormId(pub u64);

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SectionId(pub u64);

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FieldId(pub u64);

/// Wire-level field type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Email,
    Date,
    Select,
    Radio,
    Checkbox,
    #[serde(rename = "checkbox-group", alias = "checkbox_group")]
    CheckboxGroup,
    Textarea,
    File,
}

impl FieldType {
    pub const fn ordered() -> [Self; 10] {
        [
            Self::Text,
            Self::Number,
            Self::Email,
            Self::Date,
            Self::Select,
            Self::Radio,
            Self::Checkbox,
            Self::CheckboxGroup,
            Self::Textarea,
            Self::File,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Email => "email",
            Self::Date => "date",
            Self::Select => "select",
            Self::Radio => "radio",
            Self::Checkbox => "checkbox",
            Self::CheckboxGroup => "checkbox-group",
            Self::Textarea => "textarea",
            Self::File => "file",
        }
    }

    /// Types whose schema must declare at least one option.
    pub const fn requires_options(self) -> bool {
        matches!(self, Self::Select | Self::Radio | Self::CheckboxGroup)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Field type with the attributes each variant actually uses.
///
/// `Checkbox` doubles as a boolean toggle (no options) and a multi-select group
/// (with options); both shapes are kept under the one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Email,
    Date,
    Textarea,
    File,
    Select { options: Vec<String> },
    Radio { options: Vec<String> },
    Checkbox { options: Vec<String> },
    CheckboxGroup { options: Vec<String> },
}

impl FieldKind {
    pub fn from_parts(field_type: FieldType, options: Vec<String>) -> Self {
        match field_type {
            FieldType::Text => Self::Text,
            FieldType::Number => Self::Number,
            FieldType::Email => Self::Email,
            FieldType::Date => Self::Date,
            FieldType::Textarea => Self::Textarea,
            FieldType::File => Self::File,
            FieldType::Select => Self::Select { options },
            FieldType::Radio => Self::Radio { options },
            FieldType::Checkbox => Self::Checkbox { options },
            FieldType::CheckboxGroup => Self::CheckboxGroup { options },
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Text => FieldType::Text,
            Self::Number => FieldType::Number,
            Self::Email => FieldType::Email,
            Self::Date => FieldType::Date,
            Self::Textarea => FieldType::Textarea,
            Self::File => FieldType::File,
            Self::Select { .. } => FieldType::Select,
            Self::Radio { .. } => FieldType::Radio,
            Self::Checkbox { .. } => FieldType::Checkbox,
            Self::CheckboxGroup { .. } => FieldType::CheckboxGroup,
        }
    }

    /// Declared options; empty for non-choice types.
    pub fn options(&self) -> &[String] {
        match self {
            Self::Select { options }
            | Self::Radio { options }
            | Self::Checkbox { options }
            | Self::CheckboxGroup { options } => options,
            _ => &[],
        }
    }

    /// True when the answer is a set of strings rather than a scalar.
    pub fn is_multi_select(&self) -> bool {
        match self {
            Self::CheckboxGroup { .. } => true,
            Self::Checkbox { options } => !options.is_empty(),
            _ => false,
        }
    }

    pub fn is_toggle(&self) -> bool {
        matches!(self, Self::Checkbox { options } if options.is_empty())
    }
}

/// Layout hint on a twelve column grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridWidth(u8);

impl GridWidth {
    pub const FULL: Self = Self(12);
    pub const HALF: Self = Self(6);

    pub fn new(columns: u8) -> Option<Self> {
        (1..=12).contains(&columns).then_some(Self(columns))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for GridWidth {
    fn default() -> Self {
        Self::FULL
    }
}

/// One input definition within a section.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: FieldId,
    pub section_id: SectionId,
    pub name: String,
    pub label: String,
    pub placeholder: Option<String>,
    pub kind: FieldKind,
    pub required: bool,
    pub grid_width: GridWidth,
    pub order: i32,
    pub rules: RuleSet,
}

impl Field {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: FieldId::default(),
            section_id: SectionId::default(),
            name: name.into(),
            label: label.into(),
            placeholder: None,
            kind,
            required: false,
            grid_width: GridWidth::default(),
            order: 0,
            rules: RuleSet::default(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = FieldId(id);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn ordered(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn width(mut self, width: GridWidth) -> Self {
        self.grid_width = width;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    pub fn options(&self) -> &[String] {
        self.kind.options()
    }

    /// A `required` entry in the rule set counts the same as the flag, unless it is
    /// explicitly `false` or `null`.
    pub fn is_required(&self) -> bool {
        self.required
            || match self.rules.get("required") {
                None | Some(Value::Null) => false,
                Some(Value::Bool(flag)) => *flag,
                Some(_) => true,
            }
    }

    fn check(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyFieldName {
                label: self.label.clone(),
            });
        }

        let field_type = self.field_type();
        if field_type.requires_options() && self.options().is_empty() {
            return Err(SchemaError::MissingOptions {
                field: self.name.clone(),
                field_type,
            });
        }

        self.rules
            .check()
            .map_err(|(rule, reason)| SchemaError::InvalidRule {
                field: self.name.clone(),
                rule,
                reason,
            })
    }
}

/// Serialized form of [`Field`], matching the JSON served to renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldRecord {
    #[serde(default)]
    id: FieldId,
    #[serde(default)]
    section_id: SectionId,
    field_type: FieldType,
    label: String,
    name: String,
    #[serde(default)]
    placeholder: Option<String>,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    is_required: bool,
    #[serde(default = "default_grid_width")]
    grid_width: u8,
    #[serde(default)]
    order: i32,
    #[serde(default)]
    validation_rules: Option<RuleSet>,
}

fn default_grid_width() -> u8 {
    GridWidth::FULL.get()
}

impl TryFrom<FieldRecord> for Field {
    type Error = SchemaError;

    fn try_from(record: FieldRecord) -> Result<Self, Self::Error> {
        let grid_width = GridWidth::new(record.grid_width).ok_or_else(|| SchemaError::GridWidth {
            field: record.name.clone(),
            width: record.grid_width,
        })?;

        let options = if record.field_type == FieldType::Checkbox
            || record.field_type.requires_options()
        {
            record.options.unwrap_or_default()
        } else {
            Vec::new()
        };

        let field = Field {
            id: record.id,
            section_id: record.section_id,
            name: record.name,
            label: record.label,
            placeholder: record.placeholder,
            kind: FieldKind::from_parts(record.field_type, options),
            required: record.is_required,
            grid_width,
            order: record.order,
            rules: record.validation_rules.unwrap_or_default(),
        };
        field.check()?;
        Ok(field)
    }
}

impl From<&Field> for FieldRecord {
    fn from(field: &Field) -> Self {
        let options = match &field.kind {
            FieldKind::Select { options }
            | FieldKind::Radio { options }
            | FieldKind::Checkbox { options }
            | FieldKind::CheckboxGroup { options } => Some(options.clone()),
            _ => None,
        };

        FieldRecord {
            id: field.id,
            section_id: field.section_id,
            field_type: field.field_type(),
            label: field.label.clone(),
            name: field.name.clone(),
            placeholder: field.placeholder.clone(),
            options,
            is_required: field.required,
            grid_width: field.grid_width.get(),
            order: field.order,
            validation_rules: (!field.rules.is_empty()).then(|| field.rules.clone()),
        }
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FieldRecord::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = FieldRecord::deserialize(deserializer)?;
        Field::try_from(record).map_err(serde::de::Error::custom)
    }
}

/// One step of a multi-step form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub id: SectionId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Section {
    pub fn new(id: u64, title: impl Into<String>, order: i32) -> Self {
        Self {
            id: SectionId(id),
            title: title.into(),
            description: None,
            order,
            fields: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }
}

/// Opening, closing and late-fee deadlines. Unset bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationWindow {
    #[serde(default)]
    pub opens_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub closes_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub late_fee_closes_at: Option<NaiveDateTime>,
}

impl ActivationWindow {
    /// Last instant at which submissions are accepted, late fee included.
    pub fn final_deadline(&self) -> Option<NaiveDateTime> {
        self.late_fee_closes_at.or(self.closes_at)
    }

    pub fn is_open_at(&self, now: NaiveDateTime) -> bool {
        let opened = self.opens_at.map_or(true, |opens| opens <= now);
        let not_closed = self.final_deadline().map_or(true, |deadline| now <= deadline);
        opened && not_closed
    }

    /// Open, but past the regular closing date.
    pub fn is_late_at(&self, now: NaiveDateTime) -> bool {
        match (self.closes_at, self.late_fee_closes_at) {
            (Some(closes), Some(late)) => closes < now && now <= late,
            _ => false,
        }
    }
}

/// A named admission form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    #[serde(default)]
    pub id: FormId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub short_code: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub window: ActivationWindow,
    #[serde(default)]
    pub sections: Vec<Section>,
}

fn default_active() -> bool {
    true
}

impl Form {
    pub fn new(id: u64, short_code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: FormId(id),
            title: title.into(),
            description: None,
            short_code: short_code.into(),
            is_active: true,
            window: ActivationWindow::default(),
            sections: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }
}

/// Errors raised when a form definition breaks a structural invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("form short code must not be empty")]
    EmptyShortCode,
    #[error("form '{short_code}' has no sections")]
    NoSections { short_code: String },
    #[error("two sections share display order {order}")]
    DuplicateSectionOrder { order: i32 },
    #[error("section '{section}' has two fields with display order {order}")]
    DuplicateFieldOrder { section: String, order: i32 },
    #[error("field name '{name}' is used more than once")]
    DuplicateFieldName { name: String },
    #[error("field '{label}' has an empty name")]
    EmptyFieldName { label: String },
    #[error("{field_type} field '{field}' must declare at least one option")]
    MissingOptions { field: String, field_type: FieldType },
    #[error("field '{field}' grid width {width} is outside 1-12")]
    GridWidth { field: String, width: u8 },
    #[error("field '{field}' rule '{rule}' is invalid: {reason}")]
    InvalidRule {
        field: String,
        rule: String,
        reason: String,
    },
}

/// A form whose sections and fields are sorted and whose invariants hold.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSchema {
    form: Form,
}

impl FormSchema {
    pub fn new(mut form: Form) -> Result<Self, SchemaError> {
        if form.short_code.trim().is_empty() {
            return Err(SchemaError::EmptyShortCode);
        }
        if form.sections.is_empty() {
            return Err(SchemaError::NoSections {
                short_code: form.short_code,
            });
        }

        form.sections
            .sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
        if let Some(pair) = form
            .sections
            .windows(2)
            .find(|pair| pair[0].order == pair[1].order)
        {
            return Err(SchemaError::DuplicateSectionOrder {
                order: pair[0].order,
            });
        }

        let mut names = HashSet::new();
        for section in &mut form.sections {
            section
                .fields
                .sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
            if let Some(pair) = section
                .fields
                .windows(2)
                .find(|pair| pair[0].order == pair[1].order)
            {
                return Err(SchemaError::DuplicateFieldOrder {
                    section: section.title.clone(),
                    order: pair[0].order,
                });
            }

            for field in &mut section.fields {
                field.check()?;
                if !names.insert(field.name.clone()) {
                    return Err(SchemaError::DuplicateFieldName {
                        name: field.name.clone(),
                    });
                }
                field.section_id = section.id;
            }
        }

        Ok(Self { form })
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn id(&self) -> FormId {
        self.form.id
    }

    pub fn short_code(&self) -> &str {
        &self.form.short_code
    }

    pub fn title(&self) -> &str {
        &self.form.title
    }

    pub fn sections(&self) -> &[Section] {
        &self.form.sections
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.form.sections.get(index)
    }

    pub fn section_count(&self) -> usize {
        self.form.sections.len()
    }

    pub fn last_section_index(&self) -> usize {
        self.form.sections.len().saturating_sub(1)
    }

    /// All fields in step order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.form
            .sections
            .iter()
            .flat_map(|section| section.fields.iter())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().find(|field| field.name == name)
    }

    /// Index of the section owning `name`.
    pub fn section_of(&self, name: &str) -> Option<usize> {
        self.form
            .sections
            .iter()
            .position(|section| section.fields.iter().any(|field| field.name == name))
    }

    pub fn into_form(self) -> Form {
        self.form
    }
}

impl TryFrom<Form> for FormSchema {
    type Error = SchemaError;

    fn try_from(form: Form) -> Result<Self, Self::Error> {
        Self::new(form)
    }
}

impl Serialize for FormSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.form.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FormSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let form = Form::deserialize(deserializer)?;
        FormSchema::new(form).map_err(serde::de::Error::custom)
    }
}
