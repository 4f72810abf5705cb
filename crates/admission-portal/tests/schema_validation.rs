//! Properties of schema-driven validation that both the wizard and the submission service
//! rely on: required handling, section isolation, and rule evaluation.

mod common {
    use admission_portal::forms::seed::nursing_admission_2026;
    use admission_portal::forms::{Field, FieldKind, Form, FormSchema, RuleSet, Section};

    pub(super) fn nursing() -> FormSchema {
        FormSchema::new(nursing_admission_2026()).expect("nursing form is valid")
    }

    pub(super) fn enquiry() -> FormSchema {
        let form = Form::new(5, "enquiry", "Enquiry")
            .section(
                Section::new(2, "Preferences", 2).field(
                    Field::new(
                        "courses",
                        "Courses",
                        FieldKind::Checkbox {
                            options: vec!["BSc".to_string(), "GNM".to_string(), "ANM".to_string()],
                        },
                    )
                    .required(),
                ),
            )
            .section(
                Section::new(1, "Applicant", 1)
                    .field(
                        Field::new("guardian", "Guardian Name", FieldKind::Text)
                            .ordered(2)
                            .rules(RuleSet::new().with("min_length", 3)),
                    )
                    .field(
                        Field::new("full_name", "Full Name", FieldKind::Text)
                            .required()
                            .ordered(1)
                            .rules(RuleSet::new().with("max_length", 255)),
                    ),
            );
        FormSchema::new(form).expect("enquiry form is valid")
    }
}

use admission_portal::forms::{
    AnswerSet, AnswerValue, Field, FieldKind, Form, FormSchema, RuleContext, RuleRegistry,
    RuleSet, SchemaValidator, Section, ValidationErrors, ValidationScope,
};
use common::*;

fn errors_of(result: Result<(), ValidationErrors>) -> ValidationErrors {
    result.err().unwrap_or_default()
}

#[test]
fn steps_follow_display_order() {
    let schema = enquiry();
    let titles: Vec<_> = schema.sections().iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, ["Applicant", "Preferences"]);
    let fields: Vec<_> = schema.fields().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, ["full_name", "guardian", "courses"]);
}

#[test]
fn empty_required_answers_report_exactly_one_error() {
    let schema = enquiry();
    let validator = SchemaValidator::default();

    for empty in [
        AnswerValue::text(""),
        AnswerValue::text("   "),
        AnswerValue::Null,
        AnswerValue::List(Vec::new()),
    ] {
        let answers = AnswerSet::new().with("full_name", empty.clone());
        let errors = errors_of(validator.validate_section(&schema, &answers, 0));
        assert_eq!(
            errors.get("full_name"),
            Some(&["Full Name is required.".to_string()][..]),
            "value {empty:?}"
        );
        assert!(!errors.contains("guardian"));
    }
}

#[test]
fn optional_fields_skip_rules_when_blank() {
    let schema = enquiry();
    let validator = SchemaValidator::default();
    let answers = AnswerSet::new()
        .with("full_name", "Jane Doe")
        .with("guardian", "");
    assert!(validator.validate_section(&schema, &answers, 0).is_ok());

    let answers = answers.with("guardian", "Al");
    let errors = errors_of(validator.validate_section(&schema, &answers, 0));
    assert_eq!(
        errors.first("guardian"),
        Some("Guardian Name must be at least 3 characters.")
    );
}

#[test]
fn full_name_longer_than_limit_is_rejected() {
    let schema = nursing();
    let validator = SchemaValidator::default();
    let answers = AnswerSet::new().with("full_name", "x".repeat(256));

    let errors = errors_of(validator.validate_section(&schema, &answers, 0));
    assert_eq!(
        errors.first("full_name"),
        Some("Full Name may not be greater than 255 characters.")
    );

    let answers = AnswerSet::new().with("full_name", "x".repeat(255));
    let errors = errors_of(validator.validate_section(&schema, &answers, 0));
    assert!(!errors.contains("full_name"));
}

#[test]
fn section_scope_never_reports_other_sections() {
    let schema = nursing();
    let validator = SchemaValidator::default();
    let answers = AnswerSet::new();

    for index in 0..schema.section_count() {
        let section = schema.section(index).expect("section exists");
        let errors = errors_of(validator.validate_section(&schema, &answers, index));
        assert!(!errors.is_empty());
        for name in errors.fields() {
            assert!(
                section.field_names().any(|field| field == name),
                "{name} reported for step {index}"
            );
        }
    }
}

#[test]
fn form_scope_is_union_of_sections() {
    let schema = nursing();
    let validator = SchemaValidator::default();
    let answers = AnswerSet::new()
        .with("full_name", "Jane Doe")
        .with("gender", "Unknown")
        .with("email", "jane@")
        .with("phone", "12345")
        .with("hs_percentage", "140")
        .with("terms", false);

    let mut union = ValidationErrors::new();
    for index in 0..schema.section_count() {
        union.merge(errors_of(validator.validate_section(&schema, &answers, index)));
    }
    let whole = errors_of(validator.validate(&schema, &answers, ValidationScope::Form));

    assert_eq!(whole, union);
    assert_eq!(
        whole.first("terms"),
        Some("I declare that the information provided is true. must be accepted.")
    );
    assert_eq!(whole.first("gender"), Some("The selected Gender is invalid."));
}

#[test]
fn out_of_range_section_passes() {
    let schema = nursing();
    let validator = SchemaValidator::default();
    assert!(validator
        .validate_section(&schema, &AnswerSet::new(), schema.section_count())
        .is_ok());
}

#[test]
fn checkbox_answers_must_be_subsets_of_options() {
    let schema = enquiry();
    let validator = SchemaValidator::default();

    let answers = AnswerSet::new().with("courses", AnswerValue::list(["GNM", "BSc"]));
    assert!(validator.validate_section(&schema, &answers, 1).is_ok());

    let answers = AnswerSet::new().with("courses", AnswerValue::list(["GNM", "MBBS"]));
    let errors = errors_of(validator.validate_section(&schema, &answers, 1));
    assert_eq!(
        errors.first("courses"),
        Some("The selected Courses option 'MBBS' is invalid.")
    );
}

fn no_spaces(ctx: &RuleContext<'_>) -> Result<(), String> {
    match ctx.value.as_text() {
        Some(text) if text.contains(' ') => {
            Err(format!("{} may not contain spaces.", ctx.field.label))
        }
        _ => Ok(()),
    }
}

#[test]
fn registered_rules_extend_the_standard_set() {
    let mut registry = RuleRegistry::standard();
    registry.register("no_spaces", no_spaces);
    let validator = SchemaValidator::new(registry);

    let form = Form::new(8, "handle", "Handle").section(
        Section::new(1, "Handle", 1).field(
            Field::new("handle", "Handle", FieldKind::Text)
                .required()
                .rules(RuleSet::new().with("no_spaces", true).with("max_length", 20)),
        ),
    );
    let schema = FormSchema::new(form).expect("valid form");

    let answers = AnswerSet::new().with("handle", "jane doe");
    let errors = errors_of(validator.validate_form(&schema, &answers));
    assert_eq!(errors.first("handle"), Some("Handle may not contain spaces."));

    let unknown_rule_only = SchemaValidator::new(RuleRegistry::empty());
    assert!(unknown_rule_only.validate_form(&schema, &answers).is_ok());
}
