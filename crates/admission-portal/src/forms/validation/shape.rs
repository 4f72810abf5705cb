use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::forms::answers::AnswerValue;
use crate::forms::schema::{Field, FieldKind};

pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// `YYYY-MM-DD`, RFC 3339, or a `datetime-local` input value.
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|stamp| stamp.date())
}

pub(crate) fn parse_toggle(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn is_email(raw: &str) -> bool {
    let raw = raw.trim();
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || raw.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

fn chosen_items(value: &AnswerValue) -> Option<Vec<String>> {
    match value {
        AnswerValue::List(items) => Some(items.clone()),
        AnswerValue::Text(text) => Some(vec![text.clone()]),
        _ => None,
    }
}

/// Checks that an answer has the shape implied by the field type. Runs before any
/// declarative rule so rules can assume well-formed input.
pub(crate) fn check_shape(field: &Field, value: &AnswerValue) -> Result<(), String> {
    let label = &field.label;
    match &field.kind {
        FieldKind::Text | FieldKind::Textarea => match value {
            AnswerValue::Text(_) | AnswerValue::Number(_) => Ok(()),
            _ => Err(format!("{label} must be a string.")),
        },
        FieldKind::Number => {
            let numeric = match value {
                AnswerValue::Number(number) => number.is_finite(),
                AnswerValue::Text(text) => parse_number(text).is_some(),
                _ => false,
            };
            if numeric {
                Ok(())
            } else {
                Err(format!("{label} must be a number."))
            }
        }
        FieldKind::Email => match value {
            AnswerValue::Text(text) if is_email(text) => Ok(()),
            _ => Err(format!("{label} must be a valid email address.")),
        },
        FieldKind::Date => match value {
            AnswerValue::Text(text) if parse_date(text).is_some() => Ok(()),
            _ => Err(format!("{label} is not a valid date.")),
        },
        FieldKind::Select { options } | FieldKind::Radio { options } => match value {
            AnswerValue::Text(text) if options.iter().any(|option| option == text) => Ok(()),
            AnswerValue::Number(_) | AnswerValue::Bool(_) => value
                .as_text()
                .filter(|text| options.contains(text))
                .map(|_| ())
                .ok_or_else(|| format!("The selected {label} is invalid.")),
            _ => Err(format!("The selected {label} is invalid.")),
        },
        FieldKind::Checkbox { options } if options.is_empty() => {
            let toggle = match value {
                AnswerValue::Bool(_) => true,
                AnswerValue::Text(text) => parse_toggle(text).is_some(),
                AnswerValue::Number(number) => *number == 0.0 || *number == 1.0,
                _ => false,
            };
            if toggle {
                Ok(())
            } else {
                Err(format!("{label} must be true or false."))
            }
        }
        FieldKind::Checkbox { options } | FieldKind::CheckboxGroup { options } => {
            let Some(items) = chosen_items(value) else {
                return Err(format!("{label} must be a list of options."));
            };
            match items.iter().find(|item| !options.contains(item)) {
                Some(invalid) => Err(format!("The selected {label} option '{invalid}' is invalid.")),
                None => Ok(()),
            }
        }
        FieldKind::File => match value {
            AnswerValue::File(_) => Ok(()),
            _ => Err(format!("{label} must be a file.")),
        },
    }
}
