use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::shape::{is_email, parse_date, parse_number};
use crate::forms::answers::{format_number, AnswerSet, AnswerValue, FileReference};
use crate::forms::schema::{Field, FieldKind};

/// Declarative constraints attached to a field: constraint name mapped to its parameter.
///
/// Deserializes from either an object (`{"max_length": 255}`) or a list of `name:param`
/// strings (`["max:2048", "mimes:jpg,png"]`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: BTreeMap<String, Value>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, param: impl Into<Value>) -> Self {
        self.insert(name, param);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, param: impl Into<Value>) -> Option<Value> {
        self.rules.insert(name.into(), param.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.rules.iter().map(|(name, param)| (name.as_str(), param))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse a single `name:param` entry.
    pub fn parse_entry(entry: &str) -> Option<(String, Value)> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        match entry.split_once(':') {
            Some((name, param)) => Some((name.trim().to_string(), Value::String(param.to_string()))),
            None => Some((entry.to_string(), Value::Bool(true))),
        }
    }

    /// Verify parameters of the standard rules so authoring mistakes surface when the
    /// schema is built rather than while an applicant is typing.
    pub(crate) fn check(&self) -> Result<(), (String, String)> {
        for (name, param) in &self.rules {
            let problem = match name.as_str() {
                "min" | "max" | "min_length" | "max_length" | "digits" => param_number(param)
                    .is_none()
                    .then(|| "expected a number".to_string()),
                "between" => param_pair(param)
                    .is_none()
                    .then(|| "expected two numbers".to_string()),
                "regex" => match param_text(param) {
                    Some(pattern) => compile_pattern(&pattern).err(),
                    None => Some("expected a pattern".to_string()),
                },
                "in" | "mimes" | "mimetypes" => param_list(param)
                    .is_empty()
                    .then(|| "expected at least one value".to_string()),
                "same" | "after" | "before" => param_text(param)
                    .is_none()
                    .then(|| "expected a field name or date".to_string()),
                _ => None,
            };
            if let Some(reason) = problem {
                return Err((name.clone(), reason));
            }
        }
        Ok(())
    }
}

impl Serialize for RuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rules.serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleSetRepr {
    Map(BTreeMap<String, Value>),
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rules: BTreeMap<String, Value> = match RuleSetRepr::deserialize(deserializer)? {
            RuleSetRepr::Map(rules) => rules,
            RuleSetRepr::List(entries) => entries
                .iter()
                .filter_map(|entry| RuleSet::parse_entry(entry))
                .collect(),
        };
        Ok(Self { rules })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RuleSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            rules: iter
                .into_iter()
                .map(|(name, param)| (name.into(), param.into()))
                .collect(),
        }
    }
}

/// Inputs handed to a rule predicate.
pub struct RuleContext<'a> {
    pub field: &'a Field,
    pub value: &'a AnswerValue,
    pub param: &'a Value,
    pub answers: &'a AnswerSet,
}

/// A rule returns the human-readable message on failure.
pub type RulePredicate = fn(&RuleContext<'_>) -> Result<(), String>;

/// Name → predicate lookup used to interpret [`RuleSet`] entries.
#[derive(Clone)]
pub struct RuleRegistry {
    rules: HashMap<String, RulePredicate>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register("min", min_rule)
            .register("max", max_rule)
            .register("between", between_rule)
            .register("min_length", min_length_rule)
            .register("max_length", max_length_rule)
            .register("regex", regex_rule)
            .register("digits", digits_rule)
            .register("in", in_rule)
            .register("mimes", mimes_rule)
            .register("mimetypes", mimetypes_rule)
            .register("accepted", accepted_rule)
            .register("same", same_rule)
            .register("after", after_rule)
            .register("before", before_rule)
            .register("numeric", numeric_rule)
            .register("integer", integer_rule)
            .register("email", email_rule)
            .register("date", date_rule)
            .register("file", file_rule)
            .register("image", image_rule);

        for marker in ["nullable", "required", "sometimes", "string"] {
            registry.register(marker, marker_rule);
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, predicate: RulePredicate) -> &mut Self {
        self.rules.insert(name.into(), predicate);
        self
    }

    pub fn get(&self, name: &str) -> Option<RulePredicate> {
        self.rules.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.names())
            .finish()
    }
}

pub(crate) fn param_number(param: &Value) -> Option<f64> {
    match param {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn param_text(param: &Value) -> Option<String> {
    match param {
        Value::String(raw) if !raw.trim().is_empty() => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Array of strings, or a comma separated string.
pub(crate) fn param_list(param: &Value) -> Vec<String> {
    match param {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(raw) => Some(raw.trim().to_string()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .filter(|item| !item.is_empty())
            .collect(),
        Value::String(raw) => raw
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn param_pair(param: &Value) -> Option<(f64, f64)> {
    match param {
        Value::Array(items) if items.len() == 2 => {
            Some((param_number(&items[0])?, param_number(&items[1])?))
        }
        Value::String(raw) => {
            let (low, high) = raw.split_once(',')?;
            Some((low.trim().parse().ok()?, high.trim().parse().ok()?))
        }
        _ => None,
    }
}

/// Accepts bare patterns and `/pattern/flags` literals; only the `i` flag is honoured.
fn compile_pattern(raw: &str) -> Result<Regex, String> {
    let raw = raw.trim();
    let (pattern, case_insensitive) = match raw.strip_prefix('/').and_then(|rest| {
        let end = rest.rfind('/')?;
        Some((&rest[..end], rest[end + 1..].contains('i')))
    }) {
        Some(parts) => parts,
        None => (raw, false),
    };

    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|err| err.to_string())
}

static PATTERN_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// Compiled form of a `regex` rule parameter, built once per distinct pattern.
fn cached_pattern(raw: &str) -> Result<Regex, String> {
    let cache = PATTERN_CACHE.get_or_init(Default::default);
    if let Some(regex) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(raw)
    {
        return Ok(regex.clone());
    }

    let regex = compile_pattern(raw)?;
    cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(raw.to_string(), regex.clone());
    Ok(regex)
}

enum Measure {
    Number(f64),
    Kilobytes(f64),
    Items(usize),
    Characters(usize),
}

impl Measure {
    fn of(field: &Field, value: &AnswerValue) -> Option<Self> {
        match value {
            AnswerValue::File(file) => Some(Self::Kilobytes(file.size_bytes as f64 / 1024.0)),
            AnswerValue::List(items) => Some(Self::Items(items.len())),
            AnswerValue::Number(number) => Some(Self::Number(*number)),
            AnswerValue::Text(text) if matches!(field.kind, FieldKind::Number) => {
                parse_number(text).map(Self::Number)
            }
            AnswerValue::Text(text) => Some(Self::Characters(text.chars().count())),
            AnswerValue::Bool(_) | AnswerValue::Null => None,
        }
    }

    fn amount(&self) -> f64 {
        match self {
            Self::Number(value) | Self::Kilobytes(value) => *value,
            Self::Items(count) | Self::Characters(count) => *count as f64,
        }
    }

    fn at_least(&self, label: &str, min: f64) -> String {
        let min = format_number(min);
        match self {
            Self::Number(_) => format!("{label} must be at least {min}."),
            Self::Kilobytes(_) => format!("{label} must be at least {min} kilobytes."),
            Self::Items(_) => format!("{label} must have at least {min} items."),
            Self::Characters(_) => format!("{label} must be at least {min} characters."),
        }
    }

    fn at_most(&self, label: &str, max: f64) -> String {
        let max = format_number(max);
        match self {
            Self::Number(_) => format!("{label} may not be greater than {max}."),
            Self::Kilobytes(_) => format!("{label} may not be greater than {max} kilobytes."),
            Self::Items(_) => format!("{label} may not have more than {max} items."),
            Self::Characters(_) => format!("{label} may not be greater than {max} characters."),
        }
    }
}

fn min_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let (Some(min), Some(measure)) = (param_number(ctx.param), Measure::of(ctx.field, ctx.value))
    else {
        return Ok(());
    };
    if measure.amount() < min {
        return Err(measure.at_least(&ctx.field.label, min));
    }
    Ok(())
}

fn max_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let (Some(max), Some(measure)) = (param_number(ctx.param), Measure::of(ctx.field, ctx.value))
    else {
        return Ok(());
    };
    if measure.amount() > max {
        return Err(measure.at_most(&ctx.field.label, max));
    }
    Ok(())
}

fn between_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let (Some((min, max)), Some(measure)) =
        (param_pair(ctx.param), Measure::of(ctx.field, ctx.value))
    else {
        return Ok(());
    };
    let amount = measure.amount();
    if amount < min {
        return Err(measure.at_least(&ctx.field.label, min));
    }
    if amount > max {
        return Err(measure.at_most(&ctx.field.label, max));
    }
    Ok(())
}

fn min_length_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let (Some(min), Some(text)) = (param_number(ctx.param), ctx.value.as_text()) else {
        return Ok(());
    };
    if (text.chars().count() as f64) < min {
        return Err(format!(
            "{} must be at least {} characters.",
            ctx.field.label,
            format_number(min)
        ));
    }
    Ok(())
}

fn max_length_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let (Some(max), Some(text)) = (param_number(ctx.param), ctx.value.as_text()) else {
        return Ok(());
    };
    if (text.chars().count() as f64) > max {
        return Err(format!(
            "{} may not be greater than {} characters.",
            ctx.field.label,
            format_number(max)
        ));
    }
    Ok(())
}

fn regex_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let (Some(pattern), Some(text)) = (param_text(ctx.param), ctx.value.as_text()) else {
        return Ok(());
    };
    let regex = match cached_pattern(&pattern) {
        Ok(regex) => regex,
        Err(reason) => {
            tracing::warn!(field = %ctx.field.name, %reason, "skipping unparseable regex rule");
            return Ok(());
        }
    };
    if !regex.is_match(&text) {
        return Err(format!("{} format is invalid.", ctx.field.label));
    }
    Ok(())
}

fn digits_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let (Some(count), Some(text)) = (param_number(ctx.param), ctx.value.as_text()) else {
        return Ok(());
    };
    let text = text.trim();
    if !text.chars().all(|c| c.is_ascii_digit()) || text.len() as f64 != count {
        return Err(format!(
            "{} must be {} digits.",
            ctx.field.label,
            format_number(count)
        ));
    }
    Ok(())
}

fn in_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let allowed = param_list(ctx.param);
    let chosen: Vec<String> = match ctx.value {
        AnswerValue::List(items) => items.clone(),
        other => other.as_text().into_iter().collect(),
    };
    if chosen.iter().any(|item| !allowed.contains(item)) {
        return Err(format!("The selected {} is invalid.", ctx.field.label));
    }
    Ok(())
}

fn extension_matches(allowed: &[String], extension: &str) -> bool {
    allowed.iter().any(|candidate| {
        let candidate = candidate.trim_start_matches('.').to_ascii_lowercase();
        candidate == extension
            || (candidate == "jpg" && extension == "jpeg")
            || (candidate == "jpeg" && extension == "jpg")
    })
}

fn mimes_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let Some(file) = ctx.value.as_file() else {
        return Ok(());
    };
    let allowed = param_list(ctx.param);
    let matches = file
        .extension()
        .map(|extension| extension_matches(&allowed, &extension))
        .unwrap_or(false);
    if !matches {
        return Err(format!(
            "{} must be a file of type: {}.",
            ctx.field.label,
            allowed.join(", ")
        ));
    }
    Ok(())
}

fn content_type_matches(file: &FileReference, allowed: &[String]) -> bool {
    let Some(actual) = file
        .content_type
        .as_deref()
        .and_then(|raw| raw.parse::<mime::Mime>().ok())
    else {
        return false;
    };

    allowed.iter().any(|candidate| {
        match candidate.parse::<mime::Mime>() {
            Ok(expected) if expected.subtype() == mime::STAR => expected.type_() == actual.type_(),
            Ok(expected) => expected.essence_str() == actual.essence_str(),
            Err(_) => false,
        }
    })
}

fn mimetypes_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let Some(file) = ctx.value.as_file() else {
        return Ok(());
    };
    let allowed = param_list(ctx.param);
    if !content_type_matches(file, &allowed) {
        return Err(format!(
            "{} must be a file of type: {}.",
            ctx.field.label,
            allowed.join(", ")
        ));
    }
    Ok(())
}

fn accepted_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let accepted = match ctx.value {
        AnswerValue::Bool(flag) => *flag,
        AnswerValue::Number(number) => *number == 1.0,
        AnswerValue::Text(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "yes" | "on" | "1" | "true"
        ),
        _ => false,
    };
    if !accepted {
        return Err(format!("{} must be accepted.", ctx.field.label));
    }
    Ok(())
}

fn same_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let Some(other) = param_text(ctx.param) else {
        return Ok(());
    };
    if ctx.answers.get(&other) != Some(ctx.value) {
        return Err(format!("{} must match {}.", ctx.field.label, other));
    }
    Ok(())
}

/// A literal date, or the date answered in the named field.
fn resolve_date(ctx: &RuleContext<'_>) -> Option<(NaiveDate, String)> {
    let reference = param_text(ctx.param)?;
    if let Some(date) = parse_date(&reference) {
        return Some((date, reference));
    }
    let other = ctx.answers.answered(&reference)?.as_text()?;
    parse_date(&other).map(|date| (date, reference))
}

fn after_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let (Some(value), Some((reference, shown))) = (
        ctx.value.as_text().and_then(|text| parse_date(&text)),
        resolve_date(ctx),
    ) else {
        return Ok(());
    };
    if value <= reference {
        return Err(format!("{} must be a date after {}.", ctx.field.label, shown));
    }
    Ok(())
}

fn before_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let (Some(value), Some((reference, shown))) = (
        ctx.value.as_text().and_then(|text| parse_date(&text)),
        resolve_date(ctx),
    ) else {
        return Ok(());
    };
    if value >= reference {
        return Err(format!(
            "{} must be a date before {}.",
            ctx.field.label, shown
        ));
    }
    Ok(())
}

fn numeric_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let numeric = match ctx.value {
        AnswerValue::Number(_) => true,
        AnswerValue::Text(text) => parse_number(text).is_some(),
        _ => false,
    };
    if !numeric {
        return Err(format!("{} must be a number.", ctx.field.label));
    }
    Ok(())
}

fn integer_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    let integer = match ctx.value {
        AnswerValue::Number(number) => number.fract() == 0.0,
        AnswerValue::Text(text) => text.trim().parse::<i64>().is_ok(),
        _ => false,
    };
    if !integer {
        return Err(format!("{} must be an integer.", ctx.field.label));
    }
    Ok(())
}

fn email_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    match ctx.value.as_text() {
        Some(text) if is_email(&text) => Ok(()),
        _ => Err(format!(
            "{} must be a valid email address.",
            ctx.field.label
        )),
    }
}

fn date_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    match ctx.value.as_text() {
        Some(text) if parse_date(&text).is_some() => Ok(()),
        _ => Err(format!("{} is not a valid date.", ctx.field.label)),
    }
}

fn file_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    match ctx.value {
        AnswerValue::File(_) => Ok(()),
        _ => Err(format!("{} must be a file.", ctx.field.label)),
    }
}

fn image_rule(ctx: &RuleContext<'_>) -> Result<(), String> {
    const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];
    let is_image = ctx.value.as_file().is_some_and(|file| {
        content_type_matches(file, &["image/*".to_string()])
            || file
                .extension()
                .is_some_and(|extension| IMAGE_EXTENSIONS.contains(&extension.as_str()))
    });
    if !is_image {
        return Err(format!("{} must be an image.", ctx.field.label));
    }
    Ok(())
}

fn marker_rule(_ctx: &RuleContext<'_>) -> Result<(), String> {
    Ok(())
}
