use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of value a placeholder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderKind {
    Text,
    Date,
    Number,
}

impl PlaceholderKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Date => "date",
            Self::Number => "number",
        }
    }

    fn check(self, value: &str) -> Result<(), String> {
        match self {
            Self::Text => Ok(()),
            Self::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|_| ())
                .map_err(|_| format!("'{value}' is not a YYYY-MM-DD date")),
            Self::Number => value
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .map(|_| ())
                .ok_or_else(|| format!("'{value}' is not a number")),
        }
    }
}

/// Tab a signer fills in at an anchor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabKind {
    Signature,
    Date,
    Text,
    Checkbox,
    Radio,
}

impl TabKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::Date => "date",
            Self::Text => "text",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
        }
    }
}

/// A `{{VAR:NAME}}` field the requester fills in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,
    pub label: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub kind: PlaceholderKind,
}

/// A `{{DS:NAME}}` position where the signing platform places a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub name: String,
    pub label: String,
    pub tab_type: TabKind,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidValue {
    pub name: String,
    pub reason: String,
}

/// Outcome of checking markers; names keep declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarkerValidation {
    pub missing: Vec<String>,
    pub invalid: Vec<InvalidValue>,
}

impl MarkerValidation {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

pub fn placeholder_token(name: &str) -> String {
    format!("{{{{VAR:{name}}}}}")
}

pub fn anchor_token(name: &str) -> String {
    format!("{{{{DS:{name}}}}}")
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{VAR:([A-Z_]+)\}\}").expect("placeholder regex"))
}

fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{DS:([A-Z_]+)\}\}").expect("anchor regex"))
}

fn unique_captures(pattern: &Regex, text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for captures in pattern.captures_iter(text) {
        let name = &captures[1];
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Placeholder names in order of first appearance.
pub fn extract_placeholders(text: &str) -> Vec<String> {
    unique_captures(placeholder_pattern(), text)
}

/// Anchor names in order of first appearance.
pub fn extract_anchors(text: &str) -> Vec<String> {
    unique_captures(anchor_pattern(), text)
}

/// Substitutes every supplied value; tokens without a value are left as-is.
pub fn replace_placeholders(text: &str, values: &BTreeMap<String, String>) -> String {
    let mut result = text.to_string();
    for (name, value) in values {
        let token = placeholder_token(name);
        if result.contains(&token) {
            result = result.replace(&token, value);
        }
    }
    result
}

/// Placeholders still present in the text, e.g. optional fields left empty.
pub fn unfilled_placeholders(text: &str) -> Vec<String> {
    extract_placeholders(text)
}

/// True when `value` holds a marker opening, complete or not.
fn contains_marker(value: &str) -> bool {
    value.contains("{{VAR:") || value.contains("{{DS:")
}

/// Checks required values, value types, and that no value smuggles in markers.
pub fn validate_placeholders(
    placeholders: &[Placeholder],
    values: &BTreeMap<String, String>,
) -> MarkerValidation {
    let mut validation = MarkerValidation::default();

    for placeholder in placeholders {
        let value = values
            .get(&placeholder.name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty());

        match value {
            None if placeholder.required => validation.missing.push(placeholder.name.clone()),
            None => {}
            Some(value) if contains_marker(value) => validation.invalid.push(InvalidValue {
                name: placeholder.name.clone(),
                reason: "values cannot contain {{VAR:...}} or {{DS:...}} markers".to_string(),
            }),
            Some(value) => {
                if let Err(reason) = placeholder.kind.check(value) {
                    validation.invalid.push(InvalidValue {
                        name: placeholder.name.clone(),
                        reason,
                    });
                }
            }
        }
    }

    validation
}

pub fn validate_anchors(anchors: &[Anchor], text: &str) -> MarkerValidation {
    let missing = anchors
        .iter()
        .filter(|anchor| anchor.required && !text.contains(&anchor_token(&anchor.name)))
        .map(|anchor| anchor.name.clone())
        .collect();

    MarkerValidation {
        missing,
        invalid: Vec::new(),
    }
}
