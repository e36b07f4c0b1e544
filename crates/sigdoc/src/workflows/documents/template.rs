use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::markers::{
    extract_placeholders, replace_placeholders, unfilled_placeholders, validate_anchors,
    validate_placeholders, Anchor, MarkerValidation, Placeholder, TabKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub String);

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recipient role on the envelope, e.g. "Contractor" signing first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRole {
    pub role_name: String,
    pub signing_order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl SigningRole {
    pub fn new(role_name: &str, signing_order: u32) -> Self {
        Self {
            role_name: role_name.to_string(),
            signing_order,
            email: None,
        }
    }
}

/// Assigns the tab at an anchor to one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabMapping {
    pub anchor_name: String,
    pub role_name: String,
    pub tab_type: TabKind,
}

impl TabMapping {
    pub fn new(anchor_name: &str, role_name: &str, tab_type: TabKind) -> Self {
        Self {
            anchor_name: anchor_name.to_string(),
            role_name: role_name.to_string(),
            tab_type,
        }
    }
}

/// Reusable document definition. `body` is the document text with markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTemplate {
    pub id: TemplateId,
    pub name: String,
    pub category: String,
    pub body: String,
    pub placeholders: Vec<Placeholder>,
    pub anchors: Vec<Anchor>,
    pub default_roles: Vec<SigningRole>,
    pub default_tab_map: Vec<TabMapping>,
    #[serde(default)]
    pub archived: bool,
}

impl DocumentTemplate {
    pub fn placeholder(&self, name: &str) -> Option<&Placeholder> {
        self.placeholders.iter().find(|p| p.name == name)
    }

    /// Checks the declared markers and defaults against the body text.
    pub fn check(&self) -> Result<(), TemplateError> {
        let undeclared: Vec<String> = extract_placeholders(&self.body)
            .into_iter()
            .filter(|name| self.placeholder(name).is_none())
            .collect();
        if !undeclared.is_empty() {
            return Err(TemplateError::UndeclaredPlaceholders(undeclared));
        }

        let anchors = validate_anchors(&self.anchors, &self.body);
        if !anchors.missing.is_empty() {
            return Err(TemplateError::MissingAnchors(anchors.missing));
        }

        check_assignments(
            &self.default_roles,
            &self.default_tab_map,
            Some(&self.anchors),
        )?;

        Ok(())
    }

    /// Validates the submitted values and returns the filled body text.
    pub fn fill(&self, values: &BTreeMap<String, String>) -> Result<FilledDocument, TemplateError> {
        let validation = validate_placeholders(&self.placeholders, values);
        if !validation.is_valid() {
            return Err(TemplateError::InvalidValues(validation));
        }

        let text = replace_placeholders(&self.body, values);
        let anchors = validate_anchors(&self.anchors, &text);
        if !anchors.missing.is_empty() {
            return Err(TemplateError::MissingAnchors(anchors.missing));
        }

        let unfilled = unfilled_placeholders(&text);
        Ok(FilledDocument { text, unfilled })
    }
}

/// Template text after substitution. `unfilled` lists optional
/// placeholders that received no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledDocument {
    pub text: String,
    pub unfilled: Vec<String>,
}

/// Checks that roles and tab mappings describe a usable signer set.
pub fn check_assignments(
    roles: &[SigningRole],
    tab_map: &[TabMapping],
    anchors: Option<&[Anchor]>,
) -> Result<(), TemplateError> {
    if roles.is_empty() {
        return Err(TemplateError::NoRoles);
    }

    let mut seen = HashSet::new();
    for role in roles {
        if role.role_name.trim().is_empty() {
            return Err(TemplateError::BlankRoleName);
        }
        if role.signing_order == 0 {
            return Err(TemplateError::InvalidSigningOrder(role.role_name.clone()));
        }
        if !seen.insert(role.role_name.as_str()) {
            return Err(TemplateError::DuplicateRole(role.role_name.clone()));
        }
    }

    for mapping in tab_map {
        if !seen.contains(mapping.role_name.as_str()) {
            return Err(TemplateError::UnknownRole {
                anchor: mapping.anchor_name.clone(),
                role: mapping.role_name.clone(),
            });
        }
        if let Some(anchors) = anchors {
            if !anchors.iter().any(|a| a.name == mapping.anchor_name) {
                return Err(TemplateError::UnknownAnchor(mapping.anchor_name.clone()));
            }
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template '{0}' already exists")]
    Duplicate(TemplateId),
    #[error("template '{0}' not found")]
    NotFound(TemplateId),
    #[error("template '{0}' is archived")]
    Archived(TemplateId),
    #[error("body uses undeclared placeholders: {}", .0.join(", "))]
    UndeclaredPlaceholders(Vec<String>),
    #[error("required anchors missing from document: {}", .0.join(", "))]
    MissingAnchors(Vec<String>),
    #[error("{}", describe_values(.0))]
    InvalidValues(MarkerValidation),
    #[error("at least one signing role is required")]
    NoRoles,
    #[error("role names cannot be blank")]
    BlankRoleName,
    #[error("role '{0}' must have a signing order of 1 or more")]
    InvalidSigningOrder(String),
    #[error("role '{0}' is listed more than once")]
    DuplicateRole(String),
    #[error("tab for anchor '{anchor}' is assigned to unknown role '{role}'")]
    UnknownRole { anchor: String, role: String },
    #[error("tab mapping references undeclared anchor '{0}'")]
    UnknownAnchor(String),
}

fn describe_values(validation: &MarkerValidation) -> String {
    let mut parts = Vec::new();
    if !validation.missing.is_empty() {
        parts.push(format!(
            "missing required fields: {}",
            validation.missing.join(", ")
        ));
    }
    for invalid in &validation.invalid {
        parts.push(format!("{}: {}", invalid.name, invalid.reason));
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::documents::markers::PlaceholderKind;

    fn template() -> DocumentTemplate {
        DocumentTemplate {
            id: TemplateId("test-1".to_string()),
            name: "Test".to_string(),
            category: "Testing".to_string(),
            body: "Hello {{VAR:NAME}} {{VAR:NICKNAME}}\nSign: {{DS:SIGNATURE}}".to_string(),
            placeholders: vec![
                Placeholder {
                    name: "NAME".to_string(),
                    label: "Name".to_string(),
                    required: true,
                    kind: PlaceholderKind::Text,
                },
                Placeholder {
                    name: "NICKNAME".to_string(),
                    label: "Nickname".to_string(),
                    required: false,
                    kind: PlaceholderKind::Text,
                },
            ],
            anchors: vec![Anchor {
                name: "SIGNATURE".to_string(),
                label: "Signature".to_string(),
                tab_type: TabKind::Signature,
                required: true,
            }],
            default_roles: vec![SigningRole::new("Signer", 1)],
            default_tab_map: vec![TabMapping::new("SIGNATURE", "Signer", TabKind::Signature)],
            archived: false,
        }
    }

    #[test]
    fn well_formed_template_passes_check() {
        template().check().expect("template is consistent");
    }

    #[test]
    fn check_flags_undeclared_placeholders() {
        let mut template = template();
        template.body.push_str(" {{VAR:SURPRISE}}");
        let err = template.check().expect_err("undeclared placeholder");
        assert!(matches!(err, TemplateError::UndeclaredPlaceholders(ref names) if names == &["SURPRISE"]));
    }

    #[test]
    fn check_flags_missing_required_anchor() {
        let mut template = template();
        template.body = "Hello {{VAR:NAME}}".to_string();
        let err = template.check().expect_err("anchor missing");
        assert_eq!(
            err.to_string(),
            "required anchors missing from document: SIGNATURE"
        );
    }

    #[test]
    fn fill_reports_optional_gaps() {
        let values = BTreeMap::from([("NAME".to_string(), "Ada".to_string())]);
        let filled = template().fill(&values).expect("fills");
        assert!(filled.text.starts_with("Hello Ada {{VAR:NICKNAME}}"));
        assert!(filled.text.contains("{{DS:SIGNATURE}}"));
        assert_eq!(filled.unfilled, vec!["NICKNAME"]);
    }

    #[test]
    fn fill_rejects_missing_required_values() {
        let err = template().fill(&BTreeMap::new()).expect_err("name missing");
        assert_eq!(err.to_string(), "missing required fields: NAME");
    }

    #[test]
    fn fill_refuses_values_that_would_add_markers() {
        let values = BTreeMap::from([
            ("NAME".to_string(), "Ada {{DS:SIGNATURE}}".to_string()),
            ("NICKNAME".to_string(), "{{VAR:NAME}}".to_string()),
        ]);
        match template().fill(&values) {
            Err(TemplateError::InvalidValues(validation)) => {
                let names: Vec<&str> =
                    validation.invalid.iter().map(|v| v.name.as_str()).collect();
                assert_eq!(names, vec!["NAME", "NICKNAME"]);
            }
            other => panic!("expected invalid values, got {other:?}"),
        }
    }

    #[test]
    fn assignments_require_known_roles_and_anchors() {
        let roles = vec![SigningRole::new("Contractor", 1), SigningRole::new("CCOO", 2)];
        let anchors = template().anchors;

        let unknown_role = vec![TabMapping::new("SIGNATURE", "Admin", TabKind::Signature)];
        assert!(matches!(
            check_assignments(&roles, &unknown_role, Some(&anchors)),
            Err(TemplateError::UnknownRole { .. })
        ));

        let unknown_anchor = vec![TabMapping::new("ELSEWHERE", "CCOO", TabKind::Date)];
        assert!(matches!(
            check_assignments(&roles, &unknown_anchor, Some(&anchors)),
            Err(TemplateError::UnknownAnchor(_))
        ));
        assert!(check_assignments(&roles, &unknown_anchor, None).is_ok());
    }

    #[test]
    fn assignments_reject_bad_role_sets() {
        assert!(matches!(
            check_assignments(&[], &[], None),
            Err(TemplateError::NoRoles)
        ));
        let duplicate = vec![SigningRole::new("A", 1), SigningRole::new("A", 2)];
        assert!(matches!(
            check_assignments(&duplicate, &[], None),
            Err(TemplateError::DuplicateRole(_))
        ));
        let zero = vec![SigningRole::new("A", 0)];
        assert!(matches!(
            check_assignments(&zero, &[], None),
            Err(TemplateError::InvalidSigningOrder(_))
        ));
    }

    #[test]
    fn roles_use_camel_case_on_the_wire() {
        let json = r#"{"roleName":"Contractor","signingOrder":2}"#;
        let role: SigningRole = serde_json::from_str(json).expect("parses");
        assert_eq!(role, SigningRole::new("Contractor", 2));

        let mapping: TabMapping = serde_json::from_str(
            r#"{"anchorName":"DATE_SIGNED","roleName":"CCOO","tabType":"date"}"#,
        )
        .expect("parses");
        assert_eq!(mapping.tab_type, TabKind::Date);
    }
}
