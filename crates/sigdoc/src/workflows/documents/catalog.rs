use super::markers::{Anchor, Placeholder, PlaceholderKind, TabKind};
use super::template::{DocumentTemplate, SigningRole, TabMapping, TemplateError, TemplateId};

/// In-memory set of document templates, kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<DocumentTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the organization's standard letters.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        for template in [
            letter_of_recommendation(),
            contractor_verification_letter(),
            contractor_end_of_agreement(),
        ] {
            catalog
                .register(template)
                .expect("standard templates are consistent");
        }
        catalog
    }

    pub fn register(&mut self, template: DocumentTemplate) -> Result<(), TemplateError> {
        if self.templates.iter().any(|t| t.id == template.id) {
            return Err(TemplateError::Duplicate(template.id));
        }
        template.check()?;
        self.templates.push(template);
        Ok(())
    }

    pub fn get(&self, id: &TemplateId) -> Option<&DocumentTemplate> {
        self.templates.iter().find(|t| &t.id == id)
    }

    /// Looks up a template that may still be used for new requests.
    pub fn active_template(&self, id: &TemplateId) -> Result<&DocumentTemplate, TemplateError> {
        let template = self
            .get(id)
            .ok_or_else(|| TemplateError::NotFound(id.clone()))?;
        if template.archived {
            return Err(TemplateError::Archived(id.clone()));
        }
        Ok(template)
    }

    pub fn active(&self) -> impl Iterator<Item = &DocumentTemplate> {
        self.templates.iter().filter(|t| !t.archived)
    }

    pub fn archive(&mut self, id: &TemplateId) -> Result<(), TemplateError> {
        let template = self
            .templates
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| TemplateError::NotFound(id.clone()))?;
        template.archived = true;
        Ok(())
    }
}

fn field(name: &str, label: &str, required: bool, kind: PlaceholderKind) -> Placeholder {
    Placeholder {
        name: name.to_string(),
        label: label.to_string(),
        required,
        kind,
    }
}

fn anchor(name: &str, label: &str, tab_type: TabKind) -> Anchor {
    Anchor {
        name: name.to_string(),
        label: label.to_string(),
        tab_type,
        required: true,
    }
}

fn letter_of_recommendation() -> DocumentTemplate {
    DocumentTemplate {
        id: TemplateId("lor-1".to_string()),
        name: "Letter of Recommendation".to_string(),
        category: "Recommendation".to_string(),
        body: "\
To whom it may concern,

I am pleased to recommend {{VAR:FULL_NAME}}, who served as {{VAR:POSITION}} \
from {{VAR:START_DATE}} to {{VAR:END_DATE}}.

{{VAR:RECOMMENDATION_TEXT}}

Sincerely,

{{DS:SIGNATURE_RECOMMENDER}}
Date: {{DS:DATE_SIGNED}}
"
        .to_string(),
        placeholders: vec![
            field("FULL_NAME", "Full Name", true, PlaceholderKind::Text),
            field("START_DATE", "Start Date", true, PlaceholderKind::Date),
            field("END_DATE", "End Date", false, PlaceholderKind::Date),
            field("POSITION", "Position", true, PlaceholderKind::Text),
            field(
                "RECOMMENDATION_TEXT",
                "Recommendation Text",
                true,
                PlaceholderKind::Text,
            ),
        ],
        anchors: vec![
            anchor(
                "SIGNATURE_RECOMMENDER",
                "Recommender Signature",
                TabKind::Signature,
            ),
            anchor("DATE_SIGNED", "Date Signed", TabKind::Date),
        ],
        default_roles: vec![SigningRole::new("Recommender", 1)],
        default_tab_map: vec![
            TabMapping::new("SIGNATURE_RECOMMENDER", "Recommender", TabKind::Signature),
            TabMapping::new("DATE_SIGNED", "Recommender", TabKind::Date),
        ],
        archived: false,
    }
}

fn contractor_verification_letter() -> DocumentTemplate {
    DocumentTemplate {
        id: TemplateId("cvl-1".to_string()),
        name: "Contractor Verification Letter".to_string(),
        category: "Verification".to_string(),
        body: "\
Contractor Verification

This letter verifies that {{VAR:CONTRACTOR_NAME}} is engaged as a contractor \
as of {{VAR:VERIFICATION_DATE}}.

Contract details: {{VAR:CONTRACT_DETAILS}}

Contractor: {{DS:SIGNATURE_CONTRACTOR}}

Chief Operating Officer: {{DS:SIGNATURE_CCOO}}
Date: {{DS:DATE_SIGNED}}
"
        .to_string(),
        placeholders: vec![
            field("CONTRACTOR_NAME", "Contractor Name", true, PlaceholderKind::Text),
            field(
                "VERIFICATION_DATE",
                "Verification Date",
                true,
                PlaceholderKind::Date,
            ),
            field(
                "CONTRACT_DETAILS",
                "Contract Details",
                true,
                PlaceholderKind::Text,
            ),
        ],
        anchors: vec![
            anchor(
                "SIGNATURE_CONTRACTOR",
                "Contractor Signature",
                TabKind::Signature,
            ),
            anchor("SIGNATURE_CCOO", "CCOO Signature", TabKind::Signature),
            anchor("DATE_SIGNED", "Date Signed", TabKind::Date),
        ],
        default_roles: vec![
            SigningRole::new("Contractor", 1),
            SigningRole::new("CCOO", 2),
        ],
        default_tab_map: vec![
            TabMapping::new("SIGNATURE_CONTRACTOR", "Contractor", TabKind::Signature),
            TabMapping::new("SIGNATURE_CCOO", "CCOO", TabKind::Signature),
            TabMapping::new("DATE_SIGNED", "CCOO", TabKind::Date),
        ],
        archived: false,
    }
}

fn contractor_end_of_agreement() -> DocumentTemplate {
    DocumentTemplate {
        id: TemplateId("cea-1".to_string()),
        name: "Contractor End of Agreement".to_string(),
        category: "Agreement".to_string(),
        body: "\
End of Contractor Agreement

The agreement with {{VAR:CONTRACTOR_NAME}}, which began on \
{{VAR:AGREEMENT_START_DATE}}, ends on {{VAR:AGREEMENT_END_DATE}}.

Reason: {{VAR:TERMINATION_REASON}}

Contractor: {{DS:SIGNATURE_CONTRACTOR}}

Administrator: {{DS:SIGNATURE_ADMIN}}
Date: {{DS:DATE_SIGNED}}
"
        .to_string(),
        placeholders: vec![
            field("CONTRACTOR_NAME", "Contractor Name", true, PlaceholderKind::Text),
            field(
                "AGREEMENT_START_DATE",
                "Agreement Start Date",
                true,
                PlaceholderKind::Date,
            ),
            field(
                "AGREEMENT_END_DATE",
                "Agreement End Date",
                true,
                PlaceholderKind::Date,
            ),
            field(
                "TERMINATION_REASON",
                "Termination Reason",
                false,
                PlaceholderKind::Text,
            ),
        ],
        anchors: vec![
            anchor(
                "SIGNATURE_CONTRACTOR",
                "Contractor Signature",
                TabKind::Signature,
            ),
            anchor(
                "SIGNATURE_ADMIN",
                "Administrator Signature",
                TabKind::Signature,
            ),
            anchor("DATE_SIGNED", "Date Signed", TabKind::Date),
        ],
        default_roles: vec![
            SigningRole::new("Contractor", 1),
            SigningRole::new("Administrator", 2),
        ],
        default_tab_map: vec![
            TabMapping::new("SIGNATURE_CONTRACTOR", "Contractor", TabKind::Signature),
            TabMapping::new("SIGNATURE_ADMIN", "Administrator", TabKind::Signature),
            TabMapping::new("DATE_SIGNED", "Administrator", TabKind::Date),
        ],
        archived: false,
    }
}
