use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::workflows::documents::{anchor_token, SigningRole, TabKind, TabMapping};

const ANCHOR_UNITS: &str = "pixels";
const ANCHOR_X_OFFSET: &str = "0";
const ANCHOR_Y_OFFSET: &str = "-10";

/// Body of `POST /v2.1/accounts/{accountId}/templates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeTemplate {
    pub name: String,
    pub description: String,
    pub envelope: EnvelopeDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDefinition {
    pub email_subject: String,
    pub status: String,
    pub documents: Vec<EnvelopeDocument>,
    pub recipients: Recipients,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDocument {
    pub document_base64: String,
    pub name: String,
    pub file_extension: String,
    pub document_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipients {
    pub signers: Vec<Signer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    pub role_name: String,
    pub routing_order: String,
    pub recipient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabs: Option<Tabs>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tabs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sign_here_tabs: Vec<AnchorTab>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_signed_tabs: Vec<AnchorTab>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_tabs: Vec<AnchorTab>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkbox_tabs: Vec<AnchorTab>,
}

impl Tabs {
    pub fn is_empty(&self) -> bool {
        self.sign_here_tabs.is_empty()
            && self.date_signed_tabs.is_empty()
            && self.text_tabs.is_empty()
            && self.checkbox_tabs.is_empty()
    }

    fn push(&mut self, kind: TabKind, tab: AnchorTab) -> bool {
        let list = match kind {
            TabKind::Signature => &mut self.sign_here_tabs,
            TabKind::Date => &mut self.date_signed_tabs,
            TabKind::Text => &mut self.text_tabs,
            TabKind::Checkbox => &mut self.checkbox_tabs,
            TabKind::Radio => return false,
        };
        list.push(tab);
        true
    }
}

/// Tab positioned relative to the first occurrence of `anchor_string`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorTab {
    pub anchor_string: String,
    pub anchor_units: String,
    pub anchor_x_offset: String,
    pub anchor_y_offset: String,
}

impl AnchorTab {
    fn at(anchor_name: &str) -> Self {
        Self {
            anchor_string: anchor_token(anchor_name),
            anchor_units: ANCHOR_UNITS.to_string(),
            anchor_x_offset: ANCHOR_X_OFFSET.to_string(),
            anchor_y_offset: ANCHOR_Y_OFFSET.to_string(),
        }
    }
}

/// Translates roles and tab mappings into an envelope template carrying `pdf`
/// as its only document. Signers follow the order of `roles`; recipient ids
/// are their 1-based positions.
pub fn build_envelope_template(
    name: &str,
    pdf: &[u8],
    roles: &[SigningRole],
    tab_map: &[TabMapping],
) -> EnvelopeTemplate {
    let signers = roles
        .iter()
        .enumerate()
        .map(|(index, role)| {
            let mut tabs = Tabs::default();
            for mapping in tab_map.iter().filter(|m| m.role_name == role.role_name) {
                if !tabs.push(mapping.tab_type, AnchorTab::at(&mapping.anchor_name)) {
                    warn!(
                        anchor = %mapping.anchor_name,
                        role = %role.role_name,
                        tab_type = mapping.tab_type.label(),
                        "tab type has no anchor form; skipped"
                    );
                }
            }

            Signer {
                role_name: role.role_name.clone(),
                routing_order: role.signing_order.to_string(),
                recipient_id: (index + 1).to_string(),
                tabs: (!tabs.is_empty()).then_some(tabs),
            }
        })
        .collect();

    EnvelopeTemplate {
        name: name.to_string(),
        description: format!("Template: {name}"),
        envelope: EnvelopeDefinition {
            email_subject: format!("Please sign: {name}"),
            status: "created".to_string(),
            documents: vec![EnvelopeDocument {
                document_base64: STANDARD.encode(pdf),
                name: format!("{name}.pdf"),
                file_extension: "pdf".to_string(),
                document_id: "1".to_string(),
            }],
            recipients: Recipients { signers },
        },
    }
}
