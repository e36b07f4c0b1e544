use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::documents::{SigningRole, TabMapping, TemplateId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Owner used when requests come from the command line.
    pub fn system() -> Self {
        Self("system".to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

/// Where the document for a request comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentSource {
    Template { template_id: TemplateId },
    Uploaded { file_id: String },
}

/// Submission payload, shaped like the intake form's JSON body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSubmission {
    #[serde(default)]
    pub document_template_id: Option<TemplateId>,
    #[serde(default)]
    pub uploaded_file_id: Option<String>,
    #[serde(default)]
    pub filled_values: BTreeMap<String, String>,
    #[serde(default)]
    pub roles: Vec<SigningRole>,
    #[serde(default)]
    pub tab_map: Vec<TabMapping>,
    #[serde(default, alias = "esignFriendly")]
    pub docusign_friendly: bool,
}

/// Stored state of one signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub source: DocumentSource,
    pub filled_values: BTreeMap<String, String>,
    pub roles: Vec<SigningRole>,
    pub tab_map: Vec<TabMapping>,
    pub esign_friendly: bool,
    pub status: RequestStatus,
    pub generated_pdf_path: Option<PathBuf>,
    pub esign_template_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SigningRequest {
    pub fn status_view(&self) -> RequestStatusView {
        RequestStatusView {
            id: self.id.clone(),
            status: self.status.label(),
            esign_template_id: self.esign_template_id.clone(),
            generated_pdf_path: self.generated_pdf_path.clone(),
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// Subset of a request that is safe to show back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestStatusView {
    pub id: RequestId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub esign_template_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_pdf_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}
