use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::config::DocumentsConfig;
use crate::workflows::documents::pdf::render_text_document;
use crate::workflows::documents::{TemplateCatalog, TemplateId};
use crate::workflows::esign::{EnvelopeTemplate, EsignError, EsignGateway, EsignSession};
use crate::workflows::requests::domain::{
    RequestId, RequestStatus, RequestSubmission, SigningRequest, UserId,
};
use crate::workflows::requests::repository::{
    ConnectionStore, RepositoryError, RequestRepository,
};
use crate::workflows::requests::SigningRequestService;

pub(super) type TestService = SigningRequestService<MemoryRepository, MemoryConnections, FakeGateway>;

pub(super) fn user() -> UserId {
    UserId("hr-admin".to_string())
}

pub(super) fn write_header(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("header-template.pdf");
    let bytes = render_text_document("Letterhead", text).expect("header renders");
    std::fs::write(&path, bytes).expect("header written");
    path
}

pub(super) fn documents_config(dir: &Path) -> DocumentsConfig {
    DocumentsConfig {
        header_pdf: write_header(dir, "ACME Corp\n1 Main Street"),
        uploads_dir: dir.join("uploads"),
        token_store: dir.join("connections.json"),
    }
}

pub(super) fn live_session() -> EsignSession {
    EsignSession {
        access_token: "live-token".to_string(),
        refresh_token: Some("refresh-1".to_string()),
        expires_at: Utc::now() + Duration::hours(1),
        account_id: "acct-1".to_string(),
        base_uri: "https://demo.docusign.net".to_string(),
    }
}

pub(super) fn expired_session(refresh_token: Option<&str>) -> EsignSession {
    EsignSession {
        access_token: "stale-token".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: Utc::now() - Duration::minutes(5),
        ..live_session()
    }
}

pub(super) fn verification_submission() -> RequestSubmission {
    let mut filled_values = BTreeMap::new();
    filled_values.insert("CONTRACTOR_NAME".to_string(), "Jo Doe".to_string());
    filled_values.insert("VERIFICATION_DATE".to_string(), "2024-03-01".to_string());
    filled_values.insert(
        "CONTRACT_DETAILS".to_string(),
        "Network maintenance, 20 hours per week".to_string(),
    );
    RequestSubmission {
        document_template_id: Some(TemplateId("cvl-1".to_string())),
        filled_values,
        ..RequestSubmission::default()
    }
}

pub(super) struct Harness {
    pub(super) service: TestService,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) connections: Arc<MemoryConnections>,
    pub(super) gateway: Arc<FakeGateway>,
    pub(super) documents: DocumentsConfig,
}

pub(super) fn harness(dir: &Path, gateway: FakeGateway) -> Harness {
    let repository = Arc::new(MemoryRepository::default());
    let connections = Arc::new(MemoryConnections::default());
    let gateway = Arc::new(gateway);
    let documents = documents_config(dir);
    let service = SigningRequestService::new(
        repository.clone(),
        connections.clone(),
        gateway.clone(),
        Arc::new(TemplateCatalog::standard()),
        &documents,
    );
    Harness {
        service,
        repository,
        connections,
        gateway,
        documents,
    }
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<HashMap<RequestId, SigningRequest>>,
}

impl RequestRepository for MemoryRepository {
    fn insert(&self, request: SigningRequest) -> Result<SigningRequest, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn update_if(
        &self,
        request: SigningRequest,
        expected: RequestStatus,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let stored = guard.get(&request.id).ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Err(RepositoryError::StatusChanged(stored.status));
        }
        guard.insert(request.id.clone(), request);
        Ok(())
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<SigningRequest>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<SigningRequest>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut requests: Vec<_> = guard.values().cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }
}

#[derive(Default)]
pub(super) struct MemoryConnections {
    sessions: Mutex<HashMap<UserId, EsignSession>>,
}

impl MemoryConnections {
    pub(super) fn connect(&self, user: &UserId, session: EsignSession) {
        self.sessions
            .lock()
            .expect("connection mutex poisoned")
            .insert(user.clone(), session);
    }
}

impl ConnectionStore for MemoryConnections {
    fn load(&self, user: &UserId) -> Result<Option<EsignSession>, RepositoryError> {
        let guard = self.sessions.lock().expect("connection mutex poisoned");
        Ok(guard.get(user).cloned())
    }

    fn save(&self, user: &UserId, session: EsignSession) -> Result<(), RepositoryError> {
        self.connect(user, session);
        Ok(())
    }
}

/// Gateway double that records what the service sends.
#[derive(Default)]
pub(super) struct FakeGateway {
    created: Mutex<Vec<(String, EnvelopeTemplate)>>,
    refreshed_with: Mutex<Vec<String>>,
    reject_with: Option<u16>,
}

impl FakeGateway {
    pub(super) fn rejecting(status: u16) -> Self {
        Self {
            reject_with: Some(status),
            ..Self::default()
        }
    }

    /// Access token and template of every create call.
    pub(super) fn created(&self) -> Vec<(String, EnvelopeTemplate)> {
        self.created.lock().expect("gateway mutex poisoned").clone()
    }

    pub(super) fn refreshed_with(&self) -> Vec<String> {
        self.refreshed_with
            .lock()
            .expect("gateway mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl EsignGateway for FakeGateway {
    async fn create_template(
        &self,
        session: &EsignSession,
        template: &EnvelopeTemplate,
    ) -> Result<String, EsignError> {
        if let Some(status) = self.reject_with {
            return Err(EsignError::Status {
                operation: "template creation",
                status,
                body: "{\"errorCode\":\"INVALID_REQUEST_BODY\"}".to_string(),
            });
        }
        let mut created = self.created.lock().expect("gateway mutex poisoned");
        created.push((session.access_token.clone(), template.clone()));
        Ok(format!("tmpl-{}", created.len()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<EsignSession, EsignError> {
        self.refreshed_with
            .lock()
            .expect("gateway mutex poisoned")
            .push(refresh_token.to_string());
        Ok(EsignSession {
            access_token: "fresh-token".to_string(),
            refresh_token: Some(refresh_token.to_string()),
            ..live_session()
        })
    }
}
