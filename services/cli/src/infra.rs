use sigdoc::workflows::esign::EsignSession;
use sigdoc::workflows::requests::{
    ConnectionStore, RepositoryError, RequestId, RequestRepository, RequestStatus, SigningRequest,
    UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Default, Clone)]
pub(crate) struct InMemoryRequestRepository {
    records: Arc<Mutex<HashMap<RequestId, SigningRequest>>>,
}

impl RequestRepository for InMemoryRequestRepository {
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
        match guard.get(&request.id) {
            None => Err(RepositoryError::NotFound),
            Some(stored) if stored.status != expected => {
                Err(RepositoryError::StatusChanged(stored.status))
            }
            Some(_) => {
                guard.insert(request.id.clone(), request);
                Ok(())
            }
        }
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<SigningRequest>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<SigningRequest>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut requests: Vec<SigningRequest> = guard.values().cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }
}

/// Sessions kept in a JSON file keyed by user id.
#[derive(Debug, Clone)]
pub(crate) struct JsonConnectionStore {
    path: PathBuf,
}

impl JsonConnectionStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Result<BTreeMap<UserId, EsignSession>, RepositoryError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(unavailable(&self.path, err)),
        };
        serde_json::from_str(&raw).map_err(|err| unavailable(&self.path, err))
    }
}

impl ConnectionStore for JsonConnectionStore {
    fn load(&self, user: &UserId) -> Result<Option<EsignSession>, RepositoryError> {
        Ok(self.read_all()?.remove(user))
    }

    fn save(&self, user: &UserId, session: EsignSession) -> Result<(), RepositoryError> {
        let mut sessions = self.read_all()?;
        sessions.insert(user.clone(), session);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| unavailable(&self.path, err))?;
        }
        let json =
            serde_json::to_string_pretty(&sessions).map_err(|err| unavailable(&self.path, err))?;
        std::fs::write(&self.path, json).map_err(|err| unavailable(&self.path, err))?;
        debug!(%user, path = %self.path.display(), "session stored");
        Ok(())
    }
}

fn unavailable(path: &std::path::Path, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Unavailable(format!("{}: {err}", path.display()))
}

pub(crate) fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    Ok((name.to_ascii_uppercase(), value.to_string()))
}
