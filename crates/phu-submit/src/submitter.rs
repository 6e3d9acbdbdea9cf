use std::collections::HashMap;
use std::path::{Path, PathBuf};

use phu_core::FormSession;
use tokio::sync::Mutex;

use crate::backend::{Backend, Document};
use crate::status::{Notice, StatusRegion};
use crate::SubmitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    PwId,
    VerifyVpnId,
    GenerateDecom,
}

/// How a call ended, from the form's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement<T> {
    /// Newest call for its endpoint; its result was rendered.
    Applied(T),
    /// Newest call, but it failed; the error notice is showing.
    Failed,
    /// A newer call to the same endpoint was made; nothing was rendered.
    Superseded,
}

impl<T> Settlement<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Settlement::Applied(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    status: StatusRegion,
    latest: HashMap<Endpoint, u64>,
}

pub struct Submitter<B> {
    backend: B,
    state: Mutex<State>,
}

impl<B: Backend> Submitter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: Mutex::new(State::default()),
        }
    }

    pub async fn status(&self) -> StatusRegion {
        self.state.lock().await.status.clone()
    }

    async fn begin(&self, endpoint: Endpoint) -> u64 {
        let mut state = self.state.lock().await;
        state.status.begin();
        let ticket = state.latest.entry(endpoint).or_insert(0);
        *ticket += 1;
        *ticket
    }

    /// Settle a call. The notice is shown only for the newest ticket.
    async fn finish(&self, endpoint: Endpoint, ticket: u64, notice: Notice) -> bool {
        let mut state = self.state.lock().await;
        state.status.settle();
        if state.latest.get(&endpoint) != Some(&ticket) {
            tracing::debug!(?endpoint, ticket, "discarding superseded response");
            return false;
        }
        state.status.show(notice);
        true
    }

    pub async fn fetch_pw_id(&self, router_a: &str, router_z: &str) -> Settlement<String> {
        let ticket = self.begin(Endpoint::PwId).await;
        let result = self.backend.next_pw_id(router_a, router_z).await;
        let notice = match &result {
            Ok(id) => Notice::Success(format!("Next available pseudowire is: {id}")),
            Err(e) => {
                tracing::warn!(error = %e, "pseudowire lookup failed");
                Notice::Error("Error fetching pseudowire ID".to_string())
            }
        };
        if !self.finish(Endpoint::PwId, ticket, notice).await {
            return Settlement::Superseded;
        }
        match result {
            Ok(id) => Settlement::Applied(id),
            Err(_) => Settlement::Failed,
        }
    }

    pub async fn verify_vpn_id(&self, vpn_id: &str) -> Settlement<bool> {
        let ticket = self.begin(Endpoint::VerifyVpnId).await;
        let result = self.backend.verify_vpn_id(vpn_id).await;
        let notice = match &result {
            Ok(true) => Notice::Success(format!("Verified! VPN ID: {vpn_id} is available.")),
            Ok(false) => Notice::Error(format!(
                "WARNING! Found VPN ID: {vpn_id} on the route reflector."
            )),
            Err(e) => {
                tracing::warn!(error = %e, vpn_id, "vpn id check failed");
                Notice::Error("Error validating VPN ID (has not been checked)".to_string())
            }
        };
        if !self.finish(Endpoint::VerifyVpnId, ticket, notice).await {
            return Settlement::Superseded;
        }
        match result {
            Ok(available) => Settlement::Applied(available),
            Err(_) => Settlement::Failed,
        }
    }

    /// Submit the form and save the returned document into `dir`. Fails
    /// before any request when the form has not been generated.
    pub async fn generate_decom(
        &self,
        session: &FormSession,
        dir: &Path,
    ) -> Result<Settlement<PathBuf>, SubmitError> {
        let fields = session.submission()?;
        let ticket = self.begin(Endpoint::GenerateDecom).await;
        let result = match self.backend.generate_decom(&fields).await {
            Ok(document) => save_document(dir, &document),
            Err(e) => Err(e),
        };
        let notice = match &result {
            Ok(path) => Notice::Success(format!("Saved {}", path.display())),
            Err(e) => {
                tracing::warn!(error = %e, "document generation failed");
                Notice::Error("Error generating document".to_string())
            }
        };
        if !self.finish(Endpoint::GenerateDecom, ticket, notice).await {
            return Ok(Settlement::Superseded);
        }
        Ok(match result {
            Ok(path) => Settlement::Applied(path),
            Err(_) => Settlement::Failed,
        })
    }
}

/// Write a document under `dir` using only the file name part of what the
/// backend sent.
pub fn save_document(dir: &Path, document: &Document) -> Result<PathBuf, SubmitError> {
    let name = Path::new(&document.filename)
        .file_name()
        .ok_or_else(|| SubmitError::Unexpected(format!("bad file name '{}'", document.filename)))?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, &document.bytes)?;
    tracing::info!(path = %path.display(), bytes = document.bytes.len(), "saved document");
    Ok(path)
}
