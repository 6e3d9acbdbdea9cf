use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde_json::Value;

use crate::SubmitError;

/// A generated document as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Next free pseudowire ID between two routers.
    async fn next_pw_id(&self, router_a: &str, router_z: &str) -> Result<String, SubmitError>;

    /// True when `vpn_id` is not yet in use on the route reflector.
    async fn verify_vpn_id(&self, vpn_id: &str) -> Result<bool, SubmitError>;

    /// Render the decommission document for submitted form fields.
    async fn generate_decom(&self, fields: &[(String, String)]) -> Result<Document, SubmitError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("phu/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn ok_status(response: Response) -> Result<Response, SubmitError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SubmitError::Status(status))
    }
}

/// The endpoint answers with a bare JSON string or number.
pub(crate) fn pw_id_from(value: Value) -> Result<String, SubmitError> {
    match value {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(SubmitError::Unexpected(other.to_string())),
    }
}

/// JSON boolean, or the integers 0/1.
pub(crate) fn verified_from(value: Value) -> Result<bool, SubmitError> {
    match value {
        Value::Bool(ok) => Ok(ok),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        other => Err(SubmitError::Unexpected(other.to_string())),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn next_pw_id(&self, router_a: &str, router_z: &str) -> Result<String, SubmitError> {
        let url = self.url("get-pw-id");
        tracing::debug!(%url, router_a, router_z, "requesting pseudowire id");
        let response = self
            .client
            .post(&url)
            .form(&[("routerA", router_a), ("routerZ", router_z)])
            .send()
            .await?;
        let value: Value = ok_status(response)?.json().await?;
        pw_id_from(value)
    }

    async fn verify_vpn_id(&self, vpn_id: &str) -> Result<bool, SubmitError> {
        let url = self.url("verify-vpn-id");
        tracing::debug!(%url, vpn_id, "verifying vpn id");
        let response = self.client.post(&url).json(&vpn_id).send().await?;
        let value: Value = ok_status(response)?.json().await?;
        verified_from(value)
    }

    async fn generate_decom(&self, fields: &[(String, String)]) -> Result<Document, SubmitError> {
        let url = self.url("generate/decom");
        tracing::debug!(%url, fields = fields.len(), "requesting decom document");
        let form = fields
            .iter()
            .fold(multipart::Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            });
        let response = ok_status(self.client.post(&url).multipart(form).send().await?)?;
        let filename = response
            .headers()
            .get("fname")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .ok_or_else(|| SubmitError::Unexpected("missing fname header".to_string()))?;
        let bytes = response.bytes().await?.to_vec();
        Ok(Document { filename, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn urls_join_without_double_slashes() {
        let backend = HttpBackend::new("http://phu.lab:5000/");
        assert_eq!(backend.url("get-pw-id"), "http://phu.lab:5000/get-pw-id");
        assert_eq!(backend.url("/generate/decom"), "http://phu.lab:5000/generate/decom");
    }

    #[test]
    fn pw_id_accepts_string_or_number() {
        assert_eq!(pw_id_from(json!("1043")).unwrap(), "1043");
        assert_eq!(pw_id_from(json!(1043)).unwrap(), "1043");
        assert!(pw_id_from(json!(null)).is_err());
        assert!(pw_id_from(json!({"id": 1})).is_err());
    }

    #[test]
    fn verification_accepts_bool_or_flag() {
        assert!(verified_from(json!(true)).unwrap());
        assert!(!verified_from(json!(false)).unwrap());
        assert!(verified_from(json!(1)).unwrap());
        assert!(!verified_from(json!(0)).unwrap());
        assert!(verified_from(json!(2)).is_err());
        assert!(verified_from(json!("yes")).is_err());
    }
}
