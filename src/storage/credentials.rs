use super::StoreError;
use serde::Deserialize;
use std::path::Path;

/// Service-account credential artifact used to authenticate to the store
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
}

impl Credentials {
    /// Load and check the credential file
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            StoreError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&raw)
            .map_err(|e| StoreError::Credentials(format!("{}: {}", path.display(), e)))
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let creds: Credentials = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        if creds.project_id.trim().is_empty() {
            return Err("project_id cannot be empty".to_string());
        }
        if let Some(kind) = creds.kind.as_deref() {
            if kind != "service_account" {
                return Err(format!("unsupported credential type '{}'", kind));
            }
        }
        Ok(creds)
    }
}
