pub mod email;

use crate::auth::{AuthError, TokenProvider};
use crate::db::RecordStore;
use crate::session::ProposalSession;
use log::{debug, warn};
use reqwest::multipart;
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
// Proposal generation runs several backend agents in sequence; requests
// are given up on only after this deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP client for the proposal backend. Flow operations are
/// non-throwing: failures are logged and read as an absent result, and
/// retrying is the caller's decision. Only `verify_token` (and the token
/// fetch itself) reports failure explicitly, so "not authenticated" stays
/// distinguishable from "empty response".
pub struct BackendClient {
    http: Client,
    base_url: String,
    auth: Arc<dyn TokenProvider>,
    store: Arc<RecordStore>,
    session: Arc<ProposalSession>,
}

impl BackendClient {
    pub fn new(
        base_url: impl Into<String>,
        auth: Arc<dyn TokenProvider>,
        store: Arc<RecordStore>,
        session: Arc<ProposalSession>,
    ) -> Result<Self, BackendError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            store,
            session,
        })
    }

    fn auth_header(&self) -> Result<String, BackendError> {
        let token = self.auth.id_token(false)?;
        debug!("attaching id token, len={}", token.len());
        Ok(format!("Bearer {token}"))
    }

    /// POST api/auth/verify-token.
    pub async fn verify_token(&self, id_token: &str) -> Result<String, BackendError> {
        let resp = self
            .http
            .post(format!("{}/api/auth/verify-token", self.base_url))
            .json(&serde_json::json!({ "idToken": id_token }))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }

    /// Upload the provider's company profile document. The raw response
    /// body comes back even for error statuses (callers inspect its `ok`
    /// flag); transport or auth failure reads as None.
    pub async fn upload_profile(&self, file_path: &Path) -> Option<String> {
        self.upload_pdf("api/provider/profile/upload", file_path).await
    }

    pub async fn get_profile(&self) -> Option<String> {
        let result: Result<String, BackendError> = async {
            let header = self.auth_header()?;
            let resp = self
                .http
                .get(format!("{}/api/provider/profile", self.base_url))
                .header("Authorization", header)
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;
            debug!("get_profile response: code={status}, {} bytes", body.len());
            Ok(body)
        }
        .await;
        match result {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("get_profile failed: {e}");
                None
            }
        }
    }

    pub async fn update_profile(&self, profile: &Value) -> Option<String> {
        let result: Result<String, BackendError> = async {
            let header = self.auth_header()?;
            let resp = self
                .http
                .put(format!("{}/api/provider/profile", self.base_url))
                .header("Authorization", header)
                .json(profile)
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;
            debug!("update_profile response: code={status}, {} bytes", body.len());
            Ok(body)
        }
        .await;
        match result {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("update_profile failed: {e}");
                None
            }
        }
    }

    /// Upload an SRS document; the response is the backend's
    /// structured-requirements JSON.
    pub async fn upload_srs(&self, file_path: &Path) -> Option<String> {
        self.upload_pdf("api/parse/srs/upload/overview", file_path).await
    }

    /// Upload an SRS document and persist the outcome: the file joins the
    /// recent list, and a non-empty response is stored as its SRS JSON.
    pub async fn upload_srs_file(&self, file_path: &Path) -> Option<String> {
        let body = self.upload_srs(file_path).await?;
        let filename = file_name_of(file_path);
        if let Err(e) = self.store.add_recent_file(filename) {
            warn!("failed to record recent file {filename}: {e}");
        }
        if !body.trim().is_empty() {
            if let Err(e) = self.store.save_srs_for_file(filename, &body) {
                warn!("failed to persist SRS for {filename}: {e}");
            }
        }
        Some(body)
    }

    /// Generate a proposal from the stored SRS for `filename`. On HTTP
    /// success the proposal is persisted (announcing it on the bus) and
    /// the file becomes the last completed proposal. Anything less leaves
    /// local state untouched.
    pub async fn generate_proposal_for_file(&self, filename: &str) -> Option<String> {
        let srs_json = match self.store.get_srs_for_file(filename) {
            Ok(Some(s)) => s,
            Ok(None) => {
                warn!("generate_proposal: no SRS stored for {filename}");
                return None;
            }
            Err(e) => {
                warn!("generate_proposal: SRS lookup failed for {filename}: {e}");
                return None;
            }
        };
        let srs: Value = match serde_json::from_str(&srs_json) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) | Err(_) => {
                warn!("generate_proposal: stored SRS for {filename} is not a JSON object");
                return None;
            }
        };

        let result: Result<(reqwest::StatusCode, String), BackendError> = async {
            let header = self.auth_header()?;
            let resp = self
                .http
                .post(format!("{}/api/bidcraft/generate-proposal", self.base_url))
                .header("Authorization", header)
                .json(&srs)
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;
            debug!(
                "generate_proposal response: code={status}, {} bytes",
                body.len()
            );
            Ok((status, body))
        }
        .await;

        match result {
            Ok((status, body)) if status.is_success() && !body.trim().is_empty() => {
                let report_html = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| {
                        v.get("reportHtml")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    });
                if let Err(e) =
                    self.store
                        .save_proposal_for_file(filename, &body, report_html.as_deref())
                {
                    warn!("failed to persist proposal for {filename}: {e}");
                } else {
                    self.session.set_last_proposal_file(filename);
                }
                Some(body)
            }
            Ok((status, body)) => {
                warn!("generate_proposal not successful: code={status}");
                Some(body)
            }
            Err(e) => {
                warn!("generate_proposal failed: {e}");
                None
            }
        }
    }

    async fn upload_pdf(&self, endpoint: &str, file_path: &Path) -> Option<String> {
        let result: Result<String, BackendError> = async {
            let header = self.auth_header()?;
            let bytes = tokio::fs::read(file_path).await?;
            let part = multipart::Part::bytes(bytes)
                .file_name(file_name_of(file_path).to_string())
                .mime_str("application/pdf")?;
            let form = multipart::Form::new().part("file", part);
            debug!("uploading {} to {endpoint}", file_path.display());
            let resp = self
                .http
                .post(format!("{}/{endpoint}", self.base_url))
                .header("Authorization", header)
                .multipart(form)
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;
            debug!("{endpoint} response: code={status}, {} bytes", body.len());
            Ok(body)
        }
        .await;
        match result {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("{endpoint} failed: {e}");
                None
            }
        }
    }
}

fn file_name_of(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::db::DEFAULT_RECENT_LIMIT;

    fn client(token: &str) -> (tempfile::TempDir, Arc<RecordStore>, BackendClient) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordStore::open(dir.path(), DEFAULT_RECENT_LIMIT).unwrap());
        let backend = BackendClient::new(
            "http://localhost:1/",
            Arc::new(StaticTokenProvider::new(token, None)),
            Arc::clone(&store),
            Arc::new(ProposalSession::new()),
        )
        .unwrap();
        (dir, store, backend)
    }

    #[test]
    fn test_base_url_loses_trailing_slash() {
        let (_dir, _store, backend) = client("tok");
        assert_eq!(backend.base_url, "http://localhost:1");
    }

    #[test]
    fn test_auth_header_formats_bearer_token() {
        let (_dir, _store, backend) = client("tok-123");
        assert_eq!(backend.auth_header().unwrap(), "Bearer tok-123");
    }

    #[test]
    fn test_auth_header_fails_without_token() {
        let (_dir, _store, backend) = client("");
        assert!(matches!(
            backend.auth_header(),
            Err(BackendError::Auth(AuthError::NoToken))
        ));
    }

    #[tokio::test]
    async fn test_generate_proposal_without_stored_srs_is_none() {
        let (_dir, _store, backend) = client("tok");
        // No network round trip happens: the SRS lookup comes up empty.
        assert!(backend.generate_proposal_for_file("a.pdf").await.is_none());
    }

    #[tokio::test]
    async fn test_generate_proposal_rejects_non_object_srs() {
        let (_dir, store, backend) = client("tok");
        store.save_srs_for_file("a.pdf", "[1, 2, 3]").unwrap();
        assert!(backend.generate_proposal_for_file("a.pdf").await.is_none());
    }

    #[test]
    fn test_file_name_of_falls_back() {
        assert_eq!(file_name_of(Path::new("/tmp/x/report.pdf")), "report.pdf");
        assert_eq!(file_name_of(Path::new("/")), "unknown");
    }
}
