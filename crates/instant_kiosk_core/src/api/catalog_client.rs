//! HTTP client for the example catalog server.
//!
//! # Responsibility
//! - List catalog documents and resolve their per-document/per-layer tokens.
//! - Fetch one fresh token for a document on demand.
//!
//! # Invariants
//! - The `Authorization` header is computed once per client and marked
//!   sensitive; tokens and credentials never reach the logs.
//! - During listing an explicit `success=false` drops that document only;
//!   `fetch_token` treats the same response as a hard error.
//! - Transport failures are never retried here.

use crate::model::descriptor::{
    DescriptorValidationError, DocumentDescriptor, DocumentId, LayerDescriptor,
};
use async_stream::try_stream;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use futures_util::{Stream, TryStreamExt};
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Error taxonomy of the catalog client.
#[derive(Debug)]
pub enum CatalogError {
    /// Server URL is malformed or not http(s).
    InvalidUrl(String),
    /// Credentials cannot be encoded as an HTTP header.
    InvalidCredentials,
    /// Network unreachable, timeout, TLS or body decoding failure.
    Transport(reqwest::Error),
    /// Server answered with a non-success status.
    Status { status: u16, endpoint: String },
    /// Server explicitly refused a token (`success=false`).
    AuthenticationRejected(DocumentId),
    /// Server returned a document that violates descriptor invariants.
    InvalidDescriptor(DescriptorValidationError),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(value) => write!(f, "invalid catalog server url: {value}"),
            Self::InvalidCredentials => write!(f, "user name cannot be encoded as credentials"),
            Self::Transport(err) => write!(f, "catalog request failed: {err}"),
            Self::Status { status, endpoint } => {
                write!(f, "catalog endpoint `{endpoint}` answered with status {status}")
            }
            Self::AuthenticationRejected(document_id) => {
                write!(f, "authentication rejected for document `{document_id}`")
            }
            Self::InvalidDescriptor(err) => write!(f, "invalid catalog document: {err}"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::InvalidDescriptor(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value)
    }
}

impl From<DescriptorValidationError> for CatalogError {
    fn from(value: DescriptorValidationError) -> Self {
        Self::InvalidDescriptor(value)
    }
}

/// Catalog operations consumed by the refresh orchestrator and the sync
/// session controller.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Collects the full live catalog.
    async fn fetch_documents(&self) -> CatalogResult<Vec<DocumentDescriptor>>;
    /// Fetches one fresh token for `document_id`.
    async fn fetch_token(&self, document_id: &str) -> CatalogResult<String>;
}

/// Body of `GET documents`.
#[derive(Deserialize)]
struct DocumentListResponse {
    documents: Vec<WebDocument>,
}

#[derive(Deserialize)]
struct WebDocument {
    id: DocumentId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    layers: Vec<String>,
    #[serde(default)]
    tokens: Vec<String>,
}

/// Body of `GET document/{id}/token`.
#[derive(Deserialize)]
struct AuthenticationResponse {
    success: bool,
    #[serde(default)]
    token: String,
}

/// REST client for the example catalog server.
pub struct WebCatalogClient {
    http: Client,
    base_url: Url,
}

impl WebCatalogClient {
    /// Builds a client for `server_url` authenticating as `username`.
    ///
    /// # Errors
    /// - `InvalidUrl` when `server_url` is not an absolute http(s) URL.
    /// - `Transport` when the HTTP backend cannot be initialized.
    pub fn new(server_url: &str, username: &str) -> CatalogResult<Self> {
        let base_url = normalize_base_url(server_url)?;

        let mut authorization = HeaderValue::from_str(&authorization_header(username))
            .map_err(|_| CatalogError::InvalidCredentials)?;
        authorization.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Lists catalog documents as a one-shot lazy stream.
    ///
    /// Issues `GET documents`, then `GET document/{id}/token` per document.
    /// A transport or status failure ends the stream with that error; a
    /// document whose token request reports `success=false` is skipped.
    pub fn list_documents(&self) -> impl Stream<Item = CatalogResult<DocumentDescriptor>> + '_ {
        try_stream! {
            let listing: DocumentListResponse = self.get_json(self.endpoint(&["documents"])?).await?;
            info!(
                "event=catalog_list module=api status=ok count={}",
                listing.documents.len()
            );

            for document in listing.documents {
                let auth = self.get_authentication(&document.id).await?;
                if !auth.success {
                    warn!(
                        "event=catalog_list module=api status=skipped reason=auth_rejected document_id={}",
                        document.id
                    );
                    continue;
                }

                let layers = pair_layers(&document.id, auth.token, &document.layers, &document.tokens);
                yield DocumentDescriptor::new(document.id, document.title, layers)?;
            }
        }
    }

    /// Fetches a fresh token for `document_id`.
    ///
    /// # Errors
    /// - `AuthenticationRejected` when the server reports `success=false`.
    /// - `Transport`/`Status` on request failure.
    pub async fn fetch_token(&self, document_id: &str) -> CatalogResult<String> {
        let auth = self.get_authentication(document_id).await?;
        if !auth.success {
            warn!(
                "event=token_fetch module=api status=error error_code=auth_rejected document_id={}",
                document_id
            );
            return Err(CatalogError::AuthenticationRejected(document_id.to_string()));
        }
        info!(
            "event=token_fetch module=api status=ok document_id={}",
            document_id
        );
        Ok(auth.token)
    }

    async fn get_authentication(&self, document_id: &str) -> CatalogResult<AuthenticationResponse> {
        self.get_json(self.endpoint(&["document", document_id, "token"])?)
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> CatalogResult<T> {
        let endpoint = url.path().to_string();
        debug!("event=catalog_request module=api status=start endpoint={}", endpoint);

        let response = self.http.get(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json::<T>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(
                    "event=catalog_request module=api status=error error_code=unauthorized endpoint={}",
                    endpoint
                );
                Err(CatalogError::Status {
                    status: response.status().as_u16(),
                    endpoint,
                })
            }
            status => Err(CatalogError::Status {
                status: status.as_u16(),
                endpoint,
            }),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> CatalogResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl CatalogApi for WebCatalogClient {
    async fn fetch_documents(&self) -> CatalogResult<Vec<DocumentDescriptor>> {
        self.list_documents().try_collect().await
    }

    async fn fetch_token(&self, document_id: &str) -> CatalogResult<String> {
        WebCatalogClient::fetch_token(self, document_id).await
    }
}

/// Returns the `Authorization` value derived from `username`.
///
/// The example server identifies users by name only, so the password part of
/// the Basic credentials is empty.
pub fn authorization_header(username: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("{username}:")))
}

/// Builds the layer list of one catalog document.
///
/// The default layer always comes first and carries `default_token`. Named
/// layers are paired positionally with `tokens` only when both lists have the
/// same length; otherwise every named layer is dropped. Empty names are
/// skipped.
pub fn pair_layers(
    document_id: &str,
    default_token: String,
    layer_names: &[String],
    tokens: &[String],
) -> Vec<LayerDescriptor> {
    let mut layers = vec![LayerDescriptor::default_layer(document_id, default_token)];

    if layer_names.len() != tokens.len() {
        if !layer_names.is_empty() || !tokens.is_empty() {
            warn!(
                "event=layer_pairing module=api status=degraded document_id={} layer_count={} token_count={}",
                document_id,
                layer_names.len(),
                tokens.len()
            );
        }
        return layers;
    }

    layers.extend(
        layer_names
            .iter()
            .zip(tokens)
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, token)| LayerDescriptor::named(document_id, name.as_str(), token.as_str())),
    );
    layers
}

fn normalize_base_url(server_url: &str) -> CatalogResult<Url> {
    let trimmed = server_url.trim();
    let url = Url::parse(trimmed).map_err(|err| CatalogError::InvalidUrl(format!("{trimmed}: {err}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(CatalogError::InvalidUrl(format!(
            "{trimmed}: scheme must be http or https"
        )));
    }
    if url.cannot_be_a_base() {
        return Err(CatalogError::InvalidUrl(trimmed.to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::{authorization_header, normalize_base_url, pair_layers, WebCatalogClient};

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn authorization_header_encodes_user_with_empty_password() {
        // base64("alice:")
        assert_eq!(authorization_header("alice"), "Basic YWxpY2U6");
    }

    #[test]
    fn pair_layers_keeps_all_named_layers_when_lengths_match() {
        let layers = pair_layers(
            "doc",
            "default-token".to_string(),
            &names(&["review", "draft"]),
            &names(&["t1", "t2"]),
        );

        assert_eq!(layers.len(), 3);
        assert!(layers[0].is_default());
        assert_eq!(layers[0].token, "default-token");
        assert_eq!(layers[1].layer_name.as_deref(), Some("review"));
        assert_eq!(layers[1].token, "t1");
        assert_eq!(layers[2].layer_name.as_deref(), Some("draft"));
        assert_eq!(layers[2].token, "t2");
    }

    #[test]
    fn pair_layers_drops_named_layers_on_length_mismatch() {
        let layers = pair_layers(
            "doc",
            "default-token".to_string(),
            &names(&["review", "draft"]),
            &names(&["t1"]),
        );

        assert_eq!(layers.len(), 1);
        assert!(layers[0].is_default());
    }

    #[test]
    fn pair_layers_skips_empty_names() {
        let layers = pair_layers(
            "doc",
            "default-token".to_string(),
            &names(&["", "review"]),
            &names(&["t0", "t1"]),
        );

        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].layer_name.as_deref(), Some("review"));
    }

    #[test]
    fn base_url_rejects_non_http_schemes() {
        assert!(normalize_base_url("ftp://example.com").is_err());
        assert!(normalize_base_url("not a url").is_err());
        assert!(normalize_base_url("http://localhost:3000/api/").is_ok());
    }

    #[test]
    fn client_keeps_trimmed_base_url() {
        let client = WebCatalogClient::new("  https://catalog.example:3000/api/ ", "alice").unwrap();
        assert_eq!(client.base_url().as_str(), "https://catalog.example:3000/api/");
    }

    #[test]
    fn endpoint_appends_encoded_segments_to_base_path() {
        let client = WebCatalogClient::new("http://localhost:3000/api/", "alice").unwrap();
        let url = client.endpoint(&["document", "a b", "token"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/document/a%20b/token");

        let bare = WebCatalogClient::new("http://localhost:3000", "alice").unwrap();
        let url = bare.endpoint(&["documents"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/documents");
    }
}
