//! Thin PostgREST client for a Supabase project: table reads, conditional
//! updates and remote procedure calls.

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

mod backend;

pub use backend::SupabaseBackend;

#[derive(clap::Args, Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. https://xyzcompany.supabase.co
    #[clap(long, env, default_value = "http://127.0.0.1:54321")]
    pub supabase_url: String,
    #[clap(long, env)]
    pub supabase_anon_key: Option<String>,
    /// Signed-in user JWT; requests fall back to the anon key without it
    #[clap(long, env)]
    pub supabase_access_token: Option<String>,
    #[clap(long, env, default_value = "20")]
    pub supabase_timeout_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("Failed to create header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("Request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parsing failed: {0}")]
    Url(#[from] url::ParseError),
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{action} failed with status: {status}, body: {body}")]
    RequestFailed {
        action: String,
        status: StatusCode,
        body: String,
    },
    #[error("Remote procedure {procedure} failed: {message}")]
    Rpc { procedure: String, message: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SupabaseError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Reqwest(err) => err.is_timeout() || err.is_connect(),
            Self::RequestFailed { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::InvalidHeader(_)
            | Self::Url(_)
            | Self::Json(_)
            | Self::Rpc { .. }
            | Self::InvalidConfiguration(_) => false,
        }
    }
}

/// `{success, message?, ...}` body returned by the project's procedures.
/// A `success: false` body arrives with HTTP 200 and still means failure.
#[derive(Debug, serde::Deserialize)]
pub struct RpcEnvelope {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl RpcEnvelope {
    pub fn into_result<T: DeserializeOwned>(self, procedure: &str) -> Result<T, SupabaseError> {
        if !self.success {
            return Err(SupabaseError::Rpc {
                procedure: procedure.to_string(),
                message: self
                    .message
                    .unwrap_or_else(|| "procedure reported failure".to_string()),
            });
        }

        Ok(serde_json::from_value(Value::Object(self.payload))?)
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    rest_url: Url,
}

impl SupabaseClient {
    pub fn try_new(config: &SupabaseConfig) -> Result<Self, SupabaseError> {
        let anon_key = config
            .supabase_anon_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                SupabaseError::InvalidConfiguration("SUPABASE_ANON_KEY is required".to_string())
            })?;
        let token = config
            .supabase_access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .unwrap_or(anon_key);

        let headers = [
            (
                HeaderName::from_static("apikey"),
                HeaderValue::from_str(anon_key)?,
            ),
            (
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))?,
            ),
            (header::ACCEPT, HeaderValue::from_static("application/json")),
        ]
        .into_iter()
        .collect::<HeaderMap>();

        let base = config.supabase_url.trim_end_matches('/');
        let rest_url = Url::parse(&format!("{base}/rest/v1/"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.supabase_timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self { http, rest_url })
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url, SupabaseError> {
        let mut url = self.rest_url.join(path)?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(key, value)| (*key, value.as_str())));
        }
        Ok(url)
    }

    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, SupabaseError> {
        let url = self.endpoint(table, params)?;
        debug!("GET {url}");

        let response = self.http.get(url).send().await?;
        Self::parse(&format!("select {table}"), response).await
    }

    /// PATCH rows matching `filters` and return the updated representation.
    /// An empty vector means no row matched.
    pub async fn update<T, B>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> Result<Vec<T>, SupabaseError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(table, filters)?;
        debug!("PATCH {url}");

        let response = self
            .http
            .patch(url)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::parse(&format!("update {table}"), response).await
    }

    pub async fn rpc<A, T>(&self, procedure: &str, args: &A) -> Result<T, SupabaseError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(&format!("rpc/{procedure}"), &[])?;
        debug!("POST {url}");

        let response = self.http.post(url).json(args).send().await?;
        let envelope: RpcEnvelope = Self::parse(&format!("rpc {procedure}"), response).await?;
        envelope.into_result(procedure)
    }

    async fn parse<T: DeserializeOwned>(
        action: &str,
        response: Response,
    ) -> Result<T, SupabaseError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::RequestFailed {
                action: action.to_string(),
                status,
                body,
            });
        }

        Ok(response.json().await?)
    }
}
