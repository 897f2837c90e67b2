//! A thin `reqwest` wrapper over `keystoned`'s HTTP control API (`spec.md`
//! §6.3), plus the exit-code-aware error type `keystonectl`'s `main`
//! translates into a process exit status (`spec.md` §7).

use std::fmt;

use keystone_api::ApiError;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

#[derive(Clone, Debug)]
pub struct KeystoneApiClient {
    client: Client,
    base_url: url::Url,
}

impl KeystoneApiClient {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, CliError> {
        let mut base_url = url::Url::parse(base_url.as_ref())
            .map_err(|e| CliError::InvalidServer(e.to_string()))?;
        // A trailing slash makes `Url::join` treat every route as relative
        // to the server root instead of replacing the last path segment.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> url::Url {
        self.base_url
            .join(path.trim_start_matches('/'))
            .expect("route path is a valid relative URL")
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.endpoint(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.endpoint(path))
    }
}

/// An error `keystonectl` can report to the operator, carrying enough
/// information to pick a distinguishable process exit code (`spec.md`
/// §7's `ASSERT`/`CONFIG`/`BACKEND`/`CONFLICT`/`NOT_FOUND`/`IO` taxonomy).
#[derive(Debug)]
pub enum CliError {
    InvalidServer(String),
    /// An argument combination that `clap` can't express as a static
    /// constraint (e.g. "exactly one of --zonefile or --dns").
    Usage(String),
    /// The request never reached the daemon, or its response body wasn't
    /// the JSON we expected.
    Transport(String),
    /// The daemon processed the request and rejected it.
    Api(ApiError),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidServer(_) | Self::Usage(_) => 78,
            Self::Transport(_) => 69,
            Self::Api(err) => err.kind.exit_code(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidServer(msg) => write!(f, "invalid --server address: {msg}"),
            Self::Usage(msg) => write!(f, "{msg}"),
            Self::Transport(msg) => write!(f, "{msg}"),
            Self::Api(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<reqwest::Error> for CliError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Sends a request built with [`KeystoneApiClient::get`]/`post`, decoding a
/// successful response as `T` and an unsuccessful one as the daemon's
/// [`ApiError`] body.
pub async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, CliError> {
    let response = request.send().await?;
    decode(response).await
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, CliError> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        let err: ApiError = response
            .json()
            .await
            .map_err(|e| CliError::Transport(e.to_string()))?;
        Err(CliError::Api(err))
    }
}

/// As [`send`], but for routes whose successful response has no body.
pub async fn send_unit(request: RequestBuilder) -> Result<(), CliError> {
    let response = request.send().await?;
    if response.status().is_success() {
        Ok(())
    } else {
        let err: ApiError = response
            .json()
            .await
            .map_err(|e| CliError::Transport(e.to_string()))?;
        Err(CliError::Api(err))
    }
}
