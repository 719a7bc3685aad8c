//! Lambda Labs Cloud API client.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::types::{LaunchResponse, TerminateResponse};
use super::{
    InstanceId, InstanceTypeOffering, LaunchRequest, Provider, ProviderError, ProviderFuture,
    RunningInstance, SshKey,
};

/// Base URL of the Lambda Labs Cloud API.
pub const DEFAULT_API_BASE: &str = "https://cloud.lambdalabs.com/api/v1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Authenticated client for the Lambda Labs Cloud API.
#[derive(Clone, Debug)]
pub struct LambdaClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl LambdaClient {
    /// Creates a client for `api_base` authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Client`] when the HTTP client cannot be
    /// built.
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| ProviderError::Client(err.to_string()))?;
        let base = api_base.into();
        Ok(Self {
            client,
            api_base: base.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }

    /// Issues an authenticated call and decodes the `data` member of the
    /// response.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::CallFailed`] for non-success statuses,
    /// [`ProviderError::Transport`] when no response arrives, and
    /// [`ProviderError::Decode`] when the payload does not match `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.api_base);
        debug!(%method, %url, "provider request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.api_key);
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let transport = |err: reqwest::Error| ProviderError::Transport {
            method: method.to_string(),
            path: path.to_owned(),
            message: err.to_string(),
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if !status.is_success() {
            warn!(%method, path, status = status.as_u16(), body = %text, "provider call failed");
            return Err(ProviderError::CallFailed {
                method: method.to_string(),
                path: path.to_owned(),
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str::<Envelope<T>>(&text)
            .map(|envelope| envelope.data)
            .map_err(|err| ProviderError::Decode {
                path: path.to_owned(),
                message: err.to_string(),
            })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        self.call(path, Method::GET, None).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ProviderError> {
        self.call(path, Method::POST, Some(body)).await
    }
}

impl Provider for LambdaClient {
    fn list_instance_types(&self) -> ProviderFuture<'_, Vec<InstanceTypeOffering>> {
        Box::pin(async move {
            let catalogue: BTreeMap<String, InstanceTypeOffering> =
                self.get("/instance-types").await?;
            Ok(catalogue
                .into_iter()
                .map(|(name, offering)| offering.named(name))
                .collect())
        })
    }

    fn list_instances(&self) -> ProviderFuture<'_, Vec<RunningInstance>> {
        Box::pin(async move { self.get("/instances").await })
    }

    fn list_ssh_keys(&self) -> ProviderFuture<'_, Vec<SshKey>> {
        Box::pin(async move { self.get("/ssh-keys").await })
    }

    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> ProviderFuture<'a, Vec<InstanceId>> {
        Box::pin(async move {
            let response: LaunchResponse = self
                .post("/instance-operations/launch", &json!(request))
                .await?;
            Ok(response.instance_ids)
        })
    }

    fn instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, RunningInstance> {
        Box::pin(async move { self.get(&format!("/instances/{id}")).await })
    }

    fn terminate<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, Vec<RunningInstance>> {
        Box::pin(async move {
            let body = json!({ "instance_ids": [id] });
            let response: TerminateResponse = self
                .post("/instance-operations/terminate", &body)
                .await?;
            Ok(response.terminated_instances)
        })
    }
}

