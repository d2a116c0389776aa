//! HTTP collaborators: the artifact store, the connectivity read endpoint and
//! the conversation thread store.
//! Uses browser `fetch()` via gloo-net.

use async_trait::async_trait;
use gloo_net::http::{Request, Response};
use serde_json::{json, Value};

use nsflow_core::channel::path_segment;
use nsflow_core::ports::{ArtifactStorePort, ConnectivityPort, ThreadStorePort};
use nsflow_types::{
    ClientError, Result,
    artifact::{ArtifactRecord, Variant},
    network::NetworkGraph,
    thread::{NewMessage, NewThread, ThreadDetail, ThreadMessage, ThreadSummary},
};

const THEMES_PATH: &str = "/api/v1/themes";
const CONNECTIVITY_PATH: &str = "/api/v1/connectivity";
const THREADS_PATH: &str = "/api/v1/cruse/threads";

/// Theme persistence behind `{api}/api/v1/themes/{subject}`
pub struct HttpArtifactStore {
    api_base: String,
}

impl HttpArtifactStore {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }

    pub fn record_url(&self, subject: &str) -> String {
        endpoint(&self.api_base, THEMES_PATH, subject)
    }
}

#[async_trait(?Send)]
impl ArtifactStorePort for HttpArtifactStore {
    async fn fetch_artifact(&self, subject: &str) -> Result<Option<ArtifactRecord>> {
        let url = self.record_url(subject);
        let response = Request::get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if response.status() == 404 {
            log::debug!("No stored artifacts for {}", subject);
            return Ok(None);
        }
        let response = check_status(response, &url)?;

        let record: ArtifactRecord = response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        Ok(Some(record))
    }

    async fn save_artifact(&self, subject: &str, variant: Variant, artifact: &Value) -> Result<()> {
        let url = self.record_url(subject);
        let body = json!({
            "theme_type": variant.as_str(),
            "theme": artifact,
        });

        let response = Request::post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .map_err(|e| ClientError::Serialization(e.to_string()))?
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        check_status(response, &url)?;

        log::info!("Saved {} artifact for {}", variant, subject);
        Ok(())
    }
}

/// Connectivity graph behind `{api}/api/v1/connectivity/{subject}`
pub struct HttpConnectivitySource {
    api_base: String,
}

impl HttpConnectivitySource {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }

    pub fn network_url(&self, subject: &str) -> String {
        endpoint(&self.api_base, CONNECTIVITY_PATH, subject)
    }
}

#[async_trait(?Send)]
impl ConnectivityPort for HttpConnectivitySource {
    async fn fetch_network(&self, subject: &str) -> Result<NetworkGraph> {
        let url = self.network_url(subject);
        let response = Request::get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let response = check_status(response, &url)?;

        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }
}

/// Conversation threads behind `{api}/api/v1/cruse/threads`
pub struct HttpThreadStore {
    api_base: String,
}

impl HttpThreadStore {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }

    pub fn threads_url(&self) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), THREADS_PATH)
    }

    pub fn thread_url(&self, id: &str) -> String {
        endpoint(&self.api_base, THREADS_PATH, id)
    }

    pub fn messages_url(&self, thread_id: &str) -> String {
        format!("{}/messages", self.thread_url(thread_id))
    }
}

#[async_trait(?Send)]
impl ThreadStorePort for HttpThreadStore {
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let url = self.threads_url();
        let response = Request::get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        read_json(check_status(response, &url)?).await
    }

    async fn create_thread(&self, thread: &NewThread) -> Result<ThreadSummary> {
        let url = self.threads_url();
        let response = Request::post(&url)
            .json(thread)
            .map_err(|e| ClientError::Serialization(e.to_string()))?
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        read_json(check_status(response, &url)?).await
    }

    async fn get_thread(&self, id: &str) -> Result<Option<ThreadDetail>> {
        let url = self.thread_url(id);
        let response = Request::get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        if response.status() == 404 {
            return Ok(None);
        }
        read_json(check_status(response, &url)?).await.map(Some)
    }

    async fn delete_thread(&self, id: &str) -> Result<bool> {
        let url = self.thread_url(id);
        let response = Request::delete(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        if response.status() == 404 {
            return Ok(false);
        }
        check_status(response, &url)?;
        log::info!("Deleted thread {}", id);
        Ok(true)
    }

    async fn append_message(&self, thread_id: &str, message: &NewMessage) -> Result<ThreadMessage> {
        let url = self.messages_url(thread_id);
        let response = Request::post(&url)
            .json(message)
            .map_err(|e| ClientError::Serialization(e.to_string()))?
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        read_json(check_status(response, &url)?).await
    }

    async fn list_messages(&self, thread_id: &str, limit: usize, offset: usize) -> Result<Vec<ThreadMessage>> {
        let url = format!("{}?limit={}&offset={}", self.messages_url(thread_id), limit, offset);
        let response = Request::get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        read_json(check_status(response, &url)?).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| ClientError::Serialization(e.to_string()))
}

fn check_status(response: Response, url: &str) -> Result<Response> {
    if response.ok() {
        Ok(response)
    } else {
        Err(ClientError::Http {
            status: response.status(),
            url: url.to_string(),
        })
    }
}

/// `{base}{path}/{subject}` with the subject percent-encoded as one segment.
fn endpoint(api_base: &str, path: &str, subject: &str) -> String {
    format!("{}{}/{}", api_base.trim_end_matches('/'), path, path_segment(subject))
}
