use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStatus {
    pub version: String,
    pub status: String,
    pub active_sessions: u64,
    pub total_sessions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub name: String,
    pub mount: String,
    pub bucket: String,
}

pub struct RelayClient {
    client: Client,
    relay_url: String,
    admin_url: Option<String>,
    admin_key: Option<String>,
}

impl RelayClient {
    pub fn new(relay_url: &str) -> Self {
        Self {
            client: Client::new(),
            relay_url: relay_url.trim_end_matches('/').to_string(),
            admin_url: None,
            admin_key: None,
        }
    }

    /// Point the client at the admin API.
    pub fn with_admin(mut self, admin_url: &str, api_key: &str) -> Self {
        self.admin_url = Some(admin_url.trim_end_matches('/').to_string());
        self.admin_key = Some(api_key.to_string());
        self
    }

    /// Fetch an object through the relay. Non-success statuses are returned
    /// as responses, not errors.
    pub async fn get_object(&self, path: &str) -> Result<Response, reqwest::Error> {
        self.client.get(format!("{}{}", self.relay_url, path)).send().await
    }

    pub async fn admin_status(&self) -> Result<RelayStatus, Box<dyn std::error::Error>> {
        self.admin_get("/admin/status").await
    }

    pub async fn admin_routes(&self) -> Result<Vec<RouteInfo>, Box<dyn std::error::Error>> {
        self.admin_get("/admin/routes").await
    }

    async fn admin_get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, Box<dyn std::error::Error>> {
        let (url, key) = match (&self.admin_url, &self.admin_key) {
            (Some(url), Some(key)) => (url, key),
            _ => return Err("admin API not configured".into()),
        };

        let resp = self
            .client
            .get(format!("{url}{path}"))
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(format!("Admin API returned error status {}: {}", status, text).into());
        }

        Ok(serde_json::from_str(&text)?)
    }
}
