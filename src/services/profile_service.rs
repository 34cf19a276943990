use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Minimal profile shape served by the external user service. Profile CRUD
/// itself lives outside this backend; we only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<String>,
}

#[derive(Clone)]
pub struct ProfileService {
    base_url: String,
    client: Client,
}

impl ProfileService {
    pub fn new(base_url: String, client: Client) -> Self {
        Self { base_url, client }
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let url = format!("{}/users/{}", self.base_url, user_id);
        let resp = self.client.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let profile = resp.error_for_status()?.json::<UserProfile>().await?;
        Ok(Some(profile))
    }

    /// Name/username search used to discover a counterpart to message.
    pub async fn search_users(&self, query: &str, limit: u32) -> Result<Vec<UserProfile>> {
        let url = format!("{}/users/search", self.base_url);
        let users = self
            .client
            .get(&url)
            .query(&[("q", query), ("limit", &limit.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<UserProfile>>()
            .await?;
        Ok(users)
    }
}
