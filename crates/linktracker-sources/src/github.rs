//! GitHub repositories: `github.com/{owner}/{repo}` via the REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linktracker_core::config::GitHubConfig;
use linktracker_core::error::{LinkTrackerError, Result};
use linktracker_core::traits::SourceChecker;
use linktracker_core::types::{Activity, TrackedLink};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::{bare_host, path_segments};

pub struct GitHubChecker {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubChecker {
    pub fn new(client: reqwest::Client, config: &GitHubConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        }
    }

    /// `(owner, repo)` for a supported URL.
    pub fn repository(url: &Url) -> Option<(String, String)> {
        if bare_host(url)? != "github.com" {
            return None;
        }
        match path_segments(url).as_slice() {
            [owner, repo, ..] => Some((owner.to_string(), repo.trim_end_matches(".git").to_string())),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    pushed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl RepositoryResponse {
    fn into_activity(self) -> Activity {
        match self.pushed_at {
            Some(pushed) if pushed >= self.updated_at => Activity {
                last_activity: pushed,
                description: "new commit pushed".into(),
            },
            _ => Activity {
                last_activity: self.updated_at,
                description: "repository updated".into(),
            },
        }
    }
}

#[async_trait]
impl SourceChecker for GitHubChecker {
    fn name(&self) -> &str {
        "github"
    }

    fn supports(&self, url: &Url) -> bool {
        Self::repository(url).is_some()
    }

    async fn check(&self, link: &TrackedLink) -> Result<Activity> {
        let url = Url::parse(&link.url)
            .map_err(|e| LinkTrackerError::Validation(format!("{}: {e}", link.url)))?;
        let (owner, repo) = Self::repository(&url)
            .ok_or_else(|| LinkTrackerError::Validation(format!("not a GitHub repository: {}", link.url)))?;

        let mut req = self
            .client
            .get(format!("{}/repos/{owner}/{repo}", self.api_base))
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| LinkTrackerError::SourceUnavailable(format!("GitHub request failed: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                return Err(LinkTrackerError::NotFound(format!("GitHub repository {owner}/{repo}")));
            }
            status if !status.is_success() => {
                return Err(LinkTrackerError::SourceUnavailable(format!(
                    "GitHub API error {status} for {owner}/{repo}"
                )));
            }
            _ => {}
        }

        let body: RepositoryResponse = resp
            .json()
            .await
            .map_err(|e| LinkTrackerError::SourceUnavailable(format!("Invalid GitHub response: {e}")))?;
        Ok(body.into_activity())
    }
}
