//! StackOverflow questions: `stackoverflow.com/questions/{id}` via the
//! StackExchange API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linktracker_core::config::StackOverflowConfig;
use linktracker_core::error::{LinkTrackerError, Result};
use linktracker_core::traits::SourceChecker;
use linktracker_core::types::{Activity, TrackedLink};
use reqwest::Url;
use serde::Deserialize;

use crate::{bare_host, path_segments};

pub struct StackOverflowChecker {
    client: reqwest::Client,
    api_base: String,
    key: Option<String>,
}

impl StackOverflowChecker {
    pub fn new(client: reqwest::Client, config: &StackOverflowConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            key: config.key.clone().filter(|k| !k.is_empty()),
        }
    }

    /// Numeric question id for a supported URL.
    pub fn question_id(url: &Url) -> Option<u64> {
        if bare_host(url)? != "stackoverflow.com" {
            return None;
        }
        match path_segments(url).as_slice() {
            ["questions", id, ..] => id.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    #[serde(default)]
    items: Vec<Question>,
}

#[derive(Debug, Deserialize)]
struct Question {
    #[serde(with = "chrono::serde::ts_seconds")]
    last_activity_date: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    last_edit_date: Option<DateTime<Utc>>,
}

impl Question {
    fn into_activity(self) -> Activity {
        let description = if self.last_edit_date == Some(self.last_activity_date) {
            "question edited"
        } else {
            "new answer or comment"
        };
        Activity {
            last_activity: self.last_activity_date,
            description: description.into(),
        }
    }
}

#[async_trait]
impl SourceChecker for StackOverflowChecker {
    fn name(&self) -> &str {
        "stackoverflow"
    }

    fn supports(&self, url: &Url) -> bool {
        Self::question_id(url).is_some()
    }

    async fn check(&self, link: &TrackedLink) -> Result<Activity> {
        let url = Url::parse(&link.url)
            .map_err(|e| LinkTrackerError::Validation(format!("{}: {e}", link.url)))?;
        let id = Self::question_id(&url)
            .ok_or_else(|| LinkTrackerError::Validation(format!("not a StackOverflow question: {}", link.url)))?;

        let mut query = vec![("site", "stackoverflow".to_string())];
        if let Some(key) = &self.key {
            query.push(("key", key.clone()));
        }

        let resp = self
            .client
            .get(format!("{}/questions/{id}", self.api_base))
            .query(&query)
            .send()
            .await
            .map_err(|e| LinkTrackerError::SourceUnavailable(format!("StackExchange request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LinkTrackerError::SourceUnavailable(format!(
                "StackExchange API error {status} for question {id}"
            )));
        }

        let body: QuestionsResponse = resp
            .json()
            .await
            .map_err(|e| LinkTrackerError::SourceUnavailable(format!("Invalid StackExchange response: {e}")))?;

        body.items
            .into_iter()
            .next()
            .map(Question::into_activity)
            .ok_or_else(|| LinkTrackerError::NotFound(format!("StackOverflow question {id}")))
    }
}
