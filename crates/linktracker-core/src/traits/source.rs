//! Source checker trait: one implementation per external resource family.

use async_trait::async_trait;
use reqwest::Url;

use crate::error::Result;
use crate::types::{Activity, TrackedLink};

#[async_trait]
pub trait SourceChecker: Send + Sync {
    /// Short name used in logs ("github", "stackoverflow").
    fn name(&self) -> &str;

    /// Whether this checker understands `url`. Pure: no I/O.
    fn supports(&self, url: &Url) -> bool;

    /// Fetch the remote resource's last activity. Performs one remote lookup.
    /// Every failure (network, decode, not found) is an `Err`.
    async fn check(&self, link: &TrackedLink) -> Result<Activity>;
}
