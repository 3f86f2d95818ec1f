//! # LinkTracker Sources
//!
//! Remote resource families a link can belong to. Each checker recognises its
//! URLs without I/O and looks up the resource's last activity with one request.
//!
//! The [`SourceRegistry`] holds checkers in a fixed order; the first checker
//! that supports a URL owns it.

pub mod github;
pub mod registry;
pub mod stackoverflow;

pub use github::GitHubChecker;
pub use registry::SourceRegistry;
pub use stackoverflow::StackOverflowChecker;

use std::time::Duration;

/// HTTP client shared by the checkers.
pub fn http_client() -> linktracker_core::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("LinkTracker/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| linktracker_core::LinkTrackerError::Config(format!("HTTP client: {e}")))
}

/// Non-empty path segments of a URL.
pub(crate) fn path_segments(url: &reqwest::Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Host without a leading `www.`.
pub(crate) fn bare_host(url: &reqwest::Url) -> Option<&str> {
    url.host_str().map(|h| h.strip_prefix("www.").unwrap_or(h))
}
