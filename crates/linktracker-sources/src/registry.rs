//! Source registry: ordered checker list and URL validation.
//!
//! Order matters: the first checker whose `supports` accepts a URL handles it.
//! `from_config` registers GitHub before StackOverflow.

use std::sync::Arc;

use linktracker_core::config::LinkTrackerConfig;
use linktracker_core::error::Result;
use linktracker_core::traits::SourceChecker;
use reqwest::Url;

use crate::{GitHubChecker, StackOverflowChecker, bare_host};

#[derive(Clone, Default)]
pub struct SourceRegistry {
    checkers: Vec<Arc<dyn SourceChecker>>,
}

impl SourceRegistry {
    pub fn new(checkers: Vec<Arc<dyn SourceChecker>>) -> Self {
        Self { checkers }
    }

    /// GitHub, then StackOverflow, sharing one HTTP client.
    pub fn from_config(config: &LinkTrackerConfig) -> Result<Self> {
        let client = crate::http_client()?;
        Ok(Self::new(vec![
            Arc::new(GitHubChecker::new(client.clone(), &config.github)),
            Arc::new(StackOverflowChecker::new(client, &config.stackoverflow)),
        ]))
    }

    /// Append a checker after the existing ones.
    pub fn register(&mut self, checker: Arc<dyn SourceChecker>) {
        tracing::debug!("🔌 Source registered: {}", checker.name());
        self.checkers.push(checker);
    }

    /// First checker supporting `url`.
    pub fn find(&self, url: &str) -> Option<&Arc<dyn SourceChecker>> {
        let parsed = parse_web_url(url)?;
        self.checkers.iter().find(|c| c.supports(&parsed))
    }

    pub fn is_trackable(&self, url: &str) -> bool {
        self.find(url).is_some()
    }

    /// Canonical form of a trackable URL: `https`, lower-case host without
    /// `www.`, no fragment, no query, no trailing slash. `None` when no
    /// checker supports it.
    pub fn canonicalize(&self, url: &str) -> Option<String> {
        let mut parsed = parse_web_url(url)?;
        if !self.checkers.iter().any(|c| c.supports(&parsed)) {
            return None;
        }
        let host = bare_host(&parsed)?.to_string();
        parsed.set_host(Some(&host)).ok()?;
        parsed.set_scheme("https").ok()?;
        parsed.set_fragment(None);
        parsed.set_query(None);
        let canonical = parsed.as_str().trim_end_matches('/').to_string();
        Some(canonical)
    }

    pub fn names(&self) -> Vec<&str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

fn parse_web_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use linktracker_core::types::{Activity, TrackedLink};

    /// Accepts every URL on one host.
    struct HostChecker {
        name: &'static str,
        host: &'static str,
    }

    #[async_trait]
    impl SourceChecker for HostChecker {
        fn name(&self) -> &str {
            self.name
        }

        fn supports(&self, url: &Url) -> bool {
            url.host_str() == Some(self.host)
        }

        async fn check(&self, _link: &TrackedLink) -> Result<Activity> {
            unreachable!("registry never checks")
        }
    }

    fn defaults() -> SourceRegistry {
        SourceRegistry::from_config(&LinkTrackerConfig::default()).unwrap()
    }

    #[test]
    fn test_default_order_is_github_then_stackoverflow() {
        assert_eq!(defaults().names(), vec!["github", "stackoverflow"]);
    }

    #[test]
    fn test_find_routes_by_url_shape() {
        let registry = defaults();
        assert_eq!(registry.find("https://github.com/acme/widget").unwrap().name(), "github");
        assert_eq!(
            registry.find("https://stackoverflow.com/questions/42").unwrap().name(),
            "stackoverflow"
        );
        assert!(registry.find("https://example.com/not-supported").is_none());
        assert!(registry.find("not a url").is_none());
        assert!(registry.find("ftp://github.com/acme/widget").is_none());
    }

    #[test]
    fn test_first_supporting_checker_wins() {
        let mut registry = SourceRegistry::default();
        registry.register(Arc::new(HostChecker { name: "first", host: "example.com" }));
        registry.register(Arc::new(HostChecker { name: "second", host: "example.com" }));
        assert_eq!(registry.find("https://example.com/x").unwrap().name(), "first");
    }

    #[test]
    fn test_canonicalize() {
        let registry = defaults();
        assert_eq!(
            registry.canonicalize("  https://GitHub.com/acme/widget/?tab=readme#top ").as_deref(),
            Some("https://github.com/acme/widget")
        );
        assert_eq!(
            registry.canonicalize("https://stackoverflow.com/questions/42/").as_deref(),
            Some("https://stackoverflow.com/questions/42")
        );
        assert_eq!(registry.canonicalize("https://example.com/not-supported"), None);
    }

    #[test]
    fn test_canonicalize_merges_host_and_scheme_variants() {
        let registry = defaults();
        for variant in [
            "https://github.com/acme/widget",
            "https://www.github.com/acme/widget",
            "http://github.com/acme/widget",
            "http://www.GitHub.com/acme/widget/",
        ] {
            assert_eq!(
                registry.canonicalize(variant).as_deref(),
                Some("https://github.com/acme/widget"),
                "{variant}"
            );
        }
        for variant in [
            "http://stackoverflow.com/questions/42",
            "https://www.stackoverflow.com/questions/42#answer-7",
        ] {
            assert_eq!(
                registry.canonicalize(variant).as_deref(),
                Some("https://stackoverflow.com/questions/42"),
                "{variant}"
            );
        }
    }
}
