//! User-facing reply texts.

use std::collections::BTreeMap;

use linktracker_core::types::TrackedLink;

pub const WELCOME: &str = "👋 Welcome to LinkTracker! Send /track to follow a GitHub repository \
or a StackOverflow question. /help lists every command.";
pub const WELCOME_BACK: &str = "👋 You are already registered. /help lists every command.";

pub const HELP: &str = "Commands:\n\
/start - register\n\
/track - start tracking a link\n\
/untrack - stop tracking a link\n\
/list - show tracked links grouped by tag\n\
/tags - change the tags of a tracked link\n\
/cancel - abandon the current dialogue\n\
/stop - remove all your data\n\
/help - this message";

pub const LINK_PROMPT: &str =
    "Send the link to track (a GitHub repository or a StackOverflow question).";
pub const TAGS_PROMPT: &str = "Send tags separated by spaces, or - for none.";
pub const FILTERS_PROMPT: &str = "Send filters separated by spaces, or - for none.";
pub const FORMAT_HELP: &str = "⚠️ Unsupported link. Use https://github.com/{owner}/{repo} \
or https://stackoverflow.com/questions/{id}.";

pub const UNTRACK_PROMPT: &str = "Send the link to stop tracking.";
pub const TAG_TARGET_PROMPT: &str = "Send the tracked link whose tags you want to change.";
pub const TAG_VALUE_PROMPT: &str = "Send the new tags separated by spaces, or - for none.";

pub const CANCELLED: &str = "Cancelled.";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";
pub const UNKNOWN_COMMAND: &str = "Unknown command. /help lists every command.";
pub const EMPTY_LIST: &str = "You are not tracking any links yet. Send /track to add one.";
pub const GOODBYE: &str = "👋 Your subscriptions were removed. Send /start to come back.";
pub const NOT_REGISTERED: &str = "You are not registered. Send /start first.";
pub const GENERIC_ERROR: &str = "⚠️ Something went wrong, please try again later.";

/// Heading for links without tags in `/list`.
pub const UNTAGGED: &str = "untagged";

pub fn now_tracking(url: &str) -> String {
    format!("✅ Now tracking {url}")
}

pub fn already_tracking(url: &str) -> String {
    format!("You are already tracking {url}.")
}

pub fn not_tracking(url: &str) -> String {
    format!("You are not tracking {url}.")
}

pub fn untracked(url: &str) -> String {
    format!("🗑️ Stopped tracking {url}")
}

pub fn tags_updated(url: &str) -> String {
    format!("🏷️ Tags for {url} updated.")
}

/// `/list` body: one section per tag, untagged links last. A link with
/// several tags appears under each of them.
pub fn link_list(links: &[TrackedLink]) -> String {
    if links.is_empty() {
        return EMPTY_LIST.to_string();
    }

    let mut by_tag: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut untagged = Vec::new();
    for link in links {
        if link.tags.is_empty() {
            untagged.push(link.url.as_str());
        }
        for tag in &link.tags {
            by_tag.entry(tag.as_str()).or_default().push(link.url.as_str());
        }
    }

    let mut out = String::from("📋 Tracked links:");
    let sections = by_tag
        .into_iter()
        .map(|(tag, urls)| (format!("#{tag}"), urls))
        .chain((!untagged.is_empty()).then(|| (UNTAGGED.to_string(), untagged)));
    for (heading, urls) in sections {
        out.push_str(&format!("\n\n{heading}"));
        for url in urls {
            out.push_str(&format!("\n• {url}"));
        }
    }
    out
}
