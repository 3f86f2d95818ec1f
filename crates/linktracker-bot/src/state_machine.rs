//! Dialogue state machine.
//!
//! [`transition`] is pure and total: every `(state, text)` pair yields the
//! next state and one [`Effect`]. It never touches storage; the bot executes
//! the effect and persists the next state.
//!
//! ```text
//! Idle ─/track─► AwaitingLink ─url─► AwaitingTags ─tags─► AwaitingFilters ─filters─► Idle (commit)
//! Idle ─/untrack─► AwaitingDeleteTarget ─url─► Idle (remove)
//! Idle ─/tags─► AwaitingTagEditTarget ─url─► AwaitingTagEditValue ─tags─► Idle (replace)
//! ```

use std::collections::BTreeSet;

use linktracker_core::types::{ConversationState, DialogStep, DraftLink};
use linktracker_sources::SourceRegistry;

use crate::replies;

/// Bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Track,
    Untrack,
    List,
    Tags,
    Cancel,
    Stop,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::Start,
        Command::Help,
        Command::Track,
        Command::Untrack,
        Command::List,
        Command::Tags,
        Command::Cancel,
        Command::Stop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Track => "track",
            Command::Untrack => "untrack",
            Command::List => "list",
            Command::Tags => "tags",
            Command::Cancel => "cancel",
            Command::Stop => "stop",
        }
    }

    /// Menu text registered with the chat platform.
    pub fn description(&self) -> &'static str {
        match self {
            Command::Start => "Register with the bot",
            Command::Help => "List commands",
            Command::Track => "Start tracking a link",
            Command::Untrack => "Stop tracking a link",
            Command::List => "Show tracked links",
            Command::Tags => "Change the tags of a link",
            Command::Cancel => "Abandon the current dialogue",
            Command::Stop => "Remove all your data",
        }
    }
}

/// One classified chat input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input<'a> {
    Command(Command),
    UnknownCommand,
    Text(&'a str),
}

impl<'a> Input<'a> {
    /// `/cmd` and `/cmd@botname` are commands; anything else is text.
    fn classify(text: &'a str) -> Self {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Input::Text(text);
        };
        let word = rest.split_whitespace().next().unwrap_or_default();
        let name = word.split('@').next().unwrap_or_default();
        Command::ALL
            .into_iter()
            .find(|c| c.name() == name)
            .map_or(Input::UnknownCommand, Input::Command)
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send this text, nothing else.
    Reply(String),
    /// No reply at all.
    Silent,
    Register,
    Deregister,
    List,
    /// Persist the finished draft as a subscription.
    Commit(DraftLink),
    Untrack(String),
    /// Check that the subscriber tracks this URL before asking for tags.
    SelectTagTarget(String),
    ReplaceTags { url: String, tags: BTreeSet<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConversationState,
    pub effect: Effect,
}

impl Transition {
    fn to(step: DialogStep, draft: DraftLink, effect: Effect) -> Self {
        Self {
            next: ConversationState::at(step, draft),
            effect,
        }
    }

    fn idle(effect: Effect) -> Self {
        Self {
            next: ConversationState::idle(),
            effect,
        }
    }

    fn reply(step: DialogStep, draft: DraftLink, text: &str) -> Self {
        Self::to(step, draft, Effect::Reply(text.to_string()))
    }
}

/// Compute the next dialogue state for `text`.
pub fn transition(state: &ConversationState, text: &str, sources: &SourceRegistry) -> Transition {
    match Input::classify(text) {
        Input::Command(command) => on_command(state, command),
        Input::UnknownCommand => Transition {
            next: state.clone(),
            effect: Effect::Reply(replies::UNKNOWN_COMMAND.into()),
        },
        Input::Text(text) => on_text(state, text, sources),
    }
}

fn on_command(state: &ConversationState, command: Command) -> Transition {
    let empty = DraftLink::default();
    match command {
        // Read-only: a dialogue in progress survives these.
        Command::Help => Transition {
            next: state.clone(),
            effect: Effect::Reply(replies::HELP.into()),
        },
        Command::List => Transition {
            next: state.clone(),
            effect: Effect::List,
        },

        Command::Start => Transition::idle(Effect::Register),
        Command::Stop => Transition::idle(Effect::Deregister),
        Command::Track => Transition::reply(DialogStep::AwaitingLink, empty, replies::LINK_PROMPT),
        Command::Untrack => {
            Transition::reply(DialogStep::AwaitingDeleteTarget, empty, replies::UNTRACK_PROMPT)
        }
        Command::Tags => {
            Transition::reply(DialogStep::AwaitingTagEditTarget, empty, replies::TAG_TARGET_PROMPT)
        }
        Command::Cancel if state.is_idle() => {
            Transition::idle(Effect::Reply(replies::NOTHING_TO_CANCEL.into()))
        }
        Command::Cancel => Transition::idle(Effect::Reply(replies::CANCELLED.into())),
    }
}

fn on_text(state: &ConversationState, text: &str, sources: &SourceRegistry) -> Transition {
    let mut draft = state.draft.clone();
    match state.step {
        DialogStep::Idle => Transition::idle(Effect::Silent),

        DialogStep::AwaitingLink => match sources.canonicalize(text) {
            Some(url) => {
                draft.url = Some(url);
                Transition::reply(DialogStep::AwaitingTags, draft, replies::TAGS_PROMPT)
            }
            None => Transition::idle(Effect::Reply(replies::FORMAT_HELP.into())),
        },

        DialogStep::AwaitingTags => {
            draft.tags = parse_words(text);
            Transition::reply(DialogStep::AwaitingFilters, draft, replies::FILTERS_PROMPT)
        }

        DialogStep::AwaitingFilters => {
            draft.filters = parse_words(text);
            Transition::idle(Effect::Commit(draft))
        }

        DialogStep::AwaitingDeleteTarget => Transition::idle(Effect::Untrack(target_url(text, sources))),

        DialogStep::AwaitingTagEditTarget => {
            let url = target_url(text, sources);
            draft.url = Some(url.clone());
            Transition::to(DialogStep::AwaitingTagEditValue, draft, Effect::SelectTagTarget(url))
        }

        DialogStep::AwaitingTagEditValue => match draft.url {
            Some(url) => Transition::idle(Effect::ReplaceTags {
                url,
                tags: parse_words(text),
            }),
            None => Transition::idle(Effect::Reply(replies::GENERIC_ERROR.into())),
        },
    }
}

/// `-` means "none"; otherwise whitespace-separated words.
pub fn parse_words(text: &str) -> BTreeSet<String> {
    let text = text.trim();
    if text == "-" {
        return BTreeSet::new();
    }
    text.split_whitespace().map(str::to_string).collect()
}

/// Canonical form when recognisable, so the lookup matches what `/track`
/// stored; the trimmed input otherwise.
fn target_url(text: &str, sources: &SourceRegistry) -> String {
    sources
        .canonicalize(text)
        .unwrap_or_else(|| text.trim().to_string())
}
