//! Autocomplete provider registry.
//!
//! The host's autocomplete engine computes candidates for the text around
//! the cursor. This registry holds one provider per trigger category and,
//! once spliced into the engine via [`AutocompleteRegistry::attach`],
//! contributes extra candidates to the host's own list.
//!
//! Category selection is positional, not priority-based: the text
//! immediately preceding the cursor determines a single [`TriggerKind`]
//! (`@word` → mention, `/word` at the start of the input → command, a
//! registered custom trigger char → custom, anything else → emote), and
//! only the provider registered for that category is consulted. Candidate
//! sequences are finite and recomputed on every call; the underlying
//! candidate sets (emote inventories, active chatters) change between
//! keystrokes, so nothing is cached.

use crate::error::Result;
use crate::instance::Value;
use crate::locator::Handle;
use crate::patch::{install, Patch};
use parking_lot::RwLock;
use smartstring::alias::String as SmartString;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Trigger category of an autocomplete query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Free-text emote completion (no trigger symbol).
    Emote,
    /// `@`-prefixed user mention.
    Mention,
    /// `/`-prefixed command at the start of the input.
    Command,
    /// A feature-registered trigger character (e.g. `:` or `!`).
    Custom(char),
}

impl TriggerKind {
    /// Host-facing label for this category.
    pub fn label(&self) -> SmartString {
        match self {
            TriggerKind::Emote => SmartString::from("emote"),
            TriggerKind::Mention => SmartString::from("mention"),
            TriggerKind::Command => SmartString::from("command"),
            TriggerKind::Custom(c) => {
                let mut s = SmartString::new();
                s.push(*c);
                s
            }
        }
    }
}

/// A detected trigger: category plus the byte offset where the token
/// begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    /// Detected category.
    pub kind: TriggerKind,
    /// Byte offset of the token start (the trigger symbol, if any).
    pub start: usize,
}

/// The query handed to a provider's matcher.
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery<'a> {
    /// Full input text.
    pub text: &'a str,
    /// Cursor byte offset into `text`.
    pub cursor: usize,
    /// The token under completion, trigger symbol stripped for
    /// symbol-triggered categories; the whole word for emotes.
    pub token: &'a str,
    /// Category the query was routed by.
    pub kind: TriggerKind,
}

/// One candidate produced by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// The text currently under the cursor that this candidate completes.
    pub current: SmartString,
    /// Full replacement to splice into the input on selection.
    pub replacement: SmartString,
    /// Category the candidate belongs to.
    pub kind: TriggerKind,
}

impl MatchCandidate {
    /// Create a candidate.
    pub fn new(
        current: impl AsRef<str>,
        replacement: impl AsRef<str>,
        kind: TriggerKind,
    ) -> Self {
        Self {
            current: SmartString::from(current.as_ref()),
            replacement: SmartString::from(replacement.as_ref()),
            kind,
        }
    }

    /// Encode as a host-shaped object (`{current, replacement, type}`).
    pub fn to_value(&self) -> Value {
        Value::object([
            ("current", Value::from(self.current.clone())),
            ("replacement", Value::from(self.replacement.clone())),
            ("type", Value::from(self.kind.label())),
        ])
    }
}

/// Lazily consumed, finite sequence of candidates.
pub type CandidateIter = Box<dyn Iterator<Item = MatchCandidate>>;

type MatcherFn = dyn Fn(&MatchQuery<'_>) -> CandidateIter + Send + Sync;

/// A provider for one trigger category.
#[derive(Clone)]
pub struct AutocompleteProvider {
    kind: TriggerKind,
    tab_trigger: bool,
    matcher: Arc<MatcherFn>,
}

impl AutocompleteProvider {
    /// Create a provider for a category.
    ///
    /// # Example
    ///
    /// ```
    /// use graft::autocomplete::{AutocompleteProvider, MatchCandidate, TriggerKind};
    ///
    /// let provider = AutocompleteProvider::new(TriggerKind::Mention, |query| {
    ///     let token = query.token.to_lowercase();
    ///     let logins = ["alice", "alberto", "bob"];
    ///     Box::new(
    ///         logins
    ///             .into_iter()
    ///             .filter(move |l| l.starts_with(&token))
    ///             .map(|l| MatchCandidate::new(l, format!("@{l}"), TriggerKind::Mention))
    ///             .collect::<Vec<_>>()
    ///             .into_iter(),
    ///     )
    /// });
    /// assert_eq!(provider.kind(), TriggerKind::Mention);
    /// ```
    pub fn new<F>(kind: TriggerKind, matcher: F) -> Self
    where
        F: Fn(&MatchQuery<'_>) -> CandidateIter + Send + Sync + 'static,
    {
        Self {
            kind,
            tab_trigger: false,
            matcher: Arc::new(matcher),
        }
    }

    /// Allow selecting this provider's top candidate with the tab key.
    pub fn tab_trigger(mut self, enabled: bool) -> Self {
        self.tab_trigger = enabled;
        self
    }

    /// Category this provider serves.
    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    /// Whether tab selection is enabled.
    pub fn can_be_triggered_by_tab(&self) -> bool {
        self.tab_trigger
    }
}

impl fmt::Debug for AutocompleteProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutocompleteProvider")
            .field("kind", &self.kind)
            .field("tab_trigger", &self.tab_trigger)
            .finish_non_exhaustive()
    }
}

/// Registry holding at most one provider per trigger category.
///
/// Cloning shares the registry, so the same instance can be captured by an
/// installed patch and still be registered against by features.
#[derive(Clone, Default)]
pub struct AutocompleteRegistry {
    providers: Arc<RwLock<Vec<AutocompleteProvider>>>,
}

impl AutocompleteRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. A later registration for the same category
    /// replaces the earlier one; one provider per category.
    pub fn register(&self, provider: AutocompleteProvider) {
        let mut providers = self.providers.write();
        providers.retain(|p| p.kind != provider.kind);
        providers.push(provider);
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    /// True when no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Detect the trigger category at `cursor` and delegate to the provider
    /// registered for it. No provider for the detected category yields an
    /// empty sequence, never an error.
    ///
    /// `cursor` is a byte offset; it is clamped into the text and snapped
    /// back to the nearest char boundary, so arbitrary host-reported
    /// positions cannot panic.
    pub fn get_matches(&self, text: &str, cursor: usize) -> CandidateIter {
        let cursor = clamp_cursor(text, cursor);
        let custom: Vec<char> = self
            .providers
            .read()
            .iter()
            .filter_map(|p| match p.kind {
                TriggerKind::Custom(c) => Some(c),
                _ => None,
            })
            .collect();
        let trigger = detect_trigger(text, cursor, &custom);

        let matcher = self
            .providers
            .read()
            .iter()
            .find(|p| p.kind == trigger.kind)
            .map(|p| p.matcher.clone());
        let Some(matcher) = matcher else {
            return Box::new(std::iter::empty());
        };

        let token_start = match trigger.kind {
            // Strip the trigger symbol.
            TriggerKind::Mention | TriggerKind::Command | TriggerKind::Custom(_) => {
                trigger.start + text[trigger.start..cursor].chars().next().map_or(0, char::len_utf8)
            }
            TriggerKind::Emote => trigger.start,
        };
        let query = MatchQuery {
            text,
            cursor,
            token: &text[token_start..cursor],
            kind: trigger.kind,
        };

        // Provider faults are isolated: a panicking matcher contributes
        // nothing instead of unwinding into the host's query path.
        match catch_unwind(AssertUnwindSafe(|| matcher(&query))) {
            Ok(iter) => iter,
            Err(_) => {
                tracing::warn!(kind = %trigger.kind.label(), "autocomplete matcher panicked");
                Box::new(std::iter::empty())
            }
        }
    }

    /// Splice this registry into a host autocomplete engine.
    ///
    /// Installs an around-mode patch on the engine's `getMatches`: the
    /// host's own candidates are computed first, then this registry's
    /// candidates (host-encoded via [`MatchCandidate::to_value`]) are
    /// appended. The cursor is read from the engine's `selectionStart`
    /// field.
    pub fn attach(&self, handle: &Handle) -> Result<()> {
        let registry = self.clone();
        install(
            handle,
            "getMatches",
            Patch::around(move |inst, original, args| {
                let mut candidates = match original.call(inst, args) {
                    Value::List(items) => items,
                    _ => Vec::new(),
                };
                let text = args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let cursor = inst
                    .field("selectionStart")
                    .and_then(|v| v.as_f64())
                    .map(|f| f as usize)
                    .unwrap_or(text.len());
                for candidate in registry.get_matches(&text, cursor) {
                    candidates.push(candidate.to_value());
                }
                Value::List(candidates)
            }),
        )
    }
}

impl fmt::Debug for AutocompleteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutocompleteRegistry")
            .field("providers", &self.len())
            .finish()
    }
}

/// Detect the trigger category for the token ending at `cursor`.
pub fn detect_trigger(text: &str, cursor: usize, custom: &[char]) -> Trigger {
    let cursor = clamp_cursor(text, cursor);
    let before = &text[..cursor];
    let start = before
        .rfind(char::is_whitespace)
        .map(|i| i + before[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);
    let token = &before[start..];

    let kind = match token.chars().next() {
        Some('@') => TriggerKind::Mention,
        Some('/') if start == 0 => TriggerKind::Command,
        Some(c) if custom.contains(&c) => TriggerKind::Custom(c),
        _ => TriggerKind::Emote,
    };
    Trigger { kind, start }
}

fn clamp_cursor(text: &str, cursor: usize) -> usize {
    let mut cursor = cursor.min(text.len());
    while cursor > 0 && !text.is_char_boundary(cursor) {
        cursor -= 1;
    }
    cursor
}
