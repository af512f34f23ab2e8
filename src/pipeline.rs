//! Message pipeline: ordered fan-out of chat lines and VOD comments.
//!
//! The host delivers new messages through its own entry points
//! (`pushMessage` on the chat controller, `handleMessage` on the message
//! handler API). [`MessagePipeline::attach`] splices a before-mode patch
//! onto such an entry point so every host-delivered message is normalized
//! into a [`ChatMessage`] and fanned out to registered handlers, in
//! registration order, with per-handler faults isolated.
//!
//! [`MessagePipeline::dispatch`] is the same fan-out invoked directly: a
//! feature synthesizing a local/system message calls it with a constructed
//! envelope. Dispatch performs no host-side action whatsoever; it is pure
//! local delivery.

use crate::error::Result;
use crate::instance::{FieldMap, Value};
use crate::locator::Handle;
use crate::patch::{install, Patch};
use bitflags::bitflags;
use parking_lot::RwLock;
use smallvec::SmallVec;
use smartstring::alias::String as SmartString;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

bitflags! {
    /// Moderation and display flags on a normalized message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MessageFlags: u32 {
        /// Message was deleted by a moderator.
        const DELETED = 1 << 0;
        /// Message arrived from history backfill, not live delivery.
        const HISTORICAL = 1 << 1;
        /// Message is highlighted (points redemption, mention, …).
        const HIGHLIGHTED = 1 << 2;
        /// `/me`-style action message.
        const ACTION = 1 << 3;
        /// Synthesized locally, never seen by the host network layer.
        const SYSTEM = 1 << 4;
        /// Carries a cheer.
        const CHEER = 1 << 5;
        /// Author's first message in the channel.
        const FIRST_MESSAGE = 1 << 6;
    }
}

/// One token of a message body.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePart {
    /// Plain text run.
    Text(SmartString),
    /// An emote with its id and display code.
    Emote {
        /// Host emote id.
        id: SmartString,
        /// Display code, e.g. `Kappa`.
        code: SmartString,
    },
    /// An @-mention of a user login.
    Mention(SmartString),
    /// A detected link.
    Link(SmartString),
}

/// Author identity attached to a message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Author {
    /// Host user id.
    pub id: SmartString,
    /// Login name.
    pub login: SmartString,
    /// Display name (may differ from login in casing or script).
    pub display_name: SmartString,
    /// Preferred name color, if set.
    pub color: Option<SmartString>,
}

impl Author {
    /// Author with identical id/login/display name, the common case in tests.
    pub fn named(login: impl AsRef<str>) -> Self {
        let login = SmartString::from(login.as_ref());
        Self {
            id: login.clone(),
            display_name: login.clone(),
            login,
            color: None,
        }
    }
}

/// One badge shown next to the author.
#[derive(Debug, Clone, PartialEq)]
pub struct Badge {
    /// Badge set id, e.g. `subscriber`.
    pub set_id: SmartString,
    /// Version within the set.
    pub version: SmartString,
}

/// Where the message came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageSource {
    /// Live chat delivery.
    Live,
    /// VOD comment replay, with its offset into the recording.
    Vod {
        /// Seconds into the recording.
        offset_seconds: f64,
    },
}

impl Default for MessageSource {
    fn default() -> Self {
        MessageSource::Live
    }
}

/// Normalized envelope of a single chat line or VOD comment.
///
/// Created when the host emits a new message event (or synthesized by a
/// feature); read by pipeline handlers. Handlers that need to enrich a
/// message clone it; the pipeline never mutates the envelope.
///
/// # Example
///
/// ```
/// use graft::pipeline::{Author, ChatMessage, MessageFlags, MessagePart};
///
/// let msg = ChatMessage::new("1", Author::named("alice"))
///     .part(MessagePart::Text("hi ".into()))
///     .part(MessagePart::Emote { id: "25".into(), code: "Kappa".into() })
///     .flag(MessageFlags::HIGHLIGHTED);
/// assert_eq!(msg.text(), "hi Kappa");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Host message id.
    pub id: SmartString,
    /// Author identity.
    pub author: Author,
    /// Badges shown for the author in this channel.
    pub badges: SmallVec<[Badge; 4]>,
    /// Tokenized body.
    pub parts: Vec<MessagePart>,
    /// Delivery timestamp, milliseconds since the epoch.
    pub timestamp_ms: u64,
    /// Moderation/display flags.
    pub flags: MessageFlags,
    /// Live chat or VOD replay.
    pub source: MessageSource,
}

impl ChatMessage {
    /// Create an empty message envelope.
    pub fn new(id: impl AsRef<str>, author: Author) -> Self {
        Self {
            id: SmartString::from(id.as_ref()),
            author,
            badges: SmallVec::new(),
            parts: Vec::new(),
            timestamp_ms: 0,
            flags: MessageFlags::empty(),
            source: MessageSource::Live,
        }
    }

    /// Append a body part.
    pub fn part(mut self, part: MessagePart) -> Self {
        self.parts.push(part);
        self
    }

    /// Append a plain-text body part.
    pub fn text_part(self, text: impl AsRef<str>) -> Self {
        self.part(MessagePart::Text(SmartString::from(text.as_ref())))
    }

    /// Attach a badge.
    pub fn badge(mut self, set_id: impl AsRef<str>, version: impl AsRef<str>) -> Self {
        self.badges.push(Badge {
            set_id: SmartString::from(set_id.as_ref()),
            version: SmartString::from(version.as_ref()),
        });
        self
    }

    /// Set delivery timestamp.
    pub fn timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Add flags.
    pub fn flag(mut self, flags: MessageFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Mark as a VOD comment at the given offset.
    pub fn vod(mut self, offset_seconds: f64) -> Self {
        self.source = MessageSource::Vod { offset_seconds };
        self
    }

    /// Flatten the body to plain text (emotes render as their code,
    /// mentions as `@login`).
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                MessagePart::Text(t) => out.push_str(t.as_str()),
                MessagePart::Emote { code, .. } => out.push_str(code.as_str()),
                MessagePart::Mention(login) => {
                    out.push('@');
                    out.push_str(login.as_str());
                }
                MessagePart::Link(url) => out.push_str(url.as_str()),
            }
        }
        out
    }

    /// Leniently decode a host message payload.
    ///
    /// Host payload shapes drift between versions, so every member is
    /// optional except the envelope itself being an object with an `id`.
    /// Unknown token types degrade to their text content.
    pub fn from_value(value: &Value) -> Option<ChatMessage> {
        let map = value.as_map()?;
        let id = map.get("id")?.as_str()?;

        let author = map
            .get("user")
            .and_then(Value::as_map)
            .map(decode_author)
            .unwrap_or_default();

        let mut msg = ChatMessage::new(id, author);

        decode_badges(&mut msg, map);

        if let Some(tokens) = map.get("tokens").and_then(Value::as_list) {
            for token in tokens {
                if let Some(part) = decode_part(token) {
                    msg.parts.push(part);
                }
            }
        }
        if let Some(ts) = map.get("timestamp").and_then(Value::as_f64) {
            msg.timestamp_ms = ts as u64;
        }
        if map.get("deleted").and_then(Value::as_bool) == Some(true) {
            msg.flags |= MessageFlags::DELETED;
        }
        if map.get("isHistorical").and_then(Value::as_bool) == Some(true) {
            msg.flags |= MessageFlags::HISTORICAL;
        }
        if map.get("isAction").and_then(Value::as_bool) == Some(true) {
            msg.flags |= MessageFlags::ACTION;
        }
        if map.get("isHighlighted").and_then(Value::as_bool) == Some(true) {
            msg.flags |= MessageFlags::HIGHLIGHTED;
        }
        if map.get("isFirstMsg").and_then(Value::as_bool) == Some(true) {
            msg.flags |= MessageFlags::FIRST_MESSAGE;
        }
        if map.get("bits").and_then(Value::as_f64).is_some_and(|b| b > 0.0) {
            msg.flags |= MessageFlags::CHEER;
        }
        if let Some(offset) = map.get("contentOffset").and_then(Value::as_f64) {
            msg.source = MessageSource::Vod {
                offset_seconds: offset,
            };
        }
        Some(msg)
    }
}

fn decode_author(map: &FieldMap) -> Author {
    let get = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .map(SmartString::from)
            .unwrap_or_default()
    };
    Author {
        id: get("userID"),
        login: get("userLogin"),
        display_name: {
            let d = get("displayName");
            if d.is_empty() {
                get("userLogin")
            } else {
                d
            }
        },
        color: map.get("color").and_then(Value::as_str).map(SmartString::from),
    }
}

/// Badges arrive in two payload shapes: live messages carry a list of
/// badge objects under `user.badges`, VOD comments a flat set-id to
/// version map under `badges`.
fn decode_badges(msg: &mut ChatMessage, map: &FieldMap) {
    if let Some(list) = map
        .get("user")
        .and_then(|user| user.get("badges"))
        .and_then(Value::as_list)
    {
        for entry in list {
            if let Some(badge) = decode_badge(entry) {
                msg.badges.push(badge);
            }
        }
    }
    if let Some(badges) = map.get("badges").and_then(Value::as_map) {
        for (set_id, version) in badges {
            msg.badges.push(Badge {
                set_id: set_id.clone(),
                version: version
                    .as_str()
                    .map(SmartString::from)
                    .unwrap_or_default(),
            });
        }
    }
}

fn decode_badge(entry: &Value) -> Option<Badge> {
    if let Some(set_id) = entry.get("setID").and_then(Value::as_str) {
        return Some(Badge {
            set_id: SmartString::from(set_id),
            version: entry
                .get("version")
                .and_then(Value::as_str)
                .map(SmartString::from)
                .unwrap_or_default(),
        });
    }
    // Compact form: a single `id` of the shape `setID/version`.
    let id = entry.get("id").and_then(Value::as_str)?;
    let (set_id, version) = id.split_once('/').unwrap_or((id, ""));
    Some(Badge {
        set_id: SmartString::from(set_id),
        version: SmartString::from(version),
    })
}

fn decode_part(token: &Value) -> Option<MessagePart> {
    let kind = token.get("type").and_then(Value::as_str).unwrap_or("text");
    let value = || {
        token
            .get("value")
            .and_then(Value::as_str)
            .map(SmartString::from)
            .unwrap_or_default()
    };
    match kind {
        "emote" => Some(MessagePart::Emote {
            id: token
                .get("id")
                .and_then(Value::as_str)
                .map(SmartString::from)
                .unwrap_or_default(),
            code: value(),
        }),
        "mention" => Some(MessagePart::Mention(value())),
        "link" => Some(MessagePart::Link(value())),
        _ => Some(MessagePart::Text(value())),
    }
}

/// Identifier returned by [`MessagePipeline::add_handler`], used to remove
/// the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type MessageHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

struct PipelineInner {
    handlers: RwLock<Vec<(HandlerId, MessageHandler)>>,
    next_id: AtomicU64,
}

/// Ordered registry of message handlers.
///
/// Cloning is cheap and shares the registry, so the same pipeline can be
/// captured by an installed patch and driven by features at the same time.
#[derive(Clone)]
pub struct MessagePipeline {
    inner: Arc<PipelineInner>,
}

impl Default for MessagePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagePipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                handlers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a handler; handlers run in registration order.
    pub fn add_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns whether it was present. The relative
    /// order of the remaining handlers is unchanged.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.write();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// True when no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.handlers.read().is_empty()
    }

    /// Fan a message out to every handler, in registration order.
    ///
    /// A snapshot of the handler list is taken first, so handlers may
    /// register or remove handlers reentrantly (changes apply from the
    /// next dispatch). A panicking handler is logged and skipped; the
    /// remaining handlers still run.
    pub fn dispatch(&self, message: &ChatMessage) {
        let snapshot: Vec<(HandlerId, MessageHandler)> = self.inner.handlers.read().clone();
        for (id, handler) in snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(message))) {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::warn!(
                    handler = id.0,
                    message = %message.id,
                    panic = %reason,
                    "message handler panicked; continuing with remaining handlers"
                );
            }
        }
    }

    /// Splice this pipeline into a host message entry point.
    ///
    /// Installs a before-mode patch on `method` (e.g. `pushMessage` on a
    /// chat controller): every host call first decodes its payload argument
    /// and dispatches it here, then proceeds untouched.
    pub fn attach(&self, handle: &Handle, method: &str) -> Result<()> {
        let pipeline = self.clone();
        install(
            handle,
            method,
            Patch::before(move |_inst, args| {
                if let Some(message) = args.first().and_then(ChatMessage::from_value) {
                    pipeline.dispatch(&message);
                }
            }),
        )
    }
}

impl fmt::Debug for MessagePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePipeline")
            .field("handlers", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording_handler(
        log: &Arc<Mutex<Vec<String>>>,
        tag: &str,
    ) -> impl Fn(&ChatMessage) + Send + Sync + 'static {
        let log = log.clone();
        let tag = tag.to_string();
        move |msg| log.lock().push(format!("{tag}:{}", msg.id))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let pipeline = MessagePipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        pipeline.add_handler(recording_handler(&log, "a"));
        pipeline.add_handler(recording_handler(&log, "b"));
        pipeline.add_handler(recording_handler(&log, "c"));

        pipeline.dispatch(&ChatMessage::new("1", Author::named("alice")));
        assert_eq!(*log.lock(), vec!["a:1", "b:1", "c:1"]);
    }

    #[test]
    fn test_remove_preserves_sibling_order() {
        let pipeline = MessagePipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        pipeline.add_handler(recording_handler(&log, "a"));
        let b = pipeline.add_handler(recording_handler(&log, "b"));
        pipeline.add_handler(recording_handler(&log, "c"));

        pipeline.dispatch(&ChatMessage::new("1", Author::named("x")));
        assert!(pipeline.remove_handler(b));
        assert!(!pipeline.remove_handler(b));
        pipeline.dispatch(&ChatMessage::new("2", Author::named("x")));

        assert_eq!(*log.lock(), vec!["a:1", "b:1", "c:1", "a:2", "c:2"]);
    }

    #[test]
    fn test_panicking_handler_isolated() {
        let pipeline = MessagePipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        pipeline.add_handler(recording_handler(&log, "first"));
        pipeline.add_handler(|_msg: &ChatMessage| panic!("handler bug"));
        pipeline.add_handler(recording_handler(&log, "last"));

        pipeline.dispatch(&ChatMessage::new("1", Author::named("x")));
        assert_eq!(*log.lock(), vec!["first:1", "last:1"]);
    }

    #[test]
    fn test_handlers_observe_identical_message() {
        let pipeline = MessagePipeline::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let seen = seen.clone();
            pipeline.add_handler(move |msg: &ChatMessage| seen.lock().push(msg.clone()));
        }

        let msg = ChatMessage::new("1", Author::named("alice")).text_part("hi");
        pipeline.dispatch(&msg);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], msg);
        assert_eq!(seen[1], msg);
    }

    #[test]
    fn test_text_flattening() {
        let msg = ChatMessage::new("1", Author::named("alice"))
            .text_part("look ")
            .part(MessagePart::Emote {
                id: "25".into(),
                code: "Kappa".into(),
            })
            .part(MessagePart::Mention("bob".into()));
        assert_eq!(msg.text(), "look Kappa@bob");
    }

    #[test]
    fn test_from_value_round_trip() {
        let payload = Value::object([
            ("id", Value::from("m-1")),
            (
                "user",
                Value::object([
                    ("userID", Value::from("9")),
                    ("userLogin", Value::from("alice")),
                    ("displayName", Value::from("Alice")),
                ]),
            ),
            (
                "tokens",
                Value::List(vec![
                    Value::object([("type", Value::from("text")), ("value", Value::from("hi "))]),
                    Value::object([
                        ("type", Value::from("emote")),
                        ("id", Value::from("25")),
                        ("value", Value::from("Kappa")),
                    ]),
                ]),
            ),
            ("timestamp", Value::from(1_700_000_000_000_i64)),
            ("deleted", Value::from(true)),
        ]);

        let msg = ChatMessage::from_value(&payload).unwrap();
        assert_eq!(msg.id.as_str(), "m-1");
        assert_eq!(msg.author.display_name.as_str(), "Alice");
        assert_eq!(msg.text(), "hi Kappa");
        assert_eq!(msg.timestamp_ms, 1_700_000_000_000);
        assert!(msg.flags.contains(MessageFlags::DELETED));
        assert_eq!(msg.source, MessageSource::Live);
    }

    #[test]
    fn test_from_value_vod_comment() {
        let payload = Value::object([
            ("id", Value::from("c-1")),
            ("contentOffset", Value::from(93.5)),
        ]);
        let msg = ChatMessage::from_value(&payload).unwrap();
        assert_eq!(
            msg.source,
            MessageSource::Vod {
                offset_seconds: 93.5
            }
        );
    }

    #[test]
    fn test_from_value_decodes_user_badges() {
        let payload = Value::object([
            ("id", Value::from("m-2")),
            (
                "user",
                Value::object([
                    ("userID", Value::from("9")),
                    ("userLogin", Value::from("alice")),
                    (
                        "badges",
                        Value::List(vec![
                            Value::object([
                                ("setID", Value::from("moderator")),
                                ("version", Value::from("1")),
                            ]),
                            Value::object([("id", Value::from("subscriber/12"))]),
                        ]),
                    ),
                ]),
            ),
        ]);

        let msg = ChatMessage::from_value(&payload).unwrap();
        assert_eq!(msg.badges.len(), 2);
        assert_eq!(msg.badges[0].set_id.as_str(), "moderator");
        assert_eq!(msg.badges[0].version.as_str(), "1");
        assert_eq!(msg.badges[1].set_id.as_str(), "subscriber");
        assert_eq!(msg.badges[1].version.as_str(), "12");
    }

    #[test]
    fn test_from_value_decodes_vod_badge_map() {
        let payload = Value::object([
            ("id", Value::from("c-2")),
            ("contentOffset", Value::from(10.0)),
            ("badges", Value::object([("vip", Value::from("1"))])),
        ]);
        let msg = ChatMessage::from_value(&payload).unwrap();
        assert_eq!(msg.badges.len(), 1);
        assert_eq!(msg.badges[0].set_id.as_str(), "vip");
        assert_eq!(msg.badges[0].version.as_str(), "1");
    }

    #[test]
    fn test_from_value_derives_remaining_flags() {
        let payload = Value::object([
            ("id", Value::from("m-3")),
            ("isHighlighted", Value::from(true)),
            ("isFirstMsg", Value::from(true)),
            ("bits", Value::from(100)),
        ]);
        let msg = ChatMessage::from_value(&payload).unwrap();
        assert!(msg.flags.contains(MessageFlags::HIGHLIGHTED));
        assert!(msg.flags.contains(MessageFlags::FIRST_MESSAGE));
        assert!(msg.flags.contains(MessageFlags::CHEER));

        // Zero bits is not a cheer.
        let quiet = Value::object([("id", Value::from("m-4")), ("bits", Value::from(0))]);
        assert!(ChatMessage::from_value(&quiet).unwrap().flags.is_empty());
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        assert!(ChatMessage::from_value(&Value::from("nope")).is_none());
        assert!(ChatMessage::from_value(&Value::object([("noId", true)])).is_none());
    }
}
