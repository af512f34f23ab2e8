//! Tray controller: the single attention slot above the chat input.
//!
//! The host reserves one slot above the input for banners, warnings, and
//! contextual cards. Exactly one entry is visible at a time; showing a new
//! entry pre-empts the current one (its close callback fires, once) rather
//! than queueing behind it. The controller is the explicit owner of that
//! state: a two-state machine `Idle → Active(entry) → Idle`, passed by
//! reference to whatever feature needs to raise or clear the slot.
//!
//! Rendering of the entry itself is out of scope; header/body are opaque
//! payload slots the feature layer interprets.
//!
//! # Example
//!
//! ```
//! use graft::tray::{TrayController, TrayEntry, TrayKind};
//!
//! let tray = TrayController::new();
//! tray.show(TrayEntry::new(TrayKind::SlowModeBanner));
//! assert_eq!(tray.active_kind(), Some(TrayKind::SlowModeBanner));
//!
//! tray.close();
//! assert!(!tray.is_active());
//! ```

use crate::instance::Value;
use parking_lot::Mutex;
use smartstring::alias::String as SmartString;
use std::fmt;

/// Discriminant of a tray entry.
///
/// The set mirrors the host's known tray types; the wire name
/// ([`TrayKind::as_str`]) is the host's kebab-case identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TrayKind {
    AliasBannedFromChannelBanner,
    AliasBannedFromChannelWarning,
    AutocompleteTray,
    CharacterLimitError,
    CharacterLimitWarning,
    CheerCard,
    CommandInfo,
    CommandWarning,
    CommunityMomentClaimError,
    Connecting,
    CreatorAnniversariesCallout,
    CustomReward,
    CustomViewerIntroduction,
    DropsClaim,
    DropsError,
    DuplicatedMessageError,
    EmoteOnlyBanner,
    EmoteOnlyInfo,
    EmoteOnlyWarning,
    FollowerModeBanner,
    FollowerModeInfo,
    FollowerModeWarning,
    GenericPrivateCallout,
    HighlightedMessage,
    HypeTrainRewards,
    MegaRewardsRecipient,
    MessageThroughputError,
    MobilePhoneVerificationBanner,
    MobilePhoneVerificationInfo,
    MobilePhoneVerificationSuccess,
    MobilePhoneVerificationWarning,
    MobilePhoneVerificationWarningMessageFail,
    PaidPinnedChatCard,
    Reply,
    ShareBitsBadgeTier,
    ShareEmote,
    ShareResub,
    ShieldModeActiveBanner,
    ShieldModeActiveInfo,
    SlowModeBanner,
    SlowModeInfo,
    SubsOnlyBanner,
    SubsOnlyInfo,
    SubsOnlyMessage,
    SubsOnlyWarning,
    ThankSubGifter,
    VerifiedOnlyModeBanner,
    VerifiedOnlyModeInfo,
    VerifiedOnlyModeWarning,
    ViewerIntroduction,
}

impl TrayKind {
    /// The host's kebab-case identifier for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrayKind::AliasBannedFromChannelBanner => "alias-banned-from-channel-banner",
            TrayKind::AliasBannedFromChannelWarning => "alias-banned-from-channel-warning",
            TrayKind::AutocompleteTray => "autocomplete-tray",
            TrayKind::CharacterLimitError => "character-limit-error",
            TrayKind::CharacterLimitWarning => "character-limit-warning",
            TrayKind::CheerCard => "cheer-card",
            TrayKind::CommandInfo => "command-info",
            TrayKind::CommandWarning => "command-warning",
            TrayKind::CommunityMomentClaimError => "community-moment-claim-error",
            TrayKind::Connecting => "connecting",
            TrayKind::CreatorAnniversariesCallout => "creator-anniversaries-callout",
            TrayKind::CustomReward => "custom-reward",
            TrayKind::CustomViewerIntroduction => "custom-viewer-introduction",
            TrayKind::DropsClaim => "drops-claim",
            TrayKind::DropsError => "drops-error",
            TrayKind::DuplicatedMessageError => "duplicated-message-error",
            TrayKind::EmoteOnlyBanner => "emote-only-banner",
            TrayKind::EmoteOnlyInfo => "emote-only-info",
            TrayKind::EmoteOnlyWarning => "emote-only-warning",
            TrayKind::FollowerModeBanner => "follower-mode-banner",
            TrayKind::FollowerModeInfo => "follower-mode-info",
            TrayKind::FollowerModeWarning => "follower-mode-warning",
            TrayKind::GenericPrivateCallout => "generic-private-callout",
            TrayKind::HighlightedMessage => "highlighted-message",
            TrayKind::HypeTrainRewards => "hype-train-rewards",
            TrayKind::MegaRewardsRecipient => "mega-rewards-recipient",
            TrayKind::MessageThroughputError => "message-throughput-error",
            TrayKind::MobilePhoneVerificationBanner => "mobile-phone-verification-banner",
            TrayKind::MobilePhoneVerificationInfo => "mobile-phone-verification-info",
            TrayKind::MobilePhoneVerificationSuccess => "mobile-phone-verification-success",
            TrayKind::MobilePhoneVerificationWarning => "mobile-phone-verification-warning",
            TrayKind::MobilePhoneVerificationWarningMessageFail => {
                "mobile-phone-verification-warning-message-fail"
            }
            TrayKind::PaidPinnedChatCard => "paid-pinned-chat-card",
            TrayKind::Reply => "reply",
            TrayKind::ShareBitsBadgeTier => "share-bits-badge-tier",
            TrayKind::ShareEmote => "share-emote",
            TrayKind::ShareResub => "share-resub",
            TrayKind::ShieldModeActiveBanner => "shield-mode-active-banner",
            TrayKind::ShieldModeActiveInfo => "shield-mode-active-info",
            TrayKind::SlowModeBanner => "slow-mode-banner",
            TrayKind::SlowModeInfo => "slow-mode-info",
            TrayKind::SubsOnlyBanner => "subs-only-banner",
            TrayKind::SubsOnlyInfo => "subs-only-info",
            TrayKind::SubsOnlyMessage => "subs-only-message",
            TrayKind::SubsOnlyWarning => "subs-only-warning",
            TrayKind::ThankSubGifter => "thank-sub-gifter",
            TrayKind::VerifiedOnlyModeBanner => "verified-only-mode-banner",
            TrayKind::VerifiedOnlyModeInfo => "verified-only-mode-info",
            TrayKind::VerifiedOnlyModeWarning => "verified-only-mode-warning",
            TrayKind::ViewerIntroduction => "viewer-introduction",
        }
    }
}

impl fmt::Display for TrayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Close callback, invoked at most once when the entry leaves the slot.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// Send handler override carried by a tray entry.
///
/// Routes the next outbound send through a host handler variant (the
/// host's kebab-case identifiers, e.g. `reply` or `buy-and-cheer`) with
/// opaque handler-specific metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SendMessageHandler {
    kind: SmartString,
    metadata: Value,
}

impl SendMessageHandler {
    /// Create a handler override for the given host handler identifier.
    pub fn new(kind: impl AsRef<str>) -> Self {
        Self {
            kind: SmartString::from(kind.as_ref()),
            metadata: Value::Null,
        }
    }

    /// Attach handler-specific metadata.
    pub fn metadata(mut self, metadata: impl Into<Value>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// The host handler identifier.
    pub fn kind(&self) -> &str {
        self.kind.as_str()
    }

    /// Handler-specific metadata.
    pub fn metadata_value(&self) -> &Value {
        &self.metadata
    }
}

/// One entry for the attention slot.
///
/// Kind-specific data rides in `payload`; header and body are opaque
/// render slots for the feature layer.
pub struct TrayEntry {
    kind: TrayKind,
    payload: Value,
    header: Option<Value>,
    body: Option<Value>,
    input_value_override: Option<SmartString>,
    send_button_override: Option<SmartString>,
    send_message_handler: Option<SendMessageHandler>,
    disable_commands: bool,
    disable_bits: bool,
    disable_chat: bool,
    disable_paid_pinned_chat: bool,
    on_close: Option<CloseCallback>,
}

impl TrayEntry {
    /// Create an entry of the given kind.
    pub fn new(kind: TrayKind) -> Self {
        Self {
            kind,
            payload: Value::Null,
            header: None,
            body: None,
            input_value_override: None,
            send_button_override: None,
            send_message_handler: None,
            disable_commands: false,
            disable_bits: false,
            disable_chat: false,
            disable_paid_pinned_chat: false,
            on_close: None,
        }
    }

    /// Attach kind-specific payload.
    pub fn payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Attach the header render slot.
    pub fn header(mut self, header: impl Into<Value>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Attach the body render slot.
    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Override the input value while the entry is shown.
    pub fn input_value_override(mut self, value: impl AsRef<str>) -> Self {
        self.input_value_override = Some(SmartString::from(value.as_ref()));
        self
    }

    /// Override the send button label while the entry is shown.
    pub fn send_button_override(mut self, label: impl AsRef<str>) -> Self {
        self.send_button_override = Some(SmartString::from(label.as_ref()));
        self
    }

    /// Route outbound sends through a host handler variant while the
    /// entry is shown.
    pub fn send_message_handler(mut self, handler: SendMessageHandler) -> Self {
        self.send_message_handler = Some(handler);
        self
    }

    /// Disable slash commands while the entry is shown.
    pub fn disable_commands(mut self) -> Self {
        self.disable_commands = true;
        self
    }

    /// Disable bits while the entry is shown.
    pub fn disable_bits(mut self) -> Self {
        self.disable_bits = true;
        self
    }

    /// Disable the chat input entirely while the entry is shown.
    pub fn disable_chat(mut self) -> Self {
        self.disable_chat = true;
        self
    }

    /// Disable paid pinned chat while the entry is shown.
    pub fn disable_paid_pinned_chat(mut self) -> Self {
        self.disable_paid_pinned_chat = true;
        self
    }

    /// Register a close callback, invoked exactly once when the entry is
    /// closed or pre-empted.
    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close = Some(Box::new(callback));
        self
    }

    /// The entry's kind.
    pub fn kind(&self) -> TrayKind {
        self.kind
    }

    /// Kind-specific payload.
    pub fn payload_value(&self) -> &Value {
        &self.payload
    }

    /// Header render slot, if set.
    pub fn header_value(&self) -> Option<&Value> {
        self.header.as_ref()
    }

    /// Body render slot, if set.
    pub fn body_value(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Input override, if set.
    pub fn input_override(&self) -> Option<&str> {
        self.input_value_override.as_deref()
    }

    /// Send button override, if set.
    pub fn send_button(&self) -> Option<&str> {
        self.send_button_override.as_deref()
    }

    /// Send handler override, if set.
    pub fn send_handler(&self) -> Option<&SendMessageHandler> {
        self.send_message_handler.as_ref()
    }

    /// Whether slash commands are disabled by this entry.
    pub fn commands_disabled(&self) -> bool {
        self.disable_commands
    }

    /// Whether bits are disabled by this entry.
    pub fn bits_disabled(&self) -> bool {
        self.disable_bits
    }

    /// Whether chat input is disabled by this entry.
    pub fn chat_disabled(&self) -> bool {
        self.disable_chat
    }

    /// Whether paid pinned chat is disabled by this entry.
    pub fn paid_pinned_chat_disabled(&self) -> bool {
        self.disable_paid_pinned_chat
    }

    fn take_close(&mut self) -> Option<CloseCallback> {
        self.on_close.take()
    }
}

impl fmt::Debug for TrayEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrayEntry")
            .field("kind", &self.kind)
            .field("has_close", &self.on_close.is_some())
            .finish_non_exhaustive()
    }
}

/// Owner of the attention slot: `Idle → Active(entry) → Idle`.
///
/// Transitions are strictly sequential and the displaced entry's close
/// callback always fires before the new entry becomes active. The lock is
/// never held while a callback runs, so callbacks may call back into the
/// controller (e.g. close-on-close chains).
#[derive(Default)]
pub struct TrayController {
    active: Mutex<Option<TrayEntry>>,
}

impl TrayController {
    /// Create a controller in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Show an entry, pre-empting any active one.
    ///
    /// The displaced entry's close callback is invoked exactly once,
    /// after the slot returns to idle and before the new entry becomes
    /// active. There is no queueing. A close callback that reentrantly
    /// shows its own entry keeps the slot; the pre-empting entry is then
    /// discarded without ever having been active.
    pub fn show(&self, entry: TrayEntry) {
        let kind = entry.kind;
        let displaced = self.active.lock().take();
        if let Some(mut previous) = displaced {
            tracing::debug!(displaced = previous.kind.as_str(), shown = kind.as_str(), "tray pre-empted");
            if let Some(close) = previous.take_close() {
                close();
            }
        }
        let mut slot = self.active.lock();
        if slot.is_none() {
            *slot = Some(entry);
            tracing::debug!(shown = kind.as_str(), "tray shown");
        }
    }

    /// Close the active entry, invoking its close callback.
    ///
    /// Returns the kind that was closed, or `None` when already idle.
    pub fn close(&self) -> Option<TrayKind> {
        let closed = self.active.lock().take();
        closed.map(|mut entry| {
            if let Some(close) = entry.take_close() {
                close();
            }
            tracing::debug!(kind = entry.kind.as_str(), "tray closed");
            entry.kind
        })
    }

    /// Kind of the active entry, if any.
    pub fn active_kind(&self) -> Option<TrayKind> {
        self.active.lock().as_ref().map(TrayEntry::kind)
    }

    /// True while an entry is shown.
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Inspect the active entry without transitioning.
    pub fn with_active<R>(&self, f: impl FnOnce(Option<&TrayEntry>) -> R) -> R {
        f(self.active.lock().as_ref())
    }
}

impl fmt::Debug for TrayController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrayController")
            .field("active", &self.active_kind())
            .finish()
    }
}
