//! Catalog of host component contracts.
//!
//! Each function declares the structural subset of a foreign component the
//! layer actually reads or calls. The member names are the host's own
//! (camelCase) and the sets are intentionally small: enough to
//! disambiguate between similar components, few enough to survive additive
//! host changes. When the host reshapes a component, the corresponding
//! contract here is the single place to version.
//!
//! Contracts are built fresh on each call; they are cheap and callers
//! usually keep one per feature anyway.

use crate::contract::{Contract, FieldKind};

/// A single rendered chat line.
///
/// Carries the message payload plus the moderation/display context the
/// renderer resolved for it, and the `setTray` capability used for
/// reply-style interactions.
pub fn chat_line() -> Contract {
    Contract::new("ChatLine")
        .field("badgeSets", FieldKind::Object)
        .field("channelID", FieldKind::String)
        .field("channelLogin", FieldKind::String)
        .field("currentUserLogin", FieldKind::String)
        .field("isCurrentUserModerator", FieldKind::Bool)
        .field("isDeleted", FieldKind::Bool)
        .field("message", FieldKind::Object)
        .field("showTimestamps", FieldKind::Bool)
        .method_with_arity("setTray", 1)
        .method_with_arity("onUsernameClick", 1)
        .method("hideViewerCard")
}

/// The emote picker button next to the input.
pub fn emote_button() -> Contract {
    Contract::new("EmoteButton").method_with_arity("onEmoteClick", 1)
}

/// A rendered comment in the recorded-video (VOD) chat replay.
pub fn video_message() -> Contract {
    Contract::new("VideoMessage")
        .field("badgeSets", FieldKind::Object)
        .field("context", FieldKind::Object)
        .field("isCurrentUserModerator", FieldKind::Bool)
        .field("isExpandedLayout", FieldKind::Bool)
}

/// The host's router component (history-based navigation).
pub fn router() -> Contract {
    Contract::new("Router")
        .field("history", FieldKind::Object)
        .field("location", FieldKind::Object)
        .field("isLoggedIn", FieldKind::Bool)
        .field("match", FieldKind::Object)
}

/// Provider of the logged-in session user.
pub fn session_user() -> Contract {
    Contract::new("SessionUser").field("sessionUser", FieldKind::Object)
}

/// Provider of an arbitrary user context object.
pub fn user_context() -> Contract {
    Contract::new("UserContext").field("user", FieldKind::Object)
}

/// The low-level chat connection service.
pub fn chat_service() -> Contract {
    Contract::new("ChatService")
        .field("authToken", FieldKind::String)
        .field("currentUserLogin", FieldKind::String)
        .field("channelLogin", FieldKind::String)
        .field("channelID", FieldKind::String)
}

/// The chat room controller.
///
/// Owns the message entry points (`pushMessage` for local injection,
/// `sendMessage` for outbound) and the room-state callbacks. This is the
/// usual attach point for the message pipeline.
pub fn chat_controller() -> Contract {
    Contract::new("ChatController")
        .field("channelDisplayName", FieldKind::String)
        .field("channelID", FieldKind::String)
        .field("channelLogin", FieldKind::String)
        .field("isCurrentUserModerator", FieldKind::Bool)
        .field("isLoggedIn", FieldKind::Bool)
        .field("messageHandlerAPI", FieldKind::Object)
        .field("slowModeDuration", FieldKind::Number)
        .method_with_arity("pushMessage", 1)
        .method("sendMessage")
        .method_with_arity("onRoomStateUpdated", 1)
        .method_with_arity("onChatEvent", 1)
        .method_with_arity("onBadgesUpdated", 1)
}

/// The scrolling list of chat lines.
pub fn chat_list() -> Contract {
    Contract::new("ChatList")
        .field("channelID", FieldKind::String)
        .field("currentUserLogin", FieldKind::String)
        .field("hasNewerLeft", FieldKind::Bool)
        .field("messageHandlerAPI", FieldKind::Object)
}

/// Room-level display preferences.
pub fn chat_room() -> Contract {
    Contract::new("ChatRoom")
        .field("primaryColorHex", FieldKind::Any)
        .field("useHighContrastColors", FieldKind::Bool)
        .field("showTimestamps", FieldKind::Bool)
        .field("showModerationIcons", FieldKind::Bool)
        .field("deletedMessageDisplay", FieldKind::String)
}

/// The viewer/emote card opener.
pub fn viewer_card() -> Contract {
    Contract::new("ViewerCard")
        .method("onShowViewerCard")
        .method_with_arity("onShowEmoteCard", 1)
        .method_with_arity("setViewerCardPage", 1)
}

/// The message buffer behind the chat list.
///
/// Distinguished from [`chat_list`] by the raw `buffer` array and the
/// blocked-user set.
pub fn message_buffer() -> Contract {
    Contract::new("MessageBuffer")
        .field("isLoadingHistoricalMessages", FieldKind::Bool)
        .field("buffer", FieldKind::List)
        .field("blockedUsers", FieldKind::List)
}

/// Channel context for the VOD player page.
pub fn video_channel() -> Contract {
    Contract::new("VideoChannel")
        .field("channelID", FieldKind::String)
        .field("displayName", FieldKind::String)
        .field("channelLogin", FieldKind::String)
}

/// The chat scroll container.
pub fn chat_scroller() -> Contract {
    Contract::new("ChatScroller").method_with_arity("onScroll", 1)
}

/// The VOD chat list with its comment feed.
pub fn video_chat() -> Contract {
    Contract::new("VideoChat")
        .field("comments", FieldKind::List)
        .field("currentVideoTime", FieldKind::Number)
        .field("videoID", FieldKind::String)
        .method_with_arity("onCreate", 1)
        .method_with_arity("onDeleteComment", 1)
}

/// The input controller wrapping the text editor.
///
/// Owns outbound send checks and the emote picker toggles. Note the
/// overlap with [`chat_input`]: the discriminators are
/// `sendMessageErrorChecks` and `onSendMessage`.
pub fn chat_input_controller() -> Contract {
    Contract::new("ChatInputController")
        .field("sendMessageErrorChecks", FieldKind::Object)
        .field("chatConnectionAPI", FieldKind::Object)
        .method_with_arity("onSendMessage", 2)
        .method_with_arity("showEmotePicker", 1)
        .method("onEmotePickerButtonClick")
        .method("onEmotePickerToggle")
}

/// The chat text input itself.
pub fn chat_input() -> Contract {
    Contract::new("ChatInput")
        .field("channelID", FieldKind::String)
        .field("channelLogin", FieldKind::String)
        .field("value", FieldKind::String)
        .field("placeholder", FieldKind::String)
        .field("paddingLeft", FieldKind::Number)
        .method_with_arity("setInputValue", 1)
        .method_with_arity("onKeyDown", 1)
        .method_with_arity("onChange", 1)
        .method_with_arity("onValueUpdate", 1)
        .method("focus")
}

/// The autocomplete engine attached to the input.
///
/// The `getMatches`/`setTray` pair is what the interception layer patches;
/// `selectionStart` provides the cursor for trigger detection. Disambiguated
/// from [`chat_input`] by `providers` and `getMatches`.
pub fn chat_autocomplete() -> Contract {
    Contract::new("ChatAutocomplete")
        .field("channelID", FieldKind::String)
        .field("channelLogin", FieldKind::String)
        .field("currentUserLogin", FieldKind::String)
        .field("providers", FieldKind::List)
        .field("selectionStart", FieldKind::Number)
        .field("tray", FieldKind::Any)
        .method_with_arity("getMatches", 1)
        .method_with_arity("setTray", 1)
        .method("clearTray")
        .method_with_arity("setValue", 1)
        .method("getValue")
        .method_with_arity("onKeyDown", 1)
}
