//! # graft
//!
//! Structural locator and method-interception layer for live host
//! component trees.
//!
//! `graft` is the integration seam for an enhancement layer embedded in a
//! third-party single-page chat application. The host's rendering tree is
//! an externally versioned, not-contractually-stable object graph; this
//! crate finds named component instances inside it, wraps their methods so
//! injected logic runs alongside host logic, and exposes the extension
//! points downstream features plug into, all without breaking the host's
//! own update cycle.
//!
//! # Architecture
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`instance`] | Dynamic mirror of the host's instance graph |
//! | [`contract`] | Structural shape contracts over foreign instances |
//! | [`contracts`] | Catalog of known host component contracts |
//! | [`locator`] | Bounded tree traversal to contract-satisfying instances |
//! | [`patch`] | Before/after/around/replace method interception |
//! | [`pipeline`] | Ordered fan-out of normalized chat/VOD messages |
//! | [`autocomplete`] | Per-category completion providers |
//! | [`tray`] | The single mutually-exclusive attention slot |
//! | [`error`] | `NotFound` / `ContractMismatch` / `PatchConflict` |
//!
//! # Example
//!
//! ```
//! use graft::prelude::*;
//! use graft::instance::{InstanceNode, Value};
//!
//! // A fragment of a host tree (a real adapter mirrors the live one).
//! let root = InstanceNode::new("Chat")
//!     .child(
//!         InstanceNode::new("ChatInput")
//!             .field("channelID", "1234")
//!             .field("channelLogin", "somestreamer")
//!             .field("value", "")
//!             .field("placeholder", "Send a message")
//!             .field("paddingLeft", 10)
//!             .method("setInputValue", 1, |inst, args| {
//!                 if let Some(v) = args.first() {
//!                     inst.set_field("value", v.clone());
//!                 }
//!                 Value::Null
//!             })
//!             .method("onKeyDown", 1, |_, _| Value::Null)
//!             .method("onChange", 1, |_, _| Value::Null)
//!             .method("onValueUpdate", 1, |_, _| Value::Null)
//!             .method("focus", 0, |_, _| Value::Null),
//!     )
//!     .build();
//!
//! // Locate the input and observe every keystroke the host delivers.
//! let input = resolve(&root, &graft::contracts::chat_input(), Direction::Down)?;
//! install(&input, "onKeyDown", Patch::before(|_inst, _args| {
//!     // injected logic
//! }))?;
//! # Ok::<(), graft::Error>(())
//! ```
//!
//! # Lifetime discipline
//!
//! Handles are borrowed, never owned: the host mounts and unmounts
//! instances on its own schedule, so every handle access revalidates and
//! callers treat [`Error::ContractMismatch`] as "re-resolve or disable the
//! feature". Nothing in this crate blocks, spawns, or performs I/O: all
//! operations are synchronous callbacks on the host's update cycle, and
//! any genuinely asynchronous feature work must rejoin via its own
//! dispatch rather than stall an intercepted call.

#![warn(missing_docs)]

pub mod autocomplete;
pub mod contract;
pub mod contracts;
pub mod error;
pub mod instance;
pub mod locator;
pub mod patch;
pub mod pipeline;
pub mod tray;

pub use error::{Error, Result};

/// Convenience re-exports for the common integration path.
pub mod prelude {
    pub use crate::autocomplete::{
        AutocompleteProvider, AutocompleteRegistry, MatchCandidate, MatchQuery, TriggerKind,
    };
    pub use crate::contract::{Contract, FieldKind};
    pub use crate::error::{Error, Result};
    pub use crate::instance::{InstanceNode, InstanceRef, Value};
    pub use crate::locator::{resolve, resolve_all, Direction, Handle};
    pub use crate::patch::{install, is_patched, uninstall, Patch, PatchMode};
    pub use crate::pipeline::{
        Author, ChatMessage, MessageFlags, MessagePart, MessagePipeline, MessageSource,
    };
    pub use crate::tray::{TrayController, TrayEntry, TrayKind};
}
