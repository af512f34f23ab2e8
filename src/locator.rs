//! Tree locator: find contract-satisfying instances in the live graph.
//!
//! Traversal starts from an anchor the feature layer obtained (typically by
//! mapping a DOM node back to its owning instance) and walks the host's own
//! parent/child links (not the DOM) outward. Every visited node is tested
//! structurally against a [`Contract`]; the first live match wins for
//! [`resolve`], and [`resolve_all`] yields the full lazy sequence.
//!
//! Bounds and tolerance:
//!
//! - Traversal stops at a depth ceiling ([`DEFAULT_MAX_DEPTH`] edges unless
//!   overridden) so pathological host trees cannot hang the layer.
//! - Nodes the host is still initializing (`!is_ready()`) or has already
//!   unmounted are skipped as candidates but traversed *through*; a
//!   half-built subtree must never abort a resolution.
//! - The anchor itself counts at depth 0 and is a candidate.
//!
//! Resolution returns a [`Handle`], which stays *borrowed*: the host owns
//! the instance lifetime, so every handle access revalidates (weak upgrade,
//! mounted check, contract re-check) rather than trusting a past match.

use crate::contract::Contract;
use crate::error::{Error, Result};
use crate::instance::{InstanceCell, InstanceId, InstanceRef, Value};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Weak;

/// Default traversal depth ceiling, in edges from the anchor.
pub const DEFAULT_MAX_DEPTH: usize = 15;

/// Traversal direction relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Walk ancestor links; nearest ancestor first.
    Up,
    /// Walk descendants pre-order; nearest first.
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Resolve the nearest instance satisfying `contract`, searching
/// `direction` from `anchor` within [`DEFAULT_MAX_DEPTH`].
pub fn resolve(anchor: &InstanceRef, contract: &Contract, direction: Direction) -> Result<Handle> {
    resolve_with_depth(anchor, contract, direction, DEFAULT_MAX_DEPTH)
}

/// Resolve with an explicit depth ceiling.
pub fn resolve_with_depth(
    anchor: &InstanceRef,
    contract: &Contract,
    direction: Direction,
    max_depth: usize,
) -> Result<Handle> {
    match resolve_all_with_depth(anchor, contract, direction, max_depth).next() {
        Some(handle) => {
            tracing::debug!(
                contract = contract.name(),
                %direction,
                instance = handle.instance_id().0,
                "resolved component instance"
            );
            Ok(handle)
        }
        None => Err(Error::NotFound {
            contract: contract.name().to_string(),
            direction,
            max_depth,
        }),
    }
}

/// Lazily yield all instances satisfying `contract` within
/// [`DEFAULT_MAX_DEPTH`] of the anchor.
///
/// Host trees routinely contain repeated structurally identical siblings
/// (every chat line is one); this is how they are enumerated.
pub fn resolve_all(anchor: &InstanceRef, contract: &Contract, direction: Direction) -> Matches {
    resolve_all_with_depth(anchor, contract, direction, DEFAULT_MAX_DEPTH)
}

/// [`resolve_all`] with an explicit depth ceiling.
pub fn resolve_all_with_depth(
    anchor: &InstanceRef,
    contract: &Contract,
    direction: Direction,
    max_depth: usize,
) -> Matches {
    let mut stack: SmallVec<[(InstanceRef, usize); 16]> = SmallVec::new();
    stack.push((anchor.clone(), 0));
    Matches {
        contract: contract.clone(),
        direction,
        max_depth,
        stack,
    }
}

/// Lazy, finite iterator over matching handles.
///
/// Upward iteration yields ancestors nearest-first; downward iteration
/// yields matches in pre-order. Nodes are tested as the iterator advances,
/// so mutations between `next()` calls are observed.
pub struct Matches {
    contract: Contract,
    direction: Direction,
    max_depth: usize,
    stack: SmallVec<[(InstanceRef, usize); 16]>,
}

impl Iterator for Matches {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        while let Some((node, depth)) = self.stack.pop() {
            if depth < self.max_depth {
                match self.direction {
                    Direction::Up => {
                        if let Some(parent) = node.parent() {
                            self.stack.push((parent, depth + 1));
                        }
                    }
                    Direction::Down => {
                        // Reverse push keeps pre-order (first child popped next).
                        for child in node.children().into_iter().rev() {
                            self.stack.push((child, depth + 1));
                        }
                    }
                }
            }
            if node.satisfies(&self.contract) {
                return Some(Handle::new(&node, self.contract.clone()));
            }
        }
        None
    }
}

impl fmt::Debug for Matches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matches")
            .field("contract", &self.contract.name())
            .field("direction", &self.direction)
            .field("max_depth", &self.max_depth)
            .field("pending", &self.stack.len())
            .finish()
    }
}

/// A borrowed, lifetime-bounded reference to a matched instance.
///
/// The handle never owns the instance: the host controls mount and unmount,
/// and a handle can go stale between any two uses. Every access therefore
/// goes through [`Handle::get`], which re-upgrades the weak reference,
/// checks the mount flag, and re-checks the contract. Callers should treat
/// `ContractMismatch` from a previously working handle as "re-resolve or
/// disable the feature", not as a crash.
#[derive(Clone)]
pub struct Handle {
    instance: Weak<InstanceCell>,
    contract: Contract,
    id: InstanceId,
}

impl Handle {
    pub(crate) fn new(instance: &InstanceRef, contract: Contract) -> Self {
        Self {
            instance: std::sync::Arc::downgrade(instance),
            id: instance.id(),
            contract,
        }
    }

    /// The contract this handle was matched against.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Identifier of the underlying instance.
    pub fn instance_id(&self) -> InstanceId {
        self.id
    }

    /// Revalidate and return the live instance.
    ///
    /// Fails with `ContractMismatch` when the instance was dropped or
    /// unmounted by the host, or when a host update changed its shape out
    /// from under the contract.
    pub fn get(&self) -> Result<InstanceRef> {
        let instance = self.instance.upgrade().ok_or_else(|| Error::ContractMismatch {
            contract: self.contract.name().to_string(),
            reason: "instance dropped by host".to_string(),
        })?;
        if !instance.is_mounted() {
            return Err(Error::ContractMismatch {
                contract: self.contract.name().to_string(),
                reason: "instance unmounted by host".to_string(),
            });
        }
        self.contract.check(&instance)?;
        Ok(instance)
    }

    /// True when the handle would currently revalidate.
    pub fn is_valid(&self) -> bool {
        self.get().is_ok()
    }

    /// Read a field through the handle (revalidates first).
    pub fn field(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get()?.field(key))
    }

    /// Write a field through the handle (revalidates first).
    pub fn set_field(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.get()?.set_field(key, value);
        Ok(())
    }

    /// Call a method through the handle (revalidates first).
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        self.get()?.call(method, args)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("contract", &self.contract.name())
            .field("instance", &self.id)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contract::FieldKind;
    use crate::instance::InstanceNode;

    fn input_contract() -> Contract {
        Contract::new("ChatInput")
            .field("value", FieldKind::String)
            .method_with_arity("setInputValue", 1)
    }

    fn input_node(value: &str) -> InstanceNode {
        InstanceNode::new("ChatInput")
            .field("value", value)
            .method("setInputValue", 1, |_, _| Value::Null)
    }

    fn wrapper_chain(depth: usize, leaf: InstanceNode) -> InstanceNode {
        let mut node = leaf;
        for _ in 0..depth {
            node = InstanceNode::anonymous().child(node);
        }
        node
    }

    #[test]
    fn test_resolve_down_nearest_preorder() {
        let root = InstanceNode::new("Root")
            .child(InstanceNode::anonymous().child(input_node("first")))
            .child(input_node("second"))
            .build();

        let handle = resolve(&root, &input_contract(), Direction::Down).unwrap();
        assert_eq!(
            handle.field("value").unwrap(),
            Some(Value::from("first")),
            "pre-order: deeper-but-earlier subtree wins"
        );
    }

    #[test]
    fn test_resolve_up_nearest_ancestor() {
        let root = input_node("outer")
            .child(input_node("inner").child(InstanceNode::new("Anchor")))
            .build();
        let anchor = root.children()[0].children()[0].clone();

        let handle = resolve(&anchor, &input_contract(), Direction::Up).unwrap();
        assert_eq!(handle.field("value").unwrap(), Some(Value::from("inner")));
    }

    #[test]
    fn test_anchor_itself_matches() {
        let anchor = input_node("self").build();
        assert!(resolve(&anchor, &input_contract(), Direction::Up).is_ok());
        assert!(resolve(&anchor, &input_contract(), Direction::Down).is_ok());
    }

    #[test]
    fn test_depth_bound_respected() {
        // Leaf sits 12 edges below the root; a ceiling of 10 must miss it.
        let root = wrapper_chain(12, input_node("deep")).build();

        let err = resolve_with_depth(&root, &input_contract(), Direction::Down, 10).unwrap_err();
        assert!(matches!(err, Error::NotFound { max_depth: 10, .. }));

        assert!(resolve_with_depth(&root, &input_contract(), Direction::Down, 12).is_ok());
    }

    #[test]
    fn test_not_found_up_within_ten_levels() {
        let root = wrapper_chain(15, InstanceNode::new("Anchor")).build();
        let mut anchor = root;
        while let Some(next) = anchor.children().first().cloned() {
            anchor = next;
        }

        let err = resolve_with_depth(&anchor, &input_contract(), Direction::Up, 10).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_pending_nodes_skipped_not_fatal() {
        // A structurally matching but still-initializing sibling must be
        // passed over in favor of the ready one.
        let root = InstanceNode::new("Root")
            .child(input_node("pending").pending())
            .child(input_node("ready"))
            .build();

        let handle = resolve(&root, &input_contract(), Direction::Down).unwrap();
        assert_eq!(handle.field("value").unwrap(), Some(Value::from("ready")));
    }

    #[test]
    fn test_resolve_all_yields_every_sibling() {
        let root = InstanceNode::new("ChatList")
            .children((0..5).map(|i| input_node(&format!("line-{i}"))))
            .build();

        let values: Vec<_> = resolve_all(&root, &input_contract(), Direction::Down)
            .map(|h| h.field("value").unwrap().unwrap())
            .collect();
        assert_eq!(
            values,
            vec![
                Value::from("line-0"),
                Value::from("line-1"),
                Value::from("line-2"),
                Value::from("line-3"),
                Value::from("line-4"),
            ]
        );
    }

    #[test]
    fn test_handle_stale_after_unmount() {
        let root = InstanceNode::new("Root").child(input_node("x")).build();
        let handle = resolve(&root, &input_contract(), Direction::Down).unwrap();
        assert!(handle.is_valid());

        root.children()[0].clone().unmount();

        let err = handle.call("setInputValue", &[Value::from("y")]).unwrap_err();
        assert!(matches!(err, Error::ContractMismatch { .. }));
    }

    #[test]
    fn test_handle_detects_shape_drift() {
        let root = input_node("x").build();
        let handle = resolve(&root, &input_contract(), Direction::Down).unwrap();

        // Host update replaces the string field with a number.
        root.set_field("value", 42);

        let err = handle.get().unwrap_err();
        assert!(err.to_string().contains("incompatible kind"));
    }
}
