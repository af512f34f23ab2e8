//! Dynamic model of the host application's internal instance graph.
//!
//! The layer operates on live component instances owned by a host it does
//! not control. Those instances are duck-typed bags of fields and methods
//! linked into a parent/child graph by the host's own runtime. This module
//! is the bridge type for that graph: a host-side adapter materializes the
//! instances it exposes as [`InstanceCell`]s, and everything else in the
//! crate (locator, interceptor, registries) works purely against this model.
//!
//! Ownership is deliberately one-sided: the crate never creates or destroys
//! host state, it only mirrors it. An instance the host unmounts is marked
//! unmounted here and outstanding [`Handle`](crate::locator::Handle)s detect
//! that on their next use.
//!
//! # Example
//!
//! ```
//! use graft::instance::{InstanceNode, Value};
//!
//! let root = InstanceNode::new("ChatRoot")
//!     .child(
//!         InstanceNode::new("ChatInput")
//!             .field("value", "")
//!             .field("channelID", "1234")
//!             .method("setInputValue", 1, |inst, args| {
//!                 if let Some(v) = args.first() {
//!                     inst.set_field("value", v.clone());
//!                 }
//!                 Value::Null
//!             }),
//!     )
//!     .build();
//!
//! let input = root.children()[0].clone();
//! input.call("setInputValue", &[Value::from("hi")]).unwrap();
//! assert_eq!(input.field("value"), Some(Value::from("hi")));
//! ```

use crate::contract::{Contract, FieldKind};
use crate::error::{Error, Result};
use crate::patch::PatchMarker;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use smartstring::alias::String as SmartString;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Unique identifier for instances in the mirrored graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// Generate a new unique instance ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        InstanceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Field table type: insertion-ordered for deterministic traversal and
/// diagnostics, hashed with FxHash (keys are short strings).
pub type FieldMap = IndexMap<SmartString, Value, FxBuildHasher>;

type MethodMap = IndexMap<SmartString, Method, FxBuildHasher>;

/// A dynamic field value on a host instance.
///
/// Host objects are foreign and versioned; fields are modeled as loosely
/// typed values rather than concrete structs so additive host changes never
/// break the mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent / `null` / `undefined`.
    Null,
    /// Boolean field.
    Bool(bool),
    /// Integer-valued number.
    Int(i64),
    /// Float-valued number.
    Float(f64),
    /// String field.
    Str(SmartString),
    /// Array field.
    List(Vec<Value>),
    /// Nested plain object (not a component instance).
    Map(Box<FieldMap>),
}

impl Value {
    /// Build a nested object value from key/value entries.
    ///
    /// # Example
    ///
    /// ```
    /// use graft::instance::Value;
    ///
    /// let user = Value::object([("userID", Value::from("9")), ("userLogin", Value::from("alice"))]);
    /// assert_eq!(user.get("userLogin").and_then(Value::as_str), Some("alice"));
    /// ```
    pub fn object<I, K, V>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut map = FieldMap::default();
        for (k, v) in entries {
            map.insert(SmartString::from(k.as_ref()), v.into());
        }
        Value::Map(Box::new(map))
    }

    /// The structural kind of this value, or `None` for `Null`.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(FieldKind::Bool),
            Value::Int(_) | Value::Float(_) => Some(FieldKind::Number),
            Value::Str(_) => Some(FieldKind::String),
            Value::List(_) => Some(FieldKind::List),
            Value::Map(_) => Some(FieldKind::Object),
        }
    }

    /// True if the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean content, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content, if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric content as a float (accepts `Int` and `Float`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String content, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// List content, if this is a `List`.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Nested object content, if this is a `Map`.
    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key in a nested object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(SmartString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(SmartString::from(s))
    }
}

impl From<SmartString> for Value {
    fn from(s: SmartString) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Signature of a host instance method.
///
/// The first argument is the receiver (the `this`-binding); methods always
/// receive the same instance reference they were looked up on.
pub type MethodFn = dyn Fn(&InstanceRef, &[Value]) -> Value + Send + Sync;

/// A callable method on a host instance.
///
/// Cloning is cheap (the function is shared behind an `Arc`). A method may
/// carry a [`PatchMarker`] left by the interceptor; the marker travels with
/// the method entry and is how re-installation is detected and how the true
/// original is recovered on uninstall.
#[derive(Clone)]
pub struct Method {
    pub(crate) func: Arc<MethodFn>,
    pub(crate) arity: usize,
    pub(crate) patch: Option<PatchMarker>,
}

impl Method {
    /// Create a method from a closure and its declared arity.
    pub fn new<F>(arity: usize, func: F) -> Self
    where
        F: Fn(&InstanceRef, &[Value]) -> Value + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            arity,
            patch: None,
        }
    }

    /// Declared arity of the method.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Whether a wrapper is currently installed on this method.
    pub fn is_patched(&self) -> bool {
        self.patch.is_some()
    }

    /// Invoke the method with an explicit receiver.
    pub fn call(&self, receiver: &InstanceRef, args: &[Value]) -> Value {
        (self.func)(receiver, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("arity", &self.arity)
            .field("patched", &self.patch.is_some())
            .finish()
    }
}

struct InstanceState {
    name: Option<SmartString>,
    fields: FieldMap,
    methods: MethodMap,
    parent: Weak<InstanceCell>,
    children: SmallVec<[InstanceRef; 8]>,
    /// False while the host is still initializing this node; the locator
    /// traverses through unready nodes but never matches them.
    ready: bool,
    /// Flips false when the host unmounts the instance.
    mounted: bool,
}

/// A mirrored live component instance.
///
/// Shared as [`InstanceRef`]. All access is through short-lived internal
/// locks; no lock is held while user or host code (methods, hooks) runs, so
/// patched methods may freely re-enter the instance they are installed on.
pub struct InstanceCell {
    id: InstanceId,
    state: RwLock<InstanceState>,
}

/// Shared reference to a mirrored instance.
pub type InstanceRef = Arc<InstanceCell>;

impl InstanceCell {
    fn new(name: Option<SmartString>, ready: bool) -> InstanceRef {
        Arc::new(InstanceCell {
            id: InstanceId::new(),
            state: RwLock::new(InstanceState {
                name,
                fields: FieldMap::default(),
                methods: MethodMap::default(),
                parent: Weak::new(),
                children: SmallVec::new(),
                ready,
                mounted: true,
            }),
        })
    }

    /// Unique identifier of this instance.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Component display name, if the host exposes one.
    pub fn name(&self) -> Option<SmartString> {
        self.state.read().name.clone()
    }

    /// True once the host has finished initializing this node.
    pub fn is_ready(&self) -> bool {
        self.state.read().ready
    }

    /// True while the host keeps this instance mounted.
    pub fn is_mounted(&self) -> bool {
        self.state.read().mounted
    }

    /// Mark the node as initialized (or back to pending).
    pub fn set_ready(&self, ready: bool) {
        self.state.write().ready = ready;
    }

    /// Read a field value.
    pub fn field(&self, key: &str) -> Option<Value> {
        self.state.read().fields.get(key).cloned()
    }

    /// The structural kind of a field, or `None` when absent or `Null`.
    pub fn field_kind(&self, key: &str) -> Option<FieldKind> {
        self.state.read().fields.get(key).and_then(Value::kind)
    }

    /// True if a field is present, even if `Null`.
    pub fn has_field(&self, key: &str) -> bool {
        self.state.read().fields.contains_key(key)
    }

    /// Write a field value.
    pub fn set_field(&self, key: &str, value: impl Into<Value>) {
        self.state
            .write()
            .fields
            .insert(SmartString::from(key), value.into());
    }

    /// True if a method is present.
    pub fn has_method(&self, name: &str) -> bool {
        self.state.read().methods.contains_key(name)
    }

    /// Look up a method entry (cheap clone).
    pub fn method(&self, name: &str) -> Option<Method> {
        self.state.read().methods.get(name).cloned()
    }

    /// Declared arity of a method, if present.
    pub fn method_arity(&self, name: &str) -> Option<usize> {
        self.state.read().methods.get(name).map(|m| m.arity)
    }

    /// Insert or replace a method entry.
    pub fn set_method(&self, name: &str, method: Method) {
        self.state
            .write()
            .methods
            .insert(SmartString::from(name), method);
    }

    /// Invoke a method on this instance.
    ///
    /// The method entry is cloned out of the internal lock before the call,
    /// so the method body (and any installed wrapper) may re-enter the
    /// instance without deadlocking.
    pub fn call(self: &InstanceRef, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.method(name);
        match method {
            Some(m) => Ok(m.call(self, args)),
            None => Err(Error::ContractMismatch {
                contract: self
                    .name()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "anonymous".to_string()),
                reason: format!("method `{name}` not present"),
            }),
        }
    }

    /// Parent instance, if mounted under one.
    pub fn parent(&self) -> Option<InstanceRef> {
        self.state.read().parent.upgrade()
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Vec<InstanceRef> {
        self.state.read().children.to_vec()
    }

    /// Attach a child instance (host-side mount).
    pub fn append_child(self: &InstanceRef, child: InstanceRef) {
        child.state.write().parent = Arc::downgrade(self);
        self.state.write().children.push(child);
    }

    /// Unmount this instance and its entire subtree.
    ///
    /// The subtree is marked unmounted and the root of it is detached from
    /// its parent. Outstanding handles into the subtree fail with
    /// `ContractMismatch` on their next use.
    pub fn unmount(self: &InstanceRef) {
        if let Some(parent) = self.parent() {
            parent
                .state
                .write()
                .children
                .retain(|c| c.id != self.id);
        }
        mark_unmounted(self);
    }

    /// True when this node is a live candidate for the given contract:
    /// ready, mounted, and structurally satisfying it.
    pub fn satisfies(&self, contract: &Contract) -> bool {
        self.is_ready() && self.is_mounted() && contract.matches(self)
    }
}

fn mark_unmounted(cell: &InstanceRef) {
    let children = {
        let mut state = cell.state.write();
        state.mounted = false;
        state.parent = Weak::new();
        state.children.clone()
    };
    for child in &children {
        mark_unmounted(child);
    }
}

impl fmt::Debug for InstanceCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("InstanceCell")
            .field("id", &self.id)
            .field("name", &state.name)
            .field("fields", &state.fields.len())
            .field("methods", &state.methods.len())
            .field("children", &state.children.len())
            .field("ready", &state.ready)
            .field("mounted", &state.mounted)
            .finish()
    }
}

/// Builder for assembling instance graphs.
///
/// Used by host-side adapters when materializing the host's tree, and by
/// tests to stand up realistic fake hosts.
///
/// # Example
///
/// ```
/// use graft::instance::{InstanceNode, Value};
///
/// let root = InstanceNode::new("Root")
///     .child(InstanceNode::new("ChatController").field("channelID", "1234"))
///     .child(InstanceNode::anonymous().pending())
///     .build();
///
/// assert_eq!(root.children().len(), 2);
/// assert!(!root.children()[1].is_ready());
/// ```
pub struct InstanceNode {
    name: Option<SmartString>,
    ready: bool,
    fields: Vec<(SmartString, Value)>,
    methods: Vec<(SmartString, Method)>,
    children: Vec<InstanceNode>,
}

impl InstanceNode {
    /// Create a named instance node.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Some(SmartString::from(name.as_ref())),
            ready: true,
            fields: Vec::new(),
            methods: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create an unnamed instance node (hosts frequently interleave
    /// anonymous wrapper components).
    pub fn anonymous() -> Self {
        Self {
            name: None,
            ready: true,
            fields: Vec::new(),
            methods: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Add a field.
    pub fn field(mut self, key: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.fields
            .push((SmartString::from(key.as_ref()), value.into()));
        self
    }

    /// Add a method with the given arity.
    pub fn method<F>(mut self, name: impl AsRef<str>, arity: usize, func: F) -> Self
    where
        F: Fn(&InstanceRef, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.methods
            .push((SmartString::from(name.as_ref()), Method::new(arity, func)));
        self
    }

    /// Add a child node.
    pub fn child(mut self, node: InstanceNode) -> Self {
        self.children.push(node);
        self
    }

    /// Add multiple children.
    pub fn children(mut self, nodes: impl IntoIterator<Item = InstanceNode>) -> Self {
        self.children.extend(nodes);
        self
    }

    /// Mark the node as still initializing (shape not yet populated).
    pub fn pending(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Materialize the subtree, returning its root.
    pub fn build(self) -> InstanceRef {
        let cell = InstanceCell::new(self.name, self.ready);
        {
            let mut state = cell.state.write();
            for (key, value) in self.fields {
                state.fields.insert(key, value);
            }
            for (name, method) in self.methods {
                state.methods.insert(name, method);
            }
        }
        for child in self.children {
            let built = child.build();
            cell.append_child(built);
        }
        cell
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_unique() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(Value::from(true).kind(), Some(FieldKind::Bool));
        assert_eq!(Value::from(3).kind(), Some(FieldKind::Number));
        assert_eq!(Value::from(3.5).kind(), Some(FieldKind::Number));
        assert_eq!(Value::from("x").kind(), Some(FieldKind::String));
        assert_eq!(Value::List(vec![]).kind(), Some(FieldKind::List));
        assert_eq!(Value::object([("a", 1)]).kind(), Some(FieldKind::Object));
        assert_eq!(Value::Null.kind(), None);
    }

    #[test]
    fn test_field_roundtrip() {
        let inst = InstanceNode::new("ChatInput").field("value", "hello").build();
        assert_eq!(inst.field("value"), Some(Value::from("hello")));
        inst.set_field("value", "world");
        assert_eq!(inst.field("value").unwrap().as_str(), Some("world"));
        assert_eq!(inst.field("missing"), None);
    }

    #[test]
    fn test_method_call_receives_receiver() {
        let inst = InstanceNode::new("Counter")
            .field("count", 0)
            .method("increment", 0, |inst, _args| {
                let next = inst.field("count").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
                inst.set_field("count", next);
                Value::Int(next)
            })
            .build();

        assert_eq!(inst.call("increment", &[]).unwrap(), Value::Int(1));
        assert_eq!(inst.call("increment", &[]).unwrap(), Value::Int(2));
        assert_eq!(inst.field("count"), Some(Value::Int(2)));
    }

    #[test]
    fn test_call_missing_method_is_mismatch() {
        let inst = InstanceNode::new("Empty").build();
        let err = inst.call("nope", &[]).unwrap_err();
        assert!(matches!(err, Error::ContractMismatch { .. }));
    }

    #[test]
    fn test_parent_child_links() {
        let root = InstanceNode::new("Root")
            .child(InstanceNode::new("Child"))
            .build();
        let child = root.children()[0].clone();
        assert_eq!(child.parent().unwrap().id(), root.id());
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_unmount_marks_subtree() {
        let root = InstanceNode::new("Root")
            .child(InstanceNode::new("Mid").child(InstanceNode::new("Leaf")))
            .build();
        let mid = root.children()[0].clone();
        let leaf = mid.children()[0].clone();

        mid.unmount();

        assert!(root.is_mounted());
        assert!(!mid.is_mounted());
        assert!(!leaf.is_mounted());
        assert!(root.children().is_empty());
    }

    #[test]
    fn test_pending_node_not_ready() {
        let inst = InstanceNode::new("Later").pending().build();
        assert!(!inst.is_ready());
        inst.set_ready(true);
        assert!(inst.is_ready());
    }
}
