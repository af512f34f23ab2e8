//! Shape contracts: structural predicates over foreign instances.
//!
//! A [`Contract`] describes the minimal set of fields and methods the layer
//! needs in order to treat a live instance as a given named component type.
//! Contracts are data, not inheritance: they are declared once, passed to
//! the locator as matching criteria, and re-evaluated whenever a handle is
//! used.
//!
//! Matching is deliberately asymmetric:
//!
//! - every *required* member must be present with a compatible kind, but
//! - *extra* unknown fields and methods never fail a match, so additive
//!   host changes are tolerated.
//!
//! The tension is between over-inclusion (enough members to disambiguate
//! two structurally similar components) and under-inclusion (few enough to
//! survive a host version bump). The catalog in [`crate::contracts`] leans
//! on the members the layer actually reads or calls, nothing more.
//!
//! # Example
//!
//! ```
//! use graft::contract::{Contract, FieldKind};
//! use graft::instance::InstanceNode;
//!
//! let contract = Contract::new("ChatInput")
//!     .field("value", FieldKind::String)
//!     .method_with_arity("setInputValue", 1);
//!
//! let inst = InstanceNode::new("whatever")
//!     .field("value", "")
//!     .field("somethingExtra", true)
//!     .method("setInputValue", 1, |_, _| graft::instance::Value::Null)
//!     .build();
//!
//! assert!(contract.matches(&inst));
//! ```

use crate::error::{Error, Result};
use crate::instance::InstanceCell;
use smartstring::alias::String as SmartString;

/// Expected structural kind of a required field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Boolean field.
    Bool,
    /// Numeric field (integer or float).
    Number,
    /// String field.
    String,
    /// Array field.
    List,
    /// Nested plain object.
    Object,
    /// Present with any value, including `Null`. Use for fields the host
    /// sometimes leaves unset (`string | undefined` shapes).
    Any,
}

impl FieldKind {
    /// Whether an observed kind satisfies this expectation.
    ///
    /// `observed` is `None` for a `Null` field value: only `Any` accepts it.
    fn accepts(self, observed: Option<FieldKind>) -> bool {
        match self {
            FieldKind::Any => true,
            expected => observed == Some(expected),
        }
    }
}

/// A required field: key plus expected kind.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Host-side field name (the host's own casing, e.g. `channelID`).
    pub key: SmartString,
    /// Expected structural kind.
    pub kind: FieldKind,
}

/// A required method: name plus optional arity.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    /// Host-side method name.
    pub name: SmartString,
    /// Required arity; `None` accepts any arity.
    pub arity: Option<usize>,
}

/// A structural description of a named foreign component type.
///
/// Immutable once built; cheap to clone (handles keep a copy for
/// revalidation).
#[derive(Debug, Clone)]
pub struct Contract {
    name: SmartString,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
}

impl Contract {
    /// Start a contract for the given component type name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: SmartString::from(name.as_ref()),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Require a field with the given kind.
    pub fn field(mut self, key: impl AsRef<str>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            key: SmartString::from(key.as_ref()),
            kind,
        });
        self
    }

    /// Require a method regardless of arity.
    pub fn method(mut self, name: impl AsRef<str>) -> Self {
        self.methods.push(MethodSpec {
            name: SmartString::from(name.as_ref()),
            arity: None,
        });
        self
    }

    /// Require a method with an exact arity.
    pub fn method_with_arity(mut self, name: impl AsRef<str>, arity: usize) -> Self {
        self.methods.push(MethodSpec {
            name: SmartString::from(name.as_ref()),
            arity: Some(arity),
        });
        self
    }

    /// Component type name this contract describes.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Required fields.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Required methods.
    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }

    /// Structural match: every required member present and compatible.
    ///
    /// This is the traversal hot path; it answers yes/no only. Use
    /// [`Contract::check`] when the caller needs to know *which*
    /// requirement failed.
    pub fn matches(&self, instance: &InstanceCell) -> bool {
        self.fields.iter().all(|spec| {
            instance.has_field(spec.key.as_str())
                && spec.kind.accepts(instance.field_kind(spec.key.as_str()))
        }) && self.methods.iter().all(|spec| {
            match instance.method_arity(spec.name.as_str()) {
                Some(observed) => spec.arity.map_or(true, |required| required == observed),
                None => false,
            }
        })
    }

    /// Structural check naming the first unmet requirement.
    pub fn check(&self, instance: &InstanceCell) -> Result<()> {
        for spec in &self.fields {
            if !instance.has_field(spec.key.as_str()) {
                return Err(self.mismatch(format!("required field `{}` missing", spec.key)));
            }
            if !spec.kind.accepts(instance.field_kind(spec.key.as_str())) {
                return Err(self.mismatch(format!(
                    "field `{}` has incompatible kind (expected {:?})",
                    spec.key, spec.kind
                )));
            }
        }
        for spec in &self.methods {
            match instance.method_arity(spec.name.as_str()) {
                None => {
                    return Err(self.mismatch(format!("required method `{}` missing", spec.name)));
                }
                Some(observed) => {
                    if let Some(required) = spec.arity {
                        if required != observed {
                            return Err(self.mismatch(format!(
                                "method `{}` has arity {observed}, expected {required}",
                                spec.name
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn mismatch(&self, reason: String) -> Error {
        Error::ContractMismatch {
            contract: self.name.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::instance::{InstanceNode, Value};

    fn sample_instance() -> crate::instance::InstanceRef {
        InstanceNode::new("ChatInput")
            .field("value", "hello")
            .field("paddingLeft", 8)
            .field("slateEditor", Value::Null)
            .field("extraneous", true)
            .method("setInputValue", 1, |_, _| Value::Null)
            .method("focus", 0, |_, _| Value::Null)
            .build()
    }

    #[test]
    fn test_match_required_members() {
        let contract = Contract::new("ChatInput")
            .field("value", FieldKind::String)
            .field("paddingLeft", FieldKind::Number)
            .method_with_arity("setInputValue", 1)
            .method("focus");
        assert!(contract.matches(&sample_instance()));
    }

    #[test]
    fn test_extra_fields_never_fail() {
        // The contract knows nothing about `extraneous`; the host adding
        // fields must not break matching.
        let contract = Contract::new("ChatInput").field("value", FieldKind::String);
        assert!(contract.matches(&sample_instance()));
    }

    #[test]
    fn test_missing_field_fails() {
        let contract = Contract::new("ChatInput").field("selectionStart", FieldKind::Number);
        let inst = sample_instance();
        assert!(!contract.matches(&inst));
        let err = contract.check(&inst).unwrap_err();
        assert!(err.to_string().contains("selectionStart"));
    }

    #[test]
    fn test_kind_mismatch_fails() {
        let contract = Contract::new("ChatInput").field("value", FieldKind::Number);
        assert!(!contract.matches(&sample_instance()));
    }

    #[test]
    fn test_null_field_satisfies_only_any() {
        let inst = sample_instance();
        assert!(!Contract::new("C")
            .field("slateEditor", FieldKind::Object)
            .matches(&inst));
        assert!(Contract::new("C")
            .field("slateEditor", FieldKind::Any)
            .matches(&inst));
    }

    #[test]
    fn test_arity_enforced_when_specified() {
        let inst = sample_instance();
        assert!(!Contract::new("C")
            .method_with_arity("setInputValue", 2)
            .matches(&inst));
        assert!(Contract::new("C").method("setInputValue").matches(&inst));

        let err = Contract::new("C")
            .method_with_arity("setInputValue", 2)
            .check(&inst)
            .unwrap_err();
        assert!(err.to_string().contains("arity"));
    }
}
