//! Method interceptor: wrap live instance methods without breaking them.
//!
//! [`install`] replaces a method entry on a matched instance with a wrapper
//! that runs injected logic alongside the host's own. Four modes:
//!
//! | Mode | Injected hook | Arguments / return |
//! |------|---------------|--------------------|
//! | before | runs first | untouched, original always runs |
//! | after | runs second | untouched, original always runs |
//! | around | owns the call | hook receives the original and full control |
//! | replace | owns the call | like around; original usually ignored |
//!
//! The wrapper carries a [`PatchMarker`] on the method entry itself. The
//! marker records the *true original* function, so:
//!
//! - re-installing on an already-patched method replaces the previous
//!   wrapper's injected logic instead of stacking a second wrapper (the
//!   single-active-wrapper invariant), and
//! - [`uninstall`] restores the exact original function reference captured
//!   at first install.
//!
//! Before/after hooks are fault-isolated: a panicking hook is caught,
//! logged, and never aborts the host's original call. Around/replace hooks
//! own the invocation and are solely responsible for forwarding the
//! original's behavior.

use crate::error::{Error, Result};
use crate::instance::{InstanceRef, Method, MethodFn, Value};
use crate::locator::Handle;
use smartstring::alias::String as SmartString;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Interception mode of an installed wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// Injected logic runs before the original.
    Before,
    /// Injected logic runs after the original.
    After,
    /// Injected logic receives the original and controls the call.
    Around,
    /// Injected logic stands in for the original.
    Replace,
}

/// Observe-only hook signature used by before/after patches.
pub type HookFn = dyn Fn(&InstanceRef, &[Value]) + Send + Sync;

/// Controlling hook signature used by around/replace patches.
pub type AroundFn = dyn Fn(&InstanceRef, &Original, &[Value]) -> Value + Send + Sync;

/// The captured original method, as handed to around/replace hooks.
#[derive(Clone)]
pub struct Original {
    func: Arc<MethodFn>,
}

impl Original {
    /// Invoke the original method with an explicit receiver.
    pub fn call(&self, receiver: &InstanceRef, args: &[Value]) -> Value {
        (self.func)(receiver, args)
    }
}

impl fmt::Debug for Original {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Original").finish_non_exhaustive()
    }
}

/// Marker left on a patched method entry.
///
/// Travels with the [`Method`] itself, which is what makes double-install
/// detection reliable even when callers hold independent handles to the
/// same instance.
#[derive(Clone)]
pub struct PatchMarker {
    pub(crate) original: Arc<MethodFn>,
    pub(crate) mode: PatchMode,
}

impl PatchMarker {
    /// Mode of the active wrapper.
    pub fn mode(&self) -> PatchMode {
        self.mode
    }
}

impl fmt::Debug for PatchMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchMarker")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A wrapper to install, built with one of the mode constructors.
///
/// # Example
///
/// ```
/// use graft::patch::Patch;
///
/// let patch = Patch::before(|_inst, args| {
///     tracing::debug!(?args, "send observed");
/// });
/// assert_eq!(patch.mode(), graft::patch::PatchMode::Before);
/// ```
pub enum Patch {
    /// Observe-only, runs before the original.
    Before(Arc<HookFn>),
    /// Observe-only, runs after the original.
    After(Arc<HookFn>),
    /// Controls the call, receives the original.
    Around(Arc<AroundFn>),
    /// Stands in for the original.
    Replace(Arc<AroundFn>),
}

impl Patch {
    /// Build a before-mode patch.
    pub fn before<F>(hook: F) -> Self
    where
        F: Fn(&InstanceRef, &[Value]) + Send + Sync + 'static,
    {
        Patch::Before(Arc::new(hook))
    }

    /// Build an after-mode patch.
    pub fn after<F>(hook: F) -> Self
    where
        F: Fn(&InstanceRef, &[Value]) + Send + Sync + 'static,
    {
        Patch::After(Arc::new(hook))
    }

    /// Build an around-mode patch.
    pub fn around<F>(hook: F) -> Self
    where
        F: Fn(&InstanceRef, &Original, &[Value]) -> Value + Send + Sync + 'static,
    {
        Patch::Around(Arc::new(hook))
    }

    /// Build a replace-mode patch.
    pub fn replace<F>(hook: F) -> Self
    where
        F: Fn(&InstanceRef, &Original, &[Value]) -> Value + Send + Sync + 'static,
    {
        Patch::Replace(Arc::new(hook))
    }

    /// The mode this patch installs as.
    pub fn mode(&self) -> PatchMode {
        match self {
            Patch::Before(_) => PatchMode::Before,
            Patch::After(_) => PatchMode::After,
            Patch::Around(_) => PatchMode::Around,
            Patch::Replace(_) => PatchMode::Replace,
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Patch").field(&self.mode()).finish()
    }
}

/// Install a wrapper on `method` of the instance behind `handle`.
///
/// Fails with `ContractMismatch` when the handle no longer revalidates and
/// with `PatchConflict` when the method is absent; neither failure leaves a
/// partial patch behind. Installing over an existing wrapper replaces its
/// injected logic while preserving the chain back to the true original.
pub fn install(handle: &Handle, method: &str, patch: Patch) -> Result<()> {
    let instance = handle.get()?;
    let current = instance.method(method).ok_or_else(|| Error::PatchConflict {
        method: method.to_string(),
    })?;

    // Re-install goes back to the true original, never the current wrapper.
    let original = match &current.patch {
        Some(marker) => marker.original.clone(),
        None => current.func.clone(),
    };
    let arity = current.arity;
    let mode = patch.mode();
    let name: SmartString = SmartString::from(method);

    let wrapped: Arc<MethodFn> = match patch {
        Patch::Before(hook) => {
            let base = original.clone();
            Arc::new(move |inst: &InstanceRef, args: &[Value]| {
                run_isolated("before", name.as_str(), || hook(inst, args));
                base(inst, args)
            })
        }
        Patch::After(hook) => {
            let base = original.clone();
            Arc::new(move |inst: &InstanceRef, args: &[Value]| {
                let ret = base(inst, args);
                run_isolated("after", name.as_str(), || hook(inst, args));
                ret
            })
        }
        Patch::Around(hook) | Patch::Replace(hook) => {
            let base = Original {
                func: original.clone(),
            };
            Arc::new(move |inst: &InstanceRef, args: &[Value]| hook(inst, &base, args))
        }
    };

    instance.set_method(
        method,
        Method {
            func: wrapped,
            arity,
            patch: Some(PatchMarker { original, mode }),
        },
    );
    tracing::debug!(
        contract = handle.contract().name(),
        method,
        ?mode,
        "wrapper installed"
    );
    Ok(())
}

/// Remove any wrapper from `method`, restoring the exact original function
/// captured at install time. A no-op on an unpatched method.
pub fn uninstall(handle: &Handle, method: &str) -> Result<()> {
    let instance = handle.get()?;
    let current = instance.method(method).ok_or_else(|| Error::PatchConflict {
        method: method.to_string(),
    })?;
    if let Some(marker) = current.patch {
        instance.set_method(
            method,
            Method {
                func: marker.original,
                arity: current.arity,
                patch: None,
            },
        );
        tracing::debug!(
            contract = handle.contract().name(),
            method,
            "wrapper removed"
        );
    }
    Ok(())
}

/// Whether a wrapper is currently installed on `method`.
pub fn is_patched(handle: &Handle, method: &str) -> Result<bool> {
    Ok(handle
        .get()?
        .method(method)
        .map(|m| m.is_patched())
        .unwrap_or(false))
}

/// Run an observe-only hook, containing any panic it raises.
fn run_isolated(stage: &str, method: &str, hook: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(hook)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::warn!(
            method,
            stage,
            panic = %message,
            "injected hook panicked; original call unaffected"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contract::{Contract, FieldKind};
    use crate::instance::InstanceNode;
    use crate::locator::{resolve, Direction};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doubler() -> (crate::instance::InstanceRef, Handle) {
        let inst = InstanceNode::new("Calc")
            .field("tag", "calc")
            .method("double", 1, |_, args| {
                Value::Int(args.first().and_then(|v| v.as_i64()).unwrap_or(0) * 2)
            })
            .build();
        let contract = Contract::new("Calc")
            .field("tag", FieldKind::String)
            .method_with_arity("double", 1);
        let handle = resolve(&inst, &contract, Direction::Down).unwrap();
        (inst, handle)
    }

    #[test]
    fn test_before_preserves_call_semantics() {
        let (inst, handle) = doubler();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();

        install(
            &handle,
            "double",
            Patch::before(move |_, _| {
                seen2.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        assert_eq!(inst.call("double", &[Value::Int(21)]).unwrap(), Value::Int(42));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_uninstall_restores_exact_original() {
        let (inst, handle) = doubler();
        let before = inst.method("double").unwrap().func.clone();

        install(&handle, "double", Patch::before(|_, _| {})).unwrap();
        assert!(is_patched(&handle, "double").unwrap());

        uninstall(&handle, "double").unwrap();
        assert!(!is_patched(&handle, "double").unwrap());

        let after = inst.method("double").unwrap().func.clone();
        assert!(Arc::ptr_eq(&before, &after), "same function reference restored");
        assert_eq!(inst.call("double", &[Value::Int(3)]).unwrap(), Value::Int(6));
    }

    #[test]
    fn test_double_install_runs_hook_once_per_call() {
        let (inst, handle) = doubler();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let count = count.clone();
            install(
                &handle,
                "double",
                Patch::before(move |_, _| {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        }

        inst.call("double", &[Value::Int(1)]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1, "replaced, not stacked");
    }

    #[test]
    fn test_reinstall_then_uninstall_reaches_true_original() {
        let (inst, handle) = doubler();
        let original = inst.method("double").unwrap().func.clone();

        install(&handle, "double", Patch::before(|_, _| {})).unwrap();
        install(&handle, "double", Patch::after(|_, _| {})).unwrap();
        uninstall(&handle, "double").unwrap();

        let restored = inst.method("double").unwrap().func.clone();
        assert!(Arc::ptr_eq(&original, &restored));
    }

    #[test]
    fn test_panicking_before_hook_isolated() {
        let (inst, handle) = doubler();
        install(
            &handle,
            "double",
            Patch::before(|_, _| panic!("hook bug")),
        )
        .unwrap();

        // The original still runs and returns normally.
        assert_eq!(inst.call("double", &[Value::Int(5)]).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_around_controls_return() {
        let (inst, handle) = doubler();
        install(
            &handle,
            "double",
            Patch::around(|inst, original, args| {
                let inner = original.call(inst, args);
                Value::Int(inner.as_i64().unwrap_or(0) + 1)
            }),
        )
        .unwrap();

        assert_eq!(inst.call("double", &[Value::Int(4)]).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_replace_skips_original() {
        let (inst, handle) = doubler();
        install(
            &handle,
            "double",
            Patch::replace(|_, _original, _| Value::from("blocked")),
        )
        .unwrap();

        assert_eq!(
            inst.call("double", &[Value::Int(4)]).unwrap(),
            Value::from("blocked")
        );
    }

    #[test]
    fn test_install_missing_method_conflict() {
        let (_inst, handle) = doubler();
        let err = install(&handle, "nope", Patch::before(|_, _| {})).unwrap_err();
        assert!(matches!(err, Error::PatchConflict { .. }));
    }

    #[test]
    fn test_receiver_binding_passes_through() {
        let (inst, handle) = doubler();
        let expected = inst.id();
        let ok = Arc::new(AtomicUsize::new(0));
        let ok2 = ok.clone();
        install(
            &handle,
            "double",
            Patch::before(move |receiver, _| {
                if receiver.id() == expected {
                    ok2.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .unwrap();

        inst.call("double", &[Value::Int(1)]).unwrap();
        assert_eq!(ok.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_uninstall_unpatched_noop() {
        let (_inst, handle) = doubler();
        assert!(uninstall(&handle, "double").is_ok());
    }
}
