use std::cell::Cell;

use crate::maybe_autoreleasepool;

thread_local! {
    static INFERENCE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// A guard that marks the current thread as running inference.
///
/// Entering the scope happens in [`InferenceMode::enter`]; leaving it happens when the guard is
/// dropped, so the scope is released on early returns, `?` and unwinding alike. Scopes nest.
///
/// This is only a marker that models may check with [`is_inference_mode`]. Candle has no global
/// gradient mode: tensors returned from the scope still need `detach()` to drop any tracking.
#[derive(Debug)]
pub struct InferenceMode {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl InferenceMode {
    /// Enter the inference scope on the current thread.
    pub fn enter() -> Self {
        INFERENCE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        tracing::trace!("entered inference mode");
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for InferenceMode {
    fn drop(&mut self) {
        INFERENCE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        tracing::trace!("left inference mode");
    }
}

/// Check if the current thread is inside an [`InferenceMode`] scope.
pub fn is_inference_mode() -> bool {
    INFERENCE_DEPTH.with(|depth| depth.get() > 0)
}

/// Run a closure inside the inference scope (and the metal release pool when enabled).
///
/// Any tensors the closure returns should be detached before they leave the scope.
pub fn with_inference_mode<T>(f: impl FnOnce() -> T) -> T {
    let _guard = InferenceMode::enter();
    maybe_autoreleasepool(f)
}
