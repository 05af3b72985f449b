//! Two-phase subscription lifecycle.
//!
//! Construction never touches the upstream source; the actual attach happens
//! in `enable`, so checkpoint state can be restored first. Disposal is legal
//! in either phase, and enabling after an early dispose is a clean no-op
//! rather than a leak.

use crate::error::IngressError;

enum SubscriptionState<H> {
    Created(Box<dyn FnOnce() -> H + Send>),
    Enabled(H),
    Disposed,
}

/// A subscription created now, started later.
pub struct DelayedSubscription<H> {
    state: SubscriptionState<H>,
}

impl<H> DelayedSubscription<H> {
    pub fn new(factory: impl FnOnce() -> H + Send + 'static) -> Self {
        Self {
            state: SubscriptionState::Created(Box::new(factory)),
        }
    }

    /// Run the factory and hold its handle. Returns `Ok(false)` when the
    /// subscription was disposed before it was ever enabled.
    pub fn enable(&mut self) -> Result<bool, IngressError> {
        match self.state {
            SubscriptionState::Enabled(_) => return Err(IngressError::AlreadyEnabled),
            SubscriptionState::Disposed => return Ok(false),
            SubscriptionState::Created(_) => {}
        }
        let SubscriptionState::Created(factory) =
            std::mem::replace(&mut self.state, SubscriptionState::Disposed)
        else {
            return Ok(false);
        };
        self.state = SubscriptionState::Enabled(factory());
        Ok(true)
    }

    pub fn handle(&self) -> Option<&H> {
        match &self.state {
            SubscriptionState::Enabled(handle) => Some(handle),
            _ => None,
        }
    }

    /// Drop the factory or the live handle; safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.state = SubscriptionState::Disposed;
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, SubscriptionState::Enabled(_))
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.state, SubscriptionState::Disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn factory_runs_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory_calls = Arc::clone(&calls);
        let mut subscription = DelayedSubscription::new(move || {
            factory_calls.fetch_add(1, Ordering::SeqCst);
            42u32
        });
        assert!(!subscription.is_enabled());
        assert!(subscription.enable().unwrap());
        assert_eq!(subscription.handle(), Some(&42));
        assert_eq!(
            subscription.enable(),
            Err(IngressError::AlreadyEnabled)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_before_enable_is_clean() {
        let mut subscription = DelayedSubscription::new(|| 7u32);
        subscription.dispose();
        subscription.dispose();
        // Enabling later neither runs the factory nor leaks a handle.
        assert!(!subscription.enable().unwrap());
        assert!(subscription.is_disposed());
        assert!(subscription.handle().is_none());
    }

    #[test]
    fn dispose_after_enable_drops_handle() {
        struct Guard(Arc<AtomicUsize>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let drops = Arc::new(AtomicUsize::new(0));
        let guard_drops = Arc::clone(&drops);
        let mut subscription = DelayedSubscription::new(move || Guard(guard_drops));
        subscription.enable().unwrap();
        subscription.dispose();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
