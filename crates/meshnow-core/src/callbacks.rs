//! User data-callback registry (§6: `register_data_callback` /
//! `unregister_data_callback`). The C++ source keeps these in a doubly
//! linked list of weak-owning handles; in Rust a `Vec` keyed by an
//! incrementing handle is the equivalent without the lifetime hazard §9
//! calls out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use meshnow_wire::Address;

pub type DataCallback = Box<dyn Fn(Address, &[u8]) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

#[derive(Default)]
pub struct CallbackRegistry {
    next_handle: AtomicU64,
    callbacks: Mutex<Vec<(CallbackHandle, DataCallback)>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: DataCallback) -> CallbackHandle {
        let handle = CallbackHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().unwrap().push((handle, callback));
        handle
    }

    /// Idempotent: unregistering an already-removed or unknown handle is a
    /// no-op rather than an error.
    pub fn unregister(&self, handle: CallbackHandle) {
        self.callbacks.lock().unwrap().retain(|(h, _)| *h != handle);
    }

    pub fn dispatch(&self, src: Address, data: &[u8]) {
        for (_, callback) in self.callbacks.lock().unwrap().iter() {
            callback(src, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn dispatch_reaches_every_registered_callback() {
        let registry = CallbackRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let c2 = count.clone();
        registry.register(Box::new(move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        registry.register(Box::new(move |_, _| {
            c2.fetch_add(1, Ordering::SeqCst);
        }));
        registry.dispatch(Address::new([0; 6]), b"hi");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unregister_is_idempotent_and_stops_dispatch() {
        let registry = CallbackRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let handle = registry.register(Box::new(move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        registry.unregister(handle);
        registry.unregister(handle);
        registry.dispatch(Address::new([0; 6]), b"hi");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
