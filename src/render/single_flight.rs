use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Collapses concurrent calls for the same key into one execution.
///
/// The first caller for a key (the leader) runs the closure; callers arriving while it runs block
/// until it finishes and receive a clone of its result. Keys are independent: a slow call for one
/// key never delays another.
pub struct SingleFlight<K, V> {
    calls: Mutex<HashMap<K, Arc<Call<V>>>>,
}

struct Call<V> {
    state: Mutex<CallState<V>>,
    done: Condvar,
}

struct CallState<V> {
    finished: bool,
    result: Option<V>,
}

impl<V: Clone> Call<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState {
                finished: false,
                result: None,
            }),
            done: Condvar::new(),
        }
    }

    /// Block until the leader is done. `None` when it unwound without a result.
    fn wait(&self) -> Option<V> {
        let mut state = self.state.lock();
        while !state.finished {
            self.done.wait(&mut state);
        }
        state.result.clone()
    }
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` for `key` unless a call for it is already in flight, in which case wait for and
    /// share that call's result. The flag is `true` for the caller that actually ran `f`.
    pub fn run<F>(&self, key: &K, f: F) -> (V, bool)
    where
        F: FnOnce() -> V,
    {
        loop {
            let call = {
                let mut calls = self.calls.lock();
                match calls.get(key) {
                    Some(call) => Arc::clone(call),
                    None => {
                        let call = Arc::new(Call::new());
                        calls.insert(key.clone(), Arc::clone(&call));
                        drop(calls);
                        return (self.lead(key, call, f), true);
                    }
                }
            };
            if let Some(v) = call.wait() {
                return (v, false);
            }
            // The leader panicked; take over.
        }
    }

    /// `true` while a call for `key` is running.
    pub fn in_flight(&self, key: &K) -> bool {
        self.calls.lock().contains_key(key)
    }

    fn lead<F>(&self, key: &K, call: Arc<Call<V>>, f: F) -> V
    where
        F: FnOnce() -> V,
    {
        let mut finish = Finish {
            flight: self,
            key,
            call,
            result: None,
        };
        let v = f();
        finish.result = Some(v.clone());
        v
    }
}

/// Publishes the leader's result (or its absence on unwind) and retires the call.
struct Finish<'a, K: Eq + Hash, V> {
    flight: &'a SingleFlight<K, V>,
    key: &'a K,
    call: Arc<Call<V>>,
    result: Option<V>,
}

impl<K: Eq + Hash, V> Drop for Finish<'_, K, V> {
    fn drop(&mut self) {
        {
            let mut calls = self.flight.calls.lock();
            if calls
                .get(self.key)
                .is_some_and(|c| Arc::ptr_eq(c, &self.call))
            {
                calls.remove(self.key);
            }
        }
        let mut state = self.call.state.lock();
        state.result = self.result.take();
        state.finished = true;
        drop(state);
        self.call.done.notify_all();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/single_flight.rs"]
mod tests;
