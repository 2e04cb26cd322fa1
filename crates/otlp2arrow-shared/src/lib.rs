// otlp2arrow-shared - one live component per configuration
//
// Exporters for different signal kinds often share one destination. The
// registry hands out reference-counted handles to a single component per key:
// the component starts at most once and shuts down when the last handle is
// released.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

/// Something with a start/shutdown lifecycle
pub trait Component: Send + Sync {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    handles: usize,
    started: bool,
}

struct Shared<C> {
    component: C,
    lifecycle: Mutex<Lifecycle>,
}

type Entries<K, C> = Arc<Mutex<HashMap<K, Arc<Shared<C>>>>>;

/// Thread-safe map from configuration key to a shared component
pub struct SharedComponents<K, C> {
    entries: Entries<K, C>,
}

impl<K, C> Default for SharedComponents<K, C> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, C> Clone for SharedComponents<K, C> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, C> SharedComponents<K, C>
where
    K: Eq + Hash + Clone + fmt::Debug,
    C: Component,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a handle to the component for `key`, creating it if needed
    ///
    /// `create` only runs when no live component exists for the key. A failed
    /// creation leaves the registry unchanged.
    pub fn get_or_add<F>(&self, key: K, create: F) -> Result<SharedComponent<K, C>>
    where
        F: FnOnce() -> Result<C>,
    {
        let mut entries = self.entries.lock();
        let shared = match entries.get(&key) {
            Some(shared) => Arc::clone(shared),
            None => {
                let component =
                    create().with_context(|| format!("failed to create component for {key:?}"))?;
                let shared = Arc::new(Shared {
                    component,
                    lifecycle: Mutex::new(Lifecycle::default()),
                });
                entries.insert(key.clone(), Arc::clone(&shared));
                tracing::debug!(?key, "registered shared component");
                shared
            }
        };
        shared.lifecycle.lock().handles += 1;

        Ok(SharedComponent {
            key,
            shared,
            entries: Arc::clone(&self.entries),
            released: false,
        })
    }

    /// Number of live components
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// A reference to a registered component
///
/// Dropping the handle releases it; call [`SharedComponent::release`] to
/// observe shutdown errors.
pub struct SharedComponent<K, C>
where
    K: Eq + Hash + Clone + fmt::Debug,
    C: Component,
{
    key: K,
    shared: Arc<Shared<C>>,
    entries: Entries<K, C>,
    released: bool,
}

impl<K, C> SharedComponent<K, C>
where
    K: Eq + Hash + Clone + fmt::Debug,
    C: Component,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn component(&self) -> &C {
        &self.shared.component
    }

    /// Start the component unless another handle already did
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.started {
            return Ok(());
        }
        self.shared
            .component
            .start()
            .with_context(|| format!("failed to start component for {:?}", self.key))?;
        lifecycle.started = true;
        tracing::debug!(key = ?self.key, "started shared component");
        Ok(())
    }

    /// Drop this reference; the last one shuts the component down
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let was_started = {
            let mut entries = self.entries.lock();
            let mut lifecycle = self.shared.lifecycle.lock();
            lifecycle.handles -= 1;
            if lifecycle.handles > 0 {
                return Ok(());
            }
            // A newer component may have replaced ours under the same key
            if entries
                .get(&self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.shared))
            {
                entries.remove(&self.key);
            }
            std::mem::take(&mut lifecycle.started)
        };

        if was_started {
            self.shared
                .component
                .shutdown()
                .with_context(|| format!("failed to shut down component for {:?}", self.key))?;
            tracing::debug!(key = ?self.key, "shut down shared component");
        }
        Ok(())
    }
}

impl<K, C> std::ops::Deref for SharedComponent<K, C>
where
    K: Eq + Hash + Clone + fmt::Debug,
    C: Component,
{
    type Target = C;

    fn deref(&self) -> &C {
        self.component()
    }
}

impl<K, C> Drop for SharedComponent<K, C>
where
    K: Eq + Hash + Clone + fmt::Debug,
    C: Component,
{
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            tracing::warn!(key = ?self.key, error = %err, "shared component shutdown failed");
        }
    }
}
