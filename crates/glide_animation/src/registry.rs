//! Transition handler registry
//!
//! Maps a value type to the [`TransitionHandler`] that animates it. Handlers
//! arrive two ways:
//!
//! - **Providers**: units implementing [`HandlerProvider`] that declare a set
//!   of handlers. All providers are scanned once, in parallel, the first time
//!   anything is resolved. A provider that fails or panics is skipped without
//!   affecting the others.
//! - **Explicit registration** via [`TransitionRegistry::register`].
//!
//! Every insert is insert-if-absent: the first handler registered for a type
//! wins, whichever path it came through.
//!
//! # Example
//!
//! ```rust
//! use glide_animation::registry::TransitionRegistry;
//!
//! let registry = TransitionRegistry::with_builtins();
//! assert!(registry.resolve::<f64>().is_ok());
//! assert!(registry.resolve::<String>().is_err());
//! ```

use crate::error::{panic_message, RegistryError};
use crate::transition::{BuiltinTransitions, TransitionHandler};
use glide_core::Animatable;
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::{Any, TypeId};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock, OnceLock};

static GLOBAL_REGISTRY: LazyLock<Arc<TransitionRegistry>> =
    LazyLock::new(|| Arc::new(TransitionRegistry::with_builtins()));

// ============================================================================
// Providers
// ============================================================================

/// A unit that declares transition handlers
pub trait HandlerProvider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Declare this unit's handlers
    ///
    /// Returning an error discards everything the unit declared.
    fn declare(&self, registrar: &mut Registrar) -> Result<(), RegistryError>;
}

struct Entry {
    type_name: &'static str,
    provider: Arc<str>,
    shared: bool,
    handler: Arc<dyn Any + Send + Sync>,
}

/// Collects one provider's declarations
pub struct Registrar {
    provider: Arc<str>,
    declared: Vec<(TypeId, Entry)>,
    seen: FxHashSet<TypeId>,
    rejected: Vec<RegistryError>,
}

impl Registrar {
    fn new(provider: &str) -> Self {
        Self {
            provider: Arc::from(provider),
            declared: Vec::new(),
            seen: FxHashSet::default(),
            rejected: Vec::new(),
        }
    }

    /// Declare the handler for a value type
    ///
    /// A second declaration for the same type is dropped.
    pub fn declare<T: Animatable>(&mut self, handler: TransitionHandler<T>) -> &mut Self {
        self.push::<T>(handler, false)
    }

    /// Declare the handler for a reference-like value type
    ///
    /// Animations of shared types push their value through the sink after
    /// every successful step, even when it compares equal to the last one.
    pub fn declare_shared<T: Animatable>(&mut self, handler: TransitionHandler<T>) -> &mut Self {
        self.push::<T>(handler, true)
    }

    fn push<T: Animatable>(&mut self, handler: TransitionHandler<T>, shared: bool) -> &mut Self {
        let type_id = TypeId::of::<T>();
        if !self.seen.insert(type_id) {
            self.rejected.push(RegistryError::DuplicateDeclaration {
                provider: self.provider.to_string(),
                type_name: std::any::type_name::<T>(),
            });
            return self;
        }
        self.declared.push((
            type_id,
            Entry {
                type_name: std::any::type_name::<T>(),
                provider: self.provider.clone(),
                shared,
                handler: Arc::new(handler),
            },
        ));
        self
    }

    /// Number of accepted declarations
    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

/// A handler looked up for `T`
pub struct ResolvedHandler<T> {
    pub handler: TransitionHandler<T>,
    /// Whether `T` was declared shared
    pub shared: bool,
}

impl<T> Clone for ResolvedHandler<T> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            shared: self.shared,
        }
    }
}

impl<T> fmt::Debug for ResolvedHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedHandler")
            .field("type", &std::any::type_name::<T>())
            .field("shared", &self.shared)
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
struct Providers {
    list: Vec<Arc<dyn HandlerProvider>>,
    /// Set by the population scan, under the same lock
    scanned: bool,
}

/// Type-keyed table of transition handlers
pub struct TransitionRegistry {
    entries: RwLock<FxHashMap<TypeId, Entry>>,
    providers: RwLock<Providers>,
    populated: OnceLock<usize>,
}

impl TransitionRegistry {
    /// An empty registry with no providers
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            providers: RwLock::new(Providers::default()),
            populated: OnceLock::new(),
        }
    }

    /// A registry that will discover the built-in handlers
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.add_provider(BuiltinTransitions);
        registry
    }

    /// The process-wide registry, with built-ins
    pub fn global() -> Arc<TransitionRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    /// Add a provider to scan
    ///
    /// Providers added after population are scanned immediately. One added
    /// while population runs waits for it and is then scanned.
    pub fn add_provider<P: HandlerProvider + 'static>(&self, provider: P) {
        let provider: Arc<dyn HandlerProvider> = Arc::new(provider);
        let mut providers = self.providers.write();
        if providers.scanned {
            self.scan(std::slice::from_ref(&provider));
        }
        providers.list.push(provider);
    }

    /// Scan every provider once
    ///
    /// Safe to call from many threads; later calls wait for the first to
    /// finish and then return its result. Returns the number of handlers the
    /// scan added.
    pub fn populate(&self) -> usize {
        *self.populated.get_or_init(|| {
            let mut providers = self.providers.write();
            let added = self.scan(&providers.list);
            providers.scanned = true;
            tracing::debug!(
                providers = providers.list.len(),
                added,
                total = self.len(),
                "transition registry populated"
            );
            added
        })
    }

    pub fn is_populated(&self) -> bool {
        self.populated.get().is_some()
    }

    fn scan(&self, providers: &[Arc<dyn HandlerProvider>]) -> usize {
        providers
            .par_iter()
            .filter_map(|p| scan_unit(p.as_ref()))
            .map(|registrar| self.merge(registrar))
            .sum()
    }

    fn merge(&self, registrar: Registrar) -> usize {
        let mut entries = self.entries.write();
        let mut added = 0;
        for (type_id, entry) in registrar.declared {
            if let std::collections::hash_map::Entry::Vacant(slot) = entries.entry(type_id) {
                slot.insert(entry);
                added += 1;
            }
        }
        added
    }

    /// Register a handler unless `T` already has one
    ///
    /// Returns whether the handler was inserted.
    pub fn register<T: Animatable>(&self, handler: TransitionHandler<T>) -> bool {
        self.insert::<T>(handler, false)
    }

    /// Like [`register`](Self::register), marking `T` as shared
    pub fn register_shared<T: Animatable>(&self, handler: TransitionHandler<T>) -> bool {
        self.insert::<T>(handler, true)
    }

    fn insert<T: Animatable>(&self, handler: TransitionHandler<T>, shared: bool) -> bool {
        let mut registrar = Registrar::new("explicit");
        registrar.push::<T>(handler, shared);
        self.merge(registrar) == 1
    }

    /// Look up the handler for `T`, populating on first use
    pub fn resolve<T: Animatable>(&self) -> Result<ResolvedHandler<T>, RegistryError> {
        self.populate();
        let entries = self.entries.read();
        entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| {
                entry
                    .handler
                    .downcast_ref::<TransitionHandler<T>>()
                    .map(|handler| ResolvedHandler {
                        handler: handler.clone(),
                        shared: entry.shared,
                    })
            })
            .ok_or(RegistryError::NotFound {
                type_name: std::any::type_name::<T>(),
            })
    }

    pub fn contains<T: Animatable>(&self) -> bool {
        self.entries.read().contains_key(&TypeId::of::<T>())
    }

    /// Provider that supplied the handler for `T`
    pub fn provider_of<T: Animatable>(&self) -> Option<String> {
        self.entries
            .read()
            .get(&TypeId::of::<T>())
            .map(|e| e.provider.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Names of all registered types, sorted
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.read().values().map(|e| e.type_name).collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRegistry")
            .field("types", &self.len())
            .field("providers", &self.providers.read().list.len())
            .field("populated", &self.is_populated())
            .finish()
    }
}

/// Run one provider, isolating its failures
fn scan_unit(provider: &dyn HandlerProvider) -> Option<Registrar> {
    let mut registrar = Registrar::new(provider.name());
    match panic::catch_unwind(AssertUnwindSafe(|| provider.declare(&mut registrar))) {
        Ok(Ok(())) => {
            for rejected in registrar.rejected.drain(..) {
                tracing::debug!(error = %rejected, "skipping handler declaration");
            }
            Some(registrar)
        }
        Ok(Err(err)) => {
            tracing::debug!(provider = provider.name(), error = %err, "skipping handler provider");
            None
        }
        Err(payload) => {
            tracing::debug!(
                provider = provider.name(),
                panic = %panic_message(payload.as_ref()),
                "handler provider panicked, skipping"
            );
            None
        }
    }
}
