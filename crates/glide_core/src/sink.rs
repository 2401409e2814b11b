//! Value sinks
//!
//! An animation never touches its target object directly. It goes through a
//! [`Settable`] capability: something that can report the live value and hand
//! out a [`Setter`] that writes new values back. The binding is resolved once
//! per animation and reused for every tick.
//!
//! Owners declare what can be animated with [`Member`] descriptors:
//!
//! ```rust
//! use glide_core::sink::{Member, PropertyRef};
//! use parking_lot::RwLock;
//! use std::sync::Arc;
//!
//! struct Panel {
//!     opacity: RwLock<f64>,
//! }
//!
//! const OPACITY: Member<Panel, f64> = Member::field(
//!     "opacity",
//!     |p| *p.opacity.read(),
//!     |p, v| *p.opacity.write() = v,
//! );
//!
//! let panel = Arc::new(Panel { opacity: RwLock::new(0.0) });
//! let prop = PropertyRef::member(&panel, OPACITY);
//! prop.bind().call(0.5);
//! assert_eq!(prop.get(), Some(0.5));
//! ```

use parking_lot::RwLock;
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

// ============================================================================
// Capability
// ============================================================================

/// Read and write access to one animatable value
pub trait Settable<T>: Send + Sync {
    /// The live value, or `None` when there is nothing to animate
    fn get(&self) -> Option<T>;

    /// Resolve a writer for this value
    fn bind(&self) -> Setter<T>;

    /// Write a value once without caching the binding
    fn set(&self, value: T) {
        self.bind().call(value);
    }
}

/// A bound writer, possibly a no-op
pub struct Setter<T> {
    write: Option<Arc<dyn Fn(T) + Send + Sync>>,
}

impl<T> Setter<T> {
    pub fn new<F>(write: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            write: Some(Arc::new(write)),
        }
    }

    /// A setter that drops every value
    pub fn noop() -> Self {
        Self { write: None }
    }

    pub fn is_noop(&self) -> bool {
        self.write.is_none()
    }

    #[inline]
    pub fn call(&self, value: T) {
        if let Some(write) = &self.write {
            write(value);
        }
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            write: self.write.clone(),
        }
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("noop", &self.is_noop())
            .finish()
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Identity of an animated property: owning object plus member name
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyKey {
    owner: usize,
    owner_type: TypeId,
    type_name: &'static str,
    member: &'static str,
}

impl PropertyKey {
    /// Key for `member` of the object behind `owner`
    pub fn of<O: 'static>(owner: &Arc<O>, member: &'static str) -> Self {
        Self::new::<O>(Arc::as_ptr(owner) as *const () as usize, member)
    }

    /// Key from an explicit owner id, for owners not held in an `Arc`
    pub fn new<O: 'static>(owner_id: usize, member: &'static str) -> Self {
        Self {
            owner: owner_id,
            owner_type: TypeId::of::<O>(),
            type_name: std::any::type_name::<O>(),
            member,
        }
    }

    pub fn owner_id(&self) -> usize {
        self.owner
    }

    pub fn member(&self) -> &'static str {
        self.member
    }

    pub fn owner_type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        let short = base.rsplit("::").next().unwrap_or(base);
        write!(f, "{}@{:#x}.{}", short, self.owner, self.member)
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyKey({})", self)
    }
}

// ============================================================================
// Member descriptors
// ============================================================================

/// Whether a member is a plain field or an accessor pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Property,
}

/// Declarative description of one animatable member of `O`
///
/// Setters take `&O` so owners shared behind an `Arc` use interior mutability.
pub struct Member<O, T> {
    name: &'static str,
    kind: MemberKind,
    get: fn(&O) -> T,
    public_set: Option<fn(&O, T)>,
    private_set: Option<fn(&O, T)>,
}

impl<O, T> Member<O, T> {
    pub const fn field(name: &'static str, get: fn(&O) -> T, set: fn(&O, T)) -> Self {
        Self {
            name,
            kind: MemberKind::Field,
            get,
            public_set: Some(set),
            private_set: None,
        }
    }

    /// A read-only property; add setters with the `with_*` builders
    pub const fn property(name: &'static str, get: fn(&O) -> T) -> Self {
        Self {
            name,
            kind: MemberKind::Property,
            get,
            public_set: None,
            private_set: None,
        }
    }

    pub const fn with_setter(mut self, set: fn(&O, T)) -> Self {
        self.public_set = Some(set);
        self
    }

    pub const fn with_private_setter(mut self, set: fn(&O, T)) -> Self {
        self.private_set = Some(set);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    /// Public setter if there is one, otherwise the private one
    pub fn setter(&self) -> Option<fn(&O, T)> {
        self.public_set.or(self.private_set)
    }

    pub fn read(&self, owner: &O) -> T {
        (self.get)(owner)
    }
}

impl<O, T> Clone for Member<O, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O, T> Copy for Member<O, T> {}

impl<O, T> fmt::Debug for Member<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("public_set", &self.public_set.is_some())
            .field("private_set", &self.private_set.is_some())
            .finish()
    }
}

/// A member bound to a weakly held owner
struct BoundMember<O, T> {
    owner: Weak<O>,
    member: Member<O, T>,
}

impl<O, T> Settable<T> for BoundMember<O, T>
where
    O: Send + Sync + 'static,
    T: 'static,
{
    fn get(&self) -> Option<T> {
        self.owner.upgrade().map(|o| self.member.read(&o))
    }

    fn bind(&self) -> Setter<T> {
        match self.member.setter() {
            Some(set) => {
                let owner = self.owner.clone();
                Setter::new(move |value| {
                    if let Some(o) = owner.upgrade() {
                        set(&o, value);
                    }
                })
            }
            None => {
                tracing::debug!(member = self.member.name, "member has no setter, binding no-op");
                Setter::noop()
            }
        }
    }
}

/// Closure-backed sink
pub struct FnSink<T> {
    get: Arc<dyn Fn() -> Option<T> + Send + Sync>,
    set: Option<Arc<dyn Fn(T) + Send + Sync>>,
}

impl<T: 'static> FnSink<T> {
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn() -> Option<T> + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Some(Arc::new(set)),
        }
    }

    pub fn read_only<G>(get: G) -> Self
    where
        G: Fn() -> Option<T> + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: None,
        }
    }
}

impl<T: 'static> Settable<T> for FnSink<T> {
    fn get(&self) -> Option<T> {
        (self.get)()
    }

    fn bind(&self) -> Setter<T> {
        match &self.set {
            Some(set) => Setter {
                write: Some(set.clone()),
            },
            None => Setter::noop(),
        }
    }
}

// ============================================================================
// Property reference
// ============================================================================

/// What an animation drives: an identity plus a sink
pub struct PropertyRef<T> {
    key: PropertyKey,
    sink: Arc<dyn Settable<T>>,
}

impl<T: 'static> PropertyRef<T> {
    pub fn new(key: PropertyKey, sink: Arc<dyn Settable<T>>) -> Self {
        Self { key, sink }
    }

    /// Reference `member` on `owner`; the owner is held weakly
    pub fn member<O>(owner: &Arc<O>, member: Member<O, T>) -> Self
    where
        O: Send + Sync + 'static,
    {
        Self {
            key: PropertyKey::of(owner, member.name()),
            sink: Arc::new(BoundMember {
                owner: Arc::downgrade(owner),
                member,
            }),
        }
    }

    /// Reference a value through injected closures
    pub fn from_fns<G, S>(key: PropertyKey, get: G, set: S) -> Self
    where
        G: Fn() -> Option<T> + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self::new(key, Arc::new(FnSink::new(get, set)))
    }

    pub fn key(&self) -> PropertyKey {
        self.key
    }

    pub fn get(&self) -> Option<T> {
        self.sink.get()
    }

    pub fn bind(&self) -> Setter<T> {
        self.sink.bind()
    }

    pub fn sink(&self) -> &Arc<dyn Settable<T>> {
        &self.sink
    }
}

impl<T> Clone for PropertyRef<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            sink: self.sink.clone(),
        }
    }
}

impl<T> fmt::Debug for PropertyRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyRef").field(&self.key).finish()
    }
}

// ============================================================================
// ValueCell
// ============================================================================

/// A standalone animatable slot that counts its writes
///
/// Handy as an owner when there is no real object to animate, and in tests.
pub struct ValueCell<T> {
    value: RwLock<T>,
    writes: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> ValueCell<T> {
    pub fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(value),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of `set` calls so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// The cell's `value` member
    pub fn member() -> Member<ValueCell<T>, T> {
        Member::field("value", |c: &ValueCell<T>| c.get(), |c: &ValueCell<T>, v| c.set(v))
    }

    pub fn property(self: &Arc<Self>) -> PropertyRef<T> {
        PropertyRef::member(self, Self::member())
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("value", &*self.value.read())
            .field("writes", &self.writes.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Widget {
        width: Mutex<f32>,
        log: Mutex<Vec<&'static str>>,
    }

    impl Widget {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                width: Mutex::new(0.0),
                log: Mutex::new(Vec::new()),
            })
        }
    }

    fn width(w: &Widget) -> f32 {
        *w.width.lock()
    }

    fn set_public(w: &Widget, v: f32) {
        w.log.lock().push("public");
        *w.width.lock() = v;
    }

    fn set_private(w: &Widget, v: f32) {
        w.log.lock().push("private");
        *w.width.lock() = v;
    }

    #[test]
    fn test_public_setter_preferred() {
        let w = Widget::new();
        let member = Member::property("width", width)
            .with_private_setter(set_private)
            .with_setter(set_public);
        let prop = PropertyRef::member(&w, member);

        prop.bind().call(4.0);
        assert_eq!(prop.get(), Some(4.0));
        assert_eq!(*w.log.lock(), vec!["public"]);
    }

    #[test]
    fn test_private_setter_fallback() {
        let w = Widget::new();
        let member = Member::property("width", width).with_private_setter(set_private);
        let prop = PropertyRef::member(&w, member);

        prop.bind().call(2.0);
        assert_eq!(prop.get(), Some(2.0));
        assert_eq!(*w.log.lock(), vec!["private"]);
    }

    #[test]
    fn test_missing_setter_is_noop() {
        let w = Widget::new();
        let prop = PropertyRef::member(&w, Member::property("width", width));

        let setter = prop.bind();
        assert!(setter.is_noop());
        setter.call(9.0);
        assert_eq!(prop.get(), Some(0.0));
    }

    #[test]
    fn test_dropped_owner_reads_none() {
        let cell = ValueCell::new(3i32);
        let prop = cell.property();
        let setter = prop.bind();
        drop(cell);

        assert_eq!(prop.get(), None);
        setter.call(5);
    }

    #[test]
    fn test_key_identity() {
        let a = ValueCell::new(0.0f64);
        let b = ValueCell::new(0.0f64);

        assert_eq!(a.property().key(), a.property().key());
        assert_ne!(a.property().key(), b.property().key());
        assert_eq!(a.property().key().member(), "value");
        assert!(a.property().key().to_string().contains(".value"));
    }

    #[test]
    fn test_value_cell_counts_writes() {
        let cell = ValueCell::new(1u8);
        let prop = cell.property();
        let setter = prop.bind();
        setter.call(2);
        setter.call(3);
        assert_eq!(cell.get(), 3);
        assert_eq!(cell.writes(), 2);
    }

    #[test]
    fn test_fn_sink() {
        let slot = Arc::new(Mutex::new(10i64));
        let read = slot.clone();
        let write = slot.clone();
        let prop = PropertyRef::from_fns(
            PropertyKey::new::<Mutex<i64>>(1, "slot"),
            move || Some(*read.lock()),
            move |v| *write.lock() = v,
        );
        prop.sink().set(42);
        assert_eq!(*slot.lock(), 42);
        assert_eq!(prop.get(), Some(42));
    }
}
