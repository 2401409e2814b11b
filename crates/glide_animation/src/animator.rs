//! Animator
//!
//! Owns the set of live animations, at most one per property, and the timer
//! that ticks them. Starting an animation on a property that is already
//! animating retargets the existing record rather than racing a second one.
//!
//! Records detach themselves when they finish by posting a command on a
//! channel; the animator drains it whenever it touches the live set, so a
//! finishing tick never has to take the animator's lock.
//!
//! The timer thread parks while the live set is empty and is woken by the
//! next `animate`.

use crate::animation::{
    Animation, AnimationHandle, AnimationSnapshot, Engine, Params, TickOutcome, UpdateCallback,
};
use crate::config::AnimatorConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{AnimationError, Result};
use crate::registry::TransitionRegistry;
use crossbeam_channel::{Receiver, Sender};
use glide_core::{
    Animatable, AnimationState, ExceptionPolicy, PropertyKey, PropertyRef, SharedClock,
    SystemClock,
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// ============================================================================
// Global Animator
// ============================================================================

static GLOBAL_ANIMATOR: OnceLock<Animator> = OnceLock::new();

/// Install the process-wide animator
///
/// Fails if one was already installed or lazily created.
pub fn set_global_animator(animator: Animator) -> Result<()> {
    GLOBAL_ANIMATOR
        .set(animator)
        .map_err(|_| AnimationError::GlobalAlreadySet)
}

/// The process-wide animator, created with the standard configuration on
/// first use
pub fn global_animator() -> &'static Animator {
    GLOBAL_ANIMATOR.get_or_init(Animator::new)
}

pub fn try_global_animator() -> Option<&'static Animator> {
    GLOBAL_ANIMATOR.get()
}

pub fn is_global_animator_initialized() -> bool {
    GLOBAL_ANIMATOR.get().is_some()
}

// ============================================================================
// Ids and commands
// ============================================================================

new_key_type! {
    /// Slot of a record in the live set
    pub struct AnimationId;
}

pub(crate) enum Command {
    Detach(AnimationId),
}

/// Hook run after every timer pass
pub type FrameCallback = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// Type-erased records
// ============================================================================

pub(crate) trait ErasedAnimation: Send + Sync {
    fn id(&self) -> AnimationId;
    fn key(&self) -> PropertyKey;
    fn state(&self) -> AnimationState;
    fn is_stoppable(&self) -> bool;
    fn request_update(self: Arc<Self>, run_on_pool: bool) -> Result<TickOutcome>;
    /// Halt, handing the callback a final snapshot when `notify` is set
    fn halt_with(self: Arc<Self>, notify: bool, superseded: bool) -> bool;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Animatable> ErasedAnimation for Animation<T> {
    fn id(&self) -> AnimationId {
        Animation::id(self)
    }

    fn key(&self) -> PropertyKey {
        Animation::key(self)
    }

    fn state(&self) -> AnimationState {
        Animation::state(self)
    }

    fn is_stoppable(&self) -> bool {
        Animation::is_stoppable(self)
    }

    fn request_update(self: Arc<Self>, run_on_pool: bool) -> Result<TickOutcome> {
        self.update(run_on_pool)
    }

    fn halt_with(self: Arc<Self>, notify: bool, superseded: bool) -> bool {
        if !self.halt() {
            return false;
        }
        if let Some(callback) = self.take_callback() {
            if notify {
                self.deliver(callback, superseded);
            }
        }
        true
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn downcast<T: Animatable>(record: &Arc<dyn ErasedAnimation>) -> Option<AnimationHandle<T>> {
    record.clone().into_any().downcast::<Animation<T>>().ok()
}

#[derive(Default)]
struct LiveSet {
    records: SlotMap<AnimationId, Arc<dyn ErasedAnimation>>,
    by_key: FxHashMap<PropertyKey, AnimationId>,
}

impl LiveSet {
    fn get(&self, key: &PropertyKey) -> Option<&Arc<dyn ErasedAnimation>> {
        self.by_key.get(key).and_then(|id| self.records.get(*id))
    }

    fn remove(&mut self, id: AnimationId) -> Option<Arc<dyn ErasedAnimation>> {
        let record = self.records.remove(id)?;
        let key = record.key();
        if self.by_key.get(&key) == Some(&id) {
            self.by_key.remove(&key);
        }
        Some(record)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Options for [`Animator::halt`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HaltOptions {
    /// Also halt animations created as non-stoppable
    pub halt_unstoppable: bool,
    /// Hand the callback a final `Halted` snapshot
    pub notify: bool,
}

impl Default for HaltOptions {
    fn default() -> Self {
        Self {
            halt_unstoppable: false,
            notify: true,
        }
    }
}

/// Parameters of one [`Animator::animate`] call
pub struct AnimationRequest<T> {
    gradient: f64,
    linear_speed: f64,
    stoppable: bool,
    on_update: Option<UpdateCallback<T>>,
    policy: Option<ExceptionPolicy>,
    callback_policy: Option<ExceptionPolicy>,
    tag: Option<String>,
    call_if_finished: bool,
}

impl<T: Animatable> AnimationRequest<T> {
    /// Approach by `gradient` of the remaining distance plus `linear_speed`
    /// per 30ms of elapsed time
    pub fn new(gradient: f64, linear_speed: f64) -> Self {
        Self {
            gradient,
            linear_speed,
            stoppable: true,
            on_update: None,
            policy: None,
            callback_policy: None,
            tag: None,
            call_if_finished: true,
        }
    }

    /// Whether outside writes to the property stop the animation
    pub fn stoppable(mut self, stoppable: bool) -> Self {
        self.stoppable = stoppable;
        self
    }

    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AnimationSnapshot<T>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(callback));
        self
    }

    pub fn policy(mut self, policy: ExceptionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Policy for callback failures; defaults to [`policy`](Self::policy)
    pub fn callback_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.callback_policy = Some(policy);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Whether a callback this request replaces hears about it
    pub fn call_if_finished(mut self, call: bool) -> Self {
        self.call_if_finished = call;
        self
    }

    fn params(&self, default_policy: ExceptionPolicy) -> Params {
        let policy = self.policy.unwrap_or(default_policy);
        let mut params = Params::new(self.gradient, self.linear_speed, self.stoppable, policy);
        params.callback_policy = self.callback_policy.unwrap_or(policy);
        params.tag = self.tag.clone();
        params
    }
}

// ============================================================================
// Animator
// ============================================================================

struct AnimatorShared {
    config: AnimatorConfig,
    engine: Arc<Engine>,
    live: Mutex<LiveSet>,
    commands: Receiver<Command>,
    on_frame: RwLock<Option<FrameCallback>>,
    stop_flag: Arc<AtomicBool>,
    background: Mutex<Option<JoinHandle<()>>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl AnimatorShared {
    fn drain(&self, live: &mut LiveSet) {
        while let Ok(Command::Detach(id)) = self.commands.try_recv() {
            live.remove(id);
        }
    }

    /// Unpark the timer thread, if it is parked
    fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    fn is_idle(&self) -> bool {
        let mut live = self.live.lock();
        self.drain(&mut live);
        live.records.is_empty()
    }
}

impl Drop for AnimatorShared {
    fn drop(&mut self) {
        // The timer thread may hold the last reference, so never join here.
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

/// Builder for an [`Animator`]
#[derive(Default)]
pub struct AnimatorBuilder {
    config: AnimatorConfig,
    registry: Option<Arc<TransitionRegistry>>,
    clock: Option<SharedClock>,
}

impl AnimatorBuilder {
    pub fn config(mut self, config: AnimatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve handlers from `registry` instead of the global one
    pub fn registry(mut self, registry: Arc<TransitionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Animator> {
        let config = self.config.checked()?;
        Ok(Animator::assemble(
            config,
            self.registry.unwrap_or_else(TransitionRegistry::global),
            self.clock.unwrap_or_else(SystemClock::shared),
        ))
    }
}

/// Schedules and ticks property animations
///
/// Cheap to clone; clones share the live set and the timer thread.
#[derive(Clone)]
pub struct Animator {
    shared: Arc<AnimatorShared>,
}

/// Non-owning reference to an [`Animator`]
#[derive(Clone)]
pub struct WeakAnimator {
    shared: Weak<AnimatorShared>,
}

impl WeakAnimator {
    pub fn upgrade(&self) -> Option<Animator> {
        self.shared.upgrade().map(|shared| Animator { shared })
    }
}

impl Default for Animator {
    fn default() -> Self {
        Self::new()
    }
}

impl Animator {
    /// Animator with the standard configuration and the global registry
    pub fn new() -> Self {
        Self::assemble(
            AnimatorConfig::standard(),
            TransitionRegistry::global(),
            SystemClock::shared(),
        )
    }

    pub fn with_config(config: AnimatorConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> AnimatorBuilder {
        AnimatorBuilder::default()
    }

    fn assemble(
        config: AnimatorConfig,
        registry: Arc<TransitionRegistry>,
        clock: SharedClock,
    ) -> Self {
        let handlers = registry.populate();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("glide-worker-{}", i))
            .build();
        let pool = match pool {
            Ok(pool) => Some(Arc::new(pool)),
            Err(err) => {
                tracing::warn!(error = %err, "worker pool unavailable, ticking inline");
                None
            }
        };

        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let engine = Arc::new(Engine {
            registry,
            diagnostics: Arc::new(Diagnostics::new(config.max_diagnostics)),
            pool,
            commands: commands_tx,
            clock,
            lock_timeout: config.lock_timeout(),
        });

        tracing::debug!(
            handlers,
            interval_ms = config.interval_ms,
            enabled = config.animations_enabled(),
            "animator ready"
        );

        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            shared: Arc::new(AnimatorShared {
                config,
                engine,
                live: Mutex::new(LiveSet::default()),
                commands: commands_rx,
                on_frame: RwLock::new(None),
                stop_flag: Arc::new(AtomicBool::new(false)),
                background: Mutex::new(None),
                wake_tx,
                wake_rx,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakAnimator {
        WeakAnimator {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn config(&self) -> &AnimatorConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Arc<TransitionRegistry> {
        &self.shared.engine.registry
    }

    /// Failures recorded under the `Log` policy
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.shared.engine.diagnostics
    }

    // ========================================================================
    // Starting and stopping animations
    // ========================================================================

    /// Animate `property` toward `target`
    ///
    /// If the property is already animating with the same value type, that
    /// animation is retargeted and its handle returned. When animations are
    /// disabled, or the property already holds `target`, the returned handle
    /// has already finished.
    pub fn animate<T: Animatable>(
        &self,
        property: &PropertyRef<T>,
        target: T,
        request: AnimationRequest<T>,
    ) -> Result<AnimationHandle<T>> {
        let shared = &self.shared;
        let params = request.params(shared.config.default_policy);
        let notify_replaced = request.call_if_finished;
        let on_update = request.on_update;
        let key = property.key();

        if !shared.config.animations_enabled() {
            let record = self.detached(property, target, params, on_update);
            record.apply_immediately()?;
            return Ok(record);
        }

        let current = property.get();
        let mut replaced = None;
        let mut retargeted = None;
        let mut created = None;
        {
            let mut live = shared.live.lock();
            shared.drain(&mut live);

            if let Some(existing) = live.get(&key).cloned() {
                let running = downcast::<T>(&existing).and_then(|record| {
                    record
                        .retarget(
                            target.clone(),
                            params.clone(),
                            on_update.clone(),
                            notify_replaced,
                        )
                        .map(|superseded| (record, superseded))
                });
                match running {
                    Some(found) => retargeted = Some(found),
                    None => {
                        live.remove(existing.id());
                        replaced = Some(existing);
                    }
                }
            }

            if retargeted.is_none() && current.as_ref() != Some(&target) {
                let engine = shared.engine.clone();
                let id = live.records.insert_with_key(|id| {
                    let record = Arc::new(
                        Animation::new(
                            id,
                            property.clone(),
                            target.clone(),
                            params.clone(),
                            on_update.clone(),
                            engine,
                        )
                        .with_current(current.clone()),
                    );
                    created = Some(record.clone());
                    record as Arc<dyn ErasedAnimation>
                });
                live.by_key.insert(key, id);
            }
        }

        if let Some(old) = replaced {
            old.halt_with(notify_replaced, true);
        }

        if let Some((record, superseded)) = retargeted {
            tracing::debug!(property = %key, "retargeted running animation");
            if let Some(callback) = superseded {
                record.deliver(callback, true);
            }
            return Ok(record);
        }

        match created {
            Some(record) => {
                tracing::debug!(property = %key, "animation started");
                if shared.config.auto_start {
                    self.start_background();
                }
                shared.wake();
                Ok(record)
            }
            None => {
                let record = self.detached(property, target, params, on_update);
                record.complete_immediately()?;
                Ok(record)
            }
        }
    }

    fn detached<T: Animatable>(
        &self,
        property: &PropertyRef<T>,
        target: T,
        params: Params,
        on_update: Option<UpdateCallback<T>>,
    ) -> AnimationHandle<T> {
        let current = property.get();
        Arc::new(
            Animation::new(
                AnimationId::default(),
                property.clone(),
                target,
                params,
                on_update,
                self.shared.engine.clone(),
            )
            .with_current(current),
        )
    }

    /// Halt the animation on `key`
    ///
    /// Returns false when nothing is animating there, or it is non-stoppable
    /// and `halt_unstoppable` is not set.
    pub fn halt(&self, key: &PropertyKey, options: HaltOptions) -> bool {
        let record = {
            let mut live = self.shared.live.lock();
            self.shared.drain(&mut live);
            let Some(record) = live.get(key).cloned() else {
                return false;
            };
            if !options.halt_unstoppable && !record.is_stoppable() {
                return false;
            }
            live.remove(record.id());
            record
        };
        record.halt_with(options.notify, false);
        true
    }

    /// Halt the animation on `key`, stoppable or not, without notifying it
    pub fn remove(&self, key: &PropertyKey) -> bool {
        self.halt(
            key,
            HaltOptions {
                halt_unstoppable: true,
                notify: false,
            },
        )
    }

    /// Target of the animation running on `key`
    pub fn get_target<T: Animatable>(&self, key: &PropertyKey) -> Option<T> {
        let live = self.shared.live.lock();
        live.get(key).and_then(downcast::<T>).map(|record| record.target())
    }

    /// Handle of the animation running on `key`
    pub fn get<T: Animatable>(&self, key: &PropertyKey) -> Option<AnimationHandle<T>> {
        let mut live = self.shared.live.lock();
        self.shared.drain(&mut live);
        live.get(key).and_then(downcast::<T>)
    }

    pub fn is_animating(&self, key: &PropertyKey) -> bool {
        let mut live = self.shared.live.lock();
        self.shared.drain(&mut live);
        live.get(key).is_some_and(|record| !record.state().is_finished())
    }

    /// Number of animations in the live set
    pub fn live_count(&self) -> usize {
        let mut live = self.shared.live.lock();
        self.shared.drain(&mut live);
        live.records.len()
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    /// Tick one animation now
    pub fn tick<T: Animatable>(
        &self,
        handle: &AnimationHandle<T>,
        run_on_pool: bool,
    ) -> Result<TickOutcome> {
        let outcome = handle.update(run_on_pool);
        let mut live = self.shared.live.lock();
        self.shared.drain(&mut live);
        outcome
    }

    /// One timer pass: request a tick on every live animation
    ///
    /// Every animation is ticked even if one fails; the first `Throw`
    /// failure is returned afterwards.
    pub fn tick_all(&self) -> Result<usize> {
        self.shared.tick_all()
    }

    /// Move `property` one step toward `target` without registering an
    /// animation
    ///
    /// The step is sized as if one timer interval had elapsed. The value is
    /// not watched for outside writes.
    pub fn step<T: Animatable>(
        &self,
        property: &PropertyRef<T>,
        target: T,
        gradient: f64,
        linear_speed: f64,
        policy: ExceptionPolicy,
    ) -> Result<AnimationState> {
        let record = Arc::new(
            Animation::new(
                AnimationId::default(),
                property.clone(),
                target,
                Params::new(gradient, linear_speed, false, policy),
                None,
                self.shared.engine.clone(),
            )
            .with_current(property.get())
            .with_first_elapsed(self.shared.config.interval()),
        );
        record.update(false)?;
        Ok(record.state())
    }

    /// Run `callback` after every timer pass
    pub fn set_frame_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.on_frame.write() = Some(Arc::new(callback));
    }

    pub fn clear_frame_callback(&self) {
        *self.shared.on_frame.write() = None;
    }

    // ========================================================================
    // Background timer
    // ========================================================================

    /// Start the timer thread; returns false if it is already running
    ///
    /// The thread holds only a weak reference and exits once every
    /// [`Animator`] clone is dropped. It parks while nothing is animating.
    pub fn start_background(&self) -> bool {
        let mut background = self.shared.background.lock();
        if background.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        self.shared.stop_flag.store(false, Ordering::Relaxed);

        let weak = self.downgrade();
        let stop_flag = Arc::clone(&self.shared.stop_flag);
        let wake = self.shared.wake_rx.clone();
        let interval = self.shared.config.interval();

        let spawned = thread::Builder::new()
            .name("glide-timer".into())
            .spawn(move || {
                tracing::debug!(interval_ms = interval.as_millis() as u64, "animation timer started");
                while !stop_flag.load(Ordering::Relaxed) {
                    let start = Instant::now();
                    let Some(animator) = weak.upgrade() else {
                        break;
                    };
                    if let Err(err) = animator.shared.tick_all() {
                        tracing::error!(error = %err, "animation tick failed on timer thread");
                    }
                    while wake.try_recv().is_ok() {}
                    let idle = animator.shared.is_idle();
                    drop(animator);

                    if idle {
                        if stop_flag.load(Ordering::Relaxed) {
                            break;
                        }
                        tracing::trace!("animation timer parked");
                        // Disconnects once the last animator is dropped.
                        if wake.recv().is_err() {
                            break;
                        }
                        continue;
                    }

                    let elapsed = start.elapsed();
                    if elapsed < interval {
                        thread::sleep(interval - elapsed);
                    }
                }
                tracing::debug!("animation timer stopped");
            });

        match spawned {
            Ok(handle) => {
                *background = Some(handle);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to spawn animation timer");
                false
            }
        }
    }

    /// Stop the timer thread and wait for it to exit
    pub fn stop_background(&self) {
        self.shared.stop_flag.store(true, Ordering::Relaxed);
        self.shared.wake();
        let handle = self.shared.background.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        self.shared.stop_flag.store(false, Ordering::Relaxed);
    }

    pub fn is_background_running(&self) -> bool {
        self.shared
            .background
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait until the live set is empty or `timeout` passes
    ///
    /// Returns true if every animation finished.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.live_count() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl AnimatorShared {
    fn tick_all(&self) -> Result<usize> {
        let batch: SmallVec<[Arc<dyn ErasedAnimation>; 16]> = {
            let mut live = self.live.lock();
            self.drain(&mut live);
            live.records.values().cloned().collect()
        };

        let mut first_err = None;
        for record in &batch {
            if let Err(err) = record.clone().request_update(self.config.update_on_pool) {
                first_err.get_or_insert(err);
            }
        }

        {
            let mut live = self.live.lock();
            self.drain(&mut live);
        }

        let on_frame = self.on_frame.read().clone();
        if let Some(callback) = on_frame {
            callback();
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(batch.len()),
        }
    }
}
