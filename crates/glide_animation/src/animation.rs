//! Animation records
//!
//! An [`Animation`] is the live state of one property being moved toward a
//! target. Each tick measures the time since the previous one, turns it into
//! per-tick approach rates, runs the value type's transition handler and, when
//! the value changed, writes it through the property's sink.
//!
//! # Concurrency
//!
//! Ticks on one record never overlap. A tick request first takes a slot in a
//! small in-flight counter (at most two: one running, one waiting) and is
//! dropped outright if none is free. It then waits a bounded time for the
//! record's update lock; if that times out the tick is skipped, not failed.
//!
//! ```text
//! update() ──► in-flight < 2 ? ──no──► Dropped
//!                   │yes
//!                   ▼
//!            try_lock_for(timeout) ──timeout──► TimedOut
//!                   │
//!                   ▼
//!            set_next_value ──► Updated / Unchanged / Finished(state)
//! ```

use crate::diagnostics::Diagnostic;
use crate::diagnostics::Diagnostics;
use crate::error::{panic_message, AnimationError, Result, TransitionError};
use crate::registry::{ResolvedHandler, TransitionRegistry};
use crate::animator::{AnimationId, Command};
use crate::transition::{StepInput, TransitionCache};
use crossbeam_channel::Sender;
use glide_core::{
    Animatable, AnimationState, ExceptionPolicy, PropertyKey, PropertyRef, SharedClock, Setter,
    Stopwatch,
};
use parking_lot::Mutex;
use rayon::ThreadPool;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Converts elapsed milliseconds into the per-tick rate multiplier
pub const TIME_SCALE: f64 = 1.0 / 30.0;

/// Floor for the per-tick linear speed after scaling
pub const MIN_LINEAR_SPEED: f64 = 1e-5;

pub const MIN_GRADIENT: f64 = 0.01;
pub const MAX_GRADIENT: f64 = 1.0;

/// One tick running plus one waiting
const MAX_IN_FLIGHT: u8 = 2;

/// Callback invoked after each applied step and once when the animation ends
///
/// Returning `Ok(false)` halts the animation.
pub type UpdateCallback<T> =
    Arc<dyn Fn(&AnimationSnapshot<T>) -> anyhow::Result<bool> + Send + Sync>;

/// Shared handle to a running animation
pub type AnimationHandle<T> = Arc<Animation<T>>;

/// What an update request did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Handed to the worker pool
    Queued,
    /// Two ticks already in flight, or the animation is over
    Dropped,
    /// The update lock could not be taken in time
    TimedOut,
    /// Ran, but the value did not change
    Unchanged,
    /// Ran and wrote a new value
    Updated,
    /// Ran and the animation ended in this state
    Finished(AnimationState),
}

/// Point-in-time view of an animation, handed to callbacks
#[derive(Clone, Debug)]
pub struct AnimationSnapshot<T> {
    pub property: PropertyKey,
    pub state: AnimationState,
    pub current: Option<T>,
    pub target: T,
    pub gradient: f64,
    pub linear_speed: f64,
    pub stoppable: bool,
    pub tag: Option<String>,
    /// Set when a newer request on the same property replaced this callback
    pub superseded: bool,
}

/// Tunable parameters of a record
#[derive(Clone, Debug)]
pub(crate) struct Params {
    pub gradient: f64,
    pub linear_speed: f64,
    pub stoppable: bool,
    pub policy: ExceptionPolicy,
    pub callback_policy: ExceptionPolicy,
    pub tag: Option<String>,
}

impl Params {
    pub(crate) fn new(
        gradient: f64,
        linear_speed: f64,
        stoppable: bool,
        policy: ExceptionPolicy,
    ) -> Self {
        Self {
            gradient: clamp_gradient(gradient),
            linear_speed: linear_speed.abs(),
            stoppable,
            policy,
            callback_policy: policy,
            tag: None,
        }
    }
}

fn clamp_gradient(gradient: f64) -> f64 {
    if gradient.is_nan() {
        return MIN_GRADIENT;
    }
    gradient.clamp(MIN_GRADIENT, MAX_GRADIENT)
}

/// Collaborators shared by every record of one animator
pub(crate) struct Engine {
    pub registry: Arc<TransitionRegistry>,
    pub diagnostics: Arc<Diagnostics>,
    pub pool: Option<Arc<ThreadPool>>,
    pub commands: Sender<Command>,
    pub clock: SharedClock,
    pub lock_timeout: Duration,
}

struct Retarget<T> {
    value: T,
    /// Set by `change_target_value`, consumed by the next tick
    pending: bool,
}

struct TickState {
    cache: TransitionCache,
    stopwatch: Stopwatch,
    /// Elapsed time to report on the next tick instead of measuring
    preset: Option<Duration>,
}

enum Advance {
    Changed,
    Unchanged,
    /// Halted from outside while the step was computed
    Preempted,
}

/// The live state of one animated property
pub struct Animation<T: Animatable> {
    id: AnimationId,
    property: PropertyRef<T>,
    status: AtomicU8,
    in_flight: AtomicU8,
    target: Mutex<Retarget<T>>,
    params: Mutex<Params>,
    current: Mutex<Option<T>>,
    tick: Mutex<TickState>,
    on_update: Mutex<Option<UpdateCallback<T>>>,
    handler: OnceLock<Option<ResolvedHandler<T>>>,
    setter: OnceLock<Setter<T>>,
    engine: Arc<Engine>,
}

/// A claimed in-flight slot, released on drop
struct TickPermit<T: Animatable> {
    record: Arc<Animation<T>>,
}

impl<T: Animatable> TickPermit<T> {
    fn acquire(record: &Arc<Animation<T>>) -> Option<Self> {
        record
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < MAX_IN_FLIGHT).then_some(n + 1)
            })
            .ok()
            .map(|_| TickPermit {
                record: record.clone(),
            })
    }
}

impl<T: Animatable> Drop for TickPermit<T> {
    fn drop(&mut self) {
        self.record.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: Animatable> Animation<T> {
    pub(crate) fn new(
        id: AnimationId,
        property: PropertyRef<T>,
        target: T,
        params: Params,
        on_update: Option<UpdateCallback<T>>,
        engine: Arc<Engine>,
    ) -> Self {
        let stopwatch = Stopwatch::start(engine.clock.clone());
        Self {
            id,
            property,
            status: AtomicU8::new(AnimationState::NotYetBegun.as_u8()),
            in_flight: AtomicU8::new(0),
            target: Mutex::new(Retarget {
                value: target,
                pending: false,
            }),
            params: Mutex::new(params),
            current: Mutex::new(None),
            tick: Mutex::new(TickState {
                cache: TransitionCache::new(),
                stopwatch,
                preset: None,
            }),
            on_update: Mutex::new(on_update),
            handler: OnceLock::new(),
            setter: OnceLock::new(),
            engine,
        }
    }

    pub(crate) fn with_current(self, current: Option<T>) -> Self {
        *self.current.lock() = current;
        self
    }

    /// Make the first tick see `elapsed` regardless of the clock
    pub(crate) fn with_first_elapsed(self, elapsed: Duration) -> Self {
        self.tick.lock().preset = Some(elapsed);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> AnimationId {
        self.id
    }

    pub fn key(&self) -> PropertyKey {
        self.property.key()
    }

    pub fn property(&self) -> &PropertyRef<T> {
        &self.property
    }

    pub fn state(&self) -> AnimationState {
        AnimationState::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Ticks currently running or waiting, 0..=2
    pub fn in_flight(&self) -> u8 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Value produced by the last tick
    pub fn current(&self) -> Option<T> {
        self.current.lock().clone()
    }

    pub fn target(&self) -> T {
        self.target.lock().value.clone()
    }

    pub fn gradient(&self) -> f64 {
        self.params.lock().gradient
    }

    pub fn linear_speed(&self) -> f64 {
        self.params.lock().linear_speed
    }

    pub fn is_stoppable(&self) -> bool {
        self.params.lock().stoppable
    }

    pub fn policy(&self) -> ExceptionPolicy {
        self.params.lock().policy
    }

    pub fn tag(&self) -> Option<String> {
        self.params.lock().tag.clone()
    }

    /// Clamped to `[MIN_GRADIENT, MAX_GRADIENT]`
    pub fn set_gradient(&self, gradient: f64) {
        self.params.lock().gradient = clamp_gradient(gradient);
    }

    pub fn set_linear_speed(&self, linear_speed: f64) {
        self.params.lock().linear_speed = linear_speed.abs();
    }

    pub fn set_stoppable(&self, stoppable: bool) {
        self.params.lock().stoppable = stoppable;
    }

    pub fn set_policy(&self, policy: ExceptionPolicy) {
        self.params.lock().policy = policy;
    }

    /// Policy for update callback failures
    pub fn set_callback_policy(&self, policy: ExceptionPolicy) {
        self.params.lock().callback_policy = policy;
    }

    pub fn set_tag(&self, tag: Option<String>) {
        self.params.lock().tag = tag;
    }

    /// Replace the callback, returning the previous one
    pub fn set_on_update(&self, callback: Option<UpdateCallback<T>>) -> Option<UpdateCallback<T>> {
        std::mem::replace(&mut *self.on_update.lock(), callback)
    }

    /// Point the animation at a new target
    ///
    /// The next tick restarts from the live value and discards the handler's
    /// cached progress. Returns false, changing nothing, once the animation
    /// has finished.
    pub fn change_target_value(&self, target: T) -> bool {
        let mut slot = self.target.lock();
        if self.is_finished() {
            return false;
        }
        slot.value = target;
        slot.pending = true;
        true
    }

    pub fn snapshot(&self) -> AnimationSnapshot<T> {
        let current = self.current.lock().clone();
        let target = self.target.lock().value.clone();
        let params = self.params.lock().clone();
        AnimationSnapshot {
            property: self.key(),
            state: self.state(),
            current,
            target,
            gradient: params.gradient,
            linear_speed: params.linear_speed,
            stoppable: params.stoppable,
            tag: params.tag,
            superseded: false,
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Move to `state` unless already completed or halted
    fn set_state(&self, state: AnimationState) -> bool {
        self.status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (!AnimationState::from_u8(raw).is_terminal()).then_some(state.as_u8())
            })
            .is_ok()
    }

    /// Stop the animation without notifying its callback
    ///
    /// Returns false if it had already completed or halted. A tick already
    /// running finishes its step but writes nothing further.
    pub fn halt(&self) -> bool {
        let halted = self.set_state(AnimationState::Halted);
        if halted {
            tracing::debug!(property = %self.key(), "animation halted");
            self.detach();
        }
        halted
    }

    pub(crate) fn take_callback(&self) -> Option<UpdateCallback<T>> {
        self.on_update.lock().take()
    }

    fn detach(&self) {
        // The animator may be gone; nothing to detach from then.
        let _ = self.engine.commands.send(Command::Detach(self.id));
    }

    fn handler(&self) -> Option<&ResolvedHandler<T>> {
        self.handler
            .get_or_init(|| match self.engine.registry.resolve::<T>() {
                Ok(resolved) => Some(resolved),
                Err(err) => {
                    tracing::warn!(
                        property = %self.key(),
                        error = %err,
                        "no transition handler, completing immediately"
                    );
                    None
                }
            })
            .as_ref()
    }

    fn setter(&self) -> &Setter<T> {
        self.setter.get_or_init(|| self.property.bind())
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    /// Request one tick
    ///
    /// With `run_on_pool` the tick runs on the animator's worker pool and
    /// this returns [`TickOutcome::Queued`]; failures under the `Throw`
    /// policy are then logged instead of returned.
    pub fn update(self: &Arc<Self>, run_on_pool: bool) -> Result<TickOutcome> {
        if self.is_finished() {
            return Ok(TickOutcome::Dropped);
        }
        let Some(permit) = TickPermit::acquire(self) else {
            return Ok(TickOutcome::Dropped);
        };

        if run_on_pool {
            if let Some(pool) = &self.engine.pool {
                pool.spawn(move || {
                    let record = permit.record.clone();
                    if let Err(err) = record.run_permitted(permit) {
                        record.report_unhandled(&err);
                    }
                });
                return Ok(TickOutcome::Queued);
            }
        }
        self.run_permitted(permit)
    }

    fn run_permitted(&self, _permit: TickPermit<T>) -> Result<TickOutcome> {
        let Some(mut tick) = self.tick.try_lock_for(self.engine.lock_timeout) else {
            tracing::debug!(property = %self.key(), "update lock timed out, skipping tick");
            return Ok(TickOutcome::TimedOut);
        };
        if self.is_finished() {
            return Ok(TickOutcome::Dropped);
        }
        self.run_tick(&mut tick)
    }

    fn run_tick(&self, tick: &mut TickState) -> Result<TickOutcome> {
        let params = self.params.lock().clone();

        let advance = match self.set_next_value(tick, &params) {
            Ok(advance) => advance,
            Err(err) => {
                let notified = self.finish(&params);
                self.fail(err, &params)?;
                notified?;
                return Ok(TickOutcome::Finished(self.state()));
            }
        };

        let state = self.state();
        match advance {
            Advance::Preempted => Ok(TickOutcome::Dropped),
            _ if state.is_finished() => {
                self.finish(&params)?;
                Ok(TickOutcome::Finished(self.state()))
            }
            Advance::Unchanged => Ok(TickOutcome::Unchanged),
            Advance::Changed => {
                if self.notify_progress(&params)? {
                    Ok(TickOutcome::Updated)
                } else {
                    Ok(TickOutcome::Finished(self.state()))
                }
            }
        }
    }

    /// One step of the animation
    fn set_next_value(
        &self,
        tick: &mut TickState,
        params: &Params,
    ) -> std::result::Result<Advance, TransitionError> {
        let measured = tick.stopwatch.restart_get();
        let elapsed = tick.preset.take().unwrap_or(measured);
        let multiplier = elapsed.as_secs_f64() * 1000.0 * TIME_SCALE;

        let (target, retargeted) = {
            let mut slot = self.target.lock();
            (slot.value.clone(), std::mem::take(&mut slot.pending))
        };
        if retargeted {
            tick.cache.clear();
        }

        let Some(live) = self.property.get() else {
            return Ok(self.settle(AnimationState::Completed));
        };
        let current = {
            let stored = self.current.lock();
            match &*stored {
                Some(value) if !retargeted && !params.stoppable => value.clone(),
                _ => live,
            }
        };

        let Some(resolved) = self.handler() else {
            return Ok(self.settle(AnimationState::Completed));
        };

        let input = StepInput {
            current: &current,
            target: &target,
            gradient: params.gradient * multiplier,
            linear_speed: (params.linear_speed * multiplier).max(MIN_LINEAR_SPEED),
            stoppable: params.stoppable,
        };
        let cache = &mut tick.cache;
        let step = panic::catch_unwind(AssertUnwindSafe(|| (resolved.handler)(input, cache)))
            .unwrap_or_else(|payload| {
                Err(TransitionError::Panicked(panic_message(payload.as_ref())))
            });
        let step = match step {
            Ok(step) => step,
            Err(err) => {
                self.set_state(AnimationState::Halted);
                return Err(err);
            }
        };

        let state = match step.state {
            AnimationState::Completed | AnimationState::ValueDidntUpdateAsExpected => {
                // the target slot lock orders this against a concurrent retarget
                let slot = self.target.lock();
                let state = if slot.pending {
                    AnimationState::UpdateSuccess
                } else {
                    step.state
                };
                if !self.set_state(state) {
                    return Ok(Advance::Preempted);
                }
                state
            }
            state => {
                if !self.set_state(state) {
                    return Ok(Advance::Preempted);
                }
                state
            }
        };
        let changed = step.value != current;
        *self.current.lock() = Some(step.value.clone());

        if state == AnimationState::UpdateSuccess && (changed || resolved.shared) {
            self.setter().call(step.value);
            return Ok(Advance::Changed);
        }
        Ok(if changed {
            Advance::Changed
        } else {
            Advance::Unchanged
        })
    }

    fn settle(&self, state: AnimationState) -> Advance {
        if self.set_state(state) {
            Advance::Unchanged
        } else {
            Advance::Preempted
        }
    }

    /// Run the callback after an applied step; false means it asked to halt
    fn notify_progress(&self, params: &Params) -> Result<bool> {
        let Some(callback) = self.on_update.lock().clone() else {
            return Ok(true);
        };
        let snapshot = self.snapshot();
        match invoke(&callback, &snapshot) {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.take_callback();
                self.halt();
                Ok(false)
            }
            Err(err) => {
                self.take_callback();
                self.halt();
                self.fail_callback(err, params)?;
                Ok(false)
            }
        }
    }

    /// Detach and deliver the final state to the callback, once
    fn finish(&self, params: &Params) -> Result<()> {
        self.detach();
        let result = match self.take_callback() {
            Some(callback) => invoke(&callback, &self.snapshot()).map(|_| ()),
            None => Ok(()),
        };
        if self.state() == AnimationState::ValueDidntUpdateAsExpected {
            self.set_state(AnimationState::Halted);
        }
        tracing::debug!(property = %self.key(), state = %self.state(), "animation finished");
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.fail_callback(err, params),
        }
    }

    // ========================================================================
    // Failures
    // ========================================================================

    fn fail(&self, err: TransitionError, params: &Params) -> Result<()> {
        match params.policy {
            ExceptionPolicy::Throw => Err(AnimationError::Transition {
                property: self.key(),
                source: err,
            }),
            ExceptionPolicy::Log => {
                self.engine.diagnostics.record(Diagnostic {
                    property: self.key(),
                    message: "transition handler failed",
                    detail: err.to_string(),
                    state: self.state(),
                });
                Ok(())
            }
            ExceptionPolicy::Silent => Ok(()),
        }
    }

    fn fail_callback(&self, err: anyhow::Error, params: &Params) -> Result<()> {
        match params.callback_policy {
            ExceptionPolicy::Throw => Err(AnimationError::Callback {
                property: self.key(),
                message: format!("{:#}", err),
            }),
            ExceptionPolicy::Log => {
                self.engine.diagnostics.record(Diagnostic {
                    property: self.key(),
                    message: "update callback failed",
                    detail: format!("{:#}", err),
                    state: self.state(),
                });
                Ok(())
            }
            ExceptionPolicy::Silent => Ok(()),
        }
    }

    /// A `Throw` failure with no caller to return it to
    pub(crate) fn report_unhandled(&self, err: &AnimationError) {
        tracing::error!(property = %self.key(), error = %err, "animation failed off the calling thread");
        self.engine.diagnostics.record(Diagnostic {
            property: self.key(),
            message: "unhandled animation failure",
            detail: err.to_string(),
            state: self.state(),
        });
    }

    // ========================================================================
    // Out-of-band notifications
    // ========================================================================

    /// Hand `callback` a final snapshot on the worker pool
    ///
    /// Runs under the update lock so it never overlaps a tick.
    pub(crate) fn deliver(self: &Arc<Self>, callback: UpdateCallback<T>, superseded: bool) {
        let record = self.clone();
        let job = move || {
            let guard = record.tick.try_lock_for(record.engine.lock_timeout);
            if guard.is_none() {
                tracing::debug!(property = %record.key(), "delivering callback without update lock");
            }
            let mut snapshot = record.snapshot();
            snapshot.superseded = superseded;
            if let Err(err) = invoke(&callback, &snapshot) {
                let params = record.params.lock().clone();
                if let Err(err) = record.fail_callback(err, &params) {
                    record.report_unhandled(&err);
                }
            }
            drop(guard);
        };
        match &self.engine.pool {
            Some(pool) => pool.spawn(job),
            None => job(),
        }
    }

    /// Write the target at once, as when animations are disabled
    ///
    /// The callback sees `UpdateSuccess` and then `Completed`.
    pub(crate) fn apply_immediately(&self) -> Result<()> {
        let params = self.params.lock().clone();
        let target = self.target();
        let setter = self.setter().clone();
        let value = target.clone();

        match panic::catch_unwind(AssertUnwindSafe(move || setter.call(value))) {
            Ok(()) => {
                *self.current.lock() = Some(target);
                self.set_state(AnimationState::UpdateSuccess);
            }
            Err(payload) => {
                self.set_state(AnimationState::Halted);
                self.fail(TransitionError::Panicked(panic_message(payload.as_ref())), &params)?;
            }
        }

        let callback = self.take_callback();
        if let Some(callback) = &callback {
            if let Err(err) = invoke(callback, &self.snapshot()) {
                self.set_state(AnimationState::Halted);
                self.fail_callback(err, &params)?;
            }
        }
        if self.set_state(AnimationState::Completed) {
            if let Some(callback) = &callback {
                if let Err(err) = invoke(callback, &self.snapshot()) {
                    self.fail_callback(err, &params)?;
                }
            }
        }
        Ok(())
    }

    /// Finish at once because the value already equals the target
    pub(crate) fn complete_immediately(&self) -> Result<()> {
        let params = self.params.lock().clone();
        self.set_state(AnimationState::Completed);
        if let Some(callback) = self.take_callback() {
            if let Err(err) = invoke(&callback, &self.snapshot()) {
                self.fail_callback(err, &params)?;
            }
        }
        Ok(())
    }

    /// Swap in a newer request's target and parameters
    ///
    /// Returns `None` if the animation already finished, leaving it
    /// untouched. Otherwise returns the replaced callback when it should hear
    /// that it was superseded.
    pub(crate) fn retarget(
        &self,
        target: T,
        params: Params,
        on_update: Option<UpdateCallback<T>>,
        notify_replaced: bool,
    ) -> Option<Option<UpdateCallback<T>>> {
        let mut slot = self.target.lock();
        if self.is_finished() {
            return None;
        }
        slot.value = target;
        slot.pending = true;
        *self.params.lock() = params;
        let replaced = on_update.and_then(|callback| self.set_on_update(Some(callback)));
        Some(replaced.filter(|_| notify_replaced))
    }
}

fn invoke<T>(
    callback: &UpdateCallback<T>,
    snapshot: &AnimationSnapshot<T>,
) -> anyhow::Result<bool> {
    panic::catch_unwind(AssertUnwindSafe(|| callback(snapshot))).unwrap_or_else(|payload| {
        Err(anyhow::anyhow!(
            "update callback panicked: {}",
            panic_message(payload.as_ref())
        ))
    })
}

impl<T: Animatable> fmt::Display for Animation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.key(), self.state())
    }
}

impl<T: Animatable> fmt::Debug for Animation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Animation")
            .field("key", &self.key())
            .field("state", &self.state())
            .field("current", &self.current())
            .field("target", &self.target())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
