//! Failure handling under each exception policy

mod common;

use common::{animator_with, eventually};
use glide_animation::{
    handler, AnimationError, AnimationRequest, AnimatorConfig, Step, StepInput, TickOutcome,
    TransitionError, TransitionRegistry,
};
use glide_core::{AnimationState, ExceptionPolicy, ManualClock, ValueCell};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Built-in handlers plus a `u16` handler that always fails
fn failing_registry() -> TransitionRegistry {
    let registry = TransitionRegistry::with_builtins();
    registry.register::<u16>(handler(|_: StepInput<'_, u16>, _| {
        Err::<Step<u16>, _>(TransitionError::Other("boom".into()))
    }));
    registry
}

#[test]
fn throw_returns_error_and_halts() {
    let clock = ManualClock::new();
    let animator = animator_with(AnimatorConfig::testing(), failing_registry(), &clock);
    let cell = ValueCell::new(1u16);
    let states = Arc::new(Mutex::new(Vec::new()));
    let log = states.clone();

    let handle = animator
        .animate(
            &cell.property(),
            5,
            AnimationRequest::new(0.5, 1.0)
                .policy(ExceptionPolicy::Throw)
                .on_update(move |snap| {
                    log.lock().push(snap.state);
                    Ok(true)
                }),
        )
        .unwrap();

    clock.advance_ms(16);
    let err = animator.tick(&handle, false).unwrap_err();
    match err {
        AnimationError::Transition { property, source } => {
            assert_eq!(property, cell.property().key());
            assert!(source.to_string().contains("boom"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(handle.state(), AnimationState::Halted);
    assert_eq!(*states.lock(), vec![AnimationState::Halted]);
    assert_eq!(animator.live_count(), 0);
    assert!(animator.diagnostics().is_empty());
}

#[test]
fn log_records_diagnostic() {
    let clock = ManualClock::new();
    let animator = animator_with(AnimatorConfig::testing(), failing_registry(), &clock);
    let cell = ValueCell::new(1u16);

    let handle = animator
        .animate(
            &cell.property(),
            5,
            AnimationRequest::new(0.5, 1.0).policy(ExceptionPolicy::Log),
        )
        .unwrap();

    clock.advance_ms(16);
    assert_eq!(
        animator.tick(&handle, false).unwrap(),
        TickOutcome::Finished(AnimationState::Halted)
    );
    assert_eq!(animator.diagnostics().len(), 1);
    let entry = animator.diagnostics().last().unwrap();
    assert_eq!(entry.message, "transition handler failed");
    assert_eq!(entry.state, AnimationState::Halted);
    assert!(entry.detail.contains("boom"));
    assert_eq!(cell.get(), 1);
}

#[test]
fn silent_leaves_no_trace() {
    let clock = ManualClock::new();
    let animator = animator_with(AnimatorConfig::testing(), failing_registry(), &clock);
    let cell = ValueCell::new(1u16);

    let handle = animator
        .animate(
            &cell.property(),
            5,
            AnimationRequest::new(0.5, 1.0).policy(ExceptionPolicy::Silent),
        )
        .unwrap();

    clock.advance_ms(16);
    animator.tick(&handle, false).unwrap();
    assert_eq!(handle.state(), AnimationState::Halted);
    assert!(animator.diagnostics().is_empty());
}

#[test]
fn default_policy_comes_from_config() {
    let clock = ManualClock::new();
    let animator = animator_with(
        AnimatorConfig::testing().with_default_policy(ExceptionPolicy::Throw),
        failing_registry(),
        &clock,
    );
    let cell = ValueCell::new(1u16);
    let handle = animator
        .animate(&cell.property(), 5, AnimationRequest::new(0.5, 1.0))
        .unwrap();

    assert_eq!(handle.policy(), ExceptionPolicy::Throw);
    assert!(animator.tick(&handle, false).is_err());
}

#[test]
fn callback_returning_false_halts() {
    let clock = ManualClock::new();
    let animator = animator_with(
        AnimatorConfig::testing(),
        TransitionRegistry::with_builtins(),
        &clock,
    );
    let cell = ValueCell::new(0.0f64);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let handle = animator
        .animate(
            &cell.property(),
            100.0,
            AnimationRequest::new(0.2, 0.1).on_update(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }),
        )
        .unwrap();

    clock.advance_ms(16);
    assert_eq!(
        animator.tick(&handle, false).unwrap(),
        TickOutcome::Finished(AnimationState::Halted)
    );
    clock.advance_ms(16);
    assert_eq!(animator.tick(&handle, false).unwrap(), TickOutcome::Dropped);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(animator.live_count(), 0);
}

#[test]
fn callback_error_follows_callback_policy() {
    let clock = ManualClock::new();
    let animator = animator_with(
        AnimatorConfig::testing(),
        TransitionRegistry::with_builtins(),
        &clock,
    );

    let logged = ValueCell::new(0.0f64);
    let handle = animator
        .animate(
            &logged.property(),
            10.0,
            AnimationRequest::new(0.2, 0.1)
                .on_update(|_| Err(anyhow::anyhow!("listener gone"))),
        )
        .unwrap();
    clock.advance_ms(16);
    animator.tick(&handle, false).unwrap();
    assert_eq!(handle.state(), AnimationState::Halted);
    let entry = animator.diagnostics().last().unwrap();
    assert_eq!(entry.message, "update callback failed");
    assert!(entry.detail.contains("listener gone"));

    let thrown = ValueCell::new(0.0f64);
    let handle = animator
        .animate(
            &thrown.property(),
            10.0,
            AnimationRequest::new(0.2, 0.1)
                .policy(ExceptionPolicy::Silent)
                .callback_policy(ExceptionPolicy::Throw)
                .on_update(|_| panic!("listener panicked")),
        )
        .unwrap();
    clock.advance_ms(16);
    let err = animator.tick(&handle, false).unwrap_err();
    assert!(matches!(err, AnimationError::Callback { .. }));
    assert!(err.to_string().contains("listener panicked"));
    assert_eq!(handle.state(), AnimationState::Halted);
}

#[test]
fn throw_on_pool_is_reported() {
    let clock = ManualClock::new();
    let animator = animator_with(AnimatorConfig::testing(), failing_registry(), &clock);
    let cell = ValueCell::new(1u16);

    let handle = animator
        .animate(
            &cell.property(),
            5,
            AnimationRequest::new(0.5, 1.0).policy(ExceptionPolicy::Throw),
        )
        .unwrap();

    clock.advance_ms(16);
    assert_eq!(animator.tick(&handle, true).unwrap(), TickOutcome::Queued);
    assert!(eventually(Duration::from_secs(2), || {
        animator
            .diagnostics()
            .last()
            .is_some_and(|d| d.message == "unhandled animation failure")
    }));
    assert_eq!(handle.state(), AnimationState::Halted);
}

#[test]
fn failure_in_one_animation_does_not_stop_others() {
    let clock = ManualClock::new();
    let animator = animator_with(AnimatorConfig::testing(), failing_registry(), &clock);
    let broken = ValueCell::new(1u16);
    let healthy = ValueCell::new(0.0f64);

    animator
        .animate(
            &broken.property(),
            5,
            AnimationRequest::new(0.5, 1.0).policy(ExceptionPolicy::Throw),
        )
        .unwrap();
    let ok = animator
        .animate(&healthy.property(), 1.0, AnimationRequest::new(0.5, 0.1))
        .unwrap();

    clock.advance_ms(16);
    assert!(animator.tick_all().is_err());
    assert!(healthy.get() > 0.0);
    assert_eq!(ok.state(), AnimationState::UpdateSuccess);
    assert_eq!(animator.live_count(), 1);
}
