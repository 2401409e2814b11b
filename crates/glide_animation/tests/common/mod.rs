//! Shared helpers for the integration tests

#![allow(dead_code)]

use glide_animation::{Animator, AnimatorConfig, TransitionRegistry};
use glide_core::ManualClock;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Testing animator on a manual clock with the built-in handlers
pub fn animator(clock: &Arc<ManualClock>) -> Animator {
    animator_with(AnimatorConfig::testing(), TransitionRegistry::with_builtins(), clock)
}

pub fn animator_with(
    config: AnimatorConfig,
    registry: TransitionRegistry,
    clock: &Arc<ManualClock>,
) -> Animator {
    init_tracing();
    Animator::builder()
        .config(config)
        .registry(Arc::new(registry))
        .clock(clock.clone())
        .build()
        .expect("valid testing config")
}

/// Poll `cond` until it holds or `timeout` passes
pub fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
