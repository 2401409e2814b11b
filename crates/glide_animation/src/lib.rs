//! Glide Animation
//!
//! Typed property animation: move any property toward a target value at a
//! rate that adapts to how much time actually passed between ticks.
//!
//! # Features
//!
//! - **Transition handlers**: per-type step functions, discovered once from
//!   registered providers
//! - **Animation records**: a small state machine per animated property
//! - **Animator**: one live animation per property, ticked by a background
//!   timer or on demand
//! - **Failure policies**: handler and callback errors are logged, swallowed
//!   or returned per animation
//!
//! # Example
//!
//! ```rust
//! use glide_animation::{AnimationRequest, Animator, AnimatorConfig};
//! use glide_core::ValueCell;
//!
//! let animator = Animator::with_config(AnimatorConfig::testing()).unwrap();
//! let opacity = ValueCell::new(0.0f64);
//!
//! let handle = animator
//!     .animate(&opacity.property(), 1.0, AnimationRequest::new(0.3, 0.05))
//!     .unwrap();
//! animator.tick(&handle, false).unwrap();
//! ```

pub mod animation;
pub mod animator;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod registry;
pub mod transition;

pub use animation::{
    Animation, AnimationHandle, AnimationSnapshot, TickOutcome, UpdateCallback, MAX_GRADIENT,
    MIN_GRADIENT, MIN_LINEAR_SPEED, TIME_SCALE,
};
pub use animator::{
    global_animator, is_global_animator_initialized, set_global_animator, try_global_animator,
    AnimationId, AnimationRequest, Animator, AnimatorBuilder, FrameCallback, HaltOptions,
    WeakAnimator,
};
pub use config::AnimatorConfig;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{AnimationError, RegistryError, Result, TransitionError};
pub use registry::{HandlerProvider, Registrar, ResolvedHandler, TransitionRegistry};
pub use transition::{
    float_transition, handler, integer_transition, pixel_transition, transition_clamp,
    BuiltinTransitions, Channels, Step, StepInput, TransitionCache, TransitionHandler,
};
