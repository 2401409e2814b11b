//! The process-wide animator

use glide_animation::{
    global_animator, is_global_animator_initialized, set_global_animator, try_global_animator,
    AnimationError, Animator, AnimatorConfig,
};
use glide_core::ValueCell;

#[test]
fn global_animator_is_set_once() {
    assert!(!is_global_animator_initialized());
    assert!(try_global_animator().is_none());

    let animator = Animator::with_config(AnimatorConfig::testing().with_enabled(false)).unwrap();
    set_global_animator(animator).unwrap();
    assert!(is_global_animator_initialized());

    let again = Animator::with_config(AnimatorConfig::testing()).unwrap();
    assert!(matches!(
        set_global_animator(again),
        Err(AnimationError::GlobalAlreadySet)
    ));

    // the installed instance is the one handed out
    let global = global_animator();
    assert!(!global.config().enabled);
    let cell = ValueCell::new(0.0f64);
    global
        .animate(
            &cell.property(),
            3.0,
            glide_animation::AnimationRequest::new(0.5, 0.5),
        )
        .unwrap();
    assert_eq!(cell.get(), 3.0);
    assert!(try_global_animator().is_some());
}
