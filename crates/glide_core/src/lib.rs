//! Glide Core
//!
//! Foundational types shared by the Glide animation engine:
//!
//! - **Values**: the geometry and color kinds the built-in transitions animate
//! - **State**: the per-animation state machine and failure policy
//! - **Clock**: injectable monotonic time for measuring tick spacing
//! - **Sink**: how an animation reads and writes the property it drives
//!
//! # Example
//!
//! ```rust
//! use glide_core::{AnimationState, ValueCell};
//!
//! let cell = ValueCell::new(0.0f64);
//! let prop = cell.property();
//!
//! prop.bind().call(12.5);
//! assert_eq!(cell.get(), 12.5);
//! assert!(AnimationState::Completed.is_finished());
//! ```

pub mod clock;
pub mod error;
pub mod sink;
pub mod state;
pub mod values;

pub use clock::{Clock, ManualClock, SharedClock, Stopwatch, SystemClock};
pub use error::{CoreError, Result};
pub use sink::{
    FnSink, Member, MemberKind, PropertyKey, PropertyRef, Settable, Setter, ValueCell,
};
pub use state::{AnimationState, ExceptionPolicy};
pub use values::{
    Animatable, Color, ColorF, PixelBuffer, Point, PointF, Rect, RectF, Size, SizeF, Vec2, Vec3,
    Vec4,
};
