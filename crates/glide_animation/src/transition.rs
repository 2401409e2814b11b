//! Transition handlers
//!
//! A transition handler computes one step of an animation for a single value
//! type: given the current value, the target, and this tick's approach rates,
//! it returns the next value and the resulting [`AnimationState`].
//!
//! Every built-in handler is layered on [`transition_clamp`]: move a fraction
//! `gradient` of the remaining distance, then a further absolute `offset`,
//! snapping onto the target once within reach. The absolute offset is what
//! lets an otherwise exponential approach actually arrive.

use crate::error::{RegistryError, TransitionError};
use crate::registry::{HandlerProvider, Registrar};
use glide_core::{
    Animatable, AnimationState, Color, ColorF, CoreError, PixelBuffer, Point, PointF, Rect,
    RectF, Size, SizeF, Vec2, Vec3, Vec4,
};
use rayon::prelude::*;
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Byte count below which pixel transitions stay on the calling thread
const PARALLEL_CUTOFF: usize = 16 * 1024;

// ============================================================================
// Handler signature
// ============================================================================

/// Inputs to a single transition step
#[derive(Debug)]
pub struct StepInput<'a, T> {
    pub current: &'a T,
    pub target: &'a T,
    /// Fraction of the remaining distance to cover this tick
    pub gradient: f64,
    /// Absolute distance to cover this tick on top of the gradient
    pub linear_speed: f64,
    /// Report divergence instead of overwriting foreign writes
    pub stoppable: bool,
}

/// Result of a single transition step
#[derive(Clone, Debug, PartialEq)]
pub struct Step<T> {
    pub state: AnimationState,
    pub value: T,
}

impl<T> Step<T> {
    pub fn new(state: AnimationState, value: T) -> Self {
        Self { state, value }
    }

    pub fn updated(value: T) -> Self {
        Self::new(AnimationState::UpdateSuccess, value)
    }

    pub fn completed(value: T) -> Self {
        Self::new(AnimationState::Completed, value)
    }

    pub fn diverged(value: T) -> Self {
        Self::new(AnimationState::ValueDidntUpdateAsExpected, value)
    }
}

/// Scratch state a handler keeps between ticks of one animation
///
/// The animation clears it whenever the target changes.
#[derive(Default)]
pub struct TransitionCache {
    slot: Option<Box<dyn Any + Send>>,
}

impl TransitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<C: Any>(&self) -> Option<&C> {
        self.slot.as_ref().and_then(|b| b.downcast_ref())
    }

    pub fn get_mut<C: Any>(&mut self) -> Option<&mut C> {
        self.slot.as_mut().and_then(|b| b.downcast_mut())
    }

    pub fn set<C: Any + Send>(&mut self, value: C) {
        self.slot = Some(Box::new(value));
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

impl fmt::Debug for TransitionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionCache")
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// The callable behind a transition handler
pub type TransitionFn<T> = dyn Fn(StepInput<'_, T>, &mut TransitionCache) -> Result<Step<T>, TransitionError>
    + Send
    + Sync;

/// A shareable transition handler
pub type TransitionHandler<T> = Arc<TransitionFn<T>>;

/// Wrap a closure as a [`TransitionHandler`]
pub fn handler<T, F>(f: F) -> TransitionHandler<T>
where
    F: Fn(StepInput<'_, T>, &mut TransitionCache) -> Result<Step<T>, TransitionError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

// ============================================================================
// Step primitive
// ============================================================================

/// Move `base` toward `target`
///
/// A `gradient` of 1 or more lands on the target. Otherwise the value is
/// interpolated by `gradient` and then moved by `|offset|`, snapping onto the
/// target when it is within `|offset|`.
pub fn transition_clamp(base: f64, target: f64, gradient: f64, offset: f64) -> f64 {
    if gradient >= 1.0 {
        return target;
    }
    let mut result = if gradient > 0.0 {
        base + (target - base) * gradient
    } else {
        base
    };

    let offset = offset.abs();
    if offset > 0.0 {
        if (target - result).abs() <= offset {
            result = target;
        } else if target > result {
            result += offset;
        } else {
            result -= offset;
        }
    }
    result
}

#[inline]
fn barely_moved(a: &[f64], b: &[f64]) -> bool {
    a.iter()
        .zip(b)
        .all(|(x, y)| (x - y).abs() <= f32::EPSILON as f64)
}

// ============================================================================
// Channel decomposition
// ============================================================================

type ChannelBuf = SmallVec<[f64; 4]>;

/// Values made of independent numeric channels
pub trait Channels: Animatable {
    fn channels(&self) -> ChannelBuf;

    /// Rebuild from channels produced by [`channels`](Self::channels)
    fn from_channels(c: &[f64]) -> Self;

    /// Inclusive range every channel is clamped to
    fn channel_range() -> (f64, f64) {
        (f64::MIN, f64::MAX)
    }
}

macro_rules! scalar_channels {
    ($($t:ty),* $(,)?) => {$(
        impl Channels for $t {
            fn channels(&self) -> ChannelBuf {
                smallvec::smallvec![*self as f64]
            }

            fn from_channels(c: &[f64]) -> Self {
                c[0] as $t
            }

            fn channel_range() -> (f64, f64) {
                (<$t>::MIN as f64, <$t>::MAX as f64)
            }
        }
    )*};
}

scalar_channels!(f64, f32, i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! struct_channels {
    ($t:ident { $($field:ident),+ } as $c:ty, range $range:expr) => {
        impl Channels for $t {
            fn channels(&self) -> ChannelBuf {
                smallvec::smallvec![$(self.$field as f64),+]
            }

            fn from_channels(c: &[f64]) -> Self {
                let mut it = c.iter();
                $t { $($field: it.next().copied().unwrap_or_default() as $c),+ }
            }

            fn channel_range() -> (f64, f64) {
                $range
            }
        }
    };
}

const I32_RANGE: (f64, f64) = (i32::MIN as f64, i32::MAX as f64);
const F32_RANGE: (f64, f64) = (f32::MIN as f64, f32::MAX as f64);

struct_channels!(Color { a, r, g, b } as u8, range (0.0, 255.0));
struct_channels!(ColorF { r, g, b, a } as f32, range F32_RANGE);
struct_channels!(Point { x, y } as i32, range I32_RANGE);
struct_channels!(PointF { x, y } as f32, range F32_RANGE);
struct_channels!(Size { width, height } as i32, range I32_RANGE);
struct_channels!(SizeF { width, height } as f32, range F32_RANGE);
struct_channels!(Rect { x, y, width, height } as i32, range I32_RANGE);
struct_channels!(RectF { x, y, width, height } as f32, range F32_RANGE);
struct_channels!(Vec2 { x, y } as f32, range F32_RANGE);
struct_channels!(Vec3 { x, y, z } as f32, range F32_RANGE);
struct_channels!(Vec4 { x, y, z, w } as f32, range F32_RANGE);

fn step_channels(
    from: &[f64],
    to: &[f64],
    gradient: f64,
    offset: f64,
    (lo, hi): (f64, f64),
) -> ChannelBuf {
    from.iter()
        .zip(to)
        .map(|(&b, &t)| transition_clamp(b, t, gradient, offset).clamp(lo, hi))
        .collect()
}

// ============================================================================
// Generic handlers
// ============================================================================

/// Handler for continuous values (floats and float geometry)
///
/// Completes only once the value equals the target. A step too small to
/// change the value at its precision snaps onto the target instead. When
/// stoppable, a live value that differs from the one the handler produced
/// last is reported as divergence.
pub fn float_transition<T: Channels>() -> TransitionHandler<T> {
    handler(|input: StepInput<'_, T>, cache: &mut TransitionCache| {
        if input.stoppable {
            if let Some(last) = cache.get::<T>() {
                if last != input.current {
                    return Ok(Step::diverged(input.current.clone()));
                }
            }
        }
        if input.current == input.target {
            return Ok(Step::completed(input.current.clone()));
        }

        let from = input.current.channels();
        let to = input.target.channels();
        let next = T::from_channels(&step_channels(
            &from,
            &to,
            input.gradient,
            input.linear_speed,
            T::channel_range(),
        ));

        let next = if next == *input.current {
            input.target.clone()
        } else {
            next
        };
        cache.set(next.clone());
        Ok(Step::updated(next))
    })
}

/// Fractional position of an integer animation between ticks
struct Remainder(ChannelBuf);

/// Handler for discrete values (integers, integer geometry, 8-bit color)
///
/// The fractional position is carried in the cache so slow animations still
/// make progress. When a step would not move the value, it snaps to the
/// target; the next tick then completes.
pub fn integer_transition<T: Channels>() -> TransitionHandler<T> {
    handler(|input: StepInput<'_, T>, cache: &mut TransitionCache| {
        if input.current == input.target {
            return Ok(Step::completed(input.current.clone()));
        }

        let live = input.current.channels();
        let base = match cache.get::<Remainder>() {
            Some(Remainder(cached)) => {
                if input.stoppable && T::from_channels(cached) != *input.current {
                    return Ok(Step::diverged(input.current.clone()));
                }
                cached.clone()
            }
            None => live.clone(),
        };

        let to = input.target.channels();
        let next = step_channels(
            &base,
            &to,
            input.gradient,
            input.linear_speed,
            T::channel_range(),
        );

        if barely_moved(&next, &live) {
            return Ok(Step::updated(input.target.clone()));
        }
        let value = T::from_channels(&next);
        cache.set(Remainder(next));
        Ok(Step::updated(value))
    })
}

// ============================================================================
// Pixel buffers
// ============================================================================

struct PixelProgress {
    current: Vec<f32>,
    target: Vec<u8>,
}

/// Handler for [`PixelBuffer`], rewriting the current buffer in place
///
/// Buffers must have equal lengths. Completes once every byte matches the
/// target's bytes as they were when the transition began. When stoppable,
/// bytes changed since the last step are reported as divergence.
pub fn pixel_transition() -> TransitionHandler<PixelBuffer> {
    handler(|input: StepInput<'_, PixelBuffer>, cache: &mut TransitionCache| {
        if input.current.ptr_eq(input.target) {
            return Ok(Step::completed(input.current.clone()));
        }

        if input.stoppable {
            if let Some(progress) = cache.get::<PixelProgress>() {
                let bytes = input.current.read();
                let untouched = bytes.len() == progress.current.len()
                    && bytes
                        .par_iter()
                        .with_min_len(PARALLEL_CUTOFF)
                        .zip(progress.current.par_iter())
                        .all(|(&b, &c)| b == c as u8);
                if !untouched {
                    drop(bytes);
                    return Ok(Step::diverged(input.current.clone()));
                }
            }
        }

        if cache.get::<PixelProgress>().is_none() {
            let current: Vec<f32> = input.current.read().iter().map(|&b| b as f32).collect();
            let target = input.target.to_vec();
            if current.len() != target.len() {
                return Err(CoreError::BufferLengthMismatch {
                    expected: current.len(),
                    actual: target.len(),
                }
                .into());
            }
            cache.set(PixelProgress { current, target });
        }
        let Some(progress) = cache.get_mut::<PixelProgress>() else {
            return Ok(Step::completed(input.current.clone()));
        };

        let (gradient, offset) = (input.gradient, input.linear_speed);
        progress
            .current
            .par_iter_mut()
            .with_min_len(PARALLEL_CUTOFF)
            .zip(progress.target.par_iter())
            .for_each(|(c, &t)| {
                *c = transition_clamp(*c as f64, t as f64, gradient, offset).clamp(0.0, 255.0)
                    as f32;
            });

        let mut bytes = input.current.write();
        if bytes.len() != progress.current.len() {
            return Err(CoreError::BufferLengthMismatch {
                expected: progress.current.len(),
                actual: bytes.len(),
            }
            .into());
        }
        bytes
            .par_iter_mut()
            .with_min_len(PARALLEL_CUTOFF)
            .zip(progress.current.par_iter())
            .for_each(|(b, &c)| *b = c as u8);

        let state = if bytes[..] == progress.target[..] {
            AnimationState::Completed
        } else {
            AnimationState::UpdateSuccess
        };
        drop(bytes);
        Ok(Step::new(state, input.current.clone()))
    })
}

// ============================================================================
// Built-in provider
// ============================================================================

/// Provider declaring handlers for every value kind in `glide_core`
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTransitions;

impl HandlerProvider for BuiltinTransitions {
    fn name(&self) -> &str {
        "builtin"
    }

    fn declare(&self, registrar: &mut Registrar) -> Result<(), RegistryError> {
        registrar
            .declare::<f64>(float_transition())
            .declare::<f32>(float_transition())
            .declare::<ColorF>(float_transition())
            .declare::<PointF>(float_transition())
            .declare::<SizeF>(float_transition())
            .declare::<RectF>(float_transition())
            .declare::<Vec2>(float_transition())
            .declare::<Vec3>(float_transition())
            .declare::<Vec4>(float_transition())
            .declare::<i8>(integer_transition())
            .declare::<i16>(integer_transition())
            .declare::<i32>(integer_transition())
            .declare::<i64>(integer_transition())
            .declare::<u8>(integer_transition())
            .declare::<u16>(integer_transition())
            .declare::<u32>(integer_transition())
            .declare::<u64>(integer_transition())
            .declare::<Color>(integer_transition())
            .declare::<Point>(integer_transition())
            .declare::<Size>(integer_transition())
            .declare::<Rect>(integer_transition())
            .declare_shared::<PixelBuffer>(pixel_transition());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<T: Animatable>(
        h: &TransitionHandler<T>,
        cache: &mut TransitionCache,
        current: &T,
        target: &T,
        gradient: f64,
        linear_speed: f64,
        stoppable: bool,
    ) -> Step<T> {
        h(
            StepInput {
                current,
                target,
                gradient,
                linear_speed,
                stoppable,
            },
            cache,
        )
        .unwrap()
    }

    #[test]
    fn test_transition_clamp() {
        assert_eq!(transition_clamp(0.0, 10.0, 1.0, 0.0), 10.0);
        assert_eq!(transition_clamp(0.0, 10.0, 0.5, 0.0), 5.0);
        assert_eq!(transition_clamp(0.0, 10.0, 0.5, 1.0), 6.0);
        assert_eq!(transition_clamp(10.0, 0.0, 0.5, 1.0), 4.0);
        // within offset of the target snaps
        assert_eq!(transition_clamp(9.5, 10.0, 0.0, 1.0), 10.0);
        // zero gradient still moves by the offset
        assert_eq!(transition_clamp(0.0, 10.0, 0.0, 2.0), 2.0);
        assert_eq!(transition_clamp(3.0, 10.0, 0.0, 0.0), 3.0);
    }

    #[test]
    fn test_float_snaps_then_completes() {
        let h = float_transition::<f64>();
        let mut cache = TransitionCache::new();

        let step = run(&h, &mut cache, &99.995, &100.0, 0.1, 0.01, true);
        assert_eq!(step, Step::updated(100.0));

        let step = run(&h, &mut cache, &100.0, &100.0, 0.1, 0.01, true);
        assert_eq!(step.state, AnimationState::Completed);
    }

    #[test]
    fn test_float_close_to_target_still_lands() {
        let h = float_transition::<f64>();
        let mut cache = TransitionCache::new();

        let start = 100.0 - 5e-8;
        let step = run(&h, &mut cache, &start, &100.0, 0.5, 0.005, true);
        assert_eq!(step, Step::updated(100.0));
        let step = run(&h, &mut cache, &100.0, &100.0, 0.5, 0.005, true);
        assert_eq!(step.state, AnimationState::Completed);
    }

    #[test]
    fn test_float_step_below_precision_snaps() {
        let h = float_transition::<f32>();
        let mut cache = TransitionCache::new();

        // 1e-5 is far below the spacing of f32 around 1e6
        let step = run(&h, &mut cache, &1.0e6f32, &(1.0e6 + 64.0), 0.0, 1e-5, false);
        assert_eq!(step, Step::updated(1.0e6 + 64.0));
    }

    #[test]
    fn test_float_divergence() {
        let h = float_transition::<f32>();
        let mut cache = TransitionCache::new();

        let step = run(&h, &mut cache, &0.0f32, &10.0, 0.5, 0.0, true);
        assert_eq!(step, Step::updated(5.0));

        // someone else wrote 7.0
        let step = run(&h, &mut cache, &7.0f32, &10.0, 0.5, 0.0, true);
        assert_eq!(step.state, AnimationState::ValueDidntUpdateAsExpected);

        // not stoppable: carry on from the live value
        let step = run(&h, &mut cache, &7.0f32, &10.0, 0.5, 0.0, false);
        assert_eq!(step, Step::updated(8.5));
    }

    #[test]
    fn test_integer_keeps_remainder() {
        let h = integer_transition::<i32>();
        let mut cache = TransitionCache::new();

        // 0.4 per tick: value stays at 0 but progress accumulates
        let step = run(&h, &mut cache, &0, &10, 0.0, 0.4, true);
        assert_eq!(step, Step::updated(0));
        let step = run(&h, &mut cache, &0, &10, 0.0, 0.4, true);
        assert_eq!(step, Step::updated(0));
        let step = run(&h, &mut cache, &0, &10, 0.0, 0.4, true);
        assert_eq!(step, Step::updated(1));
    }

    #[test]
    fn test_integer_snaps_and_completes() {
        let h = integer_transition::<u8>();
        let mut cache = TransitionCache::new();

        let step = run(&h, &mut cache, &9u8, &10, 1.0, 0.0, false);
        assert_eq!(step, Step::updated(10));
        let step = run(&h, &mut cache, &10u8, &10, 1.0, 0.0, false);
        assert_eq!(step.state, AnimationState::Completed);
    }

    #[test]
    fn test_integer_divergence() {
        let h = integer_transition::<i64>();
        let mut cache = TransitionCache::new();

        let step = run(&h, &mut cache, &0i64, &100, 0.5, 0.0, true);
        assert_eq!(step, Step::updated(50));
        let step = run(&h, &mut cache, &20i64, &100, 0.5, 0.0, true);
        assert_eq!(step.state, AnimationState::ValueDidntUpdateAsExpected);
    }

    #[test]
    fn test_integer_clamps_to_range() {
        let h = integer_transition::<u8>();
        let mut cache = TransitionCache::new();
        let step = run(&h, &mut cache, &250u8, &255, 0.0, 100.0, false);
        assert_eq!(step.value, 255);
    }

    #[test]
    fn test_color_transition() {
        let h = integer_transition::<Color>();
        let mut cache = TransitionCache::new();

        let step = run(
            &h,
            &mut cache,
            &Color::BLACK,
            &Color::WHITE,
            0.5,
            0.0,
            true,
        );
        assert_eq!(step.state, AnimationState::UpdateSuccess);
        assert_eq!(step.value, Color::rgb(127, 127, 127));
        assert_eq!(step.value.a, 255);
    }

    #[test]
    fn test_rect_float_transition() {
        let h = float_transition::<RectF>();
        let mut cache = TransitionCache::new();
        let step = run(
            &h,
            &mut cache,
            &RectF::ZERO,
            &RectF::new(10.0, 20.0, 30.0, 40.0),
            0.5,
            0.0,
            false,
        );
        assert_eq!(step.value, RectF::new(5.0, 10.0, 15.0, 20.0));
    }

    #[test]
    fn test_pixel_buffer_in_place() {
        let h = pixel_transition();
        let mut cache = TransitionCache::new();
        let current = PixelBuffer::new(vec![0, 100, 200, 255]);
        let target = PixelBuffer::new(vec![100, 100, 100, 0]);

        let step = run(&h, &mut cache, &current, &target, 0.5, 0.0, false);
        assert_eq!(step.state, AnimationState::UpdateSuccess);
        assert!(step.value.ptr_eq(&current));
        assert_eq!(current.to_vec(), vec![50, 100, 150, 127]);

        let step = run(&h, &mut cache, &current, &target, 1.0, 0.0, false);
        assert_eq!(step.state, AnimationState::Completed);
        assert_eq!(current.to_vec(), target.to_vec());
    }

    #[test]
    fn test_pixel_buffer_divergence() {
        let h = pixel_transition();
        let mut cache = TransitionCache::new();
        let current = PixelBuffer::new(vec![0, 0, 0, 0]);
        let target = PixelBuffer::new(vec![200, 200, 200, 200]);

        let step = run(&h, &mut cache, &current, &target, 0.5, 0.0, true);
        assert_eq!(step.state, AnimationState::UpdateSuccess);
        assert_eq!(current.to_vec(), vec![100, 100, 100, 100]);

        // someone else painted over one byte
        current.write()[2] = 7;
        let step = run(&h, &mut cache, &current, &target, 0.5, 0.0, true);
        assert_eq!(step.state, AnimationState::ValueDidntUpdateAsExpected);
        assert_eq!(current.to_vec(), vec![100, 100, 7, 100]);

        // not stoppable: the step overwrites it
        let step = run(&h, &mut cache, &current, &target, 0.5, 0.0, false);
        assert_eq!(step.state, AnimationState::UpdateSuccess);
        assert_eq!(current.to_vec(), vec![150, 150, 150, 150]);
    }

    #[test]
    fn test_pixel_buffer_length_mismatch() {
        let h = pixel_transition();
        let mut cache = TransitionCache::new();
        let current = PixelBuffer::zeroed(4);
        let target = PixelBuffer::zeroed(8);

        let err = h(
            StepInput {
                current: &current,
                target: &target,
                gradient: 0.5,
                linear_speed: 0.0,
                stoppable: false,
            },
            &mut cache,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Core(CoreError::BufferLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_cache_typed_access() {
        let mut cache = TransitionCache::new();
        assert!(cache.is_empty());
        cache.set(3u32);
        assert_eq!(cache.get::<u32>(), Some(&3));
        assert_eq!(cache.get::<i32>(), None);
        *cache.get_mut::<u32>().unwrap() += 1;
        assert_eq!(cache.get::<u32>(), Some(&4));
        cache.clear();
        assert!(cache.is_empty());
    }
}
