//! Animatable value kinds
//!
//! Plain geometry and color types that the built-in transition handlers know
//! how to move toward a target, plus [`PixelBuffer`], a shared byte buffer
//! that is animated in place.

use crate::error::{CoreError, Result};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Bound shared by every value an animation can drive
///
/// Blanket-implemented; user types only need the listed std traits.
pub trait Animatable: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> Animatable for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

// ─────────────────────────────────────────────────────────────────────────────
// Colors
// ─────────────────────────────────────────────────────────────────────────────

/// 8-bit ARGB color
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::argb(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { a: 255, r, g, b }
    }

    /// Build from a packed `0xAARRGGBB` value
    pub const fn from_argb_u32(argb: u32) -> Self {
        Self {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    pub const fn to_argb_u32(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

/// Floating point RGBA color, components in `0.0..=1.0`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorF {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorF {
    pub const TRANSPARENT: ColorF = ColorF::rgba(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: ColorF = ColorF::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: ColorF = ColorF::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.a = alpha;
        self
    }
}

impl From<Color> for ColorF {
    fn from(c: Color) -> Self {
        ColorF::rgba(
            c.r as f32 / 255.0,
            c.g as f32 / 255.0,
            c.b as f32 / 255.0,
            c.a as f32 / 255.0,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Integer geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Integer 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Integer 2D size
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Integer rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const ZERO: Rect = Rect::new(0, 0, 0, 0);

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Float geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Floating point 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub const ZERO: PointF = PointF { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<Point> for PointF {
    fn from(p: Point) -> Self {
        PointF::new(p.x as f32, p.y as f32)
    }
}

/// Floating point 2D size
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeF {
    pub width: f32,
    pub height: f32,
}

impl SizeF {
    pub const ZERO: SizeF = SizeF {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Floating point rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    pub const ZERO: RectF = RectF::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Truncate each component toward zero
    pub fn truncate(&self) -> Rect {
        Rect::new(
            self.x as i32,
            self.y as i32,
            self.width as i32,
            self.height as i32,
        )
    }
}

impl From<Rect> for RectF {
    fn from(r: Rect) -> Self {
        RectF::new(r.x as f32, r.y as f32, r.width as f32, r.height as f32)
    }
}

/// 2D vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const ONE: Vec2 = Vec2 { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 3D vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const ONE: Vec3 = Vec3 {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// 4D vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vec4 {
    pub const ZERO: Vec4 = Vec4::new(0.0, 0.0, 0.0, 0.0);
    pub const ONE: Vec4 = Vec4::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pixel buffer
// ─────────────────────────────────────────────────────────────────────────────

/// A shared, lockable byte buffer (e.g. BGRA pixels)
///
/// Cloning yields another handle to the same bytes. Equality is identity:
/// two handles compare equal only when they point at the same buffer, so an
/// animation that rewrites the bytes in place never sees its value "change".
#[derive(Clone, Default)]
pub struct PixelBuffer {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl PixelBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// A zero-filled buffer of `len` bytes
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    pub fn len(&self) -> usize {
        self.bytes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.read().is_empty()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.bytes.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.bytes.write()
    }

    /// Copy the current bytes out
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    /// Overwrite every byte from `src`, which must have the same length
    pub fn copy_from(&self, src: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.write();
        if bytes.len() != src.len() {
            return Err(CoreError::BufferLengthMismatch {
                expected: bytes.len(),
                actual: src.len(),
            });
        }
        bytes.copy_from_slice(src);
        Ok(())
    }

    /// Whether both handles refer to the same buffer
    pub fn ptr_eq(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl PartialEq for PixelBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("ptr", &Arc::as_ptr(&self.bytes))
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_packing() {
        let c = Color::from_argb_u32(0x80FF4020);
        assert_eq!(c, Color::argb(0x80, 0xFF, 0x40, 0x20));
        assert_eq!(c.to_argb_u32(), 0x80FF4020);
    }

    #[test]
    fn test_color_to_float() {
        let c: ColorF = Color::WHITE.into();
        assert_eq!(c, ColorF::WHITE);
    }

    #[test]
    fn test_rect_truncate() {
        let r = RectF::new(1.9, -2.7, 10.5, 3.0);
        assert_eq!(r.truncate(), Rect::new(1, -2, 10, 3));
    }

    #[test]
    fn test_pixel_buffer_identity_equality() {
        let a = PixelBuffer::new(vec![1, 2, 3]);
        let b = a.clone();
        let c = PixelBuffer::new(vec![1, 2, 3]);

        assert_eq!(a, b);
        assert_ne!(a, c);

        b.write()[0] = 9;
        assert_eq!(a.to_vec(), vec![9, 2, 3]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_pixel_buffer_copy_from() {
        let buf = PixelBuffer::zeroed(4);
        buf.copy_from(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buf.to_vec(), vec![1, 2, 3, 4]);

        let err = buf.copy_from(&[1, 2]).unwrap_err();
        assert_eq!(
            err,
            CoreError::BufferLengthMismatch {
                expected: 4,
                actual: 2
            }
        );
    }
}
