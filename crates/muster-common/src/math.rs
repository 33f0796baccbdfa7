//! Vector helpers and the replicated tint color.
//!
//! Gameplay happens on the ground plane: `x`/`z` are horizontal, `y` is up.

pub use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Horizontal (XZ-plane) distance between two points.
#[must_use]
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    (dx * dx + dz * dz).sqrt()
}

/// Normalized horizontal direction from `from` to `to`, or zero when they coincide.
#[must_use]
pub fn planar_direction(from: Vec3, to: Vec3) -> Vec3 {
    let d = Vec3::new(to.x - from.x, 0.0, to.z - from.z);
    if d.length_squared() < 1e-8 {
        Vec3::ZERO
    } else {
        d.normalize()
    }
}

/// Arithmetic mean of a set of points. Returns `None` for an empty set.
#[must_use]
pub fn centroid(points: impl IntoIterator<Item = Vec3>) -> Option<Vec3> {
    let mut sum = Vec3::ZERO;
    let mut count = 0u32;
    for p in points {
        sum += p;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f32)
    }
}

/// Linear RGBA color used for actor tints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red channel (0.0 - 1.0)
    pub r: f32,
    /// Green channel (0.0 - 1.0)
    pub g: f32,
    /// Blue channel (0.0 - 1.0)
    pub b: f32,
    /// Alpha channel (0.0 - 1.0)
    pub a: f32,
}

impl Color {
    /// Creates an opaque color.
    #[must_use]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Creates a color with alpha.
    #[must_use]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Untinted white.
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);

    /// Returns this color with channels clamped to `[0, 1]`.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 10.0, 4.0);
        assert!((planar_distance(a, b) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_planar_direction_zero_for_same_point() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(planar_direction(p, p), Vec3::ZERO);
        let d = planar_direction(Vec3::ZERO, Vec3::new(0.0, 5.0, 2.0));
        assert!((d - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_centroid() {
        assert_eq!(centroid(std::iter::empty()), None);
        let c = centroid([Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 4.0)]);
        assert_eq!(c, Some(Vec3::new(1.0, 0.0, 2.0)));
    }

    #[test]
    fn test_color_clamp() {
        let c = Color::rgba(2.0, -1.0, 0.5, 1.5).clamped();
        assert_eq!(c, Color::rgba(1.0, 0.0, 0.5, 1.0));
    }
}
