use serde::{Deserialize, Serialize};

/// 2D vector used for world units and pixels alike.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len == 0.0 {
            Self::ZERO
        } else {
            Self::new(self.x / len, self.y / len)
        }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn distance(self, rhs: Self) -> f32 {
        (self - rhs).length()
    }

    pub fn lerp(self, rhs: Self, t: f32) -> Self {
        Self::new(
            self.x + (rhs.x - self.x) * t,
            self.y + (rhs.y - self.y) * t,
        )
    }

    /// Component-wise product.
    pub fn mul_elem(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y)
    }

    /// Rotates the vector around the origin by `degrees` (clockwise on a y-down screen).
    pub fn rotate_deg(self, degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Unit vector for a direction angle in radians measured from +Y towards +X.
    ///
    /// This is the convention used for particle headings and the shadow direction:
    /// angle 0 points straight down the screen.
    pub fn from_heading(angle: f32) -> Self {
        Self::new(angle.sin(), angle.cos())
    }

    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs())
    }

    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y))
    }

    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y))
    }

    pub fn floor_to(self, step: f32) -> Self {
        Self::new((self.x / step).floor() * step, (self.y / step).floor() * step)
    }
}

impl From<(f32, f32)> for Vec2 {
    fn from(value: (f32, f32)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::Div<f32> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

/// Axis-aligned float rectangle anchored at its top-left corner (y grows downwards).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn from_pos_size(pos: Vec2, size: Vec2) -> Self {
        Self::new(pos.x, pos.y, size.x, size.y)
    }

    pub fn from_center(center: Vec2, size: Vec2) -> Self {
        Self::new(center.x - size.x / 2.0, center.y - size.y / 2.0, size.x, size.y)
    }

    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.w, self.h)
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn mid_bottom(&self) -> Vec2 {
        Vec2::new(self.x + self.w / 2.0, self.bottom())
    }

    pub fn set_center(&mut self, center: Vec2) {
        self.x = center.x - self.w / 2.0;
        self.y = center.y - self.h / 2.0;
    }

    pub fn set_center_x(&mut self, x: f32) {
        self.x = x - self.w / 2.0;
    }

    pub fn set_right(&mut self, right: f32) {
        self.x = right - self.w;
    }

    pub fn set_bottom(&mut self, bottom: f32) {
        self.y = bottom - self.h;
    }

    pub fn set_top_left(&mut self, p: Vec2) {
        self.x = p.x;
        self.y = p.y;
    }

    pub fn set_top_right(&mut self, p: Vec2) {
        self.set_right(p.x);
        self.y = p.y;
    }

    pub fn set_bottom_left(&mut self, p: Vec2) {
        self.x = p.x;
        self.set_bottom(p.y);
    }

    pub fn set_bottom_right(&mut self, p: Vec2) {
        self.set_right(p.x);
        self.set_bottom(p.y);
    }

    pub fn set_mid_top(&mut self, p: Vec2) {
        self.set_center_x(p.x);
        self.y = p.y;
    }

    /// Half-open containment: left/top edges inside, right/bottom outside.
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Open containment: a point on any edge is outside.
    pub fn contains_strict(&self, p: Vec2) -> bool {
        p.x > self.x && p.x < self.right() && p.y > self.y && p.y < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    pub fn translated(&self, by: Vec2) -> Rect {
        Rect::new(self.x + by.x, self.y + by.y, self.w, self.h)
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Rect {
        Rect::new(self.x * sx, self.y * sy, self.w * sx, self.h * sy)
    }

    /// Clips the segment `a -> b` against this rectangle (Liang-Barsky).
    ///
    /// Returns the clipped endpoints ordered along `a -> b`, so the first point is
    /// where the segment enters the rectangle, or `a` itself when `a` is inside.
    /// Edges count as inside.
    pub fn clip_segment(&self, a: Vec2, b: Vec2) -> Option<(Vec2, Vec2)> {
        let d = b - a;
        let mut t0 = 0.0_f32;
        let mut t1 = 1.0_f32;

        let checks = [
            (-d.x, a.x - self.x),
            (d.x, self.right() - a.x),
            (-d.y, a.y - self.y),
            (d.y, self.bottom() - a.y),
        ];

        for (p, q) in checks {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }

        Some((a + d * t0, a + d * t1))
    }
}

/// 8-bit RGBA colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Colour {
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_f32(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

impl Default for Colour {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn anchor_setters_move_without_resizing() {
        let mut r = Rect::new(0.0, 0.0, 4.0, 2.0);
        r.set_bottom_right(Vec2::new(10.0, 10.0));
        assert_eq!(r, Rect::new(6.0, 8.0, 4.0, 2.0));
        r.set_center(Vec2::ZERO);
        assert_eq!(r, Rect::new(-2.0, -1.0, 4.0, 2.0));
        r.set_mid_top(Vec2::new(5.0, 1.0));
        assert_eq!(r, Rect::new(3.0, 1.0, 4.0, 2.0));
    }

    #[test]
    fn strict_containment_excludes_edges() {
        let r = Rect::new(0.0, 0.0, 1.0, 1.0);
        assert!(r.contains_point(Vec2::ZERO));
        assert!(!r.contains_strict(Vec2::ZERO));
        assert!(r.contains_strict(Vec2::new(0.5, 0.5)));
    }

    #[test]
    fn clip_segment_returns_entry_point_first() {
        let r = Rect::new(10.0, 10.0, 10.0, 10.0);
        let (enter, exit) = r
            .clip_segment(Vec2::new(15.0, 0.0), Vec2::new(15.0, 40.0))
            .unwrap();
        assert_relative_eq!(enter.y, 10.0);
        assert_relative_eq!(exit.y, 20.0);

        let (enter, _) = r
            .clip_segment(Vec2::new(12.0, 12.0), Vec2::new(40.0, 12.0))
            .unwrap();
        assert_eq!(enter, Vec2::new(12.0, 12.0));

        assert!(r
            .clip_segment(Vec2::new(0.0, 0.0), Vec2::new(5.0, 40.0))
            .is_none());
    }

    #[test]
    fn heading_zero_points_down() {
        let v = Vec2::from_heading(0.0);
        assert_relative_eq!(v.x, 0.0);
        assert_relative_eq!(v.y, 1.0);
    }
}
