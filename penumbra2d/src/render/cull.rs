//! Two-level visibility culling.
//!
//! A layer's y-sorted objects are split into contiguous sectors. A sector whose
//! bounding box misses the camera's reach is skipped without looking at its
//! members; objects inside a visible sector are then tested one by one.

use std::ops::Range;

use crate::camera::Camera;
use crate::math::{Rect, Vec2};

/// World units added around the viewport before testing.
pub const VIEWPORT_MARGIN: f32 = 2.0;

/// Number of sectors a layer of `n` objects is split into.
pub fn sector_count(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let n = n as f32;
    ((n / (10.0 + n / 30.0)).ceil() as usize).max(1)
}

/// Non-overlapping index ranges that together cover `0..n`.
pub fn sector_ranges(n: usize) -> Vec<Range<usize>> {
    let sectors = sector_count(n);
    (1..=sectors)
        .map(|i| n * (i - 1) / sectors..n * i / sectors)
        .collect()
}

/// Bounding box of every rectangle in the sector.
pub fn sector_bounds<I>(rects: I) -> Option<Rect>
where
    I: IntoIterator<Item = Rect>,
{
    rects.into_iter().reduce(|acc, r| acc.union(&r))
}

fn reach(camera: &Camera) -> Vec2 {
    camera.viewport() + Vec2::splat(VIEWPORT_MARGIN)
}

fn within(rect: &Rect, camera: &Camera, reach: Vec2) -> bool {
    let p = camera.position;
    rect.top() - p.y <= reach.y
        && rect.bottom() - p.y >= -reach.y
        && rect.left() - p.x <= reach.x
        && rect.right() - p.x >= -reach.x
}

pub fn sector_visible(bounds: &Rect, camera: &Camera) -> bool {
    within(bounds, camera, reach(camera))
}

pub fn object_visible(rect: &Rect, camera: &Camera) -> bool {
    within(rect, camera, reach(camera))
}

/// Whether a sector made of `rects` may hold anything on screen. An empty
/// sector never is.
pub fn sector_in_view<I>(rects: I, camera: &Camera) -> bool
where
    I: IntoIterator<Item = Rect>,
{
    sector_bounds(rects).is_some_and(|bounds| sector_visible(&bounds, camera))
}
