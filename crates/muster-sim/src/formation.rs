//! Formation slot geometry.

use crate::group::{Group, GroupKind};
use glam::Vec3;
use muster_common::ActorId;
use std::f32::consts::TAU;

/// Position of slot `index` of `count` on a circle around `centroid`.
///
/// A single-member formation targets the centroid itself.
#[must_use]
pub fn circle_slot(centroid: Vec3, radius: f32, index: usize, count: usize) -> Vec3 {
    if count <= 1 {
        return centroid;
    }
    let angle = TAU * index as f32 / count as f32;
    centroid + radius * Vec3::new(angle.cos(), 0.0, angle.sin())
}

/// Position of slot `index` in a column trailing behind `anchor`.
///
/// Slot 0 is the anchor itself.
#[must_use]
pub fn column_slot(anchor: Vec3, heading: Vec3, spacing: f32, index: usize) -> Vec3 {
    let dir = Vec3::new(heading.x, 0.0, heading.z).normalize_or_zero();
    let dir = if dir == Vec3::ZERO { Vec3::Z } else { dir };
    anchor - dir * spacing * index as f32
}

/// Target position for `member` in `group`.
///
/// `formation_radius` is the circle radius for static groups and the column
/// spacing for walking groups. Returns `None` if `member` is not in the group.
#[must_use]
pub fn target_position_for_member(
    group: &Group,
    member: ActorId,
    formation_radius: f32,
) -> Option<Vec3> {
    let index = group.slot_of(member)?;
    Some(match group.kind() {
        GroupKind::Static => circle_slot(group.centroid(), formation_radius, index, group.len()),
        GroupKind::Walking => column_slot(group.centroid(), group.heading(), formation_radius, index),
    })
}
