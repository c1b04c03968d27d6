//! Furniture classification, computed once when an obstacle is spawned.
//!
//! | Kind | Sit capacity | Lie capacity |
//! |------|-------------|--------------|
//! | Chair, Stool, Armchair | 1 | 0 |
//! | Bench, Sofa | `longer / seat_spacing` (≥ 1) | 0 |
//! | CornerSofa | `w / spacing + d / spacing − 1` (≥ 2) | 0 |
//! | Bed | `longer / seat_spacing` (≥ 1) | `shorter / lying_slot_width` (≥ 1) |
//! | Table, Decor | 0 | 0 |

use serde::{Deserialize, Serialize};

use crate::collision::Dimensions;
use crate::config::SeatingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FurnitureKind {
    Chair,
    Stool,
    Armchair,
    Bench,
    Sofa,
    /// L-shaped; seats run along both arms.
    CornerSofa,
    Bed,
    Table,
    Decor,
}

impl FurnitureKind {
    /// Guess the kind from a model reference such as `models/sofa_corner.glb`.
    pub fn classify(model: &str) -> Self {
        let name = model.to_ascii_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| name.contains(w));
        if has(&["corner", "sectional", "l_sofa", "lshape"]) {
            FurnitureKind::CornerSofa
        } else if has(&["sofa", "couch", "loveseat"]) {
            FurnitureKind::Sofa
        } else if has(&["bench"]) {
            FurnitureKind::Bench
        } else if has(&["bed", "mattress", "futon"]) {
            FurnitureKind::Bed
        } else if has(&["armchair"]) {
            FurnitureKind::Armchair
        } else if has(&["stool"]) {
            FurnitureKind::Stool
        } else if has(&["chair", "seat"]) {
            FurnitureKind::Chair
        } else if has(&["table", "desk", "counter"]) {
            FurnitureKind::Table
        } else {
            FurnitureKind::Decor
        }
    }

    /// Seat surface height as a fraction of the furniture height.
    pub fn seat_height_fraction(&self) -> f32 {
        match self {
            FurnitureKind::Chair => 0.45,
            FurnitureKind::Stool => 0.65,
            FurnitureKind::Armchair | FurnitureKind::Sofa | FurnitureKind::CornerSofa => 0.4,
            FurnitureKind::Bench => 0.5,
            FurnitureKind::Bed => 0.55,
            FurnitureKind::Table | FurnitureKind::Decor => 0.5,
        }
    }

    /// Seat anchor shift toward the front, as a fraction of the depth.
    pub fn seat_forward_offset(&self) -> f32 {
        match self {
            FurnitureKind::Chair => 0.05,
            FurnitureKind::Armchair | FurnitureKind::Sofa | FurnitureKind::CornerSofa => 0.1,
            FurnitureKind::Bed => 0.2,
            FurnitureKind::Stool
            | FurnitureKind::Bench
            | FurnitureKind::Table
            | FurnitureKind::Decor => 0.0,
        }
    }

    pub fn is_single_seat(&self) -> bool {
        matches!(
            self,
            FurnitureKind::Chair | FurnitureKind::Stool | FurnitureKind::Armchair
        )
    }
}

/// Cached classification of one obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FurnitureClass {
    pub kind: FurnitureKind,
    pub seat_capacity: u32,
    pub lying_capacity: u32,
}

impl FurnitureClass {
    pub fn derive(kind: FurnitureKind, dims: Dimensions, seating: &SeatingConfig) -> Self {
        let per = |len: f32, spacing: f32| (len / spacing).floor().max(0.0) as u32;
        let spacing = seating.seat_spacing;
        let seat_capacity = match kind {
            k if k.is_single_seat() => 1,
            FurnitureKind::Bench | FurnitureKind::Sofa | FurnitureKind::Bed => {
                per(dims.longer_horizontal(), spacing).max(1)
            }
            FurnitureKind::CornerSofa => per(dims.width, spacing)
                .saturating_add(per(dims.depth, spacing))
                .saturating_sub(1)
                .max(2),
            _ => 0,
        };
        let lying_capacity = match kind {
            FurnitureKind::Bed => per(dims.shorter_horizontal(), seating.lying_slot_width).max(1),
            _ => 0,
        };
        Self {
            kind,
            seat_capacity,
            lying_capacity,
        }
    }

    /// Classify from an explicit kind tag when given, else from the model name.
    pub fn from_model(
        model: &str,
        kind: Option<FurnitureKind>,
        dims: Dimensions,
        seating: &SeatingConfig,
    ) -> Self {
        Self::derive(
            kind.unwrap_or_else(|| FurnitureKind::classify(model)),
            dims,
            seating,
        )
    }

    pub fn sittable(&self) -> bool {
        self.seat_capacity > 0
    }

    pub fn lieable(&self) -> bool {
        self.lying_capacity > 0
    }
}
