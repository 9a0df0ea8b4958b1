//! Geometric and physical measurements of the live CAD document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Absolute floor for retained walls, in mm.
pub const MIN_WALL_FLOOR_MM: f64 = 1.2;

/// Bounding box extents in mm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Smallest positive extent, if any.
    pub fn smallest(&self) -> Option<f64> {
        [self.x, self.y, self.z]
            .into_iter()
            .filter(|d| *d > 0.0)
            .min_by(|a, b| a.total_cmp(b))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelAnalysis {
    /// Grams
    #[serde(default)]
    pub current_mass: f64,
    /// cm³
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub bodies_count: u32,
    #[serde(default)]
    pub components_count: u32,
    #[serde(default)]
    pub can_shell: bool,
    /// Feature counts by kind (extrudes, holes, fillets...).
    #[serde(default)]
    pub features: BTreeMap<String, u32>,
    #[serde(default)]
    pub material: String,
    /// cm²
    #[serde(default)]
    pub surface_area: f64,
}

/// Parameter ranges derived from the measured geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafeLimits {
    pub min_wall_thickness: f64,
    pub max_wall_thickness: f64,
    pub max_fillet_radius: f64,
    pub max_hole_diameter: f64,
}

impl ModelAnalysis {
    pub fn smallest_dimension(&self) -> Option<f64> {
        self.bounding_box.smallest()
    }

    /// None when the bounding box is empty, since nothing can be derived.
    pub fn safe_limits(&self) -> Option<SafeLimits> {
        let smallest = self.smallest_dimension()?;
        let min_wall = (smallest * 0.10).max(MIN_WALL_FLOOR_MM);
        Some(SafeLimits {
            min_wall_thickness: round2(min_wall),
            max_wall_thickness: round2((smallest * 0.40).max(min_wall)),
            max_fillet_radius: round2(smallest * 0.25),
            max_hole_diameter: round2(smallest * 0.50),
        })
    }

    /// Multi-line summary for prompts and CLI reports.
    pub fn summary(&self) -> String {
        let b = &self.bounding_box;
        format!(
            "Mass: {:.2} g\nVolume: {:.2} cm³\nBounding box: {} x {} x {} mm\nBodies: {}\nCan shell: {}\nMaterial: {}\nSurface area: {:.2} cm²",
            self.current_mass,
            self.volume,
            b.x,
            b.y,
            b.z,
            self.bodies_count,
            if self.can_shell { "yes" } else { "no" },
            if self.material.is_empty() { "unknown" } else { &self.material },
            self.surface_area
        )
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
