//! CAD document abstraction.
//!
//! [`CadSession`] is the boundary to the geometry kernel: measurements, a
//! handful of primitives, and export. [`SimulatedSession`] implements it on
//! a box model so the executor can run end-to-end without a CAD host.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::path::Path;

use intelicad_common::analysis::MIN_WALL_FLOOR_MM;
use intelicad_common::{BoundingBox, ModelAnalysis};
use thiserror::Error;

/// Upper bound on holes a single grid may cut.
const MAX_GRID_HOLES: f64 = 10_000.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CadError {
    #[error("no solid body in the document")]
    NoBody,

    #[error("topology change: {0}")]
    TopologyChange(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Operation '{0}' not yet implemented")]
    Unsupported(String),

    #[error("export failed: {0}")]
    Export(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn parse(name: &str) -> Result<Self, CadError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(CadError::InvalidParameter(format!("invalid axis '{}'", other))),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("X"),
            Axis::Y => f.write_str("Y"),
            Axis::Z => f.write_str("Z"),
        }
    }
}

/// The live document. Lengths are mm, angles degrees.
pub trait CadSession: Send + Sync {
    fn analyze(&self) -> Result<ModelAnalysis, CadError>;

    fn shell(&mut self, wall_thickness: f64) -> Result<(), CadError>;
    fn fillet(&mut self, radius: f64, all_edges: bool) -> Result<(), CadError>;
    fn mirror(&mut self, axis: Axis) -> Result<(), CadError>;
    fn rotate(&mut self, angle: f64, axis: Axis) -> Result<(), CadError>;
    fn translate(&mut self, x: f64, y: f64, z: f64) -> Result<(), CadError>;
    fn scale(&mut self, x: f64, y: f64, z: f64) -> Result<(), CadError>;
    fn add_ribs(&mut self, thickness: f64, height: f64, pattern: &str) -> Result<(), CadError>;

    /// Cut a through-all grid of holes from the top face; returns the count.
    fn cut_hole_grid(&mut self, diameter: f64, spacing: f64) -> Result<u32, CadError>;

    fn export(&self, path: &Path) -> Result<(), CadError>;
}

/// PLA, g/cm³
const DEFAULT_DENSITY: f64 = 1.24;

/// Box-model document.
#[derive(Debug, Clone)]
pub struct SimulatedSession {
    bounding_box: BoundingBox,
    /// cm³
    volume: f64,
    density: f64,
    material: String,
    bodies: u32,
    shelled: bool,
    features: BTreeMap<String, u32>,
    /// Original file contents, carried through to export.
    source: Vec<u8>,
    history: Vec<String>,
}

impl Default for SimulatedSession {
    fn default() -> Self {
        Self::new(BoundingBox::new(100.0, 50.0, 30.0), 125.3)
    }
}

impl SimulatedSession {
    pub fn new(bounding_box: BoundingBox, volume: f64) -> Self {
        let mut features = BTreeMap::new();
        features.insert("extrudes".to_string(), 3);
        features.insert("holes".to_string(), 2);
        features.insert("fillets".to_string(), 1);
        Self {
            bounding_box,
            volume,
            density: DEFAULT_DENSITY,
            material: "PLA".to_string(),
            bodies: 1,
            shelled: false,
            features,
            source: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_source(mut self, bytes: Vec<u8>) -> Self {
        self.source = bytes;
        self
    }

    pub fn without_bodies(mut self) -> Self {
        self.bodies = 0;
        self
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn smallest(&self) -> Result<f64, CadError> {
        if self.bodies == 0 {
            return Err(CadError::NoBody);
        }
        self.bounding_box.smallest().ok_or(CadError::NoBody)
    }

    fn bump(&mut self, feature: &str) {
        *self.features.entry(feature.to_string()).or_insert(0) += 1;
    }

    fn surface_area(&self) -> f64 {
        let b = &self.bounding_box;
        2.0 * (b.x * b.y + b.y * b.z + b.x * b.z) / 100.0
    }

    fn record(&mut self, entry: String) {
        self.history.push(entry);
    }
}

fn positive(name: &str, value: f64) -> Result<f64, CadError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CadError::InvalidParameter(format!("{} must be positive, got {}", name, value)))
    }
}

impl CadSession for SimulatedSession {
    fn analyze(&self) -> Result<ModelAnalysis, CadError> {
        if self.bodies == 0 {
            return Err(CadError::NoBody);
        }
        Ok(ModelAnalysis {
            current_mass: (self.volume * self.density * 100.0).round() / 100.0,
            volume: (self.volume * 100.0).round() / 100.0,
            bounding_box: self.bounding_box,
            bodies_count: self.bodies,
            components_count: 0,
            can_shell: !self.shelled,
            features: self.features.clone(),
            material: self.material.clone(),
            surface_area: (self.surface_area() * 100.0).round() / 100.0,
        })
    }

    fn shell(&mut self, wall_thickness: f64) -> Result<(), CadError> {
        let smallest = self.smallest()?;
        let t = positive("wall_thickness", wall_thickness)?;
        if self.shelled {
            return Err(CadError::TopologyChange("body is already hollow".to_string()));
        }
        if t < MIN_WALL_FLOOR_MM {
            return Err(CadError::TopologyChange(format!(
                "{} mm wall leaves too much material removed to hold shape",
                t
            )));
        }
        if t >= smallest / 2.0 {
            return Err(CadError::TopologyChange(format!(
                "{} mm wall closes the cavity of a {} mm section",
                t, smallest
            )));
        }

        let b = self.bounding_box;
        let outer = b.x * b.y * b.z;
        let inner = (b.x - 2.0 * t) * (b.y - 2.0 * t) * (b.z - 2.0 * t);
        self.volume *= 1.0 - inner / outer;
        self.shelled = true;
        self.bump("shells");
        self.record(format!("shell {}", t));
        Ok(())
    }

    fn fillet(&mut self, radius: f64, all_edges: bool) -> Result<(), CadError> {
        let smallest = self.smallest()?;
        let r = positive("radius", radius)?;
        if r >= smallest / 2.0 {
            return Err(CadError::InvalidParameter(format!(
                "radius too large: {} mm on a {} mm section",
                r, smallest
            )));
        }
        // Rounding 12 box edges removes (1 - π/4)·r² per unit length.
        let b = self.bounding_box;
        let edges = if all_edges { 4.0 * (b.x + b.y + b.z) } else { b.x + b.y + b.z };
        self.volume = (self.volume - (1.0 - PI / 4.0) * r * r * edges / 1000.0).max(0.0);
        self.bump("fillets");
        self.record(format!("fillet {}", r));
        Ok(())
    }

    fn mirror(&mut self, axis: Axis) -> Result<(), CadError> {
        self.smallest()?;
        self.bump("mirrors");
        self.record(format!("mirror {}", axis));
        Ok(())
    }

    fn rotate(&mut self, angle: f64, axis: Axis) -> Result<(), CadError> {
        self.smallest()?;
        if !angle.is_finite() {
            return Err(CadError::InvalidParameter("angle must be finite".to_string()));
        }
        let quarter_turns = (angle / 90.0).round() as i64;
        if quarter_turns.rem_euclid(2) == 1 {
            let b = &mut self.bounding_box;
            match axis {
                Axis::X => std::mem::swap(&mut b.y, &mut b.z),
                Axis::Y => std::mem::swap(&mut b.x, &mut b.z),
                Axis::Z => std::mem::swap(&mut b.x, &mut b.y),
            }
        }
        self.record(format!("rotate {} {}", angle, axis));
        Ok(())
    }

    fn translate(&mut self, x: f64, y: f64, z: f64) -> Result<(), CadError> {
        self.smallest()?;
        self.record(format!("move {} {} {}", x, y, z));
        Ok(())
    }

    fn scale(&mut self, x: f64, y: f64, z: f64) -> Result<(), CadError> {
        self.smallest()?;
        let (x, y, z) = (
            positive("factor", x)?,
            positive("factor", y)?,
            positive("factor", z)?,
        );
        let b = &mut self.bounding_box;
        b.x *= x;
        b.y *= y;
        b.z *= z;
        self.volume *= x * y * z;
        self.record(format!("scale {} {} {}", x, y, z));
        Ok(())
    }

    fn add_ribs(&mut self, thickness: f64, height: f64, pattern: &str) -> Result<(), CadError> {
        self.smallest()?;
        let t = positive("thickness", thickness)?;
        let h = positive("height", height)?;
        let b = self.bounding_box;
        let length = b.x.min(b.y) * 0.3;
        self.volume += t * h * length / 1000.0;
        self.bodies += 1;
        self.bump("extrudes");
        self.record(format!("ribs {} {} {}", pattern, t, h));
        Ok(())
    }

    fn cut_hole_grid(&mut self, diameter: f64, spacing: f64) -> Result<u32, CadError> {
        self.smallest()?;
        let d = positive("hole_diameter", diameter)?;
        let s = positive("spacing", spacing)?;
        if d >= s {
            return Err(CadError::InvalidParameter(format!(
                "holes intersect: {} mm holes at {} mm spacing",
                d, s
            )));
        }

        let b = self.bounding_box;
        // Hole centres sit at k * s for every k >= 1 with k * s < extent - s.
        let per_axis = |extent: f64| ((extent / s - 1.0).ceil() - 1.0).max(0.0);
        let count = per_axis(b.x) * per_axis(b.y);
        if count < 1.0 {
            return Err(CadError::InvalidParameter(format!(
                "no room for holes at {} mm spacing",
                s
            )));
        }
        if count > MAX_GRID_HOLES {
            return Err(CadError::InvalidParameter(format!(
                "too many holes: {} mm spacing gives {} holes (limit {})",
                s, count, MAX_GRID_HOLES
            )));
        }
        let count = count as u32;

        let removed = count as f64 * PI * (d / 2.0).powi(2) * b.z / 1000.0;
        self.volume = (self.volume - removed).max(0.0);
        *self.features.entry("holes".to_string()).or_insert(0) += count;
        self.record(format!("holes {} x {}", count, d));
        Ok(count)
    }

    fn export(&self, path: &Path) -> Result<(), CadError> {
        let mut bytes = self.source.clone();
        if bytes.is_empty() {
            bytes = format!("simulated model\n{}\n", self.history.join("\n")).into_bytes();
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CadError::Export(e.to_string()))?;
        }
        std::fs::write(path, bytes).map_err(|e| CadError::Export(e.to_string()))
    }
}
