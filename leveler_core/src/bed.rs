//! Print-bed model: grid geometry, corner mapping, and the assigned mesh.

use serde::Serialize;

use crate::error::{CalibError, Result};
use crate::mesh::Mesh;

/// One of the four screw-adjustable bed corners. Identity and grid
/// position never change after bed construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::FrontLeft,
        Corner::FrontRight,
        Corner::BackLeft,
        Corner::BackRight,
    ];

    /// Grid index of this corner for a `rows x cols` mesh.
    #[inline]
    pub fn index(self, rows: usize, cols: usize) -> (usize, usize) {
        match self {
            Corner::FrontLeft => (0, 0),
            Corner::FrontRight => (0, cols - 1),
            Corner::BackLeft => (rows - 1, 0),
            Corner::BackRight => (rows - 1, cols - 1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Corner::FrontLeft => "front_left",
            Corner::FrontRight => "front_right",
            Corner::BackLeft => "back_left",
            Corner::BackRight => "back_right",
        }
    }

    /// Localization key for the corner label.
    pub fn label_key(self) -> &'static str {
        match self {
            Corner::FrontLeft => "corner.front_left",
            Corner::FrontRight => "corner.front_right",
            Corner::BackLeft => "corner.back_left",
            Corner::BackRight => "corner.back_right",
        }
    }
}

impl std::fmt::Display for Corner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical bed geometry and mesh resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BedConfig {
    /// Bed size along X in mm
    pub size_x: f64,
    /// Bed size along Y in mm
    pub size_y: f64,
    /// Probed mesh points along X (grid rows)
    pub points_x: usize,
    /// Probed mesh points along Y (grid columns)
    pub points_y: usize,
}

impl Default for BedConfig {
    fn default() -> Self {
        Self {
            size_x: 220.0,
            size_y: 220.0,
            points_x: 5,
            points_y: 5,
        }
    }
}

impl From<&leveler_config::BedCfg> for BedConfig {
    fn from(cfg: &leveler_config::BedCfg) -> Self {
        Self {
            size_x: cfg.size_x,
            size_y: cfg.size_y,
            points_x: cfg.mesh_points_x,
            points_y: cfg.mesh_points_y,
        }
    }
}

impl BedConfig {
    /// Geometry for a parsed mesh profile; physical size comes from the
    /// probe bounds when the dump carries them, else the default bed.
    pub fn from_profile(profile: &leveler_config::MeshProfile) -> Self {
        let default = Self::default();
        let span_x = profile.max_x - profile.min_x;
        let span_y = profile.max_y - profile.min_y;
        Self {
            size_x: if span_x > 0.0 { span_x } else { default.size_x },
            size_y: if span_y > 0.0 { span_y } else { default.size_y },
            points_x: profile.rows(),
            points_y: profile.cols(),
        }
    }
}

/// Aggregate mesh statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeshStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Bed model: validated holder of the measured mesh.
#[derive(Debug, Clone)]
pub struct Bed {
    config: BedConfig,
    mesh: Option<Mesh>,
}

impl Bed {
    /// Point counts below 2 degenerate the mm-per-point spacing and the
    /// corner algorithms, so they are rejected here.
    pub fn new(config: BedConfig) -> Result<Self> {
        if config.points_x < 2 || config.points_y < 2 {
            return Err(CalibError::Config("bed mesh point counts must be >= 2").into());
        }
        if !(config.size_x > 0.0) || !(config.size_y > 0.0) {
            return Err(CalibError::Config("bed size must be > 0").into());
        }
        Ok(Self { config, mesh: None })
    }

    /// Build a bed directly from a parsed mesh profile.
    pub fn from_profile(profile: &leveler_config::MeshProfile) -> Result<Self> {
        let mut bed = Self::new(BedConfig::from_profile(profile))?;
        bed.set_mesh(Mesh::try_from(profile)?)?;
        Ok(bed)
    }

    #[inline]
    pub fn config(&self) -> &BedConfig {
        &self.config
    }

    /// Assign measured data; the shape must match the configured grid.
    pub fn set_mesh(&mut self, mesh: Mesh) -> Result<()> {
        if mesh.shape() != (self.config.points_x, self.config.points_y) {
            return Err(CalibError::ShapeMismatch {
                expected_rows: self.config.points_x,
                expected_cols: self.config.points_y,
                actual_rows: mesh.rows(),
                actual_cols: mesh.cols(),
            }
            .into());
        }
        self.mesh = Some(mesh);
        Ok(())
    }

    /// The assigned mesh, or `DataNotSet` before assignment.
    pub fn mesh(&self) -> Result<&Mesh> {
        self.mesh.as_ref().ok_or_else(|| CalibError::DataNotSet.into())
    }

    /// Mean height of the mesh sub-block within `radius` grid steps of the
    /// corner (inclusive, clamped to the grid). Radius 0 reads the single
    /// corner point.
    pub fn corner_height(&self, corner: Corner, radius: usize) -> Result<f64> {
        let mesh = self.mesh()?;
        Ok(corner_height_of(mesh, corner, radius))
    }

    pub fn mesh_stats(&self) -> Result<MeshStats> {
        let mesh = self.mesh()?;
        Ok(MeshStats {
            mean: mesh.mean(),
            min: mesh.min(),
            max: mesh.max(),
        })
    }

    pub fn point_height(&self, row: usize, col: usize) -> Result<f64> {
        let mesh = self.mesh()?;
        if row >= mesh.rows() || col >= mesh.cols() {
            return Err(CalibError::OutOfBounds { row, col }.into());
        }
        Ok(mesh.get(row, col))
    }

    /// Physical spacing between neighboring grid points, (mm/X-step,
    /// mm/Y-step).
    pub fn mm_per_point(&self) -> (f64, f64) {
        mm_per_point(&self.config)
    }

    /// Flat plane at the mesh's mean height.
    pub fn ideal_plane(&self) -> Result<Mesh> {
        Ok(self.mesh()?.ideal_plane())
    }

    /// Per-cell deviation from the ideal plane (positive above, negative
    /// below).
    pub fn deviation_map(&self) -> Result<Mesh> {
        let mesh = self.mesh()?;
        let mean = mesh.mean();
        Ok(mesh.offset(-mean))
    }
}

/// Corner block average over an arbitrary mesh; shared by the bed and the
/// stage calculators that thread simulated meshes.
pub(crate) fn corner_height_of(mesh: &Mesh, corner: Corner, radius: usize) -> f64 {
    let (r, c) = corner.index(mesh.rows(), mesh.cols());
    let r0 = r.saturating_sub(radius);
    let r1 = (r + radius + 1).min(mesh.rows());
    let c0 = c.saturating_sub(radius);
    let c1 = (c + radius + 1).min(mesh.cols());
    mesh.block_mean(r0, r1, c0, c1)
}

pub(crate) fn mm_per_point(config: &BedConfig) -> (f64, f64) {
    (
        config.size_x / (config.points_x - 1) as f64,
        config.size_y / (config.points_y - 1) as f64,
    )
}
