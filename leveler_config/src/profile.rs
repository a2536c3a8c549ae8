//! Mesh profile ingestion.
//!
//! Printer configuration dumps (Klipper/Centaur style, no `#*#` prefixes)
//! store probed meshes in sections named `besh_profile_<name>` or
//! `bed_mesh_profile_<name>`:
//!
//! ```text
//! [besh_profile_standard_default]
//! version : 1
//! points : v1, v2, v3, ...
//! x_count : 11
//! y_count : 11
//! mesh_min : 20.0, 20.0
//! mesh_max : 246.0, 246.0
//! algo : bicubic
//! ```
//!
//! Grid size comes from `x_count`/`y_count` when present, otherwise from
//! `isqrt(len(points))` (firmware maps without counts are always square).
//! A malformed profile is skipped with a warning; it never fails the
//! surrounding parse.

use std::collections::BTreeMap;
use std::path::Path;

/// One named height-deviation map extracted from a config dump.
///
/// `points` is row-major with `y_count` rows of `x_count` values, matching
/// the firmware dump order.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshProfile {
    pub name: String,
    pub points: Vec<f64>,
    pub x_count: usize,
    pub y_count: usize,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    /// Interpolation algorithm declared by the firmware (bicubic/lagrange)
    pub algo: String,
}

impl MeshProfile {
    #[inline]
    pub fn rows(&self) -> usize {
        self.y_count
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.x_count
    }

    pub fn min_value(&self) -> f64 {
        self.points.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_value(&self) -> f64 {
        self.points
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Height span across the profile, the primary badness metric.
    pub fn range_value(&self) -> f64 {
        self.max_value() - self.min_value()
    }

    pub fn mean_value(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().sum::<f64>() / self.points.len() as f64
    }
}

const MESH_PREFIXES: [&str; 2] = ["besh_profile_", "bed_mesh_profile_"];

/// Probed bed deviations never exceed a few mm; anything beyond this is a
/// corrupt dump.
const MAX_PLAUSIBLE_DEVIATION_MM: f64 = 10.0;

/// Parse a full config dump and return every mesh profile found, keyed by
/// profile name. Sections that are not mesh profiles are ignored;
/// malformed profiles are skipped with a warning.
pub fn parse_profiles(content: &str) -> BTreeMap<String, MeshProfile> {
    let sections = split_sections(content);
    let mut profiles = BTreeMap::new();

    for (section_name, params) in &sections {
        let Some(profile_name) = extract_profile_name(section_name) else {
            continue;
        };
        match build_profile(profile_name, params) {
            Ok(profile) => {
                profiles.insert(profile.name.clone(), profile);
            }
            Err(e) => {
                tracing::warn!(profile = profile_name, error = %e, "skipping mesh profile");
            }
        }
    }

    profiles
}

/// Check a parsed profile against the declared grid shape and plausible
/// value ranges.
pub fn validate_profile(profile: &MeshProfile) -> eyre::Result<()> {
    let expected = profile.x_count * profile.y_count;
    if profile.points.len() != expected {
        eyre::bail!(
            "profile '{}' has {} points, expected {}x{}={}",
            profile.name,
            profile.points.len(),
            profile.x_count,
            profile.y_count,
            expected
        );
    }
    if profile.points.iter().any(|v| !v.is_finite()) {
        eyre::bail!("profile '{}' contains non-finite values", profile.name);
    }
    if profile
        .points
        .iter()
        .any(|v| v.abs() > MAX_PLAUSIBLE_DEVIATION_MM)
    {
        eyre::bail!(
            "profile '{}' contains deviations beyond {}mm",
            profile.name,
            MAX_PLAUSIBLE_DEVIATION_MM
        );
    }
    Ok(())
}

/// Load a headerless rectangular float grid from CSV. The profile name is
/// the file stem; physical bounds are unknown (zero) for CSV input.
pub fn load_mesh_csv(path: &Path) -> eyre::Result<MeshProfile> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open mesh CSV {:?}: {}", path, e))?;

    let mut points = Vec::new();
    let mut cols: Option<usize> = None;
    let mut rows = 0usize;

    for (idx, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 1, e))?;
        let width = rec.len();
        match cols {
            None => cols = Some(width),
            Some(c) if c != width => {
                eyre::bail!("ragged CSV: row {} has {} values, expected {}", idx + 1, width, c);
            }
            Some(_) => {}
        }
        for field in rec.iter() {
            let v: f64 = field
                .trim()
                .parse()
                .map_err(|e| eyre::eyre!("invalid value {:?} in row {}: {}", field, idx + 1, e))?;
            points.push(v);
        }
        rows += 1;
    }

    let cols = cols.unwrap_or(0);
    if rows == 0 || cols == 0 {
        eyre::bail!("mesh CSV {:?} is empty", path);
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("csv")
        .to_owned();

    Ok(MeshProfile {
        name,
        points,
        x_count: cols,
        y_count: rows,
        min_x: 0.0,
        max_x: 0.0,
        min_y: 0.0,
        max_y: 0.0,
        algo: String::new(),
    })
}

fn split_sections(content: &str) -> Vec<(String, BTreeMap<String, String>)> {
    let mut sections: Vec<(String, BTreeMap<String, String>)> = Vec::new();
    let mut current: Option<(String, BTreeMap<String, String>)> = None;

    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // Strip inline comments
        if let Some(pos) = line.find('#') {
            line = line[..pos].trim();
        }
        if line.is_empty() {
            continue;
        }

        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            current = Some((section.trim().to_lowercase(), BTreeMap::new()));
            continue;
        }

        let Some((_, params)) = current.as_mut() else {
            continue;
        };
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase();
            if key.is_empty() || key.starts_with('#') {
                continue;
            }
            let value = value.trim().to_owned();
            // `points` may continue across repeated keys
            if key == "points" && params.contains_key("points") {
                let joined = format!("{}, {}", params["points"], value);
                params.insert(key, joined);
            } else {
                params.insert(key, value);
            }
        }
    }

    if let Some(done) = current.take() {
        sections.push(done);
    }
    sections
}

fn extract_profile_name(section_name: &str) -> Option<&str> {
    for prefix in MESH_PREFIXES {
        if let Some(rest) = section_name.strip_prefix(prefix) {
            return Some(if rest.is_empty() { "default" } else { rest });
        }
    }
    None
}

fn build_profile(name: &str, params: &BTreeMap<String, String>) -> eyre::Result<MeshProfile> {
    let raw_points = params
        .get("points")
        .ok_or_else(|| eyre::eyre!("missing 'points' field"))?;

    let points: Vec<f64> = raw_points
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| eyre::eyre!("invalid point value {:?}: {}", s, e))
        })
        .collect::<eyre::Result<_>>()?;
    if points.is_empty() {
        eyre::bail!("empty 'points' list");
    }

    let (x_count, y_count) = resolve_grid_size(params, points.len())?;
    let expected = x_count * y_count;
    if expected != points.len() {
        eyre::bail!(
            "size mismatch: {}x{}={} does not match {} points",
            x_count,
            y_count,
            expected,
            points.len()
        );
    }

    let (min_x, min_y, max_x, max_y) = resolve_bounds(params);
    let algo = params
        .get("algo")
        .or_else(|| params.get("algorithm"))
        .cloned()
        .unwrap_or_default();

    Ok(MeshProfile {
        name: name.to_owned(),
        points,
        x_count,
        y_count,
        min_x,
        max_x,
        min_y,
        max_y,
        algo,
    })
}

fn resolve_grid_size(
    params: &BTreeMap<String, String>,
    n_points: usize,
) -> eyre::Result<(usize, usize)> {
    let x_str = params.get("x_count");
    let y_str = params.get("y_count");

    if let (Some(x), Some(y)) = (x_str, y_str) {
        // Some firmwares write counts as floats ("11.0")
        let x = x
            .parse::<f64>()
            .map_err(|e| eyre::eyre!("invalid x_count {:?}: {}", x, e))? as usize;
        let y = y
            .parse::<f64>()
            .map_err(|e| eyre::eyre!("invalid y_count {:?}: {}", y, e))? as usize;
        return Ok((x, y));
    }

    // Square-map fallback
    let side = (n_points as f64).sqrt().round() as usize;
    if side * side != n_points {
        eyre::bail!(
            "no x_count/y_count and {} points is not a perfect square",
            n_points
        );
    }
    Ok((side, side))
}

fn resolve_bounds(params: &BTreeMap<String, String>) -> (f64, f64, f64, f64) {
    let parse_pair = |s: &str| -> Option<(f64, f64)> {
        let mut it = s.split(',').map(str::trim);
        let a = it.next()?.parse().ok()?;
        let b = it.next()?.parse().ok()?;
        Some((a, b))
    };

    if let (Some(mn), Some(mx)) = (params.get("mesh_min"), params.get("mesh_max"))
        && let (Some((min_x, min_y)), Some((max_x, max_y))) = (parse_pair(mn), parse_pair(mx))
    {
        return (min_x, min_y, max_x, max_y);
    }

    let get = |primary: &str, alias: &str| -> f64 {
        params
            .get(primary)
            .or_else(|| params.get(alias))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0)
    };
    (
        get("min_x", "x_min"),
        get("min_y", "y_min"),
        get("max_x", "x_max"),
        get("max_y", "y_max"),
    )
}
