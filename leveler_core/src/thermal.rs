//! Thermal warp prediction: bimetallic-plate curvature for a PEI sheet
//! bonded to a steel base, plus a uniform bulk-expansion term and a
//! legacy single-coefficient fallback.

use leveler_config::{EnvironmentCfg, ThermalModelCfg};
use serde::Serialize;

use crate::bed::{BedConfig, mm_per_point};
use crate::mesh::Mesh;

/// Ratio of PEI to steel elastic moduli (approx. 3.3 GPa / 200 GPa).
const MODULUS_RATIO: f64 = 3.3e9 / 200e9;

/// Typed record of one thermal computation, attached to the temperature
/// stage for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThermalBreakdown {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub measurement_temp: f64,
    pub target_temp: f64,
    pub chamber_factor: f64,
    pub chamber_temp: f64,
    pub pei_thickness: f64,
    pub steel_thickness: f64,
    pub alpha_pei: f64,
    pub alpha_steel: f64,
    pub beta_uniform: f64,
    /// Surface-vs-chamber temperature split driving the bimetal term
    pub delta_through: f64,
    /// Chamber-vs-measurement delta driving the uniform term
    pub delta_uniform: f64,
    pub x_step: f64,
    pub y_step: f64,
    pub kappa_bimetal: f64,
    pub kappa_uniform: f64,
    pub kappa_total: f64,
    pub warp_min: f64,
    pub warp_max: f64,
    pub warp_range: f64,
}

/// Predicts the radially-symmetric bed deformation between the
/// measurement temperature and the print temperature.
#[derive(Debug, Clone)]
pub struct ThermalWarpModel {
    env: EnvironmentCfg,
    model: Option<ThermalModelCfg>,
}

impl ThermalWarpModel {
    pub fn new(env: EnvironmentCfg, model: Option<ThermalModelCfg>) -> Self {
        Self { env, model }
    }

    pub fn from_settings(settings: &leveler_config::Settings) -> Self {
        Self::new(settings.environment, settings.thermal_model.clone())
    }

    /// Add the predicted warp field to `mesh` and report the coefficient
    /// breakdown. The input is never modified; a no-op prediction returns
    /// an identical copy.
    pub fn apply(&self, bed_config: &BedConfig, mesh: &Mesh) -> (Mesh, ThermalBreakdown) {
        let model = self.model.clone().unwrap_or_default();
        let has_model = self.model.is_some();

        let measurement_temp = model
            .measurement_temp
            .unwrap_or(self.env.measurement_temp);
        let target_temp = model
            .target_temp
            .unwrap_or_else(|| self.env.target_temp.unwrap_or(measurement_temp));

        let mut info = ThermalBreakdown {
            name: model.name.clone(),
            measurement_temp,
            target_temp,
            ..ThermalBreakdown::default()
        };

        if (target_temp - measurement_temp).abs() < 1e-3 && !has_model {
            return (mesh.clone(), info);
        }

        let alpha_pei = model.alpha_pei.unwrap_or(self.env.thermal_expansion_coeff);
        let alpha_steel = model
            .alpha_steel
            .unwrap_or(self.env.thermal_expansion_coeff);

        let total_top_delta = target_temp - measurement_temp;
        let chamber_temp = measurement_temp + model.chamber_factor * total_top_delta;
        let delta_through = target_temp - chamber_temp;
        let delta_uniform = chamber_temp - measurement_temp;

        info.chamber_factor = model.chamber_factor;
        info.chamber_temp = chamber_temp;
        info.pei_thickness = model.pei_thickness;
        info.steel_thickness = model.steel_thickness;
        info.alpha_pei = alpha_pei;
        info.alpha_steel = alpha_steel;
        info.beta_uniform = model.beta_uniform;
        info.delta_through = delta_through;
        info.delta_uniform = delta_uniform;

        if delta_through.abs() < 1e-6 && delta_uniform.abs() < 1e-6 && !has_model {
            return (mesh.clone(), info);
        }

        let (x_step, y_step) = mm_per_point(bed_config);
        info.x_step = x_step;
        info.y_step = y_step;

        let center_x = bed_config.size_x / 2.0;
        let center_y = bed_config.size_y / 2.0;
        let radius_sq = |r: usize, c: usize| {
            let x = r as f64 * x_step - center_x;
            let y = c as f64 * y_step - center_y;
            x * x + y * y
        };

        let rows = mesh.rows();
        let cols = mesh.cols();
        let mut warp = Mesh::filled_unchecked(rows, cols, 0.0);

        let total_thickness = (model.pei_thickness + model.steel_thickness).max(1e-6);
        let mut kappa_bimetal = 0.0;
        let mut kappa_uniform = 0.0;
        let mut kappa_fallback = 0.0;

        if delta_through.abs() > 1e-6
            && model.pei_thickness > 0.0
            && model.steel_thickness > 0.0
            && (alpha_pei - alpha_steel).abs() > 1e-12
        {
            let rho = model.pei_thickness / model.steel_thickness;
            let stiffness =
                1.0 + 4.0 * rho + 6.0 * rho.powi(2) + 4.0 * rho.powi(3) + rho.powi(4);
            let coupling =
                1.0 + (MODULUS_RATIO * rho.powi(2) * (1.0 + rho).powi(2)) / stiffness.max(1e-6);
            let numerator = 6.0 * (alpha_pei - alpha_steel) * delta_through;
            let denom = model.steel_thickness * (1.0 + rho).powi(2) * stiffness.max(1e-6);
            kappa_bimetal = (numerator / denom) / coupling;
            for r in 0..rows {
                for c in 0..cols {
                    warp.set(r, c, warp.get(r, c) + 0.5 * kappa_bimetal * radius_sq(r, c));
                }
            }
        }

        if delta_uniform.abs() > 1e-6 && alpha_steel.abs() > 1e-12 {
            kappa_uniform = model.beta_uniform * alpha_steel * delta_uniform / total_thickness;
            for r in 0..rows {
                for c in 0..cols {
                    warp.set(r, c, warp.get(r, c) + 0.5 * kappa_uniform * radius_sq(r, c));
                }
            }
        }

        if warp.values().iter().all(|&v| v == 0.0) {
            // Plate terms produced nothing: fall back to the plain linear
            // expansion model scaled by r^2 / r_max^2.
            let coeff = self.env.thermal_expansion_coeff;
            let delta_temp = target_temp - measurement_temp;
            if delta_temp.abs() < 1e-3 || coeff.abs() < 1e-9 {
                return (mesh.clone(), info);
            }
            let max_radius_sq = center_x * center_x + center_y * center_y;
            if max_radius_sq <= 0.0 {
                return (mesh.clone(), info);
            }
            for r in 0..rows {
                for c in 0..cols {
                    warp.set(r, c, coeff * delta_temp * radius_sq(r, c) / max_radius_sq);
                }
            }
            kappa_fallback = 2.0 * coeff * delta_temp / max_radius_sq;
        }

        // Re-center: the prediction redistributes height, it never shifts
        // the bed mean.
        let warp_mean = warp.mean();
        let warp = warp.offset(-warp_mean);

        info.kappa_bimetal = kappa_bimetal;
        info.kappa_uniform = kappa_uniform;
        info.kappa_total = kappa_bimetal + kappa_uniform + kappa_fallback;
        info.warp_min = warp.min();
        info.warp_max = warp.max();
        info.warp_range = info.warp_max - info.warp_min;

        tracing::debug!(
            kappa_bimetal,
            kappa_uniform,
            warp_range = info.warp_range,
            "thermal warp computed"
        );

        let warped = mesh
            .plus(&warp)
            .unwrap_or_else(|_| mesh.clone());
        (warped, info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bed::BedConfig;

    fn flat_mesh() -> Mesh {
        Mesh::filled(5, 5, 0.0).unwrap()
    }

    fn env(measurement: f64, target: f64, coeff: f64) -> EnvironmentCfg {
        EnvironmentCfg {
            measurement_temp: measurement,
            target_temp: Some(target),
            thermal_expansion_coeff: coeff,
        }
    }

    #[test]
    fn no_delta_and_no_model_is_a_no_op() {
        let model = ThermalWarpModel::new(env(25.0, 25.0, 1e-5), None);
        let (warped, info) = model.apply(&BedConfig::default(), &flat_mesh());
        assert!(warped.bitwise_eq(&flat_mesh()));
        assert_eq!(info.kappa_total, 0.0);
    }

    #[test]
    fn bimetal_curvature_bows_the_bed_radially() {
        let cfg = ThermalModelCfg {
            chamber_factor: 0.5,
            alpha_pei: Some(5.6e-5),
            alpha_steel: Some(1.2e-5),
            ..ThermalModelCfg::default()
        };
        let model = ThermalWarpModel::new(env(25.0, 60.0, 1.2e-5), Some(cfg));
        let (warped, info) = model.apply(&BedConfig::default(), &flat_mesh());

        assert!(info.kappa_bimetal != 0.0);
        assert!(info.warp_range > 0.0);
        // zero-mean warp field
        assert!(warped.mean().abs() < 1e-9);
        // radially symmetric: all four corners see the same height
        let c = warped.get(0, 0);
        assert!((warped.get(0, 4) - c).abs() < 1e-12);
        assert!((warped.get(4, 0) - c).abs() < 1e-12);
        assert!((warped.get(4, 4) - c).abs() < 1e-12);
    }

    #[test]
    fn equal_alphas_leave_only_the_uniform_term() {
        let cfg = ThermalModelCfg {
            chamber_factor: 0.5,
            alpha_pei: Some(1.2e-5),
            alpha_steel: Some(1.2e-5),
            ..ThermalModelCfg::default()
        };
        let model = ThermalWarpModel::new(env(25.0, 60.0, 1.2e-5), Some(cfg));
        let (_, info) = model.apply(&BedConfig::default(), &flat_mesh());
        assert_eq!(info.kappa_bimetal, 0.0);
        assert!(info.kappa_uniform != 0.0);
    }

    #[test]
    fn legacy_fallback_uses_environment_coefficient() {
        // No plate model; warp comes from the plain expansion coefficient.
        let model = ThermalWarpModel::new(env(25.0, 60.0, 1e-4), None);
        let (warped, info) = model.apply(&BedConfig::default(), &flat_mesh());
        assert_eq!(info.kappa_bimetal, 0.0);
        assert_eq!(info.kappa_uniform, 0.0);
        assert!(info.kappa_total != 0.0);
        assert!(warped.span() > 0.0);
        assert!(warped.mean().abs() < 1e-9);
    }

    #[test]
    fn zero_coefficient_fallback_is_a_no_op() {
        let model = ThermalWarpModel::new(env(25.0, 60.0, 0.0), None);
        let (warped, info) = model.apply(&BedConfig::default(), &flat_mesh());
        assert!(warped.bitwise_eq(&flat_mesh()));
        assert_eq!(info.kappa_total, 0.0);
    }
}
