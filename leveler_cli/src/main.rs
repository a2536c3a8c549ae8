mod cli;
mod report;

use std::fs;
use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, FILE_GUARD};
use leveler_config::{MeshProfile, Settings};
use leveler_core::{Bed, DeviationAnalyzer, ScrewConfig, ScrewSolver, TapeCalculator};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();
    init_tracing(&args)?;

    let settings = load_settings(&args.config)?;
    settings.validate().wrap_err("invalid settings")?;

    match &args.cmd {
        Commands::Profiles { mesh_file } => run_profiles(mesh_file, args.json),
        Commands::Analyze { mesh_file, profile } => {
            run_analyze(mesh_file, profile.as_deref(), &settings, args.json)
        }
        Commands::Workflow { mesh_file, profile } => {
            run_workflow(mesh_file, profile.as_deref(), &settings, args.json)
        }
    }
}

fn init_tracing(args: &Cli) -> eyre::Result<()> {
    let filter = EnvFilter::try_new(&args.log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .wrap_err("build log filter")?;

    if let Some(path) = &args.log_file {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .wrap_err_with(|| format!("open log file {path:?}"))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Settings file is optional: a missing file means defaults, a present
/// but malformed file is an error.
fn load_settings(path: &Path) -> eyre::Result<Settings> {
    if !path.exists() {
        tracing::debug!(?path, "settings file absent, using defaults");
        return Ok(Settings::default());
    }
    let content =
        fs::read_to_string(path).wrap_err_with(|| format!("read settings {path:?}"))?;
    toml::from_str::<Settings>(&content).wrap_err_with(|| format!("parse settings {path:?}"))
}

/// Load all mesh profiles from the given file. `.csv` files hold one
/// headerless grid; anything else is parsed as a printer config dump.
fn load_profiles(path: &Path) -> eyre::Result<Vec<MeshProfile>> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    if is_csv {
        return Ok(vec![leveler_config::load_mesh_csv(path)?]);
    }

    let content = fs::read_to_string(path).wrap_err_with(|| format!("read mesh file {path:?}"))?;
    let profiles = leveler_config::parse_profiles(&content);
    if profiles.is_empty() {
        eyre::bail!("no mesh profiles found in {path:?}");
    }
    Ok(profiles.into_values().collect())
}

fn select_profile<'a>(
    profiles: &'a [MeshProfile],
    name: Option<&str>,
) -> eyre::Result<&'a MeshProfile> {
    let profile = match name {
        Some(name) => profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| eyre::eyre!("profile '{name}' not found"))?,
        None => &profiles[0],
    };
    leveler_config::validate_profile(profile)?;
    Ok(profile)
}

/// Build the calibration components against the profile's actual grid
/// shape; hardware and threshold values come from the settings record.
fn components(
    bed: &Bed,
    settings: &Settings,
) -> (DeviationAnalyzer, ScrewSolver, TapeCalculator) {
    let analyzer = DeviationAnalyzer::new(
        settings.hardware.corner_averaging,
        settings.thresholds.screw_threshold,
        settings.thresholds.tape_threshold,
        ScrewConfig::from(&settings.hardware),
    );
    let solver = ScrewSolver::new(
        bed.config().points_x,
        bed.config().points_y,
        ScrewConfig::from(&settings.hardware),
        settings.hardware.corner_averaging,
    );
    let tape = TapeCalculator::new(
        *bed.config(),
        settings.hardware.tape_thickness,
        settings.thresholds.tape_threshold,
    );
    (analyzer, solver, tape)
}

fn run_profiles(mesh_file: &Path, json: bool) -> eyre::Result<()> {
    let profiles = load_profiles(mesh_file)?;
    for profile in &profiles {
        let valid = leveler_config::validate_profile(profile).is_ok();
        if json {
            let line = serde_json::json!({
                "name": profile.name,
                "size": format!("{}x{}", profile.x_count, profile.y_count),
                "range_mm": profile.range_value(),
                "mean_mm": profile.mean_value(),
                "algo": profile.algo,
                "valid": valid,
            });
            println!("{line}");
        } else {
            println!(
                "{}: {}x{}, range {:.3}mm, mean {:.4}mm, algo {}{}",
                profile.name,
                profile.x_count,
                profile.y_count,
                profile.range_value(),
                profile.mean_value(),
                if profile.algo.is_empty() { "-" } else { &profile.algo },
                if valid { "" } else { " (INVALID)" },
            );
        }
    }
    Ok(())
}

fn run_analyze(
    mesh_file: &Path,
    profile_name: Option<&str>,
    settings: &Settings,
    json: bool,
) -> eyre::Result<()> {
    let profiles = load_profiles(mesh_file)?;
    let profile = select_profile(&profiles, profile_name)?;
    let bed = Bed::from_profile(profile)?;
    let (analyzer, solver, _) = components(&bed, settings);

    let stats = analyzer.stats(&bed)?;
    let stage = analyzer.leveling_stage(&bed)?;
    let forecast = analyzer.optimal_strategy(&bed, &solver)?;

    if json {
        report::print_analysis_json(&stats, &stage, &forecast)
    } else {
        report::print_analysis_text(&stats, &stage, &forecast);
        Ok(())
    }
}

fn run_workflow(
    mesh_file: &Path,
    profile_name: Option<&str>,
    settings: &Settings,
    json: bool,
) -> eyre::Result<()> {
    let profiles = load_profiles(mesh_file)?;
    let profile = select_profile(&profiles, profile_name)?;
    let bed = Bed::from_profile(profile)?;
    let (analyzer, solver, tape) = components(&bed, settings);

    let data = leveler_core::compute_workflow(&bed, &analyzer, &solver, &tape, settings)?;

    if json {
        report::print_workflow_json(&data)
    } else {
        report::print_workflow_text(&data);
        Ok(())
    }
}
