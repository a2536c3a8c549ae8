//! Rendering of analysis and workflow results, as pretty text or JSON.

use leveler_core::{
    ActionKind, DeviationStats, LevelingStage, MetaValue, StageAction, StageResult,
    StrategyForecast, WorkflowData,
};

/// One JSON line per stage plus a closing summary line.
pub fn print_workflow_json(data: &WorkflowData) -> eyre::Result<()> {
    for stage in &data.stages {
        println!("{}", serde_json::to_string(stage)?);
    }
    let summary = serde_json::json!({
        "summary": {
            "best_stage": data.best,
            "best_deviation": data.best_stage().deviation,
            "active_thermal_model": data.active_thermal_model,
        }
    });
    println!("{summary}");
    Ok(())
}

pub fn print_workflow_text(data: &WorkflowData) {
    for stage in &data.stages {
        print_stage(stage, stage.key == data.best);
    }
    println!(
        "best stage: {} (deviation {:.3}mm)",
        data.best,
        data.best_stage().deviation
    );
}

fn print_stage(stage: &StageResult, is_best: bool) {
    let marker = if is_best { " *" } else { "" };
    let status = if stage.enabled { "" } else { " [disabled]" };
    match stage.baseline {
        Some(baseline) => println!(
            "{}{}{}: deviation {:.3}mm (was {:.3}mm)",
            stage.key, status, marker, stage.deviation, baseline
        ),
        None => println!(
            "{}{}{}: deviation {:.3}mm",
            stage.key, status, marker, stage.deviation
        ),
    }
    for action in &stage.actions {
        println!("  - {}", describe_action(action));
    }
    for warning in &stage.warnings {
        println!("  ({warning})");
    }
    if let Some(thermal) = &stage.thermal
        && thermal.warp_range > 0.0
    {
        println!(
            "  predicted warp range {:.4}mm (kappa {:.3e})",
            thermal.warp_range, thermal.kappa_total
        );
    }
}

fn describe_action(action: &StageAction) -> String {
    match action.kind {
        ActionKind::Belt => {
            let teeth = action.teeth.unwrap_or(0);
            let mm = action.magnitude_mm.unwrap_or(0.0);
            let direction = action.direction.as_deref().unwrap_or("?");
            format!(
                "belt {}: move {} by {} teeth ({:.2}mm)",
                action.identifier, direction, teeth, mm
            )
        }
        ActionKind::Screw => {
            let minutes = action.minutes.unwrap_or(0.0);
            let degrees = action.degrees.unwrap_or(0.0);
            let direction = action.direction.as_deref().unwrap_or("?");
            format!(
                "screw {}: turn {} {:.0} minutes ({:.0}\u{b0})",
                action.identifier, direction, minutes.round(), degrees.round()
            )
        }
        ActionKind::Tape => {
            let layers = match action.metadata.get("layers") {
                Some(MetaValue::Int(n)) => n.to_string(),
                _ => "?".to_owned(),
            };
            let deficit = action.magnitude_mm.unwrap_or(0.0);
            format!(
                "tape {}: apply {} layer(s) to fill {:.3}mm",
                action.identifier, layers, deficit
            )
        }
    }
}

pub fn print_analysis_text(
    stats: &DeviationStats,
    stage: &LevelingStage,
    forecast: &StrategyForecast,
) {
    println!("mean height: {:.4}mm", stats.mean_height);
    println!(
        "max corner deviation: {:.3}mm{}",
        stats.max_deviation,
        if stats.has_critical_deviation {
            " (critical)"
        } else {
            ""
        }
    );
    for (corner, deviation) in &stats.corner_deviations {
        println!("  {corner}: {deviation:.3}mm");
    }
    println!(
        "corner spread: {:.3}mm ({})",
        stage.max_corner_diff,
        if stage.can_use_screws {
            "screw-correctable"
        } else {
            "beyond screw range"
        }
    );
    println!(
        "needs screws: {}, needs tape: {}",
        stage.needs_screw_adjustment, stage.needs_tape
    );
    println!(
        "forecast: {:.3}mm -> {:.3}mm after screws, expected final {:.3}mm{}",
        forecast.original_deviation,
        forecast.deviation_after_screws,
        forecast.expected_final_deviation,
        if forecast.needs_tape { " (with tape)" } else { "" }
    );
}

pub fn print_analysis_json(
    stats: &DeviationStats,
    stage: &LevelingStage,
    forecast: &StrategyForecast,
) -> eyre::Result<()> {
    let value = serde_json::json!({
        "stats": stats,
        "leveling_stage": stage,
        "forecast": forecast,
    });
    println!("{}", serde_json::to_string(&value)?);
    Ok(())
}
