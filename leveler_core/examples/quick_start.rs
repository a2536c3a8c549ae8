//! Minimal end-to-end run: build a bed from raw values, compute the
//! workflow, print the recommended actions.
//!
//! Run with: cargo run -p leveler_core --example quick_start

use leveler_config::Settings;
use leveler_core::{Bed, BedConfig, DeviationAnalyzer, Mesh, ScrewSolver, TapeCalculator};

fn main() -> eyre::Result<()> {
    // A 5x5 probe with a high front-left corner and a mid-bed dip.
    let mut values = vec![0.0; 25];
    values[0] = 0.45;
    values[2 * 5 + 2] = -0.2;

    let mut bed = Bed::new(BedConfig::default())?;
    bed.set_mesh(Mesh::from_values(5, 5, values)?)?;

    let settings = Settings::default();
    let analyzer = DeviationAnalyzer::from_settings(&settings);
    let solver = ScrewSolver::from_settings(&settings);
    let tape = TapeCalculator::from_settings(&settings);

    let data = leveler_core::compute_workflow(&bed, &analyzer, &solver, &tape, &settings)?;

    for stage in &data.stages {
        println!(
            "{}: deviation {:.3}mm, {} action(s){}",
            stage.key,
            stage.deviation,
            stage.actions.len(),
            if stage.enabled { "" } else { " [disabled]" }
        );
    }
    println!("best: {}", data.best);
    Ok(())
}
