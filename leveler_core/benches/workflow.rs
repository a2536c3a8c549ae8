use criterion::{Criterion, black_box, criterion_group, criterion_main};
use leveler_config::Settings;
use leveler_core::{Bed, BedConfig, DeviationAnalyzer, Mesh, ScrewSolver, TapeCalculator};

// Synthetic probed mesh: a tilted plane with deterministic pseudo-noise.
fn synth_mesh(rows: usize, cols: usize, seed: u32) -> Vec<f64> {
    // tiny PRNG
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x as u16) / f64::from(u16::MAX)
    };
    let mut values = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let tilt = 0.03 * r as f64 - 0.02 * c as f64;
            let noise = (next_f64() * 2.0 - 1.0) * 0.05;
            values.push(tilt + noise);
        }
    }
    values
}

fn bed_of(rows: usize, cols: usize, settings: &mut Settings) -> Bed {
    settings.bed.mesh_points_x = rows;
    settings.bed.mesh_points_y = cols;
    let mut bed = Bed::new(BedConfig::from(&settings.bed)).expect("bed");
    bed.set_mesh(Mesh::from_values(rows, cols, synth_mesh(rows, cols, 7)).expect("mesh"))
        .expect("shape");
    bed
}

pub fn bench_workflow(c: &mut Criterion) {
    for (rows, cols) in [(5usize, 5usize), (11, 11), (15, 15)] {
        let mut settings = Settings::default();
        let bed = bed_of(rows, cols, &mut settings);
        let analyzer = DeviationAnalyzer::from_settings(&settings);
        let solver = ScrewSolver::from_settings(&settings);
        let tape = TapeCalculator::from_settings(&settings);

        c.bench_function(&format!("workflow_{rows}x{cols}"), |b| {
            b.iter(|| {
                let data = leveler_core::compute_workflow(
                    black_box(&bed),
                    &analyzer,
                    &solver,
                    &tape,
                    &settings,
                )
                .expect("workflow");
                black_box(data.best_stage().deviation)
            })
        });
    }
}

pub fn bench_weight_maps(c: &mut Criterion) {
    c.bench_function("corner_weights_15x15", |b| {
        b.iter(|| black_box(leveler_core::solver::CornerWeights::build(15, 15)))
    });
}

criterion_group!(benches, bench_workflow, bench_weight_maps);
criterion_main!(benches);
