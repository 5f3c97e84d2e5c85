//! Push-Recovery Simulation Example
//!
//! Runs the stabilizer in single support against an impulse on the ankle
//! flexibility and writes the trajectory to CSV

use std::fs;

use anyhow::Context;
use flexstab::sim::{peak_error_during_impulse, recovery_time, rms_error, run_simulation, SimConfig};
use flexstab::StabilizerParams;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let params = match std::env::args().nth(1) {
        Some(path) => StabilizerParams::load(&path)
            .with_context(|| format!("failed to load parameters from {path}"))?,
        None => StabilizerParams::default(),
    };
    let config = SimConfig::default();

    println!("Running push-recovery simulation...\n");
    println!("Configuration:");
    println!("  Time step: {}", params.time_period);
    println!("  Total steps: {}", config.steps);
    println!("  Noise sigma: {}", config.sigma_noise);
    println!(
        "  Impulse start: {} (t={:.3})",
        config.impulse_start,
        config.impulse_start as f64 * params.time_period
    );
    println!("  Impulse duration: {} steps", config.impulse_duration);
    println!("  Impulse amplitude: {}", config.impulse_amplitude);
    println!();

    let results = run_simulation(&config, params)?;

    let errors: Vec<f64> = results.iter().map(|r| r.com_error).collect();
    let rms = rms_error(&errors);
    let peak = peak_error_during_impulse(
        &results,
        config.impulse_start,
        config.impulse_duration,
        |s| s.com_error,
    );
    let impulse_end = config.impulse_start + config.impulse_duration;
    let recovery_threshold = 0.002;
    let recovery = recovery_time(&results, impulse_end, recovery_threshold, |s| s.com_error);

    println!("METRICS SUMMARY");
    println!("===============");
    println!("  RMS COM error:          {rms:.6}");
    println!("  Peak error during push: {peak:.6}");
    println!("  Recovery (threshold={recovery_threshold}): {recovery} steps");

    fs::create_dir_all("out").context("failed to create output directory")?;
    let csv_path = "out/push_recovery.csv";
    let mut wtr = csv::Writer::from_path(csv_path)
        .with_context(|| format!("failed to open {csv_path}"))?;
    wtr.write_record([
        "t", "xi_x", "theta_x", "xi_y", "theta_y", "comdot_x", "comdot_y", "ddx", "ddy", "com_error",
    ])?;
    for step in &results {
        wtr.write_record(
            [
                step.t,
                step.xi_x,
                step.theta_x,
                step.xi_y,
                step.theta_y,
                step.comdot_x,
                step.comdot_y,
                step.ddx,
                step.ddy,
                step.com_error,
            ]
            .iter()
            .map(|v| format!("{v:.6}")),
        )?;
    }
    wtr.flush()?;

    let params_path = "out/push_recovery_params.toml";
    fs::write(params_path, params.to_toml_string()?)
        .with_context(|| format!("failed to write {params_path}"))?;

    println!("\nCSV output written to: {csv_path}");
    println!("Parameters written to: {params_path}");
    Ok(())
}
