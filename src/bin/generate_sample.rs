//! Write a synthetic light curve with a periodic transit to CSV.
//!
//! Usage: generate_sample [output.csv] [--seed N]

use anyhow::{bail, Context, Result};
use exoscope::gateway::catalog::synthetic_light_curve;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() -> Result<()> {
    env_logger::init();

    let mut output = String::from("sample_lightcurve.csv");
    let mut seed = 42u64;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seed" => {
                let raw = args.next().context("--seed requires a value")?;
                seed = raw.parse().with_context(|| format!("invalid seed: {raw}"))?;
            }
            flag if flag.starts_with("--") => bail!("Unknown flag: {flag}"),
            path => output = path.to_string(),
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let points = synthetic_light_curve(&mut rng);

    let mut writer = csv::Writer::from_path(&output).with_context(|| format!("creating {output}"))?;
    writer.write_record(["time", "flux", "flux_err"])?;
    for p in &points {
        let flux_err = p.flux_error.map(|e| e.to_string()).unwrap_or_default();
        writer
            .write_record([format!("{:.2}", p.time), format!("{:.6}", p.flux), flux_err])
            .context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;

    log::info!("seed {seed}");
    println!("Wrote {} light-curve points to {output}", points.len());
    Ok(())
}
