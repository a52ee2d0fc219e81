//! Command-line front end: list models, check the service, look up targets
//! and classify light curves.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use exoscope::app::{App, CancelHandle};
use exoscope::config::GatewayConfig;
use exoscope::data::model::ClassificationResult;
use exoscope::gateway::catalog::archive_links;
use exoscope::gateway::ClassificationGateway;

enum Command {
    Models,
    Health,
    Target(String),
    Classify(ClassifyArgs),
}

enum Source {
    File(PathBuf),
    Target(String),
}

struct ClassifyArgs {
    source: Source,
    model: Option<String>,
    threshold: Option<f64>,
    charts_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let command = parse_args(std::env::args().skip(1).collect())?;
    let config = GatewayConfig::from_env();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(run(command, config))
}

async fn run(command: Command, config: GatewayConfig) -> Result<()> {
    match command {
        Command::Models => {
            let app = App::from_config(&config)?;
            for model in app.refresh_models().await {
                let m = &model.metrics;
                println!(
                    "- {} | {} | precision={:.2} recall={:.2} f1={:.2}",
                    model.id, model.name, m.precision, m.recall, m.f1
                );
                println!("    {}", model.description);
            }
            Ok(())
        }
        Command::Health => {
            let gateway = ClassificationGateway::new(config)?;
            let health = gateway.health().await.context("checking service health")?;
            println!("status: {}", health.status);
            for (family, loaded) in &health.models_loaded {
                println!("  {family}: {}", if *loaded { "loaded" } else { "not loaded" });
            }
            Ok(())
        }
        Command::Target(id) => {
            let app = App::from_config(&config)?;
            let result = app.search_target(&id).await;
            print_log(&app);
            let metadata = result.with_context(|| format!("looking up {id}"))?;
            println!();
            println!("Target:    {id}");
            println!("Mission:   {}", metadata.mission);
            println!("RA / Dec:  {} / {}", metadata.ra, metadata.dec);
            println!("Magnitude: {}", metadata.magnitude);
            print_links(&id);
            Ok(())
        }
        Command::Classify(args) => classify(args, &config).await,
    }
}

async fn classify(args: ClassifyArgs, config: &GatewayConfig) -> Result<()> {
    let app = App::from_config(config)?;
    app.refresh_models().await;
    if let Some(model) = &args.model {
        app.select_model(model);
    }
    if let Some(threshold) = args.threshold {
        app.set_threshold(threshold)?;
    }

    let loaded = match &args.source {
        Source::File(path) => app.load_csv_file(path).await.map(|_| ()),
        Source::Target(id) => app.search_target(id).await.map(|_| ()),
    };
    if let Err(err) = loaded {
        print_log(&app);
        return Err(err).context("loading data");
    }

    let outcome = run_cancellable(&app).await;
    print_log(&app);
    let Some(result) = outcome.context("classification")? else {
        println!("Classification cancelled.");
        return Ok(());
    };

    println!();
    print_result(&result);
    if let Source::Target(id) = &args.source {
        print_links(id);
    }
    if let Some(path) = &args.charts_out {
        write_charts(&app, path)?;
        println!("\nCharts written to {}", path.display());
    }
    Ok(())
}

/// Ctrl-C cancels the running classification.
async fn run_cancellable(app: &App) -> exoscope::error::Result<Option<ClassificationResult>> {
    let cancel = CancelHandle::new();
    let run = app.run_classification(&cancel);
    tokio::pin!(run);
    loop {
        tokio::select! {
            outcome = &mut run => return outcome,
            signal = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                match signal {
                    Ok(()) => cancel.cancel(),
                    Err(err) => {
                        log::warn!("cannot listen for Ctrl-C: {err}");
                        return (&mut run).await;
                    }
                }
            }
        }
    }
}

fn print_result(result: &ClassificationResult) {
    let p = &result.probabilities;
    println!("Prediction: {} ({:.1}% confidence)", result.prediction, result.confidence * 100.0);
    println!(
        "  confirmed={:.3} candidate={:.3} not a planet={:.3}",
        p.confirmed, p.candidate, p.not_planet
    );
    let explain = &result.explainability;
    if !explain.feature_importance.is_empty() {
        println!("Feature importance:");
        for f in &explain.feature_importance {
            println!("  {:<26} {:.2}", f.feature, f.importance);
        }
    }
    for reason in &explain.rationale {
        println!("  * {reason}");
    }
}

fn print_links(target_id: &str) {
    for link in archive_links(target_id) {
        println!("{}: {}", link.name, link.url);
    }
}

/// Run log, oldest first.
fn print_log(app: &App) {
    app.with_state(|state| {
        let entries: Vec<_> = state.logs().entries().collect();
        for entry in entries.into_iter().rev() {
            println!("{entry}");
        }
    });
}

fn write_charts(app: &App, path: &Path) -> Result<()> {
    let json = app.with_state(|state| state.charts().map(serde_json::to_string_pretty));
    let Some(json) = json else {
        bail!("no charts to write");
    };
    let json = json.context("serialising charts")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn parse_args(args: Vec<String>) -> Result<Command> {
    let Some(command) = args.first() else {
        bail!(help_text());
    };
    let rest = &args[1..];
    match command.as_str() {
        "models" => Ok(Command::Models),
        "health" => Ok(Command::Health),
        "target" => {
            if rest.is_empty() {
                bail!("target requires an id, e.g. \"KIC 8462852\"");
            }
            Ok(Command::Target(rest.join(" ")))
        }
        "classify" => parse_classify(rest).map(Command::Classify),
        "-h" | "--help" | "help" => bail!(help_text()),
        other => bail!("Unknown command: {other}\n\n{}", help_text()),
    }
}

fn parse_classify(args: &[String]) -> Result<ClassifyArgs> {
    let mut file = None;
    let mut target = None;
    let mut model = None;
    let mut threshold = None;
    let mut charts_out = None;
    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        let mut value = || {
            idx += 1;
            args.get(idx)
                .cloned()
                .with_context(|| format!("{flag} requires a value"))
        };
        match flag {
            "--target" => target = Some(value()?),
            "--model" => model = Some(value()?),
            "--threshold" => {
                let raw = value()?;
                let t: f64 = raw
                    .parse()
                    .with_context(|| format!("invalid threshold: {raw}"))?;
                threshold = Some(t);
            }
            "--charts-out" => charts_out = Some(PathBuf::from(value()?)),
            other if other.starts_with("--") => bail!("Unknown flag: {other}"),
            path => {
                if file.is_some() {
                    bail!("only one input file can be classified at a time");
                }
                file = Some(PathBuf::from(path));
            }
        }
        idx += 1;
    }

    let source = match (file, target) {
        (Some(path), None) => Source::File(path),
        (None, Some(id)) => Source::Target(id),
        (Some(_), Some(_)) => bail!("give either a CSV file or --target, not both"),
        (None, None) => bail!("classify needs a CSV file or --target <id>"),
    };
    Ok(ClassifyArgs {
        source,
        model,
        threshold,
        charts_out,
    })
}

fn help_text() -> String {
    [
        "Usage:",
        "  exoscope models",
        "  exoscope health",
        "  exoscope target <id>",
        "  exoscope classify <file.csv | --target <id>> [--model <id>] [--threshold <0..1>] [--charts-out <path.json>]",
        "",
        "Environment:",
        "  EXOSCOPE_API_URL, EXOSCOPE_OFFLINE=1, RUST_LOG=info",
    ]
    .join("\n")
}
