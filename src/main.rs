// src/main.rs
use std::error::Error;

use palletizer::config::AppConfig;
use palletizer::conveyor::{ConveyorSnapshot, conveyor_stream, load_boxes_csv, run_conveyor};
use palletizer::optimizer::{Heuristic, pack_boxes};
use palletizer::report::{Comparison, PackReport, write_json};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("⚠️ Could not load .env: {}", err);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("palletizer=info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let input = load_boxes_csv(&config.conveyor.input_file)?;
    println!(
        "📦 {} boxes loaded from {}",
        input.boxes.len(),
        config.conveyor.input_file.display()
    );
    if !input.skipped.is_empty() {
        println!("⚠️ {} records skipped", input.skipped.len());
    }

    let packing = config.packing_config();
    let policy = config.run.stability_policy;

    if config.run.compare {
        println!("🔄 Comparing all heuristics...");
        let tasks: Vec<_> = Heuristic::all(config.run.lookahead)
            .into_iter()
            .map(|heuristic| {
                let boxes = input.boxes.clone();
                tokio::task::spawn_blocking(move || pack_boxes(boxes, heuristic, &packing))
            })
            .collect();

        let mut reports = Vec::with_capacity(tasks.len());
        for task in tasks {
            let result = task.await??;
            reports.push(PackReport::from_result(&result, policy));
        }

        println!();
        println!("{}", Comparison(&reports));
        if let Some(path) = &config.run.report_path {
            write_json(reports.as_slice(), path)?;
            println!("💾 Comparison written to {}", path.display());
        }
        return Ok(());
    }

    let heuristic = config.heuristic()?;
    println!(
        "🔄 Starting conveyor simulation ({}, one box every {:.1} s)...",
        heuristic, config.conveyor.interval_seconds
    );
    let result = run_conveyor(
        conveyor_stream(input.boxes, config.conveyor.interval()),
        heuristic,
        packing,
        print_snapshot,
    )
    .await?;

    let report = PackReport::from_result(&result, policy);
    println!();
    println!("✅ Simulation complete");
    println!("{}", report);
    if let Some(path) = &config.run.report_path {
        report.write_json(path)?;
        println!("💾 Report written to {}", path.display());
    }
    Ok(())
}

fn print_snapshot(snapshot: &ConveyorSnapshot) {
    println!();
    println!(
        "⏳ Box {} arrived ({} so far)",
        snapshot.box_id, snapshot.arrived
    );
    println!(
        "📊 Pallets: {}, placed: {}, dropped: {}",
        snapshot.pallets, snapshot.placed, snapshot.unplaced
    );
    if let Some(metrics) = &snapshot.current_pallet {
        println!(
            "   Current pallet: {:.1}/{:.1} kg ({:.1}%), volume {:.1}%, height {:.1}/{:.1} cm",
            metrics.used_weight,
            metrics.max_weight,
            metrics.weight_percent,
            metrics.volume_percent,
            metrics.used_height,
            metrics.max_height
        );
    }
    if let Some(quality) = &snapshot.current_quality {
        println!("   Quality: {:.3}", quality.quality);
    }
}
