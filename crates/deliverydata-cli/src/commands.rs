//! Subcommand implementations

use anyhow::Context;
use deliverydata::{dump_dataset, summarize, ConversionConfig, DeliveryData, DeliveryDataConverter};
use dicom::object::{open_file, DefaultDicomObject};
use std::fs;
use std::path::Path;
use std::process::ExitCode;

fn read_plan(path: &Path) -> anyhow::Result<DefaultDicomObject> {
    open_file(path).with_context(|| format!("failed to read DICOM file {}", path.display()))
}

pub(crate) fn extract(plan: &Path, output: Option<&Path>) -> anyhow::Result<ExitCode> {
    let file = read_plan(plan)?;
    let data = DeliveryDataConverter::default()
        .to_delivery_data(&file)
        .with_context(|| format!("failed to extract delivery data from {}", plan.display()))?;
    let json = data.to_json()?;

    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!("Wrote {} control points to {}", data.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn apply(
    config: &ConversionConfig,
    delivery: &Path,
    template: &Path,
    output: &Path,
) -> anyhow::Result<ExitCode> {
    let text = fs::read_to_string(delivery).with_context(|| format!("failed to read {}", delivery.display()))?;
    let data = DeliveryData::from_json(&text)
        .with_context(|| format!("{} is not delivery data JSON", delivery.display()))?;
    let template_file = read_plan(template)?;

    let rebuilt = DeliveryDataConverter::new(config.clone())
        .to_dicom(&data, &template_file)
        .context("failed to rebuild plan")?;

    // keep the template's file meta group
    let mut out = template_file;
    *out = rebuilt;
    out.write_to_file(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!("Wrote rebuilt plan to {}", output.display());
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn roundtrip(config: &ConversionConfig, plan: &Path) -> anyhow::Result<ExitCode> {
    let file = read_plan(plan)?;
    let converter = DeliveryDataConverter::new(config.clone());
    let data = converter.to_delivery_data(&file)?;
    let rebuilt = converter.to_dicom(&data, &file)?;

    let before = dump_dataset(&file);
    let after = dump_dataset(&rebuilt);
    if before == after {
        println!("{}: lossless ({} control points)", plan.display(), data.len());
        return Ok(ExitCode::SUCCESS);
    }

    let differing = before.lines().zip(after.lines()).position(|(a, b)| a != b);
    match differing {
        Some(line) => println!(
            "{}: differs at line {}\n  - {}\n  + {}",
            plan.display(),
            line + 1,
            before.lines().nth(line).unwrap_or_default(),
            after.lines().nth(line).unwrap_or_default()
        ),
        None => println!(
            "{}: dumps differ in length ({} vs {} lines)",
            plan.display(),
            before.lines().count(),
            after.lines().count()
        ),
    }
    Ok(ExitCode::FAILURE)
}

pub(crate) fn summary(plan: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let file = read_plan(plan)?;
    let summary = summarize(&file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn dump(plan: &Path) -> anyhow::Result<ExitCode> {
    let file = read_plan(plan)?;
    print!("{}", dump_dataset(&file));
    Ok(ExitCode::SUCCESS)
}
