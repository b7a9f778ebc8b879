//! Batch processing command for multiple DANFE files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use danfe_core::fiscal::analysis::RecipientProfile;
use danfe_core::invoice::rules::format_money;
use danfe_core::{BatchAnalysis, InvoiceRecord, ProcessedDocument};

use super::load_config;
use super::process::{format_csv, OutputFormat, PipelineOptions};

const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tif", "tiff", "bmp", "txt"];

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Also generate the financial and supplier compatibility report
    #[arg(long)]
    report: bool,

    /// Add the credit determination to every document
    #[arg(long)]
    analyze: bool,

    /// The recipient's state registration is exempt (for the report)
    #[arg(long)]
    ie_exempt: bool,

    /// Number of parallel workers (0 = from config, then one per core)
    #[arg(short = 'j', long, default_value = "0")]
    jobs: usize,

    #[command(flatten)]
    pipeline: PipelineOptions,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.pipeline.apply(&mut config);
    if args.jobs > 0 {
        config.batch.workers = args.jobs;
    }

    let mut files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| is_supported(p))
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let pipeline = args.pipeline.build(&config, args.analyze)?;
    let chunk_size = config.batch.workers.max(1) * 4;
    let progress = pb.clone();
    let documents = tokio::task::spawn_blocking(move || {
        let mut documents = Vec::with_capacity(files.len());
        for chunk in files.chunks(chunk_size) {
            documents.extend(pipeline.process_batch(chunk));
            progress.inc(chunk.len() as u64);
        }
        documents
    })
    .await?;

    pb.finish_with_message("Complete");

    if let Some(output_dir) = &args.output_dir {
        for document in &documents {
            let output_path = output_path(output_dir, &document.record, args.format);
            let content = match args.format {
                OutputFormat::Json => serde_json::to_string_pretty(document)?,
                OutputFormat::Csv => format_csv(&[document])?,
                OutputFormat::Text => format_document_text(document),
            };
            fs::write(&output_path, content)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        let refs: Vec<&ProcessedDocument> = documents.iter().collect();
        fs::write(&summary_path, format_csv(&refs)?)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let (extracted, empty): (Vec<&ProcessedDocument>, Vec<&ProcessedDocument>) =
        documents.iter().partition(|d| d.record.has_data());

    if args.report {
        let records: Vec<InvoiceRecord> = extracted.iter().map(|d| d.record.clone()).collect();
        let recipient = RecipientProfile {
            regime: args.pipeline.recipient_regime.unwrap_or_default(),
            state_registration_exempt: args.ie_exempt,
        };
        let analysis = BatchAnalysis::from_records(&records, recipient);

        if let Some(output_dir) = &args.output_dir {
            let report_path = output_dir.join("report.json");
            fs::write(&report_path, serde_json::to_string_pretty(&analysis)?)?;
            println!(
                "{} Report written to {}",
                style("✓").green(),
                report_path.display()
            );
        }
        print_report(&analysis, &records);
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        documents.len(),
        start.elapsed()
    );
    println!(
        "   {} with data, {} without, {} from cache",
        style(extracted.len()).green(),
        style(empty.len()).red(),
        documents.iter().filter(|d| d.cached).count()
    );

    if !empty.is_empty() {
        println!();
        println!("{}", style("Files without data:").red());
        for document in &empty {
            println!(
                "  - {}: {}",
                document.record.source,
                document.record.warnings.last().map(String::as_str).unwrap_or("no fields recovered")
            );
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn output_path(output_dir: &Path, record: &InvoiceRecord, format: OutputFormat) -> PathBuf {
    let stem = Path::new(&record.source)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("danfe");
    output_dir.join(format!("{}.{}", stem, format.extension()))
}

fn format_document_text(document: &ProcessedDocument) -> String {
    let record = &document.record;
    let mut output = String::new();

    output.push_str(&format!("Source: {}\n", record.source));
    output.push_str(&format!("Number: {}\n", record.number.as_deref().unwrap_or("-")));
    output.push_str(&format!(
        "Issuer: {} {}\n",
        record.issuer.name.as_deref().unwrap_or("-"),
        record.issuer.tax_id_display()
    ));
    output.push_str(&format!(
        "Recipient: {} {}\n",
        record.recipient.name.as_deref().unwrap_or("-"),
        record.recipient.tax_id_display()
    ));
    if let Some(total) = record.total {
        output.push_str(&format!("Total: R$ {}\n", format_money(total)));
    }
    if let Some(determination) = &document.determination {
        output.push_str(&format!(
            "Credit: R$ {} ({})\n",
            format_money(determination.total_credit()),
            determination.accounting.summary
        ));
    }
    for warning in record.warnings.iter().chain(document.warnings.iter()) {
        output.push_str(&format!("  - {}\n", warning));
    }

    output
}

fn print_report(analysis: &BatchAnalysis, records: &[InvoiceRecord]) {
    let metrics = &analysis.metrics;

    println!();
    println!("{}", style("Financial overview").bold());
    println!("  Invoices:       {}", metrics.count);
    println!("  Total:          R$ {}", format_money(metrics.total));
    println!("  Mean:           R$ {}", format_money(metrics.mean));
    println!("  Largest:        R$ {}", format_money(metrics.max));
    println!("  Smallest:       R$ {}", format_money(metrics.min));
    println!("  Top-3 share:    {}%", metrics.top3_concentration);
    if metrics.is_concentrated() {
        println!(
            "  {} Purchases concentrated in few invoices",
            style("⚠").yellow()
        );
    }

    for record in BatchAnalysis::largest(records, 3) {
        println!(
            "    {} {} R$ {}",
            record.number.as_deref().unwrap_or("-"),
            record.issuer.name.as_deref().unwrap_or("-"),
            format_money(record.total.unwrap_or_default())
        );
    }

    println!();
    println!("{}", style("Suppliers").bold());
    for supplier in &analysis.suppliers {
        println!(
            "  {:<40} {:>3} invoices  R$ {:>14}  {}",
            supplier.name,
            supplier.count,
            format_money(supplier.total),
            supplier.regime.map(|r| r.label()).unwrap_or("-")
        );
    }
    println!(
        "  {} simplified, {} unknown regime",
        analysis.simplified_suppliers(),
        analysis.unknown_regime_suppliers()
    );

    if !analysis.alerts.is_empty() {
        println!();
        println!("{}", style("Compatibility alerts").bold());
        for alert in &analysis.alerts {
            println!("  [{:?}] {}: {}", alert.severity, alert.source, alert.message);
        }
    }
}
