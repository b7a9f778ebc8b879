//! Process command - extract data from a single DANFE.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info};

use danfe_core::fiscal::analysis::{compatibility_alerts, CompatibilityAlert, RecipientProfile};
use danfe_core::fiscal::{LineDetermination, TaxCredit};
use danfe_core::invoice::rules::format_money;
use danfe_core::models::Party;
use danfe_core::{DanfeConfig, Pipeline, ProcessedDocument, TaxRegime};

use super::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF, image or text)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Add the ICMS/PIS/COFINS credit determination
    #[arg(long)]
    analyze: bool,

    /// Also decide credits per product row (implies --analyze)
    #[arg(long)]
    lines: bool,

    #[command(flatten)]
    pipeline: PipelineOptions,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

/// Pipeline switches shared by `process` and `batch`.
#[derive(Args, Clone, Debug)]
pub struct PipelineOptions {
    /// Do not query registries for issuer and recipient regimes
    #[arg(long)]
    pub no_lookup: bool,

    /// Use only embedded text, never OCR
    #[arg(long)]
    pub text_only: bool,

    /// Recipient regime (simples, presumido, real, normal); overrides lookups
    #[arg(long)]
    pub recipient_regime: Option<TaxRegime>,

    /// Issuer regime (simples, presumido, real, normal); overrides lookups
    #[arg(long)]
    pub issuer_regime: Option<TaxRegime>,

    /// Directory for persistent extraction and lookup caches
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

impl PipelineOptions {
    pub fn apply(&self, config: &mut DanfeConfig) {
        if self.no_lookup {
            config.lookup.enabled = false;
        }
        if self.text_only {
            config.acquisition.ocr_backends.clear();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache.directory = Some(dir.clone());
        }
    }

    pub fn build(&self, config: &DanfeConfig, analyze: bool) -> anyhow::Result<Pipeline> {
        let mut pipeline = Pipeline::from_config(config)?.with_analysis(analyze);
        if let Some(regime) = self.recipient_regime {
            pipeline = pipeline.with_recipient_regime(regime);
        }
        if let Some(regime) = self.issuer_regime {
            pipeline = pipeline.with_issuer_regime(regime);
        }
        Ok(pipeline)
    }

    /// Recipient profile for compatibility alerts.
    pub fn recipient_profile(&self, recipient: &Party) -> RecipientProfile {
        RecipientProfile {
            regime: self
                .recipient_regime
                .or(recipient.regime)
                .unwrap_or_default(),
            state_registration_exempt: recipient.state_registration_exempt.unwrap_or(false),
        }
    }
}

/// Process output: the document plus optional per-line decisions.
#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    document: &'a ProcessedDocument,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    lines: Vec<LineDetermination>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    compatibility: Vec<CompatibilityAlert>,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.pipeline.apply(&mut config);

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Processing {}...", args.input.display()));

    let analyze = args.analyze || args.lines;
    let per_line = args.lines;
    let input = args.input.clone();
    let options = args.pipeline.clone();
    let (document, lines) = tokio::task::spawn_blocking(
        move || -> anyhow::Result<(ProcessedDocument, Vec<LineDetermination>)> {
            let pipeline = options.build(&config, analyze)?;
            let document = pipeline.process_file(&input)?;
            let lines = if per_line {
                pipeline.engine().evaluate_lines(&document.record)
            } else {
                Vec::new()
            };
            Ok((document, lines))
        },
    )
    .await??;

    pb.finish_and_clear();

    let compatibility = if analyze {
        compatibility_alerts(
            &document.record,
            args.pipeline.recipient_profile(&document.record.recipient),
        )
    } else {
        Vec::new()
    };

    if !document.record.has_data() {
        eprintln!(
            "{} No invoice data recovered from {}",
            style("⚠").yellow(),
            args.input.display()
        );
    }

    let report = Report {
        document: &document,
        lines,
        compatibility,
    };

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Csv => format_csv(&[&document])?,
        OutputFormat::Text => format_text(&report),
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

const CSV_HEADER: [&str; 17] = [
    "source",
    "number",
    "series",
    "issue_date",
    "issuer_tax_id",
    "issuer_name",
    "issuer_regime",
    "recipient_tax_id",
    "recipient_name",
    "recipient_regime",
    "total",
    "method",
    "icms_credit",
    "pis_credit",
    "cofins_credit",
    "cached",
    "warnings",
];

fn credit_cell(credit: &TaxCredit) -> String {
    if credit.admitted {
        credit.amount.to_string()
    } else {
        String::new()
    }
}

fn regime_cell(party: &Party) -> String {
    party.regime.map(|r| r.to_string()).unwrap_or_default()
}

/// One CSV row per document, with a header.
pub fn format_csv(documents: &[&ProcessedDocument]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER)?;

    for document in documents {
        let record = &document.record;
        let determination = document.determination.as_ref();
        let warnings: Vec<&str> = record
            .warnings
            .iter()
            .chain(document.warnings.iter())
            .map(String::as_str)
            .collect();

        wtr.write_record([
            record.source.clone(),
            record.number.clone().unwrap_or_default(),
            record.series.clone().unwrap_or_default(),
            record.issue_date.map(|d| d.to_string()).unwrap_or_default(),
            record.issuer.tax_id_display(),
            record.issuer.name.clone().unwrap_or_default(),
            regime_cell(&record.issuer),
            record.recipient.tax_id_display(),
            record.recipient.name.clone().unwrap_or_default(),
            regime_cell(&record.recipient),
            record.total.map(|t| t.to_string()).unwrap_or_default(),
            record.method.to_string(),
            determination.map(|d| credit_cell(&d.icms)).unwrap_or_default(),
            determination.map(|d| credit_cell(&d.pis)).unwrap_or_default(),
            determination.map(|d| credit_cell(&d.cofins)).unwrap_or_default(),
            document.cached.to_string(),
            warnings.join("; "),
        ])?;
    }

    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn party_text(output: &mut String, title: &str, party: &Party) {
    output.push_str(&format!("{}:\n", title));
    output.push_str(&format!("  {}\n", party.name.as_deref().unwrap_or("-")));
    if party.tax_id.is_some() {
        output.push_str(&format!("  CNPJ/CPF: {}\n", party.tax_id_display()));
    }
    if let Some(regime) = party.regime {
        output.push_str(&format!("  Regime: {}\n", regime.label()));
    }
    output.push('\n');
}

fn credit_text(output: &mut String, tax: &str, credit: &TaxCredit) {
    let verdict = if credit.admitted { "yes" } else { "no" };
    output.push_str(&format!(
        "  {:<7} {:<4} R$ {:>12}  {}\n",
        tax,
        verdict,
        format_money(credit.amount),
        credit.reason
    ));
}

fn format_text(report: &Report<'_>) -> String {
    let document = report.document;
    let record = &document.record;
    let mut output = String::new();

    output.push_str(&format!(
        "DANFE {} série {}\n",
        record.number.as_deref().unwrap_or("-"),
        record.series.as_deref().unwrap_or("-")
    ));
    if let Some(date) = record.issue_date {
        output.push_str(&format!("Emissão: {}\n", date.format("%d/%m/%Y")));
    }
    output.push_str(&format!("Método: {}\n\n", record.method));

    party_text(&mut output, "Emitente", &record.issuer);
    party_text(&mut output, "Destinatário", &record.recipient);

    if !record.items.is_empty() {
        output.push_str("Produtos:\n");
        for item in &record.items {
            output.push_str(&format!(
                "  {} CFOP {} CST {} R$ {}\n",
                item.description,
                item.cfop.as_deref().unwrap_or("-"),
                item.situation_code.as_deref().unwrap_or("-"),
                format_money(item.total)
            ));
        }
        output.push('\n');
    }

    if let Some(total) = record.total {
        output.push_str(&format!("Total: R$ {}\n", format_money(total)));
    }

    if let Some(determination) = &document.determination {
        output.push_str("\nCredits:\n");
        credit_text(&mut output, "ICMS", &determination.icms);
        credit_text(&mut output, "PIS", &determination.pis);
        credit_text(&mut output, "COFINS", &determination.cofins);

        if let Some(impact) = &determination.impact {
            output.push_str(&format!(
                "\nUndue tax if miscoded: R$ {} (ICMS {}, PIS {}, COFINS {})\n",
                format_money(impact.total),
                format_money(impact.icms),
                format_money(impact.pis),
                format_money(impact.cofins)
            ));
        }

        output.push_str(&format!("\n{}\n", determination.accounting.summary));
        for line in &determination.accounting.debits {
            output.push_str(&format!("  D {:<40} {:>12}\n", line.account, format_money(line.amount)));
        }
        for line in &determination.accounting.credits {
            output.push_str(&format!("  C {:<40} {:>12}\n", line.account, format_money(line.amount)));
        }

        for alert in &determination.alerts {
            output.push_str(&format!("  ! {}\n", alert));
        }
    }

    for line in &report.lines {
        output.push_str(&format!(
            "  #{} {}: {} credit R$ {}\n",
            line.index + 1,
            line.description,
            if line.determination.total_credit().is_zero() { "no" } else { "has" },
            format_money(line.determination.total_credit())
        ));
    }

    for alert in &report.compatibility {
        output.push_str(&format!("\n[{:?}] {}\n  {}\n", alert.severity, alert.message, alert.impact));
    }

    let warnings: Vec<&String> = record.warnings.iter().chain(document.warnings.iter()).collect();
    if !warnings.is_empty() {
        output.push_str("\nWarnings:\n");
        for warning in warnings {
            output.push_str(&format!("  - {}\n", warning));
        }
    }

    output
}
