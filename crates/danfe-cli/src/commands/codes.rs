//! Codes command - query the built-in fiscal code tables.

use clap::{Args, Subcommand, ValueEnum};
use console::style;

use danfe_core::fiscal::registry::{self, CodeTable};
use danfe_core::fiscal::OperationKind;
use danfe_core::TaxRegime;

/// Arguments for the codes command.
#[derive(Args)]
pub struct CodesArgs {
    #[command(subcommand)]
    command: CodesCommand,
}

#[derive(Subcommand)]
enum CodesCommand {
    /// Describe a CFOP (operation code)
    Cfop {
        /// Code, e.g. 1102 or 5.102
        code: String,
    },

    /// List CFOPs of one kind
    Cfops {
        #[arg(value_enum)]
        kind: KindArg,
    },

    /// Describe an NCM (product classification)
    Ncm { code: String },

    /// Describe a CSOSN (Simples Nacional tax situation)
    Csosn { code: String },

    /// Describe an O-CST (normal regime tax situation)
    Cst { code: String },

    /// ICMS rate of a state, or every state when omitted
    State { uf: Option<String> },

    /// Consolidated rates for an operation
    Profile {
        cfop: String,
        ncm: String,
        /// CSOSN or O-CST printed on the invoice
        situation: String,
        /// Destination state
        uf: String,
        /// Issuer regime
        #[arg(long, default_value = "normal")]
        regime: TaxRegime,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Entry,
    Exit,
    Transfer,
    Return,
}

impl From<KindArg> for OperationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Entry => OperationKind::Entry,
            KindArg::Exit => OperationKind::Exit,
            KindArg::Transfer => OperationKind::Transfer,
            KindArg::Return => OperationKind::Return,
        }
    }
}

pub async fn run(args: CodesArgs) -> anyhow::Result<()> {
    match args.command {
        CodesCommand::Cfop { code } => show(CodeTable::Cfop, "CFOP", &code),
        CodesCommand::Ncm { code } => show(CodeTable::Ncm, "NCM", &code),
        CodesCommand::Csosn { code } => show(CodeTable::Csosn, "CSOSN", &code),
        CodesCommand::Cst { code } => show(CodeTable::Cst, "O-CST", &code),
        CodesCommand::Cfops { kind } => {
            for entry in registry::cfops_by_kind(kind.into()) {
                println!("{}  {}", entry.code, entry.description);
            }
            Ok(())
        }
        CodesCommand::State { uf } => show_state(uf.as_deref()),
        CodesCommand::Profile {
            cfop,
            ncm,
            situation,
            uf,
            regime,
        } => {
            let profile = registry::profile_operation(&cfop, &ncm, &situation, &uf, &regime);
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(())
        }
    }
}

fn show(table: CodeTable, label: &str, code: &str) -> anyhow::Result<()> {
    match registry::lookup(table, code) {
        Some(entry) => {
            println!("{}", serde_json::to_string_pretty(&entry)?);
            Ok(())
        }
        None => anyhow::bail!("{} {} not found", label, registry::normalize_code(code)),
    }
}

fn show_state(uf: Option<&str>) -> anyhow::Result<()> {
    match uf {
        Some(uf) => match registry::state_icms_rate(uf) {
            Some(rate) => {
                println!("{} {}%", uf.trim().to_uppercase(), rate);
                Ok(())
            }
            None => anyhow::bail!("State {} not found", uf),
        },
        None => {
            println!("{}", style("Internal ICMS rates").bold());
            for (uf, rate) in registry::state_rates() {
                println!("  {}  {:>5}%", uf, rate);
            }
            Ok(())
        }
    }
}
