use std::path::PathBuf;

use anyhow::{Context, Result};
use brainspace_core::{Category, InvestorRecord, PartnerFilter, PartnerStats};
use brainspace_storage::PartnerTable;
use brainspace_sync::{SyncConfig, SyncMode, SyncOptions};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "brainspace")]
#[command(about = "brain.space VC partner directory tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Push reasoning fields from the local JSON file into vc_partners
    Sync {
        /// Record Source path (defaults to BRAINSPACE_DATA_PATH or vc_partners_data.json)
        #[arg(long)]
        data: Option<PathBuf>,
        /// Skip the execute_sql procedure and update rows directly
        #[arg(long)]
        direct: bool,
    },
    /// List partners, optionally filtered
    List {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value_t = Category::All)]
        filter: Category,
    },
    /// Show one partner with all reasoning
    Show { name: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_json = std::env::var("BRAINSPACE_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false);
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync {
        data: None,
        direct: false,
    }) {
        Commands::Sync { data, direct } => {
            let mode = if direct {
                SyncMode::Direct
            } else {
                SyncMode::RpcFirst
            };
            let report =
                brainspace_sync::run_sync_once_from_env(SyncOptions { data_path: data, mode })
                    .await?;
            println!("\n=== Update Complete ===");
            println!(
                "run_id={} records={} success={} errors={} (no match: {})",
                report.run_id,
                report.total(),
                report.succeeded,
                report.failed,
                report.no_match()
            );
        }
        Commands::List { search, filter } => {
            let partners = fetch_partners().await?;
            let stats = PartnerStats::from_records(&partners);
            let matching = PartnerFilter::new(search, filter).apply(&partners);
            for p in &matching {
                println!("{}", summary_line(p));
            }
            println!(
                "\n{} shown / {} total | neurotech {} | exits {} | series A/B {}",
                matching.len(),
                stats.total,
                stats.neurotech,
                stats.exits,
                stats.series
            );
        }
        Commands::Show { name } => {
            let partners = fetch_partners().await?;
            let found: Vec<_> = partners.iter().filter(|p| p.name == name).collect();
            if found.is_empty() {
                anyhow::bail!("no partner named {name}");
            }
            for p in found {
                print!("{}", detail_block(p));
            }
        }
    }

    Ok(())
}

async fn fetch_partners() -> Result<Vec<InvestorRecord>> {
    let config = SyncConfig::from_env().context("loading hosted store configuration")?;
    let table = config.connect().context("building hosted store client")?;
    table.list_partners().await.context("listing vc_partners")
}

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn summary_line(p: &InvestorRecord) -> String {
    let mut tags = Vec::new();
    if p.has_neurotech_investment {
        tags.push("neurotech");
    }
    if p.has_notable_exits {
        tags.push("exits");
    }
    if p.leads_series_a_b {
        tags.push("series A/B");
    }
    format!(
        "{} - {} ({}) [{}]",
        p.name,
        p.company,
        p.job_title.as_deref().unwrap_or("-"),
        tags.join(", ")
    )
}

fn detail_block(p: &InvestorRecord) -> String {
    let mut out = format!("{}\n{}\n", p.name, p.company);
    if let Some(title) = &p.job_title {
        out.push_str(&format!("{title}\n"));
    }
    if let Some(url) = &p.url {
        out.push_str(&format!("{url}\n"));
    }
    out.push_str(&format!(
        "\npartner: {}  series A/B lead: {}  neurotech: {}  notable exits: {}  NA/EU/Israel: {}\n",
        flag(p.is_partner),
        flag(p.leads_series_a_b),
        flag(p.has_neurotech_investment),
        flag(p.has_notable_exits),
        flag(p.based_na_eu_israel)
    ));
    if let Some(role) = &p.role_current {
        out.push_str(&format!("\nCurrent role: {role}\n"));
    }
    let reasoning = p.reasoning();
    let sections = [
        ("Role", &reasoning.role_reasoning),
        ("Partner status", &reasoning.partner_reasoning),
        ("Series A/B", &reasoning.series_reasoning),
        ("Neurotech", &reasoning.neurotech_reasoning),
        ("Exits", &reasoning.exits_reasoning),
        ("Location", &reasoning.location_reasoning),
    ];
    for (label, text) in sections {
        if let Some(text) = text.as_deref().filter(|t| !t.is_empty()) {
            out.push_str(&format!("\n{label}:\n  {text}\n"));
        }
    }
    out.push('\n');
    out
}
