use api_shared::resolve_actor;
use clap::{Parser, Subcommand};
use pv_core::{
    Actor, CaseId, CaseService, CoreConfig, FileCaseStore, IdentityProvider, StaticAccounts,
    TriagePayload,
};
use pv_meddra::{CodingAssist, Terminology};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pv")]
#[command(about = "SkyVigilance PV case-processing CLI")]
struct Cli {
    /// Case store root
    #[arg(long, env = "PV_DATA_DIR", global = true, default_value = "pv_data")]
    data_dir: PathBuf,
    /// Acting user, for commands that change cases
    #[arg(long, env = "PV_USER", global = true)]
    user: Option<String>,
    /// YAML training accounts (default: the built-in demo users)
    #[arg(long, env = "PV_ACCOUNTS_FILE", global = true)]
    accounts_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List cases, oldest first
    List {
        /// Only the work queue of this role
        #[arg(long)]
        role: Option<String>,
    },
    /// Print one case as JSON
    Show { id: String },
    /// Create a case from the four triage criteria
    Create {
        #[arg(long)]
        reporter: String,
        #[arg(long)]
        initials: String,
        #[arg(long)]
        product: String,
        #[arg(long)]
        event: String,
    },
    /// Print a case's audit log
    Audit { id: String },
    /// Write a case's E2B(R3) XML
    Export {
        id: String,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
    /// Case totals by stage
    Stats,
    /// Look up MedDRA terms
    Meddra {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Remove every case (administrators only)
    Reset,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'pv --help' for commands");
        return Ok(());
    };

    let coding = Arc::new(CodingAssist::default());
    if let Commands::Meddra { query, limit } = &command {
        let terms = coding.lookup_limited(query, *limit);
        if terms.is_empty() {
            println!("No terms match '{}'.", query);
        }
        for term in terms {
            let ime = if coding.is_ime(&term.pt) { " [IME]" } else { "" };
            println!(
                "{} ({}) -> PT {} ({}) | {}{}",
                term.llt, term.llt_code, term.pt, term.pt_code, term.soc, ime
            );
        }
        return Ok(());
    }

    let accounts = match &cli.accounts_file {
        Some(path) => StaticAccounts::load(path)?,
        None => StaticAccounts::training(),
    };
    let cfg = Arc::new(CoreConfig::default());
    let store = Arc::new(FileCaseStore::open(&cli.data_dir)?);
    let service = CaseService::new(cfg, store, coding);
    let acting = || -> Result<Actor, Box<dyn std::error::Error>> {
        let identity: &dyn IdentityProvider = &accounts;
        Ok(resolve_actor(identity, cli.user.as_deref(), None)?)
    };

    match command {
        Commands::List { role } => {
            let cases = match role {
                Some(role) => service.cases_for_role(&role)?,
                None => service.list_cases()?,
            };
            if cases.is_empty() {
                println!("No cases found.");
            }
            for case in cases {
                let product = case
                    .triage
                    .as_ref()
                    .map(|t| t.product_name.as_str())
                    .unwrap_or("-");
                println!(
                    "{}  {}  step {} {:<24} {}",
                    case.id,
                    case.case_number,
                    case.stage.step(),
                    case.stage.status_label(),
                    product
                );
            }
        }
        Commands::Show { id } => {
            let case = service.get_case(&CaseId::parse(&id)?)?;
            println!("{}", serde_json::to_string_pretty(&case)?);
        }
        Commands::Create {
            reporter,
            initials,
            product,
            event,
        } => {
            let payload = TriagePayload {
                reporter_name: Some(reporter),
                patient_initials: Some(initials),
                product_name: Some(product),
                event_description: Some(event),
            };
            let case = service.create_case(&acting()?, &payload)?;
            println!("Created case {} ({})", case.case_number, case.id);
        }
        Commands::Audit { id } => {
            for entry in service.audit_log(&CaseId::parse(&id)?)? {
                println!(
                    "{}  {:<12} {:<10} {:?} at '{}'{}",
                    entry.timestamp.to_rfc3339(),
                    entry.actor,
                    entry.role.label(),
                    entry.action,
                    entry.stage.status_label(),
                    entry.detail.map(|d| format!(": {d}")).unwrap_or_default()
                );
            }
        }
        Commands::Export { id, out } => {
            let xml = service.export_e2b(&CaseId::parse(&id)?)?;
            std::fs::write(&out, xml)?;
            println!("Wrote {}", out.display());
        }
        Commands::Stats => {
            let stats = service.stats()?;
            println!("Total: {}", stats.total);
            for count in stats.by_stage {
                println!(
                    "  step {} {:<26} {}",
                    count.step,
                    count.stage.status_label(),
                    count.count
                );
            }
            println!("Reworked: {}  IME: {}", stats.reworked, stats.ime);
        }
        Commands::Reset => {
            let removed = service.reset(&acting()?)?;
            println!("Removed {} cases", removed);
        }
        Commands::Meddra { .. } => {}
    }

    Ok(())
}
