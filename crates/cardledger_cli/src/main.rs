//! Command-line entry point for CardLedger.
//!
//! # Responsibility
//! - Wire configuration (flags and `CARDLEDGER_*` env vars) into core.
//! - Drive customer use-cases end-to-end through the audited context.

use anyhow::{anyhow, Context, Result};
use cardledger_core::{
    default_log_level, init_logging, open_db, Auditable, Customer, CustomerService,
    EntityListQuery, SqliteDbContext, SystemClock, UserId,
};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "cardledger",
    version,
    about = "Customer ledger with audited, soft-deleting persistence"
)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "CARDLEDGER_DB", default_value = "cardledger.db")]
    db: PathBuf,

    /// Acting user ID stamped into audit columns
    #[arg(long, env = "CARDLEDGER_USER")]
    user: Option<Uuid>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "CARDLEDGER_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error (defaults by build mode)
    #[arg(long, env = "CARDLEDGER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the core version
    Version,

    /// Customer management commands
    #[command(subcommand)]
    Customer(CustomerCommands),
}

#[derive(Subcommand)]
enum CustomerCommands {
    /// Register a new customer
    Add {
        full_name: String,
        email: String,
        /// Credit limit in cents
        #[arg(short, long, default_value_t = 0)]
        limit: i64,
    },
    /// List customers
    List {
        /// Include closed (soft-deleted) customers
        #[arg(short, long)]
        all: bool,
    },
    /// Show one customer with its audit trail
    Show { id: Uuid },
    /// Change a customer's credit limit
    Limit { id: Uuid, cents: i64 },
    /// Close a customer account
    Close { id: Uuid },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)
            .map_err(|err| anyhow!("failed to initialize logging: {err}"))?;
    }

    match cli.command {
        Commands::Version => {
            println!("cardledger {}", cardledger_core::core_version());
            Ok(())
        }
        Commands::Customer(command) => run_customer(&cli.db, cli.user, command).await,
    }
}

async fn run_customer(
    db_path: &Path,
    acting_user: Option<UserId>,
    command: CustomerCommands,
) -> Result<()> {
    let conn = open_db(db_path)
        .with_context(|| format!("failed to open database `{}`", db_path.display()))?;
    let context = SqliteDbContext::audited(conn, SystemClock);
    let mut service = CustomerService::new(context, acting_user);
    let cancel = CancellationToken::new();

    match command {
        CustomerCommands::Add {
            full_name,
            email,
            limit,
        } => {
            let customer = service
                .register_customer(&full_name, &email, limit, &cancel)
                .await?;
            info!("event=cli_customer_add module=cli status=ok");
            println!("{}", customer.id);
        }
        CustomerCommands::List { all } => {
            let query = EntityListQuery {
                include_deleted: all,
                ..EntityListQuery::default()
            };
            for customer in service.list_customers(&query)? {
                println!("{}", summary_line(&customer));
            }
        }
        CustomerCommands::Show { id } => {
            let customer = service
                .get_customer(id, true)?
                .with_context(|| format!("customer not found: {id}"))?;
            print_details(&customer);
        }
        CustomerCommands::Limit { id, cents } => {
            let customer = service.update_credit_limit(id, cents, &cancel).await?;
            println!("{}", summary_line(&customer));
        }
        CustomerCommands::Close { id } => {
            let customer = service.close_customer(id, &cancel).await?;
            info!("event=cli_customer_close module=cli status=ok");
            println!("{}", summary_line(&customer));
        }
    }
    Ok(())
}

fn summary_line(customer: &Customer) -> String {
    let status = if customer.is_active() { "active" } else { "closed" };
    format!(
        "{}\t{}\t{}\t{}\t{}",
        customer.id, customer.full_name, customer.email, customer.credit_limit_cents, status
    )
}

fn print_details(customer: &Customer) {
    let audit = customer.audit();
    let who = |id: Option<UserId>| id.map_or_else(|| "-".to_string(), |id| id.to_string());
    let when = |at: Option<i64>| at.map_or_else(|| "-".to_string(), |at| at.to_string());

    println!("id:                     {}", customer.id);
    println!("full_name:              {}", customer.full_name);
    println!("email:                  {}", customer.email);
    println!("credit_limit_cents:     {}", customer.credit_limit_cents);
    println!("created_by:             {}", who(audit.created_by()));
    println!("creation_date:          {}", audit.creation_date());
    println!("last_modified_by:       {}", who(audit.last_modified_by()));
    println!("last_modification_date: {}", when(audit.last_modification_date()));
    println!("is_deleted:             {}", audit.is_deleted());
    println!("deleted_by:             {}", who(audit.deleted_by()));
    println!("deletion_date:          {}", when(audit.deletion_date()));
}
