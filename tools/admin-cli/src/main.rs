//! Agent Wallet Admin CLI
//!
//! Operator commands against the ledger:
//! - create-account: open an account under a parent
//! - deposit / withdraw / transfer: move funds through the ledger
//! - credentials: show the Buffalo UID and token of a player
//! - history / report: inspect an account's ledger, optionally by day range
//! - bet-summary: per-member Buffalo bet totals from the audit log

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

use account_service::{
    Account, AccountServiceConfig, Balance, DateRange, NewAccount, StorageBackend, TransactionKind,
    UserType, WalletService,
};
use game_gateway::{BetAuditLog, BetFilter, BetOutcome, GatewayConfig, PgAuditLog};

#[derive(Parser)]
#[command(name = "admin-cli")]
#[command(about = "Admin CLI for the agent wallet platform - accounts, funds and provider credentials")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an account; the name is generated from --seq when omitted
    CreateAccount {
        /// Account type (owner, senior, master, agent, sub_agent, player, system_wallet);
        /// defaults to the parent's usual child type
        #[arg(short = 't', long)]
        user_type: Option<UserType>,

        /// Login name of the parent account
        #[arg(short, long)]
        parent: Option<String>,

        /// Login name
        #[arg(short, long)]
        name: Option<String>,

        /// Sequence number for a generated name
        #[arg(short, long, default_value = "1")]
        seq: u64,
    },

    /// Credit an account
    Deposit {
        user_name: String,
        /// Amount in units, up to two decimals
        amount: Balance,
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Debit an account
    Withdraw {
        user_name: String,
        /// Amount in units, up to two decimals
        amount: Balance,
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Move funds between a parent and its direct child
    Transfer {
        from: String,
        to: String,
        /// Amount in units, up to two decimals
        amount: Balance,
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Show the Buffalo UID and token for a login name
    Credentials {
        user_name: String,

        /// Gateway TOML configuration with the site identity
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show recent ledger entries
    History {
        user_name: String,
        #[arg(short, long)]
        limit: Option<u32>,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD, inclusive
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Per-kind transaction totals
    Report {
        user_name: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Per-member Buffalo bet totals from the audit log
    BetSummary {
        /// Only this member
        user_name: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Only spins with this outcome (win, lose, draw)
        #[arg(short, long)]
        outcome: Option<BetOutcome>,
    },

    /// List direct children of an account
    Children { user_name: String },
}

fn note_meta(note: Option<String>) -> serde_json::Value {
    match note {
        Some(note) => serde_json::json!({ "source": "admin-cli", "note": note }),
        None => serde_json::json!({ "source": "admin-cli" }),
    }
}

fn print_account(account: &Account) {
    println!(
        "  {} {} (id {}, {}) balance {}",
        "•".cyan(),
        account.user_name.bold(),
        account.id,
        account.user_type,
        account.balance.to_string().yellow()
    );
}

/// Explicit type, or the parent's usual child type; root accounts must name one
fn resolve_user_type(explicit: Option<UserType>, parent: Option<&Account>) -> Result<UserType> {
    match (explicit, parent) {
        (Some(user_type), _) => Ok(user_type),
        (None, Some(parent)) => Ok(parent.user_type.child_type()),
        (None, None) => bail!("--user-type is required for an account without a parent"),
    }
}

fn day_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<DateRange> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            bail!("--from {} is after --to {}", from, to);
        }
    }
    Ok(DateRange::days(from, to))
}

async fn connect() -> Result<WalletService> {
    let config = AccountServiceConfig::from_env().context("Invalid ledger configuration")?;
    account_service::connect(&config).await.context("Failed to connect to the ledger")
}

async fn connect_audit() -> Result<PgAuditLog> {
    let config = AccountServiceConfig::from_env().context("Invalid ledger configuration")?;
    if config.backend == StorageBackend::Memory {
        bail!("The bet audit log needs the postgres backend");
    }
    PgAuditLog::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to the audit log")
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::CreateAccount { user_type, parent, name, seq } => {
            let wallet = connect().await?;
            let parent = match parent {
                Some(parent) => Some(wallet.account_by_name(&parent).await?),
                None => None,
            };
            let user_type = resolve_user_type(user_type, parent.as_ref())?;
            let user_name = name.unwrap_or_else(|| user_type.generate_user_name(seq));
            let new = match &parent {
                Some(parent) => NewAccount::child_of(parent, user_name, user_type),
                None => NewAccount::root(user_name, user_type),
            };
            let account = wallet.create_account(new).await?;
            println!("{}", "✅ Account created".green().bold());
            print_account(&account);
        }
        Commands::Deposit { user_name, amount, note } => {
            let wallet = connect().await?;
            let account = wallet.account_by_name(&user_name).await?;
            let receipt = wallet
                .deposit(account.id, amount, TransactionKind::Deposit, note_meta(note))
                .await?;
            println!(
                "{} {} → {} (entry {})",
                "✅ Deposited".green().bold(),
                receipt.balance_before,
                receipt.balance_after.to_string().yellow(),
                receipt.entry.id
            );
        }
        Commands::Withdraw { user_name, amount, note } => {
            let wallet = connect().await?;
            let account = wallet.account_by_name(&user_name).await?;
            let receipt = wallet
                .withdraw(account.id, amount, TransactionKind::Withdraw, note_meta(note))
                .await?;
            println!(
                "{} {} → {} (entry {})",
                "✅ Withdrew".green().bold(),
                receipt.balance_before,
                receipt.balance_after.to_string().yellow(),
                receipt.entry.id
            );
        }
        Commands::Transfer { from, to, amount, note } => {
            let wallet = connect().await?;
            let from = wallet.account_by_name(&from).await?;
            let to = wallet.account_by_name(&to).await?;
            let receipt = wallet.transfer(from.id, to.id, amount, note_meta(note)).await?;
            println!("{} {}", "✅ Transferred".green().bold(), amount.to_string().yellow());
            println!("  {}: {}", from.user_name.bold(), receipt.debit.balance_after);
            println!("  {}: {}", to.user_name.bold(), receipt.credit.balance_after);
        }
        Commands::Credentials { user_name, config } => {
            let config = match config {
                Some(path) => GatewayConfig::load_from_file(&path)?,
                None => GatewayConfig::default(),
            };
            let uid = game_gateway::uid::generate_uid(&config.site.prefix, &config.site.url, &user_name);
            let token = game_gateway::token::generate_token(
                &user_name,
                &config.site.url,
                &config.site.token_label,
            );
            println!("{}", format!("🔑 Buffalo credentials for {}", user_name).cyan().bold());
            println!("  {} {}", "uid:  ".dimmed(), uid);
            println!("  {} {}", "token:".dimmed(), token);
        }
        Commands::History { user_name, limit, from, to } => {
            let range = day_range(from, to)?;
            let wallet = connect().await?;
            let account = wallet.account_by_name(&user_name).await?;
            let entries = wallet.history(account.id, &range, limit).await?;
            println!("{}", format!("📋 Ledger for {}", account.user_name).cyan().bold());
            if entries.is_empty() {
                println!("  {}", "No entries".dimmed());
            }
            for entry in entries {
                let amount = if entry.amount.is_negative() {
                    entry.amount.to_string().red()
                } else {
                    entry.amount.to_string().green()
                };
                println!(
                    "  #{} {} {:<12} {} → {}",
                    entry.id,
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind.to_string(),
                    amount,
                    entry.balance_after
                );
            }
        }
        Commands::Report { user_name, from, to } => {
            let range = day_range(from, to)?;
            let wallet = connect().await?;
            let account = wallet.account_by_name(&user_name).await?;
            let report = wallet.report(account.id, &range).await?;
            println!("{}", format!("📊 Transaction report for {}", account.user_name).cyan().bold());
            for (kind, totals) in &report.by_kind {
                println!("  {:<12} {:>6} entries {:>14}", kind.to_string(), totals.count, totals.total);
            }
            println!("  {:<12} {:>29}", "net".bold(), report.net.to_string().yellow().bold());
        }
        Commands::BetSummary { user_name, from, to, outcome } => {
            let filter = BetFilter { member_account: user_name, range: day_range(from, to)?, outcome };
            let audit = connect_audit().await?;
            let summaries = audit.summary(&filter).await?;
            println!("{}", "🎰 Buffalo bet summary".cyan().bold());
            if summaries.is_empty() {
                println!("  {}", "No bets".dimmed());
            }
            for s in &summaries {
                let net = if s.net.is_negative() {
                    s.net.to_string().red()
                } else {
                    s.net.to_string().green()
                };
                println!(
                    "  {:<16} {:>6} spins  bet {:>12}  win {:>12}  net {:>12}  ({}W/{}L/{}D)",
                    s.member_account.bold(),
                    s.count,
                    s.total_bet,
                    s.total_win,
                    net,
                    s.wins,
                    s.losses,
                    s.draws
                );
            }
        }
        Commands::Children { user_name } => {
            let wallet = connect().await?;
            let account = wallet.account_by_name(&user_name).await?;
            let children = wallet.children(account.id).await?;
            println!(
                "{}",
                format!("🌳 {} ({}) has {} direct children", account.user_name, account.user_type, children.len())
                    .cyan()
                    .bold()
            );
            for child in &children {
                print_account(child);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("{}", format!("No .env file loaded: {}", e).dimmed());
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        eprintln!("{} {:#}", "❌".red(), e);
        std::process::exit(1);
    }
}
