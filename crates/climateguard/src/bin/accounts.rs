//! Administrative tool for the accounts database.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use climateguard::accounts::AccountSource;
use climateguard::registration::Registrar;
use climateguard::store::SqliteAccountStore;

#[derive(Parser, Debug)]
#[command(
    name = "climateguard-accounts",
    about = "Manage gateway accounts and API keys",
    long_about = None
)]
struct Args {
    /// Path to the SQLite accounts database.
    #[arg(short, long, default_value = "accounts.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema if it does not exist.
    Init,
    /// Pre-create an unregistered account.
    CreateUser {
        username: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Register an account and print its first API key.
    Register {
        username: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Replace an account's API key and print the new one.
    Regenerate { username: String },
    /// List all accounts.
    List,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn run(args: Args) -> CliResult {
    let store = Arc::new(SqliteAccountStore::open(&args.db)?);

    match args.command {
        Command::Init => {
            println!("Initialized {}", args.db.display());
        }
        Command::CreateUser { username, email } => {
            let account = store.create_account(&username, email.as_deref())?;
            println!("Created account {} (id={})", account.username, account.id);
        }
        Command::Register { username, email } => {
            let registration = Registrar::new(store).register(&username, email.as_deref())?;
            println!(
                "Registered {} (id={})",
                registration.account.username, registration.account.id
            );
            println!("API key: {}", registration.key.api_key.as_str());
        }
        Command::Regenerate { username } => {
            let account = store
                .find_account_by_username(&username)?
                .filter(|account| account.is_registered)
                .ok_or_else(|| format!("no registered account named '{username}'"))?;
            let key = Registrar::new(store).regenerate(&account)?;
            println!("New API key for {}: {}", account.username, key.api_key.as_str());
        }
        Command::List => {
            for account in store.list_accounts()? {
                println!(
                    "{:>5}  {:<24} active={} registered={} email={}",
                    account.id,
                    account.username,
                    account.is_active,
                    account.is_registered,
                    account.email.as_deref().unwrap_or("-"),
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
