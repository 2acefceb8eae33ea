//! Vault CLI
//!
//! Every command runs in its own session: the master key is read once (from
//! `VAULT_MASTER_KEY` or a prompt), used to log in and, for reveal, edit and
//! account deletion, to verify that one action. Results are printed to stdout
//! as JSON envelopes; logs go to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, Level};

use vault_core::{
    RecordPatch, Response, SecretString, Vault, DEFAULT_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH,
};

/// Password vault with an optional cloud mirror
#[derive(Parser, Debug)]
#[command(name = "vault")]
#[command(version)]
#[command(about = "Password vault with an optional cloud mirror")]
struct Args {
    /// Vault data directory (defaults to the platform data directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Account to act as
    #[arg(long, short, global = true, env = "VAULT_USER")]
    user: Option<String>,

    /// Master key (prompted for when absent)
    #[arg(long, env = "VAULT_MASTER_KEY", hide_env_values = true, global = true)]
    master_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Register,
    /// Log in and show the session status
    Login,
    /// List stored passwords (without secrets)
    List,
    /// Store a password
    Add {
        #[arg(long)]
        service: String,
        #[arg(long)]
        username: String,
        /// Password to store (prompted for unless --generate is given)
        #[arg(long, conflicts_with = "generate")]
        password: Option<String>,
        /// Store a freshly generated password
        #[arg(long)]
        generate: bool,
    },
    /// Show one stored password
    Reveal { id: String },
    /// Change fields of a stored password
    Edit {
        id: String,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete a stored password
    Delete { id: String },
    /// Turn cloud integration on or off
    Cloud {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Print a random password
    Generate {
        #[arg(
            long,
            default_value_t = DEFAULT_PASSWORD_LENGTH as u16,
            value_parser = clap::value_parser!(u16).range(4..=MAX_PASSWORD_LENGTH as i64)
        )]
        length: u16,
    },
    /// Delete the account and its local passwords
    DeleteAccount,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Switch {
    On,
    Off,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the JSON result
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    let vault = Vault::open(args.data_dir.clone())
        .await
        .map_err(|e| format!("Failed to open vault: {}", e))?;
    debug!("Vault data directory: {:?}", vault.data_dir());

    let success = run(&vault, args).await?;

    if let Err(e) = vault.shutdown().await {
        debug!("Shutdown: {}", e);
    }
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Execute one command, returning whether it succeeded
async fn run(vault: &Vault, args: Args) -> CliResult<bool> {
    if let Command::Generate { length } = args.command {
        return emit(&vault.generate_password(usize::from(length)));
    }

    let username = match args.user {
        Some(user) => user,
        None => prompt_line("Username: ")?,
    };
    let master_key = match args.master_key {
        Some(key) => SecretString::new(key),
        None => SecretString::new(rpassword::prompt_password("Master key: ")?),
    };

    if let Command::Register = args.command {
        return emit(&vault.register(&username, master_key.expose()).await);
    }

    let login = vault.login(&username, master_key.expose()).await;
    if let Command::Login = args.command {
        return emit(&login);
    }
    let Some(status) = login.data.as_ref() else {
        return emit(&login);
    };
    if let Some(warning) = &status.warning {
        eprintln!("warning: {}", warning);
    }
    let identity_id = status.identity.id;

    match args.command {
        Command::List => emit(&vault.list_records(identity_id).await),
        Command::Add {
            service,
            username,
            password,
            generate,
        } => {
            let password = match password {
                Some(password) => SecretString::new(password),
                None if generate => SecretString::new(vault_core::generate_password(
                    DEFAULT_PASSWORD_LENGTH,
                )),
                None => SecretString::new(rpassword::prompt_password("Password to store: ")?),
            };
            emit(&vault.create_record(&service, &username, password.expose()).await)
        }
        Command::Reveal { id } => emit(&vault.reveal_record(&id, master_key.expose()).await),
        Command::Edit {
            id,
            service,
            username,
            password,
        } => {
            let patch = RecordPatch {
                service,
                username,
                secret: password.map(SecretString::new),
            };
            emit(&vault.update_record(&id, patch, master_key.expose()).await)
        }
        Command::Delete { id } => emit(&vault.delete_record(&id).await),
        Command::Cloud { state } => {
            let enabled = matches!(state, Switch::On);
            emit(&vault.set_cloud_enabled(identity_id, enabled).await)
        }
        Command::DeleteAccount => emit(&vault.delete_account(master_key.expose()).await),
        Command::Register | Command::Login | Command::Generate { .. } => Ok(true),
    }
}

fn emit<T: Serialize>(response: &Response<T>) -> CliResult<bool> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(response.success)
}

fn prompt_line(prompt: &str) -> CliResult<String> {
    use std::io::Write;

    eprint!("{}", prompt);
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
