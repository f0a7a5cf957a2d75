use clap::{Parser, Subcommand};

use lurebox::error::PipelineError;

#[derive(Debug, Parser)]
#[command(name = "lurebox", version, about = "Phishing-aware mailbox viewer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user (provider subject ID); optional with one user
    #[arg(long, global = true)]
    user: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List visible (unhidden) inbox messages
    Emails {
        /// How many visible messages to return
        #[arg(long, default_value_t = lurebox::listing::DEFAULT_VISIBLE_COUNT)]
        count: usize,
    },
    /// Show one message by ID, fully reconstructed
    Show { id: String },
    /// Run a phishing scan on one message
    Scan { id: String },
    /// Hide a message from the default listing
    Hide { id: String },
    /// Restore a hidden message to the listing
    Unhide { id: String },
    /// List currently hidden messages
    Hidden,
    /// Manage registered users
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage the stored mailbox credential
    Credentials {
        #[command(subcommand)]
        command: CredentialCommands,
    },
    /// Show store stats
    Stats,
}

#[derive(Debug, Subcommand)]
enum UserCommands {
    /// Register a user (or refresh their profile fields)
    Add {
        subject: String,
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// List registered users
    List,
    /// Remove a user and everything stored for them
    Remove { subject: String },
}

#[derive(Debug, Subcommand)]
enum CredentialCommands {
    /// Encrypt and store a mailbox refresh token for the user
    Set { refresh_token: String },
    /// Delete the stored credential
    Clear,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(error) = commands::dispatch(cli).await {
        let transient = error
            .downcast_ref::<PipelineError>()
            .is_some_and(PipelineError::is_transient);
        if transient {
            eprintln!("Error: {error:#} (transient; retrying may succeed)");
        } else {
            eprintln!("Error: {error:#}");
        }
        std::process::exit(1);
    }
}

mod commands {
    use anyhow::{Context, Result};
    use reqwest::Client;

    use lurebox::api;
    use lurebox::error::PipelineError;
    use lurebox::classify::ClassifierClient;
    use lurebox::crypto::CredentialCipher;
    use lurebox::db::models::User;
    use lurebox::db::Database;
    use lurebox::gateway::{
        AccessTokenBroker, AuthRetryGateway, GmailGateway, MailboxGateway, OAuthConfig,
    };
    use lurebox::hidden;
    use lurebox::output::{self, OutputFormat};

    use super::{Cli, Commands, CredentialCommands, UserCommands};

    pub async fn dispatch(cli: Cli) -> Result<()> {
        let db = open_database()?;
        let format = OutputFormat::from_json_flag(cli.json);

        match cli.command {
            Commands::Emails { count } => {
                let user = resolve_user(&db, cli.user.as_deref())?;
                let gateway = build_gateway(&db, &user)?;
                let listing = api::list_inbox(&gateway, &db, &user, count).await?;
                println!("{}", output::format_listing(format, &listing)?);
            }
            Commands::Show { id } => {
                let user = resolve_user(&db, cli.user.as_deref())?;
                let gateway = build_gateway(&db, &user)?;
                let view = api::view_message(&gateway, &id).await?;
                println!("{}", output::format_message(format, &view)?);
            }
            Commands::Scan { id } => {
                let user = resolve_user(&db, cli.user.as_deref())?;
                let gateway = build_gateway(&db, &user)?;
                let classifier = ClassifierClient::from_env(Client::new());
                let scan = api::scan_message(&gateway, &classifier, &id).await?;
                println!("{}", output::format_scan(format, &scan)?);
            }
            Commands::Hide { id } => {
                let user = resolve_user(&db, cli.user.as_deref())?;
                if hidden::hide(&db, &user, &id)? {
                    println!("Hidden: {id}");
                } else {
                    println!("Already hidden: {id}");
                }
            }
            Commands::Unhide { id } => {
                let user = resolve_user(&db, cli.user.as_deref())?;
                if hidden::unhide(&db, &user, &id)? {
                    println!("Restored: {id}");
                } else {
                    println!("Not hidden: {id}");
                }
            }
            Commands::Hidden => {
                let user = resolve_user(&db, cli.user.as_deref())?;
                let entries = hidden::list_entries(&db, &user)?;
                println!("{}", output::format_hidden(format, &entries)?);
            }
            Commands::Users { command } => handle_users(&db, command, format)?,
            Commands::Credentials { command } => {
                let user = resolve_user(&db, cli.user.as_deref())?;
                handle_credentials(&db, &user, command)?;
            }
            Commands::Stats => {
                let stats = db.get_stats()?;
                println!("{}", output::format_stats(format, &stats)?);
            }
        }
        Ok(())
    }

    fn handle_users(db: &Database, command: UserCommands, format: OutputFormat) -> Result<()> {
        match command {
            UserCommands::Add {
                subject,
                email,
                name,
            } => {
                let user = db.upsert_user(&subject, &email, name.as_deref())?;
                println!("Registered user: {} ({})", user.email_address, user.subject);
            }
            UserCommands::List => {
                let users = db.list_users()?;
                println!("{}", output::format_users(format, &users)?);
            }
            UserCommands::Remove { subject } => {
                let removed = db.remove_user(&subject)?;
                if removed == 0 {
                    println!("No user found: {subject}");
                } else {
                    println!("Removed user: {subject}");
                }
            }
        }
        Ok(())
    }

    fn handle_credentials(db: &Database, user: &User, command: CredentialCommands) -> Result<()> {
        match command {
            CredentialCommands::Set { refresh_token } => {
                let cipher = CredentialCipher::from_env().context("load credential key")?;
                let envelope = cipher
                    .encrypt(refresh_token.trim())
                    .context("encrypt refresh token")?;
                db.set_credential(user.id, &envelope)?;
                println!("Stored credential for {}", user.email_address);
            }
            CredentialCommands::Clear => {
                let cleared = db.clear_credential(user.id)?;
                if cleared == 0 {
                    println!("No credential stored for {}", user.email_address);
                } else {
                    println!("Cleared credential for {}", user.email_address);
                }
            }
        }
        Ok(())
    }

    fn open_database() -> Result<Database> {
        let db_path = Database::default_db_path().context("resolve default database path")?;
        Database::open(&db_path)
            .with_context(|| format!("open database at {}", db_path.display()))
    }

    /// Resolves who the command acts as. No resolvable identity means the
    /// pipeline is never touched; that is the CLI's unauthenticated state.
    fn resolve_user(db: &Database, subject: Option<&str>) -> Result<User> {
        if let Some(subject) = subject {
            return db.get_user_by_subject(subject)?.ok_or_else(|| {
                anyhow::Error::new(PipelineError::Unauthenticated)
                    .context(format!("user not found: {subject}"))
            });
        }

        db.single_user()?.ok_or_else(|| {
            anyhow::Error::new(PipelineError::Unauthenticated)
                .context("zero or several users registered; pass --user <subject> to pick one")
        })
    }

    /// Everything mailbox-facing goes through the retry decorator so a stale
    /// access token costs one refresh instead of a failed command.
    fn build_gateway(db: &Database, user: &User) -> Result<impl MailboxGateway> {
        let cipher = CredentialCipher::from_env().context("load credential key")?;
        let refresh_token = api::resolve_refresh_token(db, &cipher, user)
            .with_context(|| format!("load mailbox credential for {}", user.email_address))?;

        let config = OAuthConfig::from_env().context("load OAuth client configuration")?;
        let http = Client::new();
        let broker = AccessTokenBroker::new(http.clone(), config, refresh_token);
        Ok(AuthRetryGateway::new(GmailGateway::new(http, broker)))
    }

}
