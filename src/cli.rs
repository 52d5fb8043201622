use clap::{Args, Parser, Subcommand};
use herald::config::{AppConfig, ConfigError, ConfigLayer};
use std::path::PathBuf;

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(AppConfig),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    if let Some(Command::Init(args)) = cli.command {
        let code = run_init(args);
        return RunOutcome::Exit(code);
    }

    match resolve_config(&cli) {
        Ok(config) => RunOutcome::Serve(config),
        Err(err) => {
            eprintln!("error: {err}");
            RunOutcome::Exit(2)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "herald",
    version,
    about = "Encrypted Web Push delivery service"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    /// TOML file with defaults for any of the options below.
    #[arg(long, env = "HERALD_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "HERALD_LISTEN")]
    listen: Option<String>,
    #[arg(long, env = "HERALD_DATABASE")]
    database: Option<PathBuf>,
    #[arg(long, env = "HERALD_VAPID_PRIVATE_KEY")]
    vapid_private_key: Option<String>,
    #[arg(long, env = "HERALD_VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "HERALD_VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    /// Seconds the relay may hold an undelivered message.
    #[arg(long, env = "HERALD_TTL")]
    ttl: Option<u32>,
    #[arg(long, env = "HERALD_REQUEST_TIMEOUT")]
    request_timeout: Option<String>,
    /// Bearer token required by the subscription and notify routes.
    #[arg(long, env = "HERALD_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
    /// Accept plain http and private-network push endpoints (local testing only).
    #[arg(long, env = "HERALD_ALLOW_INSECURE_ENDPOINTS")]
    allow_insecure_endpoints: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a VAPID key pair and an API token.
    Init(InitArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
}

fn run_init(args: InitArgs) -> i32 {
    let credentials = match herald::generate_vapid_credentials() {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("failed to generate VAPID credentials: {err}");
            return 1;
        }
    };
    let api_token = match herald::generate_api_token() {
        Ok(token) => token,
        Err(err) => {
            eprintln!("failed to generate API token: {err}");
            return 1;
        }
    };
    let (subject, show_subject_note) = match args.subject {
        Some(subject) => (subject, false),
        None => ("mailto:you@example.com".to_string(), true),
    };

    println!("VAPID credentials generated.");
    println!();
    println!("HERALD_VAPID_PRIVATE_KEY=\"{}\"", credentials.private_key);
    println!("HERALD_VAPID_PUBLIC_KEY=\"{}\"", credentials.public_key);
    println!("HERALD_VAPID_SUBJECT=\"{subject}\"");
    println!("HERALD_API_TOKEN=\"{api_token}\"");
    if show_subject_note {
        println!();
        println!("Note: replace HERALD_VAPID_SUBJECT with a contact URI you control.");
    }
    println!();
    println!(
        "--vapid-private-key \"{}\" --vapid-public-key \"{}\" --vapid-subject \"{subject}\"",
        credentials.private_key, credentials.public_key
    );
    0
}

fn cli_layer(cli: &Cli) -> ConfigLayer {
    ConfigLayer {
        listen: cli.listen.clone(),
        database: cli.database.clone(),
        vapid_private_key: cli.vapid_private_key.clone(),
        vapid_public_key: cli.vapid_public_key.clone(),
        vapid_subject: cli.vapid_subject.clone(),
        ttl: cli.ttl,
        request_timeout: cli.request_timeout.clone(),
        api_token: cli.api_token.clone(),
        allow_insecure_endpoints: cli.allow_insecure_endpoints.then_some(true),
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let file = match cli.config.as_deref() {
        Some(path) => ConfigLayer::from_file(path)?,
        None => ConfigLayer::default(),
    };
    cli_layer(cli).or(file).resolve()
}
