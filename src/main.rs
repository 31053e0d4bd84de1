mod cli;

use clap::{CommandFactory, Parser, error::ErrorKind};
use serde::Serialize;
use serde_json::Value;

use gateway_client::client::GatewayClient;
use gateway_client::config::{self, AuthSection, ConfigFile};
use gateway_client::error::{AppError, ExitCode};

use cli::{Cli, Command, CronCommand, GlobalOpts, OutputFormat};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.print().expect("failed to write to stdout");
                std::process::exit(0);
            }
            let full = e.to_string();
            let clean = full
                .lines()
                .filter(|line| {
                    let trimmed = line.trim();
                    !trimmed.is_empty()
                        && !trimmed.starts_with("For more information")
                        && !trimmed.starts_with("Usage:")
                })
                .map(|line| line.strip_prefix("error: ").unwrap_or(line).trim())
                .collect::<Vec<_>>()
                .join(", ");
            let clean = if clean.is_empty() { e.kind().to_string() } else { clean };
            let app_err = AppError {
                message: clean,
                code: ExitCode::GeneralError,
            };
            app_err.print_json_stderr();
            std::process::exit(app_err.code as i32);
        }
    };

    if let Err(e) = run(&cli).await {
        e.print_json_stderr();
        #[allow(clippy::cast_possible_truncation)]
        std::process::exit(e.code as i32);
    }
}

async fn run(cli: &Cli) -> Result<(), AppError> {
    if let Command::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "gateway-cli", &mut std::io::stdout());
        return Ok(());
    }

    let (config_path, config_file) = config::load_config(cli.global.config.as_deref());
    let merged = merge_cli_overrides(&cli.global, config_file);
    let resolved = config::resolve_config(&merged, config_path)?;

    let (client, _events) = GatewayClient::connect(&resolved, Vec::new()).await?;

    let result = dispatch(&cli.command, &client).await;
    client.disconnect().await;

    match result {
        Ok(Some(value)) => print_output(&value, &cli.global.output),
        Ok(None) => Ok(()),
        Err(error) => Err(error),
    }
}

/// Folds CLI flags on top of the loaded config file. CLI flags win; unset CLI flags fall back to
/// whatever the file already had.
fn merge_cli_overrides(global: &GlobalOpts, mut file: ConfigFile) -> ConfigFile {
    if let Some(host) = &global.host {
        file.connection.host = Some(host.clone());
    }
    if let Some(port) = global.port {
        file.connection.port = Some(port);
    }
    if let Some(timeout) = global.timeout {
        file.connection.timeout_ms = Some(timeout);
    }
    if global.token.is_some() || global.password.is_some() {
        file.auth = AuthSection {
            token: global.token.clone(),
            password: global.password.clone(),
        };
    }
    file
}

async fn dispatch(command: &Command, client: &GatewayClient) -> Result<Option<Value>, AppError> {
    match command {
        Command::Connect => Ok(Some(serde_json::json!({"connected": true, "url": client.url()}))),
        Command::Health => Ok(Some(client.health().await?)),
        Command::Status => Ok(Some(client.status().await?)),
        Command::ConfigGet => Ok(Some(client.config_get().await?)),
        Command::ConfigApply { params } => Ok(Some(client.config_apply(parse_params(params)?).await?)),
        Command::ConfigPatch { params } => Ok(Some(client.config_patch(parse_params(params)?).await?)),
        Command::Identity => Ok(Some(client.agent_identity_get().await?)),
        Command::UsageCost => Ok(Some(client.usage_cost().await?)),
        Command::Send { params } => Ok(Some(client.send(parse_params(params)?).await?)),
        Command::Agent { params } => Ok(Some(client.agent(parse_params(params)?).await)),
        Command::Cron(sub) => dispatch_cron(sub, client).await,
        Command::Completions { .. } => unreachable!("handled before connecting"),
    }
}

async fn dispatch_cron(command: &CronCommand, client: &GatewayClient) -> Result<Option<Value>, AppError> {
    match command {
        CronCommand::Add { params } => Ok(Some(client.cron_add(parse_params(params)?).await?)),
        CronCommand::List => Ok(Some(client.cron_list().await?)),
        CronCommand::Remove { params } => Ok(Some(client.cron_remove(parse_params(params)?).await?)),
    }
}

fn parse_params(raw: &str) -> Result<Value, AppError> {
    serde_json::from_str(raw).map_err(|error| AppError {
        message: format!("invalid --params JSON: {error}"),
        code: ExitCode::GeneralError,
    })
}

fn print_output(value: &Value, format: &OutputFormat) -> Result<(), AppError> {
    if format.pretty {
        print_json_pretty(value)
    } else {
        print_json(value)
    }
}

fn print_json(value: &impl Serialize) -> Result<(), AppError> {
    let json = serde_json::to_string(value).map_err(|error| AppError {
        message: format!("serialization error: {error}"),
        code: ExitCode::GeneralError,
    })?;
    println!("{json}");
    Ok(())
}

fn print_json_pretty(value: &impl Serialize) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value).map_err(|error| AppError {
        message: format!("serialization error: {error}"),
        code: ExitCode::GeneralError,
    })?;
    println!("{json}");
    Ok(())
}
