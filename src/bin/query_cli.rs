// Query Bridge - Command Line Client
// Runs one query in-process and prints the result
// Run with: cargo run --bin query-cli -- --help

use anyhow::Context;
use clap::{Parser, Subcommand};
use query_bridge::auth::{AuthType, Headers, OAuth2GrantType};
use query_bridge::config::{init_logging, Settings};
use query_bridge::models::command::{DEFAULT_MAX_ENDPOINTS, DEFAULT_MAX_TABLES};
use query_bridge::presentation::OutputFormat;
use query_bridge::server::handlers::{
    ApiQueryPayload, AuthPayload, DatabaseQueryPayload, OAuth2Payload,
};
use query_bridge::{QueryService, QueryServiceBuilder};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "query-cli")]
#[command(about = "Query Bridge CLI - Ask databases and APIs questions in natural language")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: text, json or markdown
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Query a relational database
    Database {
        /// Connection URL
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,

        /// Question in natural language
        #[arg(short, long)]
        query: String,

        #[arg(long, default_value_t = DEFAULT_MAX_TABLES)]
        max_tables: usize,

        /// Timeout in seconds for the whole query
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Query an HTTP API described by Swagger/OpenAPI
    Api {
        /// Spec URL or the docs page that embeds it
        #[arg(long)]
        swagger_url: String,

        /// Question in natural language
        #[arg(short, long)]
        query: String,

        #[arg(long, default_value_t = DEFAULT_MAX_ENDPOINTS)]
        max_endpoints: usize,

        /// none, bearer, api_key, basic or oauth2
        #[arg(long, default_value = "none")]
        auth_type: AuthType,

        #[arg(long)]
        token: Option<String>,

        #[arg(long)]
        api_key: Option<String>,

        #[arg(long)]
        api_key_header: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        oauth2_token_url: Option<String>,

        #[arg(long, default_value = "client_credentials")]
        oauth2_grant_type: OAuth2GrantType,

        #[arg(long)]
        oauth2_client_id: Option<String>,

        #[arg(long)]
        oauth2_client_secret: Option<String>,

        /// Space or comma separated scopes
        #[arg(long)]
        oauth2_scopes: Option<String>,

        #[arg(long)]
        oauth2_audience: Option<String>,

        /// Extra token request field, repeatable: --oauth2-extra-param resource=https://api
        #[arg(long = "oauth2-extra-param", value_parser = parse_key_value)]
        oauth2_extra_params: Vec<(String, String)>,

        /// Extra request header, repeatable: --header X-Tenant=acme
        #[arg(long = "header", value_parser = parse_key_value)]
        headers: Vec<(String, String)>,

        /// Timeout in seconds for the whole query
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("name missing in '{}'", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn split_scopes(raw: Option<String>) -> Vec<String> {
    raw.map(|scopes| {
        scopes
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let presenter = cli.format.presenter();

    let settings = Settings::load().context("failed to load settings")?;
    let service = QueryServiceBuilder::from_settings(&settings)
        .build()
        .context("failed to build query service")?;

    let result = match cli.command {
        Commands::Database {
            database_url,
            query,
            max_tables,
            timeout,
        } => {
            let payload = DatabaseQueryPayload {
                database_url,
                query,
                max_tables,
                timeout_secs: timeout,
            };
            match payload.into_command() {
                Ok(command) => service.execute_database_query(&command).await,
                Err(e) => {
                    eprintln!("{}", presenter.present_error(&e));
                    return Ok(ExitCode::from(2));
                }
            }
        }
        Commands::Api {
            swagger_url,
            query,
            max_endpoints,
            auth_type,
            token,
            api_key,
            api_key_header,
            username,
            password,
            oauth2_token_url,
            oauth2_grant_type,
            oauth2_client_id,
            oauth2_client_secret,
            oauth2_scopes,
            oauth2_audience,
            oauth2_extra_params,
            headers,
            timeout,
        } => {
            // Password grants reuse --username/--password
            let oauth2 = oauth2_token_url.map(|token_url| OAuth2Payload {
                token_url,
                grant_type: oauth2_grant_type,
                client_id: oauth2_client_id,
                client_secret: oauth2_client_secret,
                username: username.clone(),
                password: password.clone(),
                scopes: split_scopes(oauth2_scopes),
                audience: oauth2_audience,
                extra_params: oauth2_extra_params.into_iter().collect(),
            });
            let payload = ApiQueryPayload {
                swagger_url,
                query,
                auth: Some(AuthPayload {
                    auth_type,
                    token,
                    api_key,
                    api_key_header,
                    username,
                    password,
                    oauth2,
                }),
                max_endpoints,
                headers: headers.into_iter().collect::<Headers>(),
                timeout_secs: timeout,
            };
            match payload.into_command() {
                Ok(command) => service.execute_api_query(&command).await,
                Err(e) => {
                    eprintln!("{}", presenter.present_error(&e));
                    return Ok(ExitCode::from(2));
                }
            }
        }
    };

    println!("{}", presenter.present(&result));
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
