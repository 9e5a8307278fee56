//! Flightdeck CLI entry point.

use flightdeck_cache::{CacheEvent, QueryStatus};
use flightdeck_client::app::App;
use flightdeck_client::config::FlightdeckConfig;
use flightdeck_client::error::ClientError;
use flightdeck_client::mutations::MutationState;
use flightdeck_client::queries::keys;
use flightdeck_client::queries::QueryResult;
use flightdeck_client::telemetry;
use flightdeck_core::{AlertId, AnalysisId, CreateAnalysisRequest};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

const USAGE: &str = "flightdeck --config <path> <command>

Commands:
  login <token>
  logout
  alerts [--skip N] [--limit N]
  stats
  ack <alert-id>
  resolve <alert-id>
  analyses [--skip N] [--limit N]
  analysis <analysis-id>
  create-analysis <aircraft-id> <file-name> [notes]
  delete-analysis <analysis-id>
  watch [--skip N] [--limit N]";

const DEFAULT_ALERTS_LIMIT: u32 = 50;
const DEFAULT_ANALYSES_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Login(String),
    Logout,
    Alerts { skip: u32, limit: u32 },
    Stats,
    Acknowledge(AlertId),
    Resolve(AlertId),
    Analyses { skip: u32, limit: u32 },
    Analysis(AnalysisId),
    CreateAnalysis(CreateAnalysisRequest),
    DeleteAnalysis(AnalysisId),
    Watch { skip: u32, limit: u32 },
}

impl Command {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, ClientError> {
        let mut positional = Vec::new();
        let mut skip = None;
        let mut limit = None;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    args.next();
                }
                "--skip" => skip = Some(parse_number("--skip", args.next())?),
                "--limit" => limit = Some(parse_number("--limit", args.next())?),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let name = positional.next().ok_or_else(usage)?;
        let mut required = |what: &str| {
            positional
                .next()
                .ok_or_else(|| ClientError::Usage(format!("missing {}\n\n{}", what, USAGE)))
        };
        let skip = skip.unwrap_or(0);

        let command = match name.as_str() {
            "login" => Command::Login(required("token")?),
            "logout" => Command::Logout,
            "alerts" => Command::Alerts {
                skip,
                limit: limit.unwrap_or(DEFAULT_ALERTS_LIMIT),
            },
            "stats" => Command::Stats,
            "ack" | "acknowledge" => Command::Acknowledge(AlertId::new(required("alert id")?)),
            "resolve" => Command::Resolve(AlertId::new(required("alert id")?)),
            "analyses" => Command::Analyses {
                skip,
                limit: limit.unwrap_or(DEFAULT_ANALYSES_LIMIT),
            },
            "analysis" => Command::Analysis(AnalysisId::new(required("analysis id")?)),
            "create-analysis" => {
                let aircraft_id = required("aircraft id")?;
                let file_name = required("file name")?;
                let notes = required("notes").ok();
                Command::CreateAnalysis(CreateAnalysisRequest {
                    aircraft_id,
                    file_name,
                    notes,
                })
            }
            "delete-analysis" => Command::DeleteAnalysis(AnalysisId::new(required("analysis id")?)),
            "watch" => Command::Watch {
                skip,
                limit: limit.unwrap_or(DEFAULT_ALERTS_LIMIT),
            },
            other => {
                return Err(ClientError::Usage(format!(
                    "unknown command '{}'\n\n{}",
                    other, USAGE
                )))
            }
        };
        Ok(command)
    }
}

fn usage() -> ClientError {
    ClientError::Usage(USAGE.to_string())
}

fn parse_number(flag: &str, value: Option<String>) -> Result<u32, ClientError> {
    value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ClientError::Usage(format!("{} expects a non-negative integer", flag)))
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let config = FlightdeckConfig::load()?;
    telemetry::init_tracing(&config.log)?;
    let command = Command::parse(std::env::args().skip(1))?;

    let app = App::from_config(&config)?;
    let result = run(&app, command).await;
    app.shutdown();
    result
}

async fn run(app: &App, command: Command) -> Result<(), ClientError> {
    let queries = app.queries();
    let mutations = app.mutations();
    match command {
        Command::Login(token) => app.login(&token)?,
        Command::Logout => app.logout()?,
        Command::Alerts { skip, limit } => {
            print_result(queries.alerts(skip, limit, false).load().await)?
        }
        Command::Stats => print_result(queries.alert_stats(false).load().await)?,
        Command::Acknowledge(id) => {
            print_state(mutations.acknowledge_alert().mutate(&id).await)?
        }
        Command::Resolve(id) => print_state(mutations.resolve_alert().mutate(&id).await)?,
        Command::Analyses { skip, limit } => {
            print_result(queries.analyses(skip, limit).load().await)?
        }
        Command::Analysis(id) => print_result(queries.analysis(&id).load().await)?,
        Command::CreateAnalysis(request) => {
            print_state(mutations.create_analysis().mutate(&request).await)?
        }
        Command::DeleteAnalysis(id) => {
            print_state(mutations.delete_analysis().mutate(&id).await)?
        }
        Command::Watch { skip, limit } => watch(app, skip, limit).await?,
    }
    Ok(())
}

fn print_result<T: Serialize>(result: QueryResult<T>) -> Result<(), ClientError> {
    if let Some(error) = result.error {
        return Err(error.into());
    }
    println!("{}", serde_json::to_string_pretty(&result.data)?);
    Ok(())
}

fn print_state<T: Serialize>(state: MutationState<T>) -> Result<(), ClientError> {
    match state {
        MutationState::Success(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        MutationState::Error(error) => Err(error.into()),
        MutationState::Idle | MutationState::Pending => Ok(()),
    }
}

/// Poll alerts and stats, printing each refresh until interrupted or the
/// session expires.
async fn watch(app: &App, skip: u32, limit: u32) -> Result<(), ClientError> {
    let queries = app.queries();
    let alerts = queries.alerts(skip, limit, true);
    let stats = queries.alert_stats(true);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = app.cache().subscribe(move |event| {
        if let CacheEvent::Transition {
            key,
            status: QueryStatus::Success,
            ..
        } = event
        {
            let _ = tx.send(key.clone());
        }
    });

    print_result(alerts.load().await)?;
    print_result(stats.load().await)?;
    info!(skip, limit, "Watching alerts (Ctrl-C to stop)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = app.session_expired() => {
                warn!("Session expired, stopping watch");
                break;
            }
            Some(key) = rx.recv() => {
                if key == *alerts.key() {
                    print_result(alerts.result())?;
                } else if key == keys::alert_stats() {
                    print_result(stats.result())?;
                }
            }
        }
    }
    Ok(())
}
