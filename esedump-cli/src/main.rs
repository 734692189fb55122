//! Dumps the tables of an extensible storage engine database as JSON.
//!
//! ```bash
//! # Dump the browser cache, stopping the processes that hold it open
//! esedump --profile webcache WebCacheV01.dat
//!
//! # Dump a single table of a copied database, allowing repair
//! esedump --allow-repair --table Containers -o out.json copy.dat
//! ```

use std::{
    fs::File,
    io::{self, BufWriter, IsTerminal, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use esedump::{
    dump_with_consent,
    engine::{Credentials, Engine},
    exec::scan::DatabaseResult,
    process::SystemProcesses,
    repair::Esentutl,
    DumpOptions,
};
use tracing::{info, warn};

mod config;

use config::{Profile, Settings, MAX_FUTURE_TIME_LIMIT_DAYS};

/// Reads extensible storage engine databases.
#[derive(Parser, Debug)]
#[command(name = "esedump", version, about)]
struct Args {
    /// Database file
    path: PathBuf,

    /// Settings for a well-known database
    #[arg(short = 'P', long, value_enum)]
    profile: Option<Profile>,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE", env = "ESEDUMP_CONFIG")]
    config: Option<PathBuf>,

    /// Transaction log prefix
    #[arg(short = 'l', long, env = "ESEDUMP_LOG_PREFIX")]
    log_prefix: Option<String>,

    /// Page size, in bytes (read from the file if unset or invalid)
    #[arg(long, env = "ESEDUMP_PAGE_SIZE")]
    page_size: Option<u32>,

    /// Stop this process before opening the database (repeatable)
    #[arg(long = "stop", value_name = "NAME")]
    stop_processes: Vec<String>,

    /// Don't replay the transaction logs when opening
    #[arg(long)]
    no_recovery: bool,

    /// Enable circular logging for the engine instance
    #[arg(long)]
    circular_logging: bool,

    /// Only dump this table (repeatable)
    #[arg(short = 't', long = "table", value_name = "NAME")]
    tables: Vec<String>,

    /// Days past now an integer may lie and still be read as a timestamp
    #[arg(
        long,
        value_name = "DAYS",
        value_parser = clap::value_parser!(u32).range(..=i64::from(MAX_FUTURE_TIME_LIMIT_DAYS))
    )]
    future_time_limit: Option<u32>,

    /// Output binary columns as hex instead of text
    #[arg(long)]
    binary_as_bytes: bool,

    /// Session user name
    #[arg(short = 'U', long, env = "ESEDUMP_USER")]
    user: Option<String>,

    /// Session password
    #[arg(short = 'W', long, env = "ESEDUMP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Allow log recovery and repair to modify the database and its logs
    /// without asking
    #[arg(long)]
    allow_repair: bool,

    /// Output file (defaults to the standard output)
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Enable debug output
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let settings = load_settings(&args)?;
    let options = dump_options(&args, settings, args.allow_repair)?;

    let result = with_engine(|engine| {
        dump_with_consent(engine, &Esentutl::default(), &SystemProcesses, &options, || {
            Ok(confirm_repair()?)
        })
    })?;
    for diagnostic in &result.diagnostics {
        warn!(?diagnostic, "incomplete dump");
    }
    write_output(&result, args.output.as_ref())
}

#[cfg(windows)]
fn with_engine<T>(f: impl FnOnce(&dyn Engine) -> esedump::DbResult<T>) -> Result<T> {
    let engine = esedump::engine::esent::EsentEngine::load()?;
    Ok(f(&engine)?)
}

#[cfg(not(windows))]
fn with_engine<T>(_: impl FnOnce(&dyn Engine) -> esedump::DbResult<T>) -> Result<T> {
    Err(esedump::Error::EngineUnavailable("no native engine on this platform".into()).into())
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = args.profile.map(Profile::settings).unwrap_or_default();
    if let Some(path) = &args.config {
        settings = settings.merge(Settings::from_file(path)?);
    }

    let overrides = Settings {
        log_prefix: args.log_prefix.clone(),
        stop_processes: (!args.stop_processes.is_empty()).then(|| args.stop_processes.clone()),
        page_size: args.page_size,
        recovery: args.no_recovery.then_some(false),
        circular_logging: args.circular_logging.then_some(true),
        username: args.user.clone(),
        future_time_limit_days: args.future_time_limit,
        binary_as_bytes: args.binary_as_bytes.then_some(true),
        tables: (!args.tables.is_empty()).then(|| args.tables.clone()),
    };
    Ok(settings.merge(overrides))
}

fn dump_options(args: &Args, settings: Settings, consent: bool) -> Result<DumpOptions> {
    let defaults = DumpOptions::new(&args.path);
    let future_time_limit = settings.future_time_limit()?;
    let credentials = settings.username.map(|username| Credentials {
        username,
        password: args.password.clone().unwrap_or_default(),
    });
    Ok(DumpOptions {
        log_prefix: settings.log_prefix.unwrap_or(defaults.log_prefix),
        stop_processes: settings.stop_processes.unwrap_or_default(),
        page_size: settings.page_size,
        recovery: settings.recovery.unwrap_or(defaults.recovery),
        circular_logging: settings.circular_logging.unwrap_or(defaults.circular_logging),
        credentials,
        future_time_limit,
        consent,
        binary_as_bytes: settings.binary_as_bytes.unwrap_or(defaults.binary_as_bytes),
        tables: settings.tables,
        ..defaults
    })
}

/// Asks whether the recovery tiers may run. Never allowed without a terminal.
fn confirm_repair() -> io::Result<bool> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(false);
    }
    eprint!("Allow log recovery and repair to modify the database if it can't be opened? [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    stdin.read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn write_output(result: &DatabaseResult, path: Option<&PathBuf>) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("could not create `{}`", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, result)?;
            writer.flush()?;
            info!(path = %path.display(), "wrote dump");
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, result)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

/// Sets up tracing subscriber.
fn setup_tracing(verbose: bool) {
    use tracing_subscriber::{
        fmt::{format::FmtSpan, layer},
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    let default = if verbose { "debug" } else { "warn" };
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or(default.into());
    let fmt_layer = layer()
        .with_writer(io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
