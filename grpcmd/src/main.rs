//! # grpcmd CLI Entry Point
//!
//! The main executable for the grpcmd tool. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Installs logging and parses command-line arguments using [`cli::Cli`].
//! 2. **Connection**: Opens one `grpcmd_core` session per command, or loads local proto files.
//! 3. **Execution**: Resolves the method and delegates the call to the session.
//! 4. **Presentation**: Prints responses to stdout and errors to stderr, then exits with
//!    `0` on success, `1` on a local failure or `64 + code` when the server returned a
//!    non-OK status.

mod cli;
mod formatter;
mod logging;
mod target;

use clap::Parser;
use cli::{Cli, Commands, ConfigCommands, SchemaArgs};
use formatter::{FormattedString, ServiceList};
use grpcmd_core::{
    InvokeError, ProtocolStatusError,
    request::{parse_request, parse_request_heuristic},
    store::ConfigStore,
};
use std::{
    io::{self, IsTerminal, Read},
    process,
};
use target::Target;

/// Exit code of every failure that is not a gRPC status.
const LOCAL_FAILURE: i32 = 1;

struct Failure {
    message: FormattedString,
    code: i32,
}

impl Failure {
    fn local(err: impl Into<FormattedString>) -> Self {
        Self {
            message: err.into(),
            code: LOCAL_FAILURE,
        }
    }

    fn status(err: ProtocolStatusError) -> Self {
        Self {
            code: err.exit_code(),
            message: err.into(),
        }
    }

    fn invoke(err: InvokeError) -> Self {
        match err {
            InvokeError::Status(err) => Self::status(err),
            err => Self::local(err),
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let args = Cli::parse();
    let schema = &args.schema;

    let outcome = match args.command {
        Commands::Call {
            address,
            method,
            data,
            headers,
            result,
            heuristic,
        } => {
            let call = CallArgs {
                method,
                data,
                headers,
                result,
                heuristic,
            };
            run_call(&address, call, schema).await
        }
        Commands::List { address } => list_services(address.as_deref(), schema)
            .await
            .map_err(Failure::local),
        Commands::Methods { address, short } => list_methods(address.as_deref(), short, schema)
            .await
            .map_err(Failure::local),
        Commands::Describe { method, address } => {
            describe_method(address.as_deref(), &method, false, schema)
                .await
                .map_err(Failure::local)
        }
        Commands::Template { method, address } => {
            describe_method(address.as_deref(), &method, true, schema)
                .await
                .map_err(Failure::local)
        }
        Commands::Config { sub } => run_config(sub).await.map_err(Failure::local),
    };

    if let Err(failure) = outcome {
        eprintln!("{}", failure.message);
        process::exit(failure.code);
    }
}

struct CallArgs {
    method: String,
    data: Option<String>,
    headers: Vec<String>,
    result: bool,
    heuristic: bool,
}

async fn run_call(address: &str, args: CallArgs, schema: &SchemaArgs) -> Result<(), Failure> {
    let raw = read_request(args.data).map_err(Failure::local)?;

    let envelope = if args.heuristic {
        parse_request_heuristic(&raw)
    } else {
        parse_request(&raw)
    }
    .map_err(Failure::local)?;

    let mut headers = envelope.headers;
    headers.extend(args.headers);

    let mut session = target::connect(address, schema).await.map_err(Failure::local)?;

    if args.result {
        match session
            .call_with_result(&args.method, &envelope.body, &headers)
            .await
        {
            Ok(result) => {
                println!("{}", serde_json::to_string_pretty(&result).map_err(Failure::local)?)
            }
            Err(InvokeError::Status(err)) => {
                if let Some(partial) = err.result() {
                    println!("{}", serde_json::to_string_pretty(partial).map_err(Failure::local)?);
                }
                return Err(Failure::status(err));
            }
            Err(err) => return Err(Failure::invoke(err)),
        }
    } else {
        let outcome = session
            .call(&args.method, &envelope.body, &headers, io::stdout())
            .await
            .map_err(Failure::invoke)?;

        tracing::debug!(responses = outcome.response_count(), "call succeeded");
    }

    session.close();
    Ok(())
}

/// The request text given on the command line, or piped through stdin.
fn read_request(data: Option<String>) -> io::Result<String> {
    if let Some(data) = data {
        return Ok(data);
    }

    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }

    let mut raw = String::new();
    stdin.read_to_string(&mut raw)?;
    Ok(raw)
}

async fn list_services(address: Option<&str>, schema: &SchemaArgs) -> Result<(), FormattedString> {
    let mut target = Target::open(address, schema).await?;

    let services = target.services().await?;
    println!("{}", FormattedString::from(ServiceList(services)));

    target.close();
    Ok(())
}

async fn list_methods(
    address: Option<&str>,
    short: bool,
    schema: &SchemaArgs,
) -> Result<(), FormattedString> {
    let mut target = Target::open(address, schema).await?;

    if short {
        for label in target.nonambiguous_methods().await? {
            println!("{label}");
        }
    } else {
        println!("{}", target.listing().await?);
    }

    target.close();
    Ok(())
}

async fn describe_method(
    address: Option<&str>,
    hint: &str,
    template_only: bool,
    schema: &SchemaArgs,
) -> Result<(), FormattedString> {
    let mut target = Target::open(address, schema).await?;

    let description = target.describe(hint).await?;
    if template_only {
        println!("{}", description.template());
    } else {
        println!("{}", FormattedString::from(description));
    }

    target.close();
    Ok(())
}

async fn run_config(command: ConfigCommands) -> Result<(), FormattedString> {
    let store = ConfigStore::open_default()?;

    match command {
        ConfigCommands::Get { key } => println!("{}", store.get(&key)?),
        ConfigCommands::Set { key, value } => store.set(&key, &value)?,
        ConfigCommands::Remove { key } => store.remove(&key)?,
        ConfigCommands::Watch => {
            let watcher = store.watch(|key| println!("{key}"))?;
            eprintln!("Watching {} for changes, press Ctrl-C to stop.", store.dir().display());

            tokio::signal::ctrl_c().await?;
            watcher.stop();
        }
    }

    Ok(())
}
