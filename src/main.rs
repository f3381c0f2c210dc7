//! # chatload CLI
//!
//! Command-line front end for the chatload library.

use std::io::IsTerminal;
use std::process;
use std::time::Instant;

use clap::Parser as ClapParser;
use serde::Serialize;

use chatload::cli::{Args, Command, OutputStyle};
use chatload::config::Config;
use chatload::import::Importer;
use chatload::progress::stderr_progress;
use chatload::store::{SessionStore, list_sessions};
use chatload::worker::WorkerHandle;
use chatload::{ChatloadError, logging};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), ChatloadError> {
    let args = <Args as ClapParser>::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(dir) = &args.data_dir {
        config.import.data_dir.clone_from(dir);
    }
    if let Some(level) = args.log_level() {
        config.logging.level = level.to_string();
    }
    config.logging.ansi = config.logging.ansi && std::io::stderr().is_terminal();
    let _guard = logging::init(&config.logging)?;

    if args.command == Command::Sessions {
        return print_sessions(&config, args.output);
    }

    let start = Instant::now();
    let worker = WorkerHandle::spawn(Importer::new(config.import.clone()), config.worker.clone())?;
    match &args.command {
        Command::Detect { path } => {
            let format = worker.detect(path)?;
            emit(args.output, &format, || format.to_string())?;
        }
        Command::Preview { path } => {
            let info = worker.preview_file(path, Some(stderr_progress()))?;
            emit(args.output, &info, || {
                format!(
                    "Name:     {}\nFormat:   {}\nPlatform: {}\nMessages: {}\nMembers:  {}\nSkipped:  {}\nSize:     {} bytes",
                    info.name,
                    info.format,
                    info.platform,
                    info.message_count,
                    info.member_count,
                    info.skipped_messages,
                    info.file_size
                )
            })?;
        }
        Command::Import { path } => {
            let outcome = worker.import_file(path, Some(stderr_progress()))?;
            emit(args.output, &outcome, || {
                format!(
                    "Session:  {}\nChat:     {}\nPlatform: {}\nMessages: {}\nMembers:  {}\nSkipped:  {}",
                    outcome.session_id,
                    outcome.chat_name,
                    outcome.platform,
                    outcome.message_count,
                    outcome.member_count,
                    outcome.skipped_messages
                )
            })?;
        }
        Command::Sessions => {}
    }
    worker.shutdown();
    tracing::debug!(elapsed = ?start.elapsed(), "finished");
    Ok(())
}

fn print_sessions(config: &Config, output: OutputStyle) -> Result<(), ChatloadError> {
    let data_dir = &config.import.data_dir;
    let mut summaries = Vec::new();
    for id in list_sessions(data_dir)? {
        summaries.push(SessionStore::open(data_dir, &id)?.summary()?);
    }
    emit(output, &summaries, || {
        summaries
            .iter()
            .map(|s| {
                let (name, platform) = s
                    .meta
                    .as_ref()
                    .map_or(("?", "?"), |m| (m.name.as_str(), m.platform.as_str()));
                format!(
                    "{}\t{}\t{}\t{} messages\t{} members",
                    s.id, platform, name, s.message_count, s.member_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn emit<T: Serialize>(
    output: OutputStyle,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<(), ChatloadError> {
    match output {
        OutputStyle::Text => {
            let text = text();
            if !text.is_empty() {
                println!("{text}");
            }
        }
        OutputStyle::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
