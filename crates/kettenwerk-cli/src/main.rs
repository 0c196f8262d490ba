// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kettenwerk — operator command-line tool.
//
// Entry point. Initialises logging, opens the trail, and dispatches the
// subcommand. Exits non-zero when verification finds a break so the tool
// can drive monitoring jobs directly.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use kettenwerk_canon::parse_strict;
use kettenwerk_core::config::TrailConfig;
use kettenwerk_core::error::{KettenwerkError, Result};
use kettenwerk_core::operator_errors::explain;
use kettenwerk_core::types::{EventInput, RecordContext, StreamScope};
use kettenwerk_trail::AuditTrail;

#[derive(Parser)]
#[command(name = "kettenwerk", version, about = "Tamper-evident audit trail tool")]
struct Cli {
    /// Path to the audit database.
    #[arg(long, global = true, default_value = "kettenwerk.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record one audited event.
    Record {
        scope: String,
        action: String,
        entity_type: String,
        #[arg(long)]
        entity_id: Option<String>,
        #[arg(long)]
        actor: Option<String>,
        /// Changed data as a JSON object.
        #[arg(long)]
        changes: Option<String>,
        /// Read the changes JSON from a file instead.
        #[arg(long, conflicts_with = "changes")]
        changes_file: Option<PathBuf>,
        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Print a range of links from a chain.
    Chain {
        scope: String,
        #[arg(long, default_value_t = 1)]
        from: u64,
        #[arg(long)]
        to: Option<u64>,
        /// Emit full links as JSON instead of a summary line per link.
        #[arg(long)]
        json: bool,
    },

    /// Verify chain integrity (all scopes when none given).
    Verify {
        scope: Option<String>,
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
        /// Replay from genesis, ignoring checkpoints.
        #[arg(long)]
        full: bool,
    },

    /// Verify to the tip and record a checkpoint (all scopes when none
    /// given).
    Checkpoint { scope: Option<String> },

    /// List every scope in the store.
    Scopes,

    /// Export a compliance report as JSON.
    Report {
        scope: String,
        #[arg(long, default_value_t = 1)]
        from: u64,
        #[arg(long)]
        to: Option<u64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    tracing::info!("kettenwerk starting");

    let cli = Cli::parse();

    match run(cli) {
        Ok(clean) => {
            if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            let human = explain(&err);
            eprintln!("error: {}", human.message);
            eprintln!("  {}", human.suggestion);
            ExitCode::FAILURE
        }
    }
}

/// Run the selected command. `Ok(false)` means "completed, but a chain
/// failed verification" — reported on stdout, non-zero exit.
fn run(cli: Cli) -> Result<bool> {
    let trail = AuditTrail::open(TrailConfig {
        db_path: cli.db,
        ..Default::default()
    })?;

    match cli.command {
        Command::Record {
            scope,
            action,
            entity_type,
            entity_id,
            actor,
            changes,
            changes_file,
            correlation_id,
        } => {
            let scope = StreamScope::new(scope)?;
            let mut event = EventInput::new(action, entity_type);
            if let Some(id) = entity_id {
                event = event.entity_id(id);
            }
            if let Some(actor) = actor {
                event = event.actor(actor);
            }
            let changes = match (changes, changes_file) {
                (Some(text), _) => Some(text),
                (None, Some(path)) => Some(std::fs::read_to_string(path)?),
                (None, None) => None,
            };
            if let Some(changes) = changes {
                event = event.changes(parse_strict(&changes)?);
            }
            if let Some(correlation_id) = correlation_id {
                event = event.context(RecordContext {
                    ip: None,
                    user_agent: None,
                    correlation_id: Some(correlation_id),
                });
            }

            // Contention is the one failure worth retrying whole.
            let mut attempt = 0u64;
            let link = loop {
                match trail.record_event(&scope, event.clone()) {
                    Ok(link) => break link,
                    Err(err) if err.is_retriable() && attempt < 3 => {
                        attempt += 1;
                        std::thread::sleep(std::time::Duration::from_millis(50 * attempt));
                    }
                    Err(err) => return Err(err),
                }
            };
            println!(
                "recorded {} as {}#{} ({})",
                link.link_id, link.scope, link.sequence, link.chain_hash
            );
            Ok(true)
        }

        Command::Chain {
            scope,
            from,
            to,
            json,
        } => {
            let scope = StreamScope::new(scope)?;
            let links = trail.get_chain(&scope, from, to.unwrap_or(u64::MAX))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&links).map_err(
                    |e| KettenwerkError::StoreUnavailable(e.to_string()),
                )?);
            } else {
                for link in &links {
                    let summary = match link.record() {
                        Ok(r) => format!(
                            "{} {} {}",
                            r.action,
                            r.entity_type,
                            r.entity_id.unwrap_or_default()
                        ),
                        Err(_) => "(unreadable payload)".to_string(),
                    };
                    println!(
                        "{:>6}  {}  {}  {}",
                        link.sequence, link.recorded_at, link.chain_hash, summary
                    );
                }
                println!("{} link(s)", links.len());
            }
            Ok(true)
        }

        Command::Verify {
            scope,
            from,
            to,
            full,
        } => {
            let scopes = select_scopes(&trail, scope)?;
            let from = if full { from.or(Some(1)) } else { from };
            let mut clean = true;
            for scope in scopes {
                let report = trail.verify_chain(&scope, from, to)?;
                if report.ok {
                    println!(
                        "{scope}: ok ({} link(s) checked{})",
                        report.links_checked,
                        if report.started_from_checkpoint {
                            ", from checkpoint"
                        } else {
                            ""
                        }
                    );
                } else {
                    clean = false;
                    println!(
                        "{scope}: FAILED at sequence {} ({})",
                        report.first_break.unwrap_or_default(),
                        report
                            .reason
                            .map(|r| r.to_string())
                            .unwrap_or_else(|| "cancelled".into())
                    );
                }
            }
            Ok(clean)
        }

        Command::Checkpoint { scope } => {
            let scopes = select_scopes(&trail, scope)?;
            for scope in scopes {
                match trail.checkpoint(&scope)? {
                    Some(cp) => println!(
                        "{scope}: checkpoint at sequence {} ({})",
                        cp.last_verified_sequence, cp.last_verified_hash
                    ),
                    None => println!("{scope}: empty chain, nothing to checkpoint"),
                }
            }
            Ok(true)
        }

        Command::Scopes => {
            for scope in trail.scopes()? {
                match trail.last_link(&scope)? {
                    Some(tip) => println!(
                        "{scope}  {} link(s), last at {}",
                        tip.sequence, tip.recorded_at
                    ),
                    None => println!("{scope}  empty"),
                }
            }
            Ok(true)
        }

        Command::Report { scope, from, to } => {
            let scope = StreamScope::new(scope)?;
            let report = trail.export_report(&scope, from, to.unwrap_or(u64::MAX))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .map_err(|e| KettenwerkError::StoreUnavailable(e.to_string()))?
            );
            Ok(report.verification.ok)
        }
    }
}

/// Resolve an optional scope argument to the scopes to operate on.
fn select_scopes(trail: &AuditTrail, scope: Option<String>) -> Result<Vec<StreamScope>> {
    match scope {
        Some(s) => Ok(vec![StreamScope::new(s)?]),
        None => trail.scopes(),
    }
}
