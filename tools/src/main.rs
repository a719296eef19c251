//! ledger-server: UDP entitlement ledger with periodic billing reconciliation.
//!
//! Usage:
//!   ledger-server --config ./data/server.json
//!   ledger-server --config ./data/server.json --once

use anyhow::Result;
use entitlement_core::{
    billing::HttpBilling,
    config::ServerConfig,
    handler::RequestHandler,
    reconcile::{PassOutcome, Reconciler},
    scheduler::ReconcileScheduler,
    server::DatagramServer,
    store::{LedgerStore, SharedLedger},
};
use std::env;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].as_str())
        .unwrap_or("./data/server.json");
    let once = args.iter().any(|a| a == "--once");

    let config = ServerConfig::load(config_path)?;
    log::info!("loaded config from {config_path}");

    let ledger = SharedLedger::new(LedgerStore::open(&config.storage)?);
    let reconciler = Arc::new(Reconciler::new(
        ledger.clone(),
        Box::new(HttpBilling::new(&config.billing)),
        &config.reconciliation,
    ));

    if once {
        print_outcome(&reconciler.run_pass());
        return Ok(());
    }

    let pass = Arc::clone(&reconciler);
    let _scheduler = ReconcileScheduler::start(
        Duration::from_secs(config.reconciliation.interval_secs),
        move || {
            pass.run_pass();
        },
    );

    let handler = RequestHandler::new(ledger, &config);
    let server = DatagramServer::bind(&config.transport, handler)?;
    println!("ledger-server listening on {}", server.local_addr()?);
    server.serve_forever();
    Ok(())
}

fn print_outcome(outcome: &PassOutcome) {
    match outcome {
        PassOutcome::Skipped => println!("ledger empty, nothing to reconcile"),
        PassOutcome::Aborted { pass_id, reason } => {
            println!("pass {pass_id} aborted: {reason}");
        }
        PassOutcome::Completed(summary) => {
            println!("pass {}", summary.pass_id);
            println!("  kept:     {}", summary.kept);
            println!("  pruned:   {}", summary.pruned.len());
            for email in &summary.pruned {
                println!("    - {email}");
            }
            println!("  credited: {}", summary.credited.len());
            for email in &summary.credited {
                println!("    + {email}");
            }
        }
    }
}
