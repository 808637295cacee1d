// EOS Refund Audit
//
// 1. Loads the expected refunds from CSV
// 2. Transaction pass: each listed transaction must contain the expected
//    transfers from the compromised account to the bridge
// 3. Proposal pass: the refund multisig proposal tree must pay every expected
//    address back to the recovery address
//
// Exit status: 0 when every selected pass is valid, 1 when any is invalid,
// 2 when the audit could not run to completion.

use clap::Parser;
use eos_refund_audit::config::{AuditConfig, Options};
use eos_refund_audit::ledger::chain::ChainClient;
use eos_refund_audit::ledger::indexer::IndexerClient;
use eos_refund_audit::reconcile::{ProposalReport, TransactionReport};
use eos_refund_audit::{load_records, reconcile_proposal, reconcile_transactions, PassReport, RpcLedger};
use eyre::WrapErr;
use serde::Serialize;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

#[derive(Serialize, Default)]
struct AuditSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    transactions: Option<PassReport<TransactionReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proposal: Option<PassReport<ProposalReport>>,
}

impl AuditSummary {
    fn valid(&self) -> bool {
        self.transactions.as_ref().map_or(true, |r| r.valid)
            && self.proposal.as_ref().map_or(true, |r| r.valid)
    }
}

fn init_tracing() -> eyre::Result<()> {
    let fmt_builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stderr().is_terminal());

    // Compact output on a terminal, JSON lines otherwise
    if std::io::stderr().is_terminal() {
        tracing::subscriber::set_global_default(fmt_builder.compact().finish())?;
    } else {
        tracing::subscriber::set_global_default(fmt_builder.json().finish())?;
    }
    Ok(())
}

fn build_ledger(config: &AuditConfig) -> eyre::Result<RpcLedger> {
    let endpoints = &config.endpoints;
    let http = reqwest::Client::builder()
        .timeout(endpoints.http_timeout)
        .build()
        .wrap_err("failed to build HTTP client")?;

    let indexer = endpoints.api_key.clone().map(|key| {
        IndexerClient::new(http.clone(), &endpoints.indexer, &endpoints.indexer_auth, key)
    });
    let chain = ChainClient::new(http, &endpoints.node);

    Ok(RpcLedger::new(indexer, chain))
}

async fn run(config: AuditConfig) -> eyre::Result<AuditSummary> {
    let records = load_records(&config.records_path)
        .wrap_err_with(|| format!("failed to load records from {}", config.records_path.display()))?;

    let ledger = build_ledger(&config)?;
    let mut summary = AuditSummary::default();

    if config.pass.transactions() {
        let report = reconcile_transactions(&ledger, &records, &config.transactions)
            .await
            .wrap_err("transaction pass failed")?;
        println!("{}", if report.valid { "Address Valid" } else { "Address Invalid" });
        summary.transactions = Some(report);
    }

    if config.pass.proposal() {
        let report = reconcile_proposal(&ledger, &records, &config.proposal)
            .await
            .wrap_err("proposal pass failed")?;
        println!("{}", if report.valid { "Proposal Valid" } else { "Proposal Invalid" });
        summary.proposal = Some(report);
    }

    if config.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Exits on `--help` or invalid arguments
    let options = Options::parse();

    if let Err(err) = init_tracing() {
        eprintln!("failed to initialize logging: {err:?}");
        return ExitCode::from(2);
    }

    let config = match options.into_config() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {:?}", err);
            return ExitCode::from(2);
        }
    };

    match run(config).await {
        Ok(summary) if summary.valid() => {
            info!("audit passed");
            ExitCode::SUCCESS
        }
        Ok(_) => {
            info!("audit found discrepancies");
            ExitCode::from(1)
        }
        Err(err) => {
            error!("audit aborted: {:?}", err);
            ExitCode::from(2)
        }
    }
}
