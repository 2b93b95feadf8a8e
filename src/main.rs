//! `casalink-sync`: command-line front end for the CasaLink offline queue.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use casalink_sync::api::HttpRemoteStore;
use casalink_sync::models::{
    BillStatus, MaintenanceRequest, MaintenanceStatus, NewBill, NewTenant, PaymentMethod,
    PaymentRecord, Priority,
};
use casalink_sync::storage::MemoryStorage;
use casalink_sync::sync::queue::now_ms;
use casalink_sync::sync::{DrainOutcome, MutationError, PendingOperation, SyncDaemon};
use casalink_sync::{MutationOutcome, OutcomeTag, SyncConfig, SyncService, SyncSnapshot};

#[derive(Parser, Debug)]
#[command(name = "casalink-sync", version, about = "Queue and replay CasaLink writes")]
struct Cli {
    /// Document store base URL (overrides CASALINK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Queue directory (overrides CASALINK_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Failed replays before a write needs attention
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Start offline: writes are queued instead of sent
    #[arg(long, global = true)]
    offline: bool,

    /// Keep the queue in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the sync indicator state
    Status,
    /// List pending writes in replay order
    List,
    /// List writes that need attention
    Attention,
    /// Move an attention entry back into the queue
    Retry { id: String },
    /// Drop an attention entry
    Discard { id: String },
    /// Replay the queue now
    Sync,
    AddTenant {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        landlord_id: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        unit_id: Option<String>,
        #[arg(long)]
        monthly_rent: Option<f64>,
        #[arg(long)]
        lease_start: Option<String>,
    },
    CreateBill {
        #[arg(long)]
        tenant_id: String,
        #[arg(long)]
        landlord_id: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        description: String,
        #[arg(long)]
        due_date: String,
    },
    SubmitMaintenance {
        #[arg(long)]
        tenant_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        unit_id: Option<String>,
        /// low, medium, high or emergency
        #[arg(long, default_value = "medium")]
        priority: String,
    },
    RecordPayment {
        #[arg(long)]
        bill_id: String,
        #[arg(long)]
        tenant_id: String,
        #[arg(long)]
        amount: f64,
        /// cash, bank-transfer, gcash, card or other
        #[arg(long, default_value = "cash")]
        method: String,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Run the sync daemon, reading `online` / `offline` / `sync` / `status`
    /// lines from stdin until EOF
    Watch,
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = SyncConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(max) = cli.max_attempts {
        config.max_attempts = max.max(1);
    }

    let online = !cli.offline;
    let connected = if cli.ephemeral {
        let storage = Arc::new(MemoryStorage::new());
        SyncService::<HttpRemoteStore>::connect_with_storage(&config, storage, online).await
    } else {
        SyncService::<HttpRemoteStore>::connect(&config, online).await
    };
    let (service, daemon) = connected.map_err(|e| format!("Failed to open sync service: {}", e))?;

    match cli.command {
        Command::Status => {
            print_snapshot(&service.snapshot());
            let quarantined = service
                .quarantined()
                .map_err(|e| format!("Failed to read quarantine: {}", e))?;
            if !quarantined.is_empty() {
                println!("{} unreadable entries quarantined", quarantined.len());
            }
            Ok(())
        }
        Command::List => {
            print_operations(&service.pending());
            Ok(())
        }
        Command::Attention => {
            print_operations(&service.needs_attention());
            Ok(())
        }
        Command::Retry { id } => {
            let moved = service
                .retry(&id)
                .map_err(|e| format!("Retry failed: {}", e))?;
            if !moved {
                return Err(format!("No attention entry with id {}", id));
            }
            println!("{} queued for retry", id);
            Ok(())
        }
        Command::Discard { id } => {
            match service
                .discard(&id)
                .map_err(|e| format!("Discard failed: {}", e))?
            {
                Some(op) => {
                    println!("Discarded {} ({})", op.id, op.kind().label());
                    Ok(())
                }
                None => Err(format!("No attention entry with id {}", id)),
            }
        }
        Command::Sync => {
            let outcome = service
                .engine()
                .drain()
                .await
                .map_err(|e| format!("Sync failed: {}", e))?;
            print_drain(&outcome);
            print_snapshot(&service.snapshot());
            Ok(())
        }
        Command::AddTenant {
            name,
            email,
            landlord_id,
            phone,
            unit_id,
            monthly_rent,
            lease_start,
        } => {
            let tenant = NewTenant {
                name,
                email,
                phone,
                unit_id,
                landlord_id,
                monthly_rent,
                lease_start,
            };
            let backlog = service.pending_count();
            let result = service.dispatcher().add_tenant(tenant).await;
            finish_write(&service, backlog, result).await
        }
        Command::CreateBill {
            tenant_id,
            landlord_id,
            amount,
            description,
            due_date,
        } => {
            let bill = NewBill {
                tenant_id,
                landlord_id,
                amount,
                description,
                due_date,
                status: BillStatus::Unpaid,
            };
            let backlog = service.pending_count();
            let result = service.dispatcher().create_bill(bill).await;
            finish_write(&service, backlog, result).await
        }
        Command::SubmitMaintenance {
            tenant_id,
            title,
            description,
            unit_id,
            priority,
        } => {
            let request = MaintenanceRequest {
                tenant_id,
                unit_id,
                title,
                description,
                priority: Priority::from_str(&priority).map_err(|e| e.to_string())?,
                status: MaintenanceStatus::Open,
            };
            let backlog = service.pending_count();
            let result = service.dispatcher().submit_maintenance(request).await;
            finish_write(&service, backlog, result).await
        }
        Command::RecordPayment {
            bill_id,
            tenant_id,
            amount,
            method,
            reference,
        } => {
            let payment = PaymentRecord {
                bill_id,
                tenant_id,
                amount,
                method: PaymentMethod::from_str(&method).map_err(|e| e.to_string())?,
                paid_at: now_ms(),
                reference,
            };
            let backlog = service.pending_count();
            let result = service.dispatcher().record_payment(payment).await;
            finish_write(&service, backlog, result).await
        }
        Command::Watch => watch(service, daemon).await,
    }
}

/// Run the daemon with stdin standing in for the host's network signals.
async fn watch(
    service: SyncService<HttpRemoteStore>,
    mut daemon: SyncDaemon<HttpRemoteStore>,
) -> Result<(), String> {
    let shutdown = daemon.shutdown_handle();
    let daemon_task = tokio::spawn(daemon.run());

    let mut status_rx = service.subscribe();
    let printer = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let snapshot = status_rx.borrow_and_update().clone();
            print_snapshot(&snapshot);
        }
    });

    print_snapshot(&service.snapshot());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("Failed to read stdin: {}", e))?
    {
        match line.trim() {
            "online" => {
                service.set_online(true);
            }
            "offline" => {
                service.set_online(false);
            }
            "sync" => service.sync_now(),
            "status" => print_snapshot(&service.snapshot()),
            "" => {}
            other => eprintln!(
                "Unknown input '{}' (expected online, offline, sync or status)",
                other
            ),
        }
    }

    let _ = shutdown.send(());
    daemon_task
        .await
        .map_err(|e| format!("Sync daemon task failed: {}", e))?;
    printer.abort();
    Ok(())
}

/// Report a write. A one-shot run has no daemon to pick up the sync request
/// made when a write queues behind older ones, so drain here instead.
async fn finish_write(
    service: &SyncService<HttpRemoteStore>,
    backlog: usize,
    result: Result<MutationOutcome, MutationError>,
) -> Result<(), String> {
    let queued_behind = backlog > 0 && matches!(result, Ok(MutationOutcome::Queued { .. }));
    report(result)?;
    if queued_behind {
        let drained = service
            .drain_backlog()
            .await
            .map_err(|e| format!("Sync failed: {}", e))?;
        if let Some(outcome) = drained {
            print_drain(&outcome);
        }
    }
    Ok(())
}

fn report(result: Result<MutationOutcome, MutationError>) -> Result<(), String> {
    let tag = OutcomeTag::of(&result);
    match result {
        Ok(MutationOutcome::Succeeded { record_id }) => {
            println!("{:?}: {}", tag, record_id);
            Ok(())
        }
        Ok(MutationOutcome::Queued { operation_id }) => {
            println!("{:?}: {} (will sync when online)", tag, operation_id);
            Ok(())
        }
        Err(e) => Err(format!("{:?}: {}", tag, e)),
    }
}

fn print_snapshot(snapshot: &SyncSnapshot) {
    println!(
        "{} (online: {}, pending: {}, needs attention: {})",
        snapshot.status.label(),
        snapshot.online,
        snapshot.pending,
        snapshot.needs_attention
    );
}

fn print_operations(ops: &[PendingOperation]) {
    if ops.is_empty() {
        println!("(none)");
        return;
    }
    for op in ops {
        match &op.last_error {
            Some(error) => println!(
                "{}  {:<20} attempts={}  last error: {}",
                op.id,
                op.kind().label(),
                op.attempts,
                error
            ),
            None => println!(
                "{}  {:<20} attempts={}",
                op.id,
                op.kind().label(),
                op.attempts
            ),
        }
    }
}

fn print_drain(outcome: &DrainOutcome) {
    match outcome {
        DrainOutcome::Completed { replayed } => println!("Replayed {} writes", replayed),
        DrainOutcome::Stopped {
            replayed,
            operation_id,
            error,
            ..
        } => println!(
            "Replayed {} writes, stopped at {}: {}",
            replayed, operation_id, error
        ),
        DrainOutcome::AlreadyDraining => println!("A sync is already running"),
        DrainOutcome::Offline => println!("Offline, nothing replayed"),
    }
}
