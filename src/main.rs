use anyhow::Result;
use mass_undelete::{
    api, cli,
    config::RestoreConfig,
    credential::{self, TokenSource},
    network::StorageClient,
    progress::{format_elapsed, LogProgress, ProgressSink, StatusBoard},
    restore::RestoreWorker,
    scheduler::{self, BatchScheduler},
    state::RunState,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Cli::parse_args();
    let config = args.restore_config();
    config.validate()?;

    let span = tracing::info_span!(
        "restore",
        run_id = %Uuid::new_v4(),
        container = %args.container
    );
    run(args, config).instrument(span).await
}

async fn run(args: cli::Cli, config: RestoreConfig) -> Result<()> {
    let http = reqwest::Client::new();
    let method = if args.access_key.is_some() {
        "access key"
    } else {
        "ambient identity"
    };
    info!(method, "authenticating to storage account");
    let credential = credential::resolve(
        &args.storage_uri,
        args.access_key.as_deref(),
        TokenSource::from_env(),
        http.clone(),
    )
    .await?;
    info!(source = credential.describe(), "credential ready");

    let client = Arc::new(StorageClient::new(
        http,
        &args.storage_uri,
        &args.container,
        credential,
    )?);

    info!("listing deleted items");
    let items = scheduler::collect_items(client.as_ref()).await?;
    if items.is_empty() {
        println!("No deleted items found.");
        return Ok(());
    }

    let board = Arc::new(StatusBoard::default());
    if let Some(addr) = config.status_bind_addr.clone() {
        let board = board.clone();
        tokio::spawn(async move {
            if let Err(err) = api::serve(addr, board).await {
                warn!(error = %err, "status server stopped");
            }
        });
    }
    let progress: Arc<dyn ProgressSink> = Arc::new((LogProgress, board));

    let state = Arc::new(RunState::new(&config));
    let worker = RestoreWorker::new(client, state.clone(), config.classifier.clone());
    let summary = BatchScheduler::new(worker, state, progress, config)?
        .run(items)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Restore complete");
        println!(
            "Total time: {}",
            format_elapsed(Duration::from_secs_f64(summary.elapsed_secs))
        );
        println!("Successfully restored: {} items", summary.restored);
        println!("Failed to restore: {} items", summary.failed);
        println!("Average throughput: {:.2} items/second", summary.throughput);
    }
    Ok(())
}
