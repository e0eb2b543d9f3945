//! Composition root: wires Persistence, Chain Reader, Price Oracle, Pool
//! State Machine, Token Aggregator, Event Bus, Orchestrator and Finalizer
//! together and runs until SIGINT/SIGTERM.

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::Context;
use log::{error, info, LevelFilter};
use tickstream::chain::metadata::MetadataFetcher;
use tickstream::{
    ChainReader, Database, EventBus, Finalizer, Orchestrator, PoolStateMachine, PriceOracle,
    Settings, TokenAggregator,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("failed to initialize logger")?;

    let settings = Arc::new(Settings::new().context("failed to load configuration")?);

    info!("starting tickstream against pool manager {}", settings.chain.pool_manager_address);

    let database = Database::new(settings.clone()).await?;
    let postgres = database.postgres.clone();

    let pool_manager_address = Address::from_str(&settings.chain.pool_manager_address)
        .context("invalid pool_manager_address")?;

    let chain = Arc::new(ChainReader::new(
        &settings.chain.rpc_url,
        &settings.chain.hypersync_url,
        &settings.chain.hypersync_bearer_token,
        pool_manager_address,
    )?);

    let oracle = Arc::new(PriceOracle::new(
        postgres.clone(),
        settings.pricing.wrapped_native_address.clone(),
        settings.pricing.stablecoin_wrapped_native_pool_id.clone(),
        settings.pricing.stablecoin_is_token0,
        settings.pricing.stablecoin_addresses.clone(),
        &settings.pricing.minimum_native_locked,
    ));

    let metadata = Arc::new(MetadataFetcher::new(chain.erc20_provider()));

    let pool_state = Arc::new(PoolStateMachine::new(
        postgres.clone(),
        metadata.clone(),
        settings.pricing.whitelist_tokens.clone(),
    ));

    let aggregator = Arc::new(TokenAggregator::new(postgres.clone(), oracle, metadata));

    let bus = EventBus::new(settings.bus.subscriber_buffer_size);

    let root_token = CancellationToken::new();

    let finalizer = Arc::new(Finalizer::new(postgres.clone(), bus.clone()));
    finalizer.spawn_all(root_token.child_token());

    let orchestrator = Arc::new(Orchestrator::new(
        chain,
        postgres,
        pool_state,
        aggregator,
        bus,
        settings.chain.clone(),
    ));

    let orchestrator_token = root_token.child_token();
    let mut orchestrator_handle =
        tokio::spawn(async move { orchestrator.run(orchestrator_token).await });

    // Race the shutdown signal against the orchestrator task itself: if the
    // orchestrator exits on its own (the one fatal condition, a database
    // error — see `IndexError::is_fatal`) before any signal arrives, that
    // must surface as a process failure instead of the process hanging
    // around waiting for a signal that will never come.
    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("shutdown signal received, cancelling in-flight work");
            root_token.cancel();
            match orchestrator_handle.await {
                Ok(Ok(())) => {
                    info!("orchestrator exited cleanly");
                    Ok(())
                },
                Ok(Err(e)) => {
                    error!("orchestrator exited with error: {e:#}");
                    Err(e)
                },
                Err(e) => Err(anyhow::anyhow!("orchestrator task panicked: {e:#}")),
            }
        }
        result = &mut orchestrator_handle => {
            root_token.cancel();
            match result {
                Ok(Ok(())) => {
                    info!("orchestrator exited cleanly on its own");
                    Ok(())
                },
                Ok(Err(e)) => {
                    error!("orchestrator exited with a fatal error: {e:#}");
                    Err(e)
                },
                Err(e) => Err(anyhow::anyhow!("orchestrator task panicked: {e:#}")),
            }
        }
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGTERM handler: {e:#}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        },
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}
