use clap::{ArgGroup, Parser};
use ethers::{
    providers::Middleware,
    types::{Address, U256},
};
use expanded_pathbuf::ExpandedPathBuf;
use eyre::format_err;
use operon_bundler::{BundleManager, EventsManager, ExecutionManager};
use operon_contracts::EntryPoint;
use operon_mempool::{Mempool, Reputation, ValidationManager};
use operon_primitives::{
    constants::{
        bundler::BUNDLE_INTERVAL,
        entry_point,
        validation::reputation::{
            BAN_SLACK, MIN_INCLUSION_RATE_DENOMINATOR, MIN_UNSTAKE_DELAY, THROTTLING_SLACK,
        },
    },
    provider::{create_http_block_stream, create_http_provider},
    utils::{parse_address, parse_u256},
    Wallet,
};
use operon_rpc::{
    DebugApiServer, DebugApiServerImpl, EthApiServer, EthApiServerImpl, JsonRpcServer,
};
use std::{collections::HashSet, future::pending, panic, sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

#[derive(Parser)]
#[clap(name = "operon", about = "Bundler for ERC-4337 account abstraction")]
#[clap(group(ArgGroup::new("account").required(true).args(&["mnemonic_file", "private_key"])))]
pub struct Opt {
    /// Path to the file with the mnemonic phrase of the bundler's signing key.
    #[clap(long, group = "account")]
    pub mnemonic_file: Option<ExpandedPathBuf>,

    /// Private key of the bundler's signing key.
    #[clap(long, group = "account")]
    pub private_key: Option<String>,

    /// Ethereum execution client RPC endpoint.
    #[clap(long, default_value = "http://127.0.0.1:8545")]
    pub eth_client_address: String,

    /// Entry point address.
    #[clap(long, default_value = entry_point::ADDRESS, value_parser = parse_address)]
    pub entry_point: Address,

    /// The bundler beneficiary address.
    #[clap(long, value_parser = parse_address)]
    pub beneficiary: Address,

    /// The minimum balance of the signer account; below it the bundles' fee income is
    /// redirected to the signer instead of the beneficiary.
    #[clap(long, default_value = "100000000000000000", value_parser = parse_u256)]
    pub min_balance: U256,

    /// Minimum stake required for entities.
    #[clap(long, default_value = "1", value_parser = parse_u256)]
    pub min_stake: U256,

    /// Minimum unstake delay required for entities (seconds).
    #[clap(long, default_value_t = MIN_UNSTAKE_DELAY)]
    pub min_unstake_delay: u64,

    /// Maximum gas a single bundle may consume.
    #[clap(long, default_value_t = 5_000_000)]
    pub max_bundle_gas: u64,

    /// Disables the auto bundling mode.
    #[clap(long)]
    pub manual_bundle_mode: bool,

    /// The auto bundle interval in seconds.
    #[clap(long, default_value_t = BUNDLE_INTERVAL)]
    pub auto_bundle_interval: u64,

    /// Mempool size at which a non-forced bundle attempt actually bundles.
    #[clap(long, default_value_t = 1)]
    pub auto_bundle_mempool_size: u64,

    /// Addresses of whitelisted entities.
    #[clap(long, value_delimiter = ',', value_parser = parse_address)]
    pub whitelist: Vec<Address>,

    /// Addresses of blacklisted entities.
    #[clap(long, value_delimiter = ',', value_parser = parse_address)]
    pub blacklist: Vec<Address>,

    /// JSON-RPC server listen address.
    #[clap(long, default_value = "127.0.0.1:3000")]
    pub rpc_listen_address: String,

    /// Enabled RPC namespaces.
    #[clap(long, value_delimiter = ',', default_value = "eth", value_parser = ["eth", "debug"])]
    pub rpc_api: Vec<String>,

    /// Poll interval for event filters and pending transactions in milliseconds.
    #[clap(long, default_value = "500", value_parser = parse_duration)]
    pub poll_interval: Duration,
}

fn main() -> eyre::Result<()> {
    let opt: Opt = Opt::parse();

    tracing_subscriber::fmt::init();

    std::thread::Builder::new()
        .stack_size(128 * 1024 * 1024)
        .spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_stack_size(128 * 1024 * 1024)
                .build()?;

            // the bundler runs until the operator stops it; dropping the runtime takes
            // the RPC server, the event watcher and the auto-bundle loop down with it
            rt.block_on(async move {
                let mut sigterm = signal(SignalKind::terminate())?;

                tokio::select! {
                    res = run(opt) => res,
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutting down the bundler: ctrl-c received");
                        Ok(())
                    }
                    _ = sigterm.recv() => {
                        info!("Shutting down the bundler: SIGTERM received");
                        Ok(())
                    }
                }
            })?;
            Ok(())
        })?
        .join()
        .unwrap_or_else(|e| panic::resume_unwind(e))
}

/// Parses a duration given in milliseconds (CLI helper)
fn parse_duration(duration: &str) -> Result<Duration, String> {
    let millis: u64 =
        duration.parse().map_err(|_| format!("{duration} must be unsigned int"))?;
    Ok(Duration::from_millis(millis))
}

async fn run(opt: Opt) -> eyre::Result<()> {
    info!("Starting the ERC-4337 bundler");

    let eth_client =
        Arc::new(create_http_provider(&opt.eth_client_address, opt.poll_interval).await?);
    info!(
        "Connected to the Ethereum execution client at {}: {}",
        opt.eth_client_address,
        eth_client.client_version().await?
    );

    let chain_id = eth_client.get_chainid().await?.as_u64();

    let wallet = if let Some(mnemonic_file) = opt.mnemonic_file {
        Wallet::from_file(mnemonic_file, chain_id)
            .map_err(|err| format_err!("Could not load mnemonic file: {err}"))?
    } else if let Some(ref private_key) = opt.private_key {
        Wallet::from_key(private_key, chain_id)
            .map_err(|err| format_err!("Could not load private key: {err}"))?
    } else {
        unreachable!("clap enforces one of mnemonic_file/private_key")
    };
    info!("Bundler signer address: {:?}", wallet.address());

    let entry_point = EntryPoint::new(eth_client.clone(), opt.entry_point);

    let reputation = Reputation::new(
        MIN_INCLUSION_RATE_DENOMINATOR,
        THROTTLING_SLACK,
        BAN_SLACK,
        opt.min_stake,
        opt.min_unstake_delay.into(),
    );
    for addr in &opt.whitelist {
        reputation.add_whitelist(addr);
    }
    for addr in &opt.blacklist {
        reputation.add_blacklist(addr);
    }

    let mempool = Mempool::new(reputation.clone());
    let validator = ValidationManager::new(entry_point.clone(), reputation.clone());
    let events = EventsManager::new(entry_point.clone(), mempool.clone(), reputation.clone());

    if let Err(err) = events.initial_handle_past_events().await {
        warn!("Initial entry point event scan failed: {err:?}");
    }
    let block_stream = create_http_block_stream(eth_client.clone()).await;
    tokio::spawn(events.clone().listen(block_stream));

    // hourly reputation decay
    {
        let reputation = reputation.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
            interval.tick().await;
            loop {
                interval.tick().await;
                reputation.update_hourly();
            }
        });
    }

    let bundle_manager = Arc::new(BundleManager::new(
        eth_client.clone(),
        wallet,
        entry_point.clone(),
        events,
        mempool.clone(),
        reputation.clone(),
        validator.clone(),
        chain_id,
        opt.beneficiary,
        opt.min_balance,
        opt.max_bundle_gas.into(),
    ));

    let execution_manager = Arc::new(ExecutionManager::new(
        eth_client,
        entry_point,
        chain_id,
        mempool,
        reputation,
        validator,
        bundle_manager,
    ));

    if !opt.manual_bundle_mode {
        execution_manager
            .set_bundling_interval(opt.auto_bundle_interval, opt.auto_bundle_mempool_size);
    }

    let mut server = JsonRpcServer::new(opt.rpc_listen_address.clone());

    let rpc_api: HashSet<String> = HashSet::from_iter(opt.rpc_api.iter().cloned());
    if rpc_api.contains("eth") {
        server.add_methods(
            EthApiServerImpl { execution_manager: execution_manager.clone() }.into_rpc(),
        )?;
    }
    if rpc_api.contains("debug") {
        server.add_methods(
            DebugApiServerImpl { execution_manager: execution_manager.clone() }.into_rpc(),
        )?;
    }

    let _server_handle = server.start().await?;
    info!("Started bundler JSON-RPC server at {}", opt.rpc_listen_address);

    pending().await
}
