use crate::{BundleManager, BundlerError, SendBundleReturn};
use ethers::{
    contract::EthEvent,
    prelude::LogMeta,
    providers::Middleware,
    types::{Address, Log, TransactionRequest, U64},
};
use operon_contracts::{EntryPoint, UserOperationEventFilter};
use operon_mempool::{
    AdmissionError, Mempool, MempoolEntry, Overhead, Reputation, UserOperationValidator,
    ValidationError,
};
use operon_primitives::{
    constants::{bundler::BUNDLE_INTERVAL, mempool::LATEST_SCAN_DEPTH},
    reputation::ReputationEntry,
    BundlingMode, UserOperation, UserOperationGasEstimation, UserOperationHash,
    UserOperationReceipt, UserOperationRequest,
};
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// `validUntil` value the entry point reports for operations without an expiry
const NO_EXPIRY: u64 = (1 << 48) - 1;

#[derive(Default)]
struct AutoBundleState {
    /// Auto-bundle period in seconds; 0 disables the loop
    interval: u64,
    /// Mempool size at which a non-forced bundle attempt actually bundles
    max_mempool_size: u64,
    task: Option<JoinHandle<()>>,
}

/// The public surface of the bundler: user operation submission, gas
/// estimation, receipt lookup, the auto-bundle loop and the debug controls.
///
/// Cheap to clone; clones share the managers and the auto-bundle state.
pub struct ExecutionManager<M, V>
where
    M: Middleware + 'static,
    V: UserOperationValidator,
{
    eth_client: Arc<M>,
    entry_point: EntryPoint<M>,
    chain_id: u64,
    mempool: Mempool,
    reputation: Reputation,
    validator: V,
    bundle_manager: Arc<BundleManager<M, V>>,
    auto_bundle: Arc<Mutex<AutoBundleState>>,
}

impl<M, V> Clone for ExecutionManager<M, V>
where
    M: Middleware + 'static,
    V: UserOperationValidator + Clone,
{
    fn clone(&self) -> Self {
        Self {
            eth_client: self.eth_client.clone(),
            entry_point: self.entry_point.clone(),
            chain_id: self.chain_id,
            mempool: self.mempool.clone(),
            reputation: self.reputation.clone(),
            validator: self.validator.clone(),
            bundle_manager: self.bundle_manager.clone(),
            auto_bundle: self.auto_bundle.clone(),
        }
    }
}

impl<M, V> ExecutionManager<M, V>
where
    M: Middleware + 'static,
    V: UserOperationValidator + Clone + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        eth_client: Arc<M>,
        entry_point: EntryPoint<M>,
        chain_id: u64,
        mempool: Mempool,
        reputation: Reputation,
        validator: V,
        bundle_manager: Arc<BundleManager<M, V>>,
    ) -> Self {
        Self {
            eth_client,
            entry_point,
            chain_id,
            mempool,
            reputation,
            validator,
            bundle_manager,
            auto_bundle: Arc::new(Mutex::new(AutoBundleState::default())),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The entry points this bundler serves
    pub fn supported_entry_points(&self) -> Vec<Address> {
        vec![self.entry_point.address()]
    }

    /// Validates the user operation and admits it into the mempool; spawns a
    /// best-effort non-blocking bundle attempt on success
    pub async fn send_user_operation(
        &self,
        request: UserOperationRequest,
        entry_point: &Address,
    ) -> Result<UserOperationHash, AdmissionError> {
        self.validator
            .validate_user_operation_basic(&request, entry_point, true, true)
            .map_err(AdmissionError::from)?;

        let uo = UserOperation::from(request);
        let outcome = self.validator.validate_user_operation(&uo, true).await?;

        let uo_hash = uo.hash(entry_point, self.chain_id);
        self.mempool.add(
            MempoolEntry {
                user_operation: uo,
                hash: uo_hash,
                prefund: outcome.return_info.prefund,
                aggregator: outcome.aggregator_info.map(|info| info.address),
            },
            &outcome.sender_info,
        )?;

        info!("{uo_hash} added to the mempool");

        let manager = self.clone();
        tokio::spawn(async move {
            let _ = manager.attempt_bundle(false).await;
        });

        Ok(uo_hash)
    }

    /// Sends the next bundle; unless forced, short-circuits while the mempool has not
    /// reached the configured size threshold
    pub async fn attempt_bundle(&self, force: bool) -> Result<SendBundleReturn, BundlerError> {
        if !force {
            let max_mempool_size = self.auto_bundle.lock().max_mempool_size;
            if (self.mempool.count() as u64) < max_mempool_size {
                return Err(BundlerError::NotEnoughUserOperations);
            }
        }

        self.bundle_manager.send_next_bundle().await
    }

    /// Estimates the gas fields of a user operation: `preVerificationGas` from the
    /// calldata overheads, `verificationGas` from simulation, `callGasLimit` by an
    /// `eth_estimateGas` of the execution call from the entry point
    pub async fn estimate_user_operation_gas(
        &self,
        request: &UserOperationRequest,
        entry_point: &Address,
    ) -> Result<UserOperationGasEstimation, ValidationError> {
        self.validator.validate_user_operation_basic(request, entry_point, false, false)?;

        let uo = UserOperation::from(request.clone());
        let outcome = self.validator.validate_user_operation(&uo, false).await?;

        let call = TransactionRequest::new()
            .from(self.entry_point.address())
            .to(uo.sender)
            .data(uo.call_data.clone());
        let call_gas_limit = self
            .eth_client
            .estimate_gas(&call.into(), None)
            .await
            .map_err(|err| ValidationError::ExecutionReverted { message: err.to_string() })?;

        Ok(UserOperationGasEstimation {
            pre_verification_gas: Overhead::default().calculate_pre_verification_gas(&uo),
            verification_gas: outcome.return_info.pre_op_gas,
            valid_after: (outcome.return_info.valid_after != 0)
                .then_some(outcome.return_info.valid_after),
            valid_until: (outcome.return_info.valid_until != NO_EXPIRY)
                .then_some(outcome.return_info.valid_until),
            call_gas_limit,
        })
    }

    /// Looks up the `UserOperationEvent` for the hash, fetches the enclosing transaction
    /// receipt and splices out the logs that belong to this user operation
    pub async fn get_user_operation_receipt(
        &self,
        uo_hash: &UserOperationHash,
    ) -> eyre::Result<Option<UserOperationReceipt>> {
        let latest_block = self.eth_client.get_block_number().await?;

        let filter = self
            .entry_point
            .entry_point_api()
            .event::<UserOperationEventFilter>()
            .from_block(latest_block.saturating_sub(U64::from(LATEST_SCAN_DEPTH)))
            .topic1(uo_hash.0);
        let mut events: Vec<(UserOperationEventFilter, LogMeta)> =
            filter.query_with_meta().await?;

        // the same user operation can appear twice in one bundle; the last event wins
        let (event, meta) = match events.pop() {
            Some(event) => event,
            None => return Ok(None),
        };

        let tx_receipt =
            match self.eth_client.get_transaction_receipt(meta.transaction_hash).await? {
                Some(receipt) => receipt,
                None => return Ok(None),
            };

        let logs = splice_user_operation_logs(&tx_receipt.logs, uo_hash);

        Ok(Some(UserOperationReceipt {
            user_operation_hash: *uo_hash,
            sender: event.sender,
            nonce: event.nonce,
            paymaster: (!event.paymaster.is_zero()).then_some(event.paymaster),
            actual_gas_cost: event.actual_gas_cost,
            actual_gas_used: event.actual_gas_used,
            success: event.success,
            reason: String::new(),
            logs,
            tx_receipt,
        }))
    }

    // Debug controls

    /// Drops the whole mempool and reputation state
    pub fn clear_state(&self) {
        self.mempool.clear();
        self.reputation.clear();
    }

    /// User operations currently in the mempool, sorted by nonce
    pub fn dump_mempool(&self) -> Vec<UserOperation> {
        let mut uos = self.mempool.dump();
        uos.sort_by(|a, b| a.nonce.cmp(&b.nonce));
        uos
    }

    /// Forces a bundle attempt regardless of the mempool size threshold
    pub async fn send_bundle_now(&self) -> Result<SendBundleReturn, BundlerError> {
        self.attempt_bundle(true).await
    }

    /// Switches between manual bundling and the auto-bundle loop
    pub fn set_bundling_mode(&self, mode: BundlingMode) {
        match mode {
            BundlingMode::Manual => {
                let mut state = self.auto_bundle.lock();
                if let Some(task) = state.task.take() {
                    task.abort();
                }
            }
            BundlingMode::Auto => {
                let (interval, max_mempool_size) = {
                    let state = self.auto_bundle.lock();
                    (
                        if state.interval > 0 { state.interval } else { BUNDLE_INTERVAL },
                        state.max_mempool_size,
                    )
                };
                self.set_bundling_interval(interval, max_mempool_size);
            }
        }
    }

    /// Reconfigures the auto-bundle loop; any previous loop is cancelled first
    pub fn set_bundling_interval(&self, interval: u64, max_mempool_size: u64) {
        let mut state = self.auto_bundle.lock();

        if let Some(task) = state.task.take() {
            task.abort();
        }

        state.interval = interval;
        state.max_mempool_size = max_mempool_size;

        if interval > 0 {
            info!("Auto bundling every {interval}s once the mempool holds {max_mempool_size} user operations");
            state.task = Some(self.spawn_auto_bundle_loop(Duration::from_secs(interval)));
        }
    }

    /// Overwrites reputation entries (debug aid)
    pub fn set_reputation(&self, entries: Vec<ReputationEntry>) {
        self.reputation.set_entries(entries);
    }

    /// All reputation entries with their current status (debug aid)
    pub fn dump_reputation(&self) -> Vec<ReputationEntry> {
        self.reputation.get_all()
    }

    fn spawn_auto_bundle_loop(&self, period: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                let started = Instant::now();
                match manager.attempt_bundle(false).await {
                    Ok(ret) => {
                        info!("Auto bundle sent: {:?}", ret.transaction_hash)
                    }
                    Err(BundlerError::NotEnoughUserOperations) => {}
                    Err(err) => error!("Auto bundle attempt failed: {err}"),
                }
                // the just-elapsed bundling time counts against the period
                tokio::time::sleep(period.saturating_sub(started.elapsed())).await;
            }
        })
    }
}

/// The logs belonging to a user operation are those strictly between the previous
/// `UserOperationEvent` of the same transaction (or the start of the receipt) and the
/// operation's own event
pub fn splice_user_operation_logs(logs: &[Log], uo_hash: &UserOperationHash) -> Vec<Log> {
    let signature = UserOperationEventFilter::signature();

    let mut start = 0usize;
    for (idx, log) in logs.iter().enumerate() {
        if log.topics.first() == Some(&signature) {
            if log.topics.get(1) == Some(&uo_hash.0) {
                return logs[start..idx].to_vec();
            }
            start = idx + 1;
        }
    }

    Vec::new()
}
