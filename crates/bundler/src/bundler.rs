use crate::{error::BundlerError, events::EventsManager};
use ethers::{
    middleware::SignerMiddleware,
    providers::Middleware,
    signers::LocalWallet,
    types::{transaction::eip2718::TypedTransaction, Address, H256, U256},
};
use operon_contracts::{entry_point_api, EntityFault, EntryPoint, EntryPointError};
use operon_mempool::{Mempool, Reputation, UserOperationValidator};
use operon_primitives::{
    constants::{
        bundler::RECEIPT_POLL_INTERVAL,
        validation::reputation::THROTTLED_ENTITY_BUNDLE_COUNT,
    },
    reputation::Status,
    UserOperation, UserOperationHash, Wallet,
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

/// Result of a successfully mined bundle
#[derive(Clone, Debug)]
pub struct SendBundleReturn {
    pub transaction_hash: H256,
    pub user_operation_hashes: Vec<UserOperationHash>,
}

/// Drains the mempool into valid, gas-bounded bundles and submits them to the
/// entry point as a single `handleOps` transaction
pub struct BundleManager<M, V>
where
    M: Middleware + 'static,
    V: UserOperationValidator,
{
    /// Signing client for the bundler's externally-owned account
    client: SignerMiddleware<Arc<M>, LocalWallet>,
    entry_point: EntryPoint<M>,
    events: EventsManager<M>,
    mempool: Mempool,
    reputation: Reputation,
    validator: V,
    chain_id: u64,
    beneficiary: Address,
    min_signer_balance: U256,
    max_bundle_gas: U256,
    /// At most one bundle in flight
    bundle_lock: Mutex<()>,
}

impl<M, V> BundleManager<M, V>
where
    M: Middleware + 'static,
    V: UserOperationValidator,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        eth_client: Arc<M>,
        wallet: Wallet,
        entry_point: EntryPoint<M>,
        events: EventsManager<M>,
        mempool: Mempool,
        reputation: Reputation,
        validator: V,
        chain_id: u64,
        beneficiary: Address,
        min_signer_balance: U256,
        max_bundle_gas: U256,
    ) -> Self {
        let client = SignerMiddleware::new(eth_client, wallet.signer);
        Self {
            client,
            entry_point,
            events,
            mempool,
            reputation,
            validator,
            chain_id,
            beneficiary,
            min_signer_balance,
            max_bundle_gas,
            bundle_lock: Mutex::new(()),
        }
    }

    /// Assembles the next bundle and submits it; the single-writer transaction of the
    /// bundler lane
    pub async fn send_next_bundle(&self) -> Result<SendBundleReturn, BundlerError> {
        let _guard = self.bundle_lock.lock().await;

        // let the events subsystem drain logs first, so selection sees fresh reputation
        self.events
            .handle_past_events()
            .await
            .map_err(|err| BundlerError::Provider { inner: err.to_string() })?;

        let bundle = self.create_bundle().await;
        if bundle.is_empty() {
            return Err(BundlerError::NotEnoughUserOperations);
        }

        let beneficiary = self.select_beneficiary().await?;

        self.send_bundle(bundle, beneficiary).await
    }

    /// Greedy scan over the mempool snapshot sorted by tip
    async fn create_bundle(&self) -> Vec<UserOperation> {
        let entries = self.mempool.get_sorted_for_inclusion();

        let mut bundle: Vec<UserOperation> = Vec::new();
        let mut senders: HashSet<Address> = HashSet::new();
        let mut paymaster_deposit: HashMap<Address, U256> = HashMap::new();
        let mut staked_entity_count: HashMap<Address, u64> = HashMap::new();
        let mut total_gas = U256::zero();

        for entry in entries {
            let uo = &entry.user_operation;
            let paymaster = uo.paymaster();
            let factory = uo.factory();

            let paymaster_status = self.reputation.status_from_bytes(&uo.paymaster_and_data);
            let factory_status = self.reputation.status_from_bytes(&uo.init_code);

            // banned entities take their operations down with them
            if paymaster_status == Status::BANNED || factory_status == Status::BANNED {
                self.mempool.remove(&uo.sender, &uo.nonce);
                continue;
            }

            if let Some(paymaster) = paymaster {
                if paymaster_status == Status::THROTTLED &&
                    staked_entity_count.get(&paymaster).copied().unwrap_or_default() >
                        THROTTLED_ENTITY_BUNDLE_COUNT
                {
                    debug!(
                        "Skipping throttled paymaster; sender: {:?}, nonce: {}",
                        uo.sender, uo.nonce
                    );
                    continue;
                }
            }

            if let Some(factory) = factory {
                if factory_status == Status::THROTTLED &&
                    staked_entity_count.get(&factory).copied().unwrap_or_default() >
                        THROTTLED_ENTITY_BUNDLE_COUNT
                {
                    debug!(
                        "Skipping throttled factory; sender: {:?}, nonce: {}",
                        uo.sender, uo.nonce
                    );
                    continue;
                }
            }

            if senders.contains(&uo.sender) {
                debug!(
                    "Skipping already included sender: {:?}, nonce: {}",
                    uo.sender, uo.nonce
                );
                continue;
            }

            // re-validate; no need to check stakes, since stake cannot be reduced between
            // the first and the second validation
            let outcome = match self.validator.validate_user_operation(uo, false).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    debug!(
                        "Failed 2nd validation; sender: {:?}, nonce: {}, error: {err}",
                        uo.sender, uo.nonce
                    );
                    self.mempool.remove(&uo.sender, &uo.nonce);
                    continue;
                }
            };

            // the operation's call gas limit is taken at face value, even though it will
            // probably require less; estimating it here would let us cram more operations
            // into a bundle
            let gas_cost = outcome.return_info.pre_op_gas.saturating_add(uo.call_gas_limit);
            let new_total_gas = total_gas.saturating_add(gas_cost);
            if new_total_gas > self.max_bundle_gas {
                break;
            }

            if let Some(paymaster) = paymaster {
                let deposit = match paymaster_deposit.get(&paymaster) {
                    Some(deposit) => *deposit,
                    None => match self.entry_point.balance_of(&paymaster).await {
                        Ok(deposit) => deposit,
                        Err(err) => {
                            error!(
                                "Cannot get deposit of paymaster {paymaster:?}: {err}; sender: {:?}, nonce: {}",
                                uo.sender, uo.nonce
                            );
                            continue;
                        }
                    },
                };

                if deposit < entry.prefund {
                    // not enough deposit left to back every operation in this bundle; the
                    // paymaster passed validation, so it can still sponsor them separately
                    continue;
                }

                *staked_entity_count.entry(paymaster).or_default() += 1;
                paymaster_deposit.insert(paymaster, deposit.saturating_sub(entry.prefund));
            }

            if let Some(factory) = factory {
                *staked_entity_count.entry(factory).or_default() += 1;
            }

            senders.insert(uo.sender);
            bundle.push(uo.clone());
            total_gas = new_total_gas;
        }

        bundle
    }

    /// Builds and signs the `handleOps` transaction; on an entry point revert during gas
    /// estimation, diagnoses the failing operation and rebuilds the bundle until it either
    /// estimates cleanly or runs empty
    async fn prepare_bundle_tx(
        &self,
        mut bundle: Vec<UserOperation>,
        beneficiary: Address,
    ) -> Result<(Vec<UserOperation>, TypedTransaction), BundlerError> {
        loop {
            let gas_price = self
                .client
                .get_gas_price()
                .await
                .map_err(|err| BundlerError::Provider { inner: err.to_string() })?;

            let ops: Vec<entry_point_api::UserOperation> =
                bundle.iter().cloned().map(Into::into).collect();
            let mut tx: TypedTransaction =
                self.entry_point.entry_point_api().handle_ops(ops, beneficiary).tx.clone();
            tx.set_from(self.client.address());
            tx.set_gas_price(gas_price);

            match self.client.estimate_gas(&tx, None).await {
                Ok(gas) => {
                    tx.set_gas(gas);
                    return Ok((bundle, tx));
                }
                Err(err) => {
                    debug!("Bundle gas estimation reverted: {err}");
                    bundle = self.handle_failed_ops(bundle, beneficiary).await?;
                    if bundle.is_empty() {
                        return Err(BundlerError::NotEnoughUserOperations);
                    }
                }
            }
        }
    }

    /// Replays `handleOps` via `eth_call` to obtain the typed `FailedOp` revert, punishes
    /// the faulty entity and drops the failing operation (plus, for a paymaster fault, its
    /// paymaster's other operations from the in-flight bundle only)
    async fn handle_failed_ops(
        &self,
        bundle: Vec<UserOperation>,
        beneficiary: Address,
    ) -> Result<Vec<UserOperation>, BundlerError> {
        match self.entry_point.handle_ops(bundle.clone(), beneficiary).await {
            Ok(()) => {
                Err(BundlerError::Other { inner: "handleOps call did not revert".into() })
            }
            Err(EntryPointError::FailedOp(failed_op)) => {
                if failed_op.op_index >= U256::from(bundle.len()) {
                    // should never happen
                    return Err(BundlerError::InvalidOpIndex { op_index: failed_op.op_index });
                }

                let failed = bundle[failed_op.op_index.as_usize()].clone();
                warn!(
                    "User operation made the bundle revert; sender: {:?}, nonce: {}, reason: {}",
                    failed.sender, failed.nonce, failed_op.reason
                );

                // drop the failing operation from the mempool; other operations of the same
                // paymaster leave the current bundle but stay in the mempool
                self.mempool.remove(&failed.sender, &failed.nonce);
                let bundle = remove_failed_user_operation(bundle, failed_op.op_index.as_usize());

                match failed_op.fault() {
                    EntityFault::Paymaster => {
                        if let Some(paymaster) = failed.paymaster() {
                            self.reputation.crashed_handle_ops(&paymaster);
                        }
                    }
                    EntityFault::Account => self.reputation.crashed_handle_ops(&failed.sender),
                    EntityFault::Factory => {
                        if let Some(factory) = failed.factory() {
                            self.reputation.crashed_handle_ops(&factory);
                        }
                    }
                    EntityFault::Unknown => {
                        return Err(BundlerError::UnknownRevert { reason: failed_op.reason })
                    }
                }

                Ok(bundle)
            }
            Err(EntryPointError::ExecutionReverted(reason)) => {
                Err(BundlerError::UnknownRevert { reason })
            }
            Err(EntryPointError::Provider { inner }) => Err(BundlerError::Provider { inner }),
            Err(err) => Err(BundlerError::Other { inner: err.to_string() }),
        }
    }

    async fn send_bundle(
        &self,
        bundle: Vec<UserOperation>,
        beneficiary: Address,
    ) -> Result<SendBundleReturn, BundlerError> {
        let (bundle, tx) = self.prepare_bundle_tx(bundle, beneficiary).await?;

        trace!("Sending bundle transaction: {tx:?}");

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|err| BundlerError::Provider { inner: err.to_string() })?
            .interval(Duration::from_millis(RECEIPT_POLL_INTERVAL));
        let tx_hash = pending.tx_hash();

        let receipt = pending
            .await
            .map_err(|err| BundlerError::Provider { inner: err.to_string() })?
            .ok_or(BundlerError::Other {
                inner: format!("bundle transaction {tx_hash:?} was dropped"),
            })?;

        if receipt.status != Some(1.into()) {
            // best effort: attribute the fault before reporting the failure
            let _ = self.handle_failed_ops(bundle, beneficiary).await;
            return Err(BundlerError::BundleTxFailed { tx_hash });
        }

        for uo in &bundle {
            self.mempool.remove(&uo.sender, &uo.nonce);
        }

        let user_operation_hashes = bundle
            .iter()
            .map(|uo| uo.hash(&self.entry_point.address(), self.chain_id))
            .collect();

        info!("Bundle transaction mined: {tx_hash:?}, {} user operations", bundle.len());

        Ok(SendBundleReturn { transaction_hash: tx_hash, user_operation_hashes })
    }

    /// When the signer account runs low, redirect the bundle's fee income to the signer
    /// to top it back up
    async fn select_beneficiary(&self) -> Result<Address, BundlerError> {
        let balance = self
            .client
            .get_balance(self.client.address(), None)
            .await
            .map_err(|err| BundlerError::Provider { inner: err.to_string() })?;

        Ok(if balance <= self.min_signer_balance {
            self.client.address()
        } else {
            self.beneficiary
        })
    }
}

/// Removes the failing operation from the bundle; when it has a paymaster, every
/// other operation sharing that paymaster leaves the bundle as well
fn remove_failed_user_operation(
    bundle: Vec<UserOperation>,
    failed_idx: usize,
) -> Vec<UserOperation> {
    let failed_paymaster = bundle[failed_idx].paymaster();

    match failed_paymaster {
        None => {
            bundle.into_iter().enumerate().filter(|(idx, _)| *idx != failed_idx).map(|(_, uo)| uo).collect()
        }
        Some(failed_paymaster) => bundle
            .into_iter()
            .filter(|uo| uo.paymaster() != Some(failed_paymaster))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ethers::{
        providers::{MockProvider, Provider},
        types::Bytes,
    };
    use operon_mempool::{
        MempoolEntry, ReturnInfo, ValidationError, ValidationOutcome,
    };
    use operon_primitives::reputation::{ReputationEntry, StakeInfo, Status};

    const SIGNER_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn with_paymaster(paymaster: Address) -> UserOperation {
        let mut paymaster_and_data = paymaster.as_bytes().to_vec();
        paymaster_and_data.extend_from_slice(&[0u8; 4]);
        UserOperation::random().paymaster_and_data(Bytes::from(paymaster_and_data))
    }

    fn with_factory(factory: Address) -> UserOperation {
        let mut init_code = factory.as_bytes().to_vec();
        init_code.extend_from_slice(&[0u8; 4]);
        UserOperation::random().init_code(Bytes::from(init_code))
    }

    /// Validator stub returning a fixed outcome, failing for chosen senders
    #[derive(Clone, Default)]
    struct StubValidator {
        pre_op_gas: U256,
        prefund: U256,
        failing_senders: Vec<Address>,
    }

    #[async_trait]
    impl UserOperationValidator for StubValidator {
        fn validate_user_operation_basic(
            &self,
            _request: &operon_primitives::UserOperationRequest,
            _entry_point: &Address,
            _require_signature: bool,
            _require_gas_params: bool,
        ) -> Result<(), ValidationError> {
            Ok(())
        }

        async fn validate_user_operation(
            &self,
            uo: &UserOperation,
            _check_stakes: bool,
        ) -> Result<ValidationOutcome, ValidationError> {
            if self.failing_senders.contains(&uo.sender) {
                return Err(ValidationError::InvalidSignature);
            }
            Ok(ValidationOutcome {
                return_info: ReturnInfo {
                    pre_op_gas: self.pre_op_gas,
                    prefund: self.prefund,
                    sig_failed: false,
                    valid_after: 0,
                    valid_until: u64::MAX,
                    paymaster_context: Bytes::default(),
                },
                ..Default::default()
            })
        }
    }

    fn bundle_manager(
        validator: StubValidator,
        max_bundle_gas: U256,
    ) -> (BundleManager<Provider<MockProvider>, StubValidator>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let eth_client = Arc::new(provider);
        let entry_point = EntryPoint::new(
            eth_client.clone(),
            "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap(),
        );
        let reputation = Reputation::new(10, 10, 50, U256::from(1), U256::zero());
        let mempool = Mempool::new(reputation.clone());
        let events =
            EventsManager::new(entry_point.clone(), mempool.clone(), reputation.clone());
        let wallet = Wallet::from_key(SIGNER_KEY, 1).unwrap();
        let manager = BundleManager::new(
            eth_client,
            wallet,
            entry_point,
            events,
            mempool,
            reputation,
            validator,
            1,
            Address::random(),
            U256::zero(),
            max_bundle_gas,
        );
        (manager, mock)
    }

    fn admit(manager: &BundleManager<Provider<MockProvider>, StubValidator>, uo: UserOperation) {
        admit_with_prefund(manager, uo, U256::zero());
    }

    fn admit_with_prefund(
        manager: &BundleManager<Provider<MockProvider>, StubValidator>,
        uo: UserOperation,
        prefund: U256,
    ) {
        let hash = uo.hash(&manager.entry_point.address(), manager.chain_id);
        let sender = uo.sender;
        manager
            .mempool
            .add(
                MempoolEntry { user_operation: uo, hash, prefund, aggregator: None },
                &StakeInfo { address: sender, stake: U256::zero(), unstake_delay: U256::zero() },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn bundle_has_one_op_per_sender() {
        let (manager, _) =
            bundle_manager(StubValidator::default(), U256::from(10_000_000));
        let sender = Address::random();

        admit(&manager, UserOperation::random().sender(sender).nonce(0.into()));
        admit(&manager, UserOperation::random().sender(sender).nonce(1.into()));
        admit(&manager, UserOperation::random());

        let bundle = manager.create_bundle().await;
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.iter().filter(|uo| uo.sender == sender).count(), 1);
        // the skipped operation stays in the mempool
        assert_eq!(manager.mempool.count(), 3);
    }

    #[tokio::test]
    async fn bundle_respects_gas_cap() {
        let validator =
            StubValidator { pre_op_gas: U256::from(50_000), ..Default::default() };
        let (manager, _) = bundle_manager(validator, U256::from(300_000));

        for _ in 0..4 {
            admit(&manager, UserOperation::random().call_gas_limit(U256::from(100_000)));
        }

        // each operation costs 150k; the third would push the total over 300k
        let bundle = manager.create_bundle().await;
        assert_eq!(bundle.len(), 2);

        let gas: u64 =
            bundle.iter().map(|uo| 50_000 + uo.call_gas_limit.as_u64()).sum();
        assert!(U256::from(gas) <= U256::from(300_000));
    }

    #[tokio::test]
    async fn banned_entity_operations_are_evicted() {
        let (manager, _) =
            bundle_manager(StubValidator::default(), U256::from(10_000_000));
        let factory = Address::random();
        manager.reputation.add_blacklist(&factory);

        admit(&manager, with_factory(factory));
        admit(&manager, UserOperation::random());

        let bundle = manager.create_bundle().await;
        assert_eq!(bundle.len(), 1);
        // evicted from the mempool entirely, not just skipped
        assert_eq!(manager.mempool.count(), 1);
        assert!(manager.mempool.dump().iter().all(|uo| uo.factory() != Some(factory)));
    }

    #[tokio::test]
    async fn throttled_factory_is_capped_per_bundle() {
        let (manager, _) =
            bundle_manager(StubValidator::default(), U256::from(10_000_000));
        let factory = Address::random();
        manager.reputation.set_entries(vec![ReputationEntry {
            address: factory,
            ops_seen: 320,
            ops_included: 20,
            status: Status::OK,
        }]);
        assert_eq!(manager.reputation.status(&factory), Status::THROTTLED);

        for _ in 0..4 {
            admit(&manager, with_factory(factory));
        }

        let bundle = manager.create_bundle().await;
        assert!(bundle.len() <= 1 + THROTTLED_ENTITY_BUNDLE_COUNT as usize);
        // the skipped operations remain in the mempool
        assert_eq!(manager.mempool.count(), 4);
    }

    #[tokio::test]
    async fn failed_revalidation_evicts() {
        let failing = Address::random();
        let validator =
            StubValidator { failing_senders: vec![failing], ..Default::default() };
        let (manager, _) = bundle_manager(validator, U256::from(10_000_000));

        admit(&manager, UserOperation::random().sender(failing));
        admit(&manager, UserOperation::random());

        let bundle = manager.create_bundle().await;
        assert_eq!(bundle.len(), 1);
        assert_eq!(manager.mempool.count(), 1);
        assert!(manager.mempool.dump().iter().all(|uo| uo.sender != failing));
    }

    #[tokio::test]
    async fn exhausted_paymaster_deposit_skips_but_keeps_in_mempool() {
        let validator = StubValidator { prefund: U256::from(1_000), ..Default::default() };
        let (manager, mock) = bundle_manager(validator, U256::from(10_000_000));
        let paymaster = Address::random();

        admit_with_prefund(&manager, with_paymaster(paymaster), U256::from(1_000));

        // deposit lower than the prefund: the paymaster can still sponsor via a later bundle
        mock.push::<String, _>(format!("0x{:064x}", 100)).unwrap();

        let bundle = manager.create_bundle().await;
        assert!(bundle.is_empty());
        assert_eq!(manager.mempool.count(), 1);
    }

    #[test]
    fn failed_user_operation_removal_without_paymaster() {
        let bundle = vec![
            UserOperation::random(),
            UserOperation::random(),
            UserOperation::random(),
        ];
        let removed = remove_failed_user_operation(bundle.clone(), 1);
        assert_eq!(removed, vec![bundle[0].clone(), bundle[2].clone()]);
    }

    #[test]
    fn failed_user_operation_removal_drags_paymaster_siblings() {
        let paymaster = Address::random();
        let other_paymaster = Address::random();

        let bundle = vec![
            with_paymaster(paymaster),
            UserOperation::random(),
            with_paymaster(paymaster),
            with_paymaster(other_paymaster),
        ];
        let removed = remove_failed_user_operation(bundle.clone(), 0);
        assert_eq!(removed, vec![bundle[1].clone(), bundle[3].clone()]);
    }
}
