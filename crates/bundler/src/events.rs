use ethers::{
    prelude::LogMeta,
    providers::Middleware,
    types::{Address, H256},
};
use eyre::format_err;
use futures_util::StreamExt;
use operon_contracts::{EntryPoint, EntryPointAPIEvents};
use operon_mempool::{Mempool, Reputation};
use operon_primitives::{constants::events::BOOTSTRAP_BLOCKS, provider::BlockStream};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Default)]
struct EventsInner {
    /// Next block to scan from; only moves forward
    last_block: u64,
    /// Aggregator announced by the most recent `SignatureAggregatorChanged` event,
    /// valid only for `UserOperationEvent`s of the same transaction
    aggregator: Option<Address>,
    aggregator_tx_hash: Option<H256>,
}

/// Tails the entry point's events, pruning included user operations from the
/// mempool and crediting the involved entities' reputation.
///
/// Cheap to clone; clones share the scan cursor, so live handling and
/// past-event drains serialize on the same lock.
pub struct EventsManager<M: Middleware + 'static> {
    entry_point: EntryPoint<M>,
    mempool: Mempool,
    reputation: Reputation,
    inner: Arc<Mutex<EventsInner>>,
}

impl<M: Middleware + 'static> Clone for EventsManager<M> {
    fn clone(&self) -> Self {
        Self {
            entry_point: self.entry_point.clone(),
            mempool: self.mempool.clone(),
            reputation: self.reputation.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<M: Middleware + 'static> EventsManager<M> {
    pub fn new(entry_point: EntryPoint<M>, mempool: Mempool, reputation: Reputation) -> Self {
        Self {
            entry_point,
            mempool,
            reputation,
            inner: Arc::new(Mutex::new(EventsInner::default())),
        }
    }

    /// Drains entry point logs since the last handled block and feeds them through the
    /// event handlers, so admission and bundling decisions see fresh reputation
    pub async fn handle_past_events(&self) -> eyre::Result<()> {
        let mut inner = self.inner.lock().await;

        let current_block = self
            .entry_point
            .eth_client()
            .get_block_number()
            .await
            .map_err(|err| format_err!("getting current block number failed: {err:?}"))?
            .as_u64();

        let events = self
            .entry_point
            .events()
            .from_block(inner.last_block)
            .query_with_meta()
            .await
            .map_err(|err| format_err!("querying entry point events failed: {err:?}"))?;

        for (event, meta) in events {
            self.handle_event(&mut inner, event, &meta);
        }

        inner.last_block = current_block;

        Ok(())
    }

    /// One-shot bootstrap scan; starts [BOOTSTRAP_BLOCKS](BOOTSTRAP_BLOCKS) blocks behind
    /// the current head (clamped at genesis)
    pub async fn initial_handle_past_events(&self) -> eyre::Result<()> {
        {
            let mut inner = self.inner.lock().await;

            let current_block = self
                .entry_point
                .eth_client()
                .get_block_number()
                .await
                .map_err(|err| format_err!("getting current block number failed: {err:?}"))?
                .as_u64();

            inner.last_block = current_block.saturating_sub(BOOTSTRAP_BLOCKS);
        }

        self.handle_past_events().await
    }

    /// Long-running watcher task: drains past events on every new block
    pub async fn listen(self, mut block_stream: BlockStream) -> eyre::Result<()> {
        while let Some(hash) = block_stream.next().await {
            match hash {
                Ok(_) => {
                    if let Err(err) = self.handle_past_events().await {
                        warn!("Events manager failed to handle past events: {err:?}");
                    }
                }
                Err(err) => warn!("Block stream error: {err:?}"),
            }
        }
        Ok(())
    }

    fn handle_event(&self, inner: &mut EventsInner, event: EntryPointAPIEvents, meta: &LogMeta) {
        match event {
            EntryPointAPIEvents::UserOperationEventFilter(event) => {
                let uo_hash = event.user_op_hash.into();
                debug!("User operation {uo_hash:?} included on-chain");
                self.mempool.remove_by_hash(&uo_hash);
                self.increment_included(event.sender);
                self.increment_included(event.paymaster);
                if let Some(aggregator) =
                    Self::event_aggregator(inner, meta.transaction_hash)
                {
                    self.increment_included(aggregator);
                }
                inner.last_block = meta.block_number.as_u64() + 1;
            }
            EntryPointAPIEvents::AccountDeployedFilter(event) => {
                self.increment_included(event.paymaster);
                inner.last_block = meta.block_number.as_u64() + 1;
            }
            EntryPointAPIEvents::SignatureAggregatorChangedFilter(event) => {
                inner.aggregator = Some(event.aggregator);
                inner.aggregator_tx_hash = Some(meta.transaction_hash);
                inner.last_block = meta.block_number.as_u64() + 1;
            }
            _ => {}
        }
    }

    fn increment_included(&self, addr: Address) {
        if !addr.is_zero() {
            self.reputation.increment_included(&addr);
        }
    }

    /// The carried aggregator applies only within a single transaction; seeing a new
    /// transaction hash resets the carry
    fn event_aggregator(inner: &mut EventsInner, tx_hash: H256) -> Option<Address> {
        if inner.aggregator_tx_hash != Some(tx_hash) {
            inner.aggregator = None;
            inner.aggregator_tx_hash = Some(tx_hash);
        }
        inner.aggregator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::{
        providers::{MockProvider, Provider},
        types::{U256, U64},
    };
    use operon_contracts::entry_point_api::{
        SignatureAggregatorChangedFilter, UserOperationEventFilter,
    };
    use operon_mempool::MempoolEntry;
    use operon_primitives::{
        constants::validation::reputation::{
            BAN_SLACK, MIN_INCLUSION_RATE_DENOMINATOR, THROTTLING_SLACK,
        },
        reputation::StakeInfo,
        UserOperation,
    };

    fn events_manager() -> EventsManager<Provider<MockProvider>> {
        let (provider, _) = Provider::mocked();
        let entry_point = EntryPoint::new(
            Arc::new(provider),
            "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap(),
        );
        let reputation = Reputation::new(
            MIN_INCLUSION_RATE_DENOMINATOR,
            THROTTLING_SLACK,
            BAN_SLACK,
            U256::from(1),
            U256::zero(),
        );
        let mempool = Mempool::new(reputation.clone());
        EventsManager::new(entry_point, mempool, reputation)
    }

    fn meta(block: u64, tx_hash: H256) -> LogMeta {
        LogMeta {
            address: Address::random(),
            block_number: U64::from(block),
            block_hash: H256::random(),
            transaction_hash: tx_hash,
            transaction_index: U64::zero(),
            log_index: U256::zero(),
        }
    }

    fn included_event(
        uo_hash: [u8; 32],
        sender: Address,
        paymaster: Address,
    ) -> EntryPointAPIEvents {
        EntryPointAPIEvents::UserOperationEventFilter(UserOperationEventFilter {
            user_op_hash: uo_hash,
            sender,
            paymaster,
            nonce: U256::zero(),
            success: true,
            actual_gas_cost: U256::zero(),
            actual_gas_used: U256::zero(),
        })
    }

    #[tokio::test]
    async fn user_operation_event_prunes_mempool() {
        let manager = events_manager();
        let sender = Address::random();

        let uo = UserOperation::random().sender(sender);
        let hash = uo.hash(&manager.entry_point.address(), 1);
        manager
            .mempool
            .add(
                MempoolEntry {
                    user_operation: uo,
                    hash,
                    prefund: U256::zero(),
                    aggregator: None,
                },
                &StakeInfo { address: sender, stake: U256::zero(), unstake_delay: U256::zero() },
            )
            .unwrap();
        assert_eq!(manager.mempool.count(), 1);

        let paymaster = Address::random();
        let mut inner = EventsInner::default();
        manager.handle_event(
            &mut inner,
            included_event(hash.0.into(), sender, paymaster),
            &meta(10, H256::random()),
        );

        assert_eq!(manager.mempool.count(), 0);
        assert_eq!(inner.last_block, 11);

        let entries = manager.reputation.get_all();
        assert!(entries.iter().any(|e| e.address == sender && e.ops_included == 1));
        assert!(entries.iter().any(|e| e.address == paymaster && e.ops_included == 1));
    }

    #[tokio::test]
    async fn zero_paymaster_is_not_credited() {
        let manager = events_manager();
        let mut inner = EventsInner::default();

        manager.handle_event(
            &mut inner,
            included_event([0u8; 32], Address::random(), Address::zero()),
            &meta(1, H256::random()),
        );

        assert!(manager.reputation.get_all().iter().all(|e| !e.address.is_zero()));
    }

    #[tokio::test]
    async fn aggregator_carry_is_scoped_to_transaction() {
        let manager = events_manager();
        let aggregator = Address::random();
        let tx_a = H256::random();
        let tx_b = H256::random();
        let mut inner = EventsInner::default();

        manager.handle_event(
            &mut inner,
            EntryPointAPIEvents::SignatureAggregatorChangedFilter(
                SignatureAggregatorChangedFilter { aggregator },
            ),
            &meta(5, tx_a),
        );

        // same transaction: the aggregator is credited
        manager.handle_event(
            &mut inner,
            included_event([1u8; 32], Address::random(), Address::zero()),
            &meta(5, tx_a),
        );
        assert!(manager
            .reputation
            .get_all()
            .iter()
            .any(|e| e.address == aggregator && e.ops_included == 1));

        // different transaction: the carry resets
        manager.handle_event(
            &mut inner,
            included_event([2u8; 32], Address::random(), Address::zero()),
            &meta(6, tx_b),
        );
        let entry = manager
            .reputation
            .get_all()
            .into_iter()
            .find(|e| e.address == aggregator)
            .unwrap();
        assert_eq!(entry.ops_included, 1);
    }
}
