//! Proof Monitor
//!
//! Polls the indexer until a registration is reported, fetches the membership
//! proof for that block and publishes it on the [`ProofBus`].
//!
//! Indexer absence and indexer failures are both retried after a fixed
//! interval. Proof fetch failures end the pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, H256};
use issuing_types::{IndexerRecord, ProofEvent};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::ProofBus;
use crate::error::MonitorError;
use crate::indexer::IndexerClient;
use crate::proof::ProofProvider;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between indexer queries
    pub poll_interval: Duration,
    /// `None` polls forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

#[derive(Clone)]
pub struct ProofMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    indexer: Arc<dyn IndexerClient>,
    prover: Arc<dyn ProofProvider>,
    bus: ProofBus,
    policy: RetryPolicy,
    leaf_key: H256,
    in_flight: Mutex<HashSet<Address>>,
}

impl ProofMonitor {
    pub fn new(
        indexer: Arc<dyn IndexerClient>,
        prover: Arc<dyn ProofProvider>,
        bus: ProofBus,
        policy: RetryPolicy,
        leaf_key: H256,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                indexer,
                prover,
                bus,
                policy,
                leaf_key,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn bus(&self) -> &ProofBus {
        &self.inner.bus
    }

    /// Whether a pipeline for `token` is currently running
    pub fn is_watching(&self, token: Address) -> bool {
        self.inner.in_flight.lock().contains(&token)
    }

    /// Claim the pipeline slot for `token` without starting to poll
    ///
    /// The slot is released when the reservation is dropped unless it was
    /// [`start`](Reservation::start)ed.
    pub fn reserve(&self, token: Address) -> Result<Reservation, MonitorError> {
        Ok(Reservation {
            monitor: self.clone(),
            guard: InFlightGuard::acquire(self.inner.clone(), token)?,
        })
    }

    /// Spawn the pipeline for `token`
    ///
    /// Only one pipeline per token runs at a time.
    pub fn watch(&self, token: Address) -> Result<ProofSubscription, MonitorError> {
        Ok(self.reserve(token)?.start())
    }

    /// Run the pipeline for `token` on the current task
    pub async fn acquire(&self, token: Address) -> Result<ProofEvent, MonitorError> {
        let record = self.poll(token).await?;
        debug!(
            ?token,
            block = record.block_num,
            block_hash = ?record.block_hash,
            "registration indexed, fetching proof"
        );

        let proof = self
            .inner
            .prover
            .membership_proof(record.block_hash, self.inner.leaf_key)
            .await?;

        let event = ProofEvent {
            token,
            block_number: record.block_num,
            block_hash: record.block_hash,
            leaf_key: self.inner.leaf_key,
            proof,
        };
        let receivers = self.inner.bus.publish(event.clone());
        info!(?token, block = event.block_number, receivers, "registration proof delivered");

        Ok(event)
    }

    async fn poll(&self, token: Address) -> Result<IndexerRecord, MonitorError> {
        let policy = &self.inner.policy;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.inner.indexer.registration(token).await {
                Ok(Some(record)) => return Ok(record),
                Ok(None) => debug!(?token, attempts, "registration not yet indexed"),
                Err(e) => warn!(?token, attempts, error = %e, "indexer unavailable"),
            }

            if policy.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(MonitorError::RetriesExhausted { token, attempts });
            }
            tokio::time::sleep(policy.poll_interval).await;
        }
    }
}

/// Keeps `token` in the in-flight set for the lifetime of its pipeline
struct InFlightGuard {
    inner: Arc<Inner>,
    token: Address,
}

impl InFlightGuard {
    fn acquire(inner: Arc<Inner>, token: Address) -> Result<Self, MonitorError> {
        if !inner.in_flight.lock().insert(token) {
            return Err(MonitorError::AlreadyWatching(token));
        }
        Ok(Self { inner, token })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.token);
    }
}

/// Exclusive claim on the pipeline slot of one token
#[must_use = "dropping the reservation releases the pipeline slot"]
pub struct Reservation {
    monitor: ProofMonitor,
    guard: InFlightGuard,
}

impl Reservation {
    pub fn token(&self) -> Address {
        self.guard.token
    }

    /// Spawn the pipeline, which keeps the slot until it ends
    pub fn start(self) -> ProofSubscription {
        let Reservation { monitor, guard } = self;
        let token = guard.token;

        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = monitor.acquire(token).await;
            if let Err(e) = &result {
                error!(?token, error = %e, "proof pipeline failed");
            }
            result
        });

        ProofSubscription {
            token,
            task: Some(task),
        }
    }
}

/// Handle on a running pipeline
///
/// Dropping the handle cancels polling unless it was [`detach`](Self::detach)ed.
#[must_use = "dropping the subscription cancels proof monitoring; call detach() to keep it running"]
#[derive(Debug)]
pub struct ProofSubscription {
    token: Address,
    task: Option<JoinHandle<Result<ProofEvent, MonitorError>>>,
}

impl ProofSubscription {
    pub fn token(&self) -> Address {
        self.token
    }

    /// Wait for the proof
    pub async fn wait(mut self) -> Result<ProofEvent, MonitorError> {
        let joined = match self.task.as_mut() {
            Some(task) => task.await,
            None => return Err(MonitorError::Cancelled),
        };
        self.task = None;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(MonitorError::Cancelled),
            Err(_) => Err(MonitorError::Panicked),
        }
    }

    /// Stop polling for this token
    pub fn unsubscribe(self) {
        debug!(token = ?self.token, "unsubscribing from proof pipeline");
    }

    /// Let the pipeline finish in the background; the proof still reaches the bus
    pub fn detach(mut self) {
        self.task = None;
    }
}

impl Drop for ProofSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProver, ScriptedIndexer};
    use crate::proof::DEFAULT_LEAF_KEY;

    fn monitor_with(
        indexer: Arc<ScriptedIndexer>,
        prover: Arc<FakeProver>,
        policy: RetryPolicy,
    ) -> ProofMonitor {
        ProofMonitor::new(indexer, prover, ProofBus::new(8), policy, DEFAULT_LEAF_KEY)
    }

    fn token() -> Address {
        "0xE2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2".parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_indexed() {
        let indexer = Arc::new(ScriptedIndexer::indexed_after(2, H256::repeat_byte(7)));
        let prover = Arc::new(FakeProver::default());
        let monitor = monitor_with(indexer.clone(), prover.clone(), RetryPolicy::default());

        let event = monitor.acquire(token()).await.unwrap();

        let calls = indexer.call_times();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(3000));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(3000));

        assert_eq!(prover.requests(), vec![(H256::repeat_byte(7), DEFAULT_LEAF_KEY)]);
        assert_eq!(event.block_hash, H256::repeat_byte(7));
        assert_eq!(event.leaf_key, DEFAULT_LEAF_KEY);
        assert_eq!(event.token, token());
    }

    #[tokio::test(start_paused = true)]
    async fn test_indexer_errors_are_retried() {
        let indexer = Arc::new(ScriptedIndexer::failing_then_indexed(3, H256::repeat_byte(1)));
        let prover = Arc::new(FakeProver::default());
        let monitor = monitor_with(indexer.clone(), prover, RetryPolicy::default());

        monitor.acquire(token()).await.unwrap();
        assert_eq!(indexer.call_times().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retries() {
        let indexer = Arc::new(ScriptedIndexer::never_indexed());
        let prover = Arc::new(FakeProver::default());
        let policy = RetryPolicy {
            poll_interval: Duration::from_millis(100),
            max_attempts: Some(2),
        };
        let monitor = monitor_with(indexer.clone(), prover.clone(), policy);

        let err = monitor.acquire(token()).await.unwrap_err();
        assert!(matches!(err, MonitorError::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(indexer.call_times().len(), 2);
        assert!(prover.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_proof_failure_is_not_retried() {
        let indexer = Arc::new(ScriptedIndexer::indexed_after(0, H256::repeat_byte(3)));
        let prover = Arc::new(FakeProver::failing());
        let monitor = monitor_with(indexer.clone(), prover.clone(), RetryPolicy::default());
        let mut stream = monitor.bus().subscribe();

        let subscription = monitor.watch(token()).unwrap();
        let err = subscription.wait().await.unwrap_err();

        assert!(matches!(err, MonitorError::ProofFetch(_)));
        assert_eq!(indexer.call_times().len(), 1);
        assert_eq!(prover.requests().len(), 1);
        assert_eq!(stream.try_next(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_publishes_to_bus() {
        let indexer = Arc::new(ScriptedIndexer::indexed_after(1, H256::repeat_byte(9)));
        let prover = Arc::new(FakeProver::default());
        let monitor = monitor_with(indexer, prover, RetryPolicy::default());
        let mut stream = monitor.bus().subscribe();

        let subscription = monitor.watch(token()).unwrap();
        assert!(monitor.is_watching(token()));

        let delivered = subscription.wait().await.unwrap();
        assert_eq!(stream.next().await, Some(delivered));
        assert!(!monitor.is_watching(token()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_pipeline_per_token() {
        let indexer = Arc::new(ScriptedIndexer::never_indexed());
        let prover = Arc::new(FakeProver::default());
        let monitor = monitor_with(indexer, prover, RetryPolicy::default());

        let _first = monitor.watch(token()).unwrap();
        let second = monitor.watch(token());
        assert!(matches!(second, Err(MonitorError::AlreadyWatching(_))));

        let other = monitor.watch(Address::repeat_byte(1));
        assert!(other.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservation_holds_slot_until_dropped() {
        let indexer = Arc::new(ScriptedIndexer::never_indexed());
        let prover = Arc::new(FakeProver::default());
        let monitor = monitor_with(indexer.clone(), prover, RetryPolicy::default());

        let reservation = monitor.reserve(token()).unwrap();
        assert_eq!(reservation.token(), token());
        assert!(monitor.is_watching(token()));
        assert!(matches!(
            monitor.watch(token()),
            Err(MonitorError::AlreadyWatching(_))
        ));
        assert!(indexer.call_times().is_empty());

        drop(reservation);
        assert!(!monitor.is_watching(token()));

        let reservation = monitor.reserve(token()).unwrap();
        let _subscription = reservation.start();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(monitor.is_watching(token()));
        assert_eq!(indexer.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_polling() {
        let indexer = Arc::new(ScriptedIndexer::never_indexed());
        let prover = Arc::new(FakeProver::default());
        let monitor = monitor_with(indexer.clone(), prover, RetryPolicy::default());

        let subscription = monitor.watch(token()).unwrap();
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        let polled = indexer.call_times().len();
        assert_eq!(polled, 4);

        subscription.unsubscribe();
        tokio::time::sleep(Duration::from_millis(30_000)).await;

        assert_eq!(indexer.call_times().len(), polled);
        assert!(!monitor.is_watching(token()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_pipeline_still_delivers() {
        let indexer = Arc::new(ScriptedIndexer::indexed_after(1, H256::repeat_byte(5)));
        let prover = Arc::new(FakeProver::default());
        let monitor = monitor_with(indexer, prover, RetryPolicy::default());
        let mut stream = monitor.bus().subscribe();

        monitor.watch(token()).unwrap().detach();

        let event = stream.next_for(token()).await.unwrap();
        assert_eq!(event.block_hash, H256::repeat_byte(5));
    }
}
