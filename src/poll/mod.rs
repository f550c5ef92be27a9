//! Bounded polling against remote state machines
//!
//! One generic poll-until-terminal loop drives both the aggregator status
//! endpoint and on-chain confirmation waits. Timing lives in an explicit
//! `RetryPolicy` value so schedules are testable on their own: which
//! interval a given attempt gets, how transient failures are absorbed,
//! and when the attempt budget runs out.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::types::{StatusParams, StatusResponse, StatusSnapshot, TransferStatus};
use crate::api::ApiClient;
use crate::error::{TransferError, TransferResult};

/// Timing and budget for one polling loop
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Interval bands: the first (upper bound, interval) whose bound
    /// exceeds the attempt index wins
    schedule: Vec<(u32, Duration)>,
    /// Interval once every band is exhausted
    fallback: Duration,
    /// Sleep after a transient query failure
    pub transient_delay: Duration,
    /// Wall-clock ceiling on the whole poll, independent of attempts
    deadline: Option<Duration>,
}

impl RetryPolicy {
    /// Aggregator status schedule: 3 s for the first 10 attempts, 5 s up
    /// to attempt 40, 10 s afterwards.
    pub fn status(max_attempts: u32, transient_delay: Duration) -> Self {
        Self {
            max_attempts,
            schedule: vec![
                (10, Duration::from_millis(3000)),
                (40, Duration::from_millis(5000)),
            ],
            fallback: Duration::from_millis(10000),
            transient_delay,
            deadline: None,
        }
    }

    /// On-chain confirmation wait: 2 s interval, hard 60 s wall-clock
    /// ceiling even when individual queries are slow.
    pub fn confirmation() -> Self {
        Self {
            max_attempts: 30,
            schedule: Vec::new(),
            fallback: Duration::from_millis(2000),
            transient_delay: Duration::from_millis(2000),
            deadline: Some(Duration::from_secs(60)),
        }
    }

    pub fn interval_for(&self, attempt: u32) -> Duration {
        self.schedule
            .iter()
            .find(|(bound, _)| attempt < *bound)
            .map(|(_, interval)| *interval)
            .unwrap_or(self.fallback)
    }
}

/// One observation of a polled state machine
pub enum PollState<T> {
    /// Done; stop polling and hand back the result
    Terminal(T),
    /// Still in flight; the label is logged and otherwise opaque
    Pending(String),
}

/// Something that can be polled toward a terminal outcome
#[async_trait]
pub trait PollTarget {
    type Output: Send;

    /// Query once. A transient error (per `TransferError::is_transient`)
    /// consumes an attempt and is retried; any other error aborts.
    async fn check(&mut self) -> TransferResult<PollState<Self::Output>>;
}

/// Drive a target until terminal, a fatal error, an exhausted attempt
/// budget, or (when the policy carries one) a wall-clock deadline.
///
/// Every iteration consumes exactly one attempt, including iterations
/// that end in a transient failure. Running out of attempts or time
/// means the outcome is unknown, not failed.
pub async fn poll_until_terminal<T>(
    policy: &RetryPolicy,
    target: &mut T,
) -> TransferResult<T::Output>
where
    T: PollTarget + Send,
{
    let mut attempt = 0;
    match policy.deadline {
        Some(limit) => {
            let outcome = tokio::time::timeout(limit, drive(policy, target, &mut attempt)).await;
            match outcome {
                Ok(result) => result,
                Err(_) => Err(TransferError::PollingTimeout { attempts: attempt }),
            }
        }
        None => drive(policy, target, &mut attempt).await,
    }
}

async fn drive<T>(
    policy: &RetryPolicy,
    target: &mut T,
    attempt: &mut u32,
) -> TransferResult<T::Output>
where
    T: PollTarget + Send,
{
    while *attempt < policy.max_attempts {
        match target.check().await {
            Ok(PollState::Terminal(outcome)) => return Ok(outcome),
            Ok(PollState::Pending(label)) => {
                let interval = policy.interval_for(*attempt);
                debug!(
                    "Status: {} (attempt {}/{}), next check in {:?}",
                    label,
                    *attempt + 1,
                    policy.max_attempts,
                    interval
                );
                tokio::time::sleep(interval).await;
            }
            Err(e) if e.is_transient() => {
                warn!("Polling error (attempt {}), retrying: {}", *attempt + 1, e);
                tokio::time::sleep(policy.transient_delay).await;
            }
            Err(e) => return Err(e),
        }
        *attempt += 1;
    }

    Err(TransferError::PollingTimeout {
        attempts: policy.max_attempts,
    })
}

/// Source of status snapshots; the API client in production, a script in
/// tests.
#[async_trait]
pub trait StatusSource: Send {
    async fn fetch(&mut self, params: &StatusParams) -> TransferResult<StatusResponse>;
}

#[async_trait]
impl StatusSource for &ApiClient {
    async fn fetch(&mut self, params: &StatusParams) -> TransferResult<StatusResponse> {
        self.get_status(params).await
    }
}

/// Drives the remote transfer state machine to COMPLETED or FAILED
pub struct StatusPoller<S: StatusSource> {
    watch: StatusWatch<S>,
    policy: RetryPolicy,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(source: S, params: StatusParams, policy: RetryPolicy) -> Self {
        Self {
            watch: StatusWatch { source, params },
            policy,
        }
    }

    /// Poll until a terminal status. Exactly one poll sequence may exist
    /// per transfer; the poller is consumed by running it.
    pub async fn run(mut self) -> TransferResult<StatusSnapshot> {
        info!("Starting status polling...");
        poll_until_terminal(&self.policy, &mut self.watch).await
    }
}

struct StatusWatch<S: StatusSource> {
    source: S,
    params: StatusParams,
}

#[async_trait]
impl<S: StatusSource> PollTarget for StatusWatch<S> {
    type Output = StatusSnapshot;

    async fn check(&mut self) -> TransferResult<PollState<StatusSnapshot>> {
        let response = self.source.fetch(&self.params).await?;
        let snapshot = response.data;

        for (index, step) in snapshot.steps.iter().enumerate() {
            info!("  Step {}: {} - {}", index + 1, step.name, step.status);
        }

        match snapshot.status {
            TransferStatus::Completed => {
                info!("Transfer completed successfully");
                Ok(PollState::Terminal(snapshot))
            }
            TransferStatus::Failed => Err(TransferError::TransferFailed {
                message: response.message,
            }),
            ref other => Ok(PollState::Pending(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn status_schedule_bands() {
        let policy = RetryPolicy::status(200, Duration::from_millis(5000));
        for attempt in [0, 1, 9] {
            assert_eq!(policy.interval_for(attempt), Duration::from_millis(3000));
        }
        for attempt in [10, 25, 39] {
            assert_eq!(policy.interval_for(attempt), Duration::from_millis(5000));
        }
        for attempt in [40, 100, 999] {
            assert_eq!(policy.interval_for(attempt), Duration::from_millis(10000));
        }
    }

    #[test]
    fn confirmation_policy_covers_sixty_seconds() {
        let policy = RetryPolicy::confirmation();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.interval_for(0), Duration::from_millis(2000));
        assert_eq!(policy.interval_for(29), Duration::from_millis(2000));
        assert_eq!(policy.deadline, Some(Duration::from_secs(60)));
    }

    struct SlowNode {
        calls: u32,
    }

    #[async_trait]
    impl PollTarget for SlowNode {
        type Output = ();

        async fn check(&mut self) -> TransferResult<PollState<()>> {
            self.calls += 1;
            // a node that takes 30 s to answer each query
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(PollState::Pending("submitted".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_ceiling_is_wall_clock_not_attempts() {
        // two 30 s queries already hit the ceiling; the attempt budget
        // alone would have let this run for minutes
        let policy = RetryPolicy::confirmation();
        let mut node = SlowNode { calls: 0 };

        let started = Instant::now();
        let err = poll_until_terminal(&policy, &mut node).await.unwrap_err();

        assert!(matches!(err, TransferError::PollingTimeout { .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert_eq!(node.calls, 2);
    }

    struct Scripted {
        responses: VecDeque<TransferResult<StatusResponse>>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl StatusSource for Scripted {
        async fn fetch(&mut self, _params: &StatusParams) -> TransferResult<StatusResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .pop_front()
                .expect("polled after the script ended")
        }
    }

    fn snapshot(status: &str, tx_hash: &str) -> TransferResult<StatusResponse> {
        let json = serde_json::json!({
            "success": true,
            "message": "ok",
            "data": {
                "transactionId": "t-1",
                "txHash": tx_hash,
                "sourceChain": "Arbitrum",
                "targetChain": "Solana",
                "status": status,
                "steps": []
            }
        });
        Ok(serde_json::from_value(json).unwrap())
    }

    fn failed(message: &str) -> TransferResult<StatusResponse> {
        let json = serde_json::json!({
            "success": false,
            "message": message,
            "data": {
                "transactionId": "t-1",
                "txHash": "0x0",
                "sourceChain": "Arbitrum",
                "targetChain": "Solana",
                "status": "FAILED",
                "steps": []
            }
        });
        Ok(serde_json::from_value(json).unwrap())
    }

    fn params() -> StatusParams {
        StatusParams {
            request_id: "r-1".into(),
            tx_hash: "0xsrc".into(),
            user_address: "user".into(),
            recipient_address: "rcpt".into(),
            amount: "099500".into(),
            source_chain_id: 11,
            target_chain_id: 1,
            target_token_address: "tok".into(),
            auth_signature: None,
            auth_public_key: None,
        }
    }

    fn poller(
        script: Vec<TransferResult<StatusResponse>>,
        max_attempts: u32,
    ) -> (StatusPoller<Scripted>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let source = Scripted {
            responses: script.into(),
            calls: calls.clone(),
        };
        let policy = RetryPolicy::status(max_attempts, Duration::from_millis(5000));
        (StatusPoller::new(source, params(), policy), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_one_processing_poll() {
        // attempt 1 processing, attempt 2 completed: two queries and a
        // single 3000 ms sleep in between
        let (poller, calls) = poller(
            vec![snapshot("PROCESSING_RELAY_POLL", "0x0"), snapshot("COMPLETED", "0xabc")],
            200,
        );

        let started = Instant::now();
        let final_snapshot = poller.run().await.unwrap();

        assert_eq!(final_snapshot.tx_hash, "0xabc");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_consume_attempts_and_continue() {
        // attempts 3 and 4 fail transiently; no error escapes, each
        // failure sleeps the fixed 5000 ms and burns an attempt
        let (poller, calls) = poller(
            vec![
                snapshot("INITIATED", "0x0"),
                snapshot("PROCESSING_CCTP_QUOTE", "0x0"),
                Err(TransferError::TransientQuery("connection reset".into())),
                Err(TransferError::TransientQuery("502".into())),
                snapshot("PROCESSING_RELAYER_CLAIM", "0x0"),
                snapshot("COMPLETED", "0xabc"),
            ],
            200,
        );

        let started = Instant::now();
        poller.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        // 3 non-terminal polls at 3000 ms each + two 5000 ms transient sleeps
        assert_eq!(started.elapsed(), Duration::from_millis(3 * 3000 + 2 * 5000));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_aborts_without_retry() {
        let (poller, calls) = poller(
            vec![snapshot("INITIATED", "0x0"), failed("relayer claim failed")],
            200,
        );

        let err = poller.run().await.unwrap_err();
        match err {
            TransferError::TransferFailed { message } => {
                assert_eq!(message, "relayer claim failed")
            }
            other => panic!("unexpected error: {}", other),
        }
        // the failing query was the last one; nothing polled afterwards
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_halts_immediately() {
        let (poller, calls) = poller(vec![snapshot("COMPLETED", "0xabc")], 200);

        let started = Instant::now();
        poller.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_is_a_timeout_with_unknown_outcome() {
        // transient failures count toward the budget too
        let (poller, calls) = poller(
            vec![
                Err(TransferError::TransientQuery("down".into())),
                Err(TransferError::TransientQuery("down".into())),
                snapshot("INITIATED", "0x0"),
                snapshot("PROCESSING_RELAY_POLL", "0x0"),
            ],
            4,
        );

        let err = poller.run().await.unwrap_err();
        assert!(matches!(err, TransferError::PollingTimeout { attempts: 4 }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
