//! Fulfillment orchestrator implementation.
//!
//! A run takes one pending order to a terminal status:
//! - Allocate: reserve an exact-sum basket of codes
//! - Drain: redeem each code, rotating workers on lockout and replacing dead codes
//! - Conclude: write the terminal status and report, returning leftovers to stock
//!
//! Runs are sequential inside; several runs may share the ledger concurrently.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::allocator::CombinationAllocator;
use crate::audit::{AuditEvent, AuditHandle};
use crate::driver::{classify, ActivationDriver, DriverError, Verdict};
use crate::metrics;
use crate::order::{
    CodeOutcome, Order, OrderCompletion, OrderError, OrderFilter, OrderStatus, OrderStore,
    ReportStatus,
};
use crate::stock::{
    Code, CodeId, CodeState, Finalization, FinalizeOutcome, StockError, StockLedger,
};
use crate::workers::{WorkerCredentials, WorkerPool, WorkerRegistry};

use super::config::FulfillmentConfig;
use super::types::{
    FulfillmentError, FulfillmentStatus, NO_ACTIVE_WORKERS, NO_MATCHING_CODES,
    RESERVATION_LOST, WORKER_POOL_EXHAUSTED,
};

/// Orders picked up per poll of the background loop.
const READY_BATCH: i64 = 10;

/// Clamp for the auto-fulfill delay (one year).
const MAX_DELAY_SECS: u64 = 365 * 24 * 3600;

/// Progress of one run, kept outside the drain loop so a storage failure
/// still leaves an accurate report behind.
#[derive(Debug, Default)]
struct RunState {
    report: Vec<CodeOutcome>,
    activated: u64,
    exhausted: bool,
}

impl RunState {
    fn record(
        &mut self,
        code: &Code,
        status: ReportStatus,
        worker: Option<&str>,
        reason: Option<&str>,
    ) {
        self.report.push(CodeOutcome {
            code_id: code.id,
            code: code.masked(),
            value: code.value,
            status,
            worker: worker.map(String::from),
            reason: reason.map(String::from),
        });
    }

    fn conclude(self, target: u64) -> OrderCompletion {
        let (status, error_reason) = if self.activated == target {
            (OrderStatus::Completed, None)
        } else if self.exhausted && self.activated == 0 {
            (OrderStatus::Error, Some(WORKER_POOL_EXHAUSTED.to_string()))
        } else if self.exhausted {
            (OrderStatus::Partial, Some(WORKER_POOL_EXHAUSTED.to_string()))
        } else {
            (OrderStatus::Partial, None)
        };

        OrderCompletion {
            status,
            activated_amount: self.activated,
            error_reason,
            report: self.report,
        }
    }

    fn fail(self, reason: String) -> OrderCompletion {
        OrderCompletion {
            status: OrderStatus::Error,
            activated_amount: self.activated,
            error_reason: Some(reason),
            report: self.report,
        }
    }
}

enum Step {
    Next,
    Stop,
}

/// Shared by API-triggered runs and the background loop.
struct Engine {
    config: FulfillmentConfig,
    ledger: Arc<dyn StockLedger>,
    orders: Arc<dyn OrderStore>,
    workers: Arc<dyn WorkerRegistry>,
    driver: Arc<dyn ActivationDriver>,
    allocator: CombinationAllocator,
    audit: Option<AuditHandle>,
}

impl Engine {
    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }

    /// Owned entry point for runs spawned onto their own task.
    async fn run_detached(self: Arc<Self>, order_id: String) -> Result<Order, FulfillmentError> {
        self.fulfill(&order_id).await
    }

    async fn fulfill(&self, order_id: &str) -> Result<Order, FulfillmentError> {
        let order = self.orders.claim(order_id).map_err(|e| match e {
            OrderError::NotFound(id) => FulfillmentError::OrderNotFound(id),
            OrderError::InvalidState {
                order_id,
                current_status,
                ..
            } => FulfillmentError::NotClaimable {
                order_id,
                status: current_status,
            },
            other => FulfillmentError::Order(other),
        })?;

        let started = Instant::now();
        info!(
            order_id = %order.id,
            uid = %order.uid,
            target = order.target_amount,
            driver = self.driver.name(),
            "Fulfilling order"
        );

        let mut state = RunState::default();
        let completion = match self.drain(&order, &mut state).await {
            Ok(None) => state.conclude(order.target_amount),
            Ok(Some(reason)) => state.fail(reason.to_string()),
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Fulfillment run failed");
                state.fail(e.to_string())
            }
        };

        if completion.status != OrderStatus::Completed {
            self.release_leftovers(&order.id).await;
        }

        let status = completion.status;
        let finished = self.orders.complete(&order.id, completion)?;

        metrics::ORDERS_FINISHED
            .with_label_values(&[status.as_str()])
            .inc();
        metrics::FULFILLMENT_DURATION
            .with_label_values(&[status.as_str()])
            .observe(started.elapsed().as_secs_f64());

        self.emit(AuditEvent::OrderStatusChanged {
            order_id: finished.id.clone(),
            from_status: OrderStatus::Pending.as_str().to_string(),
            to_status: status.as_str().to_string(),
            activated_amount: finished.activated_amount,
            target_amount: finished.target_amount,
            reason: finished.error_reason.clone(),
        })
        .await;

        info!(
            order_id = %finished.id,
            status = %status,
            activated = finished.activated_amount,
            target = finished.target_amount,
            codes = finished.report.len(),
            "Order finished"
        );

        Ok(finished)
    }

    /// Returns `Some(reason)` when the run ends before any code is tried.
    async fn drain(
        &self,
        order: &Order,
        state: &mut RunState,
    ) -> Result<Option<&'static str>, FulfillmentError> {
        let Some(basket) = self.allocator.allocate(order.target_amount, &order.id)? else {
            warn!(order_id = %order.id, target = order.target_amount, "No exact basket in stock");
            return Ok(Some(NO_MATCHING_CODES));
        };

        let workers = self.workers.list_active()?;
        if workers.is_empty() {
            warn!(order_id = %order.id, "No active workers");
            return Ok(Some(NO_ACTIVE_WORKERS));
        }

        self.emit(AuditEvent::FulfillmentStarted {
            order_id: order.id.clone(),
            target_amount: order.target_amount,
            basket_size: basket.len(),
            workers: workers.len(),
        })
        .await;

        // Lockouts live in this pool only; the next run starts from a fresh one.
        let mut pool = WorkerPool::new(workers);
        let mut worklist: VecDeque<Code> = basket.codes.into();

        while let Some(code) = worklist.pop_front() {
            match self
                .redeem(order, code, &mut pool, &mut worklist, state)
                .await?
            {
                Step::Next => {}
                Step::Stop => break,
            }
        }

        Ok(None)
    }

    /// Drive one code until it is activated, broken, or the pool runs dry.
    async fn redeem(
        &self,
        order: &Order,
        code: Code,
        pool: &mut WorkerPool,
        worklist: &mut VecDeque<Code>,
        state: &mut RunState,
    ) -> Result<Step, FulfillmentError> {
        loop {
            let Some(worker) = pool.current() else {
                self.exhaust(order, code, worklist, state).await?;
                return Ok(Step::Stop);
            };
            let credentials = worker.credentials();

            match self.attempt(&credentials, &order.uid, &code).await {
                Verdict::Activated => {
                    self.on_activated(order, &code, &credentials.identity, state)
                        .await?;
                    return Ok(Step::Next);
                }
                Verdict::Lockout => {
                    pool.lock_out_current();
                    warn!(
                        order_id = %order.id,
                        worker = %credentials.identity,
                        code_id = code.id,
                        remaining = pool.usable_count(),
                        "Worker locked out for the rest of this run"
                    );
                    metrics::WORKER_LOCKOUTS.inc();
                    self.emit(AuditEvent::WorkerLockedOut {
                        order_id: order.id.clone(),
                        worker: credentials.identity.clone(),
                        code_id: code.id,
                    })
                    .await;
                }
                Verdict::DeadCode { reason } => {
                    self.on_dead_code(order, &code, &credentials.identity, &reason, worklist, state)
                        .await?;
                    return Ok(Step::Next);
                }
            }
        }
    }

    /// One driver call, bounded by the activation timeout and classified once.
    async fn attempt(&self, credentials: &WorkerCredentials, uid: &str, code: &Code) -> Verdict {
        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.activation_timeout_secs);

        let result = match tokio::time::timeout(
            timeout,
            self.driver.activate(credentials, uid, &code.code),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout),
        };

        if let Err(ref e) = result {
            warn!(code_id = code.id, worker = %credentials.identity, error = %e, "Driver call failed");
        }

        let verdict = classify(&result, &self.config.lockout_markers);
        metrics::ACTIVATION_OUTCOMES
            .with_label_values(&[verdict.label()])
            .inc();
        metrics::ACTIVATION_DURATION
            .with_label_values(&[verdict.label()])
            .observe(started.elapsed().as_secs_f64());

        debug!(
            code_id = code.id,
            value = code.value,
            worker = %credentials.identity,
            verdict = verdict.label(),
            "Activation attempt finished"
        );
        verdict
    }

    /// `None` when the reservation was taken from this run while the driver
    /// call was in flight (operator release, then another order's reserve).
    fn finalize_owned(
        &self,
        order: &Order,
        code: &Code,
        finalization: Finalization,
    ) -> Result<Option<FinalizeOutcome>, FulfillmentError> {
        match self.ledger.finalize(code.id, finalization) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(StockError::Conflict { .. }) | Err(StockError::InvalidState { .. }) => {
                warn!(
                    order_id = %order.id,
                    code_id = code.id,
                    "Reservation lost before the code could be finalized"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn on_activated(
        &self,
        order: &Order,
        code: &Code,
        worker: &str,
        state: &mut RunState,
    ) -> Result<(), FulfillmentError> {
        let finalization = Finalization::Activated {
            buyer_uid: order.uid.clone(),
            order_id: order.id.clone(),
        };
        let Some(outcome) = self.finalize_owned(order, code, finalization)? else {
            state.record(code, ReportStatus::Broken, Some(worker), Some(RESERVATION_LOST));
            return Ok(());
        };

        if outcome.state() != CodeState::Activated {
            // This order already broke the code in an earlier call.
            warn!(
                order_id = %order.id,
                code_id = code.id,
                state = %outcome.state(),
                "Activated code was already final in the ledger"
            );
            state.record(
                code,
                ReportStatus::Broken,
                Some(worker),
                Some("ledger_state_conflict"),
            );
            return Ok(());
        }

        state.activated += u64::from(code.value);
        state.record(code, ReportStatus::Success, Some(worker), None);
        info!(
            order_id = %order.id,
            code_id = code.id,
            value = code.value,
            worker,
            activated = state.activated,
            "Code activated"
        );

        self.emit(AuditEvent::CodeActivated {
            order_id: order.id.clone(),
            code_id: code.id,
            code: code.masked(),
            value: code.value,
            worker: worker.to_string(),
        })
        .await;
        Ok(())
    }

    async fn on_dead_code(
        &self,
        order: &Order,
        code: &Code,
        worker: &str,
        reason: &str,
        worklist: &mut VecDeque<Code>,
        state: &mut RunState,
    ) -> Result<(), FulfillmentError> {
        let finalization = Finalization::Broken {
            reason: reason.to_string(),
            order_id: order.id.clone(),
        };
        if self.finalize_owned(order, code, finalization)?.is_none() {
            state.record(code, ReportStatus::Broken, Some(worker), Some(RESERVATION_LOST));
            return Ok(());
        }

        let replacement = self.allocator.replacement(code.value, &order.id)?;
        let replacement_code_id = replacement.as_ref().map(|c| c.id);

        let status = if replacement.is_some() {
            ReportStatus::Broken
        } else {
            ReportStatus::FailedNoReplacement
        };
        state.record(code, status, Some(worker), Some(reason));

        warn!(
            order_id = %order.id,
            code_id = code.id,
            value = code.value,
            reason,
            replacement = ?replacement_code_id,
            "Code is dead"
        );

        self.emit(AuditEvent::CodeBroken {
            order_id: order.id.clone(),
            code_id: code.id,
            code: code.masked(),
            value: code.value,
            reason: reason.to_string(),
            worker: worker.to_string(),
            replacement_code_id,
        })
        .await;

        if let Some(replacement) = replacement {
            worklist.push_back(replacement);
        }
        Ok(())
    }

    /// Every worker is locked out: hand the current and queued codes back.
    async fn exhaust(
        &self,
        order: &Order,
        code: Code,
        worklist: &mut VecDeque<Code>,
        state: &mut RunState,
    ) -> Result<(), FulfillmentError> {
        let ids: Vec<CodeId> = std::iter::once(code.id)
            .chain(worklist.iter().map(|c| c.id))
            .collect();
        let released = self.ledger.release(&ids)?;

        state.exhausted = true;
        state.record(
            &code,
            ReportStatus::FailedPoolExhausted,
            None,
            Some(WORKER_POOL_EXHAUSTED),
        );
        for queued in worklist.drain(..) {
            state.record(
                &queued,
                ReportStatus::FailedPoolExhausted,
                None,
                Some("not_attempted"),
            );
        }

        metrics::POOL_EXHAUSTIONS.inc();
        error!(
            order_id = %order.id,
            released,
            activated = state.activated,
            "Worker pool exhausted, stopping run"
        );

        self.emit(AuditEvent::WorkerPoolExhausted {
            order_id: order.id.clone(),
            codes_released: released,
        })
        .await;
        Ok(())
    }

    /// Best effort: a failure here is logged, the order still gets its status.
    async fn release_leftovers(&self, order_id: &str) {
        match self.ledger.release_order(order_id) {
            Ok(0) => {}
            Ok(count) => {
                debug!(order_id, count, "Released leftover reservations");
                self.emit(AuditEvent::ReservationsReleased {
                    order_id: Some(order_id.to_string()),
                    count,
                    released_by: None,
                })
                .await;
            }
            Err(e) => {
                error!(order_id, error = %e, "Failed to release leftover reservations");
            }
        }
    }

    /// Run every order that has waited past the auto-fulfill delay.
    async fn process_ready(&self) -> Result<usize, FulfillmentError> {
        let delay = chrono::Duration::seconds(
            self.config.auto_fulfill_delay_secs.min(MAX_DELAY_SECS) as i64,
        );
        let cutoff = Utc::now() - delay;
        let ready = self.orders.list_ready(cutoff, READY_BATCH)?;

        let mut processed = 0;
        for order in ready {
            match self.fulfill(&order.id).await {
                Ok(_) => processed += 1,
                // Claimed through the API or cancelled since the listing.
                Err(FulfillmentError::NotClaimable { order_id, status }) => {
                    debug!(order_id = %order_id, status = %status, "Order no longer ready");
                }
                Err(e) => {
                    error!(order_id = %order.id, error = %e, "Auto-fulfillment failed");
                }
            }
        }
        Ok(processed)
    }
}

/// Drives pending orders to a terminal status.
pub struct FulfillmentOrchestrator {
    engine: Arc<Engine>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl FulfillmentOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: FulfillmentConfig,
        ledger: Arc<dyn StockLedger>,
        orders: Arc<dyn OrderStore>,
        workers: Arc<dyn WorkerRegistry>,
        driver: Arc<dyn ActivationDriver>,
        audit: Option<AuditHandle>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let allocator = CombinationAllocator::new(Arc::clone(&ledger))
            .with_max_attempts(config.allocation_retries);

        Self {
            engine: Arc::new(Engine {
                config,
                ledger,
                orders,
                workers,
                driver,
                allocator,
                audit,
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Run one order to a terminal status and return it.
    ///
    /// Fails without side effects when the order does not exist, is
    /// terminal, or another run already holds it. The run is detached from
    /// the caller: dropping the returned future does not stop it.
    pub async fn fulfill_order(&self, order_id: &str) -> Result<Order, FulfillmentError> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(engine.run_detached(order_id.to_string()))
            .await
            .map_err(|e| FulfillmentError::Aborted(e.to_string()))?
    }

    /// Fulfill every order that is past the auto-fulfill delay, one at a time.
    pub async fn process_ready(&self) -> Result<usize, FulfillmentError> {
        self.engine.process_ready().await
    }

    /// Start the background loop.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Fulfillment loop already running");
            return;
        }

        let running = Arc::clone(&self.running);
        let engine = Arc::clone(&self.engine);
        let poll_interval = Duration::from_millis(engine.config.poll_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(
                poll_interval_ms = engine.config.poll_interval_ms,
                delay_secs = engine.config.auto_fulfill_delay_secs,
                "Fulfillment loop started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Fulfillment loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = engine.process_ready().await {
                            warn!("Fulfillment poll error: {}", e);
                        }
                    }
                }
            }
            info!("Fulfillment loop stopped");
        });
    }

    /// Stop the background loop. A run in progress finishes first.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping fulfillment loop");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> FulfillmentStatus {
        let pending_count = self
            .engine
            .orders
            .count(&OrderFilter::new().with_status(OrderStatus::Pending))
            .unwrap_or(0) as usize;

        FulfillmentStatus {
            running: self.is_running(),
            pending_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(id: CodeId, value: u32) -> Code {
        Code {
            id,
            code: format!("CODE-{:08}", id),
            value,
            state: CodeState::Reserved,
            reserved_for: Some("o".to_string()),
            buyer_uid: None,
            activated_at: None,
            error_reason: None,
            version: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_conclude_completed() {
        let state = RunState {
            activated: 180,
            ..Default::default()
        };
        let completion = state.conclude(180);
        assert_eq!(completion.status, OrderStatus::Completed);
        assert!(completion.error_reason.is_none());
    }

    #[test]
    fn test_conclude_partial_without_activations() {
        let mut state = RunState::default();
        state.record(&code(1, 60), ReportStatus::FailedNoReplacement, Some("a"), Some("x"));
        let completion = state.conclude(60);
        assert_eq!(completion.status, OrderStatus::Partial);
        assert_eq!(completion.activated_amount, 0);
        assert_eq!(completion.report.len(), 1);
    }

    #[test]
    fn test_conclude_exhausted() {
        let state = RunState {
            exhausted: true,
            ..Default::default()
        };
        let completion = state.conclude(120);
        assert_eq!(completion.status, OrderStatus::Error);
        assert_eq!(completion.error_reason.as_deref(), Some(WORKER_POOL_EXHAUSTED));

        let state = RunState {
            exhausted: true,
            activated: 60,
            ..Default::default()
        };
        let completion = state.conclude(120);
        assert_eq!(completion.status, OrderStatus::Partial);
        assert_eq!(completion.activated_amount, 60);
    }

    #[test]
    fn test_record_masks_code() {
        let mut state = RunState::default();
        state.record(&code(7, 60), ReportStatus::Success, Some("w"), None);
        assert_eq!(state.report[0].code, "CODE…0007");
        assert_eq!(state.report[0].worker.as_deref(), Some("w"));
    }
}
