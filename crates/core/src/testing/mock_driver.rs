//! Mock activation driver for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::driver::{ActivationDriver, ActivationOutcome, DriverError};
use crate::workers::WorkerCredentials;

/// A recorded activate call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedActivation {
    /// Worker identity used.
    pub worker: String,
    pub uid: String,
    /// Unmasked code string.
    pub code: String,
    pub timestamp: chrono::DateTime<Utc>,
}

type Scripted = Result<ActivationOutcome, DriverError>;

/// Mock implementation of the ActivationDriver trait.
///
/// Resolution order for each call:
/// 1. a worker marked with [`lock_out_worker`](Self::lock_out_worker) always hits a captcha
/// 2. the next scripted result queued for the code
/// 3. `Activated`
///
/// # Example
///
/// ```rust,ignore
/// let driver = MockActivationDriver::new();
/// driver.lock_out_worker("alpha").await;
/// driver.script_code("GIFT-0060-000001", vec![Ok(ActivationOutcome::AlreadyRedeemed)]).await;
///
/// // ... run an order ...
///
/// let calls = driver.calls().await;
/// assert_eq!(calls[0].worker, "alpha");
/// ```
#[derive(Debug)]
pub struct MockActivationDriver {
    calls: Arc<RwLock<Vec<RecordedActivation>>>,
    scripts: Arc<RwLock<HashMap<String, VecDeque<Scripted>>>>,
    locked_out: Arc<RwLock<HashSet<String>>>,
    /// Simulated latency per call.
    delay: Arc<RwLock<Option<Duration>>>,
}

impl Default for MockActivationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockActivationDriver {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            scripts: Arc::new(RwLock::new(HashMap::new())),
            locked_out: Arc::new(RwLock::new(HashSet::new())),
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Queue results for a code; consumed one per call, oldest first.
    pub async fn script_code(&self, code: &str, results: Vec<Scripted>) {
        self.scripts
            .write()
            .await
            .entry(code.to_string())
            .or_default()
            .extend(results);
    }

    /// Every call made as this worker answers `CaptchaOrLockout`.
    pub async fn lock_out_worker(&self, identity: &str) {
        self.locked_out.write().await.insert(identity.to_string());
    }

    /// Sleep this long before answering each call.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Get all recorded calls.
    pub async fn calls(&self) -> Vec<RecordedActivation> {
        self.calls.read().await.clone()
    }

    /// Recorded calls for one code string.
    pub async fn calls_for_code(&self, code: &str) -> Vec<RecordedActivation> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.code == code)
            .cloned()
            .collect()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }
}

#[async_trait]
impl ActivationDriver for MockActivationDriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn activate(
        &self,
        worker: &WorkerCredentials,
        uid: &str,
        code: &str,
    ) -> Result<ActivationOutcome, DriverError> {
        self.calls.write().await.push(RecordedActivation {
            worker: worker.identity.clone(),
            uid: uid.to_string(),
            code: code.to_string(),
            timestamp: Utc::now(),
        });

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.locked_out.read().await.contains(&worker.identity) {
            return Ok(ActivationOutcome::CaptchaOrLockout);
        }

        if let Some(result) = self
            .scripts
            .write()
            .await
            .get_mut(code)
            .and_then(VecDeque::pop_front)
        {
            return result;
        }

        Ok(ActivationOutcome::Activated)
    }
}
