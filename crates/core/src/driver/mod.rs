//! Activation channel abstraction.
//!
//! An [`ActivationDriver`] redeems one code for one player using one worker
//! identity. Drivers report what the redemption site said; the orchestrator
//! turns that into a [`Verdict`] with [`classify`] exactly once per call.

mod http;

pub use http::HttpActivationDriver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workers::WorkerCredentials;

/// What the redemption site reported for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum ActivationOutcome {
    /// Currency credited to the player.
    Activated,
    /// The worker hit a captcha, verification wall or rate limit.
    CaptchaOrLockout,
    /// The code was consumed before.
    AlreadyRedeemed,
    /// The site rejected the code for another reason.
    RedemptionError(String),
}

/// The driver could not produce an outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("activation timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("driver error: {0}")]
    Failed(String),
}

/// Backend that performs redemptions.
#[async_trait]
pub trait ActivationDriver: Send + Sync {
    /// Backend name for logging/audit.
    fn name(&self) -> &str;

    /// Redeem `code` for player `uid` logged in as `worker`.
    async fn activate(
        &self,
        worker: &WorkerCredentials,
        uid: &str,
        code: &str,
    ) -> Result<ActivationOutcome, DriverError>;
}

/// How the orchestrator treats one driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Activated,
    /// Worker-side failure: rotate to the next worker, keep the code.
    Lockout,
    /// Code-side failure: mark the code broken with `reason`.
    DeadCode { reason: String },
}

impl Verdict {
    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Activated => "activated",
            Verdict::Lockout => "lockout",
            Verdict::DeadCode { .. } => "dead_code",
        }
    }
}

pub const ALREADY_REDEEMED_REASON: &str = "already_redeemed";

/// Default substrings marking a driver failure as a worker lockout.
pub fn default_lockout_markers() -> Vec<String> {
    ["captcha", "verification", "challenge", "blocked", "busy"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Fold a driver result into a [`Verdict`].
///
/// Driver failures count as dead codes unless their text contains one of
/// `lockout_markers` (case-insensitive), in which case the worker is blamed.
pub fn classify(result: &Result<ActivationOutcome, DriverError>, lockout_markers: &[String]) -> Verdict {
    match result {
        Ok(ActivationOutcome::Activated) => Verdict::Activated,
        Ok(ActivationOutcome::CaptchaOrLockout) => Verdict::Lockout,
        Ok(ActivationOutcome::AlreadyRedeemed) => Verdict::DeadCode {
            reason: ALREADY_REDEEMED_REASON.to_string(),
        },
        Ok(ActivationOutcome::RedemptionError(detail)) => Verdict::DeadCode {
            reason: format!("redemption_error: {}", detail),
        },
        Err(e) => {
            let text = e.to_string().to_lowercase();
            if lockout_markers
                .iter()
                .any(|m| text.contains(&m.to_lowercase()))
            {
                Verdict::Lockout
            } else {
                Verdict::DeadCode {
                    reason: format!("redemption_error: {}", e),
                }
            }
        }
    }
}
