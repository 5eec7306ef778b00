//! Order record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stock::CodeId;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, waiting for a fulfillment run.
    Pending,
    /// Activated amount equals the target.
    Completed,
    /// Some codes failed; activated amount is below the target.
    Partial,
    /// Withdrawn by an operator before any run started.
    Cancelled,
    /// The run could not proceed (see `error_reason`).
    Error,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Partial => "partial",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "completed" => Some(OrderStatus::Completed),
            "partial" => Some(OrderStatus::Partial),
            "cancelled" => Some(OrderStatus::Cancelled),
            "error" => Some(OrderStatus::Error),
            _ => None,
        }
    }

    /// Terminal orders are immutable.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one basket entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Code redeemed for the buyer.
    Success,
    /// Dead code; a replacement of the same value was queued.
    Broken,
    /// Dead code with no free code of the same value left.
    FailedNoReplacement,
    /// Every worker locked out while this code was pending. The code went
    /// back to stock.
    FailedPoolExhausted,
}

/// One line of an order report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeOutcome {
    pub code_id: CodeId,
    /// Masked redemption string.
    pub code: String,
    pub value: u32,
    pub status: ReportStatus,
    /// Worker identity that produced the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A buyer's request for a quantity of currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// UUID.
    pub id: String,
    /// Player UID the currency is redeemed for.
    pub uid: String,
    pub target_amount: u64,
    pub activated_amount: u64,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default)]
    pub report: Vec<CodeOutcome>,
    pub created_at: DateTime<Utc>,
    /// Set when a fulfillment run claims the order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Pending and not yet picked up by a run.
    pub fn is_claimable(&self) -> bool {
        self.status == OrderStatus::Pending && self.started_at.is_none()
    }

    pub fn status_view(&self) -> OrderStatusView {
        OrderStatusView {
            id: self.id.clone(),
            status: self.status,
            activated_amount: self.activated_amount,
            target_amount: self.target_amount,
        }
    }
}

/// Lightweight status lookup result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderStatusView {
    pub id: String,
    pub status: OrderStatus,
    pub activated_amount: u64,
    pub target_amount: u64,
}

/// Request to create a pending order.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub uid: String,
    pub target_amount: u64,
}

/// Terminal write produced by a fulfillment run.
#[derive(Debug, Clone)]
pub struct OrderCompletion {
    pub status: OrderStatus,
    pub activated_amount: u64,
    pub error_reason: Option<String>,
    pub report: Vec<CodeOutcome>,
}

impl OrderCompletion {
    /// An `Error` completion with no codes touched.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: OrderStatus::Error,
            activated_amount: 0,
            error_reason: Some(reason.into()),
            report: Vec::new(),
        }
    }
}
