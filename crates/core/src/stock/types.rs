//! Core stock data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database identifier of a code row.
pub type CodeId = i64;

/// Lifecycle state of a code in the ledger.
///
/// `Activated` and `Broken` are terminal: a code in either state never
/// returns to `Free`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CodeState {
    /// Available for allocation.
    Free,
    /// Held by exactly one order for the duration of a run.
    Reserved,
    /// Redeemed for a buyer. Terminal.
    Activated,
    /// Could not be redeemed. Terminal.
    Broken,
}

impl CodeState {
    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeState::Free => "free",
            CodeState::Reserved => "reserved",
            CodeState::Activated => "activated",
            CodeState::Broken => "broken",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(CodeState::Free),
            "reserved" => Some(CodeState::Reserved),
            "activated" => Some(CodeState::Activated),
            "broken" => Some(CodeState::Broken),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CodeState::Activated | CodeState::Broken)
    }
}

impl std::fmt::Display for CodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-use redemption code with a fixed face value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Code {
    pub id: CodeId,
    /// The secret redemption string.
    pub code: String,
    /// Face value in currency units.
    pub value: u32,
    pub state: CodeState,
    /// Order currently holding (or that consumed) this code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_for: Option<String>,
    /// Player the code was redeemed for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Incremented on every state change.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Code {
    /// Masked form of the code for logs and reports (`ABCD…WXYZ`).
    pub fn masked(&self) -> String {
        mask_code(&self.code)
    }
}

/// Mask a redemption string, keeping only a short prefix and suffix.
pub fn mask_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

/// Terminal transition requested for a reserved code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalization {
    /// Code was redeemed for `buyer_uid` as part of `order_id`.
    Activated { buyer_uid: String, order_id: String },
    /// Code reserved for `order_id` cannot be redeemed.
    Broken { reason: String, order_id: String },
}

impl Finalization {
    /// The order that must hold the reservation.
    pub fn order_id(&self) -> &str {
        match self {
            Finalization::Activated { order_id, .. } | Finalization::Broken { order_id, .. } => {
                order_id
            }
        }
    }

    pub fn target_state(&self) -> CodeState {
        match self {
            Finalization::Activated { .. } => CodeState::Activated,
            Finalization::Broken { .. } => CodeState::Broken,
        }
    }
}

/// Result of a finalize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The code moved from `Reserved` into the given terminal state.
    Applied(CodeState),
    /// The code was already terminal; nothing changed.
    AlreadyFinal(CodeState),
}

impl FinalizeOutcome {
    pub fn state(&self) -> CodeState {
        match self {
            FinalizeOutcome::Applied(s) | FinalizeOutcome::AlreadyFinal(s) => *s,
        }
    }
}

/// A code to be added to stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCode {
    pub value: u32,
    pub code: String,
}

/// Outcome of a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Rows added to stock.
    pub inserted: usize,
    /// Rows ignored because the code string was already in stock.
    pub skipped: usize,
}

/// Free codes available at one denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenominationCount {
    pub value: u32,
    pub free: u64,
}

/// Aggregate view of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    /// Free counts grouped by face value, largest first.
    pub denominations: Vec<DenominationCount>,
    pub free: u64,
    pub reserved: u64,
    pub activated: u64,
    pub broken: u64,
}

impl StockSummary {
    /// Sum of face values of all free codes.
    pub fn free_value(&self) -> u64 {
        self.denominations
            .iter()
            .map(|d| d.value as u64 * d.free)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip_and_terminality() {
        for state in [
            CodeState::Free,
            CodeState::Reserved,
            CodeState::Activated,
            CodeState::Broken,
        ] {
            assert_eq!(CodeState::parse(state.as_str()), Some(state));
        }
        assert_eq!(CodeState::parse("used_by_other"), None);
        assert!(CodeState::Activated.is_terminal());
        assert!(CodeState::Broken.is_terminal());
        assert!(!CodeState::Reserved.is_terminal());
        assert!(!CodeState::Free.is_terminal());
    }

    #[test]
    fn test_mask_code() {
        assert_eq!(mask_code("ABCD1234EFGH"), "ABCD…EFGH");
        assert_eq!(mask_code("SHORT"), "*****");
    }

    #[test]
    fn test_summary_free_value() {
        let summary = StockSummary {
            denominations: vec![
                DenominationCount { value: 325, free: 2 },
                DenominationCount { value: 60, free: 3 },
            ],
            free: 5,
            ..Default::default()
        };
        assert_eq!(summary.free_value(), 830);
    }

    #[test]
    fn test_finalization_target_state() {
        let activated = Finalization::Activated {
            buyer_uid: "5123456789".to_string(),
            order_id: "o-1".to_string(),
        };
        assert_eq!(activated.target_state(), CodeState::Activated);
        let broken = Finalization::Broken {
            reason: "already_redeemed".to_string(),
            order_id: "o-2".to_string(),
        };
        assert_eq!(broken.target_state(), CodeState::Broken);
        assert_eq!(activated.order_id(), "o-1");
        assert_eq!(broken.order_id(), "o-2");
    }
}
