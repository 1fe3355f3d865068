use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::utils::string_enum;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub currency: String,
    pub status: TransactionStatus,
    pub counterparty_id: Option<Uuid>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Total leaving the owning account for debiting kinds (principal + fee).
    pub fn total_debit(&self) -> Decimal {
        self.amount + self.fee.unwrap_or(Decimal::ZERO)
    }

    pub fn involves(&self, account_id: Uuid) -> bool {
        self.account_id == account_id || self.counterparty_id == Some(account_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
    TaskReward,
    TaskPayment,
    Fee,
    Refund,
    Bonus,
}

string_enum!(TransactionKind {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Transfer => "transfer",
    TaskReward => "task_reward",
    TaskPayment => "task_payment",
    Fee => "fee",
    Refund => "refund",
    Bonus => "bonus",
});

/// How a kind moves money relative to the owning account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
    /// Debit the owner, credit the counterparty.
    Pay,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 8] = [
        TransactionKind::Deposit,
        TransactionKind::Withdrawal,
        TransactionKind::Transfer,
        TransactionKind::TaskReward,
        TransactionKind::TaskPayment,
        TransactionKind::Fee,
        TransactionKind::Refund,
        TransactionKind::Bonus,
    ];

    pub fn direction(&self) -> Direction {
        match self {
            TransactionKind::Deposit
            | TransactionKind::TaskReward
            | TransactionKind::Refund
            | TransactionKind::Bonus => Direction::Credit,
            TransactionKind::Withdrawal | TransactionKind::Fee => Direction::Debit,
            TransactionKind::Transfer | TransactionKind::TaskPayment => Direction::Pay,
        }
    }

    /// Kinds that move real-world funds and go through settlement.
    pub fn requires_settlement(&self) -> bool {
        matches!(self, TransactionKind::Deposit | TransactionKind::Withdrawal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

string_enum!(TransactionStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl TransactionStatus {
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Pending, Cancelled) | (Completed, Refunded)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl TransactionFilter {
    pub fn for_account(account_id: Uuid) -> Self {
        Self { account_id: Some(account_id), ..Default::default() }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.account_id.map_or(true, |id| tx.involves(id))
            && self.kind.map_or(true, |kind| tx.kind == kind)
            && self.status.map_or(true, |status| tx.status == status)
    }
}
