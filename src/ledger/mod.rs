//! Wallet bookkeeping: validation of proposed operations and the recorder
//! that turns validated operations into ledger transactions.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{StoreError, TransactionKind};

pub mod fee;
pub mod recorder;
pub mod settlement;
pub mod validator;

pub use fee::FeeSchedule;
pub use recorder::{LedgerService, WalletStats, WalletSummary};
pub use settlement::{Settlement, SettlementError, SimulatedSettlement};
pub use validator::{validate, ProposedOperation, ValidatedOperation};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be positive with at most two decimal places, got {0}")]
    InvalidAmount(Decimal),
    #[error("insufficient funds in account {0}")]
    InsufficientFunds(Uuid),
    #[error("account {0} would exceed the balance limit")]
    BalanceLimitExceeded(Uuid),
    #[error("an account cannot pay itself")]
    SelfTransferNotAllowed,
    #[error("account {0} not found")]
    AccountNotFound(Uuid),
    #[error("account {0} is not active")]
    AccountInactive(Uuid),
    #[error("{0} requires a counterparty")]
    CounterpartyRequired(TransactionKind),
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },
    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),
    #[error("transaction {0} cannot be refunded")]
    NotRefundable(Uuid),
    #[error("settlement of transaction {transaction_id} failed: {reason}")]
    SettlementFailed { transaction_id: Uuid, reason: String },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
            StoreError::Overdraft(id) | StoreError::InvalidUnfreeze(id) => LedgerError::InsufficientFunds(id),
            StoreError::BalanceLimit(id) => LedgerError::BalanceLimitExceeded(id),
            StoreError::TransactionNotFound(id) => LedgerError::TransactionNotFound(id),
            other => LedgerError::Store(other),
        }
    }
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            LedgerError::BalanceLimitExceeded(_) => "BALANCE_LIMIT_EXCEEDED",
            LedgerError::SelfTransferNotAllowed => "SELF_TRANSFER_NOT_ALLOWED",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::AccountInactive(_) => "ACCOUNT_INACTIVE",
            LedgerError::CounterpartyRequired(_) => "COUNTERPARTY_REQUIRED",
            LedgerError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            LedgerError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            LedgerError::NotRefundable(_) => "NOT_REFUNDABLE",
            LedgerError::SettlementFailed { .. } => "SETTLEMENT_FAILED",
            LedgerError::Store(_) => "STORAGE_ERROR",
        }
    }
}
