use async_trait::async_trait;
use thiserror::Error;

use crate::db::Transaction;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SettlementError(pub String);

/// Moves the real-world funds behind a deposit or withdrawal.
#[async_trait]
pub trait Settlement: Send + Sync {
    async fn settle(&self, tx: &Transaction) -> Result<(), SettlementError>;
}

/// Accepts every settlement. Stands in for the payment provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedSettlement;

#[async_trait]
impl Settlement for SimulatedSettlement {
    async fn settle(&self, tx: &Transaction) -> Result<(), SettlementError> {
        tracing::info!(
            "simulated settlement of {} {} {} for account {}",
            tx.kind,
            tx.amount,
            tx.currency,
            tx.account_id
        );
        Ok(())
    }
}
