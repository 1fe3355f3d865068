use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::fee::FeeSchedule;
use super::settlement::Settlement;
use super::validator::{validate, ProposedOperation, ValidatedOperation};
use super::LedgerError;
use crate::db::{
    Account, AccountStatus, Direction, LedgerStore, Posting, StoreError, Transaction, TransactionFilter,
    TransactionKind, TransactionStatus,
};

const REVERSAL_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletSummary {
    pub user_id: Uuid,
    pub currency: String,
    pub balance: Decimal,
    pub frozen_balance: Decimal,
    pub available: Decimal,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub transaction_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalletStats {
    pub total_transactions: u64,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub total_rewards: Decimal,
    pub total_payments: Decimal,
    pub total_bonuses: Decimal,
    pub total_refunds: Decimal,
    pub total_fees: Decimal,
    pub total_sent: Decimal,
    pub total_received: Decimal,
}

fn settled(tx: &Transaction) -> bool {
    matches!(tx.status, TransactionStatus::Completed | TransactionStatus::Refunded)
}

/// Signed effect of a settled transaction on one account's balance.
fn effect_on(tx: &Transaction, account_id: Uuid) -> Decimal {
    let direction = tx.kind.direction();
    if tx.account_id == account_id {
        match direction {
            Direction::Credit => tx.amount,
            Direction::Debit | Direction::Pay => -tx.total_debit(),
        }
    } else if tx.counterparty_id == Some(account_id) {
        match direction {
            Direction::Pay => tx.amount,
            // a refund pulls the amount back from the original payee
            Direction::Credit => -tx.amount,
            Direction::Debit => Decimal::ZERO,
        }
    } else {
        Decimal::ZERO
    }
}

fn postings_for(tx: &Transaction) -> Result<Vec<Posting>, LedgerError> {
    Ok(match tx.kind.direction() {
        Direction::Credit => vec![Posting::credit(tx.account_id, tx.amount)],
        Direction::Debit => vec![Posting::debit(tx.account_id, tx.total_debit())],
        Direction::Pay => {
            let payee = tx.counterparty_id.ok_or(LedgerError::CounterpartyRequired(tx.kind))?;
            vec![
                Posting::debit(tx.account_id, tx.total_debit()),
                Posting::credit(payee, tx.amount),
            ]
        }
    })
}

/// Validates and records wallet operations against a [`LedgerStore`].
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    settlement: Arc<dyn Settlement>,
    fees: FeeSchedule,
    currency: String,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        settlement: Arc<dyn Settlement>,
        fees: FeeSchedule,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            settlement,
            fees,
            currency: currency.into(),
        }
    }

    /// Returns the user's account, creating an empty one if needed.
    pub async fn open_account(&self, user_id: Uuid) -> Result<Account, LedgerError> {
        if let Some(account) = self.store.find_account(user_id).await? {
            return Ok(account);
        }
        let account = Account::new(user_id, &self.currency);
        match self.store.create_account(&account).await {
            Ok(()) => {
                tracing::info!("opened {} account for user {user_id}", account.currency);
                Ok(account)
            }
            // lost a race with another opener
            Err(StoreError::AccountExists(_)) => self.account(user_id).await,
            Err(err) => Err(err.into()),
        }
    }

    pub async fn account(&self, user_id: Uuid) -> Result<Account, LedgerError> {
        self.store
            .find_account(user_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(user_id))
    }

    pub async fn set_account_status(&self, user_id: Uuid, status: AccountStatus) -> Result<Account, LedgerError> {
        let account = self.store.set_account_status(user_id, status).await?;
        tracing::info!("account {user_id} is now {status}");
        Ok(account)
    }

    pub async fn validate_operation(
        &self,
        account_id: Uuid,
        amount: Decimal,
        kind: TransactionKind,
        counterparty_id: Option<Uuid>,
    ) -> Result<ValidatedOperation, LedgerError> {
        let mut operation = ProposedOperation::new(account_id, amount, kind);
        operation.counterparty_id = counterparty_id;
        self.validate_proposed(&operation).await
    }

    pub async fn validate_proposed(&self, operation: &ProposedOperation) -> Result<ValidatedOperation, LedgerError> {
        let account = self.store.find_account(operation.account_id).await?;
        let counterparty = match operation.counterparty_id {
            Some(id) => self.store.find_account(id).await?,
            None => None,
        };
        validate(account.as_ref(), counterparty.as_ref(), operation, &self.fees)
    }

    pub async fn execute(&self, operation: ProposedOperation) -> Result<Transaction, LedgerError> {
        let validated = self.validate_proposed(&operation).await.map_err(|err| {
            tracing::warn!("rejected {} of {} for account {}: {err}", operation.kind, operation.amount, operation.account_id);
            err
        })?;
        self.record_transaction(validated).await
    }

    /// Appends a pending transaction, applies its balance changes and
    /// completes it. Any failure after balances moved is compensated and the
    /// transaction ends `failed`.
    pub async fn record_transaction(&self, validated: ValidatedOperation) -> Result<Transaction, LedgerError> {
        let op = validated.operation();
        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id: op.account_id,
            kind: op.kind,
            amount: op.amount,
            fee: validated.fee(),
            currency: validated.currency().to_string(),
            status: TransactionStatus::Pending,
            counterparty_id: op.counterparty_id,
            description: op.description.clone(),
            reference: op.reference.clone(),
            created_at: Utc::now(),
            completed_at: None,
        };
        let postings = postings_for(&tx)?;

        self.store.insert_transaction(&tx).await?;
        tracing::info!("transaction {} ({} of {}) pending for account {}", tx.id, tx.kind, tx.amount, tx.account_id);

        // deposits settle before the credit
        if tx.kind.requires_settlement() && tx.kind.direction() == Direction::Credit {
            if let Err(err) = self.settlement.settle(&tx).await {
                tracing::warn!("settlement of transaction {} failed: {err}", tx.id);
                self.mark_failed(tx.id).await;
                return Err(LedgerError::SettlementFailed { transaction_id: tx.id, reason: err.to_string() });
            }
        }

        if let Err(err) = self.store.apply_postings(&postings).await {
            tracing::warn!("balance update for transaction {} rejected: {err}", tx.id);
            self.mark_failed(tx.id).await;
            return Err(err.into());
        }

        // withdrawals debit first, then settle
        if tx.kind.requires_settlement() && tx.kind.direction() == Direction::Debit {
            if let Err(err) = self.settlement.settle(&tx).await {
                tracing::warn!("settlement of transaction {} failed: {err}", tx.id);
                self.compensate(&tx, &postings).await?;
                return Err(LedgerError::SettlementFailed { transaction_id: tx.id, reason: err.to_string() });
            }
        }

        match self
            .store
            .transition_transaction(tx.id, TransactionStatus::Completed, Utc::now())
            .await
        {
            Ok(completed) => {
                tracing::info!("transaction {} completed", completed.id);
                Ok(completed)
            }
            Err(err) => {
                tracing::error!("failed to complete transaction {}: {err}", tx.id);
                self.compensate(&tx, &postings).await?;
                Err(err.into())
            }
        }
    }

    pub async fn top_up(&self, user_id: Uuid, amount: Decimal, method: &str) -> Result<Transaction, LedgerError> {
        let operation = ProposedOperation::new(user_id, amount, TransactionKind::Deposit)
            .with_description(Some(format!("top-up via {method}")))
            .with_reference(Some(method.to_string()));
        self.execute(operation).await
    }

    pub async fn withdraw(&self, user_id: Uuid, amount: Decimal, destination: &str) -> Result<Transaction, LedgerError> {
        let operation = ProposedOperation::new(user_id, amount, TransactionKind::Withdrawal)
            .with_description(Some(format!("withdrawal to {destination}")))
            .with_reference(Some(destination.to_string()));
        self.execute(operation).await
    }

    pub async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let operation = ProposedOperation::new(from, amount, TransactionKind::Transfer)
            .with_counterparty(to)
            .with_description(description.or_else(|| Some("transfer".to_string())));
        self.execute(operation).await
    }

    /// Reserves funds (task escrow). Frozen funds stay in the balance but
    /// cannot be debited until released.
    pub async fn freeze(&self, user_id: Uuid, amount: Decimal) -> Result<Account, LedgerError> {
        self.adjust_frozen(user_id, amount, Posting::freeze(user_id, amount)).await
    }

    pub async fn unfreeze(&self, user_id: Uuid, amount: Decimal) -> Result<Account, LedgerError> {
        self.adjust_frozen(user_id, amount, Posting::unfreeze(user_id, amount)).await
    }

    async fn adjust_frozen(&self, user_id: Uuid, amount: Decimal, posting: Posting) -> Result<Account, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let account = self.account(user_id).await?;
        if !account.is_active() {
            return Err(LedgerError::AccountInactive(user_id));
        }
        let mut updated = self.store.apply_postings(&[posting]).await?;
        let account = updated.pop().ok_or(LedgerError::AccountNotFound(user_id))?;
        tracing::info!("account {user_id} frozen balance now {}", account.frozen_balance);
        Ok(account)
    }

    /// Reverses a completed payment: the payee returns the principal to the
    /// payer, the original becomes `refunded` and a `refund` transaction is
    /// recorded. Fees are not returned.
    pub async fn refund(&self, transaction_id: Uuid) -> Result<Transaction, LedgerError> {
        let original = self
            .store
            .find_transaction(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        if original.status != TransactionStatus::Completed || original.kind.direction() != Direction::Pay {
            return Err(LedgerError::NotRefundable(transaction_id));
        }
        let payee = original
            .counterparty_id
            .ok_or(LedgerError::NotRefundable(transaction_id))?;

        let refund = Transaction {
            id: Uuid::new_v4(),
            account_id: original.account_id,
            kind: TransactionKind::Refund,
            amount: original.amount,
            fee: None,
            currency: original.currency.clone(),
            status: TransactionStatus::Pending,
            counterparty_id: Some(payee),
            description: Some(format!("refund of {}", original.id)),
            reference: Some(original.id.to_string()),
            created_at: Utc::now(),
            completed_at: None,
        };
        let postings = [
            Posting::debit(payee, original.amount),
            Posting::credit(original.account_id, original.amount),
        ];

        // the store claims the original and moves the money in one unit, so
        // a concurrent refund of the same payment cannot pay out twice
        let completed = Transaction {
            status: TransactionStatus::Completed,
            completed_at: Some(Utc::now()),
            ..refund.clone()
        };
        match self.store.refund_transaction(original.id, &completed, &postings).await {
            Ok(refund) => {
                tracing::info!("transaction {transaction_id} refunded by {}", refund.id);
                Ok(refund)
            }
            Err(StoreError::IllegalTransition { .. }) => {
                tracing::warn!("transaction {transaction_id} was refunded concurrently");
                Err(LedgerError::NotRefundable(transaction_id))
            }
            Err(err) => {
                tracing::warn!("refund of transaction {transaction_id} rejected: {err}");
                let failed = Transaction {
                    status: TransactionStatus::Failed,
                    ..refund
                };
                if let Err(record_err) = self.store.insert_transaction(&failed).await {
                    tracing::error!("failed to record failed refund {}: {record_err}", failed.id);
                }
                Err(err.into())
            }
        }
    }

    pub async fn transaction_for(&self, user_id: Uuid, transaction_id: Uuid) -> Result<Transaction, LedgerError> {
        self.store
            .find_transaction(transaction_id)
            .await?
            .filter(|tx| tx.involves(user_id))
            .ok_or(LedgerError::TransactionNotFound(transaction_id))
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        kind: Option<TransactionKind>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Transaction>, u64), LedgerError> {
        let filter = TransactionFilter {
            kind,
            offset: page.saturating_sub(1).saturating_mul(limit),
            limit: Some(limit),
            ..TransactionFilter::for_account(user_id)
        };
        Ok(self.store.list_transactions(&filter).await?)
    }

    pub async fn wallet_summary(&self, user_id: Uuid) -> Result<WalletSummary, LedgerError> {
        let account = self.open_account(user_id).await?;
        let (transactions, _) = self.store.list_transactions(&TransactionFilter::for_account(user_id)).await?;

        let mut summary = WalletSummary {
            user_id,
            currency: account.currency.clone(),
            balance: account.balance,
            frozen_balance: account.frozen_balance,
            available: account.available(),
            total_income: Decimal::ZERO,
            total_expense: Decimal::ZERO,
            transaction_count: 0,
        };
        for tx in transactions.iter().filter(|tx| settled(tx)) {
            summary.transaction_count += 1;
            let effect = effect_on(tx, user_id);
            if effect > Decimal::ZERO {
                summary.total_income += effect;
            } else {
                summary.total_expense -= effect;
            }
        }
        Ok(summary)
    }

    pub async fn wallet_stats(&self, user_id: Uuid) -> Result<WalletStats, LedgerError> {
        let (transactions, _) = self.store.list_transactions(&TransactionFilter::for_account(user_id)).await?;

        let mut stats = WalletStats::default();
        for tx in transactions.iter().filter(|tx| settled(tx)) {
            stats.total_transactions += 1;
            let owned = tx.account_id == user_id;
            if owned {
                stats.total_fees += tx.fee.unwrap_or(Decimal::ZERO);
            }
            match (tx.kind, owned) {
                (TransactionKind::Deposit, true) => stats.total_deposits += tx.amount,
                (TransactionKind::Withdrawal, true) => stats.total_withdrawals += tx.amount,
                (TransactionKind::TaskReward, true) => stats.total_rewards += tx.amount,
                (TransactionKind::TaskPayment, true) => stats.total_payments += tx.amount,
                (TransactionKind::TaskPayment, false) => stats.total_rewards += tx.amount,
                (TransactionKind::Bonus, true) => stats.total_bonuses += tx.amount,
                (TransactionKind::Refund, true) => stats.total_refunds += tx.amount,
                (TransactionKind::Transfer, true) => stats.total_sent += tx.amount,
                (TransactionKind::Transfer, false) => stats.total_received += tx.amount,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn mark_failed(&self, transaction_id: Uuid) {
        if let Err(err) = self
            .store
            .transition_transaction(transaction_id, TransactionStatus::Failed, Utc::now())
            .await
        {
            tracing::error!("failed to mark transaction {transaction_id} failed: {err}");
        }
    }

    /// Undoes `postings` and marks `tx` failed. Not optional: the reversal is
    /// retried and its failure is surfaced to the caller.
    async fn compensate(&self, tx: &Transaction, postings: &[Posting]) -> Result<(), LedgerError> {
        let reversal: Vec<Posting> = postings.iter().map(Posting::reversed).collect();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.apply_postings(&reversal).await {
                Ok(_) => break,
                Err(err) if attempt < REVERSAL_ATTEMPTS => {
                    tracing::error!("reversal of transaction {} failed (attempt {attempt}): {err}", tx.id);
                }
                Err(err) => {
                    tracing::error!("giving up reversing transaction {}: {err}", tx.id);
                    return Err(err.into());
                }
            }
        }
        tracing::warn!("reversed balance changes of transaction {}", tx.id);
        self.store
            .transition_transaction(tx.id, TransactionStatus::Failed, Utc::now())
            .await?;
        Ok(())
    }
}
