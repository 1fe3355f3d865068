use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fee::FeeSchedule;
use super::LedgerError;
use crate::db::{balance_limit, Account, Direction, TransactionKind};

/// An operation as requested by a caller, before any checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedOperation {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub counterparty_id: Option<Uuid>,
    pub description: Option<String>,
    pub reference: Option<String>,
}

impl ProposedOperation {
    pub fn new(account_id: Uuid, amount: Decimal, kind: TransactionKind) -> Self {
        Self {
            account_id,
            amount,
            kind,
            counterparty_id: None,
            description: None,
            reference: None,
        }
    }

    pub fn with_counterparty(mut self, counterparty_id: Uuid) -> Self {
        self.counterparty_id = Some(counterparty_id);
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }
}

/// An operation that passed [`validate`]. Only `validate` builds one, so the
/// recorder never sees an unchecked operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedOperation {
    operation: ProposedOperation,
    fee: Option<Decimal>,
    currency: String,
}

impl ValidatedOperation {
    pub fn operation(&self) -> &ProposedOperation {
        &self.operation
    }

    pub fn fee(&self) -> Option<Decimal> {
        self.fee
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// What leaves the owning account if the operation debits it.
    pub fn total_debit(&self) -> Decimal {
        self.operation.amount + self.fee.unwrap_or(Decimal::ZERO)
    }
}

fn check_active(account: Option<&Account>, id: Uuid) -> Result<&Account, LedgerError> {
    let account = account.ok_or(LedgerError::AccountNotFound(id))?;
    if !account.is_active() {
        return Err(LedgerError::AccountInactive(id));
    }
    Ok(account)
}

/// Checks a proposed operation against account snapshots. Pure: the caller
/// loads `account` and `counterparty` and nothing is written.
pub fn validate(
    account: Option<&Account>,
    counterparty: Option<&Account>,
    operation: &ProposedOperation,
    fees: &FeeSchedule,
) -> Result<ValidatedOperation, LedgerError> {
    let amount = operation.amount;
    if amount <= Decimal::ZERO || amount.normalize().scale() > 2 || amount > balance_limit() {
        return Err(LedgerError::InvalidAmount(amount));
    }

    if operation.counterparty_id == Some(operation.account_id) {
        return Err(LedgerError::SelfTransferNotAllowed);
    }

    let account = check_active(account, operation.account_id)?;

    let direction = operation.kind.direction();
    if direction == Direction::Pay {
        let counterparty_id = operation
            .counterparty_id
            .ok_or(LedgerError::CounterpartyRequired(operation.kind))?;
        let counterparty = check_active(counterparty, counterparty_id)?;
        if counterparty.currency != account.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: account.currency.clone(),
                found: counterparty.currency.clone(),
            });
        }
    }

    let fee = fees.fee_for(operation.kind, amount);
    let within_limit = amount
        .checked_add(fee.unwrap_or(Decimal::ZERO))
        .is_some_and(|total| total <= balance_limit());
    if !within_limit {
        return Err(LedgerError::InvalidAmount(amount));
    }

    let validated = ValidatedOperation {
        operation: operation.clone(),
        fee,
        currency: account.currency.clone(),
    };

    if direction != Direction::Credit && account.available() < validated.total_debit() {
        return Err(LedgerError::InsufficientFunds(account.user_id));
    }

    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AccountStatus;
    use rust_decimal_macros::dec;

    fn account(balance: Decimal) -> Account {
        let mut account = Account::new(Uuid::new_v4(), "CNY");
        account.balance = balance;
        account
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let a = account(dec!(100));
        for amount in [dec!(0), dec!(-5.00)] {
            let op = ProposedOperation::new(a.user_id, amount, TransactionKind::Deposit);
            let err = validate(Some(&a), None, &op, &FeeSchedule::none()).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
        }
    }

    #[test]
    fn rejects_sub_cent_amounts() {
        let a = account(dec!(100));
        let op = ProposedOperation::new(a.user_id, dec!(1.005), TransactionKind::Deposit);
        assert!(matches!(
            validate(Some(&a), None, &op, &FeeSchedule::none()),
            Err(LedgerError::InvalidAmount(_))
        ));
        let op = ProposedOperation::new(a.user_id, dec!(1.500), TransactionKind::Deposit);
        assert!(validate(Some(&a), None, &op, &FeeSchedule::none()).is_ok());
    }

    #[test]
    fn rejects_amounts_beyond_the_balance_limit() {
        let a = account(dec!(1.00));
        for amount in [Decimal::MAX, balance_limit() + dec!(0.01)] {
            let op = ProposedOperation::new(a.user_id, amount, TransactionKind::Deposit);
            assert!(matches!(
                validate(Some(&a), None, &op, &FeeSchedule::none()),
                Err(LedgerError::InvalidAmount(_))
            ));
        }

        // the fee pushes the total over the limit
        let rich = account(balance_limit());
        let fees = FeeSchedule::new(dec!(0.5), dec!(0), vec![TransactionKind::Withdrawal]);
        let op = ProposedOperation::new(rich.user_id, balance_limit(), TransactionKind::Withdrawal);
        assert!(matches!(
            validate(Some(&rich), None, &op, &fees),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn rejects_overdraft_withdrawal() {
        let a = account(dec!(1000.00));
        let op = ProposedOperation::new(a.user_id, dec!(1200.00), TransactionKind::Withdrawal);
        let err = validate(Some(&a), None, &op, &FeeSchedule::none()).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds(id) if id == a.user_id));
    }

    #[test]
    fn fee_counts_towards_required_funds() {
        let a = account(dec!(100.00));
        let fees = FeeSchedule::new(dec!(0.01), dec!(2.00), vec![TransactionKind::Withdrawal]);
        let op = ProposedOperation::new(a.user_id, dec!(99.00), TransactionKind::Withdrawal);
        assert!(matches!(
            validate(Some(&a), None, &op, &fees),
            Err(LedgerError::InsufficientFunds(_))
        ));

        let op = ProposedOperation::new(a.user_id, dec!(98.00), TransactionKind::Withdrawal);
        let validated = validate(Some(&a), None, &op, &fees).unwrap();
        assert_eq!(validated.fee(), Some(dec!(2.00)));
        assert_eq!(validated.total_debit(), dec!(100.00));
    }

    #[test]
    fn frozen_funds_are_not_available() {
        let mut a = account(dec!(100.00));
        a.frozen_balance = dec!(60.00);
        let op = ProposedOperation::new(a.user_id, dec!(50.00), TransactionKind::Withdrawal);
        assert!(matches!(
            validate(Some(&a), None, &op, &FeeSchedule::none()),
            Err(LedgerError::InsufficientFunds(_))
        ));
    }

    #[test]
    fn rejects_self_transfer() {
        let a = account(dec!(100.00));
        let op = ProposedOperation::new(a.user_id, dec!(10.00), TransactionKind::Transfer)
            .with_counterparty(a.user_id);
        let err = validate(Some(&a), Some(&a), &op, &FeeSchedule::none()).unwrap_err();
        assert!(matches!(err, LedgerError::SelfTransferNotAllowed));
    }

    #[test]
    fn transfer_needs_live_counterparty() {
        let a = account(dec!(100.00));
        let op = ProposedOperation::new(a.user_id, dec!(10.00), TransactionKind::Transfer);
        assert!(matches!(
            validate(Some(&a), None, &op, &FeeSchedule::none()),
            Err(LedgerError::CounterpartyRequired(TransactionKind::Transfer))
        ));

        let missing = Uuid::new_v4();
        let op = op.with_counterparty(missing);
        assert!(matches!(
            validate(Some(&a), None, &op, &FeeSchedule::none()),
            Err(LedgerError::AccountNotFound(id)) if id == missing
        ));

        let mut closed = account(dec!(0));
        closed.status = AccountStatus::Closed;
        let op = op.with_counterparty(closed.user_id);
        assert!(matches!(
            validate(Some(&a), Some(&closed), &op, &FeeSchedule::none()),
            Err(LedgerError::AccountInactive(_))
        ));
    }

    #[test]
    fn transfer_rejects_currency_mismatch() {
        let a = account(dec!(100.00));
        let mut b = account(dec!(0));
        b.currency = "USD".to_string();
        let op = ProposedOperation::new(a.user_id, dec!(10.00), TransactionKind::Transfer)
            .with_counterparty(b.user_id);
        assert!(matches!(
            validate(Some(&a), Some(&b), &op, &FeeSchedule::none()),
            Err(LedgerError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn missing_or_suspended_account_is_rejected() {
        let id = Uuid::new_v4();
        let op = ProposedOperation::new(id, dec!(10.00), TransactionKind::Deposit);
        assert!(matches!(
            validate(None, None, &op, &FeeSchedule::none()),
            Err(LedgerError::AccountNotFound(_))
        ));

        let mut suspended = account(dec!(10.00));
        suspended.status = AccountStatus::Suspended;
        let op = ProposedOperation::new(suspended.user_id, dec!(1.00), TransactionKind::Deposit);
        assert!(matches!(
            validate(Some(&suspended), None, &op, &FeeSchedule::none()),
            Err(LedgerError::AccountInactive(_))
        ));
    }

    #[test]
    fn credits_do_not_need_funds() {
        let a = account(dec!(0));
        let op = ProposedOperation::new(a.user_id, dec!(500.00), TransactionKind::Bonus);
        let validated = validate(Some(&a), None, &op, &FeeSchedule::none()).unwrap();
        assert_eq!(validated.currency(), "CNY");
        assert_eq!(validated.fee(), None);
    }
}
