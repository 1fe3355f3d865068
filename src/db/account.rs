use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::utils::string_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

string_enum!(AccountStatus {
    Active => "active",
    Suspended => "suspended",
    Closed => "closed",
});

/// Wallet owned by a single user. `frozen_balance` is the part of `balance`
/// reserved for escrow and never available for debits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub frozen_balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: Uuid, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: Decimal::ZERO,
            frozen_balance: Decimal::ZERO,
            currency: currency.to_string(),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available(&self) -> Decimal {
        self.balance - self.frozen_balance
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// A signed change to one account, applied together with its siblings or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub account_id: Uuid,
    pub balance_delta: Decimal,
    pub frozen_delta: Decimal,
}

impl Posting {
    pub fn credit(account_id: Uuid, amount: Decimal) -> Self {
        Self { account_id, balance_delta: amount, frozen_delta: Decimal::ZERO }
    }

    pub fn debit(account_id: Uuid, amount: Decimal) -> Self {
        Self { account_id, balance_delta: -amount, frozen_delta: Decimal::ZERO }
    }

    pub fn freeze(account_id: Uuid, amount: Decimal) -> Self {
        Self { account_id, balance_delta: Decimal::ZERO, frozen_delta: amount }
    }

    pub fn unfreeze(account_id: Uuid, amount: Decimal) -> Self {
        Self { account_id, balance_delta: Decimal::ZERO, frozen_delta: -amount }
    }

    /// The posting that undoes this one.
    pub fn reversed(&self) -> Self {
        Self {
            account_id: self.account_id,
            balance_delta: -self.balance_delta,
            frozen_delta: -self.frozen_delta,
        }
    }
}

/// Largest balance an account may hold, the range of a `NUMERIC(20,2)` column.
pub fn balance_limit() -> Decimal {
    Decimal::from_i128_with_scale(99_999_999_999_999_999_999, 2)
}

/// Applies a group of postings to one account snapshot, enforcing
/// `0 <= frozen_balance <= balance <= balance_limit()`. Shared by every store
/// implementation.
pub fn apply_to(account: &Account, postings: &[Posting]) -> Result<Account, super::StoreError> {
    let overflow = || super::StoreError::BalanceLimit(account.user_id);
    let mut balance = account.balance;
    let mut frozen_balance = account.frozen_balance;
    for posting in postings.iter().filter(|posting| posting.account_id == account.user_id) {
        balance = balance.checked_add(posting.balance_delta).ok_or_else(overflow)?;
        frozen_balance = frozen_balance.checked_add(posting.frozen_delta).ok_or_else(overflow)?;
    }

    if frozen_balance < Decimal::ZERO {
        return Err(super::StoreError::InvalidUnfreeze(account.user_id));
    }
    if balance < frozen_balance {
        return Err(super::StoreError::Overdraft(account.user_id));
    }
    if balance > balance_limit() {
        return Err(overflow());
    }

    Ok(Account {
        balance,
        frozen_balance,
        updated_at: Utc::now(),
        ..account.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::db::StoreError;

    fn funded(balance: Decimal) -> Account {
        let mut account = Account::new(Uuid::new_v4(), "CNY");
        account.balance = balance;
        account
    }

    #[test]
    fn postings_for_other_accounts_are_ignored() {
        let account = funded(dec!(10.00));
        let other = Uuid::new_v4();
        let updated = apply_to(&account, &[Posting::debit(other, dec!(50.00))]).unwrap();
        assert_eq!(updated.balance, dec!(10.00));
    }

    #[test]
    fn debit_cannot_reach_frozen_funds() {
        let mut account = funded(dec!(100.00));
        account.frozen_balance = dec!(80.00);
        let err = apply_to(&account, &[Posting::debit(account.user_id, dec!(30.00))]).unwrap_err();
        assert!(matches!(err, StoreError::Overdraft(id) if id == account.user_id));

        let ok = apply_to(&account, &[Posting::debit(account.user_id, dec!(20.00))]).unwrap();
        assert_eq!(ok.balance, dec!(80.00));
        assert_eq!(ok.available(), Decimal::ZERO);
    }

    #[test]
    fn unfreeze_beyond_frozen_is_rejected() {
        let account = funded(dec!(5.00));
        let err = apply_to(&account, &[Posting::unfreeze(account.user_id, dec!(1.00))]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidUnfreeze(_)));
    }

    #[test]
    fn reversed_posting_restores_balance() {
        let account = funded(dec!(40.00));
        let posting = Posting::debit(account.user_id, dec!(15.50));
        let debited = apply_to(&account, &[posting]).unwrap();
        let restored = apply_to(&debited, &[posting.reversed()]).unwrap();
        assert_eq!(restored.balance, dec!(40.00));
    }

    #[test]
    fn balance_limit_is_never_exceeded() {
        let account = funded(balance_limit());
        let err = apply_to(&account, &[Posting::credit(account.user_id, dec!(0.01))]).unwrap_err();
        assert!(matches!(err, StoreError::BalanceLimit(id) if id == account.user_id));

        let err = apply_to(&account, &[Posting::credit(account.user_id, Decimal::MAX)]).unwrap_err();
        assert!(matches!(err, StoreError::BalanceLimit(_)));
    }
}
