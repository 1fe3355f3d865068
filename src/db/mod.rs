//! Storage seams. Services only talk to these traits; `memory` backs tests and
//! single-process runs, `postgres` backs the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::reputation::{ReputationError, ReputationRecord};

pub mod account;
pub mod auth;
pub mod memory;
pub mod postgres;
pub mod review;
pub mod tx;
pub mod user;
pub mod utils;

pub use account::{balance_limit, Account, AccountStatus, Posting};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use review::{Review, ReviewChange, ReviewStatus, ReviewType, SubRatings};
pub use tx::{Direction, Transaction, TransactionFilter, TransactionKind, TransactionStatus};
pub use user::User;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account {0} not found")]
    AccountNotFound(Uuid),
    #[error("account {0} already exists")]
    AccountExists(Uuid),
    #[error("account {0} would be overdrawn")]
    Overdraft(Uuid),
    #[error("account {0} would exceed the balance limit")]
    BalanceLimit(Uuid),
    #[error("account {0} cannot release more than its frozen balance")]
    InvalidUnfreeze(Uuid),
    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),
    #[error("transaction {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("review {0} not found")]
    ReviewNotFound(Uuid),
    #[error("an active review already exists for this task, reviewer, target and type")]
    DuplicateReview,
    #[error("user already exists")]
    UserExists,
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The recomputation a review store runs inside the same atomic unit as a
/// review change: target id, the target's full review set, the prior record.
pub type Recompute = dyn Fn(Uuid, &[Review], Option<&ReputationRecord>) -> Result<ReputationRecord, ReputationError>
    + Send
    + Sync;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> Result<User, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Returns the owner of a refresh token that has not yet expired.
    async fn verify_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn create_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn find_account(&self, user_id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn set_account_status(
        &self,
        user_id: Uuid,
        status: AccountStatus,
    ) -> Result<Account, StoreError>;

    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), StoreError>;

    /// Applies every posting or none. Accounts are locked in ascending id
    /// order and each must end with `0 <= frozen_balance <= balance`.
    async fn apply_postings(&self, postings: &[Posting]) -> Result<Vec<Account>, StoreError>;

    async fn transition_transaction(
        &self,
        id: Uuid,
        to: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<Transaction, StoreError>;

    /// Moves `original_id` from `completed` to `refunded`, applies `postings`
    /// and appends `refund`, all in one unit. Concurrent refunds of the same
    /// transaction are serialized; every one after the first fails with
    /// `IllegalTransition` and moves no money.
    async fn refund_transaction(
        &self,
        original_id: Uuid,
        refund: &Transaction,
        postings: &[Posting],
    ) -> Result<Transaction, StoreError>;

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;

    /// Newest first, with the total number of matches ignoring paging.
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<(Vec<Transaction>, u64), StoreError>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn find_review(&self, id: Uuid) -> Result<Option<Review>, StoreError>;

    /// Active reviews targeting a user, newest first, with the total count.
    async fn list_reviews_for_target(
        &self,
        target_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Review>, u64), StoreError>;

    async fn list_reviews_for_task(&self, task_id: Uuid) -> Result<Vec<Review>, StoreError>;

    async fn find_reputation(&self, user_id: Uuid) -> Result<Option<ReputationRecord>, StoreError>;

    /// Applies `change`, reloads the target's reviews, runs `recompute` and
    /// stores its result, all in one atomic unit serialized per target. If
    /// `recompute` fails nothing is written.
    async fn commit_review_change(
        &self,
        change: ReviewChange,
        recompute: &Recompute,
    ) -> Result<(Option<Review>, ReputationRecord), ReputationError>;
}
