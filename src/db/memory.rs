use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::account::apply_to;
use super::{
    Account, AccountStatus, LedgerStore, Posting, Recompute, Review, ReviewChange, ReviewStatus, ReviewStore,
    StoreError, Transaction, TransactionFilter, TransactionStatus, User, UserStore,
};
use crate::reputation::{ReputationError, ReputationRecord};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<String, (Uuid, DateTime<Utc>)>,
    accounts: HashMap<Uuid, Account>,
    // append order
    transactions: Vec<Transaction>,
    reviews: Vec<Review>,
    reputations: HashMap<Uuid, ReputationRecord>,
}

/// Process-local store. One lock guards everything, so every call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn page<T>(items: Vec<T>, offset: u64, limit: Option<u64>) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = limit.map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
    items.into_iter().skip(offset).take(limit).collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads reviews as-is, bypassing every check. Used to seed fixtures.
    pub async fn import_reviews(&self, reviews: impl IntoIterator<Item = Review>) {
        self.state.lock().await.reviews.extend(reviews);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|user| user.email == email) {
            return Err(StoreError::UserExists);
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            full_name: full_name.map(str::to_string),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|user| user.email == email).cloned())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.refresh_tokens.insert(token.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn verify_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .refresh_tokens
            .get(token)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .and_then(|(user_id, _)| state.users.get(user_id))
            .cloned())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.user_id) {
            return Err(StoreError::AccountExists(account.user_id));
        }
        state.accounts.insert(account.user_id, account.clone());
        Ok(())
    }

    async fn find_account(&self, user_id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.state.lock().await.accounts.get(&user_id).cloned())
    }

    async fn set_account_status(&self, user_id: Uuid, status: AccountStatus) -> Result<Account, StoreError> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or(StoreError::AccountNotFound(user_id))?;
        account.status = status;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), StoreError> {
        self.state.lock().await.transactions.push(tx.clone());
        Ok(())
    }

    async fn apply_postings(&self, postings: &[Posting]) -> Result<Vec<Account>, StoreError> {
        let mut state = self.state.lock().await;
        let ids: BTreeSet<Uuid> = postings.iter().map(|posting| posting.account_id).collect();

        let mut updated = Vec::with_capacity(ids.len());
        for id in &ids {
            let account = state.accounts.get(id).ok_or(StoreError::AccountNotFound(*id))?;
            updated.push(apply_to(account, postings)?);
        }
        for account in &updated {
            state.accounts.insert(account.user_id, account.clone());
        }
        Ok(updated)
    }

    async fn transition_transaction(
        &self,
        id: Uuid,
        to: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<Transaction, StoreError> {
        let mut state = self.state.lock().await;
        let tx = state
            .transactions
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or(StoreError::TransactionNotFound(id))?;
        if !tx.status.can_transition_to(to) {
            return Err(StoreError::IllegalTransition { id, from: tx.status, to });
        }
        tx.status = to;
        if to == TransactionStatus::Completed {
            tx.completed_at = Some(at);
        }
        Ok(tx.clone())
    }

    async fn refund_transaction(
        &self,
        original_id: Uuid,
        refund: &Transaction,
        postings: &[Posting],
    ) -> Result<Transaction, StoreError> {
        let mut state = self.state.lock().await;
        let index = state
            .transactions
            .iter()
            .position(|tx| tx.id == original_id)
            .ok_or(StoreError::TransactionNotFound(original_id))?;
        let from = state.transactions[index].status;
        if from != TransactionStatus::Completed {
            return Err(StoreError::IllegalTransition { id: original_id, from, to: TransactionStatus::Refunded });
        }

        let ids: BTreeSet<Uuid> = postings.iter().map(|posting| posting.account_id).collect();
        let mut updated = Vec::with_capacity(ids.len());
        for id in &ids {
            let account = state.accounts.get(id).ok_or(StoreError::AccountNotFound(*id))?;
            updated.push(apply_to(account, postings)?);
        }

        for account in updated {
            state.accounts.insert(account.user_id, account);
        }
        state.transactions[index].status = TransactionStatus::Refunded;
        state.transactions.push(refund.clone());
        Ok(refund.clone())
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().find(|tx| tx.id == id).cloned())
    }

    async fn list_transactions(&self, filter: &TransactionFilter) -> Result<(Vec<Transaction>, u64), StoreError> {
        let state = self.state.lock().await;
        // reverse first so equal timestamps keep newest-inserted first
        let mut matching: Vec<Transaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        Ok((page(matching, filter.offset, filter.limit), total))
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn find_review(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.reviews.iter().find(|review| review.id == id).cloned())
    }

    async fn list_reviews_for_target(
        &self,
        target_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Review>, u64), StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<Review> = state
            .reviews
            .iter()
            .rev()
            .filter(|review| review.target_id == target_id && review.is_active())
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        Ok((page(matching, offset, Some(limit)), total))
    }

    async fn list_reviews_for_task(&self, task_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<Review> = state
            .reviews
            .iter()
            .filter(|review| review.task_id == task_id && review.is_active())
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn find_reputation(&self, user_id: Uuid) -> Result<Option<ReputationRecord>, StoreError> {
        Ok(self.state.lock().await.reputations.get(&user_id).cloned())
    }

    async fn commit_review_change(
        &self,
        change: ReviewChange,
        recompute: &Recompute,
    ) -> Result<(Option<Review>, ReputationRecord), ReputationError> {
        let mut state = self.state.lock().await;

        // stage the change without touching state
        let (target_id, staged) = match change {
            ReviewChange::Create(review) => {
                if state
                    .reviews
                    .iter()
                    .any(|existing| existing.is_active() && existing.same_key(&review))
                {
                    return Err(StoreError::DuplicateReview.into());
                }
                (review.target_id, Some(review))
            }
            ReviewChange::Edit { review_id, rating, comment, sub_ratings, at } => {
                let mut review = active_review(&state, review_id)?;
                review.rating = rating;
                review.comment = comment;
                review.sub_ratings = sub_ratings;
                review.updated_at = at;
                (review.target_id, Some(review))
            }
            ReviewChange::Delete { review_id, at } => {
                let mut review = active_review(&state, review_id)?;
                review.status = ReviewStatus::Deleted;
                review.updated_at = at;
                (review.target_id, Some(review))
            }
            ReviewChange::Recompute(user_id) => (user_id, None),
        };

        let mut reviews: Vec<Review> = state
            .reviews
            .iter()
            .filter(|review| review.target_id == target_id)
            .filter(|review| staged.as_ref().map_or(true, |staged| staged.id != review.id))
            .cloned()
            .collect();
        reviews.extend(staged.clone());

        let record = recompute(target_id, &reviews, state.reputations.get(&target_id))?;

        if let Some(review) = &staged {
            match state.reviews.iter_mut().find(|existing| existing.id == review.id) {
                Some(existing) => *existing = review.clone(),
                None => state.reviews.push(review.clone()),
            }
        }
        state.reputations.insert(target_id, record.clone());
        Ok((staged, record))
    }
}

fn active_review(state: &State, review_id: Uuid) -> Result<Review, StoreError> {
    state
        .reviews
        .iter()
        .find(|review| review.id == review_id && review.is_active())
        .cloned()
        .ok_or(StoreError::ReviewNotFound(review_id))
}
