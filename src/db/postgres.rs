use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::account::apply_to;
use super::utils::{parse_column, rating_from_column};
use super::{
    Account, AccountStatus, LedgerStore, Posting, Recompute, Review, ReviewChange, ReviewStore, StoreError,
    SubRatings, Transaction, TransactionFilter, TransactionStatus,
};
use crate::reputation::{ReputationError, ReputationRecord};

#[derive(Clone)]
pub struct PgStore {
    pub(super) pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Runs pending migrations. Failure is logged and ignored; the schema is
    /// then assumed to be in place already.
    pub async fn run_migrations(&self) {
        match sqlx::migrate!("./migrations").run(&self.pool).await {
            Ok(_) => tracing::info!("Migrations run successfully"),
            Err(err) => tracing::warn!("Failed to run migrations: {err}"),
        }
    }
}

const ACCOUNT_COLUMNS: &str = "user_id, balance, frozen_balance, currency, status, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, account_id, kind, amount, fee, currency, status, counterparty_id, \
     description, reference, created_at, completed_at";
const REVIEW_COLUMNS: &str = "id, task_id, reviewer_id, target_id, review_type, rating, comment, quality_rating, \
     communication_rating, timeliness_rating, professionalism_rating, is_anonymous, status, created_at, updated_at";

#[derive(FromRow)]
struct AccountRow {
    user_id: Uuid,
    balance: Decimal,
    frozen_balance: Decimal,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            user_id: row.user_id,
            balance: row.balance,
            frozen_balance: row.frozen_balance,
            currency: row.currency,
            status: parse_column(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TransactionRow {
    id: Uuid,
    account_id: Uuid,
    kind: String,
    amount: Decimal,
    fee: Option<Decimal>,
    currency: String,
    status: String,
    counterparty_id: Option<Uuid>,
    description: Option<String>,
    reference: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            account_id: row.account_id,
            kind: parse_column(&row.kind)?,
            amount: row.amount,
            fee: row.fee,
            currency: row.currency,
            status: parse_column(&row.status)?,
            counterparty_id: row.counterparty_id,
            description: row.description,
            reference: row.reference,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(FromRow)]
struct ReviewRow {
    id: Uuid,
    task_id: Uuid,
    reviewer_id: Uuid,
    target_id: Uuid,
    review_type: String,
    rating: i16,
    comment: Option<String>,
    quality_rating: Option<i16>,
    communication_rating: Option<i16>,
    timeliness_rating: Option<i16>,
    professionalism_rating: Option<i16>,
    is_anonymous: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = rating_from_column(Some(row.rating))?
            .ok_or_else(|| StoreError::Corrupt(format!("review {} has no rating", row.id)))?;
        Ok(Review {
            id: row.id,
            task_id: row.task_id,
            reviewer_id: row.reviewer_id,
            target_id: row.target_id,
            review_type: parse_column(&row.review_type)?,
            rating,
            comment: row.comment,
            sub_ratings: SubRatings {
                quality: rating_from_column(row.quality_rating)?,
                communication: rating_from_column(row.communication_rating)?,
                timeliness: rating_from_column(row.timeliness_rating)?,
                professionalism: rating_from_column(row.professionalism_rating)?,
            },
            is_anonymous: row.is_anonymous,
            status: parse_column(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn rows_into<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn db(err: sqlx::Error) -> ReputationError {
    StoreError::from(err).into()
}

async fn insert_transaction_row(conn: &mut PgConnection, tx: &Transaction) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO transactions (id, account_id, kind, amount, fee, currency, status, counterparty_id,
                                  description, reference, created_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(tx.id)
    .bind(tx.account_id)
    .bind(tx.kind.as_str())
    .bind(tx.amount)
    .bind(tx.fee)
    .bind(&tx.currency)
    .bind(tx.status.as_str())
    .bind(tx.counterparty_id)
    .bind(&tx.description)
    .bind(&tx.reference)
    .bind(tx.created_at)
    .bind(tx.completed_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Locks the touched accounts in ascending id order and applies `postings`
/// inside the caller's transaction.
async fn apply_postings_locked(conn: &mut PgConnection, postings: &[Posting]) -> Result<Vec<Account>, StoreError> {
    let mut ids: Vec<Uuid> = postings.iter().map(|posting| posting.account_id).collect();
    ids.sort();
    ids.dedup();

    let select = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 FOR UPDATE");
    let mut updated = Vec::with_capacity(ids.len());
    for id in ids {
        let account: Account = sqlx::query_as::<_, AccountRow>(&select)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::AccountNotFound(id))?
            .try_into()?;
        let next = apply_to(&account, postings)?;
        sqlx::query("UPDATE accounts SET balance = $2, frozen_balance = $3, updated_at = $4 WHERE user_id = $1")
            .bind(id)
            .bind(next.balance)
            .bind(next.frozen_balance)
            .bind(next.updated_at)
            .execute(&mut *conn)
            .await?;
        updated.push(next);
    }
    Ok(updated)
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn create_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, balance, frozen_balance, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(account.user_id)
        .bind(account.balance)
        .bind(account.frozen_balance)
        .bind(&account.currency)
        .bind(account.status.as_str())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::AccountExists(account.user_id)
            } else {
                err.into()
            }
        })?;
        Ok(())
    }

    async fn find_account(&self, user_id: Uuid) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1");
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn set_account_status(&self, user_id: Uuid, status: AccountStatus) -> Result<Account, StoreError> {
        let sql = format!(
            "UPDATE accounts SET status = $2, updated_at = NOW() WHERE user_id = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(user_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::AccountNotFound(user_id))?
            .try_into()
    }

    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_transaction_row(&mut *conn, tx).await
    }

    async fn apply_postings(&self, postings: &[Posting]) -> Result<Vec<Account>, StoreError> {
        let mut db_tx = self.pool.begin().await?;
        // dropping db_tx on error rolls back
        let updated = apply_postings_locked(&mut *db_tx, postings).await?;
        db_tx.commit().await?;
        Ok(updated)
    }

    async fn transition_transaction(
        &self,
        id: Uuid,
        to: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<Transaction, StoreError> {
        let mut db_tx = self.pool.begin().await?;
        let current: String = sqlx::query_scalar("SELECT status FROM transactions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or(StoreError::TransactionNotFound(id))?;
        let from: TransactionStatus = parse_column(&current)?;
        if !from.can_transition_to(to) {
            return Err(StoreError::IllegalTransition { id, from, to });
        }

        let completed_at = (to == TransactionStatus::Completed).then_some(at);
        let sql = format!(
            "UPDATE transactions SET status = $2, completed_at = COALESCE($3, completed_at) \
             WHERE id = $1 RETURNING {TRANSACTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .bind(to.as_str())
            .bind(completed_at)
            .fetch_one(&mut *db_tx)
            .await?;
        db_tx.commit().await?;
        row.try_into()
    }

    async fn refund_transaction(
        &self,
        original_id: Uuid,
        refund: &Transaction,
        postings: &[Posting],
    ) -> Result<Transaction, StoreError> {
        let mut db_tx = self.pool.begin().await?;
        // the original's row lock comes before any account lock
        let current: String = sqlx::query_scalar("SELECT status FROM transactions WHERE id = $1 FOR UPDATE")
            .bind(original_id)
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or(StoreError::TransactionNotFound(original_id))?;
        let from: TransactionStatus = parse_column(&current)?;
        if from != TransactionStatus::Completed {
            return Err(StoreError::IllegalTransition { id: original_id, from, to: TransactionStatus::Refunded });
        }

        apply_postings_locked(&mut *db_tx, postings).await?;
        sqlx::query("UPDATE transactions SET status = $2 WHERE id = $1")
            .bind(original_id)
            .bind(TransactionStatus::Refunded.as_str())
            .execute(&mut *db_tx)
            .await?;
        insert_transaction_row(&mut *db_tx, refund).await?;
        db_tx.commit().await?;
        Ok(refund.clone())
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn list_transactions(&self, filter: &TransactionFilter) -> Result<(Vec<Transaction>, u64), StoreError> {
        const WHERE: &str = "($1::uuid IS NULL OR account_id = $1 OR counterparty_id = $1) \
             AND ($2::text IS NULL OR kind = $2) AND ($3::text IS NULL OR status = $3)";

        let kind = filter.kind.map(|kind| kind.as_str());
        let status = filter.status.map(|status| status.as_str());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM transactions WHERE {WHERE}"))
            .bind(filter.account_id)
            .bind(kind)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE {WHERE} \
             ORDER BY created_at DESC OFFSET $4 LIMIT $5"
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(filter.account_id)
            .bind(kind)
            .bind(status)
            .bind(to_i64(filter.offset))
            .bind(filter.limit.map(to_i64))
            .fetch_all(&self.pool)
            .await?;

        Ok((rows_into(rows)?, u64::try_from(total).unwrap_or_default()))
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn find_review(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Review::try_from)
            .transpose()
    }

    async fn list_reviews_for_target(
        &self,
        target_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Review>, u64), StoreError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE target_id = $1 AND status = 'active'")
                .bind(target_id)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE target_id = $1 AND status = 'active' \
             ORDER BY created_at DESC OFFSET $2 LIMIT $3"
        );
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(target_id)
            .bind(to_i64(offset))
            .bind(to_i64(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok((rows_into(rows)?, u64::try_from(total).unwrap_or_default()))
    }

    async fn list_reviews_for_task(&self, task_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE task_id = $1 AND status = 'active' ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        rows_into(rows)
    }

    async fn find_reputation(&self, user_id: Uuid) -> Result<Option<ReputationRecord>, StoreError> {
        let record: Option<Option<Json<ReputationRecord>>> =
            sqlx::query_scalar("SELECT record FROM reputation_records WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record.flatten().map(|Json(record)| record))
    }

    async fn commit_review_change(
        &self,
        change: ReviewChange,
        recompute: &Recompute,
    ) -> Result<(Option<Review>, ReputationRecord), ReputationError> {
        let target_id = match &change {
            ReviewChange::Create(review) => review.target_id,
            ReviewChange::Edit { review_id, .. } | ReviewChange::Delete { review_id, .. } => {
                sqlx::query_scalar::<_, Uuid>("SELECT target_id FROM reviews WHERE id = $1 AND status = 'active'")
                    .bind(review_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db)?
                    .ok_or(ReputationError::ReviewNotFound(*review_id))?
            }
            ReviewChange::Recompute(user_id) => *user_id,
        };

        let mut db_tx = self.pool.begin().await.map_err(db)?;

        // the reputation row is the per-target lock
        sqlx::query("INSERT INTO reputation_records (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(target_id)
            .execute(&mut *db_tx)
            .await
            .map_err(db)?;
        let prior: Option<Json<ReputationRecord>> =
            sqlx::query_scalar("SELECT record FROM reputation_records WHERE user_id = $1 FOR UPDATE")
                .bind(target_id)
                .fetch_one(&mut *db_tx)
                .await
                .map_err(db)?;

        let changed: Option<ReviewRow> = match change {
            ReviewChange::Create(review) => {
                let sql = format!(
                    r#"
                    INSERT INTO reviews (id, task_id, reviewer_id, target_id, review_type, rating, comment,
                                         quality_rating, communication_rating, timeliness_rating,
                                         professionalism_rating, is_anonymous, status, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                    RETURNING {REVIEW_COLUMNS}
                    "#
                );
                let row = sqlx::query_as::<_, ReviewRow>(&sql)
                    .bind(review.id)
                    .bind(review.task_id)
                    .bind(review.reviewer_id)
                    .bind(review.target_id)
                    .bind(review.review_type.as_str())
                    .bind(i16::from(review.rating))
                    .bind(&review.comment)
                    .bind(review.sub_ratings.quality.map(i16::from))
                    .bind(review.sub_ratings.communication.map(i16::from))
                    .bind(review.sub_ratings.timeliness.map(i16::from))
                    .bind(review.sub_ratings.professionalism.map(i16::from))
                    .bind(review.is_anonymous)
                    .bind(review.status.as_str())
                    .bind(review.created_at)
                    .bind(review.updated_at)
                    .fetch_one(&mut *db_tx)
                    .await
                    .map_err(|err| {
                        if is_unique_violation(&err) {
                            ReputationError::DuplicateReview
                        } else {
                            db(err)
                        }
                    })?;
                Some(row)
            }
            ReviewChange::Edit { review_id, rating, comment, sub_ratings, at } => {
                let sql = format!(
                    r#"
                    UPDATE reviews
                    SET rating = $2, comment = $3, quality_rating = $4, communication_rating = $5,
                        timeliness_rating = $6, professionalism_rating = $7, updated_at = $8
                    WHERE id = $1 AND status = 'active'
                    RETURNING {REVIEW_COLUMNS}
                    "#
                );
                let row = sqlx::query_as::<_, ReviewRow>(&sql)
                    .bind(review_id)
                    .bind(i16::from(rating))
                    .bind(comment)
                    .bind(sub_ratings.quality.map(i16::from))
                    .bind(sub_ratings.communication.map(i16::from))
                    .bind(sub_ratings.timeliness.map(i16::from))
                    .bind(sub_ratings.professionalism.map(i16::from))
                    .bind(at)
                    .fetch_optional(&mut *db_tx)
                    .await
                    .map_err(db)?
                    .ok_or(ReputationError::ReviewNotFound(review_id))?;
                Some(row)
            }
            ReviewChange::Delete { review_id, at } => {
                let sql = format!(
                    "UPDATE reviews SET status = 'deleted', updated_at = $2 \
                     WHERE id = $1 AND status = 'active' RETURNING {REVIEW_COLUMNS}"
                );
                let row = sqlx::query_as::<_, ReviewRow>(&sql)
                    .bind(review_id)
                    .bind(at)
                    .fetch_optional(&mut *db_tx)
                    .await
                    .map_err(db)?
                    .ok_or(ReputationError::ReviewNotFound(review_id))?;
                Some(row)
            }
            ReviewChange::Recompute(_) => None,
        };
        let changed = changed.map(Review::try_from).transpose()?;

        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE target_id = $1 AND status = 'active'");
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(target_id)
            .fetch_all(&mut *db_tx)
            .await
            .map_err(db)?;
        let reviews: Vec<Review> = rows_into(rows)?;

        let record = recompute(target_id, &reviews, prior.as_ref().map(|Json(record)| record))?;

        sqlx::query("UPDATE reputation_records SET record = $2, updated_at = $3 WHERE user_id = $1")
            .bind(target_id)
            .bind(Json(&record))
            .bind(record.updated_at)
            .execute(&mut *db_tx)
            .await
            .map_err(db)?;
        db_tx.commit().await.map_err(db)?;

        Ok((changed, record))
    }
}
