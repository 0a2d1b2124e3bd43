use crate::auth;
use crate::concurrency;
use crate::database::{self, Database};
use crate::ledger;
use crate::money::Amount;
use crate::wallet;
use crate::QueryRange;

mod entities;

pub use entities::{
    AlreadyReviewed, ApprovalError, Decision, Error, Id, Outcome, Proof, Review, Status, TopUp,
};

/// Filter for the staff review queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Pending,
    Approved,
    Rejected,
}

/// Counts reported by [`review_many`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Top-ups moved out of pending by this call.
    pub reviewed: usize,
    /// Approved top-ups whose wallet was credited by this call.
    pub credited: usize,
    /// Top-ups that were unknown, already reviewed, already credited, or would overflow
    /// their wallet.
    pub skipped: usize,
}

/// Submits a top-up for review. The wallet is created here if needed so the customer can see
/// their balance right away.
pub async fn submit(
    grant: &auth::CustomerGrant,
    db: &Database,
    amount: Amount,
    proof: Proof,
    reference: &str,
) -> Result<TopUp, Error> {
    let topup = TopUp::submit(grant, amount, proof, reference)?;
    let mut data_tx = database::begin(db).await?;
    wallet::get_or_create(&mut data_tx, grant.user_id).await?;
    queries::insert(&mut data_tx, &topup).await?;
    database::commit(data_tx).await?;
    log::info!(
        "top-up {:?} of {} submitted by {:?}",
        topup.id,
        topup.amount,
        topup.user_id
    );
    Ok(topup)
}

pub async fn get(
    grant: &auth::CustomerGrant,
    db: &Database,
    id: Id,
) -> Result<Option<TopUp>, database::Error> {
    Ok(queries::get(db, id)
        .await?
        .filter(|topup| topup.user_id == grant.user_id))
}

pub async fn list(
    grant: &auth::CustomerGrant,
    db: &Database,
    range: QueryRange,
) -> Result<Vec<TopUp>, database::Error> {
    queries::list_for_user(db, grant.user_id, range).await
}

pub async fn get_any(
    _grant: &auth::StaffGrant,
    db: &Database,
    id: Id,
) -> Result<Option<TopUp>, database::Error> {
    queries::get(db, id).await
}

/// The staff review queue, newest first.
pub async fn list_all(
    _grant: &auth::StaffGrant,
    db: &Database,
    status: Option<StatusFilter>,
    range: QueryRange,
) -> Result<Vec<TopUp>, database::Error> {
    queries::list(db, status, range).await
}

/// Approves or rejects a pending top-up.
///
/// The whole review runs as one unit of work holding the owner's wallet lock: the top-up is
/// re-read under that lock, so duplicate submissions and racing reviewers see the first
/// reviewer's result and get [`Outcome::AlreadyReviewed`]. An approval credits the wallet only
/// if the ledger has no credit for this top-up yet.
pub async fn review(
    grant: &auth::StaffGrant,
    db: &Database,
    id: Id,
    decision: Decision,
    note: Option<&str>,
) -> Result<Outcome, Error> {
    concurrency::retry_loop(|| async move {
        let owner = queries::get_owner(db, id).await?.ok_or(Error::NotFound)?;
        let mut access = wallet::exclusive_access(db, owner).await?;
        let mut topup = queries::get_for_update(access.data_tx(), id)
            .await?
            .ok_or(Error::NotFound)?;

        let outcome = match decision {
            Decision::Approve => {
                let already_credited =
                    ledger::has_entry_for(&mut access, ledger::Cause::TopUp(id)).await?;
                match topup.approve(grant, note, access.wallet_mut(), already_credited) {
                    Ok(Some(entry)) => {
                        log::info!("approving top-up {:?}, crediting {}", id, entry.amount);
                        ledger::append(&mut access, &entry).await?;
                        Outcome::Approved { credited: true }
                    }
                    Ok(None) => {
                        log::warn!("approving top-up {:?}, credit already on the ledger", id);
                        Outcome::Approved { credited: false }
                    }
                    Err(ApprovalError::AlreadyReviewed(_)) => Outcome::AlreadyReviewed,
                    Err(ApprovalError::BalanceLimitExceeded(e)) => {
                        log::warn!("cannot approve top-up {:?}: {}", id, e);
                        return Err(e.into());
                    }
                }
            }
            Decision::Reject => match topup.reject(grant, note) {
                Ok(()) => {
                    log::info!("rejecting top-up {:?}", id);
                    Outcome::Rejected
                }
                Err(AlreadyReviewed) => Outcome::AlreadyReviewed,
            },
        };

        if outcome == Outcome::AlreadyReviewed {
            log::warn!("top-up {:?} has already been reviewed: {:?}", id, topup.status);
            // Dropping the access rolls back; nothing was written.
            return Ok(outcome);
        }
        queries::update_review(access.data_tx(), &topup).await?;
        access.commit().await?;
        Ok::<_, Error>(outcome)
    })
    .await
}

/// Reviews several top-ups with the same decision, keeping any note they already carry.
///
/// Every top-up is reviewed in its own unit of work, so a failure leaves the top-ups reviewed
/// before it committed.
pub async fn review_many(
    grant: &auth::StaffGrant,
    db: &Database,
    ids: &[Id],
    decision: Decision,
) -> Result<BatchOutcome, Error> {
    let mut batch = BatchOutcome::default();
    for &id in ids {
        match review(grant, db, id, decision, None).await {
            Ok(Outcome::Approved { credited }) => {
                batch.reviewed += 1;
                if credited {
                    batch.credited += 1;
                } else {
                    batch.skipped += 1;
                }
            }
            Ok(Outcome::Rejected) => batch.reviewed += 1,
            Ok(Outcome::AlreadyReviewed) => batch.skipped += 1,
            Err(Error::NotFound) => {
                log::warn!("skipping unknown top-up {:?} in batch review", id);
                batch.skipped += 1;
            }
            Err(Error::BalanceLimitExceeded(e)) => {
                log::warn!("skipping top-up {:?} in batch review: {}", id, e);
                batch.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(batch)
}

mod queries {
    use super::{Id, Proof, Review, Status, StatusFilter, TopUp};
    use crate::concurrency::ConflictError;
    use crate::database::{self, Database};
    use crate::money::Amount;
    use crate::{user, QueryRange};
    use chrono::{DateTime, Utc};
    use const_format::formatcp;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    const COLUMNS: &str =
        "id, user_id, amount, proof, reference, status, created, reviewed_by, reviewed_at, admin_note";

    pub(super) async fn insert(
        data_tx: &mut database::Transaction,
        topup: &TopUp,
    ) -> Result<(), database::Error> {
        sqlx::query(formatcp!(
            "INSERT INTO topups ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, NULL, NULL)",
            COLUMNS
        ))
        .bind(topup.id.0)
        .bind(topup.user_id.0)
        .bind(topup.amount.0)
        .bind(&topup.proof.0)
        .bind(&topup.reference)
        .bind(status_to_i32(&topup.status))
        .bind(topup.created)
        .execute(&mut *data_tx)
        .await?;
        Ok(())
    }

    /// Writes the review. Only a pending row can be reviewed; the row lock taken by
    /// [`get_for_update`] guarantees it still is, and a row that is not raises a conflict.
    pub(super) async fn update_review(
        data_tx: &mut database::Transaction,
        topup: &TopUp,
    ) -> Result<(), database::Error> {
        let review = match &topup.status {
            Status::Approved(review) | Status::Rejected(review) => review,
            Status::Pending => panic!("top-up {:?} has not been reviewed", topup.id),
        };
        sqlx::query(
            r#"UPDATE topups SET status = $1, reviewed_by = $2, reviewed_at = $3, admin_note = $4
                WHERE id = $5 AND status = 0 RETURNING id"#,
        )
        .bind(status_to_i32(&topup.status))
        .bind(review.reviewed_by.0)
        .bind(review.reviewed_at)
        .bind(&review.note)
        .bind(topup.id.0)
        .fetch_optional(&mut *data_tx)
        .await?
        .ok_or(ConflictError)?;
        Ok(())
    }

    pub(super) async fn get_owner(db: &Database, id: Id) -> Result<Option<user::Id>, database::Error> {
        Ok(
            sqlx::query_as::<_, (Uuid,)>("SELECT user_id FROM topups WHERE id = $1")
                .bind(id.0)
                .fetch_optional(db)
                .await?
                .map(|(user_id,)| user::Id(user_id)),
        )
    }

    pub(super) async fn get_for_update(
        data_tx: &mut database::Transaction,
        id: Id,
    ) -> Result<Option<TopUp>, database::Error> {
        Ok(sqlx::query_as::<_, TopUpRow>(formatcp!(
            "SELECT {} FROM topups WHERE id = $1 FOR UPDATE",
            COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&mut *data_tx)
        .await?
        .map(|row| row.into_entity()))
    }

    pub(super) async fn get(db: &Database, id: Id) -> Result<Option<TopUp>, database::Error> {
        Ok(sqlx::query_as::<_, TopUpRow>(formatcp!(
            "SELECT {} FROM topups WHERE id = $1",
            COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(db)
        .await?
        .map(|row| row.into_entity()))
    }

    pub(super) async fn list_for_user(
        db: &Database,
        user_id: user::Id,
        range: QueryRange,
    ) -> Result<Vec<TopUp>, database::Error> {
        Ok(sqlx::query_as::<_, TopUpRow>(formatcp!(
            "SELECT {} FROM topups WHERE user_id = $1 ORDER BY created DESC LIMIT $2 OFFSET $3",
            COLUMNS
        ))
        .bind(user_id.0)
        .bind(range.limit)
        .bind(range.offset)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| row.into_entity())
        .collect())
    }

    pub(super) async fn list(
        db: &Database,
        status: Option<StatusFilter>,
        range: QueryRange,
    ) -> Result<Vec<TopUp>, database::Error> {
        Ok(sqlx::query_as::<_, TopUpRow>(formatcp!(
            r#"SELECT {} FROM topups WHERE ($1::INT IS NULL OR status = $1)
                ORDER BY created DESC LIMIT $2 OFFSET $3"#,
            COLUMNS
        ))
        .bind(status.map(|status| match status {
            StatusFilter::Pending => 0,
            StatusFilter::Approved => 1,
            StatusFilter::Rejected => 2,
        }))
        .bind(range.limit)
        .bind(range.offset)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| row.into_entity())
        .collect())
    }

    #[derive(sqlx::FromRow, Debug)]
    struct TopUpRow {
        id: Uuid,
        user_id: Uuid,
        amount: Decimal,
        proof: String,
        reference: String,
        status: i32,
        created: DateTime<Utc>,
        reviewed_by: Option<Uuid>,
        reviewed_at: Option<DateTime<Utc>>,
        admin_note: Option<String>,
    }

    impl TopUpRow {
        fn into_entity(self) -> TopUp {
            let status = self.status();
            TopUp {
                id: Id(self.id),
                user_id: user::Id(self.user_id),
                amount: Amount(self.amount),
                proof: Proof(self.proof),
                reference: self.reference,
                status,
                created: self.created,
            }
        }

        fn status(&self) -> Status {
            match self.status {
                0 => Status::Pending,
                1 => Status::Approved(self.review()),
                2 => Status::Rejected(self.review()),
                _ => unreachable!("invalid top-up status {:?}", self.status),
            }
        }

        fn review(&self) -> Review {
            match (self.reviewed_by, self.reviewed_at) {
                (Some(reviewed_by), Some(reviewed_at)) => Review {
                    reviewed_by: user::Id(reviewed_by),
                    reviewed_at,
                    note: self.admin_note.clone().unwrap_or_default(),
                },
                _ => unreachable!("reviewed top-up {:?} has no reviewer", self.id),
            }
        }
    }

    fn status_to_i32(status: &Status) -> i32 {
        match status {
            Status::Pending => 0,
            Status::Approved(_) => 1,
            Status::Rejected(_) => 2,
        }
    }
}
