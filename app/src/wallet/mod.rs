use crate::auth;
use crate::concurrency;
use crate::database::{self, Database};
use crate::ledger;
use crate::money::Amount;
use crate::user;
use chrono::Utc;
use thiserror::Error;

mod entities;

pub use entities::{AdjustError, BalanceLimitExceeded, Id, InsufficientFunds, Wallet};

#[derive(Debug, Error)]
pub enum Error {
    #[error("user not found")]
    NotFound,
    #[error("adjustment must not be zero")]
    ZeroAdjustment,
    #[error("{0}")]
    InsufficientFunds(#[from] InsufficientFunds),
    #[error("{0}")]
    BalanceLimitExceeded(#[from] BalanceLimitExceeded),
    #[error("{0}")]
    Storage(#[from] database::Error),
}

impl From<AdjustError> for Error {
    fn from(e: AdjustError) -> Self {
        match e {
            AdjustError::InsufficientFunds(e) => Self::InsufficientFunds(e),
            AdjustError::BalanceLimitExceeded(e) => Self::BalanceLimitExceeded(e),
        }
    }
}

/// Exclusive access to one wallet for the duration of a single database transaction.
///
/// The wallet row is locked with `SELECT ... FOR UPDATE` when the guard is created and stays
/// locked until [`ExclusiveAccess::commit`] finishes or the guard is dropped, in which case the
/// transaction is rolled back. Concurrent settlements on the same wallet queue on that lock;
/// settlements on different wallets do not interact.
///
/// Other rows touched by the same settlement (the top-up or the order) must be locked through
/// [`ExclusiveAccess::data_tx`] after the wallet, never before, so that every unit of work takes
/// its locks in the same order.
pub struct ExclusiveAccess {
    data_tx: database::Transaction,
    wallet: Wallet,
}

impl ExclusiveAccess {
    /// The wallet as read under the lock.
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub(crate) fn wallet_mut(&mut self) -> &mut Wallet {
        &mut self.wallet
    }

    pub(crate) fn data_tx(&mut self) -> &mut database::Transaction {
        &mut self.data_tx
    }

    /// Persists the balance (if it changed) and commits the whole unit of work, releasing the
    /// lock.
    pub async fn commit(mut self) -> Result<Wallet, database::Error> {
        update(&mut self.data_tx, &mut self.wallet).await?;
        database::commit(self.data_tx).await?;
        Ok(self.wallet)
    }
}

/// Starts a unit of work holding the lock on the user's wallet, creating the wallet first if
/// the user has none yet.
pub async fn exclusive_access(
    db: &Database,
    user_id: user::Id,
) -> Result<ExclusiveAccess, database::Error> {
    let mut data_tx = database::begin(db).await?;
    queries::insert_if_missing(&mut data_tx, &Wallet::new(user_id)).await?;
    let wallet = queries::get_for_update(&mut data_tx, user_id).await?;
    Ok(ExclusiveAccess { data_tx, wallet })
}

/// Returns the user's wallet, creating an empty one inside `data_tx` if there is none.
pub async fn get_or_create(
    data_tx: &mut database::Transaction,
    user_id: user::Id,
) -> Result<Wallet, database::Error> {
    queries::insert_if_missing(data_tx, &Wallet::new(user_id)).await?;
    queries::get(data_tx, user_id).await
}

/// Read-only view of the customer's wallet. The wallet is created on first view, so the
/// balance can be shown before the first top-up.
pub async fn get(grant: &auth::CustomerGrant, db: &Database) -> Result<Wallet, database::Error> {
    let mut data_tx = database::begin(db).await?;
    let wallet = get_or_create(&mut data_tx, grant.user_id).await?;
    database::commit(data_tx).await?;
    Ok(wallet)
}

/// Records a manual balance correction made by staff. Positive deltas credit the wallet,
/// negative ones debit it; either way an `Adjustment` ledger entry is appended so the
/// reconciliation invariant keeps holding.
pub async fn adjust(
    grant: &auth::StaffGrant,
    db: &Database,
    user_id: user::Id,
    delta: Amount,
    note: &str,
) -> Result<ledger::Entry, Error> {
    if delta == Amount::ZERO {
        return Err(Error::ZeroAdjustment);
    }
    if user::get(db, user_id).await?.is_none() {
        return Err(Error::NotFound);
    }
    let note = if note.trim().is_empty() {
        format!("adjusted by {}", grant.actor_id.0)
    } else {
        note.trim().to_owned()
    };
    concurrency::retry_loop(|| async {
        let mut access = exclusive_access(db, user_id).await?;
        log::info!(
            "adjusting wallet {:?} by {} on behalf of {:?}",
            access.wallet().id(),
            delta,
            grant.actor_id
        );
        let entry = ledger::Entry::adjustment(access.wallet_mut(), delta, note.clone())?;
        ledger::append(&mut access, &entry).await?;
        access.commit().await?;
        Ok::<_, Error>(entry)
    })
    .await
}

pub(crate) async fn update(
    data_tx: &mut database::Transaction,
    wallet: &mut Wallet,
) -> Result<(), database::Error> {
    if wallet.changed() {
        let updated = Utc::now();
        sqlx::query(
            "UPDATE wallets SET balance = $1, updated = $2 WHERE id = $3 AND balance = $4 RETURNING id",
        )
        .bind(wallet.balance().0)
        .bind(updated)
        .bind(wallet.id().0)
        .bind(wallet.original_balance().0)
        .fetch_optional(&mut *data_tx)
        .await?
        .ok_or(concurrency::ConflictError)?;
        wallet.touch(updated);
    }
    Ok(())
}

mod queries {
    use super::{Id, Wallet};
    use crate::database;
    use crate::money::Amount;
    use crate::user;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    pub(super) async fn insert_if_missing(
        data_tx: &mut database::Transaction,
        wallet: &Wallet,
    ) -> Result<(), database::Error> {
        sqlx::query(
            r#"INSERT INTO wallets (id, user_id, balance, updated) VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id) DO NOTHING"#,
        )
        .bind(wallet.id().0)
        .bind(wallet.user_id().0)
        .bind(wallet.balance().0)
        .bind(wallet.updated())
        .execute(&mut *data_tx)
        .await?;
        Ok(())
    }

    pub(super) async fn get(
        data_tx: &mut database::Transaction,
        user_id: user::Id,
    ) -> Result<Wallet, database::Error> {
        Ok(sqlx::query_as::<_, WalletRow>(
            "SELECT id, user_id, balance, updated FROM wallets WHERE user_id = $1",
        )
        .bind(user_id.0)
        .fetch_one(&mut *data_tx)
        .await?
        .into_entity())
    }

    pub(super) async fn get_for_update(
        data_tx: &mut database::Transaction,
        user_id: user::Id,
    ) -> Result<Wallet, database::Error> {
        Ok(sqlx::query_as::<_, WalletRow>(
            "SELECT id, user_id, balance, updated FROM wallets WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id.0)
        .fetch_one(&mut *data_tx)
        .await?
        .into_entity())
    }

    #[derive(sqlx::FromRow, Debug)]
    struct WalletRow {
        id: Uuid,
        user_id: Uuid,
        balance: Decimal,
        updated: DateTime<Utc>,
    }

    impl WalletRow {
        fn into_entity(self) -> Wallet {
            Wallet::load(
                Id(self.id),
                user::Id(self.user_id),
                Amount(self.balance),
                self.updated,
            )
        }
    }
}
