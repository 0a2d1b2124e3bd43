use crate::auth;
use crate::database::{self, Database};
use crate::money::Amount;
use crate::wallet::{self, ExclusiveAccess};
use crate::QueryRange;

mod entities;

pub use entities::{Cause, Entry, Id, Kind};

/// Returns true if an entry with this idempotency key has already been recorded.
///
/// Takes the [`ExclusiveAccess`] of the wallet that would receive the new entry, so the check
/// and the subsequent [`append`] happen in the same locked unit of work.
pub async fn has_entry_for(
    access: &mut ExclusiveAccess,
    cause: Cause,
) -> Result<bool, database::Error> {
    exists(access.data_tx(), cause).await
}

/// Appends an entry created against the locked wallet. Entries are never updated or removed.
pub async fn append(access: &mut ExclusiveAccess, entry: &Entry) -> Result<(), database::Error> {
    if entry.wallet_id != access.wallet().id() {
        panic!(
            "entry {:?} belongs to wallet {:?}, not to the locked wallet {:?}",
            entry.id,
            entry.wallet_id,
            access.wallet().id()
        );
    }
    queries::insert(access.data_tx(), entry).await
}

/// Credits minus debits for the wallet. Must always equal the wallet balance.
pub async fn sum_for_wallet(
    db: &Database,
    wallet_id: wallet::Id,
) -> Result<Amount, database::Error> {
    queries::sum_for_wallet(db, wallet_id).await
}

/// The customer's own ledger, newest first.
pub async fn list_for_customer(
    grant: &auth::CustomerGrant,
    db: &Database,
    range: QueryRange,
) -> Result<Vec<Entry>, database::Error> {
    queries::list_for_user(db, grant.user_id, range).await
}

/// Every entry across all wallets, newest first.
pub async fn list(
    _grant: &auth::StaffGrant,
    db: &Database,
    range: QueryRange,
) -> Result<Vec<Entry>, database::Error> {
    queries::list(db, range).await
}

/// Existence check that does not require the wallet lock. Only for reporting; settlement
/// decisions go through [`has_entry_for`].
pub(crate) async fn exists(
    data_tx: &mut database::Transaction,
    cause: Cause,
) -> Result<bool, database::Error> {
    queries::exists(data_tx, cause).await
}

mod queries {
    use super::{Cause, Entry, Id, Kind};
    use crate::database::{self, CountRow, Database, SumRow};
    use crate::money::Amount;
    use crate::{order, topup, user, wallet, QueryRange};
    use chrono::{DateTime, Utc};
    use const_format::formatcp;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    const COLUMNS: &str = "id, wallet_id, kind, cause, amount, created, topup_id, order_id, note";

    const CAUSE_TOP_UP: i32 = 0;
    const CAUSE_ORDER_PAYMENT: i32 = 1;
    const CAUSE_ADJUSTMENT: i32 = 2;

    pub(super) async fn insert(
        data_tx: &mut database::Transaction,
        entry: &Entry,
    ) -> Result<(), database::Error> {
        sqlx::query(formatcp!(
            "INSERT INTO ledger_entries ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            COLUMNS
        ))
        .bind(entry.id.0)
        .bind(entry.wallet_id.0)
        .bind(match entry.kind {
            Kind::Credit => 0,
            Kind::Debit => 1,
        })
        .bind(cause_to_i32(&entry.cause))
        .bind(entry.amount.0)
        .bind(entry.created)
        .bind(match entry.cause {
            Cause::TopUp(id) => Some(id.0),
            _ => None,
        })
        .bind(match entry.cause {
            Cause::OrderPayment(id) => Some(id.0),
            _ => None,
        })
        .bind(&entry.note)
        .execute(&mut *data_tx)
        .await?;
        Ok(())
    }

    pub(super) async fn exists(
        data_tx: &mut database::Transaction,
        cause: Cause,
    ) -> Result<bool, database::Error> {
        let query = match cause {
            Cause::TopUp(id) => sqlx::query_as::<_, CountRow>(formatcp!(
                "SELECT COUNT(*) AS count FROM ledger_entries WHERE cause = {} AND topup_id = $1",
                CAUSE_TOP_UP
            ))
            .bind(id.0),
            Cause::OrderPayment(id) => sqlx::query_as::<_, CountRow>(formatcp!(
                "SELECT COUNT(*) AS count FROM ledger_entries WHERE cause = {} AND order_id = $1",
                CAUSE_ORDER_PAYMENT
            ))
            .bind(id.0),
            // Adjustments carry no reference, so they never deduplicate.
            Cause::Adjustment => return Ok(false),
        };
        let row = query.fetch_one(&mut *data_tx).await?;
        Ok(row.count > 0)
    }

    pub(super) async fn sum_for_wallet(
        db: &Database,
        wallet_id: wallet::Id,
    ) -> Result<Amount, database::Error> {
        let row = sqlx::query_as::<_, SumRow<Decimal>>(
            r#"SELECT COALESCE(SUM(CASE WHEN kind = 0 THEN amount ELSE -amount END), 0)::NUMERIC(14, 2) AS sum
                FROM ledger_entries WHERE wallet_id = $1"#,
        )
        .bind(wallet_id.0)
        .fetch_one(db)
        .await?;
        Ok(Amount(row.sum))
    }

    pub(super) async fn list_for_user(
        db: &Database,
        user_id: user::Id,
        range: QueryRange,
    ) -> Result<Vec<Entry>, database::Error> {
        Ok(sqlx::query_as::<_, EntryRow>(
            r#"SELECT ledger_entries.id, wallet_id, kind, cause, amount, created, topup_id, order_id, note
                FROM ledger_entries JOIN wallets ON wallets.id = ledger_entries.wallet_id
                WHERE wallets.user_id = $1 ORDER BY created DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id.0)
        .bind(range.limit)
        .bind(range.offset)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| row.into_entity())
        .collect())
    }

    pub(super) async fn list(db: &Database, range: QueryRange) -> Result<Vec<Entry>, database::Error> {
        Ok(sqlx::query_as::<_, EntryRow>(formatcp!(
            "SELECT {} FROM ledger_entries ORDER BY created DESC LIMIT $1 OFFSET $2",
            COLUMNS
        ))
        .bind(range.limit)
        .bind(range.offset)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| row.into_entity())
        .collect())
    }

    #[derive(sqlx::FromRow, Debug)]
    struct EntryRow {
        id: Uuid,
        wallet_id: Uuid,
        kind: i32,
        cause: i32,
        amount: Decimal,
        created: DateTime<Utc>,
        topup_id: Option<Uuid>,
        order_id: Option<Uuid>,
        note: String,
    }

    impl EntryRow {
        fn into_entity(self) -> Entry {
            let cause = self.cause();
            Entry {
                id: Id(self.id),
                wallet_id: wallet::Id(self.wallet_id),
                kind: match self.kind {
                    0 => Kind::Credit,
                    1 => Kind::Debit,
                    _ => unreachable!("invalid ledger entry kind {:?}", self.kind),
                },
                cause,
                amount: Amount(self.amount),
                created: self.created,
                note: self.note,
            }
        }

        fn cause(&self) -> Cause {
            match (self.cause, self.topup_id, self.order_id) {
                (CAUSE_TOP_UP, Some(id), None) => Cause::TopUp(topup::Id(id)),
                (CAUSE_ORDER_PAYMENT, None, Some(id)) => Cause::OrderPayment(order::Id(id)),
                (CAUSE_ADJUSTMENT, None, None) => Cause::Adjustment,
                _ => unreachable!(
                    "invalid ledger entry cause {:?} for entry {:?}",
                    self.cause, self.id
                ),
            }
        }
    }

    fn cause_to_i32(cause: &Cause) -> i32 {
        match cause {
            Cause::TopUp(_) => CAUSE_TOP_UP,
            Cause::OrderPayment(_) => CAUSE_ORDER_PAYMENT,
            Cause::Adjustment => CAUSE_ADJUSTMENT,
        }
    }
}
