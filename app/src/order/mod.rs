use crate::auth;
use crate::concurrency;
use crate::database::{self, Database};
use crate::ledger;
use crate::wallet::{self, ExclusiveAccess};
use crate::QueryRange;

mod entities;

pub use entities::{
    Error, FoodId, Id, Item, MarkPaidOutcome, NewOrder, Order, PaymentMethod, UnmarkPaidOutcome,
};

/// Places an order. A wallet order with `pay_now` is paid on the spot: the order, its items and
/// the wallet debit are written in one unit of work under the wallet lock, and if the balance
/// does not cover the total nothing is written at all. Every other order starts out unpaid.
pub async fn place(
    grant: &auth::CustomerGrant,
    db: &Database,
    new_order: NewOrder,
) -> Result<Order, Error> {
    let pay_now = new_order.pay_now && new_order.payment_method == PaymentMethod::Wallet;
    let order = Order::place(grant, new_order)?;
    let order = concurrency::retry_loop(|| async {
        let mut order = order.clone();
        if pay_now {
            let mut access = wallet::exclusive_access(db, order.user_id).await?;
            queries::insert(access.data_tx(), &order).await?;
            debit_for_wallet_order(&mut access, &mut order, "paid at checkout".to_owned())
                .await?;
            queries::update_paid(access.data_tx(), &order).await?;
            access.commit().await?;
        } else {
            let mut data_tx = database::begin(db).await?;
            wallet::get_or_create(&mut data_tx, order.user_id).await?;
            queries::insert(&mut data_tx, &order).await?;
            database::commit(data_tx).await?;
        }
        Ok::<_, Error>(order)
    })
    .await?;
    log::info!(
        "order {:?} of {} placed by {:?}, paid: {}",
        order.id,
        order.total,
        order.user_id,
        order.is_paid
    );
    Ok(order)
}

/// Settles an unpaid wallet order against the wallet held by `access`.
///
/// The wallet is debited only if the ledger has no payment for this order yet; either way the
/// order ends up paid. Returns true if this call debited the wallet. The caller must have locked
/// the order row after the wallet and persist the order before committing.
pub async fn debit_for_wallet_order(
    access: &mut ExclusiveAccess,
    order: &mut Order,
    note: String,
) -> Result<bool, Error> {
    let already_debited =
        ledger::has_entry_for(access, ledger::Cause::OrderPayment(order.id)).await?;
    match order.pay_from_wallet(access.wallet_mut(), already_debited, note)? {
        Some(entry) => {
            log::info!("debiting {} for order {:?}", entry.amount, order.id);
            ledger::append(access, &entry).await?;
            Ok(true)
        }
        None => {
            log::warn!("order {:?} already has a wallet payment, not debiting", order.id);
            Ok(false)
        }
    }
}

/// Marks an order as paid on behalf of staff.
///
/// For a wallet order this runs under the owner's wallet lock with the order row re-read after
/// it, so racing calls for the same order settle once: the first one debits the wallet and the
/// others see [`MarkPaidOutcome::AlreadyPaid`]. A pay-on-delivery order only gets its flag set.
pub async fn mark_paid(
    grant: &auth::StaffGrant,
    db: &Database,
    id: Id,
) -> Result<MarkPaidOutcome, Error> {
    concurrency::retry_loop(|| async move {
        let (owner, payment_method) = queries::get_owner(db, id).await?.ok_or(Error::NotFound)?;
        let outcome = match payment_method {
            PaymentMethod::Wallet => {
                let mut access = wallet::exclusive_access(db, owner).await?;
                let mut order = queries::get_for_update(access.data_tx(), id)
                    .await?
                    .ok_or(Error::NotFound)?;
                if order.is_paid {
                    MarkPaidOutcome::AlreadyPaid
                } else {
                    let debited = debit_for_wallet_order(
                        &mut access,
                        &mut order,
                        format!("order payment approved by {}", grant.actor_id.0),
                    )
                    .await?;
                    queries::update_paid(access.data_tx(), &order).await?;
                    access.commit().await?;
                    MarkPaidOutcome::Paid { debited }
                }
            }
            PaymentMethod::Cod => {
                let mut data_tx = database::begin(db).await?;
                let mut order = queries::get_for_update(&mut data_tx, id)
                    .await?
                    .ok_or(Error::NotFound)?;
                if order.is_paid {
                    MarkPaidOutcome::AlreadyPaid
                } else {
                    order.pay_on_delivery();
                    queries::update_paid(&mut data_tx, &order).await?;
                    database::commit(data_tx).await?;
                    MarkPaidOutcome::Paid { debited: false }
                }
            }
        };
        match outcome {
            MarkPaidOutcome::AlreadyPaid => log::warn!("order {:?} is already paid", id),
            MarkPaidOutcome::Paid { debited } => log::info!(
                "order {:?} marked as paid by {:?}, wallet debited: {}",
                id,
                grant.actor_id,
                debited
            ),
        }
        Ok::<_, Error>(outcome)
    })
    .await
}

/// Clears the paid flag of an order. A wallet debit made for the order stays on the ledger and
/// the wallet is not credited back; the outcome reports whether such a debit exists.
pub async fn unmark_paid(
    grant: &auth::StaffGrant,
    db: &Database,
    id: Id,
) -> Result<UnmarkPaidOutcome, Error> {
    concurrency::retry_loop(|| async move {
        let mut data_tx = database::begin(db).await?;
        let mut order = queries::get_for_update(&mut data_tx, id)
            .await?
            .ok_or(Error::NotFound)?;
        if !order.unmark_paid() {
            return Ok(UnmarkPaidOutcome::NotPaid);
        }
        let wallet_debit_kept =
            ledger::exists(&mut data_tx, ledger::Cause::OrderPayment(id)).await?;
        queries::update_paid(&mut data_tx, &order).await?;
        database::commit(data_tx).await?;
        if wallet_debit_kept {
            log::warn!(
                "order {:?} unmarked as paid by {:?}; its wallet debit of {} was not reversed",
                id,
                grant.actor_id,
                order.total
            );
        } else {
            log::info!("order {:?} unmarked as paid by {:?}", id, grant.actor_id);
        }
        Ok::<_, Error>(UnmarkPaidOutcome::Unmarked { wallet_debit_kept })
    })
    .await
}

pub async fn get(
    grant: &auth::CustomerGrant,
    db: &Database,
    id: Id,
) -> Result<Option<Order>, database::Error> {
    Ok(queries::get(db, id)
        .await?
        .filter(|order| order.user_id == grant.user_id))
}

/// The customer's orders, newest first.
pub async fn list(
    grant: &auth::CustomerGrant,
    db: &Database,
    range: QueryRange,
) -> Result<Vec<Order>, database::Error> {
    queries::list_for_user(db, grant.user_id, range).await
}

pub async fn get_any(
    _grant: &auth::StaffGrant,
    db: &Database,
    id: Id,
) -> Result<Option<Order>, database::Error> {
    queries::get(db, id).await
}

mod queries {
    use super::{FoodId, Id, Item, Order, PaymentMethod};
    use crate::database::{self, Database};
    use crate::money::Amount;
    use crate::{user, QueryRange};
    use chrono::{DateTime, Utc};
    use const_format::formatcp;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use uuid::Uuid;

    const COLUMNS: &str =
        "id, user_id, delivery_address, phone, total_amount, payment_method, is_paid, created";

    pub(super) async fn insert(
        data_tx: &mut database::Transaction,
        order: &Order,
    ) -> Result<(), database::Error> {
        sqlx::query(formatcp!(
            "INSERT INTO orders ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            COLUMNS
        ))
        .bind(order.id.0)
        .bind(order.user_id.0)
        .bind(&order.delivery_address)
        .bind(&order.phone)
        .bind(order.total.0)
        .bind(payment_method_to_i32(order.payment_method))
        .bind(order.is_paid)
        .bind(order.created)
        .execute(&mut *data_tx)
        .await?;
        for item in order.items.iter() {
            sqlx::query(
                r#"INSERT INTO order_items (id, order_id, food_id, quantity, price_at_purchase)
                    VALUES ($1, $2, $3, $4, $5)"#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id.0)
            .bind(item.food_id.0)
            .bind(item.quantity)
            .bind(item.price_at_purchase.0)
            .execute(&mut *data_tx)
            .await?;
        }
        Ok(())
    }

    pub(super) async fn update_paid(
        data_tx: &mut database::Transaction,
        order: &Order,
    ) -> Result<(), database::Error> {
        sqlx::query("UPDATE orders SET is_paid = $1 WHERE id = $2")
            .bind(order.is_paid)
            .bind(order.id.0)
            .execute(&mut *data_tx)
            .await?;
        Ok(())
    }

    pub(super) async fn get_owner(
        db: &Database,
        id: Id,
    ) -> Result<Option<(user::Id, PaymentMethod)>, database::Error> {
        Ok(sqlx::query_as::<_, (Uuid, i32)>(
            "SELECT user_id, payment_method FROM orders WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(db)
        .await?
        .map(|(user_id, payment_method)| (user::Id(user_id), payment_method_from_i32(payment_method))))
    }

    pub(super) async fn get_for_update(
        data_tx: &mut database::Transaction,
        id: Id,
    ) -> Result<Option<Order>, database::Error> {
        let row = sqlx::query_as::<_, OrderRow>(formatcp!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&mut *data_tx)
        .await?;
        match row {
            Some(row) => {
                let items = items_for(&mut *data_tx, vec![row.id]).await?;
                Ok(with_items(vec![row], items).pop())
            }
            None => Ok(None),
        }
    }

    pub(super) async fn get(db: &Database, id: Id) -> Result<Option<Order>, database::Error> {
        let row = sqlx::query_as::<_, OrderRow>(formatcp!(
            "SELECT {} FROM orders WHERE id = $1",
            COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(db)
        .await?;
        match row {
            Some(row) => {
                let items = items_for(db, vec![row.id]).await?;
                Ok(with_items(vec![row], items).pop())
            }
            None => Ok(None),
        }
    }

    pub(super) async fn list_for_user(
        db: &Database,
        user_id: user::Id,
        range: QueryRange,
    ) -> Result<Vec<Order>, database::Error> {
        let rows = sqlx::query_as::<_, OrderRow>(formatcp!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created DESC LIMIT $2 OFFSET $3",
            COLUMNS
        ))
        .bind(user_id.0)
        .bind(range.limit)
        .bind(range.offset)
        .fetch_all(db)
        .await?;
        let items = items_for(db, rows.iter().map(|row| row.id).collect()).await?;
        Ok(with_items(rows, items))
    }

    async fn items_for<'e, E>(
        executor: E,
        order_ids: Vec<Uuid>,
    ) -> Result<Vec<ItemRow>, database::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        Ok(sqlx::query_as::<_, ItemRow>(
            r#"SELECT order_id, food_id, quantity, price_at_purchase FROM order_items
                WHERE order_id = ANY($1) ORDER BY id"#,
        )
        .bind(order_ids)
        .fetch_all(executor)
        .await?)
    }

    fn with_items(rows: Vec<OrderRow>, items: Vec<ItemRow>) -> Vec<Order> {
        let mut items_by_order: HashMap<Uuid, Vec<Item>> = HashMap::new();
        for item in items {
            items_by_order
                .entry(item.order_id)
                .or_default()
                .push(Item {
                    food_id: FoodId(item.food_id),
                    quantity: item.quantity,
                    price_at_purchase: Amount(item.price_at_purchase),
                });
        }
        rows.into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.id).unwrap_or_default();
                row.into_entity(items)
            })
            .collect()
    }

    #[derive(sqlx::FromRow, Debug)]
    struct OrderRow {
        id: Uuid,
        user_id: Uuid,
        delivery_address: String,
        phone: String,
        total_amount: Decimal,
        payment_method: i32,
        is_paid: bool,
        created: DateTime<Utc>,
    }

    impl OrderRow {
        fn into_entity(self, items: Vec<Item>) -> Order {
            Order {
                id: Id(self.id),
                user_id: user::Id(self.user_id),
                delivery_address: self.delivery_address,
                phone: self.phone,
                total: Amount(self.total_amount),
                payment_method: payment_method_from_i32(self.payment_method),
                is_paid: self.is_paid,
                created: self.created,
                items,
            }
        }
    }

    #[derive(sqlx::FromRow, Debug)]
    struct ItemRow {
        order_id: Uuid,
        food_id: Uuid,
        quantity: i32,
        price_at_purchase: Decimal,
    }

    fn payment_method_to_i32(payment_method: PaymentMethod) -> i32 {
        match payment_method {
            PaymentMethod::Cod => 0,
            PaymentMethod::Wallet => 1,
        }
    }

    fn payment_method_from_i32(payment_method: i32) -> PaymentMethod {
        match payment_method {
            0 => PaymentMethod::Cod,
            1 => PaymentMethod::Wallet,
            _ => unreachable!("invalid payment method {:?}", payment_method),
        }
    }
}
