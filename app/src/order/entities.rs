//! Handles the payment side of customer orders. Orders are either paid on delivery or from the
//! customer's wallet:
//! - a wallet order can be paid at checkout, in which case the debit is part of placing the
//!   order, or later when staff mark it as paid
//! - a pay-on-delivery order is marked as paid by staff once the cash is collected, with no
//!   effect on the wallet
//!
//! Whichever path pays a wallet order first debits the wallet; the other one finds the debit on
//! the ledger and only flips the paid flag. Unmarking a paid order does not give the money
//! back: the debit stays on the ledger and the wallet is not re-credited.

use crate::auth;
use crate::database;
use crate::ledger;
use crate::money::{Amount, AmountError};
use crate::user;
use crate::wallet::{InsufficientFunds, Wallet};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("order has no items")]
    EmptyOrder,
    #[error("delivery address and phone are required")]
    MissingDeliveryDetails,
    #[error("quantity of {0:?} must be positive")]
    InvalidQuantity(FoodId),
    #[error("price of {0:?} is invalid: {1}")]
    InvalidPrice(FoodId, AmountError),
    #[error("order total is invalid: {0}")]
    InvalidTotal(AmountError),
    #[error("{0}")]
    InsufficientFunds(#[from] InsufficientFunds),
    #[error("order not found")]
    NotFound,
    #[error("{0}")]
    Storage(#[from] database::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub Uuid);

/// Catalog item reference. The catalog itself lives elsewhere.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FoodId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    /// Pay on delivery.
    Cod,
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub food_id: FoodId,
    pub quantity: i32,
    pub price_at_purchase: Amount,
}

impl Item {
    pub fn line_total(&self) -> Amount {
        Amount(self.price_at_purchase.0 * Decimal::from(self.quantity))
    }
}

/// Checkout input, priced by the catalog.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub delivery_address: String,
    pub phone: String,
    pub payment_method: PaymentMethod,
    /// Debit the wallet while placing the order. Only meaningful for wallet orders; without it
    /// the order waits for staff to mark it as paid.
    pub pay_now: bool,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPaidOutcome {
    /// The order is now paid. `debited` is true if this call debited the wallet.
    Paid { debited: bool },
    /// The order was already paid; nothing changed.
    AlreadyPaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmarkPaidOutcome {
    /// The order is no longer marked as paid. If `wallet_debit_kept` is true the customer's
    /// wallet was debited for this order and that debit was not reversed.
    Unmarked { wallet_debit_kept: bool },
    /// The order was not marked as paid; nothing changed.
    NotPaid,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: Id,
    pub user_id: user::Id,
    pub delivery_address: String,
    pub phone: String,
    /// Sum of the item line totals, fixed when the order is placed.
    pub total: Amount,
    pub payment_method: PaymentMethod,
    pub is_paid: bool,
    pub created: DateTime<Utc>,
    pub items: Vec<Item>,
}

impl Order {
    /// Validates checkout input and builds the unpaid order.
    pub(crate) fn place(grant: &auth::CustomerGrant, new_order: NewOrder) -> Result<Self, Error> {
        let delivery_address = new_order.delivery_address.trim();
        let phone = new_order.phone.trim();
        if delivery_address.is_empty() || phone.is_empty() {
            return Err(Error::MissingDeliveryDetails);
        }
        if new_order.items.is_empty() {
            return Err(Error::EmptyOrder);
        }
        for item in new_order.items.iter() {
            if item.quantity <= 0 {
                return Err(Error::InvalidQuantity(item.food_id));
            }
            Amount::positive(item.price_at_purchase.0)
                .map_err(|e| Error::InvalidPrice(item.food_id, e))?;
        }
        let total = new_order.items.iter().map(Item::line_total).sum::<Amount>();
        let total = Amount::positive(total.0).map_err(Error::InvalidTotal)?;
        Ok(Self {
            id: Id(Uuid::new_v4()),
            user_id: grant.user_id,
            delivery_address: delivery_address.to_owned(),
            phone: phone.to_owned(),
            total,
            payment_method: new_order.payment_method,
            is_paid: false,
            created: Utc::now(),
            items: new_order.items,
        })
    }

    /// Pays a wallet order. Unless `already_debited` is set, the wallet is debited with the
    /// order total and the ledger entry recording the debit is returned; if the balance does
    /// not cover the total, neither the wallet nor the order change.
    pub(crate) fn pay_from_wallet(
        &mut self,
        wallet: &mut Wallet,
        already_debited: bool,
        note: String,
    ) -> Result<Option<ledger::Entry>, InsufficientFunds> {
        if self.payment_method != PaymentMethod::Wallet {
            panic!("order {:?} is not paid from the wallet", self.id);
        }
        if self.is_paid {
            panic!("order {:?} is already paid", self.id);
        }
        if self.user_id != wallet.user_id() {
            panic!(
                "order {:?} user id {:?} does not match wallet {:?} of {:?}",
                self.id,
                self.user_id,
                wallet.id(),
                wallet.user_id()
            );
        }
        let entry = if already_debited {
            None
        } else {
            Some(ledger::Entry::debit(
                wallet,
                self.total,
                ledger::Cause::OrderPayment(self.id),
                note,
            )?)
        };
        self.is_paid = true;
        Ok(entry)
    }

    /// Marks a pay-on-delivery order as paid.
    pub(crate) fn pay_on_delivery(&mut self) {
        if self.payment_method != PaymentMethod::Cod {
            panic!("order {:?} is not paid on delivery", self.id);
        }
        if self.is_paid {
            panic!("order {:?} is already paid", self.id);
        }
        self.is_paid = true;
    }

    /// Clears the paid flag. Returns false if the order was not paid.
    pub(crate) fn unmark_paid(&mut self) -> bool {
        let was_paid = self.is_paid;
        self.is_paid = false;
        was_paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenId;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn customer() -> auth::CustomerGrant {
        auth::CustomerGrant {
            token_id: TokenId(Uuid::new_v4()),
            user_id: user::Id(Uuid::new_v4()),
        }
    }

    fn item(quantity: i32, price_minor: i64) -> Item {
        Item {
            food_id: FoodId(Uuid::new_v4()),
            quantity,
            price_at_purchase: Amount::from_minor(price_minor),
        }
    }

    fn new_order(payment_method: PaymentMethod, items: Vec<Item>) -> NewOrder {
        NewOrder {
            delivery_address: " 12 Allen Avenue ".to_owned(),
            phone: "0801".to_owned(),
            payment_method,
            pay_now: payment_method == PaymentMethod::Wallet,
            items,
        }
    }

    fn wallet_order_for(total_minor: i64) -> (Order, Wallet) {
        let grant = customer();
        let order = Order::place(
            &grant,
            new_order(PaymentMethod::Wallet, vec![item(1, total_minor)]),
        )
        .unwrap();
        (order, Wallet::new(grant.user_id))
    }

    fn funded(wallet: &mut Wallet, minor: i64) {
        ledger::Entry::adjustment(wallet, Amount::from_minor(minor), String::new()).unwrap();
    }

    #[test]
    fn place_sums_line_totals() {
        let order = Order::place(
            &customer(),
            new_order(PaymentMethod::Cod, vec![item(2, 1250), item(1, 500)]),
        )
        .unwrap();
        assert_eq!(order.total, Amount::from_minor(3000));
        assert_eq!(order.delivery_address, "12 Allen Avenue");
        assert!(!order.is_paid);
    }

    #[rstest]
    #[case(vec![], "EmptyOrder")]
    #[case(vec![item(0, 100)], "InvalidQuantity")]
    #[case(vec![item(1, 0)], "InvalidPrice")]
    fn place_rejects_bad_lines(#[case] items: Vec<Item>, #[case] expected: &str) {
        let err = Order::place(&customer(), new_order(PaymentMethod::Cod, items)).unwrap_err();
        assert!(format!("{:?}", err).starts_with(expected), "{:?}", err);
    }

    #[test]
    fn place_requires_delivery_details() {
        let mut input = new_order(PaymentMethod::Cod, vec![item(1, 100)]);
        input.phone = "  ".to_owned();
        assert!(matches!(
            Order::place(&customer(), input),
            Err(Error::MissingDeliveryDetails)
        ));
    }

    #[test]
    fn wallet_payment_debits_the_total() {
        let (mut order, mut wallet) = wallet_order_for(3000);
        funded(&mut wallet, 5000);
        let entry = order
            .pay_from_wallet(&mut wallet, false, "paid at checkout".to_owned())
            .unwrap()
            .unwrap();
        assert!(order.is_paid);
        assert_eq!(entry.amount, Amount::from_minor(3000));
        assert_eq!(entry.kind, ledger::Kind::Debit);
        assert_eq!(entry.cause, ledger::Cause::OrderPayment(order.id));
        assert_eq!(wallet.balance(), Amount::from_minor(2000));
    }

    #[test]
    fn wallet_payment_without_cover_changes_nothing() {
        let (mut order, mut wallet) = wallet_order_for(3000);
        funded(&mut wallet, 2000);
        let err = order
            .pay_from_wallet(&mut wallet, false, String::new())
            .unwrap_err();
        assert_eq!(err.balance, Amount::from_minor(2000));
        assert_eq!(err.required, Amount::from_minor(3000));
        assert!(!order.is_paid);
        assert_eq!(wallet.balance(), Amount::from_minor(2000));
    }

    #[test]
    fn wallet_payment_with_existing_debit_only_flips_the_flag() {
        let (mut order, mut wallet) = wallet_order_for(3000);
        let entry = order.pay_from_wallet(&mut wallet, true, String::new()).unwrap();
        assert!(entry.is_none());
        assert!(order.is_paid);
        assert_eq!(wallet.balance(), Amount::ZERO);
    }

    #[test]
    fn unmarking_keeps_the_money_where_it_is() {
        let (mut order, mut wallet) = wallet_order_for(3000);
        funded(&mut wallet, 3000);
        order.pay_from_wallet(&mut wallet, false, String::new()).unwrap();
        assert!(order.unmark_paid());
        assert!(!order.unmark_paid());
        assert_eq!(wallet.balance(), Amount::ZERO);
    }

    #[test]
    fn cash_orders_are_paid_without_a_wallet() {
        let mut order =
            Order::place(&customer(), new_order(PaymentMethod::Cod, vec![item(1, 100)])).unwrap();
        order.pay_on_delivery();
        assert!(order.is_paid);
    }

    #[test]
    #[should_panic(expected = "is already paid")]
    fn paying_twice_is_a_bug() {
        let (mut order, mut wallet) = wallet_order_for(100);
        order.pay_from_wallet(&mut wallet, true, String::new()).unwrap();
        let _ = order.pay_from_wallet(&mut wallet, true, String::new());
    }
}
