//! The ledger is the permanent record of every balance movement. Entries are immutable and
//! append-only; the wallet balance is derived from them.
//!
//! Each entry carries a [`Cause`]. For top-ups and order payments the cause includes the
//! originating record, and that pair is the idempotency key: at most one entry may exist per
//! top-up and at most one per order payment. Settlement workflows check for an existing entry
//! under the wallet lock before creating a new one, and the store enforces the same rule with
//! unique indexes.

use crate::money::Amount;
use crate::order;
use crate::topup;
use crate::wallet::{self, AdjustError, BalanceLimitExceeded, InsufficientFunds, Wallet};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Id(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cause {
    /// Credit for an approved top-up.
    TopUp(topup::Id),
    /// Debit paying for a wallet order.
    OrderPayment(order::Id),
    /// Manual correction by staff, in either direction.
    Adjustment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: Id,
    pub wallet_id: wallet::Id,
    pub kind: Kind,
    pub cause: Cause,
    pub amount: Amount,
    pub created: DateTime<Utc>,
    pub note: String,
}

impl Entry {
    /// Credits the wallet and returns the entry recording it. Nothing changes if the new
    /// balance would not fit the store.
    pub(crate) fn credit(
        wallet: &mut Wallet,
        amount: Amount,
        cause: Cause,
        note: String,
    ) -> Result<Self, BalanceLimitExceeded> {
        if !amount.is_positive() {
            panic!("credit amount {} for {:?} is not positive", amount, cause);
        }
        if let Cause::OrderPayment(_) = cause {
            panic!("order payments cannot be credits: {:?}", cause);
        }
        wallet.credit(amount)?;
        Ok(Self::new(wallet, Kind::Credit, cause, amount, note))
    }

    /// Debits the wallet and returns the entry recording it. Nothing changes if the balance
    /// does not cover `amount`.
    pub(crate) fn debit(
        wallet: &mut Wallet,
        amount: Amount,
        cause: Cause,
        note: String,
    ) -> Result<Self, InsufficientFunds> {
        if !amount.is_positive() {
            panic!("debit amount {} for {:?} is not positive", amount, cause);
        }
        if let Cause::TopUp(_) = cause {
            panic!("top-ups cannot be debits: {:?}", cause);
        }
        wallet.debit(amount)?;
        Ok(Self::new(wallet, Kind::Debit, cause, amount, note))
    }

    /// Credits or debits the wallet depending on the sign of `delta`.
    pub(crate) fn adjustment(
        wallet: &mut Wallet,
        delta: Amount,
        note: String,
    ) -> Result<Self, AdjustError> {
        if delta == Amount::ZERO {
            panic!("adjustment of wallet {:?} is zero", wallet.id());
        }
        wallet.adjust(delta)?;
        let kind = if delta.is_negative() {
            Kind::Debit
        } else {
            Kind::Credit
        };
        Ok(Self::new(wallet, kind, Cause::Adjustment, delta.abs(), note))
    }

    /// The amount with the sign of its effect on the balance.
    pub fn signed_amount(&self) -> Amount {
        match self.kind {
            Kind::Credit => self.amount,
            Kind::Debit => -self.amount,
        }
    }

    fn new(wallet: &Wallet, kind: Kind, cause: Cause, amount: Amount, note: String) -> Self {
        Self {
            id: Id(Uuid::new_v4()),
            wallet_id: wallet.id(),
            kind,
            cause,
            amount,
            created: Utc::now(),
            note,
        }
    }
}
