//! Provides the customer wallet: a prepaid balance that top-ups credit and wallet-paid orders
//! debit. The balance is a cache of the ledger (credits minus debits), so it is never changed
//! on its own: every change goes through [`crate::ledger::Entry::credit`] or
//! [`crate::ledger::Entry::debit`], which adjust the wallet and produce the matching entry in
//! one step.

use crate::money::Amount;
use crate::user;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("insufficient funds: balance is {balance}, {required} required")]
pub struct InsufficientFunds {
    pub balance: Amount,
    pub required: Amount,
}

/// A credit that would take the balance past what the store can hold.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("balance limit exceeded: balance is {balance}, {credit} cannot be credited")]
pub struct BalanceLimitExceeded {
    pub balance: Amount,
    pub credit: Amount,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdjustError {
    #[error("{0}")]
    InsufficientFunds(#[from] InsufficientFunds),
    #[error("{0}")]
    BalanceLimitExceeded(#[from] BalanceLimitExceeded),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub Uuid);

/// Represents the wallet row as read by one unit of work.
///
/// Like the row it was loaded from, this struct keeps the original balance next to the current
/// one. The update query only succeeds if the stored balance still equals the original one, so
/// a write that somehow bypassed the row lock shows up as a conflict instead of a lost update.
#[derive(Debug, Clone)]
pub struct Wallet {
    id: Id,
    user_id: user::Id,
    original_balance: Amount,
    balance: Amount,
    updated: DateTime<Utc>,
}

impl Wallet {
    pub(crate) fn new(user_id: user::Id) -> Self {
        Self::load(Id(Uuid::new_v4()), user_id, Amount::ZERO, Utc::now())
    }

    pub(crate) fn load(
        id: Id,
        user_id: user::Id,
        balance: Amount,
        updated: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            original_balance: balance,
            balance,
            updated,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn user_id(&self) -> user::Id {
        self.user_id
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn original_balance(&self) -> Amount {
        self.original_balance
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    pub fn changed(&self) -> bool {
        self.original_balance != self.balance
    }

    /// Applies a signed delta. Neither overdraft nor a balance the store cannot hold is
    /// allowed; a delta that would cause either leaves the wallet untouched.
    pub(crate) fn adjust(&mut self, delta: Amount) -> Result<(), AdjustError> {
        if delta.is_negative() {
            self.debit(delta.abs())?;
        } else {
            self.credit(delta)?;
        }
        Ok(())
    }

    pub(crate) fn credit(&mut self, amount: Amount) -> Result<(), BalanceLimitExceeded> {
        self.balance =
            Amount::fitting((self.balance + amount).0).map_err(|_| BalanceLimitExceeded {
                balance: self.balance,
                credit: amount,
            })?;
        Ok(())
    }

    pub(crate) fn debit(&mut self, amount: Amount) -> Result<(), InsufficientFunds> {
        let balance = self.balance - amount;
        if balance.is_negative() {
            return Err(InsufficientFunds {
                balance: self.balance,
                required: amount,
            });
        }
        self.balance = balance;
        Ok(())
    }

    pub(crate) fn touch(&mut self, updated: DateTime<Utc>) {
        self.original_balance = self.balance;
        self.updated = updated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wallet_with(balance: Amount) -> Wallet {
        Wallet::load(
            Id(Uuid::new_v4()),
            user::Id(Uuid::new_v4()),
            balance,
            Utc::now(),
        )
    }

    #[test]
    fn new_wallet_is_empty() {
        let wallet = Wallet::new(user::Id(Uuid::new_v4()));
        assert_eq!(wallet.balance(), Amount::ZERO);
        assert!(!wallet.changed());
    }

    #[test]
    fn adjust_applies_signed_deltas() {
        let mut wallet = wallet_with(Amount::from_minor(5000));
        wallet.adjust(Amount::from_minor(-3000)).unwrap();
        wallet.adjust(Amount::from_minor(250)).unwrap();
        assert_eq!(wallet.balance(), Amount::from_minor(2250));
        assert_eq!(wallet.original_balance(), Amount::from_minor(5000));
        assert!(wallet.changed());
    }

    #[test]
    fn adjust_down_to_exactly_zero_is_allowed() {
        let mut wallet = wallet_with(Amount::from_minor(3000));
        wallet.adjust(Amount::from_minor(-3000)).unwrap();
        assert_eq!(wallet.balance(), Amount::ZERO);
    }

    #[test]
    fn overdraft_is_refused_and_leaves_balance_untouched() {
        let mut wallet = wallet_with(Amount::from_minor(2000));
        let err = wallet.adjust(Amount::from_minor(-3000)).unwrap_err();
        assert_eq!(
            err,
            AdjustError::InsufficientFunds(InsufficientFunds {
                balance: Amount::from_minor(2000),
                required: Amount::from_minor(3000),
            })
        );
        assert_eq!(wallet.balance(), Amount::from_minor(2000));
        assert!(!wallet.changed());
    }

    #[test]
    fn credit_past_the_store_limit_is_refused_and_leaves_balance_untouched() {
        let full = Amount::from_minor(9_999_999_999_99);
        let mut wallet = wallet_with(full);
        let err = wallet.adjust(Amount::from_minor(100)).unwrap_err();
        assert_eq!(
            err,
            AdjustError::BalanceLimitExceeded(BalanceLimitExceeded {
                balance: full,
                credit: Amount::from_minor(100),
            })
        );
        assert_eq!(wallet.balance(), full);
        assert!(!wallet.changed());
    }

    #[test]
    fn touch_makes_the_current_balance_the_original_one() {
        let mut wallet = wallet_with(Amount::ZERO);
        wallet.adjust(Amount::from_minor(100)).unwrap();
        wallet.touch(Utc::now());
        assert!(!wallet.changed());
        assert_eq!(wallet.original_balance(), Amount::from_minor(100));
    }
}
