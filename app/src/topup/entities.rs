//! Handles customers funding their wallet. The flow goes as follows:
//! - the customer pays outside the platform and submits a [`TopUp`] with the amount and a proof
//!   of payment; it starts out pending
//! - staff review the proof and either approve the top-up, which credits the wallet, or reject
//!   it, which changes nothing but the status
//!
//! Both reviews are final. A top-up credits its wallet at most once, no matter how many times
//! it is approved.

use crate::auth;
use crate::database;
use crate::ledger;
use crate::money::{Amount, AmountError};
use crate::user;
use crate::wallet::{BalanceLimitExceeded, Wallet};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub(crate) const DEFAULT_REJECTION_NOTE: &str = "Rejected by admin.";

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidAmount(#[from] AmountError),
    #[error("proof of payment is missing")]
    MissingProof,
    #[error("top-up not found")]
    NotFound,
    #[error("{0}")]
    BalanceLimitExceeded(#[from] BalanceLimitExceeded),
    #[error("{0}")]
    Storage(#[from] database::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub Uuid);

/// Reference to the uploaded proof of payment. The upload itself is handled elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub reviewed_by: user::Id,
    pub reviewed_at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Pending,
    Approved(Review),
    Rejected(Review),
}

/// Result of a review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The top-up was approved. `credited` is false if a credit for it was already on the
    /// ledger.
    Approved { credited: bool },
    Rejected,
    /// The top-up had already been reviewed; nothing changed.
    AlreadyReviewed,
}

/// Returned when a review is attempted on a top-up that is no longer pending.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("top-up has already been reviewed")]
pub struct AlreadyReviewed;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("{0}")]
    AlreadyReviewed(#[from] AlreadyReviewed),
    #[error("{0}")]
    BalanceLimitExceeded(#[from] BalanceLimitExceeded),
}

#[derive(Debug, Clone)]
pub struct TopUp {
    pub id: Id,
    pub user_id: user::Id,
    pub amount: Amount,
    pub proof: Proof,
    pub reference: String,
    pub status: Status,
    pub created: DateTime<Utc>,
}

impl TopUp {
    /// Creates a new pending top-up.
    pub(crate) fn submit(
        grant: &auth::CustomerGrant,
        amount: Amount,
        proof: Proof,
        reference: &str,
    ) -> Result<Self, Error> {
        if !amount.is_positive() {
            return Err(AmountError::NotPositive.into());
        }
        if proof.0.trim().is_empty() {
            return Err(Error::MissingProof);
        }
        Ok(Self {
            id: Id(Uuid::new_v4()),
            user_id: grant.user_id,
            amount,
            proof,
            reference: reference.trim().to_owned(),
            status: Status::Pending,
            created: Utc::now(),
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    /// Approves the top-up. Unless `already_credited` is set, the wallet is credited with the
    /// top-up amount and the ledger entry recording the credit is returned. A credit the wallet
    /// cannot hold leaves both the top-up and the wallet untouched.
    pub(crate) fn approve(
        &mut self,
        grant: &auth::StaffGrant,
        note: Option<&str>,
        wallet: &mut Wallet,
        already_credited: bool,
    ) -> Result<Option<ledger::Entry>, ApprovalError> {
        if !self.is_pending() {
            return Err(AlreadyReviewed.into());
        }
        if self.user_id != wallet.user_id() {
            panic!(
                "top-up {:?} user id {:?} does not match wallet {:?} of {:?}",
                self.id,
                self.user_id,
                wallet.id(),
                wallet.user_id()
            );
        }
        let entry = if already_credited {
            None
        } else {
            Some(ledger::Entry::credit(
                wallet,
                self.amount,
                ledger::Cause::TopUp(self.id),
                format!("top-up approved by {}", grant.actor_id.0),
            )?)
        };
        self.status = Status::Approved(Review {
            reviewed_by: grant.actor_id,
            reviewed_at: Utc::now(),
            note: note.map(str::trim).unwrap_or_default().to_owned(),
        });
        Ok(entry)
    }

    /// Rejects the top-up. The wallet is not touched.
    pub(crate) fn reject(
        &mut self,
        grant: &auth::StaffGrant,
        note: Option<&str>,
    ) -> Result<(), AlreadyReviewed> {
        if !self.is_pending() {
            return Err(AlreadyReviewed);
        }
        let note = match note.map(str::trim) {
            Some(note) if !note.is_empty() => note.to_owned(),
            _ => DEFAULT_REJECTION_NOTE.to_owned(),
        };
        self.status = Status::Rejected(Review {
            reviewed_by: grant.actor_id,
            reviewed_at: Utc::now(),
            note,
        });
        Ok(())
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

    fn staff() -> auth::StaffGrant {
        auth::StaffGrant {
            token_id: TokenId(Uuid::new_v4()),
            actor_id: user::Id(Uuid::new_v4()),
        }
    }

    fn pending(amount: Amount) -> (TopUp, Wallet) {
        let grant = customer();
        let topup = TopUp::submit(&grant, amount, Proof("proofs/1.png".to_owned()), " ref-1 ")
            .unwrap();
        (topup, Wallet::new(grant.user_id))
    }

    #[test]
    fn submitted_top_up_is_pending() {
        let (topup, _) = pending(Amount::from_minor(5000));
        assert!(topup.is_pending());
        assert_eq!(topup.reference, "ref-1");
    }

    #[rstest]
    #[case(Amount::ZERO)]
    #[case(Amount::from_minor(-100))]
    fn submit_requires_positive_amount(#[case] amount: Amount) {
        let result = TopUp::submit(&customer(), amount, Proof("p".to_owned()), "");
        assert!(matches!(
            result,
            Err(Error::InvalidAmount(AmountError::NotPositive))
        ));
    }

    #[test]
    fn submit_requires_proof() {
        let result = TopUp::submit(&customer(), Amount::from_minor(1), Proof("  ".to_owned()), "");
        assert!(matches!(result, Err(Error::MissingProof)));
    }

    #[test]
    fn approval_credits_wallet_once() {
        let (mut topup, mut wallet) = pending(Amount::from_minor(5000));
        let staff = staff();

        let entry = topup
            .approve(&staff, Some("looks fine"), &mut wallet, false)
            .unwrap()
            .unwrap();
        assert_eq!(entry.amount, Amount::from_minor(5000));
        assert_eq!(entry.cause, ledger::Cause::TopUp(topup.id));
        assert_eq!(wallet.balance(), Amount::from_minor(5000));
        match &topup.status {
            Status::Approved(review) => {
                assert_eq!(review.reviewed_by, staff.actor_id);
                assert_eq!(review.note, "looks fine");
            }
            status => panic!("unexpected status {:?}", status),
        }

        assert_eq!(
            topup.approve(&staff, None, &mut wallet, false),
            Err(ApprovalError::AlreadyReviewed(AlreadyReviewed))
        );
        assert_eq!(wallet.balance(), Amount::from_minor(5000));
    }

    #[test]
    fn approval_with_existing_credit_only_finalizes_status() {
        let (mut topup, mut wallet) = pending(Amount::from_minor(5000));
        let entry = topup.approve(&staff(), None, &mut wallet, true).unwrap();
        assert!(entry.is_none());
        assert_eq!(wallet.balance(), Amount::ZERO);
        assert!(matches!(topup.status, Status::Approved(_)));
    }

    #[test]
    fn approval_past_the_balance_limit_stays_pending() {
        let (mut topup, mut wallet) = pending(Amount::from_minor(100));
        let full = Amount::from_minor(9_999_999_999_99);
        ledger::Entry::adjustment(&mut wallet, full, String::new()).unwrap();

        let result = topup.approve(&staff(), None, &mut wallet, false);
        assert_eq!(
            result,
            Err(ApprovalError::BalanceLimitExceeded(BalanceLimitExceeded {
                balance: full,
                credit: Amount::from_minor(100),
            }))
        );
        assert!(topup.is_pending());
        assert_eq!(wallet.balance(), full);
    }

    #[rstest]
    #[case(None, DEFAULT_REJECTION_NOTE)]
    #[case(Some("  "), DEFAULT_REJECTION_NOTE)]
    #[case(Some("blurry screenshot"), "blurry screenshot")]
    fn rejection_records_note(#[case] note: Option<&str>, #[case] expected: &str) {
        let (mut topup, _) = pending(Amount::from_minor(100));
        topup.reject(&staff(), note).unwrap();
        match topup.status {
            Status::Rejected(review) => assert_eq!(review.note, expected),
            status => panic!("unexpected status {:?}", status),
        }
    }

    #[test]
    fn rejected_top_up_cannot_be_approved() {
        let (mut topup, mut wallet) = pending(Amount::from_minor(100));
        topup.reject(&staff(), None).unwrap();
        assert_eq!(
            topup.approve(&staff(), None, &mut wallet, false),
            Err(ApprovalError::AlreadyReviewed(AlreadyReviewed))
        );
        assert_eq!(topup.reject(&staff(), None), Err(AlreadyReviewed));
        assert_eq!(wallet.balance(), Amount::ZERO);
    }

    #[test]
    #[should_panic(expected = "does not match wallet")]
    fn approving_into_a_foreign_wallet_is_a_bug() {
        let (mut topup, _) = pending(Amount::from_minor(100));
        let mut other = Wallet::new(user::Id(Uuid::new_v4()));
        let _ = topup.approve(&staff(), None, &mut other, false);
    }
}
