pub mod auth;
pub mod concurrency;
pub mod database;
pub mod ledger;
pub mod money;
pub mod order;
pub mod topup;
pub mod user;
pub mod wallet;

#[derive(Debug, Clone, Copy)]
pub struct QueryRange {
    pub limit: i64,
    pub offset: i64,
}
