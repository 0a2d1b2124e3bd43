use super::{Database, Error, Transaction};
use crate::auth;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Seeds two customers and one staff member with well-known tokens:
/// `customer_1`, `customer_2`, `staff_3` and the disabled `disabled_1`.
pub async fn seed_development_data(db: &Database) -> Result<(), Error> {
    let mut data_tx = db.begin().await?;
    seed_test_user(&mut data_tx, 1, false).await?;
    seed_test_user(&mut data_tx, 2, false).await?;
    seed_test_user(&mut data_tx, 3, true).await?;
    data_tx.commit().await?;
    Ok(())
}

async fn seed_test_user(data_tx: &mut Transaction, index: u128, is_staff: bool) -> Result<(), Error> {
    let row = sqlx::query(r#"SELECT id FROM users WHERE id = $1"#)
        .bind(Uuid::from_u128(index))
        .fetch_optional(&mut *data_tx)
        .await?;
    if row.is_some() {
        return Ok(());
    }
    log::info!("seeding test user {}", index);
    sqlx::query("INSERT INTO users (id, email, is_staff, created) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::from_u128(index))
        .bind(format!("test-{}@user.net", index))
        .bind(is_staff)
        .bind(Utc::now())
        .execute(&mut *data_tx)
        .await?;
    let role = if is_staff { "staff" } else { "customer" };
    seed_token(data_tx, index, 1, &format!("{}_{}", role, index), None).await?;
    seed_token(data_tx, index, 2, &format!("disabled_{}", index), Some(Utc::now())).await?;
    Ok(())
}

async fn seed_token(
    data_tx: &mut Transaction,
    index: u128,
    token_index: u128,
    token: &str,
    disabled: Option<DateTime<Utc>>,
) -> Result<(), Error> {
    sqlx::query(
        r#"INSERT INTO auth_tokens (id, user_id, name, token_hash, created, disabled)
            VALUES($1, $2, $3, $4, $5, $6)"#,
    )
    .bind(Uuid::from_u128(index * 100 + token_index))
    .bind(Uuid::from_u128(index))
    .bind(token)
    .bind(auth::TokenHash::generate(token).as_str())
    .bind(Utc::now())
    .bind(disabled)
    .execute(&mut *data_tx)
    .await?;
    Ok(())
}
