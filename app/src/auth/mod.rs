use crate::database::{self, Database};

mod entities;

pub use entities::{AccessDenied, CustomerGrant, StaffGrant, TokenHash, TokenId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    AccessDenied(#[from] AccessDenied),
    #[error("{0}")]
    Storage(#[from] database::Error),
}

pub async fn get_customer_grant(db: &Database, token: &str) -> Result<CustomerGrant, Error> {
    Ok(queries::get_token(db, token)
        .await?
        .ok_or(AccessDenied)?
        .customer_grant()?)
}

pub async fn get_staff_grant(db: &Database, token: &str) -> Result<StaffGrant, Error> {
    Ok(queries::get_token(db, token)
        .await?
        .ok_or(AccessDenied)?
        .staff_grant()?)
}

mod queries {
    use super::entities::Token;
    use super::{TokenHash, TokenId};
    use crate::{
        database::{self, Database},
        user,
    };
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    pub(super) async fn get_token(
        db: &Database,
        token: &str,
    ) -> Result<Option<Token>, database::Error> {
        let token_hash = TokenHash::generate(token);
        Ok(sqlx::query_as::<_, TokenRow>(
            r#"SELECT auth_tokens.id, auth_tokens.user_id, users.is_staff, auth_tokens.disabled
                FROM auth_tokens JOIN users ON users.id = auth_tokens.user_id
                WHERE auth_tokens.token_hash = $1"#,
        )
        .bind(token_hash.as_str())
        .fetch_optional(db)
        .await?
        .map(|row| row.into_entity()))
    }

    #[derive(Debug, sqlx::FromRow)]
    struct TokenRow {
        id: Uuid,
        user_id: Uuid,
        is_staff: bool,
        disabled: Option<DateTime<Utc>>,
    }

    impl TokenRow {
        fn into_entity(self) -> Token {
            Token {
                id: TokenId(self.id),
                user_id: user::Id(self.user_id),
                is_staff: self.is_staff,
                disabled: self.disabled,
            }
        }
    }
}
