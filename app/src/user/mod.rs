//! Users are owned by the account collaborator; this module only knows what the wallet engine
//! needs: identity and whether the user is staff.

use crate::database::{self, Database};
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

mod entities;

pub use entities::{Email, Id, User};

#[derive(Debug, Error)]
pub enum Error {
    #[error("User being created already exists")]
    UserAlreadyExists,
    #[error("{0}")]
    Storage(#[from] database::Error),
}

pub async fn get(db: &Database, id: Id) -> Result<Option<User>, database::Error> {
    queries::get(db, id).await
}

/// Registers a user. Called by the account collaborator and by the development seeder.
pub async fn create(db: &Database, email: Email, is_staff: bool) -> Result<User, Error> {
    let user = User {
        id: Id(Uuid::new_v4()),
        email: Email::normalized(&email.0),
        is_staff,
        created: Utc::now(),
    };
    match queries::insert(db, &user).await {
        Ok(()) => Ok(user),
        Err(database::Error::Conflict(_)) => Err(Error::UserAlreadyExists),
        Err(e) => Err(e.into()),
    }
}

mod queries {
    use super::{Email, Id, User};
    use crate::database::{self, Database};
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    pub(super) async fn get(db: &Database, id: Id) -> Result<Option<User>, database::Error> {
        Ok(sqlx::query_as::<_, UserRow>(
            "SELECT id, email, is_staff, created FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(db)
        .await?
        .map(|row| row.into_entity()))
    }

    pub(super) async fn insert(db: &Database, user: &User) -> Result<(), database::Error> {
        sqlx::query("INSERT INTO users (id, email, is_staff, created) VALUES ($1, $2, $3, $4)")
            .bind(user.id.0)
            .bind(&user.email.0)
            .bind(user.is_staff)
            .bind(user.created)
            .execute(db)
            .await?;
        Ok(())
    }

    #[derive(sqlx::FromRow, Debug)]
    struct UserRow {
        id: Uuid,
        email: String,
        is_staff: bool,
        created: DateTime<Utc>,
    }

    impl UserRow {
        fn into_entity(self) -> User {
            User {
                id: Id(self.id),
                email: Email(self.email),
                is_staff: self.is_staff,
                created: self.created,
            }
        }
    }
}
