use async_trait::async_trait;

use super::PgStore;
use crate::models::{NewUser, User};
use crate::store::{StoreError, StoreResult, UserStore};

const UNIQUE_VIOLATION: &str = "23505";

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (name, email, password_hash)
             VALUES ($1, $2, $3)
             RETURNING id, name, email, password_hash, created_at",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(e)
                if e.as_database_error()
                    .and_then(|db| db.code())
                    .is_some_and(|code| code == UNIQUE_VIOLATION) =>
            {
                Err(StoreError::Duplicate(format!("user with email {}", user.email)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
