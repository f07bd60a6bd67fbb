use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::otp::CodePair;
use crate::error::ApiError;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub bio: Option<String>,
    pub verified: bool,
    #[serde(skip_serializing)]
    pub otp_code: Option<String>,
    #[serde(skip_serializing)]
    pub otp_expires_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub role: Role,
    pub avatar_url: String,
    #[serde(skip_serializing)]
    pub avatar_external_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Insert parameters for a fresh, unverified account.
pub struct NewUser<'a> {
    pub user_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub otp: &'a CodePair,
    pub avatar_url: &'a str,
    pub avatar_external_id: Option<&'a str>,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Default)]
pub struct ProfilePatch<'a> {
    pub user_name: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub bio: Option<&'a str>,
}

const USER_COLUMNS: &str = r#"
    id, user_name, email, password_hash, first_name, last_name, gender, bio,
    verified, otp_code, otp_expires_at, reset_token, reset_token_expires_at,
    role, avatar_url, avatar_external_id, created_at, updated_at
"#;

fn map_unique_violation(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some("users_user_name_key") => ApiError::DuplicateCredential("Username"),
                Some("users_email_key") => ApiError::DuplicateCredential("Email"),
                _ => ApiError::DuplicateCredential("Account"),
            };
        }
    }
    e.into()
}

impl User {
    /// Pending email-verification code, if any.
    pub fn otp(&self) -> Option<CodePair> {
        CodePair::from_columns(self.otp_code.clone(), self.otp_expires_at)
    }

    /// Pending password-reset token, if any.
    pub fn reset(&self) -> Option<CodePair> {
        CodePair::from_columns(self.reset_token.clone(), self.reset_token_expires_at)
    }

    /// Create a new unverified user with a pending OTP. Concurrent claims of
    /// the same name or email surface as a duplicate-credential error via the
    /// unique constraints.
    pub async fn create(db: &PgPool, new: NewUser<'_>) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (user_name, email, password_hash, first_name, last_name,
                               gender, bio, otp_code, otp_expires_at, avatar_url,
                               avatar_external_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(new.user_name)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(new.gender)
        .bind(new.bio)
        .bind(&new.otp.code)
        .bind(new.otp.expires_at)
        .bind(new.avatar_url)
        .bind(new.avatar_external_id)
        .fetch_one(db)
        .await
        .map_err(map_unique_violation)?;
        Ok(user)
    }

    /// Find a user by id.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id = $1
            "#,
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE email = $1
            "#,
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by user name.
    pub async fn find_by_user_name(
        db: &PgPool,
        user_name: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE user_name = $1
            "#,
        ))
        .bind(user_name)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Apply a partial profile update. A renamed user name races against the
    /// unique constraint the same way creation does.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        patch: ProfilePatch<'_>,
    ) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET user_name = COALESCE($2, user_name),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                gender = COALESCE($5, gender),
                bio = COALESCE($6, bio),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(patch.user_name)
        .bind(patch.first_name)
        .bind(patch.last_name)
        .bind(patch.gender)
        .bind(patch.bio)
        .fetch_optional(db)
        .await
        .map_err(map_unique_violation)?;
        Ok(user)
    }

    /// Delete the account, returning the removed row so callers can clean up
    /// attached storage.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            DELETE FROM users
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Store a fresh email-verification code.
    pub async fn set_otp(db: &PgPool, id: Uuid, otp: &CodePair) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET otp_code = $2, otp_expires_at = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&otp.code)
        .bind(otp.expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Flip the account to verified and clear the consumed code.
    pub async fn mark_verified(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET verified = TRUE, otp_code = NULL, otp_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Store a fresh password-reset token.
    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        token: &CodePair,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2, reset_token_expires_at = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&token.code)
        .bind(token.expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Atomically swap the password for whoever holds a live reset token.
    /// The single conditional update both consumes the token and rejects
    /// stale or unknown ones; `None` means no live token matched.
    pub async fn consume_reset_token(
        db: &PgPool,
        token: &str,
        password_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2, reset_token = NULL, reset_token_expires_at = NULL,
                updated_at = now()
            WHERE reset_token = $1 AND reset_token_expires_at > now()
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(token)
        .bind(password_hash)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"admin\"").unwrap(),
            Role::Admin
        );
    }

    #[test]
    fn role_defaults_to_user() {
        assert_eq!(Role::default(), Role::User);
    }

    #[tokio::test]
    #[ignore] // needs a running Postgres reachable through DATABASE_URL
    async fn consumed_reset_token_cannot_match_again() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect(&url)
            .await
            .expect("connect");
        sqlx::migrate!("./migrations").run(&db).await.expect("migrate");

        // Leftovers from an earlier aborted run would break the insert.
        sqlx::query("DELETE FROM users WHERE email = $1")
            .bind("reset_single_use@x.com")
            .execute(&db)
            .await
            .expect("cleanup");

        let now = OffsetDateTime::now_utc();
        let otp = CodePair {
            code: "111111".into(),
            expires_at: now + time::Duration::minutes(60),
        };
        let user = User::create(
            &db,
            NewUser {
                user_name: "reset_single_use",
                email: "reset_single_use@x.com",
                password_hash: "$argon2id$old",
                first_name: None,
                last_name: None,
                gender: None,
                bio: None,
                otp: &otp,
                avatar_url: "https://cdn.test/default.png",
                avatar_external_id: None,
            },
        )
        .await
        .expect("create");

        let token = CodePair {
            code: "222222".into(),
            expires_at: now + time::Duration::minutes(60),
        };
        User::set_reset_token(&db, user.id, &token)
            .await
            .expect("set token");

        let first = User::consume_reset_token(&db, "222222", "$argon2id$new")
            .await
            .expect("consume");
        let first = first.expect("live token matches once");
        assert!(first.reset_token.is_none());
        assert!(first.reset_token_expires_at.is_none());

        let second = User::consume_reset_token(&db, "222222", "$argon2id$newer")
            .await
            .expect("consume again");
        assert!(second.is_none(), "a consumed token must never match again");

        User::delete(&db, user.id).await.expect("delete");
    }
}
