use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::db::{
    helpers::{format_datetime, parse_datetime},
    Database,
};
use crate::store::{AuthProvider, AuthSession, AuthUser, Credentials, StoreError};

const SESSION_TTL_MINUTES: i64 = 60;
const MIN_PASSWORD_LEN: usize = 6;
const INVALID_CREDENTIALS: &str = "Invalid login credentials";

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

struct StoredUser {
    user: AuthUser,
    password_hash: String,
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<StoredUser> {
    let created_at: String = row.get("created_at")?;
    Ok(StoredUser {
        user: AuthUser {
            id: row.get("id")?,
            email: row.get("email")?,
            created_at: parse_datetime(&created_at, "auth_users.created_at")?,
        },
        password_hash: row.get("password_hash")?,
    })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue_session(user: AuthUser) -> AuthSession {
    AuthSession {
        access_token: Uuid::new_v4().simple().to_string(),
        user,
        expires_at: Utc::now() + Duration::minutes(SESSION_TTL_MINUTES),
    }
}

impl Database {
    async fn find_user(&self, email: String) -> Result<Option<StoredUser>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, password_hash, created_at FROM auth_users WHERE email = ?1",
            )?;
            let user = stmt
                .query_row(params![email], |row| Ok(row_to_user(row)))
                .optional()
                .context("failed to look up user")?
                .transpose()?;
            Ok(user)
        })
        .await
    }
}

#[async_trait]
impl AuthProvider for Database {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, StoreError> {
        let Some(stored) = self.find_user(normalize_email(&credentials.email)).await? else {
            return Err(StoreError::authentication(INVALID_CREDENTIALS));
        };

        let password = credentials.password.clone();
        let hash = stored.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|err| anyhow!("password check task failed: {err}"))?
            .map_err(|err| StoreError::authentication(format!("stored hash unusable: {err}")))?;

        if !verified {
            return Err(StoreError::authentication(INVALID_CREDENTIALS));
        }

        let session = issue_session(stored.user);
        *self.session_guard() = Some(session.clone());
        log::info!("Signed in as {}", session.user.email);
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<AuthUser, StoreError> {
        let email = normalize_email(&credentials.email);
        if email.is_empty() || !email.contains('@') {
            return Err(StoreError::authentication(format!(
                "Unable to validate email address: {}",
                credentials.email
            )));
        }
        if credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(StoreError::authentication(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.find_user(email.clone()).await?.is_some() {
            return Err(StoreError::authentication("User already registered"));
        }

        let password = credentials.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, HASH_COST))
            .await
            .map_err(|err| anyhow!("password hash task failed: {err}"))?
            .context("failed to hash password")?;

        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email,
            // Stored timestamps keep microseconds.
            created_at: Utc::now().trunc_subsecs(6),
        };

        let record = user.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO auth_users (id, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.email,
                    password_hash,
                    format_datetime(record.created_at)
                ],
            )
            .context("failed to insert user")?;
            Ok(())
        })
        .await?;

        log::info!("Registered user {}", user.email);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        if let Some(session) = self.session_guard().take() {
            log::info!("Signed out {}", session.user.email);
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, StoreError> {
        let guard = self.session_guard();
        Ok(guard
            .as_ref()
            .filter(|session| !session.is_expired(Utc::now()))
            .map(|session| session.user.clone()))
    }

    async fn refresh_session(&self) -> Result<AuthSession, StoreError> {
        let mut guard = self.session_guard();
        let Some(current) = guard.as_ref() else {
            return Err(StoreError::authentication("No active session to refresh"));
        };

        let refreshed = issue_session(current.user.clone());
        *guard = Some(refreshed.clone());
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_yields_a_live_session() {
        let db = Database::in_memory().unwrap();
        let creds = credentials("Operator@Mill.test", "loom-secret");

        let user = db.sign_up(&creds).await.unwrap();
        assert_eq!(user.email, "operator@mill.test");
        assert_eq!(user.created_at.timestamp_subsec_nanos() % 1_000, 0);
        assert_eq!(db.current_user().await.unwrap(), None);

        let session = db.sign_in(&creds).await.unwrap();
        assert_eq!(session.user, user);
        assert!(!session.is_expired(Utc::now()));
        assert_eq!(db.current_user().await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_authentication_errors() {
        let db = Database::in_memory().unwrap();
        db.sign_up(&credentials("a@mill.test", "correct-horse"))
            .await
            .unwrap();

        let wrong = db
            .sign_in(&credentials("a@mill.test", "battery-staple"))
            .await
            .unwrap_err();
        assert_eq!(wrong, StoreError::authentication(INVALID_CREDENTIALS));

        let unknown = db
            .sign_in(&credentials("b@mill.test", "correct-horse"))
            .await
            .unwrap_err();
        assert_eq!(unknown, StoreError::authentication(INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn sign_up_validates_input_and_rejects_duplicates() {
        let db = Database::in_memory().unwrap();

        assert!(matches!(
            db.sign_up(&credentials("a@mill.test", "123")).await,
            Err(StoreError::Authentication { .. })
        ));
        assert!(matches!(
            db.sign_up(&credentials("not-an-email", "123456")).await,
            Err(StoreError::Authentication { .. })
        ));

        db.sign_up(&credentials("a@mill.test", "123456")).await.unwrap();
        let duplicate = db
            .sign_up(&credentials("A@mill.test", "654321"))
            .await
            .unwrap_err();
        assert_eq!(duplicate.to_string(), "User already registered");
    }

    #[tokio::test]
    async fn refresh_rotates_token_and_sign_out_clears_session() {
        let db = Database::in_memory().unwrap();
        let creds = credentials("a@mill.test", "123456");
        assert!(db.refresh_session().await.is_err());

        db.sign_up(&creds).await.unwrap();
        let first = db.sign_in(&creds).await.unwrap();
        let refreshed = db.refresh_session().await.unwrap();
        assert_ne!(first.access_token, refreshed.access_token);
        assert!(refreshed.expires_at >= first.expires_at);

        db.sign_out().await.unwrap();
        assert_eq!(db.current_user().await.unwrap(), None);
    }
}
