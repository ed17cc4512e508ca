//! Password authentication against the user store.

use crate::database::Database;
use crate::models::User;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("unknown user")]
    UnknownUser,
    #[error("invalid credentials")]
    WrongPassword,
    #[error("user is not active")]
    Inactive,
    #[error("authentication backend failure: {0}")]
    Backend(String),
}

/// Verify a username/password pair and return the matching identity.
/// Comparison is plain byte equality; credential hashing is handled by
/// whoever provisions the store.
pub async fn authenticate(db: &Database, username: &str, password: &str) -> Result<User, AuthError> {
    let user = db
        .get_user_by_name(username)
        .await
        .map_err(|error| AuthError::Backend(format!("{error:#}")))?
        .ok_or(AuthError::UnknownUser)?;
    if user.password.as_bytes() != password.as_bytes() {
        return Err(AuthError::WrongPassword);
    }
    if !user.active {
        return Err(AuthError::Inactive);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{AuthError, authenticate};
    use crate::database::Database;
    use crate::models::User;

    async fn seeded_database(dir: &tempfile::TempDir) -> Database {
        let db = Database::connect(&dir.path().join("auth.db")).await.unwrap();
        db.add_user(&User {
            id: 0,
            name: "Alice".into(),
            username: "alice".into(),
            password: "p".into(),
            created: Utc::now(),
            active: true,
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn accepts_valid_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_database(&dir).await;
        let user = authenticate(&db, "alice", "p").await.unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn rejects_wrong_password_and_unknown_user() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_database(&dir).await;
        assert!(matches!(
            authenticate(&db, "alice", "wrong").await,
            Err(AuthError::WrongPassword)
        ));
        assert!(matches!(
            authenticate(&db, "mallory", "p").await,
            Err(AuthError::UnknownUser)
        ));
    }

    #[tokio::test]
    async fn rejects_deactivated_user() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_database(&dir).await;
        let mut user = db.get_user_by_name("alice").await.unwrap().unwrap();
        user.active = false;
        db.update_user(&user).await.unwrap();
        assert!(matches!(
            authenticate(&db, "alice", "p").await,
            Err(AuthError::Inactive)
        ));
    }
}
