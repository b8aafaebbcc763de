//! User identity - resolves external messaging-platform ids to internal users.

use crate::{
    entities::{User, user},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, prelude::*, sea_query::OnConflict};
use tracing::info;

/// Finds a user by internal id.
pub async fn get_user_by_id<C>(db: &C, user_id: i64) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Finds a user by internal id, failing with [`Error::UserNotFound`] if missing.
pub async fn require_user<C>(db: &C, user_id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    get_user_by_id(db, user_id)
        .await?
        .ok_or(Error::UserNotFound { user_id })
}

/// Finds a user by the messaging platform's identifier.
pub async fn get_user_by_external_id(
    db: &DatabaseConnection,
    external_id: &str,
) -> Result<Option<user::Model>> {
    User::find()
        .filter(user::Column::ExternalId.eq(external_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Registers a user with an optional referrer, or returns the existing user.
///
/// The referrer is only recorded on first registration; an existing user's
/// attribution is never changed.
pub async fn register_user(
    db: &DatabaseConnection,
    external_id: &str,
    referrer_id: Option<i64>,
) -> Result<user::Model> {
    if external_id.trim().is_empty() {
        return Err(Error::Config {
            message: "External user id cannot be empty".to_string(),
        });
    }

    if let Some(referrer_id) = referrer_id {
        require_user(db, referrer_id).await?;
    }

    let new_user = user::ActiveModel {
        external_id: Set(external_id.to_string()),
        referrer_id: Set(referrer_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    // Concurrent first requests from the same person race on the unique index
    let inserted = User::insert(new_user)
        .on_conflict(
            OnConflict::column(user::Column::ExternalId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    if inserted > 0 {
        info!("Registered user with external id {}", external_id);
    }

    get_user_by_external_id(db, external_id)
        .await?
        .ok_or_else(|| Error::Config {
            message: format!("User {external_id} vanished after registration"),
        })
}

/// Resolves an external id to the internal user, creating it on first contact.
pub async fn resolve_user(db: &DatabaseConnection, external_id: &str) -> Result<user::Model> {
    if let Some(existing) = get_user_by_external_id(db, external_id).await? {
        return Ok(existing);
    }
    register_user(db, external_id, None).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_resolve_user_is_stable() -> Result<()> {
        let db = setup_test_db().await?;

        let first = resolve_user(&db, "tg:1001").await?;
        let second = resolve_user(&db, "tg:1001").await?;
        assert_eq!(first.id, second.id);

        let other = resolve_user(&db, "tg:1002").await?;
        assert_ne!(first.id, other.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_register_user_keeps_first_referrer() -> Result<()> {
        let db = setup_test_db().await?;
        let referrer = resolve_user(&db, "tg:ref").await?;

        let referred = register_user(&db, "tg:new", Some(referrer.id)).await?;
        assert_eq!(referred.referrer_id, Some(referrer.id));

        let again = register_user(&db, "tg:new", None).await?;
        assert_eq!(again.id, referred.id);
        assert_eq!(again.referrer_id, Some(referrer.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_register_user_rejects_unknown_referrer() -> Result<()> {
        let db = setup_test_db().await?;
        let result = register_user(&db, "tg:new", Some(9_999)).await;
        assert!(matches!(result, Err(Error::UserNotFound { user_id: 9_999 })));
        assert!(get_user_by_external_id(&db, "tg:new").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_require_user_missing() -> Result<()> {
        let db = setup_test_db().await?;
        let result = require_user(&db, 42).await;
        assert!(matches!(result, Err(Error::UserNotFound { user_id: 42 })));
        Ok(())
    }
}
