use chrono::Utc;
use model::entities::user;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::{debug, info, instrument};

use super::ServiceResult;

/// Identity claims forwarded by the external identity provider.
#[derive(Debug, Clone)]
pub struct IdentityClaims {
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
}

impl IdentityClaims {
    /// "First Last", or whichever part is present.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Resolves the identity to a local user, creating it on first sight.
///
/// Returns the user and whether it was created by this call. Existing users
/// are returned unchanged.
#[instrument(skip(db))]
pub async fn sync_user(db: &DatabaseConnection, claims: IdentityClaims) -> ServiceResult<(user::Model, bool)> {
    if let Some(existing) = user::Entity::find()
        .filter(user::Column::ExternalId.eq(claims.external_id.as_str()))
        .one(db)
        .await?
    {
        debug!("Identity {} maps to user {}", claims.external_id, existing.id);
        return Ok((existing, false));
    }

    let now = Utc::now();
    let created = user::ActiveModel {
        name: Set(claims.full_name()),
        external_id: Set(claims.external_id),
        email: Set(claims.email),
        image_url: Set(claims.image_url),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Created user {} for identity {}", created.id, created.external_id);
    Ok((created, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::setup_test_db;

    fn claims(external_id: &str) -> IdentityClaims {
        IdentityClaims {
            external_id: external_id.to_string(),
            email: format!("{external_id}@example.com"),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            image_url: None,
        }
    }

    #[test]
    fn test_full_name() {
        assert_eq!(claims("x").full_name().as_deref(), Some("Ada Lovelace"));

        let mut only_first = claims("x");
        only_first.last_name = Some("  ".to_string());
        assert_eq!(only_first.full_name().as_deref(), Some("Ada"));

        only_first.first_name = None;
        assert_eq!(only_first.full_name(), None);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let db = setup_test_db().await;

        let (first, created) = sync_user(&db, claims("idp_123")).await.unwrap();
        assert!(created);
        assert_eq!(first.name.as_deref(), Some("Ada Lovelace"));

        let (second, created) = sync_user(&db, claims("idp_123")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }
}
