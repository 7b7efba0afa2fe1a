//! Caches the users behind discord.py moderation events.

use std::collections::HashMap;
use std::sync::Arc;

use delegate::delegate;
use tokio::sync::Mutex;

use crate::serenity;
use serenity::User;
use serenity::UserId;

/// Users seen as moderators in the mod log, keyed by id.
/// Internally uses an [Arc], so it's cheap to clone.
#[derive(Debug, Default, Clone)]
pub struct ModeratorCache {
    #[allow(clippy::missing_docs_in_private_items)]
    inner: Arc<Mutex<HashMap<UserId, User>>>,
}

impl ModeratorCache {
    /// Clone the cached user.
    pub async fn get(&self, id: UserId) -> Option<User> {
        let map = self.inner.lock().await;
        map.get(&id).cloned()
    }

    /// Look up a moderator, asking discord when they aren't cached yet.
    pub async fn get_or_fetch(
        &self,
        http: impl serenity::CacheHttp,
        id: UserId,
    ) -> Option<User> {
        if let Some(user) = self.get(id).await {
            return Some(user);
        }

        match id.to_user(http).await {
            Ok(user) => {
                self.insert(id, user.clone()).await;
                Some(user)
            }
            Err(e) => {
                tracing::debug!("Couldn't fetch moderator {id}: {e}");
                None
            }
        }
    }

    delegate! {
        to self.inner.lock().await {
            /// Cache a user.
            #[await(false)]
            pub async fn insert(&self, id: UserId, user: User) -> Option<User>;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_one_cache() {
        let cache = ModeratorCache::default();
        let other = cache.clone();

        let mut user = User::default();
        user.id = UserId::new(7);
        user.name = "danny".to_string();

        assert!(other.insert(user.id, user.clone()).await.is_none());

        assert_eq!(cache.get(UserId::new(7)).await.unwrap().name, "danny");
        assert!(cache.get(UserId::new(8)).await.is_none());
        // Inserting again hands back the old entry.
        assert!(cache.insert(user.id, user).await.is_some());
    }
}
