use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, info};

use crate::models::{AccessDecision, AccessFacts, Capability, Role};
use crate::services::path_store::PathStore;

/// Decide access from the facts of one path. First match wins:
/// owner, then public read, then collaborator role.
pub fn resolve(facts: &AccessFacts, user_id: &str, capability: Capability) -> AccessDecision {
    let role = if facts.owner_id == user_id {
        Some(Role::Admin)
    } else if facts.is_public && capability == Capability::View {
        Some(Role::Viewer)
    } else {
        facts.collaborator_role(user_id)
    };

    match role {
        Some(role) if role.allows(capability) => AccessDecision::Granted(role),
        _ => AccessDecision::Denied,
    }
}

/// Resolves access against storage, caching the facts of each path for a bounded time.
pub struct AccessResolver {
    store: Arc<dyn PathStore>,
    cache: Cache<String, Arc<AccessFacts>>,
    // Bumped by every invalidation; loads that straddle a bump are not trusted
    epoch: AtomicU64,
}

impl AccessResolver {
    pub fn new(store: Arc<dyn PathStore>, ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        info!("Access cache initialized (ttl {}s)", ttl.as_secs());
        Self {
            store,
            cache,
            epoch: AtomicU64::new(0),
        }
    }

    /// Authorize `user_id` for `capability` on a path. Missing paths are denied.
    pub async fn authorize(
        &self,
        user_id: &str,
        path_id: &str,
        capability: Capability,
    ) -> Result<AccessDecision, crate::models::SyncError> {
        let decision = match self.facts(path_id).await? {
            Some(facts) => resolve(&facts, user_id, capability),
            None => AccessDecision::Denied,
        };
        debug!(user_id = %user_id, path_id = %path_id, capability = %capability, decision = ?decision, "Access resolved");
        Ok(decision)
    }

    async fn facts(&self, path_id: &str) -> Result<Option<Arc<AccessFacts>>, crate::models::SyncError> {
        if let Some(facts) = self.cache.get(path_id).await {
            return Ok(Some(facts));
        }

        debug!("Access cache miss for path {}. Loading from storage.", path_id);
        loop {
            let epoch = self.epoch.load(Ordering::SeqCst);
            let Some(facts) = self.store.get_access_facts(path_id).await? else {
                return Ok(None);
            };
            if self.epoch.load(Ordering::SeqCst) != epoch {
                debug!("Access facts of path {} changed while loading; reloading", path_id);
                continue;
            }

            let facts = Arc::new(facts);
            self.cache.insert(path_id.to_string(), facts.clone()).await;
            // An invalidation may have landed between the check and the insert
            if self.epoch.load(Ordering::SeqCst) != epoch {
                self.cache.invalidate(path_id).await;
                continue;
            }
            return Ok(Some(facts));
        }
    }

    /// Drop the cached facts of a path after a collaborator change.
    pub async fn invalidate(&self, path_id: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate(path_id).await;
        info!("Access cache invalidated for path {}", path_id);
    }

    pub async fn cached_paths(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Collaborator, Node, NodeDraft, NodePatch, SyncError};
    use crate::services::path_store::InMemoryPathStore;
    use crate::ws::tree::NodeTree;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    /// Holds the first access-facts load open after it has read storage.
    struct HeldStore {
        inner: Arc<InMemoryPathStore>,
        hold: AtomicBool,
        loaded: Notify,
        release: Notify,
    }

    impl PathStore for HeldStore {
        fn get_access_facts<'a>(&'a self, path_id: &'a str) -> BoxFuture<'a, Result<Option<AccessFacts>, SyncError>> {
            async move {
                let facts = self.inner.get_access_facts(path_id).await?;
                if self.hold.swap(false, Ordering::SeqCst) {
                    self.loaded.notify_one();
                    self.release.notified().await;
                }
                Ok(facts)
            }
            .boxed()
        }

        fn get_node_tree<'a>(&'a self, path_id: &'a str) -> BoxFuture<'a, Result<NodeTree, SyncError>> {
            self.inner.get_node_tree(path_id)
        }

        fn apply_node_patch<'a>(
            &'a self,
            path_id: &'a str,
            node_id: &'a str,
            patch: &'a NodePatch,
        ) -> BoxFuture<'a, Result<Option<Node>, SyncError>> {
            self.inner.apply_node_patch(path_id, node_id, patch)
        }

        fn create_node<'a>(
            &'a self,
            path_id: &'a str,
            parent_id: Option<&'a str>,
            draft: &'a NodeDraft,
        ) -> BoxFuture<'a, Result<Node, SyncError>> {
            self.inner.create_node(path_id, parent_id, draft)
        }

        fn delete_node<'a>(&'a self, path_id: &'a str, node_id: &'a str) -> BoxFuture<'a, Result<u64, SyncError>> {
            self.inner.delete_node(path_id, node_id)
        }
    }

    fn facts(is_public: bool, collaborators: &[(&str, Role)]) -> AccessFacts {
        AccessFacts {
            owner_id: "owner".to_string(),
            is_public,
            collaborators: collaborators
                .iter()
                .map(|(id, role)| Collaborator {
                    user_id: id.to_string(),
                    role: *role,
                })
                .collect(),
        }
    }

    #[test]
    fn test_owner_is_admin_everywhere() {
        let f = facts(false, &[]);
        for cap in [Capability::View, Capability::Edit, Capability::ManageCollaborators] {
            assert_eq!(resolve(&f, "owner", cap), AccessDecision::Granted(Role::Admin));
        }
    }

    #[test]
    fn test_public_grants_view_only() {
        let f = facts(true, &[]);
        assert_eq!(resolve(&f, "stranger", Capability::View), AccessDecision::Granted(Role::Viewer));
        assert_eq!(resolve(&f, "stranger", Capability::Edit), AccessDecision::Denied);
        assert_eq!(resolve(&f, "stranger", Capability::ManageCollaborators), AccessDecision::Denied);
    }

    #[test]
    fn test_collaborator_roles_against_capabilities() {
        let f = facts(false, &[("v", Role::Viewer), ("e", Role::Editor), ("a", Role::Admin)]);
        let table = [
            ("v", Capability::View, true),
            ("v", Capability::Edit, false),
            ("v", Capability::ManageCollaborators, false),
            ("e", Capability::View, true),
            ("e", Capability::Edit, true),
            ("e", Capability::ManageCollaborators, false),
            ("a", Capability::View, true),
            ("a", Capability::Edit, true),
            ("a", Capability::ManageCollaborators, true),
        ];
        for (user, cap, granted) in table {
            assert_eq!(resolve(&f, user, cap).is_granted(), granted, "{} {}", user, cap);
        }
    }

    #[test]
    fn test_public_path_still_uses_collaborator_role_for_edit() {
        let f = facts(true, &[("e", Role::Editor), ("v", Role::Viewer)]);
        assert_eq!(resolve(&f, "e", Capability::Edit), AccessDecision::Granted(Role::Editor));
        assert_eq!(resolve(&f, "v", Capability::Edit), AccessDecision::Denied);
    }

    #[test]
    fn test_stranger_on_private_path_is_denied() {
        let f = facts(false, &[("e", Role::Editor)]);
        assert_eq!(resolve(&f, "stranger", Capability::View), AccessDecision::Denied);
    }

    #[tokio::test]
    async fn test_cached_facts_until_invalidated() {
        let store = Arc::new(InMemoryPathStore::new());
        store.insert_path("P1", "alice", false).await;
        store.set_collaborator("P1", "bob", Some(Role::Editor)).await;
        let resolver = AccessResolver::new(store.clone(), Duration::from_secs(30), 100);

        assert!(resolver.authorize("bob", "P1", Capability::Edit).await.unwrap().is_granted());

        // Demotion is invisible until the cache entry is evicted
        store.set_collaborator("P1", "bob", Some(Role::Viewer)).await;
        assert!(resolver.authorize("bob", "P1", Capability::Edit).await.unwrap().is_granted());

        resolver.invalidate("P1").await;
        assert_eq!(
            resolver.authorize("bob", "P1", Capability::Edit).await.unwrap(),
            AccessDecision::Denied
        );
        assert!(resolver.authorize("bob", "P1", Capability::View).await.unwrap().is_granted());
    }

    #[tokio::test]
    async fn test_cached_facts_expire() {
        let store = Arc::new(InMemoryPathStore::new());
        store.insert_path("P1", "alice", true).await;
        let resolver = AccessResolver::new(store.clone(), Duration::from_millis(50), 100);

        assert!(resolver.authorize("carol", "P1", Capability::View).await.unwrap().is_granted());
        store.set_public("P1", false).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(
            resolver.authorize("carol", "P1", Capability::View).await.unwrap(),
            AccessDecision::Denied
        );
    }

    #[tokio::test]
    async fn test_missing_path_is_denied() {
        let store = Arc::new(InMemoryPathStore::new());
        let resolver = AccessResolver::new(store, Duration::from_secs(30), 100);
        assert_eq!(
            resolver.authorize("alice", "nope", Capability::View).await.unwrap(),
            AccessDecision::Denied
        );
    }

    #[tokio::test]
    async fn test_load_racing_an_invalidation_is_not_cached() {
        let inner = Arc::new(InMemoryPathStore::new());
        inner.insert_path("P1", "alice", false).await;
        inner.set_collaborator("P1", "bob", Some(Role::Editor)).await;
        let store = Arc::new(HeldStore {
            inner: inner.clone(),
            hold: AtomicBool::new(true),
            loaded: Notify::new(),
            release: Notify::new(),
        });
        let resolver = Arc::new(AccessResolver::new(store.clone(), Duration::from_secs(30), 100));

        let pending = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.authorize("bob", "P1", Capability::Edit).await })
        };
        // The load has read bob as an editor and is held there
        store.loaded.notified().await;
        inner.set_collaborator("P1", "bob", Some(Role::Viewer)).await;
        resolver.invalidate("P1").await;
        store.release.notify_one();

        assert_eq!(pending.await.unwrap().unwrap(), AccessDecision::Denied);
        assert_eq!(
            resolver.authorize("bob", "P1", Capability::Edit).await.unwrap(),
            AccessDecision::Denied
        );
        assert!(resolver.authorize("bob", "P1", Capability::View).await.unwrap().is_granted());
    }
}
