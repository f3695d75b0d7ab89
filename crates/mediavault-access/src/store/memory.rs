//! In-memory repository for tests and single-node development

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    CollectionDirectory, CollectionRoles, IpGroupResolver, NetworkGroup, Resource, ResourceStore,
    StoreError,
};

#[derive(Default)]
struct Inner {
    resources: HashMap<String, Resource>,
    collections: HashMap<String, CollectionRoles>,
    ip_groups: HashMap<IpAddr, Vec<NetworkGroup>>,
}

/// Implements all three repository traits over shared in-process maps.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_resource(&self, resource: Resource) {
        let mut inner = self.inner.write().await;
        inner.resources.insert(resource.id.clone(), resource);
    }

    pub async fn insert_collection(&self, collection_id: &str, roles: CollectionRoles) {
        let mut inner = self.inner.write().await;
        inner.collections.insert(collection_id.to_string(), roles);
    }

    pub async fn insert_ip_group(&self, ip: IpAddr, group: NetworkGroup) {
        let mut inner = self.inner.write().await;
        inner.ip_groups.entry(ip).or_default().push(group);
    }

    /// Current read groups of a resource; empty set for unknown ids.
    pub async fn read_groups(&self, id: &str) -> BTreeSet<String> {
        let inner = self.inner.read().await;
        inner
            .resources
            .get(id)
            .map(|r| r.read_groups.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceStore for MemoryRepository {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.resources.contains_key(id))
    }

    async fn load(&self, id: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self.inner.read().await.resources.get(id).cloned())
    }

    async fn save(&self, resource: &Resource) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .resources
            .insert(resource.id.clone(), resource.clone());
        Ok(())
    }
}

#[async_trait]
impl CollectionDirectory for MemoryRepository {
    async fn roles(&self, collection_id: &str) -> Result<Option<CollectionRoles>, StoreError> {
        Ok(self.inner.read().await.collections.get(collection_id).cloned())
    }
}

#[async_trait]
impl IpGroupResolver for MemoryRepository {
    async fn groups_for(&self, ip: IpAddr) -> Result<Vec<NetworkGroup>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .ip_groups
            .get(&ip)
            .cloned()
            .unwrap_or_default())
    }
}
