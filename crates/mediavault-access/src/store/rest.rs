//! REST-backed repository client
//!
//! Talks JSON to the media repository's management API. Document shapes
//! mirror what the repository serves; sets are wire-encoded as arrays.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    CollectionDirectory, CollectionRoles, IpGroupResolver, NetworkGroup, Resource, ResourceStore,
    StoreError,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize)]
struct ResourceDoc {
    id: String,
    collection_id: String,
    #[serde(default)]
    read_groups: Vec<String>,
    #[serde(default)]
    published: bool,
}

impl From<ResourceDoc> for Resource {
    fn from(doc: ResourceDoc) -> Self {
        Resource {
            id: doc.id,
            collection_id: doc.collection_id,
            read_groups: doc.read_groups.into_iter().collect(),
            published: doc.published,
        }
    }
}

impl From<&Resource> for ResourceDoc {
    fn from(resource: &Resource) -> Self {
        ResourceDoc {
            id: resource.id.clone(),
            collection_id: resource.collection_id.clone(),
            read_groups: resource.read_groups.iter().cloned().collect(),
            published: resource.published,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RolesDoc {
    #[serde(default)]
    managers: Vec<String>,
    #[serde(default)]
    editors: Vec<String>,
    #[serde(default)]
    depositors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IpGroupsDoc {
    #[serde(default)]
    groups: Vec<String>,
}

/// Repository client over the management API.
#[derive(Clone)]
pub struct RestRepository {
    base_url: String,
    http: reqwest::Client,
}

impl RestRepository {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ResourceStore for RestRepository {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.load(id).await?.is_some())
    }

    async fn load(&self, id: &str) -> Result<Option<Resource>, StoreError> {
        let url = self.url(&format!("/api/media-objects/{id}"));
        debug!("Loading media object from {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let doc: ResourceDoc = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        Ok(Some(doc.into()))
    }

    async fn save(&self, resource: &Resource) -> Result<(), StoreError> {
        let url = self.url(&format!("/api/media-objects/{}", resource.id));
        debug!("Saving media object to {}", url);

        self.http
            .put(&url)
            .json(&ResourceDoc::from(resource))
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .error_for_status()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl CollectionDirectory for RestRepository {
    async fn roles(&self, collection_id: &str) -> Result<Option<CollectionRoles>, StoreError> {
        let url = self.url(&format!("/api/collections/{collection_id}/roles"));

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let doc: RolesDoc = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        Ok(Some(CollectionRoles {
            managers: doc.managers.into_iter().collect(),
            editors: doc.editors.into_iter().collect(),
            depositors: doc.depositors.into_iter().collect(),
        }))
    }
}

#[async_trait]
impl IpGroupResolver for RestRepository {
    async fn groups_for(&self, ip: IpAddr) -> Result<Vec<NetworkGroup>, StoreError> {
        let url = self.url(&format!("/api/ip-groups?ip={ip}"));

        let doc: IpGroupsDoc = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .error_for_status()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        Ok(doc
            .groups
            .iter()
            .filter_map(|base| NetworkGroup::new(base))
            .collect())
    }
}
