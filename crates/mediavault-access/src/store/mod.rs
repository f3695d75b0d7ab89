//! Boundaries to the media repository
//!
//! Media objects, collections, and network groups live in the repository
//! proper; the access core only needs the narrow views below. Two
//! implementations ship with the crate: [`memory::MemoryRepository`] for
//! tests and development, and [`rest::RestRepository`] speaking JSON to the
//! repository's management API.

pub mod memory;
pub mod rest;

use std::collections::BTreeSet;
use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryRepository;
pub use rest::RestRepository;

/// Error type for repository operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("repository request failed: {0}")]
    Backend(String),

    #[error("malformed repository response: {0}")]
    Malformed(String),
}

/// The access-control view of a media object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    /// Identifier of the collection that owns this object
    pub collection_id: String,
    /// Group names granted read access; access-token values appear here
    /// verbatim while their token is active
    pub read_groups: BTreeSet<String>,
    pub published: bool,
}

impl Resource {
    pub fn has_read_group(&self, group: &str) -> bool {
        self.read_groups.contains(group)
    }
}

/// A file belonging to a media object (the downloadable unit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterFile {
    pub id: String,
    pub media_object_id: String,
}

/// Role membership of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRoles {
    pub managers: BTreeSet<String>,
    pub editors: BTreeSet<String>,
    pub depositors: BTreeSet<String>,
}

impl CollectionRoles {
    /// Manager, editor, or depositor.
    pub fn is_member(&self, user_key: &str) -> bool {
        self.managers.contains(user_key)
            || self.editors.contains(user_key)
            || self.depositors.contains(user_key)
    }

    /// Editor-or-manager; the bar for seeing and managing tokens.
    pub fn is_editor(&self, user_key: &str) -> bool {
        self.managers.contains(user_key) || self.editors.contains(user_key)
    }

    pub fn is_manager(&self, user_key: &str) -> bool {
        self.managers.contains(user_key)
    }
}

/// A network-derived group, identified by a prefixed key so that entries in
/// a resource's read-group list are distinguishable from plain group names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkGroup {
    base_key: String,
}

impl NetworkGroup {
    pub const PREFIX: &'static str = "net.range:";

    /// None for an empty base key.
    pub fn new(base_key: &str) -> Option<Self> {
        if base_key.is_empty() {
            return None;
        }
        Some(Self {
            base_key: base_key.to_string(),
        })
    }

    pub fn base_key(&self) -> &str {
        &self.base_key
    }

    pub fn prefixed_key(&self) -> String {
        format!("{}{}", Self::PREFIX, self.base_key)
    }

    pub fn from_prefixed_key(prefixed: &str) -> Option<Self> {
        prefixed
            .strip_prefix(Self::PREFIX)
            .and_then(NetworkGroup::new)
    }

    pub fn is_prefixed_key(candidate: &str) -> bool {
        Self::from_prefixed_key(candidate).is_some()
    }
}

/// Read/write access to media-object records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn exists(&self, id: &str) -> Result<bool, StoreError>;

    async fn load(&self, id: &str) -> Result<Option<Resource>, StoreError>;

    async fn save(&self, resource: &Resource) -> Result<(), StoreError>;
}

/// Role lookup for the collection owning a resource.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CollectionDirectory: Send + Sync {
    async fn roles(&self, collection_id: &str) -> Result<Option<CollectionRoles>, StoreError>;
}

/// Maps a client address to the network groups it belongs to.
///
/// Resolution failures are expected occasionally (the group service is a
/// separate deployment); callers treat them as "no groups".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IpGroupResolver: Send + Sync {
    async fn groups_for(&self, ip: IpAddr) -> Result<Vec<NetworkGroup>, StoreError>;
}
