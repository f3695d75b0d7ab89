//! Access authorization core for MediaVault
//!
//! This crate owns the two halves of the access-control story:
//!
//! - **Access tokens**: scoped, time-bounded capabilities over a single
//!   media object, with a one-way active → expired/revoked lifecycle and a
//!   read-group entry kept in sync on the protected resource.
//! - **The ability engine**: per-request composition of group memberships
//!   (session roles, course/LTI virtual groups, network-derived groups,
//!   token-derived groups) evaluated through a fixed, ordered rule pipeline
//!   where explicit denies override allows.
//!
//! The media repository itself (media objects, collections, IP groups) is an
//! external system reached through the traits in [`store`].

pub mod ability;
pub mod error;
pub mod mode;
pub mod service;
pub mod store;
pub mod sweep;

pub use ability::{
    download_group_name, Ability, AbilityResolver, Action, Decision, FileView, MediaView,
    RequestContext, SessionUser, Target, TokenGrant, TokenTargetView,
};
pub use error::{AccessError, FieldError, ValidationErrors};
pub use mode::{AccessMode, TokenStatus};
pub use service::{Creator, NewAccessToken, TokenService, TokenUpdate};
pub use store::{
    CollectionDirectory, CollectionRoles, IpGroupResolver, MasterFile, MemoryRepository,
    NetworkGroup, Resource, ResourceStore, RestRepository, StoreError,
};
pub use sweep::SweepReport;
