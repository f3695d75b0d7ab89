//! Per-request capability evaluation
//!
//! An [`Ability`] is a snapshot of everything known about one caller for one
//! request: identity, login kind, the merged group set, and the state of a
//! presented access token. Queries run through a fixed, ordered list of
//! independent rules, each answering Allow, Deny, or Abstain; an explicit
//! Deny overrides any Allow, and all-abstain means no.
//!
//! Token state is re-resolved on every request — tokens can expire or be
//! revoked between requests, so a cached decision is never trusted.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AccessError;
use crate::service::TokenService;
use crate::store::{
    CollectionDirectory, CollectionRoles, IpGroupResolver, MasterFile, Resource, ResourceStore,
};

/// Everyone, including anonymous callers
pub const PUBLIC_GROUP: &str = "public";
/// Any known (non-anonymous) principal
pub const REGISTERED_GROUP: &str = "registered";
/// Site-wide administrators
pub const ADMINISTRATOR_GROUP: &str = "administrator";

/// Name of the synthetic group granting download access to one media object.
pub fn download_group_name(media_object_id: &str) -> String {
    format!("allow_download_{media_object_id}")
}

/// The fixed action vocabulary of the access core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// See the catalog record
    Read,
    /// Read including playback metadata
    FullRead,
    /// Play the media
    Stream,
    /// Download a master file
    MasterFileDownload,
    CreateToken,
    UpdateToken,
    ListAllTokens,
}

/// One rule's answer for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    Abstain,
}

/// The authenticated principal as the session layer hands it over.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
    /// Role groups resolved at login ("administrator", "manager", ...)
    pub groups: Vec<String>,
}

/// Everything the request boundary knows about the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<SessionUser>,
    /// Interactive login (as opposed to token-only or API access)
    pub full_login: bool,
    pub api_request: bool,
    /// Presented access-token value, if any
    pub access_token: Option<String>,
    pub remote_ip: Option<IpAddr>,
    /// Session-scoped groups from course/LTI integrations
    pub virtual_groups: Vec<String>,
}

/// Resolved state of a presented token, re-read per request.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub media_object_id: String,
    pub allow_streaming: bool,
    pub allow_download: bool,
    pub active: bool,
}

/// A media object together with its owning collection's roles.
#[derive(Debug, Clone)]
pub struct MediaView {
    pub resource: Resource,
    pub roles: Option<CollectionRoles>,
}

/// A master file in the context of its parent media object.
#[derive(Debug, Clone)]
pub struct FileView {
    pub file: MasterFile,
    pub media: MediaView,
}

/// The collection context a token operation targets.
#[derive(Debug, Clone)]
pub struct TokenTargetView {
    pub media_object_id: String,
    pub roles: Option<CollectionRoles>,
}

/// What a capability query is about.
#[derive(Debug, Clone)]
pub enum Target<'a> {
    Media(&'a MediaView),
    File(&'a FileView),
    Token(&'a TokenTargetView),
    /// The token listing as a whole
    TokenIndex,
}

/// Caller snapshot; build one per request via [`AbilityResolver::resolve`].
#[derive(Debug, Clone)]
pub struct Ability {
    user: Option<SessionUser>,
    groups: BTreeSet<String>,
    full_login: bool,
    api_request: bool,
    token: Option<TokenGrant>,
}

type Rule = fn(&Ability, Action, &Target) -> Decision;

/// Evaluation order is part of the contract; denies anywhere in the list
/// override allows from any other rule.
const RULES: &[(&str, Rule)] = &[
    ("require_login", require_login_rule),
    ("administrator", administrator_rule),
    ("media_read", media_read_rule),
    ("media_full_read", media_full_read_rule),
    ("media_stream", media_stream_rule),
    ("master_file_download", master_file_download_rule),
    ("token_management", token_management_rule),
    ("token_index", token_index_rule),
];

impl Ability {
    /// Answer a capability query by running the rule pipeline.
    pub fn can(&self, action: Action, target: &Target) -> bool {
        let mut allowed = false;
        for &(name, rule) in RULES {
            match rule(self, action, target) {
                Decision::Deny => {
                    debug!(rule = name, ?action, "Capability denied");
                    return false;
                }
                Decision::Allow => allowed = true,
                Decision::Abstain => {}
            }
        }
        allowed
    }

    /// The merged group set for this request.
    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn is_administrator(&self) -> bool {
        self.groups.contains(ADMINISTRATOR_GROUP)
    }

    fn logged_in(&self) -> bool {
        self.full_login || self.api_request
    }

    /// Manager, editor, or depositor of the collection owning the media.
    fn edits_collection(&self, roles: &Option<CollectionRoles>) -> bool {
        match (&self.user, roles) {
            (Some(user), Some(roles)) => roles.is_member(&user.username),
            _ => false,
        }
    }

    fn has_read_group_access(&self, resource: &Resource) -> bool {
        resource.read_groups.iter().any(|g| self.groups.contains(g))
    }

    fn full_read(&self, media: &MediaView) -> bool {
        (self.has_read_group_access(&media.resource) && media.resource.published)
            || self.edits_collection(&media.roles)
    }

    fn token_streams(&self, media_object_id: &str) -> bool {
        self.token
            .as_ref()
            .map(|grant| {
                grant.active && grant.allow_streaming && grant.media_object_id == media_object_id
            })
            .unwrap_or(false)
    }
}

/// Token management requires a real login; a presented access token alone
/// is never enough, no matter what other rules would grant.
fn require_login_rule(ability: &Ability, action: Action, _target: &Target) -> Decision {
    match action {
        Action::CreateToken | Action::UpdateToken | Action::ListAllTokens
            if !ability.logged_in() =>
        {
            Decision::Deny
        }
        _ => Decision::Abstain,
    }
}

fn administrator_rule(ability: &Ability, _action: Action, _target: &Target) -> Decision {
    if ability.is_administrator() && ability.logged_in() {
        Decision::Allow
    } else {
        Decision::Abstain
    }
}

fn media_read_rule(ability: &Ability, action: Action, target: &Target) -> Decision {
    let (Action::Read, Target::Media(media)) = (action, target) else {
        return Decision::Abstain;
    };
    if media.resource.published || ability.edits_collection(&media.roles) {
        Decision::Allow
    } else {
        Decision::Abstain
    }
}

fn media_full_read_rule(ability: &Ability, action: Action, target: &Target) -> Decision {
    let (Action::FullRead, Target::Media(media)) = (action, target) else {
        return Decision::Abstain;
    };
    if ability.full_read(media) {
        Decision::Allow
    } else {
        Decision::Abstain
    }
}

/// Streaming: full read access, or an active streaming token for exactly
/// this object. Tokens only ever widen access on published objects.
fn media_stream_rule(ability: &Ability, action: Action, target: &Target) -> Decision {
    let (Action::Stream, Target::Media(media)) = (action, target) else {
        return Decision::Abstain;
    };
    if ability.full_read(media)
        || (media.resource.published && ability.token_streams(&media.resource.id))
    {
        Decision::Allow
    } else {
        Decision::Abstain
    }
}

fn master_file_download_rule(ability: &Ability, action: Action, target: &Target) -> Decision {
    let (Action::MasterFileDownload, Target::File(file)) = (action, target) else {
        return Decision::Abstain;
    };
    let parent_id = &file.media.resource.id;
    if ability.edits_collection(&file.media.roles)
        || ability.groups.contains(&download_group_name(parent_id))
    {
        Decision::Allow
    } else {
        Decision::Abstain
    }
}

fn token_management_rule(ability: &Ability, action: Action, target: &Target) -> Decision {
    let (Action::CreateToken | Action::UpdateToken, Target::Token(view)) = (action, target) else {
        return Decision::Abstain;
    };
    if ability.edits_collection(&view.roles) {
        Decision::Allow
    } else {
        Decision::Abstain
    }
}

fn token_index_rule(ability: &Ability, action: Action, _target: &Target) -> Decision {
    if action == Action::ListAllTokens && ability.is_administrator() {
        Decision::Allow
    } else {
        Decision::Abstain
    }
}

/// Builds [`Ability`] snapshots and target views from the request context
/// and the repository boundaries.
#[derive(Clone)]
pub struct AbilityResolver {
    tokens: TokenService,
    resources: Arc<dyn ResourceStore>,
    collections: Arc<dyn CollectionDirectory>,
    ip_groups: Arc<dyn IpGroupResolver>,
}

impl AbilityResolver {
    pub fn new(
        tokens: TokenService,
        resources: Arc<dyn ResourceStore>,
        collections: Arc<dyn CollectionDirectory>,
        ip_groups: Arc<dyn IpGroupResolver>,
    ) -> Self {
        Self {
            tokens,
            resources,
            collections,
            ip_groups,
        }
    }

    /// Compose the caller's group set and token grant for this request.
    ///
    /// Group sources, merged order-independently with duplicates collapsed:
    /// the public baseline, "registered" plus role groups for a known user,
    /// course/LTI virtual groups, the client address and its resolved
    /// network groups, and the token download group. Unknown tokens and
    /// resolver failures contribute nothing; they never fail the request.
    pub async fn resolve(&self, ctx: RequestContext) -> Result<Ability, AccessError> {
        let mut groups: BTreeSet<String> = BTreeSet::from([PUBLIC_GROUP.to_string()]);

        if let Some(user) = &ctx.user {
            groups.insert(REGISTERED_GROUP.to_string());
            groups.extend(user.groups.iter().cloned());
        }

        groups.extend(ctx.virtual_groups.iter().cloned());

        if let Some(ip) = ctx.remote_ip {
            groups.insert(ip.to_string());
            match self.ip_groups.groups_for(ip).await {
                Ok(network_groups) => {
                    groups.extend(network_groups.iter().map(|g| g.prefixed_key()));
                }
                Err(e) => {
                    warn!(ip = %ip, error = %e, "IP group resolution failed; continuing without network groups");
                }
            }
        }

        let token = self.resolve_token_grant(ctx.access_token.as_deref()).await;
        if let Some(grant) = &token {
            if grant.active && grant.allow_download {
                groups.insert(download_group_name(&grant.media_object_id));
            }
        }

        Ok(Ability {
            user: ctx.user,
            groups,
            full_login: ctx.full_login,
            api_request: ctx.api_request,
            token,
        })
    }

    async fn resolve_token_grant(&self, token_value: Option<&str>) -> Option<TokenGrant> {
        let token_value = token_value.filter(|v| !v.is_empty())?;

        match self.tokens.find_by_token(token_value).await {
            Ok(Some(token)) => Some(TokenGrant {
                active: self.tokens.is_currently_active(&token),
                media_object_id: token.media_object_id,
                allow_streaming: token.allow_streaming,
                allow_download: token.allow_download,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Access token lookup failed; treating as not presented");
                None
            }
        }
    }

    /// Load a media object together with its collection roles.
    pub async fn media_view(&self, media_object_id: &str) -> Result<Option<MediaView>, AccessError> {
        let Some(resource) = self.resources.load(media_object_id).await? else {
            return Ok(None);
        };
        let roles = self.collections.roles(&resource.collection_id).await?;
        Ok(Some(MediaView { resource, roles }))
    }

    /// View for a master file; `None` when the parent media object is gone.
    pub async fn file_view(&self, file: MasterFile) -> Result<Option<FileView>, AccessError> {
        let Some(media) = self.media_view(&file.media_object_id).await? else {
            return Ok(None);
        };
        Ok(Some(FileView { file, media }))
    }

    /// View for token create/update checks against a target media object.
    pub async fn token_target_view(
        &self,
        media_object_id: &str,
    ) -> Result<Option<TokenTargetView>, AccessError> {
        let Some(media) = self.media_view(media_object_id).await? else {
            return Ok(None);
        };
        Ok(Some(TokenTargetView {
            media_object_id: media.resource.id,
            roles: media.roles,
        }))
    }
}
