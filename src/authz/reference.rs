//! Indirect references: ids of objects that are not themselves securable but
//! belong to a resource that is (a document version, a permission grant).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::authz::store::{GrantStore, GrantStores};
use crate::errors::{AppError, AppResult, LookupError};
use crate::models::capability::{ResourceKind, ResourceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Document version, owned by a document.
    DocumentVersion,
    OrganizationGrant,
    ProjectGrant,
    DocumentGrant,
}

impl ReferenceKind {
    pub const fn grant(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Organization => Self::OrganizationGrant,
            ResourceKind::Project => Self::ProjectGrant,
            ResourceKind::Document => Self::DocumentGrant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentVersion => "document_version",
            Self::OrganizationGrant => "organization_permission",
            Self::ProjectGrant => "project_permission",
            Self::DocumentGrant => "document_permission",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an indirect reference id to the id of its owning resource.
#[async_trait]
pub trait ReferenceTranslator: Send + Sync {
    /// Kind of the owning resource.
    fn owner_kind(&self) -> ResourceKind;

    /// `Ok(None)` when the referenced object exists but has no owner;
    /// `LookupError::ReferenceNotFound` when it does not exist.
    async fn owner_of(&self, reference_id: Uuid) -> Result<Option<Uuid>, LookupError>;
}

/// Translators keyed by reference kind.
#[derive(Clone, Default)]
pub struct ReferenceRegistry {
    translators: HashMap<ReferenceKind, Arc<dyn ReferenceTranslator>>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ReferenceKind, translator: Arc<dyn ReferenceTranslator>) -> Self {
        self.translators.insert(kind, translator);
        self
    }

    /// Registers a [`GrantOwner`] for each resource kind.
    pub fn with_grant_owners(self, grants: &GrantStores) -> Self {
        ResourceKind::ALL.into_iter().fold(self, |registry, kind| {
            registry.with(
                ReferenceKind::grant(kind),
                Arc::new(GrantOwner::new(grants.for_kind(kind).clone())),
            )
        })
    }

    pub fn get(&self, kind: ReferenceKind) -> Option<&Arc<dyn ReferenceTranslator>> {
        self.translators.get(&kind)
    }

    /// Translates `reference_id` into the owning resource, which must be of
    /// `expected` kind.
    ///
    /// Missing or ownerless references fail with `ReferenceNotFound`. An
    /// unregistered kind, a kind mismatch or a backend failure is `Internal`.
    pub async fn translate(
        &self,
        kind: ReferenceKind,
        expected: ResourceKind,
        reference_id: Uuid,
    ) -> AppResult<ResourceRef> {
        let translator = self
            .get(kind)
            .ok_or_else(|| AppError::internal(format!("no translator registered for {kind}")))?;

        if translator.owner_kind() != expected {
            return Err(AppError::internal(format!(
                "{kind} resolves to {} but {expected} was required",
                translator.owner_kind()
            )));
        }

        match translator.owner_of(reference_id).await {
            Ok(Some(owner)) => Ok(ResourceRef::new(expected, owner)),
            Ok(None) => Err(AppError::reference_not_found(format!(
                "{kind} {reference_id} has no owning {expected}"
            ))),
            Err(LookupError::Backend(message)) => {
                tracing::warn!(reference = %kind, %reference_id, error = %message, "reference lookup failed");
                Err(AppError::internal(format!("{kind} lookup failed")))
            }
            Err(err) => Err(AppError::reference_not_found(err.to_string())),
        }
    }
}

/// Resolves a grant id to the resource the grant is on.
pub struct GrantOwner {
    store: Arc<dyn GrantStore>,
}

impl GrantOwner {
    pub fn new(store: Arc<dyn GrantStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReferenceTranslator for GrantOwner {
    fn owner_kind(&self) -> ResourceKind {
        self.store.kind()
    }

    async fn owner_of(&self, reference_id: Uuid) -> Result<Option<Uuid>, LookupError> {
        match self.store.find_by_id(reference_id).await? {
            Some(grant) => Ok(Some(grant.resource_id)),
            None => Err(LookupError::ReferenceNotFound {
                reference: ReferenceKind::grant(self.store.kind()).as_str(),
                id: reference_id,
            }),
        }
    }
}
