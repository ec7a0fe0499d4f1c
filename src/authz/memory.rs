//! In-memory grant stores and hierarchy for single-process use and tests.
//!
//! Semantics match the SQLite implementations: upsert by pair, idempotent
//! revokes, `ReferenceNotFound` for unknown resources or users.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::authz::ancestry::{AncestryResolver, EntityLookup};
use crate::authz::reference::{ReferenceKind, ReferenceTranslator};
use crate::authz::store::{GrantStore, GrantStores};
use crate::errors::{AppError, AppResult, LookupError};
use crate::models::capability::{CapabilityLevel, ResourceKind, ResourceRef};
use crate::models::grant::PermissionGrant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct HierarchyState {
    organizations: HashSet<Uuid>,
    /// project -> organization
    projects: HashMap<Uuid, Uuid>,
    /// document -> project
    documents: HashMap<Uuid, Uuid>,
    /// version -> owning document, if still linked
    versions: HashMap<Uuid, Option<Uuid>>,
    users: HashSet<Uuid>,
}

/// Organization -> Project -> Document tree plus the set of known users.
#[derive(Debug, Clone, Default)]
pub struct MemoryHierarchy {
    state: Arc<Mutex<HierarchyState>>,
}

impl MemoryHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_organization(&self) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.state).organizations.insert(id);
        id
    }

    pub fn add_project(&self, organization_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.state).projects.insert(id, organization_id);
        id
    }

    pub fn add_document(&self, project_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.state).documents.insert(id, project_id);
        id
    }

    pub fn add_version(&self, document_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.state).versions.insert(id, document_id);
        id
    }

    pub fn add_user(&self) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.state).users.insert(id);
        id
    }

    /// Drops the entity without touching its children or grants.
    pub fn remove(&self, resource: ResourceRef) {
        let mut state = lock(&self.state);
        match resource.kind {
            ResourceKind::Organization => {
                state.organizations.remove(&resource.id);
            }
            ResourceKind::Project => {
                state.projects.remove(&resource.id);
            }
            ResourceKind::Document => {
                state.documents.remove(&resource.id);
            }
        }
    }

    pub fn contains(&self, resource: ResourceRef) -> bool {
        let state = lock(&self.state);
        match resource.kind {
            ResourceKind::Organization => state.organizations.contains(&resource.id),
            ResourceKind::Project => state.projects.contains_key(&resource.id),
            ResourceKind::Document => state.documents.contains_key(&resource.id),
        }
    }

    pub fn has_user(&self, user_id: Uuid) -> bool {
        lock(&self.state).users.contains(&user_id)
    }

    fn parent_id(&self, resource: ResourceRef) -> Result<Option<Uuid>, LookupError> {
        let state = lock(&self.state);
        let found = match resource.kind {
            ResourceKind::Organization => state.organizations.contains(&resource.id).then_some(None),
            ResourceKind::Project => state.projects.get(&resource.id).map(|org| Some(*org)),
            ResourceKind::Document => state.documents.get(&resource.id).map(|project| Some(*project)),
        };
        found.ok_or(LookupError::ResourceNotFound {
            kind: resource.kind,
            id: resource.id,
        })
    }

    pub fn lookup(&self, kind: ResourceKind) -> Arc<dyn EntityLookup> {
        Arc::new(MemoryEntityLookup {
            kind,
            hierarchy: self.clone(),
        })
    }

    pub fn ancestry(&self) -> AncestryResolver {
        AncestryResolver::new(
            self.lookup(ResourceKind::Organization),
            self.lookup(ResourceKind::Project),
            self.lookup(ResourceKind::Document),
        )
    }

    pub fn version_owner(&self) -> Arc<dyn ReferenceTranslator> {
        Arc::new(MemoryVersionOwner {
            hierarchy: self.clone(),
        })
    }

    /// Grant stores that validate resources and users against this hierarchy.
    pub fn grant_stores(&self) -> GrantStores {
        GrantStores::new(
            Arc::new(MemoryGrantStore::new(ResourceKind::Organization).with_hierarchy(self.clone())),
            Arc::new(MemoryGrantStore::new(ResourceKind::Project).with_hierarchy(self.clone())),
            Arc::new(MemoryGrantStore::new(ResourceKind::Document).with_hierarchy(self.clone())),
        )
    }
}

struct MemoryEntityLookup {
    kind: ResourceKind,
    hierarchy: MemoryHierarchy,
}

#[async_trait]
impl EntityLookup for MemoryEntityLookup {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn parent_of(&self, id: Uuid) -> Result<Option<Uuid>, LookupError> {
        self.hierarchy.parent_id(ResourceRef::new(self.kind, id))
    }
}

struct MemoryVersionOwner {
    hierarchy: MemoryHierarchy,
}

#[async_trait]
impl ReferenceTranslator for MemoryVersionOwner {
    fn owner_kind(&self) -> ResourceKind {
        ResourceKind::Document
    }

    async fn owner_of(&self, reference_id: Uuid) -> Result<Option<Uuid>, LookupError> {
        lock(&self.hierarchy.state)
            .versions
            .get(&reference_id)
            .copied()
            .ok_or(LookupError::ReferenceNotFound {
                reference: ReferenceKind::DocumentVersion.as_str(),
                id: reference_id,
            })
    }
}

/// Grant store for one resource kind backed by a map keyed by grant id.
#[derive(Debug, Clone)]
pub struct MemoryGrantStore {
    kind: ResourceKind,
    grants: Arc<Mutex<HashMap<Uuid, PermissionGrant>>>,
    hierarchy: Option<MemoryHierarchy>,
}

impl MemoryGrantStore {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            grants: Arc::new(Mutex::new(HashMap::new())),
            hierarchy: None,
        }
    }

    pub fn with_hierarchy(mut self, hierarchy: MemoryHierarchy) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    pub fn len(&self) -> usize {
        lock(&self.grants).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_references(&self, resource_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let Some(hierarchy) = &self.hierarchy else {
            return Ok(());
        };
        if !hierarchy.contains(ResourceRef::new(self.kind, resource_id)) {
            return Err(AppError::reference_not_found(format!(
                "{} {resource_id} not found",
                self.kind
            )));
        }
        if !hierarchy.has_user(user_id) {
            return Err(AppError::reference_not_found(format!("user {user_id} not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn find_by_resource_and_user(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<PermissionGrant>> {
        Ok(lock(&self.grants)
            .values()
            .find(|g| g.resource_id == resource_id && g.user_id == user_id)
            .cloned())
    }

    async fn find_by_id(&self, grant_id: Uuid) -> AppResult<Option<PermissionGrant>> {
        Ok(lock(&self.grants).get(&grant_id).cloned())
    }

    async fn grant(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
        capability: CapabilityLevel,
    ) -> AppResult<PermissionGrant> {
        self.check_references(resource_id, user_id)?;

        let now = Utc::now();
        let mut grants = lock(&self.grants);

        if let Some(existing) = grants
            .values_mut()
            .find(|g| g.resource_id == resource_id && g.user_id == user_id)
        {
            existing.capability = capability;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let grant = PermissionGrant {
            id: Uuid::new_v4(),
            resource_kind: self.kind,
            resource_id,
            user_id,
            capability,
            created_at: now,
            updated_at: now,
        };
        grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn update_capability(
        &self,
        grant_id: Uuid,
        capability: CapabilityLevel,
    ) -> AppResult<Option<PermissionGrant>> {
        let mut grants = lock(&self.grants);
        Ok(grants.get_mut(&grant_id).map(|grant| {
            grant.capability = capability;
            grant.updated_at = Utc::now();
            grant.clone()
        }))
    }

    async fn revoke(&self, grant_id: Uuid) -> AppResult<bool> {
        Ok(lock(&self.grants).remove(&grant_id).is_some())
    }

    async fn revoke_by_resource_and_user(&self, resource_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut grants = lock(&self.grants);
        let before = grants.len();
        grants.retain(|_, g| !(g.resource_id == resource_id && g.user_id == user_id));
        Ok(grants.len() < before)
    }

    async fn list_by_resource(&self, resource_id: Uuid) -> AppResult<Vec<PermissionGrant>> {
        Ok(lock(&self.grants)
            .values()
            .filter(|g| g.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PermissionGrant>> {
        Ok(lock(&self.grants)
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grant_twice_keeps_one_row() {
        let hierarchy = MemoryHierarchy::new();
        let org = hierarchy.add_organization();
        let user = hierarchy.add_user();
        let store = MemoryGrantStore::new(ResourceKind::Organization).with_hierarchy(hierarchy);

        let first = store.grant(org, user, CapabilityLevel::Invite).await.unwrap();
        let second = store.grant(org, user, CapabilityLevel::Manage).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.capability, CapabilityLevel::Manage);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemoryGrantStore::new(ResourceKind::Document);
        let (doc, user) = (Uuid::new_v4(), Uuid::new_v4());
        let grant = store.grant(doc, user, CapabilityLevel::Create).await.unwrap();

        assert!(store.revoke(grant.id).await.unwrap());
        assert!(!store.revoke(grant.id).await.unwrap());
        assert!(!store.revoke_by_resource_and_user(doc, user).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_references_are_rejected() {
        let hierarchy = MemoryHierarchy::new();
        let project = hierarchy.add_project(hierarchy.add_organization());
        let store = MemoryGrantStore::new(ResourceKind::Project).with_hierarchy(hierarchy.clone());

        let err = store
            .grant(project, Uuid::new_v4(), CapabilityLevel::Invite)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReferenceNotFound(_)));

        let err = store
            .grant(Uuid::new_v4(), hierarchy.add_user(), CapabilityLevel::Invite)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReferenceNotFound(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_grant_is_none() {
        let store = MemoryGrantStore::new(ResourceKind::Project);
        let updated = store
            .update_capability(Uuid::new_v4(), CapabilityLevel::Manage)
            .await
            .unwrap();
        assert!(updated.is_none());
    }
}
