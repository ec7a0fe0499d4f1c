use uuid::Uuid;

use crate::authz::ancestry::AncestryResolver;
use crate::authz::store::GrantStores;
use crate::errors::LookupError;
use crate::models::capability::{CapabilityLevel, ResourceKind, ResourceRef};
use crate::models::grant::{LevelContribution, Resolution};

/// Computes effective capabilities by walking a resource's ancestry and
/// merging direct grants, highest rank wins.
///
/// Holds no state of its own; every call reads grants and ancestry fresh.
#[derive(Clone)]
pub struct PermissionResolver {
    grants: GrantStores,
    ancestry: AncestryResolver,
}

impl PermissionResolver {
    pub fn new(grants: GrantStores, ancestry: AncestryResolver) -> Self {
        Self { grants, ancestry }
    }

    pub fn grants(&self) -> &GrantStores {
        &self.grants
    }

    /// Highest capability the user holds on the resource, directly or through
    /// an ancestor. `None` when nothing along the chain grants anything.
    pub async fn effective_capability(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: Uuid,
    ) -> Option<CapabilityLevel> {
        self.explain(user_id, ResourceRef::new(kind, resource_id))
            .await
            .effective
    }

    pub async fn can_access(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: Uuid,
        required: CapabilityLevel,
    ) -> bool {
        self.effective_capability(user_id, kind, resource_id)
            .await
            .map(|level| level.implies(required))
            .unwrap_or(false)
    }

    /// Walks from `resource` up to the root, recording the direct grant found
    /// at each level.
    ///
    /// Lookup failures end the walk at the failing level: whatever was
    /// collected so far still counts, nothing above it does.
    pub async fn explain(&self, user_id: Uuid, resource: ResourceRef) -> Resolution {
        let mut chain = Vec::new();
        let mut effective = None;
        let mut next = Some(resource);

        // Each step moves to `kind.parent()`, so this runs at most three times.
        while let Some(current) = next {
            let direct = self.direct_grant(user_id, current).await;
            effective = CapabilityLevel::highest(effective, direct);
            chain.push(LevelContribution {
                resource: current,
                direct,
            });

            next = match self.ancestry.parent_of(current).await {
                Ok(parent) => parent,
                Err(LookupError::ResourceNotFound { kind, id }) => {
                    tracing::debug!(%user_id, %kind, %id, "resource missing during resolution");
                    None
                }
                Err(err) => {
                    tracing::warn!(%user_id, resource = %current, error = %err, "ancestry lookup failed");
                    None
                }
            };
        }

        tracing::trace!(%user_id, %resource, effective = ?effective, levels = chain.len(), "resolved capability");

        Resolution {
            user_id,
            resource,
            effective,
            chain,
        }
    }

    async fn direct_grant(&self, user_id: Uuid, resource: ResourceRef) -> Option<CapabilityLevel> {
        match self
            .grants
            .for_kind(resource.kind)
            .find_by_resource_and_user(resource.id, user_id)
            .await
        {
            Ok(grant) => grant.map(|g| g.capability),
            Err(err) => {
                tracing::warn!(%user_id, %resource, error = %err, "grant lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::authz::memory::{MemoryGrantStore, MemoryHierarchy};
    use crate::authz::store::GrantStore;
    use crate::errors::{AppError, AppResult};
    use crate::models::grant::PermissionGrant;
    use crate::models::capability::CapabilityLevel::*;

    struct Fixture {
        hierarchy: MemoryHierarchy,
        grants: GrantStores,
        resolver: PermissionResolver,
        org: Uuid,
        project: Uuid,
        document: Uuid,
    }

    fn fixture() -> Fixture {
        let hierarchy = MemoryHierarchy::new();
        let org = hierarchy.add_organization();
        let project = hierarchy.add_project(org);
        let document = hierarchy.add_document(project);
        let grants = hierarchy.grant_stores();
        let resolver = PermissionResolver::new(grants.clone(), hierarchy.ancestry());

        Fixture {
            hierarchy,
            grants,
            resolver,
            org,
            project,
            document,
        }
    }

    impl Fixture {
        async fn grant(&self, kind: ResourceKind, id: Uuid, user: Uuid, level: CapabilityLevel) -> PermissionGrant {
            self.grants.for_kind(kind).grant(id, user, level).await.unwrap()
        }

        async fn effective(&self, user: Uuid, kind: ResourceKind, id: Uuid) -> Option<CapabilityLevel> {
            self.resolver.effective_capability(user, kind, id).await
        }
    }

    #[tokio::test]
    async fn organization_manage_reaches_document() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grant(ResourceKind::Organization, f.org, user, Manage).await;

        assert_eq!(f.effective(user, ResourceKind::Document, f.document).await, Some(Manage));
        assert!(f.resolver.can_access(user, ResourceKind::Document, f.document, Create).await);
    }

    #[tokio::test]
    async fn higher_ancestor_beats_lower_direct_grant() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grant(ResourceKind::Document, f.document, user, Invite).await;
        f.grant(ResourceKind::Organization, f.org, user, Create).await;

        assert_eq!(f.effective(user, ResourceKind::Document, f.document).await, Some(Create));
    }

    #[tokio::test]
    async fn project_grant_flows_down_not_up() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grant(ResourceKind::Project, f.project, user, Manage).await;

        assert!(!f.resolver.can_access(user, ResourceKind::Organization, f.org, Invite).await);
        assert!(f.resolver.can_access(user, ResourceKind::Document, f.document, Manage).await);
    }

    #[tokio::test]
    async fn document_grant_does_not_leak_upwards() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grant(ResourceKind::Document, f.document, user, Manage).await;

        assert_eq!(f.effective(user, ResourceKind::Project, f.project).await, None);
        assert_eq!(f.effective(user, ResourceKind::Organization, f.org).await, None);
    }

    #[tokio::test]
    async fn no_grants_means_absent_and_denied() {
        let f = fixture();
        let user = f.hierarchy.add_user();

        assert_eq!(f.effective(user, ResourceKind::Document, f.document).await, None);
        for level in CapabilityLevel::ALL {
            assert!(!f.resolver.can_access(user, ResourceKind::Document, f.document, level).await);
        }
    }

    #[tokio::test]
    async fn descendant_gets_max_of_direct_and_inherited() {
        for direct in CapabilityLevel::ALL {
            for inherited in CapabilityLevel::ALL {
                let f = fixture();
                let user = f.hierarchy.add_user();
                f.grant(ResourceKind::Document, f.document, user, direct).await;
                f.grant(ResourceKind::Project, f.project, user, inherited).await;

                let effective = f.effective(user, ResourceKind::Document, f.document).await;
                assert_eq!(effective, Some(direct.max(inherited)), "{direct} + {inherited}");
            }
        }
    }

    #[tokio::test]
    async fn can_access_agrees_with_effective_capability() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grant(ResourceKind::Project, f.project, user, Create).await;

        for (kind, id) in [
            (ResourceKind::Organization, f.org),
            (ResourceKind::Project, f.project),
            (ResourceKind::Document, f.document),
        ] {
            let effective = f.effective(user, kind, id).await;
            for required in CapabilityLevel::ALL {
                let expected = effective.map(|level| level.implies(required)).unwrap_or(false);
                assert_eq!(f.resolver.can_access(user, kind, id, required).await, expected);
            }
        }
    }

    #[tokio::test]
    async fn revoking_only_grant_denies_everything() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        let grant = f.grant(ResourceKind::Organization, f.org, user, Manage).await;

        assert!(f.grants.for_kind(ResourceKind::Organization).revoke(grant.id).await.unwrap());

        assert_eq!(f.effective(user, ResourceKind::Document, f.document).await, None);
        assert!(!f.resolver.can_access(user, ResourceKind::Document, f.document, Invite).await);
    }

    #[tokio::test]
    async fn regranting_same_level_changes_nothing() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grant(ResourceKind::Project, f.project, user, Create).await;
        let before = f.effective(user, ResourceKind::Document, f.document).await;
        f.grant(ResourceKind::Project, f.project, user, Create).await;

        let rows = f.grants.for_kind(ResourceKind::Project).list_by_resource(f.project).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(f.effective(user, ResourceKind::Document, f.document).await, before);
    }

    #[tokio::test]
    async fn vanished_ancestor_contributes_nothing() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grant(ResourceKind::Organization, f.org, user, Manage).await;
        f.grant(ResourceKind::Document, f.document, user, Invite).await;

        f.hierarchy.remove(ResourceRef::project(f.project));

        let resolution = f.resolver.explain(user, ResourceRef::document(f.document)).await;
        assert_eq!(resolution.effective, Some(Invite));
        assert_eq!(resolution.chain.len(), 2);
    }

    #[tokio::test]
    async fn missing_resource_keeps_its_direct_grant() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grant(ResourceKind::Document, f.document, user, Create).await;
        f.hierarchy.remove(ResourceRef::document(f.document));

        assert_eq!(f.effective(user, ResourceKind::Document, f.document).await, Some(Create));
        assert_eq!(f.effective(user, ResourceKind::Document, Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn explain_lists_chain_target_first() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grant(ResourceKind::Project, f.project, user, Create).await;

        let resolution = f.resolver.explain(user, ResourceRef::document(f.document)).await;

        let walked: Vec<_> = resolution.chain.iter().map(|level| (level.resource, level.direct)).collect();
        assert_eq!(
            walked,
            vec![
                (ResourceRef::document(f.document), None),
                (ResourceRef::project(f.project), Some(Create)),
                (ResourceRef::organization(f.org), None),
            ]
        );
        assert!(resolution.allows(Invite));
        assert!(!resolution.allows(Manage));
    }

    struct FailingStore(ResourceKind);

    #[async_trait]
    impl GrantStore for FailingStore {
        fn kind(&self) -> ResourceKind {
            self.0
        }
        async fn find_by_resource_and_user(&self, _: Uuid, _: Uuid) -> AppResult<Option<PermissionGrant>> {
            Err(AppError::internal("store offline"))
        }
        async fn find_by_id(&self, _: Uuid) -> AppResult<Option<PermissionGrant>> {
            Err(AppError::internal("store offline"))
        }
        async fn grant(&self, _: Uuid, _: Uuid, _: CapabilityLevel) -> AppResult<PermissionGrant> {
            Err(AppError::internal("store offline"))
        }
        async fn update_capability(&self, _: Uuid, _: CapabilityLevel) -> AppResult<Option<PermissionGrant>> {
            Err(AppError::internal("store offline"))
        }
        async fn revoke(&self, _: Uuid) -> AppResult<bool> {
            Err(AppError::internal("store offline"))
        }
        async fn revoke_by_resource_and_user(&self, _: Uuid, _: Uuid) -> AppResult<bool> {
            Err(AppError::internal("store offline"))
        }
        async fn list_by_resource(&self, _: Uuid) -> AppResult<Vec<PermissionGrant>> {
            Err(AppError::internal("store offline"))
        }
        async fn list_by_user(&self, _: Uuid) -> AppResult<Vec<PermissionGrant>> {
            Err(AppError::internal("store offline"))
        }
    }

    #[tokio::test]
    async fn failing_store_counts_as_absence() {
        let hierarchy = MemoryHierarchy::new();
        let org = hierarchy.add_organization();
        let project = hierarchy.add_project(org);
        let user = hierarchy.add_user();

        let projects = MemoryGrantStore::new(ResourceKind::Project);
        projects.grant(project, user, Invite).await.unwrap();

        let grants = GrantStores::new(
            Arc::new(FailingStore(ResourceKind::Organization)),
            Arc::new(projects),
            Arc::new(MemoryGrantStore::new(ResourceKind::Document)),
        );
        let resolver = PermissionResolver::new(grants, hierarchy.ancestry());

        assert_eq!(resolver.effective_capability(user, ResourceKind::Project, project).await, Some(Invite));
        assert_eq!(resolver.effective_capability(user, ResourceKind::Organization, org).await, None);
    }
}
