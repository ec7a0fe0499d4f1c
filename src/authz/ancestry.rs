use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::LookupError;
use crate::models::capability::{ResourceKind, ResourceRef};

/// Existence and parent-id lookup for the entities of one resource kind.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Id of the parent entity (of kind `self.kind().parent()`), or `None` for
    /// a root. `ResourceNotFound` when the entity does not exist.
    async fn parent_of(&self, id: Uuid) -> Result<Option<Uuid>, LookupError>;
}

/// Answers "what owns this resource" for the whole hierarchy.
#[derive(Clone)]
pub struct AncestryResolver {
    organizations: Arc<dyn EntityLookup>,
    projects: Arc<dyn EntityLookup>,
    documents: Arc<dyn EntityLookup>,
}

impl AncestryResolver {
    pub fn new(
        organizations: Arc<dyn EntityLookup>,
        projects: Arc<dyn EntityLookup>,
        documents: Arc<dyn EntityLookup>,
    ) -> Self {
        debug_assert_eq!(organizations.kind(), ResourceKind::Organization);
        debug_assert_eq!(projects.kind(), ResourceKind::Project);
        debug_assert_eq!(documents.kind(), ResourceKind::Document);

        Self {
            organizations,
            projects,
            documents,
        }
    }

    fn lookup(&self, kind: ResourceKind) -> &Arc<dyn EntityLookup> {
        match kind {
            ResourceKind::Organization => &self.organizations,
            ResourceKind::Project => &self.projects,
            ResourceKind::Document => &self.documents,
        }
    }

    /// Immediate parent of `resource`; `None` at the root.
    pub async fn parent_of(&self, resource: ResourceRef) -> Result<Option<ResourceRef>, LookupError> {
        let parent_id = self.lookup(resource.kind).parent_of(resource.id).await?;

        match (resource.kind.parent(), parent_id) {
            (Some(parent_kind), Some(id)) => Ok(Some(ResourceRef::new(parent_kind, id))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(LookupError::Backend(format!(
                "{resource} has no parent reference"
            ))),
            (None, Some(_)) => Err(LookupError::Backend(format!(
                "{resource} is a root kind but reported a parent"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::memory::MemoryHierarchy;

    #[tokio::test]
    async fn walks_document_to_organization() {
        let hierarchy = MemoryHierarchy::new();
        let org = hierarchy.add_organization();
        let project = hierarchy.add_project(org);
        let document = hierarchy.add_document(project);
        let ancestry = hierarchy.ancestry();

        let parent = ancestry.parent_of(ResourceRef::document(document)).await.unwrap();
        assert_eq!(parent, Some(ResourceRef::project(project)));

        let grandparent = ancestry.parent_of(ResourceRef::project(project)).await.unwrap();
        assert_eq!(grandparent, Some(ResourceRef::organization(org)));

        let root = ancestry.parent_of(ResourceRef::organization(org)).await.unwrap();
        assert_eq!(root, None);
    }

    #[tokio::test]
    async fn missing_resource_is_reported() {
        let hierarchy = MemoryHierarchy::new();
        let ancestry = hierarchy.ancestry();

        let err = ancestry
            .parent_of(ResourceRef::document(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::ResourceNotFound { kind: ResourceKind::Document, .. }));
    }
}
