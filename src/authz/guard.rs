use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use axum::extract::{Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::MethodRouter;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::reference::{ReferenceKind, ReferenceRegistry};
use crate::authz::resolver::PermissionResolver;
use crate::errors::{AppError, AppResult};
use crate::jwt::{resolve_caller, AuthUser};
use crate::models::capability::{CapabilityLevel, ResourceKind, ResourceRef};

/// How the identifying parameter of a protected operation names its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The parameter is the resource id itself.
    Direct,
    /// The parameter references an object owned by the resource.
    Indirect(ReferenceKind),
}

/// Declared access requirement of a protected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub kind: ResourceKind,
    pub capability: CapabilityLevel,
    pub target: Target,
    /// Path parameter carrying the reference id.
    pub param: &'static str,
}

impl Requirement {
    pub const fn new(kind: ResourceKind, capability: CapabilityLevel) -> Self {
        Self {
            kind,
            capability,
            target: Target::Direct,
            param: "id",
        }
    }

    pub const fn via(mut self, reference: ReferenceKind) -> Self {
        self.target = Target::Indirect(reference);
        self
    }

    pub const fn param(mut self, name: &'static str) -> Self {
        self.param = name;
        self
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.capability, self.kind)?;
        if let Target::Indirect(reference) = self.target {
            write!(f, " via {reference}")?;
        }
        Ok(())
    }
}

/// Allow/deny gate in front of protected operations. Fails closed.
#[derive(Clone)]
pub struct AccessGuard {
    resolver: PermissionResolver,
    references: ReferenceRegistry,
}

impl AccessGuard {
    pub fn new(resolver: PermissionResolver, references: ReferenceRegistry) -> Self {
        Self {
            resolver,
            references,
        }
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Checks `caller` against `requirement` and returns the resolved target.
    ///
    /// `Unauthorized` without a caller, `ReferenceNotFound` for a dangling
    /// indirect reference, `Forbidden` when the effective capability is
    /// insufficient.
    pub async fn authorize(
        &self,
        caller: Option<Uuid>,
        requirement: &Requirement,
        reference_id: Uuid,
    ) -> AppResult<ResourceRef> {
        let Some(user_id) = caller else {
            tracing::info!(requirement = %requirement, %reference_id, "denied unauthenticated caller");
            return Err(AppError::unauthorized("authentication required"));
        };

        let resource = match requirement.target {
            Target::Direct => ResourceRef::new(requirement.kind, reference_id),
            Target::Indirect(reference) => self
                .references
                .translate(reference, requirement.kind, reference_id)
                .await
                .inspect_err(|err| {
                    tracing::info!(%user_id, requirement = %requirement, %reference_id, error = %err, "reference translation failed");
                })?,
        };

        if self
            .resolver
            .can_access(user_id, resource.kind, resource.id, requirement.capability)
            .await
        {
            tracing::debug!(%user_id, %resource, requirement = %requirement, "access granted");
            Ok(resource)
        } else {
            tracing::info!(%user_id, %resource, requirement = %requirement, "access denied");
            Err(AppError::forbidden(format!(
                "{} required on {}",
                requirement.capability, resource
            )))
        }
    }

    /// Runs `op` only after `authorize` succeeds; `op`'s result is returned
    /// unchanged.
    pub async fn guarded<F, Fut, T>(
        &self,
        caller: Option<Uuid>,
        requirement: &Requirement,
        reference_id: Uuid,
        op: F,
    ) -> AppResult<T>
    where
        F: FnOnce(ResourceRef) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let resource = self.authorize(caller, requirement, reference_id).await?;
        op(resource).await
    }
}

#[derive(Clone)]
struct Enforced {
    state: AppState,
    requirement: Requirement,
}

/// Puts `route` behind the access guard.
///
/// The caller comes from the bearer token and the reference id from the
/// path parameter named by the requirement. Handlers find the resolved
/// [`ResourceRef`] and the [`AuthUser`] in request extensions.
pub fn secured(state: &AppState, requirement: Requirement, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        Enforced {
            state: state.clone(),
            requirement,
        },
        enforce,
    ))
}

async fn enforce(
    State(enforced): State<Enforced>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Enforced { state, requirement } = enforced;

    let caller = resolve_caller(&state, request.headers()).await?;
    let reference_id = if caller.is_some() {
        reference_param(&params, requirement.param)?
    } else {
        // Rejected by `authorize` before the id is looked at.
        Uuid::nil()
    };

    let resource = state.guard.authorize(caller, &requirement, reference_id).await?;

    if let Some(user_id) = caller {
        request.extensions_mut().insert(AuthUser { user_id });
    }
    request.extensions_mut().insert(resource);

    Ok(next.run(request).await)
}

/// Reads the named path parameter, falling back to the only UUID-valued
/// parameter when the default name is absent.
fn reference_param(params: &HashMap<String, String>, name: &str) -> AppResult<Uuid> {
    if let Some(raw) = params.get(name) {
        return Uuid::parse_str(raw).map_err(|_| AppError::bad_request(format!("invalid {name}: {raw}")));
    }

    let mut uuids = params.values().filter_map(|raw| Uuid::parse_str(raw).ok());
    match (uuids.next(), uuids.next()) {
        (Some(id), None) => Ok(id),
        _ => Err(AppError::bad_request(format!("missing path parameter {name}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::authz::memory::MemoryHierarchy;
    use crate::authz::store::GrantStores;
    use crate::models::capability::CapabilityLevel::*;

    struct Fixture {
        hierarchy: MemoryHierarchy,
        grants: GrantStores,
        guard: AccessGuard,
        project: Uuid,
        document: Uuid,
    }

    fn fixture() -> Fixture {
        let hierarchy = MemoryHierarchy::new();
        let project = hierarchy.add_project(hierarchy.add_organization());
        let document = hierarchy.add_document(project);
        let grants = hierarchy.grant_stores();
        let references = ReferenceRegistry::new()
            .with(ReferenceKind::DocumentVersion, hierarchy.version_owner())
            .with_grant_owners(&grants);
        let guard = AccessGuard::new(PermissionResolver::new(grants.clone(), hierarchy.ancestry()), references);

        Fixture {
            hierarchy,
            grants,
            guard,
            project,
            document,
        }
    }

    const READ_VERSION: Requirement = Requirement::new(ResourceKind::Document, Invite).via(ReferenceKind::DocumentVersion);

    #[tokio::test]
    async fn missing_caller_is_unauthorized_before_anything_else() {
        let f = fixture();
        let err = f.guard.authorize(None, &READ_VERSION, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn insufficient_capability_is_forbidden() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grants.for_kind(ResourceKind::Project).grant(f.project, user, Create).await.unwrap();

        let requirement = Requirement::new(ResourceKind::Document, Manage);
        let err = f.guard.authorize(Some(user), &requirement, f.document).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let requirement = Requirement::new(ResourceKind::Document, Create);
        let resource = f.guard.authorize(Some(user), &requirement, f.document).await.unwrap();
        assert_eq!(resource, ResourceRef::document(f.document));
    }

    #[tokio::test]
    async fn version_reference_resolves_to_document() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        let version = f.hierarchy.add_version(Some(f.document));
        f.grants.for_kind(ResourceKind::Document).grant(f.document, user, Invite).await.unwrap();

        let resource = f.guard.authorize(Some(user), &READ_VERSION, version).await.unwrap();
        assert_eq!(resource, ResourceRef::document(f.document));

        let write = Requirement::new(ResourceKind::Document, Create).via(ReferenceKind::DocumentVersion);
        let err = f.guard.authorize(Some(user), &write, version).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn dangling_version_is_reference_not_found() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        let orphan = f.hierarchy.add_version(None);

        for id in [orphan, Uuid::new_v4()] {
            let err = f.guard.authorize(Some(user), &READ_VERSION, id).await.unwrap_err();
            assert!(matches!(err, AppError::ReferenceNotFound(_)));
        }
    }

    #[tokio::test]
    async fn denied_operation_never_runs() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        let runs = AtomicUsize::new(0);
        let requirement = Requirement::new(ResourceKind::Project, Invite);

        let result = f
            .guard
            .guarded(Some(user), &requirement, f.project, |_| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let result = f
            .guard
            .guarded(None, &requirement, f.project, |_| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn allowed_operation_result_is_returned_unchanged() {
        let f = fixture();
        let user = f.hierarchy.add_user();
        f.grants.for_kind(ResourceKind::Project).grant(f.project, user, Manage).await.unwrap();
        let requirement = Requirement::new(ResourceKind::Document, Manage);

        let value = f
            .guard
            .guarded(Some(user), &requirement, f.document, |resource| async move {
                Ok(resource.id.to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, f.document.to_string());

        let err = f
            .guard
            .guarded(Some(user), &requirement, f.document, |_| async {
                Err::<(), _>(AppError::conflict("already archived"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn grant_reference_is_guarded_on_its_resource() {
        let f = fixture();
        let admin = f.hierarchy.add_user();
        let member = f.hierarchy.add_user();
        f.grants.for_kind(ResourceKind::Project).grant(f.project, admin, Manage).await.unwrap();
        let grant = f
            .grants
            .for_kind(ResourceKind::Document)
            .grant(f.document, member, Invite)
            .await
            .unwrap();

        let requirement = Requirement::new(ResourceKind::Document, Manage).via(ReferenceKind::DocumentGrant);
        let resource = f.guard.authorize(Some(admin), &requirement, grant.id).await.unwrap();
        assert_eq!(resource, ResourceRef::document(f.document));

        let err = f.guard.authorize(Some(member), &requirement, grant.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn reference_param_falls_back_to_single_uuid() {
        let id = Uuid::new_v4();
        let params = HashMap::from([("uuid".to_string(), id.to_string())]);
        assert_eq!(reference_param(&params, "id").unwrap(), id);

        let params = HashMap::from([("id".to_string(), "nope".to_string())]);
        assert!(matches!(reference_param(&params, "id"), Err(AppError::BadRequest(_))));

        let params = HashMap::from([
            ("a".to_string(), Uuid::new_v4().to_string()),
            ("b".to_string(), Uuid::new_v4().to_string()),
        ]);
        assert!(reference_param(&params, "id").is_err());
    }

    #[test]
    fn requirement_display_names_reference() {
        assert_eq!(READ_VERSION.to_string(), "INVITE on document via document_version");
        assert_eq!(Requirement::new(ResourceKind::Project, Manage).param("project_id").param, "project_id");
    }
}
