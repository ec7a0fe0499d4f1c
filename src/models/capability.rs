use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Capability a user holds on a resource.
///
/// Totally ordered: `Invite < Create < Manage`. A higher level implies every
/// lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapabilityLevel {
    /// Can invite other users to the resource.
    Invite,
    /// Can create and edit content.
    Create,
    /// Full management, including permissions.
    Manage,
}

impl CapabilityLevel {
    pub const ALL: [CapabilityLevel; 3] = [Self::Invite, Self::Create, Self::Manage];

    pub const fn rank(self) -> u8 {
        match self {
            Self::Invite => 0,
            Self::Create => 1,
            Self::Manage => 2,
        }
    }

    pub const fn implies(self, required: CapabilityLevel) -> bool {
        self.rank() >= required.rank()
    }

    /// Merge rule for effective capabilities: the higher-ranked level wins and
    /// absence is neutral.
    pub fn highest(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (None, other) | (other, None) => other,
            (Some(a), Some(b)) => Some(if a.rank() >= b.rank() { a } else { b }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invite => "INVITE",
            Self::Create => "CREATE",
            Self::Manage => "MANAGE",
        }
    }
}

impl PartialOrd for CapabilityLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CapabilityLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for CapabilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        match normalized.strip_prefix("CAN_").unwrap_or(&normalized) {
            "INVITE" => Ok(Self::Invite),
            "CREATE" => Ok(Self::Create),
            "MANAGE" => Ok(Self::Manage),
            _ => Err(AppError::bad_request(format!("unknown capability level: {s}"))),
        }
    }
}

/// The three securable resource kinds, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Organization,
    Project,
    Document,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Organization, Self::Project, Self::Document];

    pub const fn parent(self) -> Option<ResourceKind> {
        match self {
            Self::Organization => None,
            Self::Project => Some(Self::Organization),
            Self::Document => Some(Self::Project),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Project => "project",
            Self::Document => "document",
        }
    }

    /// Table holding the entities of this kind.
    pub fn entity_table(&self) -> &'static str {
        match self {
            Self::Organization => "organizations",
            Self::Project => "projects",
            Self::Document => "documents",
        }
    }

    /// Table holding the direct grants on this kind.
    pub fn grant_table(&self) -> &'static str {
        match self {
            Self::Organization => "organization_permissions",
            Self::Project => "project_permissions",
            Self::Document => "document_permissions",
        }
    }

    /// Column of the grant table referencing the resource.
    pub fn grant_column(&self) -> &'static str {
        match self {
            Self::Organization => "organization_id",
            Self::Project => "project_id",
            Self::Document => "document_id",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "organization" | "organizations" => Ok(Self::Organization),
            "project" | "projects" => Ok(Self::Project),
            "document" | "documents" => Ok(Self::Document),
            _ => Err(AppError::bad_request(format!("unknown resource kind: {s}"))),
        }
    }
}

/// A concrete resource: kind plus id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: Uuid,
}

impl ResourceRef {
    pub const fn new(kind: ResourceKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    pub const fn organization(id: Uuid) -> Self {
        Self::new(ResourceKind::Organization, id)
    }

    pub const fn project(id: Uuid) -> Self {
        Self::new(ResourceKind::Project, id)
    }

    pub const fn document(id: Uuid) -> Self {
        Self::new(ResourceKind::Document, id)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implies_follows_rank() {
        for held in CapabilityLevel::ALL {
            for required in CapabilityLevel::ALL {
                assert_eq!(held.implies(required), held.rank() >= required.rank());
            }
        }
        assert!(CapabilityLevel::Manage.implies(CapabilityLevel::Invite));
        assert!(!CapabilityLevel::Invite.implies(CapabilityLevel::Create));
    }

    #[test]
    fn highest_is_idempotent_and_absence_neutral() {
        use CapabilityLevel::*;

        for level in CapabilityLevel::ALL {
            assert_eq!(CapabilityLevel::highest(Some(level), Some(level)), Some(level));
            assert_eq!(CapabilityLevel::highest(Some(level), None), Some(level));
            assert_eq!(CapabilityLevel::highest(None, Some(level)), Some(level));
        }
        assert_eq!(CapabilityLevel::highest(None, None), None);
        assert_eq!(CapabilityLevel::highest(Some(Invite), Some(Manage)), Some(Manage));
        assert_eq!(CapabilityLevel::highest(Some(Create), Some(Invite)), Some(Create));
    }

    #[test]
    fn parses_current_and_legacy_spellings() {
        assert_eq!("MANAGE".parse::<CapabilityLevel>().unwrap(), CapabilityLevel::Manage);
        assert_eq!("can_create".parse::<CapabilityLevel>().unwrap(), CapabilityLevel::Create);
        assert_eq!(" invite ".parse::<CapabilityLevel>().unwrap(), CapabilityLevel::Invite);
        assert!("OWNER".parse::<CapabilityLevel>().is_err());
    }

    #[test]
    fn serde_uses_upper_case_names() {
        let json = serde_json::to_string(&CapabilityLevel::Create).unwrap();
        assert_eq!(json, "\"CREATE\"");
        let kind: ResourceKind = serde_json::from_str("\"DOCUMENT\"").unwrap();
        assert_eq!(kind, ResourceKind::Document);
    }

    #[test]
    fn hierarchy_ends_at_organization() {
        assert_eq!(ResourceKind::Document.parent(), Some(ResourceKind::Project));
        assert_eq!(ResourceKind::Project.parent(), Some(ResourceKind::Organization));
        assert_eq!(ResourceKind::Organization.parent(), None);
        assert_eq!("projects".parse::<ResourceKind>().unwrap(), ResourceKind::Project);
    }
}
