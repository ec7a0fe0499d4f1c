//! Authorization core.
//!
//! Capabilities are granted per resource and inherited downwards through
//! Organization -> Project -> Document; the effective capability is the
//! highest one found along the chain. Protected routes go through the
//! [`AccessGuard`], which denies by default.

pub mod ancestry;
pub mod guard;
pub mod memory;
pub mod reference;
pub mod resolver;
pub mod store;

pub use ancestry::{AncestryResolver, EntityLookup};
pub use guard::{secured, AccessGuard, Requirement, Target};
pub use memory::{MemoryGrantStore, MemoryHierarchy};
pub use reference::{GrantOwner, ReferenceKind, ReferenceRegistry, ReferenceTranslator};
pub use resolver::PermissionResolver;
pub use store::{GrantStore, GrantStores};
