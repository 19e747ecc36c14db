//! Role location and entity resolution.
//!
//! - **locator**: `(role, ordered patterns)` rules resolved against canonical columns
//! - **roles**: built-in role groups for each dimension builder and fact loader
//! - **resolver**: exact / partial / fuzzy matching of free text to catalog codes

pub mod error;
pub mod locator;
pub mod resolver;
pub mod roles;

pub use error::{MapError, Result, SchemaError};
pub use locator::{FieldLocator, RoleMap, RoleSpec};
pub use resolver::{
    FuzzyResolver, Resolution, ResolutionStats, ResolverOptions, TextNormalizer,
    UnresolvedPolicy, token_sort_score,
};
pub use roles::{RoleCatalog, RoleGroup, RoleOverrides};
