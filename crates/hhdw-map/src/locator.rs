//! Data-driven field-role location.
//!
//! A role is a semantic slot (patient id, insurer, date, ...) described by an
//! ordered list of regular expressions. For each role, patterns are tried in
//! priority order and, for each pattern, columns are scanned in source order;
//! the first hit wins. Patterns are unanchored searches over canonical names.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MapError, Result, SchemaError};

/// Configuration of one role: its name and prioritized patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub role: String,
    pub patterns: Vec<String>,
}

impl RoleSpec {
    pub fn new(role: &str, patterns: &[&str]) -> Self {
        Self {
            role: role.to_string(),
            patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRole {
    role: String,
    patterns: Vec<Regex>,
}

/// Compiled role rules for one source shape.
#[derive(Debug, Clone)]
pub struct FieldLocator {
    roles: Vec<CompiledRole>,
}

impl FieldLocator {
    pub fn new(specs: &[RoleSpec]) -> Result<Self> {
        let roles = specs
            .iter()
            .map(|spec| {
                let patterns = spec
                    .patterns
                    .iter()
                    .map(|pattern| {
                        Regex::new(pattern).map_err(|source| MapError::InvalidPattern {
                            role: spec.role.clone(),
                            pattern: pattern.clone(),
                            source,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledRole {
                    role: spec.role.clone(),
                    patterns,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { roles })
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.role.as_str())
    }

    /// Resolves every role against `columns`. Roles with no match are absent.
    pub fn locate<S: AsRef<str>>(&self, columns: &[S]) -> RoleMap {
        let mut resolved = BTreeMap::new();
        for role in &self.roles {
            let column = first_match(&role.patterns, columns);
            debug!(role = %role.role, column = ?column, "role located");
            resolved.insert(role.role.clone(), column);
        }
        RoleMap { resolved }
    }
}

fn first_match<S: AsRef<str>>(patterns: &[Regex], columns: &[S]) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        columns
            .iter()
            .map(AsRef::as_ref)
            .find(|column| pattern.is_match(column))
            .map(str::to_string)
    })
}

/// Role name to located column for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleMap {
    resolved: BTreeMap<String, Option<String>>,
}

impl RoleMap {
    /// Located column, or `None` when the role is absent or unknown.
    pub fn get(&self, role: &str) -> Option<&str> {
        self.resolved.get(role).and_then(|c| c.as_deref())
    }

    pub fn require(&self, role: &str) -> std::result::Result<&str, SchemaError> {
        self.get(role).ok_or_else(|| SchemaError::RoleAbsent {
            role: role.to_string(),
        })
    }

    pub fn is_present(&self, role: &str) -> bool {
        self.get(role).is_some()
    }

    /// Fails with the first role in `roles` that is absent.
    pub fn require_all(&self, roles: &[&str]) -> std::result::Result<(), SchemaError> {
        roles.iter().try_for_each(|role| self.require(role).map(|_| ()))
    }

    pub fn absent_roles(&self) -> impl Iterator<Item = &str> {
        self.resolved
            .iter()
            .filter(|(_, column)| column.is_none())
            .map(|(role, _)| role.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.resolved
            .iter()
            .map(|(role, column)| (role.as_str(), column.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_order_beats_column_order() {
        let locator = FieldLocator::new(&[RoleSpec::new(
            "patient_id",
            &[r"(docu|id).*pac", r"identificacion"],
        )])
        .expect("compile");
        let map = locator.locate(&["identificacion", "nombre", "documento_paciente"]);
        assert_eq!(map.get("patient_id"), Some("documento_paciente"));
    }

    #[test]
    fn column_order_breaks_ties_within_pattern() {
        let locator =
            FieldLocator::new(&[RoleSpec::new("date", &[r"fecha"])]).expect("compile");
        let map = locator.locate(&["fecha_entrega", "fecha_solicitud"]);
        assert_eq!(map.get("date"), Some("fecha_entrega"));
    }

    #[test]
    fn absent_role_is_not_an_error_until_required() {
        let locator = FieldLocator::new(&[RoleSpec::new("zone", &[r"zona|barrio"])])
            .expect("compile");
        let map = locator.locate(&["nombre"]);
        assert_eq!(map.get("zone"), None);
        assert_eq!(
            map.require("zone"),
            Err(SchemaError::RoleAbsent {
                role: "zone".to_string()
            })
        );
        assert_eq!(map.absent_roles().collect::<Vec<_>>(), vec!["zone"]);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = FieldLocator::new(&[RoleSpec::new("bad", &["(unclosed"])]).unwrap_err();
        assert!(matches!(err, MapError::InvalidPattern { .. }));
    }
}
