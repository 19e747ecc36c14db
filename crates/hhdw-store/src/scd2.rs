//! Versioning decisions shared by every store backend.
//!
//! Backends fetch the current version under their write lock, ask
//! [`plan_upsert`] what to do, and apply the plan before releasing the lock.
//! Keeping the decision pure means the memory and SQLite stores cannot
//! disagree on what counts as a change.

use chrono::NaiveDateTime;

use hhdw_model::{Attributes, DimensionKind, DimensionVersion, SurrogateId, Versioning};
use hhdw_transform::canonical_date_text;

use crate::error::{Result, StoreError};

/// What an upsert did to the dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    /// No current version existed; one was created.
    Inserted,
    /// Attributes matched the current version; nothing was written.
    Unchanged,
    /// The current version was closed and a new one opened.
    Versioned { closed: SurrogateId },
    /// Catalog dimension: attributes replaced on the single current row.
    Overwritten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Surrogate id of the version that is current after the upsert.
    pub surrogate_id: SurrogateId,
    pub action: UpsertAction,
}

/// Backend-independent upsert decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertPlan {
    Insert {
        valid_from: NaiveDateTime,
    },
    Unchanged(SurrogateId),
    /// Close `close` at `at`, then open a new version valid from `at`.
    Version {
        close: SurrogateId,
        at: NaiveDateTime,
    },
    Overwrite(SurrogateId),
}

/// Comparison form of one attribute value.
///
/// Text is trimmed and lowercased, `None` equals the empty string, and date
/// attributes compare on their `YYYY-MM-DD` rendering.
pub fn comparable_value(kind: DimensionKind, attribute: &str, value: Option<&str>) -> String {
    let trimmed = value.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return String::new();
    }
    if kind.is_date_attribute(attribute) {
        canonical_date_text(trimmed).to_lowercase()
    } else {
        trimmed.to_lowercase()
    }
}

/// True when every tracked attribute compares equal.
pub fn attributes_equal(kind: DimensionKind, current: &Attributes, incoming: &Attributes) -> bool {
    kind.tracked_attributes().iter().all(|attribute| {
        let a = current.get(*attribute).and_then(|v| v.as_deref());
        let b = incoming.get(*attribute).and_then(|v| v.as_deref());
        comparable_value(kind, attribute, a) == comparable_value(kind, attribute, b)
    })
}

/// Restricts an attribute set to the kind's tracked attributes in storage form.
///
/// Values are trimmed, blanks become `None`, date attributes are stored as
/// `YYYY-MM-DD` when parseable. Attributes the kind does not track are
/// rejected rather than silently dropped.
pub fn prepare_attributes(kind: DimensionKind, attributes: &Attributes) -> Result<Attributes> {
    if let Some(unknown) = attributes
        .keys()
        .find(|name| !kind.tracked_attributes().contains(&name.as_str()))
    {
        return Err(StoreError::UnknownAttribute {
            kind,
            attribute: unknown.clone(),
        });
    }
    let mut prepared = kind.empty_attributes();
    for (name, slot) in &mut prepared {
        let value = attributes
            .get(name)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        *slot = value.map(|v| {
            if kind.is_date_attribute(name) {
                canonical_date_text(v)
            } else {
                v.to_string()
            }
        });
    }
    Ok(prepared)
}

/// Decides how to apply `incoming` given the current version, if any.
///
/// Closing never produces `valid_to < valid_from`: when the clock reads
/// earlier than the current version's start, the transition happens at that
/// start instead.
pub fn plan_upsert(
    kind: DimensionKind,
    current: Option<&DimensionVersion>,
    incoming: &Attributes,
    now: NaiveDateTime,
) -> UpsertPlan {
    let Some(current) = current else {
        return UpsertPlan::Insert { valid_from: now };
    };
    if attributes_equal(kind, &current.attributes, incoming) {
        return UpsertPlan::Unchanged(current.surrogate_id);
    }
    match kind.versioning() {
        Versioning::Scd2 => UpsertPlan::Version {
            close: current.surrogate_id,
            at: now.max(current.valid_from),
        },
        Versioning::Overwrite => UpsertPlan::Overwrite(current.surrogate_id),
    }
}

/// Fails unless at most one current version exists.
pub fn single_current(
    kind: DimensionKind,
    key: &str,
    mut current: Vec<DimensionVersion>,
) -> Result<Option<DimensionVersion>> {
    match current.len() {
        0 => Ok(None),
        1 => Ok(current.pop()),
        n => Err(StoreError::VersioningConflict {
            kind,
            key: key.to_string(),
            current: n,
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use hhdw_model::NaturalKey;

    use super::*;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .expect("date")
            .and_hms_opt(8, 0, 0)
            .expect("time")
    }

    fn attrs(kind: DimensionKind, pairs: &[(&str, &str)]) -> Attributes {
        let mut attributes = kind.empty_attributes();
        for (name, value) in pairs {
            attributes.insert((*name).to_string(), Some((*value).to_string()));
        }
        attributes
    }

    fn version(
        kind: DimensionKind,
        attributes: Attributes,
        valid_from: NaiveDateTime,
    ) -> DimensionVersion {
        DimensionVersion {
            surrogate_id: SurrogateId(7),
            kind,
            natural_key: NaturalKey::new("EQ-001").expect("key"),
            attributes,
            valid_from,
            valid_to: None,
            is_current: true,
        }
    }

    #[test]
    fn comparison_ignores_case_whitespace_and_blank() {
        let kind = DimensionKind::Equipment;
        let a = attrs(kind, &[("equipo", "Bomba de infusión ")]);
        let b = attrs(kind, &[("equipo", "BOMBA DE INFUSIÓN"), ("estado_equipo", "  ")]);
        assert!(attributes_equal(kind, &a, &b));
    }

    #[test]
    fn admission_dates_compare_as_dates() {
        let kind = DimensionKind::Patient;
        let a = attrs(kind, &[("fecha_ingreso", "2024-01-15")]);
        let b = attrs(kind, &[("fecha_ingreso", "15/01/2024")]);
        let c = attrs(kind, &[("fecha_ingreso", "16/01/2024")]);
        assert!(attributes_equal(kind, &a, &b));
        assert!(!attributes_equal(kind, &a, &c));
    }

    #[test]
    fn change_closes_at_or_after_valid_from() {
        let kind = DimensionKind::Equipment;
        let current = version(kind, attrs(kind, &[("equipo", "PUMP A")]), ts(10));
        let incoming = attrs(kind, &[("equipo", "PUMP B")]);

        let plan = plan_upsert(kind, Some(&current), &incoming, ts(12));
        assert_eq!(
            plan,
            UpsertPlan::Version {
                close: SurrogateId(7),
                at: ts(12)
            }
        );

        let skewed = plan_upsert(kind, Some(&current), &incoming, ts(1));
        assert_eq!(
            skewed,
            UpsertPlan::Version {
                close: SurrogateId(7),
                at: ts(10)
            }
        );
    }

    #[test]
    fn catalog_kinds_overwrite() {
        let kind = DimensionKind::Medication;
        let mut current = version(kind, attrs(kind, &[("nombre", "ACETAMINOFEN")]), ts(1));
        current.surrogate_id = SurrogateId(3);
        let incoming = attrs(kind, &[("nombre", "ACETAMINOFEN"), ("via_administracion", "ORAL")]);
        assert_eq!(
            plan_upsert(kind, Some(&current), &incoming, ts(2)),
            UpsertPlan::Overwrite(SurrogateId(3))
        );
    }

    #[test]
    fn prepare_rejects_untracked_and_canonicalizes_dates() {
        let kind = DimensionKind::Patient;
        let incoming = attrs(kind, &[("fecha_ingreso", "15/01/2024"), ("nombre", " ANA ")]);
        let prepared = prepare_attributes(kind, &incoming).expect("prepared");
        assert_eq!(prepared["fecha_ingreso"].as_deref(), Some("2024-01-15"));
        assert_eq!(prepared["nombre"].as_deref(), Some("ANA"));
        assert_eq!(prepared["zona"], None);

        let mut bad = kind.empty_attributes();
        bad.insert("color".to_string(), Some("azul".to_string()));
        assert!(matches!(
            prepare_attributes(kind, &bad),
            Err(StoreError::UnknownAttribute { .. })
        ));
    }
}
