use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::keys::{NaturalKey, SurrogateId};

/// Tracked attribute values of one dimension version, keyed by attribute name.
///
/// `None` and an empty string are treated as the same value by the
/// versioning engine.
pub type Attributes = BTreeMap<String, Option<String>>;

/// How a dimension handles attribute changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Versioning {
    /// Slowly changing dimension, type 2: every change opens a new version.
    Scd2,
    /// Catalog-style: attributes are overwritten in place on the single current row.
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Patient,
    Equipment,
    Insurer,
    Medication,
    Order,
}

const PATIENT_ATTRIBUTES: &[&str] = &[
    "nombre",
    "municipio",
    "estado",
    "aseguradora",
    "zona",
    "fecha_ingreso",
];
const EQUIPMENT_ATTRIBUTES: &[&str] = &["equipo", "estado_equipo"];
const INSURER_ATTRIBUTES: &[&str] = &["aseguradora"];
const MEDICATION_ATTRIBUTES: &[&str] = &["nombre", "forma_farmaceutica", "via_administracion"];
const ORDER_ATTRIBUTES: &[&str] = &["insumo_solicitado", "cantidad"];

impl DimensionKind {
    pub const ALL: [DimensionKind; 5] = [
        DimensionKind::Patient,
        DimensionKind::Equipment,
        DimensionKind::Insurer,
        DimensionKind::Medication,
        DimensionKind::Order,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DimensionKind::Patient => "patient",
            DimensionKind::Equipment => "equipment",
            DimensionKind::Insurer => "insurer",
            DimensionKind::Medication => "medication",
            DimensionKind::Order => "order",
        }
    }

    /// Table name without schema prefix.
    pub fn table_name(self) -> &'static str {
        match self {
            DimensionKind::Patient => "dim_paciente",
            DimensionKind::Equipment => "dim_equipo",
            DimensionKind::Insurer => "dim_aseguradora",
            DimensionKind::Medication => "dim_medicamento",
            DimensionKind::Order => "dim_pedido",
        }
    }

    pub fn versioning(self) -> Versioning {
        match self {
            DimensionKind::Patient | DimensionKind::Equipment => Versioning::Scd2,
            DimensionKind::Insurer | DimensionKind::Medication | DimensionKind::Order => {
                Versioning::Overwrite
            }
        }
    }

    pub fn tracked_attributes(self) -> &'static [&'static str] {
        match self {
            DimensionKind::Patient => PATIENT_ATTRIBUTES,
            DimensionKind::Equipment => EQUIPMENT_ATTRIBUTES,
            DimensionKind::Insurer => INSURER_ATTRIBUTES,
            DimensionKind::Medication => MEDICATION_ATTRIBUTES,
            DimensionKind::Order => ORDER_ATTRIBUTES,
        }
    }

    /// Attributes compared as dates rather than as text.
    pub fn date_attributes(self) -> &'static [&'static str] {
        match self {
            DimensionKind::Patient => &["fecha_ingreso"],
            _ => &[],
        }
    }

    pub fn is_date_attribute(self, attribute: &str) -> bool {
        self.date_attributes().contains(&attribute)
    }

    /// Builds an attribute set holding every tracked attribute, unset.
    pub fn empty_attributes(self) -> Attributes {
        self.tracked_attributes()
            .iter()
            .map(|name| ((*name).to_string(), None))
            .collect()
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DimensionKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        DimensionKind::ALL
            .into_iter()
            .find(|kind| kind.name() == lowered || kind.table_name() == lowered)
            .ok_or_else(|| ModelError::UnknownDimension(s.to_string()))
    }
}

/// One row of a dimension table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionVersion {
    pub surrogate_id: SurrogateId,
    pub kind: DimensionKind,
    pub natural_key: NaturalKey,
    pub attributes: Attributes,
    pub valid_from: NaiveDateTime,
    pub valid_to: Option<NaiveDateTime>,
    pub is_current: bool,
}

impl DimensionVersion {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|value| value.as_deref())
    }
}
