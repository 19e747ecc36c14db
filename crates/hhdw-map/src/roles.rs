//! Built-in role groups for the home-care source exports.
//!
//! Each group lists the roles one consumer needs (a dimension builder, a fact
//! loader, the test-record filter) with patterns in priority order. Groups can
//! be overridden per role from configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::locator::{FieldLocator, RoleSpec};

pub const PATIENT_ID: &str = "patient_id";
pub const PATIENT_NAME: &str = "patient_name";
pub const MUNICIPALITY: &str = "municipality";
pub const STATE: &str = "state";
pub const ZONE: &str = "zone";
pub const INSURER: &str = "insurer";
pub const ADMISSION_DATE: &str = "admission_date";
pub const EQUIPMENT_KEY: &str = "equipment_key";
pub const EQUIPMENT_NAME: &str = "equipment_name";
pub const EQUIPMENT_STATUS: &str = "equipment_status";
pub const MEDICATION_KEY: &str = "medication_key";
pub const MEDICATION_NAME: &str = "medication_name";
pub const DOSAGE_FORM: &str = "dosage_form";
pub const ROUTE: &str = "route";
pub const ORDER_KEY: &str = "order_key";
pub const REQUESTED_ITEM: &str = "requested_item";
pub const QUANTITY: &str = "quantity";
pub const EVENT_DATE: &str = "event_date";

const PATIENT_ID_PATTERNS: &[&str] = &[
    r"(docu|id).*pac",
    r"paciente.*(id|doc)",
    r"identificacion",
    r"cedula",
    r"historia",
    r"nombre",
];
const FACT_PATIENT_PATTERNS: &[&str] = &[r"(docu|id).*pac|paciente|historia|cedula|nombre"];
const INSURER_PATTERNS: &[&str] = &[r"asegur|eps|ars"];
const EQUIPMENT_KEY_PATTERNS: &[&str] = &[r"(serial|serie|codigo|equipo)"];
const MEDICATION_KEY_PATTERNS: &[&str] = &[r"(codigo|sku|referen)", r"medicamento.*(id|codigo)"];
const ORDER_KEY_PATTERNS: &[&str] = &[r"(numero|num|nro).*pedido", r"pedido.*(num|numero|id)"];
const REQUESTED_ITEM_PATTERNS: &[&str] =
    &[r"(insumo|producto|medicamento|articulo|descripcion)"];

/// Consumers of located roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleGroup {
    Patient,
    Equipment,
    Medication,
    Order,
    EquipmentFact,
    ServiceFact,
}

impl RoleGroup {
    pub const ALL: [RoleGroup; 6] = [
        RoleGroup::Patient,
        RoleGroup::Equipment,
        RoleGroup::Medication,
        RoleGroup::Order,
        RoleGroup::EquipmentFact,
        RoleGroup::ServiceFact,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RoleGroup::Patient => "patient",
            RoleGroup::Equipment => "equipment",
            RoleGroup::Medication => "medication",
            RoleGroup::Order => "order",
            RoleGroup::EquipmentFact => "equipment_fact",
            RoleGroup::ServiceFact => "service_fact",
        }
    }

    /// Built-in role patterns for this group.
    pub fn default_specs(self) -> Vec<RoleSpec> {
        match self {
            RoleGroup::Patient => vec![
                RoleSpec::new(PATIENT_ID, PATIENT_ID_PATTERNS),
                RoleSpec::new(PATIENT_NAME, &[r"nombre", r"paciente"]),
                RoleSpec::new(MUNICIPALITY, &[r"munic", r"ciudad"]),
                RoleSpec::new(STATE, &[r"depto|depart|estado"]),
                RoleSpec::new(ZONE, &[r"zona|barrio"]),
                RoleSpec::new(INSURER, INSURER_PATTERNS),
                RoleSpec::new(ADMISSION_DATE, &[r"fecha.*ingreso", r"ingreso"]),
            ],
            RoleGroup::Equipment => vec![
                RoleSpec::new(EQUIPMENT_KEY, EQUIPMENT_KEY_PATTERNS),
                RoleSpec::new(EQUIPMENT_NAME, &[r"equipo|descripcion|nombre"]),
                RoleSpec::new(EQUIPMENT_STATUS, &[r"estado"]),
            ],
            RoleGroup::Medication => vec![
                RoleSpec::new(MEDICATION_KEY, MEDICATION_KEY_PATTERNS),
                RoleSpec::new(MEDICATION_NAME, &[r"(nombre|descripcion)"]),
                RoleSpec::new(DOSAGE_FORM, &[r"forma"]),
                RoleSpec::new(ROUTE, &[r"via"]),
            ],
            RoleGroup::Order => vec![
                RoleSpec::new(ORDER_KEY, ORDER_KEY_PATTERNS),
                RoleSpec::new(REQUESTED_ITEM, REQUESTED_ITEM_PATTERNS),
                RoleSpec::new(QUANTITY, &[r"(cant|unid)"]),
            ],
            RoleGroup::EquipmentFact => vec![
                RoleSpec::new(EQUIPMENT_KEY, EQUIPMENT_KEY_PATTERNS),
                RoleSpec::new(PATIENT_ID, FACT_PATIENT_PATTERNS),
                RoleSpec::new(INSURER, INSURER_PATTERNS),
                RoleSpec::new(EVENT_DATE, &[r"fecha"]),
            ],
            RoleGroup::ServiceFact => vec![
                RoleSpec::new(ORDER_KEY, ORDER_KEY_PATTERNS),
                RoleSpec::new(PATIENT_ID, FACT_PATIENT_PATTERNS),
                RoleSpec::new(INSURER, INSURER_PATTERNS),
                RoleSpec::new(EVENT_DATE, &[r"fecha"]),
                RoleSpec::new(MEDICATION_KEY, MEDICATION_KEY_PATTERNS),
                RoleSpec::new(REQUESTED_ITEM, REQUESTED_ITEM_PATTERNS),
            ],
        }
    }
}

impl fmt::Display for RoleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RoleGroup {
    type Err = MapError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RoleGroup::ALL
            .into_iter()
            .find(|group| group.name() == s.trim())
            .ok_or_else(|| MapError::UnknownGroup(s.to_string()))
    }
}

/// Per-group pattern overrides: group name -> role name -> patterns.
pub type RoleOverrides = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Compiled locators for every role group.
#[derive(Debug, Clone)]
pub struct RoleCatalog {
    locators: BTreeMap<RoleGroup, FieldLocator>,
}

impl RoleCatalog {
    pub fn builtin() -> Result<Self> {
        Self::with_overrides(&RoleOverrides::new())
    }

    /// Builds locators from the presets, replacing the patterns of any
    /// overridden role and appending roles the preset does not know.
    pub fn with_overrides(overrides: &RoleOverrides) -> Result<Self> {
        for group in overrides.keys() {
            group.parse::<RoleGroup>()?;
        }
        let mut locators = BTreeMap::new();
        for group in RoleGroup::ALL {
            let mut specs = group.default_specs();
            if let Some(roles) = overrides.get(group.name()) {
                for (role, patterns) in roles {
                    match specs.iter_mut().find(|spec| &spec.role == role) {
                        Some(spec) => spec.patterns.clone_from(patterns),
                        None => specs.push(RoleSpec {
                            role: role.clone(),
                            patterns: patterns.clone(),
                        }),
                    }
                }
            }
            locators.insert(group, FieldLocator::new(&specs)?);
        }
        Ok(Self { locators })
    }

    pub fn locator(&self, group: RoleGroup) -> &FieldLocator {
        // every group is inserted by with_overrides
        &self.locators[&group]
    }

    pub fn groups(&self) -> impl Iterator<Item = (RoleGroup, &FieldLocator)> {
        self.locators.iter().map(|(group, locator)| (*group, locator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_group_prefers_document_over_name() {
        let catalog = RoleCatalog::builtin().expect("builtin roles");
        let map = catalog
            .locator(RoleGroup::Patient)
            .locate(&["nombre", "documento_paciente", "eps", "fecha_ingreso"]);
        assert_eq!(map.get(PATIENT_ID), Some("documento_paciente"));
        assert_eq!(map.get(PATIENT_NAME), Some("nombre"));
        assert_eq!(map.get(INSURER), Some("eps"));
        assert_eq!(map.get(ADMISSION_DATE), Some("fecha_ingreso"));
        assert_eq!(map.get(ZONE), None);
    }

    #[test]
    fn patient_id_falls_back_to_name() {
        let catalog = RoleCatalog::builtin().expect("builtin roles");
        let map = catalog
            .locator(RoleGroup::Patient)
            .locate(&["nombre_completo", "ciudad"]);
        assert_eq!(map.get(PATIENT_ID), Some("nombre_completo"));
        assert_eq!(map.get(MUNICIPALITY), Some("ciudad"));
    }

    #[test]
    fn overrides_replace_and_extend() {
        let mut overrides = RoleOverrides::new();
        overrides.insert(
            "equipment".to_string(),
            BTreeMap::from([
                ("equipment_key".to_string(), vec![r"^placa$".to_string()]),
                ("brand".to_string(), vec![r"marca".to_string()]),
            ]),
        );
        let catalog = RoleCatalog::with_overrides(&overrides).expect("roles");
        let map = catalog
            .locator(RoleGroup::Equipment)
            .locate(&["serial", "placa", "marca"]);
        assert_eq!(map.get(EQUIPMENT_KEY), Some("placa"));
        assert_eq!(map.get("brand"), Some("marca"));
    }

    #[test]
    fn unknown_override_group_is_rejected() {
        let mut overrides = RoleOverrides::new();
        overrides.insert("nope".to_string(), BTreeMap::new());
        assert!(matches!(
            RoleCatalog::with_overrides(&overrides),
            Err(MapError::UnknownGroup(_))
        ));
    }
}
