use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::keys::SurrogateId;

/// Calendar row referenced by every fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateKey {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl DateKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            date,
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }

    /// Compact integer form, e.g. `20240115`.
    pub fn as_int(&self) -> i64 {
        i64::from(self.year) * 10_000 + i64::from(self.month) * 100 + i64::from(self.day)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentEvent {
    pub equipment_id: SurrogateId,
    pub patient_id: SurrogateId,
    pub insurer_id: Option<SurrogateId>,
    pub date: DateKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequestEvent {
    pub order_id: SurrogateId,
    pub patient_id: SurrogateId,
    pub insurer_id: Option<SurrogateId>,
    pub medication_id: SurrogateId,
    pub date: DateKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Equipment,
    ServiceRequest,
}

impl FactKind {
    pub fn table_name(self) -> &'static str {
        match self {
            FactKind::Equipment => "hecho_equipos",
            FactKind::ServiceRequest => "hecho_solicitud_servicios",
        }
    }
}

/// Append-only fact row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactEvent {
    Equipment(EquipmentEvent),
    ServiceRequest(ServiceRequestEvent),
}

impl FactEvent {
    pub fn kind(&self) -> FactKind {
        match self {
            FactEvent::Equipment(_) => FactKind::Equipment,
            FactEvent::ServiceRequest(_) => FactKind::ServiceRequest,
        }
    }

    pub fn date(&self) -> DateKey {
        match self {
            FactEvent::Equipment(event) => event.date,
            FactEvent::ServiceRequest(event) => event.date,
        }
    }
}
