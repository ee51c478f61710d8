//! Arc flash hazard calculator
//!
//! A simplified IEEE 1584 incident energy estimate with NFPA 70E PPE
//! categories and shock approach boundaries. [`calculate`] is pure; the
//! repository stores equipment studies alongside their inputs.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::FieldScope;
use crate::store::{json_column, text_enum, OptionalRow, Store, StoreError, StoreResult};

const MM_PER_INCH: f64 = 25.4;
const INCHES_PER_METER: f64 = 39.37;
/// Onset of a second degree burn, cal/cm²
const BOUNDARY_ENERGY: f64 = 1.2;
const MAX_VOLTAGE_KV: f64 = 800.0;

text_enum!(
    Enclosure {
        Open => "open",
        Box => "box",
    }
);

impl Enclosure {
    fn arc_constant(self) -> f64 {
        match self {
            Enclosure::Open => -0.153,
            Enclosure::Box => -0.097,
        }
    }

    fn energy_factor(self) -> f64 {
        match self {
            Enclosure::Open => 1.0,
            Enclosure::Box => 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcFlashInputs {
    pub voltage_kv: f64,
    pub fault_current_ka: f64,
    pub clearing_time_s: f64,
    pub working_distance_in: f64,
    pub gap_mm: f64,
    pub enclosure: Enclosure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcFlashResult {
    pub arc_current_ka: f64,
    /// cal/cm² at the working distance
    pub incident_energy: f64,
    /// Distance at which energy falls to 1.2 cal/cm², inches
    pub arc_flash_boundary_in: f64,
    pub working_distance_in: f64,
    pub ppe_category: u8,
    pub ppe_label: String,
    pub min_arc_rating: Option<f64>,
    pub required_ppe: Vec<String>,
    pub limited_approach_ft: f64,
    pub restricted_approach_ft: f64,
    pub prohibited_approach_ft: f64,
}

/// Arc-rated clothing for one PPE category
#[derive(Debug, Clone, Copy)]
pub struct PpeRequirement {
    pub category: u8,
    pub min_arc_rating: f64,
    pub description: &'static str,
    pub equipment: &'static [&'static str],
}

pub const PPE_REQUIREMENTS: [PpeRequirement; 4] = [
    PpeRequirement {
        category: 1,
        min_arc_rating: 4.0,
        description: "Arc-Rated PPE Category 1",
        equipment: &[
            "Arc-rated long-sleeve shirt and pants (minimum 4 cal/cm²)",
            "Arc-rated face shield or arc flash suit hood",
            "Safety glasses",
            "Hearing protection",
            "Leather gloves",
            "Leather work boots",
        ],
    },
    PpeRequirement {
        category: 2,
        min_arc_rating: 8.0,
        description: "Arc-Rated PPE Category 2",
        equipment: &[
            "Arc-rated long-sleeve shirt and pants (minimum 8 cal/cm²)",
            "Arc-rated face shield and arc-rated balaclava or arc flash suit hood",
            "Safety glasses",
            "Hearing protection",
            "Leather gloves",
            "Leather work boots",
        ],
    },
    PpeRequirement {
        category: 3,
        min_arc_rating: 25.0,
        description: "Arc-Rated PPE Category 3",
        equipment: &[
            "Arc-rated shirt and pants and arc-rated coveralls (minimum 25 cal/cm²)",
            "Arc-rated arc flash suit hood",
            "Arc-rated gloves",
            "Safety glasses",
            "Hearing protection",
            "Leather work boots",
        ],
    },
    PpeRequirement {
        category: 4,
        min_arc_rating: 40.0,
        description: "Arc-Rated PPE Category 4",
        equipment: &[
            "Arc-rated shirt and pants and arc-rated coveralls (minimum 40 cal/cm²)",
            "Arc-rated arc flash suit hood",
            "Arc-rated gloves",
            "Safety glasses",
            "Hearing protection",
            "Leather work boots",
        ],
    },
];

/// Shock approach boundaries in feet: (max kV, limited, restricted, prohibited)
const APPROACH_BOUNDARIES: [(f64, f64, f64, f64); 13] = [
    (0.75, 3.5, 1.0, 0.08),
    (5.0, 5.0, 2.0, 0.33),
    (15.0, 5.0, 2.17, 0.58),
    (36.0, 6.0, 2.67, 0.92),
    (46.0, 8.0, 2.75, 1.25),
    (72.5, 8.0, 3.25, 1.67),
    (121.0, 10.0, 3.75, 2.08),
    (145.0, 10.0, 4.5, 2.75),
    (169.0, 11.0, 5.25, 3.58),
    (242.0, 13.0, 8.5, 5.25),
    (362.0, 15.0, 12.0, 8.58),
    (550.0, 19.0, 14.0, 10.67),
    (800.0, 23.0, 18.0, 14.42),
];

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn ppe_category(incident_energy: f64) -> u8 {
    match incident_energy {
        e if e <= 1.2 => 0,
        e if e <= 4.0 => 1,
        e if e <= 8.0 => 2,
        e if e <= 25.0 => 3,
        e if e <= 40.0 => 4,
        _ => 5,
    }
}

pub fn ppe_label(category: u8) -> String {
    match category {
        0 => "PPE Not Required".to_string(),
        1..=4 => format!("Category {category}"),
        _ => "DANGER - No PPE Available".to_string(),
    }
}

pub fn ppe_requirement(category: u8) -> Option<&'static PpeRequirement> {
    PPE_REQUIREMENTS.iter().find(|r| r.category == category)
}

/// Shock approach boundaries for a phase-to-phase voltage
pub fn approach_boundaries(voltage_kv: f64) -> Option<(f64, f64, f64)> {
    APPROACH_BOUNDARIES
        .iter()
        .find(|(max_kv, ..)| voltage_kv <= *max_kv)
        .map(|&(_, limited, restricted, prohibited)| (limited, restricted, prohibited))
}

impl ArcFlashInputs {
    pub fn validate(&self) -> StoreResult<()> {
        let fields = [
            ("voltage_kv", self.voltage_kv),
            ("fault_current_ka", self.fault_current_ka),
            ("clearing_time_s", self.clearing_time_s),
            ("working_distance_in", self.working_distance_in),
            ("gap_mm", self.gap_mm),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(StoreError::invalid(format!("{name} must be a positive number")));
            }
        }
        if self.voltage_kv > MAX_VOLTAGE_KV {
            return Err(StoreError::invalid("voltage_kv above 800 kV is not supported"));
        }
        Ok(())
    }
}

pub fn calculate(inputs: &ArcFlashInputs) -> StoreResult<ArcFlashResult> {
    inputs.validate()?;

    let k = inputs.enclosure.arc_constant();
    let cf = inputs.enclosure.energy_factor();
    let t = inputs.clearing_time_s;
    let d = inputs.working_distance_in * MM_PER_INCH;

    let arc_current = 10f64.powf(
        k + 0.662 * inputs.fault_current_ka.log10()
            + 0.0966 * inputs.voltage_kv
            + 0.000526 * inputs.gap_mm,
    );
    let arc_energy = 4.184 * cf * arc_current * arc_current * t;
    let incident_energy = arc_energy / (d * d) * (610.0 / 600.0);
    let boundary = (arc_energy / BOUNDARY_ENERGY).sqrt() * INCHES_PER_METER;
    if ![arc_current, incident_energy, boundary].iter().all(|v| v.is_finite()) {
        return Err(StoreError::invalid(
            "Inputs are outside the range the arc flash model can evaluate",
        ));
    }

    let category = ppe_category(incident_energy);
    let requirement = ppe_requirement(category);
    let (limited, restricted, prohibited) =
        approach_boundaries(inputs.voltage_kv).unwrap_or((0.0, 0.0, 0.0));

    Ok(ArcFlashResult {
        arc_current_ka: round2(arc_current),
        incident_energy: round2(incident_energy),
        arc_flash_boundary_in: round2(boundary),
        working_distance_in: inputs.working_distance_in,
        ppe_category: category,
        ppe_label: ppe_label(category),
        min_arc_rating: requirement.map(|r| r.min_arc_rating),
        required_ppe: requirement
            .map(|r| r.equipment.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default(),
        limited_approach_ft: limited,
        restricted_approach_ft: restricted,
        prohibited_approach_ft: prohibited,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ArcFlashStudy {
    pub id: String,
    pub company_id: String,
    pub equipment_id: String,
    pub equipment_name: String,
    pub inputs: ArcFlashInputs,
    pub results: ArcFlashResult,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStudy {
    pub equipment_id: String,
    pub equipment_name: String,
    pub inputs: ArcFlashInputs,
}

const STUDY_COLUMNS: &str =
    "id, company_id, equipment_id, equipment_name, inputs, results, created_by, created_at";

struct StudyRow {
    id: String,
    company_id: String,
    equipment_id: String,
    equipment_name: String,
    inputs: String,
    results: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

fn map_study(row: &Row<'_>) -> rusqlite::Result<StudyRow> {
    Ok(StudyRow {
        id: row.get(0)?,
        company_id: row.get(1)?,
        equipment_id: row.get(2)?,
        equipment_name: row.get(3)?,
        inputs: row.get(4)?,
        results: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl StudyRow {
    fn decode(self) -> StoreResult<ArcFlashStudy> {
        Ok(ArcFlashStudy {
            id: self.id,
            company_id: self.company_id,
            equipment_id: self.equipment_id,
            equipment_name: self.equipment_name,
            inputs: json_column(&self.inputs)?,
            results: json_column(&self.results)?,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct ArcFlashRepository {
    store: Arc<Store>,
}

impl ArcFlashRepository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Calculate and persist a study for one piece of equipment
    pub fn save_study(&self, scope: &FieldScope, input: &NewStudy) -> StoreResult<ArcFlashStudy> {
        let equipment_id = input.equipment_id.trim();
        let equipment_name = input.equipment_name.trim();
        if equipment_id.is_empty() || equipment_name.is_empty() {
            return Err(StoreError::invalid("equipment_id and equipment_name are required"));
        }
        let results = calculate(&input.inputs)?;

        let study = ArcFlashStudy {
            id: Uuid::new_v4().to_string(),
            company_id: scope.company_id.clone(),
            equipment_id: equipment_id.to_string(),
            equipment_name: equipment_name.to_string(),
            inputs: input.inputs,
            results,
            created_by: scope.user_id.clone(),
            created_at: Utc::now(),
        };

        self.store.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO arc_flash_studies ({STUDY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    study.id,
                    study.company_id,
                    study.equipment_id,
                    study.equipment_name,
                    serde_json::to_string(&study.inputs)?,
                    serde_json::to_string(&study.results)?,
                    study.created_by,
                    study.created_at,
                ],
            )?;
            Ok(())
        })?;

        tracing::info!(
            study_id = %study.id,
            equipment_id = %study.equipment_id,
            incident_energy = study.results.incident_energy,
            ppe_category = study.results.ppe_category,
            "Arc flash study saved"
        );
        Ok(study)
    }

    pub fn list_studies(&self, scope: &FieldScope) -> StoreResult<Vec<ArcFlashStudy>> {
        let rows = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {STUDY_COLUMNS} FROM arc_flash_studies WHERE company_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![scope.company_id], map_study)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        rows.into_iter().map(StudyRow::decode).collect()
    }

    pub fn get_study(&self, scope: &FieldScope, id: &str) -> StoreResult<ArcFlashStudy> {
        let row = self.store.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {STUDY_COLUMNS} FROM arc_flash_studies WHERE id = ?1 AND company_id = ?2"),
                params![id, scope.company_id],
                map_study,
            )
            .optional_row()
        })?;
        row.map(StudyRow::decode)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("Arc flash study not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ArcFlashInputs {
        ArcFlashInputs {
            voltage_kv: 13.8,
            fault_current_ka: 20.0,
            clearing_time_s: 0.5,
            working_distance_in: 36.0,
            gap_mm: 32.0,
            enclosure: Enclosure::Open,
        }
    }

    #[test]
    fn test_calculate_reference_case() {
        let result = calculate(&inputs()).unwrap();

        let iarc = 10f64.powf(-0.153 + 0.662 * 20f64.log10() + 0.0966 * 13.8 + 0.000526 * 32.0);
        let d = 36.0 * 25.4;
        let en = 4.184 * iarc * iarc * 0.5 / (d * d) * (610.0 / 600.0);
        assert_eq!(result.incident_energy, round2(en));
        assert_eq!(result.arc_current_ka, round2(iarc));
        assert_eq!(result.ppe_category, 0);
        assert_eq!(result.ppe_label, "PPE Not Required");
        assert!(result.required_ppe.is_empty());
        assert_eq!(
            (result.limited_approach_ft, result.restricted_approach_ft, result.prohibited_approach_ft),
            (5.0, 2.17, 0.58)
        );
    }

    #[test]
    fn test_box_enclosure_raises_energy() {
        let open = calculate(&inputs()).unwrap();
        let boxed = calculate(&ArcFlashInputs { enclosure: Enclosure::Box, ..inputs() }).unwrap();
        assert!(boxed.arc_current_ka > open.arc_current_ka);
        assert!(boxed.arc_flash_boundary_in > open.arc_flash_boundary_in);
    }

    #[test]
    fn test_close_work_needs_no_ppe_available() {
        let result = calculate(&ArcFlashInputs { working_distance_in: 1.0, ..inputs() }).unwrap();
        assert!(result.incident_energy > 40.0);
        assert_eq!(result.ppe_category, 5);
        assert_eq!(result.ppe_label, "DANGER - No PPE Available");
        assert_eq!(result.min_arc_rating, None);
    }

    #[test]
    fn test_ppe_thresholds() {
        assert_eq!(ppe_category(1.2), 0);
        assert_eq!(ppe_category(1.21), 1);
        assert_eq!(ppe_category(4.0), 1);
        assert_eq!(ppe_category(8.0), 2);
        assert_eq!(ppe_category(25.0), 3);
        assert_eq!(ppe_category(40.0), 4);
        assert_eq!(ppe_category(40.01), 5);
        assert_eq!(ppe_requirement(3).unwrap().min_arc_rating, 25.0);
        assert_eq!(ppe_label(2), "Category 2");
    }

    #[test]
    fn test_approach_boundaries_table() {
        assert_eq!(approach_boundaries(0.48), Some((3.5, 1.0, 0.08)));
        assert_eq!(approach_boundaries(138.0), Some((10.0, 4.5, 2.75)));
        assert_eq!(approach_boundaries(800.0), Some((23.0, 18.0, 14.42)));
        assert_eq!(approach_boundaries(801.0), None);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        for bad in [
            ArcFlashInputs { voltage_kv: 0.0, ..inputs() },
            ArcFlashInputs { fault_current_ka: -1.0, ..inputs() },
            ArcFlashInputs { clearing_time_s: f64::NAN, ..inputs() },
            ArcFlashInputs { working_distance_in: f64::INFINITY, ..inputs() },
            ArcFlashInputs { voltage_kv: 900.0, ..inputs() },
        ] {
            assert!(matches!(calculate(&bad), Err(StoreError::Invalid(_))));
        }
    }

    #[test]
    fn test_overflowing_inputs_rejected() {
        for bad in [
            ArcFlashInputs { gap_mm: 1e6, ..inputs() },
            ArcFlashInputs { fault_current_ka: 1e300, voltage_kv: 800.0, ..inputs() },
        ] {
            assert!(matches!(calculate(&bad), Err(StoreError::Invalid(_))));
        }
    }

    #[test]
    fn test_study_persistence() {
        let repo = ArcFlashRepository::new(Arc::new(Store::open_in_memory().unwrap()));
        let scope = FieldScope::new("acme", "engineer");
        let study = repo
            .save_study(
                &scope,
                &NewStudy {
                    equipment_id: "BRK-138-1".into(),
                    equipment_name: "Main 138kV Breaker".into(),
                    inputs: ArcFlashInputs { voltage_kv: 138.0, ..inputs() },
                },
            )
            .unwrap();

        let loaded = repo.get_study(&scope, &study.id).unwrap();
        assert_eq!(loaded.inputs, study.inputs);
        assert_eq!(loaded.results, study.results);
        assert_eq!(repo.list_studies(&scope).unwrap().len(), 1);

        let other = FieldScope::new("other", "engineer");
        assert!(repo.get_study(&other, &study.id).is_err());
        assert!(repo.list_studies(&other).unwrap().is_empty());
    }
}
