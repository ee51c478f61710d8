//! Foreman daily reports
//!
//! Reports start as drafts and become read-only once submitted. Each
//! section is stored as a JSON column.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::FieldScope;
use crate::store::{json_column, text_enum, OptionalRow, Store, StoreError, StoreResult};

text_enum!(
    ReportStatus {
        Draft => "draft",
        Submitted => "submitted",
    }
);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weather {
    pub condition: Option<String>,
    pub temp_high: Option<f64>,
    pub temp_low: Option<f64>,
    pub wind: Option<String>,
    pub precipitation: Option<String>,
    pub delay_hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionItem {
    pub description: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Production {
    pub items: Vec<ProductionItem>,
    pub structures_set: i64,
    pub poles_set: i64,
    pub foundations_poured: i64,
    pub conductor_strung_ft: f64,
    pub cable_pulled_ft: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrewMember {
    pub name: String,
    pub role: Option<String>,
    pub hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Crew {
    pub count: i64,
    pub hours: f64,
    pub overtime_hours: f64,
    pub members: Vec<CrewMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Safety {
    pub briefing_held: bool,
    pub topics: Vec<String>,
    pub observations: Option<String>,
    pub near_misses: i64,
    pub first_aid_cases: i64,
    pub recordable_incidents: i64,
    pub stop_work_events: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportNotes {
    pub accomplishments: Option<String>,
    pub issues: Option<String>,
    pub next_priorities: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    pub id: String,
    pub company_id: String,
    pub created_by: String,
    pub foreman_id: Option<String>,
    pub report_date: NaiveDate,
    pub shift: String,
    pub weather: Weather,
    pub production: Production,
    pub crew: Crew,
    pub safety: Safety,
    pub notes: ReportNotes,
    pub status: ReportStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDailyReport {
    pub report_date: Option<NaiveDate>,
    pub shift: Option<String>,
    pub foreman_id: Option<String>,
    #[serde(default)]
    pub weather: Weather,
    #[serde(default)]
    pub production: Production,
    #[serde(default)]
    pub crew: Crew,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub notes: ReportNotes,
    /// Submit right away instead of saving a draft
    #[serde(default)]
    pub submit: bool,
}

/// Sections left as `None` keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyReportUpdate {
    pub report_date: Option<NaiveDate>,
    pub shift: Option<String>,
    pub foreman_id: Option<String>,
    pub weather: Option<Weather>,
    pub production: Option<Production>,
    pub crew: Option<Crew>,
    pub safety: Option<Safety>,
    pub notes: Option<ReportNotes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<ReportStatus>,
}

/// Totals across submitted reports in a date range
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductionSummary {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub report_count: i64,
    pub structures_set: i64,
    pub poles_set: i64,
    pub foundations_poured: i64,
    pub conductor_strung_ft: f64,
    pub cable_pulled_ft: f64,
    pub crew_hours: f64,
    pub overtime_hours: f64,
    pub weather_delay_hours: f64,
    pub near_misses: i64,
    pub first_aid_cases: i64,
    pub recordable_incidents: i64,
}

impl ProductionSummary {
    fn add(&mut self, report: &DailyReport) {
        let p = &report.production;
        self.report_count += 1;
        self.structures_set += p.structures_set;
        self.poles_set += p.poles_set;
        self.foundations_poured += p.foundations_poured;
        self.conductor_strung_ft += p.conductor_strung_ft;
        self.cable_pulled_ft += p.cable_pulled_ft;
        self.crew_hours += report.crew.hours;
        self.overtime_hours += report.crew.overtime_hours;
        self.weather_delay_hours += report.weather.delay_hours;
        self.near_misses += report.safety.near_misses;
        self.first_aid_cases += report.safety.first_aid_cases;
        self.recordable_incidents += report.safety.recordable_incidents;
    }
}

const REPORT_COLUMNS: &str = "id, company_id, created_by, foreman_id, report_date, shift,
    weather, production, crew, safety, notes, status, submitted_at, created_at, updated_at";

struct RawReport {
    report: DailyReport,
    sections: [String; 5],
}

fn map_raw(row: &Row<'_>) -> rusqlite::Result<RawReport> {
    Ok(RawReport {
        sections: [row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?],
        report: DailyReport {
            id: row.get(0)?,
            company_id: row.get(1)?,
            created_by: row.get(2)?,
            foreman_id: row.get(3)?,
            report_date: row.get(4)?,
            shift: row.get(5)?,
            weather: Weather::default(),
            production: Production::default(),
            crew: Crew::default(),
            safety: Safety::default(),
            notes: ReportNotes::default(),
            status: row.get(11)?,
            submitted_at: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        },
    })
}

impl RawReport {
    fn decode(self) -> StoreResult<DailyReport> {
        let [weather, production, crew, safety, notes] = self.sections;
        Ok(DailyReport {
            weather: json_column(&weather)?,
            production: json_column(&production)?,
            crew: json_column(&crew)?,
            safety: json_column(&safety)?,
            notes: json_column(&notes)?,
            ..self.report
        })
    }
}

fn load_report(conn: &Connection, scope: &FieldScope, id: &str) -> StoreResult<Option<DailyReport>> {
    conn.query_row(
        &format!("SELECT {REPORT_COLUMNS} FROM daily_reports WHERE id = ?1 AND company_id = ?2"),
        params![id, scope.company_id],
        map_raw,
    )
    .optional_row()?
    .map(RawReport::decode)
    .transpose()
}

/// Load a draft the caller may change
fn editable_draft(conn: &Connection, scope: &FieldScope, id: &str) -> StoreResult<DailyReport> {
    let report = load_report(conn, scope, id)?
        .ok_or_else(|| StoreError::not_found("Daily report not found"))?;
    if report.created_by != scope.user_id && !scope.is_manager() {
        return Err(StoreError::forbidden("Only the author or a manager can change this report"));
    }
    if report.status != ReportStatus::Draft {
        return Err(StoreError::conflict("Submitted reports cannot be modified"));
    }
    Ok(report)
}

fn clean_shift(shift: Option<&str>) -> String {
    shift
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("day")
        .to_lowercase()
}

#[derive(Clone)]
pub struct DailyReportRepository {
    store: Arc<Store>,
}

impl DailyReportRepository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create(&self, scope: &FieldScope, input: &NewDailyReport) -> StoreResult<DailyReport> {
        let report_date = input
            .report_date
            .ok_or_else(|| StoreError::invalid("report_date is required"))?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let (status, submitted_at) = if input.submit {
            (ReportStatus::Submitted, Some(now))
        } else {
            (ReportStatus::Draft, None)
        };

        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_reports (id, company_id, created_by, foreman_id, report_date, shift,
                     weather, production, crew, safety, notes, status, submitted_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    id,
                    scope.company_id,
                    scope.user_id,
                    input.foreman_id,
                    report_date,
                    clean_shift(input.shift.as_deref()),
                    serde_json::to_string(&input.weather)?,
                    serde_json::to_string(&input.production)?,
                    serde_json::to_string(&input.crew)?,
                    serde_json::to_string(&input.safety)?,
                    serde_json::to_string(&input.notes)?,
                    status,
                    submitted_at,
                    now,
                ],
            )?;
            Ok(())
        })?;

        tracing::info!(report_id = %id, company_id = %scope.company_id, status = %status, "Daily report created");
        self.get(scope, &id)
    }

    pub fn list(&self, scope: &FieldScope, filter: &ReportFilter) -> StoreResult<Vec<DailyReport>> {
        let raw = self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT {REPORT_COLUMNS} FROM daily_reports
                 WHERE company_id = ?1
                   AND (?2 IS NULL OR report_date >= ?2)
                   AND (?3 IS NULL OR report_date <= ?3)
                   AND (?4 IS NULL OR status = ?4)
                 ORDER BY report_date DESC, created_at DESC"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(
                params![scope.company_id, filter.start_date, filter.end_date, filter.status],
                map_raw,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        raw.into_iter().map(RawReport::decode).collect()
    }

    pub fn get(&self, scope: &FieldScope, id: &str) -> StoreResult<DailyReport> {
        self.store
            .with_conn(|conn| load_report(conn, scope, id))?
            .ok_or_else(|| StoreError::not_found("Daily report not found"))
    }

    pub fn update(
        &self,
        scope: &FieldScope,
        id: &str,
        update: &DailyReportUpdate,
    ) -> StoreResult<DailyReport> {
        let updated = self.store.with_tx(|tx| {
            let current = editable_draft(tx, scope, id)?;
            let next = DailyReport {
                report_date: update.report_date.unwrap_or(current.report_date),
                shift: update
                    .shift
                    .as_deref()
                    .map(|s| clean_shift(Some(s)))
                    .unwrap_or(current.shift.clone()),
                foreman_id: update.foreman_id.clone().or(current.foreman_id.clone()),
                weather: update.weather.clone().unwrap_or(current.weather.clone()),
                production: update.production.clone().unwrap_or(current.production.clone()),
                crew: update.crew.clone().unwrap_or(current.crew.clone()),
                safety: update.safety.clone().unwrap_or(current.safety.clone()),
                notes: update.notes.clone().unwrap_or(current.notes.clone()),
                updated_at: Utc::now(),
                ..current
            };
            tx.execute(
                "UPDATE daily_reports SET report_date = ?2, shift = ?3, foreman_id = ?4,
                     weather = ?5, production = ?6, crew = ?7, safety = ?8, notes = ?9, updated_at = ?10
                 WHERE id = ?1",
                params![
                    id,
                    next.report_date,
                    next.shift,
                    next.foreman_id,
                    serde_json::to_string(&next.weather)?,
                    serde_json::to_string(&next.production)?,
                    serde_json::to_string(&next.crew)?,
                    serde_json::to_string(&next.safety)?,
                    serde_json::to_string(&next.notes)?,
                    next.updated_at,
                ],
            )?;
            Ok(next)
        })?;
        Ok(updated)
    }

    pub fn submit(&self, scope: &FieldScope, id: &str) -> StoreResult<DailyReport> {
        self.store.with_tx(|tx| {
            let report = load_report(tx, scope, id)?
                .ok_or_else(|| StoreError::not_found("Daily report not found"))?;
            if report.status == ReportStatus::Submitted {
                return Err(StoreError::conflict("Report has already been submitted"));
            }
            let now = Utc::now();
            tx.execute(
                "UPDATE daily_reports SET status = ?2, submitted_at = ?3, updated_at = ?3 WHERE id = ?1",
                params![id, ReportStatus::Submitted, now],
            )?;
            Ok(())
        })?;
        tracing::info!(report_id = %id, "Daily report submitted");
        self.get(scope, id)
    }

    pub fn delete(&self, scope: &FieldScope, id: &str) -> StoreResult<()> {
        self.store.with_tx(|tx| {
            editable_draft(tx, scope, id)?;
            tx.execute("DELETE FROM daily_reports WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    /// Sum production, crew and safety counters over submitted reports
    pub fn production_summary(
        &self,
        scope: &FieldScope,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> StoreResult<ProductionSummary> {
        let reports = self.list(
            scope,
            &ReportFilter {
                start_date,
                end_date,
                status: Some(ReportStatus::Submitted),
            },
        )?;
        let mut summary = ProductionSummary {
            start_date,
            end_date,
            ..Default::default()
        };
        for report in &reports {
            summary.add(report);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> DailyReportRepository {
        DailyReportRepository::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    fn foreman() -> FieldScope {
        FieldScope::new("acme", "foreman-1").with_role("foreman")
    }

    fn report(date: &str, poles: i64, submit: bool) -> NewDailyReport {
        NewDailyReport {
            report_date: Some(date.parse().unwrap()),
            production: Production {
                poles_set: poles,
                conductor_strung_ft: 1200.5,
                items: vec![ProductionItem {
                    description: "Set poles".into(),
                    quantity: poles as f64,
                    unit: Some("ea".into()),
                    location: None,
                }],
                ..Default::default()
            },
            crew: Crew { count: 4, hours: 40.0, overtime_hours: 2.0, members: vec![] },
            safety: Safety { briefing_held: true, near_misses: 1, ..Default::default() },
            submit,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_draft_and_submitted() {
        let repo = repo();
        let draft = repo.create(&foreman(), &report("2024-04-01", 3, false)).unwrap();
        assert_eq!(draft.status, ReportStatus::Draft);
        assert!(draft.submitted_at.is_none());
        assert_eq!(draft.shift, "day");
        assert_eq!(draft.production.items.len(), 1);

        let submitted = repo.create(&foreman(), &report("2024-04-02", 2, true)).unwrap();
        assert_eq!(submitted.status, ReportStatus::Submitted);
        assert!(submitted.submitted_at.is_some());

        assert!(matches!(
            repo.create(&foreman(), &NewDailyReport::default()),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_update_only_drafts() {
        let repo = repo();
        let draft = repo.create(&foreman(), &report("2024-04-01", 3, false)).unwrap();

        let update = DailyReportUpdate {
            notes: Some(ReportNotes {
                issues: Some("Rain delay".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let updated = repo.update(&foreman(), &draft.id, &update).unwrap();
        assert_eq!(updated.notes.issues.as_deref(), Some("Rain delay"));
        assert_eq!(updated.production.poles_set, 3);

        let stranger = FieldScope::new("acme", "someone-else");
        assert!(matches!(
            repo.update(&stranger, &draft.id, &update),
            Err(StoreError::Forbidden(_))
        ));

        repo.submit(&foreman(), &draft.id).unwrap();
        assert!(matches!(
            repo.update(&foreman(), &draft.id, &update),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(repo.delete(&foreman(), &draft.id), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_submit_twice_conflicts() {
        let repo = repo();
        let draft = repo.create(&foreman(), &report("2024-04-01", 3, false)).unwrap();
        let submitted = repo.submit(&foreman(), &draft.id).unwrap();
        assert_eq!(submitted.status, ReportStatus::Submitted);

        let err = repo.submit(&foreman(), &draft.id).unwrap_err();
        assert_eq!(err.to_string(), "Report has already been submitted");
    }

    #[test]
    fn test_delete_draft() {
        let repo = repo();
        let draft = repo.create(&foreman(), &report("2024-04-01", 3, false)).unwrap();
        repo.delete(&foreman(), &draft.id).unwrap();
        assert!(matches!(repo.get(&foreman(), &draft.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_list_and_production_summary() {
        let repo = repo();
        repo.create(&foreman(), &report("2024-04-01", 3, true)).unwrap();
        repo.create(&foreman(), &report("2024-04-02", 5, true)).unwrap();
        repo.create(&foreman(), &report("2024-04-03", 7, false)).unwrap();
        repo.create(&foreman(), &report("2024-05-01", 11, true)).unwrap();

        let april = repo
            .list(
                &foreman(),
                &ReportFilter {
                    start_date: Some("2024-04-01".parse().unwrap()),
                    end_date: Some("2024-04-30".parse().unwrap()),
                    status: None,
                },
            )
            .unwrap();
        assert_eq!(april.len(), 3);
        assert_eq!(april[0].report_date.to_string(), "2024-04-03");

        let summary = repo
            .production_summary(
                &foreman(),
                Some("2024-04-01".parse().unwrap()),
                Some("2024-04-30".parse().unwrap()),
            )
            .unwrap();
        assert_eq!(summary.report_count, 2);
        assert_eq!(summary.poles_set, 8);
        assert_eq!(summary.conductor_strung_ft, 2401.0);
        assert_eq!(summary.crew_hours, 80.0);
        assert_eq!(summary.near_misses, 2);
    }
}
