//! Switching orders
//!
//! An order lists the switches to operate and the grounds to hang before
//! crews work a de-energized circuit. It moves through
//! `requested -> approved -> in_progress -> completed`, and can be
//! cancelled from any state that is not terminal.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::FieldScope;
use crate::store::{json_column, text_enum, OptionalRow, Store, StoreError, StoreResult};

text_enum!(
    OrderStatus {
        Requested => "requested",
        Approved => "approved",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Whether the workflow allows moving from `self` to `next`
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Requested, Approved)
                | (Approved, InProgress)
                | (InProgress, Completed)
                | (Requested | Approved | InProgress, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPosition {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationPoint {
    pub switch_id: String,
    #[serde(default)]
    pub switch_name: Option<String>,
    #[serde(default)]
    pub normal_position: Option<SwitchPosition>,
    pub required_position: SwitchPosition,
    #[serde(default)]
    pub tag_number: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verified_by: Option<String>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ground {
    pub location: String,
    #[serde(default)]
    pub equipment_type: Option<String>,
    #[serde(default)]
    pub cluster_number: Option<String>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub installed_by: Option<String>,
    #[serde(default)]
    pub installed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub removed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchingOrder {
    pub id: String,
    pub company_id: String,
    pub order_number: String,
    pub request_date: NaiveDate,
    pub requested_by: String,
    pub affected_circuits: Vec<String>,
    pub isolation_points: Vec<IsolationPoint>,
    pub grounds: Vec<Ground>,
    pub clearance_boundaries: Option<String>,
    pub special_conditions: Option<String>,
    pub outage_start: Option<DateTime<Utc>>,
    pub outage_end: Option<DateTime<Utc>>,
    pub test_before_touch: bool,
    pub status: OrderStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSwitchingOrder {
    pub request_date: Option<NaiveDate>,
    /// Defaults to the caller
    pub requested_by: Option<String>,
    #[serde(default)]
    pub affected_circuits: Vec<String>,
    #[serde(default)]
    pub isolation_points: Vec<IsolationPoint>,
    #[serde(default)]
    pub grounds: Vec<Ground>,
    pub clearance_boundaries: Option<String>,
    pub special_conditions: Option<String>,
    pub outage_start: Option<DateTime<Utc>>,
    pub outage_end: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub test_before_touch: bool,
}

impl NewSwitchingOrder {
    pub fn validate(&self) -> StoreResult<()> {
        if self.isolation_points.is_empty() {
            return Err(StoreError::invalid("At least one isolation point is required"));
        }
        if self.isolation_points.iter().any(|p| p.switch_id.trim().is_empty()) {
            return Err(StoreError::invalid("Every isolation point needs a switch_id"));
        }
        if self.grounds.iter().any(|g| g.location.trim().is_empty()) {
            return Err(StoreError::invalid("Every ground needs a location"));
        }
        if let (Some(start), Some(end)) = (self.outage_start, self.outage_end) {
            if end <= start {
                return Err(StoreError::invalid("outage_end must be after outage_start"));
            }
        }
        Ok(())
    }
}

const ORDER_COLUMNS: &str = "id, company_id, order_number, request_date, requested_by,
    affected_circuits, isolation_points, grounds, clearance_boundaries, special_conditions,
    outage_start, outage_end, test_before_touch, status, approved_by, approved_at,
    created_by, created_at, updated_at";

struct OrderRow {
    order: SwitchingOrder,
    circuits: String,
    points: String,
    grounds: String,
}

fn map_order(row: &Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        circuits: row.get(5)?,
        points: row.get(6)?,
        grounds: row.get(7)?,
        order: SwitchingOrder {
            id: row.get(0)?,
            company_id: row.get(1)?,
            order_number: row.get(2)?,
            request_date: row.get(3)?,
            requested_by: row.get(4)?,
            affected_circuits: Vec::new(),
            isolation_points: Vec::new(),
            grounds: Vec::new(),
            clearance_boundaries: row.get(8)?,
            special_conditions: row.get(9)?,
            outage_start: row.get(10)?,
            outage_end: row.get(11)?,
            test_before_touch: row.get(12)?,
            status: row.get(13)?,
            approved_by: row.get(14)?,
            approved_at: row.get(15)?,
            created_by: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        },
    })
}

impl OrderRow {
    fn decode(self) -> StoreResult<SwitchingOrder> {
        Ok(SwitchingOrder {
            affected_circuits: json_column(&self.circuits)?,
            isolation_points: json_column(&self.points)?,
            grounds: json_column(&self.grounds)?,
            ..self.order
        })
    }
}

fn load_order(conn: &Connection, scope: &FieldScope, id: &str) -> StoreResult<SwitchingOrder> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM switching_orders WHERE id = ?1 AND company_id = ?2"),
        params![id, scope.company_id],
        map_order,
    )
    .optional_row()?
    .ok_or_else(|| StoreError::not_found("Switching order not found"))?
    .decode()
}

fn save_checklists(conn: &Connection, order: &SwitchingOrder) -> StoreResult<()> {
    conn.execute(
        "UPDATE switching_orders SET isolation_points = ?2, grounds = ?3, updated_at = ?4 WHERE id = ?1",
        params![
            order.id,
            serde_json::to_string(&order.isolation_points)?,
            serde_json::to_string(&order.grounds)?,
            order.updated_at,
        ],
    )?;
    Ok(())
}

#[derive(Clone)]
pub struct SwitchingRepository {
    store: Arc<Store>,
}

impl SwitchingRepository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create(&self, scope: &FieldScope, input: &NewSwitchingOrder) -> StoreResult<SwitchingOrder> {
        input.validate()?;
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let order_number = format!("SO-{}", now.timestamp_millis());

        let points: Vec<IsolationPoint> = input
            .isolation_points
            .iter()
            .map(|p| IsolationPoint {
                verified: false,
                verified_by: None,
                verified_at: None,
                ..p.clone()
            })
            .collect();
        let grounds: Vec<Ground> = input
            .grounds
            .iter()
            .map(|g| Ground {
                installed: false,
                installed_by: None,
                installed_at: None,
                removed_at: None,
                ..g.clone()
            })
            .collect();
        let requested_by = input
            .requested_by
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(scope.user_id.as_str());

        self.store.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO switching_orders ({ORDER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, NULL, NULL, ?15, ?16, ?16)"
                ),
                params![
                    id,
                    scope.company_id,
                    order_number,
                    input.request_date.unwrap_or_else(|| now.date_naive()),
                    requested_by,
                    serde_json::to_string(&input.affected_circuits)?,
                    serde_json::to_string(&points)?,
                    serde_json::to_string(&grounds)?,
                    input.clearance_boundaries,
                    input.special_conditions,
                    input.outage_start,
                    input.outage_end,
                    input.test_before_touch,
                    OrderStatus::Requested,
                    scope.user_id,
                    now,
                ],
            )?;
            Ok(())
        })?;

        tracing::info!(order_id = %id, order_number = %order_number, company_id = %scope.company_id, "Switching order requested");
        self.get(scope, &id)
    }

    pub fn list(&self, scope: &FieldScope, status: Option<OrderStatus>) -> StoreResult<Vec<SwitchingOrder>> {
        let rows = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {ORDER_COLUMNS} FROM switching_orders
                 WHERE company_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![scope.company_id, status], map_order)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        rows.into_iter().map(OrderRow::decode).collect()
    }

    pub fn get(&self, scope: &FieldScope, id: &str) -> StoreResult<SwitchingOrder> {
        self.store.with_conn(|conn| load_order(conn, scope, id))
    }

    /// Move an order to `next`, enforcing the workflow
    pub fn transition(
        &self,
        scope: &FieldScope,
        id: &str,
        next: OrderStatus,
    ) -> StoreResult<SwitchingOrder> {
        let order = self.store.with_tx(|tx| {
            let mut order = load_order(tx, scope, id)?;
            if !order.status.can_transition_to(next) {
                return Err(StoreError::conflict(format!(
                    "Cannot move a switching order from {} to {}",
                    order.status, next
                )));
            }

            let now = Utc::now();
            match next {
                OrderStatus::Approved => {
                    if !scope.is_manager() {
                        return Err(StoreError::forbidden("Only managers can approve switching orders"));
                    }
                    order.approved_by = Some(scope.user_id.clone());
                    order.approved_at = Some(now);
                }
                OrderStatus::Completed => {
                    if let Some(point) = order.isolation_points.iter().find(|p| !p.verified) {
                        return Err(StoreError::invalid(format!(
                            "Isolation point {} has not been verified",
                            point.switch_id
                        )));
                    }
                    if let Some(ground) = order.grounds.iter().find(|g| !g.installed) {
                        return Err(StoreError::invalid(format!(
                            "Ground at {} has not been installed",
                            ground.location
                        )));
                    }
                }
                _ => {}
            }

            order.status = next;
            order.updated_at = now;
            tx.execute(
                "UPDATE switching_orders SET status = ?2, approved_by = ?3, approved_at = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![order.id, order.status, order.approved_by, order.approved_at, order.updated_at],
            )?;
            Ok(order)
        })?;

        tracing::info!(order_id = %order.id, status = %order.status, actor = %scope.user_id, "Switching order transitioned");
        Ok(order)
    }

    fn edit_checklist(
        &self,
        scope: &FieldScope,
        id: &str,
        edit: impl FnOnce(&mut SwitchingOrder, DateTime<Utc>) -> StoreResult<()>,
    ) -> StoreResult<SwitchingOrder> {
        self.store.with_tx(|tx| {
            let mut order = load_order(tx, scope, id)?;
            if order.status.is_terminal() {
                return Err(StoreError::conflict(format!(
                    "Switching order is already {}",
                    order.status
                )));
            }
            let now = Utc::now();
            edit(&mut order, now)?;
            order.updated_at = now;
            save_checklists(tx, &order)?;
            Ok(order)
        })
    }

    pub fn verify_isolation_point(
        &self,
        scope: &FieldScope,
        id: &str,
        index: usize,
    ) -> StoreResult<SwitchingOrder> {
        let user = scope.user_id.clone();
        self.edit_checklist(scope, id, |order, now| {
            let point = order
                .isolation_points
                .get_mut(index)
                .ok_or_else(|| StoreError::not_found(format!("Isolation point {index} not found")))?;
            point.verified = true;
            point.verified_by = Some(user);
            point.verified_at = Some(now);
            Ok(())
        })
    }

    pub fn install_ground(&self, scope: &FieldScope, id: &str, index: usize) -> StoreResult<SwitchingOrder> {
        let user = scope.user_id.clone();
        self.edit_checklist(scope, id, |order, now| {
            let ground = order
                .grounds
                .get_mut(index)
                .ok_or_else(|| StoreError::not_found(format!("Ground {index} not found")))?;
            ground.installed = true;
            ground.installed_by = Some(user);
            ground.installed_at = Some(now);
            ground.removed_at = None;
            Ok(())
        })
    }

    pub fn remove_ground(&self, scope: &FieldScope, id: &str, index: usize) -> StoreResult<SwitchingOrder> {
        self.edit_checklist(scope, id, |order, now| {
            let ground = order
                .grounds
                .get_mut(index)
                .ok_or_else(|| StoreError::not_found(format!("Ground {index} not found")))?;
            ground.installed = false;
            ground.removed_at = Some(now);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn repo() -> SwitchingRepository {
        SwitchingRepository::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    fn lineman() -> FieldScope {
        FieldScope::new("acme", "lineman").with_role("foreman")
    }

    fn manager() -> FieldScope {
        FieldScope::new("acme", "ops").with_role("manager")
    }

    fn point(id: &str) -> IsolationPoint {
        IsolationPoint {
            switch_id: id.into(),
            switch_name: Some(format!("Switch {id}")),
            normal_position: Some(SwitchPosition::Closed),
            required_position: SwitchPosition::Open,
            tag_number: Some("T-100".into()),
            verified: true,
            verified_by: None,
            verified_at: None,
        }
    }

    fn ground(location: &str) -> Ground {
        Ground {
            location: location.into(),
            equipment_type: Some("Cluster".into()),
            cluster_number: Some("G1".into()),
            installed: true,
            installed_by: None,
            installed_at: None,
            removed_at: None,
        }
    }

    fn new_order() -> NewSwitchingOrder {
        let start = Utc::now();
        NewSwitchingOrder {
            request_date: None,
            requested_by: None,
            affected_circuits: vec!["CKT-12".into()],
            isolation_points: vec![point("SW-1"), point("SW-2")],
            grounds: vec![ground("Pole 14")],
            clearance_boundaries: Some("Pole 10 to Pole 20".into()),
            special_conditions: None,
            outage_start: Some(start),
            outage_end: Some(start + Duration::hours(4)),
            test_before_touch: true,
        }
    }

    #[test]
    fn test_create_resets_checklists() {
        let order = repo().create(&lineman(), &new_order()).unwrap();
        assert!(order.order_number.starts_with("SO-"));
        assert_eq!(order.status, OrderStatus::Requested);
        assert_eq!(order.requested_by, "lineman");
        assert_eq!(order.affected_circuits, vec!["CKT-12"]);
        assert!(order.isolation_points.iter().all(|p| !p.verified));
        assert!(order.grounds.iter().all(|g| !g.installed));
    }

    #[test]
    fn test_create_validation() {
        let repo = repo();
        let mut input = new_order();
        input.isolation_points.clear();
        assert!(matches!(repo.create(&lineman(), &input), Err(StoreError::Invalid(_))));

        let mut input = new_order();
        input.outage_end = input.outage_start;
        let err = repo.create(&lineman(), &input).unwrap_err();
        assert_eq!(err.to_string(), "outage_end must be after outage_start");
    }

    #[test]
    fn test_status_machine() {
        let repo = repo();
        let order = repo.create(&lineman(), &new_order()).unwrap();

        assert!(matches!(
            repo.transition(&lineman(), &order.id, OrderStatus::InProgress),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            repo.transition(&lineman(), &order.id, OrderStatus::Approved),
            Err(StoreError::Forbidden(_))
        ));

        let approved = repo.transition(&manager(), &order.id, OrderStatus::Approved).unwrap();
        assert_eq!(approved.approved_by.as_deref(), Some("ops"));

        repo.transition(&lineman(), &order.id, OrderStatus::InProgress).unwrap();
        let err = repo
            .transition(&lineman(), &order.id, OrderStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        repo.verify_isolation_point(&lineman(), &order.id, 0).unwrap();
        repo.verify_isolation_point(&lineman(), &order.id, 1).unwrap();
        assert!(repo.transition(&lineman(), &order.id, OrderStatus::Completed).is_err());

        repo.install_ground(&lineman(), &order.id, 0).unwrap();
        let done = repo.transition(&lineman(), &order.id, OrderStatus::Completed).unwrap();
        assert_eq!(done.status, OrderStatus::Completed);

        assert!(matches!(
            repo.transition(&manager(), &order.id, OrderStatus::Cancelled),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            repo.remove_ground(&lineman(), &order.id, 0),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_checklist_edits() {
        let repo = repo();
        let order = repo.create(&lineman(), &new_order()).unwrap();

        let verified = repo.verify_isolation_point(&lineman(), &order.id, 1).unwrap();
        assert!(verified.isolation_points[1].verified);
        assert_eq!(verified.isolation_points[1].verified_by.as_deref(), Some("lineman"));
        assert!(!verified.isolation_points[0].verified);

        repo.install_ground(&lineman(), &order.id, 0).unwrap();
        let removed = repo.remove_ground(&lineman(), &order.id, 0).unwrap();
        assert!(!removed.grounds[0].installed);
        assert!(removed.grounds[0].removed_at.is_some());

        assert!(matches!(
            repo.verify_isolation_point(&lineman(), &order.id, 9),
            Err(StoreError::NotFound(_))
        ));

        let reloaded = repo.get(&lineman(), &order.id).unwrap();
        assert!(reloaded.isolation_points[1].verified);
    }

    #[test]
    fn test_cancel_and_list_by_status() {
        let repo = repo();
        let a = repo.create(&lineman(), &new_order()).unwrap();
        repo.create(&lineman(), &new_order()).unwrap();
        repo.transition(&lineman(), &a.id, OrderStatus::Cancelled).unwrap();

        assert_eq!(repo.list(&lineman(), None).unwrap().len(), 2);
        let cancelled = repo.list(&lineman(), Some(OrderStatus::Cancelled)).unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a.id);
        assert!(repo.list(&FieldScope::new("other", "x"), None).unwrap().is_empty());
    }
}
