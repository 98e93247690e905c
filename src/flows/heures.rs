//! Heures (timesheet) sync flow
//!
//! Pull fetches remote time slots over a bounded day window and stages only
//! the slots not already present, since slot identity and status belong to
//! the remote side. Push places validated, project-linked slots into the ERP
//! day sheet, one commit per slot.

use super::SyncOutcome;
use crate::buffer::{BufferStore, HeurePlacement, HeureRecord};
use crate::erp::{ErpLink, ErpValue};
use crate::error::SyncError;
use crate::mapping;
use crate::normalize::normalize_number;
use crate::remote::{RemoteApi, TimeSlot};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use tracing::{debug, error, info, warn};

const SELECT_BUCKETS_SQL: &str = "SELECT NbH0, NbH3, NbH4 FROM SuiviMO \
     WHERE CodeChantier = ? AND CodeSalarie = ? AND Date = ?";
const UPDATE_BUCKETS_SQL: &str = "UPDATE SuiviMO SET NbH0 = ?, NbH3 = ?, NbH4 = ? \
     WHERE CodeChantier = ? AND CodeSalarie = ? AND Date = ?";
const INSERT_BUCKETS_SQL: &str = "INSERT INTO SuiviMO \
     (CodeChantier, CodeSalarie, Date, NbH0, NbH3, NbH4) VALUES (?, ?, ?, ?, ?, ?)";

/// Stage remote time slots from the last `days_back` days into the buffer.
/// Already-present slots are left untouched.
pub fn pull_heures(remote: &dyn RemoteApi, store: &mut BufferStore, days_back: u32) -> SyncOutcome {
    let end = Utc::now().date_naive();
    let start = end - Duration::days(i64::from(days_back));

    let slots = match remote.list_time_slots(start, end) {
        Ok(slots) => slots,
        Err(e) => {
            error!(error = %e, "time slot fetch failed");
            return SyncOutcome::failed(format!("heures pull failed: {e}"));
        }
    };
    let fetched = slots.len();

    let mut records = Vec::new();
    for slot in &slots {
        match slot_to_record(slot, start, end) {
            Some(record) => records.push(record),
            None => debug!(id = %slot.id, "slot skipped (incomplete or outside window)"),
        }
    }

    match store.insert_new_heures(&records) {
        Ok(inserted) => {
            info!(inserted, fetched, "time slots staged");
            SyncOutcome::ok(format!(
                "{inserted} new time slot(s) staged ({fetched} fetched)"
            ))
        }
        Err(e) => {
            error!(error = %e, "time slot staging failed");
            SyncOutcome::failed(format!("heures pull failed: {e}"))
        }
    }
}

/// Place every validated, project-linked pending slot into the ERP day
/// sheet. Returns how many slots were consumed; skipped or failed slots stay
/// pending without side effects.
pub fn push_heures(store: &mut BufferStore, erp: &mut dyn ErpLink) -> Result<usize, SyncError> {
    let pending = store.pushable_heures()?;
    if pending.is_empty() {
        info!("no validated time slots awaiting placement");
        return Ok(0);
    }

    let mut placed = 0;
    for record in &pending {
        // A slot written once keeps targeting the same day sheet row, even
        // if its linkage changed since
        let placement = match store.placement_for(&record.id_heure)? {
            Some(previous) => previous,
            None => {
                let code_chantier = match record.code_projet.as_deref() {
                    Some(code) => code.to_string(),
                    None => continue,
                };
                let code_salarie =
                    match mapping::resolve_employee_code(erp, &record.id_utilisateur) {
                        Ok(Some(code)) => code,
                        Ok(None) => {
                            warn!(
                                id_heure = %record.id_heure,
                                user = %record.id_utilisateur,
                                "no ERP employee mapped to remote user, slot skipped"
                            );
                            continue;
                        }
                        Err(e) => {
                            warn!(id_heure = %record.id_heure, error = %e, "employee lookup failed, slot skipped");
                            continue;
                        }
                    };
                HeurePlacement {
                    code_chantier,
                    code_salarie,
                    date_erp: record.date_debut,
                }
            }
        };

        match place_slot(erp, record, &placement) {
            Ok(()) => {
                if let Err(e) = store.mark_heure_synced(&record.id_heure) {
                    error!(id_heure = %record.id_heure, error = %e, "placed but could not mark synced");
                    continue;
                }
                if let Err(e) = store.record_placement(&record.id_heure, &placement) {
                    warn!(id_heure = %record.id_heure, error = %e, "placement bookkeeping failed");
                }
                placed += 1;
            }
            Err(e) => {
                warn!(id_heure = %record.id_heure, error = %e, "placement failed, slot left pending");
            }
        }
    }

    info!(placed, pending = pending.len() - placed, "timesheet push finished");
    Ok(placed)
}

/// Write one slot's hour buckets into the day sheet row keyed by
/// (chantier, employee, day), creating or correcting as needed
fn place_slot(
    erp: &mut dyn ErpLink,
    record: &HeureRecord,
    placement: &HeurePlacement,
) -> Result<(), SyncError> {
    let key = [
        ErpValue::Text(placement.code_chantier.clone()),
        ErpValue::Text(placement.code_salarie.clone()),
        ErpValue::Date(placement.date_erp.date()),
    ];
    let desired = [
        record.total_heure,
        if record.panier { 1.0 } else { 0.0 },
        if record.trajet { 1.0 } else { 0.0 },
    ];

    let existing = erp.query(SELECT_BUCKETS_SQL, &key)?;
    match existing.rows.first() {
        Some(row) => {
            let current: Vec<f64> = row
                .iter()
                .map(|value| normalize_number(value).unwrap_or(0.0))
                .collect();
            let differs = desired
                .iter()
                .enumerate()
                .any(|(i, d)| (d - current.get(i).copied().unwrap_or(0.0)).abs() > 1e-9);
            if differs {
                let params = [
                    ErpValue::Float(desired[0]),
                    ErpValue::Float(desired[1]),
                    ErpValue::Float(desired[2]),
                    key[0].clone(),
                    key[1].clone(),
                    key[2].clone(),
                ];
                erp.execute(UPDATE_BUCKETS_SQL, &params)?;
                erp.commit()?;
                debug!(chantier = %placement.code_chantier, salarie = %placement.code_salarie, "day sheet row corrected");
            } else {
                debug!(chantier = %placement.code_chantier, salarie = %placement.code_salarie, "day sheet row already current");
            }
        }
        None => {
            let params = [
                key[0].clone(),
                key[1].clone(),
                key[2].clone(),
                ErpValue::Float(desired[0]),
                ErpValue::Float(desired[1]),
                ErpValue::Float(desired[2]),
            ];
            erp.execute(INSERT_BUCKETS_SQL, &params)?;
            erp.commit()?;
            debug!(chantier = %placement.code_chantier, salarie = %placement.code_salarie, "day sheet row created");
        }
    }
    Ok(())
}

/// Convert one remote slot to a buffer record. Slots missing identity,
/// times, or falling outside the window yield `None`.
fn slot_to_record(
    slot: &TimeSlot,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Option<HeureRecord> {
    if slot.id.trim().is_empty() {
        return None;
    }
    let user = slot.user.as_ref()?;
    let date_debut = truncate_to_minute(slot.start_date?.naive_utc());
    let date_fin = truncate_to_minute(slot.end_date?.naive_utc());

    let day = date_debut.date();
    if day < window_start || day > window_end {
        return None;
    }

    let total_heure = match slot.total_time_minutes {
        Some(minutes) => minutes / 60.0,
        None => (date_fin - date_debut).num_minutes() as f64 / 60.0,
    };

    Some(HeureRecord {
        id_heure: slot.id.clone(),
        date_debut,
        date_fin,
        id_utilisateur: user.id,
        id_projet: slot.project.as_ref().map(|p| p.id),
        status_management: slot.management_status.clone(),
        total_heure,
        panier: slot.basket,
        trajet: slot.travel,
        code_projet: None,
        sync: false,
    })
}

fn truncate_to_minute(value: NaiveDateTime) -> NaiveDateTime {
    value
        .with_second(0)
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::{ErpBatch, MockErp};
    use crate::remote::{MockRemote, SlotProject, SlotUser};
    use chrono::{DateTime, TimeZone};
    use uuid::Uuid;

    fn test_store() -> BufferStore {
        let store = BufferStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn recent_slot(id: &str, user: Uuid, project: Uuid) -> TimeSlot {
        let day = Utc::now().date_naive() - Duration::days(2);
        TimeSlot {
            id: id.to_string(),
            management_status: Some("VALIDATED".to_string()),
            user: Some(SlotUser { id: user }),
            project: Some(SlotProject { id: project }),
            start_date: Some(
                day.and_hms_opt(8, 0, 17)
                    .unwrap()
                    .and_utc(),
            ),
            end_date: Some(
                day.and_hms_opt(12, 0, 43)
                    .unwrap()
                    .and_utc(),
            ),
            total_time_minutes: Some(240.0),
            basket: true,
            travel: false,
        }
    }

    fn salarie_batch(code: &str) -> ErpBatch {
        ErpBatch::new(
            vec!["Code".to_string()],
            vec![vec![ErpValue::Text(code.to_string())]],
        )
    }

    #[test]
    fn test_pull_stages_only_new_slots() {
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        let remote = MockRemote::new().with_slots(vec![
            recent_slot("1001", user, project),
            recent_slot("1002", user, project),
        ]);
        let mut store = test_store();

        let outcome = pull_heures(&remote, &mut store, 180);
        assert!(outcome.success);
        assert!(outcome.message.starts_with("2 new time slot(s)"));

        // Second pull sees the same slots and stages nothing
        let outcome = pull_heures(&remote, &mut store, 180);
        assert!(outcome.success);
        assert!(outcome.message.starts_with("0 new time slot(s)"));

        let windows = remote.windows.borrow();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].1 - windows[0].0, Duration::days(180));
    }

    #[test]
    fn test_pull_truncates_seconds_and_skips_incomplete_slots() {
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        let mut without_user = recent_slot("2002", user, project);
        without_user.user = None;
        let remote =
            MockRemote::new().with_slots(vec![recent_slot("2001", user, project), without_user]);
        let mut store = test_store();

        let outcome = pull_heures(&remote, &mut store, 180);
        assert!(outcome.success);

        store.update_heures_code_projet(&project, "CH-01").unwrap();
        let pushable = store.pushable_heures().unwrap();
        assert_eq!(pushable.len(), 1);
        assert_eq!(pushable[0].id_heure, "2001");
        assert_eq!(pushable[0].date_debut.second(), 0);
        assert_eq!(pushable[0].date_fin.second(), 0);
        assert_eq!(pushable[0].total_heure, 4.0);
    }

    #[test]
    fn test_pull_window_excludes_old_slots() {
        let user = Uuid::new_v4();
        let mut stale = recent_slot("3001", user, Uuid::new_v4());
        stale.start_date = Some(utc(2019, 5, 2, 8, 0, 0));
        stale.end_date = Some(utc(2019, 5, 2, 12, 0, 0));
        let remote = MockRemote::new().with_slots(vec![stale]);
        let mut store = test_store();

        let outcome = pull_heures(&remote, &mut store, 30);
        assert!(outcome.success);
        assert!(outcome.message.starts_with("0 new time slot(s) staged (1 fetched)"));
    }

    #[test]
    fn test_push_places_slot_and_commits_per_record() {
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        let remote = MockRemote::new().with_slots(vec![recent_slot("1001", user, project)]);
        let mut store = test_store();
        pull_heures(&remote, &mut store, 180);
        // Link the slot to a chantier the way the refresh step would
        store.update_heures_code_projet(&project, "CH-01").unwrap();

        let mut erp = MockErp::new().with_batch("FROM Salarie", salarie_batch("SAL-9"));
        let placed = push_heures(&mut store, &mut erp).unwrap();
        assert_eq!(placed, 1);
        assert_eq!(erp.commits, 1);

        let inserts: Vec<_> = erp
            .executed
            .iter()
            .filter(|(sql, _)| sql.starts_with("INSERT INTO SuiviMO"))
            .collect();
        assert_eq!(inserts.len(), 1);
        let params = &inserts[0].1;
        assert_eq!(params[0], ErpValue::Text("CH-01".to_string()));
        assert_eq!(params[1], ErpValue::Text("SAL-9".to_string()));
        assert_eq!(params[3], ErpValue::Float(4.0));
        assert_eq!(params[4], ErpValue::Float(1.0));
        assert_eq!(params[5], ErpValue::Float(0.0));

        assert!(store.pushable_heures().unwrap().is_empty());
        let placement = store.placement_for("1001").unwrap().unwrap();
        assert_eq!(placement.code_chantier, "CH-01");
        assert_eq!(placement.code_salarie, "SAL-9");
    }

    #[test]
    fn test_push_skips_unmapped_employee_without_consuming() {
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        let remote = MockRemote::new().with_slots(vec![recent_slot("1001", user, project)]);
        let mut store = test_store();
        pull_heures(&remote, &mut store, 180);
        store.update_heures_code_projet(&project, "CH-01").unwrap();

        // No Salarie script: the lookup resolves to nothing
        let mut erp = MockErp::new();
        let placed = push_heures(&mut store, &mut erp).unwrap();
        assert_eq!(placed, 0);
        assert!(erp.executed.is_empty());
        assert_eq!(erp.commits, 0);

        // Slot still pending for a later run once the mapping exists
        assert_eq!(store.pushable_heures().unwrap().len(), 1);
    }

    #[test]
    fn test_repush_reuses_recorded_placement() {
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        let remote = MockRemote::new().with_slots(vec![recent_slot("1001", user, project)]);
        let mut store = test_store();
        pull_heures(&remote, &mut store, 180);
        store.update_heures_code_projet(&project, "CH-NEW").unwrap();

        // The slot already landed once, under the chantier code of that day
        let day = Utc::now().date_naive() - Duration::days(2);
        store
            .record_placement(
                "1001",
                &HeurePlacement {
                    code_chantier: "CH-OLD".to_string(),
                    code_salarie: "SAL-9".to_string(),
                    date_erp: day.and_hms_opt(8, 0, 0).unwrap(),
                },
            )
            .unwrap();

        let mut erp = MockErp::new();
        let placed = push_heures(&mut store, &mut erp).unwrap();
        assert_eq!(placed, 1);

        // No employee lookup, and the write aims at the original row
        assert!(erp.queries.iter().all(|(sql, _)| !sql.contains("FROM Salarie")));
        let inserts: Vec<_> = erp
            .executed
            .iter()
            .filter(|(sql, _)| sql.starts_with("INSERT INTO SuiviMO"))
            .collect();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].1[0], ErpValue::Text("CH-OLD".to_string()));
        assert_eq!(inserts[0].1[1], ErpValue::Text("SAL-9".to_string()));
    }

    #[test]
    fn test_push_corrects_diverged_day_sheet_row() {
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        let remote = MockRemote::new().with_slots(vec![recent_slot("1001", user, project)]);
        let mut store = test_store();
        pull_heures(&remote, &mut store, 180);
        store.update_heures_code_projet(&project, "CH-01").unwrap();

        let stale_row = ErpBatch::new(
            vec!["NbH0".to_string(), "NbH3".to_string(), "NbH4".to_string()],
            vec![vec![
                ErpValue::Float(2.0),
                ErpValue::Float(1.0),
                ErpValue::Float(0.0),
            ]],
        );
        let mut erp = MockErp::new()
            .with_batch("FROM Salarie", salarie_batch("SAL-9"))
            .with_batch("SELECT NbH0", stale_row);

        let placed = push_heures(&mut store, &mut erp).unwrap();
        assert_eq!(placed, 1);

        let updates: Vec<_> = erp
            .executed
            .iter()
            .filter(|(sql, _)| sql.starts_with("UPDATE SuiviMO"))
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1[0], ErpValue::Float(4.0));
    }

    #[test]
    fn test_push_leaves_current_day_sheet_row_alone() {
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        let remote = MockRemote::new().with_slots(vec![recent_slot("1001", user, project)]);
        let mut store = test_store();
        pull_heures(&remote, &mut store, 180);
        store.update_heures_code_projet(&project, "CH-01").unwrap();

        let current_row = ErpBatch::new(
            vec!["NbH0".to_string(), "NbH3".to_string(), "NbH4".to_string()],
            vec![vec![
                ErpValue::Float(4.0),
                ErpValue::Float(1.0),
                ErpValue::Float(0.0),
            ]],
        );
        let mut erp = MockErp::new()
            .with_batch("FROM Salarie", salarie_batch("SAL-9"))
            .with_batch("SELECT NbH0", current_row);

        // Already in place: consumed without writing anything
        let placed = push_heures(&mut store, &mut erp).unwrap();
        assert_eq!(placed, 1);
        assert!(erp.executed.is_empty());
        assert!(store.pushable_heures().unwrap().is_empty());
    }

    #[test]
    fn test_slot_without_minutes_uses_duration() {
        let user = Uuid::new_v4();
        let mut slot = recent_slot("1001", user, Uuid::new_v4());
        slot.total_time_minutes = None;
        let start = Utc::now().date_naive() - Duration::days(1);
        let record = slot_to_record(&slot, start - Duration::days(30), Utc::now().date_naive())
            .unwrap();
        assert_eq!(record.total_heure, 4.0);
    }
}
