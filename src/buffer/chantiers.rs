//! Chantier buffer table
//!
//! Staged project/site master records. Re-imports always refresh business
//! fields and re-arm `sync = false`, so any upstream change is pushed again.

use super::{format_date, now_stamp, parse_date, BufferStore};
use crate::erp::ErpValue;
use crate::error::SyncError;
use crate::normalize::{normalize_date, normalize_number, normalize_text, RowView};
use chrono::NaiveDate;
use duckdb::{params, OptionalExt};
use uuid::Uuid;

/// One staged chantier row
#[derive(Debug, Clone, PartialEq)]
pub struct ChantierRecord {
    pub code: String,
    pub date_debut: Option<NaiveDate>,
    pub date_fin: Option<NaiveDate>,
    pub nom_client: Option<String>,
    pub description: Option<String>,
    pub adr_chantier: Option<String>,
    pub cp_chantier: Option<String>,
    pub ville_chantier: Option<String>,
    pub total_mo: Option<f64>,
}

impl ChantierRecord {
    /// Build a record from one ERP result row. Returns `None` when the row
    /// has no usable natural key.
    pub fn from_erp_row(columns: &[String], values: &[ErpValue]) -> Option<Self> {
        let view = RowView::new(columns, values);
        let code = view
            .lookup(&["Code", "CodeChantier"], &["code"])
            .and_then(normalize_text)?;
        Some(Self {
            code,
            date_debut: view.lookup(&["DateDebut"], &["debut"]).and_then(normalize_date),
            date_fin: view.lookup(&["DateFin"], &["fin"]).and_then(normalize_date),
            nom_client: view
                .lookup(&["NomClient"], &["client"])
                .and_then(normalize_text),
            description: view
                .lookup(&["Libelle", "Description"], &["libell"])
                .and_then(normalize_text),
            adr_chantier: view
                .lookup(&["AdrChantier", "Adresse"], &["adr"])
                .and_then(normalize_text),
            cp_chantier: view
                .lookup(&["CPChantier"], &["cp", "postal"])
                .and_then(normalize_text),
            ville_chantier: view
                .lookup(&["VilleChantier"], &["ville"])
                .and_then(normalize_text),
            total_mo: view
                .lookup(&["TotalMO", "TempsMO"], &["mo"])
                .and_then(normalize_number),
        })
    }
}

impl BufferStore {
    /// Upsert a pulled batch in one transaction. The conflict branch
    /// overwrites every business field and resets `sync`, unconditionally.
    pub fn upsert_chantiers(&mut self, records: &[ChantierRecord]) -> Result<usize, SyncError> {
        let tx = self.conn_mut().transaction()?;
        for record in records {
            tx.execute(
                r#"
                INSERT INTO chantiers
                    (code, date_debut, date_fin, nom_client, description,
                     adr_chantier, cp_chantier, ville_chantier, total_mo, sync)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE)
                ON CONFLICT (code) DO UPDATE SET
                    date_debut = excluded.date_debut,
                    date_fin = excluded.date_fin,
                    nom_client = excluded.nom_client,
                    description = excluded.description,
                    adr_chantier = excluded.adr_chantier,
                    cp_chantier = excluded.cp_chantier,
                    ville_chantier = excluded.ville_chantier,
                    total_mo = excluded.total_mo,
                    sync = FALSE
                "#,
                params![
                    record.code,
                    record.date_debut.as_ref().map(format_date),
                    record.date_fin.as_ref().map(format_date),
                    record.nom_client,
                    record.description,
                    record.adr_chantier,
                    record.cp_chantier,
                    record.ville_chantier,
                    record.total_mo,
                ],
            )?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// All rows still waiting to reach the remote side
    pub fn unsynced_chantiers(&self) -> Result<Vec<ChantierRecord>, SyncError> {
        let mut stmt = self.conn().prepare(
            r#"
            SELECT code, date_debut, date_fin, nom_client, description,
                   adr_chantier, cp_chantier, ville_chantier, total_mo
            FROM chantiers
            WHERE sync = FALSE
            ORDER BY code
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ChantierRecord {
                code: row.get(0)?,
                date_debut: row.get::<_, Option<String>>(1)?.and_then(|s| parse_date(&s)),
                date_fin: row.get::<_, Option<String>>(2)?.and_then(|s| parse_date(&s)),
                nom_client: row.get(3)?,
                description: row.get(4)?,
                adr_chantier: row.get(5)?,
                cp_chantier: row.get(6)?,
                ville_chantier: row.get(7)?,
                total_mo: row.get(8)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Flip one row to synced and stamp it. Runs outside any transaction, so
    /// the flip is durable before the next record is attempted.
    pub fn mark_chantier_synced(&self, code: &str) -> Result<(), SyncError> {
        self.conn().execute(
            "UPDATE chantiers SET sync = TRUE, sync_date = ? WHERE code = ?",
            params![now_stamp(), code],
        )?;
        Ok(())
    }

    /// Persist the remote project id learned from the listing
    pub fn set_chantier_project_id(&self, code: &str, id: &Uuid) -> Result<usize, SyncError> {
        let changed = self.conn().execute(
            "UPDATE chantiers SET id_projet = ? WHERE code = ?",
            params![id.to_string(), code],
        )?;
        Ok(changed)
    }

    /// Stored remote linkage for one chantier
    pub fn chantier_project_id(&self, code: &str) -> Result<Option<Uuid>, SyncError> {
        let id: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT id_projet FROM chantiers WHERE code = ?",
                params![code],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id
            .flatten()
            .and_then(|s| Uuid::parse_str(&s).ok()))
    }

    /// Sync flag and stamp for one row, primarily for diagnostics and tests
    pub fn chantier_sync_state(
        &self,
        code: &str,
    ) -> Result<Option<(bool, Option<String>)>, SyncError> {
        let state = self
            .conn()
            .query_row(
                "SELECT sync, sync_date FROM chantiers WHERE code = ?",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(state)
    }

    /// (total, pending) chantier counts for the status report
    pub fn chantier_counts(&self) -> Result<(i64, i64), SyncError> {
        let counts = self.conn().query_row(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE sync = FALSE) FROM chantiers",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> BufferStore {
        let store = BufferStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store
    }

    fn sample_record(code: &str) -> ChantierRecord {
        ChantierRecord {
            code: code.to_string(),
            date_debut: NaiveDate::from_ymd_opt(2024, 1, 8),
            date_fin: NaiveDate::from_ymd_opt(2024, 9, 30),
            nom_client: Some("Dupont BTP".to_string()),
            description: Some("Extension hangar".to_string()),
            adr_chantier: Some("12 rue des Arceaux".to_string()),
            cp_chantier: Some("34000".to_string()),
            ville_chantier: Some("Montpellier".to_string()),
            total_mo: Some(120.5),
        }
    }

    #[test]
    fn test_repull_is_idempotent() {
        let mut store = test_store();
        let batch = vec![sample_record("CH-01"), sample_record("CH-02")];
        store.upsert_chantiers(&batch).unwrap();
        store.upsert_chantiers(&batch).unwrap();

        let pending = store.unsynced_chantiers().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0], batch[0]);
    }

    #[test]
    fn test_conflict_resets_sync_flag() {
        let mut store = test_store();
        store.upsert_chantiers(&[sample_record("CH-01")]).unwrap();
        store.mark_chantier_synced("CH-01").unwrap();
        let (synced, stamp) = store.chantier_sync_state("CH-01").unwrap().unwrap();
        assert!(synced);
        assert!(stamp.is_some());

        // Re-import re-arms the row even when nothing changed
        store.upsert_chantiers(&[sample_record("CH-01")]).unwrap();
        let (synced, _) = store.chantier_sync_state("CH-01").unwrap().unwrap();
        assert!(!synced);
        assert_eq!(store.unsynced_chantiers().unwrap().len(), 1);
    }

    #[test]
    fn test_conflict_overwrites_business_fields() {
        let mut store = test_store();
        store.upsert_chantiers(&[sample_record("CH-01")]).unwrap();

        let mut changed = sample_record("CH-01");
        changed.total_mo = Some(200.0);
        changed.ville_chantier = Some("Lattes".to_string());
        store.upsert_chantiers(&[changed.clone()]).unwrap();

        let pending = store.unsynced_chantiers().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], changed);
    }

    #[test]
    fn test_project_id_round_trip() {
        let mut store = test_store();
        store.upsert_chantiers(&[sample_record("CH-01")]).unwrap();
        let id = Uuid::new_v4();
        assert_eq!(store.set_chantier_project_id("CH-01", &id).unwrap(), 1);
        assert_eq!(store.chantier_project_id("CH-01").unwrap(), Some(id));
        assert_eq!(store.chantier_project_id("CH-99").unwrap(), None);
    }

    #[test]
    fn test_from_erp_row_requires_code() {
        let columns = vec!["Code".to_string(), "Libelle".to_string()];
        let values = vec![ErpValue::Null, ErpValue::Text("sans code".to_string())];
        assert!(ChantierRecord::from_erp_row(&columns, &values).is_none());
    }

    #[test]
    fn test_from_erp_row_normalizes_fields() {
        let columns = vec![
            "Code".to_string(),
            "DateDebut".to_string(),
            "NomClient".to_string(),
            "TotalMO".to_string(),
        ];
        let values = vec![
            ErpValue::Text(" CH-07 ".to_string()),
            ErpValue::Text("08/01/2024".to_string()),
            ErpValue::Text("  Dupont BTP ".to_string()),
            ErpValue::Text("120,5".to_string()),
        ];
        let record = ChantierRecord::from_erp_row(&columns, &values).unwrap();
        assert_eq!(record.code, "CH-07");
        assert_eq!(record.date_debut, NaiveDate::from_ymd_opt(2024, 1, 8));
        assert_eq!(record.nom_client.as_deref(), Some("Dupont BTP"));
        assert_eq!(record.total_mo, Some(120.5));
        assert_eq!(record.date_fin, None);
    }
}
