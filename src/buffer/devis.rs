//! Devis buffer table
//!
//! Staged accepted-quote records. Same lifecycle as chantiers: re-imports
//! overwrite and re-arm, pushes flip `sync` one row at a time.

use super::{format_date, now_stamp, parse_date, BufferStore};
use crate::erp::ErpValue;
use crate::error::SyncError;
use crate::normalize::{normalize_date, normalize_number, normalize_text, RowView};
use chrono::NaiveDate;
use duckdb::{params, OptionalExt};
use uuid::Uuid;

/// One staged devis row
#[derive(Debug, Clone, PartialEq)]
pub struct DevisRecord {
    pub code: String,
    pub date_devis: Option<NaiveDate>,
    pub date_fin: Option<NaiveDate>,
    pub nom_client: Option<String>,
    pub libelle: Option<String>,
    pub adr_chantier: Option<String>,
    pub cp_chantier: Option<String>,
    pub ville_chantier: Option<String>,
    pub temps_mo: Option<f64>,
    pub etat: Option<i64>,
}

impl DevisRecord {
    /// Build a record from one ERP result row. Returns `None` when the row
    /// has no usable natural key.
    pub fn from_erp_row(columns: &[String], values: &[ErpValue]) -> Option<Self> {
        let view = RowView::new(columns, values);
        let code = view
            .lookup(&["Code", "CodeDevis"], &["code"])
            .and_then(normalize_text)?;
        Some(Self {
            code,
            date_devis: view.lookup(&["DateDevis"], &["devis"]).and_then(normalize_date),
            date_fin: view.lookup(&["DateFin"], &["fin"]).and_then(normalize_date),
            nom_client: view
                .lookup(&["NomClient"], &["client"])
                .and_then(normalize_text),
            libelle: view
                .lookup(&["Libelle"], &["libell"])
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
            temps_mo: view
                .lookup(&["TempsMO", "TotalMO"], &["mo"])
                .and_then(normalize_number),
            etat: view.lookup(&["Etat"], &["etat"]).and_then(|v| match v {
                ErpValue::Int(n) => Some(*n),
                ErpValue::Float(f) => Some(*f as i64),
                ErpValue::Text(s) => s.trim().parse().ok(),
                _ => None,
            }),
        })
    }
}

impl BufferStore {
    /// Upsert a pulled batch in one transaction, overwriting on conflict and
    /// resetting `sync`.
    pub fn upsert_devis(&mut self, records: &[DevisRecord]) -> Result<usize, SyncError> {
        let tx = self.conn_mut().transaction()?;
        for record in records {
            tx.execute(
                r#"
                INSERT INTO devis
                    (code, date_devis, date_fin, nom_client, libelle,
                     adr_chantier, cp_chantier, ville_chantier, temps_mo, etat, sync)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE)
                ON CONFLICT (code) DO UPDATE SET
                    date_devis = excluded.date_devis,
                    date_fin = excluded.date_fin,
                    nom_client = excluded.nom_client,
                    libelle = excluded.libelle,
                    adr_chantier = excluded.adr_chantier,
                    cp_chantier = excluded.cp_chantier,
                    ville_chantier = excluded.ville_chantier,
                    temps_mo = excluded.temps_mo,
                    etat = excluded.etat,
                    sync = FALSE
                "#,
                params![
                    record.code,
                    record.date_devis.as_ref().map(format_date),
                    record.date_fin.as_ref().map(format_date),
                    record.nom_client,
                    record.libelle,
                    record.adr_chantier,
                    record.cp_chantier,
                    record.ville_chantier,
                    record.temps_mo,
                    record.etat,
                ],
            )?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// All rows still waiting to reach the remote side
    pub fn unsynced_devis(&self) -> Result<Vec<DevisRecord>, SyncError> {
        let mut stmt = self.conn().prepare(
            r#"
            SELECT code, date_devis, date_fin, nom_client, libelle,
                   adr_chantier, cp_chantier, ville_chantier, temps_mo, etat
            FROM devis
            WHERE sync = FALSE
            ORDER BY code
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DevisRecord {
                code: row.get(0)?,
                date_devis: row.get::<_, Option<String>>(1)?.and_then(|s| parse_date(&s)),
                date_fin: row.get::<_, Option<String>>(2)?.and_then(|s| parse_date(&s)),
                nom_client: row.get(3)?,
                libelle: row.get(4)?,
                adr_chantier: row.get(5)?,
                cp_chantier: row.get(6)?,
                ville_chantier: row.get(7)?,
                temps_mo: row.get(8)?,
                etat: row.get(9)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Flip one row to synced and stamp it
    pub fn mark_devis_synced(&self, code: &str) -> Result<(), SyncError> {
        self.conn().execute(
            "UPDATE devis SET sync = TRUE, sync_date = ? WHERE code = ?",
            params![now_stamp(), code],
        )?;
        Ok(())
    }

    /// Persist the remote project id learned from the listing
    pub fn set_devis_project_id(&self, code: &str, id: &Uuid) -> Result<usize, SyncError> {
        let changed = self.conn().execute(
            "UPDATE devis SET id_projet = ? WHERE code = ?",
            params![id.to_string(), code],
        )?;
        Ok(changed)
    }

    /// Stored remote linkage for one devis
    pub fn devis_project_id(&self, code: &str) -> Result<Option<Uuid>, SyncError> {
        let id: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT id_projet FROM devis WHERE code = ?",
                params![code],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.flatten().and_then(|s| Uuid::parse_str(&s).ok()))
    }

    /// Sync flag and stamp for one row
    pub fn devis_sync_state(
        &self,
        code: &str,
    ) -> Result<Option<(bool, Option<String>)>, SyncError> {
        let state = self
            .conn()
            .query_row(
                "SELECT sync, sync_date FROM devis WHERE code = ?",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(state)
    }

    /// (total, pending) devis counts for the status report
    pub fn devis_counts(&self) -> Result<(i64, i64), SyncError> {
        let counts = self.conn().query_row(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE sync = FALSE) FROM devis",
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

    fn sample_record(code: &str) -> DevisRecord {
        DevisRecord {
            code: code.to_string(),
            date_devis: NaiveDate::from_ymd_opt(2024, 2, 14),
            date_fin: NaiveDate::from_ymd_opt(2024, 11, 15),
            nom_client: Some("SARL Ravalex".to_string()),
            libelle: Some("Ravalement facade nord".to_string()),
            adr_chantier: Some("4 avenue de la Gare".to_string()),
            cp_chantier: Some("34170".to_string()),
            ville_chantier: Some("Castelnau-le-Lez".to_string()),
            temps_mo: Some(64.0),
            etat: Some(3),
        }
    }

    #[test]
    fn test_repull_overwrites_and_rearms() {
        let mut store = test_store();
        store.upsert_devis(&[sample_record("DV-100")]).unwrap();
        store.mark_devis_synced("DV-100").unwrap();

        let mut changed = sample_record("DV-100");
        changed.temps_mo = Some(72.0);
        store.upsert_devis(&[changed.clone()]).unwrap();

        let pending = store.unsynced_devis().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], changed);
    }

    #[test]
    fn test_mark_synced_sets_stamp() {
        let mut store = test_store();
        store.upsert_devis(&[sample_record("DV-100")]).unwrap();
        store.mark_devis_synced("DV-100").unwrap();

        let (synced, stamp) = store.devis_sync_state("DV-100").unwrap().unwrap();
        assert!(synced);
        assert!(stamp.is_some());
        assert!(store.unsynced_devis().unwrap().is_empty());
    }

    #[test]
    fn test_from_erp_row_reads_etat() {
        let columns = vec![
            "Code".to_string(),
            "DateDevis".to_string(),
            "TempsMO".to_string(),
            "Etat".to_string(),
        ];
        let values = vec![
            ErpValue::Text("DV-100".to_string()),
            ErpValue::Text("2024-02-14".to_string()),
            ErpValue::Float(64.0),
            ErpValue::Int(3),
        ];
        let record = DevisRecord::from_erp_row(&columns, &values).unwrap();
        assert_eq!(record.code, "DV-100");
        assert_eq!(record.date_devis, NaiveDate::from_ymd_opt(2024, 2, 14));
        assert_eq!(record.temps_mo, Some(64.0));
        assert_eq!(record.etat, Some(3));
    }

    #[test]
    fn test_counts_track_pending() {
        let mut store = test_store();
        store
            .upsert_devis(&[sample_record("DV-100"), sample_record("DV-101")])
            .unwrap();
        store.mark_devis_synced("DV-100").unwrap();
        assert_eq!(store.devis_counts().unwrap(), (2, 1));
    }
}
