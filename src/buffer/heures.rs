//! Heures buffer table
//!
//! Staged time slots pulled from the remote API. The remote side owns these
//! rows, so the pull is insert-only: a slot already present is never touched,
//! which keeps a locally consumed row from being re-armed by a later pull.
//! `heures_map` keeps the ERP placement each pushed slot landed on.

use super::{format_timestamp, parse_timestamp, BufferStore};
use crate::error::SyncError;
use chrono::NaiveDateTime;
use duckdb::{params, OptionalExt};
use uuid::Uuid;

/// One staged time slot
#[derive(Debug, Clone, PartialEq)]
pub struct HeureRecord {
    pub id_heure: String,
    pub date_debut: NaiveDateTime,
    pub date_fin: NaiveDateTime,
    pub id_utilisateur: Uuid,
    pub id_projet: Option<Uuid>,
    pub status_management: Option<String>,
    pub total_heure: f64,
    pub panier: bool,
    pub trajet: bool,
    pub code_projet: Option<String>,
    pub sync: bool,
}

/// Where a pushed slot landed in the ERP day sheet
#[derive(Debug, Clone, PartialEq)]
pub struct HeurePlacement {
    pub code_chantier: String,
    pub code_salarie: String,
    pub date_erp: NaiveDateTime,
}

impl BufferStore {
    /// Insert a pulled batch in one transaction, skipping ids already
    /// present. Returns how many rows were actually new.
    pub fn insert_new_heures(&mut self, records: &[HeureRecord]) -> Result<usize, SyncError> {
        let tx = self.conn_mut().transaction()?;
        let mut inserted = 0;
        for record in records {
            inserted += tx.execute(
                r#"
                INSERT INTO heures
                    (id_heure, date_debut, date_fin, id_utilisateur, id_projet,
                     status_management, total_heure, panier, trajet, code_projet, sync)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE)
                ON CONFLICT (id_heure) DO NOTHING
                "#,
                params![
                    record.id_heure,
                    format_timestamp(&record.date_debut),
                    format_timestamp(&record.date_fin),
                    record.id_utilisateur.to_string(),
                    record.id_projet.map(|id| id.to_string()),
                    record.status_management,
                    record.total_heure,
                    record.panier,
                    record.trajet,
                    record.code_projet,
                ],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Rows ready for the ERP: not yet consumed, validated by a manager,
    /// and resolved to a chantier code.
    pub fn pushable_heures(&self) -> Result<Vec<HeureRecord>, SyncError> {
        let mut stmt = self.conn().prepare(
            r#"
            SELECT id_heure, date_debut, date_fin, id_utilisateur, id_projet,
                   status_management, total_heure, panier, trajet, code_projet, sync
            FROM heures
            WHERE sync = FALSE
              AND status_management = 'VALIDATED'
              AND code_projet IS NOT NULL
            ORDER BY date_debut, id_heure
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawHeureRow {
                id_heure: row.get(0)?,
                date_debut: row.get(1)?,
                date_fin: row.get(2)?,
                id_utilisateur: row.get(3)?,
                id_projet: row.get(4)?,
                status_management: row.get(5)?,
                total_heure: row.get(6)?,
                panier: row.get(7)?,
                trajet: row.get(8)?,
                code_projet: row.get(9)?,
                sync: row.get(10)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            if let Some(record) = row?.into_record() {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Flip one slot to consumed. Heures carry no sync stamp, the placement
    /// row in `heures_map` is the durable trace.
    pub fn mark_heure_synced(&self, id_heure: &str) -> Result<(), SyncError> {
        self.conn().execute(
            "UPDATE heures SET sync = TRUE WHERE id_heure = ?",
            params![id_heure],
        )?;
        Ok(())
    }

    /// Rewrite the chantier linkage for every slot pointing at a remote
    /// project id. Returns how many rows changed.
    pub fn update_heures_code_projet(
        &self,
        id_projet: &Uuid,
        code: &str,
    ) -> Result<usize, SyncError> {
        let changed = self.conn().execute(
            "UPDATE heures SET code_projet = ? WHERE id_projet = ?",
            params![code, id_projet.to_string()],
        )?;
        Ok(changed)
    }

    /// Record where a pushed slot landed in the ERP
    pub fn record_placement(
        &self,
        id_heure: &str,
        placement: &HeurePlacement,
    ) -> Result<(), SyncError> {
        self.conn().execute(
            r#"
            INSERT INTO heures_map (id_heure, code_chantier, code_salarie, date_erp)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (id_heure) DO UPDATE SET
                code_chantier = excluded.code_chantier,
                code_salarie = excluded.code_salarie,
                date_erp = excluded.date_erp
            "#,
            params![
                id_heure,
                placement.code_chantier,
                placement.code_salarie,
                format_timestamp(&placement.date_erp),
            ],
        )?;
        Ok(())
    }

    /// Stored placement for one slot, if it ever reached the ERP
    pub fn placement_for(&self, id_heure: &str) -> Result<Option<HeurePlacement>, SyncError> {
        let row = self
            .conn()
            .query_row(
                "SELECT code_chantier, code_salarie, date_erp FROM heures_map WHERE id_heure = ?",
                params![id_heure],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(|(code_chantier, code_salarie, stamp)| {
            parse_timestamp(&stamp).map(|date_erp| HeurePlacement {
                code_chantier,
                code_salarie,
                date_erp,
            })
        }))
    }

    /// (total, pending, validated-and-placeable) counts for the status report
    pub fn heure_counts(&self) -> Result<(i64, i64, i64), SyncError> {
        let counts = self.conn().query_row(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE sync = FALSE),
                   COUNT(*) FILTER (WHERE sync = FALSE
                                      AND status_management = 'VALIDATED'
                                      AND code_projet IS NOT NULL)
            FROM heures
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(counts)
    }

    #[cfg(test)]
    fn heure_by_id(&self, id_heure: &str) -> Result<Option<HeureRecord>, SyncError> {
        let row = self
            .conn()
            .query_row(
                r#"
                SELECT id_heure, date_debut, date_fin, id_utilisateur, id_projet,
                       status_management, total_heure, panier, trajet, code_projet, sync
                FROM heures WHERE id_heure = ?
                "#,
                params![id_heure],
                |row| {
                    Ok(RawHeureRow {
                        id_heure: row.get(0)?,
                        date_debut: row.get(1)?,
                        date_fin: row.get(2)?,
                        id_utilisateur: row.get(3)?,
                        id_projet: row.get(4)?,
                        status_management: row.get(5)?,
                        total_heure: row.get(6)?,
                        panier: row.get(7)?,
                        trajet: row.get(8)?,
                        code_projet: row.get(9)?,
                        sync: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(row.and_then(RawHeureRow::into_record))
    }
}

/// Column-level row image before timestamps and uuids are re-parsed
struct RawHeureRow {
    id_heure: String,
    date_debut: String,
    date_fin: String,
    id_utilisateur: String,
    id_projet: Option<String>,
    status_management: Option<String>,
    total_heure: f64,
    panier: bool,
    trajet: bool,
    code_projet: Option<String>,
    sync: bool,
}

impl RawHeureRow {
    fn into_record(self) -> Option<HeureRecord> {
        Some(HeureRecord {
            id_heure: self.id_heure,
            date_debut: parse_timestamp(&self.date_debut)?,
            date_fin: parse_timestamp(&self.date_fin)?,
            id_utilisateur: Uuid::parse_str(&self.id_utilisateur).ok()?,
            id_projet: self.id_projet.and_then(|s| Uuid::parse_str(&s).ok()),
            status_management: self.status_management,
            total_heure: self.total_heure,
            panier: self.panier,
            trajet: self.trajet,
            code_projet: self.code_projet,
            sync: self.sync,
        })
    }
}
