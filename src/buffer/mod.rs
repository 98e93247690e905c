//! Buffer Store
//!
//! The intermediate DuckDB database sitting between the ERP source and the
//! remote API. Each table keeps per-row sync flags; upsert semantics differ
//! per entity (chantiers/devis always refresh and re-arm on conflict, heures
//! never overwrite) and the submodules encode exactly that.

mod chantiers;
mod devis;
mod heures;

pub use chantiers::ChantierRecord;
pub use devis::DevisRecord;
pub use heures::{HeurePlacement, HeureRecord};

use crate::error::SyncError;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use duckdb::Connection;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Handle over the buffer database. Flows open one per invocation; dropping
/// it releases the connection on every exit path.
pub struct BufferStore {
    conn: Connection,
}

impl BufferStore {
    /// Open (or create) the buffer database at `path`
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Create the buffer tables when they do not exist yet
    pub fn init_schema(&self) -> Result<(), SyncError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chantiers (
                code TEXT PRIMARY KEY,
                date_debut TEXT,
                date_fin TEXT,
                nom_client TEXT,
                description TEXT,
                adr_chantier TEXT,
                cp_chantier TEXT,
                ville_chantier TEXT,
                total_mo DOUBLE,
                id_projet TEXT,
                sync BOOLEAN DEFAULT FALSE,
                sync_date TEXT
            );
            CREATE TABLE IF NOT EXISTS devis (
                code TEXT PRIMARY KEY,
                date_devis TEXT,
                date_fin TEXT,
                nom_client TEXT,
                libelle TEXT,
                adr_chantier TEXT,
                cp_chantier TEXT,
                ville_chantier TEXT,
                temps_mo DOUBLE,
                etat BIGINT,
                id_projet TEXT,
                sync BOOLEAN DEFAULT FALSE,
                sync_date TEXT
            );
            CREATE TABLE IF NOT EXISTS heures (
                id_heure TEXT PRIMARY KEY,
                date_debut TEXT NOT NULL,
                date_fin TEXT NOT NULL,
                id_utilisateur TEXT NOT NULL,
                id_projet TEXT,
                status_management TEXT,
                total_heure DOUBLE,
                panier BOOLEAN DEFAULT FALSE,
                trajet BOOLEAN DEFAULT FALSE,
                code_projet TEXT,
                sync BOOLEAN DEFAULT FALSE
            );
            CREATE TABLE IF NOT EXISTS heures_map (
                id_heure TEXT PRIMARY KEY,
                code_chantier TEXT NOT NULL,
                code_salarie TEXT NOT NULL,
                date_erp TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Cheap liveness probe for the check command
    pub fn ping(&self) -> Result<(), SyncError> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// Current UTC time in the store's timestamp format, for sync_date stamps
pub(crate) fn now_stamp() -> String {
    format_timestamp(&Utc::now().naive_utc())
}
