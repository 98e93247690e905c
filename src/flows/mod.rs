//! Sync Flows
//!
//! The directional transfer operations and their orchestration. Every public
//! flow returns a structured outcome instead of panicking or propagating
//! errors, so callers can render a message unconditionally. Pulls commit once
//! per batch; pushes commit per record and isolate per-record failures.

mod chantiers;
mod devis;
mod heures;

pub use chantiers::{pull_chantiers, push_chantiers};
pub use devis::{pull_devis, push_devis};
pub use heures::{pull_heures, push_heures};

use crate::buffer::BufferStore;
use crate::config::{AppConfig, ErpKind, SyncMode};
use crate::erp::{self, ErpLink};
use crate::mapping;
use crate::remote::{BatiSimplyClient, RemoteApi, RemoteProject};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of one flow invocation
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
}

impl SyncOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// ERP -> buffer -> remote, for the configured record family.
///
/// The push only runs when the pull succeeded, so the remote never sees a
/// half-staged batch.
pub fn sync_to_remote(
    erp: &mut dyn ErpLink,
    store: &mut BufferStore,
    remote: &dyn RemoteApi,
    kind: ErpKind,
    mode: SyncMode,
    head_quarter_id: i64,
) -> SyncOutcome {
    match mode {
        SyncMode::Chantier => {
            let pulled = pull_chantiers(erp, store, kind);
            if !pulled.success {
                return pulled;
            }
            if push_chantiers(store, remote, head_quarter_id) {
                SyncOutcome::ok(format!("{}; chantier push complete", pulled.message))
            } else {
                SyncOutcome::failed(format!(
                    "{}; chantier push incomplete, pending rows will retry on the next run",
                    pulled.message
                ))
            }
        }
        SyncMode::Devis => {
            let pulled = pull_devis(erp, store);
            if !pulled.success {
                return pulled;
            }
            if push_devis(store, remote, head_quarter_id) {
                SyncOutcome::ok(format!("{}; devis push complete", pulled.message))
            } else {
                SyncOutcome::failed(format!(
                    "{}; devis push incomplete, pending rows will retry on the next run",
                    pulled.message
                ))
            }
        }
    }
}

/// Remote -> buffer -> ERP for time slots.
///
/// Project links are refreshed between the pull and the push so slots on
/// newly created projects become placeable; a refresh failure downgrades to
/// a warning and the push runs with whatever links are already stored.
pub fn sync_from_remote(
    erp: &mut dyn ErpLink,
    store: &mut BufferStore,
    remote: &dyn RemoteApi,
    days_back: u32,
) -> SyncOutcome {
    let pulled = pull_heures(remote, store, days_back);
    if !pulled.success {
        return pulled;
    }

    match mapping::refresh_project_links(store, remote) {
        Ok(relinked) => info!(relinked, "project links refreshed"),
        Err(e) => warn!(error = %e, "project link refresh failed, continuing with stored links"),
    }

    match push_heures(store, erp) {
        Ok(placed) => SyncOutcome::ok(format!(
            "{}; {placed} time slot(s) placed in the ERP day sheet",
            pulled.message
        )),
        Err(e) => SyncOutcome::failed(format!("{}; timesheet push failed: {e}", pulled.message)),
    }
}

/// Probe every configured target and report each one
pub fn check_connections(config: &AppConfig) -> SyncOutcome {
    let mut lines = Vec::new();
    let mut all_ok = true;

    match config
        .buffer_path()
        .and_then(|path| BufferStore::open(&path))
        .and_then(|store| {
            store.ping()?;
            Ok(store)
        }) {
        Ok(_) => lines.push("buffer: ok".to_string()),
        Err(e) => {
            all_ok = false;
            lines.push(format!("buffer: failed ({e})"));
        }
    }

    match BatiSimplyClient::connect(&config.remote) {
        Ok(_) => lines.push("remote: ok (token acquired)".to_string()),
        Err(e) => {
            all_ok = false;
            lines.push(format!("remote: failed ({e})"));
        }
    }

    match erp::connect(&config.erp) {
        Ok(_) => lines.push(format!("erp: ok ({})", config.erp.kind)),
        Err(e) => {
            all_ok = false;
            lines.push(format!("erp: failed ({e})"));
        }
    }

    SyncOutcome {
        success: all_ok,
        message: lines.join("\n"),
    }
}

/// Project listing reduced to a code -> id map, built once per push.
///
/// A failed listing degrades to an empty map so every pending row is sent
/// as a create, matching the behavior when the remote side is empty.
fn project_index(remote: &dyn RemoteApi) -> HashMap<String, Uuid> {
    let projects = match remote.list_projects() {
        Ok(projects) => projects,
        Err(e) => {
            warn!(error = %e, "project listing unavailable, treating every row as new");
            Vec::new()
        }
    };
    index_projects(projects)
}

fn index_projects(projects: Vec<RemoteProject>) -> HashMap<String, Uuid> {
    projects
        .into_iter()
        .filter_map(|p| p.project_code.map(|code| (code, p.id)))
        .collect()
}
