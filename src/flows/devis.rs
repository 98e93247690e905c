//! Devis sync flow
//!
//! Won quotes become remote projects. The pull is filtered to the ERP status
//! meaning "concretized"; the push reuses the project endpoint with the quote
//! fields passed through as-is.

use super::{project_index, SyncOutcome};
use crate::buffer::{BufferStore, DevisRecord};
use crate::erp::ErpLink;
use crate::remote::{ProjectPayload, RemoteApi};
use tracing::{error, info, warn};

// Etat 3 is "devis gagné" in the Batigest status enum
const DEVIS_SQL: &str = r#"
SELECT Devis.Code, Devis.DateDevis, Devis.DateFin, Client.NomClient,
       Devis.Libelle, Devis.AdrChantier, Devis.CPChantier,
       Devis.VilleChantier, Devis.TempsMO, Devis.Etat
FROM dbo.Devis
JOIN Client ON Client.Code = Devis.CodeClient
WHERE Devis.Etat = 3
"#;

/// Stage won ERP quotes into the buffer
pub fn pull_devis(erp: &mut dyn ErpLink, store: &mut BufferStore) -> SyncOutcome {
    let batch = match erp.query(DEVIS_SQL, &[]) {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "devis read failed");
            return SyncOutcome::failed(format!("devis pull failed: {e}"));
        }
    };

    let mut records = Vec::new();
    for row in &batch.rows {
        match DevisRecord::from_erp_row(&batch.columns, row) {
            Some(record) => records.push(record),
            None => warn!("skipping devis row without a usable code"),
        }
    }

    match store.upsert_devis(&records) {
        Ok(count) => {
            info!(count, "devis staged");
            SyncOutcome::ok(format!("{count} devis staged"))
        }
        Err(e) => {
            error!(error = %e, "devis staging failed");
            SyncOutcome::failed(format!("devis pull failed: {e}"))
        }
    }
}

/// Push pending devis to the remote project endpoint.
///
/// Same create-vs-update split and return contract as chantiers: true when
/// at least one row landed or none were pending.
pub fn push_devis(store: &mut BufferStore, remote: &dyn RemoteApi, head_quarter_id: i64) -> bool {
    let pending = match store.unsynced_devis() {
        Ok(pending) => pending,
        Err(e) => {
            error!(error = %e, "could not read pending devis");
            return false;
        }
    };
    if pending.is_empty() {
        info!("no devis awaiting push");
        return true;
    }

    let existing = project_index(remote);
    let mut pushed = 0;
    for record in &pending {
        let payload = devis_payload(record, head_quarter_id);
        let result = match existing.get(record.code.as_str()) {
            Some(id) => remote.update_project(&payload.with_id(*id)),
            None => remote.create_project(&payload),
        };
        match result {
            Ok(()) => {
                if let Err(e) = store.mark_devis_synced(&record.code) {
                    error!(code = %record.code, error = %e, "pushed but could not mark synced");
                    continue;
                }
                pushed += 1;
            }
            Err(e) => {
                warn!(code = %record.code, error = %e, "remote rejected devis, row left pending");
            }
        }
    }

    info!(pushed, pending = pending.len() - pushed, "devis push finished");
    pushed > 0
}

/// Quote fields pass through without the chantier naming fallbacks
fn devis_payload(record: &DevisRecord, head_quarter_id: i64) -> ProjectPayload {
    ProjectPayload::new(
        record.code.clone(),
        record.nom_client.clone().unwrap_or_default(),
        record.nom_client.clone(),
        record.libelle.clone(),
        record.adr_chantier.clone().unwrap_or_default(),
        record.cp_chantier.clone().unwrap_or_default(),
        record.ville_chantier.clone().unwrap_or_default(),
        Some(record.temps_mo.unwrap_or(0.0)),
        record.date_devis,
        record.date_fin,
        head_quarter_id,
    )
}
