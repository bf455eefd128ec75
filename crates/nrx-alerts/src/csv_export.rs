//! CSV writer for the condition inventory.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AlertsError, AlertsResult};
use crate::store::LocalStore;

/// Column header, in output order.
pub const CSV_HEADER: [&str; 6] = [
    "conditionId",
    "conditionName",
    "policyId",
    "policyName",
    "entityGuid",
    "nrqlQuery",
];

/// File name of the inventory for an account.
#[must_use]
pub fn csv_file_name(account_id: i64) -> String {
    format!("alerts_{account_id}.csv")
}

/// Write the header and one row per linked condition, ordered by policy id
/// then condition id. Returns the number of data rows.
pub fn write_csv_to<W: Write>(store: &LocalStore, writer: W) -> AlertsResult<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for (policy, condition) in store.rows() {
        csv.write_record([
            condition.id.as_str(),
            condition.name.as_str(),
            policy.id.as_str(),
            policy.name.as_str(),
            condition.guid.as_str(),
            condition.query.as_str(),
        ])?;
        rows += 1;
    }
    csv.flush().map_err(csv::Error::from)?;
    Ok(rows)
}

/// Write `alerts_<account>.csv` into `output_dir`, replacing any existing
/// file.
pub fn write_csv(store: &LocalStore, output_dir: &Path) -> AlertsResult<PathBuf> {
    let path = output_dir.join(csv_file_name(store.account_id()));
    let file = std::fs::File::create(&path).map_err(|err| AlertsError::io(&path, err))?;
    let rows = write_csv_to(store, std::io::BufWriter::new(file))?;
    info!(path = %path.display(), rows, "wrote condition inventory");
    Ok(path)
}
