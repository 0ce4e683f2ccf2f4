use std::path::Path;

use tierstore_storage::{PrimaryStore, Record};
use time::OffsetDateTime;
use tracing::info;

use super::CmdResult;
use crate::tiers::Tiers;
use crate::{print_json, OutputFormat};

pub(crate) async fn cmd_put(
    config: Option<&Path>,
    id: &str,
    payload: &str,
    timestamp: Option<OffsetDateTime>,
    output: OutputFormat,
    quiet: bool,
) -> CmdResult {
    let payload: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| format!("error parsing --payload: {e}"))?;
    let tiers = Tiers::open(config).await?;

    let timestamp = timestamp.unwrap_or_else(OffsetDateTime::now_utc);
    let record = Record::new(id, timestamp, payload, tiers.policy.as_ref())?;
    let key = record.key();
    tiers.primary.upsert(record).await?;
    info!(%key, "stored record in primary tier");

    match output {
        OutputFormat::Json => print_json(&key)?,
        OutputFormat::Text => {
            if !quiet {
                println!("Stored {} in partition {}", key.id, key.partition_key);
            }
        }
    }
    Ok(())
}
