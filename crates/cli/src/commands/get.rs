use std::path::Path;

use super::CmdResult;
use crate::tiers::Tiers;
use crate::{print_json, OutputFormat};

pub(crate) async fn cmd_get(config: Option<&Path>, id: &str, output: OutputFormat) -> CmdResult {
    let tiers = Tiers::open(config).await?;
    let resolved = tiers
        .resolver()
        .resolve(id)
        .await?
        .ok_or_else(|| format!("record {id:?} not found in either tier"))?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "tier": resolved.tier,
            "record": resolved.record,
        }))?,
        OutputFormat::Text => print_json(&resolved.record)?,
    }
    Ok(())
}
