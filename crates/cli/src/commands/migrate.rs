use std::path::Path;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::CmdResult;
use crate::tiers::Tiers;
use crate::{print_json, OutputFormat};

pub(crate) async fn cmd_migrate(
    config: Option<&Path>,
    cutoff: Option<OffsetDateTime>,
    output: OutputFormat,
    quiet: bool,
) -> CmdResult {
    let tiers = Tiers::open(config).await?;
    let engine = tiers.engine();

    // Ctrl-C stops the sweep between records; in-flight records finish.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight records");
            trigger.cancel();
        }
    });

    let report = match cutoff {
        Some(cutoff) => engine.run_cycle_with_cancel(cutoff, &cancel).await?,
        None => engine.run_cycle_now(&cancel).await?,
    };

    match output {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            if !quiet || !report.is_clean() {
                print!("{report}");
            }
        }
    }
    Ok(())
}
