//! `plan` and `sync`.

use tracing::info;

use doorman_core::{SyncOptions, SyncOrchestrator};

use crate::cli::{OutputFormat, SyncArgs};
use crate::commands::{Context, confirm};
use crate::error::CliError;
use crate::output;

pub async fn plan(ctx: &Context) -> Result<(), CliError> {
    let config = ctx.load_config()?;
    let detection = ctx.detect(Some(&config));
    let provider = ctx.connect(Some(&config), detection.provider)?;

    let changes = provider.get_changes(&config).await?;
    ctx.emit(&changes, output::changes_text)
}

pub async fn sync(args: &SyncArgs, ctx: &Context) -> Result<(), CliError> {
    let config = ctx.load_config()?;
    let detection = ctx.detect(Some(&config));
    let provider = ctx.connect(Some(&config), detection.provider)?;

    if !args.dry_run && !ctx.global.yes {
        let changes = provider.get_changes(&config).await?;
        let total = changes.rules.len() + changes.ips.len();
        if total == 0 {
            return ctx.emit(&changes, output::changes_text);
        }
        if ctx.global.output == OutputFormat::Text {
            output::print_output(&output::changes_text(&changes, ctx.palette), ctx.global.quiet);
        }
        let question = format!("Apply {total} change(s) to {}?", detection.provider);
        if !confirm(&question, ctx)? {
            info!("sync cancelled");
            return Ok(());
        }
    }

    let orchestrator = SyncOrchestrator::new(provider, ctx.store());
    let report = orchestrator
        .run(SyncOptions {
            dry_run: args.dry_run,
            apply_id_repairs: args.repair_ids,
        })
        .await?;
    ctx.emit(&report, output::sync_text)
}
