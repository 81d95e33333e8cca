//! `pull` and `migrate`: produce a config file instead of changing the remote.

use tracing::info;

use doorman_core::{ConfigStore, FileConfigStore};

use crate::cli::{MigrateArgs, OutputFormat, PullArgs};
use crate::commands::{Context, confirm};
use crate::error::CliError;
use crate::output;

pub async fn pull(args: &PullArgs, ctx: &Context) -> Result<(), CliError> {
    let local = ctx.load_config_optional()?;
    let detection = ctx.detect(local.as_ref());
    let provider = ctx.connect(local.as_ref(), detection.provider)?;

    let mut fetched = provider.fetch_config(args.version).await?;
    if !args.write {
        let rendered = output::render_json(&fetched)?;
        output::print_output(&rendered, ctx.global.quiet);
        return Ok(());
    }

    if let Some(local) = local {
        if fetched.providers.vercel.is_none() {
            fetched.providers.vercel = local.providers.vercel;
        }
        if fetched.providers.cloudflare.is_none() {
            fetched.providers.cloudflare = local.providers.cloudflare;
        }
        let question = format!("Overwrite {} with the remote rules?", ctx.path.display());
        if !confirm(&question, ctx)? {
            info!("pull cancelled");
            return Ok(());
        }
    }

    ctx.store().save(&fetched)?;
    output::print_output(
        &format!(
            "Wrote {} rule(s) and {} IP rule(s) to {}",
            fetched.rules.len(),
            fetched.ips.len(),
            ctx.path.display()
        ),
        ctx.global.quiet,
    );
    Ok(())
}

pub fn migrate(args: &MigrateArgs, ctx: &Context) -> Result<(), CliError> {
    let config = ctx.load_config()?;
    let from = config
        .provider
        .unwrap_or_else(|| ctx.detect(Some(&config)).provider);
    let migration = doorman_core::migrate(&config, from, args.to);

    match args.out {
        Some(ref out) => {
            FileConfigStore::new(out).save(&migration.config)?;
            ctx.emit(&migration, output::migration_text)
        }
        None if ctx.global.output == OutputFormat::Json => {
            ctx.emit(&migration, output::migration_text)
        }
        None => {
            for warning in &migration.warnings {
                eprintln!("warning: {warning}");
            }
            let rendered = output::render_json(&migration.config)?;
            output::print_output(&rendered, ctx.global.quiet);
            Ok(())
        }
    }
}
