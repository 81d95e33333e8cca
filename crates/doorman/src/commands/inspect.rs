//! Offline commands: `validate`, `health`, `detect`, `compat`.

use doorman_core::{compat, health, validate as validate_config};

use crate::cli::CompatArgs;
use crate::commands::Context;
use crate::error::CliError;
use crate::output;

pub fn validate(ctx: &Context) -> Result<(), CliError> {
    let config = ctx.load_config()?;
    let target = ctx.global.provider.or(config.provider);
    let result = validate_config(&config, target);
    ctx.emit(&result, output::validation_text)?;

    if result.valid {
        Ok(())
    } else {
        let issues = result.into_errors();
        Err(CliError::Invalid {
            count: issues.len(),
            details: "Run: doorman validate -o json for machine-readable issues".into(),
        })
    }
}

pub fn health(ctx: &Context) -> Result<(), CliError> {
    let config = ctx.load_config()?;
    let detection = ctx.detect(Some(&config));
    let score = health::score(&config, detection.provider);
    ctx.emit(&score, output::health_text)
}

pub fn detect(ctx: &Context) -> Result<(), CliError> {
    let config = ctx.load_config_optional()?;
    let detection = ctx.detect(config.as_ref());
    ctx.emit(&detection, output::detection_text)
}

/// Against the local config when there is one, otherwise the full matrix.
pub fn compat(args: &CompatArgs, ctx: &Context) -> Result<(), CliError> {
    let report = match ctx.load_config_optional()? {
        Some(mut config) => {
            config.provider = Some(args.from);
            compat::assess_config(&config, args.to)
        }
        None => compat::migration_report(args.from, args.to),
    };
    ctx.emit(&report, output::compat_text)
}
