//! Keyring token management.

use dialoguer::Password;
use secrecy::SecretString;

use doorman_config::SystemKeyring;

use crate::cli::LoginArgs;
use crate::commands::Context;
use crate::error::CliError;
use crate::output;

pub fn login(args: &LoginArgs, ctx: &Context) -> Result<(), CliError> {
    let token = Password::new()
        .with_prompt(format!("{} API token", args.provider))
        .interact()
        .map_err(|e| CliError::Validation {
            field: "token".into(),
            reason: format!("prompt failed: {e}"),
        })?;
    if token.trim().is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }

    SystemKeyring.store(args.provider, &SecretString::from(token.trim().to_owned()))?;
    output::print_output(
        &format!("Stored {} token in the system keyring.", args.provider),
        ctx.global.quiet,
    );
    Ok(())
}

pub fn logout(args: &LoginArgs, ctx: &Context) -> Result<(), CliError> {
    SystemKeyring.delete(args.provider)?;
    output::print_output(
        &format!("Removed {} token from the system keyring.", args.provider),
        ctx.global.quiet,
    );
    Ok(())
}
