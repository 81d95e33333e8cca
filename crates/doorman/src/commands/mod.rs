//! Command handlers and the shared invocation context.

pub mod inspect;
pub mod login;
pub mod pull;
pub mod sync;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use dialoguer::Select;

use doorman_config::{EnvSettings, SystemKeyring};
use doorman_core::{
    ConfigStore, CoreError, Detection, DetectionInput, FileConfigStore, Provider, ProviderKind,
    ProviderPrompt, ProviderRegistry, UnifiedConfig, detect_provider,
};

use crate::cli::{Command, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output::{self, Palette};

// ── Context ─────────────────────────────────────────────────────────

/// Everything a handler needs besides its own arguments.
pub struct Context {
    pub global: GlobalOpts,
    pub env: EnvSettings,
    pub path: PathBuf,
    pub palette: Palette,
}

impl Context {
    pub fn new(global: GlobalOpts, env: EnvSettings) -> Self {
        let path = doorman_config::config_path(global.config.as_deref(), &env);
        let palette = Palette::new(global.color);
        Self {
            global,
            env,
            path,
            palette,
        }
    }

    pub fn store(&self) -> FileConfigStore {
        let store = FileConfigStore::new(&self.path);
        match doorman_config::backup_dir() {
            Some(dir) => store.with_backup_dir(dir),
            None => store,
        }
    }

    pub fn load_config(&self) -> Result<UnifiedConfig, CliError> {
        if !self.path.exists() {
            return Err(CliError::NoConfig {
                path: self.path.display().to_string(),
            });
        }
        self.store().load().map_err(|e| match e {
            CoreError::Config { message } | CoreError::Store { message } => CliError::BadConfig {
                path: self.path.display().to_string(),
                message,
            },
            other => other.into(),
        })
    }

    /// The config, or `None` if the file does not exist yet.
    pub fn load_config_optional(&self) -> Result<Option<UnifiedConfig>, CliError> {
        if self.path.exists() {
            self.load_config().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn detect(&self, config: Option<&UnifiedConfig>) -> Detection {
        let interactive = std::io::stdin().is_terminal() && !self.global.yes;
        let prompt = DialoguerPrompt;
        let detection = detect_provider(&DetectionInput {
            explicit: self.global.provider,
            config,
            env: self.env.snapshot(),
            prompt: interactive.then_some(&prompt as &dyn ProviderPrompt),
        });
        tracing::debug!(%detection, reasons = ?detection.reasons, "provider detected");
        detection
    }

    pub fn connect(
        &self,
        config: Option<&UnifiedConfig>,
        kind: ProviderKind,
    ) -> Result<Arc<Provider>, CliError> {
        let settings = doorman_config::provider_settings(&self.env, config, &SystemKeyring)?;
        let registry = ProviderRegistry::with_defaults(settings);
        Ok(registry.get(kind)?)
    }

    pub fn emit<T: serde::Serialize>(
        &self,
        data: &T,
        text: impl FnOnce(&T, Palette) -> String,
    ) -> Result<(), CliError> {
        let rendered = match self.global.output {
            OutputFormat::Json => output::render_json(data)?,
            OutputFormat::Text => text(data, self.palette),
        };
        output::print_output(&rendered, self.global.quiet);
        Ok(())
    }
}

// ── Interactive prompt ──────────────────────────────────────────────

struct DialoguerPrompt;

impl ProviderPrompt for DialoguerPrompt {
    fn choose(&self, candidates: &[ProviderKind]) -> Option<ProviderKind> {
        let items: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        Select::new()
            .with_prompt("Which provider should doorman target?")
            .items(&items)
            .default(0)
            .interact_opt()
            .ok()
            .flatten()
            .and_then(|index| candidates.get(index).copied())
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, ctx: &Context) -> Result<bool, CliError> {
    if ctx.global.yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.trim_end_matches('?').to_lowercase(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

// ── Dispatch ────────────────────────────────────────────────────────

pub async fn dispatch(command: Command, ctx: &Context) -> Result<(), CliError> {
    match command {
        Command::Plan => sync::plan(ctx).await,
        Command::Sync(args) => sync::sync(&args, ctx).await,
        Command::Validate => inspect::validate(ctx),
        Command::Health => inspect::health(ctx),
        Command::Detect => inspect::detect(ctx),
        Command::Compat(args) => inspect::compat(&args, ctx),
        Command::Pull(args) => pull::pull(&args, ctx).await,
        Command::Migrate(args) => pull::migrate(&args, ctx),
        Command::Login(args) => login::login(&args, ctx),
        Command::Logout(args) => login::logout(&args, ctx),
        Command::Completions(_) => Err(CliError::Internal(
            "completions are handled before dispatch".into(),
        )),
    }
}
