//! Output formatting: human-readable text or JSON.
//!
//! Text renderers return plain `String`s so they can be tested without a
//! terminal; color is applied through [`Palette`].

use std::fmt::Write as _;
use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;

use doorman_core::compat::MigrationReport;
use doorman_core::{
    ChangeSet, Detection, HealthScore, Migration, ProviderChanges, Severity, SyncReport,
    UnifiedIpRule, UnifiedRule, ValidationResult,
};

use crate::cli::ColorMode;
use crate::error::CliError;

// ── Color ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(mode: ColorMode) -> Self {
        let enabled = match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        };
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self { enabled: false }
    }

    fn paint(self, text: &str, f: impl Fn(&str) -> String) -> String {
        if self.enabled { f(text) } else { text.to_owned() }
    }

    pub fn add(self, text: &str) -> String {
        self.paint(text, |t| t.green().to_string())
    }

    pub fn change(self, text: &str) -> String {
        self.paint(text, |t| t.yellow().to_string())
    }

    pub fn remove(self, text: &str) -> String {
        self.paint(text, |t| t.red().to_string())
    }

    pub fn heading(self, text: &str) -> String {
        self.paint(text, |t| t.bold().to_string())
    }

    pub fn dim(self, text: &str) -> String {
        self.paint(text, |t| t.dimmed().to_string())
    }
}

// ── Printing ─────────────────────────────────────────────────────────

pub fn render_json<T: Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Print to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Changes ──────────────────────────────────────────────────────────

fn rule_label(rule: &UnifiedRule) -> String {
    match rule.id {
        Some(ref id) => format!("{} ({id})", rule.name),
        None => rule.name.clone(),
    }
}

fn ip_label(ip: &UnifiedIpRule) -> String {
    let mut label = format!("{} {}", ip.action, ip.ip);
    if let Some(ref host) = ip.hostname {
        let _ = write!(label, " @ {host}");
    }
    label
}

fn change_lines<T>(out: &mut String, set: &ChangeSet<T>, label: impl Fn(&T) -> String, p: Palette) {
    for item in &set.to_delete {
        let _ = writeln!(out, "  {}", p.remove(&format!("- {}", label(item))));
    }
    for item in &set.to_add {
        let _ = writeln!(out, "  {}", p.add(&format!("+ {}", label(item))));
    }
    for item in &set.to_update {
        let _ = writeln!(out, "  {}", p.change(&format!("~ {}", label(item))));
    }
}

pub fn changes_text(changes: &ProviderChanges, p: Palette) -> String {
    let mut out = String::new();
    if !changes.rules.has_changes() && !changes.ips.has_changes() {
        out.push_str("No changes. Remote matches the local config.");
    } else {
        if changes.rules.has_changes() {
            let _ = writeln!(out, "{}", p.heading("Rules"));
            change_lines(&mut out, &changes.rules, rule_label, p);
        }
        if changes.ips.has_changes() {
            let _ = writeln!(out, "{}", p.heading("IP rules"));
            change_lines(&mut out, &changes.ips, ip_label, p);
        }
        let (r, i) = (changes.rules.counts(), changes.ips.counts());
        let _ = write!(
            out,
            "Plan: {} to add, {} to update, {} to delete.",
            r.added + i.added,
            r.updated + i.updated,
            r.deleted + i.deleted
        );
    }
    if let Some(version) = changes.remote_version {
        let _ = write!(out, "\n{}", p.dim(&format!("remote version {version}")));
    }
    warnings(&mut out, &changes.warnings, p);
    out
}

fn warnings(out: &mut String, warnings: &[String], p: Palette) {
    for warning in warnings {
        let _ = write!(out, "\n{}", p.change(&format!("warning: {warning}")));
    }
}

// ── Sync ─────────────────────────────────────────────────────────────

pub fn sync_text(report: &SyncReport, p: Palette) -> String {
    let result = &report.result;
    let mut out = String::new();
    let verb = if result.dry_run { "Would apply" } else { "Applied" };
    let _ = write!(
        out,
        "{verb} {} change(s): rules +{} ~{} -{}, IP rules +{} ~{} -{}",
        result.total_changes(),
        result.rules.added,
        result.rules.updated,
        result.rules.deleted,
        result.ips.added,
        result.ips.updated,
        result.ips.deleted,
    );
    for repair in &result.id_repairs {
        let old = if repair.old_id.is_empty() { "(none)" } else { &repair.old_id };
        let _ = write!(
            out,
            "\n  {} {:?}: {old} -> {}",
            p.change("id"),
            repair.name,
            repair.new_id
        );
    }
    if let Some(version) = report.remote_version {
        let _ = write!(out, "\n{}", p.dim(&format!("remote version {version}")));
    }
    if report.saved {
        let _ = write!(out, "\n{}", p.add("Local config updated."));
    }
    warnings(&mut out, &result.warnings, p);
    out
}

// ── Validation / health / detection ──────────────────────────────────

pub fn validation_text(result: &ValidationResult, p: Palette) -> String {
    let mut out = String::new();
    for issue in &result.issues {
        let tag = match issue.severity {
            Severity::Error => p.remove("error"),
            Severity::Warning => p.change("warning"),
        };
        let _ = writeln!(out, "{tag}: {}: {}", issue.path, issue.message);
    }
    let errors = result.errors().count();
    let warnings = result.warnings().count();
    if result.valid {
        let _ = write!(out, "{} ({warnings} warning(s))", p.add("Config is valid"));
    } else {
        let _ = write!(
            out,
            "{} ({errors} error(s), {warnings} warning(s))",
            p.remove("Config is invalid")
        );
    }
    out
}

pub fn health_text(health: &HealthScore, p: Palette) -> String {
    let mut out = format!(
        "{} {}/100 (grade {})",
        p.heading("Health"),
        health.score,
        health.grade
    );
    for issue in &health.issues {
        let _ = write!(out, "\n  {} {issue}", p.remove("-"));
    }
    for rec in &health.recommendations {
        let _ = write!(out, "\n  {} {rec}", p.add("*"));
    }
    out
}

pub fn detection_text(detection: &Detection, p: Palette) -> String {
    let mut out = format!("{} {detection}", p.heading("Provider"));
    for reason in &detection.reasons {
        let _ = write!(out, "\n  {}", p.dim(reason));
    }
    out
}

// ── Compatibility / migration ────────────────────────────────────────

pub fn compat_text(report: &MigrationReport, p: Palette) -> String {
    let mut out = format!(
        "{} fully supported, {} partially supported, {} not supported",
        report.fully_supported.len(),
        report.partially_supported.len(),
        report.not_supported.len()
    );
    for feature in &report.not_supported {
        let _ = write!(out, "\n  {} {feature}", p.remove("x"));
    }
    for feature in &report.partially_supported {
        let _ = write!(out, "\n  {} {feature}", p.change("~"));
    }
    warnings(&mut out, &report.warnings, p);
    out
}

pub fn migration_text(migration: &Migration, p: Palette) -> String {
    let mut out = format!(
        "Migrated {} rule(s) and {} IP rule(s)",
        migration.config.rules.len(),
        migration.config.ips.len()
    );
    for dropped in &migration.dropped {
        let _ = write!(out, "\n  {} {dropped}", p.remove("dropped"));
    }
    warnings(&mut out, &migration.warnings, p);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use doorman_core::{ActionType, IpAction, UnifiedIpRule, UnifiedRule};

    #[test]
    fn empty_plan_says_so() {
        let text = changes_text(&ProviderChanges::default(), Palette::plain());
        assert_eq!(text, "No changes. Remote matches the local config.");
    }

    #[test]
    fn plan_lists_changes_in_apply_order() {
        let changes = ProviderChanges {
            rules: ChangeSet {
                to_add: vec![UnifiedRule::new("Block Admin", ActionType::Deny)],
                to_update: vec![],
                to_delete: vec![UnifiedRule::new("Old", ActionType::Log).with_id("rule_old")],
            },
            ips: ChangeSet {
                to_add: vec![],
                to_update: vec![UnifiedIpRule::new("10.0.0.1", IpAction::Deny).with_hostname("h")],
                to_delete: vec![],
            },
            remote_version: Some(7),
            warnings: vec![],
        };
        insta::assert_snapshot!(changes_text(&changes, Palette::plain()), @r"
        Rules
          - Old (rule_old)
          + Block Admin
        IP rules
          ~ deny 10.0.0.1 @ h
        Plan: 1 to add, 1 to update, 1 to delete.
        remote version 7
        ");
    }
}
