// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host configuration file: archival policy, engine settings, and which
// converter backends to wire up.

use std::path::Path;
use std::sync::Arc;

use mailarchiv_convert::{CommandConverter, ContentRouter, GotenbergClient};
use mailarchiv_core::error::{ArchiveError, Result};
use mailarchiv_core::{ArchivalPolicy, PipelineConfig};
use mailarchiv_pipeline::Collaborators;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub policy: ArchivalPolicy,
    pub pipeline: PipelineConfig,
    pub backend: BackendConfig,
}

/// Converters beyond the builtin ones. Both are optional; without either,
/// only PDFs, images and text attachments convert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub command: Option<CommandBackend>,
    pub gotenberg: Option<GotenbergBackend>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandBackend {
    /// Office tool binary, e.g. `soffice`.
    pub program: String,
    /// Argument template with `{input}` and `{outdir}`; LibreOffice's
    /// headless conversion arguments when absent.
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GotenbergBackend {
    pub url: String,
    /// Render message bodies with Chromium instead of the builtin renderer.
    #[serde(default = "yes")]
    pub render_bodies: bool,
    /// Use the PDF engines route for PDF/A output.
    #[serde(default = "yes")]
    pub archival_profile: bool,
}

fn yes() -> bool {
    true
}

impl AppConfig {
    /// Read a JSON config file. Missing sections take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Builtin converters first, then the office command, then Gotenberg.
    pub fn collaborators(&self) -> Result<Collaborators> {
        let paper = self.pipeline.paper_size;
        let mut collaborators = Collaborators::builtin(paper);
        let mut router = ContentRouter::builtin(paper);

        if let Some(command) = &self.backend.command {
            if command.program.trim().is_empty() {
                return Err(ArchiveError::Config("backend.command.program is empty".into()));
            }
            let converter = match &command.args {
                Some(args) => CommandConverter::new("command", command.program.clone(), args.clone()),
                None => CommandConverter::libreoffice(command.program.clone()),
            };
            info!(program = %command.program, "office command backend enabled");
            router = router.with(Arc::new(converter));
        }

        if let Some(gotenberg) = &self.backend.gotenberg {
            if !gotenberg.url.starts_with("http://") && !gotenberg.url.starts_with("https://") {
                return Err(ArchiveError::Config(format!(
                    "backend.gotenberg.url must be an http(s) URL, got {:?}",
                    gotenberg.url
                )));
            }
            let client = Arc::new(GotenbergClient::new(gotenberg.url.clone()));
            router = router.with(client.clone());
            if gotenberg.render_bodies {
                collaborators.renderer = client.clone();
            }
            if gotenberg.archival_profile {
                collaborators.profile = Some(client);
            }
            info!(url = %gotenberg.url, "Gotenberg backend enabled");
        }

        collaborators.attachments = Arc::new(router);
        Ok(collaborators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailarchiv_convert::BodyRenderer;
    use mailarchiv_core::ConsumptionScope;

    #[test]
    fn empty_file_gives_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.policy, ArchivalPolicy::default());
        assert!(config.backend.gotenberg.is_none());
        assert!(config.collaborators().unwrap().profile.is_none());
    }

    #[test]
    fn gotenberg_fills_all_three_roles() {
        let json = r#"{
            "policy": {"scope": "mail_only", "body_preference": "prefer_html", "produce_archival_profile": true},
            "backend": {"gotenberg": {"url": "http://localhost:3000"}}
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.policy.scope, ConsumptionScope::MailOnly);
        let collaborators = config.collaborators().unwrap();
        assert_eq!(collaborators.renderer.name(), "gotenberg-chromium");
        assert!(collaborators.profile.is_some());
    }

    #[test]
    fn bad_backend_settings_are_config_errors() {
        let json = r#"{"backend": {"gotenberg": {"url": "localhost:3000"}}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.collaborators(), Err(ArchiveError::Config(_))));
    }

    #[test]
    fn load_reads_and_validates_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailarchiv.json");
        std::fs::write(&path, r#"{"pipeline": {"max_concurrent_conversions": 0}}"#).unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ArchiveError::Config(_))));

        std::fs::write(&path, r#"{"pipeline": {"max_concurrent_conversions": 2}}"#).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap().pipeline.max_concurrent_conversions, 2);
    }
}
