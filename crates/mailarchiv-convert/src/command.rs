// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External command converter — runs an office-suite style tool that writes
// `<stem>.pdf` into an output directory.
//
// Every call gets its own scratch directory. The child is spawned with
// `kill_on_drop`, so a timeout or cancellation upstream (which drops this
// future) terminates the tool instead of leaving it running.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use mailarchiv_core::ConvertError;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::traits::{AttachmentConverter, ConversionRequest};

/// Content types LibreOffice handles well.
const OFFICE_TYPES: &[&str] = &[
    "application/msword",
    "application/rtf",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "application/vnd.ms-outlook",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.presentation",
    "text/rtf",
];

/// Filename extensions accepted when the declared type is generic.
const OFFICE_EXTENSIONS: &[&str] = &[
    "doc", "docx", "dot", "dotx", "odt", "ott", "rtf", "xls", "xlsx", "ods", "csv", "ppt", "pptx",
    "odp", "pages", "wpd",
];

/// Runs `program args…` with `{input}` and `{outdir}` substituted.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    name: String,
    program: String,
    args: Vec<String>,
    content_types: Vec<String>,
    extensions: Vec<String>,
}

impl CommandConverter {
    /// A converter that accepts everything; narrow it with
    /// [`CommandConverter::for_types`].
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            content_types: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Headless LibreOffice (`soffice --convert-to pdf`). Each call uses a
    /// private user profile inside its scratch directory so calls can run
    /// side by side.
    pub fn libreoffice(program: impl Into<String>) -> Self {
        Self::new(
            "libreoffice",
            program,
            vec![
                "-env:UserInstallation=file://{outdir}/profile".into(),
                "--headless".into(),
                "--norestore".into(),
                "--convert-to".into(),
                "pdf".into(),
                "--outdir".into(),
                "{outdir}".into(),
                "{input}".into(),
            ],
        )
        .for_types(
            OFFICE_TYPES.iter().map(|t| t.to_string()).collect(),
            OFFICE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        )
    }

    pub fn for_types(mut self, content_types: Vec<String>, extensions: Vec<String>) -> Self {
        self.content_types = content_types;
        self.extensions = extensions;
        self
    }

    fn expand(&self, input: &Path, outdir: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let outdir = outdir.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{outdir}", &outdir))
            .collect()
    }
}

/// A filename safe to create inside the scratch directory.
fn scratch_name(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "input".to_string()
    } else {
        cleaned.to_string()
    }
}

fn tail(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(max.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    text[start..].to_string()
}

#[async_trait]
impl AttachmentConverter for CommandConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, request: &ConversionRequest) -> bool {
        if self.content_types.is_empty() && self.extensions.is_empty() {
            return true;
        }
        self.content_types.iter().any(|t| *t == request.content_type)
            || request
                .extension()
                .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }

    #[instrument(skip_all, fields(tool = %self.name, filename = %request.filename))]
    async fn convert(&self, request: &ConversionRequest) -> Result<Vec<u8>, ConvertError> {
        let scratch = tempfile::tempdir()
            .map_err(|err| ConvertError::Tool(format!("cannot create scratch directory: {err}")))?;
        let outdir = scratch.path().join("out");
        tokio::fs::create_dir_all(&outdir)
            .await
            .map_err(|err| ConvertError::Tool(format!("cannot create output directory: {err}")))?;

        let input_name = scratch_name(&request.filename);
        let input = scratch.path().join(&input_name);
        tokio::fs::write(&input, &request.content)
            .await
            .map_err(|err| ConvertError::Tool(format!("cannot write input file: {err}")))?;

        let output = Command::new(&self.program)
            .args(self.expand(&input, &outdir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ConvertError::Tool(format!("cannot start {}: {err}", self.program)))?;

        if !output.status.success() {
            warn!(status = %output.status, "converter exited unsuccessfully");
            let stderr = tail(&output.stderr, 200);
            return Err(ConvertError::Tool(if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                format!("{} exited with {}: {stderr}", self.program, output.status)
            }));
        }

        let stem = Path::new(&input_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| input_name.clone());
        let produced = outdir.join(format!("{stem}.pdf"));
        let pdf = tokio::fs::read(&produced).await.map_err(|_| {
            ConvertError::Tool(format!("{} produced no PDF for {}", self.program, request.filename))
        })?;

        debug!(bytes_len = pdf.len(), "external conversion finished");
        Ok(pdf)
    }
}
