use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("renderer reported success but produced no output file")]
    NoOutput,
}

/// External HTML-to-PDF collaborator. How the drawing happens (headless
/// browser, print pipeline) is the implementation's business; the
/// materializer only relies on the output file existing after a
/// successful call.
pub trait HtmlRenderer: Send + Sync {
    fn render(&self, html: &str, output: &Path) -> Result<PathBuf, RenderError>;
}

/// Renders by handing the HTML to an external command invoked as
/// `<command> <input.html> <output.pdf>` (wkhtmltopdf-compatible).
pub struct CommandRenderer {
    command: String,
}

impl CommandRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl HtmlRenderer for CommandRenderer {
    fn render(&self, html: &str, output: &Path) -> Result<PathBuf, RenderError> {
        let input = std::env::temp_dir().join(format!("bidforge-{}.html", uuid::Uuid::new_v4()));
        std::fs::write(&input, html)?;
        debug!(
            "rendering {} bytes of HTML via {} to {}",
            html.len(),
            self.command,
            output.display()
        );
        let result = Command::new(&self.command)
            .arg(&input)
            .arg(output)
            .output();
        let _ = std::fs::remove_file(&input);
        let out = result?;
        if !out.status.success() {
            return Err(RenderError::Failed {
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        if !output.exists() {
            return Err(RenderError::NoOutput);
        }
        Ok(output.to_path_buf())
    }
}
