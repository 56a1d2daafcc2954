//! Template rendering using minijinja.
//!
//! Config files are rendered from named templates and written only when the
//! rendered content differs from what is already on disk, so callers can tie
//! service restarts to actual changes.

use minijinja::{Environment, Value};
use serde::Serialize;
use std::path::Path;

use crate::error::ToolError;

/// Template engine with Jinja2-compatible syntax.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create an engine with the charm filters registered.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);

        env.add_filter("csv", filter_csv);
        env.add_filter("ini_bool", filter_ini_bool);

        Self { env }
    }

    /// Register a named template.
    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), ToolError> {
        self.env
            .add_template_owned(name.into(), source.into())
            .map_err(|e| ToolError::Template(e.to_string()))
    }

    /// Render a registered template.
    pub fn render<S: Serialize>(&self, name: &str, context: &S) -> Result<String, ToolError> {
        let tmpl = self.env.get_template(name)?;
        tmpl.render(Value::from_serialize(context))
            .map_err(|e| ToolError::Template(format!("{name}: {e}")))
    }

    /// Render an ad-hoc template string.
    pub fn render_str<S: Serialize>(&self, source: &str, context: &S) -> Result<String, ToolError> {
        self.env
            .render_str(source, Value::from_serialize(context))
            .map_err(|e| ToolError::Template(e.to_string()))
    }

    /// Render a registered template into `path`.
    ///
    /// Returns `true` when the file was created or its content changed.
    /// `mode` is applied on unix whether or not the content changed.
    pub async fn render_to_file<S: Serialize>(
        &self,
        name: &str,
        context: &S,
        path: &Path,
        mode: Option<u32>,
    ) -> Result<bool, ToolError> {
        let rendered = self.render(name, context)?;

        match tokio::fs::read_to_string(path).await {
            Ok(existing) if existing == rendered => {
                tracing::debug!(template = name, path = %path.display(), "Rendered file unchanged");
                set_mode(path, mode).await?;
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, rendered.as_bytes()).await?;
        set_mode(path, mode).await?;

        tracing::info!(template = name, path = %path.display(), "Rendered file");
        Ok(true)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: Option<u32>) -> Result<(), ToolError> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: Option<u32>) -> Result<(), ToolError> {
    Ok(())
}

/// Join a sequence with commas; scalars pass through.
fn filter_csv(value: Value) -> Result<String, minijinja::Error> {
    match value.try_iter() {
        Ok(iter) if !matches!(value.kind(), minijinja::value::ValueKind::String) => {
            Ok(iter.map(|v| v.to_string()).collect::<Vec<_>>().join(","))
        }
        _ => Ok(value.to_string()),
    }
}

/// Render a truthy value as `True`/`False`, the spelling oslo.config expects.
fn filter_ini_bool(value: Value) -> String {
    if value.is_true() {
        "True".to_string()
    } else {
        "False".to_string()
    }
}
