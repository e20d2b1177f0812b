//! Template engine
//!
//! HTML pages are rendered with Tera. The templates ship inside the binary;
//! a configured override directory may replace any of them (same relative
//! name) or add new ones. Every page gets the standard variables from
//! [`PageVars`].

use anyhow::{Context, Result};
use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera};

use crate::models::UserSummary;
use crate::web::flash::FlashMessage;

mod error;

pub use error::RenderError;

/// Templates compiled into the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Load the embedded templates, then the ones found in `override_dir`.
    pub fn new(override_dir: Option<&Path>) -> Result<Self> {
        let mut templates: Vec<(String, String)> = Vec::new();

        for name in EmbeddedTemplates::iter() {
            let Some(file) = EmbeddedTemplates::get(&name) else {
                continue;
            };
            let content = String::from_utf8(file.data.into_owned())
                .with_context(|| format!("Template {} is not valid UTF-8", name))?;
            templates.push((name.into_owned(), content));
        }

        if let Some(dir) = override_dir {
            let mut overrides = Vec::new();
            collect_templates_from_dir(dir, dir, &mut overrides)?;
            for (name, content) in overrides {
                tracing::info!("Template {} overridden from {}", name, dir.display());
                templates.retain(|(existing, _)| existing != &name);
                templates.push((name, content));
            }
        }

        Self::from_templates(templates)
    }

    /// Build an engine from raw `(name, source)` pairs.
    pub fn from_templates(templates: Vec<(String, String)>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| RenderError::TemplateError(describe(&e)))?;
        Ok(Self { tera })
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            RenderError::TemplateError(format!("Failed to render '{}': {}", template, describe(&e))).into()
        })
    }

    /// Render a page with the standard variables added to `context`
    pub fn render_page(&self, template: &str, context: &TeraContext, vars: &PageVars) -> Result<String> {
        let mut full_context = context.clone();
        vars.insert_into(&mut full_context);
        self.render(template, &full_context)
    }

    /// Render `error.html` for `status`, falling back to a static page when
    /// the error template itself fails. Never fails.
    pub fn render_error_page(&self, status: u16, message: &str, vars: &PageVars) -> String {
        let mut context = TeraContext::new();
        context.insert("status", &status);
        context.insert("error_message", message);

        match self.render_page("error.html", &context, vars) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render error template: {:#}, returning static error page", e);
                simple_error_page(status)
            }
        }
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

/// Variables every page receives
#[derive(Debug, Clone, Serialize)]
pub struct PageVars {
    pub site_name: String,
    pub request_path: String,
    pub current_user: Option<UserSummary>,
    pub year: i32,
    /// Flash messages waiting to be shown
    pub messages: Vec<FlashMessage>,
}

impl PageVars {
    pub fn new(site_name: impl Into<String>, request_path: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            request_path: request_path.into(),
            current_user: None,
            year: chrono::Utc::now().year(),
            messages: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: Option<UserSummary>) -> Self {
        self.current_user = user;
        self
    }

    pub fn with_messages(mut self, messages: Vec<FlashMessage>) -> Self {
        self.messages = messages;
        self
    }

    fn insert_into(&self, context: &mut TeraContext) {
        context.insert("site_name", &self.site_name);
        context.insert("request_path", &self.request_path);
        context.insert("year", &self.year);
        context.insert("messages", &self.messages);
        if let Some(ref user) = self.current_user {
            context.insert("current_user", user);
        }
    }
}

fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<()> {
    if !current_path.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(current_path).map_err(RenderError::from)? {
        let path = entry.map_err(RenderError::from)?.path();

        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let relative_path = path
                .strip_prefix(base_path)
                .map_err(|_| RenderError::TemplateError("Failed to get relative path".to_string()))?;
            let template_name = relative_path.to_string_lossy().replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;
            templates.push((template_name, content));
        }
    }

    Ok(())
}

/// Tera errors nest their cause; flatten the chain into one line
fn describe(e: &tera::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        msg.push_str(&format!(": {}", s));
        source = s.source();
    }
    msg
}

/// Last resort when `error.html` does not render
fn simple_error_page(status: u16) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="fr">
<head>
    <meta charset="UTF-8">
    <title>Erreur :: Mutadi</title>
</head>
<body>
    <h1>Erreur {}</h1>
    <p>La page demandée n'a pas pu être affichée.</p>
</body>
</html>"#,
        status
    )
}
