//! Rendering message bodies into preview files

use crate::mime::{Attachment, Body, Email, TEXT_HTML, TEXT_PLAIN};
use crate::preview::error::PreviewError;
use crate::preview::unique_id;

use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Built-in template for `text/html` bodies
pub const DEFAULT_HTML_TEMPLATE: &str = include_str!("../../templates/preview.html");

/// Built-in template for `text/plain` bodies
pub const DEFAULT_TEXT_TEMPLATE: &str = include_str!("../../templates/preview.txt");

/// Renders the bodies of an email through per-content-type templates.
///
/// Templates use `{{name}}` placeholders:
/// - `{{from}}`, `{{to}}`, `{{cc}}`, `{{bcc}}`, `{{subject}}` - header fields
/// - `{{content_type}}` - content type of the body being rendered
/// - `{{body}}` - the decoded body
/// - `{{attachments}}` - list of saved attachments
///
/// For `text/html` bodies every field except `{{body}}` is HTML-escaped.
#[derive(Debug, Clone)]
pub struct Renderer {
    dir: PathBuf,
    templates: HashMap<String, String>,
    content_types: Vec<String>,
}

impl Renderer {
    /// Renderer writing into `dir` with the built-in templates
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let mut templates = HashMap::new();
        templates.insert(TEXT_HTML.to_owned(), DEFAULT_HTML_TEMPLATE.to_owned());
        templates.insert(TEXT_PLAIN.to_owned(), DEFAULT_TEXT_TEMPLATE.to_owned());

        Self {
            dir: dir.into(),
            templates,
            content_types: Vec::new(),
        }
    }

    /// Register or replace the template for a content type
    pub fn with_template(mut self, content_type: &str, template: impl Into<String>) -> Self {
        self.templates
            .insert(content_type.to_ascii_lowercase(), template.into());
        self
    }

    /// Only render bodies of these content types (empty renders all)
    pub fn with_content_types(mut self, content_types: Vec<String>) -> Self {
        self.content_types = content_types;
        self
    }

    /// Directory artifacts are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether bodies of this content type pass the allow-list
    pub fn wants(&self, content_type: &str) -> bool {
        self.content_types.is_empty()
            || self
                .content_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(content_type))
    }

    /// Render every selected body and write it to the preview directory.
    ///
    /// All selected bodies are rendered before anything is written, so a
    /// missing template leaves no partial output behind.
    pub fn render(&self, email: &Email) -> Result<Vec<PathBuf>, PreviewError> {
        if email.bodies.is_empty() {
            return Err(PreviewError::NoBodies);
        }

        let rendered = email
            .bodies
            .iter()
            .filter(|body| self.wants(&body.content_type))
            .map(|body| -> Result<_, PreviewError> { Ok((body, self.render_body(email, body)?)) })
            .collect::<Result<Vec<_>, _>>()?;

        let mut paths = Vec::with_capacity(rendered.len());
        for (body, content) in rendered {
            let path = self.dir.join(artifact_name(&body.content_type));
            fs::write(&path, content).map_err(|source| PreviewError::Write {
                path: path.clone(),
                source,
            })?;

            info!("Rendered {} preview to {}", body.content_type, path.display());
            paths.push(path);
        }

        Ok(paths)
    }

    /// Substitute the email's fields into the template for `body`
    pub fn render_body(&self, email: &Email, body: &Body) -> Result<String, PreviewError> {
        let content_type = body.content_type.to_ascii_lowercase();
        let template = self
            .templates
            .get(&content_type)
            .ok_or_else(|| PreviewError::MissingTemplate(body.content_type.clone()))?;

        let html = content_type == TEXT_HTML;
        let escape = |value: &str| {
            if html {
                escape_html(value)
            } else {
                value.to_owned()
            }
        };

        fill(template, |name| match name {
            "from" => Some(escape(&email.from)),
            "to" => Some(escape(&join_addresses(&email.to))),
            "cc" => Some(escape(&join_addresses(&email.cc))),
            "bcc" => Some(escape(&join_addresses(&email.bcc))),
            "subject" => Some(escape(&email.subject)),
            "content_type" => Some(escape(&body.content_type)),
            "body" => Some(body.content.clone()),
            "attachments" => Some(attachment_list(&email.attachments, html)),
            _ => None,
        })
        .map_err(|name| PreviewError::UnknownPlaceholder {
            content_type: body.content_type.clone(),
            name,
        })
    }
}

/// Replace each `{{name}}` in one pass; unknown names are returned as errors.
///
/// Substituted values are never scanned again, so user content containing
/// braces is inserted literally.
fn fill<F>(template: &str, mut value: F) -> Result<String, String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };

        out.push_str(&rest[..open]);
        let name = after[..close].trim();
        out.push_str(&value(name).ok_or_else(|| name.to_owned())?);
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Escape text for use in HTML element content and attribute values
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn join_addresses(addresses: &[String]) -> String {
    addresses
        .iter()
        .filter(|addr| !addr.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

fn attachment_list(attachments: &[Attachment], html: bool) -> String {
    attachments
        .iter()
        .map(|a| {
            let location = a
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            if html {
                let link = a
                    .path
                    .as_deref()
                    .and_then(Path::file_name)
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!(
                    "<li><a href=\"{}\">{}</a> ({}, {} bytes)</li>",
                    escape_html(&link),
                    escape_html(&a.name),
                    escape_html(&a.content_type),
                    a.data.len()
                )
            } else {
                format!(
                    "Attachment: {} ({}, {} bytes) {}\n",
                    a.name,
                    a.content_type,
                    a.data.len(),
                    location
                )
            }
        })
        .collect()
}

/// `<content type with slashes replaced><random id>.<extension>`
fn artifact_name(content_type: &str) -> String {
    let extension = if content_type.eq_ignore_ascii_case(TEXT_HTML) {
        "html"
    } else {
        "txt"
    };
    format!("{}{}.{extension}", content_type.replace('/', "-"), unique_id())
}
