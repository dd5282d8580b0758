//! Notebook example extension
//!
//! Serves a single notebook through the host's page pipeline: the handler
//! builds the page configuration the front-end bootstraps from and hands it
//! to a template renderer.

use crate::error::{json_error_response, ErrorCode};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Notebook served by the example
pub const NOTEBOOK_PATH: &str = "test.ipynb";

/// Template the handler renders
pub const INDEX_TEMPLATE: &str = "index.html";

/// Keys of the serialized page configuration, in the front-end's casing
pub const PAGE_CONFIG_KEYS: [&str; 5] = [
    "baseUrl",
    "token",
    "notebookPath",
    "fullStaticUrl",
    "frontendUrl",
];

/// Errors raised while composing or rendering the page
#[derive(Debug, Error)]
pub enum PageError {
    #[error("missing host setting '{0}'")]
    MissingSetting(&'static str),
    #[error("template '{0}' not found")]
    TemplateNotFound(String),
    #[error("failed to render '{template}': {message}")]
    Render { template: String, message: String },
    #[error("failed to encode page config: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PageError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PageError::MissingSetting(_) => ErrorCode::MissingSetting,
            PageError::TemplateNotFound(_) => ErrorCode::TemplateNotFound,
            PageError::Render { .. } => ErrorCode::RenderFailed,
            PageError::Encode(_) => ErrorCode::InternalError,
        }
    }
}

/// Join URL path pieces with single slashes.
///
/// A leading slash on the first piece and a trailing slash on the last are
/// kept; empty pieces are skipped.
pub fn url_path_join(pieces: &[&str]) -> String {
    let (Some(first), Some(last)) = (pieces.first(), pieces.last()) else {
        return String::new();
    };
    let initial = first.starts_with('/');
    let finalslash = last.ends_with('/');

    let mut result = pieces
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if initial {
        result.insert(0, '/');
    }
    if finalslash {
        result.push('/');
    }
    if result == "//" {
        result.truncate(1);
    }
    result
}

/// Settings owned by the host, read per request
#[derive(Debug, Clone, Default)]
pub struct HostSettings {
    pub base_url: String,
    pub token: Option<String>,
}

impl HostSettings {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
        }
    }

    /// An empty value counts as missing; every record field must be set
    fn require_base_url(&self) -> Result<&str, PageError> {
        Some(self.base_url.as_str())
            .filter(|url| !url.is_empty())
            .ok_or(PageError::MissingSetting("base_url"))
    }

    fn require_token(&self) -> Result<&str, PageError> {
        self.token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(PageError::MissingSetting("token"))
    }
}

/// Bootstrap data embedded in the page.
///
/// The front-end reads these fields in camelCase; any other casing breaks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    pub base_url: String,
    pub token: String,
    pub notebook_path: String,
    pub full_static_url: String,
    pub frontend_url: String,
}

/// Resolves asset paths under the extension's static prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticUrl {
    prefix: String,
}

impl StaticUrl {
    pub fn new(base_url: &str, extension_name: &str) -> Self {
        Self {
            prefix: url_path_join(&[base_url, "static", extension_name]),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn resolve(&self, path: &str) -> String {
        url_path_join(&[&self.prefix, path])
    }
}

/// Extension application metadata and on-disk layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionApp {
    pub name: String,
    pub app_name: String,
    pub extension_url: String,
    pub default_url: String,
    pub app_url: String,
    pub root: PathBuf,
}

impl ExtensionApp {
    /// The notebook example rooted at `root`
    pub fn notebook_example(root: impl Into<PathBuf>) -> Self {
        Self {
            name: "notebook_example".to_string(),
            app_name: "JupyterLab Example Notebook".to_string(),
            extension_url: "/example".to_string(),
            default_url: "/example".to_string(),
            app_url: "/example".to_string(),
            root: root.into(),
        }
    }

    pub fn static_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.build_subdir("schemas")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.build_subdir("workspaces")
    }

    fn build_subdir(&self, name: &str) -> PathBuf {
        self.static_dir().join(name)
    }
}

/// Values passed to the renderer along with the page configuration
#[derive(Debug)]
pub struct TemplateContext<'a> {
    pub static_url: &'a StaticUrl,
    pub base_url: &'a str,
    pub token: &'a str,
    pub page_config: &'a PageConfig,
}

/// Renders a named template to HTML
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &TemplateContext<'_>) -> Result<String, PageError>;
}

/// Built-in renderer for `index.html`: embeds the page configuration as a
/// `jupyter-config-data` script and loads the bundle from the static prefix.
#[derive(Debug, Clone)]
pub struct IndexRenderer {
    title: String,
    bundle: String,
}

impl IndexRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            bundle: "bundle.js".to_string(),
        }
    }
}

impl TemplateRenderer for IndexRenderer {
    fn render(&self, template: &str, context: &TemplateContext<'_>) -> Result<String, PageError> {
        if template != INDEX_TEMPLATE {
            return Err(PageError::TemplateNotFound(template.to_string()));
        }

        // "</" would close the script element early
        let config = serde_json::to_string(context.page_config)?.replace("</", "<\\/");

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title}</title>
</head>
<body>
  <script id="jupyter-config-data" type="application/json">{config}</script>
  <script src="{bundle}" charset="utf-8"></script>
</body>
</html>
"#,
            title = escape_html(&self.title),
            config = config,
            bundle = escape_html(&context.static_url.resolve(&self.bundle)),
        ))
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// GET handler serving the notebook page
pub struct NotebookPage<R> {
    app: ExtensionApp,
    renderer: R,
    notebook_path: String,
}

impl NotebookPage<IndexRenderer> {
    /// The notebook example with the built-in renderer
    pub fn example(root: impl Into<PathBuf>) -> Self {
        let app = ExtensionApp::notebook_example(root);
        let renderer = IndexRenderer::new(app.app_name.clone());
        Self::new(app, renderer)
    }
}

impl<R: TemplateRenderer> NotebookPage<R> {
    pub fn new(app: ExtensionApp, renderer: R) -> Self {
        Self {
            app,
            renderer,
            notebook_path: NOTEBOOK_PATH.to_string(),
        }
    }

    pub fn app(&self) -> &ExtensionApp {
        &self.app
    }

    pub fn static_url(&self, settings: &HostSettings) -> StaticUrl {
        StaticUrl::new(&settings.base_url, &self.app.name)
    }

    /// Build the page configuration for a request
    pub fn page_config(&self, settings: &HostSettings) -> Result<PageConfig, PageError> {
        let base_url = settings.require_base_url()?;
        Ok(PageConfig {
            base_url: base_url.to_string(),
            token: settings.require_token()?.to_string(),
            notebook_path: self.notebook_path.clone(),
            full_static_url: self.static_url(settings).prefix().to_string(),
            frontend_url: url_path_join(&[base_url, "example/"]),
        })
    }

    /// Render the page HTML
    pub fn render(&self, settings: &HostSettings) -> Result<String, PageError> {
        let page_config = self.page_config(settings)?;
        let static_url = self.static_url(settings);
        let context = TemplateContext {
            static_url: &static_url,
            base_url: &settings.base_url,
            token: &page_config.token,
            page_config: &page_config,
        };
        self.renderer.render(INDEX_TEMPLATE, &context)
    }

    /// Serve a request: `GET` renders the page, other methods are refused
    pub fn handle(&self, method: &Method, settings: &HostSettings) -> Response<Full<Bytes>> {
        if method != Method::GET {
            return json_error_response(
                ErrorCode::MethodNotAllowed,
                format!("method {} not allowed", method),
            );
        }

        match self.render(settings) {
            Ok(html) => {
                debug!(app = %self.app.name, bytes = html.len(), "Rendered notebook page");
                let mut response = Response::new(Full::new(Bytes::from(html)));
                *response.status_mut() = StatusCode::OK;
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                );
                response
            }
            Err(e) => {
                warn!(app = %self.app.name, error = %e, "Failed to render notebook page");
                json_error_response(e.code(), e.to_string())
            }
        }
    }
}
