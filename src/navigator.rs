use crate::dom::without_fragment;
use crate::error::NavigationError;
use crate::pagination::Control;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};
use url::Url;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: Url,
    pub markup: String,
}

/// The browser-side collaborator. Implementations own the navigable results
/// view; every method is a point where the traversal may block on I/O.
pub trait Navigator {
    fn snapshot(&mut self) -> Result<PageSnapshot, NavigationError>;

    fn activate(&mut self, control: &Control) -> Result<(), NavigationError>;

    fn wait_until_settled(&mut self) -> Result<(), NavigationError>;

    /// Reads a detail document without moving the results view.
    fn open_document(&mut self, url: &Url) -> Result<PageSnapshot, NavigationError>;
}

#[derive(Debug, Clone)]
pub struct StaticSite {
    pages: BTreeMap<String, String>,
    current: Url,
    activations: Vec<Control>,
    opened: Vec<Url>,
}

impl StaticSite {
    pub fn new(start_url: Url) -> Self {
        Self {
            pages: BTreeMap::new(),
            current: start_url,
            activations: Vec::new(),
            opened: Vec::new(),
        }
    }

    pub fn with_page(mut self, url: &Url, markup: impl Into<String>) -> Self {
        self.insert(url, markup);
        self
    }

    pub fn insert(&mut self, url: &Url, markup: impl Into<String>) {
        self.pages.insert(page_key(url), markup.into());
    }

    pub fn from_dir(dir: &Path, base_url: &Url, start_url: Url) -> Result<Self> {
        let mut site = Self::new(start_url);
        for entry in WalkDir::new(dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("html" | "htm")
            ) {
                continue;
            }

            let relative = path
                .strip_prefix(dir)
                .with_context(|| format!("fixture outside {}", dir.display()))?;
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let url = base_url
                .join(&relative)
                .with_context(|| format!("cannot address fixture {relative}"))?;
            let markup = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read fixture {}", path.display()))?;
            site.insert(&url, markup);
        }

        info!(
            dir = %dir.display(),
            pages = site.pages.len(),
            "loaded fixture site"
        );
        Ok(site)
    }

    pub fn current_url(&self) -> &Url {
        &self.current
    }

    pub fn activations(&self) -> &[Control] {
        &self.activations
    }

    pub fn opened(&self) -> &[Url] {
        &self.opened
    }

    fn lookup(&self, url: &Url) -> Result<&String, NavigationError> {
        self.pages
            .get(&page_key(url))
            .ok_or_else(|| NavigationError::UnknownDocument(url.to_string()))
    }
}

impl Navigator for StaticSite {
    fn snapshot(&mut self) -> Result<PageSnapshot, NavigationError> {
        let markup = self.lookup(&self.current)?.clone();
        Ok(PageSnapshot {
            url: self.current.clone(),
            markup,
        })
    }

    fn activate(&mut self, control: &Control) -> Result<(), NavigationError> {
        let Some(target) = control.href.clone() else {
            return Err(NavigationError::NotFollowable {
                label: control.label.clone(),
                css_path: control.css_path.clone(),
            });
        };
        self.lookup(&target)?;
        debug!(convention = ?control.convention, url = %target, "following control");
        self.activations.push(control.clone());
        self.current = target;
        Ok(())
    }

    fn wait_until_settled(&mut self) -> Result<(), NavigationError> {
        Ok(())
    }

    fn open_document(&mut self, url: &Url) -> Result<PageSnapshot, NavigationError> {
        let markup = self.lookup(url)?.clone();
        self.opened.push(url.clone());
        Ok(PageSnapshot {
            url: url.clone(),
            markup,
        })
    }
}

fn page_key(url: &Url) -> String {
    without_fragment(url).to_string()
}
