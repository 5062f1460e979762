//! Host integration: the services the surrounding application provides
//! to a view, plus simple implementations for native and test hosts.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::Result;
use crate::source::VIEW_EXTENSIONS;

/// View type identifier under which the score view is registered.
pub const VIEW_TYPE: &str = "gtp-view";

/// Width used by [`StaticEnvironment`] when none is given.
pub const DEFAULT_AVAILABLE_WIDTH: f64 = 800.0;

// ─── Traits ──────────────────────────────────────────────────────────

/// The container the view renders into.
pub trait DisplaySurface {
    /// Remove everything shown so far.
    fn empty(&mut self);
    /// Append an HTML fragment.
    fn append_html(&mut self, html: &str);
}

/// Read access to the files of the workspace.
pub trait Vault {
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Hands a generated file to the user.
pub trait FileSaver {
    fn save(&mut self, filename: &str, mime: &str, bytes: &[u8]) -> Result<()>;
}

/// Ambient facts about the host window.
pub trait HostEnvironment {
    fn is_dark_mode(&self) -> bool;
    /// Width available to the view; 0 when unknown.
    fn available_width(&self) -> f64;
}

/// Where views and file extensions are registered.
pub trait ViewRegistry {
    fn register_view(&mut self, view_type: &str);
    fn register_extensions(&mut self, extensions: &[&str], view_type: &str);
}

/// Register the score view and its extensions with the host.
pub fn register_plugin(registry: &mut dyn ViewRegistry) {
    registry.register_view(VIEW_TYPE);
    registry.register_extensions(VIEW_EXTENSIONS, VIEW_TYPE);
    log::info!("registered {VIEW_TYPE} for {} extension(s)", VIEW_EXTENSIONS.len());
}

// ─── Implementations ─────────────────────────────────────────────────

/// In-memory HTML surface. Clones share the same buffer, so a host can
/// keep a handle while the view owns another.
#[derive(Debug, Clone, Default)]
pub struct HtmlSurface {
    html: Rc<RefCell<String>>,
}

impl HtmlSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents.
    pub fn html(&self) -> String {
        self.html.borrow().clone()
    }
}

impl DisplaySurface for HtmlSurface {
    fn empty(&mut self) {
        self.html.borrow_mut().clear();
    }

    fn append_html(&mut self, html: &str) {
        self.html.borrow_mut().push_str(html);
    }
}

/// Vault backed by the local file system, relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Vault for FsVault {
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(self.root.join(path))?)
    }
}

/// Saves files into a directory. The MIME type is only logged.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
    saved: Vec<PathBuf>,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            saved: Vec::new(),
        }
    }

    /// Paths written so far, oldest first.
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }
}

impl FileSaver for DirectorySaver {
    fn save(&mut self, filename: &str, mime: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);
        fs::write(&path, bytes)?;
        log::info!("saved {} ({mime}, {} bytes)", path.display(), bytes.len());
        self.saved.push(path);
        Ok(())
    }
}

/// Fixed environment for headless hosts and tests. Clones share state, so
/// the host can flip the theme or resize after handing one to a view.
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    state: Rc<RefCell<(bool, f64)>>,
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self::new(false, DEFAULT_AVAILABLE_WIDTH)
    }
}

impl StaticEnvironment {
    pub fn new(dark_mode: bool, width: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new((dark_mode, width))),
        }
    }

    pub fn set_dark_mode(&self, dark_mode: bool) {
        self.state.borrow_mut().0 = dark_mode;
    }

    pub fn set_width(&self, width: f64) {
        self.state.borrow_mut().1 = width;
    }
}

impl HostEnvironment for StaticEnvironment {
    fn is_dark_mode(&self) -> bool {
        self.state.borrow().0
    }

    fn available_width(&self) -> f64 {
        self.state.borrow().1
    }
}
