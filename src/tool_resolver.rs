//! # Tool Path Resolver
//!
//! Finds the external codec binaries in the layouts the application ships in:
//! - next to the executable
//! - in a bundled `vendor/<platform>/<arch>` tree (also inside a macOS bundle)
//! - in a `vendor` folder of any ancestor directory (development checkouts)
//! - on the system `PATH`, as a last resort
//!
//! The candidate directory list is a pure function of the executable
//! directory, platform and architecture (`search_dirs`); lookups never fail,
//! a missing tool is simply `None`.

use crate::platform::{Arch, Platform};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable that prepends a directory to the search list
pub const TOOLS_DIR_ENV: &str = "IMGCOMPRESS_TOOLS_DIR";

/// How many ancestors of the executable directory are searched for `vendor/`
const MAX_ANCESTOR_LEVELS: usize = 6;

/// Every tool the engine registry may call, grouped by format
pub const KNOWN_TOOLS: &[(&str, &[&str])] = &[
    ("JPEG", &["jpegtran", "cjpeg", "mozjpeg"]),
    ("PNG", &["pngquant", "oxipng", "optipng"]),
    ("GIF", &["gifsicle"]),
    ("WebP", &["cwebp", "dwebp"]),
];

/// Ordered candidate directories for a given installation layout.
///
/// Pure: nothing here touches the filesystem.
pub fn search_dirs(exe_dir: &Path, platform: Platform, arch: &Arch) -> Vec<PathBuf> {
    let vendor_variants = |base: &Path| {
        let vendor = base.join("vendor");
        vec![
            vendor.join(platform.key()).join(arch.key()),
            vendor.join(platform.key()),
            vendor,
        ]
    };

    let mut dirs = vec![exe_dir.to_path_buf()];
    dirs.extend(vendor_variants(exe_dir));

    if platform == Platform::MacOs {
        if let Some(contents) = exe_dir.parent() {
            let resources = contents.join("Resources");
            dirs.extend(vendor_variants(&resources));
            dirs.push(resources);
            dirs.push(contents.join("MacOS"));
            dirs.push(contents.join("Frameworks"));
        }
    }

    for ancestor in exe_dir.ancestors().skip(1).take(MAX_ANCESTOR_LEVELS) {
        dirs.extend(vendor_variants(ancestor));
    }

    let mut unique = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if !unique.contains(&dir) {
            unique.push(dir);
        }
    }
    unique
}

/// Tool locator for the current installation
#[derive(Debug, Clone)]
pub struct ToolLocator {
    dirs: Vec<PathBuf>,
    platform: Platform,
    use_system_path: bool,
}

impl ToolLocator {
    /// Locator for the running executable, with `PATH` fallback
    pub fn new() -> Self {
        let platform = Platform::current();
        let mut dirs = Vec::new();

        if let Ok(override_dir) = env::var(TOOLS_DIR_ENV) {
            debug!("Tools directory override: {}", override_dir);
            dirs.push(PathBuf::from(override_dir));
        }

        match env::current_exe() {
            Ok(exe) => {
                if let Some(exe_dir) = exe.parent() {
                    dirs.extend(search_dirs(exe_dir, platform, &Arch::current()));
                }
            }
            Err(e) => debug!("Cannot determine executable path: {}", e),
        }

        Self {
            dirs,
            platform,
            use_system_path: true,
        }
    }

    /// Locator over an explicit directory list, without `PATH` fallback
    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            platform: Platform::current(),
            use_system_path: false,
        }
    }

    /// Return the first existing file among the candidate names
    pub fn find_tool(&self, candidates: &[&str]) -> Option<PathBuf> {
        for dir in &self.dirs {
            for name in candidates {
                let path = dir.join(self.executable_name(name));
                if path.is_file() {
                    debug!("Resolved {} -> {}", name, path.display());
                    return Some(path);
                }
            }
        }

        if self.use_system_path {
            for name in candidates {
                if let Some(path) = self.find_in_system_path(name) {
                    debug!("Resolved {} from PATH -> {}", name, path.display());
                    return Some(path);
                }
            }
        }

        debug!("Tool not found: {:?}", candidates);
        None
    }

    /// Check if a specific tool is available
    pub fn tool_exists(&self, name: &str) -> bool {
        self.find_tool(&[name]).is_some()
    }

    /// Human readable availability report of every known tool
    pub fn tools_report(&self) -> String {
        let mut report = String::from("Tool availability:\n");

        for (category, tools) in KNOWN_TOOLS {
            report.push_str(&format!("\n{}:\n", category));
            for tool in *tools {
                match self.find_tool(&[tool]) {
                    Some(path) => report.push_str(&format!("  ✅ {} -> {}\n", tool, path.display())),
                    None => report.push_str(&format!("  ❌ {} (not found)\n", tool)),
                }
            }
        }

        report
    }

    fn executable_name(&self, name: &str) -> String {
        format!("{}{}", name, self.platform.exe_suffix())
    }

    fn find_in_system_path(&self, name: &str) -> Option<PathBuf> {
        let file_name = self.executable_name(name);
        let path_var = env::var_os("PATH")?;
        env::split_paths(&path_var)
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::new()
    }
}
