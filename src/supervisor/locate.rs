//! Finding the core binary and picking local ports

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::debug;

use crate::error::{Error, Result};

/// Paths tried next to our own executable, in order
const SIBLING_CANDIDATES: &[&str] = &["xray", "v2ray", "core/xray", "core/v2ray"];

/// Names looked up on `PATH`, in order
const PATH_CANDIDATES: &[&str] = &["xray", "v2ray"];

const PORT_BASE: u16 = 20000;
const PORT_SPAN: u16 = 20000;

/// Locate the core binary.
///
/// A non-blank `explicit` path is returned as-is; a missing file there is
/// reported when the core is launched.
pub fn resolve_core_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        if let Some(found) = find_in_dir(&dir, SIBLING_CANDIDATES) {
            debug!("Using core binary {}", found.display());
            return Ok(found);
        }
    }

    if let Some(paths) = std::env::var_os("PATH") {
        if let Some(found) = find_on_path(&paths, PATH_CANDIDATES) {
            debug!("Using core binary {} from PATH", found.display());
            return Ok(found);
        }
    }

    Err(Error::Config(
        "core binary not found: place xray/v2ray next to health-node (or in ./core), or pass --core"
            .into(),
    ))
}

fn find_in_dir(dir: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| is_executable(path))
}

fn find_on_path(paths: &OsStr, names: &[&str]) -> Option<PathBuf> {
    let dirs: Vec<PathBuf> = std::env::split_paths(paths).collect();
    names
        .iter()
        .find_map(|name| dirs.iter().map(|d| d.join(name)).find(|p| is_executable(p)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Random port in `20000..40000`
pub fn random_port() -> u16 {
    PORT_BASE + rand::thread_rng().gen_range(0..PORT_SPAN)
}

/// Random port in `20000..40000` other than `taken`
pub fn random_port_except(taken: u16) -> u16 {
    loop {
        let port = random_port();
        if port != taken {
            return port;
        }
    }
}
