use std::fs;
use std::path::Path;

use tracing::warn;

use crate::config::Options;

/// Whether the walker must not descend into `rel_path`. Skip entries match
/// on whole path components, never on substrings; multi-component entries
/// (for example `usr/local/go`) match a consecutive component run.
#[must_use]
pub fn is_skippable_dir(options: &Options, rel_path: &str) -> bool {
    let components: Vec<&str> = rel_path
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    for entry in &options.skip_dirs {
        let needle: Vec<&str> = entry.split('/').filter(|c| !c.is_empty()).collect();
        if needle.is_empty() || needle.len() > components.len() {
            continue;
        }
        if components
            .windows(needle.len())
            .any(|window| window == needle.as_slice())
        {
            return true;
        }
    }
    false
}

/// Binary and media blobs are never opened.
#[must_use]
pub fn is_skippable_extension(options: &Options, extension: &str) -> bool {
    options.skip_extensions.iter().any(|e| e == extension)
}

#[must_use]
pub fn exceeds_size_cap(options: &Options, size: u64) -> bool {
    size > options.max_file_bytes()
}

/// Extracted layers routinely contain entries with `0000` modes. Give
/// ourselves traversal permission on every directory once per layer, before
/// the walk starts.
pub fn prepare_layer_dirs(root: &Path) {
    let walker = walkdir::WalkDir::new(root).follow_links(false);
    for entry in walker.into_iter().filter_map(std::result::Result::ok) {
        if entry.file_type().is_dir() {
            grant_mode(entry.path(), 0o700);
        }
    }
}

/// Make a single layer file readable before opening it.
pub fn grant_read(path: &Path) {
    grant_mode(path, 0o600);
}

#[cfg(unix)]
fn grant_mode(path: &Path, bits: u32) {
    use std::os::unix::fs::PermissionsExt;
    let current = match fs::metadata(path) {
        Ok(meta) => meta.permissions().mode(),
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot stat for permission prep");
            return;
        }
    };
    let wanted = current | bits;
    if wanted != current {
        if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(wanted)) {
            warn!(path = %path.display(), %err, "cannot grant permissions");
        }
    }
}

#[cfg(not(unix))]
fn grant_mode(_path: &Path, _bits: u32) {}
