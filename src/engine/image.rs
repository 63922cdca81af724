use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::error::{Result, ScanError};

/// Name of the tarball the runtime shim materializes into a workspace.
pub const IMAGE_TAR_NAME: &str = "save-output.tar";
/// Subdirectory of the workspace holding one subtree per extracted layer.
pub const EXTRACTED_FILES_DIR: &str = "ExtractedFiles";

/// The only operations the scan engine needs from a container runtime:
/// materialize an image or a running container as a tarball on disk.
pub trait ContainerRuntime: Send + Sync {
    fn save_image(&self, image: &str, tar_path: &Path) -> Result<()>;
    fn export_container(&self, id: &str, namespace: &str, tar_path: &Path) -> Result<()>;
}

/// Default shim shelling out to the container CLI. Anything implementing
/// `ContainerRuntime` can replace it (tests use a fixture-writing fake).
pub struct CommandRuntime;

impl ContainerRuntime for CommandRuntime {
    fn save_image(&self, image: &str, tar_path: &Path) -> Result<()> {
        run_runtime_command(Command::new("docker").args([
            "save",
            "-o",
            &tar_path.to_string_lossy(),
            image,
        ]))
    }

    fn export_container(&self, id: &str, namespace: &str, tar_path: &Path) -> Result<()> {
        let mut cmd;
        if namespace.is_empty() {
            cmd = Command::new("docker");
            cmd.args(["export", "-o", &tar_path.to_string_lossy(), id]);
        } else {
            cmd = Command::new("nerdctl");
            cmd.args([
                "-n",
                namespace,
                "export",
                "-o",
                &tar_path.to_string_lossy(),
                id,
            ]);
        }
        run_runtime_command(&mut cmd)
    }
}

fn run_runtime_command(cmd: &mut Command) -> Result<()> {
    let output = cmd
        .output()
        .map_err(|e| ScanError::Extraction(format!("cannot invoke container runtime: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ScanError::Extraction(format!(
            "container runtime exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

/// One entry of `manifest.json` in a `save`-format tarball.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestItem {
    #[serde(rename = "Config")]
    pub config: String,
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Vec<String>,
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

/// A layer ready to walk: its derived id and the directory its archive was
/// extracted into.
#[derive(Debug, Clone)]
pub struct Layer {
    pub id: String,
    pub dir: PathBuf,
}

/// An image expanded into per-layer subtrees under a workspace.
#[derive(Debug)]
pub struct ExtractedImage {
    pub image_id: String,
    pub repo_tags: Vec<String>,
    /// Layers in manifest order. Layers whose archives failed to extract
    /// are absent.
    pub layers: Vec<Layer>,
}

/// Strip the archive suffixes tooling appends to manifest layer paths:
/// `<id>/layer.tar` (docker save) and `<id>.tar` (skopeo variants).
#[must_use]
pub fn strip_layer_id(layer_path: &str) -> String {
    let trimmed = layer_path.strip_suffix("/layer.tar").unwrap_or(layer_path);
    let trimmed = trimmed.strip_suffix(".tar").unwrap_or(trimmed);
    trimmed.to_string()
}

/// Unpack a tar archive (gzip-transparent by file suffix) under `target`.
/// Entry names are re-rooted below `target` so no member can escape it;
/// directories are created `0755`; files keep their header mode; a copy
/// shorter than the header size fails the extraction.
pub fn untar(tar_path: &Path, target: &Path) -> Result<()> {
    debug!(tar = %tar_path.display(), "extracting tar archive");
    let file = File::open(tar_path)?;
    let name = tar_path.to_string_lossy();
    if name.ends_with(".gz") || name.ends_with(".gzip") {
        unpack_entries(tar::Archive::new(MultiGzDecoder::new(file)), target)
    } else {
        unpack_entries(tar::Archive::new(file), target)
    }
}

fn unpack_entries<R: io::Read>(mut archive: tar::Archive<R>, target: &Path) -> Result<()> {
    for entry in archive.entries()? {
        let mut entry = entry?;
        let header_size = entry.header().size()?;
        let entry_type = entry.header().entry_type();
        let mode = entry.header().mode().unwrap_or(0o644) & 0o777;

        let raw_path = entry.path()?.into_owned();
        let Some(rel) = rebase_entry_path(&raw_path) else {
            continue;
        };
        let dest = target.join(rel);

        if entry_type.is_dir() {
            create_dir_0755(&dest)?;
            continue;
        }
        if !entry_type.is_file() {
            // links, devices and FIFOs are never materialized
            continue;
        }

        if let Some(parent) = dest.parent() {
            create_dir_0755(parent)?;
        }
        let mut out = File::create(&dest)?;
        let copied = io::copy(&mut entry, &mut out)?;
        if copied != header_size {
            return Err(ScanError::Extraction(format!(
                "unexpected bytes written for {}: wrote {copied}, want {header_size}",
                raw_path.display()
            )));
        }
        set_mode(&dest, mode);
    }
    Ok(())
}

/// Lexically normalize a tar member name into a path safely joinable under
/// the extraction target: root and prefix components are dropped and `..`
/// pops instead of escaping. Returns `None` when nothing is left.
fn rebase_entry_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => out.push(c),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn create_dir_0755(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    set_mode(dir, 0o755);
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

/// Read and validate `manifest.json` from an extracted image tarball.
/// Anything but exactly one manifest entry is a fatal extraction error.
pub fn parse_manifest(dir: &Path) -> Result<ManifestItem> {
    let manifest_path = dir.join("manifest.json");
    let file = File::open(&manifest_path)
        .map_err(|e| ScanError::Extraction(format!("cannot open manifest.json: {e}")))?;
    let mut items: Vec<ManifestItem> = serde_json::from_reader(file)
        .map_err(|e| ScanError::Extraction(format!("cannot parse manifest.json: {e}")))?;
    if items.len() != 1 {
        return Err(ScanError::Extraction(format!(
            "manifest.json has {} entries, expected exactly 1",
            items.len()
        )));
    }
    Ok(items.remove(0))
}

/// Expand a `save`-format image tarball: untar the outer archive into the
/// workspace, read the manifest, then extract every layer in manifest order
/// under `ExtractedFiles/<layer_id>`. A layer that fails to extract is
/// logged and skipped; the rest of the image is still scanned.
pub fn extract_image_tar(tar_path: &Path, workspace: &Path) -> Result<ExtractedImage> {
    untar(tar_path, workspace)
        .map_err(|e| ScanError::Extraction(format!("image tar: {e}")))?;

    let manifest = parse_manifest(workspace)?;
    let image_id = manifest
        .config
        .strip_suffix(".json")
        .unwrap_or(&manifest.config)
        .to_string();
    let extract_root = workspace.join(EXTRACTED_FILES_DIR);

    let mut layers = Vec::new();
    for layer_path in &manifest.layers {
        let id = strip_layer_id(layer_path);
        let target = extract_root.join(&id);
        if let Err(err) = fs::create_dir_all(&target) {
            error!(layer = %id, %err, "cannot create layer directory, skipping layer");
            continue;
        }
        let archive = workspace.join(layer_path);
        if let Err(err) = untar(&archive, &target) {
            error!(layer = %id, %err, "cannot extract layer, skipping layer");
            continue;
        }
        debug!(layer = %id, dir = %target.display(), "layer extracted");
        layers.push(Layer { id, dir: target });
    }

    info!(image = %image_id, layers = layers.len(), "image expanded");
    Ok(ExtractedImage {
        image_id,
        repo_tags: manifest.repo_tags,
        layers,
    })
}

/// Expand a container filesystem export. Exports carry no manifest, so the
/// whole tree becomes a single synthetic layer named after the container.
pub fn extract_container_tar(
    tar_path: &Path,
    workspace: &Path,
    container_id: &str,
) -> Result<ExtractedImage> {
    let target = workspace.join(EXTRACTED_FILES_DIR).join(container_id);
    fs::create_dir_all(&target)?;
    untar(tar_path, &target)
        .map_err(|e| ScanError::Extraction(format!("container export: {e}")))?;
    Ok(ExtractedImage {
        image_id: container_id.to_string(),
        repo_tags: Vec::new(),
        layers: vec![Layer {
            id: container_id.to_string(),
            dir: target,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tar_with(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            // Write the raw name bytes directly, bypassing `set_path`'s
            // validation, since these tests intentionally construct
            // malicious (absolute / `..`) entries.
            let name_field = &mut header.as_gnu_mut().unwrap().name;
            let bytes = name.as_bytes();
            name_field[..bytes.len()].copy_from_slice(bytes);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn write_tar(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_strip_layer_id_variants() {
        assert_eq!(strip_layer_id("abc123/layer.tar"), "abc123");
        assert_eq!(strip_layer_id("blobs/sha256/abc.tar"), "blobs/sha256/abc");
        assert_eq!(strip_layer_id("plain"), "plain");
    }

    #[test]
    fn test_untar_recreates_files_and_modes() {
        let dir = tempfile::TempDir::new().unwrap();
        let tar = tar_with(&[
            ("app/creds.txt", b"secret", 0o640),
            ("app/sub/more.txt", b"data", 0o600),
        ]);
        let tar_path = write_tar(dir.path(), "t.tar", &tar);
        let target = dir.path().join("out");
        fs::create_dir(&target).unwrap();
        untar(&tar_path, &target).unwrap();
        assert_eq!(
            fs::read_to_string(target.join("app/creds.txt")).unwrap(),
            "secret"
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(target.join("app/creds.txt"))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o640);
        }
    }

    #[test]
    fn test_untar_reroots_absolute_and_dotdot_members() {
        let dir = tempfile::TempDir::new().unwrap();
        let tar = tar_with(&[
            ("/etc/passwd", b"absolute", 0o644),
            ("../../escape.txt", b"escape", 0o644),
            ("ok/../sibling.txt", b"sibling", 0o644),
        ]);
        let tar_path = write_tar(dir.path(), "evil.tar", &tar);
        let target = dir.path().join("out");
        fs::create_dir(&target).unwrap();
        untar(&tar_path, &target).unwrap();

        assert_eq!(
            fs::read_to_string(target.join("etc/passwd")).unwrap(),
            "absolute"
        );
        assert_eq!(
            fs::read_to_string(target.join("escape.txt")).unwrap(),
            "escape"
        );
        assert_eq!(
            fs::read_to_string(target.join("sibling.txt")).unwrap(),
            "sibling"
        );
        // nothing may land outside the target directory
        assert!(!dir.path().join("escape.txt").exists());
        assert!(!Path::new("/etc").join("passwd.escape").exists());
    }

    #[test]
    fn test_untar_gzip_by_suffix() {
        let dir = tempfile::TempDir::new().unwrap();
        let tar = tar_with(&[("file.txt", b"zipped", 0o644)]);
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar).unwrap();
        let gz = encoder.finish().unwrap();
        let tar_path = write_tar(dir.path(), "layer.tar.gz", &gz);
        let target = dir.path().join("out");
        fs::create_dir(&target).unwrap();
        untar(&tar_path, &target).unwrap();
        assert_eq!(fs::read_to_string(target.join("file.txt")).unwrap(), "zipped");
    }

    #[test]
    fn test_untar_truncated_archive_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let tar = tar_with(&[("big.txt", b"0123456789", 0o644)]);
        // cut into the payload so the copy comes up short of the header size
        let tar_path = write_tar(dir.path(), "cut.tar", &tar[..516]);
        let target = dir.path().join("out");
        fs::create_dir(&target).unwrap();
        assert!(untar(&tar_path, &target).is_err());
    }

    #[test]
    fn test_parse_manifest_requires_exactly_one_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("manifest.json"), "[]").unwrap();
        let err = parse_manifest(dir.path()).unwrap_err();
        assert!(err.to_string().contains("expected exactly 1"));

        fs::write(
            dir.path().join("manifest.json"),
            r#"[{"Config":"a.json","Layers":[]},{"Config":"b.json","Layers":[]}]"#,
        )
        .unwrap();
        assert!(parse_manifest(dir.path()).is_err());

        fs::write(
            dir.path().join("manifest.json"),
            r#"[{"Config":"abc.json","RepoTags":["app:latest"],"Layers":["l1/layer.tar"]}]"#,
        )
        .unwrap();
        let item = parse_manifest(dir.path()).unwrap();
        assert_eq!(item.config, "abc.json");
        assert_eq!(item.repo_tags, vec!["app:latest"]);
    }

    #[test]
    fn test_extract_image_tar_end_to_end() {
        let dir = tempfile::TempDir::new().unwrap();

        let layer1 = tar_with(&[("app/.env", b"TOKEN=ghp_x", 0o600)]);
        let layer2 = tar_with(&[("app/readme", b"clean", 0o644)]);
        let manifest = r#"[{"Config":"cfg.json","RepoTags":["demo:1"],"Layers":["l1/layer.tar","l2/layer.tar"]}]"#;

        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in [
            ("manifest.json", manifest.as_bytes()),
            ("l1/layer.tar", layer1.as_slice()),
            ("l2/layer.tar", layer2.as_slice()),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        }
        let outer = builder.into_inner().unwrap();
        let tar_path = write_tar(dir.path(), IMAGE_TAR_NAME, &outer);

        let workspace = dir.path().join("ws");
        fs::create_dir(&workspace).unwrap();
        let image = extract_image_tar(&tar_path, &workspace).unwrap();

        assert_eq!(image.image_id, "cfg");
        assert_eq!(image.layers.len(), 2);
        assert_eq!(image.layers[0].id, "l1");
        assert_eq!(image.layers[1].id, "l2");
        assert!(image.layers[0].dir.join("app/.env").exists());
        assert!(image.layers[1].dir.join("app/readme").exists());
    }

    #[test]
    fn test_extract_image_bad_layer_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();

        let good = tar_with(&[("data.txt", b"fine", 0o644)]);
        let manifest =
            r#"[{"Config":"cfg.json","Layers":["bad/layer.tar","good/layer.tar"]}]"#;

        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in [
            ("manifest.json", manifest.as_bytes()),
            ("bad/layer.tar", b"this is not a tar archive".as_slice()),
            ("good/layer.tar", good.as_slice()),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        }
        let outer = builder.into_inner().unwrap();
        let tar_path = write_tar(dir.path(), "img.tar", &outer);

        let workspace = dir.path().join("ws");
        fs::create_dir(&workspace).unwrap();
        let image = extract_image_tar(&tar_path, &workspace).unwrap();
        assert_eq!(image.layers.len(), 1);
        assert_eq!(image.layers[0].id, "good");
    }

    #[test]
    fn test_extract_container_tar_is_single_synthetic_layer() {
        let dir = tempfile::TempDir::new().unwrap();
        let export = tar_with(&[("etc/shadow", b"root:$6$salt$hash:", 0o000)]);
        let tar_path = write_tar(dir.path(), "export.tar", &export);
        let workspace = dir.path().join("ws");
        fs::create_dir(&workspace).unwrap();

        let image = extract_container_tar(&tar_path, &workspace, "cafe01").unwrap();
        assert_eq!(image.image_id, "cafe01");
        assert_eq!(image.layers.len(), 1);
        assert_eq!(image.layers[0].id, "cafe01");
        assert!(image.layers[0].dir.join("etc/shadow").exists());
    }
}
