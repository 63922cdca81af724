use std::path::PathBuf;

/// Process-wide options snapshot. Built once from the CLI (or accepted from
/// an embedding caller) and immutable for the lifetime of every scan that
/// sees it.
#[derive(Debug, Clone)]
pub struct Options {
    /// Process-level scan pool size; 0 means the number of logical CPUs.
    pub threads: usize,
    /// Per-file size cap in kilobytes.
    pub maximum_file_size: u64,
    /// Root under which per-scan workspaces are created.
    pub temp_directory: PathBuf,
    /// Prefix stripped from reported paths when scanning a mounted host root.
    pub host_mount_path: String,
    /// Extra rule files supplied by the user.
    pub config_paths: Vec<PathBuf>,
    /// Append user rule files to the default catalog instead of replacing it.
    pub merge_configs: bool,
    /// Report more than one match per (file, rule) pair.
    pub multi_match: bool,
    /// Cap on matches per (file, rule) pair when `multi_match` is on.
    pub max_multi_match: u32,
    /// Global cap on findings per scan.
    pub max_secrets: u64,
    pub workers_per_scan: usize,
    /// Seconds without output before an idle scan cancels itself.
    pub inactive_threshold: u64,
    pub fail_on_count: i64,
    pub fail_on_high_count: i64,
    pub fail_on_medium_count: i64,
    pub fail_on_low_count: i64,
    /// Directories never descended into, matched per path component.
    pub skip_dirs: Vec<String>,
    /// Extensions never opened (binary and media blobs).
    pub skip_extensions: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            threads: 0,
            maximum_file_size: 256,
            temp_directory: std::env::temp_dir(),
            host_mount_path: String::new(),
            config_paths: Vec::new(),
            merge_configs: false,
            multi_match: false,
            max_multi_match: 3,
            max_secrets: 1000,
            workers_per_scan: 1,
            inactive_threshold: 600,
            fail_on_count: -1,
            fail_on_high_count: -1,
            fail_on_medium_count: -1,
            fail_on_low_count: -1,
            skip_dirs: default_skip_dirs(),
            skip_extensions: default_skip_extensions(),
        }
    }
}

impl Options {
    #[must_use]
    pub fn max_file_bytes(&self) -> u64 {
        self.maximum_file_size * 1024
    }

    #[must_use]
    pub fn scan_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

fn default_skip_dirs() -> Vec<String> {
    [
        "proc",
        "sys",
        "dev",
        "boot",
        "run",
        ".git",
        ".hg",
        ".svn",
        "node_modules",
        "vendor",
        "__pycache__",
        ".cache",
        "target",
        "usr/local/go",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_skip_extensions() -> Vec<String> {
    [
        // images
        "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "tiff",
        // audio / video
        "mp3", "mp4", "avi", "mkv", "webm", "wav", "flac", "ogg", "mov",
        // archives
        "zip", "gz", "gzip", "tar", "bz2", "xz", "7z", "rar", "tgz",
        // compiled blobs
        "o", "so", "a", "dylib", "pyc", "class", "jar", "war", "exe", "dll", "bin", "wasm",
        // fonts and documents
        "woff", "woff2", "ttf", "eot", "otf", "pdf",
        // misc
        "lock", "sum",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}
