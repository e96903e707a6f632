use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the config file path: `<exe_dir>/config.json`
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}

/// Returns the default archive root used when no custom directory is
/// configured: the user's Pictures folder, falling back to
/// `<exe_dir>/screenshots/` when no profile directory is available.
pub fn default_archive_dir() -> PathBuf {
    dirs::picture_dir()
        .map(|p| p.join("Procshot"))
        .unwrap_or_else(|| get_exe_dir().join("screenshots"))
}

/// Ensures startup directories exist. Per-process archive folders are
/// created on demand by each capture.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    Ok(())
}
