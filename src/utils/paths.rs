use std::path::{Path, PathBuf};

const ROOT_DIR_ENV: &str = "DOWNLOAD_GATE_ROOT_DIR";

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

pub fn resolve_root_dir() -> PathBuf {
    if let Ok(value) = std::env::var(ROOT_DIR_ENV) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            if let Some(dir) = ensure_dir(&path) {
                return dir;
            }
        }
    }

    if let Some(local) = dirs::data_local_dir() {
        if let Some(found) = ensure_dir(&local.join("download-gate")) {
            return found;
        }
    }

    if let Some(home) = dirs::home_dir() {
        if let Some(found) = ensure_dir(&home.join(".download-gate")) {
            return found;
        }
    }

    PathBuf::from(".")
}

pub fn resolve_data_dir(root: &Path) -> PathBuf {
    let data = root.join("data");
    if let Some(dir) = ensure_dir(&data) {
        return dir;
    }
    root.to_path_buf()
}

pub fn resolve_log_dir(root: &Path) -> PathBuf {
    let logs = root.join("logs");
    if let Some(dir) = ensure_dir(&logs) {
        return dir;
    }
    root.to_path_buf()
}
