use std::path::PathBuf;

const APP_DIR: &str = "reelgrab";

pub trait AppPaths: Send + Sync {
    fn data_dir(&self) -> PathBuf;
    fn bin_dir(&self) -> Option<PathBuf>;
}

pub struct DesktopPaths;

impl AppPaths for DesktopPaths {
    fn data_dir(&self) -> PathBuf {
        app_data_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        managed_bin_dir()
    }
}

/// `REELGRAB_DATA_DIR` wins over the platform data directory.
pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("REELGRAB_DATA_DIR") {
        if !dir.trim().is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    dirs::data_dir().map(|d| d.join(APP_DIR))
}

/// Where user-installed copies of the external tools are looked up.
pub fn managed_bin_dir() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("bin"))
}

pub fn bin_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}
