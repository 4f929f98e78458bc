use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::INDEX_DIR_NAME;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub index_dir: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let data_dir = discover_data_dir(&project_root);
        Self::build(project_root, data_dir)
    }

    /// Paths rooted at an explicit data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self::build(data_dir.clone(), data_dir)
    }

    fn build(project_root: PathBuf, data_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        let index_dir = data_dir.join(INDEX_DIR_NAME);
        let secrets_path = data_dir.join("secrets.yaml");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            data_dir,
            log_dir,
            index_dir,
            secrets_path,
        }
    }

    /// Text file holding the extracted pages of one category.
    pub fn corpus_file(&self, category: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}_wikipedia_content.txt", category))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("IPAD_CHATBOT_ROOT") {
        return PathBuf::from(root);
    }

    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn discover_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("IPAD_CHATBOT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    project_root.to_path_buf()
}
