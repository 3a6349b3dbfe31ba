use anyhow::{Context, Result};
use crawlguard::config::Config;
use std::path::{Path, PathBuf};

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "crawlguard.toml";

/// Resolve `path` to a config file: a `.toml` path is used as is, anything else
/// is treated as a directory
fn config_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "toml") {
        path.to_path_buf()
    } else {
        path.join(CONFIG_FILE_NAME)
    }
}

pub fn init_config(path: PathBuf) -> Result<()> {
    let config_path = config_path(&path);
    if config_path.exists() {
        anyhow::bail!("{} already exists, refusing to overwrite", config_path.display());
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let toml_content = format!("# crawlguard configuration\n\n{}", Config::default().to_toml()?);
    std::fs::write(&config_path, toml_content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created configuration file: {}", config_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_default_config() {
        let dir = tempfile::TempDir::new().unwrap();
        init_config(dir.path().to_path_buf()).unwrap();

        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.traps.url_size_limit, 200);

        // Second run must not clobber the file
        assert!(init_config(dir.path().to_path_buf()).is_err());
    }

    #[test]
    fn explicit_toml_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("conf").join("site.toml");
        init_config(path.clone()).unwrap();
        assert!(path.exists());
    }
}
