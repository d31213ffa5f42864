use aide_core::layout::{CONFIG_FILE, NEEDS_ACTION_DIR};
use std::path::{Path, PathBuf};

/// Resolve the vault root directory.
///
/// Priority:
/// 1. `--vault` flag / `AIDE_VAULT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `aide.yaml`
/// 3. Walk upward from `cwd` looking for `Needs_Action/`
/// 4. Fall back to `cwd`
pub fn resolve_vault(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, |dir| dir.join(CONFIG_FILE).is_file())
        .or_else(|| find_upward(&cwd, |dir| dir.join(NEEDS_ACTION_DIR).is_dir()))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, is_vault: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| is_vault(dir))
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_vault_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_vault(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_config_above_nested_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "version: 1\n").unwrap();
        let nested = dir.path().join("Accounting/Transactions");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_upward(&nested, |d| d.join(CONFIG_FILE).is_file());
        assert_eq!(found.as_deref(), Some(dir.path()));
    }
}
