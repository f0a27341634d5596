//! State directory resolution.
//!
//! Priority: `--state-dir`, then `CARNET_HOME`, then `~/.carnet`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const HOME_ENV: &str = "CARNET_HOME";
pub const HOME_DIR_NAME: &str = ".carnet";
pub const LOG_FILE: &str = "carnet.log";
pub const STATES_FILE: &str = "carStates.json";

pub fn resolve_state_dir(flag: Option<&Path>) -> Result<PathBuf> {
    resolve_with(flag, std::env::var_os(HOME_ENV).map(PathBuf::from), dirs::home_dir())
}

fn resolve_with(flag: Option<&Path>, env: Option<PathBuf>, home: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match (flag, env) {
        (Some(flag), _) => flag.to_path_buf(),
        (None, Some(env)) if !env.as_os_str().is_empty() => env,
        _ => home
            .context("cannot determine the home directory; pass --state-dir")?
            .join(HOME_DIR_NAME),
    };
    // Relative paths are pinned to the current directory once, at startup.
    if dir.is_relative() {
        let cwd = std::env::current_dir().context("cannot read the current directory")?;
        return Ok(cwd.join(dir));
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins() {
        let dir = resolve_with(
            Some(Path::new("/var/lib/carnet")),
            Some(PathBuf::from("/env")),
            Some(PathBuf::from("/home/u")),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/var/lib/carnet"));
    }

    #[test]
    fn test_env_then_home() {
        let env = resolve_with(None, Some(PathBuf::from("/env")), Some(PathBuf::from("/home/u"))).unwrap();
        assert_eq!(env, PathBuf::from("/env"));

        let home = resolve_with(None, Some(PathBuf::new()), Some(PathBuf::from("/home/u"))).unwrap();
        assert_eq!(home, PathBuf::from("/home/u/.carnet"));

        assert!(resolve_with(None, None, None).is_err());
    }

    #[test]
    fn test_relative_is_absolutized() {
        let dir = resolve_with(Some(Path::new("state")), None, None).unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with("state"));
    }
}
