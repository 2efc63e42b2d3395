//! Environment-derived configuration.
//!
//! Mirrors the variables the operator sets when launching the control plane:
//! `BOT_WORKDIR`, `BOT_PYTHON_PATH`, `BOT_CONFIG_PATH`, `OLLAMA_BASE_URL`,
//! plus `HIREMED_HOST`/`HIREMED_PORT` for the listener itself.

use std::env;
use std::path::{Path, PathBuf};

/// Where the bot lives and how to launch it.
#[derive(Debug, Clone)]
pub struct BotEnv {
    /// Root directory of the Python worker (resolved to an absolute path).
    pub workdir: PathBuf,
    /// Python interpreter used to launch the worker.
    pub python: String,
    /// Config file handed to the worker via `--config`. `None` disables the
    /// flag entirely (empty `BOT_CONFIG_PATH`).
    pub config_path: Option<PathBuf>,
    /// Base URL of the local Ollama endpoint.
    pub ollama_base_url: String,
}

impl BotEnv {
    pub fn from_env() -> Self {
        let workdir = env::var("BOT_WORKDIR").unwrap_or_else(|_| "bot".to_string());
        let workdir = resolve_against_cwd(PathBuf::from(workdir));

        let config_path = match env::var("BOT_CONFIG_PATH") {
            Ok(value) if value.is_empty() => None,
            Ok(value) => Some(PathBuf::from(value)),
            Err(_) => Some(PathBuf::from("config/config.yaml")),
        };

        Self {
            workdir,
            python: env::var("BOT_PYTHON_PATH").unwrap_or_else(|_| "python3".to_string()),
            config_path,
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
        }
    }

    /// The worker entry point: `<workdir>/main.py`.
    pub fn script_path(&self) -> PathBuf {
        self.workdir.join("main.py")
    }

    /// Config path resolved against the workdir unless already absolute.
    pub fn resolved_config_path(&self) -> Option<PathBuf> {
        self.config_path.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.workdir.join(path)
            }
        })
    }
}

fn resolve_against_cwd(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("HIREMED_HOST").unwrap_or(defaults.host),
            port: env::var("HIREMED_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot_env(workdir: &Path, config_path: Option<&str>) -> BotEnv {
        BotEnv {
            workdir: workdir.to_path_buf(),
            python: "python3".to_string(),
            config_path: config_path.map(PathBuf::from),
            ollama_base_url: "http://localhost:11434".to_string(),
        }
    }

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn script_path_lives_under_workdir() {
        let env = bot_env(Path::new("/srv/bot"), Some("config/config.yaml"));
        assert_eq!(env.script_path(), PathBuf::from("/srv/bot/main.py"));
    }

    #[test]
    fn relative_config_path_resolves_against_workdir() {
        let env = bot_env(Path::new("/srv/bot"), Some("config/config.yaml"));
        assert_eq!(
            env.resolved_config_path(),
            Some(PathBuf::from("/srv/bot/config/config.yaml"))
        );
    }

    #[test]
    fn absolute_config_path_passes_through() {
        let env = bot_env(Path::new("/srv/bot"), Some("/etc/hireme/config.yaml"));
        assert_eq!(
            env.resolved_config_path(),
            Some(PathBuf::from("/etc/hireme/config.yaml"))
        );
    }

    #[test]
    fn missing_config_path_disables_flag() {
        let env = bot_env(Path::new("/srv/bot"), None);
        assert_eq!(env.resolved_config_path(), None);
    }
}
