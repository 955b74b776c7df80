//! Process configuration.
//!
//! The browser starts a native host with the calling extension's origin as
//! the first argument (and, on Windows, a `--parent-window` handle). Every
//! other setting comes from the environment so that the host manifest does
//! not need to change between installs.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::github::DEFAULT_API_BASE;

/// Directory name used under the platform data directory.
pub const APP_DIR_NAME: &str = "pr-patrol";

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "pr-patrol", version, about = "Keeps browser tab groups in sync with GitHub searches")]
pub struct Config {
    /// Origin of the extension that started the host, e.g.
    /// `chrome-extension://<id>/`.
    pub origin: Option<String>,

    /// Native window handle passed by the browser on Windows. Unused.
    #[arg(long = "parent-window", hide = true)]
    pub parent_window: Option<String>,

    /// Where `state.json` lives.
    #[arg(long, env = "PR_PATROL_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// REST API root, for GitHub Enterprise.
    #[arg(long, env = "PR_PATROL_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Host whose PR and issue URLs search results may point at.
    #[arg(long, env = "PR_PATROL_WEB_HOST", default_value = "github.com")]
    pub web_host: String,

    /// Overrides the installation identifier used to derive the token key.
    #[arg(long, env = "PR_PATROL_INSTALL_ID")]
    pub install_id: Option<String>,

    /// Delay before the first scheduled pass, in seconds.
    #[arg(long, env = "PR_PATROL_INITIAL_DELAY_SECS")]
    pub initial_delay_secs: Option<u64>,
}

impl Config {
    /// The state directory: explicit, else the platform data directory,
    /// else a directory beside the working directory.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(format!("{APP_DIR_NAME}-state")))
    }

    /// The identifier the token key is derived from. Stable per install:
    /// the extension origin unless overridden.
    pub fn install_id(&self) -> Option<&str> {
        self.install_id
            .as_deref()
            .or(self.origin.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn initial_delay(&self) -> Option<Duration> {
        self.initial_delay_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("pr-patrol").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn origin_is_the_install_id() {
        let config = parse(&["chrome-extension://abcdef/"]);
        assert_eq!(config.install_id(), Some("chrome-extension://abcdef/"));
    }

    #[test]
    fn explicit_install_id_wins() {
        let config = parse(&["chrome-extension://abcdef/", "--install-id", "fixed"]);
        assert_eq!(config.install_id(), Some("fixed"));
    }

    #[test]
    fn parent_window_is_accepted() {
        let config = parse(&["chrome-extension://abcdef/", "--parent-window=0"]);
        assert_eq!(config.parent_window.as_deref(), Some("0"));
    }

    #[test]
    fn missing_origin_has_no_install_id() {
        assert_eq!(parse(&[]).install_id(), None);
    }

    #[test]
    fn explicit_state_dir() {
        let config = parse(&["--state-dir", "/tmp/patrol"]);
        assert_eq!(config.state_dir(), PathBuf::from("/tmp/patrol"));
    }

    #[test]
    fn initial_delay_in_seconds() {
        let config = parse(&["--initial-delay-secs", "3"]);
        assert_eq!(config.initial_delay(), Some(Duration::from_secs(3)));
    }
}
