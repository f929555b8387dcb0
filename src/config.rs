use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reddit::ThreadQuery;

const DEFAULT_ENV_PREFIX: &str = "REDDIT_STREAM";
const DEFAULT_MAX_AGE_HOURS: u32 = 24;
const DEFAULT_LIMIT: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub menu: Vec<MenuEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            base_url: default_base_url(),
            timeout: default_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    format!("reddit-stream/{}", crate::VERSION)
}

fn default_base_url() -> String {
    crate::reddit::DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    crate::reddit::DEFAULT_TIMEOUT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub refresh_interval: Duration,
    #[serde(default)]
    pub ascii_tree: bool,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            refresh_interval: default_refresh_interval(),
            ascii_tree: false,
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_path")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("reddit-stream").join("reddit-stream.log"))
}

fn default_log_filter() -> String {
    "info".into()
}

/// One row of the start menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMenuEntry", into = "RawMenuEntry")]
pub enum MenuEntry {
    Separator,
    UrlEntry { title: String, description: String },
    Search(SearchEntry),
}

impl MenuEntry {
    pub fn title(&self) -> &str {
        match self {
            MenuEntry::Separator => "",
            MenuEntry::UrlEntry { title, .. } => title,
            MenuEntry::Search(entry) => &entry.title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            MenuEntry::Separator => "",
            MenuEntry::UrlEntry { description, .. } => description,
            MenuEntry::Search(entry) => &entry.description,
        }
    }

    pub fn is_selectable(&self) -> bool {
        !matches!(self, MenuEntry::Separator)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchEntry {
    pub title: String,
    pub kind: String,
    pub subreddit: String,
    pub flairs: Vec<String>,
    pub max_age_hours: u32,
    pub limit: u32,
    pub title_must_contain: Vec<String>,
    pub title_must_not_contain: Vec<String>,
    pub description: String,
}

impl SearchEntry {
    pub fn query(&self) -> ThreadQuery {
        ThreadQuery {
            kind: self.kind.clone(),
            subreddit: self.subreddit.clone(),
            flairs: self.flairs.clone(),
            max_age_hours: if self.max_age_hours == 0 {
                DEFAULT_MAX_AGE_HOURS
            } else {
                self.max_age_hours
            },
            limit: if self.limit == 0 {
                DEFAULT_LIMIT
            } else {
                self.limit
            },
            title_must_contain: self.title_must_contain.clone(),
            title_must_not_contain: self.title_must_not_contain.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::None => Vec::new(),
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawMenuEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    subreddit: String,
    #[serde(default)]
    flair: OneOrMany,
    #[serde(default)]
    max_age_hours: u32,
    #[serde(default)]
    limit: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    title_must_contain: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    title_must_not_contain: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
}

impl From<RawMenuEntry> for MenuEntry {
    fn from(raw: RawMenuEntry) -> Self {
        match raw.kind.as_str() {
            "separator" => MenuEntry::Separator,
            "url_input" => MenuEntry::UrlEntry {
                title: raw.title,
                description: raw.description,
            },
            _ => MenuEntry::Search(SearchEntry {
                title: raw.title,
                kind: raw.kind,
                subreddit: raw.subreddit,
                flairs: raw.flair.into_vec(),
                max_age_hours: raw.max_age_hours,
                limit: raw.limit,
                title_must_contain: raw.title_must_contain,
                title_must_not_contain: raw.title_must_not_contain,
                description: raw.description,
            }),
        }
    }
}

impl From<MenuEntry> for RawMenuEntry {
    fn from(entry: MenuEntry) -> Self {
        match entry {
            MenuEntry::Separator => RawMenuEntry {
                kind: "separator".into(),
                ..RawMenuEntry::default()
            },
            MenuEntry::UrlEntry { title, description } => RawMenuEntry {
                kind: "url_input".into(),
                title,
                description,
                ..RawMenuEntry::default()
            },
            MenuEntry::Search(entry) => RawMenuEntry {
                kind: entry.kind,
                title: entry.title,
                subreddit: entry.subreddit,
                flair: OneOrMany::Many(entry.flairs),
                max_age_hours: entry.max_age_hours,
                limit: entry.limit,
                title_must_contain: entry.title_must_contain,
                title_must_not_contain: entry.title_must_not_contain,
                description: entry.description,
            },
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn search(
    title: &str,
    kind: &str,
    subreddit: &str,
    flairs: &[&str],
    max_age_hours: u32,
    limit: u32,
    must: &[&str],
    must_not: &[&str],
) -> MenuEntry {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    MenuEntry::Search(SearchEntry {
        title: title.into(),
        kind: kind.into(),
        subreddit: subreddit.into(),
        flairs: owned(flairs),
        max_age_hours,
        limit,
        title_must_contain: owned(must),
        title_must_not_contain: owned(must_not),
        description: String::new(),
    })
}

/// Menu used when the config file does not define one.
pub fn default_menu() -> Vec<MenuEntry> {
    vec![
        search(
            "/r/soccer match-threads",
            "soccer_match",
            "soccer",
            &["Match Thread", "match thread"],
            6,
            50,
            &["Match Thread"],
            &["Post Match Thread", "Post-Match Thread"],
        ),
        search(
            "/r/soccer post-match-threads",
            "soccer_post_match",
            "soccer",
            &["Post Match Thread", "post match thread"],
            12,
            50,
            &["Post Match Thread"],
            &[],
        ),
        search(
            "/r/fantasypl",
            "fpl_rant",
            "FantasyPL",
            &["GW Rant & Info", "gw rant & info"],
            168,
            50,
            &["Rant"],
            &[],
        ),
        search(
            "/r/nfl game-threads",
            "nfl_game",
            "nfl",
            &["Game Thread", "game thread"],
            12,
            100,
            &["Game Thread"],
            &["Post Game Thread", "Post-Game Thread"],
        ),
        search(
            "/r/nfl post-game-threads",
            "nfl_post_game",
            "nfl",
            &["Game Thread", "game thread"],
            12,
            100,
            &["Post Game Thread"],
            &[],
        ),
        MenuEntry::Separator,
        MenuEntry::UrlEntry {
            title: "Enter Reddit URL".into(),
            description: "View any Reddit thread by URL".into(),
        },
    ]
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        let from_file = read_config_file(path)?;
        cfg = merge_config(cfg, from_file);
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    if cfg.menu.is_empty() {
        cfg.menu = default_menu();
    }

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.reddit.user_agent.is_empty() {
        base.reddit.user_agent = other.reddit.user_agent;
    }
    if !other.reddit.base_url.is_empty() {
        base.reddit.base_url = other.reddit.base_url;
    }
    if !other.reddit.timeout.is_zero() {
        base.reddit.timeout = other.reddit.timeout;
    }

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }
    if !other.ui.refresh_interval.is_zero() {
        base.ui.refresh_interval = other.ui.refresh_interval;
    }
    base.ui.ascii_tree = other.ui.ascii_tree;

    base.logging.enabled = other.logging.enabled;
    if other.logging.path.is_some() {
        base.logging.path = other.logging.path;
    }
    if !other.logging.filter.is_empty() {
        base.logging.filter = other.logging.filter;
    }

    if !other.menu.is_empty() {
        base.menu = other.menu;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "reddit.user_agent" => cfg.reddit.user_agent = value,
        "reddit.base_url" => cfg.reddit.base_url = value,
        "reddit.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.reddit.timeout = duration;
            }
        }
        "ui.theme" => cfg.ui.theme = value,
        "ui.refresh_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.refresh_interval = duration;
            }
        }
        "ui.ascii_tree" => cfg.ui.ascii_tree = env_truthy(&value),
        "logging.enabled" => cfg.logging.enabled = env_truthy(&value),
        "logging.path" => cfg.logging.path = Some(PathBuf::from(value)),
        "logging.filter" => cfg.logging.filter = value,
        _ => {}
    }
}

fn env_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True")
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reddit-stream").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated() -> LoadOptions {
        LoadOptions {
            config_file: None,
            env_prefix: Some("REDDIT_STREAM_TEST_NONE".into()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(isolated()).unwrap();
        assert_eq!(cfg.ui.theme, "default");
        assert_eq!(cfg.ui.refresh_interval, Duration::from_secs(10));
        assert_eq!(cfg.menu, default_menu());
    }

    #[test]
    fn parses_menu_entries_from_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            r#"
ui:
  refresh_interval: 5s
menu:
  - type: nba_game
    title: NBA game threads
    subreddit: nba
    flair: Game Thread
    title_must_not_contain: ["Post Game"]
  - type: separator
  - type: url_input
    title: Enter Reddit URL
"#,
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("REDDIT_STREAM_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.refresh_interval, Duration::from_secs(5));
        assert_eq!(cfg.menu.len(), 3);
        let MenuEntry::Search(entry) = &cfg.menu[0] else {
            panic!("expected search entry, got {:?}", cfg.menu[0]);
        };
        assert_eq!(entry.flairs, vec!["Game Thread".to_string()]);
        let query = entry.query();
        assert_eq!(query.max_age_hours, 24);
        assert_eq!(query.limit, 50);
        assert_eq!(query.kind, "nba_game");
        assert_eq!(cfg.menu[1], MenuEntry::Separator);
        assert!(matches!(cfg.menu[2], MenuEntry::UrlEntry { .. }));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = load(LoadOptions {
            config_file: Some(dir.path().join("nope.yaml")),
            env_prefix: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides() {
        env::set_var("REDDIT_STREAM_ENVTEST_UI__THEME", "mono");
        env::set_var("REDDIT_STREAM_ENVTEST_UI__REFRESH_INTERVAL", "30s");
        let cfg = load(LoadOptions {
            config_file: None,
            env_prefix: Some("REDDIT_STREAM_ENVTEST".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "mono");
        assert_eq!(cfg.ui.refresh_interval, Duration::from_secs(30));
        env::remove_var("REDDIT_STREAM_ENVTEST_UI__THEME");
        env::remove_var("REDDIT_STREAM_ENVTEST_UI__REFRESH_INTERVAL");
    }
}
