use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{Result, SnagError};
use crate::fetch::{FetchSettings, MAX_PAGES, PAGE_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub url: String,
    pub token_env: Option<String>,
    pub token_command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub default_server: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Upper bound on pages fetched while following a component; 0 disables it.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_page_size() -> u32 {
    PAGE_SIZE
}

fn default_max_pages() -> u32 {
    MAX_PAGES
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_server: None,
            page_size: PAGE_SIZE,
            max_pages: MAX_PAGES,
        }
    }
}

impl GeneralConfig {
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            page_size: self.page_size.clamp(1, 500),
            max_pages: (self.max_pages > 0).then_some(self.max_pages),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            servers: vec![ServerConfig {
                name: "local".to_string(),
                url: "http://localhost:9000".to_string(),
                token_env: Some("SONAR_TOKEN".to_string()),
                token_command: None,
            }],
        }
    }
}

fn config_path() -> Option<PathBuf> {
    let config_dir = dirs::config_dir()?;
    Some(config_dir.join("snag").join("config.toml"))
}

impl Config {
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Config::default();
        };

        let Ok(content) = std::fs::read_to_string(&path) else {
            return Config::default();
        };

        match toml::from_str::<Config>(&content) {
            Ok(config) => {
                if config.servers.is_empty() {
                    Config {
                        general: config.general,
                        ..Config::default()
                    }
                } else {
                    config
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
                Config::default()
            }
        }
    }

    /// Pick a server by name or URL, falling back to `default_server`, then the first entry.
    pub fn select_server(&self, wanted: Option<&str>) -> Result<ServerConfig> {
        match wanted {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(self
                    .servers
                    .iter()
                    .find(|s| s.url.trim_end_matches('/') == url.trim_end_matches('/'))
                    .cloned()
                    .unwrap_or_else(|| ServerConfig {
                        name: host_of(url).unwrap_or_else(|| "adhoc".to_string()),
                        url: url.to_string(),
                        token_env: Some("SONAR_TOKEN".to_string()),
                        token_command: None,
                    }))
            }
            Some(name) => self
                .servers
                .iter()
                .find(|s| s.name == name)
                .cloned()
                .ok_or_else(|| SnagError::Config(format!("no server named '{}'", name))),
            None => {
                let by_default = self
                    .general
                    .default_server
                    .as_deref()
                    .and_then(|name| self.servers.iter().find(|s| s.name == name));
                by_default
                    .or_else(|| self.servers.first())
                    .cloned()
                    .ok_or_else(|| SnagError::Config("no servers configured".to_string()))
            }
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    let without_scheme = url.split("://").nth(1)?;
    let host = without_scheme.split('/').next()?;
    let host = host.split(':').next()?;
    (!host.is_empty()).then(|| host.to_string())
}

/// Scanner settings found in a project's `sonar-project.properties`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectProperties {
    pub project_key: Option<String>,
    pub host_url: Option<String>,
}

/// Read `sonar-project.properties` from the working directory, if present.
pub fn detect_project() -> Option<ProjectProperties> {
    let content = std::fs::read_to_string("sonar-project.properties").ok()?;
    Some(parse_properties(&content))
}

fn parse_properties(content: &str) -> ProjectProperties {
    let mut props = ProjectProperties::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once(['=', ':']) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "sonar.projectKey" => props.project_key = Some(value.to_string()),
            "sonar.host.url" => props.host_url = Some(value.to_string()),
            _ => {}
        }
    }
    props
}
