//! Config file discovery, loading, and environment variable overlay.

use crate::{AttuneConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/attune/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("attune/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("attune.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge `overlay` into `base`, key by key. Nested tables merge recursively,
/// any other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Build a config from a merged table. Missing keys take their defaults.
pub fn from_table(mut table: toml::Table) -> Result<AttuneConfig, ConfigError> {
    if let Some(dir) = table
        .get_mut("paths")
        .and_then(|v| v.as_table_mut())
        .and_then(|paths| paths.get_mut("render_dir"))
    {
        if let Some(raw) = dir.as_str() {
            *dir = toml::Value::String(expand_path(raw).to_string_lossy().into_owned());
        }
    }

    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Invalid(e.to_string()))
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut AttuneConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, env::vars());
}

/// Apply overrides from an explicit set of variables.
pub fn apply_overrides_from<I>(config: &mut AttuneConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut rust_log = None;

    for (key, value) in vars {
        let applied = match key.as_str() {
            "ATTUNE_RENDER_DIR" => {
                config.paths.render_dir = expand_path(&value);
                true
            }
            "ATTUNE_LOG_LEVEL" => {
                config.telemetry.log_level = value;
                true
            }
            // RUST_LOG wins over ATTUNE_LOG_LEVEL regardless of iteration order
            "RUST_LOG" => {
                rust_log = Some(value);
                true
            }
            "ATTUNE_SAMPLE_RATE" => parse_into(&value, &mut config.audio.sample_rate),
            "ATTUNE_RAMP_MS" => parse_into(&value, &mut config.audio.ramp_ms),
            "ATTUNE_GRANT_AUDIO" => parse_into(&value, &mut config.audio.grant_permission),
            "ATTUNE_TOTAL_FRAGMENTS" => {
                parse_into(&value, &mut config.sessions.unhooking.total_fragments)
            }
            _ => match key.strip_prefix("ATTUNE_TONE_") {
                // Tone overrides (ATTUNE_TONE_<NAME>=<hz>)
                Some(name) => match value.parse::<f32>() {
                    Ok(hz) => {
                        config.tones.insert(name.to_lowercase(), hz);
                        true
                    }
                    Err(_) => false,
                },
                None => false,
            },
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }

    if let Some(level) = rust_log {
        config.telemetry.log_level = level;
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, slot: &mut T) -> bool {
    match value.parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> toml::Table {
        text.parse().unwrap()
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = from_table(table("[audio]\nramp_ms = 50\n")).unwrap();
        assert_eq!(config.audio.ramp_ms, 50);
        // Other values should be defaults
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.sessions.unhooking.total_fragments, 8);
    }

    #[test]
    fn test_parse_full_toml() {
        let text = r#"
[paths]
render_dir = "/data/renders"

[telemetry]
log_level = "debug"

[audio]
sample_rate = 44100
ramp_ms = 80
gain_floor = 0.001
grant_permission = false

[sessions.unhooking]
total_fragments = 5
fog_step = 0.25
fog_threshold = 0.05

[sessions.liberation]
arousal_limit = 5
crossing_dwell_secs = 30

[sessions.breath_of_source]
required_cycles = 3

[tones]
calm = 180.0
forest = 530.0
"#;
        let config = from_table(table(text)).unwrap();

        assert_eq!(config.paths.render_dir, PathBuf::from("/data/renders"));
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.ramp_ms, 80);
        assert!(!config.audio.grant_permission);
        assert_eq!(config.sessions.unhooking.total_fragments, 5);
        assert_eq!(config.sessions.liberation.arousal_limit, 5);
        assert_eq!(config.sessions.liberation.crossing_dwell_secs, 30);
        assert_eq!(config.sessions.breath_of_source.required_cycles, 3);
        assert_eq!(config.tones.get("forest"), Some(&530.0));
        assert_eq!(config.tones.len(), 2);
    }

    #[test]
    fn test_merge_is_key_by_key() {
        let mut base = table("[audio]\nsample_rate = 44100\nramp_ms = 80\n");
        merge_tables(&mut base, table("[audio]\nramp_ms = 20\n[tones]\ncalm = 170.0\n"));

        let config = from_table(base).unwrap();
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.ramp_ms, 20);
        assert_eq!(config.tones.get("calm"), Some(&170.0));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[audio\nramp_ms = ").unwrap();

        let err = load_table(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let err = from_table(table("[audio]\nramp_ms = \"fast\"\n")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AttuneConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(
            &mut config,
            &mut sources,
            vars(&[
                ("RUST_LOG", "trace"),
                ("ATTUNE_LOG_LEVEL", "warn"),
                ("ATTUNE_RAMP_MS", "40"),
                ("ATTUNE_GRANT_AUDIO", "false"),
                ("ATTUNE_TONE_SUNRISE", "444"),
                ("ATTUNE_SAMPLE_RATE", "not-a-number"),
                ("HOME", "/root"),
            ]),
        );

        assert_eq!(config.telemetry.log_level, "trace");
        assert_eq!(config.audio.ramp_ms, 40);
        assert!(!config.audio.grant_permission);
        assert_eq!(config.tones.get("sunrise"), Some(&444.0));
        assert_eq!(config.audio.sample_rate, 48000);
        assert!(sources.env_overrides.contains(&"ATTUNE_TONE_SUNRISE".to_string()));
        assert!(!sources.env_overrides.contains(&"ATTUNE_SAMPLE_RATE".to_string()));
        assert!(!sources.env_overrides.contains(&"HOME".to_string()));
    }
}
