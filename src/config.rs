use envconfig::Envconfig;
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BOT_TOKEN")]
    pub bot_token: String,
    #[envconfig(from = "CONFIG_FILE")]
    pub config_file: String,
    #[envconfig(from = "DATABASE_URL")]
    pub database_url: String,
    #[envconfig(from = "ADMIN_TOKEN")]
    pub admin_token: String,
}

static CONFIG: OnceLock<Config> = OnceLock::new();
pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| Config::init_from_env().unwrap())
}

/// Channel-facing settings, kept in a JSON file (CONFIG_FILE) so they can be
/// edited without touching the environment.
#[derive(Deserialize, Debug)]
pub struct Settings {
    /// Chat receiving the published polls.
    pub channel_id: i64,
    /// Duration applied to a /tirage poll when the operator skips the step.
    #[serde(default = "default_duration_min")]
    pub default_duration_min: u64,
}

fn default_duration_min() -> u64 {
    60
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();
pub fn settings() -> &'static Settings {
    SETTINGS.get_or_init(|| {
        let raw = std::fs::read_to_string(&config().config_file).unwrap();
        serde_json::from_str(&raw).unwrap()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_fill_in_default_duration() {
        let settings: Settings = serde_json::from_str(r#"{ "channel_id": -1009876 }"#).unwrap();
        assert_eq!(settings.channel_id, -1009876);
        assert_eq!(settings.default_duration_min, 60);
    }

    #[test]
    fn settings_keep_explicit_duration() {
        let settings: Settings =
            serde_json::from_str(r#"{ "channel_id": 12, "default_duration_min": 15 }"#).unwrap();
        assert_eq!(settings.default_duration_min, 15);
    }
}
