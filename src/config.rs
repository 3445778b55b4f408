use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub legacy_data_file: PathBuf,
    pub owner_id: u64,
    pub network_name: String,
    pub main_hub_id: Option<u64>,
    pub main_hub_name: String,
    pub hub_invite: Option<String>,
    pub hub_ann_channel_id: Option<u64>,
    pub default_prefix: String,
    pub streak_threshold: i64,
    pub inactivity_days: i64,
    pub inactivity_sweep_hours: u64,
    pub dashboard_refresh_hours: u64,
    pub presence_refresh_minutes: u64,
    pub broadcast_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests don't have to touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .ok_or_else(|| anyhow::anyhow!("DISCORD_TOKEN environment variable is required"))?;

        let owner_id = lookup("OWNER_ID")
            .ok_or_else(|| anyhow::anyhow!("OWNER_ID environment variable is required"))?
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("OWNER_ID must be a numeric user id"))?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:loyalty.db".to_string());

        let legacy_data_file = lookup("LEGACY_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("loyalty_data.json"));

        let network_name = lookup("NETWORK_NAME").unwrap_or_else(|| "Loyalty Network".to_string());
        let main_hub_name = lookup("MAIN_HUB_NAME").unwrap_or_else(|| "Main Hub".to_string());
        let hub_invite = lookup("HUB_INVITE").filter(|invite| !invite.trim().is_empty());
        let default_prefix = lookup("DEFAULT_PREFIX").unwrap_or_else(|| "$".to_string());

        let config = Config {
            discord_token,
            database_url,
            legacy_data_file,
            owner_id,
            network_name,
            main_hub_id: parse_optional(&lookup, "MAIN_HUB_ID")?,
            main_hub_name,
            hub_invite,
            hub_ann_channel_id: parse_optional(&lookup, "HUB_ANN_CHANNEL_ID")?,
            default_prefix,
            streak_threshold: parse_or(&lookup, "STREAK_THRESHOLD", 100)?,
            inactivity_days: parse_or(&lookup, "INACTIVITY_DAYS", 7)?,
            inactivity_sweep_hours: parse_or(&lookup, "INACTIVITY_SWEEP_HOURS", 24)?,
            dashboard_refresh_hours: parse_or(&lookup, "DASHBOARD_REFRESH_HOURS", 4)?,
            presence_refresh_minutes: parse_or(&lookup, "PRESENCE_REFRESH_MINUTES", 5)?,
            broadcast_delay_ms: parse_or(&lookup, "BROADCAST_DELAY_MS", 1000)?,
        };

        for (key, value) in [
            ("STREAK_THRESHOLD", config.streak_threshold),
            ("INACTIVITY_DAYS", config.inactivity_days),
            ("INACTIVITY_SWEEP_HOURS", config.inactivity_sweep_hours as i64),
            ("DASHBOARD_REFRESH_HOURS", config.dashboard_refresh_hours as i64),
            ("PRESENCE_REFRESH_MINUTES", config.presence_refresh_minutes as i64),
        ] {
            if value <= 0 {
                anyhow::bail!("{} must be greater than zero", key);
            }
        }

        Ok(config)
    }

    pub fn is_hub(&self, guild_id: u64) -> bool {
        self.main_hub_id == Some(guild_id)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_optional<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn applies_defaults() {
        let config =
            Config::from_lookup(lookup_from(&[("DISCORD_TOKEN", "t"), ("OWNER_ID", "42")])).unwrap();

        assert_eq!(config.owner_id, 42);
        assert_eq!(config.database_url, "sqlite:loyalty.db");
        assert_eq!(config.default_prefix, "$");
        assert_eq!(config.streak_threshold, 100);
        assert_eq!(config.inactivity_days, 7);
        assert_eq!(config.inactivity_sweep_hours, 24);
        assert_eq!(config.broadcast_delay_ms, 1000);
        assert_eq!(config.main_hub_id, None);
        assert!(config.hub_invite.is_none());
    }

    #[test]
    fn requires_token_and_owner() {
        assert!(Config::from_lookup(lookup_from(&[("OWNER_ID", "42")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("DISCORD_TOKEN", "t")])).is_err());
        assert!(
            Config::from_lookup(lookup_from(&[("DISCORD_TOKEN", "t"), ("OWNER_ID", "abc")]))
                .is_err()
        );
    }

    #[test]
    fn rejects_invalid_numbers() {
        let result = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "t"),
            ("OWNER_ID", "42"),
            ("STREAK_THRESHOLD", "lots"),
        ]));
        assert!(result.is_err());

        let zero_interval = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "t"),
            ("OWNER_ID", "42"),
            ("INACTIVITY_SWEEP_HOURS", "0"),
        ]));
        assert!(zero_interval.is_err());
    }

    #[test]
    fn reads_hub_settings() {
        let config = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "t"),
            ("OWNER_ID", "42"),
            ("MAIN_HUB_ID", "1000"),
            ("HUB_INVITE", "https://discord.gg/abc"),
            ("INACTIVITY_DAYS", "3"),
        ]))
        .unwrap();

        assert!(config.is_hub(1000));
        assert!(!config.is_hub(1001));
        assert_eq!(config.hub_invite.as_deref(), Some("https://discord.gg/abc"));
        assert_eq!(config.inactivity_days, 3);
    }
}
