use anyhow::Result;

pub const MIN_TIMEOUT_MINUTES: i64 = 5;
pub const MAX_TIMEOUT_MINUTES: i64 = 60;
pub const MAX_PICK: usize = 10;

/// Parses `N`, `Nm` or `Nh` into minutes, clamped to the allowed timeout window.
pub fn parse_timeout_minutes(duration: &str) -> Result<i64> {
    let duration = duration.trim().to_lowercase();

    let (digits, multiplier) = if let Some(hours) = duration.strip_suffix('h') {
        (hours, 60)
    } else if let Some(minutes) = duration.strip_suffix('m') {
        (minutes, 1)
    } else {
        (duration.as_str(), 1)
    };

    let value = digits.parse::<i64>().map_err(|_| {
        anyhow::anyhow!("Invalid duration `{}`. Use minutes like `10m` or hours like `1h`", duration)
    })?;
    if value <= 0 {
        return Err(anyhow::anyhow!("Duration must be positive"));
    }

    Ok(value
        .saturating_mul(multiplier)
        .clamp(MIN_TIMEOUT_MINUTES, MAX_TIMEOUT_MINUTES))
}

pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(anyhow::anyhow!("Prefix cannot be empty"));
    }

    if prefix.chars().count() > 3 {
        return Err(anyhow::anyhow!("Prefix must be 3 characters or less"));
    }

    if prefix.chars().any(char::is_whitespace) {
        return Err(anyhow::anyhow!("Prefix cannot contain spaces"));
    }

    Ok(())
}

pub fn validate_server_name(name: &str) -> Result<()> {
    let length = name.trim().chars().count();
    if length < 2 {
        return Err(anyhow::anyhow!("Server name must be at least 2 characters"));
    }

    if length > 100 {
        return Err(anyhow::anyhow!("Server name must be 100 characters or less"));
    }

    Ok(())
}

/// Only top 5 and top 10 boards exist; anything else falls back to 10.
pub fn normalize_leaderboard_size(size: Option<u32>) -> i64 {
    match size {
        Some(5) => 5,
        _ => 10,
    }
}

pub fn clamp_pick_amount(amount: Option<usize>) -> usize {
    amount.unwrap_or(1).clamp(1, MAX_PICK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timeout_units() {
        assert_eq!(parse_timeout_minutes("10m").unwrap(), 10);
        assert_eq!(parse_timeout_minutes("15").unwrap(), 15);
        assert_eq!(parse_timeout_minutes("1H").unwrap(), 60);
    }

    #[test]
    fn clamps_timeout_window() {
        assert_eq!(parse_timeout_minutes("1m").unwrap(), 5);
        assert_eq!(parse_timeout_minutes("3h").unwrap(), 60);
    }

    #[test]
    fn rejects_malformed_timeouts() {
        assert!(parse_timeout_minutes("soon").is_err());
        assert!(parse_timeout_minutes("m").is_err());
        assert!(parse_timeout_minutes("-5m").is_err());
        assert!(parse_timeout_minutes("0").is_err());
    }

    #[test]
    fn validates_prefixes() {
        assert!(validate_prefix("!").is_ok());
        assert!(validate_prefix("pn.").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("long").is_err());
        assert!(validate_prefix("a b").is_err());
    }

    #[test]
    fn validates_server_names() {
        assert!(validate_server_name("Gateway").is_ok());
        assert!(validate_server_name("x").is_err());
        assert!(validate_server_name(&"n".repeat(101)).is_err());
    }

    #[test]
    fn normalizes_board_and_pick_sizes() {
        assert_eq!(normalize_leaderboard_size(Some(5)), 5);
        assert_eq!(normalize_leaderboard_size(Some(7)), 10);
        assert_eq!(normalize_leaderboard_size(None), 10);
        assert_eq!(clamp_pick_amount(None), 1);
        assert_eq!(clamp_pick_amount(Some(0)), 1);
        assert_eq!(clamp_pick_amount(Some(50)), 10);
    }
}
