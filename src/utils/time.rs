use chrono::{Days, NaiveDate, Utc};

pub fn get_current_date_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Whole days elapsed from `since` to `today`. Negative if `since` is in the future.
pub fn days_between(since: NaiveDate, today: NaiveDate) -> i64 {
    today.signed_duration_since(since).num_days()
}

/// The `days` dates ending at `today`, oldest first.
pub fn last_n_days(today: NaiveDate, days: u64) -> Vec<NaiveDate> {
    (0..days)
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .collect()
}

pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn counts_days_across_month_boundary() {
        assert_eq!(days_between(day(2024, 2, 27), day(2024, 3, 2)), 4);
        assert_eq!(days_between(day(2024, 3, 2), day(2024, 3, 2)), 0);
    }

    #[test]
    fn last_days_are_oldest_first() {
        let days = last_n_days(day(2024, 3, 2), 3);
        assert_eq!(days, vec![day(2024, 2, 29), day(2024, 3, 1), day(2024, 3, 2)]);
        assert!(last_n_days(day(2024, 3, 2), 0).is_empty());
    }

    #[test]
    fn formats_missing_dates() {
        assert_eq!(format_date(None), "N/A");
        assert_eq!(format_date(Some(day(2024, 1, 5))), "2024-01-05");
    }
}
