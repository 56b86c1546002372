//! 每日配额判断

use rand::Rng;

use crate::config::Config;
use crate::models::DailyCounterRecord;

/// 今天是否还允许继续请求（以配置的硬上限为准）
pub fn check_limit(config: &Config, today: &DailyCounterRecord) -> bool {
    today.total_requests < config.max_daily_requests
}

/// 本次运行的有效上限：`max - random(0..=jitter_bound)`
///
/// 每次运行只抽一次，不落盘，只用于决定本次发多少请求
pub fn effective_ceiling<R: Rng + ?Sized>(max: u64, jitter_bound: u64, rng: &mut R) -> u64 {
    let jitter = if jitter_bound == 0 {
        0
    } else {
        rng.random_range(0..=jitter_bound)
    };
    max.saturating_sub(jitter)
}

/// 本次运行剩余的迭代次数
pub fn remaining_iterations(effective_ceiling: u64, today_total: u64) -> u64 {
    effective_ceiling.saturating_sub(today_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn config(max: u64) -> Config {
        Config::from_json_str(&format!(
            r#"{{"apiUrl": "http://localhost", "maxDailyRequests": {}, "receiveEMailList": ["a@b.cn"]}}"#,
            max
        ))
        .unwrap()
    }

    #[rstest]
    #[case(0, true)]
    #[case(2, true)]
    #[case(3, false)]
    #[case(7, false)]
    fn gate_uses_hard_ceiling(#[case] total: u64, #[case] allowed: bool) {
        let mut record = DailyCounterRecord::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        record.total_requests = total;
        assert_eq!(check_limit(&config(3), &record), allowed);
    }

    #[test]
    fn ceiling_stays_within_jitter_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let ceiling = effective_ceiling(20, 5, &mut rng);
            assert!((15..=20).contains(&ceiling));
        }
    }

    #[test]
    fn zero_jitter_keeps_max() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(effective_ceiling(3, 0, &mut rng), 3);
    }

    #[test]
    fn jitter_larger_than_max_saturates() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert!(effective_ceiling(2, 50, &mut rng) <= 2);
        }
    }

    #[rstest]
    #[case(3, 0, 3)]
    #[case(3, 3, 0)]
    #[case(2, 5, 0)]
    fn remaining(#[case] ceiling: u64, #[case] total: u64, #[case] expected: u64) {
        assert_eq!(remaining_iterations(ceiling, total), expected);
    }
}
