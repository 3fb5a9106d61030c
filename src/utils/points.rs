/// 1 USDT = 1 point, 1 ETH = 10^9 points. Points are the only stored unit.
pub const POINTS_PER_ETH: i64 = 1_000_000_000;

pub fn eth_to_points(eth: f64) -> i64 {
    (eth * POINTS_PER_ETH as f64).round() as i64
}

pub fn points_to_eth(points: i64) -> f64 {
    points as f64 / POINTS_PER_ETH as f64
}

/// Whether a prize label denominates an ETH reward ("0.01 ETH" style).
pub fn is_eth_label(label: &str) -> bool {
    label.to_ascii_uppercase().contains("ETH")
}

/// Parses a stored prize value into points.
///
/// Values written after the points migration are plain digit strings.
/// Older rows may still carry "X.Y ETH" or "N USDT" labels; anything else is
/// unparseable and the caller skips the row.
pub fn parse_prize_value(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse::<i64>().ok();
    }

    let upper = trimmed.to_ascii_uppercase();
    if let Some(amount) = upper.strip_suffix("ETH") {
        return amount.trim().parse::<f64>().ok().map(eth_to_points);
    }
    if let Some(amount) = upper.strip_suffix("USDT") {
        return amount.trim().parse::<f64>().ok().map(|v| v.round() as i64);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_points() {
        assert_eq!(parse_prize_value("100"), Some(100));
        assert_eq!(parse_prize_value("  5000000 "), Some(5_000_000));
    }

    #[test]
    fn parses_eth_labels() {
        assert_eq!(parse_prize_value("0.01 ETH"), Some(10_000_000));
        assert_eq!(parse_prize_value("1 eth"), Some(POINTS_PER_ETH));
        assert_eq!(parse_prize_value("0.005 ETH"), Some(5_000_000));
    }

    #[test]
    fn parses_usdt_labels() {
        assert_eq!(parse_prize_value("100 USDT"), Some(100));
        assert_eq!(parse_prize_value("7 usdt"), Some(7));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_prize_value(""), None);
        assert_eq!(parse_prize_value("free spins"), None);
        assert_eq!(parse_prize_value("1.5"), None);
    }

    #[test]
    fn eth_label_detection() {
        assert!(is_eth_label("0.01 ETH"));
        assert!(is_eth_label("0.01 eth"));
        assert!(!is_eth_label("100 USDT"));
    }

    #[test]
    fn round_trips_eth_points() {
        assert_eq!(eth_to_points(0.01), 10_000_000);
        assert_eq!(points_to_eth(10_000_000), 0.01);
    }
}
