use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Chat identity handed to us by the transport. Stable across sessions.
pub type UserId = i64;

/// Which side of the target price fires the alert.
///
/// String representations match both the user-facing tokens and the
/// `alert_type` column in the database (`"higher"` / `"lower"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Fires when the current price is strictly greater than the target.
    Above,
    /// Fires when the current price is strictly less than the target.
    Below,
}

impl Direction {
    /// Parse a user-supplied token, case-insensitively.
    pub fn from_input(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "higher" => Some(Self::Above),
            "lower" => Some(Self::Below),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Above => "higher",
            Self::Below => "lower",
        }
    }

    /// True when `price` crossed the target on this direction's side.
    /// Equality never triggers.
    pub fn is_triggered(self, price: f64, target: f64) -> bool {
        match self {
            Self::Above => price > target,
            Self::Below => price < target,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored alert, uniquely addressed by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: i64,
    pub user_id: UserId,
    pub coin: String,
    pub target_price: f64,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub user_id: UserId,
    pub coin: String,
    pub target_price: f64,
    pub direction: Direction,
}

/// Per-user listing projection. The user id is omitted since the caller
/// already knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAlert {
    pub coin: String,
    pub target_price: f64,
    pub direction: Direction,
}

/// One row of the top-coins market listing from the price source.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinMarket {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub price_change_percentage_24h: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!(Direction::from_input("higher"), Some(Direction::Above));
        assert_eq!(Direction::from_input("Higher"), Some(Direction::Above));
        assert_eq!(Direction::from_input("LOWER"), Some(Direction::Below));
        assert_eq!(Direction::from_input("  lower "), Some(Direction::Below));
    }

    #[test]
    fn direction_rejects_unknown_tokens() {
        assert_eq!(Direction::from_input("up"), None);
        assert_eq!(Direction::from_input(""), None);
        assert_eq!(Direction::from_input("higher please"), None);
    }

    #[test]
    fn direction_round_trips_through_as_str() {
        for d in [Direction::Above, Direction::Below] {
            assert_eq!(Direction::from_input(d.as_str()), Some(d));
        }
    }

    #[test]
    fn above_triggers_strictly_above_target() {
        assert!(Direction::Above.is_triggered(101.0, 100.0));
        assert!(!Direction::Above.is_triggered(100.0, 100.0));
        assert!(!Direction::Above.is_triggered(99.0, 100.0));
    }

    #[test]
    fn below_triggers_strictly_below_target() {
        assert!(Direction::Below.is_triggered(99.0, 100.0));
        assert!(!Direction::Below.is_triggered(100.0, 100.0));
        assert!(!Direction::Below.is_triggered(101.0, 100.0));
    }

    #[test]
    fn coin_market_deserializes_with_null_fields() {
        let json = r#"{
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "current_price": 50000.0,
            "market_cap": null,
            "market_cap_rank": 1,
            "price_change_percentage_24h": -1.2
        }"#;
        let coin: CoinMarket = serde_json::from_str(json).unwrap();
        assert_eq!(coin.id, "bitcoin");
        assert_eq!(coin.current_price, Some(50000.0));
        assert_eq!(coin.market_cap, None);
        assert_eq!(coin.market_cap_rank, Some(1));
    }
}
