//! Buffalo room table

use account_service::Balance;
use serde::{Deserialize, Serialize};

/// Stake level of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomLevel {
    Low,
    Medium,
    High,
    #[serde(rename = "VIP")]
    Vip,
}

/// A Buffalo room and its minimum bet in whole units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoomConfig {
    pub id: u8,
    pub min_bet: i64,
    pub name: &'static str,
    pub level: RoomLevel,
}

impl RoomConfig {
    pub fn min_balance(&self) -> Balance {
        Balance::from_units(self.min_bet)
    }

    pub fn admits(&self, balance: Balance) -> bool {
        balance >= self.min_balance()
    }
}

const ROOMS: [RoomConfig; 4] = [
    RoomConfig { id: 1, min_bet: 50, name: "50 Room", level: RoomLevel::Low },
    RoomConfig { id: 2, min_bet: 500, name: "500 Room", level: RoomLevel::Medium },
    RoomConfig { id: 3, min_bet: 5000, name: "5000 Room", level: RoomLevel::High },
    RoomConfig { id: 4, min_bet: 10000, name: "10000 Room", level: RoomLevel::Vip },
];

/// Room used when a launch request names none
pub const DEFAULT_ROOM: u8 = 1;

pub fn all() -> &'static [RoomConfig] {
    &ROOMS
}

pub fn get(room_id: u8) -> Option<&'static RoomConfig> {
    ROOMS.iter().find(|room| room.id == room_id)
}

/// Rooms whose minimum bet the balance covers
pub fn available_for(balance: Balance) -> Vec<RoomConfig> {
    ROOMS.iter().filter(|room| room.admits(balance)).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_table() {
        let ids: Vec<u8> = all().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(get(3).unwrap().min_bet, 5000);
        assert_eq!(get(4).unwrap().level, RoomLevel::Vip);
        assert!(get(0).is_none());
        assert!(get(5).is_none());
    }

    #[test]
    fn test_available_for_balance() {
        assert!(available_for(Balance::from_units(49)).is_empty());
        assert_eq!(available_for(Balance::from_units(50)).len(), 1);
        assert_eq!(available_for(Balance::from_units(4999)).len(), 2);
        assert_eq!(available_for(Balance::from_units(10000)).len(), 4);
        // Fractions below the threshold do not count
        assert_eq!(available_for(Balance::from_cents(49_99)).len(), 0);
    }

    #[test]
    fn test_level_serialization() {
        assert_eq!(serde_json::to_string(&RoomLevel::Vip).unwrap(), "\"VIP\"");
        assert_eq!(serde_json::to_string(&RoomLevel::Low).unwrap(), "\"Low\"");
    }
}
