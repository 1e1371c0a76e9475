use parking_lot::RwLock;

use crate::model::NormalizedWeather;

/// Single-slot, in-memory holder of the most recently fetched weather.
///
/// Every successful fetch overwrites the slot (last write wins). Nothing is
/// persisted, so the slot is empty after a restart.
#[derive(Debug, Default)]
pub struct LatestWeatherCache {
    slot: RwLock<Option<NormalizedWeather>>,
}

impl LatestWeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, weather: NormalizedWeather) {
        *self.slot.write() = Some(weather);
    }

    pub fn latest(&self) -> Option<NormalizedWeather> {
        self.slot.read().clone()
    }

    pub fn clear(&self) {
        self.slot.write().take();
    }

    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CurrentConditions, Location};

    fn weather(city: &str) -> NormalizedWeather {
        NormalizedWeather {
            location: Location { city: city.into(), country: "XX".into() },
            current: CurrentConditions {
                temperature: 1.0,
                description: "mist".into(),
                wind_speed: 0.5,
                humidity: 99,
                pressure: 1001.0,
                uv: None,
            },
            forecast: vec![],
        }
    }

    #[test]
    fn starts_empty() {
        let cache = LatestWeatherCache::new();
        assert!(cache.is_empty());
        assert!(cache.latest().is_none());
    }

    #[test]
    fn last_write_wins() {
        let cache = LatestWeatherCache::new();
        cache.store(weather("Fargo"));
        cache.store(weather("Oslo"));
        assert_eq!(cache.latest().unwrap().location.city, "Oslo");
    }

    #[test]
    fn instances_are_isolated() {
        let a = LatestWeatherCache::new();
        let b = LatestWeatherCache::new();
        a.store(weather("Fargo"));
        assert!(b.is_empty());

        a.clear();
        assert!(a.is_empty());
    }
}
