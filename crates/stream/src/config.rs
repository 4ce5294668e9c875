use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the streaming world and its workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Edge length N of the slot table, in cells.
    pub edge: usize,
    /// Worker count for the initial population pass.
    pub init_workers: usize,
    /// Pause between continuous generation passes, in milliseconds.
    pub generation_interval_ms: u64,
    /// Pause between exhaustive, near-field and raycast passes, in milliseconds.
    pub remesh_interval_ms: u64,
    /// Minimum period of an instant re-derivation pass, in milliseconds.
    pub instant_min_period_ms: u64,
    /// The near-field pass covers `edge / near_field_divisor` cells either
    /// side of the observer.
    pub near_field_divisor: usize,
    /// Ray directions are taken from the integer grid `[-ray_grid, ray_grid)^3`.
    pub ray_grid: usize,
    /// Ray length, in elements.
    pub ray_max_distance: f64,
    /// Eye offset above the observer position, in elements.
    pub eye_height: f64,
    /// Rewrite every generated cell on eviction and shutdown, not only cells
    /// modified since they were last loaded or saved.
    pub persist_clean_cells: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let edge = 12;
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            edge,
            init_workers: parallelism.min(edge),
            generation_interval_ms: 80,
            remesh_interval_ms: 80,
            instant_min_period_ms: 100,
            near_field_divisor: 6,
            ray_grid: edge,
            ray_max_distance: 1000.0,
            eye_height: 1.6,
            persist_clean_cells: false,
        }
    }
}

impl StreamConfig {
    /// Config for a table of edge `edge`, other fields at their defaults.
    pub fn with_edge(edge: usize) -> Self {
        Self {
            edge,
            ray_grid: edge,
            ..Self::default()
        }
        .normalized()
    }

    /// Clamp fields into their usable ranges.
    pub fn normalized(mut self) -> Self {
        if self.edge == 0 {
            tracing::warn!("table edge of 0 raised to 1");
            self.edge = 1;
        }
        self.init_workers = self.init_workers.clamp(1, self.edge);
        self.near_field_divisor = self.near_field_divisor.max(1);
        if !self.ray_max_distance.is_finite() || self.ray_max_distance < 0.0 {
            self.ray_max_distance = 0.0;
        }
        self
    }

    pub fn generation_interval(&self) -> Duration {
        Duration::from_millis(self.generation_interval_ms)
    }

    pub fn remesh_interval(&self) -> Duration {
        Duration::from_millis(self.remesh_interval_ms)
    }

    pub fn instant_min_period(&self) -> Duration {
        Duration::from_millis(self.instant_min_period_ms)
    }

    /// Cells covered by the near-field pass on each side of the observer.
    pub fn near_field_radius(&self) -> i64 {
        (self.edge / self.near_field_divisor) as i64
    }

    /// Total slot count, N³.
    pub fn volume(&self) -> usize {
        self.edge * self.edge * self.edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.edge, 12);
        assert!(config.init_workers >= 1 && config.init_workers <= 12);
        assert_eq!(config.remesh_interval(), Duration::from_millis(80));
        assert_eq!(config.instant_min_period(), Duration::from_millis(100));
        assert_eq!(config.near_field_radius(), 2);
        assert_eq!(config.volume(), 1728);
        assert!(!config.persist_clean_cells);
    }

    #[test]
    fn normalized_clamps() {
        let config = StreamConfig {
            edge: 0,
            init_workers: 64,
            near_field_divisor: 0,
            ray_max_distance: f64::NAN,
            ..StreamConfig::default()
        }
        .normalized();
        assert_eq!(config.edge, 1);
        assert_eq!(config.init_workers, 1);
        assert_eq!(config.near_field_divisor, 1);
        assert_eq!(config.ray_max_distance, 0.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: StreamConfig = serde_json::from_str(r#"{ "edge": 5 }"#).unwrap();
        assert_eq!(config.edge, 5);
        assert_eq!(config.generation_interval_ms, 80);
    }
}
