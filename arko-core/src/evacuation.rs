//! Evacuation-center capacity watcher.
//!
//! Compares each new occupancy snapshot with the last significant one per
//! center and reports upward threshold crossings. A center re-arms once it
//! drops back below a threshold.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Ratio reported for centers with no usable capacity but people inside.
const MAX_RATIO: f64 = 2.0;

/// One evacuation center as the dashboard currently sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub capacity: i64,
    #[serde(alias = "currentOccupancy")]
    pub current_occupancy: i64,
    #[serde(default = "accepting_by_default", alias = "acceptingNewEvacuees")]
    pub accepting_new_evacuees: bool,
    #[serde(default, alias = "alternativeCenters")]
    pub alternative_centers: Vec<String>,
    /// Minutes.
    #[serde(default, alias = "estimatedTravelTime")]
    pub estimated_travel_time_min: Option<u32>,
}

fn accepting_by_default() -> bool {
    true
}

impl CenterSnapshot {
    /// Occupancy with negatives clamped to zero.
    pub fn occupancy(&self) -> u64 {
        self.current_occupancy.max(0) as u64
    }

    /// occupancy / capacity, clamped to [0, 2].
    pub fn occupancy_ratio(&self) -> f64 {
        ratio(self.current_occupancy, self.capacity)
    }
}

fn ratio(occupancy: i64, capacity: i64) -> f64 {
    let occupancy = occupancy.max(0) as f64;
    let capacity = capacity.max(0) as f64;

    if capacity == 0.0 {
        return if occupancy > 0.0 { MAX_RATIO } else { 0.0 };
    }
    (occupancy / capacity).min(MAX_RATIO)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// Occupancy changes smaller than this are ignored.
    pub noise_floor: u32,
    pub nearing_ratio: f64,
    pub full_ratio: f64,
    /// Most alternatives attached to a `Full` event.
    pub max_alternatives: usize,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self { noise_floor: 5, nearing_ratio: 0.8, full_ratio: 1.0, max_alternatives: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternativeCenter {
    pub id: String,
    pub name: String,
    pub occupancy_ratio: f64,
    pub estimated_travel_time_min: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapacityEvent {
    NearingCapacity {
        center_id: String,
        ratio: f64,
    },
    Full {
        center_id: String,
        ratio: f64,
        alternatives: Vec<AlternativeCenter>,
    },
}

impl CapacityEvent {
    pub fn center_id(&self) -> &str {
        match self {
            CapacityEvent::NearingCapacity { center_id, .. } | CapacityEvent::Full { center_id, .. } => {
                center_id
            }
        }
    }
}

impl std::fmt::Display for CapacityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityEvent::NearingCapacity { center_id, ratio } => {
                write!(f, "{center_id} is nearing capacity ({:.0}%)", ratio * 100.0)
            }
            CapacityEvent::Full { center_id, ratio, alternatives } => {
                write!(f, "{center_id} is full ({:.0}%)", ratio * 100.0)?;
                if !alternatives.is_empty() {
                    let names: Vec<String> = alternatives
                        .iter()
                        .map(|a| match a.estimated_travel_time_min {
                            Some(min) => format!("{} ({min} min)", a.id),
                            None => a.id.clone(),
                        })
                        .collect();
                    write!(f, "; try {}", names.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

/// Occupancy and capacity as of the last significant update.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Baseline {
    occupancy: u64,
    capacity: i64,
}

impl Baseline {
    fn of(center: &CenterSnapshot) -> Self {
        Self { occupancy: center.occupancy(), capacity: center.capacity }
    }

    fn ratio(&self) -> f64 {
        ratio(self.occupancy as i64, self.capacity)
    }
}

/// Remembers the last significant state per center.
#[derive(Debug, Default)]
pub struct CapacityWatcher {
    settings: WatcherSettings,
    previous: HashMap<String, Baseline>,
}

impl CapacityWatcher {
    pub fn new(settings: WatcherSettings) -> Self {
        Self { settings, previous: HashMap::new() }
    }

    pub fn settings(&self) -> &WatcherSettings {
        &self.settings
    }

    /// Feed the current snapshot and collect threshold crossings since the
    /// last significant change.
    pub fn update(&mut self, centers: &[CenterSnapshot]) -> Vec<CapacityEvent> {
        let mut events = Vec::new();

        for center in centers {
            let current = Baseline::of(center);

            let Some(&before) = self.previous.get(&center.id) else {
                tracing::debug!(center = %center.id, occupancy = current.occupancy, "baseline recorded");
                self.previous.insert(center.id.clone(), current);
                continue;
            };

            // a capacity change always counts, whatever the occupancy delta
            let small_move =
                current.occupancy.abs_diff(before.occupancy) < u64::from(self.settings.noise_floor);
            if small_move && current.capacity == before.capacity {
                continue;
            }
            self.previous.insert(center.id.clone(), current);

            let old_ratio = before.ratio();
            let new_ratio = current.ratio();

            if crossed(old_ratio, new_ratio, self.settings.nearing_ratio) {
                tracing::info!(center = %center.id, ratio = new_ratio, "center nearing capacity");
                events.push(CapacityEvent::NearingCapacity {
                    center_id: center.id.clone(),
                    ratio: new_ratio,
                });
            }

            if crossed(old_ratio, new_ratio, self.settings.full_ratio) {
                let alternatives = self.alternatives_for(center, centers);
                tracing::warn!(
                    center = %center.id,
                    alternatives = alternatives.len(),
                    "center at full capacity"
                );
                events.push(CapacityEvent::Full {
                    center_id: center.id.clone(),
                    ratio: new_ratio,
                    alternatives,
                });
            }
        }

        self.previous.retain(|id, _| centers.iter().any(|c| &c.id == id));
        events
    }

    fn alternatives_for(
        &self,
        center: &CenterSnapshot,
        centers: &[CenterSnapshot],
    ) -> Vec<AlternativeCenter> {
        let mut alternatives: Vec<AlternativeCenter> = center
            .alternative_centers
            .iter()
            .filter(|id| **id != center.id)
            .filter_map(|id| centers.iter().find(|c| &c.id == id))
            .filter(|c| c.accepting_new_evacuees && c.occupancy_ratio() < self.settings.full_ratio)
            .map(|c| AlternativeCenter {
                id: c.id.clone(),
                name: c.name.clone(),
                occupancy_ratio: c.occupancy_ratio(),
                estimated_travel_time_min: c.estimated_travel_time_min,
            })
            .collect();

        alternatives.sort_by(|a, b| a.occupancy_ratio.total_cmp(&b.occupancy_ratio));
        alternatives.truncate(self.settings.max_alternatives);
        alternatives
    }
}

fn crossed(old: f64, new: f64, threshold: f64) -> bool {
    old < threshold && new >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center(id: &str, capacity: i64, occupancy: i64) -> CenterSnapshot {
        CenterSnapshot {
            id: id.to_string(),
            name: format!("{id} Elementary School"),
            capacity,
            current_occupancy: occupancy,
            accepting_new_evacuees: true,
            alternative_centers: Vec::new(),
            estimated_travel_time_min: None,
        }
    }

    fn fine_grained() -> CapacityWatcher {
        CapacityWatcher::new(WatcherSettings { noise_floor: 1, ..WatcherSettings::default() })
    }

    fn nearing_count(events: &[CapacityEvent]) -> usize {
        events.iter().filter(|e| matches!(e, CapacityEvent::NearingCapacity { .. })).count()
    }

    #[test]
    fn first_sighting_is_only_a_baseline() {
        let mut watcher = CapacityWatcher::default();
        assert!(watcher.update(&[center("c", 100, 95)]).is_empty());
    }

    #[test]
    fn crossing_eighty_percent_fires_once_then_rearms() {
        let mut watcher = fine_grained();
        watcher.update(&[center("c", 100, 79)]);

        let events = watcher.update(&[center("c", 100, 81)]);
        assert_eq!(events.len(), 1);
        assert_eq!(nearing_count(&events), 1);
        assert_eq!(events[0].center_id(), "c");

        assert!(watcher.update(&[center("c", 100, 85)]).is_empty());
        assert!(watcher.update(&[center("c", 100, 70)]).is_empty());

        let events = watcher.update(&[center("c", 100, 81)]);
        assert_eq!(nearing_count(&events), 1);
    }

    #[test]
    fn small_deltas_never_fire() {
        let mut watcher = CapacityWatcher::default();
        watcher.update(&[center("c", 100, 78)]);

        assert!(watcher.update(&[center("c", 100, 81)]).is_empty());
        assert!(watcher.update(&[center("c", 100, 78)]).is_empty());
    }

    #[test]
    fn default_floor_absorbs_a_two_person_move() {
        let mut watcher = CapacityWatcher::default();
        watcher.update(&[center("c", 100, 79)]);
        assert!(watcher.update(&[center("c", 100, 81)]).is_empty());
    }

    #[test]
    fn slow_drift_accumulates_against_last_significant_value() {
        let mut watcher = CapacityWatcher::default();
        watcher.update(&[center("c", 100, 77)]);

        assert!(watcher.update(&[center("c", 100, 80)]).is_empty());
        let events = watcher.update(&[center("c", 100, 83)]);
        assert_eq!(nearing_count(&events), 1);
    }

    #[test]
    fn capacity_drop_crosses_nearing_threshold() {
        let mut watcher = CapacityWatcher::default();
        watcher.update(&[center("c", 100, 45)]);

        // same people, half the beds: 45% -> 90%
        let events = watcher.update(&[center("c", 50, 45)]);
        assert_eq!(events.len(), 1);
        assert_eq!(nearing_count(&events), 1);

        // 90% -> 100% is under the noise floor in people
        assert!(watcher.update(&[center("c", 50, 48)]).is_empty());
        let events = watcher.update(&[center("c", 50, 50)]);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CapacityEvent::Full { .. }));
    }

    #[test]
    fn capacity_increase_rearms_without_events() {
        let mut watcher = CapacityWatcher::default();
        watcher.update(&[center("c", 100, 90)]);

        assert!(watcher.update(&[center("c", 200, 90)]).is_empty());
        let events = watcher.update(&[center("c", 100, 90)]);
        assert_eq!(nearing_count(&events), 1);
    }

    #[test]
    fn full_event_lists_ranked_alternatives() {
        let mut watcher = CapacityWatcher::default();

        let mut main = center("main", 100, 90);
        main.alternative_centers =
            vec!["gym".into(), "chapel".into(), "closed".into(), "packed".into(), "missing".into()];

        let mut gym = center("gym", 200, 120);
        gym.estimated_travel_time_min = Some(12);
        let chapel = center("chapel", 50, 10);
        let mut closed = center("closed", 100, 0);
        closed.accepting_new_evacuees = false;
        let packed = center("packed", 40, 40);

        let others = [gym, chapel, closed, packed];
        let mut snapshot = vec![main.clone()];
        snapshot.extend(others.iter().cloned());
        watcher.update(&snapshot);

        main.current_occupancy = 100;
        let mut snapshot = vec![main];
        snapshot.extend(others.iter().cloned());
        let events = watcher.update(&snapshot);

        assert_eq!(events.len(), 1);
        match &events[0] {
            CapacityEvent::Full { center_id, alternatives, .. } => {
                assert_eq!(center_id, "main");
                let ids: Vec<&str> = alternatives.iter().map(|a| a.id.as_str()).collect();
                assert_eq!(ids, vec!["chapel", "gym"]);
                assert_eq!(alternatives[1].estimated_travel_time_min, Some(12));
            }
            other => panic!("expected full event, got {other:?}"),
        }
    }

    #[test]
    fn alternatives_are_capped() {
        let mut watcher = CapacityWatcher::new(WatcherSettings {
            max_alternatives: 1,
            ..WatcherSettings::default()
        });

        let mut main = center("main", 10, 0);
        main.alternative_centers = vec!["a".into(), "b".into()];
        let a = center("a", 100, 50);
        let b = center("b", 100, 10);

        watcher.update(&[main.clone(), a.clone(), b.clone()]);
        main.current_occupancy = 10;
        let events = watcher.update(&[main, a, b]);

        // 0% -> 100% in one step crosses both thresholds
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CapacityEvent::NearingCapacity { .. }));
        match &events[1] {
            CapacityEvent::Full { alternatives, .. } => {
                assert_eq!(alternatives.len(), 1);
                assert_eq!(alternatives[0].id, "b");
            }
            other => panic!("expected full event, got {other:?}"),
        }
    }

    #[test]
    fn malformed_numbers_are_clamped() {
        assert_eq!(center("c", -10, 5).occupancy_ratio(), MAX_RATIO);
        assert_eq!(center("c", 0, 0).occupancy_ratio(), 0.0);
        assert_eq!(center("c", 10, -3).occupancy_ratio(), 0.0);
        assert_eq!(center("c", 10, 10_000).occupancy_ratio(), MAX_RATIO);
        assert_eq!(center("c", 10, -3).occupancy(), 0);
    }

    #[test]
    fn forgotten_centers_start_over() {
        let mut watcher = fine_grained();
        watcher.update(&[center("c", 100, 70)]);
        watcher.update(&[]);

        // back with no memory, so this is a new baseline
        assert!(watcher.update(&[center("c", 100, 90)]).is_empty());
    }

    #[test]
    fn parses_dashboard_snapshot_json() {
        let centers: Vec<CenterSnapshot> = serde_json::from_value(serde_json::json!([
            {
                "id": "brgy-hall",
                "name": "Barangay Hall",
                "capacity": 150,
                "currentOccupancy": 120,
                "acceptingNewEvacuees": true,
                "alternativeCenters": ["school"],
                "estimatedTravelTime": 8
            },
            { "id": "school", "capacity": 300, "current_occupancy": 40 }
        ]))
        .expect("snapshot parses");

        assert_eq!(centers[0].current_occupancy, 120);
        assert_eq!(centers[0].estimated_travel_time_min, Some(8));
        assert!(centers[1].accepting_new_evacuees);
        assert!(centers[1].alternative_centers.is_empty());
    }

    #[test]
    fn events_render_for_toasts() {
        let event = CapacityEvent::Full {
            center_id: "main".into(),
            ratio: 1.0,
            alternatives: vec![AlternativeCenter {
                id: "gym".into(),
                name: "Gym".into(),
                occupancy_ratio: 0.4,
                estimated_travel_time_min: Some(12),
            }],
        };
        assert_eq!(event.to_string(), "main is full (100%); try gym (12 min)");
    }
}
