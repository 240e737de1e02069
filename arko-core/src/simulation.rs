//! Deterministic stand-in reading used when every live source fails.
//!
//! Values follow the local monsoon calendar (wet season June through
//! November) and a diurnal curve that peaks at 14:00 local time, so the
//! dashboard keeps showing plausible weather for the hour and season.

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::model::{ConditionTag, Measurements, Reading, ReadingSource};

const PEAK_HOUR: f64 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Wet,
    Dry,
}

impl Season {
    pub fn for_month(month: u32) -> Self {
        if (6..=11).contains(&month) { Season::Wet } else { Season::Dry }
    }
}

/// 0.0 at 02:00, 1.0 at 14:00.
fn diurnal_factor(hour: u32, minute: u32) -> f64 {
    let h = f64::from(hour) + f64::from(minute) / 60.0;
    (1.0 + (2.0 * PI * (h - PEAK_HOUR) / 24.0).cos()) / 2.0
}

/// Build the simulated reading for the wall-clock time in `now`'s zone.
pub fn simulate_reading<Tz: TimeZone>(now: &DateTime<Tz>) -> Reading {
    let local = now.naive_local();
    let season = Season::for_month(local.month());
    let f = diurnal_factor(local.hour(), local.minute());

    let values = match season {
        Season::Wet => Measurements {
            temperature_c: 24.0 + 8.0 * f,
            humidity_pct: 95.0 - 15.0 * f,
            wind_speed_kph: 15.0 + 10.0 * f,
            precipitation_mm: 3.0 + 22.0 * f,
            pressure_hpa: 1008.0 - 4.0 * f,
        },
        Season::Dry => Measurements {
            temperature_c: 25.0 + 9.0 * f,
            humidity_pct: 85.0 - 20.0 * f,
            wind_speed_kph: 10.0 + 8.0 * f,
            precipitation_mm: 2.0 * f,
            pressure_hpa: 1012.0 - 3.0 * f,
        },
    };

    let condition = match season {
        Season::Wet if values.precipitation_mm >= 15.0 => ConditionTag::Stormy,
        Season::Wet if values.precipitation_mm >= 8.0 => ConditionTag::Rainy,
        Season::Wet => ConditionTag::Cloudy,
        Season::Dry if local.hour() < 7 => ConditionTag::Foggy,
        Season::Dry if f < 0.5 => ConditionTag::Clear,
        Season::Dry => ConditionTag::Cloudy,
    };

    Reading::new(values, condition, ReadingSource::Simulated, now.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn manila_time(month: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, month, 15, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn season_boundaries() {
        assert_eq!(Season::for_month(5), Season::Dry);
        assert_eq!(Season::for_month(6), Season::Wet);
        assert_eq!(Season::for_month(11), Season::Wet);
        assert_eq!(Season::for_month(12), Season::Dry);
    }

    #[test]
    fn values_stay_within_documented_ranges_all_year() {
        for month in 1..=12 {
            for hour in 0..24 {
                for minute in [0, 30] {
                    let r = simulate_reading(&manila_time(month, hour, minute));
                    let at = format!("month {month} {hour:02}:{minute:02}");

                    assert!((24.0..=34.0).contains(&r.temperature_c()), "temp at {at}");
                    assert!((65..=95).contains(&r.humidity_pct()), "humidity at {at}");
                    assert!((10.0..=25.0).contains(&r.wind_speed_kph()), "wind at {at}");
                    assert!(r.precipitation_mm() >= 0.0, "precip at {at}");
                    assert_eq!(r.source(), ReadingSource::Simulated);
                }
            }
        }
    }

    #[test]
    fn afternoon_is_warmer_than_night() {
        let night = simulate_reading(&manila_time(3, 2, 0));
        let afternoon = simulate_reading(&manila_time(3, 14, 0));

        assert!((night.temperature_c() - 25.0).abs() < 1e-9);
        assert!((afternoon.temperature_c() - 34.0).abs() < 1e-9);
    }

    #[test]
    fn wet_season_brings_more_rain() {
        let dry = simulate_reading(&manila_time(3, 15, 0));
        let wet = simulate_reading(&manila_time(8, 15, 0));

        assert!(wet.precipitation_mm() > dry.precipitation_mm());
        assert!(dry.precipitation_mm() <= 2.0);
        assert_eq!(wet.condition(), ConditionTag::Stormy);
    }

    #[test]
    fn dry_season_dawn_is_foggy() {
        assert_eq!(simulate_reading(&manila_time(2, 5, 0)).condition(), ConditionTag::Foggy);
        assert_eq!(simulate_reading(&manila_time(2, 22, 0)).condition(), ConditionTag::Clear);
        assert_eq!(simulate_reading(&manila_time(2, 13, 0)).condition(), ConditionTag::Cloudy);
    }

    #[test]
    fn same_clock_time_gives_same_values() {
        let a = simulate_reading(&manila_time(7, 10, 15));
        let b = simulate_reading(&manila_time(7, 10, 15));
        assert_eq!(a, b);
    }
}
