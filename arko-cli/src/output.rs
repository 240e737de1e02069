use std::fmt::Write;

use arko_core::{AggregatedWeather, Coordinates};
use chrono::Local;

/// Multi-line human-readable rendering of one aggregation result.
pub fn weather_report(coords: Coordinates, weather: &AggregatedWeather) -> String {
    let r = &weather.reading;
    let mut out = String::new();

    let observed = r.observed_at().with_timezone(&Local).format("%Y-%m-%d %H:%M");
    let origin = if weather.is_simulated() { " (simulated)" } else { "" };

    // Writing to a String cannot fail.
    let _ = writeln!(out, "Weather at {coords}, observed {observed}{origin}");
    let _ = writeln!(out, "  Condition:     {}", r.condition());
    let _ = writeln!(out, "  Temperature:   {:.1} °C", r.temperature_c());
    let _ = writeln!(out, "  Humidity:      {} %", r.humidity_pct());
    let _ = writeln!(out, "  Wind:          {:.1} km/h", r.wind_speed_kph());
    let _ = writeln!(out, "  Precipitation: {:.1} mm", r.precipitation_mm());
    let _ = writeln!(out, "  Pressure:      {} hPa", r.pressure_hpa());
    let _ = writeln!(out, "  Confidence:    {}/100", weather.confidence);

    let sources: Vec<String> = weather
        .sources
        .iter()
        .map(|(id, ok)| format!("{id} {}", if *ok { "✓" } else { "✗" }))
        .collect();
    let _ = writeln!(out, "  Sources:       {}", sources.join(", "));

    for warning in &weather.warnings {
        let _ = writeln!(out, "  ! {warning}");
    }

    out
}
