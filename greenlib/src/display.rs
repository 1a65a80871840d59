use crate::reconcile::{ControlView, DeviceView};
use crate::types::{DeviceState, DeviceStates, OperationMode, SensorSnapshot};
use crate::usage::DailyUsage;
use std::fmt::Write;

// Temperature conversion.
fn c_to_f(c: f32) -> f32 {
    c * 1.8 + 32.0
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

pub fn format_device_states(states: &DeviceStates) -> String {
    let mut out = String::new();
    for (device, state) in states.iter() {
        let _ = match state {
            DeviceState::Adjustable(s) => writeln!(
                out,
                "{:<8} {:<6} {}",
                device.name(),
                s.direction()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "OFF".to_string()),
                s.magnitude()
            ),
            DeviceState::Toggle(on) => writeln!(out, "{:<8} {}", device.name(), on_off(on)),
        };
    }
    out
}

pub fn print_device_states(states: &DeviceStates) {
    print!("{}", format_device_states(states));
}

// One line per device: pending selection, lock markers, server state, and
// today's usage for adjustable devices.
pub fn format_views(views: &[DeviceView], mode: OperationMode, usage: &DailyUsage) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Mode: {mode}{}",
        if views.first().is_some_and(|v| v.writes_disabled) {
            " (manual control disabled)"
        } else {
            ""
        }
    );
    for v in views {
        let marker = if v.dirty { "*" } else { " " };
        let _ = match v.control {
            ControlView::Adjustable(a) => {
                let counter = usage.get(v.device);
                writeln!(
                    out,
                    "{marker} {:<8} open {:>4}{} close {:>4}{}  now {:<5} {:>4}  today +{}%/-{}%",
                    v.device.name(),
                    a.open.to_string(),
                    if a.open_disabled { "x" } else { " " },
                    a.close.to_string(),
                    if a.close_disabled { "x" } else { " " },
                    a.current
                        .direction()
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "OFF".to_string()),
                    a.current.magnitude().to_string(),
                    counter.open,
                    counter.close
                )
            }
            ControlView::Toggle(t) => writeln!(
                out,
                "{marker} {:<8} {:<3}  now {}",
                v.device.name(),
                on_off(t.on),
                on_off(t.current)
            ),
        };
    }
    out
}

pub fn print_views(views: &[DeviceView], mode: OperationMode, usage: &DailyUsage) {
    print!("{}", format_views(views, mode, usage));
}

pub fn format_sensor_snapshot(snapshot: &SensorSnapshot) -> String {
    let c = &snapshot.current;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Temp:   {:.1}C/{:.1}F",
        c.temperature,
        c_to_f(c.temperature)
    );
    let _ = writeln!(out, "Humid:  {:.1}%", c.humidity);
    let _ = writeln!(out, "CO2:    {:.0}ppm", c.co2);
    let _ = writeln!(out, "Rain:   {}", if c.rain { "yes" } else { "no" });
    let _ = writeln!(out, "Solar:  {:.1}W/m²", c.solar_radiation);
    for (metric, points) in &snapshot.history {
        match (points.first(), points.last()) {
            (Some(first), Some(last)) => {
                let _ = writeln!(
                    out,
                    "History {metric}: {} points, {} .. {}",
                    points.len(),
                    first.time,
                    last.time
                );
            }
            _ => {
                let _ = writeln!(out, "History {metric}: empty");
            }
        }
    }
    out
}

pub fn print_sensor_snapshot(snapshot: &SensorSnapshot) {
    print!("{}", format_sensor_snapshot(snapshot));
}

#[cfg(test)]
mod format {
    use super::*;
    use crate::device::Device;
    use crate::reconcile;
    use crate::types::{AdjustableState, Direction, Magnitude};

    #[test]
    fn device_states() {
        let mut states = DeviceStates::all_off();
        states
            .set(
                Device::Skylight1,
                DeviceState::Adjustable(AdjustableState::new(Direction::Open, Magnitude::P60)),
            )
            .unwrap();
        states
            .set(Device::Blower, DeviceState::Toggle(true))
            .unwrap();
        let text = format_device_states(&states);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines[0].starts_with("천창1"));
        assert!(lines[0].contains("OPEN"));
        assert!(lines[0].ends_with("60%"));
        assert!(lines[7].ends_with("ON"));
    }

    #[test]
    fn views_mark_locks_and_mode() {
        let mut pending = DeviceStates::all_off();
        pending
            .set(
                Device::Shade1,
                DeviceState::Adjustable(AdjustableState::new(Direction::Close, Magnitude::P20)),
            )
            .unwrap();
        let server = DeviceStates::all_off();
        let views = reconcile::views(&pending, &server, OperationMode::Auto);
        let text = format_views(&views, OperationMode::Auto, &DailyUsage::default());
        assert!(text.starts_with("Mode: AUTO (manual control disabled)"));
        let shade = text.lines().find(|l| l.contains("차광1")).unwrap();
        assert!(shade.starts_with('*'));
        assert!(shade.contains("OFFx"));
    }

    #[test]
    fn sensors() {
        let snap = crate::fake::demo_sensor_snapshot(jiff::Timestamp::UNIX_EPOCH);
        let text = format_sensor_snapshot(&snap);
        assert!(text.contains("Temp:   24.5C/76.1F"));
        assert!(text.contains("History co2: 24 points"));
    }
}
