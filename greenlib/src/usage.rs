use crate::device::Device;
use crate::types::{Direction, Magnitude};
use jiff::civil::Date;
use std::collections::BTreeMap;

pub const DEFAULT_TIMEZONE: &str = "Asia/Seoul";

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct UsageCounter {
    // Sum of acknowledged OPEN percentages today.
    pub open: u32,
    // Sum of acknowledged CLOSE percentages today.
    pub close: u32,
}

// Per-device tally of how far adjustable devices were driven today. Counters
// belong to a single local calendar date and start over on the next one.
#[derive(Clone, Debug)]
pub struct DailyUsage {
    timezone: jiff::tz::TimeZone,
    date: Option<Date>,
    counters: BTreeMap<Device, UsageCounter>,
}

impl DailyUsage {
    pub fn new(timezone: jiff::tz::TimeZone) -> Self {
        Self {
            timezone,
            date: None,
            counters: BTreeMap::new(),
        }
    }

    // Falls back to DEFAULT_TIMEZONE if `name` is unknown.
    pub fn with_timezone_name(name: Option<&str>) -> Self {
        Self::new(resolve_timezone(name))
    }

    pub fn today(&self) -> Date {
        jiff::Timestamp::now().to_zoned(self.timezone.clone()).date()
    }

    pub fn record(&mut self, device: Device, direction: Direction, magnitude: Magnitude) {
        let today = self.today();
        self.record_on(today, device, direction, magnitude);
    }

    pub fn record_on(
        &mut self,
        date: Date,
        device: Device,
        direction: Direction,
        magnitude: Magnitude,
    ) {
        if self.date != Some(date) {
            self.counters.clear();
            self.date = Some(date);
        }
        let counter = self.counters.entry(device).or_default();
        match direction {
            Direction::Open => counter.open += u32::from(magnitude.percent()),
            Direction::Close => counter.close += u32::from(magnitude.percent()),
        }
    }

    pub fn get(&self, device: Device) -> UsageCounter {
        self.counters.get(&device).copied().unwrap_or_default()
    }

    pub fn date(&self) -> Option<Date> {
        self.date
    }

    pub fn clear(&mut self) {
        self.counters.clear();
    }
}

impl Default for DailyUsage {
    fn default() -> Self {
        Self::with_timezone_name(None)
    }
}

pub fn resolve_timezone(name: Option<&str>) -> jiff::tz::TimeZone {
    name.and_then(|tz_name| {
        jiff::tz::TimeZone::get(tz_name)
            .map_err(|err| {
                log::warn!("Invalid timezone: '{}', {}", tz_name, err);
                err
            })
            .ok()
    })
    .unwrap_or_else(|| {
        jiff::tz::TimeZone::get(DEFAULT_TIMEZONE).unwrap_or(jiff::tz::TimeZone::UTC)
    })
}
