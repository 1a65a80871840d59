use crate::device::{Device, DeviceKind};
use anyhow::anyhow;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

// How far an adjustable device should move. The control service only accepts
// these six levels.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Magnitude {
    #[default]
    Off,
    P20,
    P40,
    P60,
    P80,
    P100,
}

impl Magnitude {
    pub const LEVELS: [Magnitude; 6] = [
        Magnitude::Off,
        Magnitude::P20,
        Magnitude::P40,
        Magnitude::P60,
        Magnitude::P80,
        Magnitude::P100,
    ];

    pub fn percent(self) -> u8 {
        match self {
            Magnitude::Off => 0,
            Magnitude::P20 => 20,
            Magnitude::P40 => 40,
            Magnitude::P60 => 60,
            Magnitude::P80 => 80,
            Magnitude::P100 => 100,
        }
    }

    pub fn from_percent(percent: u8) -> Option<Self> {
        Magnitude::LEVELS
            .into_iter()
            .find(|m| m.percent() == percent)
    }

    pub fn is_off(self) -> bool {
        self == Magnitude::Off
    }
}

impl fmt::Display for Magnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Magnitude::Off => write!(f, "OFF"),
            m => write!(f, "{}%", m.percent()),
        }
    }
}

// Accepts "OFF", "60%", "60" and the float formatting the control service
// uses for stored values ("60.0%").
impl FromStr for Magnitude {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("off") {
            return Ok(Magnitude::Off);
        }
        let number = s.strip_suffix('%').unwrap_or(s).trim();
        let value: f64 = number
            .parse()
            .map_err(|_| anyhow!("Invalid percentage '{s}'"))?;
        if !value.is_finite() || value.fract() != 0.0 || !(0.0..=100.0).contains(&value) {
            return Err(anyhow!("Invalid percentage '{s}'"));
        }
        Magnitude::from_percent(value as u8)
            .ok_or_else(|| anyhow!("Percentage must be a multiple of 20, got '{s}'"))
    }
}

impl TryFrom<String> for Magnitude {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Magnitude> for String {
    fn from(m: Magnitude) -> String {
        m.to_string()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Direction {
    Open,
    Close,
}

impl Direction {
    pub fn other(self) -> Direction {
        match self {
            Direction::Open => Direction::Close,
            Direction::Close => Direction::Open,
        }
    }

    pub fn action(self) -> Action {
        match self {
            Direction::Open => Action::Open,
            Direction::Close => Action::Close,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Open => write!(f, "OPEN"),
            Direction::Close => write!(f, "CLOSE"),
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Direction::Open),
            "close" => Ok(Direction::Close),
            _ => Err(anyhow!("Invalid direction '{s}'")),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Direction> for String {
    fn from(d: Direction) -> String {
        d.to_string()
    }
}

// State of an adjustable device. The direction is present exactly when the
// magnitude is not OFF; the constructor enforces this.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "RawAdjustableState", into = "RawAdjustableState")]
pub struct AdjustableState {
    magnitude: Magnitude,
    direction: Option<Direction>,
}

impl AdjustableState {
    pub const OFF: AdjustableState = AdjustableState {
        magnitude: Magnitude::Off,
        direction: None,
    };

    pub fn new(direction: Direction, magnitude: Magnitude) -> Self {
        if magnitude.is_off() {
            Self::OFF
        } else {
            Self {
                magnitude,
                direction: Some(direction),
            }
        }
    }

    pub fn magnitude(&self) -> Magnitude {
        self.magnitude
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn is_off(&self) -> bool {
        self.magnitude.is_off()
    }

    // Returns the direction currently being driven, if any.
    pub fn active_direction(&self) -> Option<Direction> {
        if self.is_off() { None } else { self.direction }
    }
}

// Wire shape used by the control service: {"value": "60%", "type": "OPEN"}.
#[derive(Serialize, Deserialize)]
struct RawAdjustableState {
    #[serde(alias = "magnitude")]
    value: Magnitude,
    #[serde(rename = "type", alias = "direction", default)]
    direction: Option<Direction>,
}

impl TryFrom<RawAdjustableState> for AdjustableState {
    type Error = anyhow::Error;

    fn try_from(raw: RawAdjustableState) -> Result<Self, Self::Error> {
        if raw.value.is_off() {
            return Ok(AdjustableState::OFF);
        }
        match raw.direction {
            Some(direction) => Ok(AdjustableState::new(direction, raw.value)),
            None => Err(anyhow!("Magnitude {} has no direction", raw.value)),
        }
    }
}

impl From<AdjustableState> for RawAdjustableState {
    fn from(s: AdjustableState) -> Self {
        RawAdjustableState {
            value: s.magnitude,
            direction: s.direction,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(untagged)]
pub enum DeviceState {
    Adjustable(AdjustableState),
    Toggle(bool),
}

impl DeviceState {
    pub fn off(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Adjustable => DeviceState::Adjustable(AdjustableState::OFF),
            DeviceKind::Toggle => DeviceState::Toggle(false),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceState::Adjustable(_) => DeviceKind::Adjustable,
            DeviceState::Toggle(_) => DeviceKind::Toggle,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("{device} is a {expected:?} device")]
    WrongKind { device: Device, expected: DeviceKind },
    #[error("{device}: {requested} is locked while {active} is active")]
    DirectionLocked {
        device: Device,
        requested: Direction,
        active: Direction,
    },
    #[error("Dashboard is no longer mounted")]
    Closed,
}

// A full set of device states, one entry per registry device. Serialized as
// the `/status` mapping of device name to state.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DeviceStates {
    states: BTreeMap<Device, DeviceState>,
}

impl DeviceStates {
    pub fn all_off() -> Self {
        Self {
            states: Device::ALL
                .into_iter()
                .map(|d| (d, DeviceState::off(d.kind())))
                .collect(),
        }
    }

    pub fn get(&self, device: Device) -> DeviceState {
        self.states
            .get(&device)
            .copied()
            .unwrap_or_else(|| DeviceState::off(device.kind()))
    }

    pub fn adjustable(&self, device: Device) -> Option<AdjustableState> {
        match self.get(device) {
            DeviceState::Adjustable(s) => Some(s),
            DeviceState::Toggle(_) => None,
        }
    }

    pub fn toggle(&self, device: Device) -> Option<bool> {
        match self.get(device) {
            DeviceState::Toggle(on) => Some(on),
            DeviceState::Adjustable(_) => None,
        }
    }

    pub fn set(&mut self, device: Device, state: DeviceState) -> Result<(), EditError> {
        if state.kind() != device.kind() {
            return Err(EditError::WrongKind {
                device,
                expected: device.kind(),
            });
        }
        self.states.insert(device, state);
        Ok(())
    }

    // Registry order.
    pub fn iter(&self) -> impl Iterator<Item = (Device, DeviceState)> + '_ {
        self.states.iter().map(|(d, s)| (*d, *s))
    }
}

impl Default for DeviceStates {
    fn default() -> Self {
        Self::all_off()
    }
}

impl Serialize for DeviceStates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.states.len()))?;
        for (device, state) in &self.states {
            map.serialize_entry(device.name(), state)?;
        }
        map.end()
    }
}

// Each registry device must be present and carry the state shape of its kind.
// Names the registry does not know are ignored.
impl<'de> Deserialize<'de> for DeviceStates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: BTreeMap<String, serde_json::Value> = BTreeMap::deserialize(deserializer)?;
        let mut states = BTreeMap::new();
        for device in Device::ALL {
            let value = raw
                .get(device.name())
                .ok_or_else(|| D::Error::custom(format!("missing device '{device}'")))?;
            let state = match device.kind() {
                DeviceKind::Adjustable => DeviceState::Adjustable(
                    AdjustableState::deserialize(value)
                        .map_err(|err| D::Error::custom(format!("{device}: {err}")))?,
                ),
                DeviceKind::Toggle => DeviceState::Toggle(value.as_bool().ok_or_else(|| {
                    D::Error::custom(format!("{device}: expected a boolean, got {value}"))
                })?),
            };
            states.insert(device, state);
        }
        Ok(Self { states })
    }
}

// Global gate on manual control. The service encodes it as 0 (auto) or
// 1 (manual).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OperationMode {
    #[default]
    Auto,
    Manual,
}

impl TryFrom<u8> for OperationMode {
    type Error = anyhow::Error;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(OperationMode::Auto),
            1 => Ok(OperationMode::Manual),
            _ => Err(anyhow!("Unknown operation mode {v}")),
        }
    }
}

impl From<OperationMode> for u8 {
    fn from(m: OperationMode) -> u8 {
        match m {
            OperationMode::Auto => 0,
            OperationMode::Manual => 1,
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Auto => write!(f, "AUTO"),
            OperationMode::Manual => write!(f, "MANUAL"),
        }
    }
}

impl FromStr for OperationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "0" => Ok(OperationMode::Auto),
            "manual" | "1" => Ok(OperationMode::Manual),
            _ => Err(anyhow!("Invalid operation mode '{s}'")),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Open,
    Close,
    On,
    Off,
}

// Body of POST /control.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct ControlRequest {
    pub device: Device,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Magnitude>,
}

impl ControlRequest {
    pub fn switch(device: Device, on: bool) -> Self {
        Self {
            device,
            action: if on { Action::On } else { Action::Off },
            percentage: None,
        }
    }

    pub fn adjust(device: Device, direction: Direction, magnitude: Magnitude) -> Self {
        Self {
            device,
            action: direction.action(),
            percentage: Some(magnitude),
        }
    }
}

// Body of GET/POST /operation-mode.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub struct ModeBody {
    pub mode: OperationMode,
}

// Acknowledgement returned by every write endpoint. A 200 response can still
// carry `status: "error"`.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Ack {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    pub fn success(message: Option<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SensorValues {
    // Degrees Celsius
    pub temperature: f32,
    // Relative humidity in percent
    pub humidity: f32,
    // ppm
    pub co2: f32,
    #[serde(deserialize_with = "bool_or_number")]
    pub rain: bool,
    // W/m²
    pub solar_radiation: f32,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct HistoryPoint {
    pub time: jiff::Timestamp,
    pub value: f32,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SensorSnapshot {
    pub current: SensorValues,
    // metric name -> readings, oldest first
    #[serde(default)]
    pub history: BTreeMap<String, Vec<HistoryPoint>>,
}

// Rain sensors report either a boolean or 0/1.
fn bool_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        other => Err(D::Error::custom(format!("expected rain flag, got {other}"))),
    }
}

#[cfg(test)]
mod magnitude {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!("OFF".parse::<Magnitude>().unwrap(), Magnitude::Off);
        assert_eq!("off".parse::<Magnitude>().unwrap(), Magnitude::Off);
        assert_eq!("60%".parse::<Magnitude>().unwrap(), Magnitude::P60);
        assert_eq!("60.0%".parse::<Magnitude>().unwrap(), Magnitude::P60);
        assert_eq!("100".parse::<Magnitude>().unwrap(), Magnitude::P100);
        assert_eq!("0.0%".parse::<Magnitude>().unwrap(), Magnitude::Off);
    }

    #[test]
    fn reject_invalid() {
        assert!("50%".parse::<Magnitude>().is_err());
        assert!("120%".parse::<Magnitude>().is_err());
        assert!("-20%".parse::<Magnitude>().is_err());
        assert!("half".parse::<Magnitude>().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(Magnitude::Off.to_string(), "OFF");
        assert_eq!(Magnitude::P40.to_string(), "40%");
    }
}


#[cfg(test)]
mod device_states {
    use super::*;

    const STATUS_JSON: &str = r#"{
        "천창1": {"value": "60.0%", "type": "OPEN"},
        "천창2": {"value": "OFF", "type": null},
        "차광1": {"value": "0.0%", "type": "CLOSE"},
        "차광2": {"value": "OFF", "type": null},
        "보온1": {"value": "20%", "type": "CLOSE"},
        "측커텐": {"value": "OFF", "type": null},
        "유동팬": true,
        "송풍기": false
    }"#;

    #[test]
    fn deserialize_status() {
        let states: DeviceStates = serde_json::from_str(STATUS_JSON).unwrap();
        assert_eq!(
            states.adjustable(Device::Skylight1),
            Some(AdjustableState::new(Direction::Open, Magnitude::P60))
        );
        assert_eq!(
            states.adjustable(Device::Shade1),
            Some(AdjustableState::OFF)
        );
        assert_eq!(
            states.adjustable(Device::ThermalCurtain),
            Some(AdjustableState::new(Direction::Close, Magnitude::P20))
        );
        assert_eq!(states.toggle(Device::CirculationFan), Some(true));
        assert_eq!(states.toggle(Device::Blower), Some(false));
    }

    #[test]
    fn missing_device_is_malformed() {
        let result: Result<DeviceStates, _> = serde_json::from_str("{\"유동팬\": true}");
        assert!(result.unwrap_err().to_string().contains("missing device"));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let json = STATUS_JSON.replace("\"유동팬\": true", "\"유동팬\": \"on\"");
        let result: Result<DeviceStates, _> = serde_json::from_str(&json);
        assert!(result.is_err());
    }

    #[test]
    fn set_checks_kind() {
        let mut states = DeviceStates::all_off();
        assert_eq!(
            states.set(Device::Blower, DeviceState::Adjustable(AdjustableState::OFF)),
            Err(EditError::WrongKind {
                device: Device::Blower,
                expected: DeviceKind::Toggle,
            })
        );
        assert!(states.set(Device::Blower, DeviceState::Toggle(true)).is_ok());
        assert_eq!(states.toggle(Device::Blower), Some(true));
    }

    #[test]
    fn serialize_round_trips_through_status_shape() {
        let states: DeviceStates = serde_json::from_str(STATUS_JSON).unwrap();
        let json = serde_json::to_string(&states).unwrap();
        assert!(json.contains("\"천창1\":{\"value\":\"60%\",\"type\":\"OPEN\"}"));
        assert!(json.contains("\"유동팬\":true"));
        let again: DeviceStates = serde_json::from_str(&json).unwrap();
        assert_eq!(again, states);
    }
}
