use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Every controllable actuator in the greenhouse. The set is closed: the
// control service only knows these names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    Skylight1,
    Skylight2,
    Shade1,
    Shade2,
    ThermalCurtain,
    SideCurtain,
    CirculationFan,
    Blower,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeviceKind {
    // Driven by a direction (open/close) and a percentage.
    Adjustable,
    // Plain on/off.
    Toggle,
}

impl Device {
    // Registry order. Commands are always dispatched in this order.
    pub const ALL: [Device; 8] = [
        Device::Skylight1,
        Device::Skylight2,
        Device::Shade1,
        Device::Shade2,
        Device::ThermalCurtain,
        Device::SideCurtain,
        Device::CirculationFan,
        Device::Blower,
    ];

    pub fn kind(self) -> DeviceKind {
        match self {
            Device::CirculationFan | Device::Blower => DeviceKind::Toggle,
            _ => DeviceKind::Adjustable,
        }
    }

    pub fn is_adjustable(self) -> bool {
        self.kind() == DeviceKind::Adjustable
    }

    // Name used by the control service.
    pub fn name(self) -> &'static str {
        match self {
            Device::Skylight1 => "천창1",
            Device::Skylight2 => "천창2",
            Device::Shade1 => "차광1",
            Device::Shade2 => "차광2",
            Device::ThermalCurtain => "보온1",
            Device::SideCurtain => "측커텐",
            Device::CirculationFan => "유동팬",
            Device::Blower => "송풍기",
        }
    }

    // ASCII name, handy on terminals without a Korean input method.
    pub fn alias(self) -> &'static str {
        match self {
            Device::Skylight1 => "skylight1",
            Device::Skylight2 => "skylight2",
            Device::Shade1 => "shade1",
            Device::Shade2 => "shade2",
            Device::ThermalCurtain => "thermal1",
            Device::SideCurtain => "side-curtain",
            Device::CirculationFan => "fan",
            Device::Blower => "blower",
        }
    }

    pub fn adjustable() -> impl Iterator<Item = Device> {
        Device::ALL.into_iter().filter(|d| d.is_adjustable())
    }

    pub fn toggles() -> impl Iterator<Item = Device> {
        Device::ALL.into_iter().filter(|d| !d.is_adjustable())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Device::ALL
            .into_iter()
            .find(|d| d.name() == s || d.alias().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Unknown device '{s}'"))
    }
}

impl TryFrom<String> for Device {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Device> for String {
    fn from(d: Device) -> String {
        d.name().to_string()
    }
}
