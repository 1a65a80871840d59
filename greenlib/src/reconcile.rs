//! Derives what each device control shows and whether it can be edited.
//!
//! Everything here is a pure function of the pending state, the last known
//! server state and the operation mode. Nothing is cached; views are rebuilt
//! whenever they are rendered.

use crate::device::Device;
use crate::types::{
    AdjustableState, DeviceState, DeviceStates, Direction, Magnitude, OperationMode,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AdjustableView {
    pub open: Magnitude,
    pub close: Magnitude,
    pub open_disabled: bool,
    pub close_disabled: bool,
    // Last state reported by the control service.
    pub current: AdjustableState,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ToggleView {
    pub on: bool,
    pub current: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ControlView {
    Adjustable(AdjustableView),
    Toggle(ToggleView),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DeviceView {
    pub device: Device,
    pub control: ControlView,
    // Confirm/reset are unavailable for every device while in AUTO.
    pub writes_disabled: bool,
    // True when confirming now would send a request for this device.
    pub dirty: bool,
}

pub fn writes_disabled(mode: OperationMode) -> bool {
    mode == OperationMode::Auto
}

// Value shown in the selector for `direction`.
pub fn displayed(pending: AdjustableState, direction: Direction) -> Magnitude {
    if pending.direction() == Some(direction) {
        pending.magnitude()
    } else {
        Magnitude::Off
    }
}

// A direction's selector is locked while the other direction is driving.
pub fn direction_disabled(pending: AdjustableState, direction: Direction) -> bool {
    pending.active_direction() == Some(direction.other())
}

pub fn adjustable_view(pending: AdjustableState, current: AdjustableState) -> AdjustableView {
    AdjustableView {
        open: displayed(pending, Direction::Open),
        close: displayed(pending, Direction::Close),
        open_disabled: direction_disabled(pending, Direction::Open),
        close_disabled: direction_disabled(pending, Direction::Close),
        current,
    }
}

// Whether the pending state of `device` would produce a control request.
// Adjustable devices only send when a nonzero level is selected, so a pending
// OFF never asks the service to stop a device.
pub fn needs_command(device: Device, pending: &DeviceStates, server: &DeviceStates) -> bool {
    match (pending.get(device), server.get(device)) {
        (DeviceState::Toggle(p), DeviceState::Toggle(s)) => p != s,
        (DeviceState::Adjustable(p), DeviceState::Adjustable(s)) => p != s && !p.is_off(),
        _ => false,
    }
}

pub fn device_view(
    device: Device,
    pending: &DeviceStates,
    server: &DeviceStates,
    mode: OperationMode,
) -> DeviceView {
    let control = match (pending.get(device), server.get(device)) {
        (DeviceState::Toggle(on), DeviceState::Toggle(current)) => {
            ControlView::Toggle(ToggleView { on, current })
        }
        (DeviceState::Adjustable(p), DeviceState::Adjustable(s)) => {
            ControlView::Adjustable(adjustable_view(p, s))
        }
        // DeviceStates keeps every entry consistent with the registry kind.
        (DeviceState::Toggle(on), _) => ControlView::Toggle(ToggleView { on, current: false }),
        (DeviceState::Adjustable(p), _) => {
            ControlView::Adjustable(adjustable_view(p, AdjustableState::OFF))
        }
    };
    DeviceView {
        device,
        control,
        writes_disabled: writes_disabled(mode),
        dirty: needs_command(device, pending, server),
    }
}

pub fn views(pending: &DeviceStates, server: &DeviceStates, mode: OperationMode) -> Vec<DeviceView> {
    Device::ALL
        .into_iter()
        .map(|d| device_view(d, pending, server, mode))
        .collect()
}

#[cfg(test)]
mod rules {
    use super::*;

    fn adj(direction: Direction, magnitude: Magnitude) -> AdjustableState {
        AdjustableState::new(direction, magnitude)
    }

    #[test]
    fn off_displays_off_both_ways() {
        let v = adjustable_view(AdjustableState::OFF, AdjustableState::OFF);
        assert_eq!(v.open, Magnitude::Off);
        assert_eq!(v.close, Magnitude::Off);
        assert!(!v.open_disabled);
        assert!(!v.close_disabled);
    }

    #[test]
    fn open_locks_close() {
        for m in &Magnitude::LEVELS[1..] {
            let v = adjustable_view(adj(Direction::Open, *m), AdjustableState::OFF);
            assert_eq!(v.open, *m);
            assert_eq!(v.close, Magnitude::Off);
            assert!(!v.open_disabled);
            assert!(v.close_disabled);
        }
    }

    #[test]
    fn close_locks_open() {
        let v = adjustable_view(adj(Direction::Close, Magnitude::P80), AdjustableState::OFF);
        assert_eq!(v.close, Magnitude::P80);
        assert!(v.open_disabled);
        assert!(!v.close_disabled);
    }

    #[test]
    fn returning_to_off_unlocks() {
        let v = adjustable_view(adj(Direction::Open, Magnitude::Off), AdjustableState::OFF);
        assert!(!v.open_disabled);
        assert!(!v.close_disabled);
    }

    #[test]
    fn auto_mode_disables_writes() {
        let states = DeviceStates::all_off();
        for v in views(&states, &states, OperationMode::Auto) {
            assert!(v.writes_disabled);
        }
        for v in views(&states, &states, OperationMode::Manual) {
            assert!(!v.writes_disabled);
        }
    }

    #[test]
    fn toggle_view_shows_pending() {
        let mut pending = DeviceStates::all_off();
        pending
            .set(Device::Blower, DeviceState::Toggle(true))
            .unwrap();
        let server = DeviceStates::all_off();
        let v = device_view(Device::Blower, &pending, &server, OperationMode::Manual);
        assert_eq!(
            v.control,
            ControlView::Toggle(ToggleView {
                on: true,
                current: false
            })
        );
        assert!(v.dirty);
    }

    #[test]
    fn pending_off_is_never_dirty() {
        let pending = DeviceStates::all_off();
        let mut server = DeviceStates::all_off();
        server
            .set(
                Device::Shade2,
                DeviceState::Adjustable(adj(Direction::Open, Magnitude::P40)),
            )
            .unwrap();
        assert!(!needs_command(Device::Shade2, &pending, &server));
    }

    #[test]
    fn same_as_server_is_not_dirty() {
        let mut pending = DeviceStates::all_off();
        let state = DeviceState::Adjustable(adj(Direction::Open, Magnitude::P40));
        pending.set(Device::Shade2, state).unwrap();
        let server = pending.clone();
        assert!(!needs_command(Device::Shade2, &pending, &server));
    }
}
