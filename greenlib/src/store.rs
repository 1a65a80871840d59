use crate::device::{Device, DeviceKind};
use crate::reconcile::{self, DeviceView};
use crate::types::{
    Action, AdjustableState, ControlRequest, DeviceState, DeviceStates, Direction, EditError,
    Magnitude, OperationMode, SensorSnapshot,
};
use crate::usage::DailyUsage;

// Owns everything the dashboard knows. Pending state is written by user edits
// and by the dispatcher once a confirm finishes; server state, sensors and the
// mode are written only by refresh paths inside the crate.
#[derive(Clone, Debug)]
pub struct StateStore {
    pending: DeviceStates,
    server: DeviceStates,
    mode: OperationMode,
    // Bumped on every mode change the user makes. A fetched mode is only
    // applied if no such change happened while it was in flight.
    mode_generation: u64,
    sensors: Option<SensorSnapshot>,
    usage: DailyUsage,
}

impl StateStore {
    // Assumes AUTO until the service says otherwise.
    pub fn new(usage: DailyUsage) -> Self {
        Self {
            pending: DeviceStates::all_off(),
            server: DeviceStates::all_off(),
            mode: OperationMode::Auto,
            mode_generation: 0,
            sensors: None,
            usage,
        }
    }

    pub fn pending(&self) -> &DeviceStates {
        &self.pending
    }

    pub fn server(&self) -> &DeviceStates {
        &self.server
    }

    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    pub fn sensors(&self) -> Option<&SensorSnapshot> {
        self.sensors.as_ref()
    }

    pub fn usage(&self) -> &DailyUsage {
        &self.usage
    }

    pub fn views(&self) -> Vec<DeviceView> {
        reconcile::views(&self.pending, &self.server, self.mode)
    }

    // Picks a level in one direction of an adjustable device. Refused while
    // the other direction holds a nonzero level.
    pub fn select(
        &mut self,
        device: Device,
        direction: Direction,
        magnitude: Magnitude,
    ) -> Result<(), EditError> {
        let current = self
            .pending
            .adjustable(device)
            .ok_or(EditError::WrongKind {
                device,
                expected: device.kind(),
            })?;
        if reconcile::direction_disabled(current, direction) {
            return Err(EditError::DirectionLocked {
                device,
                requested: direction,
                active: direction.other(),
            });
        }
        self.pending.set(
            device,
            DeviceState::Adjustable(AdjustableState::new(direction, magnitude)),
        )
    }

    pub fn set_toggle(&mut self, device: Device, on: bool) -> Result<(), EditError> {
        self.pending.set(device, DeviceState::Toggle(on))
    }

    // Returns the new pending value.
    pub fn flip_toggle(&mut self, device: Device) -> Result<bool, EditError> {
        let on = !self.pending.toggle(device).ok_or(EditError::WrongKind {
            device,
            expected: device.kind(),
        })?;
        self.set_toggle(device, on)?;
        Ok(on)
    }

    // Requests a confirm would send right now, in registry order.
    pub fn planned_commands(&self) -> Vec<ControlRequest> {
        Device::ALL
            .into_iter()
            .filter(|d| reconcile::needs_command(*d, &self.pending, &self.server))
            .filter_map(|d| match self.pending.get(d) {
                DeviceState::Toggle(on) => Some(ControlRequest::switch(d, on)),
                DeviceState::Adjustable(s) => s
                    .active_direction()
                    .map(|dir| ControlRequest::adjust(d, dir, s.magnitude())),
            })
            .collect()
    }

    pub(crate) fn replace_server(&mut self, states: DeviceStates) {
        self.server = states;
    }

    // Poll result: replaces server state and copies toggle values into
    // pending. Adjustable edits in progress are left alone.
    pub(crate) fn merge_polled(&mut self, states: DeviceStates) {
        self.server = states;
        self.sync_pending_toggles();
    }

    // Clears every adjustable selection. Toggles take the last known server
    // value so an unchanged dashboard never plans a command.
    pub(crate) fn reset_pending(&mut self) {
        self.pending = DeviceStates::all_off();
        self.sync_pending_toggles();
    }

    // Everything back to OFF after the service reset the devices.
    pub(crate) fn clear_after_reset(&mut self) {
        self.pending = DeviceStates::all_off();
        self.server = DeviceStates::all_off();
        self.usage.clear();
    }

    // The mode the user just set.
    pub(crate) fn set_mode(&mut self, mode: OperationMode) {
        self.mode = mode;
        self.mode_generation += 1;
    }

    pub(crate) fn mode_generation(&self) -> u64 {
        self.mode_generation
    }

    // A mode read from the service, requested when the generation was
    // `generation`. Returns false if a user change overtook it.
    pub(crate) fn apply_fetched_mode(&mut self, mode: OperationMode, generation: u64) -> bool {
        if generation != self.mode_generation {
            return false;
        }
        self.mode = mode;
        true
    }

    pub(crate) fn replace_sensors(&mut self, snapshot: SensorSnapshot) {
        self.sensors = Some(snapshot);
    }

    pub(crate) fn record_usage(&mut self, request: &ControlRequest) {
        let direction = match request.action {
            Action::Open => Direction::Open,
            Action::Close => Direction::Close,
            Action::On | Action::Off => return,
        };
        if let Some(magnitude) = request.percentage {
            self.usage.record(request.device, direction, magnitude);
        }
    }

    fn sync_pending_toggles(&mut self) {
        for device in Device::toggles() {
            let state = self.server.get(device);
            debug_assert_eq!(state.kind(), DeviceKind::Toggle);
            // Both sides come from the registry, so the kinds always agree.
            let _ = self.pending.set(device, state);
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DailyUsage::default())
    }
}

#[cfg(test)]
mod state_store {
    use super::*;

    fn adj(direction: Direction, magnitude: Magnitude) -> DeviceState {
        DeviceState::Adjustable(AdjustableState::new(direction, magnitude))
    }

    #[test]
    fn starts_off_in_auto() {
        let store = StateStore::default();
        assert_eq!(store.mode(), OperationMode::Auto);
        assert_eq!(store.pending(), &DeviceStates::all_off());
        assert_eq!(store.server(), &DeviceStates::all_off());
        assert!(store.sensors().is_none());
    }

    #[test]
    fn select_locks_other_direction() {
        let mut store = StateStore::default();
        store
            .select(Device::Skylight1, Direction::Open, Magnitude::P60)
            .unwrap();
        assert_eq!(
            store.select(Device::Skylight1, Direction::Close, Magnitude::P20),
            Err(EditError::DirectionLocked {
                device: Device::Skylight1,
                requested: Direction::Close,
                active: Direction::Open,
            })
        );

        // Back to OFF releases the lock.
        store
            .select(Device::Skylight1, Direction::Open, Magnitude::Off)
            .unwrap();
        store
            .select(Device::Skylight1, Direction::Close, Magnitude::P20)
            .unwrap();
        assert_eq!(
            store.pending().get(Device::Skylight1),
            adj(Direction::Close, Magnitude::P20)
        );
    }

    #[test]
    fn select_on_toggle_is_rejected() {
        let mut store = StateStore::default();
        assert!(matches!(
            store.select(Device::Blower, Direction::Open, Magnitude::P20),
            Err(EditError::WrongKind { .. })
        ));
        assert!(matches!(
            store.flip_toggle(Device::Shade1),
            Err(EditError::WrongKind { .. })
        ));
    }

    #[test]
    fn flip_toggle() {
        let mut store = StateStore::default();
        assert_eq!(store.flip_toggle(Device::CirculationFan), Ok(true));
        assert_eq!(store.flip_toggle(Device::CirculationFan), Ok(false));
    }

    #[test]
    fn poll_keeps_adjustable_edits() {
        let mut store = StateStore::default();
        store
            .select(Device::Shade1, Direction::Close, Magnitude::P40)
            .unwrap();
        store.set_toggle(Device::Blower, true).unwrap();

        let mut polled = DeviceStates::all_off();
        polled
            .set(Device::Shade1, adj(Direction::Open, Magnitude::P100))
            .unwrap();
        polled
            .set(Device::CirculationFan, DeviceState::Toggle(true))
            .unwrap();
        store.merge_polled(polled.clone());

        assert_eq!(store.server(), &polled);
        assert_eq!(
            store.pending().get(Device::Shade1),
            adj(Direction::Close, Magnitude::P40)
        );
        assert_eq!(store.pending().toggle(Device::CirculationFan), Some(true));
        assert_eq!(store.pending().toggle(Device::Blower), Some(false));
    }

    #[test]
    fn planned_commands_in_registry_order() {
        let mut store = StateStore::default();
        store.set_toggle(Device::Blower, true).unwrap();
        store
            .select(Device::SideCurtain, Direction::Close, Magnitude::P20)
            .unwrap();
        store
            .select(Device::Skylight1, Direction::Open, Magnitude::P60)
            .unwrap();
        assert_eq!(
            store.planned_commands(),
            vec![
                ControlRequest::adjust(Device::Skylight1, Direction::Open, Magnitude::P60),
                ControlRequest::adjust(Device::SideCurtain, Direction::Close, Magnitude::P20),
                ControlRequest::switch(Device::Blower, true),
            ]
        );
    }

    #[test]
    fn reset_pending_follows_server_toggles() {
        let mut store = StateStore::default();
        let mut server = DeviceStates::all_off();
        server
            .set(Device::CirculationFan, DeviceState::Toggle(true))
            .unwrap();
        server
            .set(Device::Skylight2, adj(Direction::Open, Magnitude::P80))
            .unwrap();
        store.replace_server(server);
        store
            .select(Device::Skylight2, Direction::Open, Magnitude::P20)
            .unwrap();
        store.reset_pending();

        assert_eq!(
            store.pending().adjustable(Device::Skylight2),
            Some(AdjustableState::OFF)
        );
        assert_eq!(store.pending().toggle(Device::CirculationFan), Some(true));
        assert!(store.planned_commands().is_empty());
    }

    #[test]
    fn fetched_mode_loses_to_user_change() {
        let mut store = StateStore::default();
        let generation = store.mode_generation();
        assert!(store.apply_fetched_mode(OperationMode::Manual, generation));
        assert_eq!(store.mode(), OperationMode::Manual);

        let generation = store.mode_generation();
        store.set_mode(OperationMode::Auto);
        assert!(!store.apply_fetched_mode(OperationMode::Manual, generation));
        assert_eq!(store.mode(), OperationMode::Auto);
    }

    #[test]
    fn clear_after_reset_keeps_mode() {
        let mut store = StateStore::default();
        store.set_mode(OperationMode::Manual);
        store.set_toggle(Device::Blower, true).unwrap();
        let request = ControlRequest::adjust(Device::Shade2, Direction::Open, Magnitude::P40);
        store.record_usage(&request);
        assert_eq!(store.usage().get(Device::Shade2).open, 40);

        store.clear_after_reset();
        assert_eq!(store.mode(), OperationMode::Manual);
        assert_eq!(store.pending(), &DeviceStates::all_off());
        assert_eq!(store.usage().get(Device::Shade2).open, 0);
    }
}
