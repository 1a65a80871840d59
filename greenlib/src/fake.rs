use crate::device::{Device, DeviceKind};
use crate::service::{ControlService, ServiceError};
use crate::types::{
    Action, Ack, AdjustableState, ControlRequest, DeviceState, DeviceStates, Direction,
    HistoryPoint, OperationMode, SensorSnapshot, SensorValues,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

// Everything the fake service remembers. Tests poke at these fields directly
// to script failures.
#[derive(Debug, Default)]
pub struct FakeState {
    pub devices: DeviceStates,
    pub mode: OperationMode,
    pub sensors: SensorSnapshot,
    // Every control request received, in arrival order.
    pub requests: Vec<ControlRequest>,
    pub status_calls: usize,
    pub reset_calls: usize,
    // Devices whose control requests are refused with the given message.
    pub control_failures: HashMap<Device, String>,
    pub reset_failure: Option<String>,
    pub mode_failure: Option<String>,
    // When set, every call fails as if the service returned 503.
    pub offline: bool,
}

// In-memory control service. Accepted commands are applied directly to the
// stored device states.
#[derive(Debug, Default)]
pub struct FakeControlService {
    state: Mutex<FakeState>,
}

impl FakeControlService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensors(sensors: SensorSnapshot) -> Self {
        let fake = Self::new();
        fake.state().sensors = sensors;
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        // A panic while holding the lock only happens in a failing test.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_online(state: &FakeState) -> Result<(), ServiceError> {
        if state.offline {
            return Err(ServiceError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn apply_control(devices: &mut DeviceStates, request: &ControlRequest) -> Result<(), String> {
    let device = request.device;
    let state = match (device.kind(), request.action) {
        (DeviceKind::Toggle, Action::On) => DeviceState::Toggle(true),
        (DeviceKind::Toggle, Action::Off) => DeviceState::Toggle(false),
        (DeviceKind::Adjustable, Action::Open | Action::Close) => {
            let magnitude = request
                .percentage
                .ok_or_else(|| format!("{device}: percentage is required"))?;
            let direction = if request.action == Action::Open {
                Direction::Open
            } else {
                Direction::Close
            };
            DeviceState::Adjustable(AdjustableState::new(direction, magnitude))
        }
        (_, action) => return Err(format!("{device}: unsupported action {action:?}")),
    };
    devices.set(device, state).map_err(|err| err.to_string())
}

#[async_trait]
impl ControlService for FakeControlService {
    async fn status(&self) -> Result<DeviceStates, ServiceError> {
        let mut state = self.state();
        state.status_calls += 1;
        Self::check_online(&state)?;
        Ok(state.devices.clone())
    }

    async fn sensor_data(&self) -> Result<SensorSnapshot, ServiceError> {
        let state = self.state();
        Self::check_online(&state)?;
        Ok(state.sensors.clone())
    }

    async fn operation_mode(&self) -> Result<OperationMode, ServiceError> {
        let state = self.state();
        Self::check_online(&state)?;
        Ok(state.mode)
    }

    async fn set_operation_mode(&self, mode: OperationMode) -> Result<Ack, ServiceError> {
        let mut state = self.state();
        Self::check_online(&state)?;
        if let Some(message) = &state.mode_failure {
            return ServiceError::check_ack("/operation-mode", Ack::error(message.clone()));
        }
        state.mode = mode;
        Ok(Ack::success(None))
    }

    async fn control(&self, request: &ControlRequest) -> Result<Ack, ServiceError> {
        let mut state = self.state();
        Self::check_online(&state)?;
        state.requests.push(request.clone());
        if let Some(message) = state.control_failures.get(&request.device) {
            return ServiceError::check_ack("/control", Ack::error(message.clone()));
        }
        let ack = match apply_control(&mut state.devices, request) {
            Ok(()) => Ack::success(None),
            Err(message) => Ack::error(message),
        };
        ServiceError::check_ack("/control", ack)
    }

    async fn reset(&self) -> Result<Ack, ServiceError> {
        let mut state = self.state();
        state.reset_calls += 1;
        Self::check_online(&state)?;
        if let Some(message) = &state.reset_failure {
            return ServiceError::check_ack("/reset", Ack::error(message.clone()));
        }
        state.devices = DeviceStates::all_off();
        Ok(Ack::success(Some("All devices were reset.".to_string())))
    }
}

// A plausible day of greenhouse readings ending at `now`, one point per hour.
pub fn demo_sensor_snapshot(now: jiff::Timestamp) -> SensorSnapshot {
    let current = SensorValues {
        temperature: 24.5,
        humidity: 62.0,
        co2: 430.0,
        rain: false,
        solar_radiation: 310.0,
    };
    let metrics: [(&str, f32, f32); 4] = [
        ("temperature", current.temperature, 4.0),
        ("humidity", current.humidity, 10.0),
        ("co2", current.co2, 60.0),
        ("solar_radiation", current.solar_radiation, 250.0),
    ];

    let mut history = BTreeMap::new();
    for (name, base, swing) in metrics {
        let points = (0..24i64)
            .rev()
            .map(|hours_ago| {
                // One full cycle per day.
                let phase = (hours_ago as f32 / 24.0) * std::f32::consts::TAU;
                HistoryPoint {
                    time: now - jiff::SignedDuration::from_hours(hours_ago),
                    value: base - swing * phase.sin(),
                }
            })
            .collect();
        history.insert(name.to_string(), points);
    }

    SensorSnapshot { current, history }
}

// Wraps the fake with a callback run at the start of every call, and an
// optional gate that holds GET /operation-mode until released. Used to make
// things happen while a request is in flight.
#[cfg(test)]
pub(crate) struct HookedControlService {
    pub fake: FakeControlService,
    hook: Box<dyn Fn(&'static str) + Send + Sync>,
    mode_gate: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
}

#[cfg(test)]
impl HookedControlService {
    pub fn new(hook: impl Fn(&'static str) + Send + Sync + 'static) -> Self {
        Self {
            fake: FakeControlService::new(),
            hook: Box::new(hook),
            mode_gate: Mutex::new(None),
        }
    }

    // The next mode read waits until the returned sender fires (or drops).
    pub fn hold_mode_read(&self) -> tokio::sync::oneshot::Sender<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        *self.mode_gate.lock().unwrap() = Some(rx);
        tx
    }
}

#[cfg(test)]
#[async_trait]
impl ControlService for HookedControlService {
    async fn status(&self) -> Result<DeviceStates, ServiceError> {
        (self.hook)("/status");
        self.fake.status().await
    }

    async fn sensor_data(&self) -> Result<SensorSnapshot, ServiceError> {
        (self.hook)("/sensor-data");
        self.fake.sensor_data().await
    }

    async fn operation_mode(&self) -> Result<OperationMode, ServiceError> {
        (self.hook)("/operation-mode");
        // Read the answer before waiting, like a response already on its way.
        let mode = self.fake.operation_mode().await;
        let gate = self.mode_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        mode
    }

    async fn set_operation_mode(&self, mode: OperationMode) -> Result<Ack, ServiceError> {
        (self.hook)("/operation-mode");
        self.fake.set_operation_mode(mode).await
    }

    async fn control(&self, request: &ControlRequest) -> Result<Ack, ServiceError> {
        (self.hook)("/control");
        self.fake.control(request).await
    }

    async fn reset(&self) -> Result<Ack, ServiceError> {
        (self.hook)("/reset");
        self.fake.reset().await
    }
}
