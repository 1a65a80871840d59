use crate::service::ControlService;
use crate::session::Session;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PollSettings {
    pub status_interval: Duration,
    // None disables the sensor poll.
    pub sensor_interval: Option<Duration>,
    // Also re-read the operation mode on every status poll.
    pub reconcile_mode: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(15),
            sensor_interval: Some(Duration::from_secs(15)),
            reconcile_mode: false,
        }
    }
}

// Fetches device state. On success server state is replaced and toggle values
// are copied into pending; on failure the last known state is kept.
pub async fn refresh_status(session: &Session, service: &dyn ControlService) -> bool {
    match service.status().await {
        Ok(states) => session.apply(|s| s.merge_polled(states)).is_some(),
        Err(err) => {
            session.notify_error(format!("Status query failed: {err}"));
            false
        }
    }
}

pub async fn refresh_sensors(session: &Session, service: &dyn ControlService) -> bool {
    match service.sensor_data().await {
        Ok(snapshot) => session.apply(|s| s.replace_sensors(snapshot)).is_some(),
        Err(err) => {
            session.notify_error(format!("Sensor query failed: {err}"));
            false
        }
    }
}

// Reads the operation mode. The store keeps its current mode (AUTO until the
// first read lands) if this fails, and also if the user changed the mode
// while the request was in flight.
pub async fn refresh_mode(session: &Session, service: &dyn ControlService) -> bool {
    let generation = session.read(|s| s.mode_generation());
    match service.operation_mode().await {
        Ok(mode) => session
            .apply(|s| {
                let previous = s.mode();
                if !s.apply_fetched_mode(mode, generation) {
                    log::debug!("Ignoring fetched mode {mode}; changed locally meanwhile");
                } else if previous != mode {
                    log::info!("Operation mode is {mode} (was {previous})");
                }
            })
            .is_some(),
        Err(err) => {
            session.notify_error(format!("Operation mode query failed: {err}"));
            false
        }
    }
}

// Owns the background timers of one mounted dashboard. Dropping or stopping
// it cancels every task it started; a tick that is mid-request when that
// happens is abandoned, and the session guard discards anything it would have
// written.
pub struct PollingScheduler {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PollingScheduler {
    // Must be called from within a tokio runtime. The first tick of each
    // timer fires immediately.
    pub fn start(
        session: Arc<Session>,
        service: Arc<dyn ControlService>,
        settings: PollSettings,
    ) -> Self {
        let mut scheduler = Self {
            token: session.token().child_token(),
            tasks: Vec::new(),
        };

        {
            let session = session.clone();
            let service = service.clone();
            scheduler.spawn_every(settings.status_interval, move || {
                let session = session.clone();
                let service = service.clone();
                async move {
                    refresh_status(&session, &*service).await;
                    if settings.reconcile_mode {
                        refresh_mode(&session, &*service).await;
                    }
                }
            });
        }

        if let Some(interval) = settings.sensor_interval {
            scheduler.spawn_every(interval, move || {
                let session = session.clone();
                let service = service.clone();
                async move {
                    refresh_sensors(&session, &*service).await;
                }
            });
        }

        log::debug!(
            "Polling started: status every {:?}, sensors every {:?}",
            settings.status_interval,
            settings.sensor_interval
        );
        scheduler
    }

    // Runs `fut` once, cancelled along with the timers.
    pub fn spawn_once<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tasks.push(tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        }));
    }

    fn spawn_every<F, Fut>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tick() => {}
                }
            }
        }));
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod scheduler {
    use super::*;
    use crate::device::Device;
    use crate::fake::{FakeControlService, HookedControlService};
    use crate::notice::{NoticeLevel, NoticeSink};
    use crate::store::StateStore;
    use crate::types::{
        AdjustableState, DeviceState, Direction, Magnitude, OperationMode, SensorSnapshot,
    };

    fn setup() -> (
        Arc<Session>,
        Arc<FakeControlService>,
        crate::notice::NoticeReceiver,
    ) {
        let (sink, rx) = NoticeSink::channel();
        let session = Arc::new(Session::new(StateStore::default(), sink));
        (session, Arc::new(FakeControlService::new()), rx)
    }

    // Lets spawned tasks run until they block on the (paused) clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_interval_until_stopped() {
        let (session, fake, _rx) = setup();
        let settings = PollSettings {
            status_interval: Duration::from_secs(15),
            sensor_interval: None,
            reconcile_mode: false,
        };
        let scheduler = PollingScheduler::start(session.clone(), fake.clone(), settings);
        settle().await;
        assert_eq!(fake.state().status_calls, 1);

        tokio::time::advance(Duration::from_secs(15)).await;
        settle().await;
        assert_eq!(fake.state().status_calls, 2);

        scheduler.stop();
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(fake.state().status_calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_session_stops_timers() {
        let (session, fake, _rx) = setup();
        let _scheduler =
            PollingScheduler::start(session.clone(), fake.clone(), PollSettings::default());
        settle().await;
        session.close();
        tokio::time::advance(Duration::from_secs(45)).await;
        settle().await;
        assert_eq!(fake.state().status_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_keeps_pending_adjustable_edit() {
        let (session, fake, _rx) = setup();
        session
            .apply(|s| s.select(Device::Skylight1, Direction::Open, Magnitude::P40))
            .unwrap()
            .unwrap();
        fake.state()
            .devices
            .set(Device::CirculationFan, DeviceState::Toggle(true))
            .unwrap();

        assert!(refresh_status(&session, &*fake).await);
        session.read(|s| {
            assert_eq!(
                s.pending().adjustable(Device::Skylight1),
                Some(AdjustableState::new(Direction::Open, Magnitude::P40))
            );
            assert_eq!(s.pending().toggle(Device::CirculationFan), Some(true));
            assert_eq!(s.server().toggle(Device::CirculationFan), Some(true));
        });
    }

    #[tokio::test]
    async fn failed_poll_keeps_last_state() {
        let (session, fake, mut rx) = setup();
        fake.state()
            .devices
            .set(Device::Blower, DeviceState::Toggle(true))
            .unwrap();
        assert!(refresh_status(&session, &*fake).await);

        fake.state().offline = true;
        assert!(!refresh_status(&session, &*fake).await);
        assert!(!refresh_sensors(&session, &*fake).await);
        assert_eq!(session.read(|s| s.server().toggle(Device::Blower)), Some(true));

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("503"));
    }

    #[tokio::test]
    async fn sensors_replaced_wholesale() {
        let (session, fake, _rx) = setup();
        let snap = crate::fake::demo_sensor_snapshot(jiff::Timestamp::UNIX_EPOCH);
        fake.state().sensors = snap.clone();
        assert!(refresh_sensors(&session, &*fake).await);
        assert_eq!(session.read(|s| s.sensors().cloned()), Some(snap));

        fake.state().sensors = SensorSnapshot::default();
        assert!(refresh_sensors(&session, &*fake).await);
        assert_eq!(
            session.read(|s| s.sensors().cloned()),
            Some(SensorSnapshot::default())
        );
    }

    #[tokio::test]
    async fn user_mode_change_beats_slow_mode_read() {
        let (session, _fake, _rx) = setup();
        let service = HookedControlService::new(|_| {});
        // Answers AUTO, but only once released.
        let release = service.hold_mode_read();

        let bootstrap = refresh_mode(&session, &service);
        let user = {
            let session = &session;
            let service = &service;
            async move {
                crate::dispatcher::set_operation_mode(session, service, OperationMode::Manual)
                    .await
                    .unwrap();
                release.send(()).unwrap();
            }
        };
        let (fetched, ()) = tokio::join!(bootstrap, user);

        assert!(fetched);
        assert_eq!(session.read(|s| s.mode()), OperationMode::Manual);
        assert_eq!(service.fake.state().mode, OperationMode::Manual);
    }

    #[tokio::test]
    async fn mode_failure_keeps_assumed_auto() {
        let (session, fake, mut rx) = setup();
        fake.state().offline = true;
        assert!(!refresh_mode(&session, &*fake).await);
        assert_eq!(session.read(|s| s.mode()), OperationMode::Auto);
        assert!(rx.try_recv().is_ok());

        fake.state().offline = false;
        fake.state().mode = OperationMode::Manual;
        assert!(refresh_mode(&session, &*fake).await);
        assert_eq!(session.read(|s| s.mode()), OperationMode::Manual);
    }
}
