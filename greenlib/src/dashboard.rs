//! The mounted dashboard: one state store, one polling scheduler and the
//! command paths that act on them.
//!
//! A `Dashboard` starts unmounted with everything OFF and the mode assumed to
//! be AUTO. [`Dashboard::mount`] starts the timers and the one-shot mode
//! fetch; [`Dashboard::teardown`] (or dropping the dashboard) stops them and
//! makes sure no late network response changes state afterwards.

use crate::config::DashboardConfig;
use crate::device::Device;
use crate::dispatcher::{self, ConfirmReport, DispatchError};
use crate::http::HttpControlService;
use crate::notice::{NoticeReceiver, NoticeSink};
use crate::poller::{self, PollSettings, PollingScheduler};
use crate::reconcile::DeviceView;
use crate::service::ControlService;
use crate::session::Session;
use crate::store::StateStore;
use crate::types::{Ack, Direction, EditError, Magnitude, OperationMode};
use crate::usage::DailyUsage;
use std::sync::Arc;

pub struct Dashboard {
    session: Arc<Session>,
    service: Arc<dyn ControlService>,
    settings: PollSettings,
    scheduler: Option<PollingScheduler>,
}

impl Dashboard {
    pub fn new(service: Arc<dyn ControlService>, config: &DashboardConfig) -> (Self, NoticeReceiver) {
        let (sink, rx) = NoticeSink::channel();
        let store = StateStore::new(DailyUsage::with_timezone_name(config.timezone.as_deref()));
        let dashboard = Self {
            session: Arc::new(Session::new(store, sink)),
            service,
            settings: config.poll_settings(),
            scheduler: None,
        };
        (dashboard, rx)
    }

    // Dashboard backed by the HTTP control service named in `config`.
    pub fn connect(config: &DashboardConfig) -> anyhow::Result<(Self, NoticeReceiver)> {
        config.validate()?;
        let service = HttpControlService::new(&config.base_url, config.request_timeout())?;
        log::info!("Using control service at '{}'", service.base_url());
        Ok(Self::new(Arc::new(service), config))
    }

    // Starts polling and fetches the operation mode once. Needs a tokio
    // runtime. Mounting twice is a no-op.
    pub fn mount(&mut self) {
        if self.scheduler.is_some() {
            return;
        }
        if !self.session.is_live() {
            log::warn!("Refusing to mount a dashboard that was torn down");
            return;
        }
        let mut scheduler =
            PollingScheduler::start(self.session.clone(), self.service.clone(), self.settings);
        let session = self.session.clone();
        let service = self.service.clone();
        scheduler.spawn_once(async move {
            poller::refresh_mode(&session, &*service).await;
        });
        self.scheduler = Some(scheduler);
    }

    pub fn is_mounted(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.is_running())
    }

    pub fn teardown(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        self.session.close();
    }

    pub fn mode(&self) -> OperationMode {
        self.session.read(|s| s.mode())
    }

    pub fn views(&self) -> Vec<DeviceView> {
        self.session.read(|s| s.views())
    }

    // Runs `f` against a consistent view of the store.
    pub fn read<R>(&self, f: impl FnOnce(&StateStore) -> R) -> R {
        self.session.read(f)
    }

    pub fn select(
        &self,
        device: Device,
        direction: Direction,
        magnitude: Magnitude,
    ) -> Result<(), EditError> {
        self.session
            .apply(|s| s.select(device, direction, magnitude))
            .unwrap_or(Err(EditError::Closed))
    }

    pub fn set_toggle(&self, device: Device, on: bool) -> Result<(), EditError> {
        self.session
            .apply(|s| s.set_toggle(device, on))
            .unwrap_or(Err(EditError::Closed))
    }

    pub fn flip_toggle(&self, device: Device) -> Result<bool, EditError> {
        self.session
            .apply(|s| s.flip_toggle(device))
            .unwrap_or(Err(EditError::Closed))
    }

    pub async fn refresh_status(&self) -> bool {
        poller::refresh_status(&self.session, &*self.service).await
    }

    pub async fn refresh_mode(&self) -> bool {
        poller::refresh_mode(&self.session, &*self.service).await
    }

    pub async fn confirm(&self) -> Result<ConfirmReport, DispatchError> {
        dispatcher::confirm(&self.session, &*self.service).await
    }

    pub async fn reset(&self) -> Result<Ack, DispatchError> {
        dispatcher::reset(&self.session, &*self.service).await
    }

    pub async fn set_operation_mode(&self, mode: OperationMode) -> Result<(), DispatchError> {
        dispatcher::set_operation_mode(&self.session, &*self.service, mode).await
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.teardown();
    }
}
