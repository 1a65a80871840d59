use crate::device::Device;
use crate::reconcile;
use crate::service::{ControlService, ServiceError};
use crate::session::Session;
use crate::types::{Ack, ControlRequest, OperationMode};

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("Operation mode is AUTO; switch to MANUAL to control devices")]
    AutoMode,
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("Dashboard is no longer mounted")]
    TornDown,
}

#[derive(Debug, Default, PartialEq)]
pub struct ConfirmReport {
    // Requests the service acknowledged, in the order they were sent.
    pub succeeded: Vec<ControlRequest>,
    // Devices whose request failed, with the reason shown to the user.
    pub failures: Vec<(Device, String)>,
    // Whether the post-confirm status refresh landed.
    pub refreshed: bool,
}

impl ConfirmReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }
}

fn check_writable(session: &Session) -> Result<(), DispatchError> {
    if !session.is_live() {
        return Err(DispatchError::TornDown);
    }
    let mode = session.read(|s| s.mode());
    if reconcile::writes_disabled(mode) {
        let err = DispatchError::AutoMode;
        session.notify_error(err.to_string());
        return Err(err);
    }
    Ok(())
}

// Sends one request per device whose pending state differs from the server,
// one at a time in registry order. A failed device is reported and skipped.
// Afterwards server state is re-read (whatever happened) and pending state is
// cleared.
pub async fn confirm(
    session: &Session,
    service: &dyn ControlService,
) -> Result<ConfirmReport, DispatchError> {
    check_writable(session)?;
    let plan = session.read(|s| s.planned_commands());
    log::info!("Confirming {} device command(s)", plan.len());

    let mut report = ConfirmReport::default();
    for request in plan {
        if !session.is_live() {
            return Err(DispatchError::TornDown);
        }
        log::debug!("Sending {request:?}");
        match service.control(&request).await {
            Ok(_) => {
                session.apply(|s| s.record_usage(&request));
                report.succeeded.push(request);
            }
            Err(err) => {
                session.notify_error(format!("{} control failed: {err}", request.device));
                report.failures.push((request.device, err.to_string()));
            }
        }
    }

    match service.status().await {
        Ok(states) => {
            report.refreshed = session.apply(|s| s.replace_server(states)).is_some();
        }
        Err(err) => session.notify_error(format!("Status query failed: {err}")),
    }

    session
        .apply(|s| s.reset_pending())
        .ok_or(DispatchError::TornDown)?;

    if report.failures.is_empty() {
        session.notify_success("All device commands completed.");
    } else {
        session.notify_success(format!(
            "Device commands completed ({} of {} failed).",
            report.failures.len(),
            report.attempted()
        ));
    }
    Ok(report)
}

// Asks the service to return every device to its rest position. Local state
// is cleared only if the service acknowledges.
pub async fn reset(session: &Session, service: &dyn ControlService) -> Result<Ack, DispatchError> {
    check_writable(session)?;
    match service.reset().await {
        Ok(ack) => {
            session
                .apply(|s| s.clear_after_reset())
                .ok_or(DispatchError::TornDown)?;
            session.notify_success(
                ack.message
                    .clone()
                    .unwrap_or_else(|| "All devices were reset.".to_string()),
            );
            Ok(ack)
        }
        Err(err) => {
            session.notify_error(format!("Reset failed: {err}"));
            Err(err.into())
        }
    }
}

// On acknowledgement the local mode becomes the requested one; any mode the
// service echoes back is ignored.
pub async fn set_operation_mode(
    session: &Session,
    service: &dyn ControlService,
    mode: OperationMode,
) -> Result<(), DispatchError> {
    if !session.is_live() {
        return Err(DispatchError::TornDown);
    }
    match service.set_operation_mode(mode).await {
        Ok(_) => {
            session
                .apply(|s| s.set_mode(mode))
                .ok_or(DispatchError::TornDown)?;
            session.notify_success(format!("Operation mode set to {mode}."));
            Ok(())
        }
        Err(err) => {
            session.notify_error(format!("Changing operation mode failed: {err}"));
            Err(err.into())
        }
    }
}
