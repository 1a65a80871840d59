//! Client-side state and command handling for the greenhouse control
//! dashboard: device registry, pending/server state reconciliation, command
//! dispatch and background polling against the HTTP control service.

pub mod config;
pub mod dashboard;
pub mod device;
pub mod dispatcher;
pub mod display;
pub mod fake;
pub mod http;
pub mod notice;
pub mod poller;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod store;
pub mod types;
pub mod usage;
