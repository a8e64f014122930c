//! Process-wide controller behind the C surface.

use std::sync::Mutex;

use once_cell::sync::OnceCell;
use tracing::{error, info};

use super::types::NanoStatus;
use crate::config::DriverConfig;
use crate::error::Result;
use crate::logging;
use crate::runtime::Controller;

static CONTROLLER: OnceCell<Mutex<Controller>> = OnceCell::new();

fn controller() -> Result<&'static Mutex<Controller>> {
    CONTROLLER.get_or_try_init(|| {
        let config = DriverConfig::from_env()?;
        logging::init(&config);
        let controller = Controller::new(config)?;
        info!("global controller initialized");
        Ok(Mutex::new(controller))
    })
}

/// Run `f` against the global controller and turn the outcome into a status.
pub(crate) fn with_controller<T>(
    op: &'static str,
    f: impl FnOnce(&mut Controller) -> Result<T>,
) -> std::result::Result<T, NanoStatus> {
    let outcome = controller().and_then(|cell| {
        let mut guard = cell.lock()?;
        f(&mut guard)
    });
    outcome.map_err(|err| {
        error!(op, %err, "call failed");
        NanoStatus::from(&err)
    })
}

/// Same as [`with_controller`] for calls that only report a status.
pub(crate) fn status(op: &'static str, f: impl FnOnce(&mut Controller) -> Result<()>) -> u32 {
    match with_controller(op, f) {
        Ok(()) => NanoStatus::Ok.into(),
        Err(status) => status.into(),
    }
}
