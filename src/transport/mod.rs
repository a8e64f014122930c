//! Hardware backends the driver can be bound to.

#[cfg(feature = "raspberry")]
pub mod raspberry;
pub mod sim;

pub use sim::SimulatedAd5370;

use crate::config::{Backend, DriverConfig};
use crate::device::DacDevice;
use crate::error::Result;

/// Open the backend named in the configuration.
pub fn open(config: &DriverConfig) -> Result<Box<dyn DacDevice>> {
    match config.backend {
        Backend::Simulated => Ok(Box::new(
            SimulatedAd5370::new().into_driver(config.vref, config.busy_poll_limit),
        )),
        #[cfg(feature = "raspberry")]
        Backend::Raspberry => Ok(Box::new(raspberry::open(config)?)),
        #[cfg(not(feature = "raspberry"))]
        Backend::Raspberry => Err(crate::error::DriverError::BackendUnavailable("raspberry")),
    }
}
