//! Controller tying the device, the waveform table and the worker together.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Runtime as TokioRuntime;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::waveform::{WaveformCommand, WaveformTable, WaveformWorker};
use super::SharedDevice;
use crate::config::DriverConfig;
use crate::device::{Channel, ChannelAddress, DacDevice, ReadBackAddr};
use crate::error::{DriverError, Result};
use crate::transport;

struct WorkerHandle {
    commands: mpsc::Sender<WaveformCommand>,
    task: JoinHandle<()>,
}

/// Owns one DAC and the runtime its waveform worker runs on.
pub struct Controller {
    /// Configuration.
    config: DriverConfig,
    /// Device shared with the worker.
    device: SharedDevice,
    /// Settings used to seed the next worker.
    table: WaveformTable,
    /// Running worker, if any.
    worker: Option<WorkerHandle>,
    /// Tokio runtime for the worker.
    tokio_runtime: TokioRuntime,
}

impl Controller {
    /// Open the configured backend and initialize the device.
    pub fn new(config: DriverConfig) -> Result<Self> {
        config.validate()?;
        let device = transport::open(&config)?;
        Self::with_device(config, device)
    }

    /// Use an already opened device.
    pub fn with_device(config: DriverConfig, mut device: Box<dyn DacDevice>) -> Result<Self> {
        config.validate()?;
        device.init(config.ofs0, config.ofs1)?;

        let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.resolved_worker_threads())
            .thread_name("nanodriver")
            .enable_all()
            .build()?;

        info!(backend = ?config.backend, vref = config.vref, "controller ready");

        Ok(Self {
            table: WaveformTable::new(config.default_frequency_hz, config.default_amplitude),
            device: Arc::new(Mutex::new(device)),
            worker: None,
            tokio_runtime,
            config,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Device handle, shared with the worker.
    pub fn device(&self) -> SharedDevice {
        self.device.clone()
    }

    pub fn table(&self) -> &WaveformTable {
        &self.table
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.task.is_finished())
    }

    /// Run `f` with the device locked, loading the outputs afterwards if
    /// `auto_load` is set.
    fn write_device<T>(&self, f: impl FnOnce(&mut dyn DacDevice) -> Result<T>) -> Result<T> {
        let mut device = self.device.lock()?;
        let value = f(&mut **device)?;
        if self.config.auto_load {
            device.load()?;
        }
        Ok(value)
    }

    /// Forward a table change to the running worker.
    fn notify(&self, command: WaveformCommand) -> Result<()> {
        let Some(worker) = &self.worker else {
            return Ok(());
        };
        match worker.commands.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DriverError::QueueFull),
            Err(TrySendError::Closed(_)) => {
                warn!(?command, "waveform worker is gone");
                Ok(())
            }
        }
    }

    /// Write `code` to every channel.
    pub fn set_code_to_all(&mut self, code: u16) -> Result<()> {
        self.write_device(|dev| dev.set_code(code, ChannelAddress::AllChannels))?;
        self.table.set_all_amplitudes(code);
        debug!(code, "code written to all channels");
        self.notify(WaveformCommand::SetAllAmplitudes { code })
    }

    /// Write `code` to one channel; it also becomes the channel's amplitude.
    pub fn set_voltage(&mut self, channel: u8, code: u16) -> Result<()> {
        let channel = Channel::new(channel)?;
        self.write_device(|dev| dev.set_code(code, ChannelAddress::Single(channel)))?;
        self.table.set_amplitude(channel, code);
        debug!(channel = channel.id(), code, "code written");
        self.notify(WaveformCommand::SetAmplitude { channel, code })
    }

    /// Set the waveform frequency of one channel. 0 holds the amplitude.
    pub fn set_freq(&mut self, channel: u8, hz: u64) -> Result<()> {
        let channel = Channel::new(channel)?;
        if hz as f64 >= self.config.nyquist_hz() {
            warn!(
                channel = channel.id(),
                hz,
                nyquist_hz = self.config.nyquist_hz(),
                "frequency at or above half the update rate will alias"
            );
        }
        self.table.set_frequency(channel, hz);
        debug!(channel = channel.id(), hz, "frequency set");
        self.notify(WaveformCommand::SetFrequency { channel, hz })
    }

    /// Frequency (rounded to whole Hz) and amplitude in one call.
    pub fn set_data(&mut self, channel: u8, freq: f64, code: u16) -> Result<()> {
        Channel::new(channel)?;
        if !freq.is_finite() || freq < 0.0 {
            return Err(DriverError::InvalidArgument(format!(
                "frequency must be a non-negative number, got {freq}"
            )));
        }
        self.set_freq(channel, freq.round() as u64)?;
        self.set_voltage(channel, code)
    }

    /// Write the code producing `volts` on one channel and return it.
    pub fn set_output_volts(&mut self, channel: u8, volts: f64) -> Result<u16> {
        let channel = Channel::new(channel)?;
        let code = self.write_device(|dev| dev.set_voltage(volts, channel))?;
        self.table.set_amplitude(channel, code);
        self.notify(WaveformCommand::SetAmplitude { channel, code })?;
        Ok(code)
    }

    pub fn set_gain_all(&mut self, value: u16) -> Result<()> {
        self.write_device(|dev| dev.set_gain(value, ChannelAddress::AllChannels))
    }

    pub fn set_offset_all(&mut self, value: u16) -> Result<()> {
        self.write_device(|dev| dev.set_offset(value, ChannelAddress::AllChannels))
    }

    /// Pulse RESET, then program the configured offset DACs again.
    ///
    /// A running worker is told to rewrite every channel. That command waits
    /// for queue space instead of failing with [`DriverError::QueueFull`].
    pub fn reset_device(&mut self) -> Result<()> {
        {
            let mut device = self.device.lock()?;
            device.reset()?;
            device.init(self.config.ofs0, self.config.ofs1)?;
        }
        info!("device reset");

        if let Some(worker) = &self.worker {
            if worker.commands.blocking_send(WaveformCommand::Resync).is_err() {
                warn!("waveform worker is gone, outputs keep power-on values");
            }
        }
        Ok(())
    }

    /// Switch the outputs to signal ground until the next load.
    pub fn clear_outputs(&mut self) -> Result<()> {
        self.device.lock()?.clear()
    }

    /// Read back the input register feeding the channel's DAC.
    pub fn read_code(&mut self, channel: u8) -> Result<u16> {
        let channel = Channel::new(channel)?;
        let mut device = self.device.lock()?;
        let addr = device.register().active_input_addr(channel);
        device.read_register(addr)
    }

    pub fn read_gain(&mut self, channel: u8) -> Result<u16> {
        let channel = Channel::new(channel)?;
        self.device.lock()?.read_register(ReadBackAddr::Gain(channel))
    }

    pub fn read_offset(&mut self, channel: u8) -> Result<u16> {
        let channel = Channel::new(channel)?;
        self.device.lock()?.read_register(ReadBackAddr::Offset(channel))
    }

    /// Start the waveform worker. Does nothing if it is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("waveform worker already running");
            return Ok(());
        }

        let (commands, receiver) = mpsc::channel(self.config.command_queue);
        let worker = WaveformWorker::new(
            self.table.clone(),
            self.device.clone(),
            receiver,
            Duration::from_micros(self.config.tick_interval_us),
        );
        let task = self.tokio_runtime.spawn(worker.run());
        self.worker = Some(WorkerHandle { commands, task });

        info!("waveform started");
        Ok(())
    }

    /// Stop the worker and wait for it to exit. Does nothing if it is not running.
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            debug!("waveform worker not running");
            return Ok(());
        };

        // A full queue still stops the worker once the sender is dropped.
        let _ = worker.commands.try_send(WaveformCommand::Stop);
        drop(worker.commands);

        if let Err(err) = self.tokio_runtime.block_on(worker.task) {
            warn!(%err, "waveform worker ended abnormally");
        }
        info!("waveform stopped");
        Ok(())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
