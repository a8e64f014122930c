//! Per-channel sine generator.

use std::f64::consts::TAU;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::SharedDevice;
use crate::device::{Channel, ChannelAddress, CHANNEL_COUNT};
use crate::error::Result;

/// Output code of a channel at time `t`.
///
/// A frequency of 0 holds `amplitude`; otherwise the output swings between
/// 0 and `amplitude` around `amplitude / 2`.
pub fn sample(amplitude: u16, frequency_hz: u64, t: Duration) -> u16 {
    if frequency_hz == 0 {
        return amplitude;
    }
    let cycles = (frequency_hz as f64 * t.as_secs_f64()).fract();
    let half = amplitude as f64 / 2.0;
    (half * (1.0 + (TAU * cycles).sin()))
        .round()
        .clamp(0.0, amplitude as f64) as u16
}

/// Frequency and amplitude of every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformTable {
    frequency_hz: [u64; CHANNEL_COUNT],
    amplitude: [u16; CHANNEL_COUNT],
}

impl WaveformTable {
    pub fn new(frequency_hz: u64, amplitude: u16) -> Self {
        Self {
            frequency_hz: [frequency_hz; CHANNEL_COUNT],
            amplitude: [amplitude; CHANNEL_COUNT],
        }
    }

    pub fn set_frequency(&mut self, ch: Channel, hz: u64) {
        self.frequency_hz[ch.as_usize()] = hz;
    }

    pub fn set_amplitude(&mut self, ch: Channel, code: u16) {
        self.amplitude[ch.as_usize()] = code;
    }

    pub fn set_all_amplitudes(&mut self, code: u16) {
        self.amplitude = [code; CHANNEL_COUNT];
    }

    pub fn frequency(&self, ch: Channel) -> u64 {
        self.frequency_hz[ch.as_usize()]
    }

    pub fn amplitude(&self, ch: Channel) -> u16 {
        self.amplitude[ch.as_usize()]
    }

    pub fn codes_at(&self, t: Duration) -> [u16; CHANNEL_COUNT] {
        let mut codes = [0; CHANNEL_COUNT];
        for (i, code) in codes.iter_mut().enumerate() {
            *code = sample(self.amplitude[i], self.frequency_hz[i], t);
        }
        codes
    }
}

/// Commands accepted by a running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformCommand {
    SetFrequency { channel: Channel, hz: u64 },
    SetAmplitude { channel: Channel, code: u16 },
    SetAllAmplitudes { code: u16 },
    /// The device lost its registers; rewrite every channel on the next tick.
    Resync,
    Stop,
}

/// Background task writing the waveform table to the device.
pub struct WaveformWorker {
    table: WaveformTable,
    device: SharedDevice,
    commands: Receiver<WaveformCommand>,
    interval: Duration,
    last: Option<[u16; CHANNEL_COUNT]>,
}

impl WaveformWorker {
    pub fn new(
        table: WaveformTable,
        device: SharedDevice,
        commands: Receiver<WaveformCommand>,
        interval: Duration,
    ) -> Self {
        Self {
            table,
            device,
            commands,
            interval,
            last: None,
        }
    }

    /// Run until [`WaveformCommand::Stop`] arrives or every sender is dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        info!(interval_us = self.interval.as_micros() as u64, "waveform worker started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(WaveformCommand::SetFrequency { channel, hz }) => {
                        self.table.set_frequency(channel, hz);
                        debug!(channel = channel.id(), hz, "frequency updated");
                    }
                    Some(WaveformCommand::SetAmplitude { channel, code }) => {
                        self.table.set_amplitude(channel, code);
                        debug!(channel = channel.id(), code, "amplitude updated");
                    }
                    Some(WaveformCommand::SetAllAmplitudes { code }) => {
                        self.table.set_all_amplitudes(code);
                        debug!(code, "all amplitudes updated");
                    }
                    Some(WaveformCommand::Resync) => {
                        self.last = None;
                        debug!("waveform resync");
                    }
                    Some(WaveformCommand::Stop) | None => break,
                },
                _ = ticker.tick() => {
                    if let Err(err) = self.write_tick(started.elapsed()) {
                        error!(%err, "waveform update failed");
                    }
                }
            }
        }

        info!("waveform worker stopped");
    }

    /// Write the codes that changed since the last tick, then load once.
    fn write_tick(&mut self, t: Duration) -> Result<()> {
        let codes = self.table.codes_at(t);
        let changed: Vec<Channel> = Channel::all()
            .filter(|ch| {
                self.last
                    .map_or(true, |last| last[ch.as_usize()] != codes[ch.as_usize()])
            })
            .collect();
        if changed.is_empty() {
            return Ok(());
        }

        let mut device = self.device.lock()?;
        if changed.len() == CHANNEL_COUNT && codes.iter().all(|&c| c == codes[0]) {
            device.set_code(codes[0], ChannelAddress::AllChannels)?;
        } else {
            for ch in &changed {
                device.set_code(codes[ch.as_usize()], ChannelAddress::Single(*ch))?;
            }
        }
        device.load()?;
        drop(device);

        self.last = Some(codes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use std::collections::HashSet;

    #[test]
    fn test_sample_dc() {
        assert_eq!(sample(0x8888, 0, Duration::from_millis(3)), 0x8888);
        assert_eq!(sample(0, 0, Duration::ZERO), 0);
    }

    #[test]
    fn test_sample_sine() {
        let amp = 0x8888;
        assert_eq!(sample(amp, 1000, Duration::ZERO), amp / 2);
        assert_eq!(sample(amp, 1000, Duration::from_micros(250)), amp);
        assert_eq!(sample(amp, 1000, Duration::from_micros(750)), 0);
        // Whole periods later the phase repeats.
        assert_eq!(sample(amp, 1000, Duration::from_micros(5250)), amp);
    }

    #[test]
    fn test_sample_stays_in_range() {
        for us in (0..2000).step_by(37) {
            let code = sample(1000, 3, Duration::from_micros(us));
            assert!(code <= 1000);
        }
    }

    #[test]
    fn test_default_rate_resolves_sine() {
        let config = DriverConfig::default();
        let tick = Duration::from_micros(config.tick_interval_us);
        let codes: HashSet<u16> = (0..40u32)
            .map(|k| sample(0x8888, config.default_frequency_hz, tick * k))
            .collect();
        assert!(codes.len() > 4, "codes: {codes:?}");
        assert!(codes.contains(&0x8888));
        assert!(codes.contains(&0));
    }

    #[test]
    fn test_table_codes() {
        let mut table = WaveformTable::new(0, 0x1000);
        let ch = Channel::new(9).unwrap();
        table.set_amplitude(ch, 0x2000);
        table.set_frequency(Channel::new(10).unwrap(), 1000);

        let codes = table.codes_at(Duration::from_micros(250));
        assert_eq!(codes[0], 0x1000);
        assert_eq!(codes[9], 0x2000);
        assert_eq!(codes[10], 0x1000);

        table.set_all_amplitudes(7);
        assert_eq!(table.amplitude(ch), 7);
        assert_eq!(table.frequency(ch), 0);
    }
}
