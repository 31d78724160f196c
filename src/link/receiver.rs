//! # Receiver Link Session
//!
//! The receiver listens continuously. Every control frame drives the
//! actuator outputs; a request flagged in the frame is answered right away
//! and then forgotten.
//!
//! Calibration writes arrive as two frames: a control frame announcing the
//! channel, then a calibration frame with the values. The values are only
//! accepted when they immediately follow their announcement. Control frames
//! never touch the stored calibration.

use tracing::{debug, info, warn};

use super::signal::SignalQualityEstimator;
use super::LinkState;
use crate::calibration::mapping::ChannelCalibration;
use crate::hardware::{ActuatorOutput, BatterySensor, Clock, Radio};
use crate::packet::decoder::decode_frame;
use crate::packet::encoder::encode_frame;
use crate::packet::protocol::{
    CalibrationFrame, ControlFrame, Frame, Request, StatusFrame, NUM_PRIMARY_CHANNELS,
};
use crate::settings::storage::Storage;
use crate::settings::store::{CalibrationStore, NUM_CALIBRATED_CHANNELS};

/// Lowest pulse width ever sent to an actuator (µs)
pub const DEFAULT_PULSE_MIN_US: u16 = 1000;

/// Highest pulse width ever sent to an actuator (µs)
pub const DEFAULT_PULSE_MAX_US: u16 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub pulse_min_us: u16,
    pub pulse_max_us: u16,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            pulse_min_us: DEFAULT_PULSE_MIN_US,
            pulse_max_us: DEFAULT_PULSE_MAX_US,
        }
    }
}

impl ReceiverConfig {
    /// Clamp a primary channel value into the safe pulse range
    #[must_use]
    pub fn clamp_pulse(&self, value: u16) -> u16 {
        value.clamp(self.pulse_min_us, self.pulse_max_us)
    }

    /// Scale an auxiliary value (0-255) onto the safe pulse range
    #[must_use]
    pub fn scale_aux(&self, value: u8) -> u16 {
        let span = u32::from(self.pulse_max_us - self.pulse_min_us);
        self.pulse_min_us + (span * u32::from(value) / u32::from(u8::MAX)) as u16
    }
}

/// What a poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was waiting
    Idle,
    /// A control frame was applied
    Control { request: Request },
    /// An announced calibration write was stored and echoed
    CalibrationStored { channel: u8, persisted: bool },
    /// A frame was dropped without effect
    Discarded { frame_type: u8 },
}

/// Receiver side of the link
///
/// Owns the receiver's copy of the calibration settings and the storage
/// they persist to.
#[derive(Debug)]
pub struct ReceiverSession<S: Storage> {
    config: ReceiverConfig,
    state: LinkState,
    estimator: SignalQualityEstimator,
    store: CalibrationStore,
    storage: S,
    announced_write: Option<u8>,
    battery: f32,
}

impl<S: Storage> ReceiverSession<S> {
    pub fn new(
        config: ReceiverConfig,
        estimator: SignalQualityEstimator,
        store: CalibrationStore,
        storage: S,
    ) -> Self {
        Self {
            config,
            state: LinkState::default(),
            estimator,
            store,
            storage,
            announced_write: None,
            battery: 0.0,
        }
    }

    /// Handle at most one waiting frame
    pub fn poll<R, C, A, B>(
        &mut self,
        radio: &mut R,
        clock: &C,
        outputs: &mut A,
        battery: &mut B,
    ) -> PollOutcome
    where
        R: Radio,
        C: Clock,
        A: ActuatorOutput,
        B: BatterySensor,
    {
        self.estimator.tick(clock.now_ms());

        let Some(raw) = radio.try_receive() else {
            return PollOutcome::Idle;
        };
        let now = clock.now_ms();

        match decode_frame(&raw) {
            Frame::Control(control) => {
                if let Some(channel) = self.announced_write.take() {
                    debug!("Calibration write for channel {} never arrived", channel);
                }

                self.estimator.probe(radio.carrier_detected());
                if let Some(previous) = self.state.last_receive_ms {
                    self.estimator.add_interval(now.saturating_sub(previous));
                }
                self.state.last_receive_ms = Some(now);

                self.apply_outputs(&control, outputs);
                self.answer(&control, radio, battery, now);

                PollOutcome::Control {
                    request: control.request,
                }
            }
            Frame::CalibrationSet(calibration) => {
                match self.announced_write.take() {
                    Some(channel) if channel == calibration.channel => {
                        self.store_calibration(&calibration, radio, now)
                    }
                    _ => {
                        debug!(
                            "Discarding unannounced calibration write for channel {}",
                            calibration.channel
                        );
                        PollOutcome::Discarded {
                            frame_type: raw[0],
                        }
                    }
                }
            }
            other => {
                self.announced_write = None;
                debug!("Discarding frame type {}", other.frame_type());
                PollOutcome::Discarded {
                    frame_type: other.frame_type(),
                }
            }
        }
    }

    fn apply_outputs<A: ActuatorOutput>(&self, control: &ControlFrame, outputs: &mut A) {
        for (channel, &value) in control.channels.iter().enumerate() {
            outputs.set_pulse_width(channel, self.config.clamp_pulse(value));
        }
        for (index, &value) in control.aux.iter().enumerate() {
            outputs.set_pulse_width(NUM_PRIMARY_CHANNELS + index, self.config.scale_aux(value));
        }
    }

    fn answer<R: Radio, B: BatterySensor>(
        &mut self,
        control: &ControlFrame,
        radio: &mut R,
        battery: &mut B,
        now: u64,
    ) {
        match control.request {
            Request::None => {}
            Request::Status => {
                self.battery = battery.read_voltage();
                let status = StatusFrame {
                    good_signal: self.estimator.good_signal(),
                    signal_rating: self.estimator.rating(),
                    battery: self.battery,
                };
                self.reply(radio, &Frame::Status(status), now);
            }
            Request::CalibrationGet => {
                let channel = usize::from(control.calibration_channel);
                if channel >= NUM_CALIBRATED_CHANNELS {
                    warn!("Calibration read of unknown channel {}", channel);
                    return;
                }
                let frame = CalibrationFrame {
                    channel: control.calibration_channel,
                    params: self.store.channel(channel).to_params(),
                };
                self.reply(radio, &Frame::CalibrationGet(frame), now);
            }
            Request::CalibrationSet => {
                self.announced_write = Some(control.calibration_channel);
            }
        }
    }

    fn store_calibration<R: Radio>(
        &mut self,
        calibration: &CalibrationFrame,
        radio: &mut R,
        now: u64,
    ) -> PollOutcome {
        let channel = usize::from(calibration.channel);
        if channel >= NUM_CALIBRATED_CHANNELS {
            warn!("Calibration write of unknown channel {}", channel);
            return PollOutcome::Discarded {
                frame_type: Frame::CalibrationSet(*calibration).frame_type(),
            };
        }

        *self.store.channel_mut(channel) = ChannelCalibration::from_params(calibration.params);
        let persisted = match self.store.persist(&mut self.storage) {
            Ok(written) => written,
            Err(e) => {
                warn!("Failed to persist received calibration: {}", e);
                false
            }
        };
        if persisted {
            info!("Stored calibration for channel {}", channel);
        }

        let echo = CalibrationFrame {
            channel: calibration.channel,
            params: self.store.channel(channel).to_params(),
        };
        self.reply(radio, &Frame::CalibrationGet(echo), now);

        PollOutcome::CalibrationStored {
            channel: calibration.channel,
            persisted,
        }
    }

    /// Briefly switch to transmit for one reply frame
    fn reply<R: Radio>(&mut self, radio: &mut R, frame: &Frame, now: u64) {
        radio.set_listening(false);
        match radio.send(&encode_frame(frame)) {
            Ok(()) => self.state.last_transmit_ms = Some(now),
            Err(e) => warn!("Failed to send reply: {}", e),
        }
        radio.set_listening(true);
    }

    #[must_use]
    pub fn state(&self) -> &LinkState {
        &self.state
    }

    #[must_use]
    pub fn estimator(&self) -> &SignalQualityEstimator {
        &self.estimator
    }

    /// The receiver's copy of the calibration settings
    #[must_use]
    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    /// Battery voltage sent with the last status report
    #[must_use]
    pub fn last_battery(&self) -> f32 {
        self.battery
    }
}
