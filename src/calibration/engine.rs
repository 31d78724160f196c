//! # Calibration Engine
//!
//! Interactive calibration and channel-reversal workflow driven by a single
//! button and the sticks themselves.
//!
//! ## Pages
//!
//! ```text
//!            long                       long / any press on Saved
//!  Closed ─────────► Calibrate ────────────────────────────────► Reverse
//!     ▲                                                             │
//!     └──────────────────── long (nothing selected) ────────────────┘
//! ```
//!
//! ### Calibrate
//!
//! | State | Short press | Long press | Idle |
//! |-------|-------------|------------|------|
//! | ChannelSelect | select next channel | exit to Reverse | select the stick being moved |
//! | ParameterAdjust | skip parameter | commit sample + bias, advance | cross stick adjusts bias |
//! | Saved | exit to Reverse | exit to Reverse | |
//!
//! The bias of a channel is adjusted with the stick on the other axis of the
//! hand not holding the calibrated channel: aileron for throttle and rudder,
//! rudder for elevator, aileron and channel 5.
//!
//! ### Reverse
//!
//! With nothing selected, moving a stick or a short press selects a channel
//! and a long press closes the page. With a channel selected, a short press
//! deselects it and a long press toggles its direction, but only while the
//! cross stick is pushed towards the new direction: positive to reverse a
//! normal channel, negative to restore a reversed one.
//!
//! ## Remote Mirror
//!
//! Every committed channel is queued for writing to the receiver's copy of
//! the settings. The link layer drains the queue through
//! [`CalibrationEngine::next_remote_request`] and reports replies through
//! [`CalibrationEngine::handle_remote_reply`].

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use super::button::{ButtonDetector, Press, DEFAULT_LONG_PRESS_MS};
use super::mapping::{to_wire_value, ChannelCalibration, Parameter};
use crate::packet::protocol::{channels, CalibrationFrame, NUM_PRIMARY_CHANNELS};
use crate::settings::storage::Storage;
use crate::settings::store::{CalibrationStore, NUM_CALIBRATED_CHANNELS};

/// Tunables of the calibration workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Hold time of a long press
    pub long_press_ms: u64,
    /// Cross-stick deflection needed to adjust bias or confirm a reversal
    pub deflection_threshold: u16,
    /// Stick deflection that selects a channel
    pub saliency_threshold: u16,
    /// Bias change per adjustment
    pub bias_step: u16,
    /// Minimum time between bias adjustments
    pub cooldown_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            long_press_ms: DEFAULT_LONG_PRESS_MS,
            deflection_threshold: 300,
            saliency_threshold: 400,
            bias_step: 4,
            cooldown_ms: 150,
        }
    }
}

/// Which page the engine is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Closed,
    Calibrate,
    Reverse { selected: Option<usize> },
}

/// Progress through the calibration page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    ChannelSelect,
    ParameterAdjust { channel: usize, parameter: Parameter },
    Saved { channel: usize },
}

/// Per-visit state of the calibration page, reset whenever the page opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSession {
    pub state: CalibrationState,
    pub bias: i32,
    pub last_adjust_ms: Option<u64>,
    next_manual: usize,
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self {
            state: CalibrationState::ChannelSelect,
            bias: 0,
            last_adjust_ms: None,
            next_manual: 0,
        }
    }
}

impl CalibrationSession {
    /// Next channel in manual selection order
    fn take_manual_channel(&mut self) -> usize {
        let channel = self.next_manual;
        self.next_manual = (self.next_manual + 1) % NUM_PRIMARY_CHANNELS;
        channel
    }

    fn clear_bias(&mut self) {
        self.bias = 0;
        self.last_adjust_ms = None;
    }
}

/// What an update did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The calibration page opened
    Opened,
    ChannelSelected(usize),
    ParameterSkipped { channel: usize, parameter: Parameter },
    ParameterCommitted { channel: usize, parameter: Parameter, value: u16 },
    /// The last parameter was committed
    Saved { channel: usize, persisted: bool },
    /// Left the calibration page for the reverse page
    Exit,
    Deselected(usize),
    Reversed { channel: usize, reversed: bool, persisted: bool },
    /// The page closed
    Closed,
}

/// Calibration exchange waiting for the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRequest {
    Get { channel: usize },
    Set { channel: usize, calibration: ChannelCalibration },
}

impl RemoteRequest {
    #[must_use]
    pub fn channel(&self) -> usize {
        match self {
            RemoteRequest::Get { channel } | RemoteRequest::Set { channel, .. } => *channel,
        }
    }
}

/// Channel whose stick adjusts the bias of `channel`
#[must_use]
pub fn adjust_axis(channel: usize) -> usize {
    match channel {
        channels::THROTTLE | channels::RUDDER => channels::AILERON,
        _ => channels::RUDDER,
    }
}

/// Calibration and reversal state machine
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    config: EngineConfig,
    button: ButtonDetector,
    mode: Mode,
    session: CalibrationSession,
    pending: VecDeque<RemoteRequest>,
    remote: [Option<ChannelCalibration>; NUM_CALIBRATED_CHANNELS],
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl CalibrationEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            button: ButtonDetector::new(config.long_press_ms),
            mode: Mode::Closed,
            session: CalibrationSession::default(),
            pending: VecDeque::new(),
            remote: [None; NUM_CALIBRATED_CHANNELS],
        }
    }

    /// Map raw samples through the stored curves into wire values
    #[must_use]
    pub fn map_channels(
        store: &CalibrationStore,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
    ) -> [u16; NUM_PRIMARY_CHANNELS] {
        let mut mapped = [0u16; NUM_PRIMARY_CHANNELS];
        for (channel, value) in mapped.iter_mut().enumerate() {
            *value = to_wire_value(store.channel(channel).map_value(raw[channel]));
        }
        mapped
    }

    /// Advance the state machine by one sample of the inputs
    pub fn update<S: Storage>(
        &mut self,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
        button: bool,
        now: u64,
        store: &mut CalibrationStore,
        storage: &mut S,
    ) -> Option<EngineEvent> {
        let press = self.button.update(button, now);

        let event = match self.mode {
            Mode::Closed => match press {
                Some(Press::Long) => Some(self.open()),
                _ => None,
            },
            Mode::Calibrate => self.update_calibrate(press, raw, now, store, storage),
            Mode::Reverse { selected } => self.update_reverse(selected, press, raw, store, storage),
        };

        if let Some(event) = event {
            debug!("Calibration event: {:?}", event);
        }
        event
    }

    fn open(&mut self) -> EngineEvent {
        self.mode = Mode::Calibrate;
        self.session = CalibrationSession::default();
        info!("Calibration page opened");
        EngineEvent::Opened
    }

    fn exit_to_reverse(&mut self) -> EngineEvent {
        self.mode = Mode::Reverse { selected: None };
        EngineEvent::Exit
    }

    fn update_calibrate<S: Storage>(
        &mut self,
        press: Option<Press>,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
        now: u64,
        store: &mut CalibrationStore,
        storage: &mut S,
    ) -> Option<EngineEvent> {
        match self.session.state {
            CalibrationState::ChannelSelect => match press {
                Some(Press::Short) => {
                    let channel = self.session.take_manual_channel();
                    Some(self.begin_adjust(channel))
                }
                Some(Press::Long) => Some(self.exit_to_reverse()),
                None => self
                    .salient_channel(raw, store)
                    .map(|channel| self.begin_adjust(channel)),
            },
            CalibrationState::ParameterAdjust { channel, parameter } => match press {
                Some(Press::Short) => {
                    self.session.clear_bias();
                    self.session.state = CalibrationState::ParameterAdjust {
                        channel,
                        parameter: next_parameter(parameter),
                    };
                    Some(EngineEvent::ParameterSkipped { channel, parameter })
                }
                Some(Press::Long) => Some(self.commit(channel, parameter, raw, store, storage)),
                None => {
                    self.accumulate_bias(channel, raw, now, store);
                    None
                }
            },
            CalibrationState::Saved { .. } => press.map(|_| self.exit_to_reverse()),
        }
    }

    fn begin_adjust(&mut self, channel: usize) -> EngineEvent {
        self.session.clear_bias();
        self.session.state = CalibrationState::ParameterAdjust {
            channel,
            parameter: Parameter::RawMin,
        };
        EngineEvent::ChannelSelected(channel)
    }

    fn commit<S: Storage>(
        &mut self,
        channel: usize,
        parameter: Parameter,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
        store: &mut CalibrationStore,
        storage: &mut S,
    ) -> EngineEvent {
        let value = self.candidate_value(channel, parameter, raw, store);
        store.channel_mut(channel).set(parameter, value);
        self.session.clear_bias();

        debug!(
            "Channel {} {} committed as {}",
            channel,
            parameter.label(),
            value
        );

        if parameter == Parameter::OutMax {
            let persisted = persist(store, storage);
            self.queue_remote_set(channel, store.channel(channel));
            self.session.state = CalibrationState::Saved { channel };
            info!("Channel {} calibration saved", channel);
            EngineEvent::Saved { channel, persisted }
        } else {
            self.session.state = CalibrationState::ParameterAdjust {
                channel,
                parameter: next_parameter(parameter),
            };
            EngineEvent::ParameterCommitted {
                channel,
                parameter,
                value,
            }
        }
    }

    fn update_reverse<S: Storage>(
        &mut self,
        selected: Option<usize>,
        press: Option<Press>,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
        store: &mut CalibrationStore,
        storage: &mut S,
    ) -> Option<EngineEvent> {
        match selected {
            None => {
                let channel = match press {
                    Some(Press::Long) => {
                        self.mode = Mode::Closed;
                        info!("Calibration page closed");
                        return Some(EngineEvent::Closed);
                    }
                    Some(Press::Short) => Some(self.session.take_manual_channel()),
                    None => self.salient_channel(raw, store),
                }?;
                self.mode = Mode::Reverse {
                    selected: Some(channel),
                };
                Some(EngineEvent::ChannelSelected(channel))
            }
            Some(channel) => match press {
                Some(Press::Short) => {
                    self.mode = Mode::Reverse { selected: None };
                    Some(EngineEvent::Deselected(channel))
                }
                Some(Press::Long) => self.toggle_reversed(channel, raw, store, storage),
                None => None,
            },
        }
    }

    fn toggle_reversed<S: Storage>(
        &mut self,
        channel: usize,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
        store: &mut CalibrationStore,
        storage: &mut S,
    ) -> Option<EngineEvent> {
        let deflection = deflection(adjust_axis(channel), raw, store);
        let threshold = i32::from(self.config.deflection_threshold);
        let currently_reversed = store.channel(channel).is_reversed();

        let consistent = if currently_reversed {
            deflection < -threshold
        } else {
            deflection > threshold
        };
        if !consistent {
            debug!(
                "Reversal of channel {} ignored (deflection {})",
                channel, deflection
            );
            return None;
        }

        store.channel_mut(channel).toggle_reversed();
        let persisted = persist(store, storage);
        self.queue_remote_set(channel, store.channel(channel));

        let reversed = !currently_reversed;
        info!("Channel {} reversed: {}", channel, reversed);
        Some(EngineEvent::Reversed {
            channel,
            reversed,
            persisted,
        })
    }

    /// First channel whose stick is away from its stored center
    fn salient_channel(
        &self,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
        store: &CalibrationStore,
    ) -> Option<usize> {
        let threshold = i32::from(self.config.saliency_threshold);
        (0..NUM_PRIMARY_CHANNELS).find(|&channel| deflection(channel, raw, store).abs() > threshold)
    }

    fn accumulate_bias(
        &mut self,
        channel: usize,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
        now: u64,
        store: &CalibrationStore,
    ) {
        let deflection = deflection(adjust_axis(channel), raw, store);
        if deflection.abs() <= i32::from(self.config.deflection_threshold) {
            return;
        }
        if let Some(last) = self.session.last_adjust_ms {
            if now.saturating_sub(last) < self.config.cooldown_ms {
                return;
            }
        }

        let step = i32::from(self.config.bias_step);
        let delta = if deflection > 0 { step } else { -step };
        self.session.bias = self.session.bias.saturating_add(delta);
        self.session.last_adjust_ms = Some(now);
    }

    /// Value a long press would commit for `parameter` right now
    fn candidate_value(
        &self,
        channel: usize,
        parameter: Parameter,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
        store: &CalibrationStore,
    ) -> u16 {
        let sample = raw[channel];
        let base = if parameter.is_raw() {
            i32::from(sample)
        } else {
            store.channel(channel).map_value(sample)
        };
        to_wire_value(base.saturating_add(self.session.bias))
    }

    /// Value that would be committed now, while adjusting a parameter
    #[must_use]
    pub fn preview(
        &self,
        raw: &[u16; NUM_PRIMARY_CHANNELS],
        store: &CalibrationStore,
    ) -> Option<u16> {
        match self.session.state {
            CalibrationState::ParameterAdjust { channel, parameter } if self.mode == Mode::Calibrate => {
                Some(self.candidate_value(channel, parameter, raw, store))
            }
            _ => None,
        }
    }

    // ==================== Remote Mirror ====================

    fn queue_remote_set(&mut self, channel: usize, calibration: ChannelCalibration) {
        self.pending.retain(|request| request.channel() != channel);
        self.pending
            .push_back(RemoteRequest::Set { channel, calibration });
    }

    /// Ask the receiver for its copy of `channel`
    pub fn request_remote_read(&mut self, channel: usize) {
        if channel >= NUM_CALIBRATED_CHANNELS {
            warn!("Ignoring remote read of channel {}", channel);
            return;
        }
        if self.pending.iter().any(|request| request.channel() == channel) {
            return;
        }
        self.pending.push_back(RemoteRequest::Get { channel });
    }

    /// Oldest calibration exchange still waiting for a reply
    #[must_use]
    pub fn next_remote_request(&self) -> Option<RemoteRequest> {
        self.pending.front().copied()
    }

    /// Record a calibration frame sent back by the receiver
    ///
    /// Returns `true` when it completed an outstanding request.
    pub fn handle_remote_reply(&mut self, frame: &CalibrationFrame) -> bool {
        let channel = usize::from(frame.channel);
        if channel >= NUM_CALIBRATED_CHANNELS {
            return false;
        }

        let calibration = ChannelCalibration::from_params(frame.params);
        self.remote[channel] = Some(calibration);

        let Some(position) = self
            .pending
            .iter()
            .position(|request| request.channel() == channel)
        else {
            return false;
        };

        let completed = match self.pending[position] {
            RemoteRequest::Get { .. } => true,
            RemoteRequest::Set {
                calibration: wanted,
                ..
            } => wanted == calibration,
        };
        if completed {
            self.pending.remove(position);
            debug!("Remote calibration of channel {} in sync", channel);
        }
        completed
    }

    /// Last calibration of `channel` reported by the receiver
    #[must_use]
    pub fn remote_calibration(&self, channel: usize) -> Option<ChannelCalibration> {
        self.remote.get(channel).copied().flatten()
    }

    /// Number of calibration exchanges still waiting
    #[must_use]
    pub fn pending_remote(&self) -> usize {
        self.pending.len()
    }

    // ==================== Accessors ====================

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.mode != Mode::Closed
    }
}

fn next_parameter(parameter: Parameter) -> Parameter {
    Parameter::ALL[(parameter.index() + 1) % Parameter::ALL.len()]
}

/// Signed distance of a stick from its stored center
fn deflection(
    channel: usize,
    raw: &[u16; NUM_PRIMARY_CHANNELS],
    store: &CalibrationStore,
) -> i32 {
    i32::from(raw[channel]) - i32::from(store.channel(channel).raw_center)
}

fn persist<S: Storage>(store: &mut CalibrationStore, storage: &mut S) -> bool {
    match store.persist(storage) {
        Ok(written) => written,
        Err(e) => {
            warn!("Failed to persist calibration: {}", e);
            false
        }
    }
}
