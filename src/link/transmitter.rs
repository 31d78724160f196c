//! # Transmitter Link Session
//!
//! One call to [`TransmitterSession::run_cycle`] per control cycle:
//!
//! 1. Decide whether a reply is wanted. When no status report has arrived
//!    for longer than the fetch interval, the cycle requests one, unless a
//!    calibration exchange is waiting, which takes the slot instead.
//! 2. Send the control frame, followed by a calibration frame when it
//!    announces a calibration write.
//! 3. If a reply is wanted, listen for at most the listen duration.
//! 4. Return to transmit mode and tick the signal estimator.

use tracing::{debug, warn};

use super::signal::SignalQualityEstimator;
use super::LinkState;
use crate::calibration::engine::RemoteRequest;
use crate::hardware::{Clock, Radio};
use crate::packet::decoder::decode_frame;
use crate::packet::encoder::encode_frame;
use crate::packet::protocol::{
    CalibrationFrame, ControlFrame, Frame, Request, StatusFrame, NUM_AUX_CHANNELS,
    NUM_PRIMARY_CHANNELS,
};

/// Default time without a status report before one is requested
pub const DEFAULT_FETCH_INTERVAL_MS: u64 = 500;

/// Default upper bound of a listen window
pub const DEFAULT_LISTEN_DURATION_MS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitterConfig {
    pub fetch_interval_ms: u64,
    pub listen_duration_ms: u64,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            fetch_interval_ms: DEFAULT_FETCH_INTERVAL_MS,
            listen_duration_ms: DEFAULT_LISTEN_DURATION_MS,
        }
    }
}

/// Answer received during a listen window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Status(StatusFrame),
    Calibration(CalibrationFrame),
}

/// Outcome of one transmit cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    /// Request carried by the control frame
    pub request: Request,
    /// Whether the control frame left the radio
    pub sent: bool,
    /// Answer to the request, if one arrived in time
    pub reply: Option<Reply>,
}

/// Transmitter side of the link
#[derive(Debug, Clone)]
pub struct TransmitterSession {
    config: TransmitterConfig,
    state: LinkState,
    estimator: SignalQualityEstimator,
    last_status_ms: Option<u64>,
    last_status: Option<StatusFrame>,
}

impl TransmitterSession {
    pub fn new(config: TransmitterConfig, estimator: SignalQualityEstimator) -> Self {
        Self {
            config,
            state: LinkState::default(),
            estimator,
            last_status_ms: None,
            last_status: None,
        }
    }

    /// Run one transmit cycle
    ///
    /// `remote` is the calibration exchange the caller wants carried, if
    /// any; it is only sent on cycles where a reply is due.
    pub fn run_cycle<R: Radio, C: Clock>(
        &mut self,
        radio: &mut R,
        clock: &C,
        channels: [u16; NUM_PRIMARY_CHANNELS],
        aux: [u8; NUM_AUX_CHANNELS],
        remote: Option<RemoteRequest>,
    ) -> CycleReport {
        let now = clock.now_ms();
        self.state.status_due = self
            .last_status_ms
            .map_or(true, |t| now.saturating_sub(t) > self.config.fetch_interval_ms);

        let (request, calibration_channel, follow_up) = if self.state.status_due {
            match remote {
                Some(RemoteRequest::Get { channel }) => (Request::CalibrationGet, channel as u8, None),
                Some(RemoteRequest::Set {
                    channel,
                    calibration,
                }) => {
                    let frame = CalibrationFrame {
                        channel: channel as u8,
                        params: calibration.to_params(),
                    };
                    (Request::CalibrationSet, channel as u8, Some(frame))
                }
                None => (Request::Status, 0, None),
            }
        } else {
            (Request::None, 0, None)
        };

        let control = Frame::Control(ControlFrame {
            request,
            calibration_channel,
            channels,
            aux,
        });

        let sent_at = clock.now_ms();
        if let Err(e) = radio.send(&encode_frame(&control)) {
            warn!("Failed to send control frame: {}", e);
            self.estimator.tick(clock.now_ms());
            return CycleReport {
                request,
                sent: false,
                reply: None,
            };
        }
        self.state.last_transmit_ms = Some(sent_at);

        if let Some(frame) = follow_up {
            if let Err(e) = radio.send(&encode_frame(&Frame::CalibrationSet(frame))) {
                warn!("Failed to send calibration frame: {}", e);
            }
        }

        let reply = if request == Request::None {
            None
        } else {
            self.listen(radio, clock, request, calibration_channel, sent_at)
        };

        self.estimator.tick(clock.now_ms());

        CycleReport {
            request,
            sent: true,
            reply,
        }
    }

    /// Busy-wait for the answer to `request`, bounded by the listen duration
    fn listen<R: Radio, C: Clock>(
        &mut self,
        radio: &mut R,
        clock: &C,
        request: Request,
        calibration_channel: u8,
        sent_at: u64,
    ) -> Option<Reply> {
        radio.set_listening(true);
        let start = clock.now_ms();
        let mut reply = None;

        while reply.is_none()
            && clock.now_ms().saturating_sub(start) < self.config.listen_duration_ms
        {
            let Some(raw) = radio.try_receive() else {
                std::hint::spin_loop();
                continue;
            };
            reply = match (request, decode_frame(&raw)) {
                (Request::Status, Frame::Status(status)) => Some(Reply::Status(status)),
                (
                    Request::CalibrationGet | Request::CalibrationSet,
                    Frame::CalibrationGet(calibration),
                ) if calibration.channel == calibration_channel => {
                    Some(Reply::Calibration(calibration))
                }
                (_, frame) => {
                    debug!("Discarding unexpected frame type {}", frame.frame_type());
                    None
                }
            };
        }

        radio.set_listening(false);

        let reply = reply?;
        let received_at = clock.now_ms();
        self.estimator.probe(radio.carrier_detected());
        self.state.last_receive_ms = Some(received_at);
        self.state.latency_ms = Some(received_at.saturating_sub(sent_at));

        if let Reply::Status(status) = reply {
            self.last_status_ms = Some(received_at);
            self.last_status = Some(status);
        }

        debug!(
            "Reply to {:?} after {} ms",
            request,
            received_at.saturating_sub(sent_at)
        );
        Some(reply)
    }

    #[must_use]
    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// Rating of replies seen by the transmitter (0-66)
    #[must_use]
    pub fn rating(&self) -> u8 {
        self.estimator.rating()
    }

    /// Most recent status report from the receiver
    #[must_use]
    pub fn last_status(&self) -> Option<StatusFrame> {
        self.last_status
    }
}
