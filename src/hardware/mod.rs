//! # Hardware Collaborators
//!
//! Traits for everything the link core consumes from the outside world:
//! the radio, the clock, input lines, actuator outputs and the battery ADC.
//! Sysfs-backed implementations for Linux hosts live in [`sysfs`].

pub mod sysfs;

use std::time::Instant;

use crate::error::Result;
use crate::packet::protocol::RawFrame;

/// Monotonic millisecond clock
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;
}

/// Clock backed by [`std::time::Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Half-duplex packet radio with fixed 16-byte payloads
///
/// Auto-acknowledgement and retries are expected to be disabled: a sent
/// frame is either delivered once or lost.
pub trait Radio {
    /// Transmit one frame
    fn send(&mut self, frame: &RawFrame) -> Result<()>;

    /// Return a received frame if one is waiting
    fn try_receive(&mut self) -> Option<RawFrame>;

    /// Switch between receive (`true`) and transmit (`false`) mode
    fn set_listening(&mut self, listening: bool);

    /// Carrier detected during the most recent reception
    fn carrier_detected(&mut self) -> bool;
}

/// Raw analog and digital input lines
pub trait InputSampler {
    /// Sample analog line `id`
    fn read_channel(&mut self, id: usize) -> u16;

    /// Sample digital line `id`; `true` = active
    fn read_digital(&mut self, id: usize) -> bool;
}

/// Servo/ESC pulse outputs
pub trait ActuatorOutput {
    /// Set the pulse width of output `channel` in microseconds
    fn set_pulse_width(&mut self, channel: usize, micros: u16);
}

/// Battery voltage measurement
pub trait BatterySensor {
    /// Battery voltage in volts
    fn read_voltage(&mut self) -> f32;
}

#[cfg(test)]
pub mod mocks {
    //! Hand-written collaborator doubles shared by the unit tests.

    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;

    use crate::error::RcLinkError;

    /// Clock that advances by `step` milliseconds on every read
    ///
    /// The automatic step lets bounded busy-wait loops terminate without
    /// real time passing.
    #[derive(Debug)]
    pub struct MockClock {
        now: Cell<u64>,
        step: u64,
    }

    impl MockClock {
        pub fn new(start: u64) -> Self {
            Self::with_step(start, 0)
        }

        pub fn with_step(start: u64, step: u64) -> Self {
            Self {
                now: Cell::new(start),
                step,
            }
        }

        pub fn set(&self, now: u64) {
            self.now.set(now);
        }

        pub fn advance(&self, ms: u64) {
            self.now.set(self.now.get() + ms);
        }

        /// Current time without stepping
        pub fn peek(&self) -> u64 {
            self.now.get()
        }
    }

    impl Clock for MockClock {
        fn now_ms(&self) -> u64 {
            let now = self.now.get();
            self.now.set(now + self.step);
            now
        }
    }

    type Responder = Box<dyn FnMut(&RawFrame) -> Vec<RawFrame>>;

    /// In-memory radio
    ///
    /// Sent frames are recorded; an optional responder produces the frames
    /// that become receivable after each send.
    pub struct MockRadio {
        pub sent: Vec<RawFrame>,
        pub inbox: VecDeque<RawFrame>,
        pub listening: bool,
        pub listen_switches: usize,
        pub carrier: bool,
        pub fail_send: bool,
        responder: Option<Responder>,
    }

    impl MockRadio {
        pub fn new() -> Self {
            Self {
                sent: Vec::new(),
                inbox: VecDeque::new(),
                listening: false,
                listen_switches: 0,
                carrier: true,
                fail_send: false,
                responder: None,
            }
        }

        pub fn with_responder(responder: impl FnMut(&RawFrame) -> Vec<RawFrame> + 'static) -> Self {
            let mut radio = Self::new();
            radio.responder = Some(Box::new(responder));
            radio
        }

        pub fn push(&mut self, frame: RawFrame) {
            self.inbox.push_back(frame);
        }
    }

    impl Radio for MockRadio {
        fn send(&mut self, frame: &RawFrame) -> Result<()> {
            if self.fail_send {
                return Err(RcLinkError::Serial("Mock send error".to_string()));
            }
            self.sent.push(*frame);
            if let Some(responder) = self.responder.as_mut() {
                let replies = responder(frame);
                self.inbox.extend(replies);
            }
            Ok(())
        }

        fn try_receive(&mut self) -> Option<RawFrame> {
            self.inbox.pop_front()
        }

        fn set_listening(&mut self, listening: bool) {
            if self.listening != listening {
                self.listen_switches += 1;
            }
            self.listening = listening;
        }

        fn carrier_detected(&mut self) -> bool {
            self.carrier
        }
    }

    /// Records every pulse width written
    #[derive(Debug, Default)]
    pub struct MockActuators {
        pub writes: Vec<(usize, u16)>,
    }

    impl MockActuators {
        /// Most recent pulse width per output channel
        pub fn latest(&self, channel: usize) -> Option<u16> {
            self.writes
                .iter()
                .rev()
                .find(|(ch, _)| *ch == channel)
                .map(|(_, micros)| *micros)
        }
    }

    impl ActuatorOutput for MockActuators {
        fn set_pulse_width(&mut self, channel: usize, micros: u16) {
            self.writes.push((channel, micros));
        }
    }

    /// Battery reporting a fixed voltage
    #[derive(Debug)]
    pub struct FixedBattery(pub f32);

    impl BatterySensor for FixedBattery {
        fn read_voltage(&mut self) -> f32 {
            self.0
        }
    }

    /// Input lines with settable values
    #[derive(Debug, Default)]
    pub struct MockInputs {
        pub analog: [u16; 8],
        pub digital: [bool; 8],
    }

    impl InputSampler for MockInputs {
        fn read_channel(&mut self, id: usize) -> u16 {
            self.analog.get(id).copied().unwrap_or(0)
        }

        fn read_digital(&mut self, id: usize) -> bool {
            self.digital.get(id).copied().unwrap_or(false)
        }
    }
}
