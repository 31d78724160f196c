//! # Runtime Loops
//!
//! Drives one endpoint of the link from a tokio interval.
//!
//! Each tick runs one synchronous cycle: the transmitter samples its inputs,
//! advances the calibration page and runs a link cycle; the receiver drains
//! the frames waiting in its radio. Both loops stop when the shutdown future
//! resolves.

use std::future::Future;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationEngine, EngineEvent};
use crate::hardware::{ActuatorOutput, BatterySensor, Clock, InputSampler, Radio};
use crate::link::{CycleReport, PollOutcome, ReceiverSession, Reply, TransmitterSession};
use crate::packet::protocol::{StatusFrame, NUM_AUX_CHANNELS, NUM_PRIMARY_CHANNELS};
use crate::settings::{CalibrationStore, Storage};
use crate::telemetry::{StatusRecord, TelemetryLogger};

/// Number of cycles between link summary log messages
pub const LOG_INTERVAL_CYCLES: u64 = 1000;

/// Upper bound on frames handled per receiver tick
const MAX_FRAMES_PER_TICK: usize = 16;

/// Aux value sent for an active switch
const AUX_ON: u8 = u8::MAX;

/// Sample the transmitter's inputs
///
/// Analog lines `0..5` are the primary channels. The aux switches are the
/// first three digital lines other than `button_line`.
pub fn sample_inputs<I: InputSampler>(
    inputs: &mut I,
    button_line: usize,
) -> ([u16; NUM_PRIMARY_CHANNELS], [u8; NUM_AUX_CHANNELS], bool) {
    let mut raw = [0u16; NUM_PRIMARY_CHANNELS];
    for (id, value) in raw.iter_mut().enumerate() {
        *value = inputs.read_channel(id);
    }

    let mut aux = [0u8; NUM_AUX_CHANNELS];
    let lines = (0..).filter(|&line| line != button_line);
    for (value, line) in aux.iter_mut().zip(lines) {
        if inputs.read_digital(line) {
            *value = AUX_ON;
        }
    }

    let pressed = inputs.read_digital(button_line);
    (raw, aux, pressed)
}

/// Everything the transmitter loop owns
#[derive(Debug)]
pub struct TransmitterNode {
    session: TransmitterSession,
    engine: CalibrationEngine,
    store: CalibrationStore,
    button_line: usize,
    telemetry: Option<TelemetryLogger>,
    cycles: u64,
}

impl TransmitterNode {
    pub fn new(
        session: TransmitterSession,
        engine: CalibrationEngine,
        store: CalibrationStore,
        button_line: usize,
        telemetry: Option<TelemetryLogger>,
    ) -> Self {
        Self {
            session,
            engine,
            store,
            button_line,
            telemetry,
            cycles: 0,
        }
    }

    /// Queue a read of every primary channel from the receiver
    pub fn sync_remote(&mut self) {
        for channel in 0..NUM_PRIMARY_CHANNELS {
            self.engine.request_remote_read(channel);
        }
    }

    /// Run one transmitter cycle
    pub fn cycle<R, C, I, S>(
        &mut self,
        radio: &mut R,
        clock: &C,
        inputs: &mut I,
        storage: &mut S,
    ) -> CycleReport
    where
        R: Radio,
        C: Clock,
        I: InputSampler,
        S: Storage,
    {
        let (raw, aux, pressed) = sample_inputs(inputs, self.button_line);

        if let Some(event) = self
            .engine
            .update(&raw, pressed, clock.now_ms(), &mut self.store, storage)
        {
            log_event(&event);
        }

        let channels = CalibrationEngine::map_channels(&self.store, &raw);
        let remote = self.engine.next_remote_request();
        let report = self.session.run_cycle(radio, clock, channels, aux, remote);

        match report.reply {
            Some(Reply::Status(status)) => self.record_status(&status),
            Some(Reply::Calibration(frame)) => {
                if !self.engine.handle_remote_reply(&frame) {
                    debug!("Receiver calibration of channel {} differs from the queued write", frame.channel);
                }
            }
            None => {}
        }

        self.cycles += 1;
        if self.cycles % LOG_INTERVAL_CYCLES == 0 {
            let status = self.session.last_status();
            info!(
                "Cycle {}: rating {} (receiver {}), battery {:.2} V, latency {:?} ms, {} calibration exchanges pending",
                self.cycles,
                self.session.rating(),
                status.map_or(0, |s| s.signal_rating),
                status.map_or(0.0, |s| s.battery),
                self.session.state().latency_ms,
                self.engine.pending_remote()
            );
        }

        report
    }

    fn record_status(&mut self, status: &StatusFrame) {
        let Some(logger) = self.telemetry.as_mut() else {
            return;
        };
        let record = StatusRecord::from_status(
            status,
            self.session.rating(),
            self.session.state().latency_ms,
        );
        if let Err(e) = logger.log(&record) {
            warn!("Failed to write telemetry: {}", e);
        }
    }

    #[must_use]
    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    #[must_use]
    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    #[must_use]
    pub fn session(&self) -> &TransmitterSession {
        &self.session
    }

    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Saved { channel, persisted } | EngineEvent::Reversed { channel, persisted, .. } => {
            info!("Calibration of channel {} committed (persisted: {})", channel, persisted);
        }
        EngineEvent::Opened | EngineEvent::Closed => info!("Calibration page: {:?}", event),
        _ => debug!("Calibration page: {:?}", event),
    }
}

/// Run the transmitter until `shutdown` resolves
///
/// Returns the number of cycles run.
pub async fn run_transmitter<R, C, I, S, F>(
    node: &mut TransmitterNode,
    radio: &mut R,
    clock: &C,
    inputs: &mut I,
    storage: &mut S,
    cycle_interval: Duration,
    shutdown: F,
) -> u64
where
    R: Radio,
    C: Clock,
    I: InputSampler,
    S: Storage,
    F: Future<Output = ()>,
{
    let mut ticker = interval(cycle_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    radio.set_listening(false);
    info!("Transmitter loop running every {:?}", cycle_interval);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                node.cycle(radio, clock, inputs, storage);
            }
        }
    }

    info!("Transmitter stopped after {} cycles", node.cycles());
    node.cycles()
}

/// Run the receiver until `shutdown` resolves
///
/// Returns the number of frames handled.
pub async fn run_receiver<S, R, C, A, B, F>(
    session: &mut ReceiverSession<S>,
    radio: &mut R,
    clock: &C,
    outputs: &mut A,
    battery: &mut B,
    cycle_interval: Duration,
    shutdown: F,
) -> u64
where
    S: Storage,
    R: Radio,
    C: Clock,
    A: ActuatorOutput,
    B: BatterySensor,
    F: Future<Output = ()>,
{
    let mut ticker = interval(cycle_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    radio.set_listening(true);
    info!("Receiver listening, polling every {:?}", cycle_interval);

    let mut frames: u64 = 0;
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                for _ in 0..MAX_FRAMES_PER_TICK {
                    match session.poll(radio, clock, outputs, battery) {
                        PollOutcome::Idle => break,
                        outcome => {
                            frames += 1;
                            if let PollOutcome::CalibrationStored { channel, persisted } = outcome {
                                info!("Stored calibration of channel {} (persisted: {})", channel, persisted);
                            }
                        }
                    }
                }

                ticks += 1;
                if ticks % LOG_INTERVAL_CYCLES == 0 {
                    let estimator = session.estimator();
                    info!(
                        "Received {} frames: rating {}, good signal {}, average gap {:?} ms, battery {:.2} V",
                        frames,
                        estimator.rating(),
                        estimator.good_signal(),
                        estimator.average_interval_ms(),
                        session.last_battery()
                    );
                }
            }
        }
    }

    info!("Receiver stopped after {} frames", frames);
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::EngineConfig;
    use crate::hardware::mocks::{FixedBattery, MockActuators, MockClock, MockInputs, MockRadio};
    use crate::link::{ReceiverConfig, SignalQualityEstimator, TransmitterConfig};
    use crate::packet::protocol::{CalibrationFrame, ControlFrame, Frame, Request};
    use crate::packet::decoder::decode_frame;
    use crate::packet::encoder::encode_frame;
    use crate::settings::storage::mocks::MemoryStorage;
    use std::fs;
    use tempfile::TempDir;

    const BUTTON: usize = 3;

    fn node(telemetry: Option<TelemetryLogger>) -> TransmitterNode {
        TransmitterNode::new(
            TransmitterSession::new(TransmitterConfig::default(), SignalQualityEstimator::default()),
            CalibrationEngine::new(EngineConfig::default()),
            CalibrationStore::default(),
            BUTTON,
            telemetry,
        )
    }

    fn centered_inputs() -> MockInputs {
        let mut inputs = MockInputs::default();
        inputs.analog[..NUM_PRIMARY_CHANNELS].copy_from_slice(&[1145, 1880, 1905, 1870, 2048]);
        inputs
    }

    /// Receiver double that answers status and read requests
    fn answering_radio() -> MockRadio {
        MockRadio::with_responder(|raw| match decode_frame(raw) {
            Frame::Control(control) => match control.request {
                Request::Status => vec![encode_frame(&Frame::Status(StatusFrame {
                    good_signal: true,
                    signal_rating: 55,
                    battery: 7.9,
                }))],
                Request::CalibrationGet => vec![encode_frame(&Frame::CalibrationGet(CalibrationFrame {
                    channel: control.calibration_channel,
                    params: [100, 200, 300, 1000, 1500, 2000],
                }))],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        })
    }

    fn control(frame: &[u8; 16]) -> ControlFrame {
        match decode_frame(frame) {
            Frame::Control(control) => control,
            other => panic!("Expected control frame, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_inputs_skips_button_line() {
        let mut inputs = centered_inputs();
        inputs.digital = [true, false, true, true, true, false, false, false];

        let (raw, aux, pressed) = sample_inputs(&mut inputs, BUTTON);

        assert_eq!(raw, [1145, 1880, 1905, 1870, 2048]);
        // Lines 0, 1, 2 feed the aux channels; line 3 is the button
        assert_eq!(aux, [AUX_ON, 0, AUX_ON]);
        assert!(pressed);

        let (_, aux, pressed) = sample_inputs(&mut inputs, 0);
        assert_eq!(aux, [0, AUX_ON, AUX_ON]);
        assert!(pressed);
    }

    #[test]
    fn test_cycle_sends_mapped_channels() {
        let mut node = node(None);
        let mut radio = answering_radio();
        let clock = MockClock::with_step(1000, 1);
        let mut inputs = centered_inputs();
        let mut storage = MemoryStorage::default();

        let report = node.cycle(&mut radio, &clock, &mut inputs, &mut storage);

        assert!(report.sent);
        assert_eq!(report.request, Request::Status);
        let sent = control(&radio.sent[0]);
        // Raw centers map onto the output centers
        assert_eq!(sent.channels, [1500; NUM_PRIMARY_CHANNELS]);
        assert_eq!(node.cycles(), 1);
    }

    #[test]
    fn test_status_is_logged_to_telemetry() {
        let dir = TempDir::new().unwrap();
        let logger = TelemetryLogger::new(dir.path(), 100, 2).unwrap();
        let mut node = node(Some(logger));
        let mut radio = answering_radio();
        let clock = MockClock::with_step(1000, 1);
        let mut inputs = centered_inputs();
        let mut storage = MemoryStorage::default();

        node.cycle(&mut radio, &clock, &mut inputs, &mut storage);

        let contents = fs::read_to_string(dir.path().join("status_0000.jsonl")).unwrap();
        let record: StatusRecord = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(record.remote_rating, 55);
        assert!((record.battery - 7.9).abs() < 0.01);
    }

    #[test]
    fn test_sync_remote_fills_mirror() {
        let mut node = node(None);
        let mut radio = answering_radio();
        let clock = MockClock::with_step(1000, 1);
        let mut inputs = centered_inputs();
        let mut storage = MemoryStorage::default();

        node.sync_remote();
        assert_eq!(node.engine().pending_remote(), NUM_PRIMARY_CHANNELS);

        for expected in 0..NUM_PRIMARY_CHANNELS {
            let report = node.cycle(&mut radio, &clock, &mut inputs, &mut storage);
            assert_eq!(report.request, Request::CalibrationGet);
            assert_eq!(control(radio.sent.last().unwrap()).calibration_channel, expected as u8);
        }

        assert_eq!(node.engine().pending_remote(), 0);
        let remote = node.engine().remote_calibration(2).unwrap();
        assert_eq!(remote.to_params(), [100, 200, 300, 1000, 1500, 2000]);

        // With the queue empty the status request takes the slot again
        let report = node.cycle(&mut radio, &clock, &mut inputs, &mut storage);
        assert_eq!(report.request, Request::Status);
    }

    #[test]
    fn test_long_press_opens_calibration_page() {
        let mut node = node(None);
        let mut radio = MockRadio::new();
        let clock = MockClock::with_step(1000, 1);
        let mut inputs = centered_inputs();
        let mut storage = MemoryStorage::default();

        inputs.digital[BUTTON] = true;
        node.cycle(&mut radio, &clock, &mut inputs, &mut storage);
        clock.advance(1000);
        node.cycle(&mut radio, &clock, &mut inputs, &mut storage);

        assert!(node.engine().is_open());
        // Control frames keep flowing while the page is open
        assert_eq!(radio.sent.len(), 2);
    }

    #[test]
    fn test_run_transmitter_until_shutdown() {
        let mut node = node(None);
        let mut radio = answering_radio();
        let clock = MockClock::with_step(0, 1);
        let mut inputs = centered_inputs();
        let mut storage = MemoryStorage::default();

        let cycles = tokio_test::block_on(async {
            run_transmitter(
                &mut node,
                &mut radio,
                &clock,
                &mut inputs,
                &mut storage,
                Duration::from_millis(1),
                tokio::time::sleep(Duration::from_millis(30)),
            )
            .await
        });

        assert!(cycles > 0);
        assert_eq!(cycles, node.cycles());
        assert!(!radio.sent.is_empty());
        assert!(!radio.listening);
    }

    #[test]
    fn test_run_transmitter_immediate_shutdown() {
        let mut node = node(None);
        let mut radio = MockRadio::new();
        let clock = MockClock::new(0);
        let mut inputs = centered_inputs();
        let mut storage = MemoryStorage::default();

        let cycles = tokio_test::block_on(run_transmitter(
            &mut node,
            &mut radio,
            &clock,
            &mut inputs,
            &mut storage,
            Duration::from_millis(1),
            std::future::ready(()),
        ));

        assert_eq!(cycles, 0);
        assert!(radio.sent.is_empty());
    }

    #[test]
    fn test_run_receiver_drives_outputs() {
        let mut session = ReceiverSession::new(
            ReceiverConfig::default(),
            SignalQualityEstimator::default(),
            CalibrationStore::default(),
            MemoryStorage::default(),
        );
        let mut radio = MockRadio::new();
        for throttle in [1200u16, 1300, 2500] {
            radio.push(encode_frame(&Frame::Control(ControlFrame {
                request: Request::None,
                calibration_channel: 0,
                channels: [throttle, 1500, 1500, 1500, 1500],
                aux: [0, 255, 0],
            })));
        }
        let clock = MockClock::with_step(0, 1);
        let mut outputs = MockActuators::default();
        let mut battery = FixedBattery(7.2);

        let frames = tokio_test::block_on(async {
            run_receiver(
                &mut session,
                &mut radio,
                &clock,
                &mut outputs,
                &mut battery,
                Duration::from_millis(1),
                tokio::time::sleep(Duration::from_millis(20)),
            )
            .await
        });

        assert_eq!(frames, 3);
        assert!(radio.listening);
        // Out-of-range throttle is clamped
        assert_eq!(outputs.latest(0), Some(2000));
        assert_eq!(outputs.latest(NUM_PRIMARY_CHANNELS + 1), Some(2000));
    }
}
