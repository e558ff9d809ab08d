//! Intersection event loop
//!
//! A single task owns the arbiter. Detection frames, bus envelopes and the
//! one second tick are all handled from the same `select!`, so arbiter state
//! is never touched concurrently.
//!
//! The bus is drained before the next stream record is read. Recorded bus
//! messages and stop sign updates are published, so they reach the arbiter
//! through the subscription ahead of any frame recorded after them.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use intersection::{ArbiterReport, IntersectionArbiter, IntersectionError};
use kiwi_bus::{BusError, Envelope, LocalBus, Message};
use serde::Serialize;
use tokio::io::AsyncBufRead;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use vision::{DetectionStream, FrameDetections, PresenceDebouncer, StreamItem};

use crate::config::AppConfig;

/// Counters reported when the loop ends
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub envelopes: u64,
    pub ticks: u64,
    pub departures: u64,
    pub safe_to_go_sent: u64,
}

/// Owner of all intersection state
pub struct IntersectionRuntime {
    bus: LocalBus,
    arbiter: IntersectionArbiter,
    stop_sign: PresenceDebouncer,
    summary: RunSummary,
}

impl IntersectionRuntime {
    pub fn new(bus: LocalBus, config: &AppConfig) -> Result<Self, IntersectionError> {
        Ok(Self {
            bus,
            arbiter: IntersectionArbiter::new(config.intersection.clone())?,
            stop_sign: PresenceDebouncer::new(config.stop_sign.clone()),
            summary: RunSummary::default(),
        })
    }

    pub fn arbiter(&self) -> &IntersectionArbiter {
        &self.arbiter
    }

    /// Run until the detection stream ends or `shutdown` completes
    pub async fn run<R, F>(
        mut self,
        mut stream: DetectionStream<R>,
        shutdown: F,
    ) -> anyhow::Result<RunSummary>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut subscription = self.bus.subscribe();
        let period = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Intersection loop started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                received = subscription.recv() => match received {
                    Ok(envelope) => self.on_envelope(&envelope)?,
                    Err(BusError::Closed) => break,
                    Err(e) => return Err(e.into()),
                },
                item = stream.next() => {
                    let item = item
                        .with_context(|| format!("Detection stream failed after line {}", stream.line_no()))?;
                    match item {
                        Some(StreamItem::Frame(frame)) => self.on_frame(&frame)?,
                        Some(StreamItem::Bus(envelope)) => {
                            debug!(message = envelope.message.name(), "Injecting recorded message");
                            self.bus.publish(envelope)?;
                        }
                        None => {
                            info!("Detection stream ended");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.summary.ticks += 1;
                    let report = self.arbiter.on_second_tick();
                    self.apply(report)?;
                }
            }
        }

        info!(
            summary = %serde_json::to_string(&self.summary)?,
            state = %serde_json::to_string(&self.arbiter.snapshot())?,
            "Intersection loop stopped"
        );
        Ok(self.summary)
    }

    fn on_frame(&mut self, frame: &FrameDetections) -> Result<(), BusError> {
        self.summary.frames += 1;

        if let Some(present) = self.stop_sign.push_area(frame.stop_sign_area) {
            info!(present, "Stop sign presence changed");
            self.bus
                .send(Message::StopSignPresenceUpdate { present })?;
        }

        let report = self.arbiter.on_frame(&frame.vehicles);
        self.apply(report)
    }

    fn on_envelope(&mut self, envelope: &Envelope) -> Result<(), BusError> {
        self.summary.envelopes += 1;
        let report = self.arbiter.handle_envelope(envelope);
        self.apply(report)
    }

    fn apply(&mut self, report: ArbiterReport) -> Result<(), BusError> {
        for departure in &report.departures {
            self.summary.departures += 1;
            info!(
                path = ?departure.path,
                slot = ?departure.slot,
                remaining = departure.remaining,
                "Vehicle left the intersection"
            );
        }

        if report.safe_to_go {
            if self.summary.safe_to_go_sent > 0 {
                warn!("SafeToGo sent again for a new intersection");
            }
            self.summary.safe_to_go_sent += 1;
            self.bus.send(Message::SafeToGo)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intersection::ArbitrationState;
    use kiwi_bus::{Direction, Subscription};
    use maneuver::DirectionController;

    use crate::chooser::DirectionChooser;
    use crate::cli::DirectionMode;

    /// Two queued cars leave one after the other, then we are free to go
    const TWO_CARS: &str = r#"
{"at_ms": 0, "bus": {"message": {"type": "CarOutOfSight"}}}
{"at_ms": 100, "frame": {"vehicles": [{"x": 5, "y": 150, "width": 90, "height": 100}, {"x": 240, "y": 160, "width": 120, "height": 100}]}}
{"at_ms": 200, "bus": {"message": {"type": "StopSignPresenceUpdate", "present": false}}}
{"at_ms": 4100, "frame": {"vehicles": [{"x": 10, "y": 130, "width": 60, "height": 200}]}}
{"at_ms": 4200, "frame": {"vehicles": [{"x": 0, "y": 160, "width": 60, "height": 200}]}}
{"at_ms": 4300, "frame": {"vehicles": [{"x": 240, "y": 165, "width": 120, "height": 100}]}}
{"at_ms": 9100, "frame": {"vehicles": [{"x": 240, "y": 170, "width": 120, "height": 100}]}}
"#;

    fn frames(lines: &str) -> DetectionStream<&[u8]> {
        DetectionStream::new(lines.as_bytes())
    }

    fn join_lines(records: &[String]) -> String {
        records.join("\n")
    }

    async fn drain(sub: &mut Subscription) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(Ok(envelope)) =
            tokio::time::timeout(Duration::from_millis(1), sub.recv()).await
        {
            out.push(envelope.message);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_cars_leave_then_safe_to_go() {
        let bus = LocalBus::default();
        let mut observer = bus.subscribe();
        let runtime = IntersectionRuntime::new(bus.clone(), &AppConfig::default()).unwrap();

        let summary = runtime
            .run(frames(TWO_CARS), std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.frames, 5);
        assert_eq!(summary.departures, 2);
        assert_eq!(summary.safe_to_go_sent, 1);

        let messages = drain(&mut observer).await;
        let safe_to_go = messages.iter().filter(|m| **m == Message::SafeToGo).count();
        assert_eq!(safe_to_go, 1);
        assert_eq!(messages.last(), Some(&Message::SafeToGo));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_sign_frames_drive_arrival() {
        let bus = LocalBus::default();
        let mut runtime = IntersectionRuntime::new(bus.clone(), &AppConfig::default()).unwrap();
        let mut observer = bus.subscribe();

        let sign = FrameDetections {
            vehicles: Vec::new(),
            stop_sign_area: 900.0,
        };
        let empty = FrameDetections::default();

        for _ in 0..5 {
            runtime.on_frame(&sign).unwrap();
        }
        assert_eq!(
            observer.recv().await.unwrap().message,
            Message::StopSignPresenceUpdate { present: true }
        );

        // Stays present until fewer than 5 of the last 20 frames show it
        for _ in 0..15 {
            runtime.on_frame(&empty).unwrap();
        }
        assert!(drain(&mut observer).await.is_empty());
        runtime.on_frame(&empty).unwrap();
        let update = observer.recv().await.unwrap();
        assert_eq!(
            update.message,
            Message::StopSignPresenceUpdate { present: false }
        );

        // The leading car is still ahead of us, so this is not an arrival
        runtime.on_envelope(&update).unwrap();
        assert_eq!(runtime.arbiter().state(), ArbitrationState::NotArrived);

        runtime
            .on_envelope(&Envelope::new(Message::CarOutOfSight))
            .unwrap();
        runtime.on_envelope(&update).unwrap();
        assert!(matches!(
            runtime.arbiter().state(),
            ArbitrationState::ArrivedWaiting { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorded_messages_keep_their_order() {
        let bus = LocalBus::default();
        let mut observer = bus.subscribe();
        let runtime = IntersectionRuntime::new(bus.clone(), &AppConfig::default()).unwrap();

        // All at the same instant: the middle car must be queued before the
        // arrival, so the empty-intersection shortcut never fires
        let records = vec![
            r#"{"at_ms": 0, "bus": {"message": {"type": "CarOutOfSight"}}}"#.to_string(),
            r#"{"at_ms": 0, "frame": {"vehicles": [{"x": 250, "y": 150, "width": 100, "height": 120}]}}"#
                .to_string(),
            r#"{"at_ms": 0, "bus": {"message": {"type": "StopSignPresenceUpdate", "present": false}}}"#
                .to_string(),
            r#"{"at_ms": 6000, "frame": {}}"#.to_string(),
        ];
        let input = join_lines(&records);

        let summary = runtime
            .run(frames(&input), std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.frames, 2);
        assert_eq!(summary.envelopes, 2);
        assert_eq!(summary.departures, 0);
        assert_eq!(summary.safe_to_go_sent, 0);
        assert!(!drain(&mut observer).await.contains(&Message::SafeToGo));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop() {
        let bus = LocalBus::default();
        let runtime = IntersectionRuntime::new(bus.clone(), &AppConfig::default()).unwrap();
        let records = vec![
            r#"{"at_ms": 0, "bus": {"message": {"type": "CarOutOfSight"}}}"#.to_string(),
            r#"{"at_ms": 60000, "frame": {}}"#.to_string(),
        ];
        let input = join_lines(&records);

        let summary = runtime
            .run(
                frames(&input),
                tokio::time::sleep(Duration::from_millis(2500)),
            )
            .await
            .unwrap();

        assert_eq!(summary.frames, 0);
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.envelopes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_stream_is_an_error() {
        let bus = LocalBus::default();
        let runtime = IntersectionRuntime::new(bus.clone(), &AppConfig::default()).unwrap();

        let err = runtime
            .run(frames("{\"at_ms\": 0, \"frame\": \n"), std::future::pending())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_intersection_leaves_right() {
        let bus = LocalBus::default();
        let mut observer = bus.subscribe();

        let chooser = DirectionChooser::new(
            bus.clone(),
            DirectionMode::Fixed(Direction::Right),
            tokio::io::empty(),
            tokio::io::sink(),
        );
        let chooser_task = tokio::spawn(chooser.run(bus.subscribe()));
        let controller =
            DirectionController::new(bus.clone(), AppConfig::default().maneuver).unwrap();
        let controller_task = tokio::spawn(controller.run(bus.subscribe()));

        let records = vec![
            r#"{"at_ms": 0, "bus": {"message": {"type": "CarOutOfSight"}}}"#.to_string(),
            r#"{"at_ms": 200, "bus": {"message": {"type": "StopSignPresenceUpdate", "present": false}}}"#
                .to_string(),
            // Keeps the stream open while the maneuver runs
            r#"{"at_ms": 8500, "frame": {}}"#.to_string(),
        ];
        let input = join_lines(&records);
        let runtime = IntersectionRuntime::new(bus.clone(), &AppConfig::default()).unwrap();
        let summary = runtime
            .run(frames(&input), std::future::pending())
            .await
            .unwrap();
        assert_eq!(summary.safe_to_go_sent, 1);

        let messages = drain(&mut observer).await;
        let actuators: Vec<_> = messages
            .into_iter()
            .filter(|m| {
                matches!(
                    m,
                    Message::ChooseDirectionRequest { .. }
                        | Message::GroundSteeringRequest { .. }
                        | Message::PedalPositionRequest { .. }
                )
            })
            .collect();
        assert_eq!(
            actuators,
            vec![
                Message::ChooseDirectionRequest {
                    direction: Direction::Right
                },
                Message::GroundSteeringRequest { angle: -0.3 },
                Message::PedalPositionRequest { position: 0.14 },
                Message::GroundSteeringRequest { angle: 0.0 },
                Message::PedalPositionRequest { position: 0.0 },
            ]
        );

        chooser_task.abort();
        controller_task.abort();
    }
}
