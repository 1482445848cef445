use std::io::Write;
use std::time::Duration;

use log::{debug, info};
use tokio::time::{MissedTickBehavior, interval};

use crate::encoder::EventSink;
use crate::messages::{PresenceEvent, TrackedState};
use crate::reader::Reader;
use crate::sampler::PresenceSampler;
use crate::tracker;

/// Runs presence cycles for a single reader: sample, compare, emit, wait.
pub struct Monitor<R, T, D> {
    room: String,
    poll_interval: Duration,
    sampler: PresenceSampler<R>,
    state: TrackedState,
    sink: EventSink<T, D>,
}

impl<R: Reader, T: Write, D: Write> Monitor<R, T, D> {
    pub fn new(
        room: String,
        poll_interval: Duration,
        reader: R,
        sink: EventSink<T, D>,
    ) -> Self {
        Monitor {
            room,
            poll_interval,
            sampler: PresenceSampler::new(reader),
            state: TrackedState::default(),
            sink,
        }
    }

    pub fn state(&self) -> &TrackedState {
        &self.state
    }

    /// One presence cycle, without the trailing delay.
    pub fn cycle(&mut self) -> Option<PresenceEvent> {
        let sample = self.sampler.sample(&self.state);
        let event = tracker::update(&self.room, sample, &mut self.state);
        if let Some(event) = &event {
            self.sink.emit(event);
        }
        event
    }

    /// Runs cycles at a fixed rate. `None` never returns.
    ///
    /// Cycles block the calling task on reader SPI transfers and transport
    /// writes. This is the only task in `monitor` mode and nothing else is
    /// scheduled between cycles, so it is not moved off the runtime.
    pub async fn run(mut self, max_cycles: Option<u64>) -> Self {
        info!(
            "Monitoring room {} every {:?}",
            self.room, self.poll_interval
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycles = 0u64;
        loop {
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            ticker.tick().await;
            self.cycle();
            cycles += 1;
        }

        debug!(
            "Stopped after {} cycles, present={}",
            cycles,
            self.state().present
        );
        self
    }

    #[cfg(test)]
    pub fn into_sink(self) -> EventSink<T, D> {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::decode;
    use crate::messages::{EventKey, TagId, Transition};
    use crate::reader::ReplayReader;
    use crate::sampler::tests::{FakeReader, Probe};

    fn tag() -> TagId {
        "04:A3:9F:12".parse().unwrap()
    }

    fn monitor<R: Reader>(reader: R) -> Monitor<R, Vec<u8>, Vec<u8>> {
        Monitor::new(
            "206".to_string(),
            Duration::from_millis(500),
            reader,
            EventSink::new(Vec::new(), Vec::new()),
        )
    }

    #[test]
    fn test_cycle_scenarios() {
        let probes = [
            Probe::default(),
            Probe {
                detect: Some(tag()),
                still_here: false,
            },
            Probe {
                detect: None,
                still_here: true,
            },
            Probe::default(),
        ];
        let mut monitor = monitor(FakeReader::with(probes));

        // absent, still absent
        assert_eq!(monitor.cycle(), None);

        let arrival = monitor.cycle().unwrap();
        assert_eq!(arrival.key, EventKey::Tag(tag()));
        assert_eq!(arrival.transition, Transition::In);
        assert!(monitor.state().present);

        // held at an angle: wake-up probe keeps it present
        assert_eq!(monitor.cycle(), None);
        assert_eq!(monitor.state().last_identity, tag());

        let departure = monitor.cycle().unwrap();
        assert_eq!(departure.key, EventKey::NotAvailable);
        assert_eq!(departure.transition, Transition::Out);
        assert!(!monitor.state().present);

        assert_eq!(monitor.sampler.reader().resets, 4);
    }

    #[test]
    fn test_cycle_writes_transport() {
        let mut monitor = monitor(FakeReader::with([Probe {
            detect: Some(tag()),
            still_here: false,
        }]));
        monitor.cycle();
        monitor.cycle();

        let (transport, _) = monitor.into_sink().into_inner();
        let transport = String::from_utf8(transport).unwrap();
        let lines: Vec<_> = transport.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"room":"206","key":"04:A3:9F:12","state":"IN"}"#,
                r#"{"room":"206","key":"N/A","state":"OUT"}"#,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_replay_script() {
        let script = "none\nnew 04:A3:9F:12\nheld\nheld\nnone\nnew DE:AD:BE:EF\n";
        let reader = ReplayReader::parse(script, false).unwrap();

        let started = tokio::time::Instant::now();
        let monitor = monitor(reader).run(Some(6)).await;
        // first tick is immediate
        assert_eq!(started.elapsed(), Duration::from_millis(2500));

        let (transport, _) = monitor.into_sink().into_inner();
        let messages: Vec<_> = String::from_utf8(transport)
            .unwrap()
            .lines()
            .map(|line| decode(line).unwrap())
            .collect();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].key, "04:A3:9F:12");
        assert_eq!(messages[0].state, Transition::In);
        assert_eq!(messages[1].key, "N/A");
        assert_eq!(messages[1].state, Transition::Out);
        assert_eq!(messages[2].key, "DE:AD:BE:EF");
    }
}
