use log::debug;

use crate::messages::{PresenceSample, TrackedState};
use crate::reader::Reader;

/// Turns the reader's probes into one presence reading per cycle.
pub struct PresenceSampler<R> {
    reader: R,
}

impl<R: Reader> PresenceSampler<R> {
    pub fn new(reader: R) -> Self {
        PresenceSampler { reader }
    }

    /// Fresh detection first; if that misses and a tag was being tracked,
    /// fall back to the wake-up probe, which confirms presence without
    /// re-reading the UID. The reader session is always reset afterwards.
    pub fn sample(&mut self, prior: &TrackedState) -> PresenceSample {
        let sample = match self.reader.detect() {
            Some(identity) => PresenceSample::detected(identity),
            None if prior.present && self.reader.probe_continued_presence() => {
                PresenceSample::still_present()
            }
            None => PresenceSample::absent(),
        };

        self.reader.reset_session();

        debug!(
            "Sampled present={} identity={:?}",
            sample.present,
            sample.identity.as_ref().map(ToString::to_string)
        );
        sample
    }

    #[cfg(test)]
    pub fn reader(&self) -> &R {
        &self.reader
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::messages::TagId;

    /// What the test reader answers to each probe during one cycle.
    #[derive(Clone, Debug, Default)]
    pub struct Probe {
        pub detect: Option<TagId>,
        pub still_here: bool,
    }

    /// Reader double that answers from a queue and counts calls.
    #[derive(Debug, Default)]
    pub struct FakeReader {
        pub probes: VecDeque<Probe>,
        pub detect_calls: usize,
        pub wakeup_calls: usize,
        pub resets: usize,
    }

    impl FakeReader {
        pub fn with(probes: impl IntoIterator<Item = Probe>) -> Self {
            FakeReader {
                probes: probes.into_iter().collect(),
                ..Default::default()
            }
        }
    }

    impl Reader for FakeReader {
        fn detect(&mut self) -> Option<TagId> {
            self.detect_calls += 1;
            self.probes.front().and_then(|p| p.detect.clone())
        }

        fn probe_continued_presence(&mut self) -> bool {
            self.wakeup_calls += 1;
            self.probes.front().is_some_and(|p| p.still_here)
        }

        fn reset_session(&mut self) {
            self.resets += 1;
            self.probes.pop_front();
        }
    }

    fn tag() -> TagId {
        TagId::new(vec![0x04, 0xa3, 0x9f, 0x12])
    }

    fn tracking() -> TrackedState {
        TrackedState {
            present: true,
            last_identity: tag(),
        }
    }

    #[test]
    fn test_fresh_detection_yields_identity() {
        let mut sampler = PresenceSampler::new(FakeReader::with([Probe {
            detect: Some(tag()),
            still_here: false,
        }]));

        let sample = sampler.sample(&TrackedState::default());
        assert_eq!(sample, PresenceSample::detected(tag()));
        assert_eq!(sampler.reader().wakeup_calls, 0);
        assert_eq!(sampler.reader().resets, 1);
    }

    #[test]
    fn test_wakeup_probe_only_when_tracking() {
        let still_here = Probe {
            detect: None,
            still_here: true,
        };
        let mut sampler = PresenceSampler::new(FakeReader::with([still_here.clone(), still_here]));

        // nothing tracked: a tag left in the field from before is not counted
        assert_eq!(
            sampler.sample(&TrackedState::default()),
            PresenceSample::absent()
        );
        assert_eq!(sampler.reader().wakeup_calls, 0);

        assert_eq!(sampler.sample(&tracking()), PresenceSample::still_present());
        assert_eq!(sampler.reader().wakeup_calls, 1);
        assert_eq!(sampler.reader().resets, 2);
    }

    #[test]
    fn test_absent_when_both_probes_miss() {
        let mut sampler = PresenceSampler::new(FakeReader::with([Probe::default()]));
        assert_eq!(sampler.sample(&tracking()), PresenceSample::absent());
        assert_eq!(sampler.reader().detect_calls, 1);
        assert_eq!(sampler.reader().wakeup_calls, 1);
        assert_eq!(sampler.reader().resets, 1);
    }

    #[test]
    fn test_fresh_detection_wins_while_tracking() {
        let other = TagId::new(vec![0xca, 0xfe]);
        let mut sampler = PresenceSampler::new(FakeReader::with([Probe {
            detect: Some(other.clone()),
            still_here: true,
        }]));
        assert_eq!(sampler.sample(&tracking()), PresenceSample::detected(other));
        assert_eq!(sampler.reader().wakeup_calls, 0);
    }
}
