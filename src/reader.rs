use std::fs;
use std::path::Path;

use anyhow::{Context as _, bail};
use log::debug;

use crate::messages::TagId;

/// Low-level probes offered by a proximity card reader.
///
/// Probes never fail loudly: a driver that cannot talk to the card reports
/// absence instead.
pub trait Reader {
    /// Looks for a newly presented tag and selects it, returning its UID.
    fn detect(&mut self) -> Option<TagId>;

    /// Wakes a tag that is already in the field. Does not read its UID.
    fn probe_continued_presence(&mut self) -> bool;

    /// Halts the selected tag and ends any session. Safe to call repeatedly.
    fn reset_session(&mut self);
}

impl<R: Reader + ?Sized> Reader for Box<R> {
    fn detect(&mut self) -> Option<TagId> {
        (**self).detect()
    }

    fn probe_continued_presence(&mut self) -> bool {
        (**self).probe_continued_presence()
    }

    fn reset_session(&mut self) {
        (**self).reset_session()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplayStep {
    Detect(TagId),
    Held,
    Nothing,
}

fn parse_step(line: &str) -> anyhow::Result<Option<ReplayStep>> {
    let line = line.split('#').next().unwrap_or_default().trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let step = match (words.next(), words.next()) {
        (Some("new"), Some(uid)) => ReplayStep::Detect(uid.parse()?),
        (Some("new"), None) => bail!("`new` needs a tag id"),
        (Some("held"), None) => ReplayStep::Held,
        (Some("none" | "-"), None) => ReplayStep::Nothing,
        _ => bail!("unrecognised directive {line:?}"),
    };

    if words.next().is_some() {
        bail!("trailing input in {line:?}");
    }
    Ok(Some(step))
}

/// Plays back a recorded probe script, one step per presence cycle.
#[derive(Debug)]
pub struct ReplayReader {
    steps: Vec<ReplayStep>,
    position: usize,
    repeat: bool,
}

impl ReplayReader {
    pub fn new(steps: Vec<ReplayStep>, repeat: bool) -> Self {
        ReplayReader {
            steps,
            position: 0,
            repeat,
        }
    }

    pub fn parse(script: &str, repeat: bool) -> anyhow::Result<Self> {
        let mut steps = Vec::new();
        for (idx, line) in script.lines().enumerate() {
            if let Some(step) = parse_step(line).with_context(|| format!("line {}", idx + 1))? {
                steps.push(step);
            }
        }
        Ok(ReplayReader::new(steps, repeat))
    }

    pub fn from_file(path: &Path, repeat: bool) -> anyhow::Result<Self> {
        let script = fs::read_to_string(path)
            .with_context(|| format!("reading replay script {}", path.display()))?;
        let reader = ReplayReader::parse(&script, repeat)
            .with_context(|| format!("parsing replay script {}", path.display()))?;
        debug!(
            "Loaded {} replay steps from {}",
            reader.steps.len(),
            path.display()
        );
        Ok(reader)
    }

    fn current(&self) -> Option<&ReplayStep> {
        self.steps.get(self.position)
    }
}

impl Reader for ReplayReader {
    fn detect(&mut self) -> Option<TagId> {
        match self.current() {
            Some(ReplayStep::Detect(id)) => Some(id.clone()),
            _ => None,
        }
    }

    fn probe_continued_presence(&mut self) -> bool {
        matches!(self.current(), Some(ReplayStep::Held))
    }

    fn reset_session(&mut self) {
        if self.position < self.steps.len() {
            self.position += 1;
        }
        if self.repeat && self.position == self.steps.len() {
            self.position = 0;
        }
    }
}
