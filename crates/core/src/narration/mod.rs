use std::{cell::Cell, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    host::EventLoop,
    speech::Speaker,
    timeline::{ScheduleHandle, Scheduler, TimedEvent},
    LamplightError, Release, Result,
};

/// Minimum time a final caption stays on screen.
const MIN_CAPTION_HOLD_SECONDS: f64 = 3.0;
/// Reading time per character of the final caption.
const CAPTION_SECONDS_PER_CHAR: f64 = 0.08;

/// One line of narration as stored in a script file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub offset_seconds: f64,
    pub text: String,
}

impl ScriptLine {
    pub fn new(offset_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            offset_seconds,
            text: text.into(),
        }
    }
}

/// Ordered narration script, supplied once per session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub lines: Vec<ScriptLine>,
}

impl Script {
    pub fn new(lines: Vec<ScriptLine>) -> Self {
        Self { lines }
    }

    /// The built-in Hindi narration of the lamplight vignette.
    pub fn lamplight() -> Self {
        Self::new(vec![
            ScriptLine::new(0.6, "रात गहरी थी, पर उसके मन में उजाला था।"),
            ScriptLine::new(5.5, "लोग कहते थे, इतनी पढ़ाई से क्या मिलेगा?"),
            ScriptLine::new(11.5, "वह चुपचाप अपनी कॉपी में लिखता रहा।"),
            ScriptLine::new(17.5, "सड़क के उस पार, एक बूढ़ा आदमी सब देख रहा था।"),
            ScriptLine::new(23.5, "एक रात वह पास आया, और धीरे से बोला, बेटा सुनो।"),
            ScriptLine::new(
                31.0,
                "दुनिया की बातें हवा की तरह होती हैं, आती हैं और चली जाती हैं।",
            ),
            ScriptLine::new(
                38.0,
                "लेकिन मेहनत की रोशनी कभी बुझती नहीं, बस अपना दीया जलाए रखना।",
            ),
            ScriptLine::new(46.0, "और सच में, एक दिन उसी दीये ने पूरी गली रोशन कर दी।"),
        ])
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let script: Script = serde_json::from_str(&text)?;
        script.validate()?;
        Ok(script)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// Rejects lines that could never be scheduled.
    pub fn validate(&self) -> Result<()> {
        match self
            .lines
            .iter()
            .find(|line| !(line.offset_seconds.is_finite() && line.offset_seconds >= 0.0))
        {
            Some(line) => Err(LamplightError::InvalidEvent {
                offset_seconds: line.offset_seconds,
            }),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn events(&self) -> Vec<TimedEvent<String>> {
        self.lines
            .iter()
            .map(|line| TimedEvent::new(line.offset_seconds, line.text.clone()))
            .collect()
    }
}

/// Offset at which the caption of `last` is cleared.
pub fn caption_clear_offset(last: &TimedEvent<String>) -> f64 {
    let reading_time = last.payload.chars().count() as f64 * CAPTION_SECONDS_PER_CHAR;
    last.offset_seconds + reading_time.max(MIN_CAPTION_HOLD_SECONDS)
}

#[derive(Debug, Clone, PartialEq)]
enum Cue {
    Line(String),
    Clear,
}

/// Emits captions and speech in lockstep.
#[derive(Debug, Clone)]
pub struct Narrator {
    scheduler: Scheduler,
    speaker: Speaker,
}

impl Narrator {
    pub fn new(host: EventLoop, speaker: Speaker) -> Self {
        Self {
            scheduler: Scheduler::new(host),
            speaker,
        }
    }

    /// Schedules every line plus one trailing event that clears the caption.
    /// For each line the caption is delivered before speech starts.
    pub fn start<F>(&self, lines: Vec<TimedEvent<String>>, mut on_caption: F) -> Result<NarrationHandle>
    where
        F: FnMut(&str) + 'static,
    {
        let Some(last) = lines.last() else {
            return Ok(NarrationHandle {
                schedule: None,
                speaker: self.speaker.clone(),
                cancelled: Cell::new(false),
            });
        };

        let clear_at = caption_clear_offset(last);
        let line_count = lines.len();
        let mut cues: Vec<TimedEvent<Cue>> = lines
            .into_iter()
            .map(|line| TimedEvent::new(line.offset_seconds, Cue::Line(line.payload)))
            .collect();
        cues.push(TimedEvent::new(clear_at, Cue::Clear));

        let speaker = self.speaker.clone();
        let schedule = self.scheduler.schedule(cues, move |cue| match cue {
            Cue::Line(text) => {
                on_caption(&text);
                speaker.speak(&text);
            }
            Cue::Clear => on_caption(""),
        })?;

        tracing::info!(lines = line_count, clear_at, "narration scheduled");
        Ok(NarrationHandle {
            schedule: Some(schedule),
            speaker: self.speaker.clone(),
            cancelled: Cell::new(false),
        })
    }
}

/// Cancels a running narration. Safe to call any number of times.
#[derive(Debug)]
pub struct NarrationHandle {
    schedule: Option<ScheduleHandle>,
    speaker: Speaker,
    cancelled: Cell<bool>,
}

impl NarrationHandle {
    pub fn cancel(&self) -> Release {
        if self.cancelled.replace(true) {
            return Release::AlreadyReleased;
        }
        if let Some(schedule) = &self.schedule {
            schedule.cancel();
            self.speaker.cancel();
        }
        Release::Released
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Lines (and the trailing clear) that have not fired yet.
    pub fn pending(&self) -> usize {
        self.schedule.as_ref().map_or(0, ScheduleHandle::pending)
    }
}
