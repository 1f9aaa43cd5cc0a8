//! Narration voice selection and the speech backend seam.
//!
//! The core never synthesizes speech itself. It picks a voice from whatever
//! the host's [`SpeechBackend`] reports and hands it an [`Utterance`].

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::{config::NarrationConfig, Capability};

/// Narration prosody. Both are fixed so every line sounds the same.
pub const SPEECH_RATE: f32 = 0.95;
pub const SPEECH_PITCH: f32 = 0.95;

const KNOWN_VENDORS: [&str; 3] = ["google", "microsoft", "apple"];
const MALE_MARKERS: [&str; 2] = ["male", "पुरुष"];

/// A voice as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub lang: String,
}

impl VoiceInfo {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<VoiceInfo>,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

/// Host speech capability: enumerable voices and cancellable playback.
pub trait SpeechBackend {
    fn voices(&self) -> Vec<VoiceInfo>;
    fn speak(&self, utterance: Utterance);
    /// Drops queued utterances and halts the one in progress.
    fn cancel(&self);
}

/// Which voice the narration should sound like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePreference {
    /// Full language/region tag, e.g. `hi-IN`.
    pub language: String,
}

impl VoicePreference {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    fn primary_subtag(&self) -> &str {
        primary_subtag(&self.language)
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.replace('_', "-").to_ascii_lowercase()
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(|c: char| c == '-' || c == '_').next().unwrap_or(tag)
}

fn matches_region(voice: &VoiceInfo, pref: &VoicePreference) -> bool {
    normalize_tag(&voice.lang) == normalize_tag(&pref.language)
}

fn sounds_male(voice: &VoiceInfo) -> bool {
    // Token match so that "Female" does not count as a male voice.
    voice
        .name
        .split(|c: char| !c.is_alphanumeric() && !is_devanagari_mark(c))
        .any(|token| {
            MALE_MARKERS
                .iter()
                .any(|marker| token.to_lowercase() == *marker)
        })
}

fn is_devanagari_mark(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

fn from_known_vendor(voice: &VoiceInfo) -> bool {
    let name = voice.name.to_lowercase();
    KNOWN_VENDORS.iter().any(|vendor| name.contains(vendor))
}

/// Picks the narration voice, in priority order: a male voice for the exact
/// language/region, a known-vendor voice for it, any voice sharing the
/// primary language, then the first voice. `None` leaves the choice to the
/// backend.
pub fn select_voice<'a>(voices: &'a [VoiceInfo], pref: &VoicePreference) -> Option<&'a VoiceInfo> {
    let primary = pref.primary_subtag();
    voices
        .iter()
        .find(|v| matches_region(v, pref) && sounds_male(v))
        .or_else(|| {
            voices
                .iter()
                .find(|v| matches_region(v, pref) && from_known_vendor(v))
        })
        .or_else(|| {
            voices
                .iter()
                .find(|v| primary_subtag(&v.lang).eq_ignore_ascii_case(primary))
        })
        .or_else(|| voices.first())
}

/// Fire-and-forget narration speaker with fixed prosody.
#[derive(Clone)]
pub struct Speaker {
    backend: Option<Rc<dyn SpeechBackend>>,
    preference: VoicePreference,
}

impl Speaker {
    pub fn new(backend: Option<Rc<dyn SpeechBackend>>, config: &NarrationConfig) -> Self {
        if backend.is_none() {
            tracing::debug!(capability = %Capability::Speech, "speech backend missing, narration will be silent");
        }
        Self {
            backend,
            preference: VoicePreference::new(config.language.clone()),
        }
    }

    /// A speaker for hosts without speech synthesis.
    pub fn silent(config: &NarrationConfig) -> Self {
        Self::new(None, config)
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Builds the utterance for `text` without speaking it.
    pub fn utterance(&self, text: &str, voices: &[VoiceInfo]) -> Utterance {
        let voice = select_voice(voices, &self.preference).cloned();
        let lang = voice
            .as_ref()
            .map(|v| v.lang.clone())
            .unwrap_or_else(|| self.preference.language.clone());
        Utterance {
            text: text.to_string(),
            voice,
            lang,
            rate: SPEECH_RATE,
            pitch: SPEECH_PITCH,
        }
    }

    pub fn speak(&self, text: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        let utterance = self.utterance(text, &backend.voices());
        tracing::debug!(
            voice = utterance.voice.as_ref().map(|v| v.name.as_str()),
            lang = %utterance.lang,
            "speaking narration line"
        );
        backend.speak(utterance);
    }

    pub fn cancel(&self) {
        if let Some(backend) = &self.backend {
            backend.cancel();
        }
    }
}

impl std::fmt::Debug for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Speaker")
            .field("available", &self.backend.is_some())
            .field("preference", &self.preference)
            .finish()
    }
}

/// Backend that only logs what it would say. Used by the command line
/// binary, where no system speech engine is wired up.
#[derive(Debug, Default)]
pub struct TracingSpeech {
    voices: Vec<VoiceInfo>,
}

impl TracingSpeech {
    pub fn new(voices: Vec<VoiceInfo>) -> Self {
        Self { voices }
    }
}

impl SpeechBackend for TracingSpeech {
    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance) {
        tracing::info!(lang = %utterance.lang, text = %utterance.text, "speech");
    }

    fn cancel(&self) {
        tracing::debug!("speech cancelled");
    }
}

/// In-memory backend that records utterances and cancels.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSpeech {
    voices: Vec<VoiceInfo>,
    spoken: std::cell::RefCell<Vec<Utterance>>,
    cancels: std::cell::Cell<usize>,
}

#[cfg(test)]
impl RecordingSpeech {
    pub fn new(voices: Vec<VoiceInfo>) -> Self {
        Self {
            voices,
            ..Default::default()
        }
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.borrow().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.get()
    }
}

#[cfg(test)]
impl SpeechBackend for RecordingSpeech {
    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance) {
        self.spoken.borrow_mut().push(utterance);
    }

    fn cancel(&self) {
        self.cancels.set(self.cancels.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hindi() -> VoicePreference {
        VoicePreference::new("hi-IN")
    }

    #[test]
    fn prefers_male_voice_for_the_region() {
        let voices = vec![
            VoiceInfo::new("Samantha", "en-US"),
            VoiceInfo::new("Google Hindi Male", "hi-IN"),
        ];
        let chosen = select_voice(&voices, &hindi()).unwrap();
        assert_eq!(chosen.name, "Google Hindi Male");
    }

    #[test]
    fn female_is_not_mistaken_for_male() {
        let voices = vec![
            VoiceInfo::new("Lekha Female", "hi-IN"),
            VoiceInfo::new("Microsoft Kalpana", "hi_IN"),
        ];
        let chosen = select_voice(&voices, &hindi()).unwrap();
        assert_eq!(chosen.name, "Microsoft Kalpana");
    }

    #[test]
    fn devanagari_marker_counts_as_male() {
        let voices = vec![
            VoiceInfo::new("Google हिन्दी", "hi-IN"),
            VoiceInfo::new("आवाज़ पुरुष", "hi-IN"),
        ];
        assert_eq!(select_voice(&voices, &hindi()).unwrap().name, "आवाज़ पुरुष");
    }

    #[test]
    fn falls_back_to_language_prefix_then_first() {
        let voices = vec![
            VoiceInfo::new("Alex", "en-US"),
            VoiceInfo::new("Madhur", "hi"),
        ];
        assert_eq!(select_voice(&voices, &hindi()).unwrap().name, "Madhur");

        let english = vec![VoiceInfo::new("Alex", "en-US")];
        assert_eq!(select_voice(&english, &hindi()).unwrap().name, "Alex");
        assert!(select_voice(&[], &hindi()).is_none());
    }

    #[test]
    fn speaking_applies_fixed_prosody() {
        let backend = Rc::new(RecordingSpeech::new(vec![VoiceInfo::new(
            "Google Hindi Male",
            "hi-IN",
        )]));
        let speaker = Speaker::new(Some(backend.clone()), &NarrationConfig::default());

        speaker.speak("नमस्ते");

        let spoken = backend.spoken();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].rate, SPEECH_RATE);
        assert_eq!(spoken[0].pitch, SPEECH_PITCH);
        assert_eq!(spoken[0].lang, "hi-IN");
    }

    #[test]
    fn utterance_uses_preferred_language_without_voices() {
        let speaker = Speaker::silent(&NarrationConfig::default());
        let utterance = speaker.utterance("text", &[]);
        assert!(utterance.voice.is_none());
        assert_eq!(utterance.lang, "hi-IN");
    }

    #[test]
    fn missing_backend_is_a_silent_no_op() {
        let speaker = Speaker::silent(&NarrationConfig::default());
        assert!(!speaker.is_available());
        speaker.speak("anything");
        speaker.cancel();
    }
}
