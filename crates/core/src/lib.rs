//! Core library for the Lamplight narrated night-scene experience.
//!
//! A viewing session combines three independent subsystems driven from one
//! cooperative event loop: a generative ambient music bed, a timed narration
//! track (captions plus synthesized speech) and an animation loop. Each
//! module owns one of them; [`session::SessionController`] wires them
//! together and is the only place where their lifecycles meet.

pub mod audio;
pub mod config;
pub mod error;
pub mod host;
pub mod narration;
pub mod render;
pub mod scene;
pub mod session;
pub mod speech;
pub mod timeline;

pub use audio::{AudioCapability, AudioSession, GenerativeEngine};
pub use config::{AppConfig, AudioConfig, HostConfig, NarrationConfig, RenderConfig};
pub use error::{Capability, LamplightError, Release, Result};
pub use host::{EventLoop, TimeMode};
pub use narration::{NarrationHandle, Narrator, Script, ScriptLine};
pub use render::{HeadlessSurface, PixelSize, RenderHandle, RenderLoop, Surface};
pub use scene::SceneLayout;
pub use session::{SessionController, SessionHost, SessionState};
pub use speech::{select_voice, Speaker, SpeechBackend, TracingSpeech, VoiceInfo, VoicePreference};
pub use timeline::{ScheduleHandle, Scheduler, TimedEvent};
