use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use lamplight_core::{
    speech::Utterance, AppConfig, AudioCapability, EventLoop, GenerativeEngine, HeadlessSurface,
    HostConfig, Release, Script, ScriptLine, SessionController, SessionHost, SessionState,
    SpeechBackend, TimeMode, VoiceInfo,
};

/// Speech backend that keeps every utterance and counts cancels.
#[derive(Default)]
struct RecordingSpeech {
    voices: Vec<VoiceInfo>,
    spoken: RefCell<Vec<Utterance>>,
    cancels: Cell<usize>,
}

impl RecordingSpeech {
    fn new(voices: Vec<VoiceInfo>) -> Self {
        Self {
            voices,
            ..Default::default()
        }
    }

    fn spoken(&self) -> Vec<Utterance> {
        self.spoken.borrow().clone()
    }

    fn cancels(&self) -> usize {
        self.cancels.get()
    }
}

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

fn event_loop() -> EventLoop {
    EventLoop::new(
        TimeMode::Manual,
        &HostConfig {
            frame_interval_ms: 16.0,
        },
    )
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.audio.sample_rate = 8_000;
    config.audio.seed = Some(7);
    config
}

fn controller(
    host: &EventLoop,
    script: Script,
    speech: Rc<RecordingSpeech>,
) -> SessionController<HeadlessSurface> {
    controller_with(host, &config(), script, speech)
}

fn controller_with(
    host: &EventLoop,
    config: &AppConfig,
    script: Script,
    speech: Rc<RecordingSpeech>,
) -> SessionController<HeadlessSurface> {
    SessionController::new(
        SessionHost {
            event_loop: host.clone(),
            audio: AudioCapability::Available { sample_rate: 8_000 },
            speech: Some(speech),
            surface: Rc::new(RefCell::new(HeadlessSurface::new(640.0, 360.0, 3.0))),
        },
        config,
        script,
        |surface: &mut HeadlessSurface, width, height, _| {
            assert_eq!(surface.backing.width, width);
            assert_eq!(surface.backing.height, height);
        },
    )
    .expect("valid controller")
}

fn hindi_voices() -> Vec<VoiceInfo> {
    vec![
        VoiceInfo::new("Alex", "en-US"),
        VoiceInfo::new("Google Hindi Male", "hi-IN"),
    ]
}

#[test]
fn empty_script_and_zero_volume_still_build_a_session() {
    let host = event_loop();
    let mut config = config();
    config.audio.volume = 0.0;
    let mut engine = GenerativeEngine::new(
        host.clone(),
        AudioCapability::Available { sample_rate: 8_000 },
        &config.audio,
    );

    let session = engine.start(config.audio.volume).expect("audio available");
    assert_eq!(session.voice_count(), 4);
    host.run_for(1_000.0);

    let mut out = vec![1.0f32; 256];
    session.render(&mut out);
    assert!(out.iter().all(|sample| *sample == 0.0));

    assert_eq!(session.stop(), Release::Released);
    assert_eq!(session.stop(), Release::AlreadyReleased);
    assert_eq!(engine.live_sessions(), 0);

    let speech = Rc::new(RecordingSpeech::new(hindi_voices()));
    let mut controller = controller_with(&host, &config, Script::default(), speech.clone());
    controller.start();
    host.run_for(5_000.0);

    let session = controller.audio_session().expect("audio started");
    assert_eq!(session.volume(), 0.0);
    assert!(session.is_running());
    let mut out = vec![1.0f32; 512];
    session.render(&mut out);
    assert!(out.iter().all(|sample| *sample == 0.0));
    assert_eq!(controller.caption(), "");

    controller.teardown();
    assert!(speech.spoken().is_empty());
    assert_eq!(speech.cancels(), 0);
    assert_eq!(controller.engine().live_sessions(), 0);
    assert!(host.is_quiescent());
}

#[test]
fn start_mute_unmute_unmute_keeps_one_live_session() {
    let host = event_loop();
    let speech = Rc::new(RecordingSpeech::new(hindi_voices()));
    let mut controller = controller(&host, Script::lamplight(), speech);

    controller.start();
    host.run_for(1_000.0);
    controller.mute();
    host.run_for(1_000.0);
    controller.unmute();
    controller.unmute();
    host.run_for(1_000.0);

    assert_eq!(controller.state(), SessionState::Running { muted: false });
    assert_eq!(controller.engine().live_sessions(), 1);
    assert!(controller.engine().peak_live_sessions() <= 1);
}

#[test]
fn narration_selects_the_male_hindi_voice() {
    let host = event_loop();
    let speech = Rc::new(RecordingSpeech::new(hindi_voices()));
    let mut controller = controller(&host, Script::lamplight(), speech.clone());

    controller.start();
    host.run_for(1_000.0);

    let spoken = speech.spoken();
    assert_eq!(spoken.len(), 1);
    assert_eq!(
        spoken[0].voice.as_ref().map(|voice| voice.name.as_str()),
        Some("Google Hindi Male")
    );
    assert_eq!(spoken[0].lang, "hi-IN");
    assert_eq!(controller.caption(), Script::lamplight().lines[0].text);
}

#[test]
fn teardown_with_narration_pending_never_fires_it() {
    let host = event_loop();
    let speech = Rc::new(RecordingSpeech::new(hindi_voices()));
    let script = Script::new(vec![
        ScriptLine::new(0.2, "पहले"),
        ScriptLine::new(10.0, "बाद में"),
    ]);
    let mut controller = controller(&host, script, speech.clone());

    controller.start();
    host.run_for(500.0);
    assert_eq!(speech.spoken().len(), 1);

    controller.teardown();
    host.run_for(30_000.0);

    assert_eq!(speech.spoken().len(), 1);
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(host.is_quiescent());
}

#[test]
fn final_caption_clears_after_reading_time() {
    let host = event_loop();
    let speech = Rc::new(RecordingSpeech::new(hindi_voices()));
    let script = Script::lamplight();
    let last = script.lines.last().cloned().expect("non-empty script");
    let hold = (last.text.chars().count() as f64 * 0.08).max(3.0);
    let mut controller = controller(&host, script, speech);

    controller.start();
    host.run_until((last.offset_seconds + hold) * 1000.0 - 1.0);
    assert_eq!(controller.caption(), last.text);

    host.run_for(2.0);
    assert_eq!(controller.caption(), "");
}

#[test]
fn restart_after_teardown_builds_new_handles() {
    let host = event_loop();
    let speech = Rc::new(RecordingSpeech::new(hindi_voices()));
    let mut controller = controller(&host, Script::lamplight(), speech.clone());

    controller.start();
    host.run_for(6_000.0);
    controller.teardown();
    let spoken_before = speech.spoken().len();

    controller.start();
    host.run_for(1_000.0);

    assert_eq!(controller.engine().sessions_started(), 2);
    assert_eq!(controller.engine().live_sessions(), 1);
    assert_eq!(speech.spoken().len(), spoken_before + 1);
    assert_eq!(
        controller.render_handle().map(|render| render.size().width),
        Some(1280)
    );
}

#[test]
fn resize_reaches_the_next_frame() {
    let host = event_loop();
    let speech = Rc::new(RecordingSpeech::new(Vec::new()));
    let mut controller = controller(&host, Script::default(), speech);

    controller.start();
    host.run_for(40.0);
    controller.surface().borrow_mut().container = (300.0, 200.0);
    host.dispatch_resize();
    host.run_for(40.0);

    let render = controller.render_handle().expect("render loop running");
    assert_eq!((render.size().width, render.size().height), (600, 400));
    assert!(render.frames_drawn() >= 4);
}
