use std::{
    cell::RefCell,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    rc::Rc,
};

use clap::{Parser, Subcommand};
use hound::{SampleFormat, WavSpec, WavWriter};
use lamplight_core::{
    AppConfig, AudioCapability, EventLoop, HeadlessSurface, LamplightError, SceneLayout, Script,
    SessionController, SessionHost, TimeMode, TracingSpeech, VoiceInfo,
};
use tracing_subscriber::EnvFilter;

fn main() -> lamplight_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::DumpConfig { out } => dump_config(out),
    }
}

fn run(args: RunArgs) -> lamplight_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if args.seed.is_some() {
        config.audio.seed = args.seed;
    }
    config.validate()?;

    let script = match &args.script {
        Some(path) => Script::load(path)?,
        None => Script::lamplight(),
    };
    let mode = if args.realtime {
        TimeMode::System
    } else {
        TimeMode::Manual
    };
    tracing::info!(?mode, seconds = args.seconds, lines = script.lines.len(), "starting session");

    let host = EventLoop::new(mode, &config.host);
    let sample_rate = config.audio.sample_rate;
    let surface = Rc::new(RefCell::new(HeadlessSurface::new(
        args.width,
        args.height,
        args.device_pixel_ratio,
    )));
    let frames = Rc::new(RefCell::new(0u64));
    let frame_count = frames.clone();

    let mut controller = SessionController::new(
        SessionHost {
            event_loop: host.clone(),
            audio: AudioCapability::Available { sample_rate },
            speech: Some(Rc::new(TracingSpeech::new(default_voices()))),
            surface,
        },
        &config,
        script,
        move |surface: &mut HeadlessSurface, width, height, elapsed| {
            let layout = SceneLayout::compute(
                width as f64,
                height as f64,
                surface.backing.device_pixel_ratio,
                elapsed,
            );
            tracing::trace!(
                elapsed,
                boy_head_y = layout.boy.head.y,
                elder_x = layout.elder.body.x,
                "frame"
            );
            *frame_count.borrow_mut() += 1;
        },
    )?;
    controller.on_caption(|text| {
        if text.is_empty() {
            tracing::info!("caption cleared");
        } else {
            tracing::info!(caption = text, "caption");
        }
    });

    if args.muted {
        controller.mute();
    }
    controller.start();

    let mut writer = match &args.wav {
        Some(path) => Some(create_wav(path, sample_rate)?),
        None => None,
    };

    let mut toggles: Vec<f64> = args.mute_at.clone();
    toggles.sort_by(f64::total_cmp);
    let mut toggles = toggles.into_iter().peekable();

    let origin_ms = host.now_ms();
    let total_ms = args.seconds * 1000.0;
    let block_ms = config.audio.block_size as f64 * 1000.0 / sample_rate as f64;
    let mut block = vec![0.0f32; config.audio.block_size];
    let mut written = 0u64;
    let mut elapsed_ms = 0.0;

    while elapsed_ms < total_ms {
        while let Some(at) = toggles.next_if(|at| at * 1000.0 <= elapsed_ms) {
            controller.toggle_mute();
            tracing::info!(at, muted = controller.is_muted(), "mute toggled");
        }

        let step_ms = block_ms.min(total_ms - elapsed_ms);
        host.run_until(origin_ms + elapsed_ms + step_ms);
        elapsed_ms += step_ms;

        let target = (elapsed_ms * sample_rate as f64 / 1000.0).round() as u64;
        let len = (target - written) as usize;
        if len == 0 {
            continue;
        }
        let out = &mut block[..len.min(config.audio.block_size)];
        match controller.audio_session() {
            Some(session) => session.render(out),
            None => out.fill(0.0),
        }
        if let Some(writer) = writer.as_mut() {
            for &sample in out.iter() {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(value).map_err(wav_error)?;
            }
        }
        written += out.len() as u64;
    }

    controller.teardown();
    if let Some(writer) = writer {
        writer.finalize().map_err(wav_error)?;
    }

    tracing::info!(
        frames = *frames.borrow(),
        samples = written,
        audio_sessions = controller.engine().sessions_started(),
        "session finished"
    );
    Ok(())
}

fn dump_config(out: Option<PathBuf>) -> lamplight_core::Result<()> {
    let config = AppConfig::default();
    match out {
        Some(path) => {
            config.save(&path)?;
            tracing::info!(?path, "default configuration written");
        }
        None => println!("{}", config.to_json()?),
    }
    Ok(())
}

fn create_wav(path: &Path, sample_rate: u32) -> lamplight_core::Result<WavWriter<BufWriter<File>>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    tracing::info!(?path, sample_rate, "writing audio");
    WavWriter::create(path, spec).map_err(wav_error)
}

fn wav_error(err: hound::Error) -> LamplightError {
    LamplightError::msg(format!("wav output failed: {err}"))
}

fn default_voices() -> Vec<VoiceInfo> {
    vec![
        VoiceInfo::new("Samantha", "en-US"),
        VoiceInfo::new("Google हिन्दी", "hi-IN"),
        VoiceInfo::new("Microsoft Hemant - Hindi (India)", "hi-IN"),
    ]
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Narrated night-scene vignette with a generative music bed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the vignette headlessly, optionally recording the music bed.
    Run(RunArgs),
    /// Print (or write) the default configuration as JSON.
    DumpConfig {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Configuration file (JSON). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Narration script (JSON). The built-in script is used when omitted.
    #[arg(long)]
    script: Option<PathBuf>,
    /// How long to run, in seconds.
    #[arg(short, long, default_value_t = 55.0)]
    seconds: f64,
    /// Seed for the music bed, overriding the configuration.
    #[arg(long)]
    seed: Option<u64>,
    /// Follow the wall clock instead of rendering as fast as possible.
    #[arg(long)]
    realtime: bool,
    /// Start with sound muted.
    #[arg(long)]
    muted: bool,
    /// Toggle mute at these times (seconds since start).
    #[arg(long = "mute-at", value_delimiter = ',')]
    mute_at: Vec<f64>,
    /// Record the music bed to a mono 16-bit WAV file.
    #[arg(long)]
    wav: Option<PathBuf>,
    #[arg(long, default_value_t = 1280.0)]
    width: f64,
    #[arg(long, default_value_t = 720.0)]
    height: f64,
    #[arg(long, default_value_t = 1.0)]
    device_pixel_ratio: f64,
}
