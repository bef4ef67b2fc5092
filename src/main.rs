use anyhow::{anyhow, Result};
use clap::Parser;
use log::{info, warn};
use std::time::Duration;

use reactive_visualizer::motion::{MjpegEndpoint, MotionMode, SyntheticCamera};
use reactive_visualizer::scene::Scene;
use reactive_visualizer::{Visualizer, VisualizerConfig};

const TICKS_PER_SECOND: u32 = 60;

#[derive(Parser)]
#[command(name = "reactive-visualizer")]
#[command(about = "Run the audio and motion reactive pipeline headless")]
struct Args {
    /// JSON settings file; missing fields take their defaults
    #[arg(short, long)]
    config: Option<String>,

    /// WAV file to analyse instead of a live input
    #[arg(long)]
    wav: Option<String>,

    /// Capture the default microphone (needs the live-input feature)
    #[arg(long)]
    mic: bool,

    /// Remote MJPEG camera URL
    #[arg(long)]
    mjpeg: Option<String>,

    /// Show the remote stream without analysing its pixels
    #[arg(long)]
    display_only: bool,

    /// Drive motion from a generated moving square
    #[arg(long)]
    synthetic_camera: bool,

    /// Scene: spectrum, plasma, paint, confetti, bubbles, passthrough, network-camera
    #[arg(long, default_value = "spectrum")]
    scene: String,

    /// Motion mode: off, push, predator, trails
    #[arg(long, default_value = "off")]
    mode: String,

    /// Simulated seconds to run
    #[arg(long, default_value = "10")]
    seconds: f32,

    /// Pace ticks against the wall clock
    #[arg(long)]
    realtime: bool,

    /// Write the final uniforms and spectrum as JSON ("-" for stdout)
    #[arg(long)]
    dump: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => VisualizerConfig::load(path)?,
        None => VisualizerConfig::default(),
    };
    if args.wav.is_some() {
        config.sources.wav_path = args.wav.clone();
    }
    config.sources.microphone |= args.mic;
    if args.mjpeg.is_some() {
        config.sources.mjpeg_url = args.mjpeg.clone();
    }
    config.sources.display_only |= args.display_only;

    let scene = Scene::from_name(&args.scene).ok_or_else(|| anyhow!("unknown scene '{}'", args.scene))?;
    let mode = MotionMode::from_name(&args.mode).ok_or_else(|| anyhow!("unknown motion mode '{}'", args.mode))?;

    info!("Reactive visualizer: scene={} mode={}", scene.name(), mode.name());
    let mut visualizer = Visualizer::new(config.clone());
    visualizer.select_scene(scene);
    visualizer.set_motion_mode(mode);

    visualizer.connect_configured_audio().await;
    info!("Audio: {:?}", visualizer.audio_status());

    if args.synthetic_camera {
        visualizer.connect_motion(Box::new(SyntheticCamera::new(320, 240)));
    }
    if let Some(url) = config.sources.mjpeg_url.clone() {
        let endpoint = MjpegEndpoint {
            url,
            display_only: config.sources.display_only,
        };
        if let Err(e) = visualizer.open_motion(&endpoint).await {
            warn!("Continuing without the remote camera: {}", e);
        }
    }

    let total_ticks = (args.seconds.max(0.0) * TICKS_PER_SECOND as f32).round() as u64;
    let tick_ms = 1000.0 / TICKS_PER_SECOND as f64;
    let mut interval = tokio::time::interval(Duration::from_secs_f64(tick_ms / 1000.0));

    for tick in 0..total_ticks {
        if args.realtime {
            interval.tick().await;
        }
        let uniforms = visualizer.tick(tick as f64 * tick_ms).uniforms;

        if tick % TICKS_PER_SECOND as u64 == 0 {
            info!(
                "t={:.2}s bass={:.2} mid={:.2} treble={:.2} energy={:.2} beat={:.2} motion={:.2}",
                uniforms.time,
                uniforms.bass,
                uniforms.mid,
                uniforms.treble,
                uniforms.energy,
                uniforms.beat,
                uniforms.motion_intensity
            );
        }
    }
    info!("Finished {} ticks", visualizer.ticks());

    if let Some(target) = &args.dump {
        let frame = visualizer.frame();
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "uniforms": frame.uniforms,
            "spectrum": frame.spectrum,
        }))?;
        if target == "-" {
            println!("{}", json);
        } else {
            std::fs::write(target, json)?;
            info!("Wrote final frame to {}", target);
        }
    }

    Ok(())
}
