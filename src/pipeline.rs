use log::{debug, info, warn};
use std::time::Duration;

use crate::audio::{acquire_microphone, AudioFrame, AudioProcessor, AudioSource, WavFileSource};
use crate::config::{clamp_or, VisualizerConfig, DENSITY_RANGE, SIZE_RANGE};
use crate::error::{Capability, SourceError, SourceKind, SourceStatus};
use crate::motion::source::MotionSourceProvider;
use crate::motion::{MotionFieldExtractor, MotionFrame, MotionMode, MotionSource, SourceFrame};
use crate::particles::{
    BubbleSystem, ColorMode, ConfettiSystem, FieldView, ParticleInputs, ParticleSystem, SparkSystem,
};
use crate::scene::bridge::BridgeInputs;
use crate::scene::{MotionRoute, ParticleKind, PublishedFrame, Scene, SceneUniformBridge};

/// Nominal seconds per render tick.
pub const TICK_DT: f32 = 1.0 / 60.0;

/// One connected motion source and its reported status.
#[derive(Default)]
struct MotionSlot {
    source: Option<Box<dyn MotionSource>>,
    status: SourceStatus,
}

impl MotionSlot {
    fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    fn disconnect(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.disconnect();
        }
        self.status = SourceStatus::Disconnected;
    }
}

/// The whole analysis-and-render-state pipeline.
///
/// Owns every extractor, simulation and the uniform bridge. [`tick`] runs
/// one frame in a fixed order: audio features, motion features, particle
/// update, paint accumulation, then uniform assembly, so nothing
/// downstream ever sees a half-updated input.
///
/// [`tick`]: Visualizer::tick
pub struct Visualizer {
    config: VisualizerConfig,
    scene: Scene,
    mode: MotionMode,

    audio: AudioProcessor,
    motion: MotionFieldExtractor,
    local: MotionSlot,
    remote: MotionSlot,
    route: MotionRoute,

    confetti: ConfettiSystem,
    sparks: SparkSystem,
    bubbles: BubbleSystem,
    bridge: SceneUniformBridge,

    audio_frame: AudioFrame,
    motion_frame: Option<MotionFrame>,
    /// Latest undecoded frame from a source that may only be displayed
    display_frame: Option<Vec<u8>>,
    ticks: u64,
}

impl Visualizer {
    pub fn new(config: VisualizerConfig) -> Self {
        let config = config.sanitized();
        let particles = &config.particles;
        let seed = particles.seed;

        let mut confetti = ConfettiSystem::new(particles.confetti_capacity, seed);
        let mut sparks = SparkSystem::new(particles.spark_capacity, seed.map(|s| s.wrapping_add(1)));
        let mut bubbles = BubbleSystem::new(particles.bubble_capacity, seed.map(|s| s.wrapping_add(2)));
        {
            let systems: [&mut dyn ParticleSystem; 3] = [&mut confetti, &mut sparks, &mut bubbles];
            for system in systems {
                system.set_density(particles.density);
                system.set_size_scale(particles.size);
                system.set_color_mode(particles.color_mode);
            }
        }

        Self {
            audio: AudioProcessor::new(&config.audio),
            motion: MotionFieldExtractor::new(&config.motion),
            local: MotionSlot::default(),
            remote: MotionSlot::default(),
            route: MotionRoute::None,
            confetti,
            sparks,
            bubbles,
            bridge: SceneUniformBridge::new(&config.paint),
            audio_frame: AudioFrame::silent(config.audio.spectrum_bands),
            motion_frame: None,
            display_frame: None,
            ticks: 0,
            scene: Scene::default(),
            mode: MotionMode::Off,
            config,
        }
    }

    /// Run one frame. `now_ms` is the timestamp used for beat cooldowns.
    pub fn tick(&mut self, now_ms: f64) -> &PublishedFrame {
        self.audio_frame = self.audio.tick(now_ms);
        self.update_motion();
        self.update_particles();

        let paint_heat = self.motion_frame.map(|_| self.motion.motion_field());
        self.bridge.accumulate_paint(paint_heat, TICK_DT);
        self.bridge.advance_clock(self.audio_frame.beat_detected);

        let (rgba, hd) = match self.motion_frame {
            Some(_) => (Some(self.motion.rgba_frame()), Some(self.motion.hd_frame())),
            None => (None, None),
        };
        let display_only = self.routed_capability() == Some(Capability::DisplayOnly);

        self.ticks += 1;
        if self.ticks % 120 == 0 {
            debug!(
                "Tick {}: scene={} mode={} route={:?} confetti={} sparks={} bubbles={}",
                self.ticks,
                self.scene.name(),
                self.mode.name(),
                self.route,
                self.confetti.active_count(),
                self.sparks.active_count(),
                self.bubbles.active_count()
            );
        }

        self.bridge.assemble(BridgeInputs {
            scene: self.scene,
            audio: &self.audio_frame,
            motion: self.motion_frame,
            mode: self.mode,
            motion_field: Some(self.motion.motion_field()),
            rgba,
            hd,
            encoded: self.display_frame.as_deref(),
            display_only,
            particles: &self.config.particles,
        })
    }

    fn update_motion(&mut self) {
        let route = MotionRoute::select(self.scene, self.local.is_connected(), self.remote.is_connected());
        if route != self.route {
            info!("Motion route {:?} -> {:?}", self.route, route);
            self.drop_motion_state();
            self.route = route;
        }

        let wanted = self.scene.consumes_motion() || self.mode != MotionMode::Off;
        let slot = match route {
            MotionRoute::Local => &mut self.local,
            MotionRoute::Remote => &mut self.remote,
            MotionRoute::None => return,
        };
        let Some(source) = slot.source.as_mut() else {
            return;
        };

        let capability = source.capability();
        slot.status = SourceStatus::Active(capability);
        let analyse = wanted && capability == Capability::Full;

        match source.poll_frame() {
            Some(SourceFrame::Encoded(jpeg)) => {
                self.display_frame = Some(jpeg);
                self.motion_frame = None;
            }
            Some(SourceFrame::Pixels(pixels)) => {
                self.display_frame = None;
                if !analyse {
                    self.motion_frame = None;
                } else if pixels.is_empty() {
                    warn!("Skipping empty frame from {}", source.name());
                } else {
                    self.motion_frame = Some(self.motion.process(&pixels));
                }
            }
            // No new frame this tick: hold the previous features
            None => {}
        }
        if !analyse {
            self.motion_frame = None;
        }
    }

    /// Forget every frame and feature derived from the routed source.
    fn drop_motion_state(&mut self) {
        self.motion.invalidate();
        self.motion_frame = None;
        self.display_frame = None;
    }

    fn update_particles(&mut self) {
        if self.bridge.is_paused() {
            return;
        }
        let field = self
            .motion_frame
            .map(|_| FieldView::new(self.motion.motion_field(), self.config.particles.collision_threshold));
        let inputs = ParticleInputs {
            dt: TICK_DT,
            time: self.bridge.time(),
            audio: &self.audio_frame,
            motion: self.motion_frame,
            field,
        };

        match self.scene.particle_system() {
            Some(ParticleKind::Confetti) => self.confetti.update(&inputs),
            Some(ParticleKind::Bubbles) => self.bubbles.update(&inputs),
            Some(ParticleKind::Sparks) | None => {}
        }
        if self.mode == MotionMode::Trails {
            self.sparks.update(&inputs);
        }
    }

    fn routed_capability(&self) -> Option<Capability> {
        let slot = match self.route {
            MotionRoute::Local => &self.local,
            MotionRoute::Remote => &self.remote,
            MotionRoute::None => return None,
        };
        slot.source.as_ref().map(|source| source.capability())
    }

    // Control surface

    pub fn select_scene(&mut self, scene: Scene) {
        if scene == self.scene {
            return;
        }
        info!("Scene {} -> {}", self.scene.name(), scene.name());

        if let Some(kind) = self.scene.particle_system() {
            if scene.particle_system() != Some(kind) {
                self.particle_system_mut(kind).clear();
            }
        }
        self.scene = scene;
        self.sync_paint();
    }

    pub fn set_motion_mode(&mut self, mode: MotionMode) {
        if mode == self.mode {
            return;
        }
        info!("Motion mode {} -> {}", self.mode.name(), mode.name());

        match self.mode {
            MotionMode::Trails => {
                self.sparks.set_emitting(false);
                self.sparks.clear();
            }
            MotionMode::Off | MotionMode::Push | MotionMode::Predator => {}
        }
        self.mode = mode;
        match mode {
            MotionMode::Trails => self.sparks.set_emitting(true),
            MotionMode::Off => self.motion_frame = None,
            MotionMode::Push | MotionMode::Predator => {}
        }
        self.motion.set_mode(mode);
        self.sync_paint();
    }

    /// Off -> Push -> Predator -> Trails -> Off.
    pub fn cycle_motion_mode(&mut self) -> MotionMode {
        self.set_motion_mode(self.mode.next());
        self.mode
    }

    fn sync_paint(&mut self) {
        let active = self.scene.uses_paint() || self.mode == MotionMode::Predator;
        self.bridge.set_paint_active(active);
    }

    pub fn set_particle_density(&mut self, density: f32) {
        let density = clamp_or(density, DENSITY_RANGE, 1.0);
        self.for_each_system(|system| system.set_density(density));
        self.config.particles.density = density;
    }

    pub fn set_particle_size(&mut self, size: f32) {
        let size = clamp_or(size, SIZE_RANGE, 1.0);
        self.for_each_system(|system| system.set_size_scale(size));
        self.config.particles.size = size;
    }

    pub fn set_color_mode(&mut self, mode: ColorMode) {
        self.for_each_system(|system| system.set_color_mode(mode));
        self.config.particles.color_mode = mode;
    }

    pub fn set_particle_capacity(&mut self, kind: ParticleKind, capacity: usize) {
        self.particle_system_mut(kind).resize_capacity(capacity);
    }

    pub fn set_paused(&mut self, paused: bool) {
        if paused != self.bridge.is_paused() {
            info!("{}", if paused { "Paused" } else { "Resumed" });
        }
        self.bridge.set_paused(paused);
    }

    pub fn set_beat_threshold(&mut self, threshold: f32) {
        self.audio.extractor_mut().set_beat_threshold(threshold);
    }

    pub fn set_audio_smoothing(&mut self, smoothing: f32) {
        self.audio.extractor_mut().set_smoothing(smoothing);
    }

    pub fn set_adaptive_gain(&mut self, enabled: bool) {
        self.audio.extractor_mut().set_adaptive_gain(enabled);
    }

    fn for_each_system(&mut self, mut f: impl FnMut(&mut dyn ParticleSystem)) {
        f(&mut self.confetti);
        f(&mut self.sparks);
        f(&mut self.bubbles);
    }

    fn particle_system_mut(&mut self, kind: ParticleKind) -> &mut dyn ParticleSystem {
        match kind {
            ParticleKind::Confetti => &mut self.confetti,
            ParticleKind::Sparks => &mut self.sparks,
            ParticleKind::Bubbles => &mut self.bubbles,
        }
    }

    // Sources

    pub fn connect_audio(&mut self, source: Box<dyn AudioSource>) {
        self.audio.connect(source);
    }

    pub fn disconnect_audio(&mut self) {
        self.audio.disconnect();
    }

    /// Open the configured WAV file or microphone, recording a failure as
    /// an unavailable status instead of returning it.
    pub async fn connect_configured_audio(&mut self) {
        let timeout = Duration::from_millis(self.config.sources.acquire_timeout_ms);
        let result = if let Some(path) = self.config.sources.wav_path.clone() {
            WavFileSource::open(&path).map(|source| Box::new(source) as Box<dyn AudioSource>)
        } else if self.config.sources.microphone {
            acquire_microphone(timeout).await
        } else {
            return;
        };

        match result {
            Ok(source) => self.connect_audio(source),
            Err(err) => self.audio.mark_unavailable(&err),
        }
    }

    pub fn connect_motion(&mut self, source: Box<dyn MotionSource>) {
        let capability = source.capability();
        let kind = source.kind();
        info!("Motion source {} connected ({:?})", source.name(), capability);
        self.release_slot(kind);
        let slot = self.slot_mut(kind);
        slot.source = Some(source);
        slot.status = SourceStatus::Active(capability);
    }

    /// Open a motion source through its provider with the configured
    /// deadline. Failures leave the pipeline running and are reported
    /// through [`Visualizer::motion_status`].
    pub async fn open_motion(&mut self, provider: &dyn MotionSourceProvider) -> Result<(), SourceError> {
        let timeout = Duration::from_millis(self.config.sources.acquire_timeout_ms);
        match provider.open(timeout).await {
            Ok(source) => {
                self.connect_motion(source);
                Ok(())
            }
            Err(err) => {
                warn!("Motion source unavailable, continuing without it: {}", err);
                self.release_slot(provider.kind());
                self.slot_mut(provider.kind()).status = SourceStatus::from_error(&err);
                Err(err)
            }
        }
    }

    /// Disconnect a motion source and drop everything derived from it
    /// before the next tick can read it.
    pub fn disconnect_motion(&mut self, kind: SourceKind) {
        self.release_slot(kind);
    }

    /// Disconnect whatever occupies the slot for `kind`. When that source
    /// was feeding the extractor, its buffers go with it, even if a
    /// replacement of the same kind keeps the route unchanged.
    fn release_slot(&mut self, kind: SourceKind) {
        let slot = self.slot_mut(kind);
        let occupied = slot.is_connected();
        slot.disconnect();
        if occupied && self.route == route_for(kind) {
            self.drop_motion_state();
        }
    }

    fn slot_mut(&mut self, kind: SourceKind) -> &mut MotionSlot {
        match kind {
            SourceKind::RemoteStream => &mut self.remote,
            SourceKind::LocalCamera | SourceKind::Microphone | SourceKind::AudioFile => &mut self.local,
        }
    }

    // Observers

    pub fn scene(&self) -> Scene {
        self.scene
    }

    pub fn motion_mode(&self) -> MotionMode {
        self.mode
    }

    pub fn route(&self) -> MotionRoute {
        self.route
    }

    pub fn audio_status(&self) -> &SourceStatus {
        self.audio.status()
    }

    pub fn motion_status(&self, kind: SourceKind) -> &SourceStatus {
        match kind {
            SourceKind::RemoteStream => &self.remote.status,
            SourceKind::LocalCamera | SourceKind::Microphone | SourceKind::AudioFile => &self.local.status,
        }
    }

    pub fn audio_frame(&self) -> &AudioFrame {
        &self.audio_frame
    }

    pub fn motion_frame(&self) -> Option<MotionFrame> {
        self.motion_frame
    }

    pub fn motion_extractor(&self) -> &MotionFieldExtractor {
        &self.motion
    }

    pub fn particles(&self, kind: ParticleKind) -> &dyn ParticleSystem {
        match kind {
            ParticleKind::Confetti => &self.confetti,
            ParticleKind::Sparks => &self.sparks,
            ParticleKind::Bubbles => &self.bubbles,
        }
    }

    pub fn bridge(&self) -> &SceneUniformBridge {
        &self.bridge
    }

    pub fn frame(&self) -> &PublishedFrame {
        self.bridge.frame()
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

fn route_for(kind: SourceKind) -> MotionRoute {
    match kind {
        SourceKind::RemoteStream => MotionRoute::Remote,
        SourceKind::LocalCamera | SourceKind::Microphone | SourceKind::AudioFile => MotionRoute::Local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::source::SyntheticCamera;

    /// Local camera that always shows one flat grey level.
    struct FlatCamera(u8);

    impl MotionSource for FlatCamera {
        fn kind(&self) -> SourceKind {
            SourceKind::LocalCamera
        }

        fn capability(&self) -> Capability {
            Capability::Full
        }

        fn poll_frame(&mut self) -> Option<SourceFrame> {
            let v = self.0;
            Some(SourceFrame::Pixels(crate::grid::Grid::filled(160, 120, [v, v, v, 255])))
        }

        fn disconnect(&mut self) {}

        fn name(&self) -> &str {
            "flat"
        }
    }

    fn visualizer() -> Visualizer {
        let mut config = VisualizerConfig::default();
        config.particles.seed = Some(42);
        Visualizer::new(config)
    }

    #[test]
    fn test_runs_without_any_source() {
        let mut vis = visualizer();
        for tick in 0..10 {
            let frame = vis.tick(tick as f64 * 16.0);
            assert_eq!(frame.uniforms.energy, 0.0);
            assert_eq!(frame.uniforms.motion_available, 0);
        }
        assert_eq!(vis.route(), MotionRoute::None);
    }

    #[test]
    fn test_synthetic_camera_drives_motion() {
        let mut vis = visualizer();
        vis.select_scene(Scene::Passthrough);
        vis.connect_motion(Box::new(SyntheticCamera::new(320, 240).with_speed(0.2)));
        for tick in 0..30 {
            vis.tick(tick as f64 * 16.0);
        }
        let motion = vis.motion_frame().unwrap();
        assert!(motion.intensity > 0.0);
        assert_eq!(vis.route(), MotionRoute::Local);
        assert_eq!(vis.frame().uniforms.motion_available, 1);
        assert!(vis.frame().motion_field.iter().any(|&v| v > 0));
    }

    #[test]
    fn test_trails_emits_and_leaving_clears() {
        let mut vis = visualizer();
        vis.connect_motion(Box::new(SyntheticCamera::new(160, 120).with_speed(0.3)));
        vis.set_motion_mode(MotionMode::Trails);
        for tick in 0..30 {
            vis.tick(tick as f64 * 16.0);
        }
        assert!(vis.particles(ParticleKind::Sparks).active_count() > 0);

        vis.set_motion_mode(MotionMode::Off);
        assert_eq!(vis.particles(ParticleKind::Sparks).active_count(), 0);
        assert!(vis.motion_frame().is_none());
    }

    #[test]
    fn test_disconnect_invalidates_buffers() {
        let mut vis = visualizer();
        vis.select_scene(Scene::Passthrough);
        vis.connect_motion(Box::new(SyntheticCamera::new(160, 120)));
        for tick in 0..5 {
            vis.tick(tick as f64 * 16.0);
        }
        vis.disconnect_motion(SourceKind::LocalCamera);
        assert!(vis.motion_frame().is_none());
        assert!(vis.motion_extractor().hd_frame().as_slice().iter().all(|px| *px == [0; 4]));
        assert_eq!(vis.motion_status(SourceKind::LocalCamera), &SourceStatus::Disconnected);

        let frame = vis.tick(100.0);
        assert_eq!(frame.uniforms.motion_available, 0);
        assert!(frame.hd_rgba.iter().all(|px| *px == [0; 4]));
    }

    #[test]
    fn test_scene_switch_clears_previous_particles() {
        let mut vis = visualizer();
        vis.select_scene(Scene::Confetti);
        for tick in 0..30 {
            vis.tick(tick as f64 * 16.0);
        }
        assert!(vis.particles(ParticleKind::Confetti).active_count() > 0);
        vis.select_scene(Scene::Plasma);
        assert_eq!(vis.particles(ParticleKind::Confetti).active_count(), 0);
    }

    #[test]
    fn test_setters_clamp() {
        let mut vis = visualizer();
        vis.set_particle_density(100.0);
        vis.set_particle_size(-3.0);
        assert_eq!(vis.config().particles.density, 5.0);
        assert_eq!(vis.config().particles.size, 0.25);

        let frame = vis.tick(0.0);
        assert_eq!(frame.uniforms.particle_density, 5.0);
    }

    #[test]
    fn test_pause_freezes_time_and_particles() {
        let mut vis = visualizer();
        vis.select_scene(Scene::Bubbles);
        for tick in 0..20 {
            vis.tick(tick as f64 * 16.0);
        }
        vis.set_paused(true);
        let time = vis.bridge().time();
        let count = vis.particles(ParticleKind::Bubbles).active_count();
        for tick in 20..40 {
            vis.tick(tick as f64 * 16.0);
        }
        assert_eq!(vis.bridge().time(), time);
        assert_eq!(vis.particles(ParticleKind::Bubbles).active_count(), count);
        assert_eq!(vis.frame().uniforms.paused, 1);
    }

    #[test]
    fn test_replacing_camera_restarts_differencing() {
        let mut vis = visualizer();
        vis.select_scene(Scene::Passthrough);
        vis.connect_motion(Box::new(FlatCamera(0)));
        for tick in 0..5 {
            vis.tick(tick as f64 * 16.0);
        }
        assert_eq!(vis.motion_frame().unwrap().intensity, 0.0);

        vis.connect_motion(Box::new(FlatCamera(255)));
        assert!(vis.motion_frame().is_none());
        assert!(!vis.motion_extractor().is_primed());

        vis.tick(100.0);
        // The new camera's first frame only primes the extractor
        assert_eq!(vis.route(), MotionRoute::Local);
        assert_eq!(vis.motion_frame().unwrap().intensity, 0.0);
        assert!(vis.motion_extractor().motion_field().as_slice().iter().all(|&h| h == 0.0));
        assert!(vis.frame().motion_field.iter().all(|&v| v == 0));
    }
}
