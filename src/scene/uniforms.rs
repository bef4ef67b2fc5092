use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::grid::{fixed_length, Grid};

/// Texels in the published 1D spectrum texture.
pub const SPECTRUM_TEXELS: usize = 64;
/// Size of the published motion and low-resolution color textures.
pub const FIELD_TEXTURE: (usize, usize) = (160, 120);
/// Size of the published passthrough texture.
pub const HD_TEXTURE: (usize, usize) = (1280, 720);

/// Scalar parameter block uploaded to the shader layer every tick.
///
/// Field names and ranges are the contract every scene is written
/// against. Booleans and enums travel as `u32`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable, Serialize)]
pub struct SceneUniforms {
    pub time: f32,
    pub resolution: [f32; 2],
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub energy: f32,
    /// 1.0 on a beat, decaying toward 0
    pub beat: f32,

    pub motion_intensity: f32,
    pub motion_center: [f32; 2],
    pub motion_velocity: [f32; 2],
    /// 0 Off, 1 Push, 2 Predator, 3 Trails
    pub motion_mode: u32,
    pub scene: u32,
    /// A motion source delivered analysable pixels this tick
    pub motion_available: u32,
    /// The routed motion source can only be displayed
    pub display_only: u32,

    pub paint_sensitivity: f32,
    pub paint_color_speed: f32,
    pub paint_fade_delay: f32,
    pub particle_density: f32,
    pub particle_size: f32,
    /// 0 Fire, 1 Rainbow, 2 Cycle
    pub color_mode: u32,
    pub paused: u32,
}

impl SceneUniforms {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Everything handed to the render layer for one tick, with every
/// texture-shaped array at its fixed published size.
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    pub uniforms: SceneUniforms,
    pub spectrum: Vec<f32>,
    /// Motion heat as bytes, `FIELD_TEXTURE` row-major
    pub motion_field: Vec<u8>,
    pub rgba: Vec<[u8; 4]>,
    pub hd_rgba: Vec<[u8; 4]>,
    /// Paint accumulator, `FIELD_TEXTURE` row-major
    pub paint: Vec<[f32; 4]>,
    /// JPEG bytes for passthrough when the source forbids pixel access.
    /// The render layer decodes and shows these itself.
    pub encoded_frame: Option<Vec<u8>>,
}

impl Default for PublishedFrame {
    fn default() -> Self {
        let (fw, fh) = FIELD_TEXTURE;
        let (hw, hh) = HD_TEXTURE;
        Self {
            uniforms: SceneUniforms::default(),
            spectrum: vec![0.0; SPECTRUM_TEXELS],
            motion_field: vec![0; fw * fh],
            rgba: vec![[0; 4]; fw * fh],
            hd_rgba: vec![[0; 4]; hw * hh],
            paint: vec![[0.0; 4]; fw * fh],
            encoded_frame: None,
        }
    }
}

impl PublishedFrame {
    pub fn publish_spectrum(&mut self, spectrum: &[f32]) {
        self.spectrum = fixed_length(spectrum, SPECTRUM_TEXELS);
    }

    pub fn publish_motion_field(&mut self, heat: Option<&Grid<f32>>) {
        let (w, h) = FIELD_TEXTURE;
        match heat {
            Some(heat) => fit_grid_into(heat, w, h, &mut self.motion_field, |v| v.clamp(0.0, 255.0) as u8),
            None => self.motion_field.iter_mut().for_each(|v| *v = 0),
        }
    }

    pub fn publish_rgba(&mut self, frame: Option<&Grid<[u8; 4]>>) {
        let (w, h) = FIELD_TEXTURE;
        publish_color(frame, w, h, &mut self.rgba);
    }

    pub fn publish_hd(&mut self, frame: Option<&Grid<[u8; 4]>>) {
        let (w, h) = HD_TEXTURE;
        publish_color(frame, w, h, &mut self.hd_rgba);
    }

    pub fn publish_encoded(&mut self, jpeg: Option<&[u8]>) {
        match jpeg {
            Some(jpeg) => {
                let buffer = self.encoded_frame.get_or_insert_with(Vec::new);
                buffer.clear();
                buffer.extend_from_slice(jpeg);
            }
            None => self.encoded_frame = None,
        }
    }

    pub fn publish_paint(&mut self, paint: Option<&Grid<[f32; 4]>>) {
        let (w, h) = FIELD_TEXTURE;
        match paint {
            Some(paint) => fit_grid_into(paint, w, h, &mut self.paint, |v| v),
            None => self.paint.iter_mut().for_each(|v| *v = [0.0; 4]),
        }
    }
}

fn publish_color(frame: Option<&Grid<[u8; 4]>>, width: usize, height: usize, out: &mut Vec<[u8; 4]>) {
    match frame {
        Some(frame) => fit_grid_into(frame, width, height, out, |v| v),
        None => out.iter_mut().for_each(|v| *v = [0; 4]),
    }
}

/// Copy `src` into a row-major `width x height` buffer, cropping rows and
/// columns that do not fit and zero-filling the rest. The buffer always
/// ends up exactly `width * height` long.
pub fn fit_grid_into<T, U>(src: &Grid<T>, width: usize, height: usize, out: &mut Vec<U>, convert: impl Fn(T) -> U)
where
    T: Copy,
    U: Copy + Default,
{
    out.clear();
    out.resize(width * height, U::default());
    let copy_w = src.width().min(width);
    for (y, row) in src.rows().take(height).enumerate() {
        let dst = &mut out[y * width..y * width + copy_w];
        for (cell, &value) in dst.iter_mut().zip(row) {
            *cell = convert(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_is_gpu_sized() {
        assert_eq!(std::mem::size_of::<SceneUniforms>() % 16, 0);
        let uniforms = SceneUniforms {
            bass: 0.5,
            ..Default::default()
        };
        assert_eq!(uniforms.as_bytes().len(), std::mem::size_of::<SceneUniforms>());
    }

    #[test]
    fn test_spectrum_truncates_and_pads() {
        let mut frame = PublishedFrame::default();
        frame.publish_spectrum(&[0.5; 32]);
        assert_eq!(frame.spectrum.len(), SPECTRUM_TEXELS);
        assert_eq!(frame.spectrum[31], 0.5);
        assert_eq!(frame.spectrum[32], 0.0);

        frame.publish_spectrum(&[0.25; 100]);
        assert_eq!(frame.spectrum.len(), SPECTRUM_TEXELS);
        assert!(frame.spectrum.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_fit_grid_keeps_addressing() {
        let src = Grid::from_vec(3, 2, vec![1u8, 2, 3, 4, 5, 6]).unwrap();
        let mut out = Vec::new();
        fit_grid_into(&src, 4, 3, &mut out, |v| v);
        assert_eq!(out, vec![1, 2, 3, 0, 4, 5, 6, 0, 0, 0, 0, 0]);

        fit_grid_into(&src, 2, 1, &mut out, |v| v);
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn test_missing_inputs_publish_zeros() {
        let mut frame = PublishedFrame::default();
        let heat: Grid<f32> = Grid::filled(160, 120, 300.0);
        frame.publish_motion_field(Some(&heat));
        assert!(frame.motion_field.iter().all(|&v| v == 255));

        frame.publish_motion_field(None);
        frame.publish_hd(None);
        assert_eq!(frame.motion_field.len(), 160 * 120);
        assert!(frame.motion_field.iter().all(|&v| v == 0));
        assert_eq!(frame.hd_rgba.len(), 1280 * 720);
    }
}
