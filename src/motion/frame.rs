use crate::error::SourceError;
use crate::grid::Grid;

/// An RGBA video frame at source resolution.
pub type VideoFrame = Grid<[u8; 4]>;

/// Rec. 601 luma, rounded to a byte.
#[inline]
pub fn luminance(pixel: [u8; 4]) -> u8 {
    (0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32).round() as u8
}

/// Wrap a tightly packed RGBA byte buffer.
pub fn from_rgba_bytes(width: usize, height: usize, bytes: &[u8]) -> Option<VideoFrame> {
    if bytes.len() != width * height * 4 {
        return None;
    }
    let pixels = bytes
        .chunks_exact(4)
        .map(|px| [px[0], px[1], px[2], px[3]])
        .collect();
    Grid::from_vec(width, height, pixels)
}

/// Decode one JPEG image into a frame.
pub fn decode_jpeg(bytes: &[u8]) -> Result<VideoFrame, SourceError> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .map_err(|e| SourceError::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    from_rgba_bytes(width as usize, height as usize, image.as_raw())
        .ok_or_else(|| SourceError::Decode("pixel buffer size mismatch".to_string()))
}

/// Flat byte view of a frame for texture upload.
pub fn as_bytes(frame: &VideoFrame) -> &[u8] {
    bytemuck::cast_slice(frame.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance_weights() {
        assert_eq!(luminance([255, 255, 255, 255]), 255);
        assert_eq!(luminance([0, 0, 0, 255]), 0);
        assert_eq!(luminance([255, 0, 0, 255]), 76);
        assert_eq!(luminance([0, 255, 0, 255]), 150);
        assert_eq!(luminance([0, 0, 255, 255]), 29);
    }

    #[test]
    fn test_rgba_bytes_must_match_dimensions() {
        assert!(from_rgba_bytes(2, 2, &[0; 16]).is_some());
        assert!(from_rgba_bytes(2, 2, &[0; 15]).is_none());
        let frame = from_rgba_bytes(1, 1, &[1, 2, 3, 4]).unwrap();
        assert_eq!(as_bytes(&frame), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_jpeg(b"not a jpeg"), Err(SourceError::Decode(_))));
    }
}
