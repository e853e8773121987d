use image::RgbImage;

/// Convert RGB frame to YUV422 (YUYV) format
/// v4l2loopback typically expects YUYV format
pub fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
    let (width, height) = rgb_image.dimensions();
    let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

    for row in rgb_image.rows() {
        let row: Vec<_> = row.collect();
        for pair in row.chunks(2) {
            let p1 = pair[0];
            // Odd widths repeat the last pixel.
            let p2 = pair.get(1).copied().unwrap_or(p1);

            let (y1, u1, v1) = rgb_to_yuv(p1[0], p1[1], p1[2]);
            let (y2, u2, v2) = rgb_to_yuv(p2[0], p2[1], p2[2]);

            // Chroma is shared by the pair.
            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            yuyv.extend_from_slice(&[y1, u, y2, v]);
        }
    }

    yuyv
}

/// BT.601 full-range RGB to YUV.
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
    let u = (-0.169 * r - 0.331 * g + 0.5 * b + 128.0).round().clamp(0.0, 255.0) as u8;
    let v = (0.5 * r - 0.419 * g - 0.081 * b + 128.0).round().clamp(0.0, 255.0) as u8;

    (y, u, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn black_and_white_are_neutral() {
        assert_eq!(rgb_to_yuv(0, 0, 0), (0, 128, 128));
        assert_eq!(rgb_to_yuv(255, 255, 255), (255, 128, 128));
    }

    #[test]
    fn packs_two_bytes_per_pixel() {
        let image = RgbImage::from_pixel(4, 3, Rgb([255, 255, 255]));
        let packed = rgb_to_yuyv(&image);
        assert_eq!(packed.len(), 4 * 3 * 2);
        assert_eq!(&packed[..4], &[255, 128, 255, 128]);
    }

    #[test]
    fn odd_width_repeats_last_pixel() {
        let image = RgbImage::from_pixel(3, 1, Rgb([0, 0, 0]));
        assert_eq!(rgb_to_yuyv(&image), vec![0, 128, 0, 128, 0, 128, 0, 128]);
    }
}
