//! Provisioning-URI rendering as a PNG QR image.

use super::ImageRenderer;
use anyhow::{Context, Result};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, Luma};
use qrcode::{EcLevel, QrCode};

const QR_MIN_DIMENSIONS: u32 = 256;

#[derive(Clone, Copy, Debug, Default)]
pub struct QrImageRenderer;

impl ImageRenderer for QrImageRenderer {
    fn encode(&self, uri: &str) -> Result<Vec<u8>> {
        let code = QrCode::with_error_correction_level(uri.as_bytes(), EcLevel::H)
            .context("failed to build qr code")?;
        let rendered = code
            .render::<Luma<u8>>()
            .min_dimensions(QR_MIN_DIMENSIONS, QR_MIN_DIMENSIONS)
            .build();

        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(
                rendered.as_raw(),
                rendered.width(),
                rendered.height(),
                ExtendedColorType::L8,
            )
            .context("failed to encode qr png")?;

        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

    #[test]
    fn encodes_uri_as_png() -> Result<()> {
        let renderer = QrImageRenderer;
        let png = renderer.encode("otpauth://totp/enlasi:a%40x.com?secret=JBSWY3DP")?;
        assert!(png.len() > PNG_MAGIC.len());
        assert_eq!(&png[..PNG_MAGIC.len()], PNG_MAGIC);
        Ok(())
    }
}
