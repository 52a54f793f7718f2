//! Upload validation: size caps, extension allow-lists and image sniffing.
//!
//! Image checks go beyond the filename: the payload must carry a known image
//! signature and its pixel dimensions (read straight from the header) must
//! stay under the configured bound.

use crate::config::UploadConfig;

/// Checks size and extension against the combined image + document allow-list.
/// Returns accumulated error messages, empty when the file is acceptable.
#[must_use]
pub fn validate_file(config: &UploadConfig, filename: &str, size: u64) -> Vec<String> {
    let mut errors = Vec::new();

    if size > config.max_file_size {
        errors.push(format!(
            "File size must be less than {}MB",
            config.max_file_size / 1024 / 1024
        ));
    }

    let allowed: Vec<&str> = config
        .allowed_image_types
        .iter()
        .chain(&config.allowed_document_types)
        .map(String::as_str)
        .collect();

    match extension(filename) {
        Some(ext) if allowed.contains(&ext.as_str()) => {}
        _ => errors.push(format!(
            "File type not allowed. Allowed types: {}",
            allowed.join(", ")
        )),
    }

    errors
}

/// File checks plus image-specific ones: the payload must decode as a real
/// image and fit the configured dimension bound.
#[must_use]
pub fn validate_image(config: &UploadConfig, filename: &str, bytes: &[u8]) -> Vec<String> {
    let mut errors = validate_file(config, filename, bytes.len() as u64);
    if !errors.is_empty() {
        return errors;
    }

    let Some((width, height)) = image_dimensions(bytes) else {
        errors.push("File must be a valid image".to_string());
        return errors;
    };

    let max = config.max_image_dimension;
    if width > max || height > max {
        errors.push(format!("Image dimensions too large (max {max}x{max} pixels)"));
    }

    let image_exts: Vec<&str> = config.allowed_image_types.iter().map(String::as_str).collect();
    match extension(filename) {
        Some(ext) if image_exts.contains(&ext.as_str()) => {}
        _ => errors.push(format!(
            "Image type not allowed. Allowed types: {}",
            image_exts.join(", ")
        )),
    }

    errors
}

fn extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// Pixel dimensions read from the header of a PNG, JPEG, GIF or WebP payload.
/// `None` when the bytes carry no recognized image signature.
#[must_use]
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    png_dimensions(bytes)
        .or_else(|| gif_dimensions(bytes))
        .or_else(|| jpeg_dimensions(bytes))
        .or_else(|| webp_dimensions(bytes))
}

fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    if bytes.len() < 24 || bytes[..8] != SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }

    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}

fn gif_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 10 || (&bytes[..6] != b"GIF87a" && &bytes[..6] != b"GIF89a") {
        return None;
    }

    let width = u32::from(u16::from_le_bytes([bytes[6], bytes[7]]));
    let height = u32::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    Some((width, height))
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 4 || bytes[..2] != [0xFF, 0xD8] {
        return None;
    }

    let mut i = 2;
    while i < bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        while i < bytes.len() && bytes[i] == 0xFF {
            i += 1;
        }
        let marker = *bytes.get(i)?;
        i += 1;

        match marker {
            // Standalone markers without a length field
            0x01 | 0xD0..=0xD8 => {}
            // Start-of-frame markers carry the dimensions
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                if i + 7 > bytes.len() {
                    return None;
                }
                let height = u32::from(u16::from_be_bytes([bytes[i + 3], bytes[i + 4]]));
                let width = u32::from(u16::from_be_bytes([bytes[i + 5], bytes[i + 6]]));
                return Some((width, height));
            }
            _ => {
                if i + 2 > bytes.len() {
                    return None;
                }
                let len = usize::from(u16::from_be_bytes([bytes[i], bytes[i + 1]]));
                i += len;
            }
        }
    }

    None
}

fn webp_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 30 || &bytes[..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return None;
    }

    match &bytes[12..16] {
        b"VP8X" => {
            // 24-bit little-endian canvas size minus one
            let width = 1 + u32::from_le_bytes([bytes[24], bytes[25], bytes[26], 0]);
            let height = 1 + u32::from_le_bytes([bytes[27], bytes[28], bytes[29], 0]);
            Some((width, height))
        }
        b"VP8 " => {
            let width = u32::from(u16::from_le_bytes([bytes[26], bytes[27]]) & 0x3FFF);
            let height = u32::from(u16::from_le_bytes([bytes[28], bytes[29]]) & 0x3FFF);
            Some((width, height))
        }
        b"VP8L" => {
            if bytes[20] != 0x2F {
                return None;
            }
            let b = [bytes[21], bytes[22], bytes[23], bytes[24]];
            let packed = u32::from_le_bytes(b);
            let width = 1 + (packed & 0x3FFF);
            let height = 1 + ((packed >> 14) & 0x3FFF);
            Some((width, height))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes
    }

    #[test]
    fn png_header_dimensions() {
        assert_eq!(image_dimensions(&png_bytes(640, 480)), Some((640, 480)));
    }

    #[test]
    fn gif_header_dimensions() {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&100u16.to_le_bytes());
        bytes.extend_from_slice(&50u16.to_le_bytes());
        assert_eq!(image_dimensions(&bytes), Some((100, 50)));
    }

    #[test]
    fn jpeg_sof_dimensions() {
        // SOI, APP0 (empty), SOF0 with height 100 / width 200
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02];
        bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x64, 0x00, 0xC8]);
        assert_eq!(image_dimensions(&bytes), Some((200, 100)));
    }

    #[test]
    fn garbage_is_not_an_image() {
        assert_eq!(image_dimensions(b"plain text, nothing here"), None);
        assert_eq!(image_dimensions(&[]), None);
    }

    #[test]
    fn rejects_oversized_file() {
        let config = UploadConfig::default();
        let errors = validate_file(&config, "report.pdf", config.max_file_size + 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("File size must be less than 5MB"));
    }

    #[test]
    fn rejects_disallowed_extension() {
        let config = UploadConfig::default();
        let errors = validate_file(&config, "payload.exe", 100);
        assert!(errors[0].starts_with("File type not allowed"));
    }

    #[test]
    fn accepts_valid_image_upload() {
        let config = UploadConfig::default();
        let errors = validate_image(&config, "avatar.png", &png_bytes(256, 256));
        assert!(errors.is_empty());
    }

    #[test]
    fn rejects_image_claiming_document_extension() {
        let config = UploadConfig::default();
        let errors = validate_image(&config, "avatar.pdf", &png_bytes(256, 256));
        assert_eq!(
            errors,
            vec!["Image type not allowed. Allowed types: jpg, jpeg, png, gif, webp".to_string()]
        );
    }

    #[test]
    fn rejects_huge_pixel_dimensions() {
        let config = UploadConfig::default();
        let errors = validate_image(&config, "huge.png", &png_bytes(6000, 100));
        assert_eq!(
            errors,
            vec!["Image dimensions too large (max 5000x5000 pixels)".to_string()]
        );
    }

    #[test]
    fn rejects_non_image_payload_with_image_extension() {
        let config = UploadConfig::default();
        let errors = validate_image(&config, "fake.png", b"definitely not a png");
        assert_eq!(errors, vec!["File must be a valid image".to_string()]);
    }
}
