//! Stamp, signature and page images as PDF image XObjects.
//!
//! JPEG data is embedded as-is behind `DCTDecode`; PNG and rendered rasters
//! are decoded to 8-bit samples and stored Flate-compressed, with any alpha
//! channel split into a soft mask.

use std::io::{Cursor, Write};

use base64::Engine as _;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, ObjectId, Stream};

use crate::error::EngineError;
use crate::render::RasterImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

/// Identify an image by its magic bytes.
pub fn sniff(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
enum Samples {
    /// Untouched JPEG file.
    Jpeg { data: Vec<u8>, components: u8 },
    /// 8-bit gray or RGB samples with an optional 8-bit alpha plane.
    Raw {
        data: Vec<u8>,
        components: u8,
        alpha: Option<Vec<u8>>,
    },
}

/// An image ready to embed.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    samples: Samples,
}

impl DecodedImage {
    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        match sniff(bytes) {
            Some(ImageFormat::Png) => decode_png(bytes),
            Some(ImageFormat::Jpeg) => {
                let header = jpeg_header(bytes)
                    .ok_or_else(|| EngineError::Image("JPEG has no frame header".into()))?;
                Ok(Self {
                    width: header.width as u32,
                    height: header.height as u32,
                    samples: Samples::Jpeg {
                        data: bytes.to_vec(),
                        components: header.components,
                    },
                })
            }
            None => Err(EngineError::Image(
                "only PNG and JPEG images are supported".into(),
            )),
        }
    }

    /// Decode a `data:image/...;base64,` URL or bare base64 payload.
    pub fn decode_data_url(input: &str) -> Result<Self, EngineError> {
        let payload = match input.split_once(',') {
            Some((header, payload)) if header.starts_with("data:") => payload,
            _ => input,
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| EngineError::Image(format!("invalid base64 image: {}", e)))?;
        Self::decode(&bytes)
    }

    pub fn from_raster(raster: &RasterImage) -> Self {
        Self {
            width: raster.width,
            height: raster.height,
            samples: Samples::Raw {
                data: raster.rgb.clone(),
                components: 3,
                alpha: None,
            },
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Add the image (and its soft mask, if any) to `doc`.
    pub fn embed(&self, doc: &mut Document) -> Result<ObjectId, EngineError> {
        let stream = match &self.samples {
            Samples::Jpeg { data, components } => Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => self.width as i64,
                    "Height" => self.height as i64,
                    "ColorSpace" => color_space(*components),
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                data.clone(),
            ),
            Samples::Raw {
                data,
                components,
                alpha,
            } => {
                let mut dict = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => self.width as i64,
                    "Height" => self.height as i64,
                    "ColorSpace" => color_space(*components),
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                };
                if let Some(alpha) = alpha {
                    let mask = Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => self.width as i64,
                            "Height" => self.height as i64,
                            "ColorSpace" => "DeviceGray",
                            "BitsPerComponent" => 8,
                            "Filter" => "FlateDecode",
                        },
                        deflate(alpha)?,
                    );
                    dict.set("SMask", doc.add_object(mask));
                }
                Stream::new(dict, deflate(data)?)
            }
        };
        Ok(doc.add_object(stream))
    }
}

fn color_space(components: u8) -> &'static str {
    match components {
        1 => "DeviceGray",
        4 => "DeviceCMYK",
        _ => "DeviceRGB",
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| EngineError::Image(format!("compression failed: {}", e)))
}

fn decode_png(bytes: &[u8]) -> Result<DecodedImage, EngineError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| EngineError::Image(format!("invalid PNG: {}", e)))?;
    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buffer)
        .map_err(|e| EngineError::Image(format!("invalid PNG: {}", e)))?;
    buffer.truncate(info.buffer_size());

    let (components, has_alpha) = match info.color_type {
        png::ColorType::Grayscale => (1, false),
        png::ColorType::GrayscaleAlpha => (1, true),
        png::ColorType::Rgb => (3, false),
        png::ColorType::Rgba => (3, true),
        png::ColorType::Indexed => {
            return Err(EngineError::Image("palette PNG was not expanded".into()))
        }
    };

    let samples = if has_alpha {
        let stride = components as usize + 1;
        let mut color = Vec::with_capacity(buffer.len() / stride * components as usize);
        let mut alpha = Vec::with_capacity(buffer.len() / stride);
        for pixel in buffer.chunks_exact(stride) {
            color.extend_from_slice(&pixel[..components as usize]);
            alpha.push(pixel[components as usize]);
        }
        // Fully opaque masks are dead weight.
        let alpha = alpha.iter().any(|&a| a != 255).then_some(alpha);
        Samples::Raw {
            data: color,
            components,
            alpha,
        }
    } else {
        Samples::Raw {
            data: buffer,
            components,
            alpha: None,
        }
    };

    if info.width == 0 || info.height == 0 {
        return Err(EngineError::Image("PNG has zero size".into()));
    }
    Ok(DecodedImage {
        width: info.width,
        height: info.height,
        samples,
    })
}

struct JpegHeader {
    width: u16,
    height: u16,
    components: u8,
}

/// Walk JPEG marker segments to the first start-of-frame.
fn jpeg_header(bytes: &[u8]) -> Option<JpegHeader> {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = bytes[pos + 1];
        match marker {
            // Fill bytes and standalone markers carry no length.
            0xFF => {
                pos += 1;
                continue;
            }
            0x01 | 0xD0..=0xD9 => {
                pos += 2;
                continue;
            }
            _ => {}
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let segment = bytes.get(pos + 4..pos + 10)?;
            let header = JpegHeader {
                height: u16::from_be_bytes([segment[1], segment[2]]),
                width: u16::from_be_bytes([segment[3], segment[4]]),
                components: segment[5],
            };
            return (header.width > 0 && header.height > 0).then_some(header);
        }
        pos += 2 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{jpeg_bytes, png_bytes};

    #[test]
    fn test_sniff_formats() {
        assert_eq!(sniff(&png_bytes(1, 1)), Some(ImageFormat::Png));
        assert_eq!(sniff(&jpeg_bytes(1, 1)), Some(ImageFormat::Jpeg));
        assert_eq!(sniff(b"%PDF-1.7"), None);
    }

    #[test]
    fn test_png_dimensions() {
        let image = DecodedImage::decode(&png_bytes(40, 20)).unwrap();
        assert_eq!((image.width, image.height), (40, 20));
        assert!((image.aspect_ratio() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_jpeg_header_is_read_without_decoding() {
        let image = DecodedImage::decode(&jpeg_bytes(640, 480)).unwrap();
        assert_eq!((image.width, image.height), (640, 480));
    }

    #[test]
    fn test_data_url_is_accepted() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes(3, 3));
        let url = format!("data:image/png;base64,{}", encoded);
        let image = DecodedImage::decode_data_url(&url).unwrap();
        assert_eq!(image.width, 3);
        assert!(DecodedImage::decode_data_url(&encoded).is_ok());
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(matches!(
            DecodedImage::decode(b"GIF89a...."),
            Err(EngineError::Image(_))
        ));
    }

    #[test]
    fn test_embedded_jpeg_keeps_dct_filter() {
        let mut doc = Document::with_version("1.7");
        let bytes = jpeg_bytes(10, 10);
        let id = DecodedImage::decode(&bytes).unwrap().embed(&mut doc).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(matches!(
            stream.dict.get(b"Filter").unwrap(),
            lopdf::Object::Name(name) if name == b"DCTDecode"
        ));
        assert_eq!(stream.content, bytes);
    }
}
