//! Photo fetching for report embedding.
//!
//! Photos are resolved in a batch before composition starts; the composer
//! only ever sees decoded, embeddable bytes. Any fetch or decode failure is
//! logged and the student renders text-only. A broken photo never fails the
//! report.

use std::collections::HashMap;
use std::time::Duration;

use image::GenericImageView;

use super::Student;

/// Capability used to retrieve photo bytes. Production uses HTTP; tests
/// inject fakes.
pub trait PhotoSource {
    fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

pub struct HttpPhotoSource {
    client: reqwest::blocking::Client,
}

impl HttpPhotoSource {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(HttpPhotoSource { client })
    }
}

impl PhotoSource for HttpPhotoSource {
    fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let resp = self.client.get(url).send()?.error_for_status()?;
        Ok(resp.bytes()?.to_vec())
    }
}

/// A photo ready for embedding.
#[derive(Debug, Clone)]
pub enum Photo {
    /// Original JPEG bytes (RGB only); embedded without re-encoding.
    Jpeg {
        data: Vec<u8>,
        pixel_width: u32,
        pixel_height: u32,
    },
    /// Decoded raw RGB samples for everything else.
    Rgb {
        data: Vec<u8>,
        pixel_width: u32,
        pixel_height: u32,
    },
}

impl Photo {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Photo::Jpeg {
                pixel_width,
                pixel_height,
                ..
            }
            | Photo::Rgb {
                pixel_width,
                pixel_height,
                ..
            } => (*pixel_width, *pixel_height),
        }
    }
}

/// Batch-resolve photos for every student with a URL. Failures degrade to
/// absence; the returned map simply has no entry for that student.
pub fn resolve_photos(students: &[Student], source: &dyn PhotoSource) -> HashMap<String, Photo> {
    let mut photos = HashMap::new();
    for student in students {
        let Some(url) = student.photo_url.as_deref() else {
            continue;
        };
        let bytes = match source.fetch(url) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("photo fetch failed for student {} ({}): {}", student.id, url, e);
                continue;
            }
        };
        match decode_photo(&bytes) {
            Ok(photo) => {
                photos.insert(student.id.clone(), photo);
            }
            Err(e) => {
                log::warn!("unusable photo for student {} ({}): {}", student.id, url, e);
            }
        }
    }
    photos
}

fn decode_photo(bytes: &[u8]) -> anyhow::Result<Photo> {
    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;
    let (pixel_width, pixel_height) = img.dimensions();

    // Baseline RGB JPEGs can carry their compressed bytes straight into the
    // document; grayscale/CMYK variants go through the raw path instead.
    if format == image::ImageFormat::Jpeg && img.color() == image::ColorType::Rgb8 {
        return Ok(Photo::Jpeg {
            data: bytes.to_vec(),
            pixel_width,
            pixel_height,
        });
    }

    let rgb = img.to_rgb8();
    Ok(Photo::Rgb {
        data: rgb.into_raw(),
        pixel_width,
        pixel_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ClassLevel;

    struct FailingSource;

    impl PhotoSource for FailingSource {
        fn fetch(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("connection refused")
        }
    }

    struct PngSource;

    impl PhotoSource for PngSource {
        fn fetch(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
            let img = image::RgbImage::from_pixel(4, 6, image::Rgb([200, 120, 40]));
            let mut out = std::io::Cursor::new(Vec::new());
            image::DynamicImage::ImageRgb8(img).write_to(&mut out, image::ImageFormat::Png)?;
            Ok(out.into_inner())
        }
    }

    fn student(id: &str, photo_url: Option<&str>) -> Student {
        Student {
            id: id.to_string(),
            name: "Test Kid".to_string(),
            age: 4,
            class_level: ClassLevel::Lkg,
            learning_ability: None,
            writing_speed: None,
            photo_url: photo_url.map(|u| u.to_string()),
            teacher_id: "t1".to_string(),
        }
    }

    #[test]
    fn fetch_failure_degrades_to_absence() {
        let students = vec![
            student("s1", Some("http://photos.test/a.jpg")),
            student("s2", None),
        ];
        let photos = resolve_photos(&students, &FailingSource);
        assert!(photos.is_empty());
    }

    #[test]
    fn png_decodes_to_raw_rgb() {
        let students = vec![student("s1", Some("http://photos.test/a.png"))];
        let photos = resolve_photos(&students, &PngSource);
        let photo = photos.get("s1").expect("photo resolved");
        match photo {
            Photo::Rgb {
                data,
                pixel_width,
                pixel_height,
            } => {
                assert_eq!((*pixel_width, *pixel_height), (4, 6));
                assert_eq!(data.len(), 4 * 6 * 3);
            }
            Photo::Jpeg { .. } => panic!("png should not pass through as jpeg"),
        }
    }

    #[test]
    fn students_without_urls_are_skipped() {
        let students = vec![student("s1", None), student("s2", None)];
        let photos = resolve_photos(&students, &PngSource);
        assert!(photos.is_empty());
    }
}
