use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of `POST /detect`. Exactly one of the two lists is expected to be populated.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct DetectionRequest {
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub path_list: Option<Vec<PathBuf>>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("either `images` or `path_list` must be provided")]
    MissingInput,
    #[error("image {index}: malformed data URI, expected `data:<mime>;base64,<payload>`")]
    MalformedDataUri { index: usize },
    #[error("image {index}: invalid base64 payload: {error}")]
    Base64 {
        index: usize,
        error: base64::DecodeError,
    },
    #[error("image {index}: {error}")]
    Decode {
        index: usize,
        error: image::ImageError,
    },
    #[error("cannot open {}: {error}", path.display())]
    Open {
        path: PathBuf,
        error: image::ImageError,
    },
}

impl DetectionRequest {
    /// Decodes the request into images, in request order.
    ///
    /// A non-empty `path_list` wins over `images`. Any single failure fails the whole request.
    pub fn resolve(&self) -> Result<Vec<DynamicImage>, ResolveError> {
        match (&self.path_list, &self.images) {
            (Some(paths), _) if !paths.is_empty() => paths.iter().map(|x| open_path(x)).collect(),
            (_, Some(images)) if !images.is_empty() => images
                .iter()
                .enumerate()
                .map(|(index, uri)| decode_data_uri(index, uri))
                .collect(),
            _ => Err(ResolveError::MissingInput),
        }
    }
}

fn open_path(path: &std::path::Path) -> Result<DynamicImage, ResolveError> {
    image::open(path).map_err(|error| ResolveError::Open {
        path: path.to_path_buf(),
        error,
    })
}

/// Strips everything up to the first comma and decodes the rest as a base64 image.
///
/// ASCII whitespace anywhere in the payload is skipped, so MIME-wrapped base64 is accepted.
fn decode_data_uri(index: usize, uri: &str) -> Result<DynamicImage, ResolveError> {
    let Some((_, payload)) = uri.split_once(',') else {
        return Err(ResolveError::MalformedDataUri { index });
    };
    let payload: Vec<u8> = payload
        .bytes()
        .filter(|x| !x.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(payload)
        .map_err(|error| ResolveError::Base64 { index, error })?;
    image::load_from_memory(&bytes).map_err(|error| ResolveError::Decode { index, error })
}

#[cfg(test)]
pub mod tests {
    use std::io::Cursor;

    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
        let mut out = vec![];
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    pub fn data_uri(width: u32, height: u32) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(width, height)))
    }

    #[test]
    fn decodes_data_uris_in_order() {
        let request = DetectionRequest {
            images: Some(vec![data_uri(4, 3), data_uri(7, 2)]),
            path_list: None,
        };
        let images = request.resolve().unwrap();
        let dims: Vec<_> = images.iter().map(|x| (x.width(), x.height())).collect();
        assert_eq!(dims, vec![(4, 3), (7, 2)]);
    }

    #[test]
    fn missing_input_is_rejected() {
        for request in [
            DetectionRequest::default(),
            DetectionRequest {
                images: Some(vec![]),
                path_list: Some(vec![]),
            },
        ] {
            assert!(matches!(request.resolve(), Err(ResolveError::MissingInput)));
        }
    }

    #[test]
    fn data_uri_without_comma_is_rejected() {
        let request = DetectionRequest {
            images: Some(vec![STANDARD.encode(png_bytes(2, 2))]),
            path_list: None,
        };
        let err = request.resolve().unwrap_err();
        assert!(matches!(err, ResolveError::MalformedDataUri { index: 0 }));
    }

    #[test]
    fn bad_base64_reports_decode_error() {
        let request = DetectionRequest {
            images: Some(vec![data_uri(2, 2), "data:image/png;base64,@@@not base64".to_string()]),
            path_list: None,
        };
        let err = request.resolve().unwrap_err();
        assert!(matches!(err, ResolveError::Base64 { index: 1, .. }));
        assert!(err.to_string().starts_with("image 1: invalid base64 payload"));
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let encoded = STANDARD.encode(png_bytes(9, 4));
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|x| std::str::from_utf8(x).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert!(wrapped.contains('\n'));
        let request = DetectionRequest {
            images: Some(vec![format!("data:image/png;base64,\n{wrapped}\n")]),
            path_list: None,
        };
        let images = request.resolve().unwrap();
        assert_eq!((images[0].width(), images[0].height()), (9, 4));
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(b"plain text"));
        let request = DetectionRequest {
            images: Some(vec![uri]),
            path_list: None,
        };
        assert!(matches!(
            request.resolve(),
            Err(ResolveError::Decode { index: 0, .. })
        ));
    }

    #[test]
    fn path_list_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        std::fs::write(&path, png_bytes(5, 6)).unwrap();
        let request = DetectionRequest {
            images: Some(vec!["garbage".to_string()]),
            path_list: Some(vec![path]),
        };
        let images = request.resolve().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!((images[0].width(), images[0].height()), (5, 6));
    }

    #[test]
    fn missing_path_fails_whole_request() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        std::fs::write(&good, png_bytes(2, 2)).unwrap();
        let request = DetectionRequest {
            images: None,
            path_list: Some(vec![good, dir.path().join("missing.png")]),
        };
        let err = request.resolve().unwrap_err();
        assert!(matches!(err, ResolveError::Open { .. }));
        assert!(err.to_string().contains("missing.png"));
    }
}
