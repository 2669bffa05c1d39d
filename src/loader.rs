// loader.rs — background image decoding
//
// Decoding runs on a worker thread and the result is handed back to the UI
// thread over a channel, which picks it up at the start of the next frame.

use image::io::Reader as ImageReader;
use image::{GenericImageView, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread;

use crate::error::LoadError;

/// Extensions offered by the open dialog.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "webp", "png", "bmp"];

#[derive(Debug)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub file_name: String,
    pub pixels: RgbaImage,
}

pub type LoadResult = Result<LoadedImage, LoadError>;

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Decode `path` synchronously.
pub fn decode_image(path: &Path) -> LoadResult {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| LoadError::NoFileName(path.to_path_buf()))?;

    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let img = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })
        .map_err(|source| LoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let (w, h) = img.dimensions();
    log::info!("decoded {file_name}: {w}×{h}");

    Ok(LoadedImage {
        path: path.to_path_buf(),
        file_name,
        pixels: img.to_rgba8(),
    })
}

/// Decode `path` on a worker thread and send the outcome to `tx`.
pub fn spawn_load(path: PathBuf, tx: Sender<LoadResult>) {
    thread::spawn(move || {
        log::info!("loading image in background: {}", path.display());
        let result = decode_image(&path);
        if tx.send(result).is_err() {
            log::error!("image for {} decoded after the viewer closed", path.display());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hotspot_mapper_loader_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn supported_extensions() {
        assert!(is_supported(Path::new("a/room.JPG")));
        assert!(is_supported(Path::new("pano.webp")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("noext")));
    }

    #[test]
    fn decodes_png() {
        let dir = temp_dir();
        let path = dir.join("tiny.png");
        RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255])).save(&path).unwrap();

        let loaded = decode_image(&path).unwrap();
        assert_eq!(loaded.file_name, "tiny.png");
        assert_eq!(loaded.pixels.dimensions(), (4, 2));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_is_open_error() {
        let err = decode_image(Path::new("/definitely/not/here.jpg")).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn garbage_is_decode_error() {
        let dir = temp_dir();
        let path = dir.join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let err = decode_image(&path).unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn background_load_reports_over_channel() {
        let dir = temp_dir();
        let path = dir.join("bg.png");
        RgbaImage::new(3, 3).save(&path).unwrap();

        let (tx, rx) = channel();
        spawn_load(path, tx);
        let loaded = rx.recv().unwrap().unwrap();
        assert_eq!(loaded.pixels.dimensions(), (3, 3));

        std::fs::remove_dir_all(&dir).ok();
    }
}
