// resource.rs — owned image handles
//
// A handle is acquired when a file is added and released by `Drop` when the
// owning file record goes away, so every removal path releases it exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

/// Counts handles acquired from and released back to one owner.
#[derive(Debug, Clone, Default)]
pub struct HandleLedger {
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl HandleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle for a decoded image.
    pub fn acquire(&self, file_name: &str, pixels: RgbaImage) -> ImageHandle {
        let natural_size = pixels.dimensions();
        self.acquire_inner(file_name, natural_size, Some(Arc::new(pixels)))
    }

    /// Allocate a handle with no pixel data, e.g. for records built in tests
    /// or restored before their image finishes loading.
    pub fn acquire_empty(&self, file_name: &str, natural_size: (u32, u32)) -> ImageHandle {
        self.acquire_inner(file_name, natural_size, None)
    }

    fn acquire_inner(&self, file_name: &str, natural_size: (u32, u32), pixels: Option<Arc<RgbaImage>>) -> ImageHandle {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let url = format!("mem://{}/{}", Uuid::new_v4(), file_name);
        log::debug!("acquired image handle {url}");
        ImageHandle {
            url,
            natural_size,
            pixels,
            ledger: self.clone(),
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Handles acquired and not yet released.
    pub fn live(&self) -> usize {
        self.acquired() - self.released()
    }
}

/// Exclusive owner of one loaded image. Not `Clone`.
#[derive(Debug)]
pub struct ImageHandle {
    url: String,
    natural_size: (u32, u32),
    pixels: Option<Arc<RgbaImage>>,
    ledger: HandleLedger,
}

impl ImageHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn natural_size(&self) -> (u32, u32) {
        self.natural_size
    }

    /// Shared view of the decoded pixels for uploading to a texture.
    pub fn pixels(&self) -> Option<Arc<RgbaImage>> {
        self.pixels.clone()
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
        log::debug!("released image handle {}", self.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_releases_once() {
        let ledger = HandleLedger::new();
        let handle = ledger.acquire("room.jpg", RgbaImage::new(4, 2));
        assert_eq!(handle.natural_size(), (4, 2));
        assert_eq!(ledger.live(), 1);
        drop(handle);
        assert_eq!(ledger.acquired(), 1);
        assert_eq!(ledger.released(), 1);
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn urls_are_unique() {
        let ledger = HandleLedger::new();
        let a = ledger.acquire_empty("a.jpg", (1, 1));
        let b = ledger.acquire_empty("a.jpg", (1, 1));
        assert_ne!(a.url(), b.url());
        assert!(a.url().ends_with("/a.jpg"));
    }

    #[test]
    fn pixels_outlive_nothing_but_the_texture_upload() {
        let ledger = HandleLedger::new();
        let handle = ledger.acquire("p.png", RgbaImage::new(2, 2));
        let pixels = handle.pixels().unwrap();
        drop(handle);
        assert_eq!(ledger.live(), 0);
        assert_eq!(pixels.dimensions(), (2, 2));
    }
}
