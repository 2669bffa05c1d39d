// store.rs — loaded files, their hotspots, and the active/selected pointers
//
// All mutations are synchronous. Operations addressed to ids that no longer
// exist are absorbed as no-ops, since list clicks can race with deletions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{CoordinateSpace, EquirectDims, Position};
use crate::resource::ImageHandle;

pub type FileId = Uuid;
pub type HotspotId = Uuid;

/// A named marker on an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub id: HotspotId,
    pub title: String,
    pub position: Position,
}

/// A loaded image and the hotspots placed on it.
#[derive(Debug)]
pub struct HotspotFile {
    pub id: FileId,
    pub file_name: String,
    image: ImageHandle,
    /// How every hotspot position in this file is to be read.
    pub space: CoordinateSpace,
    /// Canonical equirect size pixel projections refer to.
    pub equirect: EquirectDims,
    /// Explicit logical width/height for flat images; `None` uses the
    /// natural size.
    pub size_override: (Option<u32>, Option<u32>),
    pub hotspots: Vec<Hotspot>,
}

impl HotspotFile {
    pub fn image(&self) -> &ImageHandle {
        &self.image
    }

    /// Pixel size flat-image positions are expressed in.
    pub fn logical_size(&self) -> (f64, f64) {
        let (nw, nh) = self.image.natural_size();
        (
            f64::from(self.size_override.0.unwrap_or(nw)),
            f64::from(self.size_override.1.unwrap_or(nh)),
        )
    }

    pub fn hotspot(&self, id: HotspotId) -> Option<&Hotspot> {
        self.hotspots.iter().find(|h| h.id == id)
    }

    fn hotspot_mut(&mut self, id: HotspotId) -> Option<&mut Hotspot> {
        self.hotspots.iter_mut().find(|h| h.id == id)
    }

    /// Title and position a freshly added hotspot starts with.
    fn next_default(&self) -> (String, Position) {
        let n = self.hotspots.len() + 1;
        match self.space {
            CoordinateSpace::Sphere => (format!("Hotspot {n}"), Position::new(0.0, 0.0, -4.0)),
            CoordinateSpace::Pixel => (format!("Marker {n}"), Position::new(100.0, 100.0, 0.0)),
        }
    }
}

/// Ordered files plus the process-local active file and selection.
#[derive(Debug, Default)]
pub struct HotspotStore {
    files: Vec<HotspotFile>,
    active_file: Option<FileId>,
    selected: Option<HotspotId>,
}

impl HotspotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[HotspotFile] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> Option<&HotspotFile> {
        self.files.iter().find(|f| f.id == id)
    }

    fn file_mut(&mut self, id: FileId) -> Option<&mut HotspotFile> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    pub fn active_file_id(&self) -> Option<FileId> {
        self.active_file
    }

    pub fn active_file(&self) -> Option<&HotspotFile> {
        self.active_file.and_then(|id| self.file(id))
    }

    fn active_file_mut(&mut self) -> Option<&mut HotspotFile> {
        let id = self.active_file?;
        self.file_mut(id)
    }

    pub fn selected_id(&self) -> Option<HotspotId> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Hotspot> {
        let id = self.selected?;
        self.active_file()?.hotspot(id)
    }

    /// Hotspots of the active file, empty when no file is active.
    pub fn hotspots(&self) -> &[Hotspot] {
        self.active_file().map(|f| f.hotspots.as_slice()).unwrap_or(&[])
    }

    pub fn total_hotspots(&self) -> usize {
        self.files.iter().map(|f| f.hotspots.len()).sum()
    }

    // ---- files ------------------------------------------------------------

    /// Take ownership of a loaded image; the new file becomes active.
    pub fn add_file(&mut self, file_name: impl Into<String>, image: ImageHandle, space: CoordinateSpace, equirect: EquirectDims) -> FileId {
        let file = HotspotFile {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            image,
            space,
            equirect,
            size_override: (None, None),
            hotspots: Vec::new(),
        };
        let id = file.id;
        log::info!("added file {} ({:?})", file.file_name, space);
        self.files.push(file);
        self.active_file = Some(id);
        self.selected = None;
        id
    }

    pub fn select_file(&mut self, id: FileId) {
        if self.file(id).is_none() {
            log::warn!("select_file: unknown file {id}");
            return;
        }
        self.active_file = Some(id);
        self.selected = None;
    }

    /// Drop a file record, releasing its image handle.
    pub fn remove_file(&mut self, id: FileId) {
        let Some(index) = self.files.iter().position(|f| f.id == id) else {
            log::warn!("remove_file: unknown file {id}");
            return;
        };
        let file = self.files.remove(index);
        log::info!("removed file {}", file.file_name);
        if self.active_file == Some(id) {
            self.active_file = None;
            self.selected = None;
        }
    }

    /// Swap the image of an existing file; the previous handle is released.
    pub fn replace_image(&mut self, id: FileId, file_name: impl Into<String>, image: ImageHandle) {
        let Some(file) = self.file_mut(id) else {
            log::warn!("replace_image: unknown file {id}");
            return;
        };
        file.file_name = file_name.into();
        file.image = image;
    }

    pub fn set_size_override(&mut self, id: FileId, width: Option<u32>, height: Option<u32>) {
        if let Some(file) = self.file_mut(id) {
            file.size_override = (width.filter(|w| *w > 0), height.filter(|h| *h > 0));
        }
    }

    // ---- hotspots ---------------------------------------------------------

    /// Append a hotspot with a default title and position to `file` and
    /// select it when the file is active.
    pub fn add_hotspot(&mut self, file: FileId) -> Option<Hotspot> {
        let active = self.active_file == Some(file);
        let f = self.file_mut(file)?;
        let (title, position) = f.next_default();
        let hotspot = Hotspot {
            id: Uuid::new_v4(),
            title,
            position,
        };
        f.hotspots.push(hotspot.clone());
        if active {
            self.selected = Some(hotspot.id);
        }
        Some(hotspot)
    }

    /// Set a hotspot's title. Titles that are empty after trimming are ignored.
    pub fn rename(&mut self, id: HotspotId, title: &str) -> &[Hotspot] {
        let title = title.trim();
        if !title.is_empty() {
            match self.active_file_mut().and_then(|f| f.hotspot_mut(id)) {
                Some(h) => h.title = title.to_string(),
                None => log::warn!("rename: unknown hotspot {id}"),
            }
        }
        self.hotspots()
    }

    /// Set a hotspot's position. Unknown ids and non-finite positions are ignored.
    pub fn move_hotspot(&mut self, id: HotspotId, position: Position) -> &[Hotspot] {
        if position.is_finite() {
            match self.active_file_mut().and_then(|f| f.hotspot_mut(id)) {
                Some(h) => h.position = position,
                None => log::warn!("move: unknown hotspot {id}"),
            }
        }
        self.hotspots()
    }

    pub fn remove_hotspot(&mut self, id: HotspotId) -> &[Hotspot] {
        if let Some(file) = self.active_file_mut() {
            file.hotspots.retain(|h| h.id != id);
        }
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.hotspots()
    }

    /// Select a hotspot of the active file, or clear the selection with `None`.
    pub fn select(&mut self, id: Option<HotspotId>) -> &[Hotspot] {
        match id {
            None => self.selected = None,
            Some(id) => {
                if self.active_file().and_then(|f| f.hotspot(id)).is_some() {
                    self.selected = Some(id);
                } else {
                    log::warn!("select: unknown hotspot {id}");
                }
            }
        }
        self.hotspots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::HandleLedger;

    fn store_with_file(ledger: &HandleLedger, space: CoordinateSpace) -> (HotspotStore, FileId) {
        let mut store = HotspotStore::new();
        let id = store.add_file("room.jpg", ledger.acquire_empty("room.jpg", (6000, 3000)), space, EquirectDims::CANONICAL);
        (store, id)
    }

    #[test]
    fn add_file_activates_it() {
        let ledger = HandleLedger::new();
        let (store, id) = store_with_file(&ledger, CoordinateSpace::Sphere);
        assert_eq!(store.active_file_id(), Some(id));
        assert!(store.selected_id().is_none());
        assert_eq!(ledger.live(), 1);
    }

    #[test]
    fn add_hotspot_uses_space_defaults() {
        let ledger = HandleLedger::new();
        let (mut store, id) = store_with_file(&ledger, CoordinateSpace::Sphere);
        let a = store.add_hotspot(id).unwrap();
        let b = store.add_hotspot(id).unwrap();
        assert_eq!(a.title, "Hotspot 1");
        assert_eq!(b.title, "Hotspot 2");
        assert_eq!(a.position, Position::new(0.0, 0.0, -4.0));
        assert_ne!(a.id, b.id);
        assert_eq!(store.selected_id(), Some(b.id));

        let (mut flat, fid) = store_with_file(&ledger, CoordinateSpace::Pixel);
        let m = flat.add_hotspot(fid).unwrap();
        assert_eq!(m.title, "Marker 1");
        assert_eq!(m.position, Position::new(100.0, 100.0, 0.0));
    }

    #[test]
    fn add_hotspot_to_missing_file_is_none() {
        let mut store = HotspotStore::new();
        assert!(store.add_hotspot(Uuid::new_v4()).is_none());
    }

    #[test]
    fn operations_preserve_order() {
        let ledger = HandleLedger::new();
        let (mut store, id) = store_with_file(&ledger, CoordinateSpace::Sphere);
        let ids: Vec<_> = (0..4).map(|_| store.add_hotspot(id).unwrap().id).collect();

        store.rename(ids[1], "  Door A ");
        store.move_hotspot(ids[2], Position::new(1.0, 2.0, 3.0));
        let after = store.remove_hotspot(ids[0]);

        let titles: Vec<_> = after.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, ["Door A", "Hotspot 3", "Hotspot 4"]);
        assert_eq!(after[1].position, Position::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn blank_rename_is_ignored() {
        let ledger = HandleLedger::new();
        let (mut store, id) = store_with_file(&ledger, CoordinateSpace::Sphere);
        let h = store.add_hotspot(id).unwrap();
        store.rename(h.id, "   ");
        assert_eq!(store.hotspots()[0].title, "Hotspot 1");
    }

    #[test]
    fn stale_ids_are_no_ops() {
        let ledger = HandleLedger::new();
        let (mut store, id) = store_with_file(&ledger, CoordinateSpace::Sphere);
        let h = store.add_hotspot(id).unwrap();
        store.remove_hotspot(h.id);

        assert!(store.move_hotspot(h.id, Position::new(9.0, 9.0, 9.0)).is_empty());
        store.select(Some(h.id));
        assert!(store.selected_id().is_none());
        store.rename(h.id, "ghost");
        store.remove_hotspot(h.id);
        assert!(store.hotspots().is_empty());
    }

    #[test]
    fn non_finite_move_is_ignored() {
        let ledger = HandleLedger::new();
        let (mut store, id) = store_with_file(&ledger, CoordinateSpace::Sphere);
        let h = store.add_hotspot(id).unwrap();
        store.move_hotspot(h.id, Position::new(f64::NAN, 0.0, 0.0));
        assert_eq!(store.hotspots()[0].position, h.position);
    }

    #[test]
    fn deleting_selected_hotspot_clears_selection() {
        let ledger = HandleLedger::new();
        let (mut store, id) = store_with_file(&ledger, CoordinateSpace::Sphere);
        let a = store.add_hotspot(id).unwrap();
        let b = store.add_hotspot(id).unwrap();
        store.select(Some(a.id));
        store.remove_hotspot(b.id);
        assert_eq!(store.selected_id(), Some(a.id));
        store.remove_hotspot(a.id);
        assert!(store.selected_id().is_none());
    }

    #[test]
    fn deleting_active_file_clears_active_and_selection() {
        let ledger = HandleLedger::new();
        let (mut store, id) = store_with_file(&ledger, CoordinateSpace::Sphere);
        store.add_hotspot(id);
        assert!(store.selected_id().is_some());

        store.remove_file(id);
        assert!(store.active_file_id().is_none());
        assert!(store.selected_id().is_none());
        assert!(store.files().is_empty());
        assert_eq!(ledger.released(), 1);
    }

    #[test]
    fn deleting_inactive_file_keeps_active() {
        let ledger = HandleLedger::new();
        let (mut store, first) = store_with_file(&ledger, CoordinateSpace::Sphere);
        let second = store.add_file("b.jpg", ledger.acquire_empty("b.jpg", (10, 5)), CoordinateSpace::Sphere, EquirectDims::CANONICAL);
        let h = store.add_hotspot(second).unwrap();

        store.remove_file(first);
        assert_eq!(store.active_file_id(), Some(second));
        assert_eq!(store.selected_id(), Some(h.id));
        assert_eq!(ledger.live(), 1);
    }

    #[test]
    fn replacing_image_releases_previous_handle() {
        let ledger = HandleLedger::new();
        let (mut store, id) = store_with_file(&ledger, CoordinateSpace::Pixel);
        store.replace_image(id, "new.png", ledger.acquire_empty("new.png", (20, 10)));
        assert_eq!(ledger.acquired(), 2);
        assert_eq!(ledger.released(), 1);
        assert_eq!(store.file(id).unwrap().file_name, "new.png");
    }

    #[test]
    fn dropping_store_releases_every_handle() {
        let ledger = HandleLedger::new();
        {
            let (mut store, _) = store_with_file(&ledger, CoordinateSpace::Sphere);
            store.add_file("x.jpg", ledger.acquire_empty("x.jpg", (1, 1)), CoordinateSpace::Sphere, EquirectDims::CANONICAL);
            store.remove_file(Uuid::new_v4());
        }
        assert_eq!(ledger.acquired(), 2);
        assert_eq!(ledger.released(), 2);
    }

    #[test]
    fn selecting_file_clears_selection() {
        let ledger = HandleLedger::new();
        let (mut store, first) = store_with_file(&ledger, CoordinateSpace::Sphere);
        store.add_hotspot(first);
        let second = store.add_file("b.jpg", ledger.acquire_empty("b.jpg", (1, 1)), CoordinateSpace::Sphere, EquirectDims::CANONICAL);
        store.select_file(first);
        assert_eq!(store.active_file_id(), Some(first));
        assert!(store.selected_id().is_none());
        store.select_file(Uuid::new_v4());
        assert_eq!(store.active_file_id(), Some(first));
        assert_ne!(first, second);
    }

    #[test]
    fn logical_size_prefers_override() {
        let ledger = HandleLedger::new();
        let (mut store, id) = store_with_file(&ledger, CoordinateSpace::Pixel);
        assert_eq!(store.file(id).unwrap().logical_size(), (6000.0, 3000.0));
        store.set_size_override(id, Some(1200), None);
        assert_eq!(store.file(id).unwrap().logical_size(), (1200.0, 3000.0));
        store.set_size_override(id, Some(0), Some(0));
        assert_eq!(store.file(id).unwrap().logical_size(), (6000.0, 3000.0));
    }
}
