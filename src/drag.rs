// drag.rs — per-marker hover/drag state machine for one viewer
//
//   Idle ──enter──▶ Hovered ──down (selected)──▶ Dragging ──up / leave──▶ Idle
//     ◀──leave──────┘
//
// At most one marker is Dragging per controller. Camera controls must stay
// off while a drag is active.

use std::collections::HashMap;

use crate::geometry::Position;
use crate::projection::SurfaceResolver;
use crate::store::HotspotId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerState {
    #[default]
    Idle,
    Hovered,
    Dragging,
}

/// Which pointer-leave ends a drag besides leaving the whole surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeavePolicy {
    /// Leaving the dragged marker's own hit area ends the drag.
    Marker,
    /// Only leaving the container ends the drag; fast motion may outrun the
    /// marker's hit area.
    Container,
}

/// Notifications emitted by the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragEvent {
    Started { id: HotspotId },
    Moved { id: HotspotId, position: Position },
    /// The last resolved position is repeated as the final update.
    Ended { id: HotspotId, position: Option<Position> },
}

impl DragEvent {
    pub fn id(&self) -> HotspotId {
        match self {
            Self::Started { id } | Self::Moved { id, .. } | Self::Ended { id, .. } => *id,
        }
    }

    /// Position the store should take on, if any.
    pub fn position(&self) -> Option<Position> {
        match self {
            Self::Started { .. } => None,
            Self::Moved { position, .. } => Some(*position),
            Self::Ended { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveDrag {
    id: HotspotId,
    last: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct DragController {
    leave_policy: LeavePolicy,
    states: HashMap<HotspotId, MarkerState>,
    active: Option<ActiveDrag>,
}

impl DragController {
    pub fn new(leave_policy: LeavePolicy) -> Self {
        Self {
            leave_policy,
            states: HashMap::new(),
            active: None,
        }
    }

    pub fn state(&self, id: HotspotId) -> MarkerState {
        self.states.get(&id).copied().unwrap_or_default()
    }

    pub fn dragging(&self) -> Option<HotspotId> {
        self.active.map(|a| a.id)
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    /// Orbit/pan/zoom may consume pointer input only while nothing is dragged.
    pub fn camera_controls_enabled(&self) -> bool {
        self.active.is_none()
    }

    pub fn pointer_enter(&mut self, id: HotspotId) {
        let state = self.states.entry(id).or_default();
        if *state == MarkerState::Idle {
            *state = MarkerState::Hovered;
        }
    }

    pub fn pointer_leave(&mut self, id: HotspotId) -> Option<DragEvent> {
        match self.state(id) {
            MarkerState::Hovered => {
                self.states.remove(&id);
                None
            }
            MarkerState::Dragging if self.leave_policy == LeavePolicy::Marker => self.finish(),
            _ => None,
        }
    }

    /// Press on a marker. Only the selected marker can start a drag, and only
    /// when no other drag is in progress.
    pub fn pointer_down(&mut self, id: HotspotId, selected: Option<HotspotId>) -> Option<DragEvent> {
        if self.active.is_some() || selected != Some(id) {
            return None;
        }
        self.states.insert(id, MarkerState::Dragging);
        self.active = Some(ActiveDrag { id, last: None });
        log::debug!("drag started on {id}");
        Some(DragEvent::Started { id })
    }

    /// Pointer motion while a drag is active, resolved through `resolver`.
    pub fn pointer_move(&mut self, pointer: (f64, f64), resolver: &dyn SurfaceResolver) -> Option<DragEvent> {
        if self.active.is_none() {
            return None;
        }
        self.update(resolver.resolve(pointer))
    }

    /// Per-frame re-evaluation; does nothing unless a drag is active.
    pub fn frame_tick(&mut self, resolve: impl FnOnce() -> Option<Position>) -> Option<DragEvent> {
        if self.active.is_none() {
            return None;
        }
        self.update(resolve())
    }

    pub fn pointer_up(&mut self) -> Option<DragEvent> {
        self.finish()
    }

    /// The pointer left the interactive surface; always ends a drag.
    pub fn surface_leave(&mut self) -> Option<DragEvent> {
        self.states.retain(|_, s| *s == MarkerState::Dragging);
        self.finish()
    }

    /// Drop all state for a hotspot that no longer exists. A drag on it is
    /// cancelled without a final update.
    pub fn forget(&mut self, id: HotspotId) {
        self.states.remove(&id);
        if self.dragging() == Some(id) {
            log::debug!("drag on {id} cancelled: hotspot removed");
            self.active = None;
        }
    }

    /// Reset everything, e.g. when the viewer switches files.
    pub fn clear(&mut self) {
        self.states.clear();
        self.active = None;
    }

    fn update(&mut self, resolved: Option<Position>) -> Option<DragEvent> {
        let active = self.active.as_mut()?;
        let Some(position) = resolved.filter(|p| p.is_finite()) else {
            log::warn!("drag on {}: pointer ray degenerate, skipping tick", active.id);
            return None;
        };
        active.last = Some(position);
        Some(DragEvent::Moved { id: active.id, position })
    }

    fn finish(&mut self) -> Option<DragEvent> {
        let active = self.active.take()?;
        self.states.remove(&active.id);
        log::debug!("drag ended on {}", active.id);
        Some(DragEvent::Ended {
            id: active.id,
            position: active.last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct Fixed(Option<Position>);

    impl SurfaceResolver for Fixed {
        fn resolve(&self, _pointer: (f64, f64)) -> Option<Position> {
            self.0
        }
    }

    #[test]
    fn hover_enter_and_leave() {
        let mut c = DragController::new(LeavePolicy::Marker);
        let id = Uuid::new_v4();
        assert_eq!(c.state(id), MarkerState::Idle);
        c.pointer_enter(id);
        assert_eq!(c.state(id), MarkerState::Hovered);
        assert!(c.pointer_leave(id).is_none());
        assert_eq!(c.state(id), MarkerState::Idle);
    }

    #[test]
    fn unselected_marker_never_drags() {
        let mut c = DragController::new(LeavePolicy::Marker);
        let id = Uuid::new_v4();
        c.pointer_enter(id);
        assert!(c.pointer_down(id, None).is_none());
        assert!(c.pointer_down(id, Some(Uuid::new_v4())).is_none());
        assert_eq!(c.state(id), MarkerState::Hovered);
        assert!(c.camera_controls_enabled());
    }

    #[test]
    fn full_drag_cycle() {
        let mut c = DragController::new(LeavePolicy::Marker);
        let id = Uuid::new_v4();
        c.pointer_enter(id);
        assert_eq!(c.pointer_down(id, Some(id)), Some(DragEvent::Started { id }));
        assert_eq!(c.state(id), MarkerState::Dragging);
        assert!(!c.camera_controls_enabled());

        let p1 = Position::new(1.0, 0.0, -3.0);
        let p2 = Position::new(2.0, 0.5, -3.0);
        assert_eq!(c.pointer_move((0.0, 0.0), &Fixed(Some(p1))), Some(DragEvent::Moved { id, position: p1 }));
        assert_eq!(c.pointer_move((1.0, 0.0), &Fixed(Some(p2))), Some(DragEvent::Moved { id, position: p2 }));

        assert_eq!(c.pointer_up(), Some(DragEvent::Ended { id, position: Some(p2) }));
        assert_eq!(c.state(id), MarkerState::Idle);
        assert!(c.camera_controls_enabled());
    }

    #[test]
    fn only_one_drag_at_a_time() {
        let mut c = DragController::new(LeavePolicy::Container);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(c.pointer_down(a, Some(a)).is_some());
        assert!(c.pointer_down(b, Some(b)).is_none());
        assert_eq!(c.dragging(), Some(a));
        assert_eq!(c.state(b), MarkerState::Idle);
    }

    #[test]
    fn degenerate_ray_skips_tick() {
        let mut c = DragController::new(LeavePolicy::Marker);
        let id = Uuid::new_v4();
        c.pointer_down(id, Some(id));
        let p = Position::new(0.0, 0.0, -4.0);
        c.pointer_move((0.0, 0.0), &Fixed(Some(p)));
        assert!(c.pointer_move((0.0, 0.0), &Fixed(None)).is_none());
        assert!(c.frame_tick(|| Some(Position::new(f64::NAN, 0.0, 0.0))).is_none());
        assert_eq!(c.pointer_up(), Some(DragEvent::Ended { id, position: Some(p) }));
    }

    #[test]
    fn move_without_drag_is_ignored() {
        let mut c = DragController::new(LeavePolicy::Marker);
        assert!(c.pointer_move((3.0, 4.0), &Fixed(Some(Position::default()))).is_none());
        assert!(c.frame_tick(|| Some(Position::default())).is_none());
        assert!(c.pointer_up().is_none());
    }

    #[test]
    fn frame_tick_tracks_while_dragging() {
        let mut c = DragController::new(LeavePolicy::Marker);
        let id = Uuid::new_v4();
        c.pointer_down(id, Some(id));
        let p = Position::new(0.0, 4.0, 0.0);
        assert_eq!(c.frame_tick(|| Some(p)), Some(DragEvent::Moved { id, position: p }));
    }

    #[test]
    fn marker_leave_depends_on_policy() {
        let id = Uuid::new_v4();

        let mut marker = DragController::new(LeavePolicy::Marker);
        marker.pointer_down(id, Some(id));
        assert!(matches!(marker.pointer_leave(id), Some(DragEvent::Ended { .. })));

        let mut container = DragController::new(LeavePolicy::Container);
        container.pointer_down(id, Some(id));
        assert!(container.pointer_leave(id).is_none());
        assert_eq!(container.state(id), MarkerState::Dragging);
        assert!(matches!(container.surface_leave(), Some(DragEvent::Ended { .. })));
        assert!(!container.is_dragging());
    }

    #[test]
    fn surface_leave_clears_hover() {
        let mut c = DragController::new(LeavePolicy::Container);
        let id = Uuid::new_v4();
        c.pointer_enter(id);
        assert!(c.surface_leave().is_none());
        assert_eq!(c.state(id), MarkerState::Idle);
    }

    #[test]
    fn forgetting_dragged_marker_cancels_silently() {
        let mut c = DragController::new(LeavePolicy::Marker);
        let id = Uuid::new_v4();
        c.pointer_down(id, Some(id));
        c.forget(id);
        assert!(!c.is_dragging());
        assert!(c.pointer_up().is_none());
    }

    #[test]
    fn drag_without_motion_ends_with_no_position() {
        let mut c = DragController::new(LeavePolicy::Marker);
        let id = Uuid::new_v4();
        c.pointer_down(id, Some(id));
        let end = c.pointer_up().unwrap();
        assert_eq!(end.position(), None);
        assert_eq!(end.id(), id);
    }
}
