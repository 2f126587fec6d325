//! Collision-aware overlay placement
//!
//! Greedy placement against a single obstacle class: controls judged to sit
//! on the right side of the input's container (send buttons, attachment
//! pickers, character counters). The only guarantee is that the icon keeps
//! at least the clearance margin from every such control and stays inside
//! the viewport; there is no attempt at global optimality.

use crate::config::EngineConfig;
use crate::geometry::{Rect, Viewport};
use crate::page::Obstacle;
use serde::{Deserialize, Serialize};

/// Overlaps smaller than this are rounding noise
const EPSILON: f64 = 1e-6;

/// Geometry knobs of the placement algorithm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionParams {
    pub icon_size: f64,
    pub edge_padding: f64,
    pub margin: f64,
    pub right_edge_threshold: f64,
    pub alignment_threshold: f64,
}

impl Default for PositionParams {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for PositionParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            icon_size: config.icon_size,
            edge_padding: config.edge_padding,
            margin: config.clearance_margin,
            right_edge_threshold: config.right_edge_threshold,
            alignment_threshold: config.alignment_threshold,
        }
    }
}

/// Which rule produced a placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Right edge of the input, vertically centered
    Default,
    /// Left of the right-most colliding control
    ShiftedLeft,
    /// Left edge inside the input
    InsideLeft,
    /// Above the input, right-aligned
    Above,
    /// Below the input
    Below,
    /// A corner of the viewport
    ViewportCorner,
    /// Restored from a user pin
    Pinned,
}

/// Top-left corner of the icon in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub top: f64,
    pub left: f64,
    pub strategy: Strategy,
}

impl Placement {
    pub fn rect(&self, icon_size: f64) -> Rect {
        Rect::new(self.left, self.top, icon_size, icon_size)
    }
}

/// Obstacle's right edge projected onto the container width, in `[0, 1]`
pub fn alignment_score(obstacle: &Rect, container: &Rect) -> f64 {
    if container.width <= 0.0 {
        return 0.0;
    }
    ((obstacle.right() - container.left()) / container.width).clamp(0.0, 1.0)
}

pub fn is_right_aligned(obstacle: &Obstacle, container: &Rect, params: &PositionParams) -> bool {
    obstacle.style_right_aligned
        || (container.right() - obstacle.bounds.right()).abs() <= params.right_edge_threshold
        || alignment_score(&obstacle.bounds, container) > params.alignment_threshold
}

/// True when `icon` comes closer than `margin` to `obstacle`
pub fn violates_margin(icon: &Rect, obstacle: &Rect, margin: f64) -> bool {
    let zone = icon.expand(margin);
    let overlap_x = zone.right().min(obstacle.right()) - zone.left().max(obstacle.left());
    let overlap_y = zone.bottom().min(obstacle.bottom()) - zone.top().max(obstacle.top());
    overlap_x > EPSILON && overlap_y > EPSILON
}

/// Clamp a placement into the viewport minus the margin on every side.
///
/// A viewport too small to fit `2 * margin + icon_size` on an axis pins the
/// icon to the near edge (`margin`) on that axis.
pub fn clamp_to_viewport(top: f64, left: f64, viewport: &Viewport, params: &PositionParams) -> (f64, f64) {
    let max_left = viewport.width - params.margin - params.icon_size;
    let max_top = viewport.height - params.margin - params.icon_size;
    (
        top.min(max_top).max(params.margin),
        left.min(max_left).max(params.margin),
    )
}

/// Compute where the overlay icon goes.
///
/// `container` falls back to `input` when it has no area. Only obstacles
/// judged right-aligned within the container are avoided.
pub fn compute_position(
    input: &Rect,
    container: &Rect,
    obstacles: &[Obstacle],
    viewport: &Viewport,
    params: &PositionParams,
) -> Placement {
    let icon = params.icon_size;

    let finite = [input.x, input.y, input.width, input.height]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return corner_placement(&[], viewport, params);
    }

    let container = if container.is_empty() { input } else { container };
    let colliding: Vec<Rect> = obstacles
        .iter()
        .filter(|o| !o.bounds.is_empty() && is_right_aligned(o, container, params))
        .map(|o| o.bounds)
        .collect();

    let accept = |top: f64, left: f64, strategy: Strategy| -> Option<Placement> {
        let (top, left) = clamp_to_viewport(top, left, viewport, params);
        let rect = Rect::new(left, top, icon, icon);
        if colliding.iter().any(|o| violates_margin(&rect, o, params.margin)) {
            None
        } else {
            Some(Placement {
                top,
                left,
                strategy,
            })
        }
    };

    let center_top = input.center_y() - icon / 2.0;
    let right_left = input.right() - params.edge_padding - icon;

    // 1. Default placement
    if let Some(p) = accept(center_top, right_left, Strategy::Default) {
        return p;
    }

    // 2-3. Just left of the right-most control the default placement hits
    let (default_top, default_left) = clamp_to_viewport(center_top, right_left, viewport, params);
    let default_rect = Rect::new(default_left, default_top, icon, icon);
    let hit = colliding
        .iter()
        .filter(|o| violates_margin(&default_rect, o, params.margin))
        .max_by(|a, b| a.right().total_cmp(&b.right()));
    if let Some(obstacle) = hit {
        let left = obstacle.left() - params.margin - icon;
        if left >= input.left() {
            if let Some(p) = accept(center_top, left, Strategy::ShiftedLeft) {
                return p;
            }
        }
    }

    // 4a. Left-aligned inside the input
    if input.width >= icon + params.margin + params.edge_padding {
        if let Some(p) = accept(center_top, input.left() + params.edge_padding, Strategy::InsideLeft) {
            return p;
        }
    }

    // 4b. Above the input, right-aligned
    let above_top = input.top() - params.margin - icon;
    if above_top >= params.margin {
        if let Some(p) = accept(above_top, right_left, Strategy::Above) {
            return p;
        }
    }

    // 4c. Below the input, kept off the viewport's right edge
    let below_left = right_left.min(viewport.width - params.margin - icon);
    if let Some(p) = accept(input.bottom() + params.margin, below_left, Strategy::Below) {
        return p;
    }

    corner_placement(&colliding, viewport, params)
}

/// Terminal fallback: the first viewport corner clear of every control,
/// bottom-right first.
fn corner_placement(colliding: &[Rect], viewport: &Viewport, params: &PositionParams) -> Placement {
    let far_left = viewport.width - params.margin - params.icon_size;
    let far_top = viewport.height - params.margin - params.icon_size;
    let corners = [
        (far_top, far_left),
        (params.margin, far_left),
        (far_top, params.margin),
        (params.margin, params.margin),
    ];

    let (top, left) = corners
        .iter()
        .map(|&(top, left)| clamp_to_viewport(top, left, viewport, params))
        .find(|&(top, left)| {
            let rect = Rect::new(left, top, params.icon_size, params.icon_size);
            !colliding.iter().any(|o| violates_margin(&rect, o, params.margin))
        })
        .unwrap_or_else(|| clamp_to_viewport(far_top, far_left, viewport, params));

    Placement {
        top,
        left,
        strategy: Strategy::ViewportCorner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(1024.0, 768.0)
    }

    #[test]
    fn test_default_placement_without_obstacles() {
        let input = Rect::new(100.0, 400.0, 500.0, 60.0);
        let p = compute_position(&input, &input, &[], &viewport(), &PositionParams::default());
        assert_eq!(p.strategy, Strategy::Default);
        assert_eq!(p.left, 600.0 - 8.0 - 24.0);
        assert_eq!(p.top, 430.0 - 12.0);
    }

    #[test]
    fn test_shifts_left_of_send_button() {
        // Container 300 wide, send button ending at x=290
        let container = Rect::new(0.0, 100.0, 300.0, 60.0);
        let input = container;
        let button = Obstacle::new(Rect::new(260.0, 115.0, 30.0, 30.0));
        let params = PositionParams::default();

        let p = compute_position(&input, &container, &[button], &viewport(), &params);
        assert_eq!(p.strategy, Strategy::ShiftedLeft);
        assert!(p.left + params.icon_size + params.margin <= button.bounds.left());
        assert!(!violates_margin(&p.rect(params.icon_size), &button.bounds, params.margin));
    }

    #[test]
    fn test_inside_left_when_shift_hits_neighbour() {
        let container = Rect::new(0.0, 100.0, 400.0, 60.0);
        let controls = [
            Obstacle::right_aligned(Rect::new(330.0, 115.0, 30.0, 30.0)),
            Obstacle::right_aligned(Rect::new(365.0, 115.0, 30.0, 30.0)),
        ];
        let params = PositionParams::default();
        let p = compute_position(&container, &container, &controls, &viewport(), &params);
        assert_eq!(p.strategy, Strategy::InsideLeft);
        assert_eq!(p.left, 8.0);
    }

    #[test]
    fn test_left_aligned_controls_are_ignored() {
        let container = Rect::new(0.0, 100.0, 600.0, 60.0);
        // Emoji picker on the far left
        let picker = Obstacle::new(Rect::new(5.0, 115.0, 30.0, 30.0));
        let p = compute_position(&container, &container, &[picker], &viewport(), &PositionParams::default());
        assert_eq!(p.strategy, Strategy::Default);
    }

    #[test]
    fn test_above_when_toolbar_fills_input() {
        let container = Rect::new(200.0, 300.0, 140.0, 40.0);
        let toolbar = Obstacle::right_aligned(Rect::new(210.0, 305.0, 130.0, 30.0));
        let params = PositionParams::default();
        let p = compute_position(&container, &container, &[toolbar], &viewport(), &params);
        assert_eq!(p.strategy, Strategy::Above);
        assert_eq!(p.top, 300.0 - 8.0 - 24.0);
        assert!(!violates_margin(&p.rect(params.icon_size), &toolbar.bounds, params.margin));
    }

    #[test]
    fn test_below_when_no_room_above() {
        let container = Rect::new(200.0, 10.0, 100.0, 40.0);
        let toolbar = Obstacle::right_aligned(Rect::new(205.0, 12.0, 95.0, 36.0));
        let params = PositionParams::default();
        let p = compute_position(&container, &container, &[toolbar], &viewport(), &params);
        assert_eq!(p.strategy, Strategy::Below);
        assert_eq!(p.top, 50.0 + 8.0);
    }

    #[test]
    fn test_offscreen_input_is_clamped_into_viewport() {
        let input = Rect::new(2000.0, -500.0, 400.0, 60.0);
        let params = PositionParams::default();
        let vp = viewport();
        let p = compute_position(&input, &input, &[], &vp, &params);
        assert_eq!(p.left, vp.width - params.margin - params.icon_size);
        assert_eq!(p.top, params.margin);
    }

    #[test]
    fn test_zero_size_container_uses_input() {
        let input = Rect::new(100.0, 100.0, 300.0, 50.0);
        let empty = Rect::new(0.0, 0.0, 0.0, 0.0);
        let p = compute_position(&input, &empty, &[], &viewport(), &PositionParams::default());
        assert_eq!(p.strategy, Strategy::Default);
    }

    #[test]
    fn test_non_finite_geometry_goes_to_corner() {
        let input = Rect::new(f64::NAN, 0.0, 100.0, 100.0);
        let p = compute_position(&input, &input, &[], &viewport(), &PositionParams::default());
        assert_eq!(p.strategy, Strategy::ViewportCorner);
        assert_eq!(p.left, 1024.0 - 8.0 - 24.0);
        assert_eq!(p.top, 768.0 - 8.0 - 24.0);
    }

    #[test]
    fn test_tiny_viewport_pins_to_near_edge() {
        let params = PositionParams::default();
        // Narrower than 2 * margin + icon on both axes
        let vp = Viewport::new(30.0, 20.0);
        let input = Rect::new(0.0, 0.0, 30.0, 20.0);
        let p = compute_position(&input, &input, &[], &vp, &params);
        assert_eq!((p.top, p.left), (params.margin, params.margin));

        let (top, left) = clamp_to_viewport(500.0, 500.0, &Viewport::new(1000.0, 30.0), &params);
        assert_eq!(top, params.margin);
        assert_eq!(left, 1000.0 - params.margin - params.icon_size);
    }

    #[test]
    fn test_alignment_score() {
        let container = Rect::new(100.0, 0.0, 200.0, 50.0);
        assert_eq!(alignment_score(&Rect::new(250.0, 0.0, 50.0, 10.0), &container), 1.0);
        assert_eq!(alignment_score(&Rect::new(100.0, 0.0, 100.0, 10.0), &container), 0.5);
        assert_eq!(alignment_score(&Rect::new(0.0, 0.0, 10.0, 10.0), &container), 0.0);
        assert_eq!(alignment_score(&Rect::new(0.0, 0.0, 10.0, 10.0), &Rect::default()), 0.0);
    }

    #[test]
    fn test_right_aligned_classification() {
        let params = PositionParams::default();
        let container = Rect::new(0.0, 0.0, 1000.0, 100.0);
        // Near the right edge
        assert!(is_right_aligned(&Obstacle::new(Rect::new(950.0, 0.0, 40.0, 40.0)), &container, &params));
        // High alignment score
        assert!(is_right_aligned(&Obstacle::new(Rect::new(860.0, 0.0, 10.0, 10.0)), &container, &params));
        // Middle of the container
        assert!(!is_right_aligned(&Obstacle::new(Rect::new(400.0, 0.0, 40.0, 40.0)), &container, &params));
        // Explicit style wins
        assert!(is_right_aligned(&Obstacle::right_aligned(Rect::new(400.0, 0.0, 40.0, 40.0)), &container, &params));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::{any, prop, prop_assert, prop_assert_eq, proptest, Just};
    use proptest::strategy::Strategy as ValueStrategy;

    fn arb_layout() -> impl ValueStrategy<Value = (Rect, Vec<Obstacle>)> {
        (100.0f64..900.0, 100.0f64..500.0, 20.0f64..300.0, 10.0f64..200.0).prop_flat_map(
            |(x, y, w, h)| {
                let container = Rect::new(x, y, w, h);
                let obstacle = (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, any::<bool>())
                    .prop_map(move |(fx, fy, fw, fh, styled)| {
                        let ox = x + fx * w;
                        let oy = y + fy * h;
                        let bounds = Rect::new(ox, oy, (x + w - ox) * fw, (y + h - oy) * fh);
                        Obstacle {
                            bounds,
                            style_right_aligned: styled,
                        }
                    });
                (Just(container), prop::collection::vec(obstacle, 0..5))
            },
        )
    }

    proptest! {
        /// Property: the icon never comes within the margin of a colliding control
        #[test]
        fn margin_invariant((container, obstacles) in arb_layout()) {
            let params = PositionParams::default();
            let vp = Viewport::new(1280.0, 800.0);
            let p = compute_position(&container, &container, &obstacles, &vp, &params);
            let icon = p.rect(params.icon_size);
            for o in obstacles.iter().filter(|o| is_right_aligned(o, &container, &params)) {
                if o.bounds.is_empty() {
                    continue;
                }
                let near = icon.expand(params.margin - 0.01);
                prop_assert!(
                    !near.intersects(&o.bounds),
                    "placement {:?} too close to {:?}", p, o
                );
            }
        }

        /// Property: placements stay inside the viewport minus the margin
        #[test]
        fn viewport_containment(
            x in -2000.0f64..4000.0,
            y in -2000.0f64..4000.0,
            w in 0.0f64..2000.0,
            h in 0.0f64..1000.0,
            vw in 0.0f64..3000.0,
            vh in 0.0f64..2000.0,
        ) {
            let params = PositionParams::default();
            let vp = Viewport::new(vw, vh);
            let input = Rect::new(x, y, w, h);
            let p = compute_position(&input, &input, &[], &vp, &params);
            let fits = |extent: f64| extent >= 2.0 * params.margin + params.icon_size;
            prop_assert!(p.top >= params.margin);
            prop_assert!(p.left >= params.margin);
            if fits(vw) {
                prop_assert!(p.left + params.icon_size <= vw - params.margin + 1e-9);
            } else {
                prop_assert_eq!(p.left, params.margin);
            }
            if fits(vh) {
                prop_assert!(p.top + params.icon_size <= vh - params.margin + 1e-9);
            } else {
                prop_assert_eq!(p.top, params.margin);
            }
        }

        /// Property: placement is a pure function of its inputs
        #[test]
        fn deterministic((container, obstacles) in arb_layout()) {
            let params = PositionParams::default();
            let vp = Viewport::new(1280.0, 800.0);
            let a = compute_position(&container, &container, &obstacles, &vp, &params);
            let b = compute_position(&container, &container, &obstacles, &vp, &params);
            prop_assert_eq!(a, b);
        }
    }
}
