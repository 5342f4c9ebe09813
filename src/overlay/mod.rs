//! Translucent highlight blocks that outlive the page's own selection.

use anyhow::Result;

use crate::geometry::Rect;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Rects smaller than this in either dimension are layout noise.
const MIN_BLOCK_PX: f64 = 0.5;

/// One highlight block, already snapped to device pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightBlock {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl HighlightBlock {
    fn from_rect(rect: &Rect, device_pixel_ratio: f64) -> Self {
        let dpr = if device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        let snap = |v: f64| (v * dpr).round() / dpr;
        let left = snap(rect.left);
        let top = snap(rect.top);
        Self {
            left,
            top,
            width: snap(rect.right) - left,
            height: snap(rect.bottom) - top,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }
}

/// Opaque handle for a mounted overlay container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayNodeId(pub u64);

/// DOM writes for the overlay. The container is fixed, full-viewport and has
/// pointer events disabled.
pub trait OverlaySurface {
    fn device_pixel_ratio(&self) -> f64;

    fn mount(&mut self, blocks: &[HighlightBlock]) -> Result<OverlayNodeId>;

    fn unmount(&mut self, node: OverlayNodeId) -> Result<()>;
}

struct MountedOverlay {
    node: OverlayNodeId,
    blocks: Vec<HighlightBlock>,
}

/// Owns the single overlay node for the page.
pub struct OverlayRenderer<S: OverlaySurface> {
    surface: S,
    mounted: Option<MountedOverlay>,
}

impl<S: OverlaySurface> OverlayRenderer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            mounted: None,
        }
    }

    /// Replaces any existing overlay with blocks for `range_rects`.
    /// Returns the number of blocks drawn.
    pub fn render_from_range(&mut self, range_rects: &[Rect]) -> Result<usize> {
        self.clear();

        let dpr = self.surface.device_pixel_ratio();
        let blocks: Vec<HighlightBlock> = range_rects
            .iter()
            .filter(|rect| rect.width >= MIN_BLOCK_PX && rect.height >= MIN_BLOCK_PX)
            .map(|rect| HighlightBlock::from_rect(rect, dpr))
            .collect();

        let node = self.surface.mount(&blocks)?;
        log_debug!("overlay mounted with {} blocks", blocks.len());
        let count = blocks.len();
        self.mounted = Some(MountedOverlay { node, blocks });
        Ok(count)
    }

    pub fn clear(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            if let Err(err) = self.surface.unmount(mounted.node) {
                log_warn!("failed to remove overlay node: {err:?}");
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Screen rects of the current highlight blocks, empty when nothing is drawn.
    pub fn block_rects(&self) -> Vec<Rect> {
        self.mounted
            .as_ref()
            .map(|m| m.blocks.iter().map(HighlightBlock::rect).collect())
            .unwrap_or_default()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}
