use crate::geometry::{Rect, Viewport};

use super::snapshot::LiveSelection;

/// Where the anchor rect came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorSource {
    LiveSelection,
    Overlay,
    Corner,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub rect: Rect,
    pub source: AnchorSource,
}

/// Picks the rectangle the popup hangs from.
#[derive(Debug, Default, Clone, Copy)]
pub struct RectResolver;

impl RectResolver {
    pub fn new() -> Self {
        Self
    }

    /// Live selection first, then the saved highlight blocks. Both use the
    /// bottom-most rect so multi-line selections get the popup under their last line.
    pub fn resolve(&self, live: Option<&LiveSelection>, overlay_blocks: &[Rect]) -> Option<Anchor> {
        if let Some(rect) = live.and_then(live_rect) {
            return Some(Anchor {
                rect,
                source: AnchorSource::LiveSelection,
            });
        }

        bottom_most(overlay_blocks).map(|rect| Anchor {
            rect,
            source: AnchorSource::Overlay,
        })
    }

    /// Same as [`resolve`](Self::resolve) but only returns anchors that are on screen.
    pub fn resolve_visible(
        &self,
        live: Option<&LiveSelection>,
        overlay_blocks: &[Rect],
        viewport: &Viewport,
    ) -> Option<Anchor> {
        self.resolve(live, overlay_blocks)
            .filter(|anchor| anchor.rect.intersects(viewport))
    }

    pub fn corner(&self, viewport: &Viewport, margin: f64) -> Anchor {
        Anchor {
            rect: viewport.corner_rect(margin),
            source: AnchorSource::Corner,
        }
    }
}

fn live_rect(live: &LiveSelection) -> Option<Rect> {
    if live.collapsed {
        return None;
    }
    bottom_most(&live.rects).filter(|rect| !rect.is_empty())
}

fn bottom_most(rects: &[Rect]) -> Option<Rect> {
    rects
        .iter()
        .copied()
        .reduce(|best, rect| if rect.bottom > best.bottom { rect } else { best })
}
