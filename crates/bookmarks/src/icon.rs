//! Icons for bookmark entries.
//!
//! Icons form a closed set of variants: the generic bookmark glyph, a
//! favicon read from the mirror, and a composition of the glyph with a small
//! favicon overlaid on it. [`bookmark_icon`] decides which one to draw for a
//! given target size. Rasterization is left to the host.

use std::sync::Arc;

/// Prefix of the identity string of favicon icons.
pub const FAVICON_URL_SCHEME: &str = "chrome_favicon:";

/// Prefix of the identity string of composed icons.
pub const COMPOSED_URL_SCHEME: &str = "compose:";

/// Scale of the glyph drawn beneath a small favicon.
pub const GLYPH_WEIGHT: f64 = 1.0;

/// Scale of a small favicon relative to the tile it is overlaid on.
pub const OVERLAY_SCALE: f64 = 0.5;

/// Position of the overlay inside the tile, as fractions of the free space.
/// `(1.0, 1.0)` puts it in the bottom right corner.
pub const OVERLAY_ANCHOR: (f64, f64) = (1.0, 1.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Largest size with this aspect ratio that fits in `bounds`.
    pub fn scaled_to_fit(self, bounds: Size) -> Size {
        if self.is_empty() {
            return Size::default();
        }
        let scale = f64::min(
            f64::from(bounds.width) / f64::from(self.width),
            f64::from(bounds.height) / f64::from(self.height),
        );
        Size::new(
            (f64::from(self.width) * scale).round() as u32,
            (f64::from(self.height) * scale).round() as u32,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Rectangle of `size` placed inside `self` at `anchor` fractions of the free space.
    pub fn place(self, size: Size, anchor: (f64, f64)) -> Rect {
        let free_x = f64::from(self.width) - f64::from(size.width);
        let free_y = f64::from(self.height) - f64::from(size.height);
        Rect::new(
            self.x + (free_x * anchor.0).round() as i32,
            self.y + (free_y * anchor.1).round() as i32,
            size.width,
            size.height,
        )
    }
}

/// Favicon bitmap read from the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaviconImage {
    data: Arc<[u8]>,
    width: u32,
    page_url: String,
}

impl FaviconImage {
    pub fn new(data: impl Into<Arc<[u8]>>, width: u32, page_url: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            width,
            page_url: page_url.into(),
        }
    }

    /// Encoded image bytes as stored by the browser.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    /// Favicons are square.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.width)
    }

    pub fn is_null(&self) -> bool {
        self.data.is_empty() || self.width == 0
    }

    /// Size to render at: downscaled to the requested device size, never larger
    /// than the bitmap itself. Returned in device independent pixels.
    pub fn actual_size(&self, requested: Size, device_pixel_ratio: f64) -> Size {
        let device_pixel_ratio = if device_pixel_ratio > 0.0 { device_pixel_ratio } else { 1.0 };
        let device = Size::new(
            (f64::from(requested.width) * device_pixel_ratio).round() as u32,
            (f64::from(requested.height) * device_pixel_ratio).round() as u32,
        );
        let natural = self.size();
        let fitted = if device.width < natural.width || device.height < natural.height {
            natural.scaled_to_fit(device)
        } else {
            natural
        };
        Size::new(
            (f64::from(fitted.width) / device_pixel_ratio).round() as u32,
            (f64::from(fitted.height) / device_pixel_ratio).round() as u32,
        )
    }

    /// Where the bitmap lands when painted centred in `rect`.
    pub fn paint_rect(&self, rect: Rect, device_pixel_ratio: f64) -> Rect {
        rect.place(self.actual_size(rect.size(), device_pixel_ratio), (0.5, 0.5))
    }

    pub fn to_url(&self) -> String {
        format!("{FAVICON_URL_SCHEME}{}", self.page_url)
    }
}

/// Ordered icon sources of the generic bookmark glyph.
pub fn bookmark_glyph_sources() -> Vec<&'static str> {
    let mut sources = Vec::new();
    if cfg!(all(unix, not(target_os = "macos"))) {
        sources.extend(["xdg:www", "xdg:web-browser", "xdg:emblem-web"]);
    }
    sources.push("qrc:star");
    sources
}

#[derive(Debug, Clone, PartialEq)]
pub enum Icon {
    /// The generic bookmark glyph, resolved by the host from its sources.
    Glyph(Vec<&'static str>),
    /// A favicon drawn on its own.
    Favicon(FaviconImage),
    /// `overlay` drawn at `overlay_scale` over `base` drawn at `base_scale`.
    Composed {
        base: Box<Icon>,
        overlay: Box<Icon>,
        base_scale: f64,
        overlay_scale: f64,
        overlay_anchor: (f64, f64),
    },
}

impl Icon {
    pub fn glyph() -> Self {
        Icon::Glyph(bookmark_glyph_sources())
    }

    /// A small favicon badged onto the generic glyph.
    pub fn badged(favicon: FaviconImage) -> Self {
        Icon::Composed {
            base: Box::new(Icon::glyph()),
            overlay: Box::new(Icon::Favicon(favicon)),
            base_scale: GLYPH_WEIGHT,
            overlay_scale: OVERLAY_SCALE,
            overlay_anchor: OVERLAY_ANCHOR,
        }
    }

    /// Identity string, equal for equal icons.
    pub fn to_url(&self) -> String {
        match self {
            Icon::Glyph(sources) => sources.join(","),
            Icon::Favicon(favicon) => favicon.to_url(),
            Icon::Composed { overlay, .. } => format!("{COMPOSED_URL_SCHEME}{}", overlay.to_url()),
        }
    }

    /// Placement of each layer inside `rect`, bottom layer first.
    pub fn layers(&self, rect: Rect) -> Vec<(&Icon, Rect)> {
        match self {
            Icon::Composed {
                base,
                overlay,
                base_scale,
                overlay_scale,
                overlay_anchor,
            } => {
                let mut layers = base.layers(rect.place(scaled_square(rect, *base_scale), (0.5, 0.5)));
                layers.extend(overlay.layers(rect.place(scaled_square(rect, *overlay_scale), *overlay_anchor)));
                layers
            }
            icon => vec![(icon, rect)],
        }
    }
}

fn scaled_square(rect: Rect, scale: f64) -> Size {
    let side = (f64::from(rect.width.min(rect.height)) * scale).round() as u32;
    Size::new(side, side)
}

/// True if a favicon of `source` size looks acceptable drawn alone into `target`:
/// its largest side exceeds half of the target's smaller side.
pub fn renders_alone(source: Size, target: Size) -> bool {
    u64::from(source.width.max(source.height)) * 2 > u64::from(target.width.min(target.height))
}

/// Picks the icon for a bookmark drawn into a `target` sized tile.
pub fn bookmark_icon(favicon: Option<FaviconImage>, target: Size) -> Icon {
    match favicon {
        Some(favicon) if favicon.is_null() => Icon::glyph(),
        Some(favicon) if renders_alone(favicon.size(), target) => Icon::Favicon(favicon),
        Some(favicon) => Icon::badged(favicon),
        None => Icon::glyph(),
    }
}
