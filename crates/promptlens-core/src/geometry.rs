//! Geometry and visibility helpers
//!
//! All rectangles are in viewport (client) coordinates: origin at the top-left
//! of the visible viewport, y growing downwards, CSS pixels.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Grow the rectangle by `m` on every side
    pub fn expand(&self, m: f64) -> Rect {
        Rect::new(self.x - m, self.y - m, self.width + 2.0 * m, self.height + 2.0 * m)
    }

    /// True when the two rectangles share a region of positive area.
    /// Touching edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Visible viewport size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// The few computed-style values the classifier looks at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSnapshot {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    /// Effective background color behind the element
    #[serde(default)]
    pub background_color: Option<String>,
}

impl Default for StyleSnapshot {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            background_color: None,
        }
    }
}

/// Hidden by `display`, `visibility` or `opacity`
pub fn is_hidden(style: &StyleSnapshot) -> bool {
    style.display == "none"
        || style.visibility == "hidden"
        || style.visibility == "collapse"
        || style.opacity <= 0.0
}

pub fn has_rendered_area(rect: &Rect) -> bool {
    rect.width > 0.0 && rect.height > 0.0
}

/// An sRGB color with alpha in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

/// Parse the color syntaxes browsers return from `getComputedStyle`:
/// `rgb()`, `rgba()`, `#rgb`, `#rrggbb` and `transparent`.
pub fn parse_css_color(input: &str) -> Option<Rgba> {
    let s = input.trim().to_lowercase();
    if s == "transparent" {
        return Some(Rgba {
            r: 0,
            g: 0,
            b: 0,
            a: 0.0,
        });
    }

    if let Some(hex) = s.strip_prefix('#') {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        return Some(Rgba {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: 1.0,
        });
    }

    let inner = s
        .strip_prefix("rgba(")
        .or_else(|| s.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<&str> = inner
        .split([',', ' ', '/'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 3 {
        return None;
    }
    let channel = |p: &str| p.parse::<f64>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8);
    let a = match parts.get(3) {
        Some(p) => p.parse::<f64>().ok()?.clamp(0.0, 1.0),
        None => 1.0,
    };
    Some(Rgba {
        r: channel(parts[0])?,
        g: channel(parts[1])?,
        b: channel(parts[2])?,
        a,
    })
}

/// WCAG relative luminance in `0.0..=1.0`
pub fn relative_luminance(color: Rgba) -> f64 {
    fn linear(c: u8) -> f64 {
        let c = c as f64 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }
    0.2126 * linear(color.r) + 0.7152 * linear(color.g) + 0.0722 * linear(color.b)
}

/// Icon palette chosen against the background it sits on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconTheme {
    #[default]
    Light,
    Dark,
}

impl IconTheme {
    /// Dark icon on light backgrounds, light icon on dark ones.
    /// Unknown or transparent backgrounds assume a light page.
    pub fn for_background(color: Option<&str>) -> Self {
        match color.and_then(parse_css_color) {
            Some(c) if c.a > 0.0 && relative_luminance(c) < 0.4 => IconTheme::Light,
            _ => IconTheme::Dark,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_edges() {
        let r = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(r.right(), 110.0);
        assert_eq!(r.bottom(), 70.0);
        assert_eq!(r.center_y(), 45.0);
        assert_eq!(r.area(), 5000.0);
    }

    #[test]
    fn test_touching_rects_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.expand(0.5).intersects(&b));
    }

    #[test]
    fn test_is_hidden() {
        let mut style = StyleSnapshot::default();
        assert!(!is_hidden(&style));
        style.display = "none".into();
        assert!(is_hidden(&style));

        let style = StyleSnapshot {
            opacity: 0.0,
            ..Default::default()
        };
        assert!(is_hidden(&style));

        let style = StyleSnapshot {
            visibility: "hidden".into(),
            ..Default::default()
        };
        assert!(is_hidden(&style));
    }

    #[test]
    fn test_parse_css_color() {
        assert_eq!(
            parse_css_color("rgb(255, 255, 255)"),
            Some(Rgba {
                r: 255,
                g: 255,
                b: 255,
                a: 1.0
            })
        );
        assert_eq!(parse_css_color("rgba(0, 0, 0, 0)").map(|c| c.a), Some(0.0));
        assert_eq!(parse_css_color("#fff").map(|c| c.g), Some(255));
        assert_eq!(parse_css_color("#102030").map(|c| c.b), Some(0x30));
        assert_eq!(parse_css_color("rgb(12 34 56 / 0.5)").map(|c| c.a), Some(0.5));
        assert_eq!(parse_css_color("hsl(0, 0%, 0%)"), None);
        assert_eq!(parse_css_color("#12345"), None);
    }

    #[test]
    fn test_luminance_extremes() {
        let white = parse_css_color("#ffffff").unwrap();
        let black = parse_css_color("#000000").unwrap();
        assert!((relative_luminance(white) - 1.0).abs() < 1e-9);
        assert_eq!(relative_luminance(black), 0.0);
    }

    #[test]
    fn test_icon_theme() {
        assert_eq!(IconTheme::for_background(Some("rgb(32, 33, 35)")), IconTheme::Light);
        assert_eq!(IconTheme::for_background(Some("#ffffff")), IconTheme::Dark);
        assert_eq!(IconTheme::for_background(Some("rgba(0, 0, 0, 0)")), IconTheme::Dark);
        assert_eq!(IconTheme::for_background(None), IconTheme::Dark);
    }
}
