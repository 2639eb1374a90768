//! Plain-old-data types shared with the C ABI.

use serde::{Deserialize, Serialize};

/// A rectangle in integer compositor coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check whether a point lies inside this rectangle (right/bottom edges excluded).
    pub fn contains(&self, point: Pointf) -> bool {
        point.x >= f64::from(self.x)
            && point.y >= f64::from(self.y)
            && point.x < f64::from(self.x) + f64::from(self.width)
            && point.y < f64::from(self.y) + f64::from(self.height)
    }

    /// The point of this rectangle closest to `point`.
    pub fn clamp(&self, point: Pointf) -> Pointf {
        let max_x = f64::from(self.x) + f64::from(self.width.max(1)) - 1.0;
        let max_y = f64::from(self.y) + f64::from(self.height.max(1)) - 1.0;
        Pointf {
            x: point.x.clamp(f64::from(self.x), max_x),
            y: point.y.clamp(f64::from(self.y), max_y),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// The same rectangle moved by `(-x, -y)` of `origin`.
    pub fn relative_to(&self, origin: Geometry) -> Geometry {
        Geometry {
            x: self.x - origin.x,
            y: self.y - origin.y,
            ..*self
        }
    }
}

/// Integer width and height.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: i32,
    pub height: i32,
}

impl Dimensions {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// A point in floating-point compositor coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pointf {
    pub x: f64,
    pub y: f64,
}

impl Pointf {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: Pointf) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// What the compositor should do with a keyboard event after the signal handlers ran.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEventProcessingMode {
    /// Process normally and forward to the focused client.
    #[default]
    Full,
    /// Process bindings but do not forward to the client.
    NoClient,
}

/// How a plugin activator was triggered.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivatorSource {
    Keybinding,
    Modifierbinding,
    Buttonbinding,
    Gesture,
    Hotspot,
    #[default]
    Plugin,
    PluginWithData,
}

/// Activator payload for [`OutputApi::output_call_plugin_plain`](crate::OutputApi::output_call_plugin_plain).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlainActivatorData {
    pub source: ActivatorSource,
    pub activation_data: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_excludes_far_edges() {
        let geo = Geometry::new(10, 10, 100, 50);
        assert!(geo.contains(Pointf::new(10.0, 10.0)));
        assert!(geo.contains(Pointf::new(109.5, 59.0)));
        assert!(!geo.contains(Pointf::new(110.0, 20.0)));
        assert!(!geo.contains(Pointf::new(50.0, 60.0)));
    }

    #[test]
    fn test_clamp_to_nearest_inside_point() {
        let geo = Geometry::new(0, 0, 1920, 1080);
        assert_eq!(geo.clamp(Pointf::new(-5.0, 500.0)), Pointf::new(0.0, 500.0));
        assert_eq!(
            geo.clamp(Pointf::new(3000.0, 2000.0)),
            Pointf::new(1919.0, 1079.0)
        );
    }

    #[test]
    fn test_relative_to() {
        let geo = Geometry::new(2000, 100, 300, 200);
        let origin = Geometry::new(1920, 0, 1280, 1024);
        assert_eq!(geo.relative_to(origin), Geometry::new(80, 100, 300, 200));
    }
}
