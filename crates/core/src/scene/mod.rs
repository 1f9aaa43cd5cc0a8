use serde::{Deserialize, Serialize};

pub const SILHOUETTE_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreetLamp {
    pub light: Point,
    pub glow_radius: f64,
    /// Lamp head sits on top of the pole, above the light centre.
    pub head: Point,
    pub head_radius: f64,
    pub pole_width: f64,
    pub pole_bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeskLamp {
    pub base: Point,
    pub bulb: Point,
    pub bulb_radius: f64,
    pub glow_radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boy {
    pub body: Point,
    pub head: Point,
    pub head_radius: f64,
    /// Writing arm rotation in radians.
    pub arm_angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Elder {
    pub body: Point,
    pub head: Point,
    pub head_radius: f64,
    pub cane: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Silhouette {
    pub x: f64,
    pub baseline: f64,
    pub size: f64,
}

/// Positions of every element of the night scene for one frame. Coordinates
/// are in backing pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneLayout {
    pub width: f64,
    pub height: f64,
    pub corner_radius: f64,
    pub ground: Rect,
    pub street_lamp: StreetLamp,
    pub desk: Rect,
    pub desk_lamp: DeskLamp,
    pub boy: Boy,
    pub elder: Elder,
    pub silhouettes: Vec<Silhouette>,
}

impl SceneLayout {
    pub fn compute(width: f64, height: f64, device_pixel_ratio: f64, elapsed: f64) -> Self {
        let (w, h, t) = (width, height, elapsed);

        let light = Point {
            x: w * 0.78,
            y: h * 0.25,
        };
        let street_lamp = StreetLamp {
            light,
            glow_radius: h * 0.45,
            head: Point {
                x: light.x,
                y: light.y - h * 0.18,
            },
            head_radius: w * 0.02,
            pole_width: (w * 0.004).max(2.0),
            pole_bottom: h * 0.9,
        };

        let desk = Rect {
            x: w * 0.18,
            y: h * 0.7,
            width: w * 0.42,
            height: h * 0.08,
        };

        let lamp_base = Point {
            x: desk.x + desk.width * 0.8,
            y: desk.y - h * 0.08,
        };
        let desk_lamp = DeskLamp {
            base: lamp_base,
            bulb: Point {
                x: lamp_base.x,
                y: lamp_base.y - h * 0.02,
            },
            bulb_radius: w * 0.015,
            glow_radius: h * 0.2,
        };

        let boy_body = Point {
            x: desk.x + desk.width * 0.25,
            y: desk.y - h * 0.14,
        };
        let bob = (t * 2.2).sin() * h * 0.004;
        let boy = Boy {
            body: boy_body,
            head: Point {
                x: boy_body.x,
                y: boy_body.y - h * 0.05 + bob,
            },
            head_radius: w * 0.03,
            arm_angle: -0.5 + (t * 3.0).sin() * 0.08,
        };

        let elder_body = Point {
            x: light.x - w * 0.08 + (t * 0.4).sin() * 2.0,
            y: h * 0.74,
        };
        let elder = Elder {
            body: elder_body,
            head: Point {
                x: elder_body.x,
                y: elder_body.y - h * 0.12 + (t * 0.6).sin() * 2.0,
            },
            head_radius: w * 0.025,
            cane: Rect {
                x: elder_body.x + w * 0.035,
                y: elder_body.y - h * 0.17,
                width: w * 0.006,
                height: h * 0.2,
            },
        };

        let silhouettes = (0..SILHOUETTE_COUNT)
            .map(|i| {
                let i = i as f64;
                Silhouette {
                    x: w * 0.1 + i * w * 0.1,
                    baseline: h * 0.78 + (t * 0.8 + i).sin() * 2.0,
                    size: w * 0.04,
                }
            })
            .collect();

        Self {
            width,
            height,
            corner_radius: 8.0 * device_pixel_ratio,
            ground: Rect {
                x: 0.0,
                y: h * 0.82,
                width: w,
                height: h * 0.18,
            },
            street_lamp,
            desk,
            desk_lamp,
            boy,
            elder,
            silhouettes,
        }
    }
}
