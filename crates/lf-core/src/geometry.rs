//! Label geometry and YOLO-style normalization.
//!
//! Label positions are stored as JSON in pixel coordinates, either a
//! bounding box `{"x", "y", "width", "height"}` (top-left origin) or a
//! polygon `{"points": [[x, y], ...]}`.

use crate::dataset::ProjectType;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelPosition {
    BoundingBox {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    Polygon {
        points: Vec<[f64; 2]>,
    },
}

/// One line of a YOLO label file: class index followed by normalized values.
#[derive(Debug, Clone, PartialEq)]
pub struct YoloLine {
    pub class_index: usize,
    pub values: Vec<f64>,
}

impl fmt::Display for YoloLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class_index)?;
        for v in &self.values {
            write!(f, " {v:.6}")?;
        }
        Ok(())
    }
}

impl LabelPosition {
    pub fn parse(json: &str) -> CoreResult<Self> {
        let position: LabelPosition =
            serde_json::from_str(json).map_err(|e| CoreError::InvalidGeometry {
                message: format!("{e}: {json}"),
            })?;
        match &position {
            LabelPosition::BoundingBox { width, height, .. } if *width <= 0.0 || *height <= 0.0 => {
                Err(CoreError::InvalidGeometry {
                    message: format!("box has non-positive size {width}x{height}"),
                })
            }
            LabelPosition::Polygon { points } if points.len() < 3 => {
                Err(CoreError::InvalidGeometry {
                    message: format!("polygon needs at least 3 points, got {}", points.len()),
                })
            }
            _ => Ok(position),
        }
    }

    /// Axis-aligned bounds as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        match self {
            LabelPosition::BoundingBox {
                x,
                y,
                width,
                height,
            } => (*x, *y, x + width, y + height),
            LabelPosition::Polygon { points } => points.iter().fold(
                (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
                |(x0, y0, x1, y1), [px, py]| (x0.min(*px), y0.min(*py), x1.max(*px), y1.max(*py)),
            ),
        }
    }

    fn corners(&self) -> Vec<[f64; 2]> {
        match self {
            LabelPosition::Polygon { points } => points.clone(),
            LabelPosition::BoundingBox { .. } => {
                let (x0, y0, x1, y1) = self.bounds();
                vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]]
            }
        }
    }

    /// Normalize against the image size.
    ///
    /// Detection emits `cx cy w h`; segmentation emits the polygon outline.
    /// Classification projects carry no geometry and return `None`.
    pub fn to_yolo(
        &self,
        class_index: usize,
        image_width: i32,
        image_height: i32,
        project_type: ProjectType,
    ) -> CoreResult<Option<YoloLine>> {
        if image_width <= 0 || image_height <= 0 {
            return Err(CoreError::InvalidGeometry {
                message: format!("image has non-positive size {image_width}x{image_height}"),
            });
        }
        let (w, h) = (f64::from(image_width), f64::from(image_height));
        let clamp = |v: f64| v.clamp(0.0, 1.0);

        let values = match project_type {
            ProjectType::Classification => return Ok(None),
            ProjectType::Detection => {
                let (x0, y0, x1, y1) = self.bounds();
                let (x0, y0, x1, y1) = (clamp(x0 / w), clamp(y0 / h), clamp(x1 / w), clamp(y1 / h));
                vec![(x0 + x1) / 2.0, (y0 + y1) / 2.0, x1 - x0, y1 - y0]
            }
            ProjectType::Segmentation => self
                .corners()
                .iter()
                .flat_map(|[x, y]| [clamp(x / w), clamp(y / h)])
                .collect(),
        };
        Ok(Some(YoloLine {
            class_index,
            values,
        }))
    }
}

#[cfg(test)]
#[path = "geometry_test.rs"]
mod tests;
