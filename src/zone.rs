//! Zone definitions and precomputed zone geometry.
//!
//! A zone is one parking space: a polygon in frame pixel coordinates. Before a
//! detection session starts, every polygon is turned into a `ZoneGeometry`
//! holding its bounding box and a boolean mask of the same size, so per-frame
//! classification only has to crop and look up.
//!
//! Zone files are loaded once per session, either as a JSON array of records
//! or as TOML with a `[[zones]]` array:
//!
//! ```toml
//! [[zones]]
//! id = 0
//! coordinates = [[10, 10], [60, 10], [60, 90], [10, 90]]
//! ```

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::OccupancyError;

const MASK_FILL: u8 = 255;

/// Largest zone bounding box, in pixels (one 8K UHD frame).
pub const MAX_ZONE_AREA: u64 = 7680 * 4320;

/// Zone identifier, unique within a lot. Zone files may use integers or strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneId {
    Index(u64),
    Name(String),
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneId::Index(index) => write!(f, "{index}"),
            ZoneId::Name(name) => f.write_str(name),
        }
    }
}

/// One record of a zone file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub id: ZoneId,
    /// Polygon vertices as `[x, y]` pixel coordinates, in drawing order.
    pub coordinates: Vec<[i32; 2]>,
}

#[derive(Debug, Deserialize)]
struct ZoneFile {
    zones: Vec<ZoneDefinition>,
}

/// Axis-aligned rectangle in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Minimal integer rectangle enclosing every point (inclusive of both ends).
    ///
    /// `None` for no points or an extent that does not fit in `u32`.
    pub fn enclosing(points: &[[i32; 2]]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y) = (first[0], first[1]);
        let (mut max_x, mut max_y) = (first[0], first[1]);
        for [x, y] in points.iter().copied() {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        let extent = |min: i32, max: i32| u32::try_from(i64::from(max) - i64::from(min) + 1).ok();
        Some(Self {
            x: min_x,
            y: min_y,
            width: extent(min_x, max_x)?,
            height: extent(min_y, max_y)?,
        })
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// True when the rectangle lies entirely inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Boolean raster the size of a zone's bounding box; true inside the polygon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl ZoneMask {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.bits[(y * self.width + x) as usize]
    }

    /// Number of pixels inside the polygon.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|inside| **inside).count()
    }
}

/// Immutable per-zone geometry, computed once per session.
#[derive(Clone, Debug)]
pub struct ZoneGeometry {
    pub id: ZoneId,
    pub polygon: Vec<[i32; 2]>,
    pub bounds: BoundingBox,
    pub mask: ZoneMask,
}

impl ZoneGeometry {
    /// Compute the bounding box and rasterize the polygon into a filled mask.
    ///
    /// Interior and boundary pixels are set; edges are drawn 8-connected.
    pub fn build(definition: &ZoneDefinition) -> Result<Self, OccupancyError> {
        let polygon = open_polygon(&definition.coordinates);
        let distinct = polygon.iter().collect::<HashSet<_>>().len();
        if distinct < 3 {
            return Err(OccupancyError::configuration(format!(
                "zone {} needs at least 3 distinct points, got {}",
                definition.id, distinct
            )));
        }
        if polygon.iter().any(|[x, y]| *x < 0 || *y < 0) {
            return Err(OccupancyError::configuration(format!(
                "zone {} has negative coordinates",
                definition.id
            )));
        }
        let bounds = BoundingBox::enclosing(&polygon)
            .filter(|bounds| bounds.area() <= MAX_ZONE_AREA)
            .ok_or_else(|| {
                OccupancyError::configuration(format!(
                    "zone {} bounding box exceeds {} pixels",
                    definition.id, MAX_ZONE_AREA
                ))
            })?;

        let mut canvas = GrayImage::new(bounds.width, bounds.height);
        let local: Vec<Point<i32>> = polygon
            .iter()
            .map(|[x, y]| Point::new(x - bounds.x, y - bounds.y))
            .collect();
        draw_polygon_mut(&mut canvas, &local, Luma([MASK_FILL]));

        let bits = canvas.pixels().map(|p| p.0[0] == MASK_FILL).collect();
        Ok(Self {
            id: definition.id.clone(),
            polygon,
            bounds,
            mask: ZoneMask {
                width: bounds.width,
                height: bounds.height,
                bits,
            },
        })
    }
}

/// Build geometry for every zone of a lot, rejecting duplicate ids.
pub fn build_geometries(
    definitions: &[ZoneDefinition],
) -> Result<Vec<ZoneGeometry>, OccupancyError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(definitions.len());
    for definition in definitions {
        if !seen.insert(definition.id.clone()) {
            return Err(OccupancyError::configuration(format!(
                "duplicate zone id {}",
                definition.id
            )));
        }
        out.push(ZoneGeometry::build(definition)?);
    }
    Ok(out)
}

/// Load zone definitions from a `.json` or `.toml` zone file.
pub fn load_zone_file(path: &Path) -> Result<Vec<ZoneDefinition>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read zone file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let zones = if is_toml {
        toml::from_str::<ZoneFile>(&raw)
            .map_err(|e| anyhow!("invalid zone file {}: {}", path.display(), e))?
            .zones
    } else {
        serde_json::from_str::<Vec<ZoneDefinition>>(&raw)
            .map_err(|e| anyhow!("invalid zone file {}: {}", path.display(), e))?
    };
    if zones.is_empty() {
        return Err(anyhow!("zone file {} defines no zones", path.display()));
    }
    Ok(zones)
}

/// Drop consecutive repeats and a closing vertex equal to the first one.
fn open_polygon(points: &[[i32; 2]]) -> Vec<[i32; 2]> {
    let mut out: Vec<[i32; 2]> = Vec::with_capacity(points.len());
    for point in points {
        if out.last() != Some(point) {
            out.push(*point);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zone(id: u64, coordinates: &[[i32; 2]]) -> ZoneDefinition {
        ZoneDefinition {
            id: ZoneId::Index(id),
            coordinates: coordinates.to_vec(),
        }
    }

    #[test]
    fn rectangle_mask_is_fully_set() {
        let geometry = ZoneGeometry::build(&zone(0, &[[10, 20], [19, 20], [19, 29], [10, 29]]))
            .expect("geometry");
        assert_eq!(
            geometry.bounds,
            BoundingBox {
                x: 10,
                y: 20,
                width: 10,
                height: 10
            }
        );
        assert_eq!(geometry.mask.width(), 10);
        assert_eq!(geometry.mask.height(), 10);
        assert_eq!(geometry.mask.count(), 100);
    }

    #[test]
    fn triangle_mask_excludes_far_corner() {
        let geometry =
            ZoneGeometry::build(&zone(1, &[[0, 0], [20, 0], [0, 20]])).expect("geometry");
        assert_eq!(geometry.mask.width(), geometry.bounds.width);
        assert_eq!(geometry.mask.height(), geometry.bounds.height);
        assert!(geometry.mask.get(0, 0));
        assert!(geometry.mask.get(2, 2));
        assert!(!geometry.mask.get(20, 20));
        assert!(!geometry.mask.get(15, 15));
        // Boundary pixels belong to the zone.
        assert!(geometry.mask.get(20, 0));
        assert!(geometry.mask.get(0, 20));
        assert!(geometry.mask.count() < (21 * 21));
    }

    #[test]
    fn mask_lookup_outside_raster_is_false() {
        let geometry =
            ZoneGeometry::build(&zone(2, &[[0, 0], [4, 0], [4, 4], [0, 4]])).expect("geometry");
        assert!(!geometry.mask.get(5, 0));
        assert!(!geometry.mask.get(0, 5));
    }

    #[test]
    fn closing_vertex_is_ignored() {
        let geometry = ZoneGeometry::build(&zone(3, &[[0, 0], [9, 0], [9, 9], [0, 9], [0, 0]]))
            .expect("geometry");
        assert_eq!(geometry.polygon.len(), 4);
        assert_eq!(geometry.mask.count(), 100);
    }

    #[test]
    fn degenerate_polygon_is_configuration_error() {
        let err = ZoneGeometry::build(&zone(4, &[[0, 0], [5, 5]])).unwrap_err();
        assert!(matches!(err, OccupancyError::Configuration(_)));

        let err = ZoneGeometry::build(&zone(5, &[[1, 1], [1, 1], [3, 3], [1, 1]])).unwrap_err();
        assert!(matches!(err, OccupancyError::Configuration(_)));
    }

    #[test]
    fn repeated_vertices_do_not_count_as_distinct() {
        let err = ZoneGeometry::build(&zone(6, &[[0, 0], [5, 0], [0, 0], [5, 0]])).unwrap_err();
        assert!(matches!(err, OccupancyError::Configuration(_)));
    }

    #[test]
    fn oversized_or_negative_zones_are_configuration_errors() {
        for coordinates in [
            vec![[-10, 0], [i32::MAX, 0], [0, 5]],
            vec![[0, 0], [i32::MAX, 0], [0, i32::MAX]],
            vec![[0, 0], [50_000, 0], [0, 50_000]],
            vec![[-5, -5], [10, 0], [0, 10]],
        ] {
            let err = ZoneGeometry::build(&zone(7, &coordinates)).unwrap_err();
            assert!(
                matches!(err, OccupancyError::Configuration(_)),
                "{coordinates:?}: {err:?}"
            );
        }
    }

    #[test]
    fn extreme_extent_does_not_overflow() {
        assert_eq!(BoundingBox::enclosing(&[[i32::MIN, 0], [i32::MAX, 0]]), None);
        let wide = BoundingBox::enclosing(&[[0, 0], [i32::MAX, 0]]).expect("fits in u32");
        assert_eq!(wide.width, i32::MAX as u32 + 1);
        assert_eq!(wide.area(), u64::from(i32::MAX as u32 + 1));
    }

    #[test]
    fn duplicate_zone_ids_are_rejected() {
        let square = [[0, 0], [4, 0], [4, 4], [0, 4]];
        let err = build_geometries(&[zone(7, &square), zone(7, &square)]).unwrap_err();
        assert!(matches!(err, OccupancyError::Configuration(_)));
    }

    #[test]
    fn bounding_box_fit_checks_frame_edges() {
        let bounds = BoundingBox {
            x: 630,
            y: 0,
            width: 10,
            height: 10,
        };
        assert!(bounds.fits_within(640, 480));
        assert!(!bounds.fits_within(639, 480));
        let negative = BoundingBox { x: -1, ..bounds };
        assert!(!negative.fits_within(640, 480));
    }

    #[test]
    fn loads_json_and_toml_zone_files() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let json_path = dir.path().join("zones.json");
        std::fs::write(
            &json_path,
            r#"[{"id": 0, "coordinates": [[1, 1], [8, 1], [8, 8]]},
                {"id": "bay-2", "coordinates": [[10, 1], [18, 1], [18, 8]]}]"#,
        )?;
        let zones = load_zone_file(&json_path)?;
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].id, ZoneId::Index(0));
        assert_eq!(zones[1].id, ZoneId::Name("bay-2".to_string()));

        let toml_path = dir.path().join("zones.toml");
        let mut file = std::fs::File::create(&toml_path)?;
        writeln!(file, "[[zones]]")?;
        writeln!(file, "id = 3")?;
        writeln!(file, "coordinates = [[0, 0], [5, 0], [5, 5], [0, 5]]")?;
        drop(file);
        let zones = load_zone_file(&toml_path)?;
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].coordinates.len(), 4);
        Ok(())
    }

    #[test]
    fn empty_zone_file_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("zones.json");
        std::fs::write(&path, "[]")?;
        assert!(load_zone_file(&path).is_err());
        Ok(())
    }
}
