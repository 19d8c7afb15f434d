use chubaca_image::{Image, ImageError};
use chubaca_imgproc::{
    canny::canny,
    contours::{find_contours, RetrievalMode},
    padding::constant_padding,
    threshold::binarize_non_zero,
};

use crate::config::{BoundMode, ContourConfig};
use crate::hitmap::HitMap;

/// Error types for the contour module.
#[derive(Debug, thiserror::Error)]
pub enum ContourError {
    /// No pixel of the hit map hit the mesh.
    #[error("The hit map has no hit pixel")]
    EmptyHitMap,

    /// Edge detection found no closed border.
    #[error("No contour found in the hit map")]
    NoContour,

    /// A raster operation failed.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// A closed outline in annotation coordinates, the y axis pointing up from the bottom row.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    points: Vec<[f64; 2]>,
}

impl Contour {
    /// Create a contour, closing it when the last point differs from the first.
    pub fn new(mut points: Vec<[f64; 2]>) -> Self {
        if let (Some(first), Some(last)) = (points.first().copied(), points.last()) {
            if first != *last {
                points.push(first);
            }
        }
        Self { points }
    }

    /// The points of the contour, the first one repeated at the end.
    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// The number of points, counting the closing one.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the contour has no point.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Trace the outline of the hit pixels of a hit map.
///
/// The hit mask is turned into an upright image, padded, run through Canny and border
/// following. The longest outer border is kept and every point is moved back into the hit
/// map, snapping to a nearby hit pixel when it fell just outside of the hit region.
///
/// # Arguments
///
/// * `hit_map` - The hit map.
/// * `config` - The padding, Canny thresholds and snapping radius.
///
/// # Returns
///
/// The closed outline as `(x, height - y)` pixel coordinates.
pub fn trace_contour(hit_map: &HitMap, config: &ContourConfig) -> Result<Contour, ContourError> {
    if hit_map.num_hits() == 0 {
        return Err(ContourError::EmptyHitMap);
    }
    let (width, height) = (hit_map.width() as isize, hit_map.height() as isize);

    let image = hit_map.to_image()?;
    let mut mask = Image::<u8, 1>::from_size_val(image.size(), 0)?;
    binarize_non_zero(&image, &mut mask, 255)?;

    let padded = constant_padding(&mask, config.padding, 0)?;
    let edges = canny(&padded, config.canny_low, config.canny_high)?;
    let borders = find_contours(&edges, RetrievalMode::External);

    // longest border, the first one on ties
    let longest = borders
        .iter()
        .fold(None, |best: Option<&chubaca_imgproc::contours::Contour>, c| match best {
            Some(b) if b.points.len() >= c.points.len() => Some(b),
            _ => Some(c),
        })
        .filter(|c| !c.points.is_empty())
        .ok_or(ContourError::NoContour)?;

    let pad = config.padding as isize;
    let points = longest
        .points
        .iter()
        .chain(longest.points.first())
        .map(|p| {
            let x = (p.x as isize - pad).clamp(0, width - 1) as usize;
            let y = (height - (p.y as isize - pad)).clamp(0, height - 1) as usize;
            let (x, y) = if hit_map.is_hit(x, y) {
                (x, y)
            } else {
                search_around(hit_map, x, y, config.search_radius).unwrap_or((x, y))
            };
            [x as f64, (height as usize - y) as f64]
        })
        .collect::<Vec<_>>();

    log::debug!(
        "traced contour of {} points out of {} borders",
        points.len(),
        borders.len()
    );

    Ok(Contour { points })
}

/// The image rectangle shrunk by `margin` pixels, in annotation coordinates.
pub fn inset_border(hit_map: &HitMap, margin: usize) -> Contour {
    let m = margin as f64;
    let w = hit_map.width() as f64 - m;
    let h = hit_map.height() as f64 - m;
    Contour::new(vec![[m, m], [w, m], [w, h], [m, h]])
}

/// Build the bound of a frame with the configured mode.
pub fn frame_bound(
    hit_map: &HitMap,
    mode: &BoundMode,
    config: &ContourConfig,
) -> Result<Contour, ContourError> {
    match mode {
        BoundMode::Contour => trace_contour(hit_map, config),
        BoundMode::InsetBorder { margin } => Ok(inset_border(hit_map, *margin)),
    }
}

// first hit pixel in growing square rings, scanning x then y
fn search_around(hit_map: &HitMap, x: usize, y: usize, max_radius: usize) -> Option<(usize, usize)> {
    let (x, y) = (x as isize, y as isize);
    for radius in 1..=max_radius as isize {
        for i in -radius..=radius {
            for j in -radius..=radius {
                let (cx, cy) = (x + i, y + j);
                if cx < 0 || cy < 0 {
                    continue;
                }
                if hit_map.is_hit(cx as usize, cy as usize) {
                    return Some((cx as usize, cy as usize));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // hit map with a filled rectangle of hits, sensor coordinates
    fn block(width: usize, height: usize, x0: usize, x1: usize, y0: usize, y1: usize) -> HitMap {
        let mut map = HitMap::empty(width, height);
        for y in y0..y1 {
            for x in x0..x1 {
                map.set(x, y, [x as f32 + 1.0, y as f32 + 1.0, 0.5]);
            }
        }
        map
    }

    #[test]
    fn test_empty_hit_map() {
        let map = HitMap::empty(8, 6);
        assert!(matches!(
            trace_contour(&map, &ContourConfig::default()),
            Err(ContourError::EmptyHitMap)
        ));
    }

    #[test]
    fn test_contour_is_closed_and_on_hits() -> Result<(), ContourError> {
        let map = block(30, 20, 5, 25, 4, 16);
        let contour = trace_contour(&map, &ContourConfig::default())?;

        assert!(contour.len() > 4);
        assert_eq!(contour.points().first(), contour.points().last());

        let h = map.height() as f64;
        for [x, y] in contour.points() {
            // back to sensor coordinates
            let (sx, sy) = (*x as usize, (h - y) as usize);
            assert!(map.is_hit(sx, sy), "({x}, {y}) is not on a hit");
        }
        Ok(())
    }

    #[test]
    fn test_contour_follows_block_outline() -> Result<(), ContourError> {
        let map = block(30, 20, 5, 25, 4, 16);
        let contour = trace_contour(&map, &ContourConfig::default())?;

        let xs = contour.points().iter().map(|p| p[0]);
        let min_x = xs.clone().fold(f64::INFINITY, f64::min);
        let max_x = xs.fold(f64::NEG_INFINITY, f64::max);
        assert!((4.0..=6.0).contains(&min_x));
        assert!((23.0..=25.0).contains(&max_x));
        Ok(())
    }

    #[test]
    fn test_contour_is_idempotent() -> Result<(), ContourError> {
        let mut map = block(40, 30, 3, 30, 2, 25);
        // an irregular notch
        for y in 10..14 {
            for x in 3..12 {
                map.set(x, y, [0.0; 3]);
            }
        }
        let config = ContourConfig::default();
        let first = trace_contour(&map, &config)?;
        let second = trace_contour(&map, &config)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_keeps_longest_region() -> Result<(), ContourError> {
        let mut map = block(60, 30, 25, 55, 5, 25);
        map.set(3, 3, [1.0, 1.0, 1.0]);
        map.set(4, 3, [1.0, 1.0, 1.0]);
        let contour = trace_contour(&map, &ContourConfig::default())?;
        assert!(contour.points().iter().all(|p| p[0] >= 20.0));
        Ok(())
    }

    #[test]
    fn test_search_around() {
        let mut map = HitMap::empty(10, 10);
        map.set(7, 5, [1.0, 1.0, 1.0]);
        assert_eq!(search_around(&map, 5, 5, 1), None);
        assert_eq!(search_around(&map, 5, 5, 3), Some((7, 5)));
        assert_eq!(search_around(&map, 0, 0, 3), None);
    }

    #[test]
    fn test_inset_border() {
        let map = HitMap::empty(100, 50);
        let bound = inset_border(&map, 5);
        assert_eq!(
            bound.points(),
            &[[5.0, 5.0], [95.0, 5.0], [95.0, 45.0], [5.0, 45.0], [5.0, 5.0]]
        );

        let by_mode = frame_bound(
            &map,
            &BoundMode::InsetBorder { margin: 5 },
            &ContourConfig::default(),
        );
        assert!(matches!(by_mode, Ok(c) if c == bound));
    }

    #[test]
    fn test_contour_new_closes() {
        let contour = Contour::new(vec![[1.0, 1.0], [2.0, 1.0], [2.0, 2.0]]);
        assert_eq!(contour.len(), 4);
        assert!(Contour::new(Vec::new()).is_empty());
    }
}
