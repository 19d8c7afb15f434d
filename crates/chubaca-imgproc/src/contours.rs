use chubaca_image::Image;

/// Specification for Border Type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BorderType {
    /// Perimeter of foreground regions
    Outer,
    /// Perimeter of background regions enclosed by foreground.
    Hole,
}

/// Which borders to keep after border following.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Only the outer borders that are not enclosed by any other region.
    External,
    /// Every border with its parent relation.
    List,
}

/// A pixel location on a border, `x` is the column and `y` the row counted from the top.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Point {
    /// x-coordinate.
    pub x: usize,
    /// y-coordinate.
    pub y: usize,
}

impl Point {
    /// Construct a point at (x, y).
    pub fn new(x: usize, y: usize) -> Self {
        Point { x, y }
    }
}

/// The border for any region.
#[derive(Debug, Clone)]
pub struct Contour {
    /// The points on the border.
    pub points: Vec<Point>,
    /// The type of the border. Outer or Hole.
    pub border_type: BorderType,
    /// The parent of the border.
    pub parent: Option<usize>,
}

// Neighbour offsets in clockwise order for a y-down raster: E, SE, S, SW, W, NW, N, NE.
const DIRECTIONS: [(isize, isize); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

fn direction_index(dx: isize, dy: isize) -> usize {
    DIRECTIONS
        .iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or_default()
}

/// Finds the borders of the foreground regions of a mask.
///
/// Non-zero pixels are foreground. Border following follows the topological structural
/// analysis of Suzuki and Abe; points are emitted one per border pixel, in tracing order,
/// starting at the first border pixel found in raster order.
///
/// # Arguments
///
/// * `src` - The input mask.
/// * `mode` - The borders to retrieve.
///
/// # Returns
///
/// The borders in the order they were discovered.
pub fn find_contours(src: &Image<u8, 1>, mode: RetrievalMode) -> Vec<Contour> {
    // work on a copy framed with a one pixel zero border
    let width = src.width() + 2;
    let height = src.height() + 2;
    let at = |x: usize, y: usize| x + y * width;

    let mut f = vec![0i32; width * height];
    for (y, row) in src.as_slice().chunks_exact(src.width().max(1)).enumerate() {
        for (x, &v) in row.iter().enumerate() {
            if v != 0 {
                f[at(x + 1, y + 1)] = 1;
            }
        }
    }

    let mut contours: Vec<Contour> = Vec::new();
    let mut nbd = 1i32;

    for y in 1..height - 1 {
        let mut lnbd = 1i32;

        for x in 1..width - 1 {
            let fij = f[at(x, y)];
            if fij == 0 {
                continue;
            }

            let start = if fij == 1 && f[at(x - 1, y)] == 0 {
                Some((x - 1, BorderType::Outer))
            } else if fij >= 1 && f[at(x + 1, y)] == 0 {
                if fij > 1 {
                    lnbd = fij;
                }
                Some((x + 1, BorderType::Hole))
            } else {
                None
            };

            if let Some((adj_x, border_type)) = start {
                nbd += 1;

                let parent = if lnbd >= 2 {
                    let parent_index = (lnbd - 2) as usize;
                    let parent_contour = &contours[parent_index];
                    if (border_type == BorderType::Outer)
                        ^ (parent_contour.border_type == BorderType::Outer)
                    {
                        Some(parent_index)
                    } else {
                        parent_contour.parent
                    }
                } else {
                    None
                };

                let points = follow_border(&mut f, width, (x, y), adj_x, nbd);
                contours.push(Contour {
                    points,
                    border_type,
                    parent,
                });
            }

            let fij = f[at(x, y)];
            if fij != 1 {
                lnbd = fij.abs();
            }
        }
    }

    match mode {
        RetrievalMode::List => contours,
        RetrievalMode::External => contours
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .collect(),
    }
}

fn follow_border(
    f: &mut [i32],
    width: usize,
    start: (usize, usize),
    adj_x: usize,
    nbd: i32,
) -> Vec<Point> {
    let at = |x: usize, y: usize| x + y * width;
    let neighbour = |p: (usize, usize), d: usize| -> (usize, usize) {
        let (dx, dy) = DIRECTIONS[d % 8];
        ((p.0 as isize + dx) as usize, (p.1 as isize + dy) as usize)
    };
    let unframe = |p: (usize, usize)| Point::new(p.0 - 1, p.1 - 1);

    // look clockwise around the start pixel, beginning at the adjacent background pixel
    let first_dir = direction_index(adj_x as isize - start.0 as isize, 0);
    let found = (0..8)
        .map(|k| (first_dir + k) % 8)
        .find(|&d| f[at(neighbour(start, d).0, neighbour(start, d).1)] != 0);

    let Some(d1) = found else {
        f[at(start.0, start.1)] = -nbd;
        return vec![unframe(start)];
    };

    let p1 = neighbour(start, d1);
    let mut p2 = p1;
    let mut p3 = start;
    let mut points = Vec::new();

    loop {
        points.push(unframe(p3));

        // counterclockwise search around p3 starting after p2
        let back = direction_index(p2.0 as isize - p3.0 as isize, p2.1 as isize - p3.1 as isize);
        let mut east_examined = false;
        let mut p4 = p2;
        for k in 1..=8 {
            let d = (back + 8 - k) % 8;
            let candidate = neighbour(p3, d);
            if f[at(candidate.0, candidate.1)] != 0 {
                p4 = candidate;
                break;
            }
            if d == 0 {
                east_examined = true;
            }
        }

        let idx = at(p3.0, p3.1);
        if east_examined {
            f[idx] = -nbd;
        } else if f[idx] == 1 {
            f[idx] = nbd;
        }

        if p4 == start && p3 == p1 {
            break;
        }
        p2 = p3;
        p3 = p4;
    }

    points
}
