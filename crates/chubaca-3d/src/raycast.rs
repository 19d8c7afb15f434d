use glam::DVec3;

use crate::mesh::TriangleMesh;

const LEAF_SIZE: usize = 4;
const EPSILON: f64 = 1e-12;

/// A half-line starting at `origin` along `direction`.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// The ray origin.
    pub origin: DVec3,
    /// The ray direction, not necessarily normalized.
    pub direction: DVec3,
}

impl Ray {
    /// Create a new ray.
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    /// The point at parameter `t`.
    #[inline]
    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }
}

/// The nearest intersection of a ray with a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// The ray parameter of the intersection.
    pub t: f64,
    /// The intersection point.
    pub point: DVec3,
    /// The index of the intersected triangle.
    pub face: usize,
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: DVec3,
    max: DVec3,
}

impl Aabb {
    const EMPTY: Aabb = Aabb {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    fn grow(self, p: DVec3) -> Self {
        Aabb {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    // slab test, returns the entry distance when the box is crossed before `t_max`
    fn intersect(&self, origin: DVec3, inv_dir: DVec3, t_max: f64) -> Option<f64> {
        let t1 = (self.min - origin) * inv_dir;
        let t2 = (self.max - origin) * inv_dir;
        let t_near = t1.min(t2).max_element().max(0.0);
        let t_far = t1.max(t2).min_element().min(t_max);
        (t_near <= t_far).then_some(t_near)
    }
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf { start: usize, count: usize },
    Inner { left: usize, right: usize },
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bounds: Aabb,
    kind: NodeKind,
}

/// A bounding volume hierarchy over the triangles of a mesh.
///
/// The hierarchy owns a copy of the triangle corners and can be shared between threads.
#[derive(Debug, Clone)]
pub struct Bvh {
    triangles: Vec<[DVec3; 3]>,
    indices: Vec<usize>,
    nodes: Vec<BvhNode>,
}

impl Bvh {
    /// Build the hierarchy with median splits along the longest centroid axis.
    pub fn new(mesh: &TriangleMesh) -> Self {
        let triangles: Vec<[DVec3; 3]> = (0..mesh.num_faces()).map(|i| mesh.triangle(i)).collect();
        let centroids: Vec<DVec3> = triangles
            .iter()
            .map(|[a, b, c]| (*a + *b + *c) / 3.0)
            .collect();

        let mut bvh = Bvh {
            indices: (0..triangles.len()).collect(),
            triangles,
            nodes: Vec::new(),
        };
        if !bvh.triangles.is_empty() {
            bvh.build_node(&centroids, 0, bvh.indices.len());
        }
        log::debug!(
            "built bvh with {} triangles and {} nodes",
            bvh.triangles.len(),
            bvh.nodes.len()
        );
        bvh
    }

    fn build_node(&mut self, centroids: &[DVec3], start: usize, end: usize) -> usize {
        let bounds = self.indices[start..end]
            .iter()
            .fold(Aabb::EMPTY, |acc, &i| {
                self.triangles[i].iter().fold(acc, |acc, p| acc.grow(*p))
            });
        let centroid_bounds = self.indices[start..end]
            .iter()
            .fold(Aabb::EMPTY, |acc, &i| acc.grow(centroids[i]));

        let node_index = self.nodes.len();
        let count = end - start;
        self.nodes.push(BvhNode {
            bounds,
            kind: NodeKind::Leaf { start, count },
        });

        let extent = centroid_bounds.max - centroid_bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        if count <= LEAF_SIZE || extent[axis] <= 0.0 {
            return node_index;
        }

        let mid = count / 2;
        self.indices[start..end].select_nth_unstable_by(mid, |&a, &b| {
            centroids[a][axis].total_cmp(&centroids[b][axis])
        });

        let left = self.build_node(centroids, start, start + mid);
        let right = self.build_node(centroids, start + mid, end);
        self.nodes[node_index].kind = NodeKind::Inner { left, right };
        node_index
    }

    /// Number of triangles in the hierarchy.
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// The bounds of the whole hierarchy, or `None` when it is empty.
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        self.nodes.first().map(|n| (n.bounds.min, n.bounds.max))
    }

    /// Find the nearest intersection of a ray with the mesh.
    ///
    /// Triangles are two-sided and hits at `t <= 0` are ignored.
    pub fn intersect(&self, ray: &Ray) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        let mut t_max = f64::INFINITY;
        self.traverse(ray, |tri, t| {
            if t < t_max {
                t_max = t;
                best = Some(RayHit {
                    t,
                    point: ray.at(t),
                    face: tri,
                });
            }
            t_max
        });
        best
    }

    /// Count the surface crossings of a ray.
    ///
    /// Intersections closer than a tiny relative distance are merged so that a ray through a
    /// shared edge counts once.
    pub fn count_crossings(&self, ray: &Ray) -> usize {
        let mut ts = Vec::new();
        self.traverse(ray, |_, t| {
            ts.push(t);
            f64::INFINITY
        });
        ts.sort_unstable_by(f64::total_cmp);
        ts.dedup_by(|a, b| (*a - *b).abs() <= 1e-9 * b.abs().max(1.0));
        ts.len()
    }

    // visits every triangle hit whose node box is crossed before the bound returned by `on_hit`
    fn traverse(&self, ray: &Ray, mut on_hit: impl FnMut(usize, f64) -> f64) {
        if self.nodes.is_empty() {
            return;
        }
        let inv_dir = ray.direction.recip();
        let mut t_max = f64::INFINITY;
        let mut stack = vec![0usize];

        while let Some(n) = stack.pop() {
            let node = &self.nodes[n];
            if node.bounds.intersect(ray.origin, inv_dir, t_max).is_none() {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for &tri in &self.indices[start..start + count] {
                        if let Some(t) = intersect_triangle(ray, &self.triangles[tri]) {
                            t_max = t_max.min(on_hit(tri, t));
                        }
                    }
                }
                NodeKind::Inner { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
    }
}

/// Möller–Trumbore intersection of a ray with a two-sided triangle.
///
/// # Returns
///
/// The ray parameter of the intersection, if any.
pub fn intersect_triangle(ray: &Ray, triangle: &[DVec3; 3]) -> Option<f64> {
    let [a, b, c] = *triangle;
    let e1 = b - a;
    let e2 = c - a;
    let p = ray.direction.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    (t > EPSILON).then_some(t)
}
