//! Bounding volumes and fitting the camera to them.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Transform, Vector3};
use crate::camera::{Camera, OrbitController, Projection};

/// Axis aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, `None` for no points.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3<f32>>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |acc, p| acc.include(p)))
    }

    fn include(self, p: Point3<f32>) -> Self {
        Self {
            min: Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }

    pub fn union(self, other: Self) -> Self {
        self.include(other.min).include(other.max)
    }

    pub fn corners(&self) -> [Point3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    /// Box around all eight corners after `matrix` is applied.
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Self {
        let corners = self.corners().map(|c| matrix.transform_point(c));
        let first = Self::new(corners[0], corners[0]);
        corners[1..].iter().fold(first, |acc, &p| acc.include(p))
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f32> {
        self.min.midpoint(self.max)
    }

    /// Length of the box diagonal.
    pub fn diagonal(&self) -> f32 {
        self.size().magnitude()
    }
}

/// Moves the camera so that `size_to_fit_on_screen` fills the vertical field
/// of view, keeping the camera's horizontal bearing to `box_center`, and sets
/// clip planes that enclose a box of `box_size`.
pub fn frame_area(
    size_to_fit_on_screen: f32,
    box_size: f32,
    box_center: Point3<f32>,
    camera: &mut Camera,
    projection: &mut Projection,
) {
    let half_size_to_fit_on_screen = size_to_fit_on_screen * 0.5;
    let half_fov_y = projection.fovy().0 * 0.5;
    let distance = half_size_to_fit_on_screen / half_fov_y.tan();

    // only the xz plane, so the camera ends up level with the box center
    let offset = camera.position - box_center;
    let horizontal = Vector3::new(offset.x, 0.0, offset.z);
    let direction = if horizontal.magnitude2() > 0.0 {
        horizontal.normalize()
    } else {
        Vector3::unit_z()
    };

    camera.position = box_center + direction * distance;
    projection.set_clip(box_size / 100.0, box_size * 100.0);
    camera.look_at(box_center);
}

/// Frames `bounds` the way a freshly loaded model is presented: fit half the
/// diagonal on screen, allow zooming out to ten diagonals and orbit around the
/// center.
///
/// Returns `false` and leaves everything untouched for empty or non finite
/// bounds.
pub fn frame_bounds(
    bounds: &Aabb,
    camera: &mut Camera,
    projection: &mut Projection,
    controller: &mut OrbitController,
    viewport_height: f32,
) -> bool {
    let box_size = bounds.diagonal();
    let box_center = bounds.center();
    let center_finite = [box_center.x, box_center.y, box_center.z]
        .iter()
        .all(|c| c.is_finite());
    if !box_size.is_finite() || box_size <= 0.0 || !center_finite {
        log::warn!("Not framing degenerate bounds {bounds:?}");
        return false;
    }

    frame_area(box_size * 0.5, box_size, box_center, camera, projection);

    controller.max_distance = box_size * 10.0;
    controller.target = box_center;
    controller.update(camera, projection, viewport_height);
    true
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, MetricSpace};

    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn from_points_of_nothing_is_none() {
        assert!(Aabb::from_points(Vec::new()).is_none());
    }

    #[test]
    fn from_points_spans_all_points() {
        let aabb = Aabb::from_points([
            Point3::new(1.0, -2.0, 3.0),
            Point3::new(-1.0, 4.0, 0.0),
            Point3::new(0.0, 0.0, 5.0),
        ])
        .unwrap();
        assert_eq!(aabb.min, Point3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Point3::new(1.0, 4.0, 5.0));
        assert_eq!(aabb.center(), Point3::new(0.0, 1.0, 2.5));
    }

    #[test]
    fn union_contains_both() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(-1.0, 0.5, 2.0), Point3::new(0.5, 3.0, 4.0));
        let u = a.union(b);
        assert_eq!(u.min, Point3::new(-1.0, 0.0, 0.0));
        assert_eq!(u.max, Point3::new(1.0, 3.0, 4.0));
    }

    #[test]
    fn transformed_uses_all_corners() {
        let unit = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let rotated = unit.transformed(&Matrix4::from_angle_y(Deg(45.0)));
        let half = 2.0_f32.sqrt();
        assert!(approx(rotated.max.x, half));
        assert!(approx(rotated.min.z, -half));
        assert!(approx(rotated.max.y, 1.0));

        let moved = unit.transformed(
            &(Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0)) * Matrix4::from_scale(2.0)),
        );
        assert_eq!(moved.min, Point3::new(8.0, -2.0, -2.0));
        assert_eq!(moved.max, Point3::new(12.0, 2.0, 2.0));
    }

    #[test]
    fn diagonal_is_the_size_length() {
        let aabb = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(3.0, 4.0, 0.0));
        assert!(approx(aabb.diagonal(), 5.0));
    }

    #[test]
    fn frame_area_places_camera_at_fitting_distance() {
        let mut camera = Camera::new((10.0, 7.0, 0.0));
        let mut projection = Projection::new(1.0, Deg(90.0), 0.5, 10.0);
        frame_area(4.0, 8.0, Point3::new(0.0, 1.0, 0.0), &mut camera, &mut projection);

        // tan(45°) == 1, so the distance equals half the size
        assert!(camera.position.distance(Point3::new(2.0, 1.0, 0.0)) < 1e-4);
        assert_eq!(camera.target, Point3::new(0.0, 1.0, 0.0));
        assert!(approx(projection.znear(), 0.08));
        assert!(approx(projection.zfar(), 800.0));
    }

    #[test]
    fn frame_area_keeps_the_horizontal_bearing() {
        let mut camera = Camera::new((3.0, 100.0, 4.0));
        let mut projection = Projection::new(1.0, Deg(45.0), 0.5, 10.0);
        frame_area(2.0, 2.0, Point3::new(0.0, 0.0, 0.0), &mut camera, &mut projection);

        let distance = 1.0 / (22.5_f32.to_radians()).tan();
        assert!(approx(camera.position.y, 0.0));
        assert!(approx(camera.position.x, 0.6 * distance));
        assert!(approx(camera.position.z, 0.8 * distance));
    }

    #[test]
    fn frame_area_above_the_center_falls_back_to_z() {
        let mut camera = Camera::new((0.0, 50.0, 0.0));
        let mut projection = Projection::new(1.0, Deg(90.0), 0.5, 10.0);
        frame_area(2.0, 2.0, Point3::new(0.0, 0.0, 0.0), &mut camera, &mut projection);
        assert!(camera.position.distance(Point3::new(0.0, 0.0, 1.0)) < 1e-4);
    }

    #[test]
    fn frame_bounds_sets_up_the_orbit() {
        let bounds = Aabb::new(Point3::new(-2.0, 0.0, -2.0), Point3::new(2.0, 2.0, 2.0));
        let mut camera = Camera::new((1.0, 1.0, 1.0));
        let mut projection = Projection::new(1.0, Deg(45.0), 0.5, 10.0);
        let mut controller = OrbitController::new(Point3::new(0.0, 5.0, 0.0));

        assert!(frame_bounds(&bounds, &mut camera, &mut projection, &mut controller, 600.0));
        assert_eq!(controller.target, Point3::new(0.0, 1.0, 0.0));
        assert!(approx(controller.max_distance, 60.0));
        assert_eq!(camera.target, controller.target);
        let expected = 6.0 * 0.5 * 0.5 / (22.5_f32.to_radians()).tan();
        assert!(approx(camera.position.distance(controller.target), expected));
    }

    #[test]
    fn frame_bounds_rejects_a_point() {
        let bounds = Aabb::new(Point3::new(1.0, 1.0, 1.0), Point3::new(1.0, 1.0, 1.0));
        let mut camera = Camera::new((1.0, 1.0, 1.0));
        let mut projection = Projection::new(1.0, Deg(45.0), 0.5, 10.0);
        let mut controller = OrbitController::default();
        assert!(!frame_bounds(&bounds, &mut camera, &mut projection, &mut controller, 600.0));
        assert_eq!(camera.position, Point3::new(1.0, 1.0, 1.0));
        assert!(controller.max_distance.is_infinite());
    }
}
