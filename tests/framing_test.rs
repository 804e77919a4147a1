use vista::{
    Deg, EuclideanSpace, MetricSpace, Point3,
    camera::{Camera, OrbitController, Projection},
    config::SceneConfig,
    framing::{Aabb, frame_bounds},
    scene::city_transform,
};

const VIEWPORT_HEIGHT: f32 = 600.0;

fn assert_close(actual: f32, expected: f32, tolerance: f32) {
    assert!(
        (actual - expected).abs() <= tolerance * expected.abs().max(1.0),
        "{actual} is not close to {expected}"
    );
}

/// The camera and controller exactly as the scene starts them.
fn startup() -> (Camera, Projection, OrbitController) {
    let config = SceneConfig::default();
    let cam = &config.camera;
    let projection = Projection::new(cam.aspect, Deg(cam.fov_degrees), cam.near, cam.far);
    let mut camera = Camera::new(cam.position);
    let mut controller = OrbitController::new(cam.orbit_target.into());
    controller.update(&mut camera, &projection, VIEWPORT_HEIGHT);
    (camera, projection, controller)
}

/// A city sized box in model space, placed like the loaded city.
fn city_bounds() -> Aabb {
    let model_space = Aabb::new(
        Point3::new(-1000.0, 0.0, -800.0),
        Point3::new(1000.0, 300.0, 800.0),
    );
    model_space.transformed(&city_transform(&SceneConfig::default()).to_matrix())
}

#[test]
fn frames_the_placed_city() {
    let (mut camera, mut projection, mut controller) = startup();
    let bounds = city_bounds();
    let box_size = bounds.diagonal();
    let box_center = bounds.center();

    assert!(frame_bounds(
        &bounds,
        &mut camera,
        &mut projection,
        &mut controller,
        VIEWPORT_HEIGHT
    ));

    // half the diagonal fills the vertical field of view
    let expected_distance = box_size * 0.25 / 22.5_f32.to_radians().tan();
    assert_close(camera.position.distance(box_center), expected_distance, 1e-4);
    assert_close(camera.position.y, box_center.y, 1e-4);

    assert_close(projection.znear(), box_size / 100.0, 1e-6);
    assert_close(projection.zfar(), box_size * 100.0, 1e-6);
    assert_close(controller.max_distance, box_size * 10.0, 1e-6);
    assert_eq!(controller.target, box_center);
    assert_eq!(camera.target, box_center);
}

#[test]
fn orbiting_after_framing_keeps_the_distance() {
    let (mut camera, mut projection, mut controller) = startup();
    let bounds = city_bounds();
    frame_bounds(
        &bounds,
        &mut camera,
        &mut projection,
        &mut controller,
        VIEWPORT_HEIGHT,
    );
    let distance = camera.position.distance(controller.target);
    let before = camera.position;

    controller.rotate(150.0, -40.0);
    controller.update(&mut camera, &projection, VIEWPORT_HEIGHT);

    assert_close(camera.position.distance(controller.target), distance, 1e-4);
    assert!(camera.position.distance(before) > 1e-3);
}

#[test]
fn zooming_out_stops_at_ten_diagonals() {
    let (mut camera, mut projection, mut controller) = startup();
    let bounds = city_bounds();
    frame_bounds(
        &bounds,
        &mut camera,
        &mut projection,
        &mut controller,
        VIEWPORT_HEIGHT,
    );

    controller.zoom(-1000.0);
    controller.update(&mut camera, &projection, VIEWPORT_HEIGHT);

    assert_close(
        camera.position.distance(controller.target),
        bounds.diagonal() * 10.0,
        1e-4,
    );
}

#[test]
fn degenerate_bounds_leave_the_camera_alone() {
    let (mut camera, mut projection, mut controller) = startup();
    let before = camera.position;
    let point = Aabb::new(Point3::origin(), Point3::origin());

    assert!(!frame_bounds(
        &point,
        &mut camera,
        &mut projection,
        &mut controller,
        VIEWPORT_HEIGHT
    ));
    assert_eq!(camera.position, before);
    assert_eq!(controller.max_distance, f32::INFINITY);
}
