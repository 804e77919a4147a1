//! Camera, projection and orbit navigation.
//!
//! The camera is a position looking at a target. [`OrbitController`] collects
//! mouse input between frames and, on [`OrbitController::update`], turns it into
//! a new position on a sphere around its target.

use std::f32::consts::PI;

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3, Zero, perspective};
use wgpu::util::DeviceExt;
use winit::event::{MouseScrollDelta, WindowEvent};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Keeps the polar angle away from the poles where `look_at` degenerates.
const POLAR_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    pub fn new<P: Into<Point3<f32>>>(position: P) -> Self {
        Self {
            position: position.into(),
            target: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::unit_y(),
        }
    }

    pub fn look_at(&mut self, target: Point3<f32>) {
        self.target = target;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }
}

#[derive(Debug, Clone)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(aspect: f32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    /// Takes the aspect ratio of a drawable. Zero sized drawables are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Moves the clip planes. `near` stays positive and `far` stays behind it.
    pub fn set_clip(&mut self, near: f32, far: f32) {
        self.znear = near.max(1e-4);
        self.zfar = far.max(self.znear * 2.0);
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fovy(&self) -> Rad<f32> {
        self.fovy
    }

    pub fn znear(&self) -> f32 {
        self.znear
    }

    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

// We need this for Rust to store our data correctly for the shaders
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates orbit input and applies it to a [`Camera`].
#[derive(Debug, Clone)]
pub struct OrbitController {
    pub target: Point3<f32>,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    rotate_delta: (f32, f32),
    pan_delta: (f32, f32),
    zoom_steps: f32,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self::new(Point3::new(0.0, 0.0, 0.0))
    }
}

impl OrbitController {
    pub fn new(target: Point3<f32>) -> Self {
        Self {
            target,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            rotate_delta: (0.0, 0.0),
            pan_delta: (0.0, 0.0),
            zoom_steps: 0.0,
        }
    }

    /// Queues a rotation by a cursor movement in pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.rotate_delta.0 += dx;
        self.rotate_delta.1 += dy;
    }

    /// Queues a pan by a cursor movement in pixels.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.pan_delta.0 += dx;
        self.pan_delta.1 += dy;
    }

    /// Queues wheel steps; positive steps move the camera closer.
    pub fn zoom(&mut self, steps: f32) {
        self.zoom_steps += steps;
    }

    pub fn handle_window_events(&mut self, event: &WindowEvent) {
        if let WindowEvent::MouseWheel { delta, .. } = event {
            let steps = match delta {
                MouseScrollDelta::LineDelta(_, y) => *y,
                MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.01,
            };
            self.zoom(steps);
        }
    }

    pub fn has_pending_input(&self) -> bool {
        self.rotate_delta != (0.0, 0.0) || self.pan_delta != (0.0, 0.0) || self.zoom_steps != 0.0
    }

    /// Applies queued input and points the camera at the target.
    ///
    /// `viewport_height` is the drawable height in pixels; it scales rotation
    /// and pan so a drag across the full height turns a full circle.
    pub fn update(&mut self, camera: &mut Camera, projection: &Projection, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        let mut offset = camera.position - self.target;

        // Pan moves camera and target together, in the camera's screen plane.
        if self.pan_delta != (0.0, 0.0) {
            let forward = -offset;
            let mut right = forward.cross(camera.up);
            if right.magnitude2() <= f32::EPSILON {
                right = Vector3::unit_x();
            }
            let right = right.normalize();
            let up = right.cross(forward).normalize();
            let target_distance = offset.magnitude() * (projection.fovy().0 * 0.5).tan();
            let scale = 2.0 * target_distance / height * self.pan_speed;
            let shift = right * (-self.pan_delta.0 * scale) + up * (self.pan_delta.1 * scale);
            self.target += shift;
        }

        let radius = offset.magnitude();
        let (mut theta, mut phi) = if radius > 0.0 {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        } else {
            (0.0, PI * 0.5)
        };

        theta -= 2.0 * PI * self.rotate_delta.0 / height * self.rotate_speed;
        phi -= 2.0 * PI * self.rotate_delta.1 / height * self.rotate_speed;
        phi = phi
            .max(self.min_polar_angle)
            .min(self.max_polar_angle)
            .max(POLAR_EPSILON)
            .min(PI - POLAR_EPSILON);

        let scale = 0.95_f32.powf(self.zoom_steps * self.zoom_speed);
        let radius = (radius * scale).max(self.min_distance).min(self.max_distance);

        offset = Vector3::new(
            radius * phi.sin() * theta.sin(),
            radius * phi.cos(),
            radius * phi.sin() * theta.cos(),
        );
        if offset.is_zero() {
            offset = Vector3::new(0.0, 0.0, f32::EPSILON);
        }

        camera.position = self.target + offset;
        camera.look_at(self.target);

        self.rotate_delta = (0.0, 0.0);
        self.pan_delta = (0.0, 0.0);
        self.zoom_steps = 0.0;
    }
}

#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub controller: OrbitController,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn new(
        device: &wgpu::Device,
        camera: Camera,
        controller: OrbitController,
        projection: &Projection,
    ) -> Self {
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj(&camera, projection);

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("camera_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        Self {
            camera,
            controller,
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    /// Recomputes the uniform and uploads it.
    pub fn write(&mut self, queue: &wgpu::Queue, projection: &Projection) {
        self.uniform.update_view_proj(&self.camera, projection);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, EuclideanSpace, MetricSpace};

    use super::*;

    fn setup() -> (Camera, Projection, OrbitController) {
        let camera = Camera::new((0.0, 0.0, 10.0));
        let projection = Projection::new(1.0, Deg(45.0), 0.1, 100.0);
        let controller = OrbitController::new(Point3::origin());
        (camera, projection, controller)
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn update_without_input_keeps_the_position_and_looks_at_target() {
        let (mut camera, projection, mut controller) = setup();
        controller.target = Point3::new(0.0, 5.0, 0.0);
        camera.position = Point3::new(1.0, 1.0, 1.0);
        controller.update(&mut camera, &projection, 600.0);
        assert!(camera.position.distance(Point3::new(1.0, 1.0, 1.0)) < 1e-4);
        assert_eq!(camera.target, Point3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn zoom_in_scales_distance_by_095() {
        let (mut camera, projection, mut controller) = setup();
        controller.zoom(1.0);
        controller.update(&mut camera, &projection, 600.0);
        assert!(approx(camera.position.distance(Point3::origin()), 9.5));
        controller.zoom(-1.0);
        controller.update(&mut camera, &projection, 600.0);
        assert!(approx(camera.position.distance(Point3::origin()), 10.0));
    }

    #[test]
    fn distance_is_clamped() {
        let (mut camera, projection, mut controller) = setup();
        controller.max_distance = 12.0;
        controller.zoom(-20.0);
        controller.update(&mut camera, &projection, 600.0);
        assert!(approx(camera.position.distance(Point3::origin()), 12.0));

        controller.min_distance = 4.0;
        controller.zoom(100.0);
        controller.update(&mut camera, &projection, 600.0);
        assert!(approx(camera.position.distance(Point3::origin()), 4.0));
    }

    #[test]
    fn dragging_the_full_height_turns_a_full_circle() {
        let (mut camera, projection, mut controller) = setup();
        controller.rotate(600.0, 0.0);
        controller.update(&mut camera, &projection, 600.0);
        assert!(camera.position.distance(Point3::new(0.0, 0.0, 10.0)) < 1e-3);

        controller.rotate(150.0, 0.0);
        controller.update(&mut camera, &projection, 600.0);
        // a quarter turn to the left
        assert!(camera.position.distance(Point3::new(-10.0, 0.0, 0.0)) < 1e-3);
    }

    #[test]
    fn polar_angle_never_reaches_the_pole() {
        let (mut camera, projection, mut controller) = setup();
        controller.rotate(0.0, 10_000.0);
        controller.update(&mut camera, &projection, 600.0);
        assert!(approx(camera.position.y, 10.0));
        assert!(camera.position.x.is_finite() && camera.position.z.is_finite());
        assert!(camera.position.z > 0.0);

        controller.rotate(0.0, -10_000.0);
        controller.update(&mut camera, &projection, 600.0);
        assert!(approx(camera.position.y, -10.0));
    }

    #[test]
    fn pan_moves_target_and_camera_together() {
        let (mut camera, projection, mut controller) = setup();
        controller.pan(100.0, 0.0);
        controller.update(&mut camera, &projection, 600.0);
        // dragging right moves the view content right, so the target moves left
        assert!(controller.target.x < 0.0);
        assert!(approx(controller.target.y, 0.0));
        assert!(approx(camera.position.distance(controller.target), 10.0));
        assert_eq!(camera.target, controller.target);
    }

    #[test]
    fn input_is_consumed_by_update() {
        let (mut camera, projection, mut controller) = setup();
        controller.rotate(3.0, 4.0);
        controller.zoom(1.0);
        assert!(controller.has_pending_input());
        controller.update(&mut camera, &projection, 600.0);
        assert!(!controller.has_pending_input());
    }

    #[test]
    fn projection_ignores_zero_sizes_and_keeps_far_behind_near() {
        let mut projection = Projection::new(5.0, Deg(45.0), 0.5, 10.0);
        projection.resize(0, 300);
        assert_eq!(projection.aspect(), 5.0);
        projection.resize(800, 400);
        assert_eq!(projection.aspect(), 2.0);

        projection.set_clip(0.0, 0.0);
        assert!(projection.znear() > 0.0);
        assert!(projection.zfar() > projection.znear());
    }
}
