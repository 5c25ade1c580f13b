use glam::{Mat4, Quat, Vec2, Vec3};

/// Smallest allowed zoom distance, whatever limits are requested.
const MIN_DISTANCE_FLOOR: f32 = 1e-3;

/// Bounds on the distance factor applied by a single scroll event.
const MIN_ZOOM_FACTOR: f32 = 0.25;
const MAX_ZOOM_FACTOR: f32 = 4.0;

/// A camera that orbits the origin, rotated by pointer drags and zoomed by
/// scrolling.
///
/// Scrolling moves the *target* distance instantly. The *current* distance
/// follows it a little every frame in [`update`](Self::update), which gives
/// the zoom its eased feel.
///
/// # Example
/// ```
/// use hedrite::{OrbitCamera, Vec2};
///
/// let mut orbit = OrbitCamera::new()
///     .distance(10.0)
///     .viewport(700.0, 700.0);
///
/// orbit.pointer_down(Vec2::new(350.0, 350.0));
/// orbit.pointer_drag(Vec2::new(400.0, 350.0));
/// orbit.scroll(0.5);
///
/// // In frame loop:
/// orbit.update(1.0 / 60.0);
/// let view = orbit.view_matrix();
/// # let _ = view;
/// ```
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    rotation: Quat,
    /// Last pointer position in trackball coordinates, while dragging.
    last_pointer: Option<Vec2>,
    current_distance: f32,
    target_distance: f32,
    viewport: Vec2,
    /// How quickly the current distance catches up with the target, per second.
    pub smoothing_rate: f32,
    /// Fraction of the target distance removed per unit of scroll.
    pub scroll_speed: f32,
    min_distance: f32,
    max_distance: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            last_pointer: None,
            current_distance: 10.0,
            target_distance: 10.0,
            viewport: Vec2::new(700.0, 700.0),
            smoothing_rate: 15.0,
            scroll_speed: 0.5,
            min_distance: 0.5,
            max_distance: 200.0,
        }
    }
}

impl OrbitCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both the current and target distance.
    pub fn distance(mut self, distance: f32) -> Self {
        if distance.is_nan() {
            return self;
        }
        let distance = distance.clamp(self.min_distance, self.max_distance);
        self.current_distance = distance;
        self.target_distance = distance;
        self
    }

    /// Set the zoom smoothing rate.
    pub fn smoothing_rate(mut self, rate: f32) -> Self {
        self.smoothing_rate = rate;
        self
    }

    /// Set scroll zoom sensitivity.
    pub fn scroll_speed(mut self, speed: f32) -> Self {
        self.scroll_speed = speed;
        self
    }

    /// Set distance limits.
    ///
    /// A reversed pair is swapped and `min` is raised to a small positive
    /// floor, so the distance can never reach zero.
    pub fn distance_limits(mut self, min: f32, max: f32) -> Self {
        let (min, max) = if min > max { (max, min) } else { (min, max) };
        let min = min.max(MIN_DISTANCE_FLOOR);
        let max = max.max(min);
        self.min_distance = min;
        self.max_distance = max;
        self.current_distance = self.current_distance.clamp(min, max);
        self.target_distance = self.target_distance.clamp(min, max);
        self
    }

    /// Set the viewport size in logical pixels.
    pub fn viewport(mut self, width: f32, height: f32) -> Self {
        self.set_viewport(width, height);
        self
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport = Vec2::new(width, height);
    }

    /// Start a drag at `position` (logical pixels, y down).
    pub fn pointer_down(&mut self, position: Vec2) {
        self.last_pointer = Some(self.to_trackball(position));
    }

    /// Rotate by the movement since the previous pointer event.
    pub fn pointer_drag(&mut self, position: Vec2) {
        let next = self.to_trackball(position);
        if let Some(last) = self.last_pointer.replace(next) {
            let delta =
                rotation_between(project_onto_trackball(last), project_onto_trackball(next));
            self.rotation = (delta * self.rotation).normalize();
        }
    }

    /// Finish the current drag.
    pub fn pointer_up(&mut self) {
        self.last_pointer = None;
    }

    /// Zoom by a vertical scroll amount. Positive values move closer.
    ///
    /// One event changes the target by at most a factor of four either way,
    /// so a burst of wheel lines cannot collapse the zoom.
    pub fn scroll(&mut self, delta_y: f32) {
        let factor = (1.0 - delta_y * self.scroll_speed).clamp(MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR);
        let next = self.target_distance * factor;
        if next.is_finite() {
            self.target_distance = next.clamp(self.min_distance, self.max_distance);
        }
    }

    /// Ease the current distance towards the target.
    ///
    /// The step `smoothing_rate * dt` is clamped to `[0, 1]`, so a long frame
    /// lands on the target instead of overshooting it.
    pub fn update(&mut self, dt: f32) {
        let step = (self.smoothing_rate * dt).clamp(0.0, 1.0);
        if step.is_nan() {
            return;
        }
        self.current_distance += step * (self.target_distance - self.current_distance);
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn rotation_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation)
    }

    pub fn current_distance(&self) -> f32 {
        self.current_distance
    }

    pub fn target_distance(&self) -> f32 {
        self.target_distance
    }

    pub fn min_distance(&self) -> f32 {
        self.min_distance
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    /// Rotation about the origin, then a step back along -Z by the current distance.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.0, -self.current_distance)) * self.rotation_matrix()
    }

    /// Pointer position relative to the viewport centre, y up, scaled so the
    /// largest centred circle has radius 1.
    fn to_trackball(&self, position: Vec2) -> Vec2 {
        let scale = self.viewport.min_element() * 0.5;
        if scale <= 0.0 {
            return Vec2::ZERO;
        }
        let centre = self.viewport * 0.5;
        Vec2::new(position.x - centre.x, centre.y - position.y) / scale
    }
}

/// Lifts a trackball point onto the unit sphere near the centre and onto a
/// hyperbolic sheet further out.
fn project_onto_trackball(point: Vec2) -> Vec3 {
    let xy_squared = point.length_squared();
    let z = if xy_squared < 0.5 {
        (1.0 - xy_squared).sqrt()
    } else {
        0.5 / xy_squared.sqrt()
    };
    point.extend(z)
}

/// The rotation carrying `from` towards `to` on the trackball.
fn rotation_between(from: Vec3, to: Vec3) -> Quat {
    let axis = from.cross(to);
    if axis.length_squared() < f32::EPSILON * f32::EPSILON {
        return Quat::IDENTITY;
    }
    let chord = ((to - from).length() / 2.0).clamp(-1.0, 1.0);
    Quat::from_axis_angle(axis.normalize(), 2.0 * chord.asin())
}
