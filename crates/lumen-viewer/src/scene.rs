use lumen_engine::input::{InputState, Key};
use lumen_engine::pipeline::SceneController;
use lumen_engine::time::FrameTime;
use lumen_engine::uniform::FrameUniforms;

const MOVE_SPEED: f32 = 3.0;
const SPHERE_SPEED: f32 = 1.5;
const RADIUS_SPEED: f32 = 0.75;
const RADIUS_RANGE: (f32, f32) = (0.1, 3.0);
/// Hue turns per second while Space is held.
const HUE_SPEED: f32 = 0.25;
const BRIGHTNESS_SPEED: f32 = 0.5;

/// Free-flying camera plus the tunable sphere parameters.
///
/// W/S move along the view direction, A/D strafe, Up/Down change height.
/// The sphere slides with Left/Right (x), Q/E (y) and `-`/`=` (z). `[`/`]`
/// shrink and grow it, or darken and brighten it with Shift held. Space
/// cycles its hue. R resets everything.
#[derive(Debug, Clone)]
pub struct CameraController {
    position: [f32; 3],
    look_at: [f32; 3],
    sphere: [f32; 4],
    color: Hsv,
}

impl Default for CameraController {
    fn default() -> Self {
        let u = FrameUniforms::default();
        Self {
            position: [u.camera_position[0], u.camera_position[1], u.camera_position[2]],
            look_at: [u.camera_look_at[0], u.camera_look_at[1], u.camera_look_at[2]],
            sphere: u.sphere_center_radius,
            color: Hsv::from_rgb([u.sphere_color[0], u.sphere_color[1], u.sphere_color[2]]),
        }
    }
}

/// Hue in turns, saturation and value in `[0, 1]`.
#[derive(Debug, Copy, Clone, PartialEq)]
struct Hsv {
    hue: f32,
    saturation: f32,
    value: f32,
}

impl Hsv {
    fn from_rgb([r, g, b]: [f32; 3]) -> Self {
        let max = r.max(g).max(b);
        let delta = max - r.min(g).min(b);
        let sector = if delta <= f32::EPSILON {
            0.0
        } else if max == r {
            ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            (b - r) / delta + 2.0
        } else {
            (r - g) / delta + 4.0
        };
        Self {
            hue: sector / 6.0,
            saturation: if max <= f32::EPSILON { 0.0 } else { delta / max },
            value: max,
        }
    }

    fn to_rgb(self) -> [f32; 3] {
        let h = self.hue.rem_euclid(1.0) * 6.0;
        let c = self.value * self.saturation;
        let x = c * (1.0 - (h.rem_euclid(2.0) - 1.0).abs());
        let m = self.value - c;
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        [
            (r + m).clamp(0.0, 1.0),
            (g + m).clamp(0.0, 1.0),
            (b + m).clamp(0.0, 1.0),
        ]
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn normalize_xz(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        return [0.0, 0.0, 1.0];
    }
    [v[0] / len, 0.0, v[2] / len]
}

impl CameraController {
    fn translate(&mut self, d: [f32; 3]) {
        for i in 0..3 {
            self.position[i] += d[i];
            self.look_at[i] += d[i];
        }
    }
}

impl SceneController for CameraController {
    fn update(&mut self, input: &InputState, time: FrameTime, uniforms: &mut FrameUniforms) {
        if input.pressed(Key::R) {
            *self = Self::default();
        }

        let dt = time.dt;
        let forward = normalize_xz(sub(self.look_at, self.position));
        let right = [forward[2], 0.0, -forward[0]];

        let ahead = input.axis(Key::S, Key::W) * MOVE_SPEED * dt;
        let side = input.axis(Key::A, Key::D) * MOVE_SPEED * dt;
        let lift = input.axis(Key::ArrowDown, Key::ArrowUp) * MOVE_SPEED * dt;
        self.translate([
            forward[0] * ahead + right[0] * side,
            lift,
            forward[2] * ahead + right[2] * side,
        ]);

        let slide = SPHERE_SPEED * dt;
        self.sphere[0] += input.axis(Key::ArrowLeft, Key::ArrowRight) * slide;
        self.sphere[1] += input.axis(Key::Q, Key::E) * slide;
        self.sphere[2] += input.axis(Key::Minus, Key::Equal) * slide;

        let brackets = input.axis(Key::BracketLeft, Key::BracketRight);
        if input.key_down(Key::Shift) {
            self.color.value =
                (self.color.value + brackets * BRIGHTNESS_SPEED * dt).clamp(0.0, 1.0);
        } else {
            self.sphere[3] = (self.sphere[3] + brackets * RADIUS_SPEED * dt)
                .clamp(RADIUS_RANGE.0, RADIUS_RANGE.1);
        }
        if input.key_down(Key::Space) {
            self.color.hue = (self.color.hue + HUE_SPEED * dt).rem_euclid(1.0);
        }

        uniforms.camera_position = [self.position[0], self.position[1], self.position[2], 1.0];
        uniforms.camera_look_at = [self.look_at[0], self.look_at[1], self.look_at[2], 1.0];
        uniforms.sphere_center_radius = self.sphere;
        let [r, g, b] = self.color.to_rgb();
        uniforms.sphere_color = [r, g, b, 1.0];
    }
}
