/// RGBA color with straight (non-premultiplied) alpha.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Build an opaque color from 8-bit channels.
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const CRIMSON: Color = Color::from_rgb8(220, 20, 60);
    pub const BLUE_VIOLET: Color = Color::from_rgb8(138, 43, 226);

    /// Move each channel towards white: `1 - (1 - c) / (1 + amount)`.
    ///
    /// `amount` of 0 leaves the color unchanged. Alpha is kept.
    pub fn brighter(self, amount: f32) -> Self {
        let scale = 1.0 / (1.0 + amount.max(0.0));
        let lift = |c: f32| 1.0 - (1.0 - c) * scale;
        Self::rgba(lift(self.r), lift(self.g), lift(self.b), self.a)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub(crate) fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r as f64,
            g: self.g as f64,
            b: self.b as f64,
            a: self.a as f64,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl From<Color> for glam::Vec4 {
    fn from(color: Color) -> Self {
        glam::Vec4::from_array(color.to_array())
    }
}
