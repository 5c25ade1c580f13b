//! Shader program bundle with link-time capability probing.
//!
//! A [`ShaderProgram`] is a WGSL vertex/fragment pair that has been parsed and
//! validated. After compiling, the program records which of the known vertex
//! attributes and uniforms it actually declares. Programs may leave any of
//! them out: the minimal bundled variant has no lighting and no outline
//! support, and still renders through the same code path.
//!
//! ```
//! use hedrite::{ShaderProgram, shaders};
//!
//! let program =
//!     ShaderProgram::compile(shaders::MINIMAL_VERTEX, shaders::DEFAULT_FRAGMENT).unwrap();
//! assert!(program.probe_uniform("view_matrix").is_some());
//! assert!(program.probe_uniform("light_position").is_none());
//! assert!(program.probe_attribute("normal").is_none());
//! ```
//!
//! # Interface
//!
//! | Name                | Kind      | WGSL type     | Required |
//! |---------------------|-----------|---------------|----------|
//! | `position`          | attribute | `vec3<f32>`   | yes      |
//! | `normal`            | attribute | `vec3<f32>`   | no       |
//! | `source_colour`     | attribute | `vec4<f32>`   | no       |
//! | `projection_matrix` | uniform   | `mat4x4<f32>` | no       |
//! | `view_matrix`       | uniform   | `mat4x4<f32>` | no       |
//! | `light_position`    | uniform   | `vec4<f32>`   | no       |
//! | `has_wireframe`     | uniform   | `i32`         | no       |
//! | `wireframe_colour`  | uniform   | `vec4<f32>`   | no       |
//!
//! Every uniform is its own `var<uniform>` in `@group(0)`.

use std::fmt;

use glam::{Mat4, Vec4};

use crate::color::Color;
use crate::frame::{DrawCommand, RecordedFrame, UniformValue};
use crate::mesh::Vertex;

/// The bundled WGSL sources.
pub mod shaders {
    /// Lit vertex stage declaring every attribute and uniform.
    pub const DEFAULT_VERTEX: &str = include_str!("shaders/default_vertex.wgsl");
    /// Passes the interpolated colour through.
    pub const DEFAULT_FRAGMENT: &str = include_str!("shaders/default_fragment.wgsl");
    /// Unlit vertex stage with only `position`, `source_colour` and the two
    /// matrices.
    pub const MINIMAL_VERTEX: &str = include_str!("shaders/minimal_vertex.wgsl");
}

/// A programmable pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            Stage::Vertex => naga::ShaderStage::Vertex,
            Stage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Value type of a known uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformType {
    Mat4,
    Vec4,
    Int,
}

impl UniformType {
    /// Size of the value in bytes.
    pub fn size(self) -> u64 {
        match self {
            UniformType::Mat4 => 64,
            UniformType::Vec4 => 16,
            UniformType::Int => 4,
        }
    }

    fn matches(self, inner: &naga::TypeInner) -> bool {
        use naga::{Scalar, TypeInner, VectorSize};

        match self {
            UniformType::Mat4 => matches!(
                inner,
                TypeInner::Matrix {
                    columns: VectorSize::Quad,
                    rows: VectorSize::Quad,
                    scalar,
                } if *scalar == Scalar::F32
            ),
            UniformType::Vec4 => matches!(
                inner,
                TypeInner::Vector {
                    size: VectorSize::Quad,
                    scalar,
                } if *scalar == Scalar::F32
            ),
            UniformType::Int => {
                matches!(inner, TypeInner::Scalar(scalar) if *scalar == Scalar::I32)
            }
        }
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformType::Mat4 => f.write_str("mat4x4<f32>"),
            UniformType::Vec4 => f.write_str("vec4<f32>"),
            UniformType::Int => f.write_str("i32"),
        }
    }
}

/// Location of a vertex input in the compiled program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttributeLocation(pub u32);

/// Bind group and binding slot of a uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation {
    pub group: u32,
    pub binding: u32,
}

/// The per-vertex inputs the renderer knows how to feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    Position,
    Normal,
    SourceColour,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [
        Attribute::Position,
        Attribute::Normal,
        Attribute::SourceColour,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attribute::Position => "position",
            Attribute::Normal => "normal",
            Attribute::SourceColour => "source_colour",
        }
    }

    fn format(self) -> wgpu::VertexFormat {
        match self {
            Attribute::Position | Attribute::Normal => wgpu::VertexFormat::Float32x3,
            Attribute::SourceColour => wgpu::VertexFormat::Float32x4,
        }
    }

    fn offset(self) -> u64 {
        match self {
            Attribute::Position => Vertex::POSITION_OFFSET,
            Attribute::Normal => Vertex::NORMAL_OFFSET,
            Attribute::SourceColour => Vertex::COLOUR_OFFSET,
        }
    }
}

/// The uniforms the render loop writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Uniform {
    ProjectionMatrix,
    ViewMatrix,
    LightPosition,
    HasWireframe,
    WireframeColour,
}

impl Uniform {
    pub const ALL: [Uniform; 5] = [
        Uniform::ProjectionMatrix,
        Uniform::ViewMatrix,
        Uniform::LightPosition,
        Uniform::HasWireframe,
        Uniform::WireframeColour,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Uniform::ProjectionMatrix => "projection_matrix",
            Uniform::ViewMatrix => "view_matrix",
            Uniform::LightPosition => "light_position",
            Uniform::HasWireframe => "has_wireframe",
            Uniform::WireframeColour => "wireframe_colour",
        }
    }

    pub fn ty(self) -> UniformType {
        match self {
            Uniform::ProjectionMatrix | Uniform::ViewMatrix => UniformType::Mat4,
            Uniform::LightPosition | Uniform::WireframeColour => UniformType::Vec4,
            Uniform::HasWireframe => UniformType::Int,
        }
    }
}

/// Errors that can occur while compiling a shader program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShaderCompileError {
    #[error("{stage} shader failed to parse:\n{message}")]
    Parse { stage: Stage, message: String },
    #[error("{stage} shader failed validation: {message}")]
    Validation { stage: Stage, message: String },
    #[error("{stage} shader has no @{stage} entry point")]
    MissingEntryPoint { stage: Stage },
    #[error("{stage} shader has no `position` input")]
    MissingPosition { stage: Stage },
    #[error("uniform `{name}` must be {expected}, found {found}")]
    UniformType {
        name: &'static str,
        expected: UniformType,
        found: String,
    },
    #[error("uniform `{name}` is in group {group}; only group 0 is supported")]
    UnsupportedGroup { name: &'static str, group: u32 },
    #[error("device rejected the program: {0}")]
    Device(String),
}

/// Locations of the known vertex inputs, `None` where the program omits one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    pub position: Option<AttributeLocation>,
    pub normal: Option<AttributeLocation>,
    pub source_colour: Option<AttributeLocation>,
}

impl Attributes {
    pub fn get(&self, attribute: Attribute) -> Option<AttributeLocation> {
        match attribute {
            Attribute::Position => self.position,
            Attribute::Normal => self.normal,
            Attribute::SourceColour => self.source_colour,
        }
    }

    /// Present attributes with their locations.
    pub fn present(&self) -> impl Iterator<Item = (Attribute, AttributeLocation)> + '_ {
        Attribute::ALL
            .into_iter()
            .filter_map(|a| self.get(a).map(|location| (a, location)))
    }

    /// Vertex attribute descriptors for the present attributes only.
    ///
    /// Feeding a [`Vertex`] buffer through this layout is the equivalent of
    /// enabling exactly the attributes the program declares.
    pub fn vertex_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        self.present()
            .map(|(attribute, location)| wgpu::VertexAttribute {
                format: attribute.format(),
                offset: attribute.offset(),
                shader_location: location.0,
            })
            .collect()
    }
}

/// Locations of the known uniforms, `None` where the program omits one.
///
/// Every setter records a write into the frame when the uniform is present
/// and does nothing otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Uniforms {
    pub projection_matrix: Option<UniformLocation>,
    pub view_matrix: Option<UniformLocation>,
    pub light_position: Option<UniformLocation>,
    pub has_wireframe: Option<UniformLocation>,
    pub wireframe_colour: Option<UniformLocation>,
}

impl Uniforms {
    pub fn get(&self, uniform: Uniform) -> Option<UniformLocation> {
        match uniform {
            Uniform::ProjectionMatrix => self.projection_matrix,
            Uniform::ViewMatrix => self.view_matrix,
            Uniform::LightPosition => self.light_position,
            Uniform::HasWireframe => self.has_wireframe,
            Uniform::WireframeColour => self.wireframe_colour,
        }
    }

    fn slot(&mut self, uniform: Uniform) -> &mut Option<UniformLocation> {
        match uniform {
            Uniform::ProjectionMatrix => &mut self.projection_matrix,
            Uniform::ViewMatrix => &mut self.view_matrix,
            Uniform::LightPosition => &mut self.light_position,
            Uniform::HasWireframe => &mut self.has_wireframe,
            Uniform::WireframeColour => &mut self.wireframe_colour,
        }
    }

    /// Present uniforms with their locations.
    pub fn present(&self) -> impl Iterator<Item = (Uniform, UniformLocation)> + '_ {
        Uniform::ALL
            .into_iter()
            .filter_map(|u| self.get(u).map(|location| (u, location)))
    }

    fn set<Buf>(&self, frame: &mut RecordedFrame<'_, Buf>, uniform: Uniform, value: UniformValue) {
        if let Some(location) = self.get(uniform) {
            frame.push(DrawCommand::SetUniform { location, value });
        }
    }

    pub fn set_projection_matrix<Buf>(&self, frame: &mut RecordedFrame<'_, Buf>, matrix: Mat4) {
        self.set(frame, Uniform::ProjectionMatrix, UniformValue::Mat4(matrix));
    }

    pub fn set_view_matrix<Buf>(&self, frame: &mut RecordedFrame<'_, Buf>, matrix: Mat4) {
        self.set(frame, Uniform::ViewMatrix, UniformValue::Mat4(matrix));
    }

    /// Light position in view space, `w = 1`.
    pub fn set_light_position<Buf>(&self, frame: &mut RecordedFrame<'_, Buf>, position: Vec4) {
        self.set(frame, Uniform::LightPosition, UniformValue::Vec4(position));
    }

    pub fn set_has_wireframe<Buf>(&self, frame: &mut RecordedFrame<'_, Buf>, enabled: bool) {
        self.set(frame, Uniform::HasWireframe, UniformValue::Int(enabled as i32));
    }

    pub fn set_wireframe_colour<Buf>(&self, frame: &mut RecordedFrame<'_, Buf>, colour: Color) {
        self.set(frame, Uniform::WireframeColour, UniformValue::Vec4(colour.into()));
    }
}

/// One parsed, validated stage.
#[derive(Debug)]
struct StageModule {
    source: String,
    module: naga::Module,
    entry_point: String,
}

impl StageModule {
    fn compile(stage: Stage, source: &str) -> Result<Self, ShaderCompileError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderCompileError::Parse {
            stage,
            message: e.emit_to_string(source),
        })?;

        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| ShaderCompileError::Validation {
            stage,
            message: e.into_inner().to_string(),
        })?;

        let entry_point = module
            .entry_points
            .iter()
            .find(|ep| ep.stage == stage.naga())
            .map(|ep| ep.name.clone())
            .ok_or(ShaderCompileError::MissingEntryPoint { stage })?;

        Ok(Self {
            source: source.to_owned(),
            module,
            entry_point,
        })
    }

    fn entry(&self) -> Option<&naga::EntryPoint> {
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.name == self.entry_point)
    }

    /// `@location` inputs of the entry point, flattening struct arguments.
    fn inputs(&self) -> Vec<(&str, u32)> {
        let mut inputs = Vec::new();
        let Some(entry) = self.entry() else {
            return inputs;
        };

        for arg in &entry.function.arguments {
            match (&arg.binding, &self.module.types[arg.ty].inner) {
                (Some(naga::Binding::Location { location, .. }), _) => {
                    if let Some(name) = &arg.name {
                        inputs.push((name.as_str(), *location));
                    }
                }
                (None, naga::TypeInner::Struct { members, .. }) => {
                    for member in members {
                        if let (Some(name), Some(naga::Binding::Location { location, .. })) =
                            (&member.name, &member.binding)
                        {
                            inputs.push((name.as_str(), *location));
                        }
                    }
                }
                _ => {}
            }
        }

        inputs
    }

    fn uniform(&self, name: &str) -> Option<(UniformLocation, &naga::TypeInner)> {
        self.module.global_variables.iter().find_map(|(_, var)| {
            if var.space != naga::AddressSpace::Uniform || var.name.as_deref() != Some(name) {
                return None;
            }
            let binding = var.binding.as_ref()?;
            Some((
                UniformLocation {
                    group: binding.group,
                    binding: binding.binding,
                },
                &self.module.types[var.ty].inner,
            ))
        })
    }
}

/// A compiled vertex/fragment pair and the capabilities it declares.
#[derive(Debug)]
pub struct ShaderProgram {
    vertex: StageModule,
    fragment: StageModule,
    attributes: Attributes,
    uniforms: Uniforms,
}

impl ShaderProgram {
    /// Parses and validates both stages, then probes the known attributes and
    /// uniforms.
    ///
    /// # Errors
    ///
    /// Any parse or validation diagnostic, a missing entry point, a vertex
    /// stage without `position`, or a known uniform declared with the wrong
    /// type or outside group 0.
    pub fn compile(vertex_source: &str, fragment_source: &str) -> Result<Self, ShaderCompileError> {
        let vertex = StageModule::compile(Stage::Vertex, vertex_source)?;
        let fragment = StageModule::compile(Stage::Fragment, fragment_source)?;

        let mut program = Self {
            vertex,
            fragment,
            attributes: Attributes::default(),
            uniforms: Uniforms::default(),
        };

        program.attributes = Attributes {
            position: program.probe_attribute(Attribute::Position.name()),
            normal: program.probe_attribute(Attribute::Normal.name()),
            source_colour: program.probe_attribute(Attribute::SourceColour.name()),
        };
        if program.attributes.position.is_none() {
            return Err(ShaderCompileError::MissingPosition {
                stage: Stage::Vertex,
            });
        }

        for uniform in Uniform::ALL {
            let Some((location, inner)) = program.find_uniform(uniform.name()) else {
                continue;
            };
            if !uniform.ty().matches(inner) {
                return Err(ShaderCompileError::UniformType {
                    name: uniform.name(),
                    expected: uniform.ty(),
                    found: format!("{inner:?}"),
                });
            }
            if location.group != 0 {
                return Err(ShaderCompileError::UnsupportedGroup {
                    name: uniform.name(),
                    group: location.group,
                });
            }
            *program.uniforms.slot(uniform) = Some(location);
        }

        log::debug!(
            "Compiled shader program: {} attributes, {} uniforms",
            program.attributes.present().count(),
            program.uniforms.present().count()
        );

        Ok(program)
    }

    /// Location of the named vertex input, `None` if the program omits it.
    pub fn probe_attribute(&self, name: &str) -> Option<AttributeLocation> {
        self.vertex
            .inputs()
            .into_iter()
            .find(|(input, _)| *input == name)
            .map(|(_, location)| AttributeLocation(location))
    }

    /// Location of the named uniform in either stage, `None` if absent.
    pub fn probe_uniform(&self, name: &str) -> Option<UniformLocation> {
        self.find_uniform(name).map(|(location, _)| location)
    }

    fn find_uniform(&self, name: &str) -> Option<(UniformLocation, &naga::TypeInner)> {
        self.vertex
            .uniform(name)
            .or_else(|| self.fragment.uniform(name))
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex.source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment.source
    }

    pub fn vertex_entry_point(&self) -> &str {
        &self.vertex.entry_point
    }

    pub fn fragment_entry_point(&self) -> &str {
        &self.fragment.entry_point
    }

    /// One-line summary for status displays.
    pub fn describe(&self) -> String {
        let attributes: Vec<&str> = self.attributes.present().map(|(a, _)| a.name()).collect();
        let uniforms: Vec<&str> = self.uniforms.present().map(|(u, _)| u.name()).collect();
        format!(
            "WGSL program ready; attributes: {}; uniforms: {}",
            attributes.join(", "),
            uniforms.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DEFAULT_FRAME_TIME;

    fn default_program() -> ShaderProgram {
        ShaderProgram::compile(shaders::DEFAULT_VERTEX, shaders::DEFAULT_FRAGMENT).unwrap()
    }

    fn minimal_program() -> ShaderProgram {
        ShaderProgram::compile(shaders::MINIMAL_VERTEX, shaders::DEFAULT_FRAGMENT).unwrap()
    }

    #[test]
    fn default_program_declares_everything() {
        let program = default_program();

        assert_eq!(program.attributes().position, Some(AttributeLocation(0)));
        assert_eq!(program.attributes().normal, Some(AttributeLocation(1)));
        assert_eq!(program.attributes().source_colour, Some(AttributeLocation(2)));
        assert_eq!(program.uniforms().present().count(), 5);
        assert_eq!(
            program.uniforms().has_wireframe,
            Some(UniformLocation {
                group: 0,
                binding: 3
            })
        );
        assert_eq!(program.vertex_entry_point(), "vs_main");
        assert_eq!(program.fragment_entry_point(), "fs_main");
    }

    #[test]
    fn minimal_program_omits_lighting_and_outline() {
        let program = minimal_program();

        assert!(program.attributes().normal.is_none());
        assert!(program.uniforms().light_position.is_none());
        assert!(program.uniforms().has_wireframe.is_none());
        assert!(program.uniforms().wireframe_colour.is_none());
        assert!(program.uniforms().projection_matrix.is_some());
        assert!(program.probe_uniform("lightPosition").is_none());
    }

    #[test]
    fn absent_uniform_setters_record_nothing() {
        let program = minimal_program();
        let mut frame: RecordedFrame<'_, ()> = RecordedFrame::new(DEFAULT_FRAME_TIME);

        program.uniforms().set_light_position(&mut frame, Vec4::new(10.0, 10.0, 5.0, 1.0));
        program.uniforms().set_has_wireframe(&mut frame, true);
        program.uniforms().set_wireframe_colour(&mut frame, Color::WHITE);
        assert!(frame.is_empty());

        program.uniforms().set_view_matrix(&mut frame, Mat4::IDENTITY);
        assert_eq!(frame.commands().len(), 1);
    }

    #[test]
    fn layout_covers_present_attributes_only() {
        let attributes = minimal_program().attributes().vertex_attributes();

        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 24);
        assert_eq!(attributes[1].format, wgpu::VertexFormat::Float32x4);
    }

    #[test]
    fn parse_error_names_stage() {
        let err = ShaderProgram::compile("fn vs_main( {", shaders::DEFAULT_FRAGMENT).unwrap_err();
        assert!(matches!(
            err,
            ShaderCompileError::Parse {
                stage: Stage::Vertex,
                ..
            }
        ));

        let err = ShaderProgram::compile(shaders::DEFAULT_VERTEX, "not wgsl").unwrap_err();
        assert!(matches!(
            err,
            ShaderCompileError::Parse {
                stage: Stage::Fragment,
                ..
            }
        ));
    }

    #[test]
    fn missing_entry_point_is_rejected() {
        let err = ShaderProgram::compile(shaders::DEFAULT_FRAGMENT, shaders::DEFAULT_FRAGMENT)
            .unwrap_err();
        assert_eq!(
            err,
            ShaderCompileError::MissingEntryPoint {
                stage: Stage::Vertex
            }
        );
    }

    #[test]
    fn mistyped_uniform_is_rejected() {
        let vertex = "
            @group(0) @binding(0) var<uniform> has_wireframe: f32;

            @vertex
            fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position * has_wireframe, 1.0);
            }
        ";
        let fragment = "
            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return vec4<f32>(1.0);
            }
        ";

        let err = ShaderProgram::compile(vertex, fragment).unwrap_err();
        assert!(matches!(
            err,
            ShaderCompileError::UniformType {
                name: "has_wireframe",
                expected: UniformType::Int,
                ..
            }
        ));
    }

    #[test]
    fn struct_inputs_are_probed() {
        let vertex = "
            struct VertexInput {
                @location(3) position: vec3<f32>,
                @location(5) source_colour: vec4<f32>,
            }

            @vertex
            fn vs_main(input: VertexInput) -> @builtin(position) vec4<f32> {
                return vec4<f32>(input.position, input.source_colour.a);
            }
        ";
        let fragment = "
            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return vec4<f32>(1.0);
            }
        ";

        let program = ShaderProgram::compile(vertex, fragment).unwrap();
        assert_eq!(program.probe_attribute("position"), Some(AttributeLocation(3)));
        assert_eq!(program.probe_attribute("source_colour"), Some(AttributeLocation(5)));
        assert_eq!(program.probe_attribute("normal"), None);
        assert_eq!(program.uniforms().present().count(), 0);
    }

    #[test]
    fn position_is_required() {
        let vertex = "
            @vertex
            fn vs_main(@location(0) normal: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(normal, 1.0);
            }
        ";
        let err = ShaderProgram::compile(vertex, shaders::DEFAULT_FRAGMENT).unwrap_err();
        assert_eq!(
            err,
            ShaderCompileError::MissingPosition {
                stage: Stage::Vertex
            }
        );
    }
}
