//! Desktop OpenGL backend.
//!
//! Realizes the [`Renderer`](crate::graphics::renderer::Renderer) contract
//! with a single shader pair and streamed client-side vertex data. The
//! caller owns window and context creation and must have loaded the GL
//! function pointers (`gl::load_with`) before constructing a
//! [`GlRenderer`]; all calls assume that context is current.

use std::collections::HashMap;
use std::ffi::CString;
use std::ptr;

use gl::types::{GLenum, GLint, GLsizeiptr, GLuint};

use crate::graphics::bitmap::Bitmap;
use crate::graphics::clip_stack::ClipRect;
use crate::graphics::draw_op::BlendMode;
use crate::graphics::renderer::{GpuVertex, Renderer, TextureId};
use crate::graphics::transform::Transform;
use crate::graphics::GraphicsError;

const VERTEX_SHADER_SRC: &str = r"
#version 120
attribute vec2 a_position;
attribute vec2 a_uv;
attribute vec4 a_color;
uniform mat4 u_projection;
uniform mat4 u_transform;
varying vec2 v_uv;
varying vec4 v_color;
void main() {
    gl_Position = u_projection * u_transform * vec4(a_position, 0.0, 1.0);
    v_uv = a_uv;
    v_color = a_color;
}
";

const FRAGMENT_SHADER_SRC: &str = r"
#version 120
uniform sampler2D u_sampler;
uniform int u_textured;
varying vec2 v_uv;
varying vec4 v_color;
void main() {
    vec4 texel = u_textured != 0 ? texture2D(u_sampler, v_uv) : vec4(1.0);
    gl_FragColor = v_color * texel;
}
";

struct OffscreenTarget {
    fbo: GLuint,
    texture: GLuint,
    width: u32,
    height: u32,
}

/// OpenGL realization of the backend contract.
pub struct GlRenderer {
    program: GLuint,
    vbo: GLuint,
    a_position: GLint,
    a_uv: GLint,
    a_color: GLint,
    u_projection: GLint,
    u_transform: GLint,
    u_textured: GLint,
    frame_width: u32,
    frame_height: u32,
    bound: Option<TextureId>,
    texture_sizes: HashMap<u32, u32>,
    offscreen: Vec<OffscreenTarget>,
}

// Column-major orthographic projection mapping pixel space (origin
// top-left, y down) onto clip space.
fn ortho(width: u32, height: u32) -> [f32; 16] {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    [
        2.0 / w, 0.0, 0.0, 0.0, //
        0.0, -2.0 / h, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        -1.0, 1.0, 0.0, 1.0,
    ]
}

impl GlRenderer {
    /// Compile the shader pair and set up the streaming vertex buffer.
    pub fn new() -> Result<Self, GraphicsError> {
        let vertex = Self::compile_shader(gl::VERTEX_SHADER, VERTEX_SHADER_SRC)?;
        let fragment = Self::compile_shader(gl::FRAGMENT_SHADER, FRAGMENT_SHADER_SRC)?;

        let program = unsafe { gl::CreateProgram() };
        unsafe {
            gl::AttachShader(program, vertex);
            gl::AttachShader(program, fragment);
            gl::LinkProgram(program);
            gl::DeleteShader(vertex);
            gl::DeleteShader(fragment);
        }

        let mut status: GLint = 0;
        unsafe { gl::GetProgramiv(program, gl::LINK_STATUS, &mut status) };
        if status == 0 {
            let log = Self::program_info_log(program);
            unsafe { gl::DeleteProgram(program) };
            return Err(GraphicsError::Backend(format!("program link failed: {log}")));
        }

        let mut vbo: GLuint = 0;
        unsafe { gl::GenBuffers(1, &mut vbo) };

        let location = |name: &str| -> GLint {
            let name = CString::new(name).expect("uniform name");
            unsafe { gl::GetUniformLocation(program, name.as_ptr()) }
        };
        let attrib = |name: &str| -> GLint {
            let name = CString::new(name).expect("attribute name");
            unsafe { gl::GetAttribLocation(program, name.as_ptr()) }
        };

        let renderer = Self {
            program,
            vbo,
            a_position: attrib("a_position"),
            a_uv: attrib("a_uv"),
            a_color: attrib("a_color"),
            u_projection: location("u_projection"),
            u_transform: location("u_transform"),
            u_textured: location("u_textured"),
            frame_width: 0,
            frame_height: 0,
            bound: None,
            texture_sizes: HashMap::new(),
            offscreen: Vec::new(),
        };

        unsafe {
            gl::UseProgram(program);
            gl::Uniform1i(location("u_sampler"), 0);
            gl::Uniform1i(renderer.u_textured, 0);
            gl::Enable(gl::BLEND);
            gl::BlendFunc(gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA);
        }
        renderer.set_transform_uniform(&Transform::IDENTITY);
        Ok(renderer)
    }

    fn compile_shader(kind: GLenum, source: &str) -> Result<GLuint, GraphicsError> {
        let shader = unsafe { gl::CreateShader(kind) };
        let source = CString::new(source).expect("shader source");
        unsafe {
            gl::ShaderSource(shader, 1, &source.as_ptr(), ptr::null());
            gl::CompileShader(shader);
        }
        let mut status: GLint = 0;
        unsafe { gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status) };
        if status == 0 {
            let log = Self::shader_info_log(shader);
            unsafe { gl::DeleteShader(shader) };
            return Err(GraphicsError::Backend(format!("shader compile failed: {log}")));
        }
        Ok(shader)
    }

    fn shader_info_log(shader: GLuint) -> String {
        let mut length: GLint = 0;
        unsafe { gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut length) };
        let mut buffer = vec![0u8; length.max(1) as usize];
        unsafe {
            gl::GetShaderInfoLog(shader, length, ptr::null_mut(), buffer.as_mut_ptr().cast());
        }
        String::from_utf8_lossy(&buffer).trim_end_matches('\0').to_string()
    }

    fn program_info_log(program: GLuint) -> String {
        let mut length: GLint = 0;
        unsafe { gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut length) };
        let mut buffer = vec![0u8; length.max(1) as usize];
        unsafe {
            gl::GetProgramInfoLog(program, length, ptr::null_mut(), buffer.as_mut_ptr().cast());
        }
        String::from_utf8_lossy(&buffer).trim_end_matches('\0').to_string()
    }

    fn target_height(&self) -> u32 {
        self.offscreen.last().map_or(self.frame_height, |t| t.height)
    }

    fn set_projection(&self, width: u32, height: u32) {
        let matrix = ortho(width, height);
        unsafe {
            gl::UniformMatrix4fv(self.u_projection, 1, gl::FALSE, matrix.as_ptr());
        }
    }

    fn set_transform_uniform(&self, transform: &Transform) {
        // Row-vector matrices upload untransposed: GL reads the array
        // column-major, which is exactly the transpose the shader's
        // column-vector multiply needs.
        unsafe {
            gl::UniformMatrix4fv(self.u_transform, 1, gl::FALSE, transform.matrix.as_ptr());
        }
    }

    fn rebind(&self) {
        let id = self.bound.map_or(0, |id| id.0);
        unsafe { gl::BindTexture(gl::TEXTURE_2D, id) };
    }
}

impl Renderer for GlRenderer {
    fn create_texture(&mut self, size: u32, retro: bool) -> Result<TextureId, GraphicsError> {
        let mut id: GLuint = 0;
        unsafe {
            gl::GenTextures(1, &mut id);
        }
        if id == 0 {
            return Err(GraphicsError::TextureCreation {
                size,
                reason: "glGenTextures returned no name".into(),
            });
        }
        let filter = if retro { gl::NEAREST } else { gl::LINEAR };
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, id);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, filter as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, filter as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as GLint);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA8 as GLint,
                size as GLint,
                size as GLint,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                ptr::null(),
            );
        }
        self.texture_sizes.insert(id, size);
        self.rebind();
        Ok(TextureId(id))
    }

    fn delete_texture(&mut self, id: TextureId) {
        self.texture_sizes.remove(&id.0);
        unsafe { gl::DeleteTextures(1, &id.0) };
    }

    fn upload(&mut self, id: TextureId, x: u32, y: u32, pixels: &Bitmap) {
        let bytes = pixels.to_rgba8();
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, id.0);
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
            gl::TexSubImage2D(
                gl::TEXTURE_2D,
                0,
                x as GLint,
                y as GLint,
                pixels.width() as GLint,
                pixels.height() as GLint,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                bytes.as_ptr().cast(),
            );
        }
        self.rebind();
    }

    fn read_texture(&mut self, id: TextureId) -> Bitmap {
        let size = *self.texture_sizes.get(&id.0).expect("unknown texture page");
        let mut bytes = vec![0u8; (size * size * 4) as usize];
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, id.0);
            gl::GetTexImage(
                gl::TEXTURE_2D,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                bytes.as_mut_ptr().cast(),
            );
        }
        self.rebind();
        Bitmap::from_rgba8(size, size, &bytes).expect("texture read-back length")
    }

    fn begin_frame(&mut self, width: u32, height: u32) {
        self.frame_width = width;
        self.frame_height = height;
        unsafe {
            gl::UseProgram(self.program);
            gl::Viewport(0, 0, width as GLint, height as GLint);
            gl::Disable(gl::SCISSOR_TEST);
            gl::ClearColor(0.0, 0.0, 0.0, 1.0);
            gl::Clear(gl::COLOR_BUFFER_BIT);
        }
        self.set_projection(width, height);
        self.set_transform_uniform(&Transform::IDENTITY);
    }

    fn end_frame(&mut self) {
        unsafe { gl::Flush() };
    }

    fn bind_texture(&mut self, id: Option<TextureId>) {
        self.bound = id;
        self.rebind();
        unsafe { gl::Uniform1i(self.u_textured, id.is_some() as GLint) };
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        unsafe {
            match mode {
                BlendMode::Alpha => gl::BlendFunc(gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA),
                BlendMode::Additive => gl::BlendFunc(gl::SRC_ALPHA, gl::ONE),
                BlendMode::Multiply => gl::BlendFunc(gl::DST_COLOR, gl::ZERO),
            }
        }
    }

    fn set_clip_rect(&mut self, clip: Option<ClipRect>) {
        match clip {
            Some(rect) => unsafe {
                gl::Enable(gl::SCISSOR_TEST);
                // Scissor origin is the window's bottom-left corner.
                let flipped_y = self.target_height() as i32 - rect.bottom();
                gl::Scissor(
                    rect.x,
                    flipped_y,
                    rect.width as GLint,
                    rect.height as GLint,
                );
            },
            None => unsafe {
                gl::Disable(gl::SCISSOR_TEST);
            },
        }
    }

    fn set_transform(&mut self, transform: &Transform) {
        self.set_transform_uniform(transform);
    }

    fn draw_triangles(&mut self, vertices: &[GpuVertex]) {
        if vertices.is_empty() {
            return;
        }
        let stride = std::mem::size_of::<GpuVertex>() as GLint;
        unsafe {
            gl::BindBuffer(gl::ARRAY_BUFFER, self.vbo);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                std::mem::size_of_val(vertices) as GLsizeiptr,
                vertices.as_ptr().cast(),
                gl::STREAM_DRAW,
            );
            gl::EnableVertexAttribArray(self.a_position as GLuint);
            gl::VertexAttribPointer(
                self.a_position as GLuint,
                2,
                gl::FLOAT,
                gl::FALSE,
                stride,
                ptr::null(),
            );
            gl::EnableVertexAttribArray(self.a_uv as GLuint);
            gl::VertexAttribPointer(
                self.a_uv as GLuint,
                2,
                gl::FLOAT,
                gl::FALSE,
                stride,
                8 as *const _,
            );
            gl::EnableVertexAttribArray(self.a_color as GLuint);
            gl::VertexAttribPointer(
                self.a_color as GLuint,
                4,
                gl::UNSIGNED_BYTE,
                gl::TRUE,
                stride,
                16 as *const _,
            );
            gl::DrawArrays(gl::TRIANGLES, 0, vertices.len() as GLint);
        }
    }

    fn begin_offscreen(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        let mut fbo: GLuint = 0;
        let mut texture: GLuint = 0;
        unsafe {
            gl::GenFramebuffers(1, &mut fbo);
            gl::GenTextures(1, &mut texture);
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA8 as GLint,
                width as GLint,
                height as GLint,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                ptr::null(),
            );
            gl::BindFramebuffer(gl::FRAMEBUFFER, fbo);
            gl::FramebufferTexture2D(
                gl::FRAMEBUFFER,
                gl::COLOR_ATTACHMENT0,
                gl::TEXTURE_2D,
                texture,
                0,
            );
            let status = gl::CheckFramebufferStatus(gl::FRAMEBUFFER);
            if status != gl::FRAMEBUFFER_COMPLETE {
                gl::BindFramebuffer(gl::FRAMEBUFFER, 0);
                gl::DeleteFramebuffers(1, &fbo);
                gl::DeleteTextures(1, &texture);
                return Err(GraphicsError::Backend(format!(
                    "incomplete offscreen framebuffer: 0x{status:x}"
                )));
            }
            gl::Viewport(0, 0, width as GLint, height as GLint);
            gl::Disable(gl::SCISSOR_TEST);
            gl::ClearColor(0.0, 0.0, 0.0, 0.0);
            gl::Clear(gl::COLOR_BUFFER_BIT);
        }
        self.set_projection(width, height);
        self.rebind();
        self.offscreen.push(OffscreenTarget {
            fbo,
            texture,
            width,
            height,
        });
        Ok(())
    }

    fn end_offscreen(&mut self) -> Bitmap {
        let target = self.offscreen.pop().expect("no offscreen target to finish");
        let mut bytes = vec![0u8; (target.width * target.height * 4) as usize];
        unsafe {
            gl::ReadPixels(
                0,
                0,
                target.width as GLint,
                target.height as GLint,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                bytes.as_mut_ptr().cast(),
            );
        }

        // Read-back rows arrive bottom-up.
        let row = (target.width * 4) as usize;
        let mut flipped = Vec::with_capacity(bytes.len());
        for chunk in bytes.chunks_exact(row).rev() {
            flipped.extend_from_slice(chunk);
        }

        let (fbo, width, height) = match self.offscreen.last() {
            Some(outer) => (outer.fbo, outer.width, outer.height),
            None => (0, self.frame_width, self.frame_height),
        };
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, fbo);
            gl::Viewport(0, 0, width as GLint, height as GLint);
            gl::DeleteFramebuffers(1, &target.fbo);
            gl::DeleteTextures(1, &target.texture);
        }
        self.set_projection(width, height);

        Bitmap::from_rgba8(target.width, target.height, &flipped)
            .expect("offscreen read-back length")
    }
}

impl Drop for GlRenderer {
    fn drop(&mut self) {
        unsafe {
            gl::DeleteBuffers(1, &self.vbo);
            gl::DeleteProgram(self.program);
        }
        for target in self.offscreen.drain(..) {
            unsafe {
                gl::DeleteFramebuffers(1, &target.fbo);
                gl::DeleteTextures(1, &target.texture);
            }
        }
    }
}
