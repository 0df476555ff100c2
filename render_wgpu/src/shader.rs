use yuv_frame::YuvFormat;

/// Texture channel a chroma component is read from. Binding 1 holds the U
/// plane for I420 or the interleaved chroma for NV12/NV21; binding 2 holds the
/// V plane and aliases binding 1 for semi-planar input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChromaChannel {
    FirstR,
    FirstG,
    SecondR,
}

impl ChromaChannel {
    fn wgsl(self) -> &'static str {
        match self {
            ChromaChannel::FirstR => "first.r",
            ChromaChannel::FirstG => "first.g",
            ChromaChannel::SecondR => "second.r",
        }
    }
}

/// `[Cb, Cr]` sources per format; the shader switch is generated from this.
pub(crate) fn chroma_channels(format: YuvFormat) -> [ChromaChannel; 2] {
    match format {
        YuvFormat::I420 => [ChromaChannel::FirstR, ChromaChannel::SecondR],
        YuvFormat::Nv12 => [ChromaChannel::FirstR, ChromaChannel::FirstG],
        YuvFormat::Nv21 => [ChromaChannel::FirstG, ChromaChannel::FirstR],
    }
}

fn chroma_switch() -> String {
    let assign = |format: YuvFormat| {
        let [cb, cr] = chroma_channels(format);
        format!("            chroma = vec2<f32>({}, {});\n", cb.wgsl(), cr.wgsl())
    };
    let mut out = String::from("    switch params.format {\n");
    for format in [YuvFormat::Nv12, YuvFormat::Nv21] {
        out.push_str(&format!("        case {}u: {{\n", format.shader_tag()));
        out.push_str(&assign(format));
        out.push_str("        }\n");
    }
    out.push_str("        default: {\n");
    out.push_str(&assign(YuvFormat::I420));
    out.push_str("        }\n    }\n");
    out
}

const YUV_PRELUDE: &str = r#"
struct Params {
    mvp: mat4x4<f32>,
    format: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@group(0) @binding(0)
var t_y: texture_2d<f32>;
@group(0) @binding(1)
var t_u: texture_2d<f32>;
@group(0) @binding(2)
var t_v: texture_2d<f32>;
@group(0) @binding(3)
var s_tex: sampler;
@group(0) @binding(4)
var<uniform> params: Params;

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.position = params.mvp * vec4<f32>(position, 0.0, 1.0);
    out.uv = uv;
    return out;
}

fn yuv_to_rgb(y: f32, cb: f32, cr: f32) -> vec3<f32> {
    let u = cb - 0.5;
    let v = cr - 0.5;
    let r = y + 1.402 * v;
    let g = y - 0.344 * u - 0.714 * v;
    let b = y + 1.772 * u;
    return clamp(vec3<f32>(r, g, b), vec3<f32>(0.0), vec3<f32>(1.0));
}

fn sample_rgb(uv: vec2<f32>) -> vec3<f32> {
    let y = textureSample(t_y, s_tex, uv).r;
    let first = textureSample(t_u, s_tex, uv);
    let second = textureSample(t_v, s_tex, uv);
    // x = Cb, y = Cr
    var chroma: vec2<f32>;
"#;

const YUV_EPILOGUE: &str = r#"    return yuv_to_rgb(y, chroma.x, chroma.y);
}
"#;

const YUV_FRAGMENT: &str = r#"
@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return vec4<f32>(sample_rgb(in.uv), 1.0);
}
"#;

const YUV_FRAGMENT_SRGB: &str = r#"
fn srgb_to_linear(c: vec3<f32>) -> vec3<f32> {
    let cutoff = vec3<f32>(0.04045);
    let low = c / 12.92;
    let high = pow((c + vec3<f32>(0.055)) / 1.055, vec3<f32>(2.4));
    return select(high, low, c <= cutoff);
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return vec4<f32>(srgb_to_linear(sample_rgb(in.uv)), 1.0);
}
"#;

/// Shader source for a surface; sRGB targets get values linearised first so
/// the hardware encode restores the camera's gamma.
pub fn yuv_shader_source(srgb_target: bool) -> String {
    let fragment = if srgb_target {
        YUV_FRAGMENT_SRGB
    } else {
        YUV_FRAGMENT
    };
    format!("{YUV_PRELUDE}{}{YUV_EPILOGUE}{fragment}", chroma_switch())
}

/// Flat-colour line shader for face boxes, positions already in clip space.
pub const OVERLAY_SHADER: &str = r#"
struct VertexOut {
    @builtin(position) position: vec4<f32>,
}

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.position = vec4<f32>(position, 0.0, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return vec4<f32>(0.1, 0.9, 0.3, 1.0);
}
"#;

/// Byte size of the `Params` uniform.
pub const PARAMS_SIZE: u64 = 80;

pub fn params_bytes(mvp: [[f32; 4]; 4], format_tag: u32) -> [u8; PARAMS_SIZE as usize] {
    let mut bytes = [0u8; PARAMS_SIZE as usize];
    let mut offset = 0;
    for col in mvp {
        for value in col {
            bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
            offset += 4;
        }
    }
    bytes[offset..offset + 4].copy_from_slice(&format_tag.to_le_bytes());
    bytes
}
