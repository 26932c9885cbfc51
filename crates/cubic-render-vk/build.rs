use std::{env, fs, path::PathBuf};

// Vertex shader: per-vertex attributes on binding 0 (locations 0-3), per-instance
// on binding 1 (locations 4-6). Must match `vertex_input` in src/graph.rs.
const MESH_VERT: &str = r#"
#version 450
layout(set = 0, binding = 0) uniform FrameUniforms {
    mat4 model;
    mat4 view;
    mat4 proj;
} u;

layout(location = 0) in vec3 inPos;
layout(location = 1) in vec3 inColor;
layout(location = 2) in vec2 inUv;
layout(location = 3) in vec3 inNormal;

layout(location = 4) in vec3 instPos;
layout(location = 5) in vec3 instRot;
layout(location = 6) in float instScale;

layout(location = 0) out vec3 vColor;
layout(location = 1) out vec2 vUv;
layout(location = 2) out vec3 vNormal;

mat3 euler(vec3 r) {
    float cx = cos(r.x), sx = sin(r.x);
    float cy = cos(r.y), sy = sin(r.y);
    float cz = cos(r.z), sz = sin(r.z);
    mat3 rx = mat3(1, 0, 0,  0, cx, sx,  0, -sx, cx);
    mat3 ry = mat3(cy, 0, -sy,  0, 1, 0,  sy, 0, cy);
    mat3 rz = mat3(cz, sz, 0,  -sz, cz, 0,  0, 0, 1);
    return rz * ry * rx;
}

void main() {
    mat3 rot = euler(instRot);
    vec3 world = rot * (inPos * instScale) + instPos;
    vColor = inColor;
    vUv = inUv;
    vNormal = mat3(u.model) * rot * inNormal;
    gl_Position = u.proj * u.view * u.model * vec4(world, 1.0);
}
"#;

const MESH_FRAG: &str = r#"
#version 450
layout(set = 0, binding = 1) uniform sampler2D albedo;

layout(location = 0) in vec3 vColor;
layout(location = 1) in vec2 vUv;
layout(location = 2) in vec3 vNormal;

layout(location = 0) out vec4 outColor;

void main() {
    float ndl = max(dot(normalize(vNormal), normalize(vec3(0.4, 1.0, 0.6))), 0.0);
    vec3 base = texture(albedo, vUv).rgb * vColor;
    outColor = vec4(base * (0.25 + 0.75 * ndl), 1.0);
}
"#;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (src, kind, name) in [
        (MESH_VERT, shaderc::ShaderKind::Vertex, "mesh.vert"),
        (MESH_FRAG, shaderc::ShaderKind::Fragment, "mesh.frag"),
    ] {
        let spv = comp
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
    }

    println!("cargo:rerun-if-changed=build.rs");
}
