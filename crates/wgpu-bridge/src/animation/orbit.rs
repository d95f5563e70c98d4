use bytemuck::{Pod, Zeroable};

use super::AnimationState;
use crate::device::{GpuFrame, SurfaceSize};

const CLEAR: wgpu::Color = wgpu::Color {
    r: 0.07,
    g: 0.06,
    b: 0.08,
    a: 1.0,
};

const START_ANGLE: f32 = 2.8;
const ORBIT_SPEED: f32 = 0.5;
const ELEVATION: f32 = 0.4;
const DISTANCE: f32 = 1.6;

/// Camera basis for the raymarch, all `vec4` to sidestep WGSL `vec3` padding.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
struct CameraUniform {
    origin: [f32; 4],
    right: [f32; 4],
    up: [f32; 4],
    forward: [f32; 4],
    /// `x`: distance to the target, `y`: elapsed time, `zw`: unused.
    params: [f32; 4],
}

impl CameraUniform {
    /// Orbits the origin at a fixed elevation, looking at the center.
    fn orbit(elapsed: f32) -> Self {
        let yaw = START_ANGLE + elapsed * ORBIT_SPEED;
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = ELEVATION.sin_cos();

        Self {
            origin: [DISTANCE * cy * cp, DISTANCE * sp, DISTANCE * sy * cp, 0.0],
            right: [sy, 0.0, -cy, 0.0],
            up: [-sp * cy, cp, -sp * sy, 0.0],
            forward: [-cy * cp, -sp, -sy * cp, 0.0],
            params: [DISTANCE, elapsed, 0.0, 0.0],
        }
    }
}

/// Largest centered square inside `size`, as `(x, y, side)`.
fn square_viewport(size: SurfaceSize) -> (f32, f32, f32) {
    let w = size.width as f32;
    let h = size.height as f32;
    let side = w.min(h);
    ((w - side) * 0.5, (h - side) * 0.5, side)
}

/// GPU objects of the orbiting Menger sponge.
pub struct OrbitProgram {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl OrbitProgram {
    pub(crate) fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("orbit shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/orbit.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("orbit bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<CameraUniform>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("orbit pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("orbit pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("orbit camera ubo"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("orbit bind group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        Self {
            pipeline,
            camera_buffer,
            bind_group,
        }
    }

    pub(crate) fn encode(
        &self,
        queue: &wgpu::Queue,
        state: &AnimationState,
        size: SurfaceSize,
        frame: &mut GpuFrame,
    ) {
        let camera = CameraUniform::orbit(state.elapsed());
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&camera));

        let mut pass = frame.clear_pass("orbit pass", CLEAR);

        let (x, y, side) = square_viewport(size);
        pass.set_viewport(x, y, side, side, 0.0, 1.0);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..6, 0..1);
    }
}
