//! Animations shipped with the bridge, wired to the wgpu backend.

use super::{AnimationDescriptor, AnimationId, AnimationRegistry, AnimationState};
use super::{OrbitProgram, TriangleProgram};
use crate::device::GpuFrame;
use crate::error::{BridgeError, Result};
use crate::session::{SessionBackend, WgpuBackend, WgpuProgram};

pub const ROTATING_TRIANGLE: AnimationId = AnimationId(0);
pub const ORBIT: AnimationId = AnimationId(1);

impl AnimationRegistry<WgpuBackend> {
    /// Registry holding every built-in animation.
    pub fn builtin() -> Self {
        AnimationRegistry::new()
            .with(AnimationDescriptor {
                id: ROTATING_TRIANGLE,
                name: "rotating-triangle",
                step: 0.005,
                build: build_triangle,
                encode: encode_triangle,
            })
            .with(AnimationDescriptor {
                id: ORBIT,
                name: "menger-orbit",
                step: 0.012,
                build: build_orbit,
                encode: encode_orbit,
            })
    }
}

fn build_triangle(backend: &WgpuBackend) -> Result<WgpuProgram> {
    let program = TriangleProgram::new(backend.gpu().device(), backend.surface_format());
    Ok(WgpuProgram::Triangle(program))
}

fn encode_triangle(
    backend: &WgpuBackend,
    program: &mut WgpuProgram,
    state: &AnimationState,
    frame: &mut GpuFrame,
) -> Result<()> {
    let WgpuProgram::Triangle(program) = program else {
        return Err(mismatch("rotating-triangle", program));
    };
    program.encode(backend.gpu().queue(), state, backend.size(), frame);
    Ok(())
}

fn build_orbit(backend: &WgpuBackend) -> Result<WgpuProgram> {
    let program = OrbitProgram::new(backend.gpu().device(), backend.surface_format());
    Ok(WgpuProgram::Orbit(program))
}

fn encode_orbit(
    backend: &WgpuBackend,
    program: &mut WgpuProgram,
    state: &AnimationState,
    frame: &mut GpuFrame,
) -> Result<()> {
    let WgpuProgram::Orbit(program) = program else {
        return Err(mismatch("menger-orbit", program));
    };
    program.encode(backend.gpu().queue(), state, backend.size(), frame);
    Ok(())
}

fn mismatch(expected: &str, found: &WgpuProgram) -> BridgeError {
    BridgeError::Encode(format!(
        "{expected} cannot encode with a {} program",
        found.kind()
    ))
}
