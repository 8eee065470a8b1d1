//! # Mesh — Vertex Format, GPU Geometry, and Built-In Shapes
//!
//! [`MeshVertex`] carries position, normal, UV, and a tangent for normal
//! mapping. The tangent is derived from UV-space edge vectors at load time
//! via [`compute_tangents`] — asset loaders hand us positions/normals/UVs
//! and we fill the fourth attribute in.
//!
//! [`GeometryBuffer`] owns one vertex buffer and an optional index buffer.
//! Static meshes upload once; the overlay renderers reuse the same type
//! with [`GeometryBuffer::update_vertices`] for their per-call quads.
//!
//! The shape generators at the bottom produce the renderer's service
//! geometry: the fullscreen quad for the assembly pass and the octahedron
//! gizmo for light debugging. Winding is CCW viewed from the front face.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Per-vertex data: position, surface normal, texture UV, and tangent.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 3],
}

impl MeshVertex {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position: vec3<f32>
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal: vec3<f32>
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv: vec2<f32>
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
            // tangent: vec3<f32>
            wgpu::VertexAttribute {
                offset: 32,
                shader_location: 3,
                format: wgpu::VertexFormat::Float32x3,
            },
        ],
    };
}

/// Derive per-vertex tangents from UV-space edge vectors.
///
/// For each triangle, solves the two edge equations for the direction in
/// which U increases across the surface, accumulates it on the triangle's
/// vertices, then normalizes. Degenerate UV mappings (zero-area in UV
/// space) contribute nothing and fall back to +X.
pub fn compute_tangents(vertices: &mut [MeshVertex], indices: &[u32]) {
    let mut accum = vec![glam::Vec3::ZERO; vertices.len()];

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let p0 = glam::Vec3::from_array(vertices[i0].position);
        let p1 = glam::Vec3::from_array(vertices[i1].position);
        let p2 = glam::Vec3::from_array(vertices[i2].position);
        let uv0 = glam::Vec2::from_array(vertices[i0].uv);
        let uv1 = glam::Vec2::from_array(vertices[i1].uv);
        let uv2 = glam::Vec2::from_array(vertices[i2].uv);

        let edge1 = p1 - p0;
        let edge2 = p2 - p0;
        let duv1 = uv1 - uv0;
        let duv2 = uv2 - uv0;

        let det = duv1.x * duv2.y - duv2.x * duv1.y;
        if det.abs() < 1e-8 {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;

        accum[i0] += tangent;
        accum[i1] += tangent;
        accum[i2] += tangent;
    }

    for (vertex, tangent) in vertices.iter_mut().zip(accum) {
        vertex.tangent = tangent.try_normalize().unwrap_or(glam::Vec3::X).to_array();
    }
}

/// A GPU-resident vertex/index buffer pair for one mesh.
///
/// The buffers are exclusively owned; dropping the `GeometryBuffer` releases
/// them. Share across draw batches with `Arc`.
pub struct GeometryBuffer {
    vertex_buffer: wgpu::Buffer,
    index_buffer: Option<wgpu::Buffer>,
    vertex_count: u32,
    index_count: u32,
    vertex_capacity: u32,
}

impl GeometryBuffer {
    /// Upload a non-indexed mesh.
    pub fn new(device: &wgpu::Device, label: &str, vertices: &[MeshVertex]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            vertex_buffer,
            index_buffer: None,
            vertex_count: vertices.len() as u32,
            index_count: 0,
            vertex_capacity: vertices.len() as u32,
        }
    }

    /// Upload an indexed mesh.
    pub fn with_indices(
        device: &wgpu::Device,
        label: &str,
        vertices: &[MeshVertex],
        indices: &[u32],
    ) -> Self {
        let mut buffer = Self::new(device, label, vertices);
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        buffer.index_buffer = Some(index_buffer);
        buffer.index_count = indices.len() as u32;
        buffer
    }

    /// Allocate an empty dynamic buffer for `vertex_capacity` vertices
    /// (overlay quads that change every call).
    pub fn dynamic(device: &wgpu::Device, label: &str, vertex_capacity: u32) -> Self {
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: vertex_capacity as u64 * std::mem::size_of::<MeshVertex>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            vertex_buffer,
            index_buffer: None,
            vertex_count: 0,
            index_count: 0,
            vertex_capacity,
        }
    }

    /// Overwrite the vertex contents. Truncates to capacity (logged), never
    /// reallocates — resizing a dynamic buffer is the caller's decision.
    pub fn update_vertices(&mut self, queue: &wgpu::Queue, vertices: &[MeshVertex]) {
        let count = if vertices.len() as u32 > self.vertex_capacity {
            log::warn!(
                "Dynamic geometry overflow: {} vertices into capacity {}",
                vertices.len(),
                self.vertex_capacity
            );
            self.vertex_capacity as usize
        } else {
            vertices.len()
        };
        queue.write_buffer(
            &self.vertex_buffer,
            0,
            bytemuck::cast_slice(&vertices[..count]),
        );
        self.vertex_count = count as u32;
    }

    /// Bind the buffers and issue one draw on the given pass.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        match &self.index_buffer {
            Some(indices) => {
                pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..self.index_count, 0, 0..1);
            }
            None => {
                pass.draw(0..self.vertex_count, 0..1);
            }
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

// ── Built-in shapes ─────────────────────────────────────────────────────────

/// Fullscreen quad in NDC, used by the assembly pass to resolve the HDR
/// target onto the swapchain.
pub fn fullscreen_quad() -> (Vec<MeshVertex>, Vec<u32>) {
    let positions = [
        [-1.0, -1.0],
        [1.0, -1.0],
        [1.0, 1.0],
        [-1.0, 1.0],
    ];
    // V flipped: NDC y is up, texture v is down.
    let uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

    let vertices = positions
        .iter()
        .zip(uvs.iter())
        .map(|(p, uv)| MeshVertex {
            position: [p[0], p[1], 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: *uv,
            tangent: [1.0, 0.0, 0.0],
        })
        .collect();
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

/// Unit octahedron centered at the origin — the light-debug gizmo. Flat
/// enough to read as a point marker, cheap enough to draw per light.
pub fn octahedron() -> (Vec<MeshVertex>, Vec<u32>) {
    let tips: [[f32; 3]; 6] = [
        [1.0, 0.0, 0.0],
        [-1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, 0.0, -1.0],
    ];
    let vertices: Vec<MeshVertex> = tips
        .iter()
        .map(|p| MeshVertex {
            position: *p,
            // Position doubles as outward normal on a unit octahedron tip.
            normal: *p,
            uv: [0.5, 0.5],
            tangent: [1.0, 0.0, 0.0],
        })
        .collect();

    // 8 faces, one per octant, CCW from outside.
    let indices = vec![
        2, 4, 0, // +y +z +x
        2, 0, 5, // +y -z +x
        2, 1, 4, // +y +z -x
        2, 5, 1, // +y -z -x
        3, 0, 4, // -y +z +x
        3, 5, 0, // -y -z +x
        3, 4, 1, // -y +z -x
        3, 1, 5, // -y -z -x
    ];
    (vertices, indices)
}

/// Unit cube centered at the origin, 4 vertices per face for hard normals.
/// Tangents follow each face's U direction.
pub fn cube() -> (Vec<MeshVertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    // (normal, u_dir, v_dir) per face
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    for (normal, u_dir, v_dir) in &faces {
        let base = vertices.len() as u32;
        let n = glam::Vec3::from_array(*normal);
        let u = glam::Vec3::from_array(*u_dir);
        let v = glam::Vec3::from_array(*v_dir);
        let center = n * 0.5;

        let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
        let uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

        for ((cu, cv), uv) in corners.iter().zip(uvs.iter()) {
            let position = center + u * *cu + v * *cv;
            vertices.push(MeshVertex {
                position: position.to_array(),
                normal: *normal,
                uv: *uv,
                tangent: *u_dir,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length(v: [f32; 3]) -> f32 {
        (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
    }

    #[test]
    fn vertex_stride_matches_layout() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 44);
        assert_eq!(MeshVertex::LAYOUT.array_stride, 44);
    }

    #[test]
    fn quad_tangent_follows_u_axis() {
        let (mut vertices, indices) = fullscreen_quad();
        compute_tangents(&mut vertices, &indices);
        for v in &vertices {
            // U increases along +X, so the derived tangent must be +X.
            assert!((v.tangent[0] - 1.0).abs() < 1e-5, "tangent {:?}", v.tangent);
            assert!(v.tangent[1].abs() < 1e-5);
        }
    }

    #[test]
    fn degenerate_uvs_fall_back_to_x() {
        let (mut vertices, indices) = fullscreen_quad();
        for v in &mut vertices {
            v.uv = [0.25, 0.25];
        }
        compute_tangents(&mut vertices, &indices);
        for v in &vertices {
            assert_eq!(v.tangent, [1.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn octahedron_has_correct_counts() {
        let (vertices, indices) = octahedron();
        assert_eq!(vertices.len(), 6);
        assert_eq!(indices.len(), 24, "8 faces, 3 indices each");
    }

    #[test]
    fn octahedron_indices_in_range() {
        let (vertices, indices) = octahedron();
        for &i in &indices {
            assert!((i as usize) < vertices.len());
        }
    }

    #[test]
    fn octahedron_faces_wind_outward() {
        let (vertices, indices) = octahedron();
        for tri in indices.chunks_exact(3) {
            let p0 = glam::Vec3::from_array(vertices[tri[0] as usize].position);
            let p1 = glam::Vec3::from_array(vertices[tri[1] as usize].position);
            let p2 = glam::Vec3::from_array(vertices[tri[2] as usize].position);
            let face_normal = (p1 - p0).cross(p2 - p0);
            let centroid = (p0 + p1 + p2) / 3.0;
            assert!(
                face_normal.dot(centroid) > 0.0,
                "face {:?} winds inward",
                tri
            );
        }
    }

    #[test]
    fn cube_has_correct_counts() {
        let (vertices, indices) = cube();
        assert_eq!(vertices.len(), 24, "4 per face for hard normals");
        assert_eq!(indices.len(), 36);
    }

    #[test]
    fn cube_normals_are_unit_length() {
        let (vertices, _) = cube();
        for v in &vertices {
            assert!((length(v.normal) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn cube_tangents_are_perpendicular_to_normals() {
        let (vertices, _) = cube();
        for v in &vertices {
            let dot = v.normal[0] * v.tangent[0]
                + v.normal[1] * v.tangent[1]
                + v.normal[2] * v.tangent[2];
            assert!(dot.abs() < 1e-6);
        }
    }
}
