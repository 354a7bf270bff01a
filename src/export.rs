//! Mesh export to interchange formats
//!
//! Hand-rolled writers for the formats downstream tooling expects: ASCII
//! and binary STL, Wavefront OBJ and ASCII PLY. STL facet normals are
//! computed from the winding; degenerate triangles fall back to +Z.

use crate::error::{Error, Result};
use crate::model::{Mesh, Triangle, Vertex};
use std::io::Write;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// ASCII STL
    StlAscii,
    /// Binary STL
    StlBinary,
    /// Wavefront OBJ
    Obj,
    /// ASCII PLY
    Ply,
}

impl ExportFormat {
    /// Look up a format by its CLI name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stl" => Some(ExportFormat::StlAscii),
            "stlb" => Some(ExportFormat::StlBinary),
            "obj" => Some(ExportFormat::Obj),
            "ply" => Some(ExportFormat::Ply),
            _ => None,
        }
    }

    /// File extension for the format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::StlAscii | ExportFormat::StlBinary => "stl",
            ExportFormat::Obj => "obj",
            ExportFormat::Ply => "ply",
        }
    }
}

/// Write a mesh in the requested format
///
/// Fails with [`Error::InvalidMesh`] when a triangle references a vertex
/// past the end of the vertex array.
pub fn write_mesh<W: Write>(mesh: &Mesh, format: ExportFormat, writer: &mut W) -> Result<()> {
    validate(mesh)?;
    match format {
        ExportFormat::StlAscii => write_stl_ascii(mesh, writer),
        ExportFormat::StlBinary => write_stl_binary(mesh, writer),
        ExportFormat::Obj => write_obj(mesh, writer),
        ExportFormat::Ply => write_ply(mesh, writer),
    }
}

fn validate(mesh: &Mesh) -> Result<()> {
    let vertex_count = mesh.vertices.len();
    for (ordinal, triangle) in mesh.triangles.iter().enumerate() {
        for index in triangle.indices() {
            if index as usize >= vertex_count {
                return Err(Error::InvalidMesh(format!(
                    "triangle {} references vertex {} but only {} exist",
                    ordinal, index, vertex_count
                )));
            }
        }
    }
    Ok(())
}

fn corners<'a>(mesh: &'a Mesh, triangle: &Triangle) -> (&'a Vertex, &'a Vertex, &'a Vertex) {
    (
        &mesh.vertices[triangle.v1 as usize],
        &mesh.vertices[triangle.v2 as usize],
        &mesh.vertices[triangle.v3 as usize],
    )
}

/// Unit normal of a triangle from its winding, +Z for degenerate ones
fn facet_normal(a: &Vertex, b: &Vertex, c: &Vertex) -> [f32; 3] {
    let edge1 = [b.x - a.x, b.y - a.y, b.z - a.z];
    let edge2 = [c.x - a.x, c.y - a.y, c.z - a.z];
    let normal = [
        edge1[1] * edge2[2] - edge1[2] * edge2[1],
        edge1[2] * edge2[0] - edge1[0] * edge2[2],
        edge1[0] * edge2[1] - edge1[1] * edge2[0],
    ];
    let length = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
    if length > 0.0 {
        [normal[0] / length, normal[1] / length, normal[2] / length]
    } else {
        [0.0, 0.0, 1.0]
    }
}

fn write_stl_ascii<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<()> {
    writeln!(writer, "solid dcm_mesh")?;
    for triangle in &mesh.triangles {
        let (a, b, c) = corners(mesh, triangle);
        let normal = facet_normal(a, b, c);
        writeln!(
            writer,
            "  facet normal {:e} {:e} {:e}",
            normal[0], normal[1], normal[2]
        )?;
        writeln!(writer, "    outer loop")?;
        for vertex in [a, b, c] {
            writeln!(writer, "      vertex {:e} {:e} {:e}", vertex.x, vertex.y, vertex.z)?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid dcm_mesh")?;
    Ok(())
}

fn write_stl_binary<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<()> {
    let mut header = [0u8; 80];
    let tag = b"libdcm binary stl";
    header[..tag.len()].copy_from_slice(tag);
    writer.write_all(&header)?;
    writer.write_all(&(mesh.triangles.len() as u32).to_le_bytes())?;

    for triangle in &mesh.triangles {
        let (a, b, c) = corners(mesh, triangle);
        let normal = facet_normal(a, b, c);
        for value in normal {
            writer.write_all(&value.to_le_bytes())?;
        }
        for vertex in [a, b, c] {
            writer.write_all(&vertex.x.to_le_bytes())?;
            writer.write_all(&vertex.y.to_le_bytes())?;
            writer.write_all(&vertex.z.to_le_bytes())?;
        }
        // attribute byte count
        writer.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}

fn write_obj<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<()> {
    writeln!(writer, "# exported by libdcm")?;
    for vertex in &mesh.vertices {
        writeln!(writer, "v {} {} {}", vertex.x, vertex.y, vertex.z)?;
    }
    for triangle in &mesh.triangles {
        // OBJ indices are 1-based
        writeln!(
            writer,
            "f {} {} {}",
            triangle.v1 + 1,
            triangle.v2 + 1,
            triangle.v3 + 1
        )?;
    }
    Ok(())
}

fn write_ply<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "comment exported by libdcm")?;
    writeln!(writer, "element vertex {}", mesh.vertices.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    writeln!(writer, "element face {}", mesh.triangles.len())?;
    writeln!(writer, "property list uchar uint vertex_indices")?;
    writeln!(writer, "end_header")?;
    for vertex in &mesh.vertices {
        writeln!(writer, "{} {} {}", vertex.x, vertex.y, vertex.z)?;
    }
    for triangle in &mesh.triangles {
        writeln!(writer, "3 {} {} {}", triangle.v1, triangle.v2, triangle.v3)?;
    }
    Ok(())
}
