//! Decode orchestration
//!
//! Sequences the document reader, the vertex pipeline and the facet
//! interpreter, and folds everything either of them complains about into a
//! single diagnostics list. The entry points here never panic and never
//! fail on malformed geometry; the worst input produces an empty mesh with
//! diagnostics explaining why.

use crate::decryption;
use crate::document;
use crate::error::{Diagnostic, Error, Result};
use crate::facets;
use crate::model::{DecoderConfig, Mesh};
use crate::transport;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// A decoded mesh together with everything learned along the way
#[derive(Debug, Clone, Default)]
pub struct DecodedMesh {
    /// The recovered geometry
    pub mesh: Mesh,
    /// `version` attribute of the `<HPS>` root
    pub version: String,
    /// Schema string governing the cipher pipeline
    pub schema: String,
    /// The `SourceApp` property, when present
    pub source_app: Option<String>,
    /// Declared vertex count from the document
    pub declared_vertices: usize,
    /// Declared facet count from the document
    pub declared_triangles: usize,
    /// Whether the checksum protocol confirmed the vertex plaintext
    pub verified: bool,
    /// Position in the candidate list of the cipher key that verified
    pub selected_key: Option<usize>,
    /// Non-fatal conditions observed while decoding, in order
    pub diagnostics: Vec<Diagnostic>,
}

impl DecodedMesh {
    /// Whether every triangle references an existing vertex
    pub fn indices_in_range(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::IndexOutOfRange { .. }))
    }

    /// Whether decoding finished without recording any diagnostic
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        warn!(%diagnostic, "decode diagnostic");
        self.diagnostics.push(diagnostic);
    }
}

/// Decode a DCM document from an XML string
///
/// This is the primary entry point. It always returns a [`DecodedMesh`];
/// inspect [`DecodedMesh::diagnostics`] to learn how much of the input was
/// usable.
///
/// # Example
///
/// ```
/// use libdcm::{decode_str, DecoderConfig};
///
/// let xml = r#"<HPS version="1.0">
///   <Packed_geometry>
///     <Schema>plain</Schema>
///     <Binary_data>
///       <Facets facet_count="1">BA==</Facets>
///     </Binary_data>
///   </Packed_geometry>
/// </HPS>"#;
///
/// let decoded = decode_str(xml, &DecoderConfig::new());
/// assert_eq!(decoded.mesh.triangles.len(), 1);
/// ```
pub fn decode_str(xml: &str, config: &DecoderConfig) -> DecodedMesh {
    let mut out = DecodedMesh::default();

    let doc = match document::read_document(xml) {
        Ok(doc) => doc,
        Err(err) => {
            out.push(Diagnostic::MalformedXml(err.to_string()));
            return out;
        }
    };

    out.version = doc.version.clone();
    out.schema = doc.schema.clone();
    out.source_app = doc.property("SourceApp").map(str::to_string);
    debug!(
        version = %out.version,
        schema = %out.schema,
        source_app = out.source_app.as_deref().unwrap_or("-"),
        "document header read"
    );

    if doc.vertices.is_none() && doc.facets.is_none() {
        out.push(Diagnostic::NoGeometry);
        return out;
    }

    if let Some(payload) = &doc.vertices {
        let count = match payload.count {
            Some(count) => count,
            None => {
                out.push(Diagnostic::MissingMetadata("vertex_count".to_string()));
                0
            }
        };
        out.declared_vertices = count as usize;

        match transport::decode_payload(&payload.text) {
            Ok(raw) => match decryption::decode_vertex_buffer(
                raw,
                count,
                doc.is_encrypted(),
                payload.check_value,
                &doc.properties,
                config,
            ) {
                Ok(buffer) => {
                    out.verified = buffer.verified;
                    out.selected_key = buffer.selected_key;
                    if let (Some(expected), Some(computed)) =
                        (buffer.expected_checksum, buffer.computed_checksum)
                    {
                        if expected != computed {
                            out.push(Diagnostic::ChecksumMismatch { expected, computed });
                        }
                    }
                    out.mesh.vertices = buffer.vertices;
                }
                Err(Error::ShortBuffer { expected, actual }) => {
                    out.push(Diagnostic::ShortBuffer { expected, actual });
                }
                Err(Error::ChecksumMismatch { expected, computed }) => {
                    // strict mode: drop the unverifiable buffer entirely
                    out.push(Diagnostic::ChecksumMismatch { expected, computed });
                }
                Err(err) => {
                    out.push(Diagnostic::MalformedXml(err.to_string()));
                }
            },
            Err(err) => {
                out.push(Diagnostic::Base64Error(err.to_string()));
            }
        }
    }

    if let Some(payload) = &doc.facets {
        let count = match payload.count {
            Some(count) => count,
            None => {
                out.push(Diagnostic::MissingMetadata("facet_count".to_string()));
                0
            }
        };
        out.declared_triangles = count as usize;

        match transport::decode_payload(&payload.text) {
            Ok(raw) => {
                let output = facets::interpret(&raw, count as usize, config.legacy_restart_edge);
                out.mesh.triangles = output.triangles;
                for diagnostic in output.diagnostics {
                    out.push(diagnostic);
                }
            }
            Err(err) => {
                out.push(Diagnostic::Base64Error(err.to_string()));
            }
        }
    }

    validate_indices(&mut out);

    debug!(
        vertices = out.mesh.vertices.len(),
        triangles = out.mesh.triangles.len(),
        verified = out.verified,
        diagnostics = out.diagnostics.len(),
        "decode finished"
    );
    out
}

/// Decode a DCM document from a reader
pub fn decode_reader<R: Read>(mut reader: R, config: &DecoderConfig) -> Result<DecodedMesh> {
    let mut xml = String::new();
    reader.read_to_string(&mut xml)?;
    Ok(decode_str(&xml, config))
}

/// Decode a DCM document from a file path
pub fn decode_file<P: AsRef<Path>>(path: P, config: &DecoderConfig) -> Result<DecodedMesh> {
    decode_reader(File::open(path)?, config)
}

/// Flag triangles that reference vertices past the end of the vertex array
fn validate_indices(out: &mut DecodedMesh) {
    let vertex_count = out.mesh.vertices.len();
    let mut offenders = Vec::new();
    for (ordinal, triangle) in out.mesh.triangles.iter().enumerate() {
        for index in triangle.indices() {
            if index as usize >= vertex_count {
                offenders.push(Diagnostic::IndexOutOfRange {
                    triangle: ordinal,
                    index,
                    vertex_count,
                });
                break;
            }
        }
    }
    for diagnostic in offenders {
        out.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn vertex_b64(coords: &[[f32; 3]]) -> String {
        let mut bytes = Vec::new();
        for [x, y, z] in coords {
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
            bytes.extend_from_slice(&z.to_le_bytes());
        }
        STANDARD.encode(bytes)
    }

    fn plain_doc(vertex_count: u32, vertices_b64: &str, facet_count: u32, facets_b64: &str) -> String {
        format!(
            r#"<HPS version="1.0">
  <Packed_geometry>
    <Schema>plain</Schema>
    <Binary_data>
      <Vertices vertex_count="{vertex_count}" base64_encoded_bytes="{}">{vertices_b64}</Vertices>
      <Facets facet_count="{facet_count}" base64_encoded_bytes="{}">{facets_b64}</Facets>
    </Binary_data>
  </Packed_geometry>
</HPS>"#,
            vertices_b64.len(),
            facets_b64.len(),
        )
    }

    #[test]
    fn test_minimal_document() {
        let vertices = vertex_b64(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let facets = STANDARD.encode([0x04u8]);
        let xml = plain_doc(3, &vertices, 1, &facets);

        let decoded = decode_str(&xml, &DecoderConfig::new());
        assert!(decoded.is_clean(), "{:?}", decoded.diagnostics);
        assert_eq!(decoded.mesh.vertices.len(), 3);
        assert_eq!(decoded.mesh.vertices[1].x, 1.0);
        assert_eq!(decoded.mesh.vertices[2].y, 1.0);
        assert_eq!(decoded.mesh.triangles.len(), 1);
        assert_eq!(decoded.mesh.triangles[0].indices(), [0, 1, 2]);
        assert!(decoded.verified);
        assert!(decoded.indices_in_range());
    }

    #[test]
    fn test_malformed_xml_returns_empty_mesh() {
        let decoded = decode_str("not xml at <all", &DecoderConfig::new());
        assert!(decoded.mesh.is_empty());
        assert!(matches!(
            decoded.diagnostics[0],
            Diagnostic::MalformedXml(_)
        ));
    }

    #[test]
    fn test_no_geometry() {
        let decoded = decode_str(
            "<HPS version=\"2\"><Schema>plain</Schema></HPS>",
            &DecoderConfig::new(),
        );
        assert!(decoded.mesh.is_empty());
        assert_eq!(decoded.diagnostics, vec![Diagnostic::NoGeometry]);
        assert_eq!(decoded.version, "2");
    }

    #[test]
    fn test_bad_base64_payload() {
        let xml = plain_doc(1, "!!notbase64!!", 0, "");
        let decoded = decode_str(&xml, &DecoderConfig::new());
        assert!(decoded.mesh.vertices.is_empty());
        assert!(decoded
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::Base64Error(_))));
    }

    #[test]
    fn test_short_vertex_buffer() {
        // 2 vertices declared, bytes for 1
        let vertices = vertex_b64(&[[1.0, 2.0, 3.0]]);
        let xml = plain_doc(2, &vertices, 0, "");
        let decoded = decode_str(&xml, &DecoderConfig::new());
        assert!(decoded.mesh.vertices.is_empty());
        assert!(decoded.diagnostics.contains(&Diagnostic::ShortBuffer {
            expected: 24,
            actual: 12
        }));
    }

    #[test]
    fn test_missing_count_attributes() {
        let xml = r#"<HPS><Binary_data><Vertices>QUJD</Vertices><Facets>BA==</Facets></Binary_data></HPS>"#;
        let decoded = decode_str(xml, &DecoderConfig::new());
        assert!(decoded
            .diagnostics
            .contains(&Diagnostic::MissingMetadata("vertex_count".to_string())));
        assert!(decoded
            .diagnostics
            .contains(&Diagnostic::MissingMetadata("facet_count".to_string())));
        // zero-valued metadata: no vertices, but the facet stream still runs
        assert!(decoded.mesh.vertices.is_empty());
        assert_eq!(decoded.mesh.triangles.len(), 1);
    }

    #[test]
    fn test_out_of_range_indices_flagged() {
        // facet stream emits (0,1,2) but only one vertex is present
        let vertices = vertex_b64(&[[0.0, 0.0, 0.0]]);
        let facets = STANDARD.encode([0x04u8]);
        let xml = plain_doc(1, &vertices, 1, &facets);
        let decoded = decode_str(&xml, &DecoderConfig::new());
        assert_eq!(decoded.mesh.triangles.len(), 1);
        assert!(!decoded.indices_in_range());
        assert!(decoded.diagnostics.contains(&Diagnostic::IndexOutOfRange {
            triangle: 0,
            index: 1,
            vertex_count: 1
        }));
    }

    #[test]
    fn test_triangle_count_mismatch_is_nonfatal() {
        let vertices = vertex_b64(&[[0.0; 3], [0.0; 3], [0.0; 3]]);
        let facets = STANDARD.encode([0x04u8]);
        let xml = plain_doc(3, &vertices, 5, &facets);
        let decoded = decode_str(&xml, &DecoderConfig::new());
        assert_eq!(decoded.mesh.triangles.len(), 1);
        assert_eq!(decoded.declared_triangles, 5);
        assert!(decoded.diagnostics.contains(&Diagnostic::TriangleCountMismatch {
            expected: 5,
            actual: 1
        }));
    }
}
