//! Core DCM types and structures

use std::collections::HashMap;

/// Schema value that marks the vertex payload as Blowfish-protected
pub const SCHEMA_ENCRYPTED: &str = "CE";

/// The document view extracted from the XML envelope
///
/// Produced once per file by the document reader and consumed read-only by
/// the vertex pipeline and the facet interpreter. No state survives across
/// files.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// `version` attribute of the `<HPS>` root element
    pub version: String,
    /// Text content of the first `<Schema>` element
    pub schema: String,
    /// `name`/`value` pairs collected from every `<Property>` element
    pub properties: HashMap<String, String>,
    /// The `<Vertices>` payload of the first `<Binary_data>` element
    pub vertices: Option<Payload>,
    /// The `<Facets>` payload of the first `<Binary_data>` element
    pub facets: Option<Payload>,
}

impl Document {
    /// Create an empty document view
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a property by name
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Whether the vertex payload goes through the cipher pipeline
    pub fn is_encrypted(&self) -> bool {
        self.schema == SCHEMA_ENCRYPTED
    }
}

/// One base64 binary payload together with its declared metadata
#[derive(Debug, Clone, Default)]
pub struct Payload {
    /// Declared element count (`vertex_count` / `facet_count`); `None` when
    /// the attribute was absent or unparseable
    pub count: Option<u32>,
    /// Declared size of the base64 text (`base64_encoded_bytes`)
    pub encoded_bytes: u32,
    /// Expected byte-swapped Adler-32 of the plaintext (`check_value`)
    pub check_value: Option<u32>,
    /// The base64 text itself
    pub text: String,
}

/// A 3D vertex with x, y, z coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
    /// Z coordinate
    pub z: f32,
}

impl Vertex {
    /// Create a new vertex
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A triangle defined by three vertex indices, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    /// Index of first vertex
    pub v1: u32,
    /// Index of second vertex
    pub v2: u32,
    /// Index of third vertex
    pub v3: u32,
}

impl Triangle {
    /// Create a new triangle
    pub fn new(v1: u32, v2: u32, v3: u32) -> Self {
        Self { v1, v2, v3 }
    }

    /// The three indices in emission order
    pub fn indices(&self) -> [u32; 3] {
        [self.v1, self.v2, self.v3]
    }
}

/// A triangle mesh: vertex positions plus index triples
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// List of vertices
    pub vertices: Vec<Vertex>,
    /// List of triangles
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new mesh with pre-allocated capacity
    pub fn with_capacity(vertices: usize, triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            triangles: Vec::with_capacity(triangles),
        }
    }

    /// Whether the mesh holds neither vertices nor triangles
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.triangles.is_empty()
    }
}

/// Configuration for the decoder
///
/// The defaults decode every container observed in the wild; the toggles
/// exist for archives produced by old encoders.
///
/// # Example
///
/// ```
/// use libdcm::DecoderConfig;
///
/// let config = DecoderConfig::new()
///     .with_strict_checksum(true)
///     .with_custom_key(*b"0123456789abcdef");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// Reverse each 32-bit half of every cipher block before and after
    /// decryption (legacy encoder byte order)
    pub swap64: bool,
    /// Treat a checksum mismatch as a hard failure instead of returning the
    /// unverified buffer
    pub strict_checksum: bool,
    /// Close restarted strips with the old `(v2, v1)` edge instead of
    /// `(v2, v0)`
    pub legacy_restart_edge: bool,
    /// Externally-known cipher key, tried before the derived candidates
    pub custom_key: Option<[u8; 16]>,
}

impl DecoderConfig {
    /// Create a configuration with the canonical defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the legacy per-block byte order
    pub fn with_swap64(mut self, swap64: bool) -> Self {
        self.swap64 = swap64;
        self
    }

    /// Enable or disable strict checksum handling
    pub fn with_strict_checksum(mut self, strict: bool) -> Self {
        self.strict_checksum = strict;
        self
    }

    /// Enable or disable the legacy restart edge set
    pub fn with_legacy_restart_edge(mut self, legacy: bool) -> Self {
        self.legacy_restart_edge = legacy;
        self
    }

    /// Provide a cipher key to try before the derived candidates
    pub fn with_custom_key(mut self, key: [u8; 16]) -> Self {
        self.custom_key = Some(key);
        self
    }
}
