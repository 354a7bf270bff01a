//! # libdcm
//!
//! A pure Rust decoder for DCM packed-geometry containers.
//!
//! A DCM document is an XML envelope under an `<HPS>` root carrying two
//! base64 payloads: a vertex buffer (three little-endian `f32` per vertex,
//! optionally Blowfish-protected under schema "CE" with an Adler-32
//! verification protocol) and a facet stream, a compact opcode codec that
//! reconstructs triangle connectivity from a queue of directed edges.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - Whitespace-tolerant base64 payload decoding
//! - Encrypted vertex pipeline with automatic key-candidate search
//! - Facet stream interpretation with partial-mesh recovery
//! - Export to STL (ASCII and binary), OBJ and PLY
//! - Zip-wrapped container unwrapping
//!
//! Decoding never fails on malformed geometry: the entry points return a
//! [`DecodedMesh`] whose `diagnostics` list describes everything that had
//! to be worked around.
//!
//! ## Example
//!
//! ```
//! use libdcm::{decode_str, DecoderConfig};
//!
//! let xml = r#"<HPS version="1.0">
//!   <Packed_geometry>
//!     <Schema>plain</Schema>
//!     <Binary_data>
//!       <Vertices vertex_count="0"></Vertices>
//!       <Facets facet_count="1">BA==</Facets>
//!     </Binary_data>
//!   </Packed_geometry>
//! </HPS>"#;
//!
//! let decoded = decode_str(xml, &DecoderConfig::new());
//! assert_eq!(decoded.mesh.triangles.len(), 1);
//! assert_eq!(decoded.mesh.triangles[0].indices(), [0, 1, 2]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod container;
pub mod decoder;
pub mod decryption;
pub mod document;
pub mod error;
pub mod export;
pub mod facets;
pub mod keys;
pub mod model;
pub mod transport;

pub use decoder::{decode_file, decode_reader, decode_str, DecodedMesh};
pub use error::{Diagnostic, Error, Result};
pub use export::{write_mesh, ExportFormat};
pub use model::{DecoderConfig, Document, Mesh, Triangle, Vertex};
