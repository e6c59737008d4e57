//! Binary persistence of occupancy octrees.
//!
//! A stream is a fixed [`Header`] followed by a pre-order body in one of two
//! encodings (see [`StreamFormat`]). Decoding always builds a new tree and
//! either returns it whole or fails with [`Error::Format`].

pub mod header;
pub mod binary;
pub mod full;

pub use header::{Header, StreamFormat, MAGIC, VERSION};

use std::io::{self, Read, Write};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::octree::cell::OccupancyModel;
use crate::octree::tree::OccupancyOctree;

/// Upper bound on nodes reserved up front from a header's node count.
pub(crate) const MAX_PREALLOC: u64 = 1 << 20;

/// Read exactly `N` bytes; running out of input is a format error.
pub(crate) fn read_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::format("truncated stream"),
        _ => Error::Io(e),
    })?;
    Ok(buf)
}

/// A decoded stream.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub header: Header,
    pub tree: OccupancyOctree,
}

/// Write `tree` with its header to `writer`.
pub fn encode<W: Write>(
    tree: &OccupancyOctree,
    resolution: f64,
    format: StreamFormat,
    writer: &mut W,
) -> Result<()> {
    let (body, node_count) = match format {
        StreamFormat::Binary => binary::encode_body(tree),
        StreamFormat::Full => full::encode_body(tree),
    };
    let header = Header {
        format,
        tree_depth: tree.tree_depth(),
        resolution,
        node_count,
    };
    header.write(writer)?;
    writer.write_all(&body)?;
    log::debug!(
        "Encoded {} nodes as {:?} ({} body bytes)",
        node_count,
        format,
        body.len()
    );
    Ok(())
}

/// Encode into a new buffer.
pub fn encode_to_vec(
    tree: &OccupancyOctree,
    resolution: f64,
    format: StreamFormat,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(header::HEADER_LEN + tree.node_count() * 3);
    encode(tree, resolution, format, &mut out)?;
    Ok(out)
}

/// Read one stream from `reader`. The body encoding is taken from the
/// header; leaves of the lossy binary encoding take `model`'s clamping bounds.
pub fn decode<R: Read>(
    reader: &mut R,
    model: OccupancyModel,
    prune_tolerance: f32,
) -> Result<Decoded> {
    let header = Header::read(reader)?;
    let tree = match header.format {
        StreamFormat::Binary => binary::decode_body(
            reader,
            header.tree_depth,
            header.node_count,
            model,
            prune_tolerance,
        )?,
        StreamFormat::Full => full::decode_body(
            reader,
            header.tree_depth,
            header.node_count,
            model,
            prune_tolerance,
        )?,
    };
    log::debug!("Decoded {} nodes ({:?})", tree.node_count(), header.format);
    Ok(Decoded { header, tree })
}

/// Decode a complete buffer; bytes left after the tree are an error.
pub fn decode_from_slice(
    bytes: &[u8],
    model: OccupancyModel,
    prune_tolerance: f32,
) -> Result<Decoded> {
    let mut reader = bytes;
    let decoded = decode(&mut reader, model, prune_tolerance)?;
    if !reader.is_empty() {
        return Err(Error::format(format!(
            "{} trailing bytes after the tree",
            reader.len()
        )));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::key::VoxelKey;
    use crate::octree::cell::Observation;

    fn sample_tree() -> OccupancyOctree {
        let mut tree = OccupancyOctree::new(16, OccupancyModel::default(), 0.0);
        for i in 0..200u16 {
            let key = VoxelKey::new(30000 + i, 32768 - (i % 7), 32768 + i * 3);
            tree.update(key, Observation::from(i % 3 != 0).into());
        }
        tree
    }

    #[test]
    fn test_header_roundtrip_both_formats() {
        let tree = sample_tree();
        for format in [StreamFormat::Binary, StreamFormat::Full] {
            let bytes = encode_to_vec(&tree, 0.25, format).unwrap();
            let decoded = decode_from_slice(&bytes, *tree.model(), 0.0).unwrap();
            assert_eq!(decoded.header.format, format);
            assert_eq!(decoded.header.resolution, 0.25);
            assert_eq!(decoded.header.tree_depth, 16);
            assert_eq!(decoded.header.node_count, tree.node_count() as u64);
            assert_eq!(decoded.tree.node_count(), tree.node_count());
        }
    }

    #[test]
    fn test_binary_preserves_classification() {
        let tree = sample_tree();
        let bytes = encode_to_vec(&tree, 0.1, StreamFormat::Binary).unwrap();
        let decoded = decode_from_slice(&bytes, *tree.model(), 0.0).unwrap().tree;

        let original: Vec<_> = tree.leaves().map(|l| (l.key, l.cell.is_occupied(tree.model()))).collect();
        let restored: Vec<_> = decoded
            .leaves()
            .map(|l| (l.key, l.cell.is_occupied(decoded.model())))
            .collect();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_empty_tree_roundtrip() {
        let tree = OccupancyOctree::new(12, OccupancyModel::default(), 0.0);
        for format in [StreamFormat::Binary, StreamFormat::Full] {
            let bytes = encode_to_vec(&tree, 0.5, format).unwrap();
            assert_eq!(bytes.len(), header::HEADER_LEN);
            let decoded = decode_from_slice(&bytes, OccupancyModel::default(), 0.0).unwrap();
            assert!(decoded.tree.is_empty());
            assert_eq!(decoded.tree.tree_depth(), 12);
        }
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode_to_vec(&sample_tree(), 0.1, StreamFormat::Full).unwrap();
        bytes.push(0);
        let err = decode_from_slice(&bytes, OccupancyModel::default(), 0.0).unwrap_err();
        assert!(matches!(err, Error::Format(ref msg) if msg.contains("trailing")));
    }

    #[test]
    fn test_every_truncation_is_rejected() {
        let bytes = encode_to_vec(&sample_tree(), 0.1, StreamFormat::Binary).unwrap();
        for len in 0..bytes.len() {
            assert!(
                matches!(decode_from_slice(&bytes[..len], OccupancyModel::default(), 0.0), Err(Error::Format(_))),
                "prefix of {} bytes accepted",
                len
            );
        }
    }

    #[test]
    fn test_stream_decodes_from_reader_with_more_data() {
        let tree = sample_tree();
        let mut stream = encode_to_vec(&tree, 0.1, StreamFormat::Full).unwrap();
        let first_len = stream.len();
        stream.extend(encode_to_vec(&tree, 0.2, StreamFormat::Binary).unwrap());

        let mut reader = stream.as_slice();
        let first = decode(&mut reader, *tree.model(), 0.0).unwrap();
        assert_eq!(stream.len() - reader.len(), first_len);
        let second = decode(&mut reader, *tree.model(), 0.0).unwrap();
        assert_eq!(first.header.resolution, 0.1);
        assert_eq!(second.header.resolution, 0.2);
        assert!(reader.is_empty());
    }
}
