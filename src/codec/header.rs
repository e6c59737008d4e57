//! Stream header shared by both encodings.
//!
//! Layout (little-endian):
//!
//! | bytes | field                         |
//! |-------|-------------------------------|
//! | 4     | magic `OCTM`                  |
//! | 4     | format version (`u32`)        |
//! | 1     | body encoding                 |
//! | 1     | tree depth                    |
//! | 8     | resolution (`f64`)            |
//! | 8     | node count (`u64`)            |

use std::io::{Read, Write};

use super::read_array;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::key::MAX_TREE_DEPTH;

pub const MAGIC: &[u8; 4] = b"OCTM";
pub const VERSION: u32 = 1;
pub const HEADER_LEN: usize = 26;

/// Body encoding of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamFormat {
    /// Two bits per child: occupied, free, or subdivided. Lossy.
    Binary,
    /// Half-precision log-odds for every node.
    Full,
}

impl StreamFormat {
    fn tag(self) -> u8 {
        match self {
            Self::Binary => 0,
            Self::Full => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Binary),
            1 => Ok(Self::Full),
            other => Err(Error::format(format!("unknown body encoding {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
    pub format: StreamFormat,
    pub tree_depth: u8,
    pub resolution: f64,
    pub node_count: u64,
}

impl Header {
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&[self.format.tag(), self.tree_depth])?;
        writer.write_all(&self.resolution.to_le_bytes())?;
        writer.write_all(&self.node_count.to_le_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let magic: [u8; 4] = read_array(reader)?;
        if &magic != MAGIC {
            return Err(Error::format("invalid magic bytes"));
        }

        let version = u32::from_le_bytes(read_array(reader)?);
        if version != VERSION {
            return Err(Error::format(format!(
                "unsupported version {version}, expected {VERSION}"
            )));
        }

        let [tag, tree_depth]: [u8; 2] = read_array(reader)?;
        let format = StreamFormat::from_tag(tag)?;
        if !(1..=MAX_TREE_DEPTH).contains(&tree_depth) {
            return Err(Error::format(format!("tree depth {tree_depth} out of range")));
        }

        let resolution = f64::from_le_bytes(read_array(reader)?);
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(Error::format(format!("invalid resolution {resolution}")));
        }

        let node_count = u64::from_le_bytes(read_array(reader)?);

        Ok(Self {
            format,
            tree_depth,
            resolution,
            node_count,
        })
    }
}
