//! Map file I/O.
//!
//! Writes go to a temporary file next to the target and are renamed into
//! place only after the data has been flushed, so a failed write never leaves
//! a partial file at the destination path.

use std::io::Write;
use std::path::Path;

use crate::codec::StreamFormat;
use crate::core::config::MapConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::map::OccupancyMap;

/// Upper bound on the LZ4 decompression ratio.
const MAX_LZ4_RATIO: usize = 255;

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Write `bytes` to `path` atomically.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Compress a serialized map using LZ4.
pub fn compress(bytes: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(bytes)
}

/// Decompress an LZ4 stream produced by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let Some(size) = data.get(..4) else {
        return Err(Error::format("LZ4 stream shorter than its size prefix"));
    };
    let size = u32::from_le_bytes([size[0], size[1], size[2], size[3]]) as usize;
    if size > data.len().saturating_mul(MAX_LZ4_RATIO) + 16 {
        return Err(Error::format(format!(
            "LZ4 size prefix {} is impossible for {} compressed bytes",
            size,
            data.len()
        )));
    }
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::format(format!("LZ4 decompression failed: {}", e)))
}

/// Save a map asynchronously.
///
/// Encoding happens on the caller's task; the write goes through
/// [`write_atomic`] on the blocking pool, so concurrent saves to one path
/// each publish a complete stream.
pub async fn save_map(path: &Path, map: &OccupancyMap, format: StreamFormat) -> Result<()> {
    let bytes = map.to_bytes(format)?;
    let len = bytes.len();
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;
    log::info!("Saved {} bytes to {}", len, path.display());
    Ok(())
}

/// Load a map asynchronously. Sensor model and prune tolerance come from
/// `config`; resolution and depth come from the file.
pub async fn load_map(path: &Path, config: &MapConfig) -> Result<OccupancyMap> {
    let bytes = tokio::fs::read(path).await?;
    OccupancyMap::from_bytes(&bytes, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_write_atomic_creates_dirs_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("map.bt");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        // No temporary files left behind
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_write_atomic_failure_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target path: the final rename must fail
        let path = dir.path().join("map.bt");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("keep"), b"valid").unwrap();

        assert!(matches!(write_atomic(&path, b"data"), Err(Error::Io(_))));
        assert_eq!(std::fs::read(path.join("keep")).unwrap(), b"valid");
        // The temporary file is removed again
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_compress_decompress() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
        let compressed = compress(&data);
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(matches!(decompress(&[1, 2]), Err(Error::Format(_))));
        // Claims 4 GiB from a handful of bytes
        assert!(matches!(decompress(&[0xff, 0xff, 0xff, 0xff, 0, 0]), Err(Error::Format(_))));
        let mut truncated = compress(b"some map bytes, some map bytes, some map bytes");
        truncated.truncate(truncated.len() - 3);
        assert!(matches!(decompress(&truncated), Err(Error::Format(_))));
    }

    #[tokio::test]
    async fn test_save_and_load_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps").join("async.ot");

        let mut map = OccupancyMap::new(0.2).unwrap();
        map.update_node(Vec3::new(1.0, 2.0, 3.0), true).unwrap();
        map.update_node(Vec3::new(-1.0, 0.0, 0.5), false).unwrap();

        save_map(&path, &map, StreamFormat::Full).await.expect("save failed");
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);

        let loaded = load_map(&path, &MapConfig::default()).await.expect("load failed");
        assert_eq!(loaded.resolution(), 0.2);
        assert!(loaded.search(Vec3::new(1.0, 2.0, 3.0)).unwrap().unwrap().is_occupied());
        assert!(!loaded.search(Vec3::new(-1.0, 0.0, 0.5)).unwrap().unwrap().is_occupied());
    }

    #[tokio::test]
    async fn test_load_missing_map() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_map(&dir.path().join("missing.bt"), &MapConfig::default()).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_concurrent_saves_publish_whole_maps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.ot");

        let mut small = OccupancyMap::new(0.1).unwrap();
        small.update_node(Vec3::ZERO, true).unwrap();
        let mut large = OccupancyMap::new(0.1).unwrap();
        let points: Vec<Vec3> = (0..2000).map(|i| Vec3::new(i as f32 * 0.1, 0.0, 0.0)).collect();
        large.update_points(&points, true).unwrap();

        for _ in 0..8 {
            let (a, b) = tokio::join!(
                save_map(&path, &small, StreamFormat::Full),
                save_map(&path, &large, StreamFormat::Full),
            );
            a.unwrap();
            b.unwrap();

            let loaded = load_map(&path, &MapConfig::default()).await.unwrap();
            assert!(loaded.leaf_count() == 1 || loaded.leaf_count() == 2000);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
