//! Ring-topology `vis.dat` generation.
//!
//! PMVS reads an optional visibility file listing, for every image, which other
//! images it should be matched against. For a ring of cameras each camera is paired
//! with its nearest neighbours along the ring: `ceil(k / 2)` successors followed
//! by `floor(k / 2)` predecessors.

use crate::error::PmvsError;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// First line of a visibility file.
pub const VIS_HEADER: &str = "VISDATA";

/// Default file name of the visibility file inside a working directory.
pub const VIS_FILE: &str = "vis.dat";

/// Checks that every camera of the ring can get `num_neighbors` distinct neighbours.
pub(crate) fn check_ring(num_cameras: usize, num_neighbors: usize) -> Result<(), PmvsError> {
    if num_neighbors == 0 {
        return Err(PmvsError::InvalidParams(
            "at least one neighbour is required".to_string(),
        ));
    }
    if num_neighbors >= num_cameras {
        return Err(PmvsError::InvalidParams(format!(
            "a ring of {num_cameras} cameras cannot give each camera {num_neighbors} distinct neighbours"
        )));
    }
    Ok(())
}

/// Neighbours of `camera` in a ring of `num_cameras` cameras.
///
/// # Examples
///
/// ```rust
/// use pmvs_tools::visibility::ring_neighbors;
///
/// assert_eq!(ring_neighbors(4, 2, 0), vec![1, 3]);
/// assert_eq!(ring_neighbors(12, 3, 11), vec![0, 1, 10]);
/// ```
pub fn ring_neighbors(num_cameras: usize, num_neighbors: usize, camera: usize) -> Vec<usize> {
    let forward = num_neighbors.div_ceil(2);
    let backward = num_neighbors / 2;
    let successors = (1..=forward).map(|i| (camera + i) % num_cameras);
    let predecessors = (1..=backward).map(|i| (camera + num_cameras - i) % num_cameras);
    successors.chain(predecessors).collect()
}

/// Writes a ring visibility file to `writer`.
///
/// # Errors
///
/// [`PmvsError::InvalidParams`] unless `1 <= num_neighbors < num_cameras`.
pub fn write_vis_ring<W: Write>(
    writer: &mut W,
    num_cameras: usize,
    num_neighbors: usize,
) -> Result<(), PmvsError> {
    check_ring(num_cameras, num_neighbors)?;
    writeln!(writer, "{VIS_HEADER}")?;
    writeln!(writer, "{num_cameras}")?;
    for camera in 0..num_cameras {
        write!(writer, "{camera} {num_neighbors} ")?;
        for neighbor in ring_neighbors(num_cameras, num_neighbors, camera) {
            write!(writer, "{neighbor} ")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Writes a ring visibility file at `path`.
pub fn write_vis_file_ring(
    path: &Path,
    num_cameras: usize,
    num_neighbors: usize,
) -> Result<(), PmvsError> {
    check_ring(num_cameras, num_neighbors)?;
    info!(
        "Writing ring visibility for {num_cameras} cameras with {num_neighbors} neighbours to {}",
        path.display()
    );
    let mut writer = BufWriter::new(File::create(path)?);
    write_vis_ring(&mut writer, num_cameras, num_neighbors)?;
    writer.flush()?;
    Ok(())
}
