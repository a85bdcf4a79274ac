//! Spatial batching of grid points.
//!
//! Points are sorted along a Z-order (Morton) curve before chunking, so each batch covers a
//! compact block of space and neighbouring points share wall and furniture hits.

/// Bits kept per axis; 21 × 3 fits in a `u64`.
const MORTON_BITS: u32 = 21;

/// Spreads the low 21 bits of `v` so that two zero bits separate each original bit.
fn spread_bits(v: u64) -> u64 {
    let mut x = v & ((1 << MORTON_BITS) - 1);
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

/// Interleaves integer grid coordinates into a Morton code.
pub fn morton_code(ix: usize, iy: usize, iz: usize) -> u64 {
    spread_bits(ix as u64) | (spread_bits(iy as u64) << 1) | (spread_bits(iz as u64) << 2)
}

/// A run of grid indices evaluated by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointBatch {
    pub id: usize,
    pub indices: Vec<usize>,
}

/// Orders `items` by Morton code of their grid coordinates and chunks them into batches of
/// at most `batch_size` (at least 1). Every item lands in exactly one batch.
///
/// `items` holds `(flat index, (ix, iy, iz))` pairs; ties keep the flat-index order.
pub fn morton_batches(items: &[(usize, (usize, usize, usize))], batch_size: usize) -> Vec<PointBatch> {
    let mut keyed: Vec<(u64, usize)> = items.iter().map(|&(flat, (ix, iy, iz))| (morton_code(ix, iy, iz), flat)).collect();
    keyed.sort_unstable();
    keyed
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(id, chunk)| PointBatch {
            id,
            indices: chunk.iter().map(|&(_, flat)| flat).collect(),
        })
        .collect()
}
