//! Shared shape/indexing helpers used across backends.

/// Computes `product(dims)` with overflow checking.
pub fn checked_element_count_or_error<E, F>(dims: &[usize], mut on_overflow: F) -> Result<usize, E>
where
    F: FnMut() -> E,
{
    let mut count = 1usize;
    for dim in dims {
        count = count.checked_mul(*dim).ok_or_else(&mut on_overflow)?;
    }
    Ok(count)
}

/// Builds row-major contiguous strides.
pub fn contiguous_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0usize; dims.len()];
    let mut stride = 1usize;
    for axis in (0..dims.len()).rev() {
        strides[axis] = stride;
        stride *= dims[axis];
    }
    strides
}

/// Splits a linear row-major offset into per-axis coordinates.
pub fn unravel_index(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (axis, dim) in dims.iter().enumerate().rev() {
        if *dim == 0 {
            continue;
        }
        coords[axis] = index % *dim;
        index /= *dim;
    }
    coords
}

/// Normalizes a possibly negative axis into `0..rank`.
pub fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let rank = i64::try_from(rank).ok()?;
    let normalized = if axis < 0 { axis + rank } else { axis };
    if (0..rank).contains(&normalized) {
        usize::try_from(normalized).ok()
    } else {
        None
    }
}

/// Numpy-style broadcast of two shapes aligned at the trailing axis.
pub fn broadcast_dims(lhs: &[usize], rhs: &[usize]) -> Option<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let mut out = vec![0usize; rank];
    for axis in 0..rank {
        let l = dim_from_back(lhs, rank - 1 - axis);
        let r = dim_from_back(rhs, rank - 1 - axis);
        out[axis] = match (l, r) {
            (a, b) if a == b => a,
            (1, b) => b,
            (a, 1) => a,
            _ => return None,
        };
    }
    Some(out)
}

/// Linear offset into a tensor of `dims` for an output coordinate of a broadcast result.
pub fn broadcast_offset(out_coord: &[usize], dims: &[usize]) -> usize {
    let strides = contiguous_strides(dims);
    let lead = out_coord.len() - dims.len();
    dims.iter()
        .zip(strides.iter())
        .enumerate()
        .map(|(axis, (&dim, &stride))| {
            let coord = if dim == 1 { 0 } else { out_coord[lead + axis] };
            coord * stride
        })
        .sum()
}

fn dim_from_back(dims: &[usize], back: usize) -> usize {
    if back < dims.len() {
        dims[dims.len() - 1 - back]
    } else {
        1
    }
}
