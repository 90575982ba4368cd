use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use qdisp::backend::{ArgRole, BackendResult, Memory, MemoryDesc, TensorData};
use qdisp::graph::{DataType, OpId};

/// Per-argument RNG so that refilling the same op yields the same data.
pub(crate) fn arg_rng(seed: u64, op: OpId, role: ArgRole) -> StdRng {
    let op_mix = (op.0 as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    let role_mix = (role as u64 + 1).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    StdRng::seed_from_u64(seed ^ op_mix ^ role_mix)
}

/// Inclusive window the reference data is drawn from.
///
/// Kept narrow so that products and sums of filled values stay exact in every supported type.
fn fill_window(data_type: DataType) -> (i32, i32) {
    match data_type {
        DataType::S8 => (-5, 5),
        DataType::U8 => (0, 10),
        DataType::S32 => (-64, 64),
        DataType::F32 | DataType::Bf16 | DataType::F16 => (-16, 16),
    }
}

/// Fills a source argument with integer-valued data inside the type's window.
///
/// `non_zero` keeps zero out of the data, for divisor operands.
pub(crate) fn fill_source(
    desc: &MemoryDesc,
    rng: &mut StdRng,
    non_zero: bool,
) -> BackendResult<Memory> {
    let (lo, hi) = fill_window(desc.data_type);
    let values = (0..desc.element_count()).map(|_| {
        let mut value = rng.gen_range(lo..=hi);
        if non_zero && value == 0 {
            value = if hi > 0 { 1 } else { -1 };
        }
        f64::from(value)
    });
    let data = TensorData::from_f64(desc.data_type, values);
    Ok(Memory::from_data(desc.clone(), data)?)
}
