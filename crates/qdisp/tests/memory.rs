use half::bf16;
use qdisp::backend::{Memory, MemoryDesc, MemoryError, TensorData};
use qdisp::graph::DataType;

#[test]
fn integer_conversion_rounds_half_to_even_and_saturates() {
    let data = TensorData::from_f32(DataType::S8, &[0.5, 1.5, -2.5, 300.0, -300.0, f32::NAN]);
    assert_eq!(data, TensorData::S8(vec![0, 2, -2, 127, -128, 0]));

    let data = TensorData::from_f32(DataType::U8, &[-1.0, 254.6, 1e9]);
    assert_eq!(data, TensorData::U8(vec![0, 255, 255]));
}

#[test]
fn bf16_storage_uses_half_types() {
    let data = TensorData::from_f32(DataType::Bf16, &[1.0, -0.5]);
    assert_eq!(
        data,
        TensorData::Bf16(vec![bf16::from_f32(1.0), bf16::from_f32(-0.5)])
    );
    assert_eq!(data.to_f32_vec(), vec![1.0, -0.5]);
}

#[test]
fn from_data_checks_type_and_size() {
    let desc = MemoryDesc::new(DataType::S8, &[2, 2]);
    let err = Memory::from_data(desc.clone(), TensorData::U8(vec![0; 4]))
        .expect_err("type mismatch");
    assert_eq!(
        err,
        MemoryError::DataTypeMismatch {
            expected: DataType::S8,
            actual: DataType::U8
        }
    );

    let err = Memory::from_data(desc, TensorData::S8(vec![0; 3])).expect_err("size mismatch");
    assert_eq!(
        err,
        MemoryError::ElementCountMismatch {
            expected: 4,
            actual: 3
        }
    );
}

#[test]
fn with_desc_reinterprets_dims_and_converts_types() -> anyhow::Result<()> {
    let memory = Memory::from_f32(MemoryDesc::new(DataType::F32, &[4]), &[1.0, 2.0, 3.0, 4.0])?;

    let matrix = memory.clone().with_desc(MemoryDesc::new(DataType::F32, &[1, 4]))?;
    assert_eq!(matrix.dims(), &[1, 4]);
    assert_eq!(matrix.to_f32_vec(), memory.to_f32_vec());

    let bytes = memory.clone().with_desc(MemoryDesc::new(DataType::U8, &[2, 2]))?;
    assert_eq!(bytes.data(), &TensorData::U8(vec![1, 2, 3, 4]));

    assert!(memory
        .with_desc(MemoryDesc::new(DataType::F32, &[3]))
        .is_err());
    Ok(())
}

#[test]
fn reorder_keeps_the_destination_type() -> anyhow::Result<()> {
    let src = Memory::from_f32(MemoryDesc::new(DataType::F32, &[3]), &[1.4, -7.0, 2.6])?;
    let mut dst = Memory::zeroed(MemoryDesc::new(DataType::S32, &[3]));
    dst.reorder_from(&src)?;
    assert_eq!(dst.data_type(), DataType::S32);
    assert_eq!(dst.data(), &TensorData::S32(vec![1, -7, 3]));

    let mut short = Memory::zeroed(MemoryDesc::new(DataType::S32, &[2]));
    assert!(short.reorder_from(&src).is_err());
    Ok(())
}
