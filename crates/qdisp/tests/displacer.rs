use qdisp::backend::{Memory, MemoryDesc, MemoryError, ReferenceBackend, TensorData};
use qdisp::displace::{DisplaceError, Displacement, PartitionDataDisplacer};
use qdisp::graph::{
    AttrValue, Attributes, DataType, Graph, GraphBuilder, LogicalTensor, OpId, OpKind, Partition,
    TensorDesc,
};
use qdisp::DisplacerConfig;
use qdisp_backend_ref_cpu::RefCpuBackend;
use qdisp_backend_tests::RecordingBackend;

struct DequantizedMatmul {
    graph: Graph,
    partition: Partition,
    x: LogicalTensor,
    w: LogicalTensor,
}

fn dequantize_attrs() -> Attributes {
    Attributes::from([
        ("scales".to_string(), AttrValue::F32Vec(vec![0.125])),
        ("zps".to_string(), AttrValue::S64Vec(vec![0])),
    ])
}

fn dequantized_matmul(data_type: DataType) -> DequantizedMatmul {
    let mut builder = GraphBuilder::new();
    let x = builder.input(data_type, &[2, 4]);
    let (dq, x_f32) = builder.emit_single(
        OpKind::Dequantize,
        &[&x],
        TensorDesc::new(DataType::F32, &[2, 4]),
        dequantize_attrs(),
    );
    let w = builder.input(DataType::F32, &[4, 3]);
    let (mm, _) = builder.emit_single(
        OpKind::MatMul,
        &[&x_f32, &w],
        TensorDesc::new(DataType::F32, &[2, 3]),
        Attributes::new(),
    );
    DequantizedMatmul {
        graph: builder.finish().expect("valid graph"),
        partition: Partition::new([dq, mm]),
        x,
        w,
    }
}

fn filled(tensor: &LogicalTensor, value: f32) -> Memory {
    let desc = MemoryDesc::from(tensor);
    let values = vec![value; desc.element_count()];
    Memory::from_f32(desc, &values).expect("memory")
}

#[test]
fn building_without_a_graph_fails() {
    let result = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .partition(Partition::new([OpId(0)]))
        .build();
    assert!(matches!(result, Err(DisplaceError::MissingGraph)));
}

#[test]
fn non_boundary_tensors_pass_through() {
    let case = dequantized_matmul(DataType::U8);
    let displacer = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .graph(&case.graph)
        .partition(case.partition.clone())
        .build()
        .expect("displacer");

    let mut weights = filled(&case.w, 100.0);
    let before = weights.clone();
    let outcome = displacer.displace(case.w.id, &mut weights).expect("displace");
    assert_eq!(outcome, Displacement::PassThrough);
    assert_eq!(weights, before);
}

#[test]
fn boundary_input_receives_quantized_range_data() {
    let case = dequantized_matmul(DataType::U8);
    let displacer = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .graph(&case.graph)
        .partition(case.partition.clone())
        .build()
        .expect("displacer");
    assert_eq!(displacer.boundaries().len(), 1);

    let mut target = filled(&case.x, 255.0);
    let outcome = displacer.displace(case.x.id, &mut target).expect("displace");
    assert!(outcome.is_displaced());
    assert_eq!(
        outcome,
        Displacement::Displaced {
            boundary: case.x.id,
            landed: case.x.id,
            steps: Vec::new(),
        }
    );

    let TensorData::U8(values) = target.data() else {
        panic!("target changed type: {:?}", target.data_type());
    };
    assert_eq!(values.len(), 8);
    assert!(values.iter().all(|&v| v <= 10), "{values:?}");

    // Same backend seed, same data.
    let mut again = filled(&case.x, 255.0);
    displacer.displace(case.x.id, &mut again).expect("displace");
    assert_eq!(again, target);
}

#[test]
fn filling_request_coerces_weights_to_s8() {
    let case = dequantized_matmul(DataType::U8);
    let backend = RecordingBackend::new(RefCpuBackend::new());
    let displacer = PartitionDataDisplacer::builder(&backend)
        .graph(&case.graph)
        .partition(case.partition.clone())
        .build()
        .expect("displacer");

    let mut target = filled(&case.x, 0.0);
    displacer.displace(case.x.id, &mut target).expect("displace");

    let requests = backend.recorded_ops();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.kind, OpKind::MatMul);
    assert_eq!(request.inputs[0].data_type, DataType::U8);
    assert_eq!(request.inputs[1].data_type, DataType::S8);
    assert_eq!(request.outputs[0].data_type, DataType::F32);
    // The graph keeps its own description.
    let graph_op = case.graph.op(request.id).expect("main op in graph");
    assert_eq!(graph_op.inputs[1].data_type, DataType::F32);
}

#[test]
fn declined_filling_leaves_the_target_untouched() {
    let case = dequantized_matmul(DataType::U8);
    let backend = RecordingBackend::new(RefCpuBackend::new()).decline(OpKind::MatMul);
    let displacer = PartitionDataDisplacer::builder(&backend)
        .graph(&case.graph)
        .partition(case.partition.clone())
        .build()
        .expect("displacer");

    let mut target = filled(&case.x, 42.0);
    let before = target.clone();
    let outcome = displacer.displace(case.x.id, &mut target).expect("displace");
    assert!(matches!(outcome, Displacement::Skipped { .. }));
    assert_eq!(target, before);
}

#[test]
fn unsupported_boundary_type_is_skipped() {
    let case = dequantized_matmul(DataType::S32);
    let displacer = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .graph(&case.graph)
        .partition(case.partition.clone())
        .build()
        .expect("displacer");

    let mut target = filled(&case.x, 1000.0);
    let before = target.clone();
    let outcome = displacer.displace(case.x.id, &mut target).expect("displace");
    match outcome {
        Displacement::Skipped { reason } => assert!(reason.contains("s32"), "{reason}"),
        other => panic!("expected a skip, got {other:?}"),
    }
    assert_eq!(target, before);
}

#[test]
fn disabled_displacer_passes_everything_through() {
    let case = dequantized_matmul(DataType::U8);
    let displacer = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .graph(&case.graph)
        .partition(case.partition.clone())
        .config(DisplacerConfig { enabled: false })
        .build()
        .expect("displacer");

    let mut target = filled(&case.x, 255.0);
    let before = target.clone();
    let outcome = displacer.displace(case.x.id, &mut target).expect("displace");
    assert_eq!(outcome, Displacement::PassThrough);
    assert_eq!(target, before);
}

#[test]
fn target_of_the_wrong_size_is_an_error() {
    let case = dequantized_matmul(DataType::U8);
    let displacer = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .graph(&case.graph)
        .partition(case.partition.clone())
        .build()
        .expect("displacer");

    let mut target = Memory::zeroed(MemoryDesc::new(DataType::U8, &[3, 4]));
    let err = displacer
        .displace(case.x.id, &mut target)
        .expect_err("size mismatch");
    assert!(matches!(
        err,
        DisplaceError::Memory(MemoryError::ElementCountMismatch {
            expected: 12,
            actual: 8
        })
    ));
}

#[test]
fn input_offset_without_kernel_argument_is_an_error() {
    let mut builder = GraphBuilder::new();
    let x = builder.input(DataType::F32, &[1, 2, 4, 4]);
    let w = builder.input(DataType::F32, &[2, 2, 1, 1]);
    let b = builder.input(DataType::F32, &[2]);
    let extra = builder.input(DataType::U8, &[2]);
    let (dq, extra_f32) = builder.emit_single(
        OpKind::Dequantize,
        &[&extra],
        TensorDesc::new(DataType::F32, &[2]),
        dequantize_attrs(),
    );
    let (conv, _) = builder.emit_single(
        OpKind::Convolution,
        &[&x, &w, &b, &extra_f32],
        TensorDesc::new(DataType::F32, &[1, 2, 4, 4]),
        Attributes::new(),
    );
    let graph = builder.finish().expect("valid graph");
    let displacer = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .graph(&graph)
        .partition(Partition::new([dq, conv]))
        .build()
        .expect("displacer");

    let mut target = Memory::zeroed(MemoryDesc::from(&extra));
    let err = displacer
        .displace(extra.id, &mut target)
        .expect_err("no argument for offset 3");
    assert!(matches!(
        err,
        DisplaceError::NoArgRole {
            kind: OpKind::Convolution,
            offset: 3
        }
    ));
}

#[test]
fn binary_operands_are_displaced_independently() {
    let mut builder = GraphBuilder::new();
    let a = builder.input(DataType::S8, &[2, 3]);
    let b = builder.input(DataType::S8, &[2, 3]);
    let (dq_a, a_f32) = builder.emit_single(
        OpKind::Dequantize,
        &[&a],
        TensorDesc::new(DataType::F32, &[2, 3]),
        dequantize_attrs(),
    );
    let (dq_b, b_f32) = builder.emit_single(
        OpKind::Dequantize,
        &[&b],
        TensorDesc::new(DataType::F32, &[2, 3]),
        dequantize_attrs(),
    );
    let (sub, _) = builder.emit_single(
        OpKind::Subtract,
        &[&a_f32, &b_f32],
        TensorDesc::new(DataType::F32, &[2, 3]),
        Attributes::new(),
    );
    let graph = builder.finish().expect("valid graph");
    let displacer = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .graph(&graph)
        .partition(Partition::new([dq_a, dq_b, sub]))
        .build()
        .expect("displacer");

    let records: Vec<_> = displacer
        .boundaries()
        .iter()
        .map(|(tensor, record)| (tensor, record.input_offset))
        .collect();
    assert_eq!(records, vec![(a.id, 0), (b.id, 1)]);

    for tensor in [&a, &b] {
        let mut target = filled(tensor, 100.0);
        let outcome = displacer.displace(tensor.id, &mut target).expect("displace");
        assert!(outcome.is_displaced());
        let TensorData::S8(values) = target.data() else {
            panic!("target changed type");
        };
        assert!(values.iter().all(|v| (-5..=5).contains(v)), "{values:?}");
    }
}

struct TransposedDequantizedMatmul {
    graph: Graph,
    transpose: OpId,
    dequantize: OpId,
    matmul: OpId,
    x: LogicalTensor,
    x_t: LogicalTensor,
    x_f32: LogicalTensor,
    w: LogicalTensor,
}

/// `x -> StaticTranspose(order = [1, 0, 2]) -> Dequantize -> MatMul`.
fn transposed_dequantized_matmul() -> TransposedDequantizedMatmul {
    let mut builder = GraphBuilder::new();
    let x = builder.input(DataType::U8, &[2, 3, 4]);
    let (transpose, x_t) = builder.emit_single(
        OpKind::StaticTranspose,
        &[&x],
        TensorDesc::new(DataType::U8, &[3, 2, 4]),
        Attributes::from([("order".to_string(), AttrValue::S64Vec(vec![1, 0, 2]))]),
    );
    let (dequantize, x_f32) = builder.emit_single(
        OpKind::Dequantize,
        &[&x_t],
        TensorDesc::new(DataType::F32, &[3, 2, 4]),
        dequantize_attrs(),
    );
    let w = builder.input(DataType::F32, &[4, 5]);
    let (matmul, _) = builder.emit_single(
        OpKind::MatMul,
        &[&x_f32, &w],
        TensorDesc::new(DataType::F32, &[3, 2, 5]),
        Attributes::new(),
    );
    TransposedDequantizedMatmul {
        graph: builder.finish().expect("valid graph"),
        transpose,
        dequantize,
        matmul,
        x,
        x_t,
        x_f32,
        w,
    }
}

#[test]
fn transpose_inside_the_partition_hides_the_boundary() {
    let case = transposed_dequantized_matmul();
    let displacer = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .graph(&case.graph)
        .partition(Partition::new([case.transpose, case.dequantize, case.matmul]))
        .build()
        .expect("displacer");

    // The dequantize is fed from inside the partition, and the walk past it ends at a
    // graph input without meeting another dequantize.
    assert!(displacer.boundaries().is_empty());
    for tensor in [&case.x, &case.x_t, &case.x_f32, &case.w] {
        let mut target = filled(tensor, 77.0);
        let before = target.clone();
        let outcome = displacer.displace(tensor.id, &mut target).expect("displace");
        assert_eq!(outcome, Displacement::PassThrough, "{}", tensor.id);
        assert_eq!(target, before);
    }
}

#[test]
fn transpose_outside_the_partition_leaves_nothing_to_replay() {
    let case = transposed_dequantized_matmul();
    let displacer = PartitionDataDisplacer::builder(RefCpuBackend::new())
        .graph(&case.graph)
        .partition(Partition::new([case.dequantize, case.matmul]))
        .build()
        .expect("displacer");

    let record = displacer
        .boundaries()
        .get(case.x_t.id)
        .expect("boundary at the transpose output");
    assert_eq!(record.main_op.id, case.matmul);
    assert_eq!(record.input_offset, 0);
    assert!(!displacer.boundaries().contains(case.x.id));

    let mut target = filled(&case.x_t, 255.0);
    let outcome = displacer
        .displace(case.x_t.id, &mut target)
        .expect("displace");
    assert_eq!(
        outcome,
        Displacement::Displaced {
            boundary: case.x_t.id,
            landed: case.x_t.id,
            steps: Vec::new(),
        }
    );
    let TensorData::U8(values) = target.data() else {
        panic!("target changed type: {:?}", target.data_type());
    };
    assert_eq!(values.len(), 24);
    assert!(values.iter().all(|&v| v <= 10), "{values:?}");

    let mut input = filled(&case.x, 255.0);
    let before = input.clone();
    let outcome = displacer.displace(case.x.id, &mut input).expect("displace");
    assert_eq!(outcome, Displacement::PassThrough);
    assert_eq!(input, before);
}

#[test]
fn displacer_exposes_what_it_was_built_from() {
    let case = dequantized_matmul(DataType::U8);
    let displacer = PartitionDataDisplacer::builder(RecordingBackend::new(RefCpuBackend::new()))
        .graph(&case.graph)
        .partition(case.partition.clone())
        .config(DisplacerConfig { enabled: true })
        .build()
        .expect("displacer");

    assert_eq!(displacer.partition(), &case.partition);
    assert_eq!(displacer.graph().len(), case.graph.len());
    assert!(displacer.config().enabled);
    assert_eq!(displacer.backend().inner().backend_name(), "ref-cpu");

    let mut target = filled(&case.x, 0.0);
    displacer.displace(case.x.id, &mut target).expect("displace");
    assert_eq!(displacer.backend().recorded_kinds(), vec![OpKind::MatMul]);
}
