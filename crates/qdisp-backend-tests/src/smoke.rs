use qdisp::backend::{ArgRole, Memory, MemoryDesc, ReferenceBackend, ReferenceKernel, TensorData};
use qdisp::displace::{replay_upstream, Displacement, PartitionDataDisplacer, ReplayOutcome};
use qdisp::graph::{
    AttrValue, Attributes, DataType, GraphBuilder, LogicalTensor, OpId, OpKind, Operation,
    Partition, TensorDesc, TensorId,
};

fn tensor(id: usize, data_type: DataType, dims: &[usize]) -> LogicalTensor {
    LogicalTensor::new(TensorId(id), data_type, dims)
}

fn quant_attrs(scale: f32, zp: i64) -> Attributes {
    Attributes::from([
        ("qtype".to_string(), AttrValue::Str("per_tensor".to_string())),
        ("scales".to_string(), AttrValue::F32Vec(vec![scale])),
        ("zps".to_string(), AttrValue::S64Vec(vec![zp])),
    ])
}

fn run_op<B: ReferenceBackend>(
    backend: &B,
    op: &Operation,
    args: Vec<(ArgRole, Memory)>,
) -> Memory {
    let mut kernel = backend.create_kernel(op).expect("kernel creation");
    kernel.init_memory_args().expect("argument init");
    for (role, memory) in args {
        kernel.replace_arg(role, memory).expect("bind argument");
    }
    kernel.execute().expect("execute");
    kernel.take_arg(ArgRole::Dst).expect("dst argument")
}

fn memory(data_type: DataType, dims: &[usize], values: &[f32]) -> Memory {
    Memory::from_f32(MemoryDesc::new(data_type, dims), values).expect("memory from values")
}

pub fn matmul_matches_expected<B: ReferenceBackend>(backend: &B) {
    let op = Operation::new(OpId(0), OpKind::MatMul)
        .with_inputs([
            tensor(0, DataType::F32, &[2, 2]),
            tensor(1, DataType::F32, &[2, 2]),
        ])
        .with_outputs([tensor(2, DataType::F32, &[2, 2])]);
    let dst = run_op(
        backend,
        &op,
        vec![
            (ArgRole::Src, memory(DataType::F32, &[2, 2], &[1.0, 2.0, 3.0, 4.0])),
            (ArgRole::Weights, memory(DataType::F32, &[2, 2], &[5.0, 6.0, 7.0, 8.0])),
        ],
    );
    assert_eq!(dst.to_f32_vec(), vec![19.0, 22.0, 43.0, 50.0]);
}

pub fn binary_broadcasts_rhs<B: ReferenceBackend>(backend: &B) {
    let op = Operation::new(OpId(0), OpKind::Add)
        .with_inputs([
            tensor(0, DataType::F32, &[2, 3]),
            tensor(1, DataType::F32, &[3]),
        ])
        .with_outputs([tensor(2, DataType::F32, &[2, 3])]);
    let dst = run_op(
        backend,
        &op,
        vec![
            (
                ArgRole::Src,
                memory(DataType::F32, &[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            ),
            (ArgRole::Src1, memory(DataType::F32, &[3], &[10.0, 20.0, 30.0])),
        ],
    );
    assert_eq!(dst.to_f32_vec(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
}

pub fn quantize_dequantize_round_trip<B: ReferenceBackend>(backend: &B) {
    let quantize = Operation::new(OpId(0), OpKind::Quantize)
        .with_inputs([tensor(0, DataType::F32, &[4])])
        .with_outputs([tensor(1, DataType::U8, &[4])]);
    let quantize = Operation {
        attrs: quant_attrs(0.5, 2),
        ..quantize
    };
    let values = [0.0, 1.0, -1.0, 2.5];
    let quantized = run_op(
        backend,
        &quantize,
        vec![(ArgRole::Src, memory(DataType::F32, &[4], &values))],
    );
    assert_eq!(quantized.data(), &TensorData::U8(vec![2, 4, 0, 7]));

    let dequantize = Operation {
        id: OpId(1),
        kind: OpKind::Dequantize,
        inputs: quantize.outputs.clone(),
        outputs: vec![tensor(2, DataType::F32, &[4])],
        attrs: quant_attrs(0.5, 2),
    };
    let restored = run_op(backend, &dequantize, vec![(ArgRole::Src, quantized)]);
    assert_eq!(restored.to_f32_vec(), values.to_vec());
}

pub fn transpose_matches_expected<B: ReferenceBackend>(backend: &B) {
    let op = Operation::new(OpId(0), OpKind::StaticTranspose)
        .with_inputs([tensor(0, DataType::F32, &[2, 3])])
        .with_outputs([tensor(1, DataType::F32, &[3, 2])])
        .with_attr("order", AttrValue::S64Vec(vec![1, 0]));
    let dst = run_op(
        backend,
        &op,
        vec![(
            ArgRole::Src,
            memory(DataType::F32, &[2, 3], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]),
        )],
    );
    assert_eq!(dst.dims(), &[3, 2]);
    assert_eq!(dst.to_f32_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
}

pub fn filling_respects_data_types<B: ReferenceBackend>(backend: &B) {
    let op = Operation::new(OpId(7), OpKind::MatMul)
        .with_inputs([
            tensor(0, DataType::U8, &[2, 4]),
            tensor(1, DataType::S8, &[4, 3]),
        ])
        .with_outputs([tensor(2, DataType::F32, &[2, 3])]);
    let mut kernel = backend.create_kernel(&op).expect("kernel creation");
    kernel.init_memory_args().expect("argument init");

    let src = kernel.arg(ArgRole::Src).expect("src bound");
    assert_eq!(src.data_type(), DataType::U8);
    assert_eq!(src.element_count(), 8);
    let weights = kernel.arg(ArgRole::Weights).expect("weights bound");
    assert_eq!(weights.data_type(), DataType::S8);
    assert_eq!(weights.element_count(), 12);
    assert!(kernel.arg(ArgRole::Bias).is_none());
}

pub fn displaces_dequantized_matmul_input<B: ReferenceBackend>(backend: &B) {
    let mut builder = GraphBuilder::new();
    let x = builder.input(DataType::U8, &[2, 4]);
    let (dq, x_f32) = builder.emit_single(
        OpKind::Dequantize,
        &[&x],
        TensorDesc::new(DataType::F32, &[2, 4]),
        quant_attrs(0.25, 0),
    );
    let w = builder.input(DataType::F32, &[4, 3]);
    let (mm, _) = builder.emit_single(
        OpKind::MatMul,
        &[&x_f32, &w],
        TensorDesc::new(DataType::F32, &[2, 3]),
        Attributes::new(),
    );
    let graph = builder.finish().expect("valid graph");

    let displacer = PartitionDataDisplacer::builder(backend)
        .graph(&graph)
        .partition(Partition::new([dq, mm]))
        .build()
        .expect("displacer");
    assert_eq!(displacer.boundaries().len(), 1);

    let mut target = Memory::zeroed(MemoryDesc::from(&x));
    let outcome = displacer.displace(x.id, &mut target).expect("displace");
    match outcome {
        Displacement::Displaced {
            boundary,
            landed,
            steps,
        } => {
            assert_eq!(boundary, x.id);
            assert_eq!(landed, x.id);
            assert!(steps.is_empty());
        }
        other => panic!("expected displacement, got {other:?}"),
    }
    assert_eq!(target.data_type(), DataType::U8);
    assert_eq!(target.element_count(), 8);

    let mut weights = Memory::zeroed(MemoryDesc::from(&w));
    let outcome = displacer.displace(w.id, &mut weights).expect("displace");
    assert_eq!(outcome, Displacement::PassThrough);
}

pub fn replays_transpose_and_dequantize<B: ReferenceBackend>(backend: &B) {
    let mut builder = GraphBuilder::new();
    let x = builder.input(DataType::F32, &[2, 3]);
    let (_, x_q) = builder.emit_single(
        OpKind::Quantize,
        &[&x],
        TensorDesc::new(DataType::U8, &[2, 3]),
        quant_attrs(0.5, 3),
    );
    let mut transpose_attrs = Attributes::new();
    transpose_attrs.insert("order".to_string(), AttrValue::S64Vec(vec![1, 0]));
    let (t, x_t) = builder.emit_single(
        OpKind::StaticTranspose,
        &[&x_q],
        TensorDesc::new(DataType::U8, &[3, 2]),
        transpose_attrs,
    );
    let (dq, x_dq) = builder.emit_single(
        OpKind::Dequantize,
        &[&x_t],
        TensorDesc::new(DataType::F32, &[3, 2]),
        quant_attrs(0.5, 3),
    );
    let w = builder.input(DataType::F32, &[2, 4]);
    let (mm, _) = builder.emit_single(
        OpKind::MatMul,
        &[&x_dq, &w],
        TensorDesc::new(DataType::F32, &[3, 4]),
        Attributes::new(),
    );
    let graph = builder.finish().expect("valid graph");
    let partition = Partition::new([t, dq, mm]);

    let start = memory(DataType::F32, &[3, 2], &[0.0, 0.5, 1.0, 1.5, 2.0, -1.0]);
    let outcome = replay_upstream(&graph, &partition, backend, &x_dq, start).expect("replay");
    let replay = match outcome {
        ReplayOutcome::Completed(replay) => replay,
        other => panic!("replay was skipped: {other:?}"),
    };

    assert_eq!(replay.tensor, x_q);
    let kinds: Vec<_> = replay
        .steps
        .iter()
        .map(|step| (step.forward_kind, step.inverted_kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (OpKind::Dequantize, OpKind::Quantize),
            (OpKind::StaticTranspose, OpKind::StaticTranspose),
        ]
    );
    assert_eq!(replay.memory.dims(), &[2, 3]);
    assert_eq!(replay.memory.data(), &TensorData::U8(vec![3, 5, 7, 4, 6, 1]));
}
