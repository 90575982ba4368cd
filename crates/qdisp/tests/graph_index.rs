use qdisp::graph::{
    Attributes, DataType, Graph, GraphBuilder, GraphError, LogicalTensor, OpId, OpKind,
    Operation, Partition, TensorDesc, TensorId,
};

fn tensor(id: usize, dims: &[usize]) -> LogicalTensor {
    LogicalTensor::new(TensorId(id), DataType::F32, dims)
}

fn unary(id: usize, kind: OpKind, input: usize, output: usize) -> Operation {
    Operation::new(OpId(id), kind)
        .with_inputs([tensor(input, &[4])])
        .with_outputs([tensor(output, &[4])])
}

#[test]
fn producer_lookup_distinguishes_graph_inputs() {
    let graph = Graph::new(vec![
        unary(0, OpKind::Relu, 0, 1),
        unary(1, OpKind::TypeCast, 1, 2),
    ])
    .unwrap_or_else(|err| panic!("unexpected error: {err}"));

    assert!(graph.producer_of(TensorId(0)).is_none());
    assert_eq!(graph.producer_of(TensorId(1)).map(|op| op.id), Some(OpId(0)));
    assert_eq!(graph.producer_of(TensorId(2)).map(|op| op.id), Some(OpId(1)));
    assert_eq!(graph.op(OpId(1)).map(|op| op.kind), Some(OpKind::TypeCast));
    assert!(graph.op(OpId(9)).is_none());
}

#[test]
fn consumers_are_listed_in_chronological_order() {
    let add = Operation::new(OpId(2), OpKind::Add)
        .with_inputs([tensor(1, &[4]), tensor(1, &[4])])
        .with_outputs([tensor(3, &[4])]);
    let graph = Graph::new(vec![
        unary(0, OpKind::Relu, 0, 1),
        unary(1, OpKind::Exp, 1, 2),
        add,
    ])
    .unwrap_or_else(|err| panic!("unexpected error: {err}"));

    let consumers: Vec<OpId> = graph.consumers_of(TensorId(1)).map(|op| op.id).collect();
    assert_eq!(consumers, vec![OpId(1), OpId(2)]);
    assert_eq!(graph.consumers_of(TensorId(3)).count(), 0);
}

#[test]
fn rejects_consumer_before_producer() {
    let err = Graph::new(vec![
        unary(0, OpKind::Relu, 1, 2),
        unary(1, OpKind::Exp, 0, 1),
    ])
    .expect_err("out of order graph must be rejected");
    assert_eq!(
        err,
        GraphError::NotChronological {
            tensor: TensorId(1),
            consumer: OpId(0),
            producer: OpId(1),
        }
    );
}

#[test]
fn rejects_second_producer_of_a_tensor() {
    let err = Graph::new(vec![
        unary(0, OpKind::Relu, 0, 1),
        unary(1, OpKind::Exp, 0, 1),
    ])
    .expect_err("double producer must be rejected");
    assert_eq!(
        err,
        GraphError::DuplicateProducer {
            tensor: TensorId(1),
            op: OpId(1),
        }
    );
}

#[test]
fn rejects_duplicate_op_ids() {
    let err = Graph::new(vec![
        unary(3, OpKind::Relu, 0, 1),
        unary(3, OpKind::Exp, 1, 2),
    ])
    .expect_err("duplicate op id must be rejected");
    assert_eq!(err, GraphError::DuplicateOp { op: OpId(3) });
}

#[test]
fn builder_allocates_fresh_ids_in_emission_order() {
    let mut builder = GraphBuilder::new();
    let x = builder.input(DataType::U8, &[2, 3]);
    let (dq, x_f32) = builder.emit_single(
        OpKind::Dequantize,
        &[&x],
        TensorDesc::new(DataType::F32, &[2, 3]),
        Attributes::new(),
    );
    let (relu, y) = builder.emit_single(
        OpKind::Relu,
        &[&x_f32],
        TensorDesc::new(DataType::F32, &[2, 3]),
        Attributes::new(),
    );
    let graph = builder
        .finish()
        .unwrap_or_else(|err| panic!("unexpected error: {err}"));

    assert_eq!(graph.len(), 2);
    assert_ne!(x.id, x_f32.id);
    assert_ne!(x_f32.id, y.id);
    assert_eq!(graph.ops()[0].id, dq);
    assert_eq!(graph.ops()[1].id, relu);
    assert_eq!(graph.producer_of(y.id).map(|op| op.id), Some(relu));
    assert_eq!(graph.ops()[1].inputs, vec![x_f32]);
}

#[test]
fn op_kind_names_parse_back() {
    for kind in [
        OpKind::MatMul,
        OpKind::StaticTranspose,
        OpKind::Gelu,
        OpKind::LeakyRelu,
        OpKind::Subtract,
        OpKind::ConvTranspose,
        OpKind::Relu,
        OpKind::Wildcard,
    ] {
        let parsed: OpKind = kind
            .as_str()
            .parse()
            .unwrap_or_else(|err| panic!("{kind}: {err}"));
        assert_eq!(parsed, kind);
    }
    assert_eq!(OpKind::Gelu.to_string(), "GELU");
    assert_eq!(OpKind::Relu.to_string(), "ReLU");

    let err = "Substract"
        .parse::<OpKind>()
        .expect_err("unknown kind must be rejected");
    assert_eq!(
        err,
        GraphError::UnknownOpKind {
            name: "Substract".to_string()
        }
    );
}

#[test]
fn data_type_names_parse_back() {
    assert_eq!("bf16".parse::<DataType>(), Ok(DataType::Bf16));
    assert_eq!("u8".parse::<DataType>(), Ok(DataType::U8));
    assert!("i4".parse::<DataType>().is_err());
    assert_eq!(DataType::S8.range(), Some((-128, 127)));
    assert_eq!(DataType::F16.range(), None);
}

#[test]
fn operation_serializes_kind_as_canonical_name() -> anyhow::Result<()> {
    let op = unary(5, OpKind::StaticReshape, 0, 1);
    let json = serde_json::to_string(&op)?;
    assert!(json.contains("\"StaticReshape\""));
    let back: Operation = serde_json::from_str(&json)?;
    assert_eq!(back, op);

    let partition = Partition::new([OpId(2), OpId(0)]);
    let json = serde_json::to_string(&partition)?;
    let back: Partition = serde_json::from_str(&json)?;
    assert_eq!(back.iter().collect::<Vec<_>>(), vec![OpId(0), OpId(2)]);
    Ok(())
}
