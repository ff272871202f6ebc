/*
 * @Author       : 老董
 * @Date         : 2026-02-14
 * @Description  : Function 测试：连通性与名称检查、按深度执行、training/掩码的传递
 */

use crate::assert_err;
use crate::nn::layer::{Activation, ActivationKind, Add, Dense, Dropout};
use crate::nn::{Function, Graph, GraphError, SymbolicTensor, TensorSpec};
use crate::tensor::{DType, Tensor};
use crate::utils::Nest;
use approx::assert_abs_diff_eq;

/// x(4) -> dense(3, relu) -> dense_1(2)
fn build_mlp(graph: &Graph) -> (SymbolicTensor, SymbolicTensor) {
    let x = graph.input(&[4], Some("x")).expect("创建输入失败");
    let h = graph
        .add_layer(Dense::new(3).with_activation(ActivationKind::Relu))
        .expect("登记 dense 失败")
        .call_single(&x)
        .expect("调用 dense 失败");
    let y = graph
        .add_layer(Dense::new(2))
        .expect("登记 dense_1 失败")
        .call_single(&h)
        .expect("调用 dense_1 失败");
    (x, y)
}

#[test]
fn test_call_matches_compute_output_spec() {
    let graph = Graph::new_with_seed(42);
    let (x, y) = build_mlp(&graph);
    let function = Function::new(&graph, Nest::Leaf(x), Nest::Leaf(y)).expect("构建 Function 失败");

    let outputs = function
        .call(vec![Tensor::ones(&[5, 4])], None)
        .expect("执行失败")
        .into_flat();
    let specs = function
        .compute_output_spec(vec![TensorSpec::new(vec![Some(5), Some(4)], DType::Float32)])
        .expect("推导输出规格失败")
        .into_flat();

    assert_eq!(outputs.len(), 1);
    assert_eq!(specs.len(), 1);
    let expected: Vec<Option<usize>> = outputs[0].shape().iter().copied().map(Some).collect();
    assert_eq!(specs[0].shape, expected);
    assert_eq!(specs[0].dtype, outputs[0].dtype());
    assert_eq!(outputs[0].shape(), &[5, 2]);
}

#[test]
fn test_operations_are_ordered_by_depth() {
    let graph = Graph::new_with_seed(1);
    let (x, y) = build_mlp(&graph);
    let function = Function::new(&graph, Nest::Leaf(x), Nest::Leaf(y)).expect("构建 Function 失败");

    let g = graph.inner();
    let names = function
        .operations()
        .iter()
        .map(|&op| g.operation_name(op))
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["x", "dense", "dense_1"]);
    assert_eq!(function.nodes_by_depth().len(), 3);
    assert_eq!(function.layers().len(), 3);
}

#[test]
fn test_disconnected_input_is_reported() {
    let graph = Graph::new();
    let a = graph.input(&[3], Some("a")).expect("创建输入 a 失败");
    let b = graph.input(&[3], Some("b")).expect("创建输入 b 失败");
    let y = graph
        .add_layer(Add::new())
        .expect("登记 add 失败")
        .call_list(&[&a, &b])
        .expect("调用 add 失败");

    assert_err!(
        Function::new(&graph, Nest::Leaf(a), Nest::Leaf(y)),
        GraphError::Disconnected { tensor, operation, .. } if tensor == "b" && operation == "add"
    );
}

#[test]
fn test_duplicate_layer_names_are_rejected() {
    let graph = Graph::new();
    let x = graph.input(&[3], Some("x")).expect("创建输入失败");
    let h = graph
        .add_layer(Dense::new(3).with_name("same"))
        .expect("登记第一个层失败")
        .call_single(&x)
        .expect("调用第一个层失败");
    let y = graph
        .add_layer(Dense::new(3).with_name("same"))
        .expect("登记第二个层失败")
        .call_single(&h)
        .expect("调用第二个层失败");

    assert_err!(
        Function::new(&graph, Nest::Leaf(x), Nest::Leaf(y)),
        GraphError::DuplicateName { name, count } if name == "same" && *count == 2
    );
}

#[test]
fn test_wrong_input_count() {
    let graph = Graph::new();
    let (x, y) = build_mlp(&graph);
    let function = Function::new(&graph, Nest::Leaf(x), Nest::Leaf(y)).expect("构建 Function 失败");

    assert_err!(
        function.call(vec![Tensor::ones(&[1, 4]), Tensor::ones(&[1, 4])], None),
        GraphError::InvalidInput(_)
    );
}

#[test]
fn test_diamond_graph_executes_each_node_once() {
    let graph = Graph::new();
    let x = graph.input(&[2], Some("x")).expect("创建输入失败");
    let relu = graph
        .add_layer(Activation::new(ActivationKind::Relu))
        .expect("登记 relu 失败")
        .call_single(&x)
        .expect("调用 relu 失败");
    let y = graph
        .add_layer(Add::new())
        .expect("登记 add 失败")
        .call_list(&[&x, &relu])
        .expect("调用 add 失败");
    let function = Function::new(&graph, Nest::Leaf(x), Nest::Leaf(y)).expect("构建 Function 失败");

    let input = Tensor::new(&[-1., 2.], &[1, 2]);
    let output = function.call(vec![input], None).expect("执行失败").into_flat();
    // x + relu(x)
    assert_abs_diff_eq!(output[0], Tensor::new(&[-1., 4.], &[1, 2]), epsilon = 1e-6);
}

#[test]
fn test_training_flag_reaches_dropout_only() {
    let graph = Graph::new();
    let x = graph.input(&[100], Some("x")).expect("创建输入失败");
    let y = graph
        .add_layer(Dropout::new(0.5).with_seed(42))
        .expect("登记 dropout 失败")
        .call_single(&x)
        .expect("调用 dropout 失败");
    let function = Function::new(&graph, Nest::Leaf(x), Nest::Leaf(y)).expect("构建 Function 失败");

    let ones = Tensor::ones(&[1, 100]);
    let inference = function.call(vec![ones.clone()], Some(false)).expect("推理失败").into_flat();
    assert_eq!(inference[0], ones);
    let default = function.call(vec![ones.clone()], None).expect("执行失败").into_flat();
    assert_eq!(default[0], ones);

    let training = function.call(vec![ones], Some(true)).expect("训练模式执行失败").into_flat();
    let values = training[0].data_as_slice();
    // 保留的元素放大为 1/(1-rate)
    assert!(values.iter().all(|&v| v == 0. || (v - 2.).abs() < 1e-6));
    assert!(values.iter().any(|&v| v == 0.));
    assert!(values.iter().any(|&v| v > 0.));
}

#[test]
fn test_mask_propagates_through_masking_layers() {
    let graph = Graph::new();
    let x = graph.input(&[3], Some("x")).expect("创建输入失败");
    let y = graph
        .add_layer(Activation::new(ActivationKind::Tanh))
        .expect("登记 activation 失败")
        .call_single(&x)
        .expect("调用 activation 失败");
    let function = Function::new(&graph, Nest::Leaf(x), Nest::Leaf(y)).expect("构建 Function 失败");

    let mask = Tensor::new(&[1., 1., 0.], &[1, 3]);
    let input = Tensor::zeros(&[1, 3]).with_mask(Some(mask.clone()));
    let output = function.call(vec![input], None).expect("执行失败").into_flat();
    assert_eq!(output[0].mask(), Some(&mask));
}
