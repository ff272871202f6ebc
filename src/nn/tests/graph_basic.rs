/*
 * @Author       : 老董
 * @Date         : 2026-02-14
 * @Description  : Graph 基础测试：输入、层登记、节点记录、反向遍历
 */

use crate::assert_err;
use crate::nn::layer::{Add, Dense};
use crate::nn::{CallArguments, Function, Graph, GraphError, TensorHistory, TensorSpec};
use crate::tensor::DType;
use crate::utils::Nest;

#[test]
fn test_input_creates_source_node() {
    let graph = Graph::new();
    let x = graph.input(&[4], Some("x")).expect("创建输入失败");

    assert_eq!(x.name(), "x");
    assert_eq!(x.shape(), &[None, Some(4)]);
    assert_eq!(x.dtype(), DType::Float32);

    let g = graph.inner();
    assert_eq!(g.num_operations(), 1);
    assert_eq!(g.num_nodes(), 1);
    assert!(g.is_source(&x));
    let history = x.history().expect("输入张量应有来源");
    assert_eq!(history.node_index, 0);
    assert_eq!(history.tensor_index, 0);
}

#[test]
fn test_unnamed_layers_get_unique_names() {
    let graph = Graph::new();
    let x = graph.input(&[4], None).expect("创建输入失败");
    assert_eq!(x.name(), "input_layer");

    let d1 = graph.add_layer(Dense::new(3)).expect("登记 dense 失败");
    let d2 = graph.add_layer(Dense::new(3)).expect("登记 dense 失败");
    assert_eq!(d1.name(), "dense");
    assert_eq!(d2.name(), "dense_1");

    let named = graph
        .add_layer(Dense::new(3).with_name("head"))
        .expect("登记 head 失败");
    assert_eq!(named.name(), "head");
}

#[test]
fn test_shared_layer_records_one_node_per_call() {
    let graph = Graph::new_with_seed(7);
    let a = graph.input(&[4], Some("a")).expect("创建输入 a 失败");
    let b = graph.input(&[4], Some("b")).expect("创建输入 b 失败");
    let dense = graph.add_layer(Dense::new(2)).expect("登记 dense 失败");

    let ya = dense.call_single(&a).expect("第一次调用失败");
    let yb = dense.call_single(&b).expect("第二次调用失败");

    // 重复登记同一个实例得到同一个操作
    let again = graph.add_layer_ref(dense.layer().clone()).expect("重复登记失败");
    assert_eq!(again.id(), dense.id());

    assert_eq!(ya.history().map(|h| h.node_index), Some(0));
    assert_eq!(yb.history().map(|h| h.node_index), Some(1));
    assert_eq!(yb.shape(), &[None, Some(2)]);

    let g = graph.inner();
    assert_eq!(g.inbound_nodes(dense.id()).expect("查询入站节点失败").len(), 2);
    let a_op = a.history().expect("输入应有来源").operation;
    assert_eq!(g.outbound_nodes(a_op).expect("查询出站节点失败").len(), 1);
}

#[test]
fn test_node_records_parents() {
    let graph = Graph::new();
    let a = graph.input(&[3], Some("a")).expect("创建输入 a 失败");
    let b = graph.input(&[3], Some("b")).expect("创建输入 b 失败");
    let y = graph
        .add_layer(Add::new())
        .expect("登记 add 失败")
        .call_list(&[&a, &b])
        .expect("调用 add 失败");

    let g = graph.inner();
    let node = g.node_by_key(y.node_key().expect("输出应有来源")).expect("找不到节点");
    assert!(!node.is_input());
    assert_eq!(node.input_tensors().len(), 2);
    assert_eq!(
        node.parent_nodes(),
        &[a.node_key().expect("a 应有来源"), b.node_key().expect("b 应有来源")]
    );
}

#[test]
fn test_build_map_detects_cycle() {
    let graph = Graph::new();
    let x = graph.input(&[3], Some("x")).expect("创建输入失败");
    let add = graph.add_layer(Add::new().with_name("loop")).expect("登记 add 失败");

    // 手工构造一个以自身输出为输入的节点
    let mut looped = graph
        .inner_mut()
        .new_symbolic(TensorSpec::with_batch(&[3]), Some("looped".to_string()));
    looped.set_history(TensorHistory {
        operation: add.id(),
        node_index: 0,
        tensor_index: 0,
    });
    graph
        .add_node(
            add.id(),
            CallArguments::list([x.clone(), looped.clone()]),
            Nest::Leaf(looped.clone()),
        )
        .expect("添加节点失败");

    assert_err!(
        Function::new(&graph, Nest::Leaf(x), Nest::Leaf(looped)),
        GraphError::Cycle { operation, .. } if operation == "loop"
    );
}

#[test]
fn test_tensor_without_history_is_rejected() {
    let graph = Graph::new();
    let x = graph.input(&[3], Some("x")).expect("创建输入失败");
    let orphan = graph
        .inner_mut()
        .new_symbolic(TensorSpec::with_batch(&[3]), None);
    let dense = graph.add_layer(Dense::new(2)).expect("登记 dense 失败");

    assert_err!(dense.call_single(&orphan), GraphError::InvalidInput(_));
    assert_err!(
        Function::new(&graph, Nest::Leaf(x), Nest::Leaf(orphan)),
        GraphError::InvalidInput(_)
    );
}
