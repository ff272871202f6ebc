/*
 * @Author       : 老董
 * @Date         : 2026-02-14
 * @Description  : Functional 构建与执行测试
 */

use crate::assert_err;
use crate::nn::layer::{ActivationKind, Concatenate, Dense, Layer};
use crate::nn::{Functional, FunctionalOptions, Graph, GraphError, SymbolicTensor, TensorSpec};
use crate::saving::{Trackable, TrackableChild, TrackableRef};
use crate::tensor::{DType, Tensor};
use crate::utils::Nest;
use approx::assert_abs_diff_eq;
use std::rc::Rc;

fn dense_model(
    graph: &Graph,
    units: usize,
    activation: ActivationKind,
) -> (SymbolicTensor, SymbolicTensor) {
    let x = graph.input(&[4], Some("x")).expect("创建输入失败");
    let y = graph
        .add_layer(Dense::new(units).with_activation(activation))
        .expect("登记 dense 失败")
        .call_single(&x)
        .expect("调用 dense 失败");
    (x, y)
}

#[test]
fn test_softmax_on_single_unit_output_is_rejected() {
    let graph = Graph::new();
    let (x, y) = dense_model(&graph, 1, ActivationKind::Softmax);
    assert_err!(
        Functional::new(&graph, x.clone(), y.clone(), FunctionalOptions::default()),
        GraphError::SoftmaxOnSingleUnit { layer } if layer == "dense"
    );

    // 关闭检查后可以构建
    let options = FunctionalOptions {
        validate_output_activation: false,
        ..FunctionalOptions::default()
    };
    assert!(Functional::new(&graph, x, y, options).is_ok());

    let graph = Graph::new();
    let (x, y) = dense_model(&graph, 2, ActivationKind::Softmax);
    let model = Functional::new(&graph, x, y, FunctionalOptions::default())
        .expect("两个单元的 softmax 应能构建");
    let out = model.predict(Tensor::ones(&[1, 4])).expect("推理失败");
    let sum: f32 = out.as_leaf().expect("应为单个输出").data_as_slice().iter().sum();
    assert_abs_diff_eq!(sum, 1., epsilon = 1e-5);
}

#[test]
fn test_names_and_shapes() {
    let graph = Graph::new_with_seed(3);
    let (x, y) = dense_model(&graph, 3, ActivationKind::Linear);
    let model = Functional::new(&graph, x, y, FunctionalOptions::default()).expect("构建模型失败");

    assert_eq!(model.name(), "functional");
    assert!(model.trainable());
    assert_eq!(model.input_names(), &["x".to_string()]);
    assert_eq!(model.output_names(), &["dense".to_string()]);
    assert_eq!(model.input_shape(), Nest::Leaf(vec![None, Some(4)]));
    assert_eq!(model.output_shape(), Nest::Leaf(vec![None, Some(3)]));
    assert_eq!(model.layers().len(), 2);
    assert_eq!(model.count_params(), 15);

    let dense = model.get_layer("dense").expect("找不到 dense");
    assert_eq!(dense.borrow().name(), "dense");
    let first = model.get_layer_at(0).expect("找不到第0个层");
    assert_eq!(first.borrow().class_name(), "InputLayer");
    assert_err!(model.get_layer("missing"), GraphError::UnknownOperation(_));
    assert_err!(model.get_layer_at(5), GraphError::InvalidInput(_));

    let spec = model.input_spec();
    assert_eq!(spec.len(), 1);
    assert_eq!(spec[0].name, "x");
    assert_eq!(spec[0].shape, vec![None, Some(4)]);
}

#[test]
fn test_multiple_outputs_keep_structure() {
    let graph = Graph::new();
    let x = graph.input(&[4], Some("x")).expect("创建输入失败");
    let a = graph
        .add_layer(Dense::new(2).with_name("a"))
        .expect("登记 a 失败")
        .call_single(&x)
        .expect("调用 a 失败");
    let b = graph
        .add_layer(Dense::new(3).with_name("b"))
        .expect("登记 b 失败")
        .call_single(&x)
        .expect("调用 b 失败");
    let model = Functional::new(
        &graph,
        x,
        Nest::list([a, b]),
        FunctionalOptions::named("two_heads"),
    )
    .expect("构建模型失败");

    assert_eq!(model.name(), "two_heads");
    assert_eq!(model.output_names(), &["a".to_string(), "b".to_string()]);
    let out = model.predict(Tensor::ones(&[2, 4])).expect("推理失败").into_flat();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].shape(), &[2, 2]);
    assert_eq!(out[1].shape(), &[2, 3]);
}

#[test]
fn test_nested_structure_is_rejected() {
    let graph = Graph::new();
    let x = graph.input(&[2], Some("x")).expect("创建输入失败");
    let nested = Nest::List(vec![Nest::list([x.clone()]), Nest::Leaf(x.clone())]);
    assert_err!(
        Functional::new(&graph, nested, x, FunctionalOptions::default()),
        GraphError::InvalidInput(_)
    );
}

#[test]
fn test_dict_inputs_are_matched_by_key() {
    let graph = Graph::new();
    let a = graph.input(&[2], Some("a")).expect("创建输入 a 失败");
    let b = graph.input(&[3], Some("b")).expect("创建输入 b 失败");
    let y = graph
        .add_layer(Concatenate::new(-1))
        .expect("登记 concatenate 失败")
        .call_list(&[&a, &b])
        .expect("调用 concatenate 失败");
    let model = Functional::new(
        &graph,
        Nest::dict([("a", a), ("b", b)]),
        y,
        FunctionalOptions::default(),
    )
    .expect("构建模型失败");

    let names = model.input_spec().into_iter().map(|s| s.name).collect::<Vec<_>>();
    assert_eq!(names, vec!["a", "b"]);

    // 多余的键被忽略
    let inputs = Nest::dict([
        ("b", Tensor::new(&[3., 4., 5.], &[1, 3])),
        ("a", Tensor::new(&[1., 2.], &[1, 2])),
        ("unused", Tensor::zeros(&[1, 1])),
    ]);
    let out = model.predict(inputs).expect("推理失败");
    assert_abs_diff_eq!(
        out.as_leaf().expect("应为单个输出"),
        &Tensor::new(&[1., 2., 3., 4., 5.], &[1, 5]),
        epsilon = 1e-6
    );

    let missing = Nest::dict([("a", Tensor::zeros(&[1, 2]))]);
    assert_err!(model.predict(missing), GraphError::InvalidInput(_));
}

#[test]
fn test_input_rank_is_adjusted() {
    let graph = Graph::new_with_seed(5);
    let (x, y) = dense_model(&graph, 2, ActivationKind::Linear);
    let model = Functional::new(&graph, x, y, FunctionalOptions::default()).expect("构建模型失败");

    let plain = model.predict(Tensor::ones(&[3, 4])).expect("推理失败");
    // 多出的末尾单位维被去掉
    let squeezed = model.predict(Tensor::ones(&[3, 4, 1])).expect("推理失败");
    assert_eq!(plain, squeezed);

    assert_err!(
        model.predict(Tensor::ones(&[3, 5])),
        GraphError::ShapeMismatch { input, .. } if input == "x"
    );
    assert_err!(model.predict(Tensor::ones(&[3, 4, 2])), GraphError::ShapeMismatch { .. });

    // 模型输入的末维为1时补上缺少的末维
    let graph = Graph::new();
    let x = graph.input(&[3, 1], Some("col")).expect("创建输入失败");
    let y = graph
        .add_layer(Dense::new(2))
        .expect("登记 dense 失败")
        .call_single(&x)
        .expect("调用 dense 失败");
    let model = Functional::new(&graph, x, y, FunctionalOptions::default()).expect("构建模型失败");
    let out = model.predict(Tensor::ones(&[2, 3])).expect("推理失败");
    assert_eq!(out.as_leaf().map(Tensor::shape), Some(&[2, 3, 2][..]));
}

#[test]
fn test_inputs_are_cast_to_model_dtype() {
    let graph = Graph::new();
    let x = graph
        .input_with(TensorSpec::new(vec![None, Some(2)], DType::Int32), Some("ids"))
        .expect("创建输入失败");
    let model = Functional::new(&graph, x.clone(), x, FunctionalOptions::default())
        .expect("构建模型失败");

    let out = model.predict(Tensor::new(&[1.7, -2.2], &[1, 2])).expect("推理失败");
    let out = out.as_leaf().expect("应为单个输出");
    assert_eq!(out.dtype(), DType::Int32);
    assert_eq!(out.data_as_slice(), vec![1., -2.]);
}

#[test]
fn test_mask_is_attached_to_inputs() {
    let graph = Graph::new();
    let x = graph.input(&[3], Some("x")).expect("创建输入失败");
    let y = graph
        .add_layer(crate::nn::layer::Activation::new(ActivationKind::Relu))
        .expect("登记 activation 失败")
        .call_single(&x)
        .expect("调用 activation 失败");
    let model = Functional::new(&graph, x, y, FunctionalOptions::default()).expect("构建模型失败");

    let mask = Tensor::new(&[1., 0., 1.], &[1, 3]);
    let out = model
        .call(Tensor::ones(&[1, 3]), None, Some(Nest::Leaf(mask.clone())))
        .expect("执行失败");
    assert_eq!(out.as_leaf().and_then(Tensor::mask), Some(&mask));
}

#[test]
fn test_mask_count_must_match_inputs() {
    let graph = Graph::new();
    let x = graph.input(&[3], Some("x")).expect("创建输入失败");
    let model = Functional::new(&graph, x.clone(), x, FunctionalOptions::default())
        .expect("构建模型失败");

    let masks = Nest::list([Tensor::ones(&[1, 3]), Tensor::zeros(&[1, 3])]);
    assert_err!(
        model.call(Tensor::ones(&[1, 3]), None, Some(masks)),
        GraphError::InvalidInput(_)
    );
}

#[test]
fn test_intermediate_inputs_clone_the_subgraph() {
    let graph = Graph::new_with_seed(11);
    let x = graph.input(&[4], Some("x")).expect("创建输入失败");
    let h = graph
        .add_layer(Dense::new(3).with_name("encoder"))
        .expect("登记 encoder 失败")
        .call_single(&x)
        .expect("调用 encoder 失败");
    let decoder = graph.add_layer(Dense::new(2).with_name("decoder")).expect("登记 decoder 失败");
    let y = decoder.call_single(&h).expect("调用 decoder 失败");
    let nodes_before = graph.inner().num_nodes();

    let model = Functional::new(&graph, h.clone(), y, FunctionalOptions::default())
        .expect("构建模型失败");

    // 新的 InputLayer 代替中间张量，原节点保留
    assert!(graph.inner().num_nodes() > nodes_before);
    assert!(graph.inner().is_source(&model.inputs()[0]));
    assert_eq!(model.input_names(), &[format!("{}CLONE", h.name())]);
    assert_eq!(model.layers().len(), 2);
    assert_eq!(model.input_shape(), Nest::Leaf(vec![None, Some(3)]));
    assert_eq!(
        graph
            .inner()
            .inbound_nodes(decoder.id())
            .expect("查询入站节点失败")
            .len(),
        2
    );

    let out = model.predict(Tensor::ones(&[1, 3])).expect("推理失败");
    assert_eq!(out.as_leaf().map(Tensor::shape), Some(&[1, 2][..]));
}

#[test]
fn test_intermediate_input_of_shared_layer_replaces_only_its_node() {
    let graph = Graph::new_with_seed(13);
    let a = graph.input(&[4], Some("a")).expect("创建输入失败");
    let shared = graph.add_layer(Dense::new(4).with_name("shared")).expect("登记 shared 失败");
    let x1 = shared.call_single(&a).expect("第一次调用 shared 失败");
    let x2 = shared.call_single(&x1).expect("第二次调用 shared 失败");

    // 只有产生 x1 的第0个节点被 InputLayer 取代，第二次调用照常克隆
    let tail = Functional::new(&graph, x1.clone(), x2.clone(), FunctionalOptions::named("tail"))
        .expect("构建子模型失败");
    assert_eq!(tail.layers().len(), 2);
    assert_eq!(tail.input_names(), &[format!("{}CLONE", x1.name())]);

    let head = Functional::new(&graph, a.clone(), x1, FunctionalOptions::named("head"))
        .expect("构建模型失败");
    let full = Functional::new(&graph, a, x2, FunctionalOptions::named("full"))
        .expect("构建模型失败");

    let input = Tensor::ones(&[1, 4]);
    let hidden = head.predict(input.clone()).expect("head 推理失败");
    let hidden = hidden.as_leaf().expect("应为单个输出").clone();
    let from_tail = tail.predict(hidden).expect("tail 推理失败");
    let from_full = full.predict(input).expect("full 推理失败");
    assert_abs_diff_eq!(
        from_tail.as_leaf().expect("应为单个输出"),
        from_full.as_leaf().expect("应为单个输出"),
        epsilon = 1e-6
    );
}

#[test]
fn test_nested_functional_as_layer() {
    let inner_graph = Graph::new_with_seed(21);
    let x = inner_graph.input(&[4], Some("inner_x")).expect("创建输入失败");
    let h = inner_graph
        .add_layer(Dense::new(3).with_name("inner_dense"))
        .expect("登记 inner_dense 失败")
        .call_single(&x)
        .expect("调用 inner_dense 失败");
    let inner = Functional::new(&inner_graph, x, h, FunctionalOptions::named("inner"))
        .expect("构建内层模型失败");
    let expected_inner = inner.predict(Tensor::ones(&[2, 4])).expect("内层推理失败");

    let graph = Graph::new_with_seed(22);
    let x = graph.input(&[4], Some("x")).expect("创建输入失败");
    let inner_handle = graph.add_layer(inner).expect("登记内层模型失败");
    let h = inner_handle.call_single(&x).expect("调用内层模型失败");
    assert_eq!(h.shape(), &[None, Some(3)]);
    let y = graph
        .add_layer(Dense::new(2).with_name("head"))
        .expect("登记 head 失败")
        .call_single(&h)
        .expect("调用 head 失败");
    let outer = Functional::new(&graph, x.clone(), y, FunctionalOptions::named("outer"))
        .expect("构建外层模型失败");
    assert_eq!(outer.count_params(), 15 + 8);

    let out = outer.predict(Tensor::ones(&[2, 4])).expect("外层推理失败");
    assert_eq!(out.as_leaf().map(Tensor::shape), Some(&[2, 2][..]));

    // 内层单独作为子模型执行结果一致
    let partial = Functional::new(&graph, x, h, FunctionalOptions::named("partial"))
        .expect("构建子模型失败");
    assert_eq!(partial.predict(Tensor::ones(&[2, 4])).expect("推理失败"), expected_inner);
}

#[test]
fn test_trackable_children() {
    let graph = Graph::new();
    let (x, y) = dense_model(&graph, 2, ActivationKind::Linear);
    let mut model = Functional::new(&graph, x, y, FunctionalOptions::default())
        .expect("构建模型失败");

    let children = model.children();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].0, "layers");
    assert!(matches!(&children[0].1, TrackableChild::Container(items) if items.len() == 2));

    let extra = model.get_layer("dense").expect("找不到 dense");
    model.attach("extra", extra.clone());
    model.attach("extra", extra.clone());
    assert_eq!(model.children().len(), 2);
    match model.attached("extra") {
        Some(TrackableRef::Layer(layer)) => assert!(Rc::ptr_eq(layer, &extra)),
        _ => panic!("附加的对象应为层"),
    }
}
