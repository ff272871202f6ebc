/*
 * @Author       : 老董
 * @Date         : 2026-02-14
 * @Description  : 内置层测试：符号调用的形状推导、真实计算、配置往返
 */

use crate::assert_err;
use crate::nn::layer::{
    ActivationKind, Concatenate, Dense, Dropout, InputLayer, Layer, LayerError, Softmax,
};
use crate::nn::{CallArguments, Graph, GraphError, TensorSpec};
use crate::tensor::{DType, Tensor};
use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

#[test]
fn test_dense_build_and_call() {
    let mut dense = Dense::new(3).with_name("dense");
    assert!(!dense.is_built());
    assert_eq!(dense.count_params(), 0);

    let mut rng = StdRng::seed_from_u64(0);
    let spec = CallArguments::single(TensorSpec::with_batch(&[4]));
    dense.build(&spec, &mut rng).expect("构建 dense 失败");
    assert!(dense.is_built());
    assert_eq!(dense.kernel().map(Tensor::shape), Some(&[4, 3][..]));
    assert_eq!(dense.bias().map(Tensor::shape), Some(&[3][..]));
    assert_eq!(dense.count_params(), 15);

    let out_spec = dense.compute_output_spec(&spec).expect("推导输出规格失败");
    assert_eq!(out_spec.as_leaf().map(|s| s.shape.clone()), Some(vec![None, Some(3)]));

    // 偏置初始为0，全零输入得到全零输出
    let y = dense
        .call(&CallArguments::single(Tensor::zeros(&[2, 4])), None)
        .expect("执行 dense 失败");
    assert_abs_diff_eq!(
        y.as_leaf().expect("应为单个输出"),
        &Tensor::zeros(&[2, 3]),
        epsilon = 1e-6
    );

    let bad = CallArguments::single(TensorSpec::with_batch(&[5]));
    assert_err!(dense.compute_output_spec(&bad), LayerError::InvalidInput { .. });
}

#[test]
fn test_dense_config_round_trip() {
    let dense = Dense::new(8)
        .with_name("hidden")
        .with_activation(ActivationKind::Sigmoid)
        .with_bias(false);
    let config = dense.get_config().expect("导出配置失败");
    assert_eq!(config["units"], json!(8));
    assert_eq!(config["activation"], json!("sigmoid"));
    assert_eq!(config["dtype"], json!("float32"));

    let restored = Dense::from_config(&config).expect("由配置重建失败");
    assert_eq!(restored.name(), "hidden");
    assert_eq!(restored.units(), 8);
    assert_eq!(restored.activation(), ActivationKind::Sigmoid);
    assert_eq!(restored.get_config().expect("导出配置失败"), config);

    assert_err!(
        Dense::from_config(&json!({"name": "bad", "units": 0})),
        LayerError::InvalidConfig { layer, .. } if layer == "bad"
    );
}

#[test]
fn test_input_layer_config_accepts_dtype_policy() {
    let config = json!({
        "name": "x",
        "batch_shape": [null, 4],
        "dtype": {"class_name": "DTypePolicy", "config": {"name": "float32"}},
        "sparse": false
    });
    let layer = InputLayer::from_config(&config).expect("由配置重建失败");
    assert_eq!(layer.name(), "x");
    assert_eq!(layer.spec().shape, vec![None, Some(4)]);
    assert_eq!(layer.spec().dtype, DType::Float32);
    assert_eq!(layer.source_spec(), Some(layer.spec().clone()));

    assert_err!(
        InputLayer::from_config(&json!({"name": "y"})),
        LayerError::InvalidConfig { .. }
    );
}

#[test]
fn test_concatenate_shapes() {
    let graph = Graph::new();
    let a = graph.input(&[2], Some("a")).expect("创建输入 a 失败");
    let b = graph.input(&[3], Some("b")).expect("创建输入 b 失败");
    let concat = graph.add_layer(Concatenate::new(-1)).expect("登记 concatenate 失败");
    let y = concat.call_list(&[&a, &b]).expect("调用 concatenate 失败");
    assert_eq!(y.shape(), &[None, Some(5)]);

    let c = graph.input(&[2, 2], Some("c")).expect("创建输入 c 失败");
    assert_err!(concat.call_list(&[&a, &c]), GraphError::Layer(LayerError::InvalidInput { .. }));
    assert_err!(concat.call_single(&a), GraphError::Layer(LayerError::InvalidInput { .. }));
}

#[test]
fn test_softmax_legacy_axis_list() {
    let layer = Softmax::from_config(&json!({"name": "sm", "axis": [-1]})).expect("由配置重建失败");
    let y = layer
        .call(&CallArguments::single(Tensor::zeros(&[1, 4])), None)
        .expect("执行 softmax 失败");
    assert_abs_diff_eq!(
        y.as_leaf().expect("应为单个输出"),
        &Tensor::full(&[1, 4], 0.25),
        epsilon = 1e-6
    );
    // 单独的 Softmax 层不参与输出层激活检查
    assert_eq!(layer.softmax_axis(), None);
}

#[test]
fn test_dropout_config() {
    let layer = Dropout::new(0.25).with_name("drop").with_seed(3);
    let config = layer.get_config().expect("导出配置失败");
    assert_eq!(config["seed"], json!(3));
    let restored = Dropout::from_config(&config).expect("由配置重建失败");
    assert_abs_diff_eq!(restored.rate(), 0.25);
    assert!(restored.call_has_training_arg());

    assert_err!(
        Dropout::from_config(&json!({"name": "drop", "rate": 1.5})),
        LayerError::InvalidConfig { .. }
    );
}
