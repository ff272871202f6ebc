/*
 * @Author       : 老董
 * @Date         : 2026-02-15
 * @Description  : `.keras`与`.weights.h5`存取测试
 */

use crate::assert_err;
use crate::nn::layer::{ActivationKind, Dense};
use crate::nn::{Functional, FunctionalOptions, Graph};
use crate::saving::store::TempDir;
use crate::saving::{
    format_utc_timestamp, load_model, load_weights_only, save_model, save_weights_only,
    ArchiveReader, ArchiveWriter, LoadOptions, Metadata, SaveOptions, SavingError, WeightsFormat,
    CONFIG_FILENAME, KERAS_VERSION, METADATA_FILENAME,
};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;
use std::time::{Duration, UNIX_EPOCH};

fn mlp(seed: u64, hidden: usize) -> Functional {
    let graph = Graph::new_with_seed(seed);
    let x = graph.input(&[4], Some("x")).expect("创建输入失败");
    let h = graph
        .add_layer(Dense::new(hidden).with_activation(ActivationKind::Relu))
        .expect("登记层失败")
        .call_single(&x)
        .expect("调用层失败");
    let y = graph
        .add_layer(Dense::new(2))
        .expect("登记层失败")
        .call_single(&h)
        .expect("调用层失败");
    Functional::new(&graph, x, y, FunctionalOptions::default()).expect("构建模型失败")
}

fn predict(model: &Functional) -> Vec<f32> {
    let input = Tensor::new(&[0.5, -1., 2., 0.25, 1., 1., -0.5, 0.], &[2, 4]);
    model
        .predict(input)
        .expect("推理失败")
        .as_leaf()
        .expect("应为单个输出")
        .data_as_slice()
}

fn assert_same_predictions(a: &Functional, b: &Functional) {
    let (a, b) = (predict(a), predict(b));
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
    }
}

#[test]
fn test_format_utc_timestamp() {
    assert_eq!(format_utc_timestamp(UNIX_EPOCH), "1970-01-01@00:00:00");
    let leap_day = UNIX_EPOCH + Duration::from_secs(951_782_400 + 3661);
    assert_eq!(format_utc_timestamp(leap_day), "2000-02-29@01:01:01");
    let recent = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    assert_eq!(format_utc_timestamp(recent), "2023-11-14@22:13:20");
}

#[test]
fn test_keras_archive_round_trip() {
    let dir = TempDir::new("only_keras_test_keras").expect("创建临时目录失败");
    let path = dir.path().join("mlp.keras");
    let model = mlp(1, 3);
    save_model(&model, &path, &SaveOptions::default()).expect("保存失败");

    let archive = ArchiveReader::open(&path).expect("打开归档失败");
    let mut names = archive.names();
    names.sort();
    assert_eq!(names, ["config.json", "metadata.json", "model.weights.h5"]);
    let raw = archive.read_entry(METADATA_FILENAME).expect("读取失败");
    let metadata: Metadata = serde_json::from_slice(&raw).expect("解析失败");
    assert_eq!(metadata.keras_version, KERAS_VERSION);
    assert_eq!(metadata.date_saved.len(), "2000-01-01@00:00:00".len());
    assert_eq!(metadata.date_saved.as_bytes()[10], b'@');

    let restored = load_model(&path, &LoadOptions::default()).expect("加载失败");
    assert_eq!(restored.name(), model.name());
    assert_eq!(restored.count_params(), model.count_params());
    assert_same_predictions(&model, &restored);
}

#[test]
fn test_keras_archive_with_npz_weights() {
    let dir = TempDir::new("only_keras_test_keras_npz").expect("创建临时目录失败");
    let path = dir.path().join("mlp.keras");
    let model = mlp(2, 3);
    let options = SaveOptions {
        weights_format: WeightsFormat::Npz,
        ..SaveOptions::default()
    };
    save_model(&model, &path, &options).expect("保存失败");
    let archive = ArchiveReader::open(&path).expect("打开归档失败");
    assert!(archive.contains("model.weights.npz"));

    let restored = load_model(&path, &LoadOptions::default()).expect("加载失败");
    assert_same_predictions(&model, &restored);
}

#[test]
fn test_keras_archive_with_sharded_weights() {
    let dir = TempDir::new("only_keras_test_keras_sharded").expect("创建临时目录失败");
    let path = dir.path().join("wide.keras");
    // 隐层的 kernel 即超过 1KB，之后的层落到新分片
    let model = mlp(3, 64);
    let options = SaveOptions {
        sharded: true,
        shard_size: Some("1KB".to_string()),
        ..SaveOptions::default()
    };
    save_model(&model, &path, &options).expect("保存失败");
    let archive = ArchiveReader::open(&path).expect("打开归档失败");
    assert!(archive.contains("model.weights.json"));
    assert!(archive.contains("model_1.weights.h5"));

    let restored = load_model(&path, &LoadOptions::default()).expect("加载失败");
    assert_same_predictions(&model, &restored);

    // 整模型存档中的权重也可以单独加载
    let mut other = mlp(4, 64);
    load_weights_only(&mut other, &path, false, false).expect("加载权重失败");
    assert_same_predictions(&model, &other);
}

#[test]
fn test_save_options_are_validated() {
    let model = mlp(5, 3);
    assert_err!(
        save_model(&model, "model.h5", &SaveOptions::default()),
        SavingError::InvalidExtension { expected, .. } if expected == ".keras"
    );
    let options = SaveOptions {
        weights_format: WeightsFormat::Npz,
        sharded: true,
        shard_size: None,
    };
    assert_err!(
        save_model(&model, "model.keras", &options),
        SavingError::ShardingUnsupported(WeightsFormat::Npz)
    );
    assert_err!(
        save_weights_only(&model, "model.h5", false, None),
        SavingError::InvalidExtension { path, .. } if path == "model.h5"
    );
    let mut model = model;
    assert_err!(
        load_weights_only(&mut model, "model.bin", false, false),
        SavingError::InvalidExtension { .. }
    );
    assert_err!(
        load_model("model.weights.h5", &LoadOptions::default()),
        SavingError::InvalidExtension { .. }
    );
}

#[test]
fn test_archive_without_weights_is_rejected() {
    let dir = TempDir::new("only_keras_test_keras_empty").expect("创建临时目录失败");
    let path = dir.path().join("config_only.keras");
    let model = mlp(6, 3);
    let config = serde_json::to_vec(&crate::saving::serialize_model(&model).expect("序列化失败"))
        .expect("编码失败");
    let archive = ArchiveWriter::create(&path).expect("创建归档失败");
    archive.write_entry(CONFIG_FILENAME, &config).expect("写入失败");
    archive.finish().expect("完成归档失败");

    assert_err!(load_model(&path, &LoadOptions::default()), SavingError::MissingWeights(_));
}

#[test]
fn test_weights_only_round_trip() {
    let dir = TempDir::new("only_keras_test_weights").expect("创建临时目录失败");
    let path = dir.path().join("mlp.weights.h5");
    let model = mlp(7, 3);
    save_weights_only(&model, &path, false, None).expect("保存失败");

    let mut other = mlp(8, 3);
    load_weights_only(&mut other, &path, false, false).expect("加载失败");
    assert_same_predictions(&model, &other);

    let sharded_path = dir.path().join("sharded.weights.h5");
    save_weights_only(&model, &sharded_path, true, Some("1KB")).expect("分片保存失败");
    assert!(dir.path().join("sharded.weights.json").exists());
    let mut other = mlp(9, 3);
    load_weights_only(&mut other, &sharded_path, true, false).expect("分片加载失败");
    assert_same_predictions(&model, &other);
}

#[test]
fn test_weights_only_shape_mismatch() {
    let dir = TempDir::new("only_keras_test_weights_mismatch").expect("创建临时目录失败");
    let path = dir.path().join("mlp.weights.h5");
    save_weights_only(&mlp(10, 3), &path, false, None).expect("保存失败");

    let mut wider = mlp(11, 5);
    let before = predict(&wider);
    assert_err!(
        load_weights_only(&mut wider, &path, false, false),
        SavingError::VariableShapeMismatch { layer, .. } if layer == "dense"
    );
    load_weights_only(&mut wider, &path, false, true).expect("跳过不匹配时应成功");
    // 两个 dense 的形状都不匹配，全部被跳过
    assert_eq!(predict(&wider), before);
}
