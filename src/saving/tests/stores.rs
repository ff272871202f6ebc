/*
 * @Author       : 老董
 * @Date         : 2026-02-15
 * @Description  : 各类 IO 存储的读写测试
 */

use crate::assert_err;
use crate::saving::store::{resolve_duplicate_filename, TempDir};
use crate::saving::{
    parse_size, ArchiveReader, ArchiveWriter, DiskIOStore, H5IOStore, NpzIOStore, SavingError,
    ShardedH5IOStore, VarsGroup, WeightsFormat, WeightsStore,
};
use ndarray::{ArrayD, IxDyn};
use std::str::FromStr;

fn filled(shape: &[usize], value: f32) -> ArrayD<f32> {
    ArrayD::from_elem(IxDyn(shape), value)
}

fn temp_dir(prefix: &str) -> TempDir {
    TempDir::new(prefix).expect("创建临时目录失败")
}

// ========== H5IOStore ==========

#[test]
fn test_h5_store_make_get_close() {
    let dir = temp_dir("only_keras_test_h5");
    let path = dir.path().join("model.weights.h5").to_string_lossy().into_owned();

    let mut store = H5IOStore::create(path.clone(), None);
    store.make("").expect("创建根组失败").insert("0", filled(&[2], 1.));
    let group = store.make("layers/dense").expect("创建组失败");
    group.insert("0", filled(&[4, 3], 0.5));
    group.insert("1", filled(&[3], -1.));
    assert_err!(
        store.make("layers/dense").map(|_| ()),
        SavingError::GroupExists(name) if name == "/layers/dense/vars"
    );
    store.close().expect("关闭失败");
    // 重复关闭无副作用
    store.close().expect("重复关闭失败");

    let mut store = H5IOStore::open(path.clone(), None).expect("打开失败");
    let root = store.get("").expect("读取根组失败");
    assert_eq!(root.get("0"), Some(&filled(&[2], 1.)));
    let dense = store.get("layers/dense").expect("读取组失败");
    assert_eq!(dense.len(), 2);
    assert_eq!(dense.get("0"), Some(&filled(&[4, 3], 0.5)));
    assert_eq!(dense.get("1"), Some(&filled(&[3], -1.)));
    assert!(store.get("layers/missing").expect("读取失败").is_empty());
    assert_err!(store.make("layers/other").map(|_| ()), SavingError::ReadOnly(_));
}

#[test]
fn test_h5_store_rejects_foreign_files() {
    let dir = temp_dir("only_keras_test_h5_bad");
    let garbage = dir.path().join("garbage.weights.h5");
    std::fs::write(&garbage, b"not a weights file").expect("写文件失败");
    assert_err!(
        H5IOStore::open(garbage.to_string_lossy(), None).map(|_| ()),
        SavingError::BadMagic(_)
    );

    let truncated = dir.path().join("truncated.weights.h5");
    std::fs::write(&truncated, b"OK").expect("写文件失败");
    assert_err!(
        H5IOStore::open(truncated.to_string_lossy(), None).map(|_| ()),
        SavingError::BadMagic(_)
    );

    let mut future = b"OKH5".to_vec();
    future.extend_from_slice(&2u32.to_le_bytes());
    let future_path = dir.path().join("future.weights.h5");
    std::fs::write(&future_path, future).expect("写文件失败");
    assert_err!(
        H5IOStore::open(future_path.to_string_lossy(), None).map(|_| ()),
        SavingError::UnsupportedVersion { found: 2, expected: 1 }
    );
}

// ========== ShardedH5IOStore ==========

#[test]
fn test_sharded_store_rotates_and_reads_back() {
    let dir = temp_dir("only_keras_test_shard");
    let path = dir.path().join("model.weights.h5").to_string_lossy().into_owned();

    // 每组 400 字节，上限 1000 字节：组数超过 3 时切换分片
    let mut store = ShardedH5IOStore::create(path.clone(), "1KB", None).expect("创建失败");
    for i in 0..7 {
        store
            .make(&format!("layers/dense_{i}"))
            .expect("创建组失败")
            .insert("0", filled(&[100], i as f32));
    }
    assert_eq!(store.shard_list().len(), 2);
    let map = store.var_shard_map();
    assert_eq!(map["/layers/dense_0/vars"], "model.weights.h5");
    assert_eq!(map["/layers/dense_3/vars"], "model_1.weights.h5");
    assert_eq!(map["/layers/dense_6/vars"], "model_2.weights.h5");
    store.close().expect("关闭失败");

    assert!(dir.path().join("model.weights.json").exists());
    assert!(dir.path().join("model_1.weights.h5").exists());
    assert!(dir.path().join("model_2.weights.h5").exists());

    let mut store = ShardedH5IOStore::open(path, None).expect("打开失败");
    // 乱序读取，读取时在分片间来回切换
    for i in [6, 0, 3, 5, 1] {
        let group = store.get(&format!("layers/dense_{i}")).expect("读取失败");
        assert_eq!(group.get("0"), Some(&filled(&[100], i as f32)));
    }
    assert!(store.get("layers/unknown").expect("读取失败").is_empty());
}

#[test]
fn test_sharded_store_requires_map_file() {
    let dir = temp_dir("only_keras_test_shard_map");
    let path = dir.path().join("lonely.weights.h5").to_string_lossy().into_owned();
    let mut store = H5IOStore::create(path.clone(), None);
    store.make("").expect("创建根组失败");
    store.close().expect("关闭失败");

    assert_err!(
        ShardedH5IOStore::open(path, None).map(|_| ()),
        SavingError::ShardMapMissing(name) if name.ends_with("lonely.weights.json")
    );
}

#[test]
fn test_resolve_duplicate_filename() {
    assert_eq!(resolve_duplicate_filename("model.weights.h5", &[]), "model_1.weights.h5");
    let written = vec!["model.weights.h5".to_string(), "model_1.weights.h5".to_string()];
    assert_eq!(resolve_duplicate_filename("model_1.weights.h5", &written), "model_2.weights.h5");
    let written = vec![
        "model.weights.h5".to_string(),
        "model_1.weights.h5".to_string(),
        "model_2.weights.h5".to_string(),
    ];
    assert_eq!(resolve_duplicate_filename("model_2.weights.h5", &written), "model_3.weights.h5");
    assert_eq!(resolve_duplicate_filename("weights.bin", &[]), "weights.bin_1");
}

// ========== 选项 ==========

#[test]
fn test_parse_size() {
    assert_eq!(parse_size("10GB").expect("解析失败"), 10_000_000_000);
    assert_eq!(parse_size("15mb").expect("解析失败"), 15_000_000);
    assert_eq!(parse_size(" 500KB ").expect("解析失败"), 500_000);
    assert_err!(parse_size("10"), SavingError::InvalidSize(s) if s == "10");
    assert_err!(parse_size("abcMB"), SavingError::InvalidSize(_));
    assert_err!(parse_size("-1GB"), SavingError::InvalidSize(_));
}

#[test]
fn test_weights_format_from_str() {
    assert_eq!(WeightsFormat::from_str("NPZ").expect("解析失败"), WeightsFormat::Npz);
    assert_eq!(WeightsFormat::from_str("h5").expect("解析失败"), WeightsFormat::H5);
    assert_eq!(WeightsFormat::Npz.to_string(), "npz");
    assert_err!(WeightsFormat::from_str("pt"), SavingError::UnknownWeightsFormat(s) if s == "pt");
}

// ========== NpzIOStore ==========

#[test]
fn test_npz_store_round_trip() {
    let dir = temp_dir("only_keras_test_npz");
    let path = dir.path().join("model.weights.npz").to_string_lossy().into_owned();

    let mut store = NpzIOStore::create(path.clone(), None);
    store.make("").expect("创建根组失败").insert("0", filled(&[2, 2], 3.));
    let group = store.make("layers/dense").expect("创建组失败");
    group.insert("0", filled(&[4, 3], 0.25));
    group.insert("1", filled(&[3], 0.));
    store.close().expect("关闭失败");

    let mut store = NpzIOStore::open(path, None).expect("打开失败");
    let root = store.get("").expect("读取失败");
    assert_eq!(root.get("0"), Some(&filled(&[2, 2], 3.)));
    let mut expected = VarsGroup::new();
    expected.insert("0", filled(&[4, 3], 0.25));
    expected.insert("1", filled(&[3], 0.));
    assert_eq!(store.get("layers/dense").expect("读取失败"), expected);
    assert_err!(store.make("layers/dense").map(|_| ()), SavingError::ReadOnly(_));
}

// ========== DiskIOStore ==========

#[test]
fn test_disk_store_without_archive() {
    let dir = temp_dir("only_keras_test_disk");
    let root = dir.path().join("assets").to_string_lossy().into_owned();

    let mut store = DiskIOStore::create(root.clone(), None).expect("创建失败");
    let vocab_dir = store.make("layers/text").expect("创建目录失败");
    std::fs::write(vocab_dir.join("vocab.txt"), "a\nb\n").expect("写文件失败");
    store.close().expect("关闭失败");

    let mut store = DiskIOStore::open(root, None).expect("打开失败");
    let vocab_dir = store.get("layers/text").expect("目录应存在");
    assert_eq!(std::fs::read_to_string(vocab_dir.join("vocab.txt")).expect("读文件失败"), "a\nb\n");
    assert!(store.get("layers/missing").is_none());
    assert_err!(store.make("layers/other"), SavingError::ReadOnly(_));
    store.close().expect("关闭失败");
}

#[test]
fn test_disk_store_inside_archive() {
    let dir = temp_dir("only_keras_test_disk_zip");
    let zip_path = dir.path().join("bundle.zip");

    let archive = ArchiveWriter::create(&zip_path).expect("创建归档失败");
    let mut store = DiskIOStore::create("assets", Some(archive.clone())).expect("创建失败");
    let staging = store.working_dir().to_path_buf();
    let vocab_dir = store.make("text").expect("创建目录失败");
    std::fs::write(vocab_dir.join("vocab.txt"), "hello").expect("写文件失败");
    store.close().expect("关闭失败");
    archive.finish().expect("完成归档失败");
    // 暂存目录随关闭一起删除
    assert!(!staging.exists());

    let reader = ArchiveReader::open(&zip_path).expect("打开归档失败");
    assert!(reader.contains("assets/text/vocab.txt"));
    let store = DiskIOStore::open("assets", Some(&reader)).expect("打开失败");
    let extracted = store.working_dir().to_path_buf();
    let vocab_dir = store.get("text").expect("目录应存在");
    assert_eq!(std::fs::read_to_string(vocab_dir.join("vocab.txt")).expect("读文件失败"), "hello");
    drop(store);
    assert!(!extracted.exists());
}
