/*
 * @Author       : 老董
 * @Date         : 2026-02-14
 * @Description  : 模型摘要测试
 */

use crate::nn::layer::Dense;
use crate::nn::{Functional, FunctionalOptions, Graph};
use std::fs;

fn small_model() -> Functional {
    let graph = Graph::new();
    let x = graph.input(&[4], Some("features")).expect("创建输入失败");
    let h = graph
        .add_layer(Dense::new(3).with_name("hidden"))
        .expect("登记 hidden 失败")
        .call_single(&x)
        .expect("调用 hidden 失败");
    let y = graph
        .add_layer(Dense::new(1000).with_name("wide"))
        .expect("登记 wide 失败")
        .call_single(&h)
        .expect("调用 wide 失败");
    Functional::new(&graph, x, y, FunctionalOptions::named("small")).expect("构建模型失败")
}

#[test]
fn test_summary_string() {
    let summary = small_model().summary_string();
    assert!(summary.contains("模型: \"small\""));
    assert!(summary.contains("features"));
    assert!(summary.contains("InputLayer"));
    assert!(summary.contains("hidden[0][0]"));
    // 15 + 3*1000 + 1000
    assert!(summary.contains("总参数量: 4,015"));
    assert!(summary.contains("不可训练参数: 0"));
}

#[test]
fn test_save_summary_markdown() {
    let path = std::env::temp_dir().join("only_keras_test_summary.md");
    small_model().save_summary(&path).expect("保存摘要失败");

    let content = fs::read_to_string(&path).expect("读取摘要失败");
    assert!(content.starts_with("# 模型摘要: small"));
    assert!(content.contains("| hidden | Dense |"));
    assert!(content.contains("| features[0][0] |"));
    assert!(content.contains("**总参数量**: 4,015"));

    fs::remove_file(&path).ok();
}
