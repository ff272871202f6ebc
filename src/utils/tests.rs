use super::naming::{to_snake_case, UniqueNamer};
use super::nest::Nest;
use std::collections::BTreeMap;

#[test]
fn test_to_snake_case() {
    assert_eq!(to_snake_case("Dense"), "dense");
    assert_eq!(to_snake_case("InputLayer"), "input_layer");
    assert_eq!(to_snake_case("HTTPServer"), "http_server");
    assert_eq!(to_snake_case("MyCustom2Layer"), "my_custom2_layer");
    assert_eq!(to_snake_case("Functional"), "functional");
}

#[test]
fn test_unique_namer() {
    let mut namer = UniqueNamer::new();
    assert_eq!(namer.next("dense"), "dense");
    assert_eq!(namer.next("dense"), "dense_1");
    assert_eq!(namer.next("input_layer"), "input_layer");
    assert_eq!(namer.next("dense"), "dense_2");
}

#[test]
fn test_nest_flatten_dict_sorted_by_key() {
    let mut items = BTreeMap::new();
    items.insert("b".to_string(), Nest::Leaf(2));
    items.insert("a".to_string(), Nest::List(vec![Nest::Leaf(0), Nest::Leaf(1)]));
    let nest = Nest::Dict(items);
    assert_eq!(nest.flatten(), vec![&0, &1, &2]);
    assert_eq!(nest.leaf_count(), 3);
    assert!(nest.is_nested());
}

#[test]
fn test_nest_pack_as() {
    let structure = Nest::List(vec![
        Nest::Leaf("x"),
        Nest::dict([("k", "y"), ("j", "z")]),
    ]);
    let packed = structure.pack_as(vec![1, 2, 3]).expect("叶子数一致时应能回填");
    // 字典按键排序：j 先于 k
    let expected = Nest::List(vec![Nest::Leaf(1), Nest::dict([("j", 2), ("k", 3)])]);
    assert_eq!(packed, expected);

    assert!(structure.pack_as(vec![1, 2]).is_none());
}

#[test]
fn test_nest_unpack_singleton_and_map() {
    let single = Nest::list([5]);
    assert_eq!(single.clone().unpack_singleton(), Nest::Leaf(5));
    let pair = Nest::list([1, 2]);
    assert_eq!(pair.clone().unpack_singleton(), pair);

    let doubled = pair.map(&mut |x: &i32| x * 2);
    assert_eq!(doubled.into_flat(), vec![2, 4]);

    let failed: Result<Nest<i32>, String> = pair.try_map(&mut |x: &i32| {
        if *x > 1 {
            Err(format!("{x}太大"))
        } else {
            Ok(*x)
        }
    });
    assert_eq!(failed, Err("2太大".to_string()));
}

/// 不实现 Debug 的成功值（如各个层）
struct OpaqueValue;

#[derive(Debug)]
enum ParseFailure {
    Empty(String),
    TooLong { len: usize },
}

fn parse_opaque(input: &str) -> Result<OpaqueValue, ParseFailure> {
    match input.len() {
        0 => Err(ParseFailure::Empty("输入为空".to_string())),
        len if len > 3 => Err(ParseFailure::TooLong { len }),
        _ => Ok(OpaqueValue),
    }
}

#[test]
fn test_assert_err_accepts_non_debug_ok_value() {
    crate::assert_err!(parse_opaque(""));
    crate::assert_err!(parse_opaque(""), ParseFailure::Empty("输入为空"));
    crate::assert_err!(parse_opaque("abcd"), ParseFailure::TooLong { len } if *len == 4);
}

#[test]
#[should_panic(expected = "实际得到 Ok")]
fn test_assert_err_panics_on_non_debug_ok_value() {
    crate::assert_err!(parse_opaque("ab"), ParseFailure::TooLong { .. });
}
