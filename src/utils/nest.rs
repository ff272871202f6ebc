/*
 * @Author       : 老董
 * @Date         : 2026-02-11
 * @Description  : 嵌套结构（单个 / 列表 / 字典）及其展平、按结构回填
 *
 * 模型的输入输出、层调用的参数都可以是任意嵌套的结构，
 * 图引擎内部只处理展平后的列表，需要时再按原结构回填。
 * 字典按键的字典序展平（与 BTreeMap 的迭代顺序一致）。
 */

use std::collections::BTreeMap;

/// 任意嵌套的结构
#[derive(Debug, Clone, PartialEq)]
pub enum Nest<T> {
    Leaf(T),
    List(Vec<Nest<T>>),
    Dict(BTreeMap<String, Nest<T>>),
}

impl<T> Nest<T> {
    pub fn list(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Self::Leaf).collect())
    }

    pub fn dict<K: Into<String>>(items: impl IntoIterator<Item = (K, T)>) -> Self {
        Self::Dict(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), Self::Leaf(v)))
                .collect(),
        )
    }

    /// 是否为嵌套结构（非单个叶子）
    pub const fn is_nested(&self) -> bool {
        !matches!(self, Self::Leaf(_))
    }

    /// 按深度优先展平所有叶子（字典按键排序）
    pub fn flatten(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Self::Leaf(v) => out.push(v),
            Self::List(items) => items.iter().for_each(|x| x.collect_leaves(out)),
            Self::Dict(items) => items.values().for_each(|x| x.collect_leaves(out)),
        }
    }

    pub fn into_flat(self) -> Vec<T> {
        let mut out = Vec::new();
        self.into_leaves(&mut out);
        out
    }

    fn into_leaves(self, out: &mut Vec<T>) {
        match self {
            Self::Leaf(v) => out.push(v),
            Self::List(items) => items.into_iter().for_each(|x| x.into_leaves(out)),
            Self::Dict(items) => items.into_values().for_each(|x| x.into_leaves(out)),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::List(items) => items.iter().map(Self::leaf_count).sum(),
            Self::Dict(items) => items.values().map(Self::leaf_count).sum(),
        }
    }

    pub fn map<U>(&self, f: &mut impl FnMut(&T) -> U) -> Nest<U> {
        match self {
            Self::Leaf(v) => Nest::Leaf(f(v)),
            Self::List(items) => Nest::List(items.iter().map(|x| x.map(f)).collect()),
            Self::Dict(items) => {
                Nest::Dict(items.iter().map(|(k, x)| (k.clone(), x.map(f))).collect())
            }
        }
    }

    pub fn try_map<U, E>(&self, f: &mut impl FnMut(&T) -> Result<U, E>) -> Result<Nest<U>, E> {
        Ok(match self {
            Self::Leaf(v) => Nest::Leaf(f(v)?),
            Self::List(items) => Nest::List(
                items
                    .iter()
                    .map(|x| x.try_map(f))
                    .collect::<Result<Vec<_>, E>>()?,
            ),
            Self::Dict(items) => Nest::Dict(
                items
                    .iter()
                    .map(|(k, x)| Ok((k.clone(), x.try_map(f)?)))
                    .collect::<Result<BTreeMap<_, _>, E>>()?,
            ),
        })
    }

    /// 用展平的值按本结构回填（`tree.pack_sequence_as`）。
    /// 值的个数与叶子数不一致时返回 None。
    pub fn pack_as<U>(&self, flat: Vec<U>) -> Option<Nest<U>> {
        if flat.len() != self.leaf_count() {
            return None;
        }
        let mut iter = flat.into_iter();
        self.pack_from(&mut iter)
    }

    fn pack_from<U>(&self, iter: &mut impl Iterator<Item = U>) -> Option<Nest<U>> {
        Some(match self {
            Self::Leaf(_) => Nest::Leaf(iter.next()?),
            Self::List(items) => Nest::List(
                items
                    .iter()
                    .map(|x| x.pack_from(iter))
                    .collect::<Option<Vec<_>>>()?,
            ),
            Self::Dict(items) => Nest::Dict(
                items
                    .iter()
                    .map(|(k, x)| Some((k.clone(), x.pack_from(iter)?)))
                    .collect::<Option<BTreeMap<_, _>>>()?,
            ),
        })
    }

    /// 长度为1的列表解包为其唯一元素（`unpack_singleton`）
    pub fn unpack_singleton(self) -> Self {
        match self {
            Self::List(mut items) if items.len() == 1 => items.remove(0),
            other => other,
        }
    }

    pub const fn as_leaf(&self) -> Option<&T> {
        match self {
            Self::Leaf(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<T> for Nest<T> {
    fn from(value: T) -> Self {
        Self::Leaf(value)
    }
}
