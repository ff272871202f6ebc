/*
 * @Author       : 老董
 * @Date         : 2026-02-13
 * @Description  : 可追踪对象（层、模型、优化器等）及其状态遍历器
 *
 * 状态遍历不依赖运行时反射：每个对象通过 `Trackable::children()` 显式列出子对象，
 * 遍历器按属性名字母序递归，用对象地址去重，使共享的子对象只被保存/加载一次。
 * 得到的路径（如 `layers/dense`）即权重存储中的组路径。
 */

use super::error::SavingError;
use super::store::{DiskIOStore, VarsGroup, WeightsStore, WeightsStoreKind};
use crate::nn::LayerRef;
use crate::utils::naming::to_snake_case;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// 可追踪对象的类别，决定遍历子对象时跳过哪些属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackableKind {
    Layer,
    Functional,
    Optimizer,
    Metric,
    Loss,
}

impl TrackableKind {
    /// 遍历时不作为子对象访问的属性名
    pub fn attr_skiplist(&self) -> &'static [&'static str] {
        const LAYER: &[&str] = &[
            "_self_unconditional_dependency_names",
            "_layers",
            "_tracker",
            "variables",
            "weights",
            "trainable_weights",
            "non_trainable_weights",
        ];
        const FUNCTIONAL: &[&str] = &[
            "_self_unconditional_dependency_names",
            "_layers",
            "_tracker",
            "variables",
            "weights",
            "trainable_weights",
            "non_trainable_weights",
            "operations",
            "_operations",
        ];
        // 优化器的`variables`即其状态，不跳过
        const OPTIMIZER: &[&str] = &["_self_unconditional_dependency_names", "_tracker"];
        const OTHER: &[&str] = &["_self_unconditional_dependency_names", "_tracker", "variables"];
        match self {
            Self::Layer => LAYER,
            Self::Functional => FUNCTIONAL,
            Self::Optimizer => OPTIMIZER,
            Self::Metric | Self::Loss => OTHER,
        }
    }
}

/// 可追踪对象：拥有可保存的变量、资源，或可追踪的子对象
pub trait Trackable {
    fn kind(&self) -> TrackableKind {
        TrackableKind::Layer
    }

    /// 类名（如`Dense`）。容器中的子对象以其 snake_case 形式命名
    fn class_name(&self) -> &'static str;

    fn has_own_variables(&self) -> bool {
        true
    }

    fn save_own_variables(&self, _store: &mut VarsGroup) -> Result<(), SavingError> {
        Ok(())
    }

    fn load_own_variables(&mut self, _store: &VarsGroup) -> Result<(), SavingError> {
        Ok(())
    }

    fn has_assets(&self) -> bool {
        false
    }

    fn save_assets(&self, _dir: &Path) -> Result<(), SavingError> {
        Ok(())
    }

    /// `dir`为 None 表示存档中没有该对象的资源目录
    fn load_assets(&mut self, _dir: Option<&Path>) -> Result<(), SavingError> {
        Ok(())
    }

    /// 具名的子对象（单个对象或对象列表）
    fn children(&self) -> Vec<(String, TrackableChild)> {
        Vec::new()
    }
}

/// 对可追踪对象的共享引用
#[derive(Clone)]
pub enum TrackableRef {
    Layer(LayerRef),
    Object(Rc<RefCell<dyn Trackable>>),
}

impl TrackableRef {
    pub fn object<T: Trackable + 'static>(value: T) -> Self {
        Self::Object(Rc::new(RefCell::new(value)))
    }

    /// 对象身份（被引用值的地址），与遍历器对`&T`取得的地址一致
    pub fn identity(&self) -> usize {
        match self {
            Self::Layer(layer) => layer.as_ptr().cast::<()>() as usize,
            Self::Object(object) => object.as_ptr().cast::<()>() as usize,
        }
    }

    fn class_name(&self) -> Option<&'static str> {
        match self {
            Self::Layer(layer) => layer.try_borrow().ok().map(|l| l.class_name()),
            Self::Object(object) => object.try_borrow().ok().map(|o| o.class_name()),
        }
    }
}

impl From<LayerRef> for TrackableRef {
    fn from(layer: LayerRef) -> Self {
        Self::Layer(layer)
    }
}

/// 子对象：单个对象，或对象列表（如模型的`layers`）
#[derive(Clone)]
pub enum TrackableChild {
    Single(TrackableRef),
    Container(Vec<TrackableRef>),
}

fn identity_of<T: ?Sized>(value: &T) -> usize {
    (value as *const T).cast::<()>() as usize
}

fn join_path(inner_path: &str, name: &str) -> String {
    if inner_path.is_empty() {
        name.to_string()
    } else {
        format!("{inner_path}/{name}")
    }
}

/// 按类别跳过列表过滤后、按属性名排序的子对象
fn walk_children<T: Trackable + ?Sized>(trackable: &T) -> Vec<(String, TrackableChild)> {
    let skiplist = trackable.kind().attr_skiplist();
    let mut children = trackable
        .children()
        .into_iter()
        .filter(|(name, _)| !name.starts_with("__") && !skiplist.contains(&name.as_str()))
        .collect::<Vec<_>>();
    children.sort_by(|a, b| a.0.cmp(&b.0));
    children
}

/// 为容器中的对象分配路径名：同类的第二个起加`_1`、`_2`……
#[derive(Default)]
struct ContainerNamer {
    used_names: HashMap<String, usize>,
}

impl ContainerNamer {
    fn next(&mut self, class_name: &str) -> String {
        let name = to_snake_case(class_name);
        match self.used_names.get_mut(&name) {
            Some(count) => {
                *count += 1;
                format!("{name}_{count}")
            }
            None => {
                self.used_names.insert(name.clone(), 0);
                name
            }
        }
    }
}

/// 状态遍历器：把对象树的变量/资源写入存储，或从存储读回
pub struct StateWalker<'a> {
    weights_store: Option<&'a mut WeightsStoreKind>,
    assets_store: Option<&'a mut DiskIOStore>,
    skip_mismatch: bool,
    visited: HashSet<usize>,
}

impl<'a> StateWalker<'a> {
    pub fn new(
        weights_store: Option<&'a mut WeightsStoreKind>,
        assets_store: Option<&'a mut DiskIOStore>,
    ) -> Self {
        Self {
            weights_store,
            assets_store,
            skip_mismatch: false,
            visited: HashSet::new(),
        }
    }

    /// 加载时遇到变量/资源不匹配的对象仅告警并跳过
    pub const fn with_skip_mismatch(mut self, skip_mismatch: bool) -> Self {
        self.skip_mismatch = skip_mismatch;
        self
    }

    /// 已访问的对象个数
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    // ========== 保存 ==========

    pub fn save<T: Trackable + ?Sized>(
        &mut self,
        trackable: &T,
        inner_path: &str,
    ) -> Result<(), SavingError> {
        let id = identity_of(trackable);
        if self.visited.contains(&id) {
            return Ok(());
        }
        if trackable.has_own_variables() {
            if let Some(store) = self.weights_store.as_deref_mut() {
                trackable.save_own_variables(store.make(inner_path)?)?;
            }
        }
        if trackable.has_assets() {
            if let Some(store) = self.assets_store.as_deref_mut() {
                trackable.save_assets(&store.make(inner_path)?)?;
            }
        }
        self.visited.insert(id);

        for (attr, child) in walk_children(trackable) {
            let path = join_path(inner_path, &attr);
            match child {
                TrackableChild::Single(child) => self.save_ref(&child, &path)?,
                TrackableChild::Container(items) => {
                    let mut namer = ContainerNamer::default();
                    for item in &items {
                        let Some(class_name) = item.class_name() else {
                            // 正在借用中的对象必然处于当前遍历路径上
                            continue;
                        };
                        self.save_ref(item, &join_path(&path, &namer.next(class_name)))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn save_ref(&mut self, child: &TrackableRef, path: &str) -> Result<(), SavingError> {
        if self.visited.contains(&child.identity()) {
            return Ok(());
        }
        match child {
            TrackableRef::Layer(layer) => {
                let layer = layer.try_borrow().map_err(|_| SavingError::Busy(path.to_string()))?;
                self.save(&*layer, path)
            }
            TrackableRef::Object(object) => {
                let object = object.try_borrow().map_err(|_| SavingError::Busy(path.to_string()))?;
                self.save(&*object, path)
            }
        }
    }

    // ========== 加载 ==========

    pub fn load<T: Trackable + ?Sized>(
        &mut self,
        trackable: &mut T,
        inner_path: &str,
    ) -> Result<(), SavingError> {
        let id = identity_of(trackable);
        if self.visited.contains(&id) {
            return Ok(());
        }
        if trackable.has_own_variables() {
            if let Some(store) = self.weights_store.as_deref_mut() {
                let result = store
                    .get(inner_path)
                    .and_then(|group| trackable.load_own_variables(&group));
                self.check_mismatch(result, "权重", trackable.class_name(), inner_path)?;
            }
        }
        if trackable.has_assets() {
            if let Some(store) = self.assets_store.as_deref() {
                let dir: Option<PathBuf> = store.get(inner_path);
                let result = trackable.load_assets(dir.as_deref());
                self.check_mismatch(result, "资源", trackable.class_name(), inner_path)?;
            }
        }
        self.visited.insert(id);

        for (attr, child) in walk_children(&*trackable) {
            let path = join_path(inner_path, &attr);
            match child {
                TrackableChild::Single(child) => self.load_ref(&child, &path)?,
                TrackableChild::Container(items) => {
                    let mut namer = ContainerNamer::default();
                    for item in &items {
                        let Some(class_name) = item.class_name() else {
                            continue;
                        };
                        self.load_ref(item, &join_path(&path, &namer.next(class_name)))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn load_ref(&mut self, child: &TrackableRef, path: &str) -> Result<(), SavingError> {
        if self.visited.contains(&child.identity()) {
            return Ok(());
        }
        match child {
            TrackableRef::Layer(layer) => {
                let mut layer = layer
                    .try_borrow_mut()
                    .map_err(|_| SavingError::Busy(path.to_string()))?;
                self.load(&mut *layer, path)
            }
            TrackableRef::Object(object) => {
                let mut object = object
                    .try_borrow_mut()
                    .map_err(|_| SavingError::Busy(path.to_string()))?;
                self.load(&mut *object, path)
            }
        }
    }

    fn check_mismatch(
        &self,
        result: Result<(), SavingError>,
        what: &str,
        class_name: &str,
        path: &str,
    ) -> Result<(), SavingError> {
        match result {
            Err(e) if self.skip_mismatch => {
                tracing::warn!("无法加载对象{class_name}（路径“{path}”）的{what}，已跳过：{e}");
                Ok(())
            }
            other => other,
        }
    }
}
