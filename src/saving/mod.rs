/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : 模型存档：配置的（反）序列化、对象状态遍历、权重/资源存储与存取入口
 */

mod archive;
mod error;
mod options;
mod saving_lib;
pub mod serialization;
pub mod store;
mod trackable;

pub use archive::{ArchiveReader, ArchiveWriter};
pub use error::SavingError;
pub use options::{parse_size, LoadOptions, SaveOptions, WeightsFormat};
pub use saving_lib::{
    format_utc_timestamp, load_model, load_weights_only, save_model, save_weights_only, Metadata,
    ASSETS_DIRNAME, CONFIG_FILENAME, KERAS_VERSION, METADATA_FILENAME, VARS_FILENAME,
};
pub use serialization::{
    serialize_model, DeserializationContext, LayerRegistry, SerializationContext,
    SerializationError,
};
pub use store::{
    DiskIOStore, H5IOStore, NpzIOStore, ShardedH5IOStore, VarsGroup, WeightsStore, WeightsStoreKind,
    DEFAULT_SHARD_SIZE,
};
pub use trackable::{StateWalker, Trackable, TrackableChild, TrackableKind, TrackableRef};

#[cfg(test)]
mod tests;
