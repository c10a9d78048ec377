//! 擦除服务的核心类型：错误、数据模型与协作方接口。

pub mod errors;
pub mod models;
pub mod traits;

pub use errors::{ErasureError, ErasureResult};
