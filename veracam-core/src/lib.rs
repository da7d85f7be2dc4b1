pub mod error;
pub mod frozen;
pub mod metadata;
pub mod tile_tree;

pub use error::{Result, VeracamError};
pub use frozen::{FrozenImage, ImageFormat};
pub use metadata::{DeviceClass, GeoFix, MetadataBundle, MotionSample, SensorFlags};
pub use tile_tree::{TileHashTree, TileTreeBuilder, DEFAULT_TILE_SIZE};
