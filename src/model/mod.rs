//! Model definitions for the binary ResNet classifier

pub mod artifact;
pub mod blocks;
pub mod resnet;

pub use artifact::{load_artifact, save_artifact};
pub use blocks::{ConvBnRelu, IdentityBlock, ProjectionBlock, ResNetStage};
pub use resnet::{ModelSummary, ResNet, ResNetConfig};
