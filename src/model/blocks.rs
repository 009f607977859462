//! Residual building blocks
//!
//! Bottleneck blocks as used by ResNet-50/101/152: a 1x1 reduction, a 3x3
//! convolution and a 1x1 expansion to `4 * filters` channels, with the input
//! added back before the final ReLU.

use burn::{
    module::{Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::utils::error::{ResNetError, Result};

/// Channel expansion of the last 1x1 convolution in a bottleneck
pub const EXPANSION: usize = 4;

/// Zero-initialized bias of `len` elements
pub fn zero_bias<B: Backend>(len: usize, device: &B::Device) -> Param<Tensor<B, 1>> {
    Param::from_tensor(Tensor::zeros([len], device))
}

/// Convolution with "same" padding, Glorot-uniform kernels and zero bias
///
/// Odd kernels are padded by `k / 2` on every side, which yields
/// `ceil(size / stride)` outputs.
pub fn same_conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let pad = kernel_size / 2;
    let mut conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
        .init(device);
    conv.bias = conv.bias.map(|_| zero_bias(out_channels, device));
    conv
}

/// Batch norm with momentum 0.99 / epsilon 1e-3 in moving-average terms
pub fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B> {
    BatchNormConfig::new(channels)
        .with_momentum(0.01)
        .with_epsilon(1e-3)
        .init(device)
}

fn squared_norm<B: Backend>(conv: &Conv2d<B>) -> Tensor<B, 1> {
    conv.weight.val().powf_scalar(2.0).sum()
}

/// Convolution, batch normalization and ReLU
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn new(
        in_channels: usize,
        filters: usize,
        kernel_size: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: same_conv(in_channels, filters, kernel_size, stride, device),
            bn: batch_norm(filters, device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }

    /// Sum of squared kernel weights
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        squared_norm(&self.conv)
    }
}

/// Main path shared by both residual block kinds
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    reduce: ConvBnRelu<B>,
    conv: ConvBnRelu<B>,
    expand: Conv2d<B>,
    expand_bn: BatchNorm<B>,
}

impl<B: Backend> Bottleneck<B> {
    fn new(in_channels: usize, filters: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            reduce: ConvBnRelu::new(in_channels, filters, 1, stride, device),
            conv: ConvBnRelu::new(filters, filters, 3, 1, device),
            expand: same_conv(filters, EXPANSION * filters, 1, 1, device),
            expand_bn: batch_norm(EXPANSION * filters, device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.reduce.forward(x);
        let x = self.conv.forward(x);
        let x = self.expand.forward(x);
        self.expand_bn.forward(x)
    }

    fn l2_penalty(&self) -> Tensor<B, 1> {
        self.reduce.l2_penalty() + self.conv.l2_penalty() + squared_norm(&self.expand)
    }
}

/// Residual block whose skip path is the unchanged input
///
/// The input must already have `4 * filters` channels.
#[derive(Module, Debug)]
pub struct IdentityBlock<B: Backend> {
    main: Bottleneck<B>,
    relu: Relu,
    channels: usize,
}

impl<B: Backend> IdentityBlock<B> {
    pub fn new(filters: usize, device: &B::Device) -> Self {
        let channels = EXPANSION * filters;
        Self {
            main: Bottleneck::new(channels, filters, 1, device),
            relu: Relu::new(),
            channels,
        }
    }

    /// Channels expected at the input and produced at the output
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Forward pass
    ///
    /// # Panics
    ///
    /// If the input does not have `4 * filters` channels. Use
    /// [`IdentityBlock::try_forward`] to get an error instead.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = x.clone();
        let x = self.main.forward(x);
        self.relu.forward(x + shortcut)
    }

    /// Forward pass that rejects inputs with the wrong channel count
    pub fn try_forward(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let [_, actual, _, _] = x.dims();
        if actual != self.channels {
            return Err(ResNetError::ChannelMismatch {
                expected: self.channels,
                actual,
            });
        }
        Ok(self.forward(x))
    }

    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        self.main.l2_penalty()
    }
}

/// Residual block whose skip path is a strided 1x1 convolution
///
/// Changes channel count and, with `stride > 1`, spatial size.
#[derive(Module, Debug)]
pub struct ProjectionBlock<B: Backend> {
    main: Bottleneck<B>,
    shortcut: Conv2d<B>,
    shortcut_bn: BatchNorm<B>,
    relu: Relu,
}

impl<B: Backend> ProjectionBlock<B> {
    pub fn new(in_channels: usize, filters: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            main: Bottleneck::new(in_channels, filters, stride, device),
            shortcut: same_conv(in_channels, EXPANSION * filters, 1, stride, device),
            shortcut_bn: batch_norm(EXPANSION * filters, device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = self.shortcut_bn.forward(self.shortcut.forward(x.clone()));
        let x = self.main.forward(x);
        self.relu.forward(x + shortcut)
    }

    /// Penalty over the main path only; the shortcut is not regularized
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        self.main.l2_penalty()
    }
}

/// One projection block followed by `reps - 1` identity blocks
#[derive(Module, Debug)]
pub struct ResNetStage<B: Backend> {
    projection: ProjectionBlock<B>,
    identities: Vec<IdentityBlock<B>>,
}

impl<B: Backend> ResNetStage<B> {
    /// `reps` of zero is treated as one
    pub fn new(
        in_channels: usize,
        filters: usize,
        reps: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let projection = ProjectionBlock::new(in_channels, filters, stride, device);
        let identities = (1..reps.max(1))
            .map(|_| IdentityBlock::new(filters, device))
            .collect();

        Self {
            projection,
            identities,
        }
    }

    /// Number of residual blocks in the stage
    pub fn depth(&self) -> usize {
        1 + self.identities.len()
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.projection.forward(x);
        self.identities
            .iter()
            .fold(x, |x, block| block.forward(x))
    }

    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        self.identities
            .iter()
            .fold(self.projection.l2_penalty(), |acc, block| {
                acc + block.l2_penalty()
            })
    }
}
