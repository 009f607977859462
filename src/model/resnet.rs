//! ResNet assembly
//!
//! Stem, four bottleneck stages, global average pooling and a single-logit
//! head for binary classification.

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Initializer, Linear, LinearConfig,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::model::blocks::{zero_bias, ConvBnRelu, ResNetStage, EXPANSION};

/// Configuration for a bottleneck ResNet; the defaults build ResNet-101
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the 7x7 stem convolution
    #[config(default = "64")]
    pub stem_filters: usize,

    /// Residual blocks per stage
    #[config(default = "[3, 4, 23, 3]")]
    pub stage_depths: [usize; 4],

    /// Bottleneck width per stage; outputs have four times as many channels
    #[config(default = "[64, 128, 256, 512]")]
    pub stage_filters: [usize; 4],

    #[config(default = "[1, 2, 2, 2]")]
    pub stage_strides: [usize; 4],
}

impl ResNetConfig {
    pub fn resnet101() -> Self {
        Self::new()
    }

    pub fn resnet50() -> Self {
        Self::new().with_stage_depths([3, 4, 6, 3])
    }

    pub fn resnet152() -> Self {
        Self::new().with_stage_depths([3, 8, 36, 3])
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.in_channels == 0 || self.stem_filters == 0 {
            return Err("in_channels and stem_filters must be positive".into());
        }
        if self.stage_depths.contains(&0) {
            return Err(format!("stage depths must be positive: {:?}", self.stage_depths));
        }
        if self.stage_filters.contains(&0) {
            return Err(format!("stage filters must be positive: {:?}", self.stage_filters));
        }
        if self.stage_strides.contains(&0) {
            return Err(format!("stage strides must be positive: {:?}", self.stage_strides));
        }
        Ok(())
    }

    /// Convolution and dense layers with weights: stem, three convolutions
    /// per block and the head
    pub fn weighted_layers(&self) -> usize {
        1 + 3 * self.stage_depths.iter().sum::<usize>() + 1
    }

    /// Channels entering the head
    pub fn feature_channels(&self) -> usize {
        EXPANSION * self.stage_filters[3]
    }

    /// `(channels, height, width)` after the stem pool and after each stage
    /// for a square input of `input_size`
    pub fn output_shapes(&self, input_size: usize) -> Vec<(usize, usize, usize)> {
        let stem = input_size.div_ceil(2);
        let pooled = stem.saturating_sub(3) / 2 + 1;

        let mut shapes = vec![(self.stem_filters, pooled, pooled)];
        let mut size = pooled;
        for (filters, stride) in self.stage_filters.iter().zip(self.stage_strides) {
            size = size.div_ceil(stride);
            shapes.push((EXPANSION * filters, size, size));
        }
        shapes
    }

    /// Initialize a new model
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let stem = ConvBnRelu::new(self.in_channels, self.stem_filters, 7, 2, device);
        let pool = MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init();

        let mut in_channels = self.stem_filters;
        let mut stages = Vec::with_capacity(4);
        for i in 0..4 {
            let filters = self.stage_filters[i];
            stages.push(ResNetStage::new(
                in_channels,
                filters,
                self.stage_depths[i],
                self.stage_strides[i],
                device,
            ));
            in_channels = EXPANSION * filters;
        }

        let mut head = LinearConfig::new(in_channels, 1)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        head.bias = head.bias.map(|_| zero_bias(1, device));

        ResNet {
            stem,
            pool,
            stages,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head,
        }
    }
}

/// Bottleneck residual network with one output logit
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    stem: ConvBnRelu<B>,
    pool: MaxPool2d,
    stages: Vec<ResNetStage<B>>,
    global_pool: AdaptiveAvgPool2d,
    head: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// Pooled features of shape `[batch, feature_channels]`
    pub fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stem.forward(input);
        let x = self.pool.forward(x);
        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));
        let x = self.global_pool.forward(x);
        x.flatten(1, 3)
    }

    /// Logits of shape `[batch, 1]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.features(input))
    }

    /// Probability of the positive class, shape `[batch]`
    pub fn predict(&self, input: Tensor<B, 4>) -> Tensor<B, 1> {
        let logits = self.forward(input);
        let [batch, _] = logits.dims();
        sigmoid(logits).reshape([batch])
    }

    /// Sum of squared main-path convolution kernels
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        self.stages
            .iter()
            .fold(self.stem.l2_penalty(), |acc, stage| acc + stage.l2_penalty())
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }
}

/// Parameter count and per-stage output shapes of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub input_size: usize,
    pub weighted_layers: usize,
    pub parameters: usize,
    /// `(name, (channels, height, width))`
    pub shapes: Vec<(String, (usize, usize, usize))>,
}

impl ModelSummary {
    pub fn new<B: Backend>(model: &ResNet<B>, config: &ResNetConfig, input_size: usize) -> Self {
        let names = ["stem", "stage1", "stage2", "stage3", "stage4"];
        let shapes = names
            .iter()
            .map(|name| name.to_string())
            .zip(config.output_shapes(input_size))
            .collect();

        Self {
            input_size,
            weighted_layers: config.weighted_layers(),
            parameters: model.num_params(),
            shapes,
        }
    }
}

impl std::fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "ResNet ({} weighted layers), input 3x{}x{}",
            self.weighted_layers, self.input_size, self.input_size
        )?;
        for (name, (c, h, w)) in &self.shapes {
            writeln!(f, "  {name:<8} {c:>5} x {h:>3} x {w:>3}")?;
        }
        write!(f, "  head     1 logit\n  parameters: {}", self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    /// Small widths keep the forward pass cheap
    fn tiny_config() -> ResNetConfig {
        ResNetConfig::new()
            .with_stem_filters(4)
            .with_stage_depths([1, 2, 1, 1])
            .with_stage_filters([2, 2, 4, 4])
    }

    #[test]
    fn test_resnet101_preset() {
        let config = ResNetConfig::resnet101();
        assert_eq!(config.stage_depths, [3, 4, 23, 3]);
        assert_eq!(config.stage_filters, [64, 128, 256, 512]);
        assert_eq!(config.stage_strides, [1, 2, 2, 2]);
        assert_eq!(config.weighted_layers(), 101);
        assert_eq!(config.feature_channels(), 2048);
        assert!(config.validate().is_ok());

        assert_eq!(ResNetConfig::resnet50().weighted_layers(), 50);
        assert_eq!(ResNetConfig::resnet152().weighted_layers(), 152);
    }

    #[test]
    fn test_output_shapes_for_227_input() {
        let shapes = ResNetConfig::resnet101().output_shapes(227);
        assert_eq!(
            shapes,
            vec![
                (64, 56, 56),
                (256, 56, 56),
                (512, 28, 28),
                (1024, 14, 14),
                (2048, 7, 7),
            ]
        );
    }

    #[test]
    fn test_validate_rejects_zero_depth() {
        let config = ResNetConfig::new().with_stage_depths([3, 0, 23, 3]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_forward_produces_one_logit_per_image() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);
        assert_eq!(model.num_stages(), 4);

        let input = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);
        assert_eq!(model.features(input.clone()).dims(), [2, 16]);
        assert_eq!(model.forward(input.clone()).dims(), [2, 1]);

        let probs: Vec<f32> = model.predict(input).into_data().to_vec().unwrap();
        assert_eq!(probs.len(), 2);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_summary_reports_parameters_and_shapes() {
        let device = Default::default();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);

        let summary = ModelSummary::new(&model, &config, 32);
        assert_eq!(summary.weighted_layers, 17);
        assert_eq!(summary.shapes.len(), 5);
        assert_eq!(summary.shapes[4], ("stage4".to_string(), (16, 1, 1)));
        assert_eq!(summary.parameters, model.num_params());
        assert!(summary.parameters > 0);
        assert!(summary.to_string().contains("parameters"));
    }

    #[test]
    fn test_head_starts_glorot_with_zero_bias() {
        let device = Default::default();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);

        let bias: Vec<f32> = model.head.bias.clone().unwrap().val().into_data().to_vec().unwrap();
        assert_eq!(bias, vec![0.0]);

        // Glorot-uniform bound for a [fan_in, 1] kernel
        let fan_in = config.feature_channels() as f32;
        let bound = (6.0 / (fan_in + 1.0)).sqrt();
        let max: f32 = model.head.weight.val().abs().max().into_scalar();
        assert!(max > 0.0 && max <= bound);
    }

    #[test]
    fn test_l2_penalty_is_positive() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);
        let penalty: f32 = model.l2_penalty().into_scalar();
        assert!(penalty > 0.0);
    }
}
