//! CNN model architecture
//!
//! Three convolution blocks (valid 3×3 conv, ReLU, 2×2 max-pool) followed by
//! a dense hidden layer with dropout and a dense output layer. For 256×256
//! RGB input the feature map entering the dense head is 30×30×128.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

/// Configuration for the ImageClassifier CNN
#[derive(Config, Debug)]
pub struct ImageClassifierConfig {
    /// Number of output classes
    #[config(default = "6")]
    pub num_classes: usize,

    /// Input image size (square)
    #[config(default = "256")]
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the three convolution blocks
    #[config(default = "[32, 64, 128]")]
    pub conv_filters: [usize; 3],

    #[config(default = "3")]
    pub kernel_size: usize,

    /// Width of the dense hidden layer
    #[config(default = "512")]
    pub hidden_units: usize,

    #[config(default = "0.5")]
    pub dropout: f64,
}

impl ImageClassifierConfig {
    /// Side length of the feature map after every block
    pub fn feature_map_sizes(&self) -> Vec<usize> {
        let mut size = self.input_size;
        self.conv_filters
            .iter()
            .map(|_| {
                // valid conv then 2×2 pool with stride 2 (floor)
                size = size.saturating_sub(self.kernel_size - 1) / 2;
                size
            })
            .collect()
    }

    /// Number of features entering the dense head
    pub fn flattened_features(&self) -> usize {
        let side = self.feature_map_sizes().last().copied().unwrap_or(0);
        side * side * self.conv_filters[2]
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.num_classes < 2 {
            return Err("num_classes must be at least 2".to_string());
        }
        if self.in_channels == 0 || self.hidden_units == 0 {
            return Err("in_channels and hidden_units must be positive".to_string());
        }
        if self.conv_filters.iter().any(|f| *f == 0) {
            return Err("conv_filters must be positive".to_string());
        }
        if self.kernel_size == 0 || self.kernel_size > self.input_size {
            return Err("kernel_size must be in 1..=input_size".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err("dropout must be in range [0.0, 1.0)".to_string());
        }
        if self.flattened_features() == 0 {
            return Err(format!(
                "input_size {} is too small for three {}x{} conv blocks",
                self.input_size, self.kernel_size, self.kernel_size
            ));
        }
        Ok(())
    }
}

/// Conv2d (valid padding), ReLU, MaxPool2d(2×2, stride 2)
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Image classifier CNN
///
/// Architecture:
/// - 3 convolutional blocks (32 → 64 → 128 filters by default)
/// - Flatten
/// - Dense hidden layer + ReLU + dropout
/// - Dense output layer (logits; softmax applied by `forward_softmax`)
#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    pub block1: ConvBlock<B>,
    pub block2: ConvBlock<B>,
    pub block3: ConvBlock<B>,

    pub hidden: Linear<B>,
    pub activation: Relu,
    pub dropout: Dropout,
    pub output: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> ImageClassifier<B> {
    pub fn new(config: &ImageClassifierConfig, device: &B::Device) -> Self {
        let [f1, f2, f3] = config.conv_filters;
        let k = config.kernel_size;

        Self {
            block1: ConvBlock::new(config.in_channels, f1, k, device),
            block2: ConvBlock::new(f1, f2, k, device),
            block3: ConvBlock::new(f2, f3, k, device),
            hidden: LinearConfig::new(config.flattened_features(), config.hidden_units).init(device),
            activation: Relu::new(),
            dropout: DropoutConfig::new(config.dropout).init(),
            output: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(x);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);

        // [B, C, H, W] -> [B, C*H*W]
        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.hidden.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// Class probabilities, rows sum to 1
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
