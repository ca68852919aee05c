//! End-to-end quantization-aware training step.
//!
//! conv -> PACT -> linear -> sum, then backward and one SGD update over the
//! layer weights and the learnable clipping threshold.

use approx::assert_abs_diff_eq;
use cuantizar::autograd::{backward, sum};
use cuantizar::config::{build_activation_quantizer, build_optimizer, parse_spec};
use cuantizar::nn::{Conv2dConfig, Padding, QuantizedConv2d, QuantizedLinear};
use cuantizar::optim::{Optimizer, SGD};
use cuantizar::quant::{ActivationQuantizer, PactQuantizer};
use cuantizar::Tensor;

/// 1 -> 2 channel 3x3 conv with every weight equal, so the quantized kernel
/// is all ones and each output counts its in-bounds taps.
fn all_ones_conv() -> QuantizedConv2d {
    QuantizedConv2d::from_parts(
        4,
        Conv2dConfig::new(1, 2, 3).padding(Padding::Same).bias(true),
        Tensor::from_vec(vec![0.7; 18], true),
        Some(Tensor::zeros(2, true)),
    )
    .unwrap()
}

fn all_ones_linear(in_features: usize) -> QuantizedLinear {
    let weight = Tensor::from_vec(vec![0.5; in_features], true);
    QuantizedLinear::from_parts(4, in_features, 1, weight, None).unwrap()
}

#[test]
fn test_qat_step_updates_weights_and_alpha() {
    let mut conv = all_ones_conv();
    // interior outputs equal 9 and sit exactly on the threshold
    let mut pact = PactQuantizer::new(4, 9.0).unwrap();
    let mut linear = all_ones_linear(2 * 4 * 4);

    let input = Tensor::ones(16, false);
    let features = conv.forward(&input, 1, 4, 4).unwrap();
    assert_eq!(features.len(), 32);
    assert_abs_diff_eq!(features.data()[5], 9.0);

    let activations = pact.forward(&features);
    let mut loss = sum(&linear.forward(&activations, 1).unwrap());
    backward(&mut loss, None);

    // each activation receives 1 from the linear layer; 4 interior outputs
    // per channel reach α
    assert_abs_diff_eq!(pact.alpha().grad().unwrap()[0], 8.0);
    // every conv output is within [0, α], so each bias sees all 16 outputs
    let bias_grad = conv.bias().unwrap().grad().unwrap();
    assert_abs_diff_eq!(bias_grad[0], 16.0);
    assert_abs_diff_eq!(bias_grad[1], 16.0);
    assert!(conv.weight().grad().unwrap().iter().all(|g| g.is_finite()));
    assert!(linear.weight().grad().is_some());

    let weight_before = conv.weight().data().clone();
    let mut optimizer = SGD::new(0.1, 0.0);
    {
        let mut params: Vec<&mut Tensor> = conv
            .parameters_mut()
            .into_iter()
            .chain(pact.parameters_mut())
            .chain(linear.parameters_mut())
            .collect();
        optimizer.step(&mut params);
        optimizer.zero_grad(&mut params);
    }

    assert_abs_diff_eq!(pact.alpha().item(), 8.2, epsilon = 1e-5);
    assert_abs_diff_eq!(conv.bias().unwrap().data()[0], -1.6, epsilon = 1e-5);
    assert!(pact.alpha().grad().is_none());

    // the raw weight moved, it was not replaced by its quantized copy
    assert_ne!(conv.weight().data(), &weight_before);
    assert!(conv.weight().data().iter().all(|w| (*w - 0.7).abs() < 1.0));
}

#[test]
fn test_alpha_update_changes_next_forward() {
    let mut pact = PactQuantizer::new(2, 3.0).unwrap();
    let x = Tensor::from_vec(vec![0.5, 2.0, 5.0], true);

    let before = pact.forward(&x);
    assert_abs_diff_eq!(before.data()[2], 3.0);

    *pact.alpha_mut() = 1.5;
    let after = pact.forward(&x);
    assert_abs_diff_eq!(after.data()[2], 1.5);

    // the first output still differentiates against the old threshold
    let mut loss = sum(&before);
    backward(&mut loss, None);
    assert_eq!(x.grad().unwrap().to_vec(), vec![1.0, 1.0, 0.0]);
    assert_abs_diff_eq!(pact.alpha().grad().unwrap()[0], 1.0);
}

#[test]
fn test_configured_block_trains() {
    let spec = parse_spec(
        r#"
w_bit: 3
activation: {kind: fixed_clip, a_bit: 4, scale_coef: 2.0}
optimizer: {name: sgd, lr: 0.01, momentum: 0.9}
"#,
    )
    .unwrap();

    let mut linear = QuantizedLinear::new(spec.w_bit.get(), 6, 4, true).unwrap();
    let act = build_activation_quantizer(&spec.activation).unwrap();
    let mut optimizer = build_optimizer(&spec.optimizer).unwrap();

    let input = Tensor::from_vec((0..12).map(|i| i as f32 / 6.0 - 1.0).collect(), false);
    for _ in 0..3 {
        let hidden = act.forward(&linear.forward(&input, 2).unwrap());
        assert_eq!(hidden.len(), 8);
        assert!(hidden.data().iter().all(|v| (0.0..=2.0).contains(v)));

        let mut loss = sum(&hidden);
        backward(&mut loss, None);

        let mut params = linear.parameters_mut();
        optimizer.step(&mut params);
        optimizer.zero_grad(&mut params);
    }
    assert!(linear.weight().data().iter().all(|w| w.is_finite()));
}
