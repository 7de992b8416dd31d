use criterion::{Criterion, black_box, criterion_group, criterion_main};

use rust_dropnet::data::Batch;
use rust_dropnet::{Activation, Layer, LearnRule, Loss, NeuralNetwork, Tensor};

fn network_128_256_256_10() -> NeuralNetwork {
    let mut net = NeuralNetwork::new(
        vec![
            Layer::dropout_fully_connected(256, 0.2).unwrap(),
            Layer::activation(Activation::ReLU).unwrap(),
            Layer::dropout_fully_connected(256, 0.5).unwrap(),
            Layer::activation(Activation::ReLU).unwrap(),
            Layer::fully_connected(10).unwrap(),
        ],
        Loss::softmax_cross_entropy(10),
    )
    .unwrap();
    net.setup_with_seed(128, 0).unwrap();
    net
}

fn batch(size: usize) -> Batch {
    let x = Tensor::from_vec(
        &[size, 128],
        (0..size * 128).map(|i| ((i % 17) as f64) * 0.01).collect(),
    )
    .unwrap();
    Batch {
        x,
        y: (0..size).map(|i| i % 10).collect(),
    }
}

fn forward_bench(c: &mut Criterion) {
    let mut net = network_128_256_256_10();
    let batch = batch(64);

    c.bench_function("network_forward_inference_b64_128_256_256_10", |b| {
        b.iter(|| {
            let out = net.forward(black_box(&batch.x), false).unwrap();
            black_box(out);
        })
    });
}

fn train_step_bench(c: &mut Criterion) {
    let mut net = network_128_256_256_10();
    let batch = batch(64);
    let mut state = LearnRule::Momentum {
        learn_rate: 1e-3,
        momentum: 0.9,
    }
    .state(&net)
    .unwrap();

    c.bench_function("network_train_step_b64_128_256_256_10", |b| {
        b.iter(|| {
            let loss = net.train_step(black_box(&batch)).unwrap();
            state.step(&mut net).unwrap();
            black_box(loss);
        })
    });
}

criterion_group!(benches, forward_bench, train_step_bench);
criterion_main!(benches);
