use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rust_dropnet::{
    Activation, ErrorRate, FitReport, Layer, LearnRule, Loss, NeuralNetwork,
    StochasticGradientDescent, SupervisedInput, Tensor, TrainConfig, Validation,
};

/// Two square blobs around (-2, -2) and (2, 2); linearly separable.
fn blobs(n: usize, seed: u64) -> (Tensor, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Uniform::new(-1.0, 1.0);
    let mut data = Vec::with_capacity(2 * n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let label = i % 2;
        let center = if label == 0 { -2.0 } else { 2.0 };
        data.push(center + noise.sample(&mut rng));
        data.push(center + noise.sample(&mut rng));
        labels.push(label);
    }
    (Tensor::from_vec(&[n, 2], data).unwrap(), labels)
}

fn linear_net(seed: u64) -> NeuralNetwork {
    let mut net = NeuralNetwork::new(
        vec![Layer::fully_connected(2).unwrap()],
        Loss::softmax_cross_entropy(2),
    )
    .unwrap();
    net.setup_with_seed(2, seed).unwrap();
    net
}

fn fit_linear(seed: u64) -> (NeuralNetwork, FitReport) {
    let (x, y) = blobs(200, 7);
    let input = SupervisedInput::new(x, y, 10).unwrap();
    let mut net = linear_net(seed);
    let sgd = StochasticGradientDescent::new(
        50,
        LearnRule::Momentum {
            learn_rate: 0.1,
            momentum: 0.0,
        },
    )
    .unwrap();
    let report = sgd
        .train(&mut net, &input, &mut StdRng::seed_from_u64(seed), None)
        .unwrap();
    (net, report)
}

#[test]
fn linear_model_separates_blobs() {
    let (mut net, report) = fit_linear(0);
    assert_eq!(report.epochs.len(), 50);

    let (x, y) = blobs(200, 7);
    let eval = SupervisedInput::full_batch(x, y).unwrap();
    let accuracy = 1.0 - net.error(&eval).unwrap();
    assert!(accuracy >= 0.99, "accuracy {accuracy}");

    let first = report.epochs[0].train_loss;
    let last = report.final_loss().unwrap();
    assert!(last < first, "loss did not decrease: {first} -> {last}");
}

#[test]
fn training_is_bit_reproducible() {
    let (a, ra) = fit_linear(3);
    let (b, rb) = fit_linear(3);
    assert_eq!(ra, rb);

    let bits = |net: &NeuralNetwork| -> Vec<u64> {
        net.parameters()
            .flat_map(|p| p.value().as_slice().iter().map(|v| v.to_bits()).collect::<Vec<_>>())
            .collect()
    };
    assert_eq!(bits(&a), bits(&b));
}

#[test]
fn dropout_network_is_reproducible_and_learns() {
    let cfg = TrainConfig {
        max_epochs: 30,
        batch_size: 16,
        learn_rule: LearnRule::Momentum {
            learn_rate: 0.05,
            momentum: 0.9,
        },
        seed: 11,
    };

    let run = || {
        let (x, y) = blobs(200, 8);
        let input = SupervisedInput::new(x, y, cfg.batch_size).unwrap();
        let mut net = NeuralNetwork::new(
            vec![
                Layer::dropout(0.1).unwrap(),
                Layer::dropout_fully_connected(16, 0.2).unwrap(),
                Layer::activation(Activation::ReLU).unwrap(),
                Layer::fully_connected(2).unwrap(),
            ],
            Loss::softmax_cross_entropy(2),
        )
        .unwrap();
        net.setup_with_seed(2, cfg.seed).unwrap();

        let mut error_rate = ErrorRate;
        let report = cfg
            .optimizer()
            .unwrap()
            .train(
                &mut net,
                &input,
                &mut StdRng::seed_from_u64(cfg.seed),
                Some(Validation::new(&input, &mut error_rate)),
            )
            .unwrap();
        (net, report)
    };

    let (_, a) = run();
    let (_, b) = run();
    assert_eq!(a, b);
    assert!(a.final_validation().unwrap() <= 0.02, "{:?}", a.final_validation());
}
