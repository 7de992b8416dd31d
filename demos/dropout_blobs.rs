use std::ops::ControlFlow;

use rand::Rng;
use tracing_subscriber::EnvFilter;

use rust_dropnet::{
    Activation, DatasetProvider, DropoutFullyConnected, ErrorRate, InMemoryDataset, Init, Layer,
    LearnRule, Loss, NeuralNetwork, ParamConfig, StandardScaler, SupervisedInput, Tensor,
    TrainConfig, Validation,
};

fn main() -> rust_dropnet::Result<()> {
    // RUST_LOG=rust_dropnet=debug shows per-layer setup too.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = TrainConfig {
        max_epochs: 40,
        batch_size: 32,
        learn_rule: LearnRule::Momentum {
            learn_rate: 0.05,
            momentum: 0.9,
        },
        seed: 0,
    };
    cfg.validate()?;
    let mut rng = cfg.rng();

    // Four overlapping blobs in 2D, far from the origin and on a large scale.
    let centers = [[10.0, 10.0], [30.0, 10.0], [10.0, 30.0], [30.0, 30.0]];
    let n_per_class = 250;
    let mut data = Vec::with_capacity(centers.len() * n_per_class * 2);
    let mut labels = Vec::with_capacity(centers.len() * n_per_class);
    for (class, center) in centers.iter().enumerate() {
        for _ in 0..n_per_class {
            data.push(center[0] + rng.gen_range(-8.0..8.0));
            data.push(center[1] + rng.gen_range(-8.0..8.0));
            labels.push(class);
        }
    }

    let features = Tensor::from_vec(&[labels.len(), 2], data)?;
    let dataset = InMemoryDataset::new(features, labels, 0.2, &mut rng)?;
    let raw_train = dataset.train_input(cfg.batch_size)?;
    let raw_test = dataset.test_input()?;

    // Scaling statistics come from the training partition only.
    let mut scaler = StandardScaler::new();
    let train = cfg.input(
        scaler.fit_transform(raw_train.features())?,
        raw_train.labels().to_vec(),
    )?;
    let test = SupervisedInput::full_batch(
        scaler.transform(raw_test.features())?,
        raw_test.labels().to_vec(),
    )?;

    let decay = ParamConfig::new(Init::He).with_weight_decay(1e-4);
    let mut net = NeuralNetwork::new(
        vec![
            Layer::dropout(0.1)?,
            DropoutFullyConnected::new(64, 0.0)?.with_weights(decay).into(),
            Layer::activation(Activation::ReLU)?,
            DropoutFullyConnected::new(dataset.n_classes(), 0.3)?
                .with_weights(decay)
                .into(),
        ],
        Loss::softmax_cross_entropy(dataset.n_classes()),
    )?;
    net.setup(2, &mut rng)?;

    let mut best = f64::INFINITY;
    let mut stale = 0;
    let mut error_rate = ErrorRate;
    let report = cfg.optimizer()?.train_with_hook(
        &mut net,
        &train,
        &mut rng,
        Some(Validation::new(&test, &mut error_rate)),
        |epoch| {
            let err = epoch.validation.unwrap_or(f64::INFINITY);
            if err < best {
                best = err;
                stale = 0;
            } else {
                stale += 1;
            }
            // Give up after ten epochs without improvement.
            if stale >= 10 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        },
    )?;

    println!(
        "epochs={} stopped_early={} final_loss={:?} test_error={:?}",
        report.epochs.len(),
        report.stopped_early,
        report.final_loss(),
        report.final_validation()
    );
    if let Some(w) = net.first_weights() {
        println!("first layer weights: shape={:?}", w.shape());
    }
    Ok(())
}
