#[cfg(not(feature = "serde"))]
fn main() {
    println!("enable the `serde` feature: cargo run --example save_load_json --features serde");
}

#[cfg(feature = "serde")]
fn main() -> rust_dropnet::Result<()> {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_dropnet::{
        Activation, Layer, LearnRule, Loss, NeuralNetwork, StochasticGradientDescent,
        SupervisedInput,
    };

    let rows = vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    let train = SupervisedInput::from_rows(&rows, vec![0, 1, 1, 0], 4)?;

    let mut net = NeuralNetwork::new(
        vec![
            Layer::dropout_fully_connected(8, 0.1)?,
            Layer::activation(Activation::Tanh)?,
            Layer::fully_connected(2)?,
        ],
        Loss::softmax_cross_entropy(2),
    )?;
    net.setup_with_seed(2, 0)?;

    StochasticGradientDescent::new(
        200,
        LearnRule::Momentum {
            learn_rate: 0.1,
            momentum: 0.9,
        },
    )?
    .train(&mut net, &train, &mut StdRng::seed_from_u64(0), None)?;

    let path = "target/tmp_dropnet.json";
    net.save_json(path)?;

    let mut loaded = NeuralNetwork::load_json(path)?;
    println!(
        "saved and loaded network: {path} (error before={} after={})",
        net.error(&train)?,
        loaded.error(&train)?
    );
    Ok(())
}
