//! End-to-end training example on the synthetic stripe dataset.
//!
//! Trains the convolutional classifier to recognize the position of a bright
//! horizontal band, verifies the analytic gradients against the numerical
//! oracle on a small batch first, and round-trips the learned parameters
//! through a snapshot file.

use ndarray::s;
use scratchnet::{
    compare, ConvParams, DatasetConfig, NetworkConfig, OptimizerKind, SimpleConvNet,
    StripeDataset, TrainerConfig, WeightInit,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🧮 scratchnet - Stripe Classification");
    println!("=====================================\n");

    let network_config = NetworkConfig {
        input_dim: (1, 12, 12),
        conv: ConvParams {
            filter_num: 8,
            filter_size: 3,
            pad: 1,
            stride: 1,
        },
        hidden_size: 32,
        output_size: 4,
        weight_init: WeightInit::Std(0.01),
        seed: 42,
    };
    let trainer_config = TrainerConfig {
        iterations: 300,
        batch_size: 32,
        optimizer: OptimizerKind::AdaptiveMomentum,
        learning_rate: None,
        log_every: 20,
        seed: 7,
    };

    println!("Configuration:");
    println!("  Input: {:?}", network_config.input_dim);
    println!(
        "  Conv: {} filters of {}x{}",
        network_config.conv.filter_num,
        network_config.conv.filter_size,
        network_config.conv.filter_size
    );
    println!("  Hidden: {}", network_config.hidden_size);
    println!("  Iterations: {}", trainer_config.iterations);
    println!();

    println!("📊 Generating dataset...");
    let dataset = StripeDataset::generate(DatasetConfig::default());
    let (train, test) = dataset.split(0.8);
    println!("  Training samples: {}", train.len());
    println!("  Test samples: {}", test.len());
    println!();

    let mut net = SimpleConvNet::from_seed(&network_config)?;

    // Verify the hand-written gradients before spending time on training.
    println!("🔍 Checking gradients on a 3-example batch...");
    let check_x = train.images.slice(s![..3, .., .., ..]).to_owned();
    let check_labels = train.labels.select(&[0, 1, 2]);
    let analytic = net.gradient(&check_x, &check_labels)?;
    let numerical = net.numerical_gradient(&check_x, &check_labels)?;
    for (name, error) in compare(&analytic, &numerical)? {
        println!("  {name}: max relative error {error:.2e}");
        scratchnet::logging::log_gradient_check(&name, error).ok();
    }
    println!();

    println!("🎓 Training...");
    let result = scratchnet::train(&mut net, &train.images, &train.labels, &trainer_config)?;
    println!(
        "  First batch loss: {:.4}",
        result.loss_history.first().copied().unwrap_or(0.0)
    );
    println!(
        "  Last batch loss:  {:.4}",
        result.loss_history.last().copied().unwrap_or(0.0)
    );
    println!("  Elapsed: {} ms", result.total_elapsed_ms);
    println!();

    let train_accuracy = result.final_train_accuracy;
    let test_accuracy = net.accuracy(&test.images, &test.labels, 20)?;
    println!("📈 Accuracy:");
    println!("  Train: {:.1}%", train_accuracy * 100.0);
    println!("  Test:  {:.1}%", test_accuracy * 100.0);
    println!();

    let snapshot_path = std::env::temp_dir().join("scratchnet-stripes.bin");
    net.save_params(&snapshot_path)?;
    let mut reloaded = SimpleConvNet::from_seed(&network_config)?;
    reloaded.load_params(&snapshot_path)?;
    let reloaded_accuracy = reloaded.accuracy(&test.images, &test.labels, 20)?;
    println!("💾 Snapshot round trip: test accuracy {:.1}%", reloaded_accuracy * 100.0);
    std::fs::remove_file(&snapshot_path).ok();

    Ok(())
}
