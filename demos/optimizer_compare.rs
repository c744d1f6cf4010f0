//! Compares the four update rules on the same task.
//!
//! Trains one freshly initialized network per optimizer on identical
//! mini-batch sequences (same sampling seed) and prints the loss trace, so
//! the convergence behavior of the rules can be compared directly.

use scratchnet::{
    ConvParams, DatasetConfig, NetworkConfig, OptimizerKind, SimpleConvNet, StripeDataset,
    TrainerConfig, WeightInit,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("⚖️  scratchnet - Optimizer Comparison");
    println!("====================================\n");

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

    println!("📊 Generating dataset...");
    let dataset = StripeDataset::generate(DatasetConfig::default());
    println!("  Samples: {}\n", dataset.len());

    let kinds = [
        OptimizerKind::Plain,
        OptimizerKind::Momentum,
        OptimizerKind::Adaptive,
        OptimizerKind::AdaptiveMomentum,
    ];

    for kind in kinds {
        let trainer_config = TrainerConfig {
            iterations: 200,
            batch_size: 32,
            optimizer: kind,
            learning_rate: None,
            log_every: 0,
            seed: 7,
        };

        let mut net = SimpleConvNet::from_seed(&network_config)?;
        let result = scratchnet::train(&mut net, &dataset.images, &dataset.labels, &trainer_config)?;

        println!("{kind:?} (lr {}):", kind.default_learning_rate());
        for milestone in (0..result.loss_history.len()).step_by(50) {
            println!("  iter {milestone:>4}: loss {:.4}", result.loss_history[milestone]);
        }
        println!(
            "  final loss {:.4}, train accuracy {:.1}%, {} ms\n",
            result.loss_history.last().copied().unwrap_or(0.0),
            result.final_train_accuracy * 100.0,
            result.total_elapsed_ms
        );
    }

    Ok(())
}
