// Demonstration of a Greenbench model comparison
use greenbench_core::{
    init, BenchmarkOrchestrator, ComparisonOptions, ComparisonRequest, Config, GroundTruthImage,
    Winner,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize Greenbench
    init()?;

    println!("🌱 Greenbench Vision Model Comparison Demo");
    println!("==========================================");

    // Ground-truth set: parking lot images with known car counts
    let images = vec![
        GroundTruthImage::new("lot_north.jpg", 12),
        GroundTruthImage::new("lot_south.jpg", 7),
        GroundTruthImage::new("lot_empty.jpg", 0).with_description("overnight, empty"),
        GroundTruthImage::new("lot_entrance.jpg", 3),
        GroundTruthImage::new("lot_overflow.jpg", 21),
    ];

    let request = ComparisonRequest {
        model_a: "Trained_yolov5".to_string(),
        model_b: "Trained_yolov8".to_string(),
        images,
        options: ComparisonOptions {
            carbon_tracking: true,
            detailed_metrics: true,
            ..ComparisonOptions::default()
        },
    };

    println!("📊 Comparison Setup:");
    println!("   Model A: {}", request.model_a);
    println!("   Model B: {}", request.model_b);
    println!("   Images: {}", request.images.len());
    println!("   Confidence threshold: {}", request.options.confidence_threshold);
    println!();

    // Run the comparison
    println!("🏃 Running comparison...");
    let mut orchestrator = BenchmarkOrchestrator::new(Config::default());
    let result = orchestrator.run(&request)?;

    println!("✅ Comparison completed!");
    println!();
    println!("{}", result.summary);
    println!();

    // Per-model metric bundles
    for outcome in [&result.model_a, &result.model_b] {
        println!("📈 {} Metrics:", outcome.identifier);
        match &outcome.metrics {
            Some(m) => {
                println!("   Accuracy: {:.3}", m.accuracy);
                println!("   Precision / Recall / F1: {:.3} / {:.3} / {:.3}", m.precision, m.recall, m.f1_score);
                println!("   Speed: {:.1} ms/image", m.speed_ms);
                if let Some(fps) = m.throughput_fps {
                    println!("   Throughput: {:.1} FPS", fps);
                }
                println!("   Peak memory: {:.1} MB", m.memory_mb);
                println!("   Carbon emissions: {:.6} kg CO2", m.carbon_emissions);
                println!("   Green score: {:.1}/100", m.green_score);
            }
            None => {
                println!("   Run failed: {}", outcome.error.as_deref().unwrap_or("unknown"));
            }
        }
        println!();
    }

    match result.winner {
        Some(Winner::ModelA) => println!("🏆 Winner: {}", result.model_a.identifier),
        Some(Winner::ModelB) => println!("🏆 Winner: {}", result.model_b.identifier),
        Some(Winner::Tie) => println!("🤝 Result: tie"),
        None => println!("❌ No winner (both runs failed)"),
    }
    println!("⏱️  Total duration: {:.2}s", result.total_duration.as_secs_f64());
    println!();
    println!("🎉 Comparison demo completed successfully!");

    Ok(())
}
