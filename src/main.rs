use anyhow::{Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gauss_cluster::{Cluster, ClusterConfig, LinearSystem, SystemFile};

fn demo_system() -> Result<SystemFile> {
    let system = LinearSystem::new(
        vec![vec![2.0, 1.0, 1.0], vec![4.0, 3.0, 3.0], vec![8.0, 7.0, 9.0]],
        vec![4.0, 10.0, 24.0],
    )?;
    Ok(SystemFile {
        system,
        config: ClusterConfig::simulated_network(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let file = match std::env::args().nth(1) {
        Some(path) => SystemFile::load(&path).with_context(|| format!("loading system from {path}"))?,
        None => {
            info!("No system file given, solving the built-in 3x3 demo");
            demo_system()?
        }
    };
    let SystemFile { system, config } = file;
    let tolerance = config.pivot_tolerance;

    let (cluster, _stores) = Cluster::in_memory(&system, config)?;
    let solved = cluster.solve().await;
    cluster.shutdown().await?;
    let x = solved.context("distributed solve failed")?;

    let reference = system.solve_sequential(tolerance)?;
    for (index, (value, expected)) in x.iter().zip(&reference).enumerate() {
        println!("x[{index}] = {value:.12}  (sequential {expected:.12})");
    }
    println!("residual = {:e}", system.residual(&x));

    for node in cluster.nodes() {
        let snapshot = node.metrics().snapshot().await;
        info!(node = node.id(), metrics = %serde_json::to_string(&snapshot)?, "Node metrics");
    }
    Ok(())
}
