use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use glam::{Quat, UVec3, Vec3};
use gridphase_common::{Aabb, Collider, ColliderBody, EntityId, RigidTransform, SplitMix64};
use gridphase_layer::{BuildCollisionLayer, CollisionLayer, LayerSettings};
use gridphase_pairs::{
    FindPairsProcessor, FindPairsResult, SafeLookup, find_pairs, find_pairs_between,
};
use gridphase_tools::LayerInspector;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridphase-cli", about = "CLI tool for gridphase broad-phase operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML file with layer settings (origin, cell_size, subdivisions)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Build a layer from a generated scene and describe it
    Build {
        /// Number of bodies to generate
        #[arg(short, long, default_value = "1000")]
        bodies: usize,
        /// RNG seed for the scene
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Build on the whole pool instead of one worker
        #[arg(long)]
        parallel: bool,
        /// Print the bucket table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a self query over a generated scene
    Pairs {
        /// Number of bodies to generate
        #[arg(short, long, default_value = "1000")]
        bodies: usize,
        /// RNG seed for the scene
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Execution strategy
        #[arg(long, value_enum, default_value = "parallel")]
        strategy: Strategy,
        /// Compare the result against a brute-force check
        #[arg(long)]
        validate: bool,
    },
    /// Mark spawn points that overlap obstacles
    SpawnCheck {
        /// Number of candidate spawn points
        #[arg(long, default_value = "64")]
        spawn_points: usize,
        /// Number of obstacles
        #[arg(long, default_value = "2000")]
        obstacles: usize,
        /// RNG seed for the scene
        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    Immediate,
    Run,
    Single,
    Parallel,
    Tracked,
    Cached,
    Unsafe,
    Scheduled,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("gridphase-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("layer: {}", gridphase_layer::crate_info());
            println!("pairs: {}", gridphase_pairs::crate_info());
            println!("tools: {}", gridphase_tools::crate_info());
            println!(
                "grid: origin={} cell_size={} subdivisions={} buckets={}",
                settings.origin,
                settings.cell_size,
                settings.subdivisions,
                settings.bucket_count()
            );
            println!("workers: {}", rayon::current_num_threads());
        }
        Commands::Build {
            bodies,
            seed,
            parallel,
            json,
        } => {
            let scene = generate_scene(bodies, seed, settings.world_bounds());
            let builder = BuildCollisionLayer::new(&scene).with_settings(settings);
            let start = Instant::now();
            let layer = if parallel {
                builder.run_parallel()?
            } else {
                builder.run()?
            };
            println!("Built in {:?}", start.elapsed());
            println!("{}", LayerInspector::summary(&layer));
            if json {
                println!("{}", LayerInspector::to_json(&layer)?);
            }
        }
        Commands::Pairs {
            bodies,
            seed,
            strategy,
            validate,
        } => {
            let scene = generate_scene(bodies, seed, settings.world_bounds());
            let layer = Arc::new(
                BuildCollisionLayer::new(&scene)
                    .with_settings(settings)
                    .run_parallel()?,
            );
            println!("{}", LayerInspector::summary(&layer));

            let start = Instant::now();
            let collector = run_strategy(Arc::clone(&layer), strategy)?;
            let elapsed = start.elapsed();
            let pairs = collector.into_pairs();
            println!("Strategy {strategy:?}: {} pairs in {elapsed:?}", pairs.len());

            if validate {
                let found: BTreeSet<(usize, usize)> =
                    pairs.iter().map(|&(a, b)| (a.min(b), a.max(b))).collect();
                let expected = brute_force(&scene);
                let duplicates = pairs.len() - found.len();
                println!(
                    "Validation: expected={} found={} duplicates={} {}",
                    expected.len(),
                    found.len(),
                    duplicates,
                    if found == expected && duplicates == 0 {
                        "OK"
                    } else {
                        "MISMATCH"
                    }
                );
                anyhow::ensure!(
                    found == expected && duplicates == 0,
                    "pair set differs from brute force"
                );
            }
        }
        Commands::SpawnCheck {
            spawn_points,
            obstacles,
            seed,
        } => {
            let world = settings.world_bounds();
            let mut rng = SplitMix64::new(seed);
            let spawns: Vec<ColliderBody> = (0..spawn_points)
                .map(|i| {
                    let position = random_point(&mut rng, &world);
                    ColliderBody::new(
                        Collider::Capsule {
                            a: Vec3::ZERO,
                            b: Vec3::new(0.0, 1.8, 0.0),
                            radius: 0.5,
                        },
                        RigidTransform::from_position(position),
                        EntityId(i as u32),
                    )
                })
                .collect();
            let obstacle_bodies = generate_scene(obstacles, seed.wrapping_add(1), world);

            let spawn_layer = BuildCollisionLayer::new(&spawns)
                .with_settings(settings)
                .run_parallel()?;
            let obstacle_layer = BuildCollisionLayer::new(&obstacle_bodies)
                .with_settings(settings)
                .run_parallel()?;

            let check = SpawnPointCheck {
                blocked: SafeLookup::new(spawn_points),
            };
            // Flagging a spawn point is idempotent, so reports may race.
            let check = find_pairs_between(&spawn_layer, &obstacle_layer, check)?
                .run_parallel_unsafe();
            let blocked = check.blocked.into_inner();
            let unsafe_count = blocked.iter().filter(|&&b| b).count();
            println!(
                "Spawn points: {} total, {} blocked, {} safe",
                spawn_points,
                unsafe_count,
                spawn_points - unsafe_count
            );
            if let Some(first) = blocked.iter().position(|&b| !b) {
                info!(spawn_point = first, "first safe spawn point");
            }
        }
    }

    Ok(())
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<LayerSettings> {
    let settings = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings from {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("parsing settings in {}", path.display()))?
        }
        None => LayerSettings::from_world_aabb(
            Aabb::new(Vec3::splat(-500.0), Vec3::splat(500.0)),
            UVec3::new(8, 2, 8),
        ),
    };
    settings.validate()?;
    Ok(settings)
}

fn random_point(rng: &mut SplitMix64, world: &Aabb) -> Vec3 {
    Vec3::new(
        rng.range_f32(world.min.x, world.max.x),
        rng.range_f32(world.min.y, world.max.y),
        rng.range_f32(world.min.z, world.max.z),
    )
}

/// Mixed shapes scattered over `world`, with random orientation.
fn generate_scene(count: usize, seed: u64, world: Aabb) -> Vec<ColliderBody> {
    let mut rng = SplitMix64::new(seed);
    (0..count)
        .map(|i| {
            let position = random_point(&mut rng, &world);
            let rotation = Quat::from_euler(
                glam::EulerRot::XYZ,
                rng.range_f32(0.0, std::f32::consts::TAU),
                rng.range_f32(0.0, std::f32::consts::TAU),
                rng.range_f32(0.0, std::f32::consts::TAU),
            );
            let size = rng.range_f32(0.5, 4.0);
            let collider = match rng.next_u64() % 4 {
                0 => Collider::sphere(size),
                1 => Collider::Capsule {
                    a: Vec3::new(0.0, -size, 0.0),
                    b: Vec3::new(0.0, size, 0.0),
                    radius: size * 0.5,
                },
                2 => Collider::cube(size),
                _ => Collider::compound(vec![
                    (
                        Collider::sphere(size * 0.5),
                        RigidTransform::from_position(Vec3::X * size),
                    ),
                    (
                        Collider::cube(size * 0.5),
                        RigidTransform::from_position(-Vec3::X * size),
                    ),
                ]),
            };
            let transform = RigidTransform::new(rotation, position);
            ColliderBody::new(collider, transform, EntityId(i as u32))
        })
        .collect()
}

fn brute_force(bodies: &[ColliderBody]) -> BTreeSet<(usize, usize)> {
    let aabbs: Vec<Aabb> = bodies.iter().map(ColliderBody::aabb).collect();
    let mut pairs = BTreeSet::new();
    for i in 0..aabbs.len() {
        if !aabbs[i].is_finite() {
            continue;
        }
        for j in i + 1..aabbs.len() {
            if aabbs[j].is_finite() && aabbs[i].overlaps(&aabbs[j]) {
                pairs.insert((i, j));
            }
        }
    }
    pairs
}

#[derive(Default)]
struct PairCollector {
    pairs: Mutex<Vec<(usize, usize)>>,
}

impl PairCollector {
    fn into_pairs(self) -> Vec<(usize, usize)> {
        self.pairs.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FindPairsProcessor for PairCollector {
    fn execute(&self, result: &FindPairsResult<'_>) {
        self.pairs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((result.source_index_a(), result.source_index_b()));
    }
}

fn run_strategy(layer: Arc<CollisionLayer>, strategy: Strategy) -> anyhow::Result<PairCollector> {
    let query = find_pairs(layer, PairCollector::default());
    Ok(match strategy {
        Strategy::Immediate => query.run_immediate(),
        Strategy::Run => query.run(),
        Strategy::Single => query.schedule_single().complete()?,
        Strategy::Parallel => query.run_parallel(),
        Strategy::Tracked => query.with_alias_tracking().run_parallel(),
        Strategy::Cached => query.with_cross_cache().run_parallel(),
        Strategy::Unsafe => query.run_parallel_unsafe(),
        Strategy::Scheduled => query.schedule_parallel().complete()?,
    })
}

struct SpawnPointCheck {
    blocked: SafeLookup<bool>,
}

impl FindPairsProcessor for SpawnPointCheck {
    fn execute(&self, result: &FindPairsResult<'_>) {
        if let Err(err) = self.blocked.set(result.entity_a(), true) {
            warn!(%err, "spawn point flag refused");
        }
    }
}
