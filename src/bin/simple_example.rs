//! Truck scene demo: builds a small occupancy map and queries it.
//!
//! Usage: cargo run --release --bin simple_example -- [OPTIONS]
//!
//! Options:
//!   --resolution <M>   Voxel edge length in meters (default: 0.1)
//!   --output <PATH>    Output file (default: truck<resolution>.bt)

use std::f32::consts::PI;
use std::time::Instant;

use glam::{Quat, Vec3};

use occtree::{OccupancyMap, Result};

fn main() {
    occtree::core::logging::init();

    let args: Vec<String> = std::env::args().collect();
    let resolution = parse_f64_arg(&args, "--resolution").unwrap_or(0.1);
    let output = parse_str_arg(&args, "--output")
        .unwrap_or_else(|| format!("truck{}.bt", resolution));

    if let Err(e) = run(resolution, &output) {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run(resolution: f64, output: &str) -> Result<()> {
    println!("=== Occtree Truck Demo ===");
    println!("Resolution: {}m", resolution);
    println!("Output:     {}", output);
    println!();

    let start = Instant::now();
    let rotation = Quat::from_rotation_z(PI / 6.0);
    let mut map = OccupancyMap::new(resolution)?;

    // Lattice extents scale with the resolution; the roof is sampled at
    // half a voxel, base and landing area on a fixed 5cm step.
    let res = resolution as f32;
    let step = res / 2.0;

    // Roof
    let roof = grid(lattice([1.0, 1.5, 1.0], res), step, Vec3::new(1.25, 0.0, -0.5));
    // Base
    let base = grid(lattice([2.5, 1.5, 1.5], res), 0.05, Vec3::new(0.5, 0.0, 0.75));
    // Landing area above the base, observed free
    let landing = grid(lattice([1.5, 1.5, 1.0], res), 0.05, Vec3::new(0.0, 0.0, -0.5));

    let rotate = |points: Vec<Vec3>| points.into_iter().map(|p| rotation * p).collect::<Vec<_>>();
    let occupied = map.update_points(&rotate(roof), true)? + map.update_points(&rotate(base), true)?;
    let free = map.update_points(&rotate(landing), false)?;
    println!("Integrated {} occupied and {} free points", occupied, free);

    let collapsed = map.prune();
    println!(
        "Map: {} nodes, {} leaves ({} collapsed), {:.1} KiB",
        map.node_count(),
        map.leaf_count(),
        collapsed,
        map.memory_usage() as f64 / 1024.0
    );
    if let Some(bbox) = map.bounding_box() {
        println!("Bounds: {:?} .. {:?}", bbox.min, bbox.max);
    }
    println!();

    for query in [Vec3::ZERO, Vec3::splat(-1.0), Vec3::splat(1.0)] {
        match map.search(query)? {
            Some(hit) => println!(
                "{:>16}: p(occupied) = {:.3} at depth {}",
                format!("{:?}", query.to_array()),
                hit.occupancy_probability(),
                hit.depth()
            ),
            None => println!("{:>16}: unknown", format!("{:?}", query.to_array())),
        }
    }
    println!();

    map.write_binary(output)?;
    println!("Done in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

type Lattice = [std::ops::Range<i32>; 3];

/// Index ranges covering +-`extent` meters per axis at `resolution`.
fn lattice(extent: [f32; 3], resolution: f32) -> Lattice {
    extent.map(|e| {
        let n = (e / resolution) as i32;
        -n..n
    })
}

/// Lattice points scaled by `step` and shifted by `offset`.
fn grid(lattice: Lattice, step: f32, offset: Vec3) -> Vec<Vec3> {
    let [xs, ys, zs] = lattice;
    let mut points = Vec::with_capacity(xs.len() * ys.len() * zs.len());
    for x in xs {
        for y in ys.clone() {
            for z in zs.clone() {
                points.push(Vec3::new(x as f32, y as f32, z as f32) * step + offset);
            }
        }
    }
    points
}

fn parse_f64_arg(args: &[String], flag: &str) -> Option<f64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_follows_resolution() {
        assert_eq!(lattice([1.0, 1.5, 1.0], 0.1), [-10..10, -15..15, -10..10]);
        assert_eq!(lattice([1.0, 1.5, 1.0], 0.2), [-5..5, -7..7, -5..5]);
    }

    #[test]
    fn test_roof_spans_same_region_at_any_resolution() {
        for res in [0.1f32, 0.2] {
            let roof = grid(lattice([1.0, 1.5, 1.0], res), res / 2.0, Vec3::new(1.25, 0.0, -0.5));
            let min = roof.iter().fold(Vec3::splat(f32::MAX), |a, p| a.min(*p));
            let max = roof.iter().fold(Vec3::splat(f32::MIN), |a, p| a.max(*p));
            assert!((min.x - 0.75).abs() < 1e-4, "res {}: {:?}", res, min);
            assert!(max.x < 1.75 && max.x > 1.5, "res {}: {:?}", res, max);
        }
    }
}
