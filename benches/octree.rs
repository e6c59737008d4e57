use criterion::{criterion_group, criterion_main, Criterion, black_box};

use glam::Vec3;
use occtree::{OccupancyMap, StreamFormat};

/// Points on the surface of a sphere, roughly one per voxel.
fn sphere_points(radius: f32, resolution: f32) -> Vec<Vec3> {
    let steps = (radius / resolution) as i32;
    let mut points = Vec::new();
    for i in -steps..=steps {
        for j in -steps..=steps {
            for k in -steps..=steps {
                let p = Vec3::new(i as f32, j as f32, k as f32) * resolution;
                if (p.length() - radius).abs() < resolution {
                    points.push(p);
                }
            }
        }
    }
    points
}

fn filled_map(points: &[Vec3]) -> OccupancyMap {
    let mut map = OccupancyMap::new(0.05).unwrap();
    map.update_points(points, true).unwrap();
    map
}

fn bench_insert(c: &mut Criterion) {
    let points = sphere_points(1.0, 0.05);

    c.bench_function("insert_sphere_sequential", |b| {
        b.iter(|| {
            let mut map = OccupancyMap::new(0.05).unwrap();
            for p in &points {
                map.update_node(black_box(*p), true).unwrap();
            }
            map
        });
    });

    c.bench_function("insert_sphere_batch", |b| {
        b.iter(|| filled_map(black_box(&points)));
    });
}

fn bench_search(c: &mut Criterion) {
    let points = sphere_points(1.0, 0.05);
    let map = filled_map(&points);

    c.bench_function("search_sphere", |b| {
        b.iter(|| {
            points.iter().filter(|p| map.search(**p).unwrap().is_some()).count()
        });
    });
}

fn bench_prune(c: &mut Criterion) {
    let mut points = Vec::new();
    for i in 0..32 {
        for j in 0..32 {
            for k in 0..8 {
                points.push(Vec3::new(i as f32, j as f32, k as f32) * 0.05 + 0.01);
            }
        }
    }
    let map = filled_map(&points);

    c.bench_function("prune_solid_block", |b| {
        b.iter(|| {
            let mut map = map.clone();
            map.prune()
        });
    });
}

fn bench_encode(c: &mut Criterion) {
    let map = filled_map(&sphere_points(1.0, 0.05));
    let full = map.to_bytes(StreamFormat::Full).unwrap();

    c.bench_function("encode_binary", |b| {
        b.iter(|| map.to_bytes(black_box(StreamFormat::Binary)).unwrap());
    });

    c.bench_function("encode_full", |b| {
        b.iter(|| map.to_bytes(black_box(StreamFormat::Full)).unwrap());
    });

    c.bench_function("decode_full", |b| {
        b.iter(|| OccupancyMap::from_bytes(black_box(&full), map.config()).unwrap());
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_search,
    bench_prune,
    bench_encode,
);
criterion_main!(benches);
