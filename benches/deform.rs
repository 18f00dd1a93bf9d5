//! Benchmarks for the deformation backends.

use arap_deform::algo::deform::{ArapEnergy, Execution};
use arap_deform::prelude::*;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{Point3, Vector3};

fn create_grid_mesh(n: usize) -> MeshGraph {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    let mut faces = Vec::with_capacity(n * n * 2);

    // Create grid vertices
    for j in 0..=n {
        for i in 0..=n {
            vertices.push(Point3::new(i as f64, j as f64, 0.0));
        }
    }

    // Create triangles
    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;

            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }

    MeshGraph::from_triangles(&vertices, &faces).unwrap()
}

/// Pin one corner and lift the opposite one.
fn lift_corner(mesh: &MeshGraph) -> ConstraintSet {
    let last = mesh.num_vertices() - 1;
    ConstraintSet::new(vec![
        Constraint::new(0, *mesh.rest_position(VertexId::new(0))),
        Constraint::new(
            last,
            mesh.rest_position(VertexId::new(last)) + Vector3::new(0.0, 0.0, 5.0),
        ),
    ])
    .unwrap()
}

fn bench_backends(c: &mut Criterion) {
    let mut group = c.benchmark_group("deform_grid_30x30");
    group.sample_size(10);

    let template = create_grid_mesh(30);
    let landmarks = lift_corner(&template);

    let kinds = [
        BackendKind::GenericNls,
        BackendKind::LevenbergMarquardt,
        BackendKind::GaussNewton,
    ];
    for kind in kinds {
        let config = SolverConfig::default()
            .with_backends(BackendSet::only(kind))
            .with_nonlinear_iter(10);
        group.bench_with_input(BenchmarkId::from_parameter(kind), &config, |b, config| {
            b.iter(|| {
                let mut mesh = template.clone();
                // Unavailable backends surface as an error; the timing is then meaningless
                deform(&mut mesh, &landmarks, config).ok()
            });
        });
    }

    group.finish();
}

fn bench_energy(c: &mut Criterion) {
    let mesh = create_grid_mesh(100);
    let landmarks = lift_corner(&mesh);
    let model = ArapEnergy::<f32>::from_config(&mesh, &landmarks, &SolverConfig::default())
        .unwrap();
    let positions = model.rest().to_vec();

    c.bench_function("energy_sequential", |b| {
        b.iter(|| model.energy(&positions, Execution::Sequential));
    });

    c.bench_function("linearize_sequential", |b| {
        b.iter(|| {
            let lin = model.linearize(&positions, Execution::Sequential);
            lin.rhs(&positions)
        });
    });

    c.bench_function("linearize_parallel", |b| {
        b.iter(|| {
            let lin = model.linearize(&positions, Execution::Parallel);
            lin.rhs(&positions)
        });
    });
}

criterion_group!(benches, bench_backends, bench_energy);
criterion_main!(benches);
