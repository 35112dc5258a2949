//! Value-iteration benchmarks on generated grid worlds.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mdp::{evaluate_policy, solve, Mdp, SolverConfig};

const MOVES: [(&str, isize, isize); 4] = [
    ("up", -1, 0),
    ("down", 1, 0),
    ("left", 0, -1),
    ("right", 0, 1),
];

/// `side x side` grid. Each move succeeds with probability 0.8 and otherwise
/// leaves the agent in place. The bottom-right cell is absorbing.
fn grid(side: usize) -> Mdp<(usize, usize), &'static str> {
    let goal = (side - 1, side - 1);
    let states: Vec<_> = (0..side)
        .flat_map(|r| (0..side).map(move |c| (r, c)))
        .collect();

    let reward = |cell: (usize, usize)| if cell == goal { 10.0 } else { -1.0 };

    let mut transitions = Vec::new();
    let mut rewards = Vec::new();
    for &(r, c) in &states {
        if (r, c) == goal {
            continue;
        }
        for (name, dr, dc) in MOVES {
            let target = (
                r.checked_add_signed(dr).filter(|&r| r < side),
                c.checked_add_signed(dc).filter(|&c| c < side),
            );
            match target {
                (Some(nr), Some(nc)) => {
                    transitions.push((((r, c), name, (nr, nc)), 0.8));
                    transitions.push((((r, c), name, (r, c)), 0.2));
                    rewards.push((((r, c), name, (nr, nc)), reward((nr, nc))));
                    rewards.push((((r, c), name, (r, c)), -1.0));
                }
                _ => {
                    transitions.push((((r, c), name, (r, c)), 1.0));
                    rewards.push((((r, c), name, (r, c)), -1.0));
                }
            }
        }
    }

    let actions = MOVES.map(|(name, _, _)| name);
    Mdp::new(states, actions, transitions, rewards, 0.95).unwrap()
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve");
    let config = SolverConfig::default();
    for side in [5, 10, 20, 40] {
        let mdp = grid(side);
        group.bench_with_input(BenchmarkId::new("grid", side * side), &mdp, |b, mdp| {
            b.iter(|| solve(black_box(mdp), &config).unwrap())
        });
    }
    group.finish();
}

fn bench_evaluate_policy(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_policy");
    for side in [5, 10, 20] {
        let mdp = grid(side);
        let policy = solve(&mdp, &SolverConfig::default()).unwrap().policy;
        group.bench_with_input(BenchmarkId::new("grid", side * side), &mdp, |b, mdp| {
            b.iter(|| evaluate_policy(black_box(mdp), &policy).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_solve, bench_evaluate_policy);
criterion_main!(benches);
