//! Throughput and leak benchmark across the scheme-by-client matrix.
//!
//! Takes one positional argument, the worker thread count (default 4),
//! and runs each engine against each reference client with the mixes the
//! clients are conventionally measured with: insert/remove for the tree,
//! an even insert/remove/find split for the map. Prints one throughput
//! line and one leak line per combination.

use std::env;
use std::process;
use std::time::Instant;

use crossbeam_utils::thread;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use smr::map::Map;
use smr::tree::Tree;
use smr::{hyaline, ibr, Smr};

const TOTAL_OPS: usize = 100_000;
const KEY_RANGE: u64 = 1_000;

fn main() {
    let threads = match env::args().nth(1) {
        Some(arg) => match arg.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                eprintln!("threads must be a positive integer, got {:?}", arg);
                process::exit(1);
            }
        },
        None => 4,
    };

    {
        println!("ibr / tree");
        let collector = ibr::Collector::new();
        let elapsed = bench_tree(threads, || collector.register());
        report(threads, elapsed);
        unsafe { collector.drain_all() };
        report_leaks(collector.leaked(), &[]);
    }
    {
        println!("hyaline / tree");
        let collector = hyaline::Collector::new();
        let elapsed = bench_tree(threads, || collector.register());
        report(threads, elapsed);
        unsafe { collector.drain_all() };
        report_leaks(collector.leaked(), &collector.stuck_slots());
    }
    {
        println!("ibr / map");
        let collector = ibr::Collector::new();
        let elapsed = bench_map(threads, || collector.register());
        report(threads, elapsed);
        unsafe { collector.drain_all() };
        report_leaks(collector.leaked(), &[]);
    }
    {
        println!("hyaline / map");
        let collector = hyaline::Collector::new();
        let elapsed = bench_map(threads, || collector.register());
        report(threads, elapsed);
        unsafe { collector.drain_all() };
        report_leaks(collector.leaked(), &collector.stuck_slots());
    }
}

/// Insert/remove workload, evenly split, uniform keys.
fn bench_tree<H, F>(threads: usize, register: F) -> f64
where
    H: Smr,
    F: Fn() -> H + Sync,
{
    let tree = Tree::new();
    let per_thread = TOTAL_OPS / threads;
    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..threads {
            let tree = &tree;
            let register = &register;
            scope.spawn(move |_| {
                let handle = register();
                let mut rng = SmallRng::seed_from_u64(t as u64);
                for _ in 0..per_thread {
                    let key = rng.gen_range(0..KEY_RANGE);
                    if rng.gen::<bool>() {
                        tree.insert(key, &handle);
                    } else {
                        tree.remove(&key, &handle);
                    }
                }
            });
        }
    })
    .unwrap();
    start.elapsed().as_secs_f64()
}

/// Insert/remove/find workload, evenly split, uniform keys.
fn bench_map<H, F>(threads: usize, register: F) -> f64
where
    H: Smr,
    F: Fn() -> H + Sync,
{
    let map = Map::new();
    let per_thread = TOTAL_OPS / threads;
    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..threads {
            let map = &map;
            let register = &register;
            scope.spawn(move |_| {
                let handle = register();
                let mut rng = SmallRng::seed_from_u64(t as u64);
                for _ in 0..per_thread {
                    let key = rng.gen_range(0..KEY_RANGE);
                    match rng.gen_range(0..3) {
                        0 => drop(map.put(key, key, &handle)),
                        1 => drop(map.remove(&key, &handle)),
                        _ => drop(map.get(&key, &handle)),
                    }
                }
            });
        }
    })
    .unwrap();
    start.elapsed().as_secs_f64()
}

fn report(threads: usize, elapsed: f64) {
    let ops = (TOTAL_OPS / threads) * threads;
    let throughput = ops as f64 / elapsed;
    println!(
        "Threads: {} | Throughput: {:.0} ops/sec",
        threads, throughput
    );
}

fn report_leaks(leaked: usize, stuck: &[usize]) {
    for slot in stuck {
        eprintln!("slot {} was never left by some thread", slot);
    }
    println!("Leaked: {} blocks", leaked);
}
