//! End-to-end runs of each engine against each reference client.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crossbeam_utils::thread;

use smr::map::Map;
use smr::tree::Tree;
use smr::{hyaline, ibr};

#[test]
fn ibr_tree_fill_then_empty() {
    use rand::seq::SliceRandom;

    const KEYS: u64 = 10_000;

    let mut insertion: Vec<u64> = (0..KEYS).collect();
    insertion.shuffle(&mut SmallRng::seed_from_u64(1));
    let mut removal = insertion.clone();
    removal.shuffle(&mut SmallRng::seed_from_u64(2));

    let collector = ibr::Collector::new();
    {
        let handle = collector.register();
        let tree = Tree::new();
        for &key in &insertion {
            assert!(tree.insert(key, &handle));
        }
        for &key in &removal {
            assert!(tree.remove(&key, &handle));
        }
        for key in (0..KEYS).step_by(997) {
            assert!(!tree.contains(&key, &handle));
        }
    }
    unsafe { collector.drain_all() };
    assert_eq!(collector.leaked(), 0);
}

#[test]
fn ibr_tree_mixed_multithreaded() {
    const THREADS: usize = 4;
    const OPS: usize = 25_000;

    let collector = ibr::Collector::new();
    let tree = Tree::new();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let collector = &collector;
            let tree = &tree;
            scope.spawn(move |_| {
                let handle = collector.register();
                let mut rng = SmallRng::seed_from_u64(t as u64);
                for _ in 0..OPS {
                    let key = rng.gen_range(0..1_000u64);
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

    drop(tree);
    unsafe { collector.drain_all() };
    assert_eq!(collector.leaked(), 0);
}

#[test]
fn hyaline_tree_mixed_multithreaded() {
    const THREADS: usize = 8;
    const OPS: usize = 25_000;

    let collector = hyaline::Collector::with_config(hyaline::Config {
        slots: 8,
        batch_size: 1,
    });
    let tree = Tree::new();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let collector = &collector;
            let tree = &tree;
            scope.spawn(move |_| {
                let handle = collector.register();
                let mut rng = SmallRng::seed_from_u64(t as u64);
                for _ in 0..OPS {
                    let key = rng.gen_range(0..1_000u64);
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

    drop(tree);
    unsafe { collector.drain_all() };
    assert_eq!(collector.leaked(), 0);
    assert!(collector.stuck_slots().is_empty());
}

#[test]
fn hyaline_map_mixed_multithreaded() {
    const THREADS: usize = 16;
    const OPS: usize = 3_200;

    let collector = hyaline::Collector::new();
    let map = Map::new();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let collector = &collector;
            let map = &map;
            scope.spawn(move |_| {
                let handle = collector.register();
                let mut rng = SmallRng::seed_from_u64(t as u64);
                for _ in 0..OPS {
                    let key = rng.gen_range(0..1_000u64);
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

    drop(map);
    unsafe { collector.drain_all() };
    assert_eq!(collector.leaked(), 0);
    assert!(collector.stuck_slots().is_empty());
}

#[test]
fn hyaline_map_with_a_thread_that_never_leaves() {
    const OPS: usize = 1_000;

    let collector = hyaline::Collector::with_config(hyaline::Config {
        slots: 1,
        batch_size: 1,
    });
    let map = Map::new();

    let absentee = collector.register();
    std::mem::forget(absentee.pin());

    {
        let handle = collector.register();
        for key in 0..OPS as u64 {
            map.put(key % 10, key, &handle);
        }
    }

    drop(map);
    unsafe { collector.drain_all() };
    assert!(collector.leaked() > 0);
    assert_eq!(collector.stuck_slots(), vec![0]);
}
