mod common;

use std::thread;

use common::{Dense, Mlp, init_logger};
use neural_parameters::{InitConfig, LockingPolicy, Parameters, ParametersRef};
use rand::{SeedableRng, rngs::StdRng};

const POLICIES: [LockingPolicy; 4] = [
    LockingPolicy::None,
    LockingPolicy::Atomic,
    LockingPolicy::Coarse,
    LockingPolicy::Fine,
];

#[test]
fn every_policy_agrees_single_threaded() {
    init_logger();

    for policy in POLICIES {
        let mut values = [1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut deltas = [1.0_f64; 6];

        let mut params = Parameters::new("p");
        params.add_matrix(0, "w", &mut values, 3, 2).unwrap();

        let mut grads = Parameters::new("g");
        grads.add_matrix(0, "w", &mut deltas, 3, 2).unwrap();

        params.add_assign(&grads, policy).unwrap();
        params.scale(2.0, policy).unwrap();
        params.sub_assign(&grads, policy).unwrap();
        params.update(&grads, 0.5, policy).unwrap();

        assert_eq!(
            params.to_vec::<f32>().unwrap(),
            [3.5, 5.5, 7.5, 9.5, 11.5, 13.5],
            "{policy:?}"
        );
    }
}

#[test]
fn update_with_rate_one_is_add_assign() {
    let mut a = Dense::counting("dense", 2, 2, 1.0);
    let mut b = Dense::counting("dense", 2, 2, 1.0);
    let mut g = Dense::counting("dense", 2, 2, -3.0);

    let mut updated = Parameters::new("model");
    updated.add_subparams(0, &mut a).unwrap();

    let mut added = Parameters::new("model");
    added.add_subparams(0, &mut b).unwrap();

    let mut grads = Parameters::new("grads");
    grads.add_subparams(0, &mut g).unwrap();

    updated.update(&grads, 1.0, LockingPolicy::None).unwrap();
    added.add_assign(&grads, LockingPolicy::None).unwrap();

    assert_eq!(
        updated.to_vec::<f32>().unwrap(),
        added.to_vec::<f32>().unwrap()
    );
}

#[test]
fn two_norm_accumulates_across_leaves() {
    let mut a = [1.0_f32];
    let mut b = [2.0_f64, 2.0];

    let mut params = Parameters::new("p");
    params.add_vector(0, "a", &mut a).unwrap();
    params.add_vector(1, "b", &mut b).unwrap();

    assert_eq!(params.two_norm().unwrap(), 3.0);
}

#[test]
fn concurrent_writers_keep_exact_totals() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;

    for policy in [LockingPolicy::Atomic, LockingPolicy::Coarse, LockingPolicy::Fine] {
        let mut values = [0.0_f32; 12];
        let mut ones = [1.0_f32; 12];

        let mut params = Parameters::new("p");
        params.add_matrix(0, "w", &mut values, 4, 3).unwrap();

        let mut grads = ParametersRef::new("g");
        grads.add_matrix(0, "w", &mut ones, 4, 3).unwrap();

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..ROUNDS {
                        params.add_assign(&grads, policy).unwrap();
                    }
                });
            }
        });

        let expected = (THREADS * ROUNDS) as f32;
        assert_eq!(params.to_vec::<f32>().unwrap(), [expected; 12], "{policy:?}");
    }
}

#[test]
fn root_and_subtree_writers_keep_exact_totals() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;

    let mut dense = Dense::new("dense", 2, 2);
    let mut bias = [0.0_f32; 3];

    let mut params = Parameters::new("model");
    params.add_subparams(0, &mut dense).unwrap();
    params.add_vector(1, "bias", &mut bias).unwrap();

    let mut ones = vec![1.0_f64; params.parameter_count()];
    let grads = params.compatible_ref(&mut ones).unwrap();

    let subtree = params.subparams(0, "dense").unwrap();
    let sub_grads: &Parameters = grads.subparams(0, "dense").unwrap();

    thread::scope(|s| {
        for t in 0..THREADS {
            let (target, grads): (&Parameters, &Parameters) = if t % 2 == 0 {
                (&params, &*grads)
            } else {
                (subtree, sub_grads)
            };

            s.spawn(move || {
                for _ in 0..ROUNDS {
                    target.add_assign(grads, LockingPolicy::Coarse).unwrap();
                }
            });
        }
    });

    let everyone = (THREADS * ROUNDS) as f32;
    let half = (THREADS / 2 * ROUNDS) as f32;

    let values = params.to_vec::<f32>().unwrap();
    assert_eq!(values[..6], [everyone; 6]);
    assert_eq!(values[6..], [half; 3]);
}

#[test]
fn seeded_random_fill_is_reproducible() {
    let mut a = Mlp::new(&[4, 3, 2]);
    let mut b = Mlp::new(&[4, 3, 2]);

    let mut first = Parameters::new("model");
    first.add_subparams(0, &mut a).unwrap();

    let mut second = Parameters::new("model");
    second.add_subparams(0, &mut b).unwrap();

    let config = InitConfig::new(0.25, Some(7));
    first.init(&config, LockingPolicy::None).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    second.random_fill(0.25, &mut rng, LockingPolicy::Fine).unwrap();

    let values = first.to_vec::<f32>().unwrap();
    assert_eq!(values, second.to_vec::<f32>().unwrap());
    assert!(values.iter().all(|x| x.abs() <= 0.25));
    assert!(values.iter().any(|&x| x != 0.0));
}
