//! Integration tests for the environment on the built-in grids.

mod common;

use grid_sim::action::ActionUpdate;
use grid_sim::sim::{DoNothingAgent, MultiEnvironment, RandomRedispatchAgent, make};

#[test]
fn do_nothing_survives_the_test_episode() {
    let mut env = make("case14", true).unwrap();
    let outcomes = common::play(&mut env, &mut DoNothingAgent);
    assert_eq!(outcomes.len(), 47);
    assert!(outcomes.last().unwrap().done);
    for out in &outcomes {
        assert_eq!(out.reward, 1.0);
        assert!(!out.info.game_over);
        let obs = &out.observation;
        let storage: f32 = obs.storage_power.iter().sum();
        assert!(
            (obs.total_generation() - obs.total_load() - storage).abs() < 1e-2,
            "step {} is not balanced",
            obs.step
        );
    }
    let noop = env.action_space().do_nothing();
    assert!(env.step(&noop).is_err());
}

#[test]
fn redispatching_stays_zero_sum() {
    let mut env = common::test_builder("case14").build().unwrap();
    let mut agent = RandomRedispatchAgent::new(1.0, 5.0, 11);
    let outcomes = common::play(&mut env, &mut agent);
    assert!(!outcomes.is_empty());
    let grid = env.grid().clone();
    for out in &outcomes {
        let obs = &out.observation;
        assert!(obs.actual_dispatch.iter().sum::<f32>().abs() < 1e-2);
        for (g, data) in grid.generators().iter().enumerate() {
            if !data.redispatchable {
                assert_eq!(obs.target_dispatch[g], 0.0);
                assert_eq!(obs.actual_dispatch[g], 0.0);
            }
        }
    }
    assert!(outcomes.iter().any(|o| o.observation.target_dispatch.iter().any(|t| *t != 0.0)));
}

#[test]
fn keyword_actions_drive_the_grid() {
    let mut env = make("case14", true).unwrap();
    let space = env.action_space().clone();

    let act = space.build(&ActionUpdate::redispatch([(0, 4.0)])).unwrap();
    let out = env.step(&act).unwrap();
    assert_eq!(out.observation.target_dispatch[0], 4.0);

    let act = space.build(&ActionUpdate::set_line_status([(9, -1)])).unwrap();
    let out = env.step(&act).unwrap();
    assert!(!out.observation.line_status[9]);
    assert_eq!(out.observation.target_dispatch[0], 4.0);

    let act = space.build(&ActionUpdate::redispatch([(0, -4.0)])).unwrap();
    let out = env.step(&act).unwrap();
    assert_eq!(out.observation.target_dispatch[0], 0.0);
}

#[test]
fn reset_moves_to_the_next_chronics() {
    let mut env = make("case5", true).unwrap();
    assert_eq!(env.chronics_id(), "0000");
    env.reset().unwrap();
    assert_eq!(env.chronics_id(), "0001");
    env.reset().unwrap();
    assert_eq!(env.chronics_id(), "0000");
    env.set_chronics(1).unwrap();
    let obs = env.reset().unwrap();
    assert_eq!(env.chronics_id(), "0001");
    assert_eq!(obs.step, 0);
}

#[test]
fn multi_environment_matches_single_environments() {
    let builder = common::test_builder("case5");
    let mut multi = MultiEnvironment::new(&builder, 2).unwrap();
    let mut single = builder.build_seeded(1).unwrap();
    single.set_chronics(1).unwrap();
    single.reset().unwrap();

    let noop = single.action_space().do_nothing();
    let batch = vec![noop.clone(), noop.clone()];
    for _ in 0..10 {
        let outcomes = multi.step(&batch).unwrap();
        let expected = single.step(&noop).unwrap();
        assert_eq!(outcomes[1], expected);
    }
}
