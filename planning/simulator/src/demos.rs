//! Small problems used by the `plansim` binary and the tests.

use plankit_model::*;

use crate::{ActionInstance, SequentialPlan, SimulatorError};

/// A robot moving a package between two locations, with a limited battery.
///
/// Moving costs 20 units of battery (25 when leaving a slippery location), loading and unloading
/// cost 5 units each. The package starts in `l2` and must be brought to `l1`.
pub fn robot_problem() -> Result<Problem, ProblemError> {
    robot_problem_with_metrics(|_| Ok(vec![QualityMetric::MinimizeSequentialPlanLength]))
}

/// The robot problem, with the quality metrics built by `metrics` once all fluents are declared.
pub fn robot_problem_with_metrics(
    metrics: impl FnOnce(&Environment) -> Result<Vec<QualityMetric>, ProblemError>,
) -> Result<Problem, ProblemError> {
    let mut pb = ProblemBuilder::new("robot");
    let location = pb.add_type("location", None)?;
    let l1 = pb.add_object("l1", location)?;
    let l2 = pb.add_object("l2", location)?;
    let loc = |name: &str| Param::new(name, Type::User(location));

    let (t, f) = (pb.env().bool(true), pb.env().bool(false));
    let battery = pb.add_fluent("battery", vec![], Type::int(0, 100)?, Some(pb.env().int(100)))?;
    let loader_at = pb.add_fluent("loader_at", vec![loc("l")], Type::Bool, Some(f))?;
    let package_at = pb.add_fluent("package_at", vec![loc("l")], Type::Bool, Some(f))?;
    let loaded = pb.add_fluent("loaded", vec![], Type::Bool, Some(f))?;
    let slippery = pb.add_fluent("slippery", vec![loc("l")], Type::Bool, Some(f))?;

    let env = pb.env();
    let battery = env.fluent(battery, [])?;
    let loaded = env.fluent(loaded, [])?;

    let (from, to) = (loc("from"), loc("to"));
    let (vfrom, vto) = (env.param(&from), env.param(&to));
    let mut moves = Action::new("move", vec![from, to]);
    moves.add_precondition(env, env.fluent(loader_at, [vfrom])?)?;
    moves.add_precondition(env, env.not(env.eq(vfrom, vto)?)?)?;
    moves.add_precondition(env, env.ge(battery, env.int(20))?)?;
    moves.add_effect(env, Effect::assign(env.fluent(loader_at, [vfrom])?, f))?;
    moves.add_effect(env, Effect::assign(env.fluent(loader_at, [vto])?, t))?;
    let slippery_from = env.fluent(slippery, [vfrom])?;
    moves.add_effect(
        env,
        Effect::decrease(battery, env.int(20)).with_condition(env.not(slippery_from)?),
    )?;
    moves.add_effect(env, Effect::decrease(battery, env.int(25)).with_condition(slippery_from))?;

    let l = loc("l");
    let vl = env.param(&l);
    let mut load = Action::new("load", vec![l.clone()]);
    load.add_precondition(env, env.fluent(loader_at, [vl])?)?;
    load.add_precondition(env, env.fluent(package_at, [vl])?)?;
    load.add_precondition(env, env.not(loaded)?)?;
    load.add_effect(env, Effect::assign(env.fluent(package_at, [vl])?, f))?;
    load.add_effect(env, Effect::assign(loaded, t))?;
    load.add_effect(env, Effect::decrease(battery, env.int(5)))?;

    let mut unload = Action::new("unload", vec![l]);
    unload.add_precondition(env, env.fluent(loader_at, [vl])?)?;
    unload.add_precondition(env, loaded)?;
    unload.add_effect(env, Effect::assign(env.fluent(package_at, [vl])?, t))?;
    unload.add_effect(env, Effect::assign(loaded, f))?;
    unload.add_effect(env, Effect::decrease(battery, env.int(5)))?;

    // the loader is always somewhere
    let x = loc("x");
    let somewhere = env.always(env.exists(vec![x.clone()], env.fluent(loader_at, [env.var(&x)])?)?)?;

    let (o1, o2) = (env.object(l1), env.object(l2));
    let initial = [
        (env.fluent(loader_at, [o1])?, t),
        (env.fluent(package_at, [o2])?, t),
        (env.fluent(slippery, [o2])?, t),
    ];
    let goal = env.fluent(package_at, [o1])?;

    pb.add_action(moves)?;
    pb.add_action(load)?;
    pb.add_action(unload)?;
    pb.add_trajectory_constraint(somewhere)?;
    for (fluent, value) in initial {
        pb.set_initial_value(fluent, value)?;
    }
    pb.add_goal(goal)?;
    for metric in metrics(pb.env())? {
        pb.add_quality_metric(metric)?;
    }
    pb.build()
}

/// `move(l1, l2), load(l2), move(l2, l1), unload(l1)`
pub fn robot_plan(problem: &Problem) -> Result<SequentialPlan, SimulatorError> {
    [
        ("move", ["l1", "l2"].as_slice()),
        ("load", ["l2"].as_slice()),
        ("move", ["l2", "l1"].as_slice()),
        ("unload", ["l1"].as_slice()),
    ]
    .into_iter()
    .map(|(action, params)| ActionInstance::from_names(problem, action, params))
    .collect()
}
